//! Keel AWS Provider
//!
//! CloudWatch Evidently features and projects, plus a read-only view of
//! Lambda function configuration.

#[cfg(test)]
mod acctest;
pub mod config;
pub mod error;
pub mod evidently;
pub mod lambda;
pub mod schemas;
mod waiter;

use std::sync::Arc;

use keel_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceType,
};
use keel_core::resource::{Resource, ResourceId, State};
use keel_core::schema::ResourceSchema;

use crate::config::AwsConfig;
use crate::evidently::EvidentlyApi;
use crate::evidently::memory::MemoryEvidently;
use crate::evidently::sdk::SdkEvidently;
use crate::lambda::LambdaApi;
use crate::lambda::memory::MemoryLambda;
use crate::lambda::sdk::SdkLambda;
use crate::schemas::evidently::{FEATURE_TYPE, PROJECT_TYPE};
use crate::schemas::lambda::FUNCTION_TYPE;

/// evidently.feature resource type
pub struct FeatureType;

impl ResourceType for FeatureType {
    fn name(&self) -> &'static str {
        FEATURE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::evidently::feature_schema()
    }
}

/// evidently.project resource type
pub struct ProjectType;

impl ResourceType for ProjectType {
    fn name(&self) -> &'static str {
        PROJECT_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::evidently::project_schema()
    }
}

/// lambda.function data source
pub struct LambdaFunctionType;

impl ResourceType for LambdaFunctionType {
    fn name(&self) -> &'static str {
        FUNCTION_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schemas::lambda::function_schema()
    }
}

/// AWS Provider
#[derive(Clone)]
pub struct AwsProvider {
    pub(crate) evidently: Arc<dyn EvidentlyApi>,
    pub(crate) lambda: Arc<dyn LambdaApi>,
    pub(crate) config: AwsConfig,
}

impl AwsProvider {
    /// Create a provider backed by the AWS SDK
    pub async fn new(config: AwsConfig) -> Self {
        let sdk_config = config.load_sdk_config().await;
        log::debug!("AWS provider using region {}", config.region);

        Self {
            evidently: Arc::new(SdkEvidently::new(&sdk_config)),
            lambda: Arc::new(SdkLambda::new(&sdk_config)),
            config,
        }
    }

    /// Create with specific backends (for testing)
    pub fn with_backends(
        evidently: Arc<dyn EvidentlyApi>,
        lambda: Arc<dyn LambdaApi>,
        config: AwsConfig,
    ) -> Self {
        Self {
            evidently,
            lambda,
            config,
        }
    }

    /// Create a provider over empty in-memory backends
    ///
    /// Features report `UPDATING` for one read after every write, so the
    /// waiters run the same way they do against AWS.
    pub fn in_memory() -> Self {
        let config = AwsConfig::default().without_delays();
        Self::with_backends(
            Arc::new(MemoryEvidently::new(config.region.clone()).with_settle_reads(1)),
            Arc::new(MemoryLambda::new()),
            config,
        )
    }

    pub fn config(&self) -> &AwsConfig {
        &self.config
    }

    /// The Evidently backend this provider talks to
    pub fn evidently(&self) -> &dyn EvidentlyApi {
        self.evidently.as_ref()
    }
}

fn unsupported(id: &ResourceId, operation: &str) -> ProviderError {
    ProviderError::unsupported(format!(
        "Cannot {} resource type: {}",
        operation, id.resource_type
    ))
    .for_resource(id.clone())
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        vec![
            Box::new(FeatureType),
            Box::new(ProjectType),
            Box::new(LambdaFunctionType),
        ]
    }

    fn read<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            let id = &resource.id;
            match (id.resource_type.as_str(), identifier) {
                (FUNCTION_TYPE, _) => self.read_lambda_function(resource).await,
                (FEATURE_TYPE, Some(identifier)) => {
                    self.read_evidently_feature(id, identifier).await
                }
                (PROJECT_TYPE, Some(identifier)) => {
                    self.read_evidently_project(id, identifier).await
                }
                // Never created, so nothing to look up
                (FEATURE_TYPE | PROJECT_TYPE, None) => Ok(State::not_found(id.clone())),
                _ => Err(unsupported(id, "read")),
            }
        })
    }

    fn create<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                FEATURE_TYPE => self.create_evidently_feature(resource).await,
                PROJECT_TYPE => self.create_evidently_project(resource).await,
                _ => Err(unsupported(&resource.id, "create")),
            }
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
        from: &'a State,
        to: &'a Resource,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(async move {
            match id.resource_type.as_str() {
                FEATURE_TYPE => {
                    self.update_evidently_feature(id, identifier, from, to)
                        .await
                }
                PROJECT_TYPE => {
                    self.update_evidently_project(id, identifier, from, to)
                        .await
                }
                _ => Err(unsupported(id, "update")),
            }
        })
    }

    fn delete<'a>(
        &'a self,
        id: &'a ResourceId,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            match id.resource_type.as_str() {
                FEATURE_TYPE => self.delete_evidently_feature(id, identifier).await,
                PROJECT_TYPE => self.delete_evidently_project(id, identifier).await,
                _ => Err(unsupported(id, "delete")),
            }
        })
    }
}
