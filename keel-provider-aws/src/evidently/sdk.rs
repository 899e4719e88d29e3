//! EvidentlyApi over aws-sdk-evidently

// The SDK flags the whole Evidently client as deprecated (service end of support)
#![allow(deprecated)]

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_evidently::Client;
use aws_sdk_evidently::primitives::DateTime;
use aws_sdk_evidently::types::{
    Feature, FeatureEvaluationStrategy, Project, VariableValue as SdkVariableValue,
    VariationConfig,
};
use chrono::Utc;

use super::api::{
    CreateFeatureInput, CreateProjectInput, EvaluationRuleRecord, EvidentlyApi, FeatureRecord,
    ProjectRecord, UpdateFeatureInput, VariableValue, VariationRecord,
};
use crate::error::ApiError;

pub struct SdkEvidently {
    client: Client,
}

impl SdkEvidently {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

fn to_chrono(dt: &DateTime) -> chrono::DateTime<Utc> {
    chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()).unwrap_or_default()
}

fn empty_response(operation: &str) -> ApiError {
    ApiError::Service(format!("{} returned no data", operation).into())
}

fn non_empty<T>(map: HashMap<String, T>) -> Option<HashMap<String, T>> {
    (!map.is_empty()).then_some(map)
}

fn to_sdk_value(value: &VariableValue) -> SdkVariableValue {
    match value {
        VariableValue::String(s) => SdkVariableValue::StringValue(s.clone()),
        VariableValue::Long(n) => SdkVariableValue::LongValue(*n),
        VariableValue::Double(n) => SdkVariableValue::DoubleValue(*n),
        VariableValue::Bool(b) => SdkVariableValue::BoolValue(*b),
    }
}

fn from_sdk_value(value: &SdkVariableValue) -> Option<VariableValue> {
    match value {
        SdkVariableValue::StringValue(s) => Some(VariableValue::String(s.clone())),
        SdkVariableValue::LongValue(n) => Some(VariableValue::Long(*n)),
        SdkVariableValue::DoubleValue(n) => Some(VariableValue::Double(*n)),
        SdkVariableValue::BoolValue(b) => Some(VariableValue::Bool(*b)),
        _ => None,
    }
}

fn variation_configs(variations: &[VariationRecord]) -> Result<Vec<VariationConfig>, ApiError> {
    variations
        .iter()
        .map(|v| {
            VariationConfig::builder()
                .name(&v.name)
                .value(to_sdk_value(&v.value))
                .build()
                .map_err(|e| ApiError::Service(Box::new(e)))
        })
        .collect()
}

fn feature_record(feature: Feature) -> FeatureRecord {
    let variations = feature
        .variations
        .iter()
        .filter_map(|v| {
            Some(VariationRecord {
                name: v.name.clone()?,
                value: from_sdk_value(v.value.as_ref()?)?,
            })
        })
        .collect();

    let evaluation_rules = feature
        .evaluation_rules
        .unwrap_or_default()
        .into_iter()
        .map(|r| EvaluationRuleRecord {
            name: r.name,
            rule_type: r.r#type,
        })
        .collect();

    FeatureRecord {
        arn: feature.arn,
        name: feature.name,
        project: feature.project.unwrap_or_default(),
        description: feature.description,
        default_variation: feature.default_variation,
        evaluation_strategy: feature.evaluation_strategy.as_str().to_string(),
        entity_overrides: feature.entity_overrides.unwrap_or_default(),
        evaluation_rules,
        variations,
        value_type: feature.value_type.as_str().to_string(),
        status: feature.status.as_str().to_string(),
        created_time: to_chrono(&feature.created_time),
        last_updated_time: to_chrono(&feature.last_updated_time),
        tags: feature.tags.unwrap_or_default(),
    }
}

fn project_record(project: Project) -> ProjectRecord {
    ProjectRecord {
        arn: project.arn,
        name: project.name,
        description: project.description,
        status: project.status.as_str().to_string(),
        feature_count: project.feature_count.unwrap_or_default(),
        created_time: to_chrono(&project.created_time),
        last_updated_time: to_chrono(&project.last_updated_time),
        tags: project.tags.unwrap_or_default(),
    }
}

#[async_trait]
impl EvidentlyApi for SdkEvidently {
    async fn create_project(&self, input: CreateProjectInput) -> Result<ProjectRecord, ApiError> {
        let output = self
            .client
            .create_project()
            .name(input.name)
            .set_description(input.description)
            .set_tags(non_empty(input.tags))
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .project
            .map(project_record)
            .ok_or_else(|| empty_response("CreateProject"))
    }

    async fn get_project(&self, project: &str) -> Result<ProjectRecord, ApiError> {
        let output = self
            .client
            .get_project()
            .project(project)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .project
            .map(project_record)
            .ok_or_else(|| ApiError::NotFound(format!("Project {}", project)))
    }

    async fn update_project(
        &self,
        project: &str,
        description: Option<String>,
    ) -> Result<ProjectRecord, ApiError> {
        let output = self
            .client
            .update_project()
            .project(project)
            .set_description(description)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .project
            .map(project_record)
            .ok_or_else(|| empty_response("UpdateProject"))
    }

    async fn delete_project(&self, project: &str) -> Result<(), ApiError> {
        self.client
            .delete_project()
            .project(project)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }

    async fn create_feature(&self, input: CreateFeatureInput) -> Result<FeatureRecord, ApiError> {
        let variations = variation_configs(&input.variations)?;

        let output = self
            .client
            .create_feature()
            .project(input.project)
            .name(input.name)
            .set_description(input.description)
            .set_default_variation(input.default_variation)
            .set_evaluation_strategy(
                input
                    .evaluation_strategy
                    .as_deref()
                    .map(FeatureEvaluationStrategy::from),
            )
            .set_entity_overrides(non_empty(input.entity_overrides))
            .set_variations(Some(variations))
            .set_tags(non_empty(input.tags))
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .feature
            .map(feature_record)
            .ok_or_else(|| empty_response("CreateFeature"))
    }

    async fn get_feature(&self, project: &str, feature: &str) -> Result<FeatureRecord, ApiError> {
        let output = self
            .client
            .get_feature()
            .project(project)
            .feature(feature)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .feature
            .map(feature_record)
            .ok_or_else(|| ApiError::NotFound(format!("Feature {}/{}", feature, project)))
    }

    async fn update_feature(&self, input: UpdateFeatureInput) -> Result<FeatureRecord, ApiError> {
        let add_or_update = variation_configs(&input.add_or_update_variations)?;

        let output = self
            .client
            .update_feature()
            .project(input.project)
            .feature(input.feature)
            .set_description(input.description)
            .set_default_variation(input.default_variation)
            .set_evaluation_strategy(
                input
                    .evaluation_strategy
                    .as_deref()
                    .map(FeatureEvaluationStrategy::from),
            )
            .set_entity_overrides(input.entity_overrides)
            .set_add_or_update_variations((!add_or_update.is_empty()).then_some(add_or_update))
            .set_remove_variations(
                (!input.remove_variations.is_empty()).then_some(input.remove_variations),
            )
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .feature
            .map(feature_record)
            .ok_or_else(|| empty_response("UpdateFeature"))
    }

    async fn delete_feature(&self, project: &str, feature: &str) -> Result<(), ApiError> {
        self.client
            .delete_feature()
            .project(project)
            .feature(feature)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> Result<(), ApiError> {
        self.client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> Result<(), ApiError> {
        self.client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(keys))
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_convert_to_utc() {
        let dt = DateTime::from_secs(1_700_000_000);
        assert_eq!(to_chrono(&dt).timestamp(), 1_700_000_000);
    }
}
