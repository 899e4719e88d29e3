//! lambda.function data source

use std::collections::HashMap;

use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, State, Value};

use super::api::FunctionConfiguration;
use super::flex::{flatten_layers, flatten_vpc_config_response};
use crate::AwsProvider;

fn function_attributes(function: &FunctionConfiguration) -> HashMap<String, Value> {
    let mut attributes = HashMap::from([
        (
            "function_name".to_string(),
            Value::String(function.function_name.clone()),
        ),
        ("arn".to_string(), Value::String(function.function_arn.clone())),
        ("layers".to_string(), flatten_layers(&function.layers)),
        (
            "vpc_config".to_string(),
            flatten_vpc_config_response(function.vpc_config.as_ref()),
        ),
    ]);

    let strings = [
        ("runtime", &function.runtime),
        ("handler", &function.handler),
        ("role", &function.role),
        ("version", &function.version),
        ("last_modified", &function.last_modified),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            attributes.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    if let Some(memory_size) = function.memory_size {
        attributes.insert("memory_size".to_string(), Value::Int(memory_size.into()));
    }
    if let Some(timeout) = function.timeout {
        attributes.insert("timeout".to_string(), Value::Int(timeout.into()));
    }

    attributes
}

impl AwsProvider {
    /// Read a Lambda function's configuration by `function_name`
    pub(crate) async fn read_lambda_function(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let Some(function_name) = resource.get_str("function_name") else {
            return Err(ProviderError::validation("function_name is required").for_resource(id));
        };

        match self.lambda.get_function_configuration(function_name).await {
            Ok(function) => {
                log::debug!("read Lambda function {}", function.function_arn);
                let identifier = function.function_arn.clone();
                Ok(State::existing(id, function_attributes(&function)).with_identifier(identifier))
            }
            Err(e) if e.is_not_found() => Ok(State::not_found(id)),
            Err(e) => Err(e
                .into_provider_error(format!("Failed to read Lambda function {}", function_name))
                .for_resource(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsConfig;
    use crate::evidently::memory::MemoryEvidently;
    use crate::lambda::memory::MemoryLambda;
    use aws_sdk_lambda::types::{Layer, VpcConfigResponse};
    use std::sync::Arc;

    fn provider(lambda: MemoryLambda) -> AwsProvider {
        AwsProvider::with_backends(
            Arc::new(MemoryEvidently::new("us-east-1")),
            Arc::new(lambda),
            AwsConfig::default().without_delays(),
        )
    }

    fn function() -> FunctionConfiguration {
        FunctionConfiguration {
            function_name: "handler".to_string(),
            function_arn: "arn:aws:lambda:us-east-1:123456789012:function:handler".to_string(),
            runtime: Some("python3.12".to_string()),
            handler: Some("index.handler".to_string()),
            memory_size: Some(128),
            timeout: Some(3),
            layers: vec![Layer::builder().arn("arn:layer:1").build()],
            vpc_config: Some(VpcConfigResponse::builder().build()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reads_function_configuration() {
        let lambda = MemoryLambda::new();
        lambda.put_function(function());
        let provider = provider(lambda);

        let resource = Resource::new("lambda.function", "fn")
            .with_attribute("function_name", Value::from("handler"))
            .with_read_only(true);
        let state = provider.read_lambda_function(&resource).await.unwrap();

        assert!(state.exists);
        assert_eq!(
            state.identifier.as_deref(),
            Some("arn:aws:lambda:us-east-1:123456789012:function:handler")
        );
        assert_eq!(state.attributes["memory_size"], Value::Int(128));
        assert_eq!(
            state.attributes["layers"],
            Value::List(vec![Value::from("arn:layer:1")])
        );
        assert_eq!(state.attributes["vpc_config"], Value::List(vec![]));
        assert!(!state.attributes.contains_key("role"));
    }

    #[tokio::test]
    async fn missing_function_is_not_found() {
        let provider = provider(MemoryLambda::new());
        let resource = Resource::new("lambda.function", "fn")
            .with_attribute("function_name", Value::from("missing"));

        let state = provider.read_lambda_function(&resource).await.unwrap();
        assert!(!state.exists);
    }
}
