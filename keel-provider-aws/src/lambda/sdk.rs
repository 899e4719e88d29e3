//! LambdaApi over aws-sdk-lambda

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::Client;

use super::api::{FunctionConfiguration, LambdaApi};
use crate::error::ApiError;

pub struct SdkLambda {
    client: Client,
}

impl SdkLambda {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl LambdaApi for SdkLambda {
    async fn get_function_configuration(
        &self,
        function_name: &str,
    ) -> Result<FunctionConfiguration, ApiError> {
        let output = self
            .client
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        Ok(FunctionConfiguration {
            function_name: output.function_name.unwrap_or_else(|| function_name.to_string()),
            function_arn: output.function_arn.unwrap_or_default(),
            runtime: output.runtime.map(|r| r.as_str().to_string()),
            handler: output.handler,
            role: output.role,
            memory_size: output.memory_size,
            timeout: output.timeout,
            version: output.version,
            last_modified: output.last_modified,
            layers: output.layers.unwrap_or_default(),
            vpc_config: output.vpc_config,
        })
    }
}
