//! Lambda API seam

use async_trait::async_trait;
use aws_sdk_lambda::types::{Layer, VpcConfigResponse};

use crate::error::ApiError;

/// The parts of a function configuration the data source exposes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionConfiguration {
    pub function_name: String,
    pub function_arn: String,
    pub runtime: Option<String>,
    pub handler: Option<String>,
    pub role: Option<String>,
    pub memory_size: Option<i32>,
    pub timeout: Option<i32>,
    pub version: Option<String>,
    pub last_modified: Option<String>,
    pub layers: Vec<Layer>,
    pub vpc_config: Option<VpcConfigResponse>,
}

/// Operations the provider needs from Lambda
#[async_trait]
pub trait LambdaApi: Send + Sync {
    async fn get_function_configuration(
        &self,
        function_name: &str,
    ) -> Result<FunctionConfiguration, ApiError>;
}
