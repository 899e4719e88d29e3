//! In-memory Lambda backend

use async_trait::async_trait;
use dashmap::DashMap;

use super::api::{FunctionConfiguration, LambdaApi};
use crate::error::ApiError;

/// Function configurations keyed by function name
#[derive(Debug, Default)]
pub struct MemoryLambda {
    functions: DashMap<String, FunctionConfiguration>,
}

impl MemoryLambda {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a function configuration
    pub fn put_function(&self, function: FunctionConfiguration) {
        self.functions
            .insert(function.function_name.clone(), function);
    }
}

#[async_trait]
impl LambdaApi for MemoryLambda {
    async fn get_function_configuration(
        &self,
        function_name: &str,
    ) -> Result<FunctionConfiguration, ApiError> {
        self.functions
            .get(function_name)
            .map(|f| f.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("Function not found: {}", function_name)))
    }
}
