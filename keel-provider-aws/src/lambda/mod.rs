//! Lambda function configuration

pub mod api;
pub mod flex;
mod function;
pub mod memory;
pub mod sdk;

pub use api::{FunctionConfiguration, LambdaApi};
pub use flex::{flatten_layers, flatten_vpc_config_response};
