//! Lambda data source schema definitions

use keel_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema};

pub const FUNCTION_TYPE: &str = "lambda.function";

fn string_set() -> AttributeType {
    AttributeType::Set(Box::new(AttributeType::String))
}

fn vpc_config() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("subnet_ids", string_set()).computed())
        .attribute(AttributeSchema::new("security_group_ids", string_set()).computed())
        .attribute(AttributeSchema::new("ipv6_allowed_for_dual_stack", AttributeType::Bool).computed())
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).computed())
}

/// Returns the schema for the lambda.function data source
pub fn function_schema() -> ResourceSchema {
    let computed = |name: &str, attr_type: AttributeType| AttributeSchema::new(name, attr_type).computed();

    ResourceSchema::new(FUNCTION_TYPE)
        .with_description("Configuration of an existing Lambda function")
        .as_data_source()
        .attribute(AttributeSchema::new("function_name", AttributeType::String).required())
        .attribute(computed("arn", AttributeType::String))
        .attribute(computed("runtime", AttributeType::String))
        .attribute(computed("handler", AttributeType::String))
        .attribute(computed("role", AttributeType::String))
        .attribute(computed("memory_size", AttributeType::Int))
        .attribute(computed("timeout", AttributeType::Int))
        .attribute(computed("version", AttributeType::String))
        .attribute(computed("last_modified", AttributeType::String))
        .attribute(computed(
            "layers",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
        .attribute(computed(
            "vpc_config",
            AttributeType::List(Box::new(AttributeType::Block(vpc_config()))),
        ))
}

/// Returns all Lambda schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![function_schema()]
}
