//! Evidently resource schema definitions

use keel_core::resource::Value;
use keel_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema, types};

use super::types as aws_types;

pub const FEATURE_TYPE: &str = "evidently.feature";
pub const PROJECT_TYPE: &str = "evidently.project";

const MAX_VARIATIONS: usize = 5;

/// Typed value of a variation; exactly one field is set
fn variable_value() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("string_value", AttributeType::String))
        .attribute(AttributeSchema::new("long_value", AttributeType::Int))
        .attribute(AttributeSchema::new("double_value", AttributeType::Float))
        .attribute(AttributeSchema::new("bool_value", AttributeType::Bool))
        .exactly_one_of(&["string_value", "long_value", "double_value", "bool_value"])
}

fn variation() -> BlockSchema {
    BlockSchema::new()
        .attribute(
            AttributeSchema::new("name", aws_types::evidently_name())
                .required()
                .with_description("Variation name"),
        )
        .attribute(
            AttributeSchema::new(
                "value",
                AttributeType::List(Box::new(AttributeType::Block(variable_value()))),
            )
            .required()
            .with_item_limits(1, 1),
        )
}

fn evaluation_rule() -> BlockSchema {
    BlockSchema::new()
        .attribute(AttributeSchema::new("name", AttributeType::String).computed())
        .attribute(AttributeSchema::new("type", AttributeType::String).computed())
}

fn timestamps(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attribute(
            AttributeSchema::new("created_time", AttributeType::String)
                .computed()
                .with_description("RFC 3339 creation timestamp"),
        )
        .attribute(
            AttributeSchema::new("last_updated_time", AttributeType::String)
                .computed()
                .with_description("RFC 3339 timestamp of the last change"),
        )
}

/// Returns the schema for evidently.feature
pub fn feature_schema() -> ResourceSchema {
    let schema = ResourceSchema::new(FEATURE_TYPE)
        .with_description("A CloudWatch Evidently feature and its variations")
        .attribute(
            AttributeSchema::new("name", aws_types::evidently_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("project", aws_types::project_name_or_arn())
                .required()
                .force_new()
                .with_description("Name or ARN of the project that owns the feature"),
        )
        .attribute(AttributeSchema::new("description", aws_types::description()))
        .attribute(
            AttributeSchema::new("default_variation", aws_types::evidently_name())
                .optional_computed()
                .with_description("Variation served to users not matched by a rule or override"),
        )
        .attribute(
            AttributeSchema::new("evaluation_strategy", aws_types::evaluation_strategy())
                .with_default(Value::from("ALL_RULES")),
        )
        .attribute(
            AttributeSchema::new("entity_overrides", types::string_map())
                .with_description("Entity ID to variation name"),
        )
        .attribute(
            AttributeSchema::new(
                "variations",
                AttributeType::Set(Box::new(AttributeType::Block(variation()))),
            )
            .required()
            .with_item_limits(1, MAX_VARIATIONS),
        )
        .attribute(AttributeSchema::new("tags", types::string_map()))
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new(
                "evaluation_rules",
                AttributeType::Set(Box::new(AttributeType::Block(evaluation_rule()))),
            )
            .computed(),
        )
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        .attribute(AttributeSchema::new("value_type", AttributeType::String).computed());

    timestamps(schema)
}

/// Returns the schema for evidently.project
pub fn project_schema() -> ResourceSchema {
    let schema = ResourceSchema::new(PROJECT_TYPE)
        .with_description("A CloudWatch Evidently project")
        .attribute(
            AttributeSchema::new("name", aws_types::evidently_name())
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("description", aws_types::description()))
        .attribute(AttributeSchema::new("tags", types::string_map()))
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(AttributeSchema::new("status", AttributeType::String).computed())
        .attribute(AttributeSchema::new("feature_count", AttributeType::Int).computed());

    timestamps(schema)
}

/// Returns all Evidently schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![feature_schema(), project_schema()]
}
