//! AWS-specific type definitions

use std::sync::LazyLock;

use keel_core::resource::Value;
use keel_core::schema::AttributeType;
use regex::Regex;

static RESOURCE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9._]*$").expect("valid regex"));

static REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]*)?-[a-z]+-\d$").expect("valid regex"));

const NAME_MAX_LEN: usize = 127;
const DESCRIPTION_MAX_LEN: usize = 160;

/// Evidently resource name: 1-127 letters, digits, `-`, `.` or `_`
pub fn evidently_name() -> AttributeType {
    AttributeType::Custom {
        name: "EvidentlyName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => validate_name(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn validate_name(s: &str) -> Result<(), String> {
    if s.is_empty() || s.len() > NAME_MAX_LEN {
        return Err(format!(
            "Name '{}' must be between 1 and {} characters",
            s, NAME_MAX_LEN
        ));
    }
    if !RESOURCE_NAME.is_match(s) {
        return Err(format!(
            "Name '{}' may only contain letters, digits, '-', '.' and '_'",
            s
        ));
    }
    Ok(())
}

/// Project reference: a project name or a project ARN
pub fn project_name_or_arn() -> AttributeType {
    AttributeType::Custom {
        name: "ProjectNameOrArn".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if s.starts_with("arn:") => {
                if s.contains(":project/") {
                    Ok(())
                } else {
                    Err(format!("'{}' is not an Evidently project ARN", s))
                }
            }
            Value::String(s) => validate_name(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// Free-form description of at most 160 characters
pub fn description() -> AttributeType {
    AttributeType::Custom {
        name: "Description".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if s.chars().count() > DESCRIPTION_MAX_LEN => Err(format!(
                "Description must be at most {} characters",
                DESCRIPTION_MAX_LEN
            )),
            _ => Ok(()),
        },
    }
}

/// How a feature picks the variation it serves
pub fn evaluation_strategy() -> AttributeType {
    AttributeType::Enum(vec![
        "ALL_RULES".to_string(),
        "DEFAULT_VARIATION".to_string(),
    ])
}

/// AWS region in its hyphenated form, e.g. `us-east-1`
pub fn aws_region() -> AttributeType {
    AttributeType::Custom {
        name: "Region".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if is_valid_region(s) => Ok(()),
            Value::String(s) => Err(format!(
                "Invalid region '{}', expected a region like us-east-1",
                s
            )),
            _ => Err("Expected string".to_string()),
        },
    }
}

pub fn is_valid_region(s: &str) -> bool {
    REGION.is_match(s)
}
