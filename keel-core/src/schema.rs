//! Schema - Define type schemas for resources
//!
//! Providers define schemas for each resource type,
//! enabling type validation before anything is planned.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Floating point number (integers are accepted)
    Float,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection; compared without regard to order
    Set(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested block, represented as a map of its attributes
    Block(BlockSchema),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve at apply time, so the type can't be checked yet
            (_, Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|message| TypeError::ValidationFailed { message })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(block), Value::Map(map)) => block.validate(map),

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }

    /// Whether values of this type compare without regard to element order
    pub fn is_unordered(&self) -> bool {
        match self {
            AttributeType::Set(_) => true,
            AttributeType::Custom { base, .. } => base.is_unordered(),
            _ => false,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedAttribute { name: String },

    #[error("Attribute '{name}' expects between {min} and {max} items, got {got}")]
    ItemCount {
        name: String,
        min: usize,
        max: usize,
        got: usize,
    },

    #[error("Exactly one of {} must be set, got {got}", expected.join(", "))]
    ExactlyOneOf { expected: Vec<String>, got: usize },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef(binding, attr) => format!("ResourceRef({}.{})", binding, attr),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider; configuration may only set it when also optional
    pub computed: bool,
    /// Changing this attribute replaces the resource
    pub force_new: bool,
    /// Whether configuration may set this attribute
    pub optional: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Item count bounds for list/set attributes
    pub item_limits: Option<(usize, usize)>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            force_new: false,
            optional: true,
            default: None,
            description: None,
            item_limits: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provider-populated attribute that configuration cannot set
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Optional attribute whose value the provider fills in when unset
    pub fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_item_limits(mut self, min: usize, max: usize) -> Self {
        self.item_limits = Some((min, max));
        self
    }

    fn validate_value(&self, value: &Value) -> Result<(), TypeError> {
        if !self.optional && !self.required {
            return Err(TypeError::ComputedAttribute {
                name: self.name.clone(),
            });
        }

        if let (Some((min, max)), Value::List(items)) = (self.item_limits, value)
            && (items.len() < min || items.len() > max)
        {
            return Err(TypeError::ItemCount {
                name: self.name.clone(),
                min,
                max,
                got: items.len(),
            });
        }

        self.attr_type
            .validate(value)
            .map_err(|e| TypeError::AttributeError {
                name: self.name.clone(),
                inner: Box::new(e),
            })
    }
}

/// Schema of a nested block
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: HashMap<String, AttributeSchema>,
    /// Groups of attributes of which exactly one must be set
    pub exactly_one_of: Vec<Vec<String>>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn exactly_one_of(mut self, names: &[&str]) -> Self {
        self.exactly_one_of
            .push(names.iter().map(|n| n.to_string()).collect());
        self
    }

    fn validate(&self, values: &HashMap<String, Value>) -> Result<(), TypeError> {
        let mut errors = validate_attributes(&self.attributes, values);

        for group in &self.exactly_one_of {
            let got = group.iter().filter(|n| values.contains_key(*n)).count();
            if got != 1 {
                errors.push(TypeError::ExactlyOneOf {
                    expected: group.clone(),
                    got,
                });
            }
        }

        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn validate_attributes(
    schemas: &HashMap<String, AttributeSchema>,
    attributes: &HashMap<String, Value>,
) -> Vec<TypeError> {
    let mut errors = Vec::new();

    let mut required: Vec<_> = schemas
        .values()
        .filter(|s| s.required && s.default.is_none() && !attributes.contains_key(&s.name))
        .map(|s| s.name.clone())
        .collect();
    required.sort();
    errors.extend(
        required
            .into_iter()
            .map(|name| TypeError::MissingRequired { name }),
    );

    let mut names: Vec<_> = attributes.keys().collect();
    names.sort();
    for name in names {
        // Internal attributes recorded by the parser
        if name.starts_with('_') {
            continue;
        }
        match schemas.get(name) {
            Some(schema) => {
                if let Err(e) = schema.validate_value(&attributes[name]) {
                    errors.push(e);
                }
            }
            None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
        }
    }

    errors
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    /// Data sources are read-only
    pub data_source: bool,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            data_source: false,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn as_data_source(mut self) -> Self {
        self.data_source = true;
        self
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let errors = validate_attributes(&self.attributes, attributes);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in schema defaults for attributes the configuration left unset
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for schema in self.attributes.values() {
            if let Some(default) = &schema.default
                && !attributes.contains_key(&schema.name)
            {
                attributes.insert(schema.name.clone(), default.clone());
            }
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Ok(())
                }
            },
        }
    }

    /// Map of string to string, as used for tags
    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_block() -> BlockSchema {
        BlockSchema::new()
            .attribute(AttributeSchema::new("string_value", AttributeType::String))
            .attribute(AttributeSchema::new("long_value", AttributeType::Int))
            .exactly_one_of(&["string_value", "long_value"])
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn float_accepts_integers() {
        let t = AttributeType::Float;
        assert!(t.validate(&Value::Float(1.5)).is_ok());
        assert!(t.validate(&Value::Int(2)).is_ok());
        assert!(t.validate(&Value::Bool(true)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["ALL_RULES".to_string(), "DEFAULT_VARIATION".to_string()]);
        assert!(t.validate(&Value::String("ALL_RULES".to_string())).is_ok());
        assert!(t.validate(&Value::String("SOME_RULES".to_string())).is_err());
    }

    #[test]
    fn references_are_not_type_checked() {
        let t = AttributeType::Int;
        assert!(
            t.validate(&Value::ResourceRef("project".to_string(), "arn".to_string()))
                .is_ok()
        );
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn block_requires_exactly_one_of() {
        let t = AttributeType::Block(value_block());

        let one = HashMap::from([("string_value".to_string(), Value::from("x"))]);
        assert!(t.validate(&Value::Map(one)).is_ok());

        let none = HashMap::new();
        assert!(matches!(
            t.validate(&Value::Map(none)),
            Err(TypeError::ExactlyOneOf { got: 0, .. })
        ));

        let two = HashMap::from([
            ("string_value".to_string(), Value::from("x")),
            ("long_value".to_string(), Value::Int(1)),
        ]);
        assert!(t.validate(&Value::Map(two)).is_err());
    }

    #[test]
    fn block_rejects_unknown_attribute() {
        let t = AttributeType::Block(value_block());
        let attrs = HashMap::from([
            ("string_value".to_string(), Value::from("x")),
            ("text_value".to_string(), Value::from("y")),
        ]);
        assert!(matches!(
            t.validate(&Value::Map(attrs)),
            Err(TypeError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::String("my-resource".to_string()));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));
        attrs.insert("_binding".to_string(), Value::String("r".to_string()));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("feature")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let errors = schema.validate(&HashMap::new()).unwrap_err();
        assert!(matches!(errors[0], TypeError::MissingRequired { .. }));
    }

    #[test]
    fn computed_attribute_cannot_be_set() {
        let schema = ResourceSchema::new("feature")
            .attribute(AttributeSchema::new("arn", AttributeType::String).computed());

        let attrs = HashMap::from([("arn".to_string(), Value::from("arn:aws:x"))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::ComputedAttribute { .. }));
    }

    #[test]
    fn item_limits_are_enforced() {
        let schema = ResourceSchema::new("feature").attribute(
            AttributeSchema::new(
                "variations",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .with_item_limits(1, 2),
        );

        let attrs = HashMap::from([("variations".to_string(), Value::List(vec![]))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::ItemCount { got: 0, .. }));
    }

    #[test]
    fn apply_defaults_fills_unset_attributes() {
        let schema = ResourceSchema::new("feature").attribute(
            AttributeSchema::new("evaluation_strategy", AttributeType::String)
                .with_default(Value::from("ALL_RULES")),
        );

        let mut attrs = HashMap::new();
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("evaluation_strategy"), Some(&Value::from("ALL_RULES")));

        let mut attrs = HashMap::from([(
            "evaluation_strategy".to_string(),
            Value::from("DEFAULT_VARIATION"),
        )]);
        schema.apply_defaults(&mut attrs);
        assert_eq!(
            attrs.get("evaluation_strategy"),
            Some(&Value::from("DEFAULT_VARIATION"))
        );
    }
}
