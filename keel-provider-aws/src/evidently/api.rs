//! Evidently API seam
//!
//! Resource code talks to Evidently through [`EvidentlyApi`] using the plain
//! records below, so the same operations run against the SDK or the
//! in-memory backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ApiError;

pub const STATUS_AVAILABLE: &str = "AVAILABLE";
pub const STATUS_UPDATING: &str = "UPDATING";

pub const EVALUATION_STRATEGY_ALL_RULES: &str = "ALL_RULES";
pub const EVALUATION_STRATEGY_DEFAULT_VARIATION: &str = "DEFAULT_VARIATION";

/// Typed value of a variation
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    String(String),
    Long(i64),
    Double(f64),
    Bool(bool),
}

impl VariableValue {
    /// Evidently value type name (`STRING`, `LONG`, `DOUBLE`, `BOOLEAN`)
    pub fn value_type(&self) -> &'static str {
        match self {
            VariableValue::String(_) => "STRING",
            VariableValue::Long(_) => "LONG",
            VariableValue::Double(_) => "DOUBLE",
            VariableValue::Bool(_) => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariationRecord {
    pub name: String,
    pub value: VariableValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRuleRecord {
    pub name: Option<String>,
    pub rule_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub arn: String,
    pub name: String,
    /// Project ARN
    pub project: String,
    pub description: Option<String>,
    pub default_variation: Option<String>,
    pub evaluation_strategy: String,
    pub entity_overrides: HashMap<String, String>,
    pub evaluation_rules: Vec<EvaluationRuleRecord>,
    pub variations: Vec<VariationRecord>,
    pub value_type: String,
    pub status: String,
    pub created_time: DateTime<Utc>,
    pub last_updated_time: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateFeatureInput {
    /// Project name or ARN
    pub project: String,
    pub name: String,
    pub description: Option<String>,
    pub default_variation: Option<String>,
    pub evaluation_strategy: Option<String>,
    pub entity_overrides: HashMap<String, String>,
    pub variations: Vec<VariationRecord>,
    pub tags: HashMap<String, String>,
}

/// Changes to a feature; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateFeatureInput {
    pub project: String,
    pub feature: String,
    pub description: Option<String>,
    pub default_variation: Option<String>,
    pub evaluation_strategy: Option<String>,
    pub entity_overrides: Option<HashMap<String, String>>,
    pub add_or_update_variations: Vec<VariationRecord>,
    pub remove_variations: Vec<String>,
}

impl UpdateFeatureInput {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.default_variation.is_none()
            && self.evaluation_strategy.is_none()
            && self.entity_overrides.is_none()
            && self.add_or_update_variations.is_empty()
            && self.remove_variations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub arn: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub feature_count: i64,
    pub created_time: DateTime<Utc>,
    pub last_updated_time: DateTime<Utc>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateProjectInput {
    pub name: String,
    pub description: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Operations the provider needs from CloudWatch Evidently
#[async_trait]
pub trait EvidentlyApi: Send + Sync {
    async fn create_project(&self, input: CreateProjectInput) -> Result<ProjectRecord, ApiError>;

    /// `project` is a project name or ARN
    async fn get_project(&self, project: &str) -> Result<ProjectRecord, ApiError>;

    async fn update_project(
        &self,
        project: &str,
        description: Option<String>,
    ) -> Result<ProjectRecord, ApiError>;

    async fn delete_project(&self, project: &str) -> Result<(), ApiError>;

    async fn create_feature(&self, input: CreateFeatureInput) -> Result<FeatureRecord, ApiError>;

    async fn get_feature(&self, project: &str, feature: &str) -> Result<FeatureRecord, ApiError>;

    async fn update_feature(&self, input: UpdateFeatureInput) -> Result<FeatureRecord, ApiError>;

    async fn delete_feature(&self, project: &str, feature: &str) -> Result<(), ApiError>;

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> Result<(), ApiError>;

    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> Result<(), ApiError>;
}
