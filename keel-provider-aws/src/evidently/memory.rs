//! In-memory Evidently backend
//!
//! Emulates the parts of CloudWatch Evidently the provider uses, with the
//! service's validation rules, so resources can be exercised offline.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::api::{
    CreateFeatureInput, CreateProjectInput, EVALUATION_STRATEGY_ALL_RULES, EvidentlyApi,
    FeatureRecord, ProjectRecord, STATUS_AVAILABLE, STATUS_UPDATING, UpdateFeatureInput,
    VariationRecord,
};
use crate::error::ApiError;

pub const ACCOUNT_ID: &str = "123456789012";

const MAX_VARIATIONS: usize = 5;

type FeatureKey = (String, String);

/// Evidently service state keyed by project and feature name
#[derive(Debug)]
pub struct MemoryEvidently {
    region: String,
    projects: DashMap<String, ProjectRecord>,
    features: DashMap<FeatureKey, FeatureRecord>,
    /// Reads left during which a feature still reports `UPDATING`
    pending: DashMap<FeatureKey, u32>,
    settle_reads: u32,
}

impl MemoryEvidently {
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            projects: DashMap::new(),
            features: DashMap::new(),
            pending: DashMap::new(),
            settle_reads: 0,
        }
    }

    /// Report `UPDATING` for this many reads after each feature write
    #[must_use]
    pub fn with_settle_reads(mut self, reads: u32) -> Self {
        self.settle_reads = reads;
        self
    }

    /// Number of stored features across all projects
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn project_arn(&self, project: &str) -> String {
        format!(
            "arn:aws:evidently:{}:{}:project/{}",
            self.region, ACCOUNT_ID, project
        )
    }

    fn feature_arn(&self, project: &str, feature: &str) -> String {
        format!("{}/feature/{}", self.project_arn(project), feature)
    }

    /// Resolve a project name or ARN to the project name
    fn project_name(name_or_arn: &str) -> &str {
        match name_or_arn.rsplit_once(":project/") {
            Some((_, name)) if name_or_arn.starts_with("arn:") => name,
            _ => name_or_arn,
        }
    }

    fn require_project(&self, name_or_arn: &str) -> Result<String, ApiError> {
        let name = Self::project_name(name_or_arn);
        if self.projects.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(ApiError::NotFound(format!("Project {} does not exist", name)))
        }
    }

    fn mark_pending(&self, key: FeatureKey) {
        if self.settle_reads > 0 {
            self.pending.insert(key, self.settle_reads);
        }
    }
}

/// Check the variation rules Evidently enforces on a feature
fn validate_feature(feature: &mut FeatureRecord) -> Result<(), ApiError> {
    if feature.variations.is_empty() || feature.variations.len() > MAX_VARIATIONS {
        return Err(ApiError::Validation(format!(
            "A feature must have between 1 and {} variations",
            MAX_VARIATIONS
        )));
    }

    let mut names = HashSet::new();
    for variation in &feature.variations {
        if !names.insert(variation.name.as_str()) {
            return Err(ApiError::Validation(format!(
                "Duplicate variation name {}",
                variation.name
            )));
        }
    }

    let value_type = feature.variations[0].value.value_type();
    if feature
        .variations
        .iter()
        .any(|v| v.value.value_type() != value_type)
    {
        return Err(ApiError::Validation(
            "All variations of a feature must have the same value type".to_string(),
        ));
    }

    let default = feature
        .default_variation
        .get_or_insert_with(|| feature.variations[0].name.clone());
    if !names.contains(default.as_str()) {
        return Err(ApiError::Validation(format!(
            "Default variation {} is not a variation of the feature",
            default
        )));
    }

    for (entity, variation) in &feature.entity_overrides {
        if !names.contains(variation.as_str()) {
            return Err(ApiError::Validation(format!(
                "Entity override {} names unknown variation {}",
                entity, variation
            )));
        }
    }

    feature.value_type = value_type.to_string();
    Ok(())
}

fn apply_variation_changes(
    variations: &mut Vec<VariationRecord>,
    add_or_update: Vec<VariationRecord>,
    remove: &[String],
) {
    variations.retain(|v| !remove.contains(&v.name));
    for variation in add_or_update {
        match variations.iter_mut().find(|v| v.name == variation.name) {
            Some(existing) => *existing = variation,
            None => variations.push(variation),
        }
    }
}

#[async_trait]
impl EvidentlyApi for MemoryEvidently {
    async fn create_project(&self, input: CreateProjectInput) -> Result<ProjectRecord, ApiError> {
        let now = Utc::now();
        let record = ProjectRecord {
            arn: self.project_arn(&input.name),
            name: input.name.clone(),
            description: input.description,
            status: STATUS_AVAILABLE.to_string(),
            feature_count: 0,
            created_time: now,
            last_updated_time: now,
            tags: input.tags,
        };

        match self.projects.entry(input.name) {
            Entry::Occupied(e) => Err(ApiError::Conflict(format!(
                "Project {} already exists",
                e.key()
            ))),
            Entry::Vacant(e) => {
                e.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn get_project(&self, project: &str) -> Result<ProjectRecord, ApiError> {
        let name = Self::project_name(project);
        let mut record = self
            .projects
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| ApiError::NotFound(format!("Project {} does not exist", name)))?;

        record.feature_count = self
            .features
            .iter()
            .filter(|f| f.key().0 == name)
            .count() as i64;
        Ok(record)
    }

    async fn update_project(
        &self,
        project: &str,
        description: Option<String>,
    ) -> Result<ProjectRecord, ApiError> {
        let name = Self::project_name(project).to_string();
        {
            let mut record = self
                .projects
                .get_mut(&name)
                .ok_or_else(|| ApiError::NotFound(format!("Project {} does not exist", name)))?;
            if let Some(description) = description {
                record.description = (!description.is_empty()).then_some(description);
            }
            record.last_updated_time = Utc::now();
        }
        self.get_project(&name).await
    }

    async fn delete_project(&self, project: &str) -> Result<(), ApiError> {
        let name = Self::project_name(project);
        if self.features.iter().any(|f| f.key().0 == name) {
            return Err(ApiError::Conflict(format!(
                "Project {} still contains features",
                name
            )));
        }
        self.projects
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Project {} does not exist", name)))
    }

    async fn create_feature(&self, input: CreateFeatureInput) -> Result<FeatureRecord, ApiError> {
        let project = self.require_project(&input.project)?;
        let now = Utc::now();

        let mut record = FeatureRecord {
            arn: self.feature_arn(&project, &input.name),
            name: input.name.clone(),
            project: self.project_arn(&project),
            description: input.description,
            default_variation: input.default_variation,
            evaluation_strategy: input
                .evaluation_strategy
                .unwrap_or_else(|| EVALUATION_STRATEGY_ALL_RULES.to_string()),
            entity_overrides: input.entity_overrides,
            evaluation_rules: Vec::new(),
            variations: input.variations,
            value_type: String::new(),
            status: STATUS_AVAILABLE.to_string(),
            created_time: now,
            last_updated_time: now,
            tags: input.tags,
        };
        validate_feature(&mut record)?;

        let key = (project, input.name);
        match self.features.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(ApiError::Conflict(format!(
                    "Feature {} already exists in project {}",
                    key.1, key.0
                )));
            }
            Entry::Vacant(e) => {
                e.insert(record.clone());
            }
        }
        self.mark_pending(key);
        Ok(record)
    }

    async fn get_feature(&self, project: &str, feature: &str) -> Result<FeatureRecord, ApiError> {
        let key = (
            Self::project_name(project).to_string(),
            feature.to_string(),
        );
        let mut record = self
            .features
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or_else(|| {
                ApiError::NotFound(format!("Feature {} does not exist in project {}", key.1, key.0))
            })?;

        if let Some(mut reads) = self.pending.get_mut(&key) {
            record.status = STATUS_UPDATING.to_string();
            *reads -= 1;
            let settled = *reads == 0;
            drop(reads);
            if settled {
                self.pending.remove(&key);
            }
        }

        Ok(record)
    }

    async fn update_feature(&self, input: UpdateFeatureInput) -> Result<FeatureRecord, ApiError> {
        let key = (
            Self::project_name(&input.project).to_string(),
            input.feature.clone(),
        );

        let record = {
            let mut entry = self.features.get_mut(&key).ok_or_else(|| {
                ApiError::NotFound(format!("Feature {} does not exist in project {}", key.1, key.0))
            })?;

            // Validate a copy so a rejected update leaves the feature unchanged
            let mut updated = entry.value().clone();
            if let Some(description) = input.description {
                updated.description = (!description.is_empty()).then_some(description);
            }
            if let Some(default_variation) = input.default_variation {
                updated.default_variation = Some(default_variation);
            }
            if let Some(strategy) = input.evaluation_strategy {
                updated.evaluation_strategy = strategy;
            }
            if let Some(overrides) = input.entity_overrides {
                updated.entity_overrides = overrides;
            }
            apply_variation_changes(
                &mut updated.variations,
                input.add_or_update_variations,
                &input.remove_variations,
            );
            validate_feature(&mut updated)?;
            updated.last_updated_time = Utc::now();

            *entry = updated.clone();
            updated
        };

        self.mark_pending(key);
        Ok(record)
    }

    async fn delete_feature(&self, project: &str, feature: &str) -> Result<(), ApiError> {
        let key = (
            Self::project_name(project).to_string(),
            feature.to_string(),
        );
        self.pending.remove(&key);
        self.features.remove(&key).map(|_| ()).ok_or_else(|| {
            ApiError::NotFound(format!("Feature {} does not exist in project {}", key.1, key.0))
        })
    }

    async fn tag_resource(&self, arn: &str, tags: HashMap<String, String>) -> Result<(), ApiError> {
        if let Some(mut feature) = self.features.iter_mut().find(|f| f.arn == arn) {
            feature.tags.extend(tags);
            return Ok(());
        }
        if let Some(mut project) = self.projects.iter_mut().find(|p| p.arn == arn) {
            project.tags.extend(tags);
            return Ok(());
        }
        Err(ApiError::NotFound(format!("Resource {} does not exist", arn)))
    }

    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> Result<(), ApiError> {
        if let Some(mut feature) = self.features.iter_mut().find(|f| f.arn == arn) {
            feature.tags.retain(|k, _| !keys.contains(k));
            return Ok(());
        }
        if let Some(mut project) = self.projects.iter_mut().find(|p| p.arn == arn) {
            project.tags.retain(|k, _| !keys.contains(k));
            return Ok(());
        }
        Err(ApiError::NotFound(format!("Resource {} does not exist", arn)))
    }
}
