//! evidently.feature resource

use std::collections::{HashMap, HashSet};

use chrono::SecondsFormat;
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};

use super::api::{
    CreateFeatureInput, EVALUATION_STRATEGY_ALL_RULES, EvaluationRuleRecord, EvidentlyApi,
    FeatureRecord, STATUS_AVAILABLE, UpdateFeatureInput, VariableValue, VariationRecord,
};
use super::id::FeatureId;
use super::update_tags;
use crate::AwsProvider;
use crate::error::ApiError;
use crate::waiter::{Poll, wait_until};

/// Look up a feature by name within a project given by name or ARN
///
/// A missing feature is reported as [`ApiError::NotFound`]; every other
/// failure is returned as the API produced it.
pub async fn find_feature_with_project_name_or_arn(
    api: &dyn EvidentlyApi,
    feature_name: &str,
    project_name_or_arn: &str,
) -> Result<FeatureRecord, ApiError> {
    api.get_feature(project_name_or_arn, feature_name).await
}

const VALUE_KINDS: [&str; 4] = ["string_value", "long_value", "double_value", "bool_value"];

fn parse_variable_value(block: &HashMap<String, Value>) -> Result<VariableValue, String> {
    let set: Vec<_> = VALUE_KINDS
        .iter()
        .filter_map(|kind| block.get(*kind).map(|v| (*kind, v)))
        .collect();

    match set.as_slice() {
        [("string_value", Value::String(s))] => Ok(VariableValue::String(s.clone())),
        [("long_value", Value::Int(n))] => Ok(VariableValue::Long(*n)),
        [("double_value", Value::Float(n))] => Ok(VariableValue::Double(*n)),
        [("double_value", Value::Int(n))] => Ok(VariableValue::Double(*n as f64)),
        [("bool_value", Value::Bool(b))] => Ok(VariableValue::Bool(*b)),
        [(kind, v)] => Err(format!("{} has the wrong type: {}", kind, v)),
        _ => Err(format!(
            "a variation value needs exactly one of {}",
            VALUE_KINDS.join(", ")
        )),
    }
}

/// Variations from their attribute form
pub(crate) fn parse_variations(value: Option<&Value>) -> Result<Vec<VariationRecord>, String> {
    let Some(items) = value.and_then(Value::as_list) else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .map(|item| -> Result<VariationRecord, String> {
            let block = item.as_map().ok_or("a variation must be a block")?;
            let name = block
                .get("name")
                .and_then(Value::as_str)
                .ok_or("a variation needs a name")?;
            let value_block = block
                .get("value")
                .and_then(Value::as_list)
                .and_then(|values| values.first())
                .and_then(Value::as_map)
                .ok_or_else(|| format!("variation {} needs a value block", name))?;

            Ok(VariationRecord {
                name: name.to_string(),
                value: parse_variable_value(value_block)
                    .map_err(|e| format!("variation {}: {}", name, e))?,
            })
        })
        .collect()
}

fn flatten_variable_value(value: &VariableValue) -> Value {
    let (kind, v) = match value {
        VariableValue::String(s) => ("string_value", Value::String(s.clone())),
        VariableValue::Long(n) => ("long_value", Value::Int(*n)),
        VariableValue::Double(n) => ("double_value", Value::Float(*n)),
        VariableValue::Bool(b) => ("bool_value", Value::Bool(*b)),
    };
    Value::Map(HashMap::from([(kind.to_string(), v)]))
}

fn flatten_variations(variations: &[VariationRecord]) -> Value {
    Value::List(
        variations
            .iter()
            .map(|v| {
                Value::Map(HashMap::from([
                    ("name".to_string(), Value::String(v.name.clone())),
                    (
                        "value".to_string(),
                        Value::List(vec![flatten_variable_value(&v.value)]),
                    ),
                ]))
            })
            .collect(),
    )
}

fn flatten_evaluation_rules(rules: &[EvaluationRuleRecord]) -> Value {
    Value::List(
        rules
            .iter()
            .map(|rule| {
                let mut block =
                    HashMap::from([("type".to_string(), Value::String(rule.rule_type.clone()))]);
                if let Some(name) = &rule.name {
                    block.insert("name".to_string(), Value::String(name.clone()));
                }
                Value::Map(block)
            })
            .collect(),
    )
}

/// State attributes of a feature; `project` is the project as addressed in the ID
pub(crate) fn feature_attributes(feature: &FeatureRecord, project: &str) -> HashMap<String, Value> {
    let timestamp =
        |t: &chrono::DateTime<chrono::Utc>| Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true));

    let mut attributes = HashMap::from([
        ("arn".to_string(), Value::String(feature.arn.clone())),
        ("name".to_string(), Value::String(feature.name.clone())),
        ("project".to_string(), Value::String(project.to_string())),
        (
            "evaluation_strategy".to_string(),
            Value::String(feature.evaluation_strategy.clone()),
        ),
        (
            "entity_overrides".to_string(),
            Value::from_string_map(&feature.entity_overrides),
        ),
        (
            "evaluation_rules".to_string(),
            flatten_evaluation_rules(&feature.evaluation_rules),
        ),
        ("variations".to_string(), flatten_variations(&feature.variations)),
        ("value_type".to_string(), Value::String(feature.value_type.clone())),
        ("status".to_string(), Value::String(feature.status.clone())),
        ("created_time".to_string(), timestamp(&feature.created_time)),
        (
            "last_updated_time".to_string(),
            timestamp(&feature.last_updated_time),
        ),
        ("tags".to_string(), Value::from_string_map(&feature.tags)),
    ]);

    if let Some(description) = &feature.description {
        attributes.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(default_variation) = &feature.default_variation {
        attributes.insert(
            "default_variation".to_string(),
            Value::String(default_variation.clone()),
        );
    }

    attributes
}

/// Reject configurations whose default variation or overrides name an undeclared variation
pub(crate) fn check_feature_invariants(
    variations: &[VariationRecord],
    default_variation: Option<&str>,
    entity_overrides: &HashMap<String, String>,
) -> Result<(), String> {
    let names: HashSet<&str> = variations.iter().map(|v| v.name.as_str()).collect();

    if let Some(default) = default_variation
        && !names.contains(default)
    {
        return Err(format!(
            "default_variation {} is not one of the declared variations",
            default
        ));
    }

    let mut overrides: Vec<_> = entity_overrides.iter().collect();
    overrides.sort();
    for (entity, variation) in overrides {
        if !names.contains(variation.as_str()) {
            return Err(format!(
                "entity_overrides maps {} to {}, which is not a declared variation",
                entity, variation
            ));
        }
    }

    Ok(())
}

/// Variations to send so that `from` becomes `to`
fn variation_changes(
    from: &[VariationRecord],
    to: &[VariationRecord],
) -> (Vec<VariationRecord>, Vec<String>) {
    let add_or_update = to
        .iter()
        .filter(|v| !from.contains(v))
        .cloned()
        .collect();
    let remove = from
        .iter()
        .filter(|old| !to.iter().any(|new| new.name == old.name))
        .map(|old| old.name.clone())
        .collect();
    (add_or_update, remove)
}

fn string_map(attributes: &HashMap<String, Value>, key: &str) -> HashMap<String, String> {
    attributes
        .get(key)
        .map(Value::to_string_map)
        .unwrap_or_default()
}

fn parse_feature_id(id: &ResourceId, identifier: &str) -> ProviderResult<FeatureId> {
    FeatureId::parse(identifier).map_err(|e| {
        ProviderError::invalid_id("Invalid feature ID")
            .with_cause(e)
            .for_resource(id.clone())
    })
}

impl AwsProvider {
    async fn wait_for_feature_available(
        &self,
        feature_id: &FeatureId,
        timeout: std::time::Duration,
    ) -> ProviderResult<FeatureRecord> {
        let api = self.evidently.as_ref();
        wait_until(
            &format!("feature {} to become available", feature_id),
            timeout,
            self.config.poll_interval,
            move || async move {
                match find_feature_with_project_name_or_arn(
                    api,
                    &feature_id.feature,
                    &feature_id.project,
                )
                .await
                {
                    Ok(feature) if feature.status == STATUS_AVAILABLE => Ok(Poll::Done(feature)),
                    Ok(feature) => Ok(Poll::Pending(feature.status)),
                    Err(e) => Err(e.into_provider_error(format!(
                        "Failed to read feature {}",
                        feature_id
                    ))),
                }
            },
        )
        .await
    }

    /// Read a feature by its composite ID
    pub(crate) async fn read_evidently_feature(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let feature_id = parse_feature_id(id, identifier)?;

        match find_feature_with_project_name_or_arn(
            self.evidently.as_ref(),
            &feature_id.feature,
            &feature_id.project,
        )
        .await
        {
            Ok(feature) => Ok(State::existing(
                id.clone(),
                feature_attributes(&feature, &feature_id.project),
            )
            .with_identifier(identifier)),
            Err(e) if e.is_not_found() => {
                log::warn!("Evidently feature ({}) not found", identifier);
                Ok(State::not_found(id.clone()))
            }
            Err(e) => Err(e
                .into_provider_error(format!("Failed to read feature {}", identifier))
                .for_resource(id.clone())),
        }
    }

    /// Create a feature and wait until it is available
    pub(crate) async fn create_evidently_feature(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let (Some(name), Some(project)) = (resource.get_str("name"), resource.get_str("project"))
        else {
            return Err(ProviderError::validation("name and project are required").for_resource(id));
        };

        let variations = parse_variations(resource.attributes.get("variations"))
            .map_err(|e| ProviderError::validation(e).for_resource(id.clone()))?;
        let default_variation = resource.get_str("default_variation").map(str::to_string);
        let entity_overrides = string_map(&resource.attributes, "entity_overrides");
        check_feature_invariants(&variations, default_variation.as_deref(), &entity_overrides)
            .map_err(|e| ProviderError::validation(e).for_resource(id.clone()))?;

        let input = CreateFeatureInput {
            project: project.to_string(),
            name: name.to_string(),
            description: resource.get_str("description").map(str::to_string),
            default_variation,
            evaluation_strategy: resource.get_str("evaluation_strategy").map(str::to_string),
            entity_overrides,
            variations,
            tags: string_map(&resource.attributes, "tags"),
        };

        self.evidently
            .create_feature(input)
            .await
            .map_err(|e| {
                e.into_provider_error(format!("Failed to create feature {}", name))
                    .for_resource(id.clone())
            })?;

        let feature_id = FeatureId::new(name, project);
        log::info!("created Evidently feature {}", feature_id);
        self.wait_for_feature_available(&feature_id, self.config.create_timeout)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;

        self.read_evidently_feature(&id, &feature_id.to_string()).await
    }

    /// Update a feature in place, sending only the fields that changed
    pub(crate) async fn update_evidently_feature(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let feature_id = parse_feature_id(id, identifier)?;
        let validation = |e: String| ProviderError::validation(e).for_resource(id.clone());

        let old_variations = parse_variations(from.attributes.get("variations")).map_err(validation)?;
        let new_variations = parse_variations(to.attributes.get("variations")).map_err(validation)?;
        let new_overrides = string_map(&to.attributes, "entity_overrides");
        check_feature_invariants(
            &new_variations,
            to.get_str("default_variation"),
            &new_overrides,
        )
        .map_err(validation)?;

        let old_str = |key: &str| from.attributes.get(key).and_then(Value::as_str);
        let mut input = UpdateFeatureInput {
            project: feature_id.project.clone(),
            feature: feature_id.feature.clone(),
            ..Default::default()
        };

        let description = to.get_str("description");
        if description != old_str("description") {
            input.description = Some(description.unwrap_or_default().to_string());
        }
        if let Some(default_variation) = to.get_str("default_variation")
            && Some(default_variation) != old_str("default_variation")
        {
            input.default_variation = Some(default_variation.to_string());
        }
        let strategy = to
            .get_str("evaluation_strategy")
            .unwrap_or(EVALUATION_STRATEGY_ALL_RULES);
        if Some(strategy) != old_str("evaluation_strategy") {
            input.evaluation_strategy = Some(strategy.to_string());
        }
        if new_overrides != string_map(&from.attributes, "entity_overrides") {
            input.entity_overrides = Some(new_overrides);
        }
        let (add_or_update, remove) = variation_changes(&old_variations, &new_variations);
        input.add_or_update_variations = add_or_update;
        input.remove_variations = remove;

        if !input.is_empty() {
            log::debug!("updating Evidently feature {}: {:?}", feature_id, input);
            self.evidently.update_feature(input).await.map_err(|e| {
                e.into_provider_error(format!("Failed to update feature {}", feature_id))
                    .for_resource(id.clone())
            })?;
            self.wait_for_feature_available(&feature_id, self.config.update_timeout)
                .await
                .map_err(|e| e.for_resource(id.clone()))?;
        }

        let old_tags = string_map(&from.attributes, "tags");
        let new_tags = string_map(&to.attributes, "tags");
        if old_tags != new_tags {
            let arn = match old_str("arn") {
                Some(arn) => arn.to_string(),
                None => {
                    find_feature_with_project_name_or_arn(
                        self.evidently.as_ref(),
                        &feature_id.feature,
                        &feature_id.project,
                    )
                    .await
                    .map_err(|e| {
                        e.into_provider_error(format!("Failed to read feature {}", feature_id))
                            .for_resource(id.clone())
                    })?
                    .arn
                }
            };
            update_tags(self.evidently.as_ref(), &arn, &old_tags, &new_tags)
                .await
                .map_err(|e| {
                    e.into_provider_error(format!("Failed to update tags of feature {}", feature_id))
                        .for_resource(id.clone())
                })?;
        }

        self.read_evidently_feature(id, identifier).await
    }

    /// Delete a feature and wait until it is gone
    pub(crate) async fn delete_evidently_feature(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let feature_id = parse_feature_id(id, identifier)?;

        match self
            .evidently
            .delete_feature(&feature_id.project, &feature_id.feature)
            .await
        {
            Ok(()) => log::info!("deleted Evidently feature {}", feature_id),
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(e
                    .into_provider_error(format!("Failed to delete feature {}", feature_id))
                    .for_resource(id.clone()));
            }
        }

        let api = self.evidently.as_ref();
        let feature_id = &feature_id;
        wait_until(
            &format!("feature {} to be deleted", feature_id),
            self.config.delete_timeout,
            self.config.poll_interval,
            move || async move {
                match find_feature_with_project_name_or_arn(
                    api,
                    &feature_id.feature,
                    &feature_id.project,
                )
                .await
                {
                    Ok(feature) => Ok(Poll::Pending(feature.status)),
                    Err(e) if e.is_not_found() => Ok(Poll::Done(())),
                    Err(e) => Err(e.into_provider_error(format!(
                        "Failed to read feature {}",
                        feature_id
                    ))),
                }
            },
        )
        .await
        .map_err(|e| e.for_resource(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variation_value(name: &str, kind: &str, value: Value) -> Value {
        Value::Map(HashMap::from([
            ("name".to_string(), Value::from(name)),
            (
                "value".to_string(),
                Value::List(vec![Value::Map(HashMap::from([(kind.to_string(), value)]))]),
            ),
        ]))
    }

    fn string_variation(name: &str, value: &str) -> VariationRecord {
        VariationRecord {
            name: name.to_string(),
            value: VariableValue::String(value.to_string()),
        }
    }

    #[test]
    fn parses_each_value_kind() {
        let value = Value::List(vec![
            variation_value("s", "string_value", Value::from("x")),
            variation_value("l", "long_value", Value::Int(7)),
            variation_value("d", "double_value", Value::Int(2)),
            variation_value("b", "bool_value", Value::Bool(true)),
        ]);

        let variations = parse_variations(Some(&value)).unwrap();
        let values: Vec<_> = variations.into_iter().map(|v| v.value).collect();
        assert_eq!(
            values,
            vec![
                VariableValue::String("x".to_string()),
                VariableValue::Long(7),
                VariableValue::Double(2.0),
                VariableValue::Bool(true),
            ]
        );
    }

    #[test]
    fn rejects_mistyped_value() {
        let value = Value::List(vec![variation_value(
            "l",
            "long_value",
            Value::from("seven"),
        )]);
        let err = parse_variations(Some(&value)).unwrap_err();
        assert!(err.contains("long_value"));
    }

    #[test]
    fn flattened_variations_parse_back() {
        let variations = vec![
            string_variation("Variation1", "a"),
            VariationRecord {
                name: "Variation2".to_string(),
                value: VariableValue::Double(1.5),
            },
        ];
        let parsed = parse_variations(Some(&flatten_variations(&variations))).unwrap();
        assert_eq!(parsed, variations);
    }

    #[test]
    fn invariants_require_declared_variations() {
        let variations = vec![string_variation("Variation1", "a")];
        assert!(check_feature_invariants(&variations, Some("Variation1"), &HashMap::new()).is_ok());
        assert!(check_feature_invariants(&variations, None, &HashMap::new()).is_ok());

        let err = check_feature_invariants(&variations, Some("Variation2"), &HashMap::new())
            .unwrap_err();
        assert!(err.contains("default_variation"));

        let overrides = HashMap::from([("test1".to_string(), "Variation2".to_string())]);
        let err = check_feature_invariants(&variations, None, &overrides).unwrap_err();
        assert!(err.contains("test1"));
    }

    #[test]
    fn variation_changes_split_into_upserts_and_removals() {
        let from = vec![string_variation("A", "1"), string_variation("B", "2")];
        let to = vec![string_variation("B", "3"), string_variation("C", "4")];

        let (add_or_update, remove) = variation_changes(&from, &to);
        assert_eq!(
            add_or_update,
            vec![string_variation("B", "3"), string_variation("C", "4")]
        );
        assert_eq!(remove, vec!["A".to_string()]);

        let (add_or_update, remove) = variation_changes(&from, &from);
        assert!(add_or_update.is_empty());
        assert!(remove.is_empty());
    }

    #[test]
    fn state_uses_project_from_id() {
        let now = chrono::Utc::now();
        let feature = FeatureRecord {
            arn: "arn:aws:evidently:us-east-1:123456789012:project/p/feature/f".to_string(),
            name: "f".to_string(),
            project: "arn:aws:evidently:us-east-1:123456789012:project/p".to_string(),
            description: None,
            default_variation: Some("A".to_string()),
            evaluation_strategy: "ALL_RULES".to_string(),
            entity_overrides: HashMap::new(),
            evaluation_rules: vec![],
            variations: vec![string_variation("A", "1")],
            value_type: "STRING".to_string(),
            status: "AVAILABLE".to_string(),
            created_time: now,
            last_updated_time: now,
            tags: HashMap::new(),
        };

        let attributes = feature_attributes(&feature, "p");
        assert_eq!(attributes["project"], Value::from("p"));
        assert_eq!(attributes["entity_overrides"], Value::Map(HashMap::new()));
        assert!(!attributes.contains_key("description"));
    }
}
