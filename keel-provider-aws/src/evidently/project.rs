//! evidently.project resource

use std::collections::HashMap;

use chrono::SecondsFormat;
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};

use super::api::{CreateProjectInput, ProjectRecord};
use super::update_tags;
use crate::AwsProvider;

fn project_attributes(project: &ProjectRecord) -> HashMap<String, Value> {
    let mut attributes = HashMap::from([
        ("arn".to_string(), Value::String(project.arn.clone())),
        ("name".to_string(), Value::String(project.name.clone())),
        ("status".to_string(), Value::String(project.status.clone())),
        ("feature_count".to_string(), Value::Int(project.feature_count)),
        (
            "created_time".to_string(),
            Value::String(project.created_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ),
        (
            "last_updated_time".to_string(),
            Value::String(
                project
                    .last_updated_time
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
        ),
        ("tags".to_string(), Value::from_string_map(&project.tags)),
    ]);
    if let Some(description) = &project.description {
        attributes.insert("description".to_string(), Value::String(description.clone()));
    }
    attributes
}

impl AwsProvider {
    /// Read a project by name
    pub(crate) async fn read_evidently_project(
        &self,
        id: &ResourceId,
        name: &str,
    ) -> ProviderResult<State> {
        match self.evidently.get_project(name).await {
            Ok(project) => {
                Ok(State::existing(id.clone(), project_attributes(&project)).with_identifier(name))
            }
            Err(e) if e.is_not_found() => Ok(State::not_found(id.clone())),
            Err(e) => Err(e
                .into_provider_error(format!("Failed to read project {}", name))
                .for_resource(id.clone())),
        }
    }

    pub(crate) async fn create_evidently_project(&self, resource: &Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let Some(name) = resource.get_str("name") else {
            return Err(ProviderError::validation("name is required").for_resource(id));
        };

        let input = CreateProjectInput {
            name: name.to_string(),
            description: resource.get_str("description").map(str::to_string),
            tags: resource
                .attributes
                .get("tags")
                .map(Value::to_string_map)
                .unwrap_or_default(),
        };
        self.evidently.create_project(input).await.map_err(|e| {
            e.into_provider_error(format!("Failed to create project {}", name))
                .for_resource(id.clone())
        })?;
        log::info!("created Evidently project {}", name);

        self.read_evidently_project(&id, name).await
    }

    pub(crate) async fn update_evidently_project(
        &self,
        id: &ResourceId,
        name: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let old_description = from.attributes.get("description").and_then(Value::as_str);
        let description = to.get_str("description");
        if description != old_description {
            self.evidently
                .update_project(name, Some(description.unwrap_or_default().to_string()))
                .await
                .map_err(|e| {
                    e.into_provider_error(format!("Failed to update project {}", name))
                        .for_resource(id.clone())
                })?;
        }

        let tags = |attributes: &HashMap<String, Value>| {
            attributes
                .get("tags")
                .map(Value::to_string_map)
                .unwrap_or_default()
        };
        let (old_tags, new_tags) = (tags(&from.attributes), tags(&to.attributes));
        if old_tags != new_tags {
            let arn = match from.attributes.get("arn").and_then(Value::as_str) {
                Some(arn) => arn.to_string(),
                None => {
                    self.evidently
                        .get_project(name)
                        .await
                        .map_err(|e| {
                            e.into_provider_error(format!("Failed to read project {}", name))
                                .for_resource(id.clone())
                        })?
                        .arn
                }
            };
            update_tags(self.evidently.as_ref(), &arn, &old_tags, &new_tags)
                .await
                .map_err(|e| {
                    e.into_provider_error(format!("Failed to update tags of project {}", name))
                        .for_resource(id.clone())
                })?;
        }

        self.read_evidently_project(id, name).await
    }

    pub(crate) async fn delete_evidently_project(
        &self,
        id: &ResourceId,
        name: &str,
    ) -> ProviderResult<()> {
        match self.evidently.delete_project(name).await {
            Ok(()) => {
                log::info!("deleted Evidently project {}", name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e
                .into_provider_error(format!("Failed to delete project {}", name))
                .for_resource(id.clone())),
        }
    }
}
