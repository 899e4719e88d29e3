//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resolver::{BindingMap, resolve_resource};
use crate::resource::{Resource, ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Replace succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { id: ResourceId, reason: String },
}

impl EffectOutcome {
    /// State produced by the Effect, if any
    pub fn state(&self) -> Option<&State> {
        match self {
            EffectOutcome::Read { state }
            | EffectOutcome::Created { state }
            | EffectOutcome::Updated { state }
            | EffectOutcome::Replaced { state } => Some(state),
            EffectOutcome::Deleted { .. } | EffectOutcome::Skipped { .. } => None,
        }
    }
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    /// One entry per executed Effect, in plan order
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }

    /// First failure, if any
    pub fn first_error(&self) -> Option<&ProviderError> {
        self.outcomes.iter().find_map(|o| o.as_ref().err())
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    ///
    /// `current_states` seeds reference resolution; references to resources
    /// created earlier in the same run are resolved from their new state.
    pub async fn apply(
        &self,
        plan: &Plan,
        current_states: &HashMap<ResourceId, State>,
    ) -> ApplyResult {
        let mut bindings: BindingMap = current_states
            .values()
            .filter(|s| s.exists)
            .map(|s| (s.id.name.clone(), s.attributes.clone()))
            .collect();

        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let result = self.execute_effect(effect, &bindings).await;

            match &result {
                Ok(outcome) => {
                    success_count += 1;
                    if let Some(state) = outcome.state()
                        && let Some(binding) = effect_binding(effect)
                    {
                        bindings.insert(binding.to_string(), state.attributes.clone());
                    }
                }
                Err(e) => {
                    failure_count += 1;
                    warn!("{} failed: {}", effect, e);
                }
            }

            let failed = result.is_err();
            outcomes.push(result);
            if failed && !self.config.continue_on_error {
                break;
            }
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &BindingMap,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                id: effect.resource_id().clone(),
                reason: "dry-run mode".to_string(),
            });
        }

        info!("{}", effect);

        match effect {
            Effect::Read(resource) => {
                let resource = resolved(resource, bindings)?;
                let state = self.provider.read(&resource, None).await?;
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let resource = resolved(resource, bindings)?;
                let state = self.provider.create(&resource).await?;
                debug!("created {} as {:?}", resource.id, state.identifier);
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let to = resolved(to, bindings)?;
                let identifier = identifier_of(id, from)?;
                let state = self.provider.update(id, identifier, from, &to).await?;
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                let to = resolved(to, bindings)?;
                let identifier = identifier_of(id, from)?;
                self.provider.delete(id, identifier).await?;
                let state = self.provider.create(&to).await?;
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { id, identifier } => {
                match self.provider.delete(id, identifier).await {
                    Ok(()) => {}
                    // Already gone
                    Err(e) if e.is_not_found() => debug!("{} was already deleted", id),
                    Err(e) => return Err(e),
                }
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }
}

fn effect_binding(effect: &Effect) -> Option<&str> {
    match effect {
        Effect::Read(r) | Effect::Create(r) => r.binding(),
        Effect::Update { to, .. } | Effect::Replace { to, .. } => to.binding(),
        Effect::Delete { .. } => None,
    }
}

fn identifier_of<'a>(id: &ResourceId, from: &'a State) -> ProviderResult<&'a str> {
    from.identifier.as_deref().ok_or_else(|| {
        ProviderError::invalid_id("No identifier recorded for resource").for_resource(id.clone())
    })
}

/// Resolve references left for apply time; fails if any are still unknown
fn resolved(resource: &Resource, bindings: &BindingMap) -> ProviderResult<Resource> {
    let mut resource = resource.clone();
    resolve_resource(&mut resource, bindings);

    let mut unresolved: Vec<_> = resource
        .attributes
        .iter()
        .filter(|(_, v)| v.has_unresolved_ref())
        .map(|(k, _)| k.as_str())
        .collect();
    if !unresolved.is_empty() {
        unresolved.sort();
        return Err(ProviderError::validation(format!(
            "Unresolved reference in attribute(s): {}",
            unresolved.join(", ")
        ))
        .for_resource(resource.id.clone()));
    }

    Ok(resource)
}
