//! Acceptance test harness
//!
//! Runs configuration text through parse, plan and apply against an
//! [`AwsProvider`], then checks the resulting state the way a user would see
//! it. Steps within a case run in order; cases isolate themselves with
//! random names so they can run concurrently.
//!
//! Cases run against live AWS when `KEEL_ACC` is set and against the
//! in-memory backends otherwise.

use std::collections::{BTreeMap, HashMap};

use keel_core::differ::create_plan;
use keel_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use keel_core::parser::{ParseError, parse_and_resolve};
use keel_core::plan::Plan;
use keel_core::provider::{BoxFuture, Provider, ProviderError};
use keel_core::resolver::resolve_refs_with_state;
use keel_core::resource::{Resource, ResourceId, State, Value};
use keel_core::schema::ResourceSchema;
use regex::Regex;

use crate::AwsProvider;
use crate::config::AwsConfig;

pub const ACC_ENV: &str = "KEEL_ACC";
pub const RESOURCE_PREFIX: &str = "keel-acc-test";

#[derive(Debug, thiserror::Error)]
pub enum AccError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid configuration for {address}: {message}")]
    Schema { address: String, message: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("step {step}: {message}")]
    Step { step: usize, message: String },

    #[error("{0}")]
    Check(String),
}

/// Custom check run against the provider and the state after a step
pub type CheckFn = for<'a> fn(&'a AwsProvider, &'a AccState) -> BoxFuture<'a, Result<(), AccError>>;

/// Assertion on the state produced by a config step
pub enum Check {
    /// Flattened attribute equals a value; a missing `.#`/`.%` count reads as "0"
    Attr {
        address: String,
        key: String,
        value: String,
    },
    /// Flattened attribute is present and non-empty
    AttrSet { address: String, key: String },
    /// ARN in the provider's region whose resource part is `resource`
    RegionalArn {
        address: String,
        key: String,
        service: String,
        resource: String,
    },
    /// Some element of a list/set block matches every nested key
    SetElemNestedAttrs {
        address: String,
        key: String,
        values: Vec<(String, String)>,
    },
    /// Delete the resource out of band
    Disappears(String),
    Func(CheckFn),
}

impl Check {
    pub fn attr(address: &str, key: &str, value: impl Into<String>) -> Self {
        Check::Attr {
            address: address.to_string(),
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn attr_set(address: &str, key: &str) -> Self {
        Check::AttrSet {
            address: address.to_string(),
            key: key.to_string(),
        }
    }

    pub fn regional_arn(address: &str, key: &str, service: &str, resource: impl Into<String>) -> Self {
        Check::RegionalArn {
            address: address.to_string(),
            key: key.to_string(),
            service: service.to_string(),
            resource: resource.into(),
        }
    }

    /// `key` names the collection followed by `.*`, e.g. `variations.*`
    pub fn set_elem_nested_attrs(address: &str, key: &str, values: &[(&str, &str)]) -> Self {
        Check::SetElemNestedAttrs {
            address: address.to_string(),
            key: key.trim_end_matches(".*").to_string(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn disappears(address: &str) -> Self {
        Check::Disappears(address.to_string())
    }
}

pub enum TestStep {
    /// Apply a configuration and check the result
    Config {
        config: String,
        checks: Vec<Check>,
        /// A refresh after the checks is expected to show pending changes
        expect_non_empty_plan: bool,
    },
    /// Import a resource by the identifier in state
    Import {
        address: String,
        /// Compare the imported attributes with the ones in state
        verify: bool,
        /// Flattened keys (or key prefixes) left out of the comparison
        ignore: Vec<String>,
    },
}

impl TestStep {
    pub fn config(config: String, checks: Vec<Check>) -> Self {
        TestStep::Config {
            config,
            checks,
            expect_non_empty_plan: false,
        }
    }

    pub fn import_verify(address: &str) -> Self {
        TestStep::Import {
            address: address.to_string(),
            verify: true,
            ignore: Vec::new(),
        }
    }
}

/// Resources the harness manages, in creation order
#[derive(Debug, Default, Clone)]
pub struct AccState {
    order: Vec<ResourceId>,
    states: HashMap<ResourceId, State>,
    resources: HashMap<ResourceId, Resource>,
}

impl AccState {
    pub fn get(&self, address: &str) -> Option<&State> {
        let id = ResourceId::parse_address(address)?;
        self.states.get(&id)
    }

    /// States of one resource type, in creation order
    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a State> + 'a {
        self.order
            .iter()
            .filter(move |id| id.resource_type == resource_type)
            .filter_map(move |id| self.states.get(id))
    }

    pub fn flatmap(&self, address: &str) -> Option<BTreeMap<String, String>> {
        self.get(address).map(|s| flatten_attributes(&s.attributes))
    }

    fn put(&mut self, state: State) {
        if !self.order.contains(&state.id) {
            self.order.push(state.id.clone());
        }
        self.states.insert(state.id.clone(), state);
    }

    fn remove(&mut self, id: &ResourceId) {
        self.order.retain(|o| o != id);
        self.states.remove(id);
    }

    /// Configured resource for `id`, or a bare one to read by identifier
    fn resource(&self, id: &ResourceId) -> Resource {
        self.resources
            .get(id)
            .cloned()
            .unwrap_or_else(|| Resource::new(id.resource_type.clone(), id.name.clone()))
    }

    fn managed(&self) -> Vec<(ResourceId, String)> {
        self.order
            .iter()
            .filter_map(|id| {
                let state = self.states.get(id)?;
                let identifier = state.identifier.clone()?;
                (state.exists && !self.resources.get(id).is_some_and(Resource::is_data_source))
                    .then_some((id.clone(), identifier))
            })
            .collect()
    }
}

/// Flatten attributes into `key.N.sub` / `key.#` / `key.%` form
pub fn flatten_attributes(attributes: &HashMap<String, Value>) -> BTreeMap<String, String> {
    let mut flat = BTreeMap::new();
    for (key, value) in attributes {
        flatten_value(key, value, false, &mut flat);
    }
    flat
}

fn flatten_value(prefix: &str, value: &Value, in_list: bool, flat: &mut BTreeMap<String, String>) {
    match value {
        Value::String(s) => {
            flat.insert(prefix.to_string(), s.clone());
        }
        Value::Int(n) => {
            flat.insert(prefix.to_string(), n.to_string());
        }
        Value::Float(n) => {
            flat.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            flat.insert(prefix.to_string(), b.to_string());
        }
        Value::List(items) => {
            flat.insert(format!("{}.#", prefix), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                flatten_value(&format!("{}.{}", prefix, i), item, true, flat);
            }
        }
        Value::Map(map) => {
            // Blocks inside a list carry no count of their own
            if !in_list {
                flat.insert(format!("{}.%", prefix), map.len().to_string());
            }
            for (k, v) in map {
                flatten_value(&format!("{}.{}", prefix, k), v, false, flat);
            }
        }
        Value::ResourceRef(binding, attr) => {
            flat.insert(prefix.to_string(), format!("{}.{}", binding, attr));
        }
    }
}

/// Join configuration fragments into one document
pub fn config_compose(parts: &[&str]) -> String {
    parts.concat()
}

/// Random resource name starting with `prefix`
pub fn random_with_prefix(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..16])
}

/// Provider for acceptance runs: live AWS when `KEEL_ACC` is set
pub async fn acc_provider() -> AwsProvider {
    if std::env::var_os(ACC_ENV).is_some() {
        AwsProvider::new(AwsConfig::from_env()).await
    } else {
        AwsProvider::in_memory()
    }
}

pub struct TestCase {
    pub steps: Vec<TestStep>,
    /// Run after teardown against the last state seen before it
    pub check_destroy: Option<CheckFn>,
}

impl TestCase {
    /// Run every step, always tear down, then run the destroy check
    pub async fn run(self) {
        let _ = env_logger::builder().is_test(true).try_init();
        if let Err(e) = self.try_run(acc_provider().await).await {
            panic!("acceptance test failed: {}", e);
        }
    }

    pub async fn try_run(self, provider: AwsProvider) -> Result<(), AccError> {
        let schemas: HashMap<String, ResourceSchema> = provider
            .schemas()
            .into_iter()
            .map(|s| (s.resource_type.clone(), s))
            .collect();

        let mut state = AccState::default();
        let mut outcome = Ok(());
        for (i, step) in self.steps.iter().enumerate() {
            let step_number = i + 1;
            log::info!("acceptance step {}", step_number);
            outcome = run_step(&provider, &schemas, &mut state, step)
                .await
                .map_err(|e| AccError::Step {
                    step: step_number,
                    message: e.to_string(),
                });
            if outcome.is_err() {
                break;
            }
        }

        let before_destroy = state.clone();
        let destroyed = destroy(&provider, &mut state).await;

        outcome?;
        destroyed?;
        if let Some(check) = self.check_destroy {
            check(&provider, &before_destroy).await?;
        }
        Ok(())
    }
}

async fn run_step(
    provider: &AwsProvider,
    schemas: &HashMap<String, ResourceSchema>,
    state: &mut AccState,
    step: &TestStep,
) -> Result<(), AccError> {
    match step {
        TestStep::Config {
            config,
            checks,
            expect_non_empty_plan,
        } => {
            let parsed = parse_and_resolve(config)?;
            for resource in &parsed.resources {
                if let Some(schema) = schemas.get(&resource.id.resource_type) {
                    schema
                        .validate(&resource.attributes)
                        .map_err(|errors| AccError::Schema {
                            address: resource.id.to_string(),
                            message: errors
                                .iter()
                                .map(|e| e.to_string())
                                .collect::<Vec<_>>()
                                .join("; "),
                        })?;
                }
            }
            state.resources = parsed
                .resources
                .iter()
                .map(|r| (r.id.clone(), r.clone()))
                .collect();

            refresh(provider, state).await?;
            let plan = plan_for(&parsed.resources, schemas, state);
            apply(provider, state, &plan).await?;

            for check in checks {
                run_check(provider, state, check).await?;
            }

            refresh(provider, state).await?;
            let plan = plan_for(&parsed.resources, schemas, state);
            match (plan.has_changes(), *expect_non_empty_plan) {
                (true, false) => Err(AccError::Check(format!(
                    "after applying this step, the plan was not empty: {}",
                    plan.summary()
                ))),
                (false, true) => Err(AccError::Check(
                    "expected a non-empty plan, but got an empty plan".to_string(),
                )),
                _ => Ok(()),
            }
        }
        TestStep::Import {
            address,
            verify,
            ignore,
        } => {
            let current = state
                .get(address)
                .ok_or_else(|| AccError::Check(format!("Not found: {}", address)))?;
            let identifier = current
                .identifier
                .as_deref()
                .ok_or_else(|| AccError::Check(format!("No ID is set for {}", address)))?;

            let imported = provider.import(&current.id, identifier).await?;
            if !verify {
                return Ok(());
            }

            let ignored = |key: &str| ignore.iter().any(|prefix| key.starts_with(prefix.as_str()));
            let expected: BTreeMap<_, _> = flatten_attributes(&current.attributes)
                .into_iter()
                .filter(|(k, _)| !ignored(k.as_str()))
                .collect();
            let actual: BTreeMap<_, _> = flatten_attributes(&imported.attributes)
                .into_iter()
                .filter(|(k, _)| !ignored(k.as_str()))
                .collect();
            if expected != actual {
                return Err(AccError::Check(format!(
                    "ImportStateVerify attributes not equivalent for {}:\n  state:    {:?}\n  imported: {:?}",
                    address, expected, actual
                )));
            }
            Ok(())
        }
    }
}

/// Re-read every resource in state
async fn refresh(provider: &AwsProvider, state: &mut AccState) -> Result<(), AccError> {
    for id in state.order.clone() {
        let Some(current) = state.states.get(&id) else {
            continue;
        };
        let resource = state.resource(&id);
        let refreshed = provider
            .read(&resource, current.identifier.as_deref())
            .await?;
        if refreshed.exists {
            state.put(refreshed);
        } else {
            log::info!("{} no longer exists, dropping it from state", id);
            state.remove(&id);
        }
    }
    Ok(())
}

/// Plan the way the CLI does: references to computed attributes resolve against state first
fn plan_for(desired: &[Resource], schemas: &HashMap<String, ResourceSchema>, state: &AccState) -> Plan {
    let mut resources = desired.to_vec();
    resolve_refs_with_state(&mut resources, &state.states);
    create_plan(&resources, &state.states, schemas, &state.managed())
}

async fn apply(provider: &AwsProvider, state: &mut AccState, plan: &Plan) -> Result<(), AccError> {
    apply_with(provider, state, plan, InterpreterConfig::default()).await
}

async fn apply_with(
    provider: &AwsProvider,
    state: &mut AccState,
    plan: &Plan,
    config: InterpreterConfig,
) -> Result<(), AccError> {
    let interpreter = Interpreter::new(provider.clone()).with_config(config);
    let result = interpreter.apply(plan, &state.states).await;

    let mut first_error = None;
    for outcome in result.outcomes {
        match outcome {
            Ok(outcome) => match outcome.state() {
                Some(new_state) => state.put(new_state.clone()),
                None => {
                    if let EffectOutcome::Deleted { id } = &outcome {
                        state.remove(id);
                    }
                }
            },
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Delete everything still in state, newest first
async fn destroy(provider: &AwsProvider, state: &mut AccState) -> Result<(), AccError> {
    let plan = create_plan(&[], &state.states, &HashMap::new(), &state.managed());
    apply_with(
        provider,
        state,
        &plan,
        InterpreterConfig {
            continue_on_error: true,
            ..Default::default()
        },
    )
    .await
}

fn flat_for(state: &AccState, address: &str) -> Result<BTreeMap<String, String>, AccError> {
    state
        .flatmap(address)
        .ok_or_else(|| AccError::Check(format!("Not found: {}", address)))
}

async fn run_check(provider: &AwsProvider, state: &AccState, check: &Check) -> Result<(), AccError> {
    match check {
        Check::Attr {
            address,
            key,
            value,
        } => {
            let flat = flat_for(state, address)?;
            let is_count = key.ends_with(".#") || key.ends_with(".%");
            match flat.get(key) {
                Some(actual) if actual == value => Ok(()),
                None if is_count && value == "0" => Ok(()),
                actual => Err(AccError::Check(format!(
                    "{}: Attribute '{}' expected {:?}, got {:?}",
                    address, key, value, actual
                ))),
            }
        }
        Check::AttrSet { address, key } => {
            let flat = flat_for(state, address)?;
            match flat.get(key) {
                Some(v) if !v.is_empty() => Ok(()),
                _ => Err(AccError::Check(format!(
                    "{}: Attribute '{}' expected to be set",
                    address, key
                ))),
            }
        }
        Check::RegionalArn {
            address,
            key,
            service,
            resource,
        } => {
            let flat = flat_for(state, address)?;
            let pattern = format!(
                r"^arn:aws:{}:{}:\d{{12}}:{}$",
                regex::escape(service),
                regex::escape(&provider.config().region),
                regex::escape(resource)
            );
            let arn_re = Regex::new(&pattern).map_err(|e| AccError::Check(e.to_string()))?;
            match flat.get(key) {
                Some(arn) if arn_re.is_match(arn) => Ok(()),
                actual => Err(AccError::Check(format!(
                    "{}: Attribute '{}' expected an ARN matching {}, got {:?}",
                    address, key, pattern, actual
                ))),
            }
        }
        Check::SetElemNestedAttrs {
            address,
            key,
            values,
        } => {
            let flat = flat_for(state, address)?;
            let count: usize = flat
                .get(&format!("{}.#", key))
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let matched = (0..count).any(|i| {
                values.iter().all(|(k, v)| {
                    flat.get(&format!("{}.{}.{}", key, i, k))
                        .is_some_and(|actual| actual == v)
                })
            });
            if matched {
                Ok(())
            } else {
                Err(AccError::Check(format!(
                    "{}: no element of '{}' matches {:?}",
                    address, key, values
                )))
            }
        }
        Check::Disappears(address) => {
            let current = state
                .get(address)
                .ok_or_else(|| AccError::Check(format!("Not found: {}", address)))?;
            let identifier = current
                .identifier
                .as_deref()
                .ok_or_else(|| AccError::Check(format!("No ID is set for {}", address)))?;
            provider.delete(&current.id, identifier).await?;
            Ok(())
        }
        Check::Func(f) => f(provider, state).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatmap_counts_lists_and_maps() {
        let attributes = HashMap::from([
            ("name".to_string(), Value::from("f")),
            ("tags".to_string(), Value::Map(HashMap::new())),
            (
                "variations".to_string(),
                Value::List(vec![Value::Map(HashMap::from([
                    ("name".to_string(), Value::from("Variation1")),
                    (
                        "value".to_string(),
                        Value::List(vec![Value::Map(HashMap::from([(
                            "string_value".to_string(),
                            Value::from("test"),
                        )]))]),
                    ),
                ]))]),
            ),
        ]);

        let flat = flatten_attributes(&attributes);
        let expected: BTreeMap<String, String> = [
            ("name", "f"),
            ("tags.%", "0"),
            ("variations.#", "1"),
            ("variations.0.name", "Variation1"),
            ("variations.0.value.#", "1"),
            ("variations.0.value.0.string_value", "test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(flat, expected);
    }

    #[test]
    fn random_names_are_unique_and_prefixed() {
        let a = random_with_prefix(RESOURCE_PREFIX);
        let b = random_with_prefix(RESOURCE_PREFIX);
        assert_ne!(a, b);
        assert!(a.starts_with("keel-acc-test-"));
        assert!(a.len() <= 127);
    }

    #[tokio::test]
    async fn missing_count_reads_as_zero() {
        let provider = AwsProvider::in_memory();
        let mut state = AccState::default();
        state.put(State::existing(
            ResourceId::new("evidently.project", "p"),
            HashMap::from([("name".to_string(), Value::from("p"))]),
        ));

        run_check(&provider, &state, &Check::attr("evidently.project.p", "tags.%", "0"))
            .await
            .unwrap();
        assert!(
            run_check(&provider, &state, &Check::attr("evidently.project.p", "name", "q"))
                .await
                .is_err()
        );
    }
}
