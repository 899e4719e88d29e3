//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in DSL with the "current state" fetched
//! from the Provider, and generates a list of required Effects (Plan).

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resolver::sort_resources_by_dependencies;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Data source -> read on every run
    Read(Resource),
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> delete and create again
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete { id: ResourceId, identifier: String },
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_) | Diff::Read(_))
    }
}

/// Compare desired state with current state to compute a Diff
///
/// With a schema, defaults are applied before comparing and attribute types
/// decide how values compare (sets ignore order).
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    let mut desired = desired.clone();
    if let Some(schema) = schema {
        schema.apply_defaults(&mut desired.attributes);
    }

    if desired.is_data_source() {
        return Diff::Read(desired);
    }

    if !current.exists {
        return Diff::Create(desired);
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| {
        changed
            .iter()
            .any(|name| s.attributes.get(name).is_some_and(|a| a.force_new))
    });

    let id = desired.id.clone();
    let from = current.clone();
    if replace {
        Diff::Replace {
            id,
            from,
            to: desired,
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id,
            from,
            to: desired,
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }

        let attr_type = schema
            .and_then(|s| s.attributes.get(key))
            .map(|a| &a.attr_type);

        let same = match current.get(key) {
            Some(current_value) => values_equal(desired_value, current_value, attr_type),
            None => desired_value.is_empty_collection(),
        };
        if !same {
            changed.push(key.clone());
        }
    }

    // Optional attributes removed from configuration but still set remotely
    if let Some(schema) = schema {
        for (key, attr) in &schema.attributes {
            if attr.computed || desired.contains_key(key) {
                continue;
            }
            if let Some(current_value) = current.get(key)
                && !current_value.is_empty_collection()
            {
                changed.push(key.clone());
            }
        }
    }

    changed.sort();
    changed
}

/// Compare a desired value with a current one
///
/// Integers and floats compare numerically, empty collections equal an absent
/// map entry, and `Set` attributes compare without regard to order.
pub fn values_equal(desired: &Value, current: &Value, attr_type: Option<&AttributeType>) -> bool {
    let attr_type = attr_type.map(base_type);

    match (desired, current) {
        // Not known until apply
        (Value::ResourceRef(..), _) => false,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::List(a), Value::List(b)) => {
            let element_type = match attr_type {
                Some(AttributeType::List(inner) | AttributeType::Set(inner)) => Some(&**inner),
                _ => None,
            };
            if a.len() != b.len() {
                return false;
            }
            if attr_type.is_some_and(AttributeType::is_unordered) {
                unordered_equal(a, b, element_type)
            } else {
                a.iter()
                    .zip(b)
                    .all(|(x, y)| values_equal(x, y, element_type))
            }
        }
        (Value::Map(a), Value::Map(b)) => maps_equal(a, b, attr_type),
        _ => desired == current,
    }
}

fn base_type(attr_type: &AttributeType) -> &AttributeType {
    match attr_type {
        AttributeType::Custom { base, .. } => base_type(base),
        other => other,
    }
}

fn unordered_equal(a: &[Value], b: &[Value], element_type: Option<&AttributeType>) -> bool {
    let mut used = vec![false; b.len()];
    a.iter().all(|x| {
        let found = b
            .iter()
            .enumerate()
            .find(|(i, y)| !used[*i] && values_equal(x, y, element_type));
        match found {
            Some((i, _)) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

fn maps_equal(
    a: &HashMap<String, Value>,
    b: &HashMap<String, Value>,
    attr_type: Option<&AttributeType>,
) -> bool {
    let keys: HashSet<&String> = a.keys().chain(b.keys()).collect();

    keys.into_iter().all(|key| {
        let (entry_type, computed) = match attr_type {
            Some(AttributeType::Map(inner)) => (Some(&**inner), false),
            Some(AttributeType::Block(block)) => match block.attributes.get(key) {
                Some(attr) => (Some(&attr.attr_type), attr.computed),
                None => (None, false),
            },
            _ => (None, false),
        };

        match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => values_equal(x, y, entry_type),
            (Some(x), None) => x.is_empty_collection(),
            // Nested computed attributes are filled in by the provider
            (None, Some(_)) if computed => true,
            (None, Some(y)) => y.is_empty_collection(),
            (None, None) => true,
        }
    })
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Resources are ordered so that referenced resources come first. `orphans`
/// are resources recorded in state (in creation order) with their
/// provider-side identifiers that are no longer configured; they are deleted
/// last, in reverse order.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
    orphans: &[(ResourceId, String)],
) -> Plan {
    let mut plan = Plan::new();

    for resource in sort_resources_by_dependencies(desired) {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let schema = schemas.get(&resource.id.resource_type);

        match diff(&resource, &current, schema) {
            Diff::Read(r) => plan.add(Effect::Read(r)),
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from: Box::new(from),
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from: Box::new(from),
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
            Diff::Delete { id, identifier } => plan.add(Effect::Delete { id, identifier }),
        }
    }

    let configured: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    for (id, identifier) in orphans.iter().rev() {
        if !configured.contains(id) {
            plan.add(Effect::Delete {
                id: id.clone(),
                identifier: identifier.clone(),
            });
        }
    }

    plan
}
