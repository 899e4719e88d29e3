//! Resolver - Order resources by their references and resolve them against state

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::resource::{Resource, ResourceId, State, Value};

/// binding name -> attributes known for that binding
pub type BindingMap = HashMap<String, HashMap<String, Value>>;

/// Build a binding map from configuration, merging in attributes the
/// provider reported (like `arn`) for resources that exist
pub fn binding_map(resources: &[Resource], current_states: &HashMap<ResourceId, State>) -> BindingMap {
    let mut binding_map = BindingMap::new();

    for resource in resources {
        if let Some(binding_name) = resource.binding() {
            let mut attrs = resource.attributes.clone();

            if let Some(state) = current_states.get(&resource.id)
                && state.exists
            {
                for (k, v) in &state.attributes {
                    if !attrs.contains_key(k) {
                        attrs.insert(k.clone(), v.clone());
                    }
                }
            }

            binding_map.insert(binding_name.to_string(), attrs);
        }
    }

    binding_map
}

/// Resolve ResourceRef values in all resources using configuration and current state
pub fn resolve_refs_with_state(
    resources: &mut [Resource],
    current_states: &HashMap<ResourceId, State>,
) {
    let binding_map = binding_map(resources, current_states);

    for resource in resources.iter_mut() {
        resolve_resource(resource, &binding_map);
    }
}

/// Resolve ResourceRef values in a single resource
pub fn resolve_resource(resource: &mut Resource, binding_map: &BindingMap) {
    let resolved: HashMap<String, Value> = resource
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), resolve_ref_value(value, binding_map)))
        .collect();
    resource.attributes = resolved;
}

/// Resolve a value, keeping references whose target is not known yet
pub fn resolve_ref_value(value: &Value, binding_map: &BindingMap) -> Value {
    match value {
        Value::ResourceRef(binding_name, attr_name) => {
            if let Some(attrs) = binding_map.get(binding_name)
                && let Some(attr_value) = attrs.get(attr_name)
            {
                // Recursively resolve
                return resolve_ref_value(attr_value, binding_map);
            }
            value.clone()
        }
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| resolve_ref_value(v, binding_map))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_ref_value(v, binding_map)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Binding names a resource refers to
pub fn get_resource_dependencies(resource: &Resource) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for value in resource.attributes.values() {
        collect_dependencies(value, &mut deps);
    }
    deps
}

fn collect_dependencies(value: &Value, deps: &mut BTreeSet<String>) {
    match value {
        Value::ResourceRef(binding_name, _) => {
            deps.insert(binding_name.clone());
        }
        Value::List(items) => {
            for item in items {
                collect_dependencies(item, deps);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_dependencies(v, deps);
            }
        }
        _ => {}
    }
}

/// Sort resources topologically based on dependencies
///
/// Declaration order is kept wherever references allow it.
pub fn sort_resources_by_dependencies(resources: &[Resource]) -> Vec<Resource> {
    let mut binding_to_resource: HashMap<&str, &Resource> = HashMap::new();
    for resource in resources {
        if let Some(binding_name) = resource.binding() {
            binding_to_resource.insert(binding_name, resource);
        }
    }

    let mut sorted = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut visiting: HashSet<String> = HashSet::new();

    fn visit(
        resource: &Resource,
        binding_to_resource: &HashMap<&str, &Resource>,
        visited: &mut HashSet<String>,
        visiting: &mut HashSet<String>,
        sorted: &mut Vec<Resource>,
    ) {
        let key = resource.id.to_string();

        if visited.contains(&key) {
            return;
        }
        if visiting.contains(&key) {
            // Circular dependency - just continue
            return;
        }

        visiting.insert(key.clone());

        // Visit dependencies first
        for dep in get_resource_dependencies(resource) {
            if let Some(dep_resource) = binding_to_resource.get(dep.as_str()) {
                visit(dep_resource, binding_to_resource, visited, visiting, sorted);
            }
        }

        visiting.remove(&key);
        visited.insert(key);
        sorted.push(resource.clone());
    }

    for resource in resources {
        visit(
            resource,
            &binding_to_resource,
            &mut visited,
            &mut visiting,
            &mut sorted,
        );
    }

    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(resource_type: &str, binding: &str) -> Resource {
        Resource::new(resource_type, binding).with_attribute("_binding", Value::from(binding))
    }

    #[test]
    fn dependencies_come_first() {
        let feature = bound("evidently.feature", "feature").with_attribute(
            "project",
            Value::ResourceRef("project".to_string(), "name".to_string()),
        );
        let project = bound("evidently.project", "project").with_attribute("name", Value::from("p"));

        let sorted = sort_resources_by_dependencies(&[feature, project]);
        assert_eq!(sorted[0].id.name, "project");
        assert_eq!(sorted[1].id.name, "feature");
    }

    #[test]
    fn independent_resources_keep_declaration_order() {
        let a = bound("evidently.project", "a");
        let b = bound("evidently.project", "b");
        let c = bound("evidently.project", "c");

        let sorted = sort_resources_by_dependencies(&[c, a, b]);
        let names: Vec<_> = sorted.iter().map(|r| r.id.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn circular_references_do_not_loop() {
        let a = bound("evidently.project", "a")
            .with_attribute("description", Value::ResourceRef("b".to_string(), "arn".to_string()));
        let b = bound("evidently.project", "b")
            .with_attribute("description", Value::ResourceRef("a".to_string(), "arn".to_string()));

        assert_eq!(sort_resources_by_dependencies(&[a, b]).len(), 2);
    }

    #[test]
    fn resolve_with_state_uses_computed_attributes() {
        let project = bound("evidently.project", "project").with_attribute("name", Value::from("p"));
        let feature = bound("evidently.feature", "feature").with_attribute(
            "project",
            Value::ResourceRef("project".to_string(), "arn".to_string()),
        );

        let arn = "arn:aws:evidently:us-east-1:123456789012:project/p";
        let mut states = HashMap::new();
        states.insert(
            project.id.clone(),
            State::existing(
                project.id.clone(),
                HashMap::from([("arn".to_string(), Value::from(arn))]),
            ),
        );

        let mut resources = vec![project, feature];
        resolve_refs_with_state(&mut resources, &states);
        assert_eq!(resources[1].get_str("project"), Some(arn));
    }

    #[test]
    fn unknown_references_are_kept() {
        let value = Value::List(vec![Value::ResourceRef(
            "project".to_string(),
            "arn".to_string(),
        )]);
        let resolved = resolve_ref_value(&value, &BindingMap::new());
        assert_eq!(resolved, value);
    }
}
