//! Parser - Parse .keel files
//!
//! Convert DSL to resources using pest

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::collections::{HashMap, HashSet};
use std::env;

use crate::resource::{Resource, ResourceId, Value};

#[derive(Parser)]
#[grammar = "parser/keel.pest"]
struct KeelParser;

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("Invalid expression at line {line}: {message}")]
    InvalidExpression { line: usize, message: String },

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("Duplicate binding: {0}")]
    DuplicateBinding(String),
}

/// Provider configuration
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

impl ProviderConfig {
    /// Get a string attribute value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Get an integer attribute value
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.attributes.get(key) {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

/// Parse result
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub providers: Vec<ProviderConfig>,
    pub resources: Vec<Resource>,
    pub variables: HashMap<String, Value>,
}

impl ParsedFile {
    /// Find the configuration block for a provider
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Parse context (variable scope)
struct ParseContext {
    variables: HashMap<String, Value>,
    /// Binding names of resources declared so far
    resource_bindings: HashSet<String>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            variables: HashMap::new(),
            resource_bindings: HashSet::new(),
        }
    }

    fn is_resource_binding(&self, name: &str) -> bool {
        self.resource_bindings.contains(name)
    }
}

/// Parse a .keel file
pub fn parse(input: &str) -> Result<ParsedFile, ParseError> {
    let pairs = KeelParser::parse(Rule::file, input).map_err(Box::new)?;

    let mut ctx = ParseContext::new();
    let mut providers = Vec::new();
    let mut resources: Vec<Resource> = Vec::new();

    for pair in pairs {
        if pair.as_rule() != Rule::file {
            continue;
        }
        for inner in pair.into_inner() {
            if inner.as_rule() != Rule::statement {
                continue;
            }
            for stmt in inner.into_inner() {
                let resource = match stmt.as_rule() {
                    Rule::provider_block => {
                        providers.push(parse_provider_block(stmt, &ctx)?);
                        None
                    }
                    Rule::let_binding => parse_let_binding(stmt, &mut ctx)?,
                    Rule::anonymous_resource => Some(parse_anonymous_resource(stmt, &ctx)?),
                    _ => None,
                };

                if let Some(resource) = resource {
                    if resources.iter().any(|r| r.id == resource.id) {
                        return Err(ParseError::DuplicateResource(resource.id.to_string()));
                    }
                    resources.push(resource);
                }
            }
        }
    }

    Ok(ParsedFile {
        providers,
        resources,
        variables: ctx.variables,
    })
}

fn parse_provider_block(pair: Pair<Rule>, ctx: &ParseContext) -> Result<ProviderConfig, ParseError> {
    let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::kw_provider);
    let name = inner.next().unwrap().as_str().to_string();

    let mut attributes = HashMap::new();
    for attr_pair in inner {
        if attr_pair.as_rule() == Rule::attribute {
            let (key, value) = parse_attribute(attr_pair, ctx)?;
            attributes.insert(key, value);
        }
    }

    Ok(ProviderConfig { name, attributes })
}

/// Parse a let binding; returns the resource when the binding declares one
fn parse_let_binding(
    pair: Pair<Rule>,
    ctx: &mut ParseContext,
) -> Result<Option<Resource>, ParseError> {
    let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::kw_let);
    let name = inner.next().unwrap().as_str().to_string();
    let value_pair = inner.next().unwrap();

    if ctx.is_resource_binding(&name) || ctx.variables.contains_key(&name) {
        return Err(ParseError::DuplicateBinding(name));
    }

    match value_pair.as_rule() {
        Rule::resource_expr => {
            let resource = parse_resource_expr(value_pair, ctx, &name)?;
            ctx.resource_bindings.insert(name);
            Ok(Some(resource))
        }
        _ => {
            let value = parse_expression(value_pair, ctx)?;
            ctx.variables.insert(name, value);
            Ok(None)
        }
    }
}

/// Split `aws.evidently.feature` into ("aws", "evidently.feature")
fn split_resource_type(namespaced_type: &str) -> Result<(String, String), ParseError> {
    match namespaced_type.split_once('.') {
        Some((provider, resource_type)) if !resource_type.is_empty() => {
            Ok((provider.to_string(), resource_type.to_string()))
        }
        _ => Err(ParseError::InvalidResourceType(namespaced_type.to_string())),
    }
}

fn parse_resource_expr(
    pair: Pair<Rule>,
    ctx: &ParseContext,
    binding_name: &str,
) -> Result<Resource, ParseError> {
    let mut inner = pair.into_inner().peekable();

    let read_only = inner
        .peek()
        .is_some_and(|p| p.as_rule() == Rule::read_kw);
    if read_only {
        inner.next();
    }

    let namespaced_type = inner.next().unwrap().as_str().to_string();
    let (provider, resource_type) = split_resource_type(&namespaced_type)?;

    let mut attributes = parse_block_contents(inner, ctx)?;

    // Add provider information to attributes
    attributes.insert("_provider".to_string(), Value::String(provider));
    attributes.insert("_type".to_string(), Value::String(namespaced_type));
    // Save binding name (for reference)
    attributes.insert(
        "_binding".to_string(),
        Value::String(binding_name.to_string()),
    );

    Ok(Resource {
        id: ResourceId::new(resource_type, binding_name),
        attributes,
        read_only,
    })
}

fn parse_anonymous_resource(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Resource, ParseError> {
    let line = pair.as_span().start_pos().line_col().0;
    let mut inner = pair.into_inner();

    let namespaced_type = inner.next().unwrap().as_str().to_string();
    let (provider, resource_type) = split_resource_type(&namespaced_type)?;

    let mut attributes = parse_block_contents(inner, ctx)?;

    // Anonymous resources are addressed by their name attribute
    let resource_name = match attributes.get("name") {
        Some(Value::String(s)) => s.clone(),
        _ => {
            return Err(ParseError::InvalidExpression {
                line,
                message: "Anonymous resource must have a 'name' attribute".to_string(),
            });
        }
    };

    attributes.insert("_provider".to_string(), Value::String(provider));
    attributes.insert("_type".to_string(), Value::String(namespaced_type));

    Ok(Resource {
        id: ResourceId::new(resource_type, resource_name),
        attributes,
        read_only: false,
    })
}

/// Parse block contents (attributes and nested blocks)
/// Nested blocks with the same name are collected into a list
fn parse_block_contents<'a>(
    pairs: impl Iterator<Item = Pair<'a, Rule>>,
    ctx: &ParseContext,
) -> Result<HashMap<String, Value>, ParseError> {
    let mut attributes: HashMap<String, Value> = HashMap::new();
    let mut nested_blocks: Vec<(String, Vec<Value>)> = Vec::new();

    for content_pair in pairs {
        if content_pair.as_rule() != Rule::block_content {
            continue;
        }
        let inner = content_pair.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::attribute => {
                let (key, value) = parse_attribute(inner, ctx)?;
                attributes.insert(key, value);
            }
            Rule::nested_block => {
                let mut block_inner = inner.into_inner();
                let block_name = block_inner.next().unwrap().as_str().to_string();
                let block_attrs = parse_block_contents(block_inner, ctx)?;

                // Keep declaration order of repeated blocks
                match nested_blocks.iter_mut().find(|(name, _)| *name == block_name) {
                    Some((_, blocks)) => blocks.push(Value::Map(block_attrs)),
                    None => nested_blocks.push((block_name, vec![Value::Map(block_attrs)])),
                }
            }
            _ => {}
        }
    }

    // Convert nested blocks to list attributes
    for (name, blocks) in nested_blocks {
        attributes.insert(name, Value::List(blocks));
    }

    Ok(attributes)
}

fn parse_attribute(pair: Pair<Rule>, ctx: &ParseContext) -> Result<(String, Value), ParseError> {
    let mut attr_inner = pair.into_inner();
    let key = attr_inner.next().unwrap().as_str().to_string();
    let value = parse_expression(attr_inner.next().unwrap(), ctx)?;
    Ok((key, value))
}

fn parse_expression(pair: Pair<Rule>, ctx: &ParseContext) -> Result<Value, ParseError> {
    // For expression, get inner content; otherwise process directly
    let inner = if pair.as_rule() == Rule::expression {
        pair.into_inner().next().unwrap()
    } else {
        pair
    };
    let line = inner.as_span().start_pos().line_col().0;

    match inner.as_rule() {
        Rule::env_var => {
            let var_name = parse_string(inner.into_inner().next().unwrap());
            match env::var(&var_name) {
                Ok(val) => Ok(Value::String(val)),
                Err(_) => Err(ParseError::EnvVarNotSet(var_name)),
            }
        }
        Rule::list => {
            let items: Result<Vec<Value>, ParseError> = inner
                .into_inner()
                .map(|item| parse_expression(item, ctx))
                .collect();
            Ok(Value::List(items?))
        }
        Rule::map => {
            let mut map = HashMap::new();
            for entry in inner.into_inner() {
                if entry.as_rule() == Rule::map_entry {
                    let mut entry_inner = entry.into_inner();
                    let key_pair = entry_inner.next().unwrap();
                    let key = match key_pair.as_rule() {
                        Rule::string => parse_string(key_pair),
                        _ => key_pair.as_str().to_string(),
                    };
                    let value = parse_expression(entry_inner.next().unwrap(), ctx)?;
                    map.insert(key, value);
                }
            }
            Ok(Value::Map(map))
        }
        Rule::boolean => Ok(Value::Bool(inner.as_str() == "true")),
        Rule::number => parse_number(inner.as_str(), line),
        Rule::string => Ok(Value::String(parse_string(inner))),
        Rule::reference => {
            // binding.attribute, validated in the resolve phase
            let (binding, attr) = inner.as_str().split_once('.').unwrap();
            if ctx.variables.contains_key(binding) && !ctx.is_resource_binding(binding) {
                return Err(ParseError::InvalidExpression {
                    line,
                    message: format!(
                        "'{}' is not a resource, cannot access attribute '{}'",
                        binding, attr
                    ),
                });
            }
            Ok(Value::ResourceRef(binding.to_string(), attr.to_string()))
        }
        Rule::variable => {
            let name = inner.as_str();
            match ctx.variables.get(name) {
                Some(val) => Ok(val.clone()),
                None if ctx.is_resource_binding(name) => Err(ParseError::InvalidExpression {
                    line,
                    message: format!(
                        "'{}' is a resource; reference one of its attributes instead",
                        name
                    ),
                }),
                None => Err(ParseError::UndefinedVariable(name.to_string())),
            }
        }
        _ => Ok(Value::String(inner.as_str().to_string())),
    }
}

fn parse_number(s: &str, line: usize) -> Result<Value, ParseError> {
    let invalid = |_| ParseError::InvalidExpression {
        line,
        message: format!("Invalid number '{}'", s),
    };
    if s.contains('.') {
        s.parse::<f64>().map(Value::Float).map_err(|e| invalid(e.to_string()))
    } else {
        s.parse::<i64>().map(Value::Int).map_err(|e| invalid(e.to_string()))
    }
}

fn parse_string(pair: Pair<Rule>) -> String {
    let s = pair.as_str();
    // Remove quotes
    let inner = &s[1..s.len() - 1];

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Resolve resource references in a ParsedFile
///
/// References to attributes known from configuration are replaced with their
/// values. References to attributes only the provider knows (e.g. `arn`) stay
/// as `ResourceRef` and are resolved at apply time.
pub fn resolve_resource_refs(parsed: &mut ParsedFile) -> Result<(), ParseError> {
    // Build a map of binding_name -> attributes for quick lookup
    let mut binding_map: HashMap<String, HashMap<String, Value>> = HashMap::new();
    for resource in &parsed.resources {
        if let Some(binding_name) = resource.binding() {
            binding_map.insert(binding_name.to_string(), resource.attributes.clone());
        }
    }

    for resource in &mut parsed.resources {
        let mut resolved_attrs: HashMap<String, Value> = HashMap::new();
        for (key, value) in &resource.attributes {
            resolved_attrs.insert(key.clone(), resolve_value(value, &binding_map)?);
        }
        resource.attributes = resolved_attrs;
    }

    Ok(())
}

fn resolve_value(
    value: &Value,
    binding_map: &HashMap<String, HashMap<String, Value>>,
) -> Result<Value, ParseError> {
    match value {
        Value::ResourceRef(binding_name, attr_name) => match binding_map.get(binding_name) {
            Some(attributes) => match attributes.get(attr_name) {
                // Recursively resolve in case the attribute itself is a reference
                Some(attr_value) => resolve_value(attr_value, binding_map),
                None => Ok(value.clone()),
            },
            None => Err(ParseError::UndefinedVariable(format!(
                "{}.{}",
                binding_name, attr_name
            ))),
        },
        Value::List(items) => {
            let resolved: Result<Vec<Value>, ParseError> = items
                .iter()
                .map(|item| resolve_value(item, binding_map))
                .collect();
            Ok(Value::List(resolved?))
        }
        Value::Map(map) => {
            let mut resolved = HashMap::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, binding_map)?);
            }
            Ok(Value::Map(resolved))
        }
        _ => Ok(value.clone()),
    }
}

/// Parse a .keel file and resolve resource references
pub fn parse_and_resolve(input: &str) -> Result<ParsedFile, ParseError> {
    let mut parsed = parse(input)?;
    resolve_resource_refs(&mut parsed)?;
    Ok(parsed)
}

// Used by tests that parse parts of the grammar in isolation
#[cfg(test)]
fn parse_rule(rule: Rule, input: &str) -> Result<pest::iterators::Pairs<'_, Rule>, ParseError> {
    KeelParser::parse(rule, input).map_err(|e| ParseError::Syntax(Box::new(e)))
}
