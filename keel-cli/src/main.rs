use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use keel_core::differ::create_plan;
use keel_core::effect::Effect;
use keel_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use keel_core::parser::{self, ParsedFile};
use keel_core::plan::Plan;
use keel_core::provider::Provider;
use keel_core::resolver::{resolve_refs_with_state, sort_resources_by_dependencies};
use keel_core::resource::{Resource, ResourceId, State, Value};
use keel_core::schema::ResourceSchema;
use keel_provider_aws::AwsProvider;
use keel_provider_aws::config::AwsConfig;
use keel_provider_aws::schemas;
use keel_state::{LocalBackend, StateBackend, StateFile};

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Declarative AWS infrastructure management", long_about = None)]
struct Cli {
    /// Path to the state file
    #[arg(long, global = true, default_value = LocalBackend::DEFAULT_STATE_FILE)]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        /// Path to .keel file
        #[arg(default_value = "main.keel")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Record an existing resource in state
    Import {
        /// Resource address, e.g. evidently.feature.test
        address: String,

        /// Provider-side identifier, e.g. featureName/projectNameOrARN
        identifier: String,

        /// Path to .keel file
        #[arg(long, default_value = "main.keel")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let backend = LocalBackend::with_path(cli.state);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &backend).await,
        Commands::Apply { file } => run_apply(&file, &backend).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &backend, auto_approve).await
        }
        Commands::Import {
            address,
            identifier,
            file,
        } => run_import(&file, &backend, &address, &identifier).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    schemas::all_schemas()
        .into_iter()
        .map(|schema| (schema.resource_type.clone(), schema))
        .collect()
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let schemas = get_schemas();
    let mut all_errors = Vec::new();

    for resource in resources {
        match schemas.get(&resource.id.resource_type) {
            Some(schema) => {
                if let Err(errors) = schema.validate(&resource.attributes) {
                    for error in errors {
                        all_errors.push(format!("{}: {}", resource.id, error));
                    }
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type {}",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

/// Parse and validate a configuration file
fn load_config(file: &Path) -> Result<(ParsedFile, AwsConfig), String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;

    let parsed = parser::parse_and_resolve(&content).map_err(|e| format!("Parse error: {}", e))?;

    let config = AwsConfig::from_provider_config(parsed.provider("aws"));
    config.validate()?;
    validate_resources(&parsed.resources)?;

    Ok((parsed, config))
}

async fn load_state(backend: &LocalBackend) -> Result<StateFile, String> {
    backend
        .read_state()
        .await
        .map_err(|e| e.to_string())
        .map(Option::unwrap_or_default)
}

async fn save_state(backend: &LocalBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

/// Read the live state of every configured resource
///
/// Resources that disappeared outside Keel are dropped from `state_file`.
async fn refresh(
    provider: &AwsProvider,
    resources: &[Resource],
    state_file: &mut StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut current_states = HashMap::new();

    for resource in sort_resources_by_dependencies(resources) {
        if resource.is_data_source() {
            continue;
        }
        let identifier = state_file
            .find_resource(&resource.id)
            .and_then(|r| r.identifier.clone());

        let state = match identifier.as_deref() {
            Some(identifier) => provider
                .read(&resource, Some(identifier))
                .await
                .map_err(|e| format!("Failed to read {}: {}", resource.id, e))?,
            None => State::not_found(resource.id.clone()),
        };

        if identifier.is_some() {
            if !state.exists {
                log::info!("{} no longer exists, dropping it from state", resource.id);
            }
            state_file.record(&state, provider.name());
        }
        current_states.insert(resource.id.clone(), state);
    }

    Ok(current_states)
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let (parsed, config) = load_config(file)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully (region {}).",
            parsed.resources.len(),
            config.region
        )
        .green()
        .bold()
    );

    for resource in &parsed.resources {
        println!("  • {}", resource.id);
    }

    Ok(())
}

async fn run_plan(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (parsed, config) = load_config(file)?;
    let provider = AwsProvider::new(config).await;
    let mut state_file = load_state(backend).await?;

    let current_states = refresh(&provider, &parsed.resources, &mut state_file).await?;
    let plan = plan_from_parsed(&parsed, &current_states, &state_file);
    print_plan(&plan);
    Ok(())
}

fn plan_from_parsed(
    parsed: &ParsedFile,
    current_states: &HashMap<ResourceId, State>,
    state_file: &StateFile,
) -> Plan {
    let mut resources = parsed.resources.clone();
    resolve_refs_with_state(&mut resources, current_states);
    create_plan(
        &resources,
        current_states,
        &get_schemas(),
        &state_file.managed(),
    )
}

async fn run_apply(file: &Path, backend: &LocalBackend) -> Result<(), String> {
    let (parsed, config) = load_config(file)?;
    let provider = AwsProvider::new(config).await;
    let mut state_file = load_state(backend).await?;

    let current_states = refresh(&provider, &parsed.resources, &mut state_file).await?;
    let plan = plan_from_parsed(&parsed, &current_states, &state_file);

    if !plan.has_changes() {
        println!("{}", "No changes needed.".green());
        save_state(backend, &mut state_file).await?;
        return Ok(());
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let outcome = execute(
        &provider,
        &plan,
        &current_states,
        &mut state_file,
        InterpreterConfig::default(),
    )
    .await;
    save_state(backend, &mut state_file).await?;

    let (success_count, failure_count) = outcome;
    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_destroy(file: &Path, backend: &LocalBackend, auto_approve: bool) -> Result<(), String> {
    let (parsed, config) = load_config(file)?;
    let provider = AwsProvider::new(config).await;
    let mut state_file = load_state(backend).await?;

    let current_states = refresh(&provider, &parsed.resources, &mut state_file).await?;
    let plan = create_plan(&[], &current_states, &get_schemas(), &state_file.managed());

    if !plan.has_changes() {
        println!("{}", "No resources to destroy.".green());
        save_state(backend, &mut state_file).await?;
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.mutation_count().to_string().red()
    );
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let (success_count, failure_count) = execute(
        &provider,
        &plan,
        &current_states,
        &mut state_file,
        InterpreterConfig {
            continue_on_error: true,
            ..Default::default()
        },
    )
    .await;
    save_state(backend, &mut state_file).await?;

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_import(
    file: &Path,
    backend: &LocalBackend,
    address: &str,
    identifier: &str,
) -> Result<(), String> {
    let (parsed, config) = load_config(file)?;
    let id = ResourceId::parse_address(address)
        .ok_or_else(|| format!("Invalid resource address: {}", address))?;

    let resource = parsed
        .resources
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| format!("{} is not declared in {}", id, file.display()))?;
    if resource.is_data_source() {
        return Err(format!("{} is a data source and cannot be imported", id));
    }

    let mut state_file = load_state(backend).await?;
    if state_file.find_resource(&id).is_some() {
        return Err(format!("{} is already managed by Keel", id));
    }

    let provider = AwsProvider::new(config).await;
    println!("{}", format!("Importing {}...", id).cyan());
    let state = provider
        .import(&id, identifier)
        .await
        .map_err(|e| format!("Import failed: {}", e))?;

    state_file.record(&state, provider.name());
    save_state(backend, &mut state_file).await?;

    println!("{}", format!("✓ Imported {}.", id).green().bold());
    Ok(())
}

/// Run a plan and record every outcome in `state_file`
///
/// Returns the success and failure counts.
async fn execute(
    provider: &AwsProvider,
    plan: &Plan,
    current_states: &HashMap<ResourceId, State>,
    state_file: &mut StateFile,
    config: InterpreterConfig,
) -> (usize, usize) {
    let interpreter = Interpreter::new(provider.clone()).with_config(config);
    let result = interpreter.apply(plan, current_states).await;

    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Read { .. }) => continue,
            Ok(EffectOutcome::Deleted { id }) => {
                state_file.remove_resource(id);
            }
            Ok(outcome) => {
                if let Some(state) = outcome.state() {
                    state_file.record(state, provider.name());
                }
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                continue;
            }
        }
        println!("  {} {}", "✓".green(), format_effect(effect));
    }

    (result.success_count, result.failure_count)
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

fn print_plan(plan: &Plan) {
    if !plan.has_changes() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let symbol = match effect {
            Effect::Read(_) => continue,
            Effect::Create(_) => "+".green().bold(),
            Effect::Update { .. } => "~".yellow().bold(),
            Effect::Replace { .. } => "-/+".magenta().bold(),
            Effect::Delete { .. } => "-".red().bold(),
        };
        println!("  {} {}", symbol, effect.resource_id().to_string().cyan().bold());

        match effect {
            Effect::Create(r) => {
                for (key, value) in sorted_attributes(&r.attributes) {
                    println!("      {}: {}", key, format_value(value).green());
                }
            }
            Effect::Update {
                from,
                to,
                changed_attributes,
                ..
            }
            | Effect::Replace {
                from,
                to,
                changed_attributes,
                ..
            } => {
                for key in changed_attributes {
                    let old = from
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    let new = to
                        .attributes
                        .get(key)
                        .map(format_value)
                        .unwrap_or_else(|| "(none)".to_string());
                    println!("      {}: {} → {}", key, old.red(), new.green());
                }
            }
            Effect::Delete { identifier, .. } => {
                println!("      {}: {}", "id".bold(), identifier.red());
            }
            Effect::Read(_) => {}
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to replace, {} to destroy.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
}

/// User attributes with `name` first, the rest alphabetical
fn sorted_attributes(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = attributes
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .collect();
    entries.sort_by(|(a, _), (b, _)| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    entries
}

fn format_effect(effect: &Effect) -> String {
    let verb = match effect {
        Effect::Read(_) => "Read",
        Effect::Create(_) => "Create",
        Effect::Update { .. } => "Update",
        Effect::Replace { .. } => "Replace",
        Effect::Delete { .. } => "Delete",
    };
    format!("{} {}", verb, effect.resource_id())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{}", binding, attr),
    }
}
