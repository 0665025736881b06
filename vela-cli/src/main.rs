use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;

use vela_core::provider::Provider;
use vela_core::resource::{Resource, ResourceId, State, Value};
use vela_core::schema::ResourceSchema;
use vela_provider_workspace::schemas;
use vela_provider_workspace::{ProviderConfig, WorkspaceProvider};

#[derive(Parser)]
#[command(name = "vela")]
#[command(about = "Manage Huawei Cloud Workspace resources", long_about = None)]
struct Cli {
    /// Region to operate in (overrides HW_REGION_NAME and the config file)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Path to a TOML provider config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the attribute schema of a type, or list all types
    Schema {
        /// Resource or data source type
        type_name: Option<String>,
    },
    /// Validate a resource file against its schema
    Validate {
        /// Path to a JSON resource file
        file: PathBuf,
    },
    /// Run a data source query
    Query {
        /// Data source type
        type_name: String,

        /// Filter as key=value (repeatable)
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// JSON resource file holding the filters
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Create a resource
    Create {
        /// Path to a JSON resource file
        file: PathBuf,
    },
    /// Read a resource by its remote ID
    Read {
        type_name: String,
        id: String,

        /// Prior state file
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Update a resource in place
    Update {
        /// Path to a JSON resource file with the desired attributes
        file: PathBuf,

        /// Current state file
        #[arg(long)]
        state: PathBuf,
    },
    /// Delete a resource by its remote ID
    Delete {
        type_name: String,
        id: String,

        /// Prior state file
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Import an existing remote object
    Import { type_name: String, id: String },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = ProviderOptions {
        region: cli.region,
        config: cli.config,
    };

    let result = match cli.command {
        Commands::Schema { type_name } => run_schema(type_name.as_deref()),
        Commands::Validate { file } => run_validate(&file),
        Commands::Query {
            type_name,
            filters,
            file,
        } => run_query(&options, &type_name, &filters, file.as_deref()).await,
        Commands::Create { file } => run_create(&options, &file).await,
        Commands::Read {
            type_name,
            id,
            state,
        } => run_read(&options, &type_name, &id, state.as_deref()).await,
        Commands::Update { file, state } => run_update(&options, &file, &state).await,
        Commands::Delete {
            type_name,
            id,
            state,
        } => run_delete(&options, &type_name, &id, state.as_deref()).await,
        Commands::Import { type_name, id } => run_import(&options, &type_name, &id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Flags shared by every command that talks to the service
struct ProviderOptions {
    region: Option<String>,
    config: Option<PathBuf>,
}

/// `{ "type": ..., "name": ..., "attributes": {...} }`
#[derive(Debug, Deserialize)]
struct ResourceFile {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

fn default_name() -> String {
    "main".to_string()
}

fn get_schema(type_name: &str) -> Result<ResourceSchema, String> {
    schemas::get_schema_config(type_name)
        .map(|c| c.schema)
        .ok_or_else(|| format!("Unknown type: {}", type_name))
}

fn parse_resource(content: &str) -> Result<Resource, String> {
    let file: ResourceFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;
    let schema = get_schema(&file.resource_type)?;
    let mut resource = Resource::new(file.resource_type, file.name).with_read_only(schema.data_source);
    resource.attributes = file.attributes;
    Ok(resource)
}

fn load_resource(file: &Path) -> Result<Resource, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    parse_resource(&content)
}

fn load_state(file: &Path) -> Result<State, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Invalid state file {}: {}", file.display(), e))
}

/// `key=value`; the value is read as JSON when it parses, else as a string
fn parse_filter(filter: &str) -> Result<(String, Value), String> {
    let (key, raw) = filter
        .split_once('=')
        .ok_or_else(|| format!("Invalid filter '{}', expected KEY=VALUE", filter))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid filter '{}', empty key", filter));
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|json| Value::from_json(&json))
        .unwrap_or_else(|| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn validate_resource(schema: &ResourceSchema, resource: &Resource) -> Result<(), String> {
    let mut attributes = resource.attributes.clone();
    schema.apply_defaults(&mut attributes);
    schema.validate(&attributes).map_err(|errors| {
        errors
            .iter()
            .map(|e| format!("{}.{}: {}", resource.id.resource_type, resource.id.name, e))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn get_provider(options: &ProviderOptions) -> Result<Box<dyn Provider>, String> {
    let mut config = ProviderConfig::load(options.config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(region) = &options.region {
        config.region = region.clone();
    }
    eprintln!(
        "{}",
        format!("Using Workspace provider (region: {})", config.region).cyan()
    );
    let provider = WorkspaceProvider::new(config).map_err(|e| e.to_string())?;
    Ok(Box::new(provider))
}

fn print_state(state: &State) -> Result<(), String> {
    let json = serde_json::to_string_pretty(state).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

/// Prior state for a remote ID: the state file when given, else a bare state
fn prior_state(id: &ResourceId, identifier: &str, file: Option<&Path>) -> Result<State, String> {
    match file {
        Some(file) => load_state(file),
        None => Ok(State::existing(id.clone(), HashMap::new()).with_identifier(identifier)),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn run_schema(type_name: Option<&str>) -> Result<(), String> {
    let Some(type_name) = type_name else {
        let mut all = schemas::all_schemas();
        all.sort_by(|a, b| a.resource_type.cmp(&b.resource_type));
        for schema in all {
            let kind = if schema.data_source { "data source" } else { "resource" };
            println!(
                "{} ({}) {}",
                schema.resource_type.cyan().bold(),
                kind,
                schema.description.as_deref().unwrap_or_default()
            );
        }
        return Ok(());
    };

    let schema = get_schema(type_name)?;
    println!("{}", schema.resource_type.cyan().bold());
    if let Some(description) = &schema.description {
        println!("  {}", description);
    }
    println!();

    let mut attributes: Vec<_> = schema.attributes.values().collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    for attr in attributes {
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required".red().to_string());
        }
        if attr.optional {
            flags.push("optional".to_string());
        }
        if attr.computed {
            flags.push("computed".to_string());
        }
        if attr.force_new {
            flags.push("force-new".yellow().to_string());
        }
        if attr.sensitive {
            flags.push("sensitive".to_string());
        }
        println!(
            "  {}: {} [{}]",
            attr.name.bold(),
            attr.attr_type,
            flags.join(", ")
        );
        if let Some(default) = &attr.default {
            println!("      default: {}", default.to_json());
        }
        if let Some(description) = &attr.description {
            println!("      {}", description);
        }
    }
    Ok(())
}

fn run_validate(file: &Path) -> Result<(), String> {
    let resource = load_resource(file)?;
    let schema = get_schema(&resource.id.resource_type)?;

    println!("{}", "Validating...".cyan());
    validate_resource(&schema, &resource)?;

    println!(
        "{}",
        format!(
            "✓ {}.{} validated successfully.",
            resource.id.resource_type, resource.id.name
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn run_query(
    options: &ProviderOptions,
    type_name: &str,
    filters: &[String],
    file: Option<&Path>,
) -> Result<(), String> {
    let mut resource = match file {
        Some(file) => load_resource(file)?,
        None => Resource::new(type_name, "query"),
    };
    if resource.id.resource_type != type_name {
        return Err(format!(
            "{} holds a {}, not a {}",
            file.map(|f| f.display().to_string()).unwrap_or_default(),
            resource.id.resource_type,
            type_name
        ));
    }
    for filter in filters {
        let (key, value) = parse_filter(filter)?;
        resource.attributes.insert(key, value);
    }
    let resource = resource.with_read_only(true);

    let provider = get_provider(options)?;
    let state = provider
        .read_data_source(&resource)
        .await
        .map_err(|e| e.to_string())?;
    print_state(&state)
}

async fn run_create(options: &ProviderOptions, file: &Path) -> Result<(), String> {
    let resource = load_resource(file)?;
    if resource.is_data_source() {
        return Err(format!(
            "{} is a data source, use query",
            resource.id.resource_type
        ));
    }

    let provider = get_provider(options)?;
    let state = provider.create(&resource).await.map_err(|e| e.to_string())?;
    eprintln!(
        "  {} {}.{}",
        "✓".green(),
        resource.id.resource_type,
        resource.id.name
    );
    print_state(&state)
}

async fn run_read(
    options: &ProviderOptions,
    type_name: &str,
    identifier: &str,
    state_file: Option<&Path>,
) -> Result<(), String> {
    get_schema(type_name)?;
    let prior = state_file.map(load_state).transpose()?;
    let id = match &prior {
        Some(state) => state.id.clone(),
        None => ResourceId::new(type_name, identifier),
    };

    let provider = get_provider(options)?;
    let state = provider
        .read(&id, identifier, prior.as_ref())
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        println!("{}", "removed".yellow());
        return Ok(());
    }
    print_state(&state)
}

async fn run_update(options: &ProviderOptions, file: &Path, state_file: &Path) -> Result<(), String> {
    let resource = load_resource(file)?;
    let from = load_state(state_file)?;
    let schema = get_schema(&resource.id.resource_type)?;
    let identifier = from
        .identifier
        .clone()
        .ok_or_else(|| format!("{} has no remote identifier", state_file.display()))?;

    let mut desired = resource.attributes.clone();
    schema.apply_defaults(&mut desired);
    let replaced = schema.force_new_changes(&from.attributes, &desired);
    if !replaced.is_empty() {
        return Err(format!(
            "{} cannot change in place ({}), delete and recreate",
            resource.id.resource_type,
            replaced.join(", ")
        ));
    }

    let provider = get_provider(options)?;
    let state = provider
        .update(&from.id, &identifier, &from, &resource)
        .await
        .map_err(|e| e.to_string())?;
    print_state(&state)
}

async fn run_delete(
    options: &ProviderOptions,
    type_name: &str,
    identifier: &str,
    state_file: Option<&Path>,
) -> Result<(), String> {
    get_schema(type_name)?;
    let prior = prior_state(&ResourceId::new(type_name, identifier), identifier, state_file)?;

    let provider = get_provider(options)?;
    provider
        .delete(&prior.id, identifier, &prior)
        .await
        .map_err(|e| e.to_string())?;
    println!("{} {} {}", "✓".green(), type_name, identifier.red());
    Ok(())
}

async fn run_import(options: &ProviderOptions, type_name: &str, identifier: &str) -> Result<(), String> {
    get_schema(type_name)?;
    let id = ResourceId::new(type_name, identifier);

    let provider = get_provider(options)?;
    let state = provider
        .import(&id, identifier)
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!("{} {} not found", type_name, identifier));
    }
    print_state(&state)
}
