//! Custom API CLI
//!
//! Manage schema definitions and data sets in a custom API store.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use custom_api_schemas::config::StoreBackend;
use custom_api_schemas::{
    open_store, ApiSchemaConfig, Item, NewDataSet, NewSchema, Scope, SchemaError, SchemaPatch,
    SchemaRegistry, SetService,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "custom-api")]
#[command(about = "Schema registry and data sets for custom APIs")]
struct Cli {
    /// Config file (custom-api.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Store directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Acting user id
    #[arg(short, long, default_value = "cli")]
    actor: String,

    /// Enable strict validation
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage schema definitions
    #[command(subcommand)]
    Schema(SchemaCommand),

    /// Manage data sets
    #[command(subcommand)]
    Set(SetCommand),

    /// Manage items of a data set
    #[command(subcommand)]
    Item(ItemCommand),

    /// Validate a data file against a schema without storing it
    Validate {
        /// Schema code
        #[arg(short, long)]
        schema: String,
        /// JSON file containing { "items": [...] }
        data: PathBuf,
    },

    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Create a schema from a JSON definition file
    Create { file: PathBuf },
    /// Show a schema by code or id
    Get { code_or_id: String },
    /// List schemas
    List {
        /// Include deactivated schemas
        #[arg(long)]
        all: bool,
    },
    /// Apply a JSON patch file to a schema
    Update { id: String, patch: PathBuf },
    /// Deactivate a schema (soft delete)
    Deactivate { id: String },
    /// Delete a schema that no data set references
    Delete { id: String },
}

#[derive(Subcommand)]
enum SetCommand {
    /// Create a data set
    Create(CreateSet),
    /// Show a data set
    Get { id: String },
    /// List visible data sets
    List {
        /// Only sets of this schema code
        #[arg(short, long)]
        schema: Option<String>,
    },
    /// Delete a data set
    Delete { id: String },
    /// Replace all items from a JSON file ({ "items": [...] } or a bare array)
    Replace { id: String, items: PathBuf },
}

#[derive(Args)]
struct CreateSet {
    /// Set name
    name: String,
    /// Schema code
    #[arg(short, long)]
    schema: String,
    /// JSON file containing { "items": [...] }
    #[arg(short, long)]
    data: Option<PathBuf>,
    /// Make the set private to the acting user
    #[arg(long)]
    private: bool,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Subcommand)]
enum ItemCommand {
    /// Add an item from a JSON file
    Add { set_id: String, item: PathBuf },
    /// Merge a JSON patch file into an item
    Update {
        set_id: String,
        item_id: String,
        patch: PathBuf,
    },
    /// Remove an item
    Remove { set_id: String, item_id: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the default configuration
    Init {
        #[arg(default_value = "custom-api.toml")]
        path: String,
    },
    /// Print the effective configuration
    Show,
}

fn main() {
    let cli = Cli::parse();

    let config = match ApiSchemaConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: could not load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli, config) {
        match e.downcast_ref::<SchemaError>() {
            Some(schema_error) => eprintln!("Error ({}): {}", schema_error.status_code(), schema_error),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli, mut config: ApiSchemaConfig) -> anyhow::Result<()> {
    if let Some(dir) = cli.data_dir {
        config.store.backend = StoreBackend::File;
        config.store.path = dir;
    }
    if cli.strict {
        config.validation.strict = true;
    }

    if let Commands::Config(command) = &cli.command {
        return match command {
            ConfigCommand::Init { path } => {
                ApiSchemaConfig::default().save(path)?;
                println!("✅ Wrote default configuration to {}", path);
                Ok(())
            }
            ConfigCommand::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        };
    }

    if config.store.backend == StoreBackend::Memory {
        tracing::warn!("memory store selected; nothing will be persisted");
    }
    config.store.path = config.store_path();
    let store = open_store(&config.store)?;
    let registry = SchemaRegistry::new(store.clone());
    let sets = SetService::with_options(store, config.validation.options());
    let actor = cli.actor.as_str();

    match cli.command {
        Commands::Schema(command) => match command {
            SchemaCommand::Create { file } => {
                let new: NewSchema = read_json(&file)?;
                print_json(&registry.create(new, actor)?)
            }
            SchemaCommand::Get { code_or_id } => {
                let definition = match registry.get_by_code(&code_or_id) {
                    Ok(definition) => definition,
                    Err(SchemaError::NotFound { .. }) => registry.get_by_id(&code_or_id)?,
                    Err(e) => return Err(e.into()),
                };
                print_json(&definition)
            }
            SchemaCommand::List { all } => {
                for definition in registry.list(all)? {
                    let state = if definition.is_active { "" } else { " (inactive)" };
                    println!(
                        "{}  {:<24} {:<6} v{}{}",
                        definition.id, definition.code, definition.schema_type, definition.version, state
                    );
                }
                Ok(())
            }
            SchemaCommand::Update { id, patch } => {
                let patch: SchemaPatch = read_json(&patch)?;
                print_json(&registry.update(&id, patch, actor)?)
            }
            SchemaCommand::Deactivate { id } => print_json(&registry.deactivate(&id, actor)?),
            SchemaCommand::Delete { id } => {
                registry.delete(&id)?;
                println!("✅ Deleted schema {}", id);
                Ok(())
            }
        },

        Commands::Set(command) => match command {
            SetCommand::Create(args) => {
                let schema = registry.get_by_code(&args.schema)?;
                let data = match &args.data {
                    Some(path) => read_json::<Value>(path)?,
                    None => serde_json::json!({ "items": [] }),
                };
                let scope = if args.private { Scope::User } else { Scope::System };
                let mut new = NewDataSet::new(args.name, schema.id, scope, data);
                new.description = args.description;
                print_json(&sets.create_set(new, actor)?)
            }
            SetCommand::Get { id } => print_json(&sets.get_by_id(&id, actor)?),
            SetCommand::List { schema } => {
                for set in sets.list_sets(actor, schema.as_deref())? {
                    println!(
                        "{}  {:<24} {:<16} {:>5} items",
                        set.id,
                        set.name,
                        set.schema_code,
                        set.item_count()
                    );
                }
                Ok(())
            }
            SetCommand::Delete { id } => {
                sets.delete_set(&id, actor)?;
                println!("✅ Deleted data set {}", id);
                Ok(())
            }
            SetCommand::Replace { id, items } => {
                let items = match read_json::<Value>(&items)? {
                    Value::Array(items) => items,
                    Value::Object(mut object) => match object.remove("items") {
                        Some(Value::Array(items)) => items,
                        _ => bail!("expected an 'items' array"),
                    },
                    _ => bail!("expected an 'items' array"),
                };
                print_json(&sets.replace_all_items(&id, items, actor)?)
            }
        },

        Commands::Item(command) => match command {
            ItemCommand::Add { set_id, item } => {
                let item: Item = read_json(&item)?;
                print_json(&sets.add_item(&set_id, item, actor)?)
            }
            ItemCommand::Update {
                set_id,
                item_id,
                patch,
            } => {
                let patch: Item = read_json(&patch)?;
                print_json(&sets.update_item(&set_id, &item_id, patch, actor)?)
            }
            ItemCommand::Remove { set_id, item_id } => {
                print_json(&sets.remove_item(&set_id, &item_id, actor)?)
            }
        },

        Commands::Validate { schema, data } => {
            let definition = registry.get_by_code(&schema)?;
            let data: Value = read_json(&data)?;
            let report = sets.validator().validate(&definition, &data);
            print_json(&report)?;
            if !report.valid {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Config(_) => Ok(()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("could not parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
