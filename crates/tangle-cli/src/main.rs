//! Tangle CLI - Command line interface for the knowledge graph

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, entity, relation, types};
use config::Config;
use output::OutputFormat;
use tangle_graph::{EntityService, RelationshipManager, RelationshipTypeRegistry};
use tangle_storage::{SqliteStorage, StorageBackend};

#[derive(Parser)]
#[command(name = "tangle")]
#[command(author, version, about = "Typed knowledge graph with validated relationships")]
pub struct Cli {
    /// Data directory
    #[arg(short, long, global = true, env = "TANGLE_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Output format: table, json
    #[arg(short, long, global = true)]
    pub format: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the data directory path
    pub fn data_dir(&self, config: &Config) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| config.data_dir.clone())
            .unwrap_or_else(config::default_data_dir)
    }

    pub fn output_format(&self, config: &Config) -> OutputFormat {
        OutputFormat::from(self.format.as_deref().unwrap_or_else(|| config.format()))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage entities and their observations
    Entity(entity::EntityArgs),
    /// Manage relationship types
    #[command(name = "type")]
    Type(types::TypeArgs),
    /// Manage relationships between entities
    Relation(relation::RelationArgs),
    /// Manage CLI configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with the graph services
pub struct AppContext {
    pub storage: Arc<dyn StorageBackend>,
    pub registry: Arc<RelationshipTypeRegistry>,
    pub manager: Arc<RelationshipManager>,
    pub service: EntityService,
    pub format: OutputFormat,
}

impl AppContext {
    pub async fn new(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        let data_dir = cli.data_dir(config);
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join("tangle.db");
        tracing::debug!("Using database at: {:?}", db_path);

        let storage: Arc<dyn StorageBackend> = Arc::new(SqliteStorage::open(&db_path)?);
        let registry = Arc::new(RelationshipTypeRegistry::load(storage.clone()).await?);
        let manager = Arc::new(RelationshipManager::new(storage.clone(), registry.clone()));
        let service = EntityService::new(storage.clone(), manager.clone());

        Ok(Self {
            storage,
            registry,
            manager,
            service,
            format: cli.output_format(config),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => config.log_level(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting tangle CLI");

    match &cli.command {
        Commands::Config(args) => commands::config::run(args, cli.output_format(&config))?,
        Commands::Completions(args) => completions::run(args)?,
        command => {
            if let Some(e) = &config_error {
                tracing::warn!("{:#}; using defaults", e);
            }

            let ctx = AppContext::new(&cli, &config).await?;
            match command {
                Commands::Entity(args) => entity::run(args, &ctx).await?,
                Commands::Type(args) => types::run(args, &ctx).await?,
                Commands::Relation(args) => relation::run(args, &ctx).await?,
                Commands::Config(_) | Commands::Completions(_) => {}
            }
            ctx.storage.close().await?;
        }
    }

    Ok(())
}
