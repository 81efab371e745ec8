//! Galerie operator CLI: run derivations, recover unfinished work, rotate
//! assets and inspect variant keys.
//!
//! Configuration comes from the environment (and `.env`); see
//! `PipelineConfig::from_env`. Results are printed as JSON on stdout.

mod commands;
mod pipeline;
mod telemetry;

use anyhow::Context;
use clap::{Parser, Subcommand};
use galerie_core::PipelineConfig;
use pipeline::Pipeline;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "galerie", about = "Galerie derivative pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive one asset's variants and wait for completion
    Derive {
        /// Asset UUID
        #[arg(long)]
        asset_id: Uuid,
    },
    /// Re-enqueue every pending or processing asset and wait
    Reconcile,
    /// Rotate an asset's original and variants clockwise
    Rotate {
        /// Asset UUID
        #[arg(long)]
        asset_id: Uuid,
        /// 90, 180 or 270
        #[arg(long)]
        degrees: u16,
    },
    /// Variant key helpers (no configuration needed)
    Key {
        #[command(subcommand)]
        sub: KeyCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Derived key for an original key and width
    Derive { key: String, width: u32 },
    /// Split a derived key into original key and width
    Parse { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let json = telemetry::json_requested(std::env::var("LOG_FORMAT").ok().as_deref());
    telemetry::init_telemetry(json)?;

    let cli = Cli::parse();
    run(cli.command).await
}

async fn run(command: Commands) -> anyhow::Result<()> {
    if let Commands::Key { sub } = command {
        return match sub {
            KeyCommands::Derive { key, width } => commands::keys::derive(&key, width),
            KeyCommands::Parse { key } => commands::keys::parse(&key),
        };
    }

    let config = PipelineConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        environment = %config.environment,
        storage_backend = %config.storage_backend,
        variants = config.variants.len(),
        "Configuration loaded"
    );
    let pipeline = Pipeline::from_config(config).await?;

    match command {
        Commands::Derive { asset_id } => commands::derive::derive(&pipeline, asset_id).await,
        Commands::Reconcile => commands::derive::reconcile_all(&pipeline).await,
        Commands::Rotate { asset_id, degrees } => {
            commands::rotate::rotate(&pipeline, asset_id, degrees).await
        }
        Commands::Key { .. } => Ok(()),
    }
}
