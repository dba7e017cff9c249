//! Stampede CLI
//!
//! `stampede run` executes one benchmark from a TOML config and prints
//! the JSON report; `stampede serve` exposes the HTTP control surface.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use stampede::config::RunConfig;
use stampede::db::Database;
use stampede::registry::BenchmarkRegistry;
use stampede::rest::RestServer;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "stampede",
    version,
    about = "Database load-generation and measurement engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one benchmark to completion and print the report as JSON
    Run {
        /// Benchmark config (TOML); STAMPEDE_* env vars override
        #[arg(short, long)]
        config: PathBuf,

        /// Drop the synthetic schema after the run
        #[arg(long)]
        cleanup: bool,
    },
    /// Serve the HTTP control surface
    Serve {
        /// Server config (TOML) listing named connections
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,
    },
}

/// `run` config file: a connection DSN plus the run itself.
#[derive(Deserialize)]
struct RunFile {
    connection: String,
    #[serde(flatten)]
    run: RunConfig,
}

/// `serve` config file: named connection DSNs.
#[derive(Deserialize, Default)]
struct ServeFile {
    #[serde(default)]
    connections: HashMap<String, String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    stampede::logging::init_from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, cleanup } => run_benchmark(&config, cleanup),
        Command::Serve { config, listen } => serve(config.as_deref(), &listen).await,
    }
}

fn run_benchmark(path: &std::path::Path, cleanup: bool) -> Result<()> {
    let file: RunFile = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("STAMPEDE_"))
        .extract()
        .with_context(|| format!("loading config from {}", path.display()))?;

    let db = stampede::db::from_dsn(&file.connection)?;
    let registry = BenchmarkRegistry::with_builtin();
    let controller = registry.create_controller(file.run, db)?;

    controller.start()?;
    let report = controller.wait_for_report();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if cleanup {
        info!("dropping benchmark schema");
        controller.cleanup()?;
    }
    Ok(())
}

async fn serve(path: Option<&std::path::Path>, listen: &str) -> Result<()> {
    let file: ServeFile = match path {
        Some(path) => Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("STAMPEDE_"))
            .extract()
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ServeFile::default(),
    };

    let mut connections: HashMap<String, Arc<dyn Database>> = HashMap::new();
    for (name, dsn) in &file.connections {
        connections.insert(name.clone(), stampede::db::from_dsn(dsn)?);
        info!(connection = %name, "registered connection");
    }

    RestServer::with_addr(listen, connections).serve().await
}
