//! Tessera command line
//!
//! Runs the engine's decision logic on JSON files, without any backend:
//! plan a patch, compare schemas, build extended schemas and index mappings,
//! or check how a tile would be sampled.

mod commands;
mod config;

use clap::Parser;
use tracing::debug;

use crate::config::CliConfig;

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tessera={},tessera_engine={}", level, level)));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();
    init_logging(&cli.log_level);

    let engine_config = cli.engine_config()?;
    if let Err(errors) = engine_config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    debug!(command = ?cli.command, version = tessera_engine::VERSION, "Running command");
    let output = commands::run(&cli.command, &engine_config).await?;

    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);

    Ok(())
}
