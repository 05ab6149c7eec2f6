//! repovault command-line entry point.

mod commands;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = commands::Cli::parse();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting repovault");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run(cli))
}
