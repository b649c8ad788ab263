//! Audio Expert CLI
//!
//! Command-line control surface for the effect chain.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use audio_expert::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Audio Expert v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_ref(), cli.storage_dir.clone())?;
    match cli.command {
        Commands::Show => commands::show(&config).await,
        Commands::Volume { value } => commands::set_volume(&config, value).await,
        Commands::Set {
            module,
            param,
            value,
        } => commands::set_param(&config, &module, &param, value).await,
        Commands::Toggle { module, state } => {
            commands::toggle(&config, &module, state.is_on()).await
        }
        Commands::Reset => commands::reset(&config).await,
        Commands::Simulate { ticks } => commands::simulate(&config, ticks).await,
    }
}
