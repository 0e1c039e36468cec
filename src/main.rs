use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use channels_gateway::config::ServerConfig;
use channels_gateway::irc::listener::start_irc_listener;
use channels_gateway::state::credentials::hash_password;

#[derive(Parser)]
#[command(name = "channels-gateway", version, about = "IRC gateway for Channels")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "channels.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Print an argon2 hash for an `[[accounts]]` entry.
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::HashPassword { password }) = &cli.command {
        println!("{}", hash_password(password)?);
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (TOML file + env overrides)
    let config = ServerConfig::load(&cli.config)?;

    let state = config.to_state().shared();
    let liveness = Arc::new(config.to_liveness_config());

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let irc_addr = config.gateway.irc_address.clone();
    let irc_cancel = cancel.clone();
    let mut listener = tokio::spawn(async move {
        start_irc_listener(&irc_addr, liveness, state, irc_cancel).await
    });

    info!(
        "Channels gateway {} starting on {}",
        config.gateway.name, config.gateway.irc_address
    );

    let interrupted = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            true
        }
        res = &mut listener => {
            res?.context("IRC listener failed")?;
            false
        }
    };

    if interrupted {
        info!("Shutdown signal received, stopping gracefully...");
        cancel.cancel();
        listener.await?.context("IRC listener failed")?;
    }

    info!("Channels gateway stopped");
    Ok(())
}
