/*!
 * kbus command-line interface
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kbus::commands::{self, PublishArgs};
use kbus::config::BusConfig;
use kbus::logging::init_logging;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// kbus - lifecycle event bus broker and client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bus address, overriding the configuration file
    #[arg(short, long, env = "KBUS_ADDRESS", global = true)]
    address: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the broker until Ctrl-C
    Serve,

    /// Publish an event to every subscriber
    Publish {
        /// Event type, e.g. "ready" or "cleanup"
        #[arg(short = 't', long = "type")]
        event_type: String,

        #[arg(short, long, default_value = "")]
        payload: String,

        #[arg(short, long, default_value = "")]
        resource_id: String,

        /// Extra data as a JSON object
        #[arg(long)]
        data: Option<String>,
    },

    /// Signal that a resource has completed
    Signal {
        #[arg(short, long)]
        resource_id: String,

        #[arg(short, long)]
        status: String,

        /// Extra data as a JSON object
        #[arg(long)]
        data: Option<String>,
    },

    /// Wait for a resource to complete and print its state
    WaitCompletion {
        #[arg(short, long)]
        resource_id: String,

        /// Seconds to wait; 0 uses the broker default
        #[arg(short, long, default_value_t = 0)]
        timeout: i64,
    },

    /// Wait for a cleanup or dockercleanup event
    WaitCleanup {
        /// Seconds to wait; 0 uses the client default
        #[arg(short, long, default_value_t = 0)]
        timeout: i64,
    },

    /// Print broker health and client diagnostics
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        BusConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(address) = cli.address {
        config.server.address = address;
    }
    config.logging.verbose = cli.debug;

    init_logging(&config.logging).context("Failed to initialize logging")?;

    let output = match cli.command {
        Command::Serve => {
            let shutdown = CancellationToken::new();
            spawn_ctrl_c_handler(shutdown.clone());
            commands::serve(&config, shutdown)
                .await
                .context("Broker failed")?;
            return Ok(());
        }
        Command::Publish {
            event_type,
            payload,
            resource_id,
            data,
        } => {
            let args = PublishArgs {
                event_type,
                payload,
                resource_id,
                data: commands::parse_data(data.as_deref())?,
            };
            commands::publish(&config, args)
                .await
                .context("Failed to publish event")?
        }
        Command::Signal {
            resource_id,
            status,
            data,
        } => {
            let data = commands::parse_data(data.as_deref())?;
            commands::signal(&config, &resource_id, &status, data)
                .await
                .with_context(|| format!("Failed to signal completion of {resource_id}"))?
        }
        Command::WaitCompletion {
            resource_id,
            timeout,
        } => commands::wait_completion(&config, &resource_id, timeout)
            .await
            .with_context(|| format!("Failed waiting for {resource_id}"))?,
        Command::WaitCleanup { timeout } => commands::wait_cleanup(&config, timeout)
            .await
            .context("Failed waiting for cleanup signal")?,
        Command::Health => commands::health(&config)
            .await
            .context("Health check failed")?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn spawn_ctrl_c_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
