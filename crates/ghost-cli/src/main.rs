//! Ghost Drive - encrypted file transfers from the command line

use anyhow::Context;
use clap::{Parser, Subcommand};
use ghost_cli::{CliConfig, commands};
use ghost_client::{CancellationToken, ClientError, GhostClient};
use ghost_crypto::chunk;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ghost-drive")]
#[command(about = "Client-side encrypted uploads and downloads for Ghost Drive")]
#[command(version)]
struct Args {
    /// Backend API endpoint
    #[arg(long, default_value = "http://localhost:3000", env = "GHOST_API_URL")]
    endpoint: String,

    /// Bearer token for the backend API
    #[arg(long, env = "GHOST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "300", env = "GHOST_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Attempts per network call
    #[arg(long, default_value = "3", env = "GHOST_MAX_RETRIES")]
    max_retries: u32,

    /// Crypto worker threads (default: min(cores, 8))
    #[arg(long, env = "GHOST_WORKERS")]
    workers: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, env = "GHOST_DEBUG")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new file key protected by a 6-digit PIN
    InitPin {
        #[arg(long, env = "GHOST_PIN", hide_env_values = true)]
        pin: String,
    },
    /// Re-wrap the file key under a new PIN
    ChangePin {
        #[arg(long)]
        old_pin: String,
        #[arg(long)]
        new_pin: String,
    },
    /// Encrypt and upload a file
    Upload {
        /// File to upload
        file: PathBuf,
        /// Object key to store it under
        object_key: String,
        #[arg(long, env = "GHOST_PIN", hide_env_values = true)]
        pin: String,
    },
    /// Download and decrypt a file
    Download {
        /// Object key to fetch
        object_key: String,
        /// Original plaintext size in bytes
        size: u64,
        /// Where to write the plaintext
        output: PathBuf,
        #[arg(long, env = "GHOST_PIN", hide_env_values = true)]
        pin: String,
    },
    /// Show how a file of SIZE bytes would be chunked
    Plan {
        size: u64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Parse arguments
    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("ghost_client={0},ghost_cli={0},ghost_drive={0}", log_level).into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CliConfig {
        endpoint: args.endpoint,
        token: args.token,
        timeout_secs: args.timeout_secs,
        max_retries: args.max_retries,
        workers: args.workers,
    };

    match run(args.command, &config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(client_error) = e.downcast_ref::<ClientError>() {
                eprintln!("{}", client_error.user_message());
            }
            Err(e)
        }
    }
}

async fn run(command: Command, config: &CliConfig) -> anyhow::Result<()> {
    if let Command::Plan { size, json } = command {
        let report = commands::plan_report(size, chunk::CHUNK_SIZE, chunk::MULTIPART_THRESHOLD);
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "{} bytes -> {} bytes stored ({})",
                report.file_size,
                report.encrypted_size,
                if report.multipart { "multipart" } else { "single object" }
            );
            for c in &report.chunks {
                println!(
                    "  part {:>4}  plain {:>12}..{:<12}  sealed {:>12}..{}",
                    c.part_number, c.plaintext.0, c.plaintext.1, c.ciphertext.0, c.ciphertext.1
                );
            }
        }
        return Ok(());
    }

    let client = GhostClient::new(config.client_config()).context("failed to build client")?;
    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());

    match command {
        Command::InitPin { pin } => {
            commands::init_pin(&client, &pin).await?;
            println!("PIN set");
        }
        Command::ChangePin { old_pin, new_pin } => {
            commands::change_pin(&client, &old_pin, &new_pin).await?;
            println!("PIN changed");
        }
        Command::Upload { file, object_key, pin } => {
            let outcome = commands::upload(&client, &pin, &file, &object_key, cancel)
                .await
                .with_context(|| format!("uploading {}", file.display()))?;
            println!(
                "uploaded {} ({} bytes, {} stored, {} parts)",
                outcome.object_name,
                outcome.plaintext_size,
                outcome.encrypted_size,
                outcome.parts.len()
            );
        }
        Command::Download { object_key, size, output, pin } => {
            commands::download(&client, &pin, &object_key, size, &output, cancel)
                .await
                .with_context(|| format!("downloading {}", object_key))?;
            println!("wrote {}", output.display());
        }
        Command::Plan { .. } => {}
    }

    Ok(())
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling transfer");
            cancel.cancel();
        }
    });
}
