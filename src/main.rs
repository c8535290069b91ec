use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bruteguard::config::GuardConfig;
use bruteguard::throttle::{ClientRequest, InMemorySharedCache, LocalEntryStore, Throttle};

#[derive(Debug, Parser)]
#[command(name = "bruteguard", version, about = "Brute-force throttling toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load and validate a configuration file
    Validate {
        /// Path to the YAML configuration
        config: PathBuf,
    },
    /// Replay a series of attempts against the engine and print each decision
    Simulate {
        /// Path to the YAML configuration (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Client identity, e.g. a remote address
        #[arg(long, default_value = "127.0.0.1")]
        identity: String,
        /// Operation name; defaults to the path
        #[arg(long)]
        operation: Option<String>,
        #[arg(long, default_value = "POST")]
        method: String,
        #[arg(long, default_value = "/login")]
        path: String,
        /// Number of attempts to replay
        #[arg(long, default_value_t = 12)]
        attempts: u32,
        /// Store payloads through the shared cache encoding
        #[arg(long)]
        shared: bool,
        /// Response status reported after the last attempt
        #[arg(long)]
        status: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { config } => {
            let config = GuardConfig::from_file(&config)?;
            info!("Configuration is valid");
            print_config(&config);
        }
        Command::Simulate {
            config,
            identity,
            operation,
            method,
            path,
            attempts,
            shared,
            status,
        } => {
            let config = match config {
                Some(file) => GuardConfig::from_file(&file)?,
                None => GuardConfig::default(),
            };

            let builder = Throttle::builder(config);
            let throttle = if shared {
                builder
                    .shared_cache(Arc::new(InMemorySharedCache::new()))
                    .build()?
            } else {
                builder.local_store(Arc::new(LocalEntryStore::new())).build()?
            };

            let request = ClientRequest::new(identity, method, path);
            let operation = request.operation_name(operation.as_deref()).to_string();

            for attempt in 1..=attempts {
                match throttle.check(&operation, &request).await? {
                    Some(decision) => println!(
                        "attempt {:>3}: hits={:<4} allowed={:<5} delay={}ms reset_at={}",
                        attempt,
                        decision.hit_count,
                        decision.is_allowed,
                        decision.applied_delay.as_millis(),
                        decision.reset_at.to_rfc3339()
                    ),
                    None => println!("attempt {:>3}: throttling disabled", attempt),
                }
            }

            if let Some(status) = status {
                let released = throttle.auto_release(status, &operation, &request).await?;
                println!("status {}: released={}", status, released);
            }
        }
    }

    Ok(())
}

fn print_config(config: &GuardConfig) {
    println!("Enabled:                   {}", config.enabled);
    println!("GreenRetries:              {}", config.green_retries);
    println!("IncreaseRequestTime:       {}ms", config.increase_request_time_ms);
    println!("TimeUntilReset:            {}", config.time_until_reset);
    println!("TimeUntilResetUnit:        {}", config.time_until_reset_unit);
    println!(
        "StatusCodesForAutoProcess: {:?}",
        config.status_codes_for_auto_process
    );
}
