use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};

use bucketgate::config::{BucketgateConfig, LogFormat, StrategyKind};
use bucketgate::logging;
use bucketgate::ratelimit::{build_strategy, Decision, RateLimitStrategy, TokenBucketLimiter};
use bucketgate::store::RedisStore;

/// Distributed token bucket rate limiting against a shared Redis store.
#[derive(Parser, Debug)]
#[command(name = "bucketgate", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short, value_name = "PATH", env = "BUCKETGATE_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `bucketgate=debug`
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make one or more admission decisions and print them as JSON lines
    Check {
        identity: String,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Print the stored bucket for an identity without spending a token
    Inspect { identity: String },
    /// Make a decision every interval until interrupted
    Probe {
        identity: String,
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        interval_ms: u64,
    },
}

#[derive(Serialize)]
struct DecisionOutput<'a> {
    identity: &'a str,
    #[serde(flatten)]
    decision: Decision,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectOutput<'a> {
    identity: &'a str,
    key: String,
    exists: bool,
    tokens: Option<f64>,
    last_refill: Option<f64>,
    last_refill_at: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = BucketgateConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    logging::init(&config.logging)?;

    info!("Starting Bucketgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(
        RedisStore::connect(&config.store)
            .await
            .context("failed to open quota store")?,
    );

    let outcome = run(cli.command, &config, store.clone()).await;

    // Closed on every exit path, including command failures.
    store.close();
    info!("Bucketgate stopped");
    outcome
}

async fn run(
    command: Command,
    config: &BucketgateConfig,
    store: Arc<RedisStore>,
) -> anyhow::Result<()> {
    match command {
        Command::Check { identity, count } => {
            let strategy = build_strategy(&config.rate_limiting, store)?;
            for _ in 0..count {
                let decision = strategy.is_allowed(&identity).await?;
                print_json(&DecisionOutput {
                    identity: &identity,
                    decision,
                })?;
            }
            Ok(())
        }
        Command::Inspect { identity } => {
            if config.rate_limiting.strategy != StrategyKind::TokenBucket {
                bail!("inspect is only available for the token_bucket strategy");
            }
            let limiter = TokenBucketLimiter::new(
                store,
                config.rate_limiting.capacity,
                config.rate_limiting.refill_rate,
            )?
            .with_key_prefix(config.rate_limiting.key_prefix.as_str())?;

            let state = limiter.bucket_state(&identity).await?;
            print_json(&InspectOutput {
                identity: &identity,
                key: limiter.key_for(&identity),
                exists: state.is_some(),
                tokens: state.map(|s| s.tokens),
                last_refill: state.map(|s| s.last_refill),
                last_refill_at: state.and_then(|s| {
                    chrono::DateTime::from_timestamp_millis((s.last_refill * 1000.0) as i64)
                        .map(|t| t.to_rfc3339())
                }),
            })
        }
        Command::Probe {
            identity,
            interval_ms,
        } => {
            if interval_ms == 0 {
                bail!("--interval-ms must be greater than zero");
            }
            let strategy = build_strategy(&config.rate_limiting, store)?;
            probe(
                strategy,
                &identity,
                Duration::from_millis(interval_ms),
                shutdown_signal(),
            )
            .await
        }
    }
}

/// Decide once per `interval` until `shutdown` resolves.
///
/// An unreachable backend is logged and retried on the next tick; corrupt
/// state ends the probe.
async fn probe<F>(
    strategy: Arc<dyn RateLimitStrategy>,
    identity: &str,
    interval: Duration,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                match strategy.is_allowed(identity).await {
                    Ok(decision) => {
                        info!(
                            identity = %identity,
                            allowed = decision.allowed,
                            tokens_remaining = decision.tokens_remaining,
                            "Probe decision"
                        );
                        print_json(&DecisionOutput { identity, decision })?;
                    }
                    Err(e) if e.is_backend_unavailable() => {
                        warn!(identity = %identity, error = %e, "Quota backend unavailable");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
