//! Sumi-Fetch main entry point
//!
//! This is the command-line interface for the Sumi-Fetch rate-limited fetcher.

use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use sumi_fetch::config::{load_config_with_hash, validate_target_url, Config};
use sumi_fetch::output::{collect_statistics, print_statistics, print_summary, BatchSummary};
use sumi_fetch::{BatchDispatcher, Fetcher};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Fetch: an adaptive, rate-limited HTTP fetcher
///
/// Sumi-Fetch fetches a batch of URLs concurrently while learning each
/// endpoint's rate limit from 429 responses and rate-limit headers.
#[derive(Parser, Debug)]
#[command(name = "sumi-fetch")]
#[command(version = "1.0.0")]
#[command(about = "An adaptive, rate-limited HTTP fetcher", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URLs to fetch (defaults to [batch] urls from the config)
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be fetched without sending requests
    #[arg(long)]
    dry_run: bool,

    /// API key sent as X-API-KEY (overrides [auth] api-key-env)
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,

    /// Starting requests per second for new endpoints (overrides initial-rate)
    #[arg(long, value_name = "RPS")]
    rate: Option<f64>,

    /// Cancel the whole batch after this many seconds
    #[arg(long, value_name = "N")]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(rate) = cli.rate {
        if !rate.is_finite() || rate < sumi_fetch::limiter::MIN_RATE {
            return Err(format!(
                "--rate must be >= {}, got {}",
                sumi_fetch::limiter::MIN_RATE,
                rate
            )
            .into());
        }
        config.fetcher.initial_rate = rate;
    }

    let urls = if cli.urls.is_empty() {
        config.batch.urls.clone()
    } else {
        for url in &cli.urls {
            validate_target_url(url, config.fetcher.https_only)?;
        }
        cli.urls.clone()
    };

    if urls.is_empty() {
        return Err("No URLs to fetch: pass them on the command line or set [batch] urls".into());
    }

    let api_key = cli.api_key.clone().or_else(|| config.auth.resolve_api_key());

    if cli.dry_run {
        handle_dry_run(&config, &urls, api_key.is_some());
    } else {
        handle_fetch(config, &urls, api_key.as_deref(), &config_hash, cli.timeout_secs).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_fetch=info,warn"),
            1 => EnvFilter::new("sumi_fetch=debug,info"),
            2 => EnvFilter::new("sumi_fetch=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective settings and targets
fn handle_dry_run(config: &Config, urls: &[String], has_api_key: bool) {
    println!("=== Sumi-Fetch Dry Run ===\n");

    println!("Fetcher Configuration:");
    println!("  Initial rate: {} req/s", config.fetcher.initial_rate);
    println!("  Max attempts: {}", config.fetcher.max_attempts);
    println!("  Request timeout: {}ms", config.fetcher.request_timeout_ms);
    println!("  Connect timeout: {}ms", config.fetcher.connect_timeout_ms);
    println!(
        "  Max response size: {} bytes",
        config.fetcher.max_response_bytes
    );
    println!("  Key strategy: {:?}", config.fetcher.key_strategy);
    println!("  Max tracked keys: {}", config.fetcher.max_tracked_keys);
    println!("  HTTPS only: {}", config.fetcher.https_only);

    println!("\nBatch:");
    if config.batch.max_in_flight == 0 {
        println!("  Max in flight: unlimited");
    } else {
        println!("  Max in flight: {}", config.batch.max_in_flight);
    }
    println!("  API key: {}", if has_api_key { "set" } else { "none" });

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nTargets ({}):", urls.len());
    for url in urls {
        println!("  - {}", url);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Would fetch {} URLs", urls.len());
}

/// Handles the main fetch operation
async fn handle_fetch(
    config: Config,
    urls: &[String],
    api_key: Option<&str>,
    config_hash: &str,
    timeout_secs: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let fetcher = Fetcher::new(&config)?;
    let dispatcher = BatchDispatcher::new(fetcher).with_max_in_flight(config.batch.max_in_flight);

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, timeout_secs);

    let started = Instant::now();
    let outcome = dispatcher
        .fetch_batch_detailed(urls, api_key, config.fetcher.initial_rate, &cancel)
        .await;
    let duration = started.elapsed();

    if cancel.is_cancelled() {
        tracing::warn!("Batch was cancelled before every URL finished");
    }

    let summary = BatchSummary::from_outcome(urls, &outcome, duration, config_hash);
    print_summary(&summary);
    print_statistics(&collect_statistics(dispatcher.fetcher().registry()));

    if summary.succeeded() == 0 {
        return Err(format!("All {} URLs failed", summary.entries.len()).into());
    }

    Ok(())
}

/// Cancels the batch on Ctrl-C or when the optional timeout elapses
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout_secs: Option<u64>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = on_signal.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::warn!("Interrupted, cancelling outstanding fetches");
                    on_signal.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
            },
        }
    });

    if let Some(secs) = timeout_secs {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = on_timeout.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    tracing::warn!("Timeout of {}s reached, cancelling batch", secs);
                    on_timeout.cancel();
                }
            }
        });
    }
}
