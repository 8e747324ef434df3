//! discord2pushover - Route Discord messages and reactions to Pushover.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use discord2pushover::cli::{Cli, LogFormat};
use discord2pushover::config::{Config, RuntimeConfig};
use discord2pushover::discord::{DiscordClient, Gateway};
use discord2pushover::notify::PushoverClient;
use discord2pushover::{AckTracker, Dispatcher, EventRouter, MetricsServer, initialize_metrics};

/// Capacity of the gateway -> router event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Log level used when neither `RUST_LOG` nor `logLevel` is set.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Build the log filter: `RUST_LOG` wins, then the config `logLevel`, then info.
///
/// Returns the rejected level, if any, so it can be reported once logging is up.
fn log_filter(config_level: Option<&str>) -> (EnvFilter, Option<String>) {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return (EnvFilter::from_default_env(), None);
    }

    match config_level {
        Some(level) => {
            let normalized = level.trim().to_lowercase();
            match normalized.parse::<tracing::Level>() {
                Ok(_) => (EnvFilter::new(normalized), None),
                Err(_) => (EnvFilter::new(DEFAULT_LOG_LEVEL), Some(level.to_string())),
            }
        }
        None => (EnvFilter::new(DEFAULT_LOG_LEVEL), None),
    }
}

/// Initialize the tracing subscriber with the specified log format.
///
/// - `LogFormat::Text`: Human-readable format
/// - `LogFormat::Json`: Structured JSON format for log aggregation
fn init_logging(format: LogFormat, filter: EnvFilter) {
    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is configured from the file, so load errors go straight to stderr.
    let cwd = std::env::current_dir()?;
    let config_path = match Config::resolve_path(cli.config.as_deref(), &cwd) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {} ({})", e, config_path.display());
            std::process::exit(1);
        }
    };

    let (filter, rejected_level) = log_filter(config.log_level.as_deref());
    init_logging(cli.log_format, filter);
    if let Some(level) = rejected_level {
        warn!(log_level = %level, "Invalid logLevel in configuration, using info");
    }

    info!(config_path = %config_path.display(), "Configuration loaded");

    // Fail fast on invalid configuration
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(
            error_count = errors.len(),
            "Configuration validation failed"
        );
        std::process::exit(1);
    }

    let warnings = config.warnings();
    for warning in &warnings {
        warn!(warning = %warning, "Configuration warning");
    }

    if cli.validate {
        print_summary(&config_path, &config, warnings.len());
        return Ok(());
    }

    let runtime_config = config.compile();

    info!(
        rule_count = runtime_config.rules.len(),
        priority_order = %runtime_config.priority_order,
        "discord2pushover starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(runtime_config))
}

fn print_summary(path: &Path, config: &Config, warning_count: usize) {
    println!("Configuration is valid: {}", path.display());
    println!(
        "  Rules: {} ({} emergency)",
        config.rules.len(),
        config
            .rules
            .iter()
            .filter(|r| discord2pushover::priority::is_emergency(r.actions.priority))
            .count()
    );
    println!("  Priority order: {}", config.priority_order);
    println!(
        "  Acknowledgement poll interval: {}",
        humantime_serde::re::humantime::format_duration(config.ack_poll_interval)
    );
    println!(
        "  Metrics: {} (port {})",
        if config.metrics.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.metrics.port
    );
    if warning_count > 0 {
        println!("  Warnings: {}", warning_count);
    }
}

/// Resolve once any shutdown signal (ctrl-c, or SIGTERM on unix) arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Main async entry point.
async fn run(runtime_config: RuntimeConfig) -> Result<()> {
    // Shared HTTP client for connection pooling
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let cancel = CancellationToken::new();

    // Start metrics server if enabled
    let metrics_handle = if runtime_config.metrics.enabled {
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let server = MetricsServer::with_ready_signal(runtime_config.metrics.port, ready_tx);
        let cancel_metrics = cancel.clone();
        info!(port = runtime_config.metrics.port, "Starting metrics server");
        let handle = tokio::spawn(async move {
            if let Err(e) = server.run(cancel_metrics).await {
                error!(error = %e, "Metrics server error");
            }
        });
        if ready_rx.await.is_ok() {
            let rule_names: Vec<&str> = runtime_config.rules.iter().map(|r| r.name.as_str()).collect();
            initialize_metrics(&rule_names);
        }
        Some(handle)
    } else {
        info!("Metrics server disabled");
        None
    };

    let discord = Arc::new(DiscordClient::new(
        http_client.clone(),
        runtime_config.discord_token.clone(),
    ));
    if let Err(e) = discord.resolve_identity().await {
        warn!(error = %e, "Could not resolve bot identity yet, waiting for gateway READY");
    }

    let push = Arc::new(PushoverClient::new(
        http_client,
        runtime_config.pushover_app_key.clone(),
    ));
    let tracker = Arc::new(AckTracker::new());
    let dispatcher = Dispatcher::new(
        push.clone(),
        discord.clone(),
        tracker.clone(),
        runtime_config.priority_order,
    );
    let router = Arc::new(EventRouter::new(
        discord.clone(),
        dispatcher,
        runtime_config.rules.clone(),
        runtime_config.priority_order,
    ));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let gateway = Gateway::new(runtime_config.discord_token.clone(), discord.clone(), events_tx);

    // Setup signal handler for graceful shutdown
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown");
        cancel_signal.cancel();
    });

    let router_handle = tokio::spawn(router.run(events_rx, cancel.clone()));
    let poller_handle = tokio::spawn(tracker.clone().run(
        runtime_config.ack_poll_interval,
        push,
        discord,
        cancel.clone(),
    ));

    // The gateway runs until cancelled or a non-recoverable error
    let gateway_result = gateway.run(cancel.clone()).await;
    cancel.cancel();
    drop(gateway);

    info!("Waiting for in-flight events to finish...");
    let _ = tokio::time::timeout(Duration::from_secs(5), router_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), poller_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    if !tracker.is_empty() {
        warn!(
            tracked = tracker.len(),
            "Emergency notifications still awaiting acknowledgement are no longer tracked"
        );
    }

    match gateway_result {
        Ok(()) => {
            info!("discord2pushover shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Gateway error");
            Err(anyhow::anyhow!("Gateway error: {}", e))
        }
    }
}
