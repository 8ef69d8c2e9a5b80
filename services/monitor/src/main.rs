//! Camera Monitor Service for VMS camera fleets
//!
//! This service accepts monitor requests over HTTP, runs a bounded number of
//! short person-detection sessions against recorder cameras, and raises
//! events on the upstream VMS when a person is confirmed.
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/default.toml, config/{env}.toml)
//! 2. Environment variables (prefixed with MONITOR_)
//!
//! See `config.rs` for detailed configuration options.

use anyhow::Context;
use camwatch_monitor::api::{start_api_server, AppState};
use camwatch_monitor::config::{LoggingConfig, MonitorConfig};
use camwatch_monitor::{
    AdmissionScheduler, CameraSessionLauncher, DetectionAdapter, FfmpegLauncher, FfprobeProber,
    HttpDetector, JsonInventory, SessionContext, SessionExit, SessionOutcome, VmsClient,
    VmsReporter, ZoneRegistry,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_config()?;

    // Initialize logging
    init_logging(&config.logging)?;

    info!(
        service = "camwatch-monitor",
        version = env!("CARGO_PKG_VERSION"),
        capacity = config.scheduler.capacity,
        vms = %config.vms.base_url,
        "Starting camera monitor service"
    );

    // Validate configuration
    config.validate()?;

    match run_service(config).await {
        Ok(()) => {
            info!("Monitor service completed successfully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Monitor service failed");
            Err(e)
        }
    }
}

/// Load configuration, falling back to the environment alone.
fn load_config() -> anyhow::Result<MonitorConfig> {
    let config = MonitorConfig::load().or_else(|e| {
        warn!(error = %e, "Failed to load config from files, trying environment");
        MonitorConfig::from_env()
    })?;

    Ok(config)
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_level(&config.level);

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("camwatch_monitor={}", level).parse()?)
        .add_directive("tower_http=info".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

/// Wire the components, serve until a shutdown signal, then drain sessions.
async fn run_service(config: MonitorConfig) -> anyhow::Result<()> {
    // VMS client and reporter
    let vms_client = Arc::new(VmsClient::new(&config.vms).context("Failed to create VMS client")?);
    info!(base_url = %config.vms.base_url, "Authenticating with VMS...");
    vms_client
        .authenticate(&config.vms)
        .await
        .context("Failed to authenticate with VMS")?;
    let reporter = Arc::new(VmsReporter::new(vms_client, config.vms.clone()));

    // Inventory and zones
    let inventory = Arc::new(
        JsonInventory::load(&config.inventory.path)
            .with_context(|| format!("Failed to load inventory from {}", config.inventory.path))?,
    );
    let zones = match &config.zones.path {
        Some(path) => ZoneRegistry::load(path).with_context(|| format!("Failed to load zones from {}", path))?,
        None => {
            info!("No zones configured; detections are not spatially filtered");
            ZoneRegistry::empty()
        }
    };

    // Detection
    let detector = HttpDetector::new(&config.detector, &config.decoder.pixel_format)
        .context("Failed to create detector client")?;
    let detector = Arc::new(DetectionAdapter::new(Arc::new(detector), &config.detector));

    let context = SessionContext {
        config: config.session.clone(),
        terminate_grace: config.decoder.terminate_grace(),
        prober: Arc::new(FfprobeProber::new(&config.decoder)),
        launcher: Arc::new(FfmpegLauncher::new(&config.decoder)),
        detector,
        reporter,
        zones: Arc::new(zones),
    };

    // Scheduler
    let launcher = Arc::new(CameraSessionLauncher::new(inventory, context));
    let scheduler = Arc::new(AdmissionScheduler::new(config.scheduler.clone(), launcher));
    scheduler.start()?;

    // Intake API
    let shutdown = CancellationToken::new();
    let api_handle = tokio::spawn({
        let state = AppState {
            scheduler: scheduler.clone(),
        };
        let api_config = config.api.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = start_api_server(state, &api_config, async move { shutdown.cancelled().await }).await {
                error!(error = %e, "API server error");
            }
        }
    });

    info!("Monitor service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Initiating graceful shutdown...");

    shutdown.cancel();
    if let Err(e) = api_handle.await {
        warn!(error = %e, "API server task ended abnormally");
    }

    let status = scheduler.status();
    let outcomes = scheduler.shutdown().await;

    log_final_stats(status.admitted_total, status.dropped_total, status.pending, &outcomes);

    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

/// Log final statistics on shutdown.
fn log_final_stats(admitted: u64, dropped: u64, pending: usize, drained: &[SessionOutcome]) {
    info!("=== Final Statistics ===");
    info!(
        admitted_total = admitted,
        dropped_total = dropped,
        pending_discarded = pending,
        "Scheduler final stats"
    );

    let stopped = drained
        .iter()
        .filter(|o| o.exit == SessionExit::Stopped)
        .count();
    let events: u64 = drained.iter().map(|o| o.stats.events_sent).sum();
    info!(
        drained_sessions = drained.len(),
        stopped,
        events_sent = events,
        "Sessions drained at shutdown"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }
}
