//! League Auto Accept - automatic ready-check acceptance
//!
//! Main entry point for the background utility.
//!
//! # Execution Flow
//!
//! 1. Parse the command line and load `config.yaml` (defaults written on first run)
//! 2. Initialize logging → `<config dir>/logs/autoaccept.<date>`
//! 3. Create tokio runtime with 4 worker threads
//! 4. Wire the detection engine to the real platform (lockfile discovery,
//!    HTTPS transport, screen capture, synthetic input)
//! 5. Run the supervised detection and housekeeping loops plus the
//!    notification dispatcher until Ctrl-C
//! 6. Drain the loops, log the metrics summary, save the config and shut the
//!    runtime down with a 5s timeout

use anyhow::{Context, Result};
use autoaccept::logging::{LoggingOptions, setup_logging_with_console};
use autoaccept::platform::{DesktopCapture, DesktopPointer, ProcessQuery, SystemProcessQuery};
use autoaccept::services::{
    ApiClient, ArbitratorSettings, ConnectionDiscovery, DetectionArbitrator, Housekeeping,
    HttpsTransport, InputSynthesizer, NotificationDispatcher, RetryPolicy, Supervisor,
    SupervisorReport, VisualDetector,
};
use autoaccept::{
    APP_NAME, AppConfig, ApplicationState, ConfigManager, PerformanceMetrics, StateManager, VERSION,
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

const WORKER_THREADS: usize = 4;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "autoaccept", version, about = "Automatically accepts League of Legends ready checks")]
struct Cli {
    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    debug: bool,

    /// Also log to the console
    #[arg(short, long)]
    console: bool,

    /// Write the log file as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Path to the configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn config_manager(cli: &Cli) -> Result<ConfigManager> {
    match &cli.config {
        Some(path) => {
            let path = Utf8PathBuf::from_path_buf(path.clone())
                .map_err(|p| anyhow::anyhow!("Config path is not valid UTF-8: {}", p.display()))?;
            ConfigManager::with_file(path)
        }
        None => ConfigManager::new(ConfigManager::default_config_dir()),
    }
}

fn build_arbitrator(
    config: &AppConfig,
    state: Arc<StateManager>,
    metrics: Arc<PerformanceMetrics>,
    shutdown: watch::Receiver<bool>,
) -> Result<DetectionArbitrator<HttpsTransport>> {
    let processes: Arc<dyn ProcessQuery> = Arc::new(SystemProcessQuery::new());
    let lockfiles = config.lockfile_paths.iter().map(Utf8PathBuf::from).collect();
    let discovery =
        ConnectionDiscovery::new(lockfiles, processes).with_client_label(config.client_label.clone());

    let transport =
        HttpsTransport::new(config.lcu_timeout()).context("Failed to build the HTTPS transport")?;
    let mut client = ApiClient::new(transport, discovery, Arc::clone(&metrics)).with_shutdown(shutdown);
    client.set_retry_policy(RetryPolicy::new(
        config.max_retries,
        config.retry_delay(),
        config.auto_reconnect,
    ));
    client.set_timeout(config.lcu_timeout());

    let mut detector = VisualDetector::new(Arc::new(DesktopCapture::new()), Arc::clone(&metrics));
    detector.set_threshold(config.template_match_threshold)?;
    detector.set_ui_scale_factor(config.ui_scale_factor)?;
    detector.set_search_region(config.search_region);
    if config.multi_scale_matching {
        detector.set_multi_scale(Some(config.scale_range));
    }
    if let Some(path) = &config.template_path {
        if let Err(e) = detector.load_template(Utf8Path::new(path)) {
            tracing::warn!("{}, using the built-in template", e);
        }
    }

    let input = InputSynthesizer::new(Arc::new(DesktopPointer::new()), Arc::clone(&metrics));

    Ok(DetectionArbitrator::new(
        client,
        detector,
        input,
        state,
        metrics,
        ArbitratorSettings::from(config),
    ))
}

async fn run(
    arbitrator: DetectionArbitrator<HttpsTransport>,
    config: &AppConfig,
    state: Arc<StateManager>,
    metrics: Arc<PerformanceMetrics>,
    shutdown_tx: watch::Sender<bool>,
) {
    let shutdown_rx = shutdown_tx.subscribe();

    let dispatcher = NotificationDispatcher::new(
        config.enable_notifications,
        state.subscribe(),
        shutdown_rx.clone(),
    );
    let dispatcher = tokio::spawn(dispatcher.run());

    let detection = tokio::spawn(
        Supervisor::new(shutdown_rx.clone()).run(Arc::new(Mutex::new(arbitrator))),
    );
    let housekeeping = tokio::spawn(
        Supervisor::new(shutdown_rx).run(Arc::new(Mutex::new(Housekeeping::new(metrics)))),
    );

    state.set_application_state(if state.is_active() {
        ApplicationState::Monitoring
    } else {
        ApplicationState::Idle
    });
    tracing::info!(
        "Watching for ready checks (method={}, polling={}ms, emergency hotkey={})",
        config.detection_method,
        config.polling_interval,
        config.emergency_hotkey
    );

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C, shutting down: {}", e),
    }

    state.set_application_state(ApplicationState::ShuttingDown);
    // Receivers outlive the send; the loops observe it on their next check
    let _ = shutdown_tx.send(true);

    for (name, handle) in [("detection", detection), ("housekeeping", housekeeping)] {
        match handle.await {
            Ok(SupervisorReport {
                cycles,
                failures,
                panics,
            }) => tracing::info!(
                "{} loop drained: {} cycles, {} failures, {} panics",
                name,
                cycles,
                failures,
                panics
            ),
            Err(e) => tracing::error!("{} loop ended abnormally: {}", name, e),
        }
    }

    match dispatcher.await {
        Ok(delivered) => tracing::debug!("{} notifications delivered", delivered),
        Err(e) => tracing::error!("Notification dispatcher ended abnormally: {}", e),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = config_manager(&cli)?;
    let config = config_manager.load_config()?;

    let log_dir = config_manager.config_dir().join("logs");
    let _guard = setup_logging_with_console(&LoggingOptions {
        log_dir: log_dir.to_string(),
        log_prefix: APP_NAME.to_string(),
        level: if cli.debug {
            "debug".to_string()
        } else {
            config.log_level.as_filter().to_string()
        },
        console_output: cli.console,
        json: cli.json_logs,
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Using config {}", config_manager.config_path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("autoaccept-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let state = Arc::new(StateManager::new());
    state.set_application_state(ApplicationState::Initializing);
    state.load_from_config(&config);

    let metrics = Arc::new(PerformanceMetrics::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let arbitrator =
        build_arbitrator(&config, Arc::clone(&state), Arc::clone(&metrics), shutdown_rx)?;

    runtime.block_on(run(
        arbitrator,
        &config,
        Arc::clone(&state),
        Arc::clone(&metrics),
        shutdown_tx,
    ));

    metrics.log_summary();

    let final_config = AppConfig {
        auto_accept_enabled: state.read(|s| s.auto_accept_enabled),
        ..config
    };
    if let Err(e) = config_manager.save_config(&final_config) {
        tracing::error!("Failed to save config on shutdown: {:#}", e);
    }

    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    tracing::info!("Application shutdown complete");
    Ok(())
}
