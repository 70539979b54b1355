mod api;
mod config;
mod error;
mod evaluator;
mod logging;
mod monitor;
mod notify;
mod sink;
mod source;
mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::routes::{router, ApiState};
use crate::api::{CycleLatency, MonitorStats};
use crate::config::{Config, LogConfig};
use crate::error::Result;
use crate::monitor::{Monitor, MonitorParams, Stop};
use crate::notify::TelegramDispatcher;
use crate::sink::SheetsSink;
use crate::source::WebDriverSource;

#[tokio::main]
async fn main() {
    // Logging starts from the environment alone so settings-file notices are kept.
    let log_cfg = LogConfig::from_env();
    let log_guard = match logging::init(&log_cfg.level, &log_cfg.dir) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Logging setup error: {e}");
            std::process::exit(1);
        }
    };

    let cfg = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Config error: {e}");
            drop(log_guard);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        drop(log_guard);
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    info!("Auction ratio alerter launched");

    let stats = Arc::new(MonitorStats::new());
    let latency = Arc::new(CycleLatency::new());

    // --- Status API ---
    if cfg.api_port != 0 {
        let state = ApiState {
            stats: Arc::clone(&stats),
            latency: Arc::clone(&latency),
            collection_url: cfg.collection_url.clone(),
            threshold: cfg.threshold,
        };
        let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
        match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => {
                info!("Status API listening on {bind_addr}");
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, router(state)).await {
                        error!("Status API stopped: {e}");
                    }
                });
            }
            Err(e) => error!("Status API disabled, cannot bind {bind_addr}: {e}"),
        }
    }

    // --- Shutdown signal ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            signal_cancel.cancel();
        }
    });

    // --- Collaborators ---
    let dispatcher = TelegramDispatcher::new(cfg.telegram.clone())?;
    let sink = SheetsSink::new(cfg.sheets.clone())?;
    let source = WebDriverSource::start(&cfg.browser, cfg.selectors.clone(), cfg.waits.clone()).await?;

    let monitor = Monitor::new(
        MonitorParams::from_config(&cfg),
        source,
        dispatcher,
        sink,
        stats,
        latency,
        cancel,
    );

    // A failed startup wait ends the run normally, without a failure status.
    match monitor.run().await {
        Stop::Cancelled => info!("Shut down cleanly"),
        Stop::Fatal(e) => warn!("Run ended: {e}"),
    }
    Ok(())
}
