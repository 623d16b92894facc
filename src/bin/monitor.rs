//! Voltwatch Monitor
//!
//! Runs the price watchers and the diagnostics HTTP server in one process.
//! On unix, SIGHUP reloads the monitor configuration file.

use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use voltwatch::channels::ChannelRouter;
use voltwatch::config::{get_environment, Settings};
use voltwatch::core::http::{start_server, AppState};
use voltwatch::core::runtime::MonitorEngine;
use voltwatch::logging;
use voltwatch::metrics::Metrics;
use voltwatch::models::MonitorConfig;
use voltwatch::services::{
    BinanceRestClient, LogNotifier, NotificationSink, PriceSampler, WebhookNotifier,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    let _log_guard = logging::init_logging()?;

    let settings = Settings::from_env()?;
    info!("Starting Voltwatch monitor");
    info!(environment = %get_environment(), "Environment");

    let config = MonitorConfig::load(&settings.config_path)?;
    config.validate()?;
    info!(
        path = %settings.config_path.display(),
        instruments = config.instruments.len(),
        strategies = config.strategy_count(),
        channels = config.channels.len(),
        "Loaded monitor configuration"
    );

    let metrics = Arc::new(Metrics::new()?);

    let sampler: Arc<dyn PriceSampler> = Arc::new(BinanceRestClient::with_proxy(
        settings.binance_url.clone(),
        settings.proxy_url.as_deref(),
    )?);

    let sink: Arc<dyn NotificationSink> = match settings.webhook_url.clone() {
        Some(url) => {
            let mut notifier = WebhookNotifier::new(url, settings.engine.delivery_timeout)?;
            if let Some(secret) = settings.webhook_secret.clone() {
                notifier = notifier.with_secret(secret);
            }
            Arc::new(notifier)
        }
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let channels =
        Arc::new(ChannelRouter::new(&config.channels, sink.clone()).with_metrics(metrics.clone()));
    let engine = Arc::new(
        MonitorEngine::new(config, sampler, sink, settings.engine.clone())
            .with_metrics(metrics.clone()),
    );

    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
    let state = AppState::new(metrics, engine.clone(), channels.clone());
    let port = settings.port;
    let server_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = server_stop_rx.await;
        };
        if let Err(e) = start_server(port, state, shutdown).await {
            error!(error = %e, "HTTP server error");
        }
    });

    #[cfg(unix)]
    spawn_reload_on_hangup(engine.clone(), channels.clone(), settings.config_path.clone());

    let runner = engine.clone();
    let mut engine_handle = tokio::spawn(async move { runner.run().await });

    info!("Monitor started, waiting for shutdown signal...");
    let finished_early = tokio::select! {
        _ = signal::ctrl_c() => None,
        finished = &mut engine_handle => Some(finished),
    };
    let outcome = match finished_early {
        Some(finished) => finished,
        None => {
            info!("Shutting down monitor...");
            engine.shutdown().await;
            engine_handle.await
        }
    };

    let _ = server_stop_tx.send(());
    if let Err(e) = server_handle.await {
        error!(error = %e, "HTTP server task failed");
    }

    outcome??;
    info!("Monitor stopped");
    Ok(())
}

#[cfg(unix)]
fn spawn_reload_on_hangup(
    engine: Arc<MonitorEngine>,
    channels: Arc<ChannelRouter>,
    path: std::path::PathBuf,
) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGHUP, config reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            let config = match MonitorConfig::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!(error = %e, "configuration reload rejected, keeping current watchers");
                    continue;
                }
            };
            let routes = config.channels.clone();
            match engine.reload(config) {
                Ok(()) => {
                    channels.reload(&routes).await;
                    info!(path = %path.display(), "configuration reloaded");
                }
                Err(e) => error!(error = %e, "configuration reload rejected, keeping current watchers"),
            }
        }
    });
}
