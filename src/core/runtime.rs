//! Engine supervisor: owns the watcher set and its lifecycle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};

use crate::core::dispatcher::{dispatch_channel, DispatchSettings};
use crate::core::history::HistoryLedger;
use crate::core::watcher::{wait_until_true, CancelSignal, StrategyWatcher, WatcherContext};
use crate::errors::{ConfigError, EngineError};
use crate::metrics::Metrics;
use crate::models::strategy::MonitorConfig;
use crate::services::market_data::PriceSampler;
use crate::services::notifier::NotificationSink;
use crate::signals::volatility::WatcherState;

/// Timing and capacity knobs for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub fetch_timeout: Duration,
    /// Fixed delay after a failed fetch, independent of the strategy interval
    pub failure_backoff: Duration,
    pub delivery_timeout: Duration,
    pub dispatch_queue_capacity: usize,
    pub max_in_flight_deliveries: usize,
    pub drain_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            failure_backoff: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(5),
            dispatch_queue_capacity: 256,
            max_in_flight_deliveries: 16,
            drain_grace: Duration::from_secs(5),
        }
    }
}

impl EngineSettings {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            queue_capacity: self.dispatch_queue_capacity,
            max_in_flight: self.max_in_flight_deliveries,
            delivery_timeout: self.delivery_timeout,
            drain_grace: self.drain_grace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// `run` has not been called yet
    Idle,
    Running,
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
    }
}

struct StoppedGuard<'a>(&'a watch::Sender<bool>);

impl Drop for StoppedGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Runs one watcher per configured (instrument, strategy) pair until shut down.
pub struct MonitorEngine {
    settings: EngineSettings,
    sampler: Arc<dyn PriceSampler>,
    sink: Arc<dyn NotificationSink>,
    ledger: Arc<HistoryLedger>,
    metrics: Option<Arc<Metrics>>,
    config_tx: watch::Sender<Arc<MonitorConfig>>,
    shutdown_tx: watch::Sender<bool>,
    stopped_tx: watch::Sender<bool>,
    running: AtomicBool,
}

impl MonitorEngine {
    pub fn new(
        config: MonitorConfig,
        sampler: Arc<dyn PriceSampler>,
        sink: Arc<dyn NotificationSink>,
        settings: EngineSettings,
    ) -> Self {
        let (config_tx, _) = watch::channel(Arc::new(config));
        let (shutdown_tx, _) = watch::channel(false);
        let (stopped_tx, _) = watch::channel(false);
        Self {
            settings,
            sampler,
            sink,
            ledger: Arc::new(HistoryLedger::new()),
            metrics: None,
            config_tx,
            shutdown_tx,
            stopped_tx,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<HistoryLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> Arc<HistoryLedger> {
        self.ledger.clone()
    }

    /// Configuration the current (or next) watcher set runs with
    pub fn config(&self) -> Arc<MonitorConfig> {
        self.config_tx.borrow().clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start every configured watcher and idle until [`shutdown`](Self::shutdown).
    ///
    /// Only configuration problems are returned as errors; sampling and delivery
    /// failures are handled inside the watchers and the dispatcher.
    pub async fn run(&self) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        // Marks the engine stopped even when the caller drops this future.
        let _stopped = StoppedGuard(&self.stopped_tx);
        self.supervise().await
    }

    /// Lifecycle phase, as reported by the health endpoint
    pub fn state(&self) -> EngineState {
        if *self.stopped_tx.borrow() {
            EngineState::Stopped
        } else if self.running.load(Ordering::SeqCst) {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    /// Request shutdown and wait until every watcher has terminated.
    /// Safe to call repeatedly and before [`run`](Self::run).
    pub async fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("engine shutdown requested");
        }
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut stopped = self.stopped_tx.subscribe();
        wait_until_true(&mut stopped).await;
    }

    /// Swap in a new configuration. The running watcher set is stopped and a new
    /// one started; running watchers are never mutated in place.
    pub fn reload(&self, config: MonitorConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config_tx.send_replace(Arc::new(config));
        Ok(())
    }

    async fn supervise(&self) -> Result<(), EngineError> {
        let mut config_rx = self.config_tx.subscribe();
        let config = config_rx.borrow_and_update().clone();
        config.validate()?;

        let (dispatcher, dispatch_loop) = dispatch_channel(
            self.sink.clone(),
            self.settings.dispatch_settings(),
            self.metrics.clone(),
        );
        let dispatch_handle = tokio::spawn(dispatch_loop.run());

        let ctx = WatcherContext {
            sampler: self.sampler.clone(),
            ledger: self.ledger.clone(),
            dispatcher,
            metrics: self.metrics.clone(),
            fetch_timeout: self.settings.fetch_timeout,
            failure_backoff: self.settings.failure_backoff,
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut watchers = WatcherSet::start(&config, &ctx).await;

        loop {
            tokio::select! {
                _ = wait_until_true(&mut shutdown_rx) => break,
                changed = config_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = config_rx.borrow_and_update().clone();
                    info!(
                        strategies = next.strategy_count(),
                        "configuration changed, restarting watcher set"
                    );
                    watchers.stop().await;
                    watchers = WatcherSet::start(&next, &ctx).await;
                }
            }
        }

        watchers.stop().await;

        // Dropping the last dispatcher handle closes the queue and lets the
        // dispatch loop drain.
        drop(ctx);
        match dispatch_handle.await {
            Ok(report) => info!(
                delivered = report.delivered,
                failed = report.failed,
                abandoned = report.abandoned,
                "engine stopped"
            ),
            Err(e) => error!(error = %e, "dispatch loop panicked"),
        }
        Ok(())
    }
}

/// One generation of watchers sharing a cancel signal
struct WatcherSet {
    cancel_tx: watch::Sender<bool>,
    tasks: JoinSet<WatcherState>,
    metrics: Option<Arc<Metrics>>,
}

impl WatcherSet {
    async fn start(config: &MonitorConfig, ctx: &WatcherContext) -> Self {
        ctx.ledger.register(config.symbols()).await;

        let (cancel_tx, cancel) = CancelSignal::pair();
        let mut tasks = JoinSet::new();

        for (symbol, strategies) in &config.instruments {
            for strategy in strategies {
                let span = tracing::info_span!(
                    "watcher",
                    symbol = %symbol,
                    interval_secs = strategy.interval
                );
                let watcher =
                    StrategyWatcher::new(symbol.clone(), strategy.clone(), ctx.clone(), cancel.clone());
                tasks.spawn(watcher.run().instrument(span));
            }
        }

        if tasks.is_empty() {
            warn!("no monitoring strategies configured, engine will stay idle");
        } else {
            info!(
                watchers = tasks.len(),
                symbols = ?config.symbols().collect::<Vec<_>>(),
                "started {} watchers",
                tasks.len()
            );
        }
        if let Some(ref metrics) = ctx.metrics {
            metrics.active_watchers.set(tasks.len() as i64);
        }

        Self {
            cancel_tx,
            tasks,
            metrics: ctx.metrics.clone(),
        }
    }

    async fn stop(&mut self) {
        self.cancel_tx.send_replace(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "watcher task failed");
            }
        }
        if let Some(ref metrics) = self.metrics {
            metrics.active_watchers.set(0);
        }
    }
}
