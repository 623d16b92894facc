//! Strategy watcher: the per-(instrument, strategy) sampling loop
//!
//! Each cycle fetches one price, records it in the ledger, compares it with the
//! watcher's own previous sample and hands crossings to the dispatcher. Every
//! wait (interval sleep, failure backoff, in-flight fetch) races the cancel
//! signal, so shutdown never waits out a full interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::dispatcher::AlertDispatcher;
use crate::core::history::HistoryLedger;
use crate::errors::FetchError;
use crate::metrics::Metrics;
use crate::models::alert::VolatilityEvent;
use crate::models::strategy::Strategy;
use crate::services::market_data::PriceSampler;
use crate::signals::volatility::{Observation, WatcherState};

/// Cooperative cancellation flag shared by one watcher set
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A signal paired with its trigger
    pub fn pair() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested or the trigger is dropped.
    pub async fn cancelled(&mut self) {
        wait_until_true(&mut self.rx).await
    }
}

pub(crate) async fn wait_until_true(rx: &mut watch::Receiver<bool>) {
    loop {
        let done = *rx.borrow_and_update();
        if done || rx.changed().await.is_err() {
            return;
        }
    }
}

/// Collaborators shared by every watcher of a set
#[derive(Clone)]
pub struct WatcherContext {
    pub sampler: Arc<dyn PriceSampler>,
    pub ledger: Arc<HistoryLedger>,
    pub dispatcher: AlertDispatcher,
    pub metrics: Option<Arc<Metrics>>,
    pub fetch_timeout: Duration,
    pub failure_backoff: Duration,
}

pub struct StrategyWatcher {
    symbol: String,
    strategy: Strategy,
    ctx: WatcherContext,
    state: WatcherState,
    cancel: CancelSignal,
}

impl StrategyWatcher {
    pub fn new(
        symbol: impl Into<String>,
        strategy: Strategy,
        ctx: WatcherContext,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            strategy,
            ctx,
            state: WatcherState::new(),
            cancel,
        }
    }

    /// Run until cancelled and return the final watcher state.
    pub async fn run(mut self) -> WatcherState {
        info!(
            symbol = %self.symbol,
            strategy = %self.strategy.label(),
            interval_secs = self.strategy.interval,
            up_threshold = self.strategy.up_threshold,
            down_threshold = self.strategy.down_threshold,
            "watcher started for {}: every {}s, up {}%, down {}%",
            self.symbol,
            self.strategy.interval,
            self.strategy.up_threshold,
            self.strategy.down_threshold
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = sample(&self.ctx, &self.symbol) => result,
            };

            match fetched {
                Ok(price) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let now = Utc::now();
                    self.ctx.ledger.record(&self.symbol, price, now).await;
                    self.evaluate(price, now);
                }
                Err(e) => {
                    warn!(
                        symbol = %self.symbol,
                        strategy = %self.strategy.label(),
                        error = %e,
                        backoff_secs = self.ctx.failure_backoff.as_secs(),
                        "price fetch failed for {}, retrying in {:?}",
                        self.symbol,
                        self.ctx.failure_backoff
                    );
                    if let Some(ref metrics) = self.ctx.metrics {
                        metrics
                            .fetch_failures_total
                            .with_label_values(&[self.symbol.as_str()])
                            .inc();
                    }
                    if !pause(&mut self.cancel, self.ctx.failure_backoff).await {
                        break;
                    }
                    continue;
                }
            }

            if !pause(&mut self.cancel, self.strategy.interval()).await {
                break;
            }
        }

        info!(
            symbol = %self.symbol,
            strategy = %self.strategy.label(),
            "watcher stopped"
        );
        self.state
    }

    fn evaluate(&mut self, price: f64, now: chrono::DateTime<Utc>) {
        if let Some(ref metrics) = self.ctx.metrics {
            metrics
                .samples_total
                .with_label_values(&[self.symbol.as_str()])
                .inc();
        }

        match self.state.observe(price, now, &self.strategy) {
            Observation::First => {
                info!(
                    symbol = %self.symbol,
                    strategy = %self.strategy.label(),
                    price = price,
                    "first price observation for {}: {}",
                    self.symbol,
                    price
                );
            }
            Observation::Evaluated {
                previous,
                change_pct,
                crossing,
            } => {
                info!(
                    symbol = %self.symbol,
                    strategy = %self.strategy.label(),
                    price = price,
                    change_pct = change_pct,
                    "price check for {}: {} ({:.2}%)",
                    self.symbol,
                    price,
                    change_pct
                );

                if crossing.is_some() {
                    self.ctx.dispatcher.dispatch(VolatilityEvent {
                        symbol: self.symbol.clone(),
                        strategy: self.strategy.clone(),
                        price,
                        last_price: previous,
                        change_pct,
                        observed_at: now,
                    });
                }
            }
        }
    }
}

async fn sample(ctx: &WatcherContext, symbol: &str) -> Result<f64, FetchError> {
    let fetch = ctx.sampler.fetch_price(symbol, ctx.fetch_timeout);
    match tokio::time::timeout(ctx.fetch_timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(ctx.fetch_timeout)),
    }
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &mut CancelSignal, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("sleep interrupted by cancellation");
            false
        }
        _ = tokio::time::sleep(duration) => true,
    }
}
