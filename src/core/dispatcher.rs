//! Fire-and-forget alert delivery
//!
//! Watchers hand events to an [`AlertDispatcher`] handle, which only enqueues.
//! A separate [`DispatchLoop`] task pulls from the bounded queue and runs every
//! delivery as its own task, so a slow or failing sink never holds up sampling.
//! The loop ends once every handle is dropped; in-flight deliveries then get a
//! grace period before they are abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::metrics::Metrics;
use crate::models::alert::VolatilityEvent;
use crate::services::notifier::NotificationSink;
use crate::signals::format::render_alert;

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub delivery_timeout: Duration,
    pub drain_grace: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_in_flight: 16,
            delivery_timeout: Duration::from_secs(5),
            drain_grace: Duration::from_secs(5),
        }
    }
}

/// What happened to the alerts that went through a dispatch loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
}

#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<VolatilityEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl AlertDispatcher {
    /// Enqueue an alert without waiting. Returns `false` when it had to be dropped.
    pub fn dispatch(&self, event: VolatilityEvent) -> bool {
        let symbol = event.symbol.clone();
        let trend = event.trend();
        let change_pct = event.change_pct;

        match self.tx.try_send(event) {
            Ok(()) => {
                info!(
                    symbol = %symbol,
                    trend = trend.as_str(),
                    change_pct = change_pct,
                    "volatility alert dispatched for {}: {} {:.2}%",
                    symbol,
                    trend.as_str(),
                    change_pct
                );
                if let Some(ref metrics) = self.metrics {
                    metrics
                        .alerts_dispatched_total
                        .with_label_values(&[symbol.as_str(), trend.as_str()])
                        .inc();
                }
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(symbol = %symbol, "dispatch queue full, alert dropped");
                self.count_drop();
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(symbol = %symbol, "dispatch loop stopped, alert dropped");
                self.count_drop();
                false
            }
        }
    }

    fn count_drop(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.alerts_dropped_total.inc();
        }
    }
}

pub struct DispatchLoop {
    rx: mpsc::Receiver<VolatilityEvent>,
    sink: Arc<dyn NotificationSink>,
    settings: DispatchSettings,
    metrics: Option<Arc<Metrics>>,
}

/// Create a connected dispatcher handle and the loop that serves it.
pub fn dispatch_channel(
    sink: Arc<dyn NotificationSink>,
    settings: DispatchSettings,
    metrics: Option<Arc<Metrics>>,
) -> (AlertDispatcher, DispatchLoop) {
    let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
    let dispatcher = AlertDispatcher {
        tx,
        metrics: metrics.clone(),
    };
    let dispatch_loop = DispatchLoop {
        rx,
        sink,
        settings,
        metrics,
    };
    (dispatcher, dispatch_loop)
}

impl DispatchLoop {
    pub async fn run(mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut in_flight: JoinSet<bool> = JoinSet::new();
        let max_in_flight = self.settings.max_in_flight.max(1);

        loop {
            tokio::select! {
                maybe_event = self.rx.recv(), if in_flight.len() < max_in_flight => {
                    let Some(event) = maybe_event else { break };
                    in_flight.spawn(deliver(
                        self.sink.clone(),
                        event,
                        self.settings.delivery_timeout,
                        self.metrics.clone(),
                    ));
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    tally(&mut report, joined);
                }
            }
        }

        if !in_flight.is_empty() {
            info!(pending = in_flight.len(), "draining in-flight alerts");
            let drained = tokio::time::timeout(self.settings.drain_grace, async {
                while let Some(joined) = in_flight.join_next().await {
                    tally(&mut report, joined);
                }
            })
            .await;

            if drained.is_err() {
                report.abandoned = in_flight.len();
                warn!(
                    abandoned = report.abandoned,
                    "drain grace period elapsed, abandoning {} undelivered alerts",
                    report.abandoned
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.alerts_dropped_total.inc_by(report.abandoned as u64);
                }
                in_flight.abort_all();
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            abandoned = report.abandoned,
            "dispatch loop stopped"
        );
        report
    }
}

fn tally(report: &mut DispatchReport, joined: Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => report.delivered += 1,
        Ok(false) => report.failed += 1,
        Err(e) => {
            error!(error = %e, "alert delivery task panicked");
            report.failed += 1;
        }
    }
}

async fn deliver(
    sink: Arc<dyn NotificationSink>,
    event: VolatilityEvent,
    timeout: Duration,
    metrics: Option<Arc<Metrics>>,
) -> bool {
    let (title, body) = render_alert(&event);

    let outcome = match tokio::time::timeout(timeout, sink.send(&title, &body)).await {
        Ok(result) => result,
        Err(_) => Err(crate::errors::DeliveryError::Timeout(timeout)),
    };

    match outcome {
        Ok(()) => {
            info!(
                symbol = %event.symbol,
                trend = event.trend().as_str(),
                change_pct = event.change_pct,
                threshold = event.threshold(),
                "{} price {} alert sent: {:.2}% (threshold {}%)",
                event.symbol,
                event.trend().as_str(),
                event.change_pct,
                event.threshold()
            );
            if let Some(ref metrics) = metrics {
                metrics.alerts_delivered_total.inc();
            }
            true
        }
        Err(e) => {
            error!(
                symbol = %event.symbol,
                error = %e,
                "failed to send volatility alert for {}",
                event.symbol
            );
            if let Some(ref metrics) = metrics {
                metrics.alert_delivery_failures_total.inc();
            }
            false
        }
    }
}
