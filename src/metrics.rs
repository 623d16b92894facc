//! Prometheus metrics for the monitor and its HTTP surface

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    pub samples_total: IntCounterVec,
    pub fetch_failures_total: IntCounterVec,
    pub alerts_dispatched_total: IntCounterVec,
    pub alerts_delivered_total: IntCounter,
    pub alert_delivery_failures_total: IntCounter,
    pub alerts_dropped_total: IntCounter,
    pub active_watchers: IntGauge,

    pub channel_messages_total: IntCounter,
    pub channel_forwards_total: IntCounter,

    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let samples_total = IntCounterVec::new(
            Opts::new("samples_total", "Successful price samples"),
            &["symbol"],
        )?;
        let fetch_failures_total = IntCounterVec::new(
            Opts::new("fetch_failures_total", "Failed price samples"),
            &["symbol"],
        )?;
        let alerts_dispatched_total = IntCounterVec::new(
            Opts::new("alerts_dispatched_total", "Threshold crossings handed to the dispatcher"),
            &["symbol", "trend"],
        )?;
        let alerts_delivered_total =
            IntCounter::new("alerts_delivered_total", "Alerts accepted by the notification sink")?;
        let alert_delivery_failures_total = IntCounter::new(
            "alert_delivery_failures_total",
            "Alerts the notification sink failed to deliver",
        )?;
        let alerts_dropped_total = IntCounter::new(
            "alerts_dropped_total",
            "Alerts dropped because the dispatch queue was full or shut down",
        )?;
        let active_watchers = IntGauge::new("active_watchers", "Running strategy watchers")?;

        let channel_messages_total =
            IntCounter::new("channel_messages_total", "Channel messages routed")?;
        let channel_forwards_total =
            IntCounter::new("channel_forwards_total", "Channel messages forwarded")?;

        let http_requests_total = IntCounter::new("http_requests_total", "HTTP requests served")?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests currently in flight")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency",
        ))?;

        registry.register(Box::new(samples_total.clone()))?;
        registry.register(Box::new(fetch_failures_total.clone()))?;
        registry.register(Box::new(alerts_dispatched_total.clone()))?;
        registry.register(Box::new(alerts_delivered_total.clone()))?;
        registry.register(Box::new(alert_delivery_failures_total.clone()))?;
        registry.register(Box::new(alerts_dropped_total.clone()))?;
        registry.register(Box::new(active_watchers.clone()))?;
        registry.register(Box::new(channel_messages_total.clone()))?;
        registry.register(Box::new(channel_forwards_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            samples_total,
            fetch_failures_total,
            alerts_dispatched_total,
            alerts_delivered_total,
            alert_delivery_failures_total,
            alerts_dropped_total,
            active_watchers,
            channel_messages_total,
            channel_forwards_total,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
