//! Engine tests against a scripted price source, on a paused clock

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use voltwatch::core::{
    dispatch_channel, CancelSignal, DispatchSettings, EngineSettings, EngineState,
    HistoryLedger, MonitorEngine, StrategyWatcher, WatcherContext,
};
use voltwatch::errors::{ConfigError, EngineError};
use voltwatch::metrics::Metrics;
use voltwatch::models::{MonitorConfig, Strategy};
use voltwatch::services::{NotificationSink, PriceSampler};

use crate::test_utils::{HangingSampler, RecordingSink, ScriptedSampler, StuckSink};

fn engine_with(
    config: MonitorConfig,
    sampler: Arc<dyn PriceSampler>,
    sink: Arc<dyn NotificationSink>,
    settings: EngineSettings,
    metrics: Arc<Metrics>,
) -> Arc<MonitorEngine> {
    Arc::new(MonitorEngine::new(config, sampler, sink, settings).with_metrics(metrics))
}

struct Harness {
    engine: Arc<MonitorEngine>,
    sampler: Arc<ScriptedSampler>,
    sink: Arc<RecordingSink>,
    metrics: Arc<Metrics>,
}

impl Harness {
    fn new(config: MonitorConfig, sampler: ScriptedSampler, sink: RecordingSink) -> Self {
        let sampler = Arc::new(sampler);
        let sink = Arc::new(sink);
        let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
        let engine = engine_with(
            config,
            sampler.clone(),
            sink.clone(),
            EngineSettings::default(),
            metrics.clone(),
        );
        Self {
            engine,
            sampler,
            sink,
            metrics,
        }
    }

    fn start(&self) -> JoinHandle<Result<(), EngineError>> {
        let engine = self.engine.clone();
        tokio::spawn(async move { engine.run().await })
    }

    async fn prices(&self, symbol: &str) -> Vec<f64> {
        self.engine
            .ledger()
            .snapshot(symbol)
            .await
            .unwrap_or_default()
            .iter()
            .map(|p| p.price)
            .collect()
    }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn watcher_alerts_on_crossing_and_keeps_last_price_through_failures() {
    let sampler = Arc::new(ScriptedSampler::new().with_steps(
        "BTCUSDT",
        &[
            (0, Some(100.0)),
            (30, Some(101.5)),
            (90, Some(101.0)),
            (150, None),
        ],
    ));
    let sink = Arc::new(RecordingSink::default());
    let ledger = Arc::new(HistoryLedger::new());
    let (dispatcher, dispatch_loop) =
        dispatch_channel(sink.clone(), DispatchSettings::default(), None);
    let dispatch_handle = tokio::spawn(dispatch_loop.run());

    let ctx = WatcherContext {
        sampler: sampler.clone(),
        ledger: ledger.clone(),
        dispatcher,
        metrics: None,
        fetch_timeout: Duration::from_secs(10),
        failure_backoff: Duration::from_secs(60),
    };
    let (cancel_tx, cancel) = CancelSignal::pair();
    let watcher = StrategyWatcher::new("BTCUSDT", Strategy::new(60, 1.0, 1.0), ctx, cancel);
    let handle = tokio::spawn(watcher.run());

    // samples at t=0 (100.0), t=60 (101.5), t=120 (101.0), t=180 (failure)
    advance(200).await;
    cancel_tx.send_replace(true);
    let state = handle.await.unwrap();
    let report = dispatch_handle.await.unwrap();

    assert_eq!(state.last_price(), Some(101.0));
    assert_eq!(sampler.calls(), 4);
    assert_eq!(report.delivered, 1);

    let sent = sink.sent.lock().await;
    assert_eq!(sent.len(), 1);
    let (title, body) = &sent[0];
    assert_eq!(title, "BTCUSDT price up alert");
    assert!(body.contains("up 1.50%"), "{}", body);
    assert!(body.contains("Current price: $101.5"), "{}", body);
    assert!(body.contains("Last price: $100"), "{}", body);

    let prices: Vec<f64> = ledger
        .snapshot("BTCUSDT")
        .await
        .unwrap()
        .iter()
        .map(|p| p.price)
        .collect();
    assert_eq!(prices, vec![100.0, 101.5, 101.0]);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_backs_off_before_retrying() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(10, 1.0, 1.0)),
        ScriptedSampler::new().with_steps("BTCUSDT", &[(0, None)]),
        RecordingSink::default(),
    );
    let handle = harness.start();

    // With a 60s backoff only t=0 and t=60 are attempted, not every 10s.
    advance(90).await;
    assert_eq!(harness.sampler.calls(), 2);
    assert_eq!(
        harness
            .metrics
            .fetch_failures_total
            .with_label_values(&["BTCUSDT"])
            .get(),
        2
    );
    assert!(harness.prices("BTCUSDT").await.is_empty());

    harness.engine.shutdown().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn strategies_on_one_instrument_are_independent() {
    let config = MonitorConfig::default()
        .with_strategy(
            "BTCUSDT",
            Strategy::new(10, 50.0, 50.0).with_name("fast-wide"),
        )
        .with_strategy("BTCUSDT", Strategy::new(60, 1.0, 1.0));
    let harness = Harness::new(
        config,
        ScriptedSampler::new().with_steps("BTCUSDT", &[(0, Some(100.0)), (35, Some(102.0))]),
        RecordingSink::default(),
    );
    let handle = harness.start();

    advance(65).await;
    harness.engine.shutdown().await;
    handle.await.unwrap().unwrap();

    // Only the 60s strategy compares 100.0 with 102.0 in a single step.
    let sent = harness.sink.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("checked every 1m"), "{}", sent[0].1);

    // Both watchers write into the same instrument history.
    let prices = harness.prices("BTCUSDT").await;
    assert_eq!(prices.len(), harness.sampler.calls());
    assert!(prices.len() > 2);
}

#[tokio::test(start_paused = true)]
async fn delivery_failures_do_not_stop_sampling() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 10.0, 10.0)),
        ScriptedSampler::new().with_steps(
            "BTCUSDT",
            &[
                (0, Some(100.0)),
                (30, Some(200.0)),
                (90, Some(100.0)),
                (150, Some(200.0)),
            ],
        ),
        RecordingSink::failing(),
    );
    let handle = harness.start();

    advance(200).await;
    harness.engine.shutdown().await;
    handle.await.unwrap().unwrap();

    assert_eq!(harness.prices("BTCUSDT").await, vec![100.0, 200.0, 100.0, 200.0]);
    assert_eq!(harness.sink.attempts(), 3);
    assert_eq!(harness.metrics.alert_delivery_failures_total.get(), 3);
    assert_eq!(
        harness
            .metrics
            .alerts_dispatched_total
            .with_label_values(&["BTCUSDT", "down"])
            .get(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_long_sleeps() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(3600, 1.0, 1.0)),
        ScriptedSampler::new().with_steps("BTCUSDT", &[(0, Some(100.0))]),
        RecordingSink::default(),
    );
    let handle = harness.start();

    advance(10).await;
    assert_eq!(harness.metrics.active_watchers.get(), 1);

    let started = tokio::time::Instant::now();
    harness.engine.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    handle.await.unwrap().unwrap();
    assert_eq!(harness.sampler.calls(), 1);
    assert_eq!(harness.metrics.active_watchers.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn engine_without_strategies_idles_until_shutdown() {
    let harness = Harness::new(
        MonitorConfig::default(),
        ScriptedSampler::new(),
        RecordingSink::default(),
    );
    let handle = harness.start();

    advance(600).await;
    assert!(!handle.is_finished());
    assert_eq!(harness.sampler.calls(), 0);

    harness.engine.shutdown().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 1.0, 1.0)),
        ScriptedSampler::new().with_steps("BTCUSDT", &[(0, Some(100.0))]),
        RecordingSink::default(),
    );

    // Before run: returns immediately.
    harness.engine.shutdown().await;

    let handle = harness.start();
    handle.await.unwrap().unwrap();

    harness.engine.shutdown().await;
    harness.engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_run_is_rejected() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 1.0, 1.0)),
        ScriptedSampler::new().with_steps("BTCUSDT", &[(0, Some(100.0))]),
        RecordingSink::default(),
    );
    let handle = harness.start();
    advance(1).await;

    assert!(matches!(
        harness.engine.run().await,
        Err(EngineError::AlreadyRunning)
    ));

    harness.engine.shutdown().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn invalid_configuration_fails_the_run() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(0, 1.0, 1.0)),
        ScriptedSampler::new(),
        RecordingSink::default(),
    );

    let err = tokio_test::assert_err!(harness.engine.run().await);
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::InvalidStrategy { .. })
    ));
    assert_eq!(harness.sampler.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn reload_replaces_the_watcher_set() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 1.0, 1.0)),
        ScriptedSampler::new()
            .with_steps("BTCUSDT", &[(0, Some(100.0))])
            .with_steps("ETHUSDT", &[(0, Some(5.0))]),
        RecordingSink::default(),
    );
    let handle = harness.start();
    advance(30).await;

    let rejected = harness
        .engine
        .reload(MonitorConfig::default().with_strategy("ETHUSDT", Strategy::new(0, 1.0, 1.0)));
    assert!(rejected.is_err());
    assert_eq!(harness.engine.config().symbols().collect::<Vec<_>>(), vec!["BTCUSDT"]);

    harness
        .engine
        .reload(
            MonitorConfig::default()
                .with_strategy("ETHUSDT", Strategy::new(60, 1.0, 1.0))
                .with_strategy("ETHUSDT", Strategy::new(120, 2.0, 2.0)),
        )
        .unwrap();
    advance(30).await;

    assert_eq!(harness.metrics.active_watchers.get(), 2);
    assert_eq!(harness.prices("ETHUSDT").await, vec![5.0, 5.0]);
    // BTC history collected before the reload is kept.
    assert_eq!(harness.prices("BTCUSDT").await, vec![100.0]);

    harness.engine.shutdown().await;
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_the_run_future_still_lets_shutdown_return() {
    let harness = Harness::new(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 1.0, 1.0)),
        ScriptedSampler::new().with_steps("BTCUSDT", &[(0, Some(100.0))]),
        RecordingSink::default(),
    );
    assert_eq!(harness.engine.state(), EngineState::Idle);

    tokio::select! {
        _ = harness.engine.run() => panic!("run returned without shutdown"),
        _ = advance(5) => {}
    }
    assert_eq!(harness.engine.state(), EngineState::Stopped);

    tokio_test::assert_ok!(
        tokio::time::timeout(Duration::from_secs(2), harness.engine.shutdown()).await
    );
    assert!(matches!(
        harness.engine.run().await,
        Err(EngineError::AlreadyRunning)
    ));
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_is_cut_off_at_the_fetch_timeout() {
    let sampler = Arc::new(HangingSampler::default());
    let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
    let engine = engine_with(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(10, 1.0, 1.0)),
        sampler.clone(),
        Arc::new(RecordingSink::default()),
        EngineSettings::default(),
        metrics.clone(),
    );
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    // t=0 fetch times out at t=10, backs off 60s, fetches again at t=70.
    advance(75).await;
    assert_eq!(sampler.calls(), 2);
    assert_eq!(
        metrics
            .fetch_failures_total
            .with_label_values(&["BTCUSDT"])
            .get(),
        1
    );

    engine.shutdown().await;
    tokio_test::assert_ok!(handle.await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_a_hung_fetch_is_prompt() {
    let sampler = Arc::new(HangingSampler::default());
    let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
    let engine = engine_with(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 1.0, 1.0)),
        sampler.clone(),
        Arc::new(RecordingSink::default()),
        EngineSettings::default(),
        metrics.clone(),
    );
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    advance(5).await;
    assert_eq!(sampler.calls(), 1);

    let started = tokio::time::Instant::now();
    engine.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    tokio_test::assert_ok!(handle.await.unwrap());

    // Cancellation is not a fetch failure.
    assert_eq!(
        metrics
            .fetch_failures_total
            .with_label_values(&["BTCUSDT"])
            .get(),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn stuck_sink_does_not_delay_sampling() {
    let sampler = Arc::new(ScriptedSampler::new().with_steps(
        "BTCUSDT",
        &[
            (0, Some(100.0)),
            (30, Some(200.0)),
            (90, Some(100.0)),
            (150, Some(200.0)),
        ],
    ));
    let sink = Arc::new(StuckSink::default());
    let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
    let settings = EngineSettings {
        delivery_timeout: Duration::from_secs(3600),
        ..EngineSettings::default()
    };
    let engine = engine_with(
        MonitorConfig::default().with_strategy("BTCUSDT", Strategy::new(60, 10.0, 10.0)),
        sampler.clone(),
        sink.clone(),
        settings,
        metrics.clone(),
    );
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    advance(200).await;
    assert_eq!(sampler.calls(), 4);
    assert_eq!(sink.attempts(), 3);
    let prices: Vec<f64> = engine
        .ledger()
        .snapshot("BTCUSDT")
        .await
        .unwrap()
        .iter()
        .map(|p| p.price)
        .collect();
    assert_eq!(prices, vec![100.0, 200.0, 100.0, 200.0]);

    // The three stuck deliveries are abandoned after the drain grace period.
    engine.shutdown().await;
    tokio_test::assert_ok!(handle.await.unwrap());
    assert_eq!(metrics.alerts_dropped_total.get(), 3);
}
