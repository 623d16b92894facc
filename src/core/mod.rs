//! Core application primitives: ledger, watchers, dispatcher and supervisor

pub mod dispatcher;
pub mod history;
pub mod http;
pub mod runtime;
pub mod watcher;

pub use dispatcher::{dispatch_channel, AlertDispatcher, DispatchLoop, DispatchReport, DispatchSettings};
pub use history::HistoryLedger;
pub use runtime::{EngineSettings, EngineState, MonitorEngine};
pub use watcher::{CancelSignal, StrategyWatcher, WatcherContext};
