//! Alerting, storage, notification and the polling cycle that ties them to
//! the weather fetcher.

pub mod alerts;
pub mod app;
pub mod monitor;
pub mod notifier;
pub mod sqlite_store;
pub mod storage;

pub use alerts::{AlertEngine, AlertEvent, AlertThresholds, BreachState, ThresholdKind};
pub use app::{build_monitor, open_storage, AppMonitor};
pub use monitor::{window_start, CycleReport, Monitor, MonitorSettings};
pub use notifier::{AlertNotifier, LogNotifier, Notifier, WebhookNotifier};
pub use sqlite_store::SqliteStorage;
pub use storage::{MemoryStorage, Storage, StorageResult};
