pub mod conflict;
pub mod engine;
pub mod events;
pub mod flight;
pub mod paths;
pub mod probe;
pub mod retry;
pub mod status;
pub mod transfer;
pub mod usage;
pub mod watcher;

pub use conflict::{compare_modified, ConflictChoice, ConflictResolver, Freshness};
pub use engine::SyncEngine;
pub use events::{EventBus, SyncEvent};
pub use flight::{FlightPermit, SingleFlight};
pub use paths::{PathResolver, SyncTarget};
pub use probe::{AccountStatus, AvailabilityProbe, DiagnosticReport};
pub use retry::{with_retry, Retried, RetryPolicy};
pub use status::{FileStatusReport, FileSyncStatus, StatusInspector};
pub use transfer::{
    Direction, DownloadPolicy, TransferEngine, TransferOutcome, TransferPhase, UploadMode,
    WaitResult,
};
pub use usage::{categorize, summarize, CategoryUsage, StorageUsageReport, UsageCategory};
pub use watcher::RemoteWatcher;
