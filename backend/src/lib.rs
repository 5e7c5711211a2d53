pub mod aggregator;
pub mod api;
pub mod config;
pub mod normalizer;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod types;

pub use aggregator::{RefreshError, SnapshotAggregator};
pub use config::SupplyConfig;
pub use scheduler::{RefreshScheduler, TriggerOutcome};
pub use snapshot::{SanityViolation, Snapshot};
pub use store::SnapshotStore;
