use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregator::{RefreshError, SnapshotAggregator};
use crate::snapshot::Snapshot;

/// Holds the currently published snapshot.
///
/// Readers load an `Arc` to an immutable snapshot without locking; publishing
/// swaps the pointer in one atomic store, so a reader sees either the whole
/// old snapshot or the whole new one. There is no empty state: a store only
/// exists once a first snapshot has been computed.
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Run the first refresh and build the store from it.
    pub async fn bootstrap(aggregator: &SnapshotAggregator) -> Result<Self, RefreshError> {
        let snapshot = aggregator.refresh().await?;
        info!("Initial snapshot computed at {}", snapshot.computed_at());
        Ok(Self::new(snapshot))
    }

    pub fn get(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn publish(&self, snapshot: Snapshot) {
        debug!("Publishing snapshot computed at {}", snapshot.computed_at());
        self.current.store(Arc::new(snapshot));
    }
}
