use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::aggregator::SnapshotAggregator;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Published,
    Failed(String),
    /// A refresh was already running; this trigger was dropped
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub refreshes_succeeded: u64,
    pub refreshes_failed: u64,
    pub triggers_skipped: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,
}

/// Periodically refreshes the snapshot store, one refresh at a time.
#[derive(Clone)]
pub struct RefreshScheduler {
    aggregator: Arc<SnapshotAggregator>,
    store: Arc<SnapshotStore>,
    interval: Duration,
    refresh_timeout: Duration,
    in_progress: Arc<AtomicBool>,
    is_running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<RefreshStats>>,
    shutdown: Arc<watch::Sender<bool>>,
    loop_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Clears the in-progress flag when a refresh ends, including on cancellation.
struct InProgressGuard(Arc<AtomicBool>);

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshScheduler {
    pub fn new(
        aggregator: Arc<SnapshotAggregator>,
        store: Arc<SnapshotStore>,
        interval: Duration,
        refresh_timeout: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            aggregator,
            store,
            interval,
            refresh_timeout,
            in_progress: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(RefreshStats::default())),
            shutdown: Arc::new(shutdown),
            loop_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the periodic refresh loop. The store already holds the
    /// bootstrap snapshot, so the first tick fires one interval from now.
    pub async fn start(&self) {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            warn!("Refresh scheduler is already running");
            return;
        }

        // Reset any earlier stop request
        self.shutdown.send_replace(false);
        let mut shutdown_rx = self.shutdown.subscribe();

        info!("Starting refresh scheduler with {}s interval", self.interval.as_secs_f64());

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + scheduler.interval, scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let worker = scheduler.clone();
                        tokio::spawn(async move {
                            worker.trigger().await;
                        });
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        *self.loop_handle.lock().await = Some(handle);
        *is_running = true;
    }

    /// Stop the periodic loop and wait for it to exit. An in-flight refresh
    /// still completes.
    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        self.shutdown.send_replace(true);

        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Refresh loop ended abnormally: {}", e);
            }
        }
        *is_running = false;
        info!("Refresh scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn refresh_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> RefreshStats {
        self.stats.read().await.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one refresh now unless one is already running.
    pub async fn trigger(&self) -> TriggerOutcome {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Refresh already in progress, skipping trigger");
            self.stats.write().await.triggers_skipped += 1;
            return TriggerOutcome::Skipped;
        }
        let _guard = InProgressGuard(Arc::clone(&self.in_progress));

        let started = Instant::now();
        info!("Refreshing supply...");

        let result = tokio::time::timeout(self.refresh_timeout, self.aggregator.refresh()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let failure = match result {
            Ok(Ok(snapshot)) => {
                self.store.publish(snapshot);
                let mut stats = self.stats.write().await;
                stats.refreshes_succeeded += 1;
                stats.last_success = Some(Utc::now());
                stats.last_duration_ms = Some(elapsed_ms);
                return TriggerOutcome::Published;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("refresh timed out after {:?}", self.refresh_timeout),
        };

        let served = self.store.get();
        let age = Utc::now().signed_duration_since(served.computed_at());
        error!("Refresh failed: {}", failure);
        warn!(
            "Serving snapshot from {} ({}s old)",
            served.computed_at(),
            age.num_seconds()
        );

        let mut stats = self.stats.write().await;
        stats.refreshes_failed += 1;
        stats.last_failure = Some(Utc::now());
        stats.last_error = Some(failure.clone());
        stats.last_duration_ms = Some(elapsed_ms);
        TriggerOutcome::Failed(failure)
    }
}
