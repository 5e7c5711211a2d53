use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use send_supply_backend::{
    registry::{RegistryError, RegistryProvider, StaticRegistry},
    sources::{BalanceSource, SourceError},
    types::{NonCirculatingAccount, TokenRepresentation},
    RefreshError, RefreshScheduler, SanityViolation, SnapshotAggregator, SnapshotStore, TriggerOutcome,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory chain state keyed by (account, representation id)
#[derive(Default)]
struct MockChains {
    total_supply: Mutex<U256>,
    balances: Mutex<HashMap<(Address, String), U256>>,
    failing: Mutex<HashSet<(Address, String)>>,
    total_supply_down: AtomicBool,
}

impl MockChains {
    fn with_total(total: u64) -> Arc<Self> {
        let chains = Arc::new(Self::default());
        *chains.total_supply.lock().unwrap() = U256::from(total);
        chains
    }

    fn set_balance(&self, account: Address, representation: &str, amount: u64) {
        self.balances
            .lock()
            .unwrap()
            .insert((account, representation.to_string()), U256::from(amount));
    }

    fn fail_read(&self, account: Address, representation: &str) {
        self.failing.lock().unwrap().insert((account, representation.to_string()));
    }
}

#[async_trait]
impl BalanceSource for MockChains {
    async fn read_balance(&self, account: &Address, representation: &TokenRepresentation) -> Result<U256, SourceError> {
        let key = (*account, representation.id.clone());
        if self.failing.lock().unwrap().contains(&key) {
            return Err(SourceError::Network("connection reset".to_string()));
        }
        Ok(self.balances.lock().unwrap().get(&key).copied().unwrap_or(U256::ZERO))
    }

    async fn read_total_supply(&self, _: &TokenRepresentation) -> Result<U256, SourceError> {
        if self.total_supply_down.load(Ordering::SeqCst) {
            return Err(SourceError::Timeout {
                network: "base".to_string(),
                after: Duration::from_secs(10),
            });
        }
        Ok(*self.total_supply.lock().unwrap())
    }

    async fn read_decimals(&self, representation: &TokenRepresentation) -> Result<u8, SourceError> {
        Ok(representation.decimals)
    }

    fn source_name(&self) -> &str {
        "mock"
    }
}

/// Registry whose contents can change between refreshes; returns whatever it holds
struct MockRegistry {
    accounts: Mutex<Vec<NonCirculatingAccount>>,
}

#[async_trait]
impl RegistryProvider for MockRegistry {
    async fn fetch(&self) -> Result<Vec<NonCirculatingAccount>, RegistryError> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

fn treasury() -> Address {
    Address::repeat_byte(0x11)
}

fn core_team() -> Address {
    Address::repeat_byte(0x22)
}

fn accounts() -> Vec<NonCirculatingAccount> {
    vec![
        NonCirculatingAccount::new("Treasury", treasury()),
        NonCirculatingAccount::new("Core Team", core_team()),
    ]
}

fn representations(factor: u64) -> Vec<TokenRepresentation> {
    vec![
        TokenRepresentation::canonical("v1", "base", Address::repeat_byte(0xa1), 18),
        TokenRepresentation::superseded("v0", "ethereum", Address::repeat_byte(0xa0), 0, U256::from(factor)),
    ]
}

fn aggregator(chains: &Arc<MockChains>, factor: u64) -> SnapshotAggregator {
    SnapshotAggregator::new(
        chains.clone(),
        Arc::new(StaticRegistry::new(accounts())),
        representations(factor),
    )
    .unwrap()
}

/// Total 1e9; treasury holds 1e8 + 1e6 superseded units, core team 5e7.
fn scenario_chains() -> Arc<MockChains> {
    let chains = MockChains::with_total(1_000_000_000);
    chains.set_balance(treasury(), "v1", 100_000_000);
    chains.set_balance(core_team(), "v1", 50_000_000);
    chains.set_balance(treasury(), "v0", 1_000_000);
    chains
}

#[tokio::test]
async fn test_concrete_supply_scenario() {
    let chains = scenario_chains();
    let snapshot = aggregator(&chains, 10).refresh().await.unwrap();

    assert_eq!(snapshot.total_supply(), U256::from(1_000_000_000u64));
    assert_eq!(snapshot.locked_supply(), U256::from(160_000_000u64));
    assert_eq!(snapshot.circulating_supply(), U256::from(840_000_000u64));
    assert_eq!(
        snapshot.circulating_supply() + snapshot.locked_supply(),
        snapshot.total_supply()
    );
    assert_eq!(snapshot.accounts().len(), 2);
}

#[tokio::test]
async fn test_conversion_factor_scales_linearly() {
    let chains = MockChains::with_total(u64::MAX);
    chains.set_balance(treasury(), "v0", 7);

    let unit = aggregator(&chains, 1).refresh().await.unwrap();
    let scaled = aggregator(&chains, 1000).refresh().await.unwrap();

    assert_eq!(unit.locked_supply(), U256::from(7u64));
    assert_eq!(scaled.locked_supply(), U256::from(7_000u64));
    assert_eq!(scaled.locked_supply(), unit.locked_supply() * U256::from(1000u64));
}

#[tokio::test]
async fn test_identical_reads_differ_only_in_timestamp() {
    let chains = scenario_chains();
    let aggregator = aggregator(&chains, 10);

    let first = aggregator.refresh().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = aggregator.refresh().await.unwrap();

    assert!(first.same_figures(&second));
    assert!(second.computed_at() > first.computed_at());
}

#[tokio::test]
async fn test_single_failed_read_fails_refresh_and_keeps_snapshot() {
    let chains = scenario_chains();
    let aggregator = Arc::new(aggregator(&chains, 10));
    let store = Arc::new(SnapshotStore::bootstrap(&aggregator).await.unwrap());
    let published = store.get();

    // One of four reads fails; the rest would change the result
    chains.set_balance(core_team(), "v1", 1);
    chains.fail_read(treasury(), "v0");

    let err = aggregator.refresh().await.unwrap_err();
    match err {
        RefreshError::SourceRead { account, representation, network, .. } => {
            assert_eq!(account, "Treasury");
            assert_eq!(representation, "v0");
            assert_eq!(network, "ethereum");
        }
        other => panic!("unexpected error: {}", other),
    }

    let scheduler = RefreshScheduler::new(aggregator, store.clone(), Duration::from_secs(60), Duration::from_secs(5));
    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Failed(_)));

    let served = store.get();
    assert_eq!(served.circulating_supply(), U256::from(840_000_000u64));
    assert_eq!(served.computed_at(), published.computed_at());
}

#[tokio::test]
async fn test_empty_registry_fails_refresh() {
    let chains = scenario_chains();
    let registry = Arc::new(MockRegistry {
        accounts: Mutex::new(vec![]),
    });
    let aggregator = SnapshotAggregator::new(chains, registry, representations(10)).unwrap();

    let err = aggregator.refresh().await.unwrap_err();
    assert!(matches!(err, RefreshError::Registry(RegistryError::Empty)));
    // Nothing to serve
    assert!(SnapshotStore::bootstrap(&aggregator).await.is_err());
}

#[tokio::test]
async fn test_registry_emptied_after_bootstrap_keeps_snapshot() {
    let chains = scenario_chains();
    let registry = Arc::new(MockRegistry {
        accounts: Mutex::new(accounts()),
    });
    let aggregator = Arc::new(SnapshotAggregator::new(chains, registry.clone(), representations(10)).unwrap());
    let store = Arc::new(SnapshotStore::bootstrap(&aggregator).await.unwrap());
    let scheduler = RefreshScheduler::new(aggregator, store.clone(), Duration::from_secs(60), Duration::from_secs(5));

    registry.accounts.lock().unwrap().clear();
    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Failed(_)));

    let served = store.get();
    assert_eq!(served.accounts().len(), 2);
    assert_eq!(served.circulating_supply(), U256::from(840_000_000u64));
}

#[tokio::test]
async fn test_failed_total_supply_read_keeps_snapshot() {
    let chains = scenario_chains();
    let aggregator = Arc::new(aggregator(&chains, 10));
    let store = Arc::new(SnapshotStore::bootstrap(&aggregator).await.unwrap());
    let published = store.get();

    chains.total_supply_down.store(true, Ordering::SeqCst);

    let err = aggregator.refresh().await.unwrap_err();
    match err {
        RefreshError::TotalSupplyRead { representation, network, source } => {
            assert_eq!(representation, "v1");
            assert_eq!(network, "base");
            assert!(matches!(source, SourceError::Timeout { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }

    let scheduler = RefreshScheduler::new(aggregator, store.clone(), Duration::from_secs(60), Duration::from_secs(5));
    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Failed(_)));
    assert_eq!(store.get().computed_at(), published.computed_at());

    // Total supply back: next refresh publishes again
    chains.total_supply_down.store(false, Ordering::SeqCst);
    assert_eq!(scheduler.trigger().await, TriggerOutcome::Published);
}

#[tokio::test]
async fn test_total_supply_failure_reported_alongside_balance_failures() {
    let chains = scenario_chains();
    chains.total_supply_down.store(true, Ordering::SeqCst);
    chains.fail_read(core_team(), "v1");
    chains.fail_read(treasury(), "v0");

    let err = aggregator(&chains, 10).refresh().await.unwrap_err();
    assert!(matches!(err, RefreshError::TotalSupplyRead { .. }));
}

#[tokio::test]
async fn test_locked_above_total_is_discarded() {
    let chains = scenario_chains();
    let registry = Arc::new(MockRegistry {
        accounts: Mutex::new(accounts()),
    });
    let aggregator = Arc::new(SnapshotAggregator::new(chains.clone(), registry.clone(), representations(10)).unwrap());
    let store = Arc::new(SnapshotStore::bootstrap(&aggregator).await.unwrap());
    let scheduler = RefreshScheduler::new(aggregator.clone(), store.clone(), Duration::from_secs(60), Duration::from_secs(5));

    // Misconfigured registry entry pushes locked supply past total
    chains.set_balance(Address::repeat_byte(0x33), "v0", 100_000_000);
    registry
        .accounts
        .lock()
        .unwrap()
        .push(NonCirculatingAccount::new("Bridge", Address::repeat_byte(0x33)));

    let err = aggregator.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        RefreshError::SanityCheck(SanityViolation::LockedExceedsTotal { .. })
    ));
    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Failed(_)));

    let served = store.get();
    assert_eq!(served.circulating_supply(), U256::from(840_000_000u64));
    assert_eq!(served.accounts().len(), 2);

    // Fixing the registry lets the next refresh publish
    registry.accounts.lock().unwrap().pop();
    assert_eq!(scheduler.trigger().await, TriggerOutcome::Published);
    assert!(store.get().computed_at() > served.computed_at());
}

#[tokio::test]
async fn test_zero_total_supply_is_discarded() {
    let chains = scenario_chains();
    *chains.total_supply.lock().unwrap() = U256::ZERO;
    chains.balances.lock().unwrap().clear();

    let err = aggregator(&chains, 10).refresh().await.unwrap_err();
    assert!(matches!(err, RefreshError::SanityCheck(SanityViolation::ZeroTotalSupply)));
}

#[tokio::test]
async fn test_unexpected_total_supply_is_discarded() {
    let chains = scenario_chains();
    let aggregator = aggregator(&chains, 10).with_expected_total_supply(Some(U256::from(100_000_000_000u64)));

    let err = aggregator.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        RefreshError::SanityCheck(SanityViolation::UnexpectedTotalSupply { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_mixed_snapshot() {
    let chains = scenario_chains();
    let aggregator = aggregator(&chains, 10);
    let old = aggregator.refresh().await.unwrap();

    chains.set_balance(core_team(), "v1", 300_000_000);
    let new = aggregator.refresh().await.unwrap();
    assert_ne!(old.circulating_supply(), new.circulating_supply());

    let store = Arc::new(SnapshotStore::new(old.clone()));
    let valid = [
        (old.total_supply(), old.circulating_supply()),
        (new.total_supply(), new.circulating_supply()),
    ];

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut observed = Vec::new();
                for _ in 0..2_000 {
                    let snapshot = store.get();
                    observed.push((
                        snapshot.total_supply(),
                        snapshot.circulating_supply(),
                        snapshot.locked_supply(),
                    ));
                    tokio::task::yield_now().await;
                }
                observed
            })
        })
        .collect();

    for i in 0..1_000 {
        store.publish(if i % 2 == 0 { new.clone() } else { old.clone() });
        tokio::task::yield_now().await;
    }

    for reader in readers {
        for (total, circulating, locked) in reader.await.unwrap() {
            assert!(valid.contains(&(total, circulating)));
            assert_eq!(circulating + locked, total);
        }
    }
}
