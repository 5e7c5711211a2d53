use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use send_supply_backend::{
    api::{create_app, SupplyApiState},
    registry::StaticRegistry,
    sources::{BalanceSource, SourceError},
    types::TokenRepresentation,
    RefreshScheduler, SnapshotAggregator, SnapshotStore, TriggerOutcome,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Every multisig holds `balance` units of the canonical token.
struct FixedSource {
    balance: AtomicU64,
}

#[async_trait]
impl BalanceSource for FixedSource {
    async fn read_balance(&self, _: &Address, _: &TokenRepresentation) -> Result<U256, SourceError> {
        Ok(U256::from(self.balance.load(Ordering::SeqCst)))
    }

    async fn read_total_supply(&self, _: &TokenRepresentation) -> Result<U256, SourceError> {
        Ok(U256::from(1_000_000u64))
    }

    async fn read_decimals(&self, representation: &TokenRepresentation) -> Result<u8, SourceError> {
        Ok(representation.decimals)
    }

    fn source_name(&self) -> &str {
        "fixed"
    }
}

async fn setup() -> (TestServer, Arc<FixedSource>, RefreshScheduler) {
    let source = Arc::new(FixedSource {
        balance: AtomicU64::new(1_000),
    });
    let aggregator = Arc::new(
        SnapshotAggregator::new(
            source.clone(),
            Arc::new(StaticRegistry::send_multisigs()),
            vec![TokenRepresentation::canonical("v1", "base", Address::repeat_byte(0xa1), 18)],
        )
        .unwrap(),
    );
    let store = Arc::new(SnapshotStore::bootstrap(&aggregator).await.unwrap());
    let scheduler = RefreshScheduler::new(aggregator, store.clone(), Duration::from_secs(60), Duration::from_secs(5));

    let state = SupplyApiState::new(store, "https://www.send.it/").with_scheduler(scheduler.clone());
    let server = TestServer::new(create_app(state)).unwrap();
    (server, source, scheduler)
}

#[tokio::test]
async fn test_served_figures_follow_published_snapshot() {
    let (server, source, scheduler) = setup().await;

    // Six multisigs holding 1000 each
    assert_eq!(server.get("/total").await.text(), "1000000");
    assert_eq!(server.get("/circulating").await.text(), "994000");

    source.balance.store(2_000, Ordering::SeqCst);
    // Unchanged until the next refresh publishes
    assert_eq!(server.get("/circulating").await.text(), "994000");

    assert_eq!(scheduler.trigger().await, TriggerOutcome::Published);
    assert_eq!(server.get("/circulating").await.text(), "988000");
}

#[tokio::test]
async fn test_failed_refresh_keeps_serving_previous_figures() {
    let (server, source, scheduler) = setup().await;

    // Locked would exceed total
    source.balance.store(500_000, Ordering::SeqCst);
    assert!(matches!(scheduler.trigger().await, TriggerOutcome::Failed(_)));

    assert_eq!(server.get("/circulating").await.text(), "994000");

    let status: serde_json::Value = server.get("/status").await.json();
    assert_eq!(status["refresh"]["refreshes_failed"], 1);
    assert_eq!(status["refresh_interval_secs"], 60);
    assert!(status["refresh"]["last_error"]
        .as_str()
        .unwrap()
        .contains("exceeds total supply"));
}

#[tokio::test]
async fn test_multisigs_lists_registry_accounts() {
    let (server, _, _) = setup().await;

    let response = server.get("/multisigs").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let accounts: Vec<serde_json::Value> = response.json();
    assert_eq!(accounts.len(), 6);
    for account in &accounts {
        let address = account["address"].as_str().unwrap();
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 42);
    }
}

#[tokio::test]
async fn test_amounts_json() {
    let (server, _, _) = setup().await;

    let amounts: serde_json::Value = server.get("/amounts.json").await.json();
    assert_eq!(amounts["total"], 1_000_000.0);
    assert_eq!(amounts["circulating"], 994_000.0);
}
