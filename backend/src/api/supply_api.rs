use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::scheduler::{RefreshScheduler, RefreshStats};
use crate::store::SnapshotStore;

#[derive(Clone)]
pub struct SupplyApiState {
    pub store: Arc<SnapshotStore>,
    pub scheduler: Option<RefreshScheduler>,
    pub homepage: String,
}

impl SupplyApiState {
    pub fn new(store: Arc<SnapshotStore>, homepage: &str) -> Self {
        Self {
            store,
            scheduler: None,
            homepage: homepage.to_string(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: RefreshScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AmountsResponse {
    pub total: f64,
    pub circulating: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub computed_at: DateTime<Utc>,
    pub age_seconds: i64,
    pub total_supply: String,
    pub locked_supply: String,
    pub circulating_supply: String,
    pub refresh_interval_secs: Option<u64>,
    pub refresh_in_progress: bool,
    pub refresh: RefreshStats,
}

pub fn create_supply_router() -> Router<SupplyApiState> {
    Router::new()
        .route("/", get(redirect_home))
        .route("/total", get(get_total))
        .route("/circulating", get(get_circulating))
        .route("/amounts.json", get(get_amounts))
        .route("/multisigs", get(get_multisigs))
        .route("/status", get(get_status))
}

async fn redirect_home(State(state): State<SupplyApiState>) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, state.homepage)]).into_response()
}

/// Total supply in canonical raw units, as a decimal string
async fn get_total(State(state): State<SupplyApiState>) -> String {
    state.store.get().total_supply().to_string()
}

async fn get_circulating(State(state): State<SupplyApiState>) -> String {
    state.store.get().circulating_supply().to_string()
}

/// Lossy float amounts, for display only
async fn get_amounts(State(state): State<SupplyApiState>) -> Json<AmountsResponse> {
    let (total, circulating) = state.store.get().amounts_f64();
    Json(AmountsResponse { total, circulating })
}

async fn get_multisigs(State(state): State<SupplyApiState>) -> Json<Vec<AccountResponse>> {
    let snapshot = state.store.get();
    let accounts = snapshot
        .accounts()
        .iter()
        .map(|account| AccountResponse {
            label: account.label.clone(),
            group: account.group.clone(),
            address: account.checksummed(),
        })
        .collect();
    Json(accounts)
}

async fn get_status(State(state): State<SupplyApiState>) -> Json<StatusResponse> {
    let snapshot = state.store.get();
    let (refresh_interval_secs, refresh_in_progress, refresh) = match &state.scheduler {
        Some(scheduler) => (
            Some(scheduler.interval().as_secs()),
            scheduler.refresh_in_progress(),
            scheduler.stats().await,
        ),
        None => (None, false, RefreshStats::default()),
    };

    Json(StatusResponse {
        computed_at: snapshot.computed_at(),
        age_seconds: Utc::now().signed_duration_since(snapshot.computed_at()).num_seconds(),
        total_supply: snapshot.total_supply().to_string(),
        locked_supply: snapshot.locked_supply().to_string(),
        circulating_supply: snapshot.circulating_supply().to_string(),
        refresh_interval_secs,
        refresh_in_progress,
        refresh,
    })
}
