pub mod supply_api;

pub use supply_api::{create_supply_router, SupplyApiState};

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Public router: supply routes with permissive CORS and request logging.
pub fn create_app(state: SupplyApiState) -> Router {
    create_supply_router().with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}
