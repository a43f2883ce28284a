//! HTTP operator API
//!
//! Read-only visibility into target health plus the one mutating operation
//! an operator needs: resetting a terminal target's attempt counter.

mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
