//! HTTP route handlers.

pub mod agents;
pub mod runs;
pub mod tenants;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// All `/v1` routes (auth via [`agentos_core::AuthContext`] extraction).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(agents::routes())
        .merge(runs::routes())
        .merge(tenants::routes())
}
