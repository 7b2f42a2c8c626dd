//! Route definitions for the Runway API.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::AppState;

pub mod firewall;
pub mod health;
pub mod lookup;
pub mod requests;

/// Assemble the `/api` router. Shared by the binary and the integration tests.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/requests",
            get(requests::list).post(requests::create),
        )
        .route(
            "/requests/firewall",
            get(firewall::list).post(firewall::create),
        )
        .route(
            "/requests/{id}",
            get(requests::get_by_id).patch(requests::update),
        )
        .route("/requests/{id}/submit", post(requests::submit))
        .route("/requests/{id}/approve", post(requests::approve))
        .route(
            "/requests/{id}/assign-subscriptions",
            post(requests::assign_subscriptions),
        )
        .route("/requests/{id}/advance-stage", post(requests::advance_stage))
        .route("/requests/{id}/fail", post(requests::fail_stage))
        .route("/requests/{id}/cancel", post(requests::cancel))
        .route("/requests/{id}/expedite", post(requests::expedite))
        .route("/requests/{id}/comments", post(requests::add_comment))
        .route("/validate/slug/{slug}", get(requests::validate_slug))
        .route("/lookup", get(lookup::list).post(lookup::create))
        .route("/lookup/{id}", patch(lookup::update))
        .route("/stats", get(requests::stats))
        .route("/audit", get(requests::audit_log))
}
