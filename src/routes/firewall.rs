//! Firewall request routes.

use axum::{extract::State, Json};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::firewall::{FirewallRequestDetail, FirewallRequestInput};
use crate::services::firewall;
use crate::AppState;

/// POST /api/requests/firewall — submit a structured firewall request.
pub async fn create(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<FirewallRequestInput>,
) -> Result<Json<ApiResponse<FirewallRequestDetail>>, AppError> {
    let detail =
        firewall::create_firewall_request(&state.db, &state.notifier, body, &current_user).await?;
    Ok(ApiResponse::success(detail))
}

/// GET /api/requests/firewall — list firewall requests visible to the caller.
pub async fn list(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<FirewallRequestDetail>>>, AppError> {
    let requests = firewall::list_firewall_requests(&state.db, &current_user).await?;
    Ok(ApiResponse::success(requests))
}
