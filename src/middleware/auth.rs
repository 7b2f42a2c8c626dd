//! Caller identity extractor for Axum handlers.
//!
//! Identity arrives pre-resolved in the `X-User-Email` header (upstream
//! gateway terminates authentication); admin flags come from the configured
//! allowlists. No credential verification happens here.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::AppError;
use crate::AppState;

/// Email used when no identity header is present (local development).
const GUEST_EMAIL: &str = "guest@runway.local";

/// Resolved caller identity.
///
/// Use as an Axum extractor in handlers:
/// ```ignore
/// async fn handler(current_user: CurrentUser) -> impl IntoResponse { ... }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub email: String,
    pub is_admin: bool,
    pub is_network_admin: bool,
    /// Caller address forwarded by the gateway, recorded in the audit trail.
    pub ip_address: Option<String>,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get("X-User-Email")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(GUEST_EMAIL)
            .to_string();

        let ip_address = parts
            .headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let is_admin = state.config.is_admin(&email);
        let is_network_admin = state.config.is_network_admin(&email);

        Ok(CurrentUser {
            email,
            is_admin,
            is_network_admin,
            ip_address,
        })
    }
}

/// Extractor that requires the caller to be on the admin allowlist.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(RequireAdmin(user))
    }
}
