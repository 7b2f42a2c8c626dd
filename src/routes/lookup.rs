//! Reference data routes.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::RequireAdmin;
use crate::models::lookup::{CreateLookup, LookupEntry, UpdateLookup};
use crate::services::lookup;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct LookupQuery {
    pub field: Option<String>,
    pub include_inactive: Option<bool>,
}

/// GET /api/lookup — lookup values, grouped by field or filtered to one.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<Json<ApiResponse<BTreeMap<String, Vec<LookupEntry>>>>, AppError> {
    let active_only = !query.include_inactive.unwrap_or(false);
    let grouped = match query.field {
        Some(field) => {
            let entries = lookup::list_by_field(&state.db, &field, active_only).await?;
            BTreeMap::from([(field, entries)])
        }
        None => lookup::list_grouped(&state.db, active_only).await?,
    };
    Ok(ApiResponse::success(grouped))
}

/// POST /api/lookup — create a lookup value (admin only).
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(body): Json<CreateLookup>,
) -> Result<Json<ApiResponse<LookupEntry>>, AppError> {
    let entry = lookup::create_lookup(&state.db, &body, &admin.email).await?;
    Ok(ApiResponse::success(entry))
}

/// PATCH /api/lookup/{id} — update or (de)activate a lookup value (admin only).
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLookup>,
) -> Result<Json<ApiResponse<LookupEntry>>, AppError> {
    let entry = lookup::update_lookup(&state.db, id, &body).await?;
    Ok(ApiResponse::success(entry))
}
