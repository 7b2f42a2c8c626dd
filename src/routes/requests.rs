//! Request lifecycle routes: creation, reads, and workflow mutations.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::{CurrentUser, RequireAdmin};
use crate::models::pagination::ListParams;
use crate::models::request::{
    AdvanceStageInput, Application, ApprovalInput, AssignSubscriptionsInput, AuditEntry,
    CancelInput, CommentInput, ExpediteInput, FailStageInput, LifecycleOutcome, OnboardingInput,
    RequestComment, RequestDetail, RequestStatus, RequestType,
};
use crate::services::workflow;
use crate::AppState;

/// Type/status filters accepted by the request listing.
#[derive(Debug, Deserialize, Default)]
pub struct RequestFilters {
    #[serde(rename = "type")]
    pub request_type: Option<String>,
    pub status: Option<String>,
}

fn parse_filter<T: serde::de::DeserializeOwned>(
    value: Option<&str>,
    kind: &str,
) -> Result<Option<T>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => serde_json::from_value(serde_json::json!(raw.to_uppercase()))
            .map(Some)
            .map_err(|_| AppError::Validation(format!("Unknown {kind} '{raw}'"))),
    }
}

/// GET /api/requests — list requests visible to the caller.
pub async fn list(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filters): Query<RequestFilters>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<Application>>>, AppError> {
    let request_type: Option<RequestType> =
        parse_filter(filters.request_type.as_deref(), "request type")?;
    let status: Option<RequestStatus> = parse_filter(filters.status.as_deref(), "status")?;

    let applications =
        workflow::list_requests(&state.db, &current_user, request_type, status, &params).await?;
    Ok(ApiResponse::success(applications))
}

/// POST /api/requests — create a new onboarding request.
pub async fn create(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<OnboardingInput>,
) -> Result<Json<ApiResponse<Application>>, AppError> {
    let application =
        workflow::create_request(&state.db, &state.notifier, &body, &current_user).await?;
    Ok(ApiResponse::success(application))
}

/// GET /api/requests/{id} — request detail with history attached.
pub async fn get_by_id(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<RequestDetail>>, AppError> {
    let detail =
        workflow::get_request_detail(&state.db, &state.config, id, &current_user).await?;
    Ok(ApiResponse::success(detail))
}

/// PATCH /api/requests/{id} — update an editable draft.
pub async fn update(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<OnboardingInput>,
) -> Result<Json<ApiResponse<Application>>, AppError> {
    let application =
        workflow::update_request(&state.db, &state.notifier, id, &body, &current_user).await?;
    Ok(ApiResponse::success(application))
}

/// POST /api/requests/{id}/submit — submit a draft for approval.
pub async fn submit(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<LifecycleOutcome>>, AppError> {
    let application =
        workflow::submit_request(&state.db, &state.notifier, id, &current_user).await?;
    Ok(ApiResponse::success(LifecycleOutcome::from(&application)))
}

/// POST /api/requests/{id}/approve — approve or reject (admin only).
pub async fn approve(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(body): Json<ApprovalInput>,
) -> Result<Json<ApiResponse<LifecycleOutcome>>, AppError> {
    let application =
        workflow::decide_request(&state.db, &state.notifier, id, &body, &admin).await?;
    Ok(ApiResponse::success(LifecycleOutcome::from(&application)))
}

/// POST /api/requests/{id}/assign-subscriptions — map subscriptions (admin only).
pub async fn assign_subscriptions(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(body): Json<AssignSubscriptionsInput>,
) -> Result<Json<ApiResponse<workflow::AssignmentOutcome>>, AppError> {
    let outcome =
        workflow::assign_subscriptions(&state.db, &state.notifier, id, &body, &admin).await?;
    Ok(ApiResponse::success(outcome))
}

/// POST /api/requests/{id}/advance-stage — named stage transition (admin only).
pub async fn advance_stage(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(body): Json<AdvanceStageInput>,
) -> Result<Json<ApiResponse<LifecycleOutcome>>, AppError> {
    let application =
        workflow::advance_stage(&state.db, &state.notifier, id, &body.action, &admin).await?;
    Ok(ApiResponse::success(LifecycleOutcome::from(&application)))
}

/// POST /api/requests/{id}/fail — mark the current stage failed (admin only).
pub async fn fail_stage(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
    Json(body): Json<FailStageInput>,
) -> Result<Json<ApiResponse<LifecycleOutcome>>, AppError> {
    let application =
        workflow::fail_stage(&state.db, id, body.reason.as_deref(), &admin).await?;
    Ok(ApiResponse::success(LifecycleOutcome::from(&application)))
}

/// POST /api/requests/{id}/cancel — cancel a draft or pending request.
pub async fn cancel(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<CancelInput>,
) -> Result<Json<ApiResponse<LifecycleOutcome>>, AppError> {
    let application =
        workflow::cancel_request(&state.db, id, &body.cancellation_reason, &current_user).await?;
    Ok(ApiResponse::success(LifecycleOutcome::from(&application)))
}

/// POST /api/requests/{id}/expedite — flag a pending request for expedite.
pub async fn expedite(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<ExpediteInput>,
) -> Result<Json<ApiResponse<Application>>, AppError> {
    let application =
        workflow::expedite_request(&state.db, id, &body.expedite_reason, &current_user).await?;
    Ok(ApiResponse::success(application))
}

/// POST /api/requests/{id}/comments — add a comment.
pub async fn add_comment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<CommentInput>,
) -> Result<Json<ApiResponse<RequestComment>>, AppError> {
    let comment =
        workflow::add_comment(&state.db, &state.notifier, id, &body, &current_user).await?;
    Ok(ApiResponse::success(comment))
}

/// Slug availability probe result.
#[derive(Debug, serde::Serialize)]
pub struct SlugAvailability {
    pub available: bool,
    pub message: String,
}

/// GET /api/validate/slug/{slug} — check slug format and availability.
pub async fn validate_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<SlugAvailability>>, AppError> {
    let slug = slug.trim().to_lowercase();

    if slug.len() < 4 || slug.len() > 6 {
        return Err(AppError::Validation(
            "Slug must be between 4 and 6 characters".to_string(),
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(AppError::Validation(
            "Slug must contain only alphanumeric characters".to_string(),
        ));
    }

    let available = workflow::is_slug_available(&state.db, &slug).await?;
    let message = if available {
        "Slug is available"
    } else {
        "This slug is already taken"
    };
    Ok(ApiResponse::success(SlugAvailability {
        available,
        message: message.to_string(),
    }))
}

/// GET /api/stats — dashboard counts scoped to the caller.
pub async fn stats(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<workflow::DashboardStats>>, AppError> {
    let stats = workflow::dashboard_stats(&state.db, &current_user).await?;
    Ok(ApiResponse::success(stats))
}

#[derive(Debug, Deserialize, Default)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// GET /api/audit — recent audit entries (admin only).
pub async fn audit_log(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntry>>>, AppError> {
    let entries = workflow::recent_audit(&state.db, query.limit.unwrap_or(100)).await?;
    Ok(ApiResponse::success(entries))
}
