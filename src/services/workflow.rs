//! Request lifecycle state machine.
//!
//! Every mutating operation validates the caller and the current state
//! against the transition table, then applies the application update, the
//! audit entry, and the timeline event(s) inside a single transaction.
//! Statuses never regress and terminal statuses admit no outgoing edges.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::models::pagination::ListParams;
use crate::models::request::{
    AppEnvironment, Application, ApprovalInput, AssignSubscriptionsInput, AuditEntry, CommentInput,
    OnboardingInput, RequestComment, RequestDetail, RequestStatus, RequestType, TimelineEvent,
    TimelineStatus, WorkflowStage,
};
use crate::services::firewall;
use crate::services::notification::{NotificationEvent, Notifier};

// -- Transition table --

/// Check whether a status transition is valid per the state machine graph.
pub fn is_valid_transition(from: RequestStatus, to: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        (from, to),
        (Draft, Pending)
            | (Draft, Cancelled)
            | (Pending, Approved)
            | (Pending, Rejected)
            | (Pending, Cancelled)
            | (Approved, SubscriptionAssigned)
            | (Approved, FoundationInfraProvisioning)
            | (SubscriptionAssigned, FoundationInfraProvisioning)
            | (FoundationInfraProvisioning, FoundationInfraCompleted)
            | (FoundationInfraProvisioning, InfrastructureProvisioning)
            | (FoundationInfraCompleted, InfrastructureProvisioning)
            | (InfrastructureProvisioning, InfrastructureCompleted)
            | (InfrastructureCompleted, Completed)
    ) || (to == Failed && !from.is_terminal())
}

fn ensure_transition(from: RequestStatus, to: RequestStatus) -> Result<(), AppError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition(format!(
            "Cannot transition from {from:?} to {to:?}"
        )))
    }
}

/// Statuses that still accept comments.
pub fn is_commentable(status: RequestStatus) -> bool {
    use RequestStatus::*;
    matches!(
        status,
        Draft
            | Pending
            | Approved
            | SubscriptionAssigned
            | FoundationInfraProvisioning
            | FoundationInfraCompleted
            | InfrastructureProvisioning
            | InfrastructureCompleted
    )
}

// -- Stage advancement actions --

/// Named transitions the advance-stage endpoint multiplexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceAction {
    FoundationComplete,
    InfrastructureComplete,
    HandoverComplete,
}

impl AdvanceAction {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "foundation-complete" => Some(Self::FoundationComplete),
            "infrastructure-complete" => Some(Self::InfrastructureComplete),
            "handover-complete" => Some(Self::HandoverComplete),
            _ => None,
        }
    }

    /// Stage the application must currently be in.
    pub fn required_stage(&self) -> WorkflowStage {
        match self {
            Self::FoundationComplete => WorkflowStage::FoundationInfra,
            Self::InfrastructureComplete => WorkflowStage::Infrastructure,
            Self::HandoverComplete => WorkflowStage::Handover,
        }
    }

    /// Stage entered after the action, when the action moves the stage.
    pub fn next_stage(&self) -> Option<WorkflowStage> {
        match self {
            Self::FoundationComplete => Some(WorkflowStage::Infrastructure),
            Self::InfrastructureComplete => Some(WorkflowStage::Handover),
            Self::HandoverComplete => None,
        }
    }

    pub fn next_status(&self) -> RequestStatus {
        match self {
            Self::FoundationComplete => RequestStatus::InfrastructureProvisioning,
            Self::InfrastructureComplete => RequestStatus::InfrastructureCompleted,
            Self::HandoverComplete => RequestStatus::Completed,
        }
    }

    pub fn completion_message(&self) -> &'static str {
        match self {
            Self::FoundationComplete => "Foundation infrastructure completed.",
            Self::InfrastructureComplete => "Application infrastructure completed.",
            Self::HandoverComplete => "Onboarding completed successfully!",
        }
    }

    pub fn next_stage_message(&self) -> Option<&'static str> {
        match self {
            Self::FoundationComplete => Some("Application infrastructure provisioning started."),
            Self::InfrastructureComplete => Some("Handover phase initiated."),
            Self::HandoverComplete => None,
        }
    }
}

// -- Expedite eligibility (advisory) --

/// Business days elapsed between two instants, or calendar days when the
/// business-day calendar is disabled.
pub fn business_days_between(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    business_days_only: bool,
) -> i64 {
    if !business_days_only {
        return (end - start).num_days();
    }
    let mut current = start.date_naive();
    let end_date = end.date_naive();
    let mut days = 0;
    while current < end_date {
        if current.weekday().number_from_monday() <= 5 {
            days += 1;
        }
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    days
}

/// Whether an expedite request would currently be accepted, with the reason
/// when it would not. Advisory only: the mutation itself enforces status and
/// the one-shot flag, not the waiting period.
pub fn expedite_eligibility(
    application: &Application,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> Result<(), String> {
    if application.status != RequestStatus::Pending {
        return Err(format!(
            "Cannot expedite request with status {:?}",
            application.status
        ));
    }
    if application.expedite_requested {
        return Err("Expedite has already been requested".to_string());
    }
    let reference = if application.status == RequestStatus::Pending {
        application.updated_at
    } else {
        application.created_at
    };
    let days_passed = business_days_between(reference, now, config.business_days_only);
    if days_passed < config.expedite_threshold_days {
        return Err(format!(
            "Cannot expedite before {} business days have passed",
            config.expedite_threshold_days
        ));
    }
    Ok(())
}

// -- Shared helpers --

/// Title-case an application name: first letter of each word upper, rest lower.
fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn ensure_owner_or_admin(
    application: &Application,
    user: &CurrentUser,
    verb: &str,
) -> Result<(), AppError> {
    if user.is_admin || application.requested_by == user.email {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "You are not authorized to {verb} this request"
        )))
    }
}

async fn fetch_application(pool: &PgPool, app_id: i64) -> Result<Application, AppError> {
    sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
        .bind(app_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {app_id} not found")))
}

pub(crate) async fn record_audit(
    tx: &mut Transaction<'_, Postgres>,
    category: &str,
    app_id: Option<i64>,
    user_email: &str,
    action: &str,
    details: Option<&str>,
    ip_address: Option<&str>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO request_audit (category, app_id, user_email, action, details, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(category)
    .bind(app_id)
    .bind(user_email)
    .bind(action)
    .bind(details)
    .bind(ip_address)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn record_timeline(
    tx: &mut Transaction<'_, Postgres>,
    app_id: i64,
    stage: WorkflowStage,
    status: TimelineStatus,
    message: &str,
    performed_by: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO request_timeline (app_id, stage, status, message, performed_by)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(app_id)
    .bind(stage)
    .bind(status)
    .bind(message)
    .bind(performed_by)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Fields needed to insert a new tracking application.
pub(crate) struct NewApplication<'a> {
    pub request_type: RequestType,
    pub app_slug: Option<String>,
    pub application_name: String,
    pub organization: Option<&'a str>,
    pub lob: Option<&'a str>,
    pub platform: &'a str,
    pub save_as_draft: bool,
    pub requested_by: &'a str,
}

/// Generate the next application code for a request type.
async fn next_app_code(
    tx: &mut Transaction<'_, Postgres>,
    request_type: RequestType,
) -> Result<String, AppError> {
    let max_id: Option<i64> =
        sqlx::query_scalar("SELECT MAX(id) FROM applications WHERE request_type = $1")
            .bind(request_type)
            .fetch_one(&mut **tx)
            .await?;
    Ok(format!(
        "{}-{:05}",
        request_type.code_prefix(),
        max_id.unwrap_or(0) + 1
    ))
}

/// Insert a new application row. Shared by the onboarding and firewall
/// creation paths; audit and timeline entries are the caller's business.
pub(crate) async fn insert_application(
    tx: &mut Transaction<'_, Postgres>,
    new: NewApplication<'_>,
) -> Result<Application, AppError> {
    let app_code = next_app_code(tx, new.request_type).await?;
    let (status, stage, editable) = if new.save_as_draft {
        (RequestStatus::Draft, WorkflowStage::RequestRaised, true)
    } else {
        (RequestStatus::Pending, WorkflowStage::PendingApproval, false)
    };

    let application = sqlx::query_as::<_, Application>(
        r#"
        INSERT INTO applications
            (request_type, app_code, app_slug, application_name, organization, lob,
             platform, status, current_stage, requested_by, is_editable)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(new.request_type)
    .bind(&app_code)
    .bind(&new.app_slug)
    .bind(&new.application_name)
    .bind(new.organization)
    .bind(new.lob)
    .bind(new.platform)
    .bind(status)
    .bind(stage)
    .bind(new.requested_by)
    .bind(editable)
    .fetch_one(&mut **tx)
    .await?;

    Ok(application)
}

fn normalize_slug(raw: &str) -> Result<String, AppError> {
    let slug = raw.trim().to_lowercase();
    if slug.len() < 4 || slug.len() > 6 {
        return Err(AppError::Validation(
            "App slug must be between 4 and 6 characters".to_string(),
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(AppError::Validation(
            "App slug must contain only lowercase letters and numbers".to_string(),
        ));
    }
    Ok(slug)
}

// -- Operations --

/// Create a new onboarding request with its environments.
pub async fn create_request(
    pool: &PgPool,
    notifier: &Notifier,
    input: &OnboardingInput,
    user: &CurrentUser,
) -> Result<Application, AppError> {
    validator::Validate::validate(input)?;
    let slug = normalize_slug(&input.app_slug)?;

    let mut tx = pool.begin().await?;

    let slug_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM applications WHERE app_slug = $1)")
            .bind(&slug)
            .fetch_one(&mut *tx)
            .await?;
    if slug_taken {
        return Err(AppError::Conflict(format!("Slug '{slug}' is already taken")));
    }

    let application = insert_application(
        &mut tx,
        NewApplication {
            request_type: RequestType::Onboarding,
            app_slug: Some(slug),
            application_name: title_case(&input.application_name),
            organization: Some(input.organization.trim()),
            lob: Some(input.lob.trim()),
            platform: &input.platform,
            save_as_draft: input.save_as_draft,
            requested_by: &user.email,
        },
    )
    .await?;

    for environment in &input.environments {
        sqlx::query(
            "INSERT INTO app_environments (app_id, environment_name, region) VALUES ($1, $2, $3)",
        )
        .bind(application.id)
        .bind(environment.environment_name.trim())
        .bind(environment.region.trim())
        .execute(&mut *tx)
        .await?;
    }

    record_audit(
        &mut tx,
        "CREATE",
        Some(application.id),
        &user.email,
        &format!("Created ONBOARDING request: {}", application.app_code),
        Some(&format!("Application: {}", application.application_name)),
        user.ip_address.as_deref(),
    )
    .await?;

    record_timeline(
        &mut tx,
        application.id,
        WorkflowStage::RequestRaised,
        TimelineStatus::Completed,
        "Request created",
        &user.email,
    )
    .await?;

    if !input.save_as_draft {
        record_timeline(
            &mut tx,
            application.id,
            WorkflowStage::PendingApproval,
            TimelineStatus::InProgress,
            "Request submitted for approval",
            &user.email,
        )
        .await?;
    }

    tx.commit().await?;

    if !input.save_as_draft {
        notifier.notify(&NotificationEvent::RequestSubmitted {
            app_code: application.app_code.clone(),
            app_slug: application.app_slug.clone(),
            application_name: application.application_name.clone(),
            requester: user.email.clone(),
        });
    }

    Ok(application)
}

/// Submit a draft request for approval.
pub async fn submit_request(
    pool: &PgPool,
    notifier: &Notifier,
    app_id: i64,
    user: &CurrentUser,
) -> Result<Application, AppError> {
    let application = fetch_application(pool, app_id).await?;
    ensure_owner_or_admin(&application, user, "submit")?;
    if application.status != RequestStatus::Draft {
        return Err(AppError::InvalidTransition(
            "Only draft requests can be submitted for approval".to_string(),
        ));
    }
    ensure_transition(application.status, RequestStatus::Pending)?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET status = $1, current_stage = $2, is_editable = FALSE, updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(RequestStatus::Pending)
    .bind(WorkflowStage::PendingApproval)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "SUBMIT",
        Some(app_id),
        &user.email,
        &format!("Submitted request {} for approval", updated.app_code),
        Some("Request moved to pending approval"),
        user.ip_address.as_deref(),
    )
    .await?;

    record_timeline(
        &mut tx,
        app_id,
        WorkflowStage::PendingApproval,
        TimelineStatus::InProgress,
        "Request submitted for approval",
        &user.email,
    )
    .await?;

    tx.commit().await?;

    notifier.notify(&NotificationEvent::RequestSubmitted {
        app_code: updated.app_code.clone(),
        app_slug: updated.app_slug.clone(),
        application_name: updated.application_name.clone(),
        requester: updated.requested_by.clone(),
    });

    Ok(updated)
}

/// Update an editable draft in place, optionally re-submitting it.
pub async fn update_request(
    pool: &PgPool,
    notifier: &Notifier,
    app_id: i64,
    input: &OnboardingInput,
    user: &CurrentUser,
) -> Result<Application, AppError> {
    validator::Validate::validate(input)?;
    let slug = normalize_slug(&input.app_slug)?;

    let application = fetch_application(pool, app_id).await?;
    ensure_owner_or_admin(&application, user, "update")?;
    if !application.is_editable {
        return Err(AppError::InvalidTransition(
            "Application is no longer editable".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    if application.app_slug.as_deref() != Some(slug.as_str()) {
        let slug_taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM applications WHERE app_slug = $1 AND id <> $2)",
        )
        .bind(&slug)
        .bind(app_id)
        .fetch_one(&mut *tx)
        .await?;
        if slug_taken {
            return Err(AppError::Conflict(format!("Slug '{slug}' is already taken")));
        }
    }

    let (status, stage, editable) = if input.save_as_draft {
        (application.status, application.current_stage, true)
    } else {
        ensure_transition(application.status, RequestStatus::Pending)?;
        (RequestStatus::Pending, WorkflowStage::PendingApproval, false)
    };

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET app_slug = $1, application_name = $2, organization = $3, lob = $4,
            platform = $5, status = $6, current_stage = $7, is_editable = $8,
            updated_at = NOW()
        WHERE id = $9
        RETURNING *
        "#,
    )
    .bind(&slug)
    .bind(title_case(&input.application_name))
    .bind(input.organization.trim())
    .bind(input.lob.trim())
    .bind(&input.platform)
    .bind(status)
    .bind(stage)
    .bind(editable)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "UPDATE",
        Some(app_id),
        &user.email,
        &format!("Updated application {}", updated.app_code),
        Some("Fields updated: app_slug, application_name, organization, lob, platform"),
        user.ip_address.as_deref(),
    )
    .await?;

    if !input.save_as_draft {
        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::PendingApproval,
            TimelineStatus::InProgress,
            "Request submitted for approval",
            &user.email,
        )
        .await?;
    }

    tx.commit().await?;

    if !input.save_as_draft {
        notifier.notify(&NotificationEvent::RequestSubmitted {
            app_code: updated.app_code.clone(),
            app_slug: updated.app_slug.clone(),
            application_name: updated.application_name.clone(),
            requester: updated.requested_by.clone(),
        });
    }

    Ok(updated)
}

/// Approve or reject a pending request (admin only).
pub async fn decide_request(
    pool: &PgPool,
    notifier: &Notifier,
    app_id: i64,
    input: &ApprovalInput,
    admin: &CurrentUser,
) -> Result<Application, AppError> {
    let application = fetch_application(pool, app_id).await?;
    if application.status != RequestStatus::Pending {
        return Err(AppError::InvalidTransition(format!(
            "Request already {:?}",
            application.status
        )));
    }

    let rejection_reason = if input.approved {
        None
    } else {
        match input
            .rejection_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            Some(reason) => Some(reason.to_string()),
            None => {
                return Err(AppError::Validation(
                    "Rejection reason is required when rejecting a request".to_string(),
                ))
            }
        }
    };

    let (status, stage) = if input.approved {
        (RequestStatus::Approved, WorkflowStage::SubscriptionAssignment)
    } else {
        (RequestStatus::Rejected, WorkflowStage::Rejected)
    };
    ensure_transition(application.status, status)?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET status = $1, current_stage = $2, approved_by = $3, rejection_reason = $4,
            onboarding_date = CASE WHEN $5 THEN NOW() ELSE onboarding_date END,
            updated_at = NOW()
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(status)
    .bind(stage)
    .bind(&admin.email)
    .bind(&rejection_reason)
    .bind(input.approved)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    if input.approved {
        let message = format!("Request approved by {}", admin.email);
        record_audit(
            &mut tx,
            "APPROVE",
            Some(app_id),
            &admin.email,
            &format!("Approved request {}", updated.app_code),
            None,
            admin.ip_address.as_deref(),
        )
        .await?;
        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::PendingApproval,
            TimelineStatus::Completed,
            &message,
            &admin.email,
        )
        .await?;
        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::SubscriptionAssignment,
            TimelineStatus::InProgress,
            "Subscription assignment started",
            &admin.email,
        )
        .await?;
    } else {
        let reason = rejection_reason.as_deref().unwrap_or_default();
        let message = format!("Request rejected by {}: {reason}", admin.email);
        record_audit(
            &mut tx,
            "REJECT",
            Some(app_id),
            &admin.email,
            &format!("Rejected request {}", updated.app_code),
            Some(reason),
            admin.ip_address.as_deref(),
        )
        .await?;
        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::PendingApproval,
            TimelineStatus::Failed,
            &message,
            &admin.email,
        )
        .await?;
        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::Rejected,
            TimelineStatus::Failed,
            &message,
            &admin.email,
        )
        .await?;
    }

    tx.commit().await?;

    if input.approved {
        notifier.notify(&NotificationEvent::RequestApproved {
            app_code: updated.app_code.clone(),
            application_name: updated.application_name.clone(),
            requester: updated.requested_by.clone(),
            approved_by: admin.email.clone(),
        });
    } else {
        notifier.notify(&NotificationEvent::RequestRejected {
            app_code: updated.app_code.clone(),
            application_name: updated.application_name.clone(),
            requester: updated.requested_by.clone(),
            rejected_by: admin.email.clone(),
            reason: updated.rejection_reason.clone().unwrap_or_default(),
        });
    }

    Ok(updated)
}

/// Outcome of a subscription assignment call.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub all_assigned: bool,
    pub status: RequestStatus,
    pub current_stage: WorkflowStage,
}

/// Assign subscription ids to environments (admin only). Advances the stage
/// exactly once, when the last environment is assigned.
pub async fn assign_subscriptions(
    pool: &PgPool,
    notifier: &Notifier,
    app_id: i64,
    input: &AssignSubscriptionsInput,
    admin: &CurrentUser,
) -> Result<AssignmentOutcome, AppError> {
    if input.assignments.is_empty() {
        return Err(AppError::Validation(
            "No subscription assignments provided".to_string(),
        ));
    }

    let application = fetch_application(pool, app_id).await?;
    // A repeat call after the stage advanced is tolerated (stage no-op).
    if !matches!(
        application.status,
        RequestStatus::Approved | RequestStatus::FoundationInfraProvisioning
    ) {
        return Err(AppError::InvalidTransition(
            "Request must be approved first".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    for assignment in &input.assignments {
        let subscription_id = assignment.subscription_id.trim();
        if subscription_id.is_empty() {
            continue;
        }
        sqlx::query(
            r#"
            UPDATE app_environments
            SET subscription_id = $1, is_assigned = TRUE, assigned_by = $2, assigned_at = NOW()
            WHERE id = $3 AND app_id = $4
            "#,
        )
        .bind(subscription_id)
        .bind(&admin.email)
        .bind(assignment.env_id)
        .bind(app_id)
        .execute(&mut *tx)
        .await?;
    }

    let unassigned: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM app_environments WHERE app_id = $1 AND is_assigned = FALSE",
    )
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;
    let all_assigned = unassigned == 0;

    let mut status = application.status;
    let mut stage = application.current_stage;

    if all_assigned && application.current_stage == WorkflowStage::SubscriptionAssignment {
        ensure_transition(application.status, RequestStatus::FoundationInfraProvisioning)?;
        status = RequestStatus::FoundationInfraProvisioning;
        stage = WorkflowStage::FoundationInfra;

        sqlx::query(
            "UPDATE applications SET status = $1, current_stage = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(status)
        .bind(stage)
        .bind(app_id)
        .execute(&mut *tx)
        .await?;

        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::SubscriptionAssignment,
            TimelineStatus::Completed,
            "Subscriptions assigned to all environments",
            &admin.email,
        )
        .await?;
        record_timeline(
            &mut tx,
            app_id,
            WorkflowStage::FoundationInfra,
            TimelineStatus::InProgress,
            "Foundation infrastructure provisioning started",
            &admin.email,
        )
        .await?;
    } else {
        sqlx::query("UPDATE applications SET updated_at = NOW() WHERE id = $1")
            .bind(app_id)
            .execute(&mut *tx)
            .await?;
    }

    record_audit(
        &mut tx,
        "ASSIGN",
        Some(app_id),
        &admin.email,
        &format!(
            "Assigned subscriptions to {} environment(s) of {}",
            input.assignments.len(),
            application.app_code
        ),
        None,
        admin.ip_address.as_deref(),
    )
    .await?;

    tx.commit().await?;

    if stage != application.current_stage {
        notifier.notify(&NotificationEvent::SubscriptionsAssigned {
            app_code: application.app_code.clone(),
            requester: application.requested_by.clone(),
            assigned_by: admin.email.clone(),
        });
    }

    Ok(AssignmentOutcome {
        all_assigned,
        status,
        current_stage: stage,
    })
}

/// Advance the request through a named provisioning transition (admin only).
pub async fn advance_stage(
    pool: &PgPool,
    notifier: &Notifier,
    app_id: i64,
    action: &str,
    admin: &CurrentUser,
) -> Result<Application, AppError> {
    let action = AdvanceAction::parse(action)
        .ok_or_else(|| AppError::Validation("Invalid action".to_string()))?;

    let application = fetch_application(pool, app_id).await?;
    if application.current_stage != action.required_stage() {
        return Err(AppError::InvalidTransition(
            "Invalid stage for this action".to_string(),
        ));
    }
    ensure_transition(application.status, action.next_status())?;

    let previous_stage = application.current_stage;
    let next_stage = action.next_stage().unwrap_or(previous_stage);

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET status = $1, current_stage = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(action.next_status())
    .bind(next_stage)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    record_timeline(
        &mut tx,
        app_id,
        previous_stage,
        TimelineStatus::Completed,
        action.completion_message(),
        &admin.email,
    )
    .await?;

    if let Some(stage) = action.next_stage() {
        if let Some(message) = action.next_stage_message() {
            record_timeline(
                &mut tx,
                app_id,
                stage,
                TimelineStatus::InProgress,
                message,
                &admin.email,
            )
            .await?;
        }
    }

    record_audit(
        &mut tx,
        "ADVANCE",
        Some(app_id),
        &admin.email,
        &format!(
            "Advanced request {}: {}",
            updated.app_code,
            action.completion_message()
        ),
        None,
        admin.ip_address.as_deref(),
    )
    .await?;

    tx.commit().await?;

    notifier.notify(&NotificationEvent::StageUpdated {
        app_code: updated.app_code.clone(),
        requester: updated.requested_by.clone(),
        stage: format!("{:?}", updated.current_stage),
        message: action.completion_message().to_string(),
    });

    Ok(updated)
}

/// Mark the current stage as failed (admin only). The stage is left in place
/// for diagnosis; only the status becomes terminal.
pub async fn fail_stage(
    pool: &PgPool,
    app_id: i64,
    reason: Option<&str>,
    admin: &CurrentUser,
) -> Result<Application, AppError> {
    let application = fetch_application(pool, app_id).await?;
    ensure_transition(application.status, RequestStatus::Failed)?;

    let reason = reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("No reason provided");

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Application>(
        "UPDATE applications SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(RequestStatus::Failed)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    record_timeline(
        &mut tx,
        app_id,
        application.current_stage,
        TimelineStatus::Failed,
        &format!("Stage failed: {reason}"),
        &admin.email,
    )
    .await?;

    record_audit(
        &mut tx,
        "FAIL",
        Some(app_id),
        &admin.email,
        &format!("Marked stage failed for {}", updated.app_code),
        Some(reason),
        admin.ip_address.as_deref(),
    )
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Cancel a request (requester or admin; DRAFT/PENDING only).
pub async fn cancel_request(
    pool: &PgPool,
    app_id: i64,
    reason: &str,
    user: &CurrentUser,
) -> Result<Application, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation(
            "Cancellation reason is required".to_string(),
        ));
    }

    let application = fetch_application(pool, app_id).await?;
    ensure_owner_or_admin(&application, user, "cancel")?;
    if !matches!(
        application.status,
        RequestStatus::Draft | RequestStatus::Pending
    ) {
        return Err(AppError::InvalidTransition(format!(
            "Cannot cancel request with status {:?}",
            application.status
        )));
    }
    ensure_transition(application.status, RequestStatus::Cancelled)?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET status = $1, current_stage = $2, cancelled_by = $3, cancellation_reason = $4,
            cancelled_at = NOW(), is_editable = FALSE, updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(RequestStatus::Cancelled)
    .bind(WorkflowStage::Cancelled)
    .bind(&user.email)
    .bind(reason)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "CANCEL",
        Some(app_id),
        &user.email,
        &format!("Cancelled request {}", updated.app_code),
        Some(&format!("Reason: {reason}")),
        user.ip_address.as_deref(),
    )
    .await?;

    record_timeline(
        &mut tx,
        app_id,
        WorkflowStage::Cancelled,
        TimelineStatus::Completed,
        &format!("Request cancelled: {reason}"),
        &user.email,
    )
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Flag a pending request for expedited handling. Advisory only: status and
/// stage are untouched.
pub async fn expedite_request(
    pool: &PgPool,
    app_id: i64,
    reason: &str,
    user: &CurrentUser,
) -> Result<Application, AppError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation(
            "Expedite reason is required".to_string(),
        ));
    }

    let application = fetch_application(pool, app_id).await?;
    ensure_owner_or_admin(&application, user, "expedite")?;
    if application.status != RequestStatus::Pending {
        return Err(AppError::InvalidTransition(format!(
            "Cannot expedite request with status {:?}",
            application.status
        )));
    }
    if application.expedite_requested {
        return Err(AppError::Conflict(
            "Expedite has already been requested for this application".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let updated = sqlx::query_as::<_, Application>(
        r#"
        UPDATE applications
        SET expedite_requested = TRUE, expedite_requested_at = NOW(), expedite_reason = $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(reason)
    .bind(app_id)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "EXPEDITE",
        Some(app_id),
        &user.email,
        &format!("Expedite requested for {}", updated.app_code),
        Some(&format!("Reason: {reason}")),
        user.ip_address.as_deref(),
    )
    .await?;

    record_timeline(
        &mut tx,
        app_id,
        application.current_stage,
        TimelineStatus::InProgress,
        &format!("Expedite requested: {reason}"),
        &user.email,
    )
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Add a comment to a request.
pub async fn add_comment(
    pool: &PgPool,
    notifier: &Notifier,
    app_id: i64,
    input: &CommentInput,
    user: &CurrentUser,
) -> Result<RequestComment, AppError> {
    let comment_text = input.comment.trim();
    if comment_text.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }

    let application = fetch_application(pool, app_id).await?;
    ensure_owner_or_admin(&application, user, "comment on")?;
    if !is_commentable(application.status) {
        return Err(AppError::InvalidTransition(format!(
            "Cannot comment on request with status {:?}",
            application.status
        )));
    }

    let mut tx = pool.begin().await?;

    let comment = sqlx::query_as::<_, RequestComment>(
        r#"
        INSERT INTO request_comments (app_id, user_email, comment, is_internal)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(app_id)
    .bind(&user.email)
    .bind(comment_text)
    .bind(input.is_internal && user.is_admin)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "COMMENT",
        Some(app_id),
        &user.email,
        &format!("Commented on request {}", application.app_code),
        None,
        user.ip_address.as_deref(),
    )
    .await?;

    tx.commit().await?;

    if user.email != application.requested_by {
        notifier.notify(&NotificationEvent::CommentAdded {
            app_code: application.app_code.clone(),
            recipient: application.requested_by.clone(),
            author: user.email.clone(),
        });
    }

    Ok(comment)
}

// -- Reads --

/// List requests visible to the caller, with optional type/status filters.
pub async fn list_requests(
    pool: &PgPool,
    user: &CurrentUser,
    request_type: Option<RequestType>,
    status: Option<RequestStatus>,
    params: &ListParams,
) -> Result<Vec<Application>, AppError> {
    let requester_filter = if user.is_admin || user.is_network_admin {
        None
    } else {
        Some(user.email.as_str())
    };

    let applications = sqlx::query_as::<_, Application>(
        r#"
        SELECT * FROM applications
        WHERE ($1::VARCHAR IS NULL OR requested_by = $1)
          AND ($2::request_type IS NULL OR request_type = $2)
          AND ($3::request_status IS NULL OR status = $3)
        ORDER BY created_at DESC
        OFFSET $4 LIMIT $5
        "#,
    )
    .bind(requester_filter)
    .bind(request_type)
    .bind(status)
    .bind(params.skip())
    .bind(params.limit())
    .fetch_all(pool)
    .await?;

    Ok(applications)
}

/// Fetch a request with all owned children and audit history.
pub async fn get_request_detail(
    pool: &PgPool,
    config: &AppConfig,
    app_id: i64,
    user: &CurrentUser,
) -> Result<RequestDetail, AppError> {
    let application = fetch_application(pool, app_id).await?;
    if !(user.is_admin || user.is_network_admin || application.requested_by == user.email) {
        return Err(AppError::Forbidden(
            "You are not authorized to view this request".to_string(),
        ));
    }

    let environments = sqlx::query_as::<_, AppEnvironment>(
        "SELECT * FROM app_environments WHERE app_id = $1 ORDER BY id",
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;

    let timeline = sqlx::query_as::<_, TimelineEvent>(
        "SELECT * FROM request_timeline WHERE app_id = $1 ORDER BY created_at, id",
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;

    let comments = sqlx::query_as::<_, RequestComment>(
        "SELECT * FROM request_comments WHERE app_id = $1 ORDER BY created_at, id",
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;

    let audit_logs = sqlx::query_as::<_, AuditEntry>(
        "SELECT * FROM request_audit WHERE app_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;

    let firewall_details = firewall::detail_for_app(pool, app_id).await?;
    let expedite_eligible = expedite_eligibility(&application, config, Utc::now()).is_ok();

    Ok(RequestDetail {
        application,
        environments,
        timeline,
        comments,
        audit_logs,
        firewall_details,
        expedite_eligible,
    })
}

/// Check whether a slug is still available.
pub async fn is_slug_available(pool: &PgPool, slug: &str) -> Result<bool, AppError> {
    let taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM applications WHERE app_slug = $1)")
            .bind(slug)
            .fetch_one(pool)
            .await?;
    Ok(!taken)
}

/// Dashboard counts by status, scoped to the caller's visibility.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total: i64,
    pub draft: i64,
    pub pending: i64,
    pub approved: i64,
    pub completed: i64,
    pub rejected: i64,
}

pub async fn dashboard_stats(
    pool: &PgPool,
    user: &CurrentUser,
) -> Result<DashboardStats, AppError> {
    let requester_filter = if user.is_admin {
        None
    } else {
        Some(user.email.as_str())
    };

    async fn count(
        pool: &PgPool,
        requester: Option<&str>,
        status: Option<RequestStatus>,
    ) -> Result<i64, AppError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM applications
            WHERE ($1::VARCHAR IS NULL OR requested_by = $1)
              AND ($2::request_status IS NULL OR status = $2)
            "#,
        )
        .bind(requester)
        .bind(status)
        .fetch_one(pool)
        .await?;
        Ok(total)
    }

    Ok(DashboardStats {
        total: count(pool, requester_filter, None).await?,
        draft: count(pool, requester_filter, Some(RequestStatus::Draft)).await?,
        pending: count(pool, requester_filter, Some(RequestStatus::Pending)).await?,
        approved: count(pool, requester_filter, Some(RequestStatus::Approved)).await?,
        completed: count(pool, requester_filter, Some(RequestStatus::Completed)).await?,
        rejected: count(pool, requester_filter, Some(RequestStatus::Rejected)).await?,
    })
}

/// Most recent audit entries across all requests (admin reporting).
pub async fn recent_audit(pool: &PgPool, limit: i64) -> Result<Vec<AuditEntry>, AppError> {
    let entries = sqlx::query_as::<_, AuditEntry>(
        "SELECT * FROM request_audit ORDER BY created_at DESC, id DESC LIMIT $1",
    )
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // -- Transition table --

    #[test]
    fn draft_to_pending() {
        assert!(is_valid_transition(
            RequestStatus::Draft,
            RequestStatus::Pending
        ));
    }

    #[test]
    fn pending_to_decision() {
        assert!(is_valid_transition(
            RequestStatus::Pending,
            RequestStatus::Approved
        ));
        assert!(is_valid_transition(
            RequestStatus::Pending,
            RequestStatus::Rejected
        ));
        assert!(is_valid_transition(
            RequestStatus::Pending,
            RequestStatus::Cancelled
        ));
    }

    #[test]
    fn approved_to_provisioning() {
        assert!(is_valid_transition(
            RequestStatus::Approved,
            RequestStatus::FoundationInfraProvisioning
        ));
    }

    #[test]
    fn provisioning_chain() {
        assert!(is_valid_transition(
            RequestStatus::FoundationInfraProvisioning,
            RequestStatus::InfrastructureProvisioning
        ));
        assert!(is_valid_transition(
            RequestStatus::InfrastructureProvisioning,
            RequestStatus::InfrastructureCompleted
        ));
        assert!(is_valid_transition(
            RequestStatus::InfrastructureCompleted,
            RequestStatus::Completed
        ));
    }

    #[test]
    fn no_regression() {
        assert!(!is_valid_transition(
            RequestStatus::Pending,
            RequestStatus::Draft
        ));
        assert!(!is_valid_transition(
            RequestStatus::Approved,
            RequestStatus::Pending
        ));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
            RequestStatus::Completed,
            RequestStatus::Failed,
        ] {
            for target in [
                RequestStatus::Draft,
                RequestStatus::Pending,
                RequestStatus::Approved,
                RequestStatus::Failed,
                RequestStatus::Completed,
            ] {
                assert!(
                    !is_valid_transition(terminal, target),
                    "Expected {terminal:?} -> {target:?} to be invalid"
                );
            }
        }
    }

    #[test]
    fn any_non_terminal_can_fail() {
        for status in [
            RequestStatus::Draft,
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::FoundationInfraProvisioning,
            RequestStatus::InfrastructureProvisioning,
        ] {
            assert!(is_valid_transition(status, RequestStatus::Failed));
        }
    }

    #[test]
    fn skipping_ahead_is_invalid() {
        assert!(!is_valid_transition(
            RequestStatus::Pending,
            RequestStatus::Completed
        ));
        assert!(!is_valid_transition(
            RequestStatus::Draft,
            RequestStatus::Approved
        ));
    }

    // -- Advance actions --

    #[test]
    fn advance_action_parse() {
        assert_eq!(
            AdvanceAction::parse("foundation-complete"),
            Some(AdvanceAction::FoundationComplete)
        );
        assert_eq!(
            AdvanceAction::parse("infrastructure-complete"),
            Some(AdvanceAction::InfrastructureComplete)
        );
        assert_eq!(
            AdvanceAction::parse("handover-complete"),
            Some(AdvanceAction::HandoverComplete)
        );
        assert_eq!(AdvanceAction::parse("warp-speed"), None);
    }

    #[test]
    fn advance_action_stage_requirements() {
        assert_eq!(
            AdvanceAction::FoundationComplete.required_stage(),
            WorkflowStage::FoundationInfra
        );
        assert_eq!(
            AdvanceAction::FoundationComplete.next_stage(),
            Some(WorkflowStage::Infrastructure)
        );
        assert_eq!(
            AdvanceAction::InfrastructureComplete.next_stage(),
            Some(WorkflowStage::Handover)
        );
        // Handover completion keeps the stage and finishes the request.
        assert_eq!(AdvanceAction::HandoverComplete.next_stage(), None);
        assert_eq!(
            AdvanceAction::HandoverComplete.next_status(),
            RequestStatus::Completed
        );
    }

    // -- Commentable statuses --

    #[test]
    fn commentable_statuses() {
        assert!(is_commentable(RequestStatus::Draft));
        assert!(is_commentable(RequestStatus::Pending));
        assert!(is_commentable(RequestStatus::FoundationInfraProvisioning));
        assert!(!is_commentable(RequestStatus::Rejected));
        assert!(!is_commentable(RequestStatus::Cancelled));
        assert!(!is_commentable(RequestStatus::Completed));
        assert!(!is_commentable(RequestStatus::Failed));
    }

    // -- Helpers --

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("acme payments"), "Acme Payments");
        assert_eq!(title_case("ACME PAYMENTS"), "Acme Payments");
        assert_eq!(title_case("  spaced   out  "), "Spaced Out");
    }

    #[test]
    fn slug_normalization() {
        assert_eq!(normalize_slug(" Acme1 ").unwrap(), "acme1");
        assert!(normalize_slug("ab").is_err());
        assert!(normalize_slug("toolong1").is_err());
        assert!(normalize_slug("ac-e1").is_err());
    }

    #[test]
    fn business_days_skip_weekends() {
        // Monday 2025-06-02 to Monday 2025-06-09: five business days.
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 9, 9, 0, 0).unwrap();
        assert_eq!(business_days_between(start, end, true), 5);
        assert_eq!(business_days_between(start, end, false), 7);
    }

    #[test]
    fn business_days_zero_for_same_day() {
        let start = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        assert_eq!(business_days_between(start, start, true), 0);
    }
}
