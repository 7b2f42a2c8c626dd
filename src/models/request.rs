//! Core request model: the application aggregate and its owned children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

// -- Enums matching PostgreSQL --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "request_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Onboarding,
    Firewall,
    Organization,
    Lob,
    Subscription,
}

impl RequestType {
    /// Prefix used when generating the application code.
    pub fn code_prefix(&self) -> &'static str {
        match self {
            Self::Onboarding => "APP",
            Self::Firewall => "FW",
            Self::Organization => "ORG",
            Self::Lob => "LOB",
            Self::Subscription => "SUB",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "request_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Cancelled,
    SubscriptionAssigned,
    FoundationInfraProvisioning,
    FoundationInfraCompleted,
    InfrastructureProvisioning,
    InfrastructureCompleted,
    Completed,
    Failed,
}

impl RequestStatus {
    /// Terminal statuses admit no further forward progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Cancelled | Self::Completed | Self::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "workflow_stage", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    RequestRaised,
    PendingApproval,
    Approved,
    SubscriptionAssignment,
    FoundationInfra,
    Infrastructure,
    Handover,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "timeline_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimelineStatus {
    InProgress,
    Completed,
    Failed,
}

// -- Application aggregate --

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: i64,
    pub request_type: RequestType,
    pub app_code: String,
    pub app_slug: Option<String>,
    pub application_name: String,
    pub organization: Option<String>,
    pub lob: Option<String>,
    pub platform: String,
    pub onboarding_date: Option<DateTime<Utc>>,
    pub status: RequestStatus,
    pub current_stage: WorkflowStage,
    pub requested_by: String,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expedite_requested: bool,
    pub expedite_requested_at: Option<DateTime<Utc>>,
    pub expedite_reason: Option<String>,
    pub is_editable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AppEnvironment {
    pub id: i64,
    pub app_id: i64,
    pub environment_name: String,
    pub subscription_id: Option<String>,
    pub region: String,
    pub is_assigned: bool,
    pub assigned_by: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimelineEvent {
    pub id: i64,
    pub app_id: i64,
    pub stage: WorkflowStage,
    pub status: TimelineStatus,
    pub message: Option<String>,
    pub performed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditEntry {
    pub id: i64,
    pub category: String,
    pub app_id: Option<i64>,
    pub user_email: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RequestComment {
    pub id: i64,
    pub app_id: i64,
    pub user_email: String,
    pub comment: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

// -- Input DTOs --

/// Environment requested at onboarding time.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnvironmentInput {
    #[validate(length(min = 2, max = 50, message = "Environment name must be 2-50 characters"))]
    pub environment_name: String,
    #[validate(length(min = 1, max = 50, message = "Region must be 1-50 characters"))]
    pub region: String,
}

/// Payload for creating or updating an onboarding request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OnboardingInput {
    #[validate(length(min = 4, max = 6, message = "App slug must be between 4 and 6 characters"))]
    pub app_slug: String,
    #[validate(length(min = 3, max = 200, message = "Application name must be 3-200 characters"))]
    pub application_name: String,
    #[validate(length(min = 2, max = 100, message = "Organization must be 2-100 characters"))]
    pub organization: String,
    #[validate(length(min = 2, max = 100, message = "LOB must be 2-100 characters"))]
    pub lob: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    #[validate(length(min = 1, message = "At least one environment is required"), nested)]
    pub environments: Vec<EnvironmentInput>,
    #[serde(default)]
    pub save_as_draft: bool,
}

fn default_platform() -> String {
    "Azure".to_string()
}

/// Admin decision payload for the approval endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalInput {
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

/// One environment-to-subscription mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionAssignment {
    pub env_id: i64,
    pub subscription_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignSubscriptionsInput {
    pub assignments: Vec<SubscriptionAssignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceStageInput {
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailStageInput {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelInput {
    pub cancellation_reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpediteInput {
    pub expedite_reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub comment: String,
    #[serde(default)]
    pub is_internal: bool,
}

// -- Response DTOs --

/// Full request detail with owned children and audit history attached.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    #[serde(flatten)]
    pub application: Application,
    pub environments: Vec<AppEnvironment>,
    pub timeline: Vec<TimelineEvent>,
    pub comments: Vec<RequestComment>,
    pub audit_logs: Vec<AuditEntry>,
    pub firewall_details: Option<crate::models::firewall::FirewallRequestDetail>,
    pub expedite_eligible: bool,
}

/// Outcome of a lifecycle mutation: the new status and stage.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutcome {
    pub request_id: i64,
    pub app_code: String,
    pub status: RequestStatus,
    pub current_stage: WorkflowStage,
}

impl From<&Application> for LifecycleOutcome {
    fn from(application: &Application) -> Self {
        Self {
            request_id: application.id,
            app_code: application.app_code.clone(),
            status: application.status,
            current_stage: application.current_stage,
        }
    }
}
