//! Notification dispatcher.
//!
//! Receives semantic lifecycle events, renders the outbound text, and emits
//! it through the logging pipeline. Delivery transport is owned by an
//! external relay watching these log records; dispatch is best-effort and
//! can never fail the operation that triggered it.

use crate::config::AppConfig;

/// Semantic events the core emits at lifecycle boundaries.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    RequestSubmitted {
        app_code: String,
        app_slug: Option<String>,
        application_name: String,
        requester: String,
    },
    RequestApproved {
        app_code: String,
        application_name: String,
        requester: String,
        approved_by: String,
    },
    RequestRejected {
        app_code: String,
        application_name: String,
        requester: String,
        rejected_by: String,
        reason: String,
    },
    SubscriptionsAssigned {
        app_code: String,
        requester: String,
        assigned_by: String,
    },
    StageUpdated {
        app_code: String,
        requester: String,
        stage: String,
        message: String,
    },
    CommentAdded {
        app_code: String,
        recipient: String,
        author: String,
    },
}

/// Rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    admin_emails: Vec<String>,
    network_admin_emails: Vec<String>,
}

impl Notifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            admin_emails: config.admin_emails.clone(),
            network_admin_emails: config.network_admin_emails.clone(),
        }
    }

    /// Render and emit an event. Never fails.
    pub fn notify(&self, event: &NotificationEvent) {
        let notification = self.render(event);
        if notification.recipients.is_empty() {
            tracing::warn!(subject = %notification.subject, "No recipients for notification");
            return;
        }
        tracing::info!(
            recipients = %notification.recipients.join(", "),
            subject = %notification.subject,
            body = %notification.body,
            "Notification dispatched"
        );
    }

    /// Build the outbound subject/body/recipient set for an event.
    pub fn render(&self, event: &NotificationEvent) -> Notification {
        match event {
            NotificationEvent::RequestSubmitted {
                app_code,
                app_slug,
                application_name,
                requester,
            } => {
                let mut recipients = self.admin_emails.clone();
                recipients.extend(self.network_admin_emails.iter().cloned());
                recipients.dedup();
                Notification {
                    recipients,
                    subject: format!("[Runway] Approval required: {app_code}"),
                    body: format!(
                        "A new request requires your approval.\n\n\
                         Application Code: {app_code}\n\
                         Application Slug: {}\n\
                         Application Name: {application_name}\n\
                         Requested By: {requester}\n\n\
                         Please review and approve or reject this request.",
                        app_slug.as_deref().unwrap_or("-"),
                    ),
                }
            }
            NotificationEvent::RequestApproved {
                app_code,
                application_name,
                requester,
                approved_by,
            } => Notification {
                recipients: vec![requester.clone()],
                subject: format!("[Runway] Approved: {app_code}"),
                body: format!(
                    "Your request has been approved.\n\n\
                     Application Code: {app_code}\n\
                     Application Name: {application_name}\n\
                     Approved By: {approved_by}\n\n\
                     The provisioning process will begin shortly."
                ),
            },
            NotificationEvent::RequestRejected {
                app_code,
                application_name,
                requester,
                rejected_by,
                reason,
            } => Notification {
                recipients: vec![requester.clone()],
                subject: format!("[Runway] Rejected: {app_code}"),
                body: format!(
                    "Your request has been rejected.\n\n\
                     Application Code: {app_code}\n\
                     Application Name: {application_name}\n\
                     Rejected By: {rejected_by}\n\n\
                     Reason:\n{reason}\n\n\
                     You may submit a new request after addressing the issues noted."
                ),
            },
            NotificationEvent::SubscriptionsAssigned {
                app_code,
                requester,
                assigned_by,
            } => Notification {
                recipients: vec![requester.clone()],
                subject: format!("[Runway] Subscriptions assigned: {app_code}"),
                body: format!(
                    "Subscriptions have been assigned to all environments of {app_code} \
                     by {assigned_by}. Foundation infrastructure provisioning has started."
                ),
            },
            NotificationEvent::StageUpdated {
                app_code,
                requester,
                stage,
                message,
            } => Notification {
                recipients: vec![requester.clone()],
                subject: format!("[Runway] Stage update: {app_code}"),
                body: format!("{app_code} is now in stage {stage}.\n\n{message}"),
            },
            NotificationEvent::CommentAdded {
                app_code,
                recipient,
                author,
            } => Notification {
                recipients: vec![recipient.clone()],
                subject: format!("[Runway] New comment on {app_code}"),
                body: format!("{author} commented on request {app_code}."),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> Notifier {
        Notifier {
            admin_emails: vec!["admin@runway.local".to_string()],
            network_admin_emails: vec!["netops@runway.local".to_string()],
        }
    }

    #[test]
    fn submitted_goes_to_admins_and_network_admins() {
        let n = notifier().render(&NotificationEvent::RequestSubmitted {
            app_code: "APP-00001".to_string(),
            app_slug: Some("acme1".to_string()),
            application_name: "Acme Payments".to_string(),
            requester: "user@runway.local".to_string(),
        });
        assert_eq!(
            n.recipients,
            vec!["admin@runway.local", "netops@runway.local"]
        );
        assert!(n.subject.contains("APP-00001"));
        assert!(n.body.contains("acme1"));
    }

    #[test]
    fn approval_goes_to_requester() {
        let n = notifier().render(&NotificationEvent::RequestApproved {
            app_code: "APP-00001".to_string(),
            application_name: "Acme Payments".to_string(),
            requester: "user@runway.local".to_string(),
            approved_by: "admin@runway.local".to_string(),
        });
        assert_eq!(n.recipients, vec!["user@runway.local"]);
        assert!(n.body.contains("approved"));
    }

    #[test]
    fn rejection_includes_reason() {
        let n = notifier().render(&NotificationEvent::RequestRejected {
            app_code: "APP-00001".to_string(),
            application_name: "Acme Payments".to_string(),
            requester: "user@runway.local".to_string(),
            rejected_by: "admin@runway.local".to_string(),
            reason: "Missing cost center".to_string(),
        });
        assert!(n.body.contains("Missing cost center"));
    }

    #[test]
    fn notify_never_panics_without_recipients() {
        let empty = Notifier {
            admin_emails: vec![],
            network_admin_emails: vec![],
        };
        empty.notify(&NotificationEvent::RequestSubmitted {
            app_code: "APP-00001".to_string(),
            app_slug: None,
            application_name: "Acme Payments".to_string(),
            requester: "user@runway.local".to_string(),
        });
    }
}
