//! Firewall request engine: duplicate detection, priority allocation, rule
//! persistence, and rule-collection document generation.
//!
//! A create call validates and normalizes the payload, checks every rule's
//! duplicate key against live history, and then persists the tracking
//! application, the detail record, the collections, and the entries in one
//! transaction. The duplicate lookup runs inside that same transaction so
//! two concurrent submissions cannot both pass the check.

use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::models::firewall::{
    ApplicationRuleInput, CollectionType, DuplicateRuleConflict, FirewallRequest,
    FirewallRequestDetail, FirewallRequestInput, NatRuleInput, NetworkRuleInput, RuleCollection,
    RuleCollectionDetail, RuleEntry, SourceApplicationRef,
};
use crate::models::request::{
    Application, RequestType, TimelineStatus, WorkflowStage,
};
use crate::services::notification::{NotificationEvent, Notifier};
use crate::services::workflow::{
    insert_application, record_audit, record_timeline, NewApplication,
};
use crate::services::{duplicate_key, rules};

/// One rule group flattened to its collection type and normalized rules.
enum RuleGroup<'a> {
    Application(&'a crate::models::firewall::ApplicationRuleGroupInput),
    Network(&'a crate::models::firewall::NetworkRuleGroupInput),
    Nat(&'a crate::models::firewall::NatRuleGroupInput),
}

impl RuleGroup<'_> {
    fn collection_type(&self) -> CollectionType {
        match self {
            Self::Application(_) => CollectionType::Application,
            Self::Network(_) => CollectionType::Network,
            Self::Nat(_) => CollectionType::Nat,
        }
    }

    fn action(&self) -> &str {
        match self {
            Self::Application(g) => &g.action,
            Self::Network(g) => &g.action,
            Self::Nat(g) => &g.action,
        }
    }

    fn priority(&self) -> Option<i32> {
        match self {
            Self::Application(g) => g.priority,
            Self::Network(g) => g.priority,
            Self::Nat(g) => g.priority,
        }
    }

    fn rule_keys(&self) -> Vec<String> {
        match self {
            Self::Application(g) => g.rules.iter().map(duplicate_key::application_rule_key).collect(),
            Self::Network(g) => g.rules.iter().map(duplicate_key::network_rule_key).collect(),
            Self::Nat(g) => g.rules.iter().map(duplicate_key::nat_rule_key).collect(),
        }
    }
}

fn groups_of(input: &FirewallRequestInput) -> Vec<RuleGroup<'_>> {
    let mut groups = Vec::new();
    if let Some(group) = &input.application_rules {
        groups.push(RuleGroup::Application(group));
    }
    if let Some(group) = &input.network_rules {
        groups.push(RuleGroup::Network(group));
    }
    if let Some(group) = &input.nat_rules {
        groups.push(RuleGroup::Nat(group));
    }
    groups
}

/// Pick the priority for a new rule collection: an explicit request wins,
/// otherwise the next free slot above what the source application already
/// has deployed for this collection type.
fn allocate_priority(
    collection_type: CollectionType,
    requested: Option<i32>,
    existing_max: Option<i32>,
) -> i32 {
    if let Some(priority) = requested {
        return priority;
    }
    match existing_max {
        None => collection_type.baseline_priority(),
        Some(max) => (max + 100).min(65000),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DuplicateRow {
    rule_name: String,
    collection_type: CollectionType,
    duplicate_key: String,
    existing_request_id: i64,
    existing_app_id: i64,
    existing_app_code: String,
    existing_app_status: crate::models::request::RequestStatus,
}

/// Find existing rule entries matching any of the supplied keys whose owning
/// application is still live (not rejected, cancelled, or failed).
async fn find_duplicates(
    tx: &mut Transaction<'_, Postgres>,
    keys: &[String],
) -> Result<Vec<DuplicateRuleConflict>, AppError> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, DuplicateRow>(
        r#"
        SELECT e.name AS rule_name,
               e.collection_type,
               e.duplicate_key,
               r.id AS existing_request_id,
               a.id AS existing_app_id,
               a.app_code AS existing_app_code,
               a.status AS existing_app_status
        FROM firewall_rule_entries e
        JOIN firewall_requests r ON e.firewall_request_id = r.id
        JOIN applications a ON r.app_id = a.id
        WHERE e.duplicate_key = ANY($1)
          AND a.status NOT IN ('REJECTED', 'CANCELLED', 'FAILED')
        ORDER BY e.id
        "#,
    )
    .bind(keys)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DuplicateRuleConflict {
            rule_name: row.rule_name,
            collection_type: row.collection_type,
            duplicate_key: row.duplicate_key,
            existing_request_id: row.existing_request_id,
            existing_app_id: row.existing_app_id,
            existing_app_code: row.existing_app_code,
            existing_app_status: row.existing_app_status,
        })
        .collect())
}

/// Resolve the source application by numeric id, app code, or slug; it must
/// be an onboarding application.
async fn resolve_source_application(
    tx: &mut Transaction<'_, Postgres>,
    reference: &SourceApplicationRef,
) -> Result<Application, AppError> {
    let application = match reference {
        SourceApplicationRef::Id(id) => {
            sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?
        }
        SourceApplicationRef::Key(key) => {
            if let Ok(id) = key.parse::<i64>() {
                sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
            } else {
                sqlx::query_as::<_, Application>(
                    "SELECT * FROM applications WHERE app_code = $1 OR app_slug = $1",
                )
                .bind(key)
                .fetch_optional(&mut **tx)
                .await?
            }
        }
    };

    let application = application.ok_or_else(|| {
        AppError::NotFound(
            "Source application not found. Provide a valid ID, app code, or slug.".to_string(),
        )
    })?;

    if application.request_type != RequestType::Onboarding {
        return Err(AppError::Validation(
            "Firewall requests must target an onboarding application".to_string(),
        ));
    }
    Ok(application)
}

/// Validate the requested environment scopes against the source
/// application's environment names, mapping abbreviated codes to full names.
fn validate_scopes_against_source(
    scopes: &[String],
    environment_names: &[String],
) -> Result<(), AppError> {
    let available: Vec<String> = environment_names
        .iter()
        .map(|name| name.trim().to_uppercase())
        .collect();

    let mut invalid: Vec<String> = scopes
        .iter()
        .map(|scope| rules::scope_full_name(scope).to_string())
        .filter(|full_name| !available.contains(full_name))
        .collect();
    invalid.sort();
    invalid.dedup();

    if !invalid.is_empty() {
        return Err(AppError::Validation(format!(
            "Environment scopes must match the application's environments; invalid: {}",
            invalid.join(", ")
        )));
    }
    Ok(())
}

async fn insert_collection(
    tx: &mut Transaction<'_, Postgres>,
    firewall_request_id: i64,
    collection_type: CollectionType,
    action: &str,
    priority: i32,
) -> Result<RuleCollection, AppError> {
    let collection = sqlx::query_as::<_, RuleCollection>(
        r#"
        INSERT INTO firewall_rule_collections (firewall_request_id, collection_type, action, priority)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(firewall_request_id)
    .bind(collection_type)
    .bind(action)
    .bind(priority)
    .fetch_one(&mut **tx)
    .await?;
    Ok(collection)
}

/// Type-specific JSON columns for one rule entry.
struct EntryColumns {
    protocols: serde_json::Value,
    source_addresses: serde_json::Value,
    source_ip_groups: serde_json::Value,
    destination_addresses: serde_json::Value,
    destination_ip_addresses: serde_json::Value,
    destination_ip_groups: serde_json::Value,
    destination_fqdns: serde_json::Value,
    destination_ports: serde_json::Value,
    destination_address: Option<String>,
    translated_address: Option<String>,
    translated_port: Option<i32>,
}

fn application_entry_columns(rule: &ApplicationRuleInput) -> EntryColumns {
    EntryColumns {
        protocols: json!(rule.protocols),
        source_addresses: json!(rule.source_ip_addresses),
        source_ip_groups: json!(rule.source_ip_groups),
        destination_addresses: json!(rule.destination_addresses),
        destination_ip_addresses: json!([]),
        destination_ip_groups: json!([]),
        destination_fqdns: json!(rule.destination_fqdns),
        destination_ports: json!(rule
            .protocols
            .iter()
            .map(|p| p.port.to_string())
            .collect::<Vec<_>>()),
        destination_address: None,
        translated_address: None,
        translated_port: None,
    }
}

fn network_entry_columns(rule: &NetworkRuleInput) -> EntryColumns {
    EntryColumns {
        protocols: json!(rule.protocols),
        source_addresses: json!(rule.source_ip_addresses),
        source_ip_groups: json!(rule.source_ip_groups),
        destination_addresses: json!([]),
        destination_ip_addresses: json!(rule.destination_ip_addresses),
        destination_ip_groups: json!(rule.destination_ip_groups),
        destination_fqdns: json!(rule.destination_fqdns),
        destination_ports: json!(rule.destination_ports),
        destination_address: None,
        translated_address: None,
        translated_port: None,
    }
}

fn nat_entry_columns(rule: &NatRuleInput) -> EntryColumns {
    EntryColumns {
        protocols: json!(rule.protocols),
        source_addresses: json!(rule.source_ip_addresses),
        source_ip_groups: json!(rule.source_ip_groups),
        destination_addresses: json!([rule.destination_address.clone()]),
        destination_ip_addresses: json!([]),
        destination_ip_groups: json!([]),
        destination_fqdns: json!([]),
        destination_ports: json!(rule.destination_ports),
        destination_address: Some(rule.destination_address.clone()),
        translated_address: Some(rule.translated_address.clone()),
        translated_port: Some(i32::from(rule.translated_port)),
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert_entry(
    tx: &mut Transaction<'_, Postgres>,
    firewall_request_id: i64,
    rule_collection_id: i64,
    collection_type: CollectionType,
    name: &str,
    ritm_number: Option<&str>,
    description: Option<&str>,
    columns: EntryColumns,
    duplicate_key: &str,
) -> Result<RuleEntry, AppError> {
    let entry = sqlx::query_as::<_, RuleEntry>(
        r#"
        INSERT INTO firewall_rule_entries
            (firewall_request_id, rule_collection_id, collection_type, name, ritm_number,
             description, protocols, source_addresses, source_ip_groups,
             destination_addresses, destination_ip_addresses, destination_ip_groups,
             destination_fqdns, destination_ports, destination_address,
             translated_address, translated_port, duplicate_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        RETURNING *
        "#,
    )
    .bind(firewall_request_id)
    .bind(rule_collection_id)
    .bind(collection_type)
    .bind(name)
    .bind(ritm_number)
    .bind(description)
    .bind(columns.protocols)
    .bind(columns.source_addresses)
    .bind(columns.source_ip_groups)
    .bind(columns.destination_addresses)
    .bind(columns.destination_ip_addresses)
    .bind(columns.destination_ip_groups)
    .bind(columns.destination_fqdns)
    .bind(columns.destination_ports)
    .bind(columns.destination_address)
    .bind(columns.translated_address)
    .bind(columns.translated_port)
    .bind(duplicate_key)
    .fetch_one(&mut **tx)
    .await?;
    Ok(entry)
}

// -- Document generation --

fn document_rule(entry: &RuleEntry) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    fields.insert("name".to_string(), json!(entry.name));
    fields.insert(
        "ritm_number".to_string(),
        json!(entry.ritm_number.as_deref().unwrap_or("")),
    );
    fields.insert(
        "description".to_string(),
        json!(entry.description.as_deref().unwrap_or("")),
    );
    fields.insert("protocols".to_string(), entry.protocols.clone());
    fields.insert(
        "source_ip_addresses".to_string(),
        entry.source_addresses.clone(),
    );
    fields.insert("source_ip_groups".to_string(), entry.source_ip_groups.clone());
    match entry.collection_type {
        CollectionType::Application => {
            fields.insert("destination_fqdns".to_string(), entry.destination_fqdns.clone());
            fields.insert(
                "destination_addresses".to_string(),
                entry.destination_addresses.clone(),
            );
        }
        CollectionType::Network => {
            fields.insert(
                "destination_ip_addresses".to_string(),
                entry.destination_ip_addresses.clone(),
            );
            fields.insert(
                "destination_ip_groups".to_string(),
                entry.destination_ip_groups.clone(),
            );
            fields.insert("destination_ports".to_string(), entry.destination_ports.clone());
            fields.insert("destination_fqdns".to_string(), entry.destination_fqdns.clone());
        }
        CollectionType::Nat => {
            fields.insert(
                "destination_address".to_string(),
                json!(entry.destination_address),
            );
            fields.insert("destination_ports".to_string(), entry.destination_ports.clone());
            fields.insert(
                "translated_address".to_string(),
                json!(entry.translated_address),
            );
            fields.insert("translated_port".to_string(), json!(entry.translated_port));
        }
    }
    serde_json::Value::Object(fields)
}

/// Render the rule-collection document handed to downstream tooling.
/// Deterministic for a given set of stored collections and entries.
pub fn render_document(
    collection_name: &str,
    ip_groups: &serde_json::Value,
    collections: &[RuleCollectionDetail],
) -> serde_json::Value {
    let mut rules_section = serde_json::Map::new();
    for detail in collections {
        if detail.rule_entries.is_empty() {
            continue;
        }
        let formatted: Vec<serde_json::Value> =
            detail.rule_entries.iter().map(document_rule).collect();
        rules_section.insert(
            detail.collection.collection_type.document_key().to_string(),
            json!({
                "priority": detail.collection.priority,
                "action": detail.collection.action,
                "rules": formatted,
            }),
        );
    }

    json!({
        collection_name: {
            "application_name": collection_name,
            "ip_groups": ip_groups,
            "rules": rules_section,
        }
    })
}

// -- Operations --

/// Create a firewall request along with its tracking application, rule
/// collections, and rule entries.
pub async fn create_firewall_request(
    pool: &PgPool,
    notifier: &Notifier,
    mut input: FirewallRequestInput,
    user: &CurrentUser,
) -> Result<FirewallRequestDetail, AppError> {
    rules::validate_firewall_input(&mut input)?;

    let all_keys: Vec<String> = groups_of(&input)
        .iter()
        .flat_map(|group| group.rule_keys())
        .collect();

    let mut tx = pool.begin().await?;

    let conflicts = find_duplicates(&mut tx, &all_keys).await?;
    if !conflicts.is_empty() {
        return Err(AppError::DuplicateRules(conflicts));
    }

    let source = resolve_source_application(&mut tx, &input.source_application_id).await?;

    let environment_names: Vec<String> = sqlx::query_scalar(
        "SELECT environment_name FROM app_environments WHERE app_id = $1",
    )
    .bind(source.id)
    .fetch_all(&mut *tx)
    .await?;
    validate_scopes_against_source(&input.environment_scopes, &environment_names)?;

    let tracking = insert_application(
        &mut tx,
        NewApplication {
            request_type: RequestType::Firewall,
            app_slug: None,
            application_name: source.application_name.clone(),
            organization: source.organization.as_deref(),
            lob: source.lob.as_deref(),
            platform: &source.platform,
            save_as_draft: false,
            requested_by: &user.email,
        },
    )
    .await?;

    let request = sqlx::query_as::<_, FirewallRequest>(
        r#"
        INSERT INTO firewall_requests
            (app_id, source_application_id, collection_name, ip_groups, environment_scopes,
             destination_service, justification, requested_effective_date, expires_at,
             change_request_url, duplicate_hash, application_name_at_submission,
             organization_at_submission, lob_at_submission, requester_email_at_submission)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(tracking.id)
    .bind(source.id)
    .bind(&input.collection_name)
    .bind(json!(input.ip_groups))
    .bind(json!(input.environment_scopes))
    .bind(&input.destination_service)
    .bind(&input.justification)
    .bind(input.requested_effective_date)
    .bind(input.expires_at)
    .bind(&input.change_request_url)
    .bind(duplicate_key::request_hash(&all_keys))
    .bind(&source.application_name)
    .bind(&source.organization)
    .bind(&source.lob)
    .bind(&tracking.requested_by)
    .fetch_one(&mut *tx)
    .await?;

    let mut collection_details: Vec<RuleCollectionDetail> = Vec::new();

    for group in groups_of(&input) {
        let collection_type = group.collection_type();
        let existing_max: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT MAX(c.priority)
            FROM firewall_rule_collections c
            JOIN firewall_requests r ON c.firewall_request_id = r.id
            WHERE r.source_application_id = $1 AND c.collection_type = $2 AND r.id <> $3
            "#,
        )
        .bind(source.id)
        .bind(collection_type)
        .bind(request.id)
        .fetch_one(&mut *tx)
        .await?;

        let priority = allocate_priority(collection_type, group.priority(), existing_max);
        let collection =
            insert_collection(&mut tx, request.id, collection_type, group.action(), priority)
                .await?;

        let mut entries = Vec::new();
        match group {
            RuleGroup::Application(g) => {
                for rule in &g.rules {
                    let key = duplicate_key::application_rule_key(rule);
                    entries.push(
                        insert_entry(
                            &mut tx,
                            request.id,
                            collection.id,
                            collection_type,
                            &rule.name,
                            rule.ritm_number.as_deref(),
                            rule.description.as_deref(),
                            application_entry_columns(rule),
                            &key,
                        )
                        .await?,
                    );
                }
            }
            RuleGroup::Network(g) => {
                for rule in &g.rules {
                    let key = duplicate_key::network_rule_key(rule);
                    entries.push(
                        insert_entry(
                            &mut tx,
                            request.id,
                            collection.id,
                            collection_type,
                            &rule.name,
                            rule.ritm_number.as_deref(),
                            rule.description.as_deref(),
                            network_entry_columns(rule),
                            &key,
                        )
                        .await?,
                    );
                }
            }
            RuleGroup::Nat(g) => {
                for rule in &g.rules {
                    let key = duplicate_key::nat_rule_key(rule);
                    entries.push(
                        insert_entry(
                            &mut tx,
                            request.id,
                            collection.id,
                            collection_type,
                            &rule.name,
                            rule.ritm_number.as_deref(),
                            rule.description.as_deref(),
                            nat_entry_columns(rule),
                            &key,
                        )
                        .await?,
                    );
                }
            }
        }

        collection_details.push(RuleCollectionDetail {
            collection,
            rule_entries: entries,
        });
    }

    let document = render_document(
        &request.collection_name,
        &request.ip_groups,
        &collection_details,
    );
    let request = sqlx::query_as::<_, FirewallRequest>(
        "UPDATE firewall_requests SET collection_document = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(&document)
    .bind(request.id)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "CREATE",
        Some(tracking.id),
        &user.email,
        &format!("Created firewall request {}", tracking.app_code),
        Some(&format!("Submitted {} firewall rule(s)", all_keys.len())),
        user.ip_address.as_deref(),
    )
    .await?;

    record_timeline(
        &mut tx,
        tracking.id,
        WorkflowStage::RequestRaised,
        TimelineStatus::Completed,
        "Request created",
        &user.email,
    )
    .await?;
    record_timeline(
        &mut tx,
        tracking.id,
        WorkflowStage::PendingApproval,
        TimelineStatus::InProgress,
        "Firewall request awaiting network admin review",
        &user.email,
    )
    .await?;

    tx.commit().await?;

    notifier.notify(&NotificationEvent::RequestSubmitted {
        app_code: tracking.app_code.clone(),
        app_slug: None,
        application_name: tracking.application_name.clone(),
        requester: user.email.clone(),
    });

    Ok(FirewallRequestDetail {
        request,
        rule_collections: collection_details,
    })
}

/// Attach collections and entries to a stored firewall request.
async fn load_detail(
    pool: &PgPool,
    request: FirewallRequest,
) -> Result<FirewallRequestDetail, AppError> {
    let collections = sqlx::query_as::<_, RuleCollection>(
        "SELECT * FROM firewall_rule_collections WHERE firewall_request_id = $1 ORDER BY id",
    )
    .bind(request.id)
    .fetch_all(pool)
    .await?;

    let mut rule_collections = Vec::with_capacity(collections.len());
    for collection in collections {
        let entries = sqlx::query_as::<_, RuleEntry>(
            "SELECT * FROM firewall_rule_entries WHERE rule_collection_id = $1 ORDER BY id",
        )
        .bind(collection.id)
        .fetch_all(pool)
        .await?;
        rule_collections.push(RuleCollectionDetail {
            collection,
            rule_entries: entries,
        });
    }

    Ok(FirewallRequestDetail {
        request,
        rule_collections,
    })
}

/// The firewall detail attached to a tracking application, if any.
pub async fn detail_for_app(
    pool: &PgPool,
    app_id: i64,
) -> Result<Option<FirewallRequestDetail>, AppError> {
    let request = sqlx::query_as::<_, FirewallRequest>(
        "SELECT * FROM firewall_requests WHERE app_id = $1",
    )
    .bind(app_id)
    .fetch_optional(pool)
    .await?;

    match request {
        Some(request) => Ok(Some(load_detail(pool, request).await?)),
        None => Ok(None),
    }
}

/// List firewall requests: everything for admins and network admins, the
/// caller's own submissions otherwise.
pub async fn list_firewall_requests(
    pool: &PgPool,
    user: &CurrentUser,
) -> Result<Vec<FirewallRequestDetail>, AppError> {
    let include_all = user.is_admin || user.is_network_admin;
    let requester_filter = if include_all {
        None
    } else {
        Some(user.email.as_str())
    };

    let requests = sqlx::query_as::<_, FirewallRequest>(
        r#"
        SELECT r.* FROM firewall_requests r
        JOIN applications a ON r.app_id = a.id
        WHERE ($1::VARCHAR IS NULL OR a.requested_by = $1)
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(requester_filter)
    .fetch_all(pool)
    .await?;

    let mut details = Vec::with_capacity(requests.len());
    for request in requests {
        details.push(load_detail(pool, request).await?);
    }
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    // -- Priority allocation --

    #[test]
    fn first_collection_gets_baseline() {
        assert_eq!(allocate_priority(CollectionType::Application, None, None), 400);
        assert_eq!(allocate_priority(CollectionType::Network, None, None), 6500);
        assert_eq!(allocate_priority(CollectionType::Nat, None, None), 100);
    }

    #[test]
    fn subsequent_collection_increments() {
        assert_eq!(
            allocate_priority(CollectionType::Network, None, Some(6500)),
            6600
        );
        assert_eq!(
            allocate_priority(CollectionType::Application, None, Some(500)),
            600
        );
    }

    #[test]
    fn explicit_priority_wins() {
        assert_eq!(
            allocate_priority(CollectionType::Network, Some(1200), Some(6500)),
            1200
        );
    }

    #[test]
    fn priority_caps_at_65000() {
        assert_eq!(
            allocate_priority(CollectionType::Network, None, Some(65000)),
            65000
        );
        assert_eq!(
            allocate_priority(CollectionType::Network, None, Some(64950)),
            65000
        );
    }

    // -- Scope validation --

    #[test]
    fn scopes_match_source_environments() {
        let environments = vec!["DEVELOPMENT".to_string(), "PRODUCTION".to_string()];
        assert!(validate_scopes_against_source(
            &["DEV".to_string(), "PROD".to_string()],
            &environments
        )
        .is_ok());
    }

    #[test]
    fn unmatched_scope_fails_whole_request() {
        let environments = vec!["DEVELOPMENT".to_string()];
        let err = validate_scopes_against_source(
            &["DEV".to_string(), "PROD".to_string()],
            &environments,
        )
        .unwrap_err();
        assert!(err.to_string().contains("PRODUCTION"));
    }

    #[test]
    fn scope_matching_ignores_environment_case() {
        let environments = vec!["development".to_string()];
        assert!(validate_scopes_against_source(&["DEV".to_string()], &environments).is_ok());
    }

    // -- Document generation --

    fn entry(
        collection_type: CollectionType,
        name: &str,
        overrides: impl FnOnce(&mut RuleEntry),
    ) -> RuleEntry {
        let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let mut entry = RuleEntry {
            id: 1,
            firewall_request_id: 1,
            rule_collection_id: 1,
            collection_type,
            name: name.to_string(),
            ritm_number: None,
            description: None,
            protocols: json!([]),
            source_addresses: json!([]),
            source_ip_groups: json!([]),
            destination_addresses: json!([]),
            destination_ip_addresses: json!([]),
            destination_ip_groups: json!([]),
            destination_fqdns: json!([]),
            destination_ports: json!([]),
            destination_address: None,
            translated_address: None,
            translated_port: None,
            duplicate_key: "key".to_string(),
            created_at: created,
        };
        overrides(&mut entry);
        entry
    }

    fn network_collection() -> RuleCollectionDetail {
        let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        RuleCollectionDetail {
            collection: RuleCollection {
                id: 1,
                firewall_request_id: 1,
                collection_type: CollectionType::Network,
                action: "Allow".to_string(),
                priority: 6500,
                created_at: created,
            },
            rule_entries: vec![entry(CollectionType::Network, "allow-sql", |e| {
                e.protocols = json!(["TCP"]);
                e.source_addresses = json!(["10.0.0.0/24"]);
                e.destination_ip_addresses = json!(["10.1.0.4"]);
                e.destination_ports = json!(["1433"]);
            })],
        }
    }

    #[test]
    fn document_structure_for_network_rules() {
        let doc = render_document("acme-payments", &json!({}), &[network_collection()]);
        let section = &doc["acme-payments"];
        assert_eq!(section["application_name"], "acme-payments");
        let network = &section["rules"]["network_rules"];
        assert_eq!(network["priority"], 6500);
        assert_eq!(network["action"], "Allow");
        assert_eq!(network["rules"][0]["name"], "allow-sql");
        assert_eq!(network["rules"][0]["destination_ports"][0], "1433");
        assert!(section["rules"].get("nat_rules").is_none());
    }

    #[test]
    fn document_is_deterministic() {
        let collections = [network_collection()];
        let a = render_document("acme-payments", &json!({"g": ["10.0.0.0/24"]}), &collections);
        let b = render_document("acme-payments", &json!({"g": ["10.0.0.0/24"]}), &collections);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn document_skips_empty_collections() {
        let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let empty = RuleCollectionDetail {
            collection: RuleCollection {
                id: 2,
                firewall_request_id: 1,
                collection_type: CollectionType::Nat,
                action: "Dnat".to_string(),
                priority: 100,
                created_at: created,
            },
            rule_entries: vec![],
        };
        let doc = render_document("acme-payments", &json!({}), &[empty]);
        assert!(doc["acme-payments"]["rules"]
            .as_object()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nat_rule_document_includes_translation() {
        let created = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        let nat = RuleCollectionDetail {
            collection: RuleCollection {
                id: 3,
                firewall_request_id: 1,
                collection_type: CollectionType::Nat,
                action: "Dnat".to_string(),
                priority: 100,
                created_at: created,
            },
            rule_entries: vec![entry(CollectionType::Nat, "inbound-web", |e| {
                e.protocols = json!(["TCP"]);
                e.source_addresses = json!(["ANY"]);
                e.destination_address = Some("203.0.113.10".to_string());
                e.destination_ports = json!(["443"]);
                e.translated_address = Some("10.0.0.5".to_string());
                e.translated_port = Some(8443);
            })],
        };
        let doc = render_document("edge", &json!({}), &[nat]);
        let rule = &doc["edge"]["rules"]["nat_rules"]["rules"][0];
        assert_eq!(rule["translated_address"], "10.0.0.5");
        assert_eq!(rule["translated_port"], 8443);
        assert_eq!(rule["destination_address"], "203.0.113.10");
    }
}
