//! Firewall request models: the detail record, rule collections, and rule entries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "collection_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionType {
    Application,
    Network,
    Nat,
}

impl CollectionType {
    /// Key used for this collection in the generated rule-collection document.
    pub fn document_key(&self) -> &'static str {
        match self {
            Self::Application => "application_rules",
            Self::Network => "network_rules",
            Self::Nat => "nat_rules",
        }
    }

    /// Default priority when no prior collection exists for a source application.
    pub fn baseline_priority(&self) -> i32 {
        match self {
            Self::Application => 400,
            Self::Network => 6500,
            Self::Nat => 100,
        }
    }
}

// -- Database rows --

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FirewallRequest {
    pub id: i64,
    pub app_id: i64,
    pub source_application_id: i64,
    pub collection_name: String,
    pub ip_groups: serde_json::Value,
    pub environment_scopes: serde_json::Value,
    pub destination_service: String,
    pub justification: String,
    pub requested_effective_date: Option<NaiveDate>,
    pub expires_at: Option<NaiveDate>,
    pub change_request_url: Option<String>,
    pub duplicate_of_request_id: Option<i64>,
    pub duplicate_hash: Option<String>,
    pub collection_document: Option<serde_json::Value>,
    pub application_name_at_submission: String,
    pub organization_at_submission: Option<String>,
    pub lob_at_submission: Option<String>,
    pub requester_email_at_submission: String,
    pub network_admin_approver: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RuleCollection {
    pub id: i64,
    pub firewall_request_id: i64,
    pub collection_type: CollectionType,
    pub action: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RuleEntry {
    pub id: i64,
    pub firewall_request_id: i64,
    pub rule_collection_id: i64,
    pub collection_type: CollectionType,
    pub name: String,
    pub ritm_number: Option<String>,
    pub description: Option<String>,
    pub protocols: serde_json::Value,
    pub source_addresses: serde_json::Value,
    pub source_ip_groups: serde_json::Value,
    pub destination_addresses: serde_json::Value,
    pub destination_ip_addresses: serde_json::Value,
    pub destination_ip_groups: serde_json::Value,
    pub destination_fqdns: serde_json::Value,
    pub destination_ports: serde_json::Value,
    pub destination_address: Option<String>,
    pub translated_address: Option<String>,
    pub translated_port: Option<i32>,
    pub duplicate_key: String,
    pub created_at: DateTime<Utc>,
}

// -- Input DTOs --

/// Reference to the onboarded source application: numeric id, app code, or slug.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceApplicationRef {
    Id(i64),
    Key(String),
}

/// Protocol definition for an application rule (e.g. Https on 443).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRuleProtocol {
    pub port: u16,
    #[serde(rename = "type")]
    pub protocol_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRuleInput {
    pub name: String,
    pub ritm_number: Option<String>,
    pub description: Option<String>,
    pub protocols: Vec<ApplicationRuleProtocol>,
    pub source_ip_addresses: Vec<String>,
    #[serde(default)]
    pub source_ip_groups: Vec<String>,
    #[serde(default)]
    pub destination_fqdns: Vec<String>,
    #[serde(default)]
    pub destination_addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRuleInput {
    pub name: String,
    pub ritm_number: Option<String>,
    pub description: Option<String>,
    pub protocols: Vec<String>,
    pub source_ip_addresses: Vec<String>,
    #[serde(default)]
    pub source_ip_groups: Vec<String>,
    pub destination_ip_addresses: Vec<String>,
    #[serde(default)]
    pub destination_ip_groups: Vec<String>,
    pub destination_ports: Vec<String>,
    #[serde(default)]
    pub destination_fqdns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatRuleInput {
    pub name: String,
    pub ritm_number: Option<String>,
    pub description: Option<String>,
    pub protocols: Vec<String>,
    pub source_ip_addresses: Vec<String>,
    #[serde(default)]
    pub source_ip_groups: Vec<String>,
    pub destination_address: String,
    pub destination_ports: Vec<String>,
    pub translated_address: String,
    pub translated_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRuleGroupInput {
    pub action: String,
    pub priority: Option<i32>,
    pub rules: Vec<ApplicationRuleInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkRuleGroupInput {
    pub action: String,
    pub priority: Option<i32>,
    pub rules: Vec<NetworkRuleInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NatRuleGroupInput {
    pub action: String,
    pub priority: Option<i32>,
    pub rules: Vec<NatRuleInput>,
}

/// Payload for creating a firewall request with structured rule collections.
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallRequestInput {
    pub source_application_id: SourceApplicationRef,
    pub collection_name: String,
    #[serde(default)]
    pub ip_groups: BTreeMap<String, Vec<String>>,
    pub environment_scopes: Vec<String>,
    pub destination_service: String,
    pub justification: String,
    pub requested_effective_date: Option<NaiveDate>,
    pub expires_at: Option<NaiveDate>,
    pub change_request_url: Option<String>,
    pub application_rules: Option<ApplicationRuleGroupInput>,
    pub network_rules: Option<NetworkRuleGroupInput>,
    pub nat_rules: Option<NatRuleGroupInput>,
}

// -- Response DTOs --

/// Firewall request detail with its collections and entries nested.
#[derive(Debug, Clone, Serialize)]
pub struct FirewallRequestDetail {
    #[serde(flatten)]
    pub request: FirewallRequest,
    pub rule_collections: Vec<RuleCollectionDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleCollectionDetail {
    #[serde(flatten)]
    pub collection: RuleCollection,
    pub rule_entries: Vec<RuleEntry>,
}

/// One conflicting entry reported by duplicate detection.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRuleConflict {
    pub rule_name: String,
    pub collection_type: CollectionType,
    pub duplicate_key: String,
    pub existing_request_id: i64,
    pub existing_app_id: i64,
    pub existing_app_code: String,
    pub existing_app_status: crate::models::request::RequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_type_serialization() {
        let ct = CollectionType::Nat;
        let json = serde_json::to_string(&ct).unwrap();
        assert_eq!(json, "\"NAT\"");
    }

    #[test]
    fn document_keys() {
        assert_eq!(CollectionType::Application.document_key(), "application_rules");
        assert_eq!(CollectionType::Network.document_key(), "network_rules");
        assert_eq!(CollectionType::Nat.document_key(), "nat_rules");
    }

    #[test]
    fn baseline_priorities() {
        assert_eq!(CollectionType::Application.baseline_priority(), 400);
        assert_eq!(CollectionType::Network.baseline_priority(), 6500);
        assert_eq!(CollectionType::Nat.baseline_priority(), 100);
    }

    #[test]
    fn source_application_ref_accepts_id_or_key() {
        let by_id: SourceApplicationRef = serde_json::from_str("42").unwrap();
        assert!(matches!(by_id, SourceApplicationRef::Id(42)));

        let by_code: SourceApplicationRef = serde_json::from_str("\"APP-00001\"").unwrap();
        assert!(matches!(by_code, SourceApplicationRef::Key(ref k) if k == "APP-00001"));
    }

    #[test]
    fn firewall_input_deserializes_minimal_network_payload() {
        let json = r#"{
            "source_application_id": 1,
            "collection_name": "acme-payments",
            "environment_scopes": ["DEV"],
            "destination_service": "Azure SQL",
            "justification": "Database connectivity for payments",
            "network_rules": {
                "action": "Allow",
                "rules": [{
                    "name": "allow-sql",
                    "protocols": ["TCP"],
                    "source_ip_addresses": ["10.0.0.0/24"],
                    "destination_ip_addresses": ["10.1.0.4"],
                    "destination_ports": ["1433"]
                }]
            }
        }"#;
        let input: FirewallRequestInput = serde_json::from_str(json).unwrap();
        assert!(input.application_rules.is_none());
        assert!(input.nat_rules.is_none());
        let network = input.network_rules.expect("network rules");
        assert_eq!(network.rules.len(), 1);
        assert!(network.priority.is_none());
    }

    #[test]
    fn application_protocol_renames_type_field() {
        let json = r#"{"port": 443, "type": "Https"}"#;
        let proto: ApplicationRuleProtocol = serde_json::from_str(json).unwrap();
        assert_eq!(proto.protocol_type, "Https");
        let back = serde_json::to_value(&proto).unwrap();
        assert_eq!(back["type"], "Https");
    }
}
