//! Validation and normalization for the firewall rule grammar.
//!
//! Everything here is pure: inputs are normalized in place before any
//! persistence happens, so a request that reaches the database has already
//! passed every structural check.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::AppError;
use crate::models::firewall::{
    ApplicationRuleGroupInput, ApplicationRuleProtocol, FirewallRequestInput, NatRuleGroupInput,
    NetworkRuleGroupInput,
};

pub const APPLICATION_RULE_PROTOCOLS: [&str; 3] = ["HTTP", "HTTPS", "MSSQL"];
pub const NETWORK_RULE_PROTOCOLS: [&str; 4] = ["ANY", "TCP", "UDP", "ICMP"];
pub const NAT_RULE_PROTOCOLS: [&str; 3] = ["ANY", "TCP", "UDP"];
pub const ENVIRONMENT_SCOPE_OPTIONS: [&str; 7] =
    ["DEV", "TEST", "QA", "STAGE", "UAT", "PROD", "DR"];

fn hostname_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)(?:\.(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?))*\.?$",
        )
        .unwrap()
    })
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,80}$").unwrap())
}

/// Map an abbreviated environment scope code to the full environment name.
pub fn scope_full_name(code: &str) -> &str {
    match code {
        "DEV" => "DEVELOPMENT",
        "TEST" => "TESTING",
        "STAGE" => "STAGING",
        "PROD" => "PRODUCTION",
        // QA, UAT, and DR use the code as the full name.
        other => other,
    }
}

/// Normalize a single address token: wildcard, CIDR network, IP, or FQDN.
///
/// Wildcards collapse to the canonical `ANY`; IPs and CIDR blocks pass
/// through untouched; FQDNs are validated against the hostname grammar and
/// lower-cased.
pub fn normalize_endpoint(value: &str) -> Result<String, AppError> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return Err(AppError::Validation("Value cannot be empty".to_string()));
    }

    if matches!(cleaned, "*" | "any" | "ANY") {
        return Ok("ANY".to_string());
    }

    if cleaned.parse::<IpAddr>().is_ok() {
        return Ok(cleaned.to_string());
    }

    if let Some((addr, prefix)) = cleaned.split_once('/') {
        let parsed: Result<IpAddr, _> = addr.parse();
        let prefix_len: Result<u8, _> = prefix.parse();
        if let (Ok(ip), Ok(len)) = (parsed, prefix_len) {
            let max = match ip {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            if len <= max {
                return Ok(cleaned.to_string());
            }
        }
        return Err(AppError::Validation(format!(
            "'{value}' must be an IP address, CIDR block, wildcard, or FQDN"
        )));
    }

    if cleaned.len() > 253 || !hostname_regex().is_match(cleaned) {
        return Err(AppError::Validation(format!(
            "'{value}' must be an IP address, CIDR block, wildcard, or FQDN"
        )));
    }
    Ok(cleaned.to_lowercase())
}

/// Normalize a list of comma-separated port tokens into a deduplicated,
/// lexically sorted set of ports and ranges.
///
/// Single-value ranges collapse to plain ports. The sort is over strings,
/// so "100" orders before "99" — downstream tooling depends on this.
pub fn normalize_ports(values: &[String]) -> Result<Vec<String>, AppError> {
    let mut normalized: BTreeSet<String> = BTreeSet::new();
    for value in values {
        for token in value.split(',') {
            let candidate = token.trim();
            if candidate.is_empty() {
                continue;
            }

            if let Some((start_str, end_str)) = candidate.split_once('-') {
                let start: u32 = start_str.trim().parse().map_err(|_| {
                    AppError::Validation(format!("Port range '{candidate}' is not valid"))
                })?;
                let end: u32 = end_str.trim().parse().map_err(|_| {
                    AppError::Validation(format!("Port range '{candidate}' is not valid"))
                })?;
                if !(1..=65535).contains(&start) || !(1..=65535).contains(&end) {
                    return Err(AppError::Validation(format!(
                        "Port range '{candidate}' must be within 1-65535"
                    )));
                }
                if start > end {
                    return Err(AppError::Validation(format!(
                        "Port range '{candidate}' start must be less than or equal to end"
                    )));
                }
                if start == end {
                    normalized.insert(start.to_string());
                } else {
                    normalized.insert(format!("{start}-{end}"));
                }
            } else {
                let port: u32 = candidate.parse().map_err(|_| {
                    AppError::Validation(format!("Port '{candidate}' is not a valid number"))
                })?;
                if !(1..=65535).contains(&port) {
                    return Err(AppError::Validation(format!(
                        "Port '{candidate}' must be between 1 and 65535"
                    )));
                }
                normalized.insert(port.to_string());
            }
        }
    }
    if normalized.is_empty() {
        return Err(AppError::Validation(
            "At least one port value is required".to_string(),
        ));
    }
    Ok(normalized.into_iter().collect())
}

/// Validate a collection/rule/IP-group name against the conservative charset.
pub fn validate_name(value: &str, field_name: &str) -> Result<String, AppError> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return Err(AppError::Validation(format!("{field_name} cannot be empty")));
    }
    if !name_regex().is_match(cleaned) {
        return Err(AppError::Validation(format!(
            "{field_name} must be 1-80 characters and contain only letters, numbers, underscores, or hyphens"
        )));
    }
    Ok(cleaned.to_string())
}

/// Normalize an address list, removing duplicates while preserving order.
pub fn normalize_address_list(
    values: &[String],
    allow_empty: bool,
) -> Result<Vec<String>, AppError> {
    let mut normalized = Vec::new();
    for value in values {
        let endpoint = normalize_endpoint(value)?;
        if !normalized.contains(&endpoint) {
            normalized.push(endpoint);
        }
    }
    if normalized.is_empty() && !allow_empty {
        return Err(AppError::Validation(
            "At least one address value is required".to_string(),
        ));
    }
    Ok(normalized)
}

/// Validate a list of IP-group names, deduplicating while preserving order.
pub fn normalize_group_names(values: &[String]) -> Result<Vec<String>, AppError> {
    let mut names = Vec::new();
    for value in values {
        let name = validate_name(value, "IP group")?;
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Explicit priorities must sit on the Azure-style 100..=65000 grid.
pub fn validate_priority(value: Option<i32>) -> Result<Option<i32>, AppError> {
    let Some(priority) = value else {
        return Ok(None);
    };
    if !(100..=65000).contains(&priority) {
        return Err(AppError::Validation(
            "Priority must be between 100 and 65000".to_string(),
        ));
    }
    if priority % 100 != 0 {
        return Err(AppError::Validation(
            "Priority must be in increments of 100".to_string(),
        ));
    }
    Ok(Some(priority))
}

/// Validate an Allow/Deny group action, returning the stored capitalization.
fn validate_action(value: &str, rule_kind: &str) -> Result<String, AppError> {
    match value.trim().to_uppercase().as_str() {
        "ALLOW" => Ok("Allow".to_string()),
        "DENY" => Ok("Deny".to_string()),
        _ => Err(AppError::Validation(format!(
            "{rule_kind} rule action must be Allow or Deny"
        ))),
    }
}

fn validate_nat_action(value: &str) -> Result<String, AppError> {
    if value.trim().to_uppercase() == "DNAT" {
        Ok("Dnat".to_string())
    } else {
        Err(AppError::Validation(
            "NAT rule action must be Dnat".to_string(),
        ))
    }
}

fn normalize_protocol_set(
    values: &[String],
    allowed: &[&str],
    rule_kind: &str,
) -> Result<Vec<String>, AppError> {
    let mut cleaned = Vec::new();
    for value in values {
        let candidate = value.trim().to_uppercase();
        if !allowed.contains(&candidate.as_str()) {
            let mut options: Vec<&str> = allowed.to_vec();
            options.sort_unstable();
            return Err(AppError::Validation(format!(
                "{rule_kind} rule protocol must be one of: {}",
                options.join(", ")
            )));
        }
        if !cleaned.contains(&candidate) {
            cleaned.push(candidate);
        }
    }
    if cleaned.is_empty() {
        return Err(AppError::Validation(format!(
            "At least one {} rule protocol is required",
            rule_kind.to_lowercase()
        )));
    }
    Ok(cleaned)
}

/// Validate an application rule protocol, returning Azure's expected casing
/// (e.g. `Https`).
pub fn normalize_app_protocol(
    protocol: &ApplicationRuleProtocol,
) -> Result<ApplicationRuleProtocol, AppError> {
    let candidate = protocol.protocol_type.trim().to_uppercase();
    if !APPLICATION_RULE_PROTOCOLS.contains(&candidate.as_str()) {
        let mut options = APPLICATION_RULE_PROTOCOLS.to_vec();
        options.sort_unstable();
        return Err(AppError::Validation(format!(
            "Application rule protocol must be one of: {}",
            options.join(", ")
        )));
    }
    if protocol.port == 0 {
        return Err(AppError::Validation(
            "Protocol port must be between 1 and 65535".to_string(),
        ));
    }
    let mut chars = candidate.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
        None => candidate,
    };
    Ok(ApplicationRuleProtocol {
        port: protocol.port,
        protocol_type: capitalized,
    })
}

fn validate_url(value: &Option<String>) -> Result<Option<String>, AppError> {
    let Some(raw) = value else { return Ok(None) };
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }
    let rest = cleaned
        .strip_prefix("http://")
        .or_else(|| cleaned.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(Some(cleaned.to_string())),
        _ => Err(AppError::Validation(
            "Change request URL must be a valid http(s) URL".to_string(),
        )),
    }
}

fn validate_scopes(scopes: &[String]) -> Result<Vec<String>, AppError> {
    let mut normalized: BTreeSet<String> = BTreeSet::new();
    for scope in scopes {
        let candidate = scope.trim().to_uppercase();
        if candidate.is_empty() {
            continue;
        }
        if !ENVIRONMENT_SCOPE_OPTIONS.contains(&candidate.as_str()) {
            return Err(AppError::Validation(format!(
                "Invalid environment scope(s): {candidate}"
            )));
        }
        normalized.insert(candidate);
    }
    if normalized.is_empty() {
        return Err(AppError::Validation(
            "At least one environment scope is required".to_string(),
        ));
    }
    Ok(normalized.into_iter().collect())
}

fn validate_rule_name_fields(
    name: &mut String,
    ritm_number: &mut Option<String>,
    description: &mut Option<String>,
) -> Result<(), AppError> {
    *name = validate_name(name, "Rule name")?;
    *ritm_number = ritm_number
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    *description = description
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            if v.len() > 500 {
                Err(AppError::Validation(
                    "Description must be at most 500 characters".to_string(),
                ))
            } else {
                Ok(v.to_string())
            }
        })
        .transpose()?;
    Ok(())
}

fn validate_application_group(group: &mut ApplicationRuleGroupInput) -> Result<(), AppError> {
    group.action = validate_action(&group.action, "Application")?;
    group.priority = validate_priority(group.priority)?;
    if group.rules.is_empty() {
        return Err(AppError::Validation(
            "At least one application rule is required".to_string(),
        ));
    }
    for rule in &mut group.rules {
        validate_rule_name_fields(&mut rule.name, &mut rule.ritm_number, &mut rule.description)?;
        if rule.protocols.is_empty() {
            return Err(AppError::Validation(
                "At least one application rule protocol is required".to_string(),
            ));
        }
        rule.protocols = rule
            .protocols
            .iter()
            .map(normalize_app_protocol)
            .collect::<Result<Vec<_>, _>>()?;
        rule.source_ip_addresses = normalize_address_list(&rule.source_ip_addresses, false)?;
        rule.source_ip_groups = normalize_group_names(&rule.source_ip_groups)?;
        rule.destination_fqdns = normalize_address_list(&rule.destination_fqdns, true)?;
        rule.destination_addresses = normalize_address_list(&rule.destination_addresses, true)?;
    }
    Ok(())
}

fn validate_network_group(group: &mut NetworkRuleGroupInput) -> Result<(), AppError> {
    group.action = validate_action(&group.action, "Network")?;
    group.priority = validate_priority(group.priority)?;
    if group.rules.is_empty() {
        return Err(AppError::Validation(
            "At least one network rule is required".to_string(),
        ));
    }
    for rule in &mut group.rules {
        validate_rule_name_fields(&mut rule.name, &mut rule.ritm_number, &mut rule.description)?;
        rule.protocols = normalize_protocol_set(&rule.protocols, &NETWORK_RULE_PROTOCOLS, "Network")?;
        rule.source_ip_addresses = normalize_address_list(&rule.source_ip_addresses, false)?;
        rule.source_ip_groups = normalize_group_names(&rule.source_ip_groups)?;
        rule.destination_ip_addresses =
            normalize_address_list(&rule.destination_ip_addresses, false)?;
        rule.destination_ip_groups = normalize_group_names(&rule.destination_ip_groups)?;
        rule.destination_ports = normalize_ports(&rule.destination_ports)?;
        rule.destination_fqdns = normalize_address_list(&rule.destination_fqdns, true)?;
    }
    Ok(())
}

fn validate_nat_group(group: &mut NatRuleGroupInput) -> Result<(), AppError> {
    group.action = validate_nat_action(&group.action)?;
    group.priority = validate_priority(group.priority)?;
    if group.rules.is_empty() {
        return Err(AppError::Validation(
            "At least one NAT rule is required".to_string(),
        ));
    }
    for rule in &mut group.rules {
        validate_rule_name_fields(&mut rule.name, &mut rule.ritm_number, &mut rule.description)?;
        rule.protocols = normalize_protocol_set(&rule.protocols, &NAT_RULE_PROTOCOLS, "NAT")?;
        rule.source_ip_addresses = normalize_address_list(&rule.source_ip_addresses, false)?;
        rule.source_ip_groups = normalize_group_names(&rule.source_ip_groups)?;
        rule.destination_address = normalize_endpoint(&rule.destination_address)?;
        rule.destination_ports = normalize_ports(&rule.destination_ports)?;
        rule.translated_address = normalize_endpoint(&rule.translated_address)?;
        if rule.translated_port == 0 {
            return Err(AppError::Validation(
                "Translated port must be between 1 and 65535".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validate and normalize a full firewall request payload in place.
pub fn validate_firewall_input(input: &mut FirewallRequestInput) -> Result<(), AppError> {
    input.collection_name = validate_name(&input.collection_name, "Collection name")?;

    let groups = std::mem::take(&mut input.ip_groups);
    for (group_name, members) in groups {
        let cleaned_name = validate_name(&group_name, "IP group name")?;
        let cleaned_members: Vec<String> = {
            let mut seen = Vec::new();
            for member in members {
                let candidate = member.trim().to_string();
                if !candidate.is_empty() && !seen.contains(&candidate) {
                    seen.push(candidate);
                }
            }
            seen
        };
        input.ip_groups.insert(cleaned_name, cleaned_members);
    }

    input.environment_scopes = validate_scopes(&input.environment_scopes)?;

    input.destination_service = {
        let cleaned = input.destination_service.trim();
        if cleaned.len() < 2 || cleaned.len() > 200 {
            return Err(AppError::Validation(
                "Destination service must be 2-200 characters".to_string(),
            ));
        }
        cleaned.to_string()
    };

    input.justification = {
        let cleaned = input.justification.trim();
        if cleaned.len() < 10 {
            return Err(AppError::Validation(
                "Justification must be at least 10 characters long".to_string(),
            ));
        }
        cleaned.to_string()
    };

    if let (Some(effective), Some(expires)) = (input.requested_effective_date, input.expires_at) {
        if expires < effective {
            return Err(AppError::Validation(
                "Expiry date cannot be earlier than the effective date".to_string(),
            ));
        }
    }

    input.change_request_url = validate_url(&input.change_request_url)?;

    if let Some(group) = &mut input.application_rules {
        validate_application_group(group)?;
    }
    if let Some(group) = &mut input.network_rules {
        validate_network_group(group)?;
    }
    if let Some(group) = &mut input.nat_rules {
        validate_nat_group(group)?;
    }

    if input.application_rules.is_none()
        && input.network_rules.is_none()
        && input.nat_rules.is_none()
    {
        return Err(AppError::Validation(
            "At least one rule group (application, network, or NAT) is required".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    // -- Endpoint normalization --

    #[test]
    fn endpoint_wildcards_collapse_to_any() {
        assert_eq!(normalize_endpoint("*").unwrap(), "ANY");
        assert_eq!(normalize_endpoint("any").unwrap(), "ANY");
        assert_eq!(normalize_endpoint("ANY").unwrap(), "ANY");
    }

    #[test]
    fn endpoint_ip_passes_through() {
        assert_eq!(normalize_endpoint("10.0.0.1").unwrap(), "10.0.0.1");
        assert_eq!(normalize_endpoint("::1").unwrap(), "::1");
    }

    #[test]
    fn endpoint_cidr_passes_through() {
        assert_eq!(normalize_endpoint("10.0.0.0/24").unwrap(), "10.0.0.0/24");
        assert_eq!(normalize_endpoint("2001:db8::/32").unwrap(), "2001:db8::/32");
    }

    #[test]
    fn endpoint_cidr_prefix_out_of_range() {
        assert!(normalize_endpoint("10.0.0.0/33").is_err());
    }

    #[test]
    fn endpoint_fqdn_lowercased() {
        assert_eq!(
            normalize_endpoint("Api.Example.COM").unwrap(),
            "api.example.com"
        );
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(normalize_endpoint("not a host").is_err());
        assert!(normalize_endpoint("-leading.example.com").is_err());
        assert!(normalize_endpoint("").is_err());
    }

    // -- Port normalization --

    #[test]
    fn ports_normalize_per_contract() {
        let result =
            normalize_ports(&strings(&["443", "80-80", "22,23"])).unwrap();
        assert_eq!(result, vec!["22", "23", "443", "80"]);
    }

    #[test]
    fn ports_sort_is_lexical() {
        let result = normalize_ports(&strings(&["99", "100"])).unwrap();
        assert_eq!(result, vec!["100", "99"]);
    }

    #[test]
    fn ports_keep_real_ranges() {
        let result = normalize_ports(&strings(&["8000-8080"])).unwrap();
        assert_eq!(result, vec!["8000-8080"]);
    }

    #[test]
    fn ports_reject_inverted_range() {
        assert!(normalize_ports(&strings(&["90-80"])).is_err());
    }

    #[test]
    fn ports_reject_out_of_bounds() {
        assert!(normalize_ports(&strings(&["0"])).is_err());
        assert!(normalize_ports(&strings(&["65536"])).is_err());
        assert!(normalize_ports(&strings(&["70000-70001"])).is_err());
    }

    #[test]
    fn ports_reject_empty_set() {
        assert!(normalize_ports(&strings(&[" , "])).is_err());
        assert!(normalize_ports(&[]).is_err());
    }

    // -- Names and priorities --

    #[test]
    fn name_charset_enforced() {
        assert_eq!(validate_name("acme_rule-1", "Rule name").unwrap(), "acme_rule-1");
        assert!(validate_name("bad name", "Rule name").is_err());
        assert!(validate_name("", "Rule name").is_err());
        assert!(validate_name(&"x".repeat(81), "Rule name").is_err());
    }

    #[test]
    fn priority_grid() {
        assert_eq!(validate_priority(None).unwrap(), None);
        assert_eq!(validate_priority(Some(400)).unwrap(), Some(400));
        assert!(validate_priority(Some(50)).is_err());
        assert!(validate_priority(Some(65100)).is_err());
        assert!(validate_priority(Some(450)).is_err());
    }

    // -- Protocols and actions --

    #[test]
    fn app_protocol_capitalization() {
        let proto = normalize_app_protocol(&ApplicationRuleProtocol {
            port: 443,
            protocol_type: "https".to_string(),
        })
        .unwrap();
        assert_eq!(proto.protocol_type, "Https");
    }

    #[test]
    fn app_protocol_rejects_unknown() {
        assert!(normalize_app_protocol(&ApplicationRuleProtocol {
            port: 22,
            protocol_type: "SSH".to_string(),
        })
        .is_err());
    }

    #[test]
    fn network_protocols_restricted() {
        assert!(normalize_protocol_set(&strings(&["tcp", "ICMP"]), &NETWORK_RULE_PROTOCOLS, "Network").is_ok());
        assert!(normalize_protocol_set(&strings(&["ESP"]), &NETWORK_RULE_PROTOCOLS, "Network").is_err());
    }

    #[test]
    fn nat_protocols_exclude_icmp() {
        assert!(normalize_protocol_set(&strings(&["ICMP"]), &NAT_RULE_PROTOCOLS, "NAT").is_err());
    }

    #[test]
    fn actions_capitalized() {
        assert_eq!(validate_action("ALLOW", "Network").unwrap(), "Allow");
        assert_eq!(validate_action("deny", "Network").unwrap(), "Deny");
        assert!(validate_action("Drop", "Network").is_err());
        assert_eq!(validate_nat_action("dnat").unwrap(), "Dnat");
        assert!(validate_nat_action("Allow").is_err());
    }

    // -- Scopes and URLs --

    #[test]
    fn scopes_uppercased_sorted_deduped() {
        let result = validate_scopes(&strings(&["prod", "dev", "PROD"])).unwrap();
        assert_eq!(result, vec!["DEV", "PROD"]);
    }

    #[test]
    fn scopes_reject_unknown() {
        assert!(validate_scopes(&strings(&["SANDBOX"])).is_err());
        assert!(validate_scopes(&[]).is_err());
    }

    #[test]
    fn scope_code_mapping() {
        assert_eq!(scope_full_name("DEV"), "DEVELOPMENT");
        assert_eq!(scope_full_name("TEST"), "TESTING");
        assert_eq!(scope_full_name("STAGE"), "STAGING");
        assert_eq!(scope_full_name("PROD"), "PRODUCTION");
        assert_eq!(scope_full_name("QA"), "QA");
        assert_eq!(scope_full_name("UAT"), "UAT");
        assert_eq!(scope_full_name("DR"), "DR");
    }

    #[test]
    fn url_validation() {
        assert_eq!(
            validate_url(&Some("https://github.com/org/repo/pull/1".to_string())).unwrap(),
            Some("https://github.com/org/repo/pull/1".to_string())
        );
        assert_eq!(validate_url(&Some("  ".to_string())).unwrap(), None);
        assert_eq!(validate_url(&None).unwrap(), None);
        assert!(validate_url(&Some("ftp://example.com".to_string())).is_err());
        assert!(validate_url(&Some("https://".to_string())).is_err());
    }

    // -- Full payload --

    fn network_payload() -> FirewallRequestInput {
        serde_json::from_value(serde_json::json!({
            "source_application_id": 1,
            "collection_name": "acme-payments",
            "ip_groups": {"app-subnets": ["10.0.1.0/24", "10.0.1.0/24", " "]},
            "environment_scopes": ["dev"],
            "destination_service": "Azure SQL",
            "justification": "Database connectivity for payments",
            "network_rules": {
                "action": "allow",
                "rules": [{
                    "name": "allow-sql",
                    "protocols": ["tcp"],
                    "source_ip_addresses": ["10.0.0.0/24"],
                    "destination_ip_addresses": ["10.1.0.4"],
                    "destination_ports": ["1433"]
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn full_payload_normalizes() {
        let mut input = network_payload();
        validate_firewall_input(&mut input).unwrap();
        let network = input.network_rules.as_ref().unwrap();
        assert_eq!(network.action, "Allow");
        assert_eq!(network.rules[0].protocols, vec!["TCP"]);
        assert_eq!(input.environment_scopes, vec!["DEV"]);
        assert_eq!(
            input.ip_groups.get("app-subnets").unwrap(),
            &vec!["10.0.1.0/24".to_string()]
        );
    }

    #[test]
    fn payload_requires_a_rule_group() {
        let mut input = network_payload();
        input.network_rules = None;
        assert!(matches!(
            validate_firewall_input(&mut input),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn payload_requires_long_justification() {
        let mut input = network_payload();
        input.justification = "too short".to_string();
        assert!(validate_firewall_input(&mut input).is_err());
    }

    #[test]
    fn payload_rejects_expiry_before_effective() {
        let mut input = network_payload();
        input.requested_effective_date =
            Some(chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        input.expires_at = Some(chrono::NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
        assert!(validate_firewall_input(&mut input).is_err());
    }
}
