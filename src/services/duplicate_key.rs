//! Duplicate-key computation for firewall rule entries.
//!
//! Each rule entry hashes its semantically significant fields into a stable
//! key. Two submissions describing the same traffic produce the same key, so
//! resubmission of an equivalent rule is caught before insert. Volatile
//! fields (description, RITM number) are deliberately excluded.

use sha2::{Digest, Sha256};

use crate::models::firewall::{ApplicationRuleInput, NatRuleInput, NetworkRuleInput};

/// Compute the duplicate key for an application rule.
pub fn application_rule_key(rule: &ApplicationRuleInput) -> String {
    let mut protocols: Vec<(String, u16)> = rule
        .protocols
        .iter()
        .map(|p| (p.protocol_type.clone(), p.port))
        .collect();
    protocols.sort();
    let protocol_tokens = protocols
        .iter()
        .map(|(kind, port)| format!("{kind}:{port}"))
        .collect::<Vec<_>>()
        .join("|");

    let mut destinations: Vec<String> = rule
        .destination_fqdns
        .iter()
        .chain(rule.destination_addresses.iter())
        .cloned()
        .collect();
    destinations.sort();

    hash(&[
        "APPLICATION",
        &rule.name.to_lowercase(),
        &protocol_tokens,
        &sorted_joined(&rule.source_ip_addresses),
        &destinations.join("|"),
        &sorted_joined(&rule.source_ip_groups),
    ])
}

/// Compute the duplicate key for a network rule.
pub fn network_rule_key(rule: &NetworkRuleInput) -> String {
    hash(&[
        "NETWORK",
        &rule.name.to_lowercase(),
        &sorted_joined(&rule.protocols),
        &sorted_joined(&rule.source_ip_addresses),
        &sorted_joined(&rule.source_ip_groups),
        &sorted_joined(&rule.destination_ip_addresses),
        &sorted_joined(&rule.destination_ip_groups),
        &sorted_joined(&rule.destination_ports),
        &sorted_joined(&rule.destination_fqdns),
    ])
}

/// Compute the duplicate key for a NAT rule.
pub fn nat_rule_key(rule: &NatRuleInput) -> String {
    hash(&[
        "NAT",
        &rule.name.to_lowercase(),
        &sorted_joined(&rule.protocols),
        &sorted_joined(&rule.source_ip_addresses),
        &sorted_joined(&rule.source_ip_groups),
        &rule.destination_address.to_lowercase(),
        &sorted_joined(&rule.destination_ports),
        &rule.translated_address.to_lowercase(),
        &rule.translated_port.to_string(),
    ])
}

/// Hash the sorted set of entry keys into a request-level content hash.
pub fn request_hash(duplicate_keys: &[String]) -> Option<String> {
    if duplicate_keys.is_empty() {
        return None;
    }
    let mut sorted = duplicate_keys.to_vec();
    sorted.sort();
    Some(hash(&[&sorted.join("::")]))
}

fn sorted_joined(values: &[String]) -> String {
    let mut sorted = values.to_vec();
    sorted.sort();
    sorted.join("|")
}

/// SHA-256 over the "::"-joined components, hex-encoded.
fn hash(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(components.join("::").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::firewall::ApplicationRuleProtocol;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn network_rule(name: &str, sources: &[&str], ports: &[&str]) -> NetworkRuleInput {
        NetworkRuleInput {
            name: name.to_string(),
            ritm_number: None,
            description: None,
            protocols: strings(&["TCP"]),
            source_ip_addresses: strings(sources),
            source_ip_groups: vec![],
            destination_ip_addresses: strings(&["10.1.0.4"]),
            destination_ip_groups: vec![],
            destination_ports: strings(ports),
            destination_fqdns: vec![],
        }
    }

    #[test]
    fn same_rule_same_key() {
        let a = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        let b = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        assert_eq!(network_rule_key(&a), network_rule_key(&b));
    }

    #[test]
    fn name_comparison_is_case_insensitive() {
        let a = network_rule("Allow-SQL", &["10.0.0.0/24"], &["1433"]);
        let b = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        assert_eq!(network_rule_key(&a), network_rule_key(&b));
    }

    #[test]
    fn source_order_does_not_matter() {
        let a = network_rule("allow-sql", &["10.0.0.0/24", "10.2.0.0/24"], &["1433"]);
        let b = network_rule("allow-sql", &["10.2.0.0/24", "10.0.0.0/24"], &["1433"]);
        assert_eq!(network_rule_key(&a), network_rule_key(&b));
    }

    #[test]
    fn different_ports_different_key() {
        let a = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        let b = network_rule("allow-sql", &["10.0.0.0/24"], &["1434"]);
        assert_ne!(network_rule_key(&a), network_rule_key(&b));
    }

    #[test]
    fn application_key_sorts_protocols() {
        let base = ApplicationRuleInput {
            name: "web".to_string(),
            ritm_number: None,
            description: None,
            protocols: vec![
                ApplicationRuleProtocol {
                    port: 443,
                    protocol_type: "Https".to_string(),
                },
                ApplicationRuleProtocol {
                    port: 80,
                    protocol_type: "Http".to_string(),
                },
            ],
            source_ip_addresses: strings(&["10.0.0.0/24"]),
            source_ip_groups: vec![],
            destination_fqdns: strings(&["api.example.com"]),
            destination_addresses: vec![],
        };
        let mut swapped = base.clone();
        swapped.protocols.reverse();
        assert_eq!(application_rule_key(&base), application_rule_key(&swapped));
    }

    #[test]
    fn description_does_not_affect_key() {
        let mut a = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        let mut b = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        a.description = Some("first submission".to_string());
        b.description = Some("second submission".to_string());
        a.ritm_number = Some("RITM001".to_string());
        b.ritm_number = Some("RITM999".to_string());
        assert_eq!(network_rule_key(&a), network_rule_key(&b));
    }

    #[test]
    fn nat_key_covers_translation() {
        let base = NatRuleInput {
            name: "inbound-web".to_string(),
            ritm_number: None,
            description: None,
            protocols: strings(&["TCP"]),
            source_ip_addresses: strings(&["ANY"]),
            source_ip_groups: vec![],
            destination_address: "203.0.113.10".to_string(),
            destination_ports: strings(&["443"]),
            translated_address: "10.0.0.5".to_string(),
            translated_port: 8443,
        };
        let mut other_translation = base.clone();
        other_translation.translated_port = 9443;
        assert_ne!(nat_rule_key(&base), nat_rule_key(&other_translation));
    }

    #[test]
    fn request_hash_is_order_insensitive() {
        let keys_a = strings(&["k1", "k2", "k3"]);
        let keys_b = strings(&["k3", "k1", "k2"]);
        assert_eq!(request_hash(&keys_a), request_hash(&keys_b));
        assert!(request_hash(&[]).is_none());
    }

    #[test]
    fn key_is_hex_sha256() {
        let rule = network_rule("allow-sql", &["10.0.0.0/24"], &["1433"]);
        let key = network_rule_key(&rule);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
