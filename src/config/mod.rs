use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    /// Emails allowed to approve requests and manage reference data.
    pub admin_emails: Vec<String>,
    /// Emails allowed to review firewall requests across all users.
    pub network_admin_emails: Vec<String>,
    pub expedite_threshold_days: i64,
    pub auto_escalate_days: i64,
    pub business_days_only: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("BACKEND_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            admin_emails: parse_email_list(
                &env::var("ADMIN_EMAILS").unwrap_or_else(|_| "admin@runway.local".to_string()),
            ),
            network_admin_emails: parse_email_list(
                &env::var("NETWORK_ADMIN_EMAILS").unwrap_or_default(),
            ),
            expedite_threshold_days: env::var("EXPEDITE_THRESHOLD_DAYS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            auto_escalate_days: env::var("AUTO_ESCALATE_DAYS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            business_days_only: env::var("BUSINESS_DAYS_ONLY")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(true),
        })
    }

    /// Case-insensitive membership check against the admin allowlist.
    pub fn is_admin(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }

    /// Case-insensitive membership check against the network-admin allowlist.
    pub fn is_network_admin(&self, email: &str) -> bool {
        self.network_admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }
}

/// Parse an allowlist given either as a JSON array or a comma-separated string.
fn parse_email_list(raw: &str) -> Vec<String> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Vec::new();
    }
    if candidate.starts_with('[') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(candidate) {
            return items
                .into_iter()
                .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    candidate
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_admins(admins: &[&str], network_admins: &[&str]) -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/runway".to_string(),
            database_max_connections: 5,
            host: "0.0.0.0".to_string(),
            port: 3000,
            admin_emails: admins.iter().map(|s| s.to_string()).collect(),
            network_admin_emails: network_admins.iter().map(|s| s.to_string()).collect(),
            expedite_threshold_days: 2,
            auto_escalate_days: 5,
            business_days_only: true,
        }
    }

    #[test]
    fn parse_email_list_comma_separated() {
        let emails = parse_email_list("a@x.com, b@x.com ,c@x.com");
        assert_eq!(emails, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn parse_email_list_json_array() {
        let emails = parse_email_list(r#"["a@x.com", "b@x.com"]"#);
        assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn parse_email_list_empty() {
        assert!(parse_email_list("").is_empty());
        assert!(parse_email_list("  ").is_empty());
    }

    #[test]
    fn admin_check_is_case_insensitive() {
        let config = config_with_admins(&["Admin@Runway.local"], &[]);
        assert!(config.is_admin("admin@runway.local"));
        assert!(!config.is_admin("user@runway.local"));
    }

    #[test]
    fn network_admin_separate_from_admin() {
        let config = config_with_admins(&["admin@runway.local"], &["netops@runway.local"]);
        assert!(config.is_network_admin("netops@runway.local"));
        assert!(!config.is_network_admin("admin@runway.local"));
        assert!(!config.is_admin("netops@runway.local"));
    }
}
