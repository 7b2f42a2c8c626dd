//! Reference data (lookup) model with soft-delete semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Fields the lookup catalog recognizes.
pub const LOOKUP_FIELDS: [&str; 4] = ["Organization", "LOB", "Environment", "Region"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LookupEntry {
    pub id: i64,
    pub field: String,
    pub value: String,
    pub abbreviation: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLookup {
    #[validate(length(min = 2, max = 50))]
    pub field: String,
    #[validate(length(min = 1, max = 100))]
    pub value: String,
    #[validate(length(min = 1, max = 10))]
    pub abbreviation: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateLookup {
    pub value: Option<String>,
    pub abbreviation: Option<String>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_fields_cover_reference_kinds() {
        assert!(LOOKUP_FIELDS.contains(&"Organization"));
        assert!(LOOKUP_FIELDS.contains(&"LOB"));
        assert!(LOOKUP_FIELDS.contains(&"Environment"));
        assert!(LOOKUP_FIELDS.contains(&"Region"));
    }

    #[test]
    fn create_lookup_validates_lengths() {
        let input = CreateLookup {
            field: "Organization".to_string(),
            value: "Retail".to_string(),
            abbreviation: "RTL".to_string(),
        };
        assert!(validator::Validate::validate(&input).is_ok());

        let too_long = CreateLookup {
            field: "Organization".to_string(),
            value: "Retail".to_string(),
            abbreviation: "ABCDEFGHIJK".to_string(),
        };
        assert!(validator::Validate::validate(&too_long).is_err());
    }
}
