//! Reference data catalog: organizations, LOBs, environments, and regions.
//!
//! Values are soft-deleted (deactivated) rather than removed so historical
//! requests keep resolving.

use std::collections::BTreeMap;

use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::lookup::{CreateLookup, LookupEntry, UpdateLookup, LOOKUP_FIELDS};
use crate::services::workflow::record_audit;

/// List lookup values for one field.
pub async fn list_by_field(
    pool: &PgPool,
    field: &str,
    active_only: bool,
) -> Result<Vec<LookupEntry>, AppError> {
    let entries = sqlx::query_as::<_, LookupEntry>(
        r#"
        SELECT * FROM lookup
        WHERE field = $1 AND ($2 = FALSE OR is_active = TRUE)
        ORDER BY value
        "#,
    )
    .bind(field)
    .bind(active_only)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// List all lookup values grouped by field.
pub async fn list_grouped(
    pool: &PgPool,
    active_only: bool,
) -> Result<BTreeMap<String, Vec<LookupEntry>>, AppError> {
    let entries = sqlx::query_as::<_, LookupEntry>(
        r#"
        SELECT * FROM lookup
        WHERE ($1 = FALSE OR is_active = TRUE)
        ORDER BY field, value
        "#,
    )
    .bind(active_only)
    .fetch_all(pool)
    .await?;

    let mut grouped: BTreeMap<String, Vec<LookupEntry>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(entry.field.clone()).or_default().push(entry);
    }
    Ok(grouped)
}

/// Create a new lookup value (admin only at the route layer).
pub async fn create_lookup(
    pool: &PgPool,
    input: &CreateLookup,
    created_by: &str,
) -> Result<LookupEntry, AppError> {
    validator::Validate::validate(input)?;

    if !LOOKUP_FIELDS.contains(&input.field.as_str()) {
        return Err(AppError::Validation(format!(
            "Field must be one of: {}",
            LOOKUP_FIELDS.join(", ")
        )));
    }

    let abbreviation = input.abbreviation.trim().to_uppercase();
    if !abbreviation
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(AppError::Validation(
            "Abbreviation must contain only uppercase letters and numbers".to_string(),
        ));
    }
    let value = input.value.trim();

    let mut tx = pool.begin().await?;

    let value_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM lookup WHERE field = $1 AND value = $2)",
    )
    .bind(&input.field)
    .bind(value)
    .fetch_one(&mut *tx)
    .await?;
    if value_exists {
        return Err(AppError::Conflict(format!(
            "Value '{value}' already exists for field '{}'",
            input.field
        )));
    }

    let abbreviation_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM lookup WHERE field = $1 AND abbreviation = $2)",
    )
    .bind(&input.field)
    .bind(&abbreviation)
    .fetch_one(&mut *tx)
    .await?;
    if abbreviation_exists {
        return Err(AppError::Conflict(format!(
            "Abbreviation '{abbreviation}' already exists for field '{}'",
            input.field
        )));
    }

    let entry = sqlx::query_as::<_, LookupEntry>(
        "INSERT INTO lookup (field, value, abbreviation) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&input.field)
    .bind(value)
    .bind(&abbreviation)
    .fetch_one(&mut *tx)
    .await?;

    record_audit(
        &mut tx,
        "LOOKUP",
        None,
        created_by,
        &format!("Created lookup {}/{}", entry.field, entry.value),
        None,
        None,
    )
    .await?;

    tx.commit().await?;
    Ok(entry)
}

/// Update or (de)activate an existing lookup value.
pub async fn update_lookup(
    pool: &PgPool,
    lookup_id: i64,
    input: &UpdateLookup,
) -> Result<LookupEntry, AppError> {
    let existing = sqlx::query_as::<_, LookupEntry>("SELECT * FROM lookup WHERE id = $1")
        .bind(lookup_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lookup {lookup_id} not found")))?;

    let mut tx = pool.begin().await?;

    if let Some(value) = input.value.as_deref().map(str::trim) {
        if value != existing.value {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM lookup WHERE field = $1 AND value = $2 AND id <> $3)",
            )
            .bind(&existing.field)
            .bind(value)
            .bind(lookup_id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(AppError::Conflict(format!(
                    "Value '{value}' already exists for field '{}'",
                    existing.field
                )));
            }
        }
    }

    if let Some(abbreviation) = input.abbreviation.as_deref().map(str::trim) {
        if abbreviation != existing.abbreviation {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM lookup WHERE field = $1 AND abbreviation = $2 AND id <> $3)",
            )
            .bind(&existing.field)
            .bind(abbreviation)
            .bind(lookup_id)
            .fetch_one(&mut *tx)
            .await?;
            if taken {
                return Err(AppError::Conflict(format!(
                    "Abbreviation '{abbreviation}' already exists for field '{}'",
                    existing.field
                )));
            }
        }
    }

    let entry = sqlx::query_as::<_, LookupEntry>(
        r#"
        UPDATE lookup
        SET value = COALESCE($1, value),
            abbreviation = COALESCE($2, abbreviation),
            is_active = COALESCE($3, is_active)
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(input.value.as_deref().map(str::trim))
    .bind(input.abbreviation.as_deref().map(str::trim))
    .bind(input.is_active)
    .bind(lookup_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use crate::models::lookup::LOOKUP_FIELDS;

    #[test]
    fn known_fields_are_closed_set() {
        assert_eq!(LOOKUP_FIELDS.len(), 4);
        assert!(!LOOKUP_FIELDS.contains(&"Platform"));
    }
}
