pub mod agents;
pub mod catalog;
pub mod evaluations;
pub mod forms;
pub mod seed;

/// SQLSTATE raised by Postgres on unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|e| e.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}

/// Translates a `?ordering=` query value (`field` or `-field`) into an
/// ORDER BY clause. Only whitelisted fields reach the SQL; anything else falls
/// back to `default`.
pub fn order_by(raw: Option<&str>, allowed: &[(&str, &str)], default: &str) -> String {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return format!("ORDER BY {default}");
    };
    let (field, direction) = match raw.strip_prefix('-') {
        Some(field) => (field, "DESC"),
        None => (raw, "ASC"),
    };
    match allowed.iter().find(|(name, _)| *name == field) {
        Some((_, column)) => format!("ORDER BY {column} {direction}"),
        None => format!("ORDER BY {default}"),
    }
}
