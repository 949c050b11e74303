use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} missing")]
    Missing(&'static str),
    #[error("{0} is invalid: {1}")]
    Invalid(&'static str, String),
}

#[derive(Clone, Debug)]
pub struct SeedAdmin {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub session_key: Vec<u8>,
    pub bind_addr: String,
    pub max_connections: u32,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub cors_origin: Option<String>,
    pub seed_admin: Option<SeedAdmin>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let session_key_b64 = lookup("SESSION_KEY").ok_or(ConfigError::Missing("SESSION_KEY"))?;
        let session_key = general_purpose::STANDARD
            .decode(session_key_b64.trim())
            .map_err(|e| ConfigError::Invalid("SESSION_KEY", e.to_string()))?;
        if session_key.len() < 32 {
            return Err(ConfigError::Invalid(
                "SESSION_KEY",
                "must decode to at least 32 bytes".to_string(),
            ));
        }

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{}", port)
        });

        let max_connections = parse_or("DB_MAX_CONNECTIONS", lookup("DB_MAX_CONNECTIONS"), 10u32)?;
        let access_minutes = parse_or("ACCESS_TOKEN_TTL_MINUTES", lookup("ACCESS_TOKEN_TTL_MINUTES"), 15i64)?;
        let refresh_days = parse_or("REFRESH_TOKEN_TTL_DAYS", lookup("REFRESH_TOKEN_TTL_DAYS"), 7i64)?;

        let seed_admin = match (lookup("SEED_ADMIN_USERNAME"), lookup("SEED_ADMIN_PASSWORD")) {
            (Some(username), Some(password)) if !username.trim().is_empty() => Some(SeedAdmin {
                username: username.trim().to_string(),
                password,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            session_key,
            bind_addr,
            max_connections,
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
            cors_origin: lookup("CORS_ORIGIN").filter(|v| !v.trim().is_empty()),
            seed_admin,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(key, format!("'{raw}' is not a number")))?;
    if value <= T::default() {
        return Err(ConfigError::Invalid(key, "must be positive".to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn key_b64() -> String {
        general_purpose::STANDARD.encode([7u8; 32])
    }

    #[test]
    fn test_defaults() {
        let key = key_b64();
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/eval"),
            ("SESSION_KEY", key.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert!(config.seed_admin.is_none());
        assert!(config.cors_origin.is_none());
    }

    #[test]
    fn test_overrides() {
        let key = key_b64();
        let config = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/eval"),
            ("SESSION_KEY", key.as_str()),
            ("PORT", "8080"),
            ("ACCESS_TOKEN_TTL_MINUTES", "5"),
            ("SEED_ADMIN_USERNAME", "admin"),
            ("SEED_ADMIN_PASSWORD", "change-me-now"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.access_ttl, Duration::minutes(5));
        assert_eq!(config.seed_admin.unwrap().username, "admin");
    }

    #[test]
    fn test_rejects_bad_values() {
        let short = general_purpose::STANDARD.encode([1u8; 8]);
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/eval"),
            ("SESSION_KEY", short.as_str()),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("SESSION_KEY", _)));

        let key = key_b64();
        let err = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/eval"),
            ("SESSION_KEY", key.as_str()),
            ("REFRESH_TOKEN_TTL_DAYS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("REFRESH_TOKEN_TTL_DAYS", _)));

        let err = AppConfig::from_lookup(lookup(&[("SESSION_KEY", key.as_str())])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }
}
