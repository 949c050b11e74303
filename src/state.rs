use crate::config::AppConfig;
use crate::middleware::RateLimiter;
use chrono::Duration;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub session_key: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub login_limiter: RateLimiter,
}

impl AppState {
    pub fn new(pool: PgPool, config: &AppConfig) -> Self {
        Self {
            pool,
            session_key: config.session_key.clone(),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            // 5 login attempts per minute per IP
            login_limiter: RateLimiter::new(5, 60),
        }
    }
}

pub type SharedState = Arc<AppState>;
