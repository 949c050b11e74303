//! Per-client budget for the password login endpoint.
use crate::web::error::ApiError;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Sliding window of login attempts keyed by client address.
#[derive(Clone)]
pub struct RateLimiter {
    attempts: Arc<RwLock<HashMap<Option<IpAddr>, VecDeque<Instant>>>>,
    budget: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(budget: usize, window_secs: u64) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            budget,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records an attempt from `client`. When the budget is spent nothing is
    /// recorded and the time until the oldest attempt expires is returned.
    pub async fn admit(&self, client: Option<IpAddr>) -> Result<(), Duration> {
        self.admit_at(client, Instant::now()).await
    }

    async fn admit_at(&self, client: Option<IpAddr>, now: Instant) -> Result<(), Duration> {
        let mut attempts = self.attempts.write().await;
        let recent = attempts.entry(client).or_default();
        while recent.front().is_some_and(|&at| now.duration_since(at) >= self.window) {
            recent.pop_front();
        }

        if recent.len() < self.budget {
            recent.push_back(now);
            return Ok(());
        }
        let oldest = recent.front().copied().unwrap_or(now);
        Err(self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Forgets clients with no attempt left in the window. Returns how many
    /// are still tracked.
    pub async fn prune(&self) -> usize {
        self.prune_at(Instant::now()).await
    }

    async fn prune_at(&self, now: Instant) -> usize {
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, recent| {
            recent.back().is_some_and(|&at| now.duration_since(at) < self.window)
        });
        attempts.len()
    }
}

fn too_many(retry_after: Duration) -> Response {
    let mut response = ApiError::TooManyRequests.into_response();
    let secs = retry_after.as_secs().max(1);
    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

/// Clients without connect info share one budget.
pub async fn login_rate_limit(
    State(limiter): State<RateLimiter>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = connect_info.map(|ConnectInfo(addr)| addr.ip());

    if let Err(retry_after) = limiter.admit(client).await {
        tracing::warn!(
            "Login attempts exhausted for {}, retry in {}s",
            client.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown client".into()),
            retry_after.as_secs()
        );
        return too_many(retry_after);
    }

    next.run(request).await
}
