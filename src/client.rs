//! HTTP client for the evaluation API.
//!
//! Every call carries the stored access token. A 401 triggers one refresh
//! followed by one replay of the request. Concurrent 401s share a single
//! refresh; when that refresh fails the stored tokens are cleared and the
//! session-expired hook runs once.

use crate::domain::models::TokenPair;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const LOGIN_PATH: &str = "/api/auth/token";
const REFRESH_PATH: &str = "/api/auth/refresh";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed ({status}): {detail}")]
    Http { status: u16, detail: String },
    #[error("session expired, please log in again")]
    SessionExpired,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Where the client keeps its token pair between calls.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Option<TokenPair>;
    async fn save(&self, tokens: TokenPair);
    async fn clear(&self);
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<TokenPair> {
        self.tokens.read().await.clone()
    }

    async fn save(&self, tokens: TokenPair) {
        *self.tokens.write().await = Some(tokens);
    }

    async fn clear(&self) {
        *self.tokens.write().await = None;
    }
}

pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh_lock: Mutex<()>,
    /// Bumped every time a new token pair is stored.
    generation: AtomicU64,
    expired_notified: AtomicBool,
    on_session_expired: Option<SessionExpiredHook>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            expired_notified: AtomicBool::new(false),
            on_session_expired: None,
        }
    }

    pub fn on_session_expired(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(hook));
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let tokens: TokenPair = decode(response).await?;
        self.install(tokens).await;
        Ok(())
    }

    pub async fn logout(&self) {
        self.store.clear().await;
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        self.send(Method::POST, path, Some(serde_json::to_value(body)?)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        self.send(Method::PUT, path, Some(serde_json::to_value(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        self.send(Method::PATCH, path, Some(serde_json::to_value(body)?)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let seen = self.generation.load(Ordering::SeqCst);
        let response = self.execute(method.clone(), path, body.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }

        self.refresh(seen).await?;
        let replay = self.execute(method, path, body.as_ref()).await?;
        decode(replay).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.http.request(method, self.url(path));
        if let Some(tokens) = self.store.load().await {
            request = request.bearer_auth(tokens.access);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Refreshes the token pair unless another caller already did since
    /// `seen` was read.
    async fn refresh(&self, seen: u64) -> Result<(), ClientError> {
        let _guard = self.refresh_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != seen {
            return Ok(());
        }

        let Some(tokens) = self.store.load().await else {
            self.expire().await;
            return Err(ClientError::SessionExpired);
        };

        let response = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&json!({ "refresh": tokens.refresh }))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let fresh: TokenPair = response.json().await?;
                self.install(fresh).await;
                Ok(())
            }
            Ok(response) => {
                tracing::warn!("Token refresh rejected with {}", response.status());
                self.expire().await;
                Err(ClientError::SessionExpired)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed: {}", e);
                self.expire().await;
                Err(ClientError::SessionExpired)
            }
        }
    }

    async fn install(&self, tokens: TokenPair) {
        self.store.save(tokens).await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.expired_notified.store(false, Ordering::SeqCst);
    }

    async fn expire(&self) {
        self.store.clear().await;
        if !self.expired_notified.swap(true, Ordering::SeqCst) {
            if let Some(hook) = &self.on_session_expired {
                hook();
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        let detail = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| {
                v.get("detail")
                    .or_else(|| v.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(ClientError::Http {
            status: status.as_u16(),
            detail,
        });
    }

    if bytes.is_empty() {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}
