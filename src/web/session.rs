use crate::db::agents::{self, DbAgent};
use crate::domain::models::{RoleCode, TokenPair};
use crate::state::{AppState, SharedState};
use crate::web::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub kind: TokenKind,
    pub agent_id: Uuid,
    pub role: RoleCode,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
    #[error("wrong token kind")]
    Kind,
}

pub fn sign_token(
    kind: TokenKind,
    agent_id: Uuid,
    role: RoleCode,
    ttl: Duration,
    key: &[u8],
) -> Result<String, SessionError> {
    let exp = Utc::now() + ttl;
    let payload = format!("{}|{}|{}|{}", kind.as_str(), agent_id, role.as_str(), exp.timestamp());
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_token(token: &str, expected: TokenKind, key: &[u8]) -> Result<TokenClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::STANDARD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes).map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    let [kind, agent_id, role, exp] = pieces.as_slice() else {
        return Err(SessionError::Invalid);
    };

    let kind = match *kind {
        "access" => TokenKind::Access,
        "refresh" => TokenKind::Refresh,
        _ => return Err(SessionError::Invalid),
    };
    if kind != expected {
        return Err(SessionError::Kind);
    }
    let agent_id = Uuid::parse_str(agent_id).map_err(|_| SessionError::Invalid)?;
    let role = RoleCode::try_from(*role).map_err(|_| SessionError::Role)?;
    let exp: i64 = exp.parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }

    Ok(TokenClaims {
        kind,
        agent_id,
        role,
        exp,
    })
}

pub fn issue_pair(state: &AppState, agent_id: Uuid, role: RoleCode) -> Result<TokenPair, SessionError> {
    Ok(TokenPair {
        access: sign_token(TokenKind::Access, agent_id, role, state.access_ttl, &state.session_key)?,
        refresh: sign_token(TokenKind::Refresh, agent_id, role, state.refresh_ttl, &state.session_key)?,
    })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix("access_token=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

// ============================================
// Axum extractors
// ============================================

/// Authenticated, active agent behind the request's access token.
///
/// ```rust,ignore
/// async fn handler(AgentSession(agent): AgentSession) -> ApiResult<...> {
///     // agent is the freshly loaded DbAgent
/// }
/// ```
pub struct AgentSession(pub DbAgent);

#[async_trait]
impl<S> FromRequestParts<S> for AgentSession
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        let claims = verify_token(&token, TokenKind::Access, &shared_state.session_key).map_err(|e| {
            tracing::warn!("Access token rejected: {}", e);
            ApiError::Unauthorized
        })?;

        let agent = agents::find_agent_by_id(&shared_state.pool, claims.agent_id)
            .await
            .map_err(|e| {
                tracing::warn!("Agent lookup failed for session: {}", e);
                ApiError::Unauthorized
            })?
            .ok_or(ApiError::Unauthorized)?;

        if !agent.is_active {
            return Err(ApiError::Unauthorized);
        }

        Ok(AgentSession(agent))
    }
}

/// Same as [`AgentSession`] but rejects non-admin agents with 403.
pub struct AdminSession(pub DbAgent);

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AgentSession(agent) = AgentSession::from_request_parts(parts, state).await?;
        if !agent.is_admin() {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminSession(agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_round_trip() {
        let id = Uuid::new_v4();
        let token = sign_token(TokenKind::Access, id, RoleCode::Admin, Duration::minutes(5), KEY).unwrap();
        let claims = verify_token(&token, TokenKind::Access, KEY).unwrap();
        assert_eq!(claims.agent_id, id);
        assert_eq!(claims.role, RoleCode::Admin);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn test_tampered_payload() {
        let token = sign_token(TokenKind::Access, Uuid::new_v4(), RoleCode::Agent, Duration::minutes(5), KEY).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = format!("access|{}|ADMIN|{}", Uuid::new_v4(), Utc::now().timestamp() + 600);
        let forged = format!("{}.{}", general_purpose::STANDARD.encode(forged_payload), sig);
        assert_eq!(verify_token(&forged, TokenKind::Access, KEY).unwrap_err(), SessionError::Signature);

        let other_key = b"ffffffffffffffffffffffffffffffff";
        assert_eq!(
            verify_token(&token, TokenKind::Access, other_key).unwrap_err(),
            SessionError::Signature
        );
    }

    #[test]
    fn test_expired() {
        let token = sign_token(TokenKind::Access, Uuid::new_v4(), RoleCode::Agent, Duration::seconds(-5), KEY).unwrap();
        assert_eq!(verify_token(&token, TokenKind::Access, KEY).unwrap_err(), SessionError::Expired);
    }

    #[test]
    fn test_kinds_do_not_mix() {
        let refresh = sign_token(TokenKind::Refresh, Uuid::new_v4(), RoleCode::Agent, Duration::days(1), KEY).unwrap();
        assert_eq!(verify_token(&refresh, TokenKind::Access, KEY).unwrap_err(), SessionError::Kind);
        assert!(verify_token(&refresh, TokenKind::Refresh, KEY).is_ok());
    }

    #[test]
    fn test_garbage() {
        assert_eq!(verify_token("nope", TokenKind::Access, KEY).unwrap_err(), SessionError::Invalid);
        assert_eq!(verify_token("a.b", TokenKind::Access, KEY).unwrap_err(), SessionError::Invalid);
    }

    #[test]
    fn test_extract_token_sources() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers).is_none());

        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("theme=dark; access_token=abc"));
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));
    }
}
