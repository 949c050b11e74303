use crate::db::agents;
use crate::domain::models::{Agent, TokenPair};
use crate::domain::password::{hash_password, verify_password};
use crate::middleware::login_rate_limit;
use crate::state::SharedState;
use crate::web::error::{ApiError, ApiResult};
use crate::web::session::{self, AgentSession, TokenKind};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub fn router(state: SharedState) -> Router {
    let login_routes = Router::new()
        .route("/token", post(login))
        .route_layer(middleware::from_fn_with_state(
            state.login_limiter.clone(),
            login_rate_limit,
        ));

    Router::new()
        .merge(login_routes)
        .route("/refresh", post(refresh))
        .route("/me", get(me))
        .route("/password", post(change_password))
        .with_state(state)
}

pub fn validate_new_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let agent = agents::find_agent_by_username(&state.pool, payload.username.trim())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !agent.is_active || !verify_password(&payload.password, &agent.hash) {
        tracing::warn!("Failed login for '{}'", payload.username.trim());
        return Err(ApiError::Unauthorized);
    }

    let pair = session::issue_pair(&state, agent.id, agent.role_code)
        .map_err(|e| ApiError::Internal(e.into()))?;

    tracing::info!("Agent {} logged in", agent.id);
    Ok(Json(pair))
}

async fn refresh(
    State(state): State<SharedState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = session::verify_token(&payload.refresh, TokenKind::Refresh, &state.session_key).map_err(|e| {
        tracing::warn!("Refresh token rejected: {}", e);
        ApiError::Unauthorized
    })?;

    // Role and active flag are re-read so demotions apply at the next refresh.
    let agent = agents::find_agent_by_id(&state.pool, claims.agent_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or(ApiError::Unauthorized)?;

    let pair = session::issue_pair(&state, agent.id, agent.role_code)
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(pair))
}

async fn me(AgentSession(agent): AgentSession) -> Json<Agent> {
    Json(agent.into_agent())
}

async fn change_password(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    if !verify_password(&payload.current_password, &agent.hash) {
        return Err(ApiError::validation("current password is incorrect"));
    }
    validate_new_password(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    agents::set_password(&state.pool, agent.id, &hash).await?;

    tracing::info!("Agent {} changed password", agent.id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("long enough").is_ok());
    }
}
