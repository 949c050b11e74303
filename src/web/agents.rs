use crate::db::{agents, catalog, evaluations, forms};
use crate::domain::models::{AdminCampaignAgentStats, Agent, AgentSummary};
use crate::domain::password::hash_password;
use crate::domain::stats;
use crate::state::SharedState;
use crate::web::auth::validate_new_password;
use crate::web::error::{ApiError, ApiResult};
use crate::web::session::{AdminSession, AgentSession};
use crate::web::ListQuery;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateAgentPayload {
    pub email: Option<String>,
    pub password: String,
    pub matricule: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role_id: Uuid,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgentPayload {
    pub matricule: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_agents))
        .route("/:id", get(get_agent).patch(update_agent).delete(deactivate_agent))
        .route("/stats/:form_id", get(campaign_agent_stats))
        .with_state(state)
}

/// Mounted under `/api/admin`.
pub fn admin_router(state: SharedState) -> Router {
    Router::new()
        .route("/agents", post(create_agent))
        .with_state(state)
}

fn required(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional_required(value: Option<String>, field: &str) -> ApiResult<Option<String>> {
    value.map(|v| required(&v, field)).transpose()
}

fn normalize_email(email: Option<&str>, username: &str) -> ApiResult<String> {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) if email.contains('@') => Ok(email.to_lowercase()),
        Some(_) => Err(ApiError::validation("email is invalid")),
        None => Ok(format!("{}@internal.local", username.to_lowercase())),
    }
}

async fn ensure_role(state: &SharedState, role_id: Uuid) -> ApiResult<()> {
    catalog::find_role(&state.pool, role_id)
        .await?
        .ok_or_else(|| ApiError::validation("unknown role"))?;
    Ok(())
}

async fn list_agents(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Agent>>> {
    let rows = agents::list_agents(&state.pool, query.is_active, query.ordering.as_deref()).await?;
    Ok(Json(rows.into_iter().map(|a| a.into_agent()).collect()))
}

async fn get_agent(
    AgentSession(requester): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Agent>> {
    if requester.id != id && !requester.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let agent = agents::find_agent_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("agent"))?;
    Ok(Json(agent.into_agent()))
}

async fn create_agent(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateAgentPayload>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let matricule = required(&payload.matricule, "matricule")?;
    let username = required(&payload.username, "username")?;
    let first_name = required(&payload.first_name, "first_name")?;
    let last_name = required(&payload.last_name, "last_name")?;
    let email = normalize_email(payload.email.as_deref(), &username)?;
    validate_new_password(&payload.password)?;
    ensure_role(&state, payload.role_id).await?;

    let hash = hash_password(&payload.password)?;
    let id = agents::insert_agent(
        &state.pool,
        agents::NewAgent {
            matricule: &matricule,
            username: &username,
            email: &email,
            first_name: &first_name,
            last_name: &last_name,
            role_id: payload.role_id,
            hash: &hash,
            is_active: payload.is_active,
        },
    )
    .await
    .map_err(|e| ApiError::conflict_on_duplicate(e, "matricule, username or email already used"))?;

    let agent = agents::find_agent_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("agent"))?;

    tracing::info!("Admin {} created agent {} ({})", admin.id, id, matricule);
    Ok((StatusCode::CREATED, Json(agent.into_agent())))
}

async fn update_agent(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAgentPayload>,
) -> ApiResult<Json<Agent>> {
    if let Some(role_id) = payload.role_id {
        ensure_role(&state, role_id).await?;
    }
    if admin.id == id && payload.is_active == Some(false) {
        return Err(ApiError::validation("you cannot deactivate your own account"));
    }

    let email = match payload.email.as_deref().map(str::trim) {
        Some("") => return Err(ApiError::validation("email is invalid")),
        Some(raw) => Some(normalize_email(Some(raw), "")?),
        None => None,
    };
    let patch = agents::AgentPatch {
        matricule: optional_required(payload.matricule, "matricule")?,
        username: optional_required(payload.username, "username")?,
        email,
        first_name: optional_required(payload.first_name, "first_name")?,
        last_name: optional_required(payload.last_name, "last_name")?,
        role_id: payload.role_id,
        is_active: payload.is_active,
    };

    let updated = agents::update_agent(&state.pool, id, patch)
        .await
        .map_err(|e| ApiError::conflict_on_duplicate(e, "matricule, username or email already used"))?;
    if !updated {
        return Err(ApiError::NotFound("agent"));
    }

    let agent = agents::find_agent_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("agent"))?;
    Ok(Json(agent.into_agent()))
}

async fn deactivate_agent(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if admin.id == id {
        return Err(ApiError::validation("you cannot deactivate your own account"));
    }
    if !agents::deactivate_agent(&state.pool, id).await? {
        return Err(ApiError::NotFound("agent"));
    }
    tracing::info!("Admin {} deactivated agent {}", admin.id, id);
    Ok(StatusCode::NO_CONTENT)
}

async fn campaign_agent_stats(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path(form_id): Path<Uuid>,
) -> ApiResult<Json<Vec<AdminCampaignAgentStats>>> {
    forms::find_form(&state.pool, form_id)
        .await?
        .ok_or(ApiError::NotFound("form"))?;

    let (participants, facts, rows) = tokio::try_join!(
        agents::list_form_participants(&state.pool, form_id),
        evaluations::evaluation_facts(&state.pool, form_id),
        evaluations::score_rows(&state.pool, form_id),
    )?;

    let summaries: Vec<AgentSummary> = participants.iter().map(|a| a.summary()).collect();
    Ok(Json(stats::agent_stats(form_id, &summaries, &facts, &rows)))
}
