use crate::db::{agents, catalog, evaluations, forms};
use crate::db::evaluations::DbEvaluation;
use crate::db::forms::DbForm;
use crate::domain::lifecycle;
use crate::domain::models::{
    AdminCampaignStats, AgentCategoryScore, DashboardSummary, Evaluation, EvaluationNotee, Form,
    FormSummary,
};
use crate::domain::pairs::evaluation_pairs;
use crate::domain::period::Period;
use crate::domain::stats;
use crate::report::FinalRecap;
use crate::state::SharedState;
use crate::web::error::{ApiError, ApiResult};
use crate::web::session::{AdminSession, AgentSession};
use crate::web::ListQuery;
use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateFormPayload {
    /// Defaults to the period label, e.g. "Trimestre 2 2025".
    pub title: Option<String>,
    /// Defaults to the current quarter.
    pub period: Option<Period>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFormPayload {
    pub title: Option<String>,
    pub period: Option<Period>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FormQuestionsPayload {
    pub question_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeneratePayload {
    /// Participants; every active agent when absent.
    pub agent_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub created: u64,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct CategoryScoresQuery {
    pub agent_id: Option<Uuid>,
}

fn default_true() -> bool {
    true
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_forms).post(create_form))
        .route("/active", get(active_form))
        .route("/admin/stats", get(all_campaign_stats))
        .route("/:id", get(get_form).patch(update_form))
        .route("/:id/questions", put(set_form_questions))
        .route("/:id/evaluations/generate", post(generate_evaluations))
        .route("/:id/stats", get(campaign_stats))
        .route("/:id/my_dashboard", get(my_dashboard))
        .route("/:id/category-scores", get(category_scores))
        .route("/:id/evaluations/pending", get(pending_evaluations))
        .route("/:id/evaluations/given", get(given_evaluations))
        .route("/:id/evaluations/received", get(received_evaluations))
        .route("/:id/evaluations/all-submitted", get(all_submitted_evaluations))
        .route("/:id/agents/:agent_id/evaluations", get(agent_evaluations))
        .route("/:id/agents/:agent_id/final-recap", get(final_recap))
        .route("/:id/agents/:agent_id/final-recap/bulletin", get(final_recap_bulletin))
        .with_state(state)
}

/// Resolves the period and title of a new campaign, filling in the current
/// quarter and its label when omitted.
fn campaign_identity(title: Option<&str>, period: Option<Period>, today: NaiveDate) -> (String, String) {
    let period = period.unwrap_or_else(|| Period::containing(today));
    let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => period.label(),
    };
    (title, period.to_string())
}

/// Removes repeated ids, keeping the first occurrence of each.
fn dedupe_keep_order(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

async fn load_form(state: &SharedState, id: Uuid) -> ApiResult<DbForm> {
    forms::find_form(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("form"))
}

async fn form_with_questions(state: &SharedState, form: DbForm) -> ApiResult<Form> {
    let questions = forms::form_questions(&state.pool, form.id).await?;
    Ok(form.with_questions(questions))
}

async fn notees(
    state: &SharedState,
    form_id: Uuid,
    rows: Vec<DbEvaluation>,
) -> ApiResult<Vec<EvaluationNotee>> {
    let (expected, scores) = tokio::try_join!(
        forms::count_form_questions(&state.pool, form_id),
        evaluations::score_rows(&state.pool, form_id),
    )?;
    let aggregates = stats::evaluation_aggregates(&scores);
    Ok(rows
        .into_iter()
        .map(|row| stats::notee(Evaluation::from(row), expected, &aggregates))
        .collect())
}

async fn rollup_for(state: &SharedState, form: DbForm) -> ApiResult<AdminCampaignStats> {
    let facts = evaluations::evaluation_facts(&state.pool, form.id).await?;
    Ok(AdminCampaignStats {
        form: form.summary(),
        rollup: stats::rollup(&facts),
    })
}

async fn list_forms(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<FormSummary>>> {
    let rows = forms::list_forms(&state.pool, query.is_active, query.ordering.as_deref()).await?;
    Ok(Json(rows.iter().map(DbForm::summary).collect()))
}

async fn active_form(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
) -> ApiResult<Json<Form>> {
    let form = forms::latest_active_form(&state.pool)
        .await?
        .ok_or(ApiError::NotFound("active form"))?;
    Ok(Json(form_with_questions(&state, form).await?))
}

async fn get_form(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Form>> {
    let form = load_form(&state, id).await?;
    Ok(Json(form_with_questions(&state, form).await?))
}

async fn create_form(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateFormPayload>,
) -> ApiResult<(StatusCode, Json<Form>)> {
    let (title, period) = campaign_identity(
        payload.title.as_deref(),
        payload.period,
        Utc::now().date_naive(),
    );

    let form = forms::insert_form(&state.pool, &title, &period, payload.is_active, admin.id)
        .await
        .map_err(|e| {
            ApiError::conflict_on_duplicate(e, "a campaign already exists for this quarter and year")
        })?;

    tracing::info!("Admin {} created campaign {} ({})", admin.id, form.id, period);
    Ok((StatusCode::CREATED, Json(form.with_questions(Vec::new()))))
}

async fn update_form(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateFormPayload>,
) -> ApiResult<Json<Form>> {
    let title = match payload.title {
        Some(title) if title.trim().is_empty() => {
            return Err(ApiError::validation("title is required"))
        }
        Some(title) => Some(title.trim().to_string()),
        None => None,
    };
    let period = payload.period.map(|p| p.to_string());

    let patch = forms::FormPatch {
        title,
        period,
        is_active: payload.is_active,
    };
    let form = forms::update_form(&state.pool, id, patch)
        .await
        .map_err(|e| {
            ApiError::conflict_on_duplicate(e, "a campaign already exists for this quarter and year")
        })?
        .ok_or(ApiError::NotFound("form"))?;
    Ok(Json(form_with_questions(&state, form).await?))
}

async fn set_form_questions(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FormQuestionsPayload>,
) -> ApiResult<Json<Form>> {
    let question_ids = dedupe_keep_order(payload.question_ids);
    if question_ids.is_empty() {
        return Err(ApiError::validation("select at least one question"));
    }

    let form = load_form(&state, id).await?;
    let active: HashSet<Uuid> = catalog::active_question_ids(&state.pool, &question_ids)
        .await?
        .into_iter()
        .collect();
    if let Some(missing) = question_ids.iter().find(|q| !active.contains(q)) {
        return Err(ApiError::validation(format!(
            "question {missing} does not exist or is inactive"
        )));
    }

    forms::replace_form_questions(&state.pool, form.id, &question_ids).await?;
    tracing::info!(
        "Admin {} set {} questions on campaign {}",
        admin.id,
        question_ids.len(),
        form.id
    );
    Ok(Json(form_with_questions(&state, form).await?))
}

async fn generate_evaluations(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<GeneratePayload>>,
) -> ApiResult<(StatusCode, Json<GenerateResponse>)> {
    let form = load_form(&state, id).await?;
    let requested = payload.and_then(|Json(p)| p.agent_ids);

    let participants = match requested {
        Some(ids) => {
            let ids = dedupe_keep_order(ids);
            let active: HashSet<Uuid> = agents::active_agent_ids(&state.pool, &ids)
                .await?
                .into_iter()
                .collect();
            ids.into_iter().filter(|id| active.contains(id)).collect::<Vec<_>>()
        }
        None => agents::list_agents(&state.pool, Some(true), None)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect(),
    };
    if participants.len() < 2 {
        return Err(ApiError::validation("a campaign needs at least two active agents"));
    }

    let pairs = evaluation_pairs(&participants);
    let created = evaluations::insert_pairs(&state.pool, form.id, &pairs).await?;

    tracing::info!(
        "Admin {} generated {} evaluations ({} pairs) for campaign {}",
        admin.id,
        created,
        pairs.len(),
        form.id
    );
    Ok((
        StatusCode::CREATED,
        Json(GenerateResponse {
            created,
            total: pairs.len(),
        }),
    ))
}

async fn campaign_stats(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AdminCampaignStats>> {
    let form = load_form(&state, id).await?;
    Ok(Json(rollup_for(&state, form).await?))
}

async fn all_campaign_stats(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<AdminCampaignStats>>> {
    let all = forms::list_forms(&state.pool, None, None).await?;
    let stats = try_join_all(all.into_iter().map(|form| rollup_for(&state, form))).await?;
    Ok(Json(stats))
}

async fn my_dashboard(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DashboardSummary>> {
    let form = load_form(&state, id).await?;
    let (facts, rows) = tokio::try_join!(
        evaluations::evaluation_facts(&state.pool, form.id),
        evaluations::score_rows(&state.pool, form.id),
    )?;
    Ok(Json(stats::dashboard_summary(agent.id, &facts, &rows)))
}

async fn category_scores(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CategoryScoresQuery>,
) -> ApiResult<Json<Vec<AgentCategoryScore>>> {
    let target = match query.agent_id {
        Some(other) if other != agent.id && !agent.is_admin() => return Err(ApiError::Forbidden),
        Some(other) => other,
        None => agent.id,
    };

    let form = load_form(&state, id).await?;
    let (categories, facts, rows) = tokio::try_join!(
        catalog::list_categories(&state.pool, None),
        evaluations::evaluation_facts(&state.pool, form.id),
        evaluations::score_rows(&state.pool, form.id),
    )?;
    Ok(Json(stats::category_scores(
        target,
        form.id,
        &categories,
        &facts,
        &rows,
    )))
}

async fn pending_evaluations(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Evaluation>>> {
    let form = load_form(&state, id).await?;
    let rows = evaluations::given_by(&state.pool, form.id, agent.id).await?;
    Ok(Json(lifecycle::pending(rows.into_iter().map(Evaluation::from).collect())))
}

async fn given_evaluations(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<EvaluationNotee>>> {
    let form = load_form(&state, id).await?;
    let rows = evaluations::given_by(&state.pool, form.id, agent.id).await?;
    Ok(Json(notees(&state, form.id, rows).await?))
}

async fn received_evaluations(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<EvaluationNotee>>> {
    let form = load_form(&state, id).await?;
    let rows = evaluations::received_by(&state.pool, form.id, agent.id).await?;
    Ok(Json(notees(&state, form.id, rows).await?))
}

async fn agent_evaluations(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path((id, agent_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<EvaluationNotee>>> {
    let form = load_form(&state, id).await?;
    let rows = evaluations::received_by(&state.pool, form.id, agent_id).await?;
    Ok(Json(notees(&state, form.id, rows).await?))
}

async fn all_submitted_evaluations(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<EvaluationNotee>>> {
    let form = load_form(&state, id).await?;
    let rows = evaluations::submitted_in_form(&state.pool, form.id).await?;
    Ok(Json(notees(&state, form.id, rows).await?))
}

async fn build_final_recap(state: &SharedState, form_id: Uuid, agent_id: Uuid) -> ApiResult<FinalRecap> {
    let form = load_form(state, form_id).await?;
    let agent = agents::find_agent_by_id(&state.pool, agent_id)
        .await?
        .ok_or(ApiError::NotFound("agent"))?;
    let answers = evaluations::recap_answers(&state.pool, form.id, agent.id).await?;
    Ok(FinalRecap::build(form.summary(), agent.summary(), &answers, Utc::now()))
}

async fn final_recap(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path((id, agent_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<FinalRecap>> {
    Ok(Json(build_final_recap(&state, id, agent_id).await?))
}

async fn final_recap_bulletin(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path((id, agent_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Html<String>> {
    let recap = build_final_recap(&state, id, agent_id).await?;
    let html = recap
        .render()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to render bulletin: {}", e)))?;
    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedupe_keep_order(vec![b, a, b, c, a]), vec![b, a, c]);
        assert!(dedupe_keep_order(Vec::new()).is_empty());
    }

    #[test]
    fn test_payload_period_is_normalized() {
        let payload: UpdateFormPayload =
            serde_json::from_value(serde_json::json!({ "period": " 2025-t2 " })).unwrap();
        assert_eq!(payload.period.map(|p| p.to_string()).as_deref(), Some("2025-T2"));

        let err = serde_json::from_value::<CreateFormPayload>(serde_json::json!({ "period": "2025-T5" }))
            .unwrap_err();
        assert!(err.to_string().contains("quarter must be between 1 and 4"));
        assert!(serde_json::from_value::<CreateFormPayload>(serde_json::json!({ "period": "T1" })).is_err());

        let empty: CreateFormPayload = serde_json::from_str("{}").unwrap();
        assert!(empty.period.is_none());
        assert!(empty.is_active);
    }

    #[test]
    fn test_campaign_identity_defaults() {
        let today = NaiveDate::from_ymd_opt(2025, 5, 14).unwrap();
        let (title, period) = campaign_identity(None, None, today);
        assert_eq!(period, "2025-T2");
        assert_eq!(title, "Trimestre 2 2025");

        let q4 = Period::new(2024, 4).unwrap();
        let (title, period) = campaign_identity(Some(" Bilan "), Some(q4), today);
        assert_eq!(title, "Bilan");
        assert_eq!(period, "2024-T4");

        let (title, _) = campaign_identity(Some("  "), Some(q4), today);
        assert_eq!(title, "Trimestre 4 2024");
    }

    #[test]
    fn test_generate_payload_is_optional() {
        let explicit: GeneratePayload =
            serde_json::from_value(serde_json::json!({ "agent_ids": [Uuid::nil()] })).unwrap();
        assert_eq!(explicit.agent_ids.map(|ids| ids.len()), Some(1));
        let empty: GeneratePayload = serde_json::from_str("{}").unwrap();
        assert!(empty.agent_ids.is_none());
    }
}
