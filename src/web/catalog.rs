use crate::db::catalog;
use crate::domain::models::{Question, QuestionCategory, Role};
use crate::domain::scoring::validate_weight;
use crate::state::SharedState;
use crate::web::error::{ApiError, ApiResult};
use crate::web::session::{AdminSession, AgentSession};
use crate::web::{double_option, ListQuery};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryPayload {
    pub code: String,
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuestionPayload {
    pub label: String,
    pub description: Option<String>,
    pub weight: i32,
    pub category_id: Option<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuestionPayload {
    pub label: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub weight: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

fn default_true() -> bool {
    true
}

pub fn roles_router(state: SharedState) -> Router {
    Router::new().route("/", get(list_roles)).with_state(state)
}

pub fn categories_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .with_state(state)
}

pub fn questions_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_questions).post(create_question))
        .route(
            "/:id",
            get(get_question).patch(update_question).delete(deactivate_question),
        )
        .with_state(state)
}

fn check_weight(weight: i32) -> ApiResult<i32> {
    validate_weight(weight).map_err(|e| ApiError::validation(e.to_string()))
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

async fn ensure_category(state: &SharedState, category_id: Option<Uuid>) -> ApiResult<()> {
    if let Some(id) = category_id {
        if !catalog::category_exists(&state.pool, id).await? {
            return Err(ApiError::validation("unknown question category"));
        }
    }
    Ok(())
}

async fn list_roles(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<Role>>> {
    Ok(Json(catalog::list_roles(&state.pool).await?))
}

async fn list_categories(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<QuestionCategory>>> {
    Ok(Json(catalog::list_categories(&state.pool, query.is_active).await?))
}

async fn create_category(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateCategoryPayload>,
) -> ApiResult<(StatusCode, Json<QuestionCategory>)> {
    let code = payload.code.trim().to_uppercase();
    let label = payload.label.trim();
    if code.is_empty() || label.is_empty() {
        return Err(ApiError::validation("code and label are required"));
    }

    let category = catalog::insert_category(&state.pool, &code, label)
        .await
        .map_err(|e| ApiError::conflict_on_duplicate(e, "a category with this code already exists"))?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn list_questions(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Question>>> {
    let questions =
        catalog::list_questions(&state.pool, query.is_active, query.ordering.as_deref()).await?;
    Ok(Json(questions))
}

async fn get_question(
    AgentSession(_): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Question>> {
    let question = catalog::find_question(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("question"))?;
    Ok(Json(question))
}

async fn create_question(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateQuestionPayload>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let label = payload.label.trim();
    if label.is_empty() {
        return Err(ApiError::validation("label is required"));
    }
    let weight = check_weight(payload.weight)?;
    ensure_category(&state, payload.category_id).await?;

    let description = clean_description(payload.description);
    let id = catalog::insert_question(
        &state.pool,
        catalog::NewQuestion {
            label,
            description: description.as_deref(),
            weight,
            category_id: payload.category_id,
            is_active: payload.is_active,
        },
    )
    .await?;

    let question = catalog::find_question(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("question"))?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn update_question(
    AdminSession(_): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionPayload>,
) -> ApiResult<Json<Question>> {
    let label = match payload.label {
        Some(label) if label.trim().is_empty() => {
            return Err(ApiError::validation("label is required"))
        }
        Some(label) => Some(label.trim().to_string()),
        None => None,
    };
    let weight = payload.weight.map(check_weight).transpose()?;
    if let Some(category_id) = payload.category_id {
        ensure_category(&state, category_id).await?;
    }

    let patch = catalog::QuestionPatch {
        label,
        description: payload.description.map(clean_description),
        weight,
        category_id: payload.category_id,
        is_active: payload.is_active,
    };
    if !catalog::update_question(&state.pool, id, patch).await? {
        return Err(ApiError::NotFound("question"));
    }

    let question = catalog::find_question(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("question"))?;
    Ok(Json(question))
}

async fn deactivate_question(
    AdminSession(admin): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !catalog::deactivate_question(&state.pool, id).await? {
        return Err(ApiError::NotFound("question"));
    }
    tracing::info!("Admin {} deactivated question {}", admin.id, id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_distinguishes_null_from_missing() {
        let missing: UpdateQuestionPayload = serde_json::from_str(r#"{"weight": 3}"#).unwrap();
        assert_eq!(missing.description, None);
        assert_eq!(missing.category_id, None);
        assert_eq!(missing.weight, Some(3));

        let cleared: UpdateQuestionPayload =
            serde_json::from_str(r#"{"description": null, "category_id": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));
        assert_eq!(cleared.category_id, Some(None));
    }

    #[test]
    fn test_weight_must_be_positive() {
        assert_eq!(check_weight(2).unwrap(), 2);
        assert!(matches!(check_weight(0), Err(ApiError::Validation(_))));
        assert!(check_weight(-3).is_err());
    }

    #[test]
    fn test_blank_description_is_dropped() {
        assert_eq!(clean_description(Some("  ".into())), None);
        assert_eq!(clean_description(Some(" Ponctualite ".into())).as_deref(), Some("Ponctualite"));
        assert_eq!(clean_description(None), None);
    }
}
