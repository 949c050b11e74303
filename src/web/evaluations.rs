use crate::db::agents::DbAgent;
use crate::db::evaluations::{self, AnswerInput, AnswerWrite, DbEvaluation};
use crate::db::forms;
use crate::domain::lifecycle::{check_submittable, SubmitError, WriteRejection};
use crate::domain::models::{Answer, Evaluation, EvaluationNotee};
use crate::domain::scoring::validate_score;
use crate::domain::stats;
use crate::report::Scorecard;
use crate::state::SharedState;
use crate::web::error::{ApiError, ApiResult};
use crate::web::session::AgentSession;
use askama::Template;
use axum::{
    extract::{Path, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AnswerPayload {
    pub evaluation_id: Uuid,
    pub question_id: Uuid,
    pub score: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpsertPayload {
    pub answers: Vec<AnswerPayload>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpsertResponse {
    pub saved: usize,
    pub evaluations: usize,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:id", get(get_evaluation))
        .route("/:id/answers", get(list_answers))
        .route("/:id/submit", post(submit_evaluation))
        .route("/:id/scorecard", get(scorecard))
        .with_state(state)
}

pub fn answers_router(state: SharedState) -> Router {
    Router::new()
        .route("/bulk-upsert", post(bulk_upsert))
        .with_state(state)
}

/// The evaluator always sees the evaluation, the evaluated agent only once it
/// is submitted.
fn can_read(agent: &DbAgent, evaluation: &DbEvaluation) -> bool {
    agent.is_admin()
        || evaluation.evaluator_id == agent.id
        || (evaluation.evaluated_id == agent.id && evaluation.is_submitted())
}

async fn readable_evaluation(state: &SharedState, agent: &DbAgent, id: Uuid) -> ApiResult<DbEvaluation> {
    let evaluation = evaluations::find_evaluation(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("evaluation"))?;
    if !can_read(agent, &evaluation) {
        return Err(ApiError::Forbidden);
    }
    Ok(evaluation)
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::AlreadySubmitted => ApiError::Conflict(err.to_string()),
            SubmitError::Incomplete { .. } => ApiError::validation(err.to_string()),
        }
    }
}

fn rejected(rejection: WriteRejection) -> ApiError {
    match rejection {
        WriteRejection::Missing => ApiError::NotFound("evaluation"),
        WriteRejection::NotEvaluator => ApiError::Forbidden,
        WriteRejection::Submitted => ApiError::Conflict("evaluation already submitted".into()),
    }
}

/// Groups answers per evaluation, keeping first-seen evaluation order. A
/// repeated question inside one evaluation keeps the last value.
fn group_answers(answers: Vec<AnswerPayload>) -> ApiResult<Vec<(Uuid, Vec<AnswerInput>)>> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: HashMap<Uuid, Vec<AnswerInput>> = HashMap::new();

    for answer in answers {
        let score = validate_score(answer.score).map_err(|e| ApiError::validation(e.to_string()))?;
        let comment = answer
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let inputs = grouped.entry(answer.evaluation_id).or_insert_with(|| {
            order.push(answer.evaluation_id);
            Vec::new()
        });
        inputs.retain(|existing| existing.question_id != answer.question_id);
        inputs.push(AnswerInput {
            question_id: answer.question_id,
            score,
            comment,
        });
    }

    Ok(order
        .into_iter()
        .filter_map(|id| grouped.remove(&id).map(|inputs| (id, inputs)))
        .collect())
}

async fn get_evaluation(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EvaluationNotee>> {
    let evaluation = readable_evaluation(&state, &agent, id).await?;
    let (expected, rows) = tokio::try_join!(
        forms::count_form_questions(&state.pool, evaluation.form_id),
        evaluations::score_rows_for_evaluation(&state.pool, evaluation.id),
    )?;
    let aggregates = stats::evaluation_aggregates(&rows);
    Ok(Json(stats::notee(Evaluation::from(evaluation), expected, &aggregates)))
}

async fn list_answers(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Answer>>> {
    let evaluation = readable_evaluation(&state, &agent, id).await?;
    let answers = evaluations::answers_for_evaluation(&state.pool, evaluation.id).await?;
    Ok(Json(answers))
}

async fn bulk_upsert(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Json(payload): Json<BulkUpsertPayload>,
) -> ApiResult<Json<BulkUpsertResponse>> {
    if payload.answers.is_empty() {
        return Err(ApiError::validation("no answers provided"));
    }
    let groups = group_answers(payload.answers)?;

    // Question membership is checked up front; ownership and the submitted
    // flag are checked again under lock by `save_answers`.
    for (evaluation_id, inputs) in &groups {
        let evaluation = evaluations::find_evaluation(&state.pool, *evaluation_id)
            .await?
            .ok_or(ApiError::NotFound("evaluation"))?;
        if evaluation.evaluator_id != agent.id {
            return Err(ApiError::Forbidden);
        }

        let on_form: HashSet<Uuid> = forms::form_questions(&state.pool, evaluation.form_id)
            .await?
            .into_iter()
            .map(|fq| fq.question.id)
            .collect();
        if let Some(stray) = inputs.iter().find(|i| !on_form.contains(&i.question_id)) {
            return Err(ApiError::validation(format!(
                "question {} is not part of this form",
                stray.question_id
            )));
        }
    }

    let saved = match evaluations::save_answers(&state.pool, agent.id, &groups).await? {
        AnswerWrite::Saved(saved) => saved,
        AnswerWrite::Rejected(evaluation_id, rejection) => {
            tracing::warn!(
                "Agent {} answer write on evaluation {} rejected: {:?}",
                agent.id,
                evaluation_id,
                rejection
            );
            return Err(rejected(rejection));
        }
    };

    tracing::info!(
        "Agent {} saved {} answers across {} evaluations",
        agent.id,
        saved,
        groups.len()
    );
    Ok(Json(BulkUpsertResponse {
        saved,
        evaluations: groups.len(),
    }))
}

async fn submit_evaluation(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Evaluation>> {
    let evaluation = evaluations::find_evaluation(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("evaluation"))?;
    if evaluation.evaluator_id != agent.id {
        return Err(ApiError::Forbidden);
    }

    let (expected, answered) = tokio::try_join!(
        forms::count_form_questions(&state.pool, evaluation.form_id),
        evaluations::answered_count(&state.pool, evaluation.id),
    )?;
    check_submittable(evaluation.is_submitted(), answered, expected)?;

    if !evaluations::mark_submitted(&state.pool, evaluation.id).await? {
        return Err(SubmitError::AlreadySubmitted.into());
    }
    tracing::info!("Agent {} submitted evaluation {}", agent.id, evaluation.id);

    let submitted = evaluations::find_evaluation(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("evaluation"))?;
    Ok(Json(Evaluation::from(submitted)))
}

async fn scorecard(
    AgentSession(agent): AgentSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Html<String>> {
    let evaluation = readable_evaluation(&state, &agent, id).await?;
    let (questions, answers) = tokio::try_join!(
        forms::form_questions(&state.pool, evaluation.form_id),
        evaluations::answers_for_evaluation(&state.pool, evaluation.id),
    )?;

    let card = Scorecard::build(&Evaluation::from(evaluation), &questions, &answers, Utc::now());
    let html = card
        .render()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to render scorecard: {}", e)))?;
    Ok(Html(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(evaluation_id: Uuid, question_id: Uuid, score: i16) -> AnswerPayload {
        AnswerPayload {
            evaluation_id,
            question_id,
            score,
            comment: None,
        }
    }

    #[test]
    fn test_group_answers_by_evaluation() {
        let (e1, e2) = (Uuid::new_v4(), Uuid::new_v4());
        let (q1, q2) = (Uuid::new_v4(), Uuid::new_v4());
        let groups = group_answers(vec![
            payload(e2, q1, 3),
            payload(e1, q1, 4),
            payload(e2, q2, 2),
            payload(e2, q1, 1),
        ])
        .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, e2);
        assert_eq!(groups[0].1.len(), 2);
        let q1_answer = groups[0].1.iter().find(|a| a.question_id == q1).unwrap();
        assert_eq!(q1_answer.score, 1);
        assert_eq!(groups[1].0, e1);
    }

    #[test]
    fn test_group_answers_rejects_out_of_range() {
        let err = group_answers(vec![payload(Uuid::new_v4(), Uuid::new_v4(), 5)]).unwrap_err();
        assert_eq!(err.to_string(), "score 5 is outside 1..=4");
        assert!(group_answers(vec![payload(Uuid::new_v4(), Uuid::new_v4(), 0)]).is_err());
    }

    #[test]
    fn test_second_submit_is_conflict() {
        let err = ApiError::from(check_submittable(true, 4, 4).unwrap_err());
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "evaluation already submitted");

        let err = ApiError::from(check_submittable(false, 1, 4).unwrap_err());
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rejected_writes_map_to_status() {
        use axum::http::StatusCode;
        assert_eq!(rejected(WriteRejection::Submitted).status(), StatusCode::CONFLICT);
        assert_eq!(rejected(WriteRejection::NotEvaluator).status(), StatusCode::FORBIDDEN);
        assert_eq!(rejected(WriteRejection::Missing).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_blank_comments_are_dropped() {
        let mut answer = payload(Uuid::new_v4(), Uuid::new_v4(), 2);
        answer.comment = Some("   ".into());
        let groups = group_answers(vec![answer]).unwrap();
        assert!(groups[0].1[0].comment.is_none());
    }
}
