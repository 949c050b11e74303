use crate::db::catalog::DbQuestion;
use crate::domain::lifecycle::{write_rejection, WriteRejection};
use crate::domain::models::{AgentSummary, Answer, Evaluation, EvaluationStatus, FormSummary, Question};
use crate::domain::stats::{EvaluationFacts, RecapAnswer, ScoreRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

const EVALUATION_SELECT: &str = r#"
    SELECT e.id, e.submitted_at,
           f.id AS form_id, f.title AS form_title, f.period AS form_period, f.is_active AS form_is_active,
           ev.id AS evaluator_id, ev.matricule AS evaluator_matricule,
           ev.first_name AS evaluator_first_name, ev.last_name AS evaluator_last_name,
           ed.id AS evaluated_id, ed.matricule AS evaluated_matricule,
           ed.first_name AS evaluated_first_name, ed.last_name AS evaluated_last_name
    FROM evaluations e
    JOIN forms f ON f.id = e.form_id
    JOIN agents ev ON ev.id = e.evaluator_id
    JOIN agents ed ON ed.id = e.evaluated_id
"#;

#[derive(Debug, Clone, FromRow)]
pub struct DbEvaluation {
    pub id: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
    pub form_id: Uuid,
    pub form_title: String,
    pub form_period: String,
    pub form_is_active: bool,
    pub evaluator_id: Uuid,
    pub evaluator_matricule: String,
    pub evaluator_first_name: String,
    pub evaluator_last_name: String,
    pub evaluated_id: Uuid,
    pub evaluated_matricule: String,
    pub evaluated_first_name: String,
    pub evaluated_last_name: String,
}

impl DbEvaluation {
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

impl From<DbEvaluation> for Evaluation {
    fn from(row: DbEvaluation) -> Self {
        Evaluation {
            id: row.id,
            form: FormSummary {
                id: row.form_id,
                title: row.form_title,
                period: row.form_period,
                is_active: row.form_is_active,
            },
            evaluator: AgentSummary {
                id: row.evaluator_id,
                matricule: row.evaluator_matricule,
                first_name: row.evaluator_first_name,
                last_name: row.evaluator_last_name,
            },
            evaluated: AgentSummary {
                id: row.evaluated_id,
                matricule: row.evaluated_matricule,
                first_name: row.evaluated_first_name,
                last_name: row.evaluated_last_name,
            },
            status: EvaluationStatus::from_submitted_at(row.submitted_at),
            submitted_at: row.submitted_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DbAnswer {
    answer_id: Uuid,
    evaluation_id: Uuid,
    score: i16,
    comment: Option<String>,
    #[sqlx(flatten)]
    question: DbQuestion,
}

#[derive(Debug, Clone)]
pub struct AnswerInput {
    pub question_id: Uuid,
    pub score: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerWrite {
    Saved(usize),
    /// Nothing was written.
    Rejected(Uuid, WriteRejection),
}

pub async fn find_evaluation(pool: &PgPool, id: Uuid) -> Result<Option<DbEvaluation>> {
    let sql = format!("{EVALUATION_SELECT} WHERE e.id = $1");
    let evaluation = sqlx::query_as::<_, DbEvaluation>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(evaluation)
}

/// Every evaluation the agent gives in the form. Pending ones come last,
/// sorted by the evaluated agent's name.
pub async fn given_by(pool: &PgPool, form_id: Uuid, evaluator_id: Uuid) -> Result<Vec<DbEvaluation>> {
    let sql = format!(
        "{EVALUATION_SELECT}
         WHERE e.form_id = $1 AND e.evaluator_id = $2
         ORDER BY e.submitted_at DESC NULLS LAST, ed.last_name ASC, ed.first_name ASC"
    );
    let evaluations = sqlx::query_as::<_, DbEvaluation>(&sql)
        .bind(form_id)
        .bind(evaluator_id)
        .fetch_all(pool)
        .await?;
    Ok(evaluations)
}

/// Submitted evaluations the agent received.
pub async fn received_by(pool: &PgPool, form_id: Uuid, evaluated_id: Uuid) -> Result<Vec<DbEvaluation>> {
    let sql = format!(
        "{EVALUATION_SELECT}
         WHERE e.form_id = $1 AND e.evaluated_id = $2 AND e.submitted_at IS NOT NULL
         ORDER BY e.submitted_at DESC"
    );
    let evaluations = sqlx::query_as::<_, DbEvaluation>(&sql)
        .bind(form_id)
        .bind(evaluated_id)
        .fetch_all(pool)
        .await?;
    Ok(evaluations)
}

pub async fn submitted_in_form(pool: &PgPool, form_id: Uuid) -> Result<Vec<DbEvaluation>> {
    let sql = format!(
        "{EVALUATION_SELECT}
         WHERE e.form_id = $1 AND e.submitted_at IS NOT NULL
         ORDER BY ed.last_name ASC, ed.first_name ASC, e.submitted_at DESC"
    );
    let evaluations = sqlx::query_as::<_, DbEvaluation>(&sql)
        .bind(form_id)
        .fetch_all(pool)
        .await?;
    Ok(evaluations)
}

pub async fn evaluation_facts(pool: &PgPool, form_id: Uuid) -> Result<Vec<EvaluationFacts>> {
    let facts = sqlx::query_as::<_, EvaluationFacts>(
        r#"
        SELECT id, evaluator_id, evaluated_id, submitted_at
        FROM evaluations
        WHERE form_id = $1
        "#,
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;
    Ok(facts)
}

/// Answers of a form joined with their question weight. Answers to questions
/// no longer attached to the form are left out.
pub async fn score_rows(pool: &PgPool, form_id: Uuid) -> Result<Vec<ScoreRow>> {
    let rows = sqlx::query_as::<_, ScoreRow>(
        r#"
        SELECT a.evaluation_id, a.question_id, q.category_id, a.score, q.weight
        FROM answers a
        JOIN evaluations e ON e.id = a.evaluation_id
        JOIN form_questions fq ON fq.form_id = e.form_id AND fq.question_id = a.question_id
        JOIN questions q ON q.id = a.question_id
        WHERE e.form_id = $1
        "#,
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn score_rows_for_evaluation(pool: &PgPool, evaluation_id: Uuid) -> Result<Vec<ScoreRow>> {
    let rows = sqlx::query_as::<_, ScoreRow>(
        r#"
        SELECT a.evaluation_id, a.question_id, q.category_id, a.score, q.weight
        FROM answers a
        JOIN evaluations e ON e.id = a.evaluation_id
        JOIN form_questions fq ON fq.form_id = e.form_id AND fq.question_id = a.question_id
        JOIN questions q ON q.id = a.question_id
        WHERE a.evaluation_id = $1
        "#,
    )
    .bind(evaluation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Answers from the submitted evaluations an agent received in a form, in
/// form question order.
pub async fn recap_answers(pool: &PgPool, form_id: Uuid, evaluated_id: Uuid) -> Result<Vec<RecapAnswer>> {
    let rows = sqlx::query_as::<_, RecapAnswer>(
        r#"
        SELECT a.evaluation_id, q.label, q.weight, a.score
        FROM answers a
        JOIN evaluations e ON e.id = a.evaluation_id
        JOIN form_questions fq ON fq.form_id = e.form_id AND fq.question_id = a.question_id
        JOIN questions q ON q.id = a.question_id
        WHERE e.form_id = $1 AND e.evaluated_id = $2 AND e.submitted_at IS NOT NULL
        ORDER BY fq.position ASC, e.submitted_at ASC
        "#,
    )
    .bind(form_id)
    .bind(evaluated_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn answers_for_evaluation(pool: &PgPool, evaluation_id: Uuid) -> Result<Vec<Answer>> {
    let rows = sqlx::query_as::<_, DbAnswer>(
        r#"
        SELECT a.id AS answer_id, a.evaluation_id, a.score, a.comment,
               q.id, q.label, q.description, q.weight, q.is_active, q.created_at,
               c.id AS category_id, c.code AS category_code, c.label AS category_label,
               c.is_active AS category_is_active, c.created_at AS category_created_at
        FROM answers a
        JOIN evaluations e ON e.id = a.evaluation_id
        JOIN questions q ON q.id = a.question_id
        LEFT JOIN form_questions fq ON fq.form_id = e.form_id AND fq.question_id = a.question_id
        LEFT JOIN question_categories c ON c.id = q.category_id
        WHERE a.evaluation_id = $1
        ORDER BY fq.position ASC NULLS LAST
        "#,
    )
    .bind(evaluation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Answer {
            id: row.answer_id,
            evaluation_id: row.evaluation_id,
            question: Question::from(row.question),
            score: row.score,
            comment: row.comment,
        })
        .collect())
}

/// Creates the missing evaluations for the given pairs. Existing pairs are
/// left untouched; returns how many rows were created.
pub async fn insert_pairs(pool: &PgPool, form_id: Uuid, pairs: &[(Uuid, Uuid)]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut created = 0;
    for (evaluator_id, evaluated_id) in pairs {
        let result = sqlx::query(
            r#"
            INSERT INTO evaluations (id, form_id, evaluator_id, evaluated_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (form_id, evaluator_id, evaluated_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(form_id)
        .bind(evaluator_id)
        .bind(evaluated_id)
        .execute(&mut *tx)
        .await?;
        created += result.rows_affected();
    }
    tx.commit().await?;
    Ok(created)
}

/// Writes every group in one transaction. The target evaluations are locked
/// first, so a concurrent submit either lands before (and the write is
/// rejected) or waits for the commit. Answers are keyed by
/// (evaluation_id, question_id); a second write replaces score and comment.
pub async fn save_answers(
    pool: &PgPool,
    evaluator_id: Uuid,
    groups: &[(Uuid, Vec<AnswerInput>)],
) -> Result<AnswerWrite> {
    let ids: Vec<Uuid> = groups.iter().map(|(id, _)| *id).collect();
    let mut tx = pool.begin().await?;

    let locked = sqlx::query_as::<_, EvaluationFacts>(
        r#"
        SELECT id, evaluator_id, evaluated_id, submitted_at
        FROM evaluations
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *tx)
    .await?;
    let by_id: HashMap<Uuid, EvaluationFacts> = locked.into_iter().map(|e| (e.id, e)).collect();

    for id in &ids {
        if let Some(rejection) = write_rejection(by_id.get(id), evaluator_id) {
            tx.rollback().await?;
            return Ok(AnswerWrite::Rejected(*id, rejection));
        }
    }

    let mut saved = 0;
    for (evaluation_id, answers) in groups {
        for answer in answers {
            sqlx::query(
                r#"
                INSERT INTO answers (id, evaluation_id, question_id, score, comment)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (evaluation_id, question_id)
                DO UPDATE SET score = EXCLUDED.score, comment = EXCLUDED.comment, updated_at = now()
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(evaluation_id)
            .bind(answer.question_id)
            .bind(answer.score)
            .bind(answer.comment.as_deref())
            .execute(&mut *tx)
            .await?;
            saved += 1;
        }
    }
    tx.commit().await?;
    Ok(AnswerWrite::Saved(saved))
}

/// Number of form questions the evaluation has an answer for.
pub async fn answered_count(pool: &PgPool, evaluation_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM answers a
        JOIN evaluations e ON e.id = a.evaluation_id
        JOIN form_questions fq ON fq.form_id = e.form_id AND fq.question_id = a.question_id
        WHERE a.evaluation_id = $1
        "#,
    )
    .bind(evaluation_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Sets submitted_at once. Returns false when the evaluation was already
/// submitted (or does not exist).
pub async fn mark_submitted(pool: &PgPool, evaluation_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE evaluations
        SET submitted_at = now()
        WHERE id = $1 AND submitted_at IS NULL
        "#,
    )
    .bind(evaluation_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// (all evaluations, submitted evaluations) across every campaign.
pub async fn evaluation_totals(pool: &PgPool) -> Result<(i64, i64)> {
    let totals: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(submitted_at)
        FROM evaluations
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(totals)
}
