use crate::db::catalog::DbQuestion;
use crate::db::order_by;
use crate::domain::models::{Form, FormQuestion, FormSummary, Question};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const FORM_COLUMNS: &str = "id, title, period, is_active, created_by, created_at, updated_at";

const FORM_ORDERING: &[(&str, &str)] = &[
    ("created_at", "created_at"),
    ("updated_at", "updated_at"),
    ("period", "period"),
    ("title", "title"),
];

#[derive(Debug, Clone, FromRow)]
pub struct DbForm {
    pub id: Uuid,
    pub title: String,
    pub period: String,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbForm {
    pub fn summary(&self) -> FormSummary {
        FormSummary {
            id: self.id,
            title: self.title.clone(),
            period: self.period.clone(),
            is_active: self.is_active,
        }
    }

    pub fn with_questions(self, questions: Vec<FormQuestion>) -> Form {
        Form {
            id: self.id,
            title: self.title,
            period: self.period,
            is_active: self.is_active,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            questions,
        }
    }
}

#[derive(Debug, FromRow)]
struct DbFormQuestion {
    form_question_id: Uuid,
    position: i32,
    #[sqlx(flatten)]
    question: DbQuestion,
}

#[derive(Debug, Default)]
pub struct FormPatch {
    pub title: Option<String>,
    pub period: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn list_forms(
    pool: &PgPool,
    is_active: Option<bool>,
    ordering: Option<&str>,
) -> Result<Vec<DbForm>> {
    let order = order_by(ordering, FORM_ORDERING, "created_at DESC");
    let sql = format!(
        "SELECT {FORM_COLUMNS} FROM forms
         WHERE ($1::BOOLEAN IS NULL OR is_active = $1)
         {order}"
    );
    let forms = sqlx::query_as::<_, DbForm>(&sql)
        .bind(is_active)
        .fetch_all(pool)
        .await?;
    Ok(forms)
}

pub async fn find_form(pool: &PgPool, id: Uuid) -> Result<Option<DbForm>> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = $1");
    let form = sqlx::query_as::<_, DbForm>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(form)
}

/// Most recently created active campaign.
pub async fn latest_active_form(pool: &PgPool) -> Result<Option<DbForm>> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE is_active ORDER BY created_at DESC LIMIT 1");
    let form = sqlx::query_as::<_, DbForm>(&sql).fetch_optional(pool).await?;
    Ok(form)
}

pub async fn insert_form(
    pool: &PgPool,
    title: &str,
    period: &str,
    is_active: bool,
    created_by: Uuid,
) -> Result<DbForm> {
    let sql = format!(
        "INSERT INTO forms (id, title, period, is_active, created_by)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {FORM_COLUMNS}"
    );
    let form = sqlx::query_as::<_, DbForm>(&sql)
        .bind(Uuid::new_v4())
        .bind(title)
        .bind(period)
        .bind(is_active)
        .bind(created_by)
        .fetch_one(pool)
        .await?;
    Ok(form)
}

pub async fn update_form(pool: &PgPool, id: Uuid, patch: FormPatch) -> Result<Option<DbForm>> {
    let sql = format!(
        "UPDATE forms
         SET title = COALESCE($2, title),
             period = COALESCE($3, period),
             is_active = COALESCE($4, is_active),
             updated_at = now()
         WHERE id = $1
         RETURNING {FORM_COLUMNS}"
    );
    let form = sqlx::query_as::<_, DbForm>(&sql)
        .bind(id)
        .bind(patch.title)
        .bind(patch.period)
        .bind(patch.is_active)
        .fetch_optional(pool)
        .await?;
    Ok(form)
}

pub async fn form_questions(pool: &PgPool, form_id: Uuid) -> Result<Vec<FormQuestion>> {
    let rows = sqlx::query_as::<_, DbFormQuestion>(
        r#"
        SELECT fq.id AS form_question_id, fq.position,
               q.id, q.label, q.description, q.weight, q.is_active, q.created_at,
               c.id AS category_id, c.code AS category_code, c.label AS category_label,
               c.is_active AS category_is_active, c.created_at AS category_created_at
        FROM form_questions fq
        JOIN questions q ON q.id = fq.question_id
        LEFT JOIN question_categories c ON c.id = q.category_id
        WHERE fq.form_id = $1
        ORDER BY fq.position ASC
        "#,
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| FormQuestion {
            id: row.form_question_id,
            position: row.position,
            question: Question::from(row.question),
        })
        .collect())
}

pub async fn count_form_questions(pool: &PgPool, form_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM form_questions WHERE form_id = $1")
        .bind(form_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Replaces the ordered question list of a form. Positions restart at 1.
pub async fn replace_form_questions(pool: &PgPool, form_id: Uuid, question_ids: &[Uuid]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM form_questions WHERE form_id = $1")
        .bind(form_id)
        .execute(&mut *tx)
        .await?;

    for (idx, question_id) in question_ids.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO form_questions (id, form_id, question_id, position)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(form_id)
        .bind(question_id)
        .bind((idx + 1) as i32)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE forms SET updated_at = now() WHERE id = $1")
        .bind(form_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn count_forms(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM forms")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
