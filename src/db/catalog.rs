use crate::db::order_by;
use crate::domain::models::{Question, QuestionCategory, Role, RoleCode};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const QUESTION_COLUMNS: &str = r#"
    q.id, q.label, q.description, q.weight, q.is_active, q.created_at,
    c.id AS category_id, c.code AS category_code, c.label AS category_label,
    c.is_active AS category_is_active, c.created_at AS category_created_at
"#;

const QUESTION_ORDERING: &[(&str, &str)] = &[
    ("weight", "q.weight"),
    ("label", "q.label"),
    ("created_at", "q.created_at"),
];

#[derive(Debug, Clone, FromRow)]
pub struct DbQuestion {
    pub id: Uuid,
    pub label: String,
    pub description: Option<String>,
    pub weight: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub category_id: Option<Uuid>,
    pub category_code: Option<String>,
    pub category_label: Option<String>,
    pub category_is_active: Option<bool>,
    pub category_created_at: Option<DateTime<Utc>>,
}

impl From<DbQuestion> for Question {
    fn from(row: DbQuestion) -> Self {
        let category = match (
            row.category_id,
            row.category_code,
            row.category_label,
            row.category_created_at,
        ) {
            (Some(id), Some(code), Some(label), Some(created_at)) => Some(QuestionCategory {
                id,
                code,
                label,
                is_active: row.category_is_active.unwrap_or(true),
                created_at,
            }),
            _ => None,
        };
        Question {
            id: row.id,
            label: row.label,
            description: row.description,
            weight: row.weight,
            is_active: row.is_active,
            category,
            created_at: row.created_at,
        }
    }
}

pub struct NewQuestion<'a> {
    pub label: &'a str,
    pub description: Option<&'a str>,
    pub weight: i32,
    pub category_id: Option<Uuid>,
    pub is_active: bool,
}

/// `Some(None)` clears a nullable column, `None` leaves it untouched.
#[derive(Debug, Default)]
pub struct QuestionPatch {
    pub label: Option<String>,
    pub description: Option<Option<String>>,
    pub weight: Option<i32>,
    pub category_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
}

// ========== Roles ==========

pub async fn list_roles(pool: &PgPool) -> Result<Vec<Role>> {
    let roles = sqlx::query_as::<_, Role>("SELECT id, code, label, created_at FROM roles ORDER BY label DESC")
        .fetch_all(pool)
        .await?;
    Ok(roles)
}

pub async fn find_role(pool: &PgPool, id: Uuid) -> Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>("SELECT id, code, label, created_at FROM roles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(role)
}

pub async fn find_role_by_code(pool: &PgPool, code: RoleCode) -> Result<Option<Role>> {
    let role = sqlx::query_as::<_, Role>("SELECT id, code, label, created_at FROM roles WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(role)
}

// ========== Question categories ==========

pub async fn list_categories(pool: &PgPool, is_active: Option<bool>) -> Result<Vec<QuestionCategory>> {
    let categories = sqlx::query_as::<_, QuestionCategory>(
        r#"
        SELECT id, code, label, is_active, created_at
        FROM question_categories
        WHERE ($1::BOOLEAN IS NULL OR is_active = $1)
        ORDER BY label ASC
        "#,
    )
    .bind(is_active)
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

pub async fn insert_category(pool: &PgPool, code: &str, label: &str) -> Result<QuestionCategory> {
    let category = sqlx::query_as::<_, QuestionCategory>(
        r#"
        INSERT INTO question_categories (id, code, label)
        VALUES ($1, $2, $3)
        RETURNING id, code, label, is_active, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(label)
    .fetch_one(pool)
    .await?;
    Ok(category)
}

pub async fn category_exists(pool: &PgPool, id: Uuid) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM question_categories WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

// ========== Questions ==========

pub async fn list_questions(
    pool: &PgPool,
    is_active: Option<bool>,
    ordering: Option<&str>,
) -> Result<Vec<Question>> {
    let order = order_by(ordering, QUESTION_ORDERING, "q.weight DESC, q.label ASC");
    let sql = format!(
        "SELECT {QUESTION_COLUMNS}
         FROM questions q LEFT JOIN question_categories c ON c.id = q.category_id
         WHERE ($1::BOOLEAN IS NULL OR q.is_active = $1)
         {order}"
    );
    let rows = sqlx::query_as::<_, DbQuestion>(&sql)
        .bind(is_active)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Question::from).collect())
}

pub async fn find_question(pool: &PgPool, id: Uuid) -> Result<Option<Question>> {
    let sql = format!(
        "SELECT {QUESTION_COLUMNS}
         FROM questions q LEFT JOIN question_categories c ON c.id = q.category_id
         WHERE q.id = $1"
    );
    let row = sqlx::query_as::<_, DbQuestion>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Question::from))
}

pub async fn insert_question(pool: &PgPool, question: NewQuestion<'_>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO questions (id, label, description, weight, category_id, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(question.label)
    .bind(question.description)
    .bind(question.weight)
    .bind(question.category_id)
    .bind(question.is_active)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn update_question(pool: &PgPool, id: Uuid, patch: QuestionPatch) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE questions
        SET label = COALESCE($2, label),
            description = CASE WHEN $3 THEN $4 ELSE description END,
            weight = COALESCE($5, weight),
            category_id = CASE WHEN $6 THEN $7 ELSE category_id END,
            is_active = COALESCE($8, is_active)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(patch.label)
    .bind(patch.description.is_some())
    .bind(patch.description.flatten())
    .bind(patch.weight)
    .bind(patch.category_id.is_some())
    .bind(patch.category_id.flatten())
    .bind(patch.is_active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn deactivate_question(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE questions SET is_active = FALSE WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Active questions among `ids`.
pub async fn active_question_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>> {
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM questions WHERE is_active AND id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(found)
}
