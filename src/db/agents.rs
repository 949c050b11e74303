use crate::db::order_by;
use crate::domain::models::{Agent, AgentSummary, Role, RoleCode};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

const AGENT_COLUMNS: &str = r#"
    a.id, a.matricule, a.username, a.email, a.first_name, a.last_name, a.hash,
    a.is_active, a.must_change_password, a.created_at,
    r.id AS role_id, r.code AS role_code, r.label AS role_label, r.created_at AS role_created_at
"#;

const AGENT_ORDERING: &[(&str, &str)] = &[
    ("last_name", "a.last_name"),
    ("first_name", "a.first_name"),
    ("matricule", "a.matricule"),
    ("username", "a.username"),
    ("created_at", "a.created_at"),
];

#[derive(Debug, Clone, FromRow)]
pub struct DbAgent {
    pub id: Uuid,
    pub matricule: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub hash: String,
    pub is_active: bool,
    pub must_change_password: bool,
    pub created_at: DateTime<Utc>,
    pub role_id: Uuid,
    pub role_code: RoleCode,
    pub role_label: String,
    pub role_created_at: DateTime<Utc>,
}

impl DbAgent {
    pub fn is_admin(&self) -> bool {
        self.role_code == RoleCode::Admin
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id,
            matricule: self.matricule.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    pub fn into_agent(self) -> Agent {
        Agent {
            id: self.id,
            matricule: self.matricule,
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username,
            email: self.email,
            is_active: self.is_active,
            must_change_password: self.must_change_password,
            created_at: self.created_at,
            role: Role {
                id: self.role_id,
                code: self.role_code,
                label: self.role_label,
                created_at: self.role_created_at,
            },
        }
    }
}

pub struct NewAgent<'a> {
    pub matricule: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role_id: Uuid,
    pub hash: &'a str,
    pub is_active: bool,
}

#[derive(Debug, Default)]
pub struct AgentPatch {
    pub matricule: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

pub async fn find_agent_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbAgent>> {
    let sql = format!("SELECT {AGENT_COLUMNS} FROM agents a JOIN roles r ON r.id = a.role_id WHERE a.id = $1");
    let agent = sqlx::query_as::<_, DbAgent>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(agent)
}

pub async fn find_agent_by_username(pool: &PgPool, username: &str) -> Result<Option<DbAgent>> {
    let sql = format!(
        "SELECT {AGENT_COLUMNS} FROM agents a JOIN roles r ON r.id = a.role_id WHERE lower(a.username) = lower($1)"
    );
    let agent = sqlx::query_as::<_, DbAgent>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(agent)
}

pub async fn list_agents(
    pool: &PgPool,
    is_active: Option<bool>,
    ordering: Option<&str>,
) -> Result<Vec<DbAgent>> {
    let order = order_by(ordering, AGENT_ORDERING, "a.last_name ASC, a.first_name ASC");
    let sql = format!(
        "SELECT {AGENT_COLUMNS} FROM agents a JOIN roles r ON r.id = a.role_id
         WHERE ($1::BOOLEAN IS NULL OR a.is_active = $1)
         {order}"
    );
    let agents = sqlx::query_as::<_, DbAgent>(&sql)
        .bind(is_active)
        .fetch_all(pool)
        .await?;
    Ok(agents)
}

/// Agents with at least one evaluation in the form, as evaluator or evaluated.
pub async fn list_form_participants(pool: &PgPool, form_id: Uuid) -> Result<Vec<DbAgent>> {
    let sql = format!(
        "SELECT {AGENT_COLUMNS} FROM agents a JOIN roles r ON r.id = a.role_id
         WHERE a.id IN (
             SELECT evaluator_id FROM evaluations WHERE form_id = $1
             UNION
             SELECT evaluated_id FROM evaluations WHERE form_id = $1
         )
         ORDER BY a.last_name ASC, a.first_name ASC"
    );
    let agents = sqlx::query_as::<_, DbAgent>(&sql)
        .bind(form_id)
        .fetch_all(pool)
        .await?;
    Ok(agents)
}

pub async fn insert_agent(pool: &PgPool, agent: NewAgent<'_>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO agents (id, matricule, username, email, first_name, last_name, role_id, hash, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(agent.matricule)
    .bind(agent.username)
    .bind(agent.email)
    .bind(agent.first_name)
    .bind(agent.last_name)
    .bind(agent.role_id)
    .bind(agent.hash)
    .bind(agent.is_active)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Returns false when no agent has this id.
pub async fn update_agent(pool: &PgPool, id: Uuid, patch: AgentPatch) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE agents
        SET matricule = COALESCE($2, matricule),
            username = COALESCE($3, username),
            email = COALESCE($4, email),
            first_name = COALESCE($5, first_name),
            last_name = COALESCE($6, last_name),
            role_id = COALESCE($7, role_id),
            is_active = COALESCE($8, is_active),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(patch.matricule)
    .bind(patch.username)
    .bind(patch.email)
    .bind(patch.first_name)
    .bind(patch.last_name)
    .bind(patch.role_id)
    .bind(patch.is_active)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn deactivate_agent(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE agents SET is_active = FALSE, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_password(pool: &PgPool, id: Uuid, hash: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE agents
        SET hash = $2, must_change_password = FALSE, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_active_agents(pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agents WHERE is_active")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Active agents among `ids`; used to validate campaign participants.
pub async fn active_agent_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>> {
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM agents WHERE is_active AND id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await?;
    Ok(found)
}
