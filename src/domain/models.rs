use crate::domain::scoring::CampaignRollup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "role_code", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum RoleCode {
    Admin,
    Agent,
}

impl RoleCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleCode::Admin => "ADMIN",
            RoleCode::Agent => "AGENT",
        }
    }
}

impl TryFrom<&str> for RoleCode {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "ADMIN" => Ok(RoleCode::Admin),
            "AGENT" => Ok(RoleCode::Agent),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Pending,
    Submitted,
}

impl EvaluationStatus {
    pub fn from_submitted_at(submitted_at: Option<DateTime<Utc>>) -> Self {
        if submitted_at.is_some() {
            EvaluationStatus::Submitted
        } else {
            EvaluationStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub code: RoleCode,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: Uuid,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub must_change_password: bool,
    pub created_at: DateTime<Utc>,
    pub role: Role,
}

/// Agent fields safe to show to any colleague.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSummary {
    pub id: Uuid,
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
}

impl AgentSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name).trim().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionCategory {
    pub id: Uuid,
    pub code: String,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub label: String,
    pub description: Option<String>,
    pub weight: i32,
    pub is_active: bool,
    pub category: Option<QuestionCategory>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormQuestion {
    pub id: Uuid,
    pub position: i32,
    pub question: Question,
}

#[derive(Debug, Clone, Serialize)]
pub struct Form {
    pub id: Uuid,
    pub title: String,
    pub period: String,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub questions: Vec<FormQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormSummary {
    pub id: Uuid,
    pub title: String,
    pub period: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub form: FormSummary,
    pub evaluator: AgentSummary,
    pub evaluated: AgentSummary,
    pub status: EvaluationStatus,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub id: Uuid,
    pub evaluation_id: Uuid,
    pub question: Question,
    pub score: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationNotee {
    pub evaluation: Evaluation,
    pub completion_pct: i64,
    pub weighted_avg_score: f64,
    pub global_score: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminCampaignStats {
    pub form: FormSummary,
    #[serde(flatten)]
    pub rollup: CampaignRollup,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminCampaignAgentStats {
    pub form_id: Uuid,
    pub agent: AgentSummary,
    pub evaluations_received: i64,
    pub evaluations_done: i64,
    pub global_score: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentCategoryScore {
    pub agent_id: Uuid,
    pub form_id: Uuid,
    pub category_id: Uuid,
    pub category_code: String,
    pub category_label: String,
    pub avg_score: f64,
    pub total_answers: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardSummary {
    pub total_assigned: i64,
    pub total_completed: i64,
    pub total_pending: i64,
    pub total_given: i64,
    pub total_to_given: i64,
    pub weighted_score: f64,
    pub total_reviews: i64,
    pub completion_rate: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminGeneralStats {
    pub total_agents: i64,
    pub total_campaigns: i64,
    pub total_completed: i64,
    pub overall_completion: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}
