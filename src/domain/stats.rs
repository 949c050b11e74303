//! Campaign and agent aggregates built from raw evaluation and answer rows.
//!
//! Everything here is pure: the db layer fetches the rows for one form and the
//! handlers feed them through these functions.

use crate::domain::models::{
    AdminCampaignAgentStats, AgentCategoryScore, AgentSummary, DashboardSummary, Evaluation,
    EvaluationNotee, QuestionCategory,
};
use crate::domain::scoring::{
    aggregate, completion_pct, CampaignRollup, EvaluationAggregate, EvaluationProgress, ScoredItem,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct EvaluationFacts {
    pub id: Uuid,
    pub evaluator_id: Uuid,
    pub evaluated_id: Uuid,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl EvaluationFacts {
    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

impl From<&EvaluationFacts> for EvaluationProgress {
    fn from(facts: &EvaluationFacts) -> Self {
        EvaluationProgress {
            evaluator_id: facts.evaluator_id,
            evaluated_id: facts.evaluated_id,
            submitted: facts.is_submitted(),
        }
    }
}

/// One answer joined with the weight and category of its question.
#[derive(Debug, Clone, FromRow)]
pub struct ScoreRow {
    pub evaluation_id: Uuid,
    pub question_id: Uuid,
    pub category_id: Option<Uuid>,
    pub score: i16,
    pub weight: i32,
}

impl From<&ScoreRow> for ScoredItem {
    fn from(row: &ScoreRow) -> Self {
        ScoredItem::answered(row.score, row.weight)
    }
}

/// One answer an agent received, with the label and weight of its question.
#[derive(Debug, Clone, FromRow)]
pub struct RecapAnswer {
    pub evaluation_id: Uuid,
    pub label: String,
    pub weight: i32,
    pub score: i16,
}

impl From<&RecapAnswer> for ScoredItem {
    fn from(row: &RecapAnswer) -> Self {
        ScoredItem::answered(row.score, row.weight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentScore {
    pub global_score: f64,
    pub total_reviews: i64,
}

pub fn rollup(evaluations: &[EvaluationFacts]) -> CampaignRollup {
    let progress: Vec<EvaluationProgress> = evaluations.iter().map(EvaluationProgress::from).collect();
    CampaignRollup::from_evaluations(&progress)
}

pub fn evaluation_aggregates(rows: &[ScoreRow]) -> HashMap<Uuid, EvaluationAggregate> {
    let mut grouped: HashMap<Uuid, Vec<ScoredItem>> = HashMap::new();
    for row in rows {
        grouped.entry(row.evaluation_id).or_default().push(row.into());
    }
    grouped
        .into_iter()
        .map(|(id, items)| (id, aggregate(items)))
        .collect()
}

pub fn notee(
    evaluation: Evaluation,
    expected_questions: i64,
    aggregates: &HashMap<Uuid, EvaluationAggregate>,
) -> EvaluationNotee {
    let agg = aggregates
        .get(&evaluation.id)
        .copied()
        .unwrap_or_else(EvaluationAggregate::empty);
    EvaluationNotee {
        evaluation,
        completion_pct: completion_pct(agg.answered, expected_questions),
        weighted_avg_score: agg.weighted_average,
        global_score: agg.global_score,
    }
}

/// Pooled weighted average of every answer in the submitted evaluations each
/// agent received.
pub fn received_scores(
    evaluations: &[EvaluationFacts],
    rows: &[ScoreRow],
) -> HashMap<Uuid, AgentScore> {
    let submitted: HashMap<Uuid, Uuid> = evaluations
        .iter()
        .filter(|e| e.is_submitted())
        .map(|e| (e.id, e.evaluated_id))
        .collect();

    let mut reviews: HashMap<Uuid, i64> = HashMap::new();
    for evaluated in submitted.values() {
        *reviews.entry(*evaluated).or_default() += 1;
    }

    let mut items: HashMap<Uuid, Vec<ScoredItem>> = HashMap::new();
    for row in rows {
        if let Some(evaluated) = submitted.get(&row.evaluation_id) {
            items.entry(*evaluated).or_default().push(row.into());
        }
    }

    reviews
        .into_iter()
        .map(|(agent, total_reviews)| {
            let agg = items
                .remove(&agent)
                .map(aggregate)
                .unwrap_or_else(EvaluationAggregate::empty);
            (
                agent,
                AgentScore {
                    global_score: agg.weighted_average,
                    total_reviews,
                },
            )
        })
        .collect()
}

pub fn category_scores(
    agent_id: Uuid,
    form_id: Uuid,
    categories: &[QuestionCategory],
    evaluations: &[EvaluationFacts],
    rows: &[ScoreRow],
) -> Vec<AgentCategoryScore> {
    let received: HashSet<Uuid> = evaluations
        .iter()
        .filter(|e| e.evaluated_id == agent_id && e.is_submitted())
        .map(|e| e.id)
        .collect();

    let mut by_category: HashMap<Uuid, Vec<ScoredItem>> = HashMap::new();
    for row in rows {
        if !received.contains(&row.evaluation_id) {
            continue;
        }
        if let Some(category_id) = row.category_id {
            by_category.entry(category_id).or_default().push(row.into());
        }
    }

    categories
        .iter()
        .filter_map(|category| {
            let items = by_category.remove(&category.id)?;
            let agg = aggregate(items);
            Some(AgentCategoryScore {
                agent_id,
                form_id,
                category_id: category.id,
                category_code: category.code.clone(),
                category_label: category.label.clone(),
                avg_score: agg.weighted_average,
                total_answers: agg.answered,
            })
        })
        .collect()
}

pub fn dashboard_summary(
    agent_id: Uuid,
    evaluations: &[EvaluationFacts],
    rows: &[ScoreRow],
) -> DashboardSummary {
    let assigned: Vec<&EvaluationFacts> = evaluations
        .iter()
        .filter(|e| e.evaluated_id == agent_id)
        .collect();
    let given: Vec<&EvaluationFacts> = evaluations
        .iter()
        .filter(|e| e.evaluator_id == agent_id)
        .collect();

    let total_assigned = assigned.len() as i64;
    let total_completed = assigned.iter().filter(|e| e.is_submitted()).count() as i64;
    let total_given = given.iter().filter(|e| e.is_submitted()).count() as i64;
    let total_to_given = given.len() as i64 - total_given;

    let score = received_scores(evaluations, rows)
        .remove(&agent_id)
        .unwrap_or(AgentScore {
            global_score: 0.0,
            total_reviews: 0,
        });

    DashboardSummary {
        total_assigned,
        total_completed,
        total_pending: total_assigned - total_completed,
        total_given,
        total_to_given,
        weighted_score: score.global_score,
        total_reviews: score.total_reviews,
        completion_rate: completion_pct(total_given, total_given + total_to_given),
    }
}

pub fn agent_stats(
    form_id: Uuid,
    agents: &[AgentSummary],
    evaluations: &[EvaluationFacts],
    rows: &[ScoreRow],
) -> Vec<AdminCampaignAgentStats> {
    let scores = received_scores(evaluations, rows);
    let mut done: HashMap<Uuid, i64> = HashMap::new();
    for evaluation in evaluations.iter().filter(|e| e.is_submitted()) {
        *done.entry(evaluation.evaluator_id).or_default() += 1;
    }

    agents
        .iter()
        .map(|agent| {
            let score = scores.get(&agent.id);
            AdminCampaignAgentStats {
                form_id,
                agent: agent.clone(),
                evaluations_received: score.map(|s| s.total_reviews).unwrap_or(0),
                evaluations_done: done.get(&agent.id).copied().unwrap_or(0),
                global_score: score.map(|s| s.global_score).unwrap_or(0.0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(evaluator: Uuid, evaluated: Uuid, submitted: bool) -> EvaluationFacts {
        EvaluationFacts {
            id: Uuid::new_v4(),
            evaluator_id: evaluator,
            evaluated_id: evaluated,
            submitted_at: submitted.then(Utc::now),
        }
    }

    fn row(evaluation: &EvaluationFacts, category: Option<Uuid>, score: i16, weight: i32) -> ScoreRow {
        ScoreRow {
            evaluation_id: evaluation.id,
            question_id: Uuid::new_v4(),
            category_id: category,
            score,
            weight,
        }
    }

    fn category(code: &str) -> QuestionCategory {
        QuestionCategory {
            id: Uuid::new_v4(),
            code: code.to_string(),
            label: code.to_uppercase(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_received_scores_pool_submitted_only() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let from_b = facts(b, a, true);
        let from_c = facts(c, a, false);
        let rows = vec![
            row(&from_b, None, 4, 3),
            row(&from_b, None, 2, 1),
            row(&from_c, None, 1, 5),
        ];
        let scores = received_scores(&[from_b, from_c], &rows);
        let score = scores[&a];
        assert_eq!(score.total_reviews, 1);
        assert_eq!(score.global_score, 3.5);
        assert!(!scores.contains_key(&b));
    }

    #[test]
    fn test_dashboard_summary() {
        let (me, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let evaluations = vec![
            facts(b, me, true),
            facts(c, me, false),
            facts(me, b, true),
            facts(me, c, false),
            facts(b, c, true),
        ];
        let rows = vec![row(&evaluations[0], None, 3, 2)];
        let summary = dashboard_summary(me, &evaluations, &rows);
        assert_eq!(summary.total_assigned, 2);
        assert_eq!(summary.total_completed, 1);
        assert_eq!(summary.total_pending, 1);
        assert_eq!(summary.total_given, 1);
        assert_eq!(summary.total_to_given, 1);
        assert_eq!(summary.weighted_score, 3.0);
        assert_eq!(summary.total_reviews, 1);
        assert_eq!(summary.completion_rate, 50);
    }

    #[test]
    fn test_dashboard_summary_without_evaluations() {
        let summary = dashboard_summary(Uuid::new_v4(), &[], &[]);
        assert_eq!(summary.total_assigned, 0);
        assert_eq!(summary.weighted_score, 0.0);
        assert_eq!(summary.completion_rate, 0);
    }

    #[test]
    fn test_category_scores() {
        let (me, b) = (Uuid::new_v4(), Uuid::new_v4());
        let form_id = Uuid::new_v4();
        let rigor = category("rigor");
        let team = category("team");
        let unused = category("unused");
        let evaluation = facts(b, me, true);
        let rows = vec![
            row(&evaluation, Some(rigor.id), 4, 2),
            row(&evaluation, Some(rigor.id), 1, 1),
            row(&evaluation, Some(team.id), 2, 1),
            row(&evaluation, None, 1, 1),
        ];
        let scores = category_scores(
            me,
            form_id,
            &[rigor.clone(), team.clone(), unused],
            &[evaluation],
            &rows,
        );
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].category_code, "rigor");
        assert_eq!(scores[0].avg_score, 3.0);
        assert_eq!(scores[0].total_answers, 2);
        assert_eq!(scores[1].category_id, team.id);
        assert_eq!(scores[1].avg_score, 2.0);
    }

    #[test]
    fn test_agent_stats_cover_every_agent() {
        let agents: Vec<AgentSummary> = (0..3)
            .map(|i| AgentSummary {
                id: Uuid::new_v4(),
                matricule: format!("M{i}"),
                first_name: "A".into(),
                last_name: "B".into(),
            })
            .collect();
        let first = facts(agents[0].id, agents[1].id, true);
        let rows = vec![row(&first, None, 4, 1)];
        let stats = agent_stats(Uuid::new_v4(), &agents, &[first], &rows);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].evaluations_done, 1);
        assert_eq!(stats[0].evaluations_received, 0);
        assert_eq!(stats[1].evaluations_received, 1);
        assert_eq!(stats[1].global_score, 4.0);
        assert_eq!(stats[2].global_score, 0.0);
    }

    #[test]
    fn test_rollup_from_facts() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let result = rollup(&[facts(a, b, true), facts(b, a, false)]);
        assert_eq!(result.total_agents, 2);
        assert_eq!(result.total_expected_evaluations, 2);
        assert_eq!(result.total_submitted_evaluations, 1);
        assert_eq!(result.completion_rate, 50.0);
    }
}
