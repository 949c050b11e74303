//! Printable quarterly documents: the scorecard of one evaluation and the
//! end-of-campaign bulletin of one agent.

use crate::domain::models::{AgentSummary, Answer, Evaluation, FormQuestion, FormSummary};
use crate::domain::scoring::{aggregate, round_to, ScoredItem};
use crate::domain::stats::RecapAnswer;
use askama::Template;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub const DEFAULT_CITY: &str = "Abidjan";

#[derive(Debug, Clone, PartialEq)]
pub struct ScorecardRow {
    pub label: String,
    /// Empty while the question is unanswered.
    pub score: String,
    pub weight: i32,
    pub total: i64,
}

#[derive(Template)]
#[template(path = "scorecard.html")]
pub struct Scorecard {
    pub doc_id: String,
    pub city: String,
    pub issued_on: String,
    pub form_title: String,
    pub agent_name: String,
    pub matricule: String,
    pub rows: Vec<ScorecardRow>,
    pub total_weight: i64,
    pub total_points: i64,
    pub average: String,
    pub global_score: i64,
    pub evaluator_name: String,
    pub submitted_on: String,
}

fn french_date(at: DateTime<Utc>) -> String {
    at.format("%d/%m/%Y").to_string()
}

/// Short printable reference derived from the evaluation id.
pub fn document_id(evaluation_id: Uuid) -> String {
    let simple = evaluation_id.simple().to_string();
    format!("EVAL-{}", simple[..8].to_uppercase())
}

impl Scorecard {
    /// Rows follow the form's question order; answers to questions no longer on
    /// the form are ignored.
    pub fn build(
        evaluation: &Evaluation,
        questions: &[FormQuestion],
        answers: &[Answer],
        now: DateTime<Utc>,
    ) -> Self {
        let scores: HashMap<Uuid, i16> = answers
            .iter()
            .map(|a| (a.question.id, a.score))
            .collect();

        let mut items = Vec::with_capacity(questions.len());
        let rows = questions
            .iter()
            .map(|fq| {
                let weight = fq.question.weight;
                let score = scores.get(&fq.question.id).copied();
                items.push(match score {
                    Some(score) => ScoredItem::answered(score, weight),
                    None => ScoredItem::unanswered(weight),
                });
                ScorecardRow {
                    label: fq.question.label.clone(),
                    score: score.map(|s| s.to_string()).unwrap_or_default(),
                    weight,
                    total: score.map(|s| i64::from(s) * i64::from(weight)).unwrap_or(0),
                }
            })
            .collect();

        let agg = aggregate(items);

        Scorecard {
            doc_id: document_id(evaluation.id),
            city: DEFAULT_CITY.to_string(),
            issued_on: french_date(now),
            form_title: evaluation.form.title.clone(),
            agent_name: evaluation.evaluated.full_name(),
            matricule: evaluation.evaluated.matricule.clone(),
            rows,
            total_weight: agg.total_weight,
            total_points: agg.total_points,
            average: format!("{:.2}", agg.weighted_average),
            global_score: agg.global_score,
            evaluator_name: evaluation.evaluator.full_name(),
            submitted_on: evaluation
                .submitted_at
                .map(french_date)
                .unwrap_or_default(),
        }
    }

    /// Divisor printed next to the average, never zero.
    pub fn divisor(&self) -> i64 {
        self.total_weight.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalRecapRow {
    pub label: String,
    pub weight: i32,
    pub answers: i64,
    /// Mean score of the question across reviews, two decimals.
    pub average_score: f64,
    pub total: f64,
}

/// Every submitted evaluation an agent received in one campaign, folded into
/// one bulletin. Rows group answers by question label and weight.
#[derive(Debug, Serialize, Template)]
#[template(path = "final_recap.html")]
pub struct FinalRecap {
    pub doc_id: String,
    pub city: String,
    pub issued_on: String,
    pub form: FormSummary,
    pub agent: AgentSummary,
    pub agent_name: String,
    pub matricule: String,
    pub reviews: i64,
    pub rows: Vec<FinalRecapRow>,
    pub total_weight: i64,
    pub total_points: f64,
    pub average: f64,
    pub global_score: i64,
}

impl FinalRecap {
    /// `answers` are expected in form question order; rows keep the order in
    /// which each (label, weight) first shows up.
    pub fn build(form: FormSummary, agent: AgentSummary, answers: &[RecapAnswer], now: DateTime<Utc>) -> Self {
        let mut order: Vec<(String, i32)> = Vec::new();
        let mut grouped: HashMap<(String, i32), Vec<i16>> = HashMap::new();
        for answer in answers {
            let key = (answer.label.clone(), answer.weight);
            grouped
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(answer.score);
        }

        let rows: Vec<FinalRecapRow> = order
            .into_iter()
            .filter_map(|key| {
                let scores = grouped.remove(&key)?;
                let (label, weight) = key;
                let count = scores.len() as i64;
                let sum: i64 = scores.iter().map(|&s| i64::from(s)).sum();
                let mean = sum as f64 / count as f64;
                Some(FinalRecapRow {
                    label,
                    weight,
                    answers: count,
                    average_score: round_to(mean, 2),
                    total: round_to(mean * f64::from(weight), 2),
                })
            })
            .collect();

        let reviews = answers
            .iter()
            .map(|a| a.evaluation_id)
            .collect::<HashSet<_>>()
            .len() as i64;
        // Pooled over every answer, so it matches the agent's dashboard score.
        let agg = aggregate(answers.iter().map(ScoredItem::from));

        FinalRecap {
            doc_id: format!("FINAL-{}-{}", form.period, agent.matricule),
            city: DEFAULT_CITY.to_string(),
            issued_on: french_date(now),
            agent_name: agent.full_name(),
            matricule: agent.matricule.clone(),
            total_weight: rows.iter().map(|r| i64::from(r.weight)).sum(),
            total_points: round_to(rows.iter().map(|r| r.total).sum(), 2),
            average: agg.weighted_average,
            global_score: agg.global_score,
            form,
            agent,
            reviews,
            rows,
        }
    }

    pub fn divisor(&self) -> i64 {
        self.total_weight.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentSummary, EvaluationStatus, FormSummary, Question};
    use chrono::TimeZone;

    fn agent(first: &str, last: &str, matricule: &str) -> AgentSummary {
        AgentSummary {
            id: Uuid::new_v4(),
            matricule: matricule.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    fn question(label: &str, weight: i32) -> Question {
        Question {
            id: Uuid::new_v4(),
            label: label.to_string(),
            description: None,
            weight,
            is_active: true,
            category: None,
            created_at: Utc::now(),
        }
    }

    fn evaluation() -> Evaluation {
        Evaluation {
            id: Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap(),
            form: FormSummary {
                id: Uuid::new_v4(),
                title: "2025-T1".into(),
                period: "2025-T1".into(),
                is_active: true,
            },
            evaluator: agent("Awa", "Kone", "M-2"),
            evaluated: agent("Jean", "Yao", "M-1"),
            status: EvaluationStatus::Submitted,
            submitted_at: Some(Utc.with_ymd_and_hms(2025, 3, 28, 10, 0, 0).unwrap()),
        }
    }

    fn answer(evaluation_id: Uuid, question: &Question, score: i16) -> Answer {
        Answer {
            id: Uuid::new_v4(),
            evaluation_id,
            question: question.clone(),
            score,
            comment: None,
        }
    }

    #[test]
    fn test_build_totals() {
        let eval = evaluation();
        let qs = [question("Rigueur", 2), question("Ponctualite", 1), question("Esprit d'equipe", 1)];
        let form_questions: Vec<FormQuestion> = qs
            .iter()
            .enumerate()
            .map(|(i, q)| FormQuestion {
                id: Uuid::new_v4(),
                position: i as i32 + 1,
                question: q.clone(),
            })
            .collect();
        let answers = vec![
            answer(eval.id, &qs[0], 4),
            answer(eval.id, &qs[1], 3),
            answer(eval.id, &qs[2], 2),
        ];

        let card = Scorecard::build(&eval, &form_questions, &answers, Utc::now());
        assert_eq!(card.total_weight, 4);
        assert_eq!(card.total_points, 13);
        assert_eq!(card.average, "3.25");
        assert_eq!(card.global_score, 3);
        assert_eq!(card.rows[0].total, 8);
        assert_eq!(card.agent_name, "Yao Jean");
        assert_eq!(card.evaluator_name, "Kone Awa");
        assert_eq!(card.submitted_on, "28/03/2025");
        assert_eq!(card.doc_id, "EVAL-A1B2C3D4");
    }

    #[test]
    fn test_unanswered_rows_are_blank() {
        let eval = evaluation();
        let q = question("Rigueur", 3);
        let form_questions = vec![FormQuestion {
            id: Uuid::new_v4(),
            position: 1,
            question: q,
        }];
        let card = Scorecard::build(&eval, &form_questions, &[], Utc::now());
        assert_eq!(card.rows[0].score, "");
        assert_eq!(card.rows[0].total, 0);
        assert_eq!(card.average, "0.00");
        assert_eq!(card.divisor(), 1);
    }

    #[test]
    fn test_render_contains_layout() {
        let eval = evaluation();
        let q = question("Rigueur & methode", 2);
        let form_questions = vec![FormQuestion {
            id: Uuid::new_v4(),
            position: 1,
            question: q.clone(),
        }];
        let answers = vec![answer(eval.id, &q, 4)];
        let html = Scorecard::build(&eval, &form_questions, &answers, Utc::now())
            .render()
            .unwrap();

        assert!(html.contains("GRILLE DE NOTATION TRIMESTRIELLE"));
        assert!(html.contains("Rigueur &amp; methode"));
        assert!(html.contains("M-1"));
        assert!(html.contains("4.00"));
        assert!(html.contains("EVAL-A1B2C3D4"));
    }

    fn recap_answer(evaluation_id: Uuid, label: &str, weight: i32, score: i16) -> RecapAnswer {
        RecapAnswer {
            evaluation_id,
            label: label.to_string(),
            weight,
            score,
        }
    }

    #[test]
    fn test_final_recap_groups_by_question() {
        let eval = evaluation();
        let (r1, r2) = (Uuid::new_v4(), Uuid::new_v4());
        let answers = vec![
            recap_answer(r1, "Rigueur", 2, 4),
            recap_answer(r2, "Rigueur", 2, 3),
            recap_answer(r1, "Ponctualite", 1, 3),
            recap_answer(r2, "Ponctualite", 1, 2),
        ];

        let recap = FinalRecap::build(eval.form.clone(), eval.evaluated.clone(), &answers, Utc::now());
        assert_eq!(recap.doc_id, "FINAL-2025-T1-M-1");
        assert_eq!(recap.reviews, 2);
        assert_eq!(recap.rows.len(), 2);
        assert_eq!(recap.rows[0].label, "Rigueur");
        assert_eq!(recap.rows[0].answers, 2);
        assert_eq!(recap.rows[0].average_score, 3.5);
        assert_eq!(recap.rows[0].total, 7.0);
        assert_eq!(recap.rows[1].average_score, 2.5);
        assert_eq!(recap.total_weight, 3);
        assert_eq!(recap.total_points, 9.5);
        // (8 + 6 + 3 + 2) / (2 + 2 + 1 + 1)
        assert_eq!(recap.average, 3.17);
        assert_eq!(recap.global_score, 3);
        assert_eq!(recap.divisor(), 3);
    }

    #[test]
    fn test_final_recap_keeps_same_label_with_other_weight_apart() {
        let eval = evaluation();
        let r = Uuid::new_v4();
        let answers = vec![recap_answer(r, "Rigueur", 2, 4), recap_answer(r, "Rigueur", 3, 1)];
        let recap = FinalRecap::build(eval.form.clone(), eval.evaluated.clone(), &answers, Utc::now());
        assert_eq!(recap.rows.len(), 2);
        assert_eq!(recap.rows[1].weight, 3);
        assert_eq!(recap.reviews, 1);
    }

    #[test]
    fn test_final_recap_without_reviews() {
        let eval = evaluation();
        let recap = FinalRecap::build(eval.form.clone(), eval.evaluated.clone(), &[], Utc::now());
        assert!(recap.rows.is_empty());
        assert_eq!(recap.reviews, 0);
        assert_eq!(recap.average, 0.0);
        assert_eq!(recap.global_score, 0);
        assert_eq!(recap.divisor(), 1);

        let html = recap.render().unwrap();
        assert!(html.contains("FINAL-2025-T1-M-1"));
        assert!(html.contains("0.00"));
    }

    #[test]
    fn test_final_recap_renders_and_serializes() {
        let eval = evaluation();
        let answers = vec![recap_answer(Uuid::new_v4(), "Esprit d'equipe", 1, 4)];
        let recap = FinalRecap::build(eval.form.clone(), eval.evaluated.clone(), &answers, Utc::now());

        let html = recap.render().unwrap();
        assert!(html.contains("GRILLE DE NOTATION TRIMESTRIELLE"));
        assert!(html.contains("Yao Jean"));
        assert!(html.contains("4.00"));

        let json = serde_json::to_value(&recap).unwrap();
        assert_eq!(json["doc_id"], "FINAL-2025-T1-M-1");
        assert_eq!(json["rows"][0]["average_score"], 4.0);
        assert_eq!(json["agent"]["matricule"], "M-1");
    }
}
