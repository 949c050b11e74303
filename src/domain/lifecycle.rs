//! Rules of the one-way evaluation lifecycle: pending until submitted, then
//! frozen.

use crate::domain::models::{Evaluation, EvaluationStatus};
use crate::domain::stats::EvaluationFacts;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRejection {
    Missing,
    NotEvaluator,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("evaluation already submitted")]
    AlreadySubmitted,
    #[error("answer every question before submitting ({answered}/{expected})")]
    Incomplete { answered: i64, expected: i64 },
}

/// Evaluations the evaluator still has to fill in, in the order given.
pub fn pending(evaluations: Vec<Evaluation>) -> Vec<Evaluation> {
    evaluations
        .into_iter()
        .filter(|e| e.status == EvaluationStatus::Pending)
        .collect()
}

/// Why `agent_id` may not write answers on `target`, if anything.
pub fn write_rejection(target: Option<&EvaluationFacts>, agent_id: Uuid) -> Option<WriteRejection> {
    match target {
        None => Some(WriteRejection::Missing),
        Some(e) if e.evaluator_id != agent_id => Some(WriteRejection::NotEvaluator),
        Some(e) if e.is_submitted() => Some(WriteRejection::Submitted),
        Some(_) => None,
    }
}

/// Submission needs a pending evaluation with every form question answered.
/// A form without questions can never be submitted.
pub fn check_submittable(submitted: bool, answered: i64, expected: i64) -> Result<(), SubmitError> {
    if submitted {
        return Err(SubmitError::AlreadySubmitted);
    }
    if expected == 0 || answered < expected {
        return Err(SubmitError::Incomplete { answered, expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentSummary, FormSummary};
    use chrono::Utc;

    fn summary(last_name: &str) -> AgentSummary {
        AgentSummary {
            id: Uuid::new_v4(),
            matricule: format!("M-{last_name}"),
            first_name: "A".into(),
            last_name: last_name.into(),
        }
    }

    fn evaluation(evaluated: &str, submitted: bool) -> Evaluation {
        let submitted_at = submitted.then(Utc::now);
        Evaluation {
            id: Uuid::new_v4(),
            form: FormSummary {
                id: Uuid::nil(),
                title: "Trimestre 1 2025".into(),
                period: "2025-T1".into(),
                is_active: true,
            },
            evaluator: summary("Kone"),
            evaluated: summary(evaluated),
            status: EvaluationStatus::from_submitted_at(submitted_at),
            submitted_at,
        }
    }

    fn facts(evaluator_id: Uuid, submitted: bool) -> EvaluationFacts {
        EvaluationFacts {
            id: Uuid::new_v4(),
            evaluator_id,
            evaluated_id: Uuid::new_v4(),
            submitted_at: submitted.then(Utc::now),
        }
    }

    #[test]
    fn test_submitted_never_pending() {
        let rows = vec![
            evaluation("Yao", false),
            evaluation("Bamba", true),
            evaluation("Diallo", false),
        ];
        let left = pending(rows);
        let names: Vec<&str> = left.iter().map(|e| e.evaluated.last_name.as_str()).collect();
        assert_eq!(names, ["Yao", "Diallo"]);

        assert!(pending(vec![evaluation("Bamba", true)]).is_empty());
    }

    #[test]
    fn test_writes_only_by_evaluator_while_pending() {
        let me = Uuid::new_v4();
        assert_eq!(write_rejection(None, me), Some(WriteRejection::Missing));
        assert_eq!(
            write_rejection(Some(&facts(Uuid::new_v4(), false)), me),
            Some(WriteRejection::NotEvaluator)
        );
        assert_eq!(
            write_rejection(Some(&facts(me, true)), me),
            Some(WriteRejection::Submitted)
        );
        assert_eq!(write_rejection(Some(&facts(me, false)), me), None);
    }

    #[test]
    fn test_submit_is_one_way() {
        assert_eq!(check_submittable(false, 3, 3), Ok(()));
        // second submit of the same, complete evaluation
        assert_eq!(check_submittable(true, 3, 3), Err(SubmitError::AlreadySubmitted));
        assert_eq!(check_submittable(true, 0, 3), Err(SubmitError::AlreadySubmitted));
    }

    #[test]
    fn test_submit_requires_every_answer() {
        let err = check_submittable(false, 2, 3).unwrap_err();
        assert_eq!(err.to_string(), "answer every question before submitting (2/3)");
        assert!(check_submittable(false, 0, 0).is_err());
    }
}
