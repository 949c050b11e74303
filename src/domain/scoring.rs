use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Lowest score an answer may carry.
pub const MIN_SCORE: i16 = 1;
/// Highest score an answer may carry.
pub const MAX_SCORE: i16 = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("score {0} is outside 1..=4")]
    OutOfRange(i16),
    #[error("weight must be a positive integer")]
    Weight,
}

pub fn validate_score(score: i16) -> Result<i16, ScoreError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(ScoreError::OutOfRange(score))
    }
}

pub fn validate_weight(weight: i32) -> Result<i32, ScoreError> {
    if weight >= 1 {
        Ok(weight)
    } else {
        Err(ScoreError::Weight)
    }
}

/// One form question as seen by the aggregator. `score` is `None` while unanswered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredItem {
    pub score: Option<i16>,
    pub weight: i32,
}

impl ScoredItem {
    pub fn answered(score: i16, weight: i32) -> Self {
        Self {
            score: Some(score),
            weight,
        }
    }

    pub fn unanswered(weight: i32) -> Self {
        Self { score: None, weight }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationAggregate {
    pub total_weight: i64,
    pub total_points: i64,
    /// Rounded to two decimals.
    pub weighted_average: f64,
    pub global_score: i64,
    pub answered: i64,
}

impl EvaluationAggregate {
    pub fn empty() -> Self {
        Self {
            total_weight: 0,
            total_points: 0,
            weighted_average: 0.0,
            global_score: 0,
            answered: 0,
        }
    }
}

/// Rounds half away from zero, which is half-up for the non-negative values
/// this module produces.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Weighted aggregate of one evaluation. Unanswered entries contribute
/// neither points nor weight.
pub fn aggregate<I>(items: I) -> EvaluationAggregate
where
    I: IntoIterator<Item = ScoredItem>,
{
    let mut total_weight = 0i64;
    let mut total_points = 0i64;
    let mut answered = 0i64;

    for item in items {
        if let Some(score) = item.score {
            total_weight += i64::from(item.weight);
            total_points += i64::from(score) * i64::from(item.weight);
            answered += 1;
        }
    }

    if total_weight <= 0 {
        return EvaluationAggregate {
            answered,
            ..EvaluationAggregate::empty()
        };
    }

    let weighted_average = round_to(total_points as f64 / total_weight as f64, 2);
    // The global note is taken from the displayed two-decimal average.
    let global_score = weighted_average.round() as i64;

    EvaluationAggregate {
        total_weight,
        total_points,
        weighted_average,
        global_score,
        answered,
    }
}

/// `round(100 * answered / expected)`, or 0 when nothing is expected.
pub fn completion_pct(answered: i64, expected: i64) -> i64 {
    if expected <= 0 {
        return 0;
    }
    (100.0 * answered as f64 / expected as f64).round() as i64
}

/// Every participant rates every other participant once.
pub fn expected_evaluations(agents: i64) -> i64 {
    if agents < 2 {
        0
    } else {
        agents * (agents - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationProgress {
    pub evaluator_id: Uuid,
    pub evaluated_id: Uuid,
    pub submitted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CampaignRollup {
    pub total_agents: i64,
    pub total_expected_evaluations: i64,
    pub total_submitted_evaluations: i64,
    /// Percentage with one decimal.
    pub completion_rate: f64,
}

impl CampaignRollup {
    pub fn from_evaluations(evaluations: &[EvaluationProgress]) -> Self {
        let mut participants: HashSet<Uuid> = HashSet::new();
        let mut submitted = 0i64;
        for evaluation in evaluations {
            participants.insert(evaluation.evaluator_id);
            participants.insert(evaluation.evaluated_id);
            if evaluation.submitted {
                submitted += 1;
            }
        }

        let total_agents = participants.len() as i64;
        let expected = expected_evaluations(total_agents);
        let completion_rate = if expected > 0 {
            round_to(100.0 * submitted as f64 / expected as f64, 1)
        } else {
            0.0
        };

        Self {
            total_agents,
            total_expected_evaluations: expected,
            total_submitted_evaluations: submitted,
            completion_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answered(pairs: &[(i16, i32)]) -> Vec<ScoredItem> {
        pairs
            .iter()
            .map(|(score, weight)| ScoredItem::answered(*score, *weight))
            .collect()
    }

    #[test]
    fn test_half_rounds_up() {
        let agg = aggregate(answered(&[(4, 3), (2, 1)]));
        assert_eq!(agg.total_points, 14);
        assert_eq!(agg.total_weight, 4);
        assert_eq!(agg.weighted_average, 3.5);
        assert_eq!(agg.global_score, 4);
    }

    #[test]
    fn test_three_question_form() {
        let agg = aggregate(answered(&[(4, 2), (3, 1), (2, 1)]));
        assert_eq!(agg.total_points, 13);
        assert_eq!(agg.total_weight, 4);
        assert_eq!(agg.weighted_average, 3.25);
        assert_eq!(agg.global_score, 3);
        assert_eq!(agg.answered, 3);
    }

    #[test]
    fn test_unanswered_items_are_ignored() {
        let mut items = answered(&[(3, 2)]);
        items.push(ScoredItem::unanswered(5));
        let agg = aggregate(items);
        assert_eq!(agg.total_weight, 2);
        assert_eq!(agg.total_points, 6);
        assert_eq!(agg.weighted_average, 3.0);
        assert_eq!(agg.answered, 1);
    }

    #[test]
    fn test_empty_set_is_zero() {
        let agg = aggregate(Vec::new());
        assert_eq!(agg, EvaluationAggregate::empty());

        let agg = aggregate(vec![ScoredItem::unanswered(3), ScoredItem::unanswered(1)]);
        assert_eq!(agg.weighted_average, 0.0);
        assert_eq!(agg.global_score, 0);
        assert_eq!(completion_pct(0, 0), 0);
    }

    #[test]
    fn test_average_times_weight_matches_points() {
        let sets: Vec<Vec<(i16, i32)>> = vec![
            vec![(1, 1)],
            vec![(4, 7), (1, 3), (2, 2)],
            vec![(3, 1), (3, 1), (4, 1)],
            vec![(2, 5), (4, 9), (1, 1), (3, 2)],
        ];
        for set in sets {
            let agg = aggregate(answered(&set));
            let rebuilt = agg.weighted_average * agg.total_weight as f64;
            // Two-decimal rounding of the average bounds the error.
            assert!((rebuilt - agg.total_points as f64).abs() <= 0.005 * agg.total_weight as f64 + 1e-9);
        }
    }

    #[test]
    fn test_global_score_is_nearest_integer() {
        let agg = aggregate(answered(&[(3, 2), (2, 1)]));
        assert_eq!(agg.weighted_average, 2.67);
        assert_eq!(agg.global_score, 3);

        let agg = aggregate(answered(&[(1, 3), (2, 1)]));
        assert_eq!(agg.weighted_average, 1.25);
        assert_eq!(agg.global_score, 1);
    }

    #[test]
    fn test_completion_is_monotonic() {
        let expected = 7;
        let mut previous = completion_pct(0, expected);
        for answered in 1..=expected {
            let current = completion_pct(answered, expected);
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(completion_pct(expected, expected), 100);
        assert_eq!(completion_pct(1, 3), 33);
        assert_eq!(completion_pct(2, 3), 67);
    }

    #[test]
    fn test_expected_evaluations() {
        assert_eq!(expected_evaluations(0), 0);
        assert_eq!(expected_evaluations(1), 0);
        assert_eq!(expected_evaluations(2), 2);
        assert_eq!(expected_evaluations(5), 20);
    }

    #[test]
    fn test_rollup_over_nothing() {
        let rollup = CampaignRollup::from_evaluations(&[]);
        assert_eq!(rollup.total_agents, 0);
        assert_eq!(rollup.total_expected_evaluations, 0);
        assert_eq!(rollup.total_submitted_evaluations, 0);
        assert_eq!(rollup.completion_rate, 0.0);
        assert!(!rollup.completion_rate.is_nan());
    }

    #[test]
    fn test_rollup_three_agents() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut evaluations = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter() {
                if a != b {
                    evaluations.push(EvaluationProgress {
                        evaluator_id: *a,
                        evaluated_id: *b,
                        submitted: i == 0,
                    });
                }
            }
        }
        let rollup = CampaignRollup::from_evaluations(&evaluations);
        assert_eq!(rollup.total_agents, 3);
        assert_eq!(rollup.total_expected_evaluations, 6);
        assert_eq!(rollup.total_submitted_evaluations, 2);
        assert_eq!(rollup.completion_rate, 33.3);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(validate_score(1), Ok(1));
        assert_eq!(validate_score(4), Ok(4));
        assert_eq!(validate_score(0), Err(ScoreError::OutOfRange(0)));
        assert_eq!(validate_score(5), Err(ScoreError::OutOfRange(5)));
        assert_eq!(validate_weight(0), Err(ScoreError::Weight));
        assert_eq!(validate_weight(3), Ok(3));
    }
}
