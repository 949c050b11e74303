use std::collections::HashSet;
use uuid::Uuid;

/// Ordered (evaluator, evaluated) pairs for a campaign: every participant
/// rates every other participant, never themselves. Duplicate ids are
/// collapsed, first occurrence wins the ordering.
pub fn evaluation_pairs(agent_ids: &[Uuid]) -> Vec<(Uuid, Uuid)> {
    let mut seen = HashSet::new();
    let participants: Vec<Uuid> = agent_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    let mut pairs = Vec::with_capacity(participants.len().saturating_sub(1) * participants.len());
    for evaluator in &participants {
        for evaluated in &participants {
            if evaluator != evaluated {
                pairs.push((*evaluator, *evaluated));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scoring::expected_evaluations;

    #[test]
    fn test_cross_product_without_self() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let pairs = evaluation_pairs(&ids);
        assert_eq!(pairs.len() as i64, expected_evaluations(4));
        assert!(pairs.iter().all(|(a, b)| a != b));

        let unique: HashSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), pairs.len());
    }

    #[test]
    fn test_duplicates_collapse() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let pairs = evaluation_pairs(&[a, b, a, b]);
        assert_eq!(pairs, vec![(a, b), (b, a)]);
    }

    #[test]
    fn test_single_agent_has_no_pairs() {
        assert!(evaluation_pairs(&[Uuid::new_v4()]).is_empty());
        assert!(evaluation_pairs(&[]).is_empty());
    }
}
