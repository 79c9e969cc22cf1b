use crate::reconcile::ConsensusEntry;

/// Weight-ordered view over consensus entries.
///
/// Holds only the visiting order; entries are borrowed, never copied or
/// mutated, and [`iter`](Self::iter) can be called any number of times.
#[derive(Debug, Clone)]
pub struct RankedEntries<'a> {
    entries: &'a [ConsensusEntry],
    order: Vec<usize>,
}

impl<'a> RankedEntries<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a ConsensusEntry> + '_ {
        let entries = self.entries;
        self.order.iter().map(move |&i| &entries[i])
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Order entries by descending weight and keep at most `limit` of them.
///
/// Equal weights keep their input order, so repeated runs rank identically.
pub fn rank_and_limit(entries: &[ConsensusEntry], limit: Option<usize>) -> RankedEntries<'_> {
    let mut order: Vec<usize> = (0..entries.len()).collect();
    // stable sort
    order.sort_by(|&a, &b| entries[b].weight.total_cmp(&entries[a].weight));
    if let Some(limit) = limit {
        order.truncate(limit);
    }
    RankedEntries { entries, order }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{EntryOrigin, Member};
    use crate::types::{Point, Slot};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entries(weights: &[f64]) -> Vec<ConsensusEntry> {
        weights
            .iter()
            .enumerate()
            .map(|(column, &weight)| ConsensusEntry {
                members: vec![Slot::Present(Member {
                    index: column,
                    point: Point::new(column as f64, 0.0),
                })],
                weight,
                origin: EntryOrigin::Selected { column },
            })
            .collect()
    }

    fn columns(ranked: &RankedEntries<'_>) -> Vec<usize> {
        ranked
            .iter()
            .map(|e| match e.origin {
                EntryOrigin::Selected { column } => column,
                EntryOrigin::Synthesized => usize::MAX,
            })
            .collect()
    }

    #[test]
    fn keeps_top_entries_by_weight() {
        let input = entries(&[1.0, 5.0, 3.0]);
        let ranked = rank_and_limit(&input, Some(2));
        let weights: Vec<f64> = ranked.iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![5.0, 3.0]);
        assert_eq!(columns(&ranked), vec![1, 2]);
    }

    #[test]
    fn no_limit_keeps_everything_and_is_restartable() {
        let input = entries(&[2.0, 2.0, 7.0, 0.0]);
        let ranked = rank_and_limit(&input, None);
        assert_eq!(ranked.len(), 4);
        let first = columns(&ranked);
        let again = columns(&ranked);
        assert_eq!(first, vec![2, 0, 1, 3]);
        assert_eq!(first, again);
        assert_eq!(input.len(), 4);
    }

    #[test]
    fn limit_larger_than_input_and_zero() {
        let input = entries(&[1.0]);
        assert_eq!(rank_and_limit(&input, Some(10)).len(), 1);
        assert!(rank_and_limit(&input, Some(0)).is_empty());
    }

    proptest! {
        #[test]
        fn proptest_ranking_is_non_increasing_and_stable(
            raw in prop::collection::vec(0u8..6, 0..40),
            limit in prop::option::of(0usize..50),
        ) {
            let weights: Vec<f64> = raw.iter().map(|&w| w as f64).collect();
            let input = entries(&weights);
            let ranked = rank_and_limit(&input, limit);
            let positions = columns(&ranked);

            prop_assert_eq!(positions.len(), limit.map_or(input.len(), |l| l.min(input.len())));
            for pair in positions.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                prop_assert!(weights[a] >= weights[b]);
                if weights[a] == weights[b] {
                    prop_assert!(a < b);
                }
            }
        }
    }
}
