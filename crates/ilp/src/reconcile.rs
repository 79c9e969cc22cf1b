use crate::error::{ConsensusError, Result};
use crate::rank::{rank_and_limit, RankedEntries};
use crate::solver::Selection;
use crate::types::{Clique, ConsensusMode, Point, Slot, VertexId, VertexUniverse};
use serde::{Deserialize, Serialize};

/// A detection placed in an output entry: identity within its layer plus coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub index: usize,
    pub point: Point,
}

/// Where an output entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    /// Clique column picked by the solver
    Selected { column: usize },
    /// Zero-weight placeholder for a detection no selected clique claimed
    Synthesized,
}

/// One row of the consensus output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEntry {
    /// One slot per layer
    pub members: Vec<Slot<Member>>,
    pub weight: f64,
    pub origin: EntryOrigin,
}

impl ConsensusEntry {
    /// Referenced vertices in layer order
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter_map(|(layer, slot)| slot.as_present().map(|m| VertexId::new(layer, m.index)))
    }

    pub fn is_synthesized(&self) -> bool {
        self.origin == EntryOrigin::Synthesized
    }
}

/// Reconciled, loss-free result of one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutput {
    pub mode: ConsensusMode,
    pub labels: Vec<String>,
    pub entries: Vec<ConsensusEntry>,
}

impl ConsensusOutput {
    pub fn selected_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_synthesized()).count()
    }

    pub fn synthesized_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_synthesized()).count()
    }

    /// Entries by descending weight, truncated to `limit`
    pub fn ranked(&self, limit: Option<usize>) -> RankedEntries<'_> {
        rank_and_limit(&self.entries, limit)
    }
}

/// Expand the solver's selection into the complete output collection.
///
/// Selected cliques come first, in column order. In multi-layer mode every
/// detection not referenced by a selected clique is then appended as a
/// zero-weight singleton, layer by layer.
pub fn reconcile(
    universe: &VertexUniverse,
    cliques: &[Clique],
    selection: &Selection,
) -> Result<ConsensusOutput> {
    if selection.len() != cliques.len() {
        return Err(ConsensusError::ShapeMismatch(format!(
            "selection has {} flags but there are {} cliques",
            selection.len(),
            cliques.len()
        )));
    }

    let layer_count = universe.layer_count();
    let mut members: Vec<Vec<Slot<Member>>> = Vec::with_capacity(selection.count());
    let mut weights: Vec<f64> = Vec::with_capacity(selection.count());
    let mut origins: Vec<EntryOrigin> = Vec::with_capacity(selection.count());
    let mut claimed: Vec<Vec<bool>> = universe
        .layers()
        .iter()
        .map(|layer| vec![false; layer.detections.len()])
        .collect();

    for column in selection.selected() {
        let clique = &cliques[column];
        universe.check_clique(column, clique)?;

        let mut slots = Vec::with_capacity(layer_count);
        for (layer, slot) in clique.slots.iter().enumerate() {
            slots.push(match *slot {
                Slot::Present(index) => {
                    claimed[layer][index] = true;
                    let point = universe
                        .point(VertexId::new(layer, index))
                        .ok_or_else(|| {
                            ConsensusError::ShapeMismatch(format!(
                                "clique {column} references unknown vertex {layer}:{index}"
                            ))
                        })?;
                    Slot::Present(Member { index, point })
                }
                Slot::Absent => Slot::Absent,
            });
        }
        members.push(slots);
        weights.push(clique.confidence);
        origins.push(EntryOrigin::Selected { column });
    }

    let mode = universe.mode();
    if mode == ConsensusMode::MultiLayer {
        let before = members.len();
        for (layer, claimed_in_layer) in claimed.iter().enumerate() {
            let detections = &universe.layers()[layer].detections;
            for (index, &taken) in claimed_in_layer.iter().enumerate() {
                if taken {
                    continue;
                }
                let mut slots = vec![Slot::Absent; layer_count];
                slots[layer] = Slot::Present(Member {
                    index,
                    point: detections[index],
                });
                members.push(slots);
                weights.push(0.0);
                origins.push(EntryOrigin::Synthesized);
            }
        }
        log::debug!(
            "reconciled {} selected cliques with {} singleton placeholders",
            before,
            members.len() - before
        );
    }

    if members.len() != weights.len() || members.len() != origins.len() {
        return Err(ConsensusError::InconsistentCounts {
            entries: members.len(),
            weights: weights.len(),
        });
    }

    let entries = members
        .into_iter()
        .zip(weights)
        .zip(origins)
        .map(|((members, weight), origin)| ConsensusEntry {
            members,
            weight,
            origin,
        })
        .collect();

    Ok(ConsensusOutput {
        mode,
        labels: universe.labels(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Layer;
    use pretty_assertions::assert_eq;

    fn layer(label: &str, n: usize) -> Layer {
        Layer::new(
            label,
            (0..n).map(|i| Point::new(10.0 * i as f64, 1.0)).collect(),
        )
    }

    #[test]
    fn multi_layer_adds_singletons_for_unclaimed_vertices() {
        let universe = VertexUniverse::new(vec![layer("a", 3), layer("b", 3)]);
        let cliques = vec![
            Clique::new(vec![Slot::Present(0), Slot::Present(0)], 5.0),
            Clique::new(vec![Slot::Present(0), Slot::Present(1)], 3.0),
        ];
        let selection = Selection::from_flags(vec![true, false]);

        let output = reconcile(&universe, &cliques, &selection).unwrap();

        assert_eq!(output.mode, ConsensusMode::MultiLayer);
        assert_eq!(output.labels, vec!["a".to_string(), "b".to_string()]);
        let weights: Vec<f64> = output.entries.iter().map(|e| e.weight).collect();
        assert_eq!(weights, vec![5.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(output.selected_count(), 1);
        assert_eq!(output.synthesized_count(), 4);

        let singletons: Vec<Vec<VertexId>> = output.entries[1..]
            .iter()
            .map(|e| e.vertices().collect())
            .collect();
        assert_eq!(
            singletons,
            vec![
                vec![VertexId::new(0, 1)],
                vec![VertexId::new(0, 2)],
                vec![VertexId::new(1, 1)],
                vec![VertexId::new(1, 2)],
            ]
        );
        assert_eq!(
            output.entries[3].members,
            vec![
                Slot::Absent,
                Slot::Present(Member {
                    index: 1,
                    point: Point::new(10.0, 1.0)
                })
            ]
        );
    }

    #[test]
    fn multi_layer_without_cliques_is_all_singletons() {
        let universe = VertexUniverse::new(vec![layer("a", 2), layer("b", 1)]);
        let output = reconcile(&universe, &[], &Selection::default()).unwrap();
        assert_eq!(output.entries.len(), 3);
        assert!(output.entries.iter().all(|e| e.is_synthesized() && e.weight == 0.0));
    }

    #[test]
    fn single_layer_keeps_selection_only() {
        let universe = VertexUniverse::new(vec![layer("picks", 3)]);
        let cliques: Vec<Clique> = (0..3)
            .map(|i| Clique::new(vec![Slot::Present(i)], i as f64))
            .collect();
        let selection = Selection::from_flags(vec![false, true, true]);

        let output = reconcile(&universe, &cliques, &selection).unwrap();

        assert_eq!(output.mode, ConsensusMode::SingleLayer);
        assert_eq!(
            output.entries.iter().map(|e| e.origin).collect::<Vec<_>>(),
            vec![
                EntryOrigin::Selected { column: 1 },
                EntryOrigin::Selected { column: 2 }
            ]
        );
    }

    #[test]
    fn rejects_selection_length_mismatch() {
        let universe = VertexUniverse::new(vec![layer("a", 1), layer("b", 1)]);
        let cliques = vec![Clique::new(vec![Slot::Present(0), Slot::Present(0)], 1.0)];
        let err = reconcile(&universe, &cliques, &Selection::from_flags(vec![])).unwrap_err();
        assert!(matches!(err, ConsensusError::ShapeMismatch(_)));
    }
}
