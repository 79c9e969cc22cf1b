use crate::error::{ConsensusError, Result};
use serde::{Deserialize, Serialize};

/// Detection coordinates in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One per-layer position of a clique.
///
/// Layers without a matching detection hold `Absent`, so every clique keeps
/// exactly one slot per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot<T> {
    Present(T),
    Absent,
}

impl<T> Slot<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Slot::Present(_))
    }

    pub fn as_present(&self) -> Option<&T> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Absent => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Slot<U> {
        match self {
            Slot::Present(value) => Slot::Present(f(value)),
            Slot::Absent => Slot::Absent,
        }
    }
}

/// Vertex identity: (layer, detection index within the layer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId {
    pub layer: usize,
    pub index: usize,
}

impl VertexId {
    pub fn new(layer: usize, index: usize) -> Self {
        Self { layer, index }
    }
}

/// Detections reported by one detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub label: String,
    pub detections: Vec<Point>,
}

impl Layer {
    pub fn new(label: impl Into<String>, detections: Vec<Point>) -> Self {
        Self {
            label: label.into(),
            detections,
        }
    }
}

/// Whether reconciliation has to merge across detector layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMode {
    SingleLayer,
    MultiLayer,
}

/// Every detection of a unit, grouped by layer.
///
/// Vertices are flattened layer-major into membership matrix rows: the row of
/// `(layer, index)` is the number of detections in earlier layers plus `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexUniverse {
    layers: Vec<Layer>,
    offsets: Vec<usize>,
}

impl VertexUniverse {
    pub fn new(layers: Vec<Layer>) -> Self {
        let mut offsets = Vec::with_capacity(layers.len() + 1);
        let mut total = 0;
        for layer in &layers {
            offsets.push(total);
            total += layer.detections.len();
        }
        offsets.push(total);
        Self { layers, offsets }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.layers.iter().map(|layer| layer.label.clone()).collect()
    }

    /// Total number of detections across all layers
    pub fn vertex_count(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn mode(&self) -> ConsensusMode {
        if self.layers.len() > 1 {
            ConsensusMode::MultiLayer
        } else {
            ConsensusMode::SingleLayer
        }
    }

    pub fn point(&self, vertex: VertexId) -> Option<Point> {
        self.layers
            .get(vertex.layer)
            .and_then(|layer| layer.detections.get(vertex.index))
            .copied()
    }

    /// Matrix row of a vertex
    pub fn row_of(&self, vertex: VertexId) -> Option<usize> {
        let layer = self.layers.get(vertex.layer)?;
        if vertex.index >= layer.detections.len() {
            return None;
        }
        Some(self.offsets[vertex.layer] + vertex.index)
    }

    /// All vertices, layer by layer
    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.layers.iter().enumerate().flat_map(|(layer, l)| {
            (0..l.detections.len()).map(move |index| VertexId::new(layer, index))
        })
    }

    /// Check that a clique fits this universe: one slot per layer, every
    /// present index in range, at least one present slot.
    pub fn check_clique(&self, column: usize, clique: &Clique) -> Result<()> {
        if clique.slots.len() != self.layers.len() {
            return Err(ConsensusError::ShapeMismatch(format!(
                "clique {column} has {} slots but the universe has {} layers",
                clique.slots.len(),
                self.layers.len()
            )));
        }
        for (layer, slot) in clique.slots.iter().enumerate() {
            if let Slot::Present(index) = slot {
                let len = self.layers[layer].detections.len();
                if *index >= len {
                    return Err(ConsensusError::ShapeMismatch(format!(
                        "clique {column} references detection {index} of layer {layer}, which has {len}"
                    )));
                }
            }
        }
        if clique.present_count() == 0 {
            return Err(ConsensusError::ShapeMismatch(format!(
                "clique {column} references no detection"
            )));
        }
        Ok(())
    }
}

/// Candidate consensus particle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clique {
    /// One slot per layer; present slots hold the detection index in that layer
    pub slots: Vec<Slot<usize>>,

    /// Confidence reported for the clique in the output
    pub confidence: f64,
}

impl Clique {
    pub fn new(slots: Vec<Slot<usize>>, confidence: f64) -> Self {
        Self { slots, confidence }
    }

    /// Referenced vertices in layer order
    pub fn members(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(layer, slot)| slot.as_present().map(|&index| VertexId::new(layer, index)))
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_present()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe(sizes: &[usize]) -> VertexUniverse {
        VertexUniverse::new(
            sizes
                .iter()
                .enumerate()
                .map(|(i, &n)| {
                    Layer::new(
                        format!("layer_{i}"),
                        (0..n).map(|k| Point::new(k as f64, i as f64)).collect(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn rows_are_flattened_layer_major() {
        let u = universe(&[3, 0, 2]);
        assert_eq!(u.vertex_count(), 5);
        assert_eq!(u.row_of(VertexId::new(0, 2)), Some(2));
        assert_eq!(u.row_of(VertexId::new(2, 0)), Some(3));
        assert_eq!(u.row_of(VertexId::new(1, 0)), None);
        assert_eq!(u.row_of(VertexId::new(2, 2)), None);

        let rows: Vec<Option<usize>> = u.vertices().map(|v| u.row_of(v)).collect();
        assert_eq!(rows, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn mode_follows_layer_count() {
        assert_eq!(universe(&[4]).mode(), ConsensusMode::SingleLayer);
        assert_eq!(universe(&[1, 1]).mode(), ConsensusMode::MultiLayer);
    }

    #[test]
    fn check_clique_rejects_bad_shapes() {
        let u = universe(&[2, 2]);
        let ok = Clique::new(vec![Slot::Present(1), Slot::Absent], 1.0);
        assert!(u.check_clique(0, &ok).is_ok());
        assert_eq!(ok.present_count(), 1);

        let short = Clique::new(vec![Slot::Present(0)], 1.0);
        assert!(matches!(
            u.check_clique(1, &short),
            Err(ConsensusError::ShapeMismatch(_))
        ));

        let out_of_range = Clique::new(vec![Slot::Present(0), Slot::Present(2)], 1.0);
        assert!(matches!(
            u.check_clique(2, &out_of_range),
            Err(ConsensusError::ShapeMismatch(_))
        ));

        let empty = Clique::new(vec![Slot::Absent, Slot::Absent], 1.0);
        assert!(matches!(
            u.check_clique(3, &empty),
            Err(ConsensusError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn members_skip_absent_slots() {
        let clique = Clique::new(vec![Slot::Absent, Slot::Present(4), Slot::Present(0)], 2.0);
        let members: Vec<_> = clique.members().collect();
        assert_eq!(members, vec![VertexId::new(1, 4), VertexId::new(2, 0)]);
        assert_eq!(clique.present_count(), 2);
    }
}
