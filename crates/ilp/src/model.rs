use crate::error::{ConsensusError, Result};
use crate::matrix::MembershipMatrix;
use crate::solver::Selection;

/// Packing constraint of one vertex: `sum(x[c] for c in columns) <= 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingRow {
    pub row: usize,
    pub columns: Vec<usize>,
}

/// Solver-agnostic clique selection problem.
///
/// Maximize `sum(weights[c] * x[c])` over binary `x`, subject to one
/// [`PackingRow`] per referenced vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    weights: Vec<f64>,
    rows: Vec<PackingRow>,
    vertex_count: usize,
}

impl Problem {
    /// Formulate the packing program for `matrix` and its co-indexed `weights`.
    pub fn build(matrix: &MembershipMatrix, weights: &[f64]) -> Result<Self> {
        if matrix.cols() != weights.len() {
            return Err(ConsensusError::ShapeMismatch(format!(
                "membership matrix has {} columns but the weight vector has {} entries",
                matrix.cols(),
                weights.len()
            )));
        }
        if let Some((column, &value)) = weights.iter().enumerate().find(|(_, w)| !w.is_finite()) {
            return Err(ConsensusError::InvalidWeight { column, value });
        }

        let rows: Vec<PackingRow> = matrix
            .row_members()
            .into_iter()
            .enumerate()
            .filter(|(_, columns)| !columns.is_empty())
            .map(|(row, columns)| PackingRow { row, columns })
            .collect();

        log::debug!(
            "built packing model: {} columns, {} constraint rows ({} vertices, {} non-zeros)",
            weights.len(),
            rows.len(),
            matrix.rows(),
            matrix.nnz()
        );

        Ok(Self {
            weights: weights.to_vec(),
            rows,
            vertex_count: matrix.rows(),
        })
    }

    pub fn column_count(&self) -> usize {
        self.weights.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn packing_rows(&self) -> &[PackingRow] {
        &self.rows
    }

    pub fn objective_value(&self, selection: &Selection) -> f64 {
        selection.selected().map(|c| self.weights[c]).sum()
    }
}
