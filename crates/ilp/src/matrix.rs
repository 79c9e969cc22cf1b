use crate::error::{ConsensusError, Result};
use crate::solver::Selection;
use crate::types::{Clique, VertexUniverse};

/// Sparse binary vertex-by-clique incidence matrix.
///
/// Stored column-major: each column keeps the sorted, deduplicated rows of the
/// vertices its clique references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipMatrix {
    rows: usize,
    columns: Vec<Vec<usize>>,
}

impl MembershipMatrix {
    /// Build from `(row, column)` coordinates of the non-zero entries.
    /// Duplicate coordinates collapse into one entry.
    pub fn from_entries(
        rows: usize,
        cols: usize,
        entries: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self> {
        let mut columns = vec![Vec::new(); cols];
        for (row, col) in entries {
            if row >= rows || col >= cols {
                return Err(ConsensusError::ShapeMismatch(format!(
                    "entry ({row}, {col}) lies outside a {rows}x{cols} matrix"
                )));
            }
            columns[col].push(row);
        }
        for column in &mut columns {
            column.sort_unstable();
            column.dedup();
        }
        Ok(Self { rows, columns })
    }

    /// Derive the matrix from candidate cliques: column `c` marks the rows of
    /// the vertices referenced by `cliques[c]`.
    pub fn from_cliques(universe: &VertexUniverse, cliques: &[Clique]) -> Result<Self> {
        let mut columns = Vec::with_capacity(cliques.len());
        for (column, clique) in cliques.iter().enumerate() {
            universe.check_clique(column, clique)?;
            let rows: Vec<usize> = clique
                .members()
                .filter_map(|vertex| universe.row_of(vertex))
                .collect();
            columns.push(rows);
        }
        Ok(Self {
            rows: universe.vertex_count(),
            columns,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Rows referenced by one column
    pub fn column(&self, col: usize) -> &[usize] {
        self.columns.get(col).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transposed view: for each row, the columns that reference it
    pub fn row_members(&self) -> Vec<Vec<usize>> {
        let mut rows = vec![Vec::new(); self.rows];
        for (col, column) in self.columns.iter().enumerate() {
            for &row in column {
                rows[row].push(col);
            }
        }
        rows
    }

    /// Per-row count of selected columns (`A · x`)
    pub fn row_claims(&self, selection: &Selection) -> Vec<usize> {
        let mut claims = vec![0usize; self.rows];
        for col in selection.selected() {
            for &row in self.column(col) {
                claims[row] += 1;
            }
        }
        claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Layer, Point, Slot};
    use pretty_assertions::assert_eq;

    #[test]
    fn from_entries_sorts_and_dedups() {
        let m = MembershipMatrix::from_entries(3, 2, [(2, 0), (0, 0), (2, 0), (1, 1)]).unwrap();
        assert_eq!(m.column(0), &[0, 2]);
        assert_eq!(m.column(1), &[1]);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.row_members(), vec![vec![0], vec![1], vec![0]]);
    }

    #[test]
    fn from_entries_rejects_out_of_range() {
        let err = MembershipMatrix::from_entries(2, 2, [(2, 0)]).unwrap_err();
        assert!(matches!(err, ConsensusError::ShapeMismatch(_)));
    }

    #[test]
    fn from_cliques_matches_universe_rows() {
        let universe = VertexUniverse::new(vec![
            Layer::new("a", vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]),
            Layer::new("b", vec![Point::new(0.0, 0.0)]),
        ]);
        let cliques = vec![
            Clique::new(vec![Slot::Present(1), Slot::Present(0)], 2.0),
            Clique::new(vec![Slot::Present(0), Slot::Absent], 1.0),
        ];
        let m = MembershipMatrix::from_cliques(&universe, &cliques).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.column(0), &[1, 2]);
        assert_eq!(m.column(1), &[0]);
    }

    #[test]
    fn row_claims_counts_selected_columns() {
        let m = MembershipMatrix::from_entries(2, 3, [(0, 0), (0, 1), (1, 2)]).unwrap();
        let selection = Selection::from_flags(vec![true, true, false]);
        assert_eq!(m.row_claims(&selection), vec![2, 0]);
    }
}
