use crate::error::{ConsensusError, Result};
use crate::matrix::MembershipMatrix;
use crate::reconcile::ConsensusEntry;
use crate::solver::Selection;
use crate::types::VertexUniverse;

/// Packing check at the solver boundary: no vertex may be claimed by more
/// than one selected clique.
///
/// Vertices claimed by no clique are fine here; reconciliation fills them in.
pub fn validate(matrix: &MembershipMatrix, selection: &Selection) -> Result<()> {
    if selection.len() != matrix.cols() {
        return Err(ConsensusError::ShapeMismatch(format!(
            "selection has {} flags but the membership matrix has {} columns",
            selection.len(),
            matrix.cols()
        )));
    }

    let claims = matrix.row_claims(selection);
    if let Some(row) = claims.iter().position(|&c| c > 1) {
        return Err(ConsensusError::PackingViolation {
            row,
            claims: claims[row],
        });
    }
    Ok(())
}

/// Completeness check after multi-layer reconciliation: every vertex of the
/// universe appears in exactly one entry.
pub fn check_coverage(universe: &VertexUniverse, entries: &[ConsensusEntry]) -> Result<()> {
    let mut claims = vec![0usize; universe.vertex_count()];
    for entry in entries {
        for vertex in entry.vertices() {
            let row = universe.row_of(vertex).ok_or_else(|| {
                ConsensusError::ShapeMismatch(format!(
                    "output references unknown vertex {}:{}",
                    vertex.layer, vertex.index
                ))
            })?;
            claims[row] += 1;
        }
    }

    for vertex in universe.vertices() {
        let Some(row) = universe.row_of(vertex) else {
            continue;
        };
        match claims[row] {
            1 => {}
            0 => {
                return Err(ConsensusError::CoverageViolation {
                    layer: vertex.layer,
                    index: vertex.index,
                })
            }
            count => return Err(ConsensusError::PackingViolation { row, claims: count }),
        }
    }
    Ok(())
}
