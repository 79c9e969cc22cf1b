use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid weight at column {column}: {value}")]
    InvalidWeight { column: usize, value: f64 },

    #[error("Optimization failed ({backend}): {reason}")]
    OptimizationFailed {
        backend: &'static str,
        reason: String,
    },

    #[error("Packing violation: vertex row {row} is claimed by {claims} cliques")]
    PackingViolation { row: usize, claims: usize },

    #[error("Coverage violation: vertex {layer}:{index} is missing from the output")]
    CoverageViolation { layer: usize, index: usize },

    #[error("Inconsistent counts: {entries} entries vs {weights} weights")]
    InconsistentCounts { entries: usize, weights: usize },
}

impl ConsensusError {
    /// Stable identifier for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ShapeMismatch(_) => "shape_mismatch",
            Self::InvalidWeight { .. } => "invalid_weight",
            Self::OptimizationFailed { .. } => "optimization_failed",
            Self::PackingViolation { .. } => "packing_violation",
            Self::CoverageViolation { .. } => "coverage_violation",
            Self::InconsistentCounts { .. } => "inconsistent_counts",
        }
    }
}
