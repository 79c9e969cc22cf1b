//! # Consensus ILP
//!
//! Selects a conflict-free subset of candidate consensus cliques and
//! reconciles it against the full detection universe.
//!
//! ## Features
//!
//! - **Packing model** - binary program with one "at most once" row per detection
//! - **Pluggable solver backends** - native maximizing backend or negate-and-minimize fallback
//! - **Solution validation** - packing check at the solver boundary, coverage check after reconciliation
//! - **Loss-free reconciliation** - unclaimed detections come back as zero-weight singletons
//! - **Ranking** - weight-ordered, optionally truncated view for single-layer output
//!
//! ## Architecture
//!
//! ```text
//! MembershipMatrix + weights
//!     │
//!     ├──> Problem::build (objective + packing rows)
//!     │
//!     ├──> IlpSolver (SolverBackend::Native | SolverBackend::Fallback)
//!     │      └─ Selection (one flag per clique column)
//!     │
//!     ├──> validate (claims per vertex <= 1)
//!     │
//!     ├──> reconcile (selected cliques + singleton placeholders)
//!     │      └─ check_coverage (claims per vertex == 1, multi-layer only)
//!     │
//!     └──> rank_and_limit (single-layer output)
//! ```

mod error;
mod matrix;
mod model;
mod pipeline;
mod rank;
mod reconcile;
mod solver;
mod types;
mod validate;

pub use error::{ConsensusError, Result};
pub use matrix::MembershipMatrix;
pub use model::{PackingRow, Problem};
pub use pipeline::{ConsensusPipeline, UnitInput};
pub use rank::{rank_and_limit, RankedEntries};
pub use reconcile::{reconcile, ConsensusEntry, ConsensusOutput, EntryOrigin, Member};
pub use solver::{
    BackendChoice, IlpSolver, Selection, SolverBackend, BINARY_BOUND_SLACK,
    INTEGRALITY_TOLERANCE, PACKING_ROW_UPPER_BOUND,
};
pub use types::{Clique, ConsensusMode, Layer, Point, Slot, VertexId, VertexUniverse};
pub use validate::{check_coverage, validate};
