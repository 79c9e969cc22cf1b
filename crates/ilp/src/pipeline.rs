use crate::error::{ConsensusError, Result};
use crate::matrix::MembershipMatrix;
use crate::model::Problem;
use crate::reconcile::{reconcile, ConsensusOutput};
use crate::solver::IlpSolver;
use crate::types::{Clique, ConsensusMode, VertexUniverse};
use crate::validate::{check_coverage, validate};

/// Everything needed to process one independent unit
#[derive(Debug, Clone)]
pub struct UnitInput {
    universe: VertexUniverse,
    cliques: Vec<Clique>,
    matrix: MembershipMatrix,
    weights: Vec<f64>,
}

impl UnitInput {
    /// Bundle unit data, checking that matrix, weights, cliques and universe
    /// all describe the same problem. Every matrix column must mark exactly
    /// the vertices its clique references.
    pub fn new(
        universe: VertexUniverse,
        cliques: Vec<Clique>,
        matrix: MembershipMatrix,
        weights: Vec<f64>,
    ) -> Result<Self> {
        if matrix.rows() != universe.vertex_count() {
            return Err(ConsensusError::ShapeMismatch(format!(
                "membership matrix has {} rows but the universe has {} vertices",
                matrix.rows(),
                universe.vertex_count()
            )));
        }
        if matrix.cols() != cliques.len() {
            return Err(ConsensusError::ShapeMismatch(format!(
                "membership matrix has {} columns but there are {} cliques",
                matrix.cols(),
                cliques.len()
            )));
        }
        if weights.len() != cliques.len() {
            return Err(ConsensusError::ShapeMismatch(format!(
                "weight vector has {} entries but there are {} cliques",
                weights.len(),
                cliques.len()
            )));
        }
        let derived = MembershipMatrix::from_cliques(&universe, &cliques)?;
        if let Some(column) = (0..matrix.cols()).find(|&c| matrix.column(c) != derived.column(c)) {
            return Err(ConsensusError::ShapeMismatch(format!(
                "membership matrix column {column} marks rows {:?} but clique {column} references rows {:?}",
                matrix.column(column),
                derived.column(column)
            )));
        }
        Ok(Self {
            universe,
            cliques,
            matrix,
            weights,
        })
    }

    /// Derive the membership matrix from the cliques and use their
    /// confidences as objective weights.
    pub fn from_cliques(universe: VertexUniverse, cliques: Vec<Clique>) -> Result<Self> {
        let matrix = MembershipMatrix::from_cliques(&universe, &cliques)?;
        let weights = cliques.iter().map(|c| c.confidence).collect();
        Self::new(universe, cliques, matrix, weights)
    }

    pub fn universe(&self) -> &VertexUniverse {
        &self.universe
    }

    pub fn cliques(&self) -> &[Clique] {
        &self.cliques
    }

    pub fn matrix(&self) -> &MembershipMatrix {
        &self.matrix
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Build -> solve -> validate -> reconcile for one unit
pub struct ConsensusPipeline<S: IlpSolver> {
    solver: S,
}

impl<S: IlpSolver> ConsensusPipeline<S> {
    pub fn new(solver: S) -> Self {
        Self { solver }
    }

    /// Run the unit end to end. Nothing partial is returned on failure.
    pub fn run(&self, input: &UnitInput) -> Result<ConsensusOutput> {
        let problem = Problem::build(&input.matrix, &input.weights)?;
        if problem.weights().iter().all(|&w| w == 0.0) && problem.column_count() > 0 {
            log::warn!(
                "all {} clique weights are zero; any packing is optimal",
                problem.column_count()
            );
        }

        let selection = self.solver.solve(&problem)?;
        if selection.len() != problem.column_count() {
            return Err(ConsensusError::ShapeMismatch(format!(
                "{} solver returned {} flags for {} columns",
                self.solver.name(),
                selection.len(),
                problem.column_count()
            )));
        }
        validate(&input.matrix, &selection)?;
        log::debug!(
            "{} solver selected {} of {} cliques (objective {:.3})",
            self.solver.name(),
            selection.count(),
            selection.len(),
            problem.objective_value(&selection)
        );

        let output = reconcile(&input.universe, &input.cliques, &selection)?;
        if output.mode == ConsensusMode::MultiLayer {
            check_coverage(&input.universe, &output.entries)?;
        }
        Ok(output)
    }
}
