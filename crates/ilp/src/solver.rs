use crate::error::{ConsensusError, Result};
use crate::model::{PackingRow, Problem};
use good_lp::{
    microlp, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "highs")]
use good_lp::highs as native_engine;
#[cfg(not(feature = "highs"))]
use good_lp::microlp as native_engine;

/// Packing row upper bound used by the fallback backend.
///
/// Engines that solve a continuous relaxation with integrality restored by
/// branching may report row sums slightly above 1. With integer variables the
/// only feasible row sums below 1.5 are 0 and 1, so the model is unchanged.
pub const PACKING_ROW_UPPER_BOUND: f64 = 1.5;

/// Half-width added around `[0, 1]` for fallback variable bounds, giving
/// `[-0.5, 1.5]`. Integer variables in that range can only take 0 or 1, even
/// when an engine treats bounds as exclusive.
pub const BINARY_BOUND_SLACK: f64 = 0.5;

/// Largest distance from 0 or 1 accepted for a reported variable value
pub const INTEGRALITY_TOLERANCE: f64 = 1e-4;

/// Binary decision vector, one flag per clique column
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection(Vec<bool>);

impl Selection {
    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Round raw solver values to flags; values that are not (close to) 0 or 1
    /// are rejected.
    pub fn from_values(values: &[f64]) -> std::result::Result<Self, String> {
        values
            .iter()
            .enumerate()
            .map(|(column, &value)| {
                let rounded = value.round();
                let binary = rounded == 0.0 || rounded == 1.0;
                if !binary || (value - rounded).abs() > INTEGRALITY_TOLERANCE {
                    return Err(format!("column {column} has non-binary value {value}"));
                }
                Ok(rounded == 1.0)
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indices of selected columns, ascending
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(column, &on)| on.then_some(column))
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&on| on).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

/// Integer-program capability used by the pipeline
pub trait IlpSolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Solve the packing program, returning one flag per problem column.
    fn solve(&self, problem: &Problem) -> Result<Selection>;
}

/// Backend preference as configured by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Native when HiGHS is compiled in, fallback otherwise
    #[default]
    Auto,
    Native,
    Fallback,
}

impl FromStr for BackendChoice {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "native" => Ok(Self::Native),
            "fallback" => Ok(Self::Fallback),
            other => Err(format!(
                "unsupported solver backend '{other}' (expected 'auto', 'native' or 'fallback')"
            )),
        }
    }
}

impl fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Native => "native",
            Self::Fallback => "fallback",
        })
    }
}

/// Concrete solver strategy, decided once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverBackend {
    /// Maximizes natively over binary variables
    Native,
    /// Minimizes the negated objective over relaxed integer bounds
    Fallback,
}

impl SolverBackend {
    pub fn resolve(choice: BackendChoice) -> Self {
        match choice {
            BackendChoice::Native => Self::Native,
            BackendChoice::Fallback => Self::Fallback,
            BackendChoice::Auto if Self::highs_available() => Self::Native,
            BackendChoice::Auto => Self::Fallback,
        }
    }

    pub fn highs_available() -> bool {
        cfg!(feature = "highs")
    }

    /// Engine that executes this backend
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Native if Self::highs_available() => "highs",
            Self::Native | Self::Fallback => "microlp",
        }
    }
}

impl IlpSolver for SolverBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Fallback => "fallback",
        }
    }

    fn solve(&self, problem: &Problem) -> Result<Selection> {
        if problem.column_count() == 0 {
            return Ok(Selection::default());
        }
        log::debug!(
            "solving {} columns / {} rows with {} backend ({})",
            problem.column_count(),
            problem.packing_rows().len(),
            self.name(),
            self.engine()
        );
        let values = match self {
            Self::Native => solve_native(problem),
            Self::Fallback => solve_fallback(problem),
        }
        .map_err(|err| self.failed(err.to_string()))?;

        Selection::from_values(&values).map_err(|reason| self.failed(reason))
    }
}

impl SolverBackend {
    fn failed(&self, reason: String) -> ConsensusError {
        ConsensusError::OptimizationFailed {
            backend: self.name(),
            reason,
        }
    }
}

fn row_expression(x: &[Variable], row: &PackingRow) -> Expression {
    let mut expr = Expression::with_capacity(row.columns.len());
    for &column in &row.columns {
        expr.add_mul(1.0, x[column]);
    }
    expr
}

fn solve_native(problem: &Problem) -> std::result::Result<Vec<f64>, ResolutionError> {
    let mut vars = variables!();
    let x: Vec<Variable> = (0..problem.column_count())
        .map(|_| vars.add(variable().binary()))
        .collect();

    let mut objective = Expression::with_capacity(x.len());
    for (&var, &weight) in x.iter().zip(problem.weights()) {
        objective.add_mul(weight, var);
    }

    let mut model = vars.maximise(objective).using(native_engine);
    for row in problem.packing_rows() {
        model = model.with(row_expression(&x, row).leq(1.0));
    }

    let solution = model.solve()?;
    Ok(x.iter().map(|&var| solution.value(var)).collect())
}

fn solve_fallback(problem: &Problem) -> std::result::Result<Vec<f64>, ResolutionError> {
    let mut vars = variables!();
    let x: Vec<Variable> = (0..problem.column_count())
        .map(|_| {
            vars.add(
                variable()
                    .integer()
                    .min(-BINARY_BOUND_SLACK)
                    .max(1.0 + BINARY_BOUND_SLACK),
            )
        })
        .collect();

    // minimize only: negate the objective
    let mut objective = Expression::with_capacity(x.len());
    for (&var, &weight) in x.iter().zip(problem.weights()) {
        objective.add_mul(-weight, var);
    }

    let mut model = vars.minimise(objective).using(microlp);
    for row in problem.packing_rows() {
        model = model.with(row_expression(&x, row).leq(PACKING_ROW_UPPER_BOUND));
    }

    let solution = model.solve()?;
    Ok(x.iter().map(|&var| solution.value(var)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MembershipMatrix;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn conflict_problem() -> Problem {
        // rows: A0 A1 A2 B0 B1 B2; clique0 = (A0, B0), clique1 = (A0, B1)
        let m = MembershipMatrix::from_entries(6, 2, [(0, 0), (3, 0), (0, 1), (4, 1)]).unwrap();
        Problem::build(&m, &[5.0, 3.0]).unwrap()
    }

    #[test]
    fn native_picks_heavier_conflicting_clique() {
        let selection = SolverBackend::Native.solve(&conflict_problem()).unwrap();
        assert_eq!(selection.as_slice(), &[true, false]);
    }

    #[test]
    fn fallback_picks_heavier_conflicting_clique() {
        let selection = SolverBackend::Fallback.solve(&conflict_problem()).unwrap();
        assert_eq!(selection.as_slice(), &[true, false]);
    }

    #[test]
    fn empty_problem_skips_the_engine() {
        let m = MembershipMatrix::from_entries(3, 0, Vec::<(usize, usize)>::new()).unwrap();
        let problem = Problem::build(&m, &[]).unwrap();
        for backend in [SolverBackend::Native, SolverBackend::Fallback] {
            assert!(backend.solve(&problem).unwrap().is_empty());
        }
    }

    #[test]
    fn from_values_rounds_near_binary_values() {
        let selection = Selection::from_values(&[0.99999999, 1e-9, -0.0, 1.0]).unwrap();
        assert_eq!(selection.as_slice(), &[true, false, false, true]);
        assert_eq!(selection.count(), 2);
        assert_eq!(selection.selected().collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn from_values_rejects_fractional_and_out_of_domain() {
        assert!(Selection::from_values(&[0.5]).is_err());
        assert!(Selection::from_values(&[2.0]).is_err());
        assert!(Selection::from_values(&[-1.0]).is_err());
    }

    #[test]
    fn backend_choice_parses_and_resolves() {
        assert_eq!("Native".parse::<BackendChoice>(), Ok(BackendChoice::Native));
        assert_eq!(" fallback ".parse::<BackendChoice>(), Ok(BackendChoice::Fallback));
        assert!("gurobi".parse::<BackendChoice>().is_err());

        assert_eq!(SolverBackend::resolve(BackendChoice::Native), SolverBackend::Native);
        assert_eq!(SolverBackend::resolve(BackendChoice::Fallback), SolverBackend::Fallback);
        let auto = SolverBackend::resolve(BackendChoice::Auto);
        if SolverBackend::highs_available() {
            assert_eq!(auto, SolverBackend::Native);
        } else {
            assert_eq!(auto, SolverBackend::Fallback);
        }
    }

    fn best_packing_value(m: &MembershipMatrix, weights: &[f64]) -> f64 {
        let n = weights.len();
        let mut best = 0.0f64;
        for mask in 0u32..(1 << n) {
            let flags: Vec<bool> = (0..n).map(|c| mask & (1 << c) != 0).collect();
            let selection = Selection::from_flags(flags);
            if m.row_claims(&selection).iter().all(|&claims| claims <= 1) {
                let value: f64 = selection.selected().map(|c| weights[c]).sum();
                best = best.max(value);
            }
        }
        best
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn proptest_backends_agree_with_exhaustive_search(
            columns in prop::collection::vec(prop::collection::vec(0usize..5, 1..3), 0..7),
            raw_weights in prop::collection::vec(0u8..10, 7),
        ) {
            let entries: Vec<(usize, usize)> = columns
                .iter()
                .enumerate()
                .flat_map(|(c, rows)| rows.iter().map(move |&r| (r, c)))
                .collect();
            let m = MembershipMatrix::from_entries(5, columns.len(), entries).unwrap();
            let weights: Vec<f64> = raw_weights[..columns.len()].iter().map(|&w| w as f64).collect();
            let problem = Problem::build(&m, &weights).unwrap();
            let best = best_packing_value(&m, &weights);

            for backend in [SolverBackend::Native, SolverBackend::Fallback] {
                let selection = backend.solve(&problem).unwrap();
                prop_assert_eq!(selection.len(), columns.len());
                prop_assert!(m.row_claims(&selection).iter().all(|&claims| claims <= 1));
                prop_assert!((problem.objective_value(&selection) - best).abs() < 1e-6);
            }
        }
    }
}
