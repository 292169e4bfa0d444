//! Tiered QP solving with warm starts carried between ticks.
//!
//! Tiers, tried in order until one succeeds:
//! 1. [`FastActiveSet`] (optional): block-inverse active set.
//! 2. [`WarmActiveSet`]: dense-KKT active set seeded from the stored basis.
//! 3. [`ColdInteriorPoint`]: clarabel from scratch, used even
//!    when not optimal.
//!
//! Each tier is a pure function of the problem and an optional [`Basis`]
//! hint. The [`WarmStart`] store is keyed by [`ProblemShape`] and only
//! hands out a hint when the shape matches.

pub mod active_set;
pub mod fast;
pub mod interior;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SolverConfig;
use crate::problem::{ProblemShape, QpProblem};

pub use active_set::WarmActiveSet;
pub use fast::FastActiveSet;
pub use interior::ColdInteriorPoint;

/// Status code reported by the warm active-set tier.
pub const WARM_ACTIVE_SET_CODE: i32 = 66;
/// Status code of an optimal cold solve.
pub const OPTIMAL_CODE: i32 = 2;

// ---------------------------------------------------------------------------
// Status and diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverTier {
    FastActiveSet,
    WarmActiveSet,
    ColdInteriorPoint,
}

impl std::fmt::Display for SolverTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FastActiveSet => "fast active-set",
            Self::WarmActiveSet => "warm active-set",
            Self::ColdInteriorPoint => "cold interior-point",
        };
        f.write_str(name)
    }
}

/// Why a tier gave up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailureReason {
    #[error("cost block is not positive definite")]
    IndefiniteCost,

    #[error("working-set system is singular")]
    SingularSystem,

    #[error("no convergence after {0} iterations")]
    IterationLimit(u32),

    #[error("solution contains non-finite values")]
    NonFinite,

    #[error("solver setup failed: {0}")]
    Setup(String),
}

/// Failure record of one tier. Not fatal: the cascade moves on.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{tier} tier failed: {reason}")]
pub struct SolveDiagnostic {
    pub tier: SolverTier,
    pub reason: FailureReason,
}

impl SolveDiagnostic {
    pub const fn new(tier: SolverTier, reason: FailureReason) -> Self {
        Self { tier, reason }
    }
}

/// Outcome of the cascade as reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Fast path converged after this many working-set updates.
    Fast { iterations: u32 },
    /// Warm active-set tier converged.
    WarmActiveSet,
    /// Cold tier converged.
    Optimal,
    /// Cold tier stopped short of optimality; its iterate is used anyway.
    ColdNonOptimal,
    /// Every tier failed; the solution is all zeros.
    Failed,
}

impl SolveStatus {
    /// Integer code in the host's convention.
    pub fn code(self) -> i32 {
        match self {
            Self::Fast { iterations } => i32::try_from(iterations).unwrap_or(i32::MAX),
            Self::WarmActiveSet => WARM_ACTIVE_SET_CODE,
            Self::Optimal => OPTIMAL_CODE,
            Self::ColdNonOptimal => -1,
            Self::Failed => -2,
        }
    }

    pub const fn is_optimal(self) -> bool {
        matches!(self, Self::Fast { .. } | Self::WarmActiveSet | Self::Optimal)
    }
}

// ---------------------------------------------------------------------------
// Basis and warm start
// ---------------------------------------------------------------------------

/// Where a variable sits relative to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableStatus {
    Basic,
    AtLower,
    AtUpper,
}

/// Active-set description of a solution.
///
/// Rows of the stacked system `[Ain; -I; I]` map to it as: `0..m` are the
/// inequality flags, `m + i` is variable `i` at its lower bound and
/// `m + n + i` at its upper bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Basis {
    pub variables: Vec<VariableStatus>,
    pub inequalities: Vec<bool>,
}

impl Basis {
    /// Basis with nothing active.
    pub fn empty(shape: ProblemShape) -> Self {
        Self {
            variables: vec![VariableStatus::Basic; shape.nparams],
            inequalities: vec![false; shape.n_ineq],
        }
    }

    /// Basis from stacked active-row indices. Out-of-range rows are ignored.
    pub fn from_active_rows(shape: ProblemShape, rows: &[usize]) -> Self {
        let (m, n) = (shape.n_ineq, shape.nparams);
        let mut basis = Self::empty(shape);
        for &row in rows {
            if row < m {
                basis.inequalities[row] = true;
            } else if row < m + n {
                basis.variables[row - m] = VariableStatus::AtLower;
            } else if row < m + 2 * n && basis.variables[row - m - n] == VariableStatus::Basic {
                basis.variables[row - m - n] = VariableStatus::AtUpper;
            }
        }
        basis
    }

    /// Stacked active-row indices, ascending.
    pub fn active_rows(&self) -> Vec<usize> {
        let (m, n) = (self.inequalities.len(), self.variables.len());
        let mut rows: Vec<usize> = self
            .inequalities
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i))
            .collect();
        for (i, status) in self.variables.iter().enumerate() {
            match status {
                VariableStatus::Basic => {}
                VariableStatus::AtLower => rows.push(m + i),
                VariableStatus::AtUpper => rows.push(m + n + i),
            }
        }
        rows.sort_unstable();
        rows
    }

    pub fn fits(&self, shape: ProblemShape) -> bool {
        self.variables.len() == shape.nparams && self.inequalities.len() == shape.n_ineq
    }
}

#[derive(Debug, Clone)]
struct WarmEntry {
    shape: ProblemShape,
    basis: Basis,
    alpha: DVector<f64>,
}

/// Solution and basis of the last optimal solve, keyed by problem shape.
#[derive(Debug, Clone, Default)]
pub struct WarmStart {
    entry: Option<WarmEntry>,
    generation: u64,
}

impl WarmStart {
    /// Stored basis if it was produced for a problem of the same shape.
    pub fn hint(&self, shape: ProblemShape) -> Option<&Basis> {
        let entry = self.entry.as_ref()?;
        if entry.shape == shape {
            Some(&entry.basis)
        } else {
            debug!(
                stored = ?entry.shape,
                current = ?shape,
                "problem shape changed, warm start discarded"
            );
            None
        }
    }

    pub fn store(&mut self, shape: ProblemShape, basis: Basis, alpha: DVector<f64>) {
        self.entry = Some(WarmEntry {
            shape,
            basis,
            alpha,
        });
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Number of stores so far.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn shape(&self) -> Option<ProblemShape> {
        self.entry.as_ref().map(|e| e.shape)
    }

    pub fn basis(&self) -> Option<&Basis> {
        self.entry.as_ref().map(|e| &e.basis)
    }

    /// Most recent optimal solution vector.
    pub fn last_solution(&self) -> Option<&DVector<f64>> {
        self.entry.as_ref().map(|e| &e.alpha)
    }
}

// ---------------------------------------------------------------------------
// Tiers and cascade
// ---------------------------------------------------------------------------

/// What a successful tier returns.
#[derive(Debug, Clone)]
pub struct TierSolution {
    pub alpha: DVector<f64>,
    pub status: SolveStatus,
    /// Active set at `alpha`, reusable as the next tick's hint.
    pub basis: Basis,
}

/// One QP solving strategy.
pub trait QpTier {
    fn tier(&self) -> SolverTier;

    fn solve(
        &self,
        problem: &QpProblem,
        hint: Option<&Basis>,
    ) -> Result<TierSolution, SolveDiagnostic>;
}

/// Result of running the cascade on one problem.
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub alpha: DVector<f64>,
    pub status: SolveStatus,
    /// Tier whose solution was used; `None` when all failed.
    pub tier: Option<SolverTier>,
    /// Failures of the tiers tried before (or instead of) `tier`.
    pub diagnostics: Vec<SolveDiagnostic>,
}

/// Fixed fast → warm → cold fallback chain.
#[derive(Debug, Clone)]
pub struct SolverCascade {
    fast: FastActiveSet,
    warm: WarmActiveSet,
    cold: ColdInteriorPoint,
}

impl SolverCascade {
    pub fn new(config: &SolverConfig) -> Self {
        Self {
            fast: FastActiveSet::new(config.fast_max_iters, config.active_set_tol),
            warm: WarmActiveSet::new(config.active_set_max_iters, config.active_set_tol),
            cold: ColdInteriorPoint::new(config.clone()),
        }
    }

    fn tiers(&self, use_fast: bool) -> Vec<&dyn QpTier> {
        let mut tiers: Vec<&dyn QpTier> = Vec::with_capacity(3);
        if use_fast {
            tiers.push(&self.fast);
        }
        tiers.push(&self.warm);
        tiers.push(&self.cold);
        tiers
    }

    /// Solve `problem`, refreshing `warm_start` on an optimal result.
    pub fn solve(
        &self,
        problem: &QpProblem,
        use_fast: bool,
        warm_start: &mut WarmStart,
    ) -> SolveReport {
        run_tiers(&self.tiers(use_fast), problem, warm_start)
    }
}

fn run_tiers(tiers: &[&dyn QpTier], problem: &QpProblem, warm_start: &mut WarmStart) -> SolveReport {
    let shape = problem.shape();
    let hint = warm_start.hint(shape).cloned();
    let mut diagnostics = Vec::new();

    for tier in tiers {
        match tier.solve(problem, hint.as_ref()) {
            Ok(solution) => {
                if solution.status.is_optimal() {
                    warm_start.store(shape, solution.basis, solution.alpha.clone());
                }
                return SolveReport {
                    alpha: solution.alpha,
                    status: solution.status,
                    tier: Some(tier.tier()),
                    diagnostics,
                };
            }
            Err(diagnostic) => {
                debug!(%diagnostic, "falling back to next solver tier");
                diagnostics.push(diagnostic);
            }
        }
    }

    warn!(
        nparams = shape.nparams,
        "all solver tiers failed, returning zero solution"
    );
    SolveReport {
        alpha: DVector::zeros(shape.nparams),
        status: SolveStatus::Failed,
        tier: None,
        diagnostics,
    }
}

/// Equality rows followed by the `working` rows of the stacked inequalities.
pub(crate) fn working_system(
    problem: &QpProblem,
    g: &DMatrix<f64>,
    h: &DVector<f64>,
    working: &[usize],
) -> (DMatrix<f64>, DVector<f64>) {
    let n = problem.dims.nparams;
    let neq = problem.aeq().nrows();
    let k = neq + working.len();

    let mut a = DMatrix::zeros(k, n);
    let mut b = DVector::zeros(k);
    a.rows_mut(0, neq).copy_from(problem.aeq());
    b.rows_mut(0, neq).copy_from(problem.beq());
    for (r, &row) in working.iter().enumerate() {
        a.row_mut(neq + r).copy_from(&g.row(row));
        b[neq + r] = h[row];
    }
    (a, b)
}

/// Fail with [`FailureReason::NonFinite`] unless every entry is finite.
pub(crate) fn ensure_finite(tier: SolverTier, x: &DVector<f64>) -> Result<(), SolveDiagnostic> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolveDiagnostic::new(tier, FailureReason::NonFinite))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constraints::ConstraintStackBuilder;
    use crate::problem::tests::tiny_problem;
    use crate::problem::{CostBlocks, QpDimensions};
    use approx::assert_relative_eq;

    /// Three-variable QP whose equality-constrained optimum violates `x0 <= 5`:
    /// min ½|x|² - 12 x0 s.t. x0 + x1 + x2 = 1, x0, x1 <= 10, |x| <= 5.
    /// Solution `(5, -2, -2)`, active stacked row 5, cost -43.5.
    pub(crate) fn bound_active_problem() -> QpProblem {
        let dims = QpDimensions {
            nq: 3,
            nu: 1,
            nc: 0,
            nf: 0,
            neps: 0,
            nparams: 3,
        };
        let mut eq = ConstraintStackBuilder::new(3);
        eq.push_block(
            "sum",
            DMatrix::from_element(1, 3, 1.0),
            DVector::from_element(1, 1.0),
        );
        let mut ineq = ConstraintStackBuilder::new(3);
        ineq.push_block(
            "caps",
            DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            DVector::from_element(2, 10.0),
        );
        QpProblem {
            dims,
            cost: CostBlocks {
                qdd: DMatrix::identity(3, 3),
                force: DVector::zeros(0),
                slack: DVector::zeros(0),
            },
            f: DVector::from_vec(vec![-12.0, 0.0, 0.0]),
            equalities: eq.finish(),
            inequalities: ineq.finish(),
            lb: DVector::from_element(3, -5.0),
            ub: DVector::from_element(3, 5.0),
        }
    }

    pub(crate) fn assert_bound_active_solution(alpha: &DVector<f64>, epsilon: f64) {
        assert_relative_eq!(alpha[0], 5.0, epsilon = epsilon);
        assert_relative_eq!(alpha[1], -2.0, epsilon = epsilon);
        assert_relative_eq!(alpha[2], -2.0, epsilon = epsilon);
    }

    /// Tier that always fails.
    struct Broken;

    impl QpTier for Broken {
        fn tier(&self) -> SolverTier {
            SolverTier::FastActiveSet
        }
        fn solve(&self, _: &QpProblem, _: Option<&Basis>) -> Result<TierSolution, SolveDiagnostic> {
            Err(SolveDiagnostic::new(
                SolverTier::FastActiveSet,
                FailureReason::IterationLimit(3),
            ))
        }
    }

    #[test]
    fn status_codes() {
        assert_eq!(SolveStatus::Fast { iterations: 3 }.code(), 3);
        assert_eq!(SolveStatus::WarmActiveSet.code(), 66);
        assert_eq!(SolveStatus::Optimal.code(), 2);
        assert!(SolveStatus::ColdNonOptimal.code() < 0);
        assert!(SolveStatus::Failed.code() < 0);
        assert!(!SolveStatus::ColdNonOptimal.is_optimal());
        assert!(SolveStatus::Fast { iterations: 0 }.is_optimal());
    }

    #[test]
    fn basis_round_trips_active_rows() {
        let shape = ProblemShape {
            nparams: 3,
            n_eq: 1,
            n_ineq: 2,
        };
        let rows = vec![1, 2, 7];
        let basis = Basis::from_active_rows(shape, &rows);
        assert_eq!(basis.inequalities, vec![false, true]);
        assert_eq!(
            basis.variables,
            vec![
                VariableStatus::AtLower,
                VariableStatus::Basic,
                VariableStatus::AtUpper
            ]
        );
        assert_eq!(basis.active_rows(), rows);
        assert!(basis.fits(shape));
    }

    #[test]
    fn warm_start_is_keyed_by_shape() {
        let shape = tiny_problem().shape();
        let mut ws = WarmStart::default();
        assert!(ws.hint(shape).is_none());

        ws.store(shape, Basis::empty(shape), DVector::zeros(shape.nparams));
        assert!(ws.hint(shape).is_some());
        assert_eq!(ws.generation(), 1);

        let other = ProblemShape {
            nparams: shape.nparams + 7,
            ..shape
        };
        assert!(ws.hint(other).is_none());

        ws.clear();
        assert!(ws.hint(shape).is_none());
        assert!(ws.last_solution().is_none());
    }

    #[test]
    fn diagnostic_display_names_tier() {
        let d = SolveDiagnostic::new(SolverTier::WarmActiveSet, FailureReason::SingularSystem);
        assert_eq!(d.to_string(), "warm active-set tier failed: working-set system is singular");
    }

    #[test]
    fn cascade_uses_fast_tier_and_stores_basis() {
        let cascade = SolverCascade::new(&SolverConfig::default());
        let problem = bound_active_problem();
        let mut ws = WarmStart::default();

        let report = cascade.solve(&problem, true, &mut ws);
        assert_eq!(report.tier, Some(SolverTier::FastActiveSet));
        assert!(report.diagnostics.is_empty());
        assert_bound_active_solution(&report.alpha, 1e-9);
        assert_eq!(report.status, SolveStatus::Fast { iterations: 1 });
        assert_eq!(ws.basis().map(Basis::active_rows), Some(vec![5]));
        assert_relative_eq!(problem.objective_value(&report.alpha), -43.5, epsilon = 1e-9);
    }

    #[test]
    fn cascade_without_fast_path_starts_warm() {
        let cascade = SolverCascade::new(&SolverConfig::default());
        let mut ws = WarmStart::default();
        let report = cascade.solve(&bound_active_problem(), false, &mut ws);
        assert_eq!(report.tier, Some(SolverTier::WarmActiveSet));
        assert_eq!(report.status.code(), WARM_ACTIVE_SET_CODE);
    }

    #[test]
    fn failed_tier_is_recorded_and_next_tier_runs() {
        let cascade = SolverCascade::new(&SolverConfig::default());
        let problem = bound_active_problem();
        let mut ws = WarmStart::default();

        let report = run_tiers(&[&Broken, &cascade.cold], &problem, &mut ws);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.tier, Some(SolverTier::ColdInteriorPoint));
        assert_eq!(report.status, SolveStatus::Optimal);
        assert_bound_active_solution(&report.alpha, 1e-5);
        assert_eq!(ws.generation(), 1);
    }

    #[test]
    fn all_tiers_failing_gives_zero_solution() {
        let problem = bound_active_problem();
        let mut ws = WarmStart::default();

        let report = run_tiers(&[&Broken, &Broken], &problem, &mut ws);
        assert_eq!(report.status, SolveStatus::Failed);
        assert_eq!(report.tier, None);
        assert_eq!(report.diagnostics.len(), 2);
        assert_relative_eq!(report.alpha.amax(), 0.0);
        assert_eq!(ws.generation(), 0);
    }
}
