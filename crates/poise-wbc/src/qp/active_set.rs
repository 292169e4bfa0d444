//! Warm-started general active-set tier.
//!
//! Solves the dense KKT system of the equality rows plus the working set,
//!
//! ```text
//! [ H  Aᵀ ] [ α ]   [ -f ]
//! [ A  0  ] [ λ ] = [  b ]
//! ```
//!
//! and changes the working set by one row per iteration: the row with the
//! most negative multiplier leaves, otherwise the most violated row enters.
//! Works for any positive semidefinite `H` with a nonsingular KKT matrix, so
//! it does not rely on the block structure the fast tier needs.

use nalgebra::{DMatrix, DVector};

use super::{
    Basis, FailureReason, QpTier, SolveDiagnostic, SolveStatus, SolverTier, TierSolution,
    working_system,
};
use crate::problem::QpProblem;

/// LU pivots this small relative to the largest mark the KKT matrix singular.
const SINGULAR_PIVOT_RATIO: f64 = 1e-13;

#[derive(Debug, Clone)]
pub struct WarmActiveSet {
    max_iters: u32,
    tol: f64,
}

/// Next working-set change.
enum Step {
    Drop(usize),
    Add(usize),
    Done,
}

impl WarmActiveSet {
    pub const fn new(max_iters: u32, tol: f64) -> Self {
        Self { max_iters, tol }
    }

    fn fail(reason: FailureReason) -> SolveDiagnostic {
        SolveDiagnostic::new(SolverTier::WarmActiveSet, reason)
    }

    fn next_step(
        &self,
        working: &[usize],
        lambda: &DVector<f64>,
        violation: &DVector<f64>,
    ) -> Step {
        let most_negative = lambda
            .iter()
            .enumerate()
            .filter(|(_, l)| **l < -self.tol)
            .min_by(|a, b| a.1.total_cmp(b.1));
        if let Some((position, _)) = most_negative {
            return Step::Drop(position);
        }

        let most_violated = violation
            .iter()
            .enumerate()
            .filter(|(row, v)| **v > self.tol && !working.contains(row))
            .max_by(|a, b| a.1.total_cmp(b.1));
        match most_violated {
            Some((row, _)) => Step::Add(row),
            None => Step::Done,
        }
    }
}

impl QpTier for WarmActiveSet {
    fn tier(&self) -> SolverTier {
        SolverTier::WarmActiveSet
    }

    fn solve(
        &self,
        problem: &QpProblem,
        hint: Option<&Basis>,
    ) -> Result<TierSolution, SolveDiagnostic> {
        let shape = problem.shape();
        let hessian = problem.hessian();
        let (g, h) = problem.stacked_inequalities();

        let mut working: Vec<usize> = hint
            .filter(|b| b.fits(shape))
            .map(Basis::active_rows)
            .unwrap_or_default();
        let mut seeded = !working.is_empty();

        let mut iteration = 0;
        while iteration < self.max_iters {
            let (alpha, lambda) = match solve_kkt(&hessian, problem, &g, &h, &working) {
                Ok(solution) => solution,
                // A stale seed can be degenerate for this tick; start over empty.
                Err(_) if seeded => {
                    working.clear();
                    seeded = false;
                    continue;
                }
                Err(reason) => return Err(Self::fail(reason)),
            };
            seeded = false;
            iteration += 1;

            let violation = &g * &alpha - &h;
            match self.next_step(&working, &lambda, &violation) {
                Step::Drop(position) => {
                    working.remove(position);
                }
                Step::Add(row) => working.push(row),
                Step::Done => {
                    super::ensure_finite(SolverTier::WarmActiveSet, &alpha)?;
                    return Ok(TierSolution {
                        alpha,
                        status: SolveStatus::WarmActiveSet,
                        basis: Basis::from_active_rows(shape, &working),
                    });
                }
            }
        }

        Err(Self::fail(FailureReason::IterationLimit(self.max_iters)))
    }
}

/// Solve the KKT system for the equality rows plus `working`.
///
/// Returns the minimizer and the multipliers of the working rows.
fn solve_kkt(
    hessian: &DMatrix<f64>,
    problem: &QpProblem,
    g: &DMatrix<f64>,
    h: &DVector<f64>,
    working: &[usize],
) -> Result<(DVector<f64>, DVector<f64>), FailureReason> {
    let n = problem.dims.nparams;
    let neq = problem.aeq().nrows();
    let (a, b) = working_system(problem, g, h, working);
    let k = a.nrows();

    let mut kkt = DMatrix::zeros(n + k, n + k);
    kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
    kkt.view_mut((n, 0), (k, n)).copy_from(&a);
    kkt.view_mut((0, n), (n, k)).copy_from(&a.transpose());
    let mut rhs = DVector::zeros(n + k);
    rhs.rows_mut(0, n).copy_from(&(-&problem.f));
    rhs.rows_mut(n, k).copy_from(&b);

    let lu = kkt.lu();
    let pivots = lu.u().diagonal().abs();
    if pivots.min() <= SINGULAR_PIVOT_RATIO * pivots.max() {
        return Err(FailureReason::SingularSystem);
    }
    let solution = lu.solve(&rhs).ok_or(FailureReason::SingularSystem)?;

    let alpha = solution.rows(0, n).into_owned();
    let lambda = solution.rows(n + neq, working.len()).into_owned();
    Ok((alpha, lambda))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
