//! Fast active-set tier.
//!
//! Exploits the block-diagonal cost: `H⁻¹` is a Cholesky inverse of the
//! `qdd` block plus reciprocals of the force and slack diagonals. With
//! equality rows and the current working set stacked into `A α = b`:
//!
//! ```text
//! λ = -(A H⁻¹ Aᵀ)⁻¹ (b + A H⁻¹ f)
//! α = -H⁻¹ (f + Aᵀ λ)
//! ```
//!
//! Each iteration drops working rows with negative multipliers and adds
//! every violated row at once. Cheap when the previous tick's active set
//! is close, but it can fail on degenerate working sets; the cascade then
//! moves on.

use nalgebra::{DMatrix, DVector};

use super::{
    Basis, FailureReason, QpTier, SolveDiagnostic, SolveStatus, SolverTier, TierSolution,
    working_system,
};
use crate::problem::QpProblem;

#[derive(Debug, Clone)]
pub struct FastActiveSet {
    max_iters: u32,
    tol: f64,
}

impl FastActiveSet {
    pub const fn new(max_iters: u32, tol: f64) -> Self {
        Self { max_iters, tol }
    }

    fn fail(reason: FailureReason) -> SolveDiagnostic {
        SolveDiagnostic::new(SolverTier::FastActiveSet, reason)
    }
}

impl QpTier for FastActiveSet {
    fn tier(&self) -> SolverTier {
        SolverTier::FastActiveSet
    }

    fn solve(
        &self,
        problem: &QpProblem,
        hint: Option<&Basis>,
    ) -> Result<TierSolution, SolveDiagnostic> {
        let shape = problem.shape();
        let qinv = block_inverse(problem).map_err(Self::fail)?;
        let (g, h) = problem.stacked_inequalities();

        let mut working: Vec<usize> = hint
            .filter(|b| b.fits(shape))
            .map(Basis::active_rows)
            .unwrap_or_default();

        for iteration in 0..self.max_iters {
            let (alpha, lambda) =
                solve_working_set(&qinv, problem, &g, &h, &working).map_err(Self::fail)?;

            let mut next: Vec<usize> = working
                .iter()
                .zip(lambda.iter())
                .filter(|(_, l)| **l >= -self.tol)
                .map(|(row, _)| *row)
                .collect();
            let violation = &g * &alpha - &h;
            next.extend(
                violation
                    .iter()
                    .enumerate()
                    .filter(|(row, v)| **v > self.tol && working.binary_search(row).is_err())
                    .map(|(row, _)| row),
            );
            next.sort_unstable();

            if next == working {
                super::ensure_finite(SolverTier::FastActiveSet, &alpha)?;
                return Ok(TierSolution {
                    alpha,
                    status: SolveStatus::Fast {
                        iterations: iteration,
                    },
                    basis: Basis::from_active_rows(shape, &working),
                });
            }
            working = next;
        }

        Err(Self::fail(FailureReason::IterationLimit(self.max_iters)))
    }
}

/// Inverse of the block-diagonal cost.
fn block_inverse(problem: &QpProblem) -> Result<DMatrix<f64>, FailureReason> {
    let nq = problem.dims.nq;
    let n = problem.dims.nparams;
    let chol = problem
        .cost
        .qdd
        .clone()
        .cholesky()
        .ok_or(FailureReason::IndefiniteCost)?;

    let mut qinv = DMatrix::zeros(n, n);
    qinv.view_mut((0, 0), (nq, nq)).copy_from(&chol.inverse());
    let diagonal = problem.cost.force.iter().chain(problem.cost.slack.iter());
    for (i, &w) in diagonal.enumerate() {
        if w <= 0.0 {
            return Err(FailureReason::IndefiniteCost);
        }
        qinv[(nq + i, nq + i)] = 1.0 / w;
    }
    Ok(qinv)
}

/// Minimize over `Aeq α = beq` plus the working rows held with equality.
///
/// Returns the minimizer and the multipliers of the working rows.
fn solve_working_set(
    qinv: &DMatrix<f64>,
    problem: &QpProblem,
    g: &DMatrix<f64>,
    h: &DVector<f64>,
    working: &[usize],
) -> Result<(DVector<f64>, DVector<f64>), FailureReason> {
    let neq = problem.aeq().nrows();
    let (a, b) = working_system(problem, g, h, working);

    let qinv_f = qinv * &problem.f;
    if a.nrows() == 0 {
        return Ok((-qinv_f, DVector::zeros(0)));
    }

    let qinv_at = qinv * a.transpose();
    let schur = &a * &qinv_at;
    let rhs = -(b + &a * &qinv_f);
    let lambda = schur
        .cholesky()
        .ok_or(FailureReason::SingularSystem)?
        .solve(&rhs);
    let alpha = -(qinv_f + qinv_at * &lambda);

    Ok((alpha, lambda.rows(neq, working.len()).into_owned()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
