//! Cold interior-point tier backed by clarabel.
//!
//! ```text
//! min  ½ αᵀ P α + qᵀ α
//! s.t. [Aeq; G] α + s = [beq; h],  s ∈ {0}^neq × R+^(m + 2n)
//! ```
//!
//! where `G α <= h` stacks the inequality rows and both variable bounds.
//! No warm start: the hint is ignored.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::{NonnegativeConeT, ZeroConeT},
};
use nalgebra::{DMatrix, DVector};
use tracing::warn;

use super::{Basis, FailureReason, QpTier, SolveDiagnostic, SolveStatus, SolverTier, TierSolution};
use crate::config::SolverConfig;
use crate::problem::QpProblem;

/// Slack below which an inequality counts as active in the derived basis.
const ACTIVE_TOL: f64 = 1e-6;

/// Entries smaller than this are dropped from the sparse matrices.
const SPARSITY_TOL: f64 = 1e-15;

#[derive(Debug, Clone)]
pub struct ColdInteriorPoint {
    config: SolverConfig,
}

impl ColdInteriorPoint {
    pub const fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    fn fail(reason: FailureReason) -> SolveDiagnostic {
        SolveDiagnostic::new(SolverTier::ColdInteriorPoint, reason)
    }
}

impl QpTier for ColdInteriorPoint {
    fn tier(&self) -> SolverTier {
        SolverTier::ColdInteriorPoint
    }

    fn solve(
        &self,
        problem: &QpProblem,
        _hint: Option<&Basis>,
    ) -> Result<TierSolution, SolveDiagnostic> {
        let n = problem.dims.nparams;
        let n_eq = problem.aeq().nrows();
        let (g, h) = problem.stacked_inequalities();
        let n_ineq = g.nrows();

        let mut a_all = DMatrix::zeros(n_eq + n_ineq, n);
        a_all.rows_mut(0, n_eq).copy_from(problem.aeq());
        a_all.rows_mut(n_eq, n_ineq).copy_from(&g);
        let mut b_all = DVector::zeros(n_eq + n_ineq);
        b_all.rows_mut(0, n_eq).copy_from(problem.beq());
        b_all.rows_mut(n_eq, n_ineq).copy_from(&h);

        let p_csc = dense_to_csc(&problem.hessian(), Triangle::Upper);
        let a_csc = dense_to_csc(&a_all, Triangle::Full);
        let cones = [ZeroConeT(n_eq), NonnegativeConeT(n_ineq)];

        let settings = DefaultSettingsBuilder::default()
            .max_iter(self.config.interior_max_iters)
            .verbose(false)
            .presolve_enable(self.config.presolve)
            .tol_gap_abs(self.config.tol_gap_abs)
            .tol_gap_rel(self.config.tol_gap_rel)
            .tol_feas(self.config.tol_feas)
            .build()
            .map_err(|e| Self::fail(FailureReason::Setup(e.to_string())))?;

        let q: Vec<f64> = problem.f.iter().copied().collect();
        let b: Vec<f64> = b_all.iter().copied().collect();

        let mut solver = DefaultSolver::new(&p_csc, &q, &a_csc, &b, &cones, settings)
            .map_err(|e| Self::fail(FailureReason::Setup(format!("{e:?}"))))?;
        solver.solve();
        let sol = &solver.solution;

        let alpha = DVector::from_column_slice(&sol.x);
        super::ensure_finite(SolverTier::ColdInteriorPoint, &alpha)?;

        let status = if matches!(sol.status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
            SolveStatus::Optimal
        } else {
            warn!(
                status = ?sol.status,
                iterations = sol.iterations,
                "interior-point solve not optimal, using best-effort solution"
            );
            SolveStatus::ColdNonOptimal
        };

        let basis = Basis::from_active_rows(problem.shape(), &problem.tight_rows(&alpha, ACTIVE_TOL));
        Ok(TierSolution {
            alpha,
            status,
            basis,
        })
    }
}

/// Which entries of a dense matrix go into the sparse copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Triangle {
    Full,
    /// Upper triangle only, as clarabel expects for `P`.
    Upper,
}

impl Triangle {
    const fn keeps(self, row: usize, col: usize) -> bool {
        match self {
            Self::Full => true,
            Self::Upper => row <= col,
        }
    }
}

/// Column-major sparse copy of `m`, dropping entries below `SPARSITY_TOL`.
fn dense_to_csc(m: &DMatrix<f64>, triangle: Triangle) -> CscMatrix<f64> {
    let (nrows, ncols) = m.shape();
    let mut colptr = Vec::with_capacity(ncols + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for (j, column) in m.column_iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            if triangle.keeps(i, j) && v.abs() > SPARSITY_TOL {
                rowval.push(i);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
