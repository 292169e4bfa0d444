//! QP problem instance for one tick.
//!
//! Decision vector `alpha = [qdd (nq), beta (nf), eps (neps)]`.
//!
//! ```text
//! min  ½ αᵀ H α + fᵀ α
//! s.t. Aeq α = beq
//!      Ain α <= bin
//!      lb <= α <= ub
//! ```
//!
//! `H` is block diagonal: a dense `qdd` block and diagonal force and slack
//! blocks.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};

use crate::constraints::{ConstraintStack, Constraints};
use crate::objective::Objective;
use crate::types::{FRICTION_CONE_EDGES, FLOATING_BASE_DOF};

/// Variable counts of one tick, fixed before anything is assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QpDimensions {
    /// Degrees of freedom.
    pub nq: usize,
    /// Actuators.
    pub nu: usize,
    /// Active contact points.
    pub nc: usize,
    /// Friction-cone basis coefficients (`nc * nd`).
    pub nf: usize,
    /// Relative-acceleration slack variables (`3 * nc`).
    pub neps: usize,
    /// Total decision variables.
    pub nparams: usize,
}

impl QpDimensions {
    pub const fn new(nq: usize, nu: usize, nc: usize) -> Self {
        let nf = nc * FRICTION_CONE_EDGES;
        let neps = 3 * nc;
        Self {
            nq,
            nu,
            nc,
            nf,
            neps,
            nparams: nq + nf + neps,
        }
    }

    pub const fn qdd(&self) -> Range<usize> {
        0..self.nq
    }

    pub const fn forces(&self) -> Range<usize> {
        self.nq..self.nq + self.nf
    }

    pub const fn slack(&self) -> Range<usize> {
        self.nq + self.nf..self.nparams
    }

    pub const fn has_contacts(&self) -> bool {
        self.nc > 0
    }

    /// Floating-base rows of a generalized quantity.
    pub const fn float_rows(&self) -> Range<usize> {
        0..FLOATING_BASE_DOF
    }

    /// Actuated rows of a generalized quantity.
    pub const fn actuated_rows(&self) -> Range<usize> {
        self.nq - self.nu..self.nq
    }
}

/// Row and column counts a warm start must match to be reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProblemShape {
    pub nparams: usize,
    pub n_eq: usize,
    pub n_ineq: usize,
}

impl ProblemShape {
    /// Rows of `[Ain; -I; I]`.
    pub const fn stacked_rows(&self) -> usize {
        self.n_ineq + 2 * self.nparams
    }
}

/// Block-diagonal quadratic cost.
#[derive(Clone, Debug)]
pub struct CostBlocks {
    /// Dense nq×nq block on joint accelerations.
    pub qdd: DMatrix<f64>,
    /// Diagonal on friction-cone coefficients.
    pub force: DVector<f64>,
    /// Diagonal on slack variables.
    pub slack: DVector<f64>,
}

/// Fully assembled QP.
#[derive(Clone, Debug)]
pub struct QpProblem {
    pub dims: QpDimensions,
    pub cost: CostBlocks,
    pub f: DVector<f64>,
    pub equalities: ConstraintStack,
    pub inequalities: ConstraintStack,
    pub lb: DVector<f64>,
    pub ub: DVector<f64>,
}

impl QpProblem {
    pub fn new(dims: QpDimensions, objective: Objective, constraints: Constraints) -> Self {
        let problem = Self {
            dims,
            cost: CostBlocks {
                qdd: objective.hqp,
                force: objective.force_diag,
                slack: objective.slack_diag,
            },
            f: objective.f,
            equalities: constraints.equalities,
            inequalities: constraints.inequalities,
            lb: constraints.lb,
            ub: constraints.ub,
        };
        debug_assert!(problem.is_consistent(), "QP blocks sized inconsistently");
        problem
    }

    pub fn aeq(&self) -> &DMatrix<f64> {
        &self.equalities.matrix
    }

    pub fn beq(&self) -> &DVector<f64> {
        &self.equalities.rhs
    }

    pub fn ain(&self) -> &DMatrix<f64> {
        &self.inequalities.matrix
    }

    pub fn bin(&self) -> &DVector<f64> {
        &self.inequalities.rhs
    }

    pub fn shape(&self) -> ProblemShape {
        ProblemShape {
            nparams: self.dims.nparams,
            n_eq: self.equalities.rows(),
            n_ineq: self.inequalities.rows(),
        }
    }

    /// Every block agrees with `dims`.
    pub fn is_consistent(&self) -> bool {
        let d = &self.dims;
        let n = d.nparams;
        self.cost.qdd.shape() == (d.nq, d.nq)
            && self.cost.force.len() == d.nf
            && self.cost.slack.len() == d.neps
            && self.f.len() == n
            && self.aeq().ncols() == n
            && self.beq().len() == self.aeq().nrows()
            && self.ain().ncols() == n
            && self.bin().len() == self.ain().nrows()
            && self.ain().nrows() == 2 * d.nu
            && self.lb.len() == n
            && self.ub.len() == n
    }

    /// Dense block-diagonal Hessian.
    pub fn hessian(&self) -> DMatrix<f64> {
        let d = &self.dims;
        let mut h = DMatrix::zeros(d.nparams, d.nparams);
        h.view_mut((0, 0), (d.nq, d.nq)).copy_from(&self.cost.qdd);
        for (i, w) in self.cost.force.iter().enumerate() {
            h[(d.nq + i, d.nq + i)] = *w;
        }
        let off = d.nq + d.nf;
        for (i, w) in self.cost.slack.iter().enumerate() {
            h[(off + i, off + i)] = *w;
        }
        h
    }

    /// Inequalities and bounds as one `G α <= h` system: `[Ain; -I; I]`, `[bin; -lb; ub]`.
    pub fn stacked_inequalities(&self) -> (DMatrix<f64>, DVector<f64>) {
        let n = self.dims.nparams;
        let m = self.inequalities.rows();
        let mut g = DMatrix::zeros(m + 2 * n, n);
        let mut h = DVector::zeros(m + 2 * n);

        g.rows_mut(0, m).copy_from(self.ain());
        h.rows_mut(0, m).copy_from(self.bin());
        for i in 0..n {
            g[(m + i, i)] = -1.0;
            h[m + i] = -self.lb[i];
            g[(m + n + i, i)] = 1.0;
            h[m + n + i] = self.ub[i];
        }
        (g, h)
    }

    /// Cost value `½ αᵀ H α + fᵀ α`.
    pub fn objective_value(&self, alpha: &DVector<f64>) -> f64 {
        let d = &self.dims;
        let qdd = alpha.rows(0, d.nq);
        let mut value = 0.5 * (qdd.transpose() * &self.cost.qdd * qdd)[(0, 0)];
        for (i, w) in self.cost.force.iter().enumerate() {
            value += 0.5 * w * alpha[d.nq + i].powi(2);
        }
        let off = d.nq + d.nf;
        for (i, w) in self.cost.slack.iter().enumerate() {
            value += 0.5 * w * alpha[off + i].powi(2);
        }
        value + self.f.dot(alpha)
    }

    /// Largest equality residual, inequality violation, or bound violation.
    pub fn max_violation(&self, alpha: &DVector<f64>) -> f64 {
        let eq = (self.aeq() * alpha - self.beq()).amax();
        let ineq = (self.ain() * alpha - self.bin()).max().max(0.0);
        let bounds = alpha
            .iter()
            .zip(self.lb.iter().zip(self.ub.iter()))
            .map(|(x, (lo, hi))| (lo - x).max(x - hi))
            .fold(0.0_f64, f64::max);
        eq.max(ineq).max(bounds)
    }

    /// Stacked inequality rows that hold with equality (within `tol`) at `alpha`.
    pub fn tight_rows(&self, alpha: &DVector<f64>, tol: f64) -> Vec<usize> {
        let (g, h) = self.stacked_inequalities();
        let slack = h - g * alpha;
        slack
            .iter()
            .enumerate()
            .filter(|(_, s)| s.abs() <= tol)
            .map(|(i, _)| i)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
