//! Objective assembler.
//!
//! Cost over `alpha = [qdd; beta; eps]`, block diagonal:
//!
//! ```text
//! H = blkdiag(Hqp, (w_grf + REG) I, (w_slack + REG) I)
//! ```
//!
//! With contacts `Hqp` tracks the COM through the pendulum model, joint
//! accelerations through `w_qdd` and optionally centroidal angular momentum.
//! Without contacts it reduces to `(1 + REG) I` tracking `qdd_des`.
//! Soft body-acceleration rows are added in both cases.

use nalgebra::{DMatrix, DVector};

use crate::problem::QpDimensions;
use crate::tasks::{AngularMomentumTask, LipmTask, TaskRow};
use crate::types::{REG, ZmpTracking};

/// Assembled cost blocks.
#[derive(Clone, Debug)]
pub struct Objective {
    /// Dense nq×nq block on `qdd`.
    pub hqp: DMatrix<f64>,
    /// Diagonal weight on friction-cone coefficients (length nf).
    pub force_diag: DVector<f64>,
    /// Diagonal weight on slack variables (length neps).
    pub slack_diag: DVector<f64>,
    /// Linear term over all `nparams` variables.
    pub f: DVector<f64>,
}

/// Tracking data available once contacts are active.
pub struct ContactTracking<'a> {
    pub lipm: &'a LipmTask,
    pub zmp: &'a ZmpTracking,
    pub angular: Option<&'a AngularMomentumTask>,
}

pub struct ObjectiveInputs<'a> {
    pub qdd_des: &'a DVector<f64>,
    pub w_qdd: &'a DVector<f64>,
    /// `None` when no contact is active.
    pub tracking: Option<ContactTracking<'a>>,
    pub body_objectives: &'a [(f64, TaskRow)],
    pub w_grf: f64,
    pub w_slack: f64,
}

pub fn assemble_objective(dims: &QpDimensions, inputs: &ObjectiveInputs<'_>) -> Objective {
    let nq = dims.nq;
    let mut hqp;
    let mut f_qdd;

    match &inputs.tracking {
        Some(tracking) if dims.has_contacts() => {
            hqp = tracking.lipm.hessian(tracking.zmp);
            f_qdd = tracking.lipm.linear_term(tracking.zmp);
            if let Some(angular) = tracking.angular {
                hqp += angular.hessian();
                f_qdd += angular.linear_term();
            }
            for i in 0..nq {
                hqp[(i, i)] += inputs.w_qdd[i] + REG;
            }
            f_qdd -= inputs.w_qdd.component_mul(inputs.qdd_des);
        }
        _ => {
            hqp = DMatrix::identity(nq, nq) * (1.0 + REG);
            f_qdd = -inputs.qdd_des;
        }
    }

    for (weight, row) in inputs.body_objectives {
        let jt = row.jacobian.transpose();
        hqp += *weight * &jt * &row.jacobian;
        f_qdd -= *weight * row.rhs * jt;
    }

    let mut f = DVector::zeros(dims.nparams);
    f.rows_mut(0, nq).copy_from(&f_qdd);

    Objective {
        hqp,
        force_diag: DVector::from_element(dims.nf, inputs.w_grf + REG),
        slack_diag: DVector::from_element(dims.neps, inputs.w_slack + REG),
        f,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
