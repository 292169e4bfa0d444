//! Command synthesizer: solution vector back to joint accelerations and torque.

use nalgebra::{DMatrix, DVector};

use crate::contact::ContactBasis;
use crate::problem::QpDimensions;

/// Solved accelerations and contact-force coefficients.
#[derive(Clone, Debug)]
pub struct SolutionParts {
    pub qdd: DVector<f64>,
    pub beta: DVector<f64>,
    pub slack: DVector<f64>,
}

impl SolutionParts {
    pub fn split(dims: &QpDimensions, alpha: &DVector<f64>) -> Self {
        Self {
            qdd: alpha.rows_range(dims.qdd()).into_owned(),
            beta: alpha.rows_range(dims.forces()).into_owned(),
            slack: alpha.rows_range(dims.slack()).into_owned(),
        }
    }
}

/// `tau = B_actᵀ (H_act qdd + C_act - D_act beta)`.
///
/// `b_act` must be orthogonal; its transpose stands in for its inverse.
pub fn actuator_torque(
    dims: &QpDimensions,
    parts: &SolutionParts,
    b_act: &DMatrix<f64>,
    h_act: &DMatrix<f64>,
    c_act: &DVector<f64>,
    contacts: &ContactBasis,
) -> DVector<f64> {
    let mut generalized = h_act * &parts.qdd + c_act;
    if dims.has_contacts() {
        let d_act = contacts.d.rows_range(dims.actuated_rows());
        generalized -= d_act * &parts.beta;
    }
    b_act.transpose() * generalized
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
