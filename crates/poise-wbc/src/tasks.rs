//! Task-space quantities shared by the objective, constraints and diagnostics.

use nalgebra::{DMatrix, DVector, Matrix2xX, Matrix3, Matrix3xX, RowDVector, Vector2, Vector3, Vector4};

use crate::contact::in_support;
use crate::model::RigidBodyModel;
use crate::types::{
    ANGULAR_MOMENTUM_THRESHOLD, BodyAccelMode, BodyAccelTarget, RobotState, SupportStateElement,
    ZmpTracking,
};

// ---------------------------------------------------------------------------
// COM / ZMP tracking
// ---------------------------------------------------------------------------

/// Linear-inverted-pendulum view of the center of mass.
#[derive(Clone, Debug)]
pub struct LipmTask {
    /// Pendulum state `[com_xy; comdot_xy]`.
    pub x_limp: Vector4<f64>,
    /// Deviation from the nominal state, `x_limp - x0`.
    pub x_bar: Vector4<f64>,
    /// Horizontal rows of the COM Jacobian.
    pub j_xy: Matrix2xX<f64>,
    /// `Jdot_xy qd`.
    pub jdot_xy_qd: Vector2<f64>,
}

impl LipmTask {
    pub fn new(
        com: &Vector3<f64>,
        com_jacobian: &DMatrix<f64>,
        com_jacobian_dot: &DMatrix<f64>,
        qd: &DVector<f64>,
        zmp: &ZmpTracking,
    ) -> Self {
        let j_xy: Matrix2xX<f64> = com_jacobian.fixed_rows::<2>(0).into_owned();
        let jdot_xy: Matrix2xX<f64> = com_jacobian_dot.fixed_rows::<2>(0).into_owned();
        let comdot_xy = &j_xy * qd;
        let x_limp = Vector4::new(com.x, com.y, comdot_xy[0], comdot_xy[1]);
        Self {
            x_limp,
            x_bar: x_limp - zmp.x0,
            jdot_xy_qd: &jdot_xy * qd,
            j_xy,
        }
    }

    /// COM acceleration implied by `qdd`: `Jdot_xy qd + J_xy qdd`.
    pub fn com_accel(&self, qdd: &DVector<f64>) -> Vector2<f64> {
        self.jdot_xy_qd + &self.j_xy * qdd
    }

    /// Quadratic COM tracking weight `J_xyᵀ (R + Dᵀ Qy D) J_xy`.
    pub fn hessian(&self, zmp: &ZmpTracking) -> DMatrix<f64> {
        self.j_xy.transpose() * zmp.r_dqyd() * &self.j_xy
    }

    /// Linear COM tracking term on `qdd` (value-function and nominal offsets included).
    pub fn linear_term(&self, zmp: &ZmpTracking) -> DVector<f64> {
        let r_dqyd = zmp.r_dqyd();
        let qy_d = zmp.qy * zmp.d;
        let row = (zmp.c * self.x_limp).transpose() * qy_d
            + self.jdot_xy_qd.transpose() * r_dqyd
            + (zmp.s * self.x_bar + 0.5 * zmp.s1).transpose() * zmp.b
            - zmp.u0.transpose() * r_dqyd
            - zmp.y0.transpose() * qy_d;
        (row * &self.j_xy).transpose()
    }

    /// Time derivative of the tracking value function along `qdd`.
    pub fn lyapunov_derivative(&self, zmp: &ZmpTracking, qdd: &DVector<f64>) -> f64 {
        let xdot = zmp.a * self.x_bar + zmp.b * self.com_accel(qdd);
        let grad = 2.0 * self.x_bar.transpose() * zmp.s + zmp.s1.transpose();
        (grad * xdot)[(0, 0)] + zmp.s1dot.dot(&self.x_bar) + zmp.s2dot
    }
}

// ---------------------------------------------------------------------------
// Angular momentum
// ---------------------------------------------------------------------------

/// Whether any entry of the weight matrix enables the angular-momentum term.
pub fn angular_momentum_enabled(w_kdot: &Matrix3<f64>) -> bool {
    w_kdot.max() > ANGULAR_MOMENTUM_THRESHOLD
}

/// Centroidal angular-momentum rate task `Ak qdd + Akdot qd -> kdot_des`.
#[derive(Clone, Debug)]
pub struct AngularMomentumTask {
    /// Angular rows of the centroidal momentum matrix.
    pub ak: Matrix3xX<f64>,
    /// `Akdot qd`.
    pub akdot_qd: Vector3<f64>,
    pub w_kdot: Matrix3<f64>,
    /// `-kp Ak qd`.
    pub kdot_des: Vector3<f64>,
}

impl AngularMomentumTask {
    pub fn new(
        cmm: &DMatrix<f64>,
        cmm_dot: &DMatrix<f64>,
        qd: &DVector<f64>,
        w_kdot: Matrix3<f64>,
        kp: f64,
    ) -> Self {
        let ak: Matrix3xX<f64> = cmm.fixed_rows::<3>(0).into_owned();
        let akdot: Matrix3xX<f64> = cmm_dot.fixed_rows::<3>(0).into_owned();
        let kdot_des = -kp * (&ak * qd);
        Self {
            akdot_qd: &akdot * qd,
            ak,
            w_kdot,
            kdot_des,
        }
    }

    pub fn hessian(&self) -> DMatrix<f64> {
        self.ak.transpose() * self.w_kdot * &self.ak
    }

    pub fn linear_term(&self) -> DVector<f64> {
        let row = (self.akdot_qd - self.kdot_des).transpose() * self.w_kdot;
        (row * &self.ak).transpose()
    }
}

// ---------------------------------------------------------------------------
// Body accelerations
// ---------------------------------------------------------------------------

/// One axis of a body spatial-acceleration target: `jacobian · qdd = rhs`.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRow {
    pub body: usize,
    pub axis: usize,
    pub jacobian: RowDVector<f64>,
    /// `a_des - Jbdot_row qd`.
    pub rhs: f64,
}

/// Body-acceleration rows split by how they enter the QP.
#[derive(Clone, Debug, Default)]
pub struct BodyAccelRows {
    /// Soft rows with their weights.
    pub objectives: Vec<(f64, TaskRow)>,
    /// Hard equality rows.
    pub constraints: Vec<TaskRow>,
}

/// Expand body-acceleration targets into per-axis rows.
///
/// Ignored slots, unspecified axes and bodies that are active supports
/// produce nothing.
pub fn body_accel_rows<M: RigidBodyModel + ?Sized>(
    model: &M,
    state: &RobotState,
    targets: &[BodyAccelTarget],
    supports: &[SupportStateElement],
) -> BodyAccelRows {
    let mut rows = BodyAccelRows::default();

    for target in targets {
        if target.mode == BodyAccelMode::Ignored || in_support(supports, target.body) {
            continue;
        }
        let jb = model.body_jacobian(state, target.body);
        let jbdot_qd = &jb.jacobian_dot * &state.qd;

        for (axis, desired) in target.specified_axes() {
            let row = TaskRow {
                body: target.body,
                axis,
                jacobian: jb.jacobian.row(axis).into_owned(),
                rhs: desired - jbdot_qd[axis],
            };
            match target.mode {
                BodyAccelMode::Objective { weight } => rows.objectives.push((weight, row)),
                BodyAccelMode::Constraint => rows.constraints.push(row),
                BodyAccelMode::Ignored => {}
            }
        }
    }

    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
