//! Core types for the balance QP: per-tick inputs, support state, tracking data.

use std::collections::BTreeSet;

use nalgebra::{DVector, Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4, Vector6};

/// Floating-base coordinates at the head of the generalized coordinates.
pub const FLOATING_BASE_DOF: usize = 6;

/// Surface tangent directions per contact point.
pub const NUM_SURFACE_TANGENTS: usize = 2;

/// Friction-cone edges per contact point (two per tangent direction).
pub const FRICTION_CONE_EDGES: usize = 2 * NUM_SURFACE_TANGENTS;

/// Diagonal regularizer added to every cost block.
pub const REG: f64 = 1e-8;

/// Symmetric box on joint accelerations (effectively unbounded).
pub const QDD_BOUND: f64 = 1e3;

/// Upper bound on friction-cone basis coefficients.
pub const FORCE_COEFF_BOUND: f64 = 1e3;

/// Angular-momentum term is enabled when any `W_kdot` entry exceeds this.
pub const ANGULAR_MOMENTUM_THRESHOLD: f64 = 1e-10;

/// Generalized position and velocity.
#[derive(Clone, Debug, PartialEq)]
pub struct RobotState {
    /// Generalized positions (length nq).
    pub q: DVector<f64>,
    /// Generalized velocities (length nq).
    pub qd: DVector<f64>,
}

impl RobotState {
    /// All-zero state for a model with `nq` degrees of freedom.
    pub fn zeros(nq: usize) -> Self {
        Self {
            q: DVector::zeros(nq),
            qd: DVector::zeros(nq),
        }
    }
}

/// One body in contact with the environment.
///
/// Indices are 0-based. Lives for a single tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportStateElement {
    pub body: usize,
    pub contact_pt_inds: BTreeSet<usize>,
    pub contact_surface: usize,
}

/// One entry of the desired-support descriptor as received from the host.
///
/// Body, contact-point and surface indices are 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupportRequest {
    pub body: usize,
    pub contact_pts: Vec<usize>,
    pub contact_surface: usize,
}

/// How a body-acceleration input slot participates in the QP.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BodyAccelMode {
    /// Soft tracking term with the given positive weight.
    Objective { weight: f64 },
    /// Hard equality rows.
    Constraint,
    /// Slot present but unused.
    Ignored,
}

impl BodyAccelMode {
    /// Decode the host's signed-weight convention.
    pub fn from_signed_weight(weight: f64) -> Self {
        if weight < 0.0 {
            Self::Constraint
        } else if weight > 0.0 {
            Self::Objective { weight }
        } else {
            Self::Ignored
        }
    }
}

/// Requested spatial acceleration of one body, as received from the host.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyAccelInput {
    /// 1-based body index.
    pub body: usize,
    /// Desired `[linear xyz; angular rpy]` acceleration. `NaN` leaves an axis free.
    pub accel: Vector6<f64>,
}

/// Body-acceleration slot after index conversion and mode resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyAccelTarget {
    /// 0-based body index.
    pub body: usize,
    pub mode: BodyAccelMode,
    /// Desired acceleration per axis; `None` for unspecified axes.
    pub axes: [Option<f64>; 6],
}

impl BodyAccelTarget {
    /// Specified axes as `(row, desired acceleration)` pairs.
    pub fn specified_axes(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.axes
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.map(|v| (i, v)))
    }
}

/// ZMP / LQR tracking data produced upstream each tick.
///
/// The linear-inverted-pendulum state is `x = [com_xy; comdot_xy]`, the
/// input is the COM acceleration and the output is the ZMP.
#[derive(Clone, Debug, PartialEq)]
pub struct ZmpTracking {
    pub a: Matrix4<f64>,
    pub b: Matrix4x2<f64>,
    pub qy: Matrix2<f64>,
    pub r: Matrix2<f64>,
    pub c: Matrix2x4<f64>,
    pub d: Matrix2<f64>,
    /// Value-function Hessian.
    pub s: Matrix4<f64>,
    /// Value-function linear term.
    pub s1: Vector4<f64>,
    pub s1dot: Vector4<f64>,
    pub s2dot: f64,
    /// Nominal pendulum state.
    pub x0: Vector4<f64>,
    /// Nominal input.
    pub u0: Vector2<f64>,
    /// Nominal output (ZMP).
    pub y0: Vector2<f64>,
}

impl ZmpTracking {
    /// Combined input weight `R + Dᵀ Qy D`.
    pub fn r_dqyd(&self) -> Matrix2<f64> {
        self.r + self.d.transpose() * self.qy * self.d
    }
}

/// Everything the controller consumes for one tick.
#[derive(Clone, Debug)]
pub struct TickInput {
    /// Try the fast block-diagonal active-set path first.
    pub use_fast_qp: bool,
    /// Desired joint accelerations (length nq).
    pub qdd_des: DVector<f64>,
    pub state: RobotState,
    /// One entry per configured body-acceleration slot.
    pub body_accel_inputs: Vec<BodyAccelInput>,
    /// 1-based joints whose acceleration is pinned to `qdd_des`.
    pub constrained_joints: Vec<usize>,
    /// Desired supports; empty means no contact.
    pub support: Vec<SupportRequest>,
    pub zmp: ZmpTracking,
    /// Coulomb friction coefficient.
    pub mu: f64,
    /// Ground height used when no terrain map is attached.
    pub terrain_height: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
