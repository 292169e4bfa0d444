//! Ready-made configurations and tick inputs for the mock biped.

use nalgebra::{DVector, Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};
use poise_wbc::{
    ControllerConfig, ControllerError, QpController, RobotState, SupportRequest, TerrainMap,
    TickInput, ZmpTracking,
};

use crate::biped::{COM_HEIGHT, GRAVITY, LEFT_FOOT, MockBiped, NQ, NU, RIGHT_FOOT};

/// Symmetric actuator limit used by [`torque_limits`].
pub const TORQUE_LIMIT: f64 = 500.0;

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

/// Linear-inverted-pendulum tracking of a stationary COM over the origin.
///
/// `x = [com_xy; comdot_xy]`, `u = comddot_xy`, `y = zmp = com_xy - h/g u`.
pub fn standing_zmp() -> ZmpTracking {
    let mut a = Matrix4::zeros();
    a[(0, 2)] = 1.0;
    a[(1, 3)] = 1.0;
    let mut b = Matrix4x2::zeros();
    b[(2, 0)] = 1.0;
    b[(3, 1)] = 1.0;
    let mut c = Matrix2x4::zeros();
    c[(0, 0)] = 1.0;
    c[(1, 1)] = 1.0;
    ZmpTracking {
        a,
        b,
        qy: Matrix2::identity(),
        r: Matrix2::zeros(),
        c,
        d: Matrix2::identity() * (-COM_HEIGHT / GRAVITY),
        s: Matrix4::from_diagonal(&Vector4::new(10.0, 10.0, 1.0, 1.0)),
        s1: Vector4::zeros(),
        s1dot: Vector4::zeros(),
        s2dot: 0.0,
        x0: Vector4::zeros(),
        u0: Vector2::zeros(),
        y0: Vector2::zeros(),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Uniform joint-acceleration weight, no body-acceleration slots.
pub fn biped_config() -> ControllerConfig {
    ControllerConfig {
        w_qdd: vec![0.1; NQ],
        ..ControllerConfig::default()
    }
}

/// `(umin, umax)` at `∓TORQUE_LIMIT` for every actuator.
pub fn torque_limits() -> (DVector<f64>, DVector<f64>) {
    (
        DVector::from_element(NU, -TORQUE_LIMIT),
        DVector::from_element(NU, TORQUE_LIMIT),
    )
}

/// Controller over [`MockBiped`] with the standard actuation and limits.
pub fn biped_controller(
    config: ControllerConfig,
    terrain: Option<Box<dyn TerrainMap>>,
) -> Result<QpController<MockBiped>, ControllerError> {
    let (umin, umax) = torque_limits();
    QpController::new(config, MockBiped::new(), MockBiped::actuation(), umin, umax, terrain)
}

// ---------------------------------------------------------------------------
// Supports
// ---------------------------------------------------------------------------

/// All four corner points of `foot` (0-based body), in host indexing.
pub fn foot_support(foot: usize) -> SupportRequest {
    SupportRequest {
        body: foot + 1,
        contact_pts: vec![1, 2, 3, 4],
        contact_surface: 1,
    }
}

/// Both feet flat on the ground.
pub fn double_support() -> Vec<SupportRequest> {
    vec![foot_support(LEFT_FOOT), foot_support(RIGHT_FOOT)]
}

// ---------------------------------------------------------------------------
// Tick input
// ---------------------------------------------------------------------------

/// Robot at rest at the origin with zero desired accelerations.
pub fn tick_input(support: Vec<SupportRequest>) -> TickInput {
    TickInput {
        use_fast_qp: false,
        qdd_des: DVector::zeros(NQ),
        state: RobotState::zeros(NQ),
        body_accel_inputs: Vec::new(),
        constrained_joints: Vec::new(),
        support,
        zmp: standing_zmp(),
        mu: 1.0,
        terrain_height: 0.0,
    }
}

/// Desired accelerations consistent with free fall: the base drops at `g`.
pub fn free_fall_qdd_des() -> DVector<f64> {
    let mut qdd = DVector::zeros(NQ);
    qdd[2] = -GRAVITY;
    qdd
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
