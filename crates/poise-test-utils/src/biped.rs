//! Deterministic lumped-mass biped.
//!
//! Generalized coordinates (nq = 18):
//!
//! | index  | meaning                              |
//! |--------|--------------------------------------|
//! | 0..3   | base translation xyz                 |
//! | 3..6   | base rotation rpy                    |
//! | 6..9   | left leg (moves the left foot xyz)   |
//! | 9..12  | right leg (moves the right foot xyz) |
//! | 12..15 | arm, hand translation                |
//! | 15..18 | arm, hand rotation                   |
//!
//! The mass matrix is diagonal and constant, gravity acts on the base only,
//! and the COM sits a fixed height above the base origin. Feet rest at the
//! base height, so a base at `z = 0` stands on flat ground at height zero.

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use poise_wbc::{BodyJacobian, ContactPointKinematics, RigidBodyModel, RobotState};

pub const NQ: usize = 18;
pub const NU: usize = 12;

pub const PELVIS: usize = 0;
pub const LEFT_FOOT: usize = 1;
pub const RIGHT_FOOT: usize = 2;
pub const HAND: usize = 3;

pub const MASS: f64 = 30.0;
pub const GRAVITY: f64 = 9.81;
pub const COM_HEIGHT: f64 = 0.9;
pub const BASE_INERTIA: [f64; 3] = [2.0, 2.5, 1.5];
pub const JOINT_INERTIA: f64 = 2.0;

/// First arm joint.
pub const ARM: usize = 12;

const FOOT_HALF_LENGTH: f64 = 0.1;
const FOOT_HALF_WIDTH: f64 = 0.05;
const HIP_OFFSET: f64 = 0.1;

/// Four-point-per-foot biped with a free hand.
#[derive(Clone, Debug, Default)]
pub struct MockBiped;

impl MockBiped {
    pub const fn new() -> Self {
        Self
    }

    /// Actuation map `[0; I]` (nq×nu).
    pub fn actuation() -> DMatrix<f64> {
        let mut b = DMatrix::zeros(NQ, NU);
        b.view_mut((NQ - NU, 0), (NU, NU)).fill_with_identity();
        b
    }

    /// First joint of the leg carrying `foot`.
    const fn leg_joint(foot: usize) -> usize {
        if foot == LEFT_FOOT { 6 } else { 9 }
    }

    fn com(state: &RobotState) -> Vector3<f64> {
        Vector3::new(state.q[0], state.q[1], state.q[2] + COM_HEIGHT)
    }

    /// Foot-center offset from the base origin.
    fn foot_offset(foot: usize) -> Vector3<f64> {
        let side = if foot == LEFT_FOOT { 1.0 } else { -1.0 };
        Vector3::new(0.0, side * HIP_OFFSET, 0.0)
    }

    fn corner_offset(point: usize) -> Vector3<f64> {
        let x = if point % 2 == 0 { FOOT_HALF_LENGTH } else { -FOOT_HALF_LENGTH };
        let y = if point < 2 { FOOT_HALF_WIDTH } else { -FOOT_HALF_WIDTH };
        Vector3::new(x, y, 0.0)
    }

    fn base_position(state: &RobotState) -> Vector3<f64> {
        Vector3::new(state.q[0], state.q[1], state.q[2])
    }

    /// 3×nq Jacobian of a point on `foot` at world position `p`.
    fn foot_point_jacobian(state: &RobotState, foot: usize, p: &Vector3<f64>) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(3, NQ);
        j.view_mut((0, 0), (3, 3)).fill_with_identity();
        let r = p - Self::com(state);
        j.view_mut((0, 3), (3, 3)).copy_from(&(-r.cross_matrix()));
        j.view_mut((0, Self::leg_joint(foot)), (3, 3))
            .fill_with_identity();
        j
    }
}

impl RigidBodyModel for MockBiped {
    fn num_dof(&self) -> usize {
        NQ
    }

    fn num_bodies(&self) -> usize {
        4
    }

    fn num_contact_points(&self, body: usize) -> usize {
        match body {
            LEFT_FOOT | RIGHT_FOOT => 4,
            _ => 0,
        }
    }

    fn mass_matrix_and_bias(
        &self,
        _state: &RobotState,
        mass_matrix: &mut DMatrix<f64>,
        bias: &mut DVector<f64>,
    ) {
        mass_matrix.fill(0.0);
        for i in 0..3 {
            mass_matrix[(i, i)] = MASS;
            mass_matrix[(3 + i, 3 + i)] = BASE_INERTIA[i];
        }
        for i in 6..NQ {
            mass_matrix[(i, i)] = JOINT_INERTIA;
        }
        bias.fill(0.0);
        bias[2] = MASS * GRAVITY;
    }

    fn center_of_mass(
        &self,
        state: &RobotState,
        jacobian: &mut DMatrix<f64>,
        jacobian_dot: &mut DMatrix<f64>,
    ) -> Vector3<f64> {
        jacobian.fill(0.0);
        jacobian.view_mut((0, 0), (3, 3)).fill_with_identity();
        jacobian_dot.fill(0.0);
        Self::com(state)
    }

    fn centroidal_momentum_matrix(
        &self,
        _state: &RobotState,
        cmm: &mut DMatrix<f64>,
        cmm_dot: &mut DMatrix<f64>,
    ) {
        cmm.fill(0.0);
        let inertia = Matrix3::from_diagonal(&Vector3::from(BASE_INERTIA));
        cmm.view_mut((0, 3), (3, 3)).copy_from(&inertia);
        for i in 0..3 {
            cmm[(i, ARM + 3 + i)] = 0.1;
            cmm[(3 + i, i)] = MASS;
        }
        cmm_dot.fill(0.0);
    }

    fn body_jacobian(&self, state: &RobotState, body: usize) -> BodyJacobian {
        let mut jacobian = DMatrix::zeros(6, NQ);
        jacobian.view_mut((0, 0), (6, 6)).fill_with_identity();
        match body {
            LEFT_FOOT | RIGHT_FOOT => {
                let p = Self::base_position(state) + Self::foot_offset(body);
                jacobian
                    .rows_mut(0, 3)
                    .copy_from(&Self::foot_point_jacobian(state, body, &p));
            }
            HAND => {
                jacobian.view_mut((0, ARM), (3, 3)).fill_with_identity();
                jacobian.view_mut((3, ARM + 3), (3, 3)).fill_with_identity();
            }
            _ => {}
        }
        BodyJacobian {
            jacobian,
            jacobian_dot: DMatrix::zeros(6, NQ),
        }
    }

    fn contact_point(
        &self,
        state: &RobotState,
        body: usize,
        point: usize,
    ) -> ContactPointKinematics {
        let position =
            Self::base_position(state) + Self::foot_offset(body) + Self::corner_offset(point);
        ContactPointKinematics {
            jacobian: Self::foot_point_jacobian(state, body, &position),
            jacobian_dot: DMatrix::zeros(3, NQ),
            position,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn actuation_is_identity_on_joints() {
        let b = MockBiped::actuation();
        assert_eq!(b.shape(), (NQ, NU));
        assert_relative_eq!(b.rows(0, 6).amax(), 0.0);
        assert_relative_eq!(b.rows(6, NU).into_owned(), DMatrix::identity(NU, NU));
    }

    #[test]
    fn gravity_acts_on_base_height() {
        let mut h = DMatrix::zeros(NQ, NQ);
        let mut c = DVector::zeros(NQ);
        MockBiped.mass_matrix_and_bias(&RobotState::zeros(NQ), &mut h, &mut c);
        assert_relative_eq!(c[2], MASS * GRAVITY);
        assert_relative_eq!(h[(0, 0)], MASS);
        assert_relative_eq!(h[(17, 17)], JOINT_INERTIA);
    }

    #[test]
    fn contact_points_lie_on_foot_corners() {
        let state = RobotState::zeros(NQ);
        let kin = MockBiped.contact_point(&state, LEFT_FOOT, 0);
        assert_relative_eq!(kin.position, Vector3::new(0.1, 0.15, 0.0));
        let kin = MockBiped.contact_point(&state, RIGHT_FOOT, 3);
        assert_relative_eq!(kin.position, Vector3::new(-0.1, -0.15, 0.0));
        // Leg joints of the right foot drive its points.
        assert_relative_eq!(kin.jacobian[(2, 11)], 1.0);
        assert_relative_eq!(kin.jacobian[(2, 8)], 0.0);
    }

    #[test]
    fn hand_is_driven_by_arm_joints() {
        let jb = MockBiped.body_jacobian(&RobotState::zeros(NQ), HAND);
        assert_relative_eq!(jb.jacobian[(0, ARM)], 1.0);
        assert_relative_eq!(jb.jacobian[(5, ARM + 5)], 1.0);
        assert_relative_eq!(jb.jacobian[(0, 0)], 1.0);
    }
}
