//! Collaborator traits: rigid-body dynamics and terrain queries.
//!
//! The controller never computes dynamics itself. A concrete multibody
//! library implements [`RigidBodyModel`] and a height-map service
//! implements [`TerrainMap`]; the controller owns both for its lifetime.

use nalgebra::{DMatrix, DVector, Unit, Vector3};

use crate::types::RobotState;

/// Kinematics of one contact point at the current state.
#[derive(Clone, Debug)]
pub struct ContactPointKinematics {
    /// World-frame position.
    pub position: Vector3<f64>,
    /// 3×nq translational Jacobian.
    pub jacobian: DMatrix<f64>,
    /// Time derivative of `jacobian`.
    pub jacobian_dot: DMatrix<f64>,
}

/// Spatial Jacobian of a body origin, rows `[linear xyz; angular rpy]`.
#[derive(Clone, Debug)]
pub struct BodyJacobian {
    /// 6×nq Jacobian.
    pub jacobian: DMatrix<f64>,
    /// Time derivative of `jacobian`.
    pub jacobian_dot: DMatrix<f64>,
}

/// Rigid-body dynamics and kinematics of a floating-base robot.
///
/// The first six generalized coordinates are the floating base. Methods that
/// take output buffers write into them without resizing; the controller
/// sizes them once at initialization.
pub trait RigidBodyModel {
    /// Degrees of freedom (floating base included).
    fn num_dof(&self) -> usize;

    /// Number of bodies; valid body indices are `0..num_bodies()`.
    fn num_bodies(&self) -> usize;

    /// Contact points defined on `body`.
    fn num_contact_points(&self, body: usize) -> usize;

    /// Mass matrix `H` (nq×nq) and bias forces `C` (nq).
    fn mass_matrix_and_bias(
        &self,
        state: &RobotState,
        mass_matrix: &mut DMatrix<f64>,
        bias: &mut DVector<f64>,
    );

    /// Center-of-mass position, writing its 3×nq Jacobian and derivative.
    fn center_of_mass(
        &self,
        state: &RobotState,
        jacobian: &mut DMatrix<f64>,
        jacobian_dot: &mut DMatrix<f64>,
    ) -> Vector3<f64>;

    /// Centroidal momentum matrix (6×nq, angular rows first) and derivative.
    fn centroidal_momentum_matrix(
        &self,
        state: &RobotState,
        cmm: &mut DMatrix<f64>,
        cmm_dot: &mut DMatrix<f64>,
    );

    /// Spatial Jacobian of the origin of `body`.
    fn body_jacobian(&self, state: &RobotState, body: usize) -> BodyJacobian;

    /// Kinematics of contact point `point` on `body`.
    fn contact_point(&self, state: &RobotState, body: usize, point: usize)
    -> ContactPointKinematics;
}

/// Result of a terrain query below a point.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainContact {
    /// Closest terrain point.
    pub point: Vector3<f64>,
    /// Outward surface normal.
    pub normal: Unit<Vector3<f64>>,
}

/// Terrain geometry service.
pub trait TerrainMap {
    /// Terrain point and normal below `point`.
    fn query(&self, point: &Vector3<f64>) -> TerrainContact;
}

/// Horizontal ground plane at a fixed height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatTerrain {
    pub height: f64,
}

impl FlatTerrain {
    pub const fn new(height: f64) -> Self {
        Self { height }
    }
}

impl TerrainMap for FlatTerrain {
    fn query(&self, point: &Vector3<f64>) -> TerrainContact {
        TerrainContact {
            point: Vector3::new(point.x, point.y, self.height),
            normal: Vector3::z_axis(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the traits are object-safe.
    #[test]
    fn traits_are_object_safe() {
        fn _accepts_model(_: &dyn RigidBodyModel) {}
        fn _accepts_terrain(_: Box<dyn TerrainMap>) {}
    }

    #[test]
    fn flat_terrain_projects_onto_plane() {
        let terrain = FlatTerrain::new(0.25);
        let contact = terrain.query(&Vector3::new(1.0, -2.0, 3.0));
        assert!((contact.point.z - 0.25).abs() < f64::EPSILON);
        assert!((contact.point.x - 1.0).abs() < f64::EPSILON);
        assert!((contact.normal.z - 1.0).abs() < f64::EPSILON);
    }
}
