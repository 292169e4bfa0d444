//! Integration test: QP assembly for the mock biped.
//!
//! Builds ticks without solving them and checks that:
//! 1. The variable count follows the active contact points
//! 2. Without contacts the cost reduces to plain acceleration tracking
//! 3. Hard body-acceleration targets and pinned joints add equality rows
//! 4. The terrain normal shapes the friction cone
//! 5. Soft body targets and the angular-momentum weight reach the cost

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3, Vector6};
use poise_test_utils::biped::{ARM, HAND, LEFT_FOOT, NQ, NU};
use poise_test_utils::{
    SlopedTerrain, biped_config, biped_controller, double_support, foot_support, tick_input,
};
use poise_wbc::constraints::{
    ACTUATOR_LOWER, ACTUATOR_UPPER, BODY_ACCELERATION, FLOATING_BASE_DYNAMICS,
    RELATIVE_ACCELERATION, SPECIFIED_JOINTS,
};
use poise_wbc::types::{FORCE_COEFF_BOUND, QDD_BOUND, REG};
use poise_wbc::{BodyAccelInput, ControllerConfig, RigidBodyModel, RobotState, SupportRequest};

#[test]
fn nparams_follows_contact_points() {
    let mut controller = biped_controller(biped_config(), None).unwrap();

    for (support, nc) in [
        (Vec::new(), 0),
        (vec![foot_support(LEFT_FOOT)], 4),
        (double_support(), 8),
    ] {
        let tick = controller.assemble(&tick_input(support)).unwrap();
        let dims = tick.dims();
        assert_eq!(dims.nc, nc);
        assert_eq!(dims.nf, 4 * nc);
        assert_eq!(dims.neps, 3 * nc);
        assert_eq!(dims.nparams, NQ + 7 * nc);
        assert_eq!(tick.problem.f.len(), dims.nparams);
        assert_eq!(tick.problem.lb.len(), dims.nparams);
        assert!(tick.problem.is_consistent());
    }
}

#[test]
fn zero_contacts_track_desired_accelerations() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(Vec::new());
    input.qdd_des = DVector::from_fn(NQ, |i, _| 0.1 * f64::from(u32::try_from(i).unwrap()));

    let tick = controller.assemble(&input).unwrap();
    let problem = &tick.problem;

    assert_relative_eq!(problem.f, -&input.qdd_des);
    assert_relative_eq!(
        problem.cost.qdd,
        DMatrix::identity(NQ, NQ) * (1.0 + REG)
    );
    assert!(tick.lipm.is_none());

    assert_eq!(problem.aeq().nrows(), 6);
    assert_eq!(problem.equalities.block_rows(FLOATING_BASE_DYNAMICS), 6);
    assert_eq!(problem.equalities.block_rows(RELATIVE_ACCELERATION), 0);
    assert_eq!(problem.ain().shape(), (2 * NU, NQ));
    assert_eq!(problem.inequalities.block_rows(ACTUATOR_UPPER), NU);
    assert_eq!(problem.inequalities.block_rows(ACTUATOR_LOWER), NU);
    assert_relative_eq!(problem.ub, DVector::from_element(NQ, QDD_BOUND));
}

#[test]
fn double_support_shapes_constraints() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let tick = controller.assemble(&tick_input(double_support())).unwrap();
    let problem = &tick.problem;
    let dims = tick.dims();

    assert_eq!(dims.nf, 32);
    assert_eq!(problem.ain().shape(), (2 * NU, dims.nparams));
    assert_eq!(problem.aeq().nrows(), 6 + 3 * dims.nc);
    assert_eq!(problem.equalities.block_rows(RELATIVE_ACCELERATION), 24);
    assert!(tick.lipm.is_some());

    // Force coefficients are non-negative, slack is symmetric.
    let forces = dims.forces();
    assert_relative_eq!(problem.lb.rows(forces.start, dims.nf).amax(), 0.0);
    assert_relative_eq!(problem.ub[forces.start], FORCE_COEFF_BOUND);
    let slack = dims.slack();
    let limit = controller.state().config().slack_limit;
    assert_relative_eq!(problem.lb[slack.start], -limit);
    assert_relative_eq!(problem.ub[slack.end - 1], limit);

    // Host-level supports are 1-based; internally the feet are bodies 1 and 2.
    let bodies: Vec<usize> = tick.supports.iter().map(|s| s.body).collect();
    assert_eq!(bodies, vec![1, 2]);
}

#[test]
fn hard_body_acceleration_adds_jacobian_rows() {
    let config = ControllerConfig {
        body_accel_input_weights: vec![-1.0],
        ..biped_config()
    };
    let mut controller = biped_controller(config, None).unwrap();
    let mut input = tick_input(double_support());
    let accel = Vector6::new(0.5, 0.0, -0.25, 0.0, 0.1, 0.0);
    input.body_accel_inputs = vec![BodyAccelInput {
        body: HAND + 1,
        accel,
    }];

    let tick = controller.assemble(&input).unwrap();
    let problem = &tick.problem;
    let span = problem.equalities.block(BODY_ACCELERATION).unwrap().clone();
    assert_eq!(span.len, 6);
    assert_eq!(problem.aeq().nrows(), 6 + 24 + 6);

    let jb = controller
        .model()
        .body_jacobian(&RobotState::zeros(NQ), HAND)
        .jacobian;
    let rows = problem.aeq().rows(span.start, span.len);
    assert_relative_eq!(rows.columns(0, NQ).into_owned(), jb);
    assert_relative_eq!(rows.columns(NQ, tick.dims().nparams - NQ).amax(), 0.0);
    // Jbdot is zero for the mock, so the rhs is the target itself.
    for axis in 0..6 {
        assert_relative_eq!(problem.beq()[span.start + axis], accel[axis]);
    }
}

#[test]
fn unspecified_axes_and_supported_bodies_add_no_rows() {
    let config = ControllerConfig {
        body_accel_input_weights: vec![-1.0, -1.0],
        ..biped_config()
    };
    let mut controller = biped_controller(config, None).unwrap();
    let mut input = tick_input(double_support());
    let mut partial = Vector6::repeat(f64::NAN);
    partial[2] = 1.0;
    input.body_accel_inputs = vec![
        BodyAccelInput {
            body: HAND + 1,
            accel: partial,
        },
        // Left foot is in support; its target is dropped.
        BodyAccelInput {
            body: LEFT_FOOT + 1,
            accel: Vector6::zeros(),
        },
    ];

    let tick = controller.assemble(&input).unwrap();
    assert_eq!(tick.problem.equalities.block_rows(BODY_ACCELERATION), 1);
}

#[test]
fn pinned_joint_adds_one_hot_row() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(Vec::new());
    input.qdd_des[ARM] = 3.0;
    // Duplicates collapse.
    input.constrained_joints = vec![ARM + 1, ARM + 1];

    let tick = controller.assemble(&input).unwrap();
    let problem = &tick.problem;
    let span = problem.equalities.block(SPECIFIED_JOINTS).unwrap().clone();
    assert_eq!(span.len, 1);
    let row = problem.aeq().row(span.start);
    assert_relative_eq!(row[ARM], 1.0);
    assert_relative_eq!(row.sum(), 1.0);
    assert_relative_eq!(problem.beq()[span.start], 3.0);
}

#[test]
fn sloped_terrain_tilts_friction_cone() {
    let slope = 0.2;
    let terrain = SlopedTerrain::new(0.0, slope);
    let mut controller = biped_controller(biped_config(), Some(Box::new(terrain))).unwrap();
    let mut input = tick_input(vec![foot_support(LEFT_FOOT)]);
    input.mu = 0.5;

    let tick = controller.assemble(&input).unwrap();
    let normal = Vector3::new(-slope, 0.0, 1.0).normalize();
    let basis = &tick.contacts.basis;
    assert_eq!(basis.ncols(), 16);
    for edge in basis.column_iter() {
        assert_relative_eq!(edge.norm(), 1.0, epsilon = 1e-12);
        // Each edge sits on the cone surface: n·v = 1/sqrt(1 + mu²).
        assert_relative_eq!(edge.dot(&normal), 1.0 / 1.25_f64.sqrt(), epsilon = 1e-12);
    }
}

#[test]
fn two_contact_points_with_unit_friction() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(vec![SupportRequest {
        body: LEFT_FOOT + 1,
        contact_pts: vec![1, 2],
        contact_surface: 1,
    }]);
    input.mu = 1.0;

    let tick = controller.assemble(&input).unwrap();
    let dims = tick.dims();
    assert_eq!(dims.nc, 2);
    assert_eq!(dims.nf, 8);
    assert_eq!(dims.nparams, NQ + 8 + 6);
    assert_eq!(tick.problem.ain().shape(), (2 * NU, dims.nparams));
    // 45 degree cone edges on flat ground.
    let s = std::f64::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(tick.contacts.basis[(2, 0)], s, epsilon = 1e-12);
    assert_relative_eq!(tick.contacts.basis[(0, 0)], s, epsilon = 1e-12);
    assert_relative_eq!(tick.contacts.basis[(0, 2)], -s, epsilon = 1e-12);
}

#[test]
fn soft_body_acceleration_enters_cost() {
    let weight = 2.0;
    let config = ControllerConfig {
        body_accel_input_weights: vec![weight],
        ..biped_config()
    };
    let mut soft = biped_controller(config, None).unwrap();
    let mut plain = biped_controller(biped_config(), None).unwrap();

    let mut input = tick_input(double_support());
    let baseline = plain.assemble(&input).unwrap();
    let accel = Vector6::new(0.0, 0.0, 1.0, 0.2, 0.0, -0.5);
    input.body_accel_inputs = vec![BodyAccelInput {
        body: HAND + 1,
        accel,
    }];
    let tick = soft.assemble(&input).unwrap();

    // Soft targets stay out of the constraints.
    assert_eq!(tick.problem.equalities.block_rows(BODY_ACCELERATION), 0);
    assert_eq!(tick.problem.aeq().nrows(), baseline.problem.aeq().nrows());

    let jb = soft
        .model()
        .body_jacobian(&RobotState::zeros(NQ), HAND)
        .jacobian;
    let jt = jb.transpose();
    assert_relative_eq!(
        &tick.problem.cost.qdd - &baseline.problem.cost.qdd,
        &jt * &jb * weight,
        epsilon = 1e-9
    );
    let df = &tick.problem.f - &baseline.problem.f;
    assert_relative_eq!(
        df.rows(0, NQ).into_owned(),
        -(&jt * accel) * weight,
        epsilon = 1e-9
    );
    assert_relative_eq!(df.rows(NQ, tick.dims().nparams - NQ).amax(), 0.0);
}

#[test]
fn angular_momentum_weight_needs_contacts() {
    let mut w_kdot = [[0.0; 3]; 3];
    w_kdot[0][0] = 0.5;
    w_kdot[1][1] = 0.5;
    w_kdot[2][2] = 2.0;
    let config = ControllerConfig {
        w_kdot,
        ..biped_config()
    };
    let mut weighted = biped_controller(config, None).unwrap();
    let mut plain = biped_controller(biped_config(), None).unwrap();

    // Flying: the weight has nothing to act on.
    let flight = tick_input(Vec::new());
    let a = weighted.assemble(&flight).unwrap();
    let b = plain.assemble(&flight).unwrap();
    assert_relative_eq!(a.problem.cost.qdd, b.problem.cost.qdd);
    assert_relative_eq!(a.problem.f, b.problem.f);

    // Standing at rest: the Hessian gains Akᵀ W Ak, the linear term is unchanged.
    let stance = tick_input(double_support());
    let a = weighted.assemble(&stance).unwrap();
    let b = plain.assemble(&stance).unwrap();

    let mut cmm = DMatrix::zeros(6, NQ);
    let mut cmm_dot = DMatrix::zeros(6, NQ);
    weighted
        .model()
        .centroidal_momentum_matrix(&stance.state, &mut cmm, &mut cmm_dot);
    let ak = cmm.rows(0, 3).into_owned();
    let w = Matrix3::from_diagonal(&Vector3::new(0.5, 0.5, 2.0));
    let expected = ak.transpose() * w * &ak;

    let delta = &a.problem.cost.qdd - &b.problem.cost.qdd;
    assert_relative_eq!(delta, expected, epsilon = 1e-9);
    // Arm joints only couple through the momentum rows.
    assert_relative_eq!(delta[(ARM + 3, ARM + 3)], 0.01 * 0.5, epsilon = 1e-12);
    assert_relative_eq!(a.problem.f, b.problem.f, epsilon = 1e-12);
}
