//! Integration test: input contract violations are rejected before solving.

use nalgebra::{DVector, Vector6};
use poise_test_utils::biped::{HAND, LEFT_FOOT, NQ};
use poise_test_utils::{biped_config, biped_controller, double_support, tick_input};
use poise_wbc::{
    BodyAccelInput, ControllerConfig, ControllerError, InputError, SupportRequest,
};

fn input_error(result: Result<poise_wbc::TickOutput, ControllerError>) -> InputError {
    match result {
        Err(ControllerError::Input(err)) => err,
        other => panic!("expected input error, got {other:?}"),
    }
}

#[test]
fn wrong_qdd_des_length() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(Vec::new());
    input.qdd_des = DVector::zeros(NQ - 1);
    assert_eq!(
        input_error(controller.step(&input)),
        InputError::DimensionMismatch {
            what: "qdd_des",
            expected: NQ,
            got: NQ - 1,
        }
    );
}

#[test]
fn non_finite_state() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(double_support());
    input.state.qd[3] = f64::NAN;
    assert_eq!(
        input_error(controller.step(&input)),
        InputError::NonFinite { what: "qd" }
    );
}

#[test]
fn negative_friction_coefficient() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(double_support());
    input.mu = -0.1;
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::NonFinite { what: "mu" }
    ));
}

#[test]
fn unknown_support_body_and_point() {
    let mut controller = biped_controller(biped_config(), None).unwrap();

    let input = tick_input(vec![SupportRequest {
        body: 9,
        contact_pts: vec![1],
        contact_surface: 1,
    }]);
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::UnknownBody { body: 9, .. }
    ));

    let input = tick_input(vec![SupportRequest {
        body: LEFT_FOOT + 1,
        contact_pts: vec![5],
        contact_surface: 1,
    }]);
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::UnknownContactPoint { point: 5, .. }
    ));
}

#[test]
fn zero_based_joint_index() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    let mut input = tick_input(Vec::new());
    input.constrained_joints = vec![0];
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::ZeroIndex { .. }
    ));

    input.constrained_joints = vec![NQ + 1];
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::UnknownJoint { joint, nq: NQ } if joint == NQ + 1
    ));
}

#[test]
fn body_accel_slot_count_must_match_config() {
    let config = ControllerConfig {
        body_accel_input_weights: vec![1.0],
        ..biped_config()
    };
    let mut controller = biped_controller(config, None).unwrap();
    let input = tick_input(Vec::new());
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::DimensionMismatch {
            what: "body_accel_inputs",
            expected: 1,
            got: 0,
        }
    ));
}

#[test]
fn infinite_body_acceleration() {
    let config = ControllerConfig {
        body_accel_input_weights: vec![1.0],
        ..biped_config()
    };
    let mut controller = biped_controller(config, None).unwrap();
    let mut input = tick_input(Vec::new());
    let mut accel = Vector6::zeros();
    accel[1] = f64::INFINITY;
    input.body_accel_inputs = vec![BodyAccelInput {
        body: HAND + 1,
        accel,
    }];
    assert!(matches!(
        input_error(controller.step(&input)),
        InputError::NonFinite { .. }
    ));
}

#[test]
fn rejected_tick_leaves_warm_start_untouched() {
    let mut controller = biped_controller(biped_config(), None).unwrap();
    controller.step(&tick_input(double_support())).unwrap();
    let generation = controller.state().warm_start().generation();

    let mut input = tick_input(double_support());
    input.terrain_height = f64::NAN;
    assert!(controller.step(&input).is_err());
    assert_eq!(controller.state().warm_start().generation(), generation);
}
