//! Integration test: the shipped biped configuration loads and drives a tick.

use nalgebra::Vector6;
use poise_test_utils::biped::{HAND, NQ, PELVIS};
use poise_test_utils::{biped_controller, double_support, tick_input};
use poise_wbc::constraints::BODY_ACCELERATION;
use poise_wbc::{BodyAccelInput, BodyAccelMode, ControllerConfig};

fn biped_toml() -> ControllerConfig {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../configs/biped.toml");
    ControllerConfig::from_file(path).unwrap()
}

#[test]
fn shipped_config_is_valid() {
    let config = biped_toml();
    assert!(config.validate_dof(NQ).is_ok());
    assert_eq!(
        config.body_accel_modes(),
        vec![
            BodyAccelMode::Constraint,
            BodyAccelMode::Objective { weight: 0.5 }
        ]
    );
    assert!(config.w_kdot_matrix().amax() > 0.0);
    assert_eq!(config.solver.fast_max_iters, 10);
}

#[test]
fn shipped_config_balances_in_double_support() {
    let mut controller = biped_controller(biped_toml(), None).unwrap();
    let mut input = tick_input(double_support());
    input.use_fast_qp = true;

    // Hold the pelvis orientation, leave its translation free.
    let mut pelvis = Vector6::repeat(f64::NAN);
    pelvis.fixed_rows_mut::<3>(3).fill(0.0);
    input.body_accel_inputs = vec![
        BodyAccelInput {
            body: PELVIS + 1,
            accel: pelvis,
        },
        BodyAccelInput {
            body: HAND + 1,
            accel: Vector6::new(0.2, 0.0, 0.0, 0.0, 0.0, 0.0),
        },
    ];

    let tick = controller.assemble(&input).unwrap();
    assert_eq!(tick.problem.equalities.block_rows(BODY_ACCELERATION), 3);

    let out = controller.step(&input).unwrap();
    assert!(out.status.is_optimal(), "status {:?}", out.status);
    for axis in 3..6 {
        assert!(out.qdd[axis].abs() < 1e-5);
    }
}
