//! Shared test fixtures for the balance controller.
//!
//! Provides a deterministic rigid-body model, terrain maps and ready-made
//! tick inputs so integration tests can drive the controller end to end
//! without a physics library.

pub mod biped;
pub mod fixtures;
pub mod terrain;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use biped::MockBiped;
pub use fixtures::{
    TORQUE_LIMIT, biped_config, biped_controller, double_support, foot_support,
    free_fall_qdd_des, standing_zmp, tick_input, torque_limits,
};
pub use terrain::SlopedTerrain;
