//! Whole-body balance QP controller for floating-base legged robots.
//!
//! Each control tick turns the robot state, a COM/ZMP tracking target,
//! desired joint accelerations and the current supports into one quadratic
//! program over
//!
//! ```text
//! alpha = [qdd (nq); beta (nc * 4); eps (nc * 3)]
//! ```
//!
//! and back-substitutes its solution into actuator torques.
//!
//! 1. **Contact resolver**: desired supports to active contact points and
//!    a four-edge friction pyramid per point
//! 2. **Objective assembler**: COM/ZMP tracking, joint-acceleration tracking,
//!    optional centroidal angular momentum and soft body-acceleration targets
//! 3. **Constraint assembler**: floating-base dynamics, slack-softened
//!    contact acceleration, hard body-acceleration and pinned-joint rows,
//!    actuator saturation and variable bounds
//! 4. **Solver cascade**: fast block-inverse active set, warm-started dense
//!    active set, then a cold clarabel interior-point solve
//! 5. **Command synthesizer**: `tau = B_actᵀ (H_act qdd + C_act - D_act beta)`
//!
//! # Architecture
//!
//! Dynamics and terrain are collaborators behind the [`RigidBodyModel`] and
//! [`TerrainMap`] traits. [`QpController`] owns them together with the
//! persistent [`ControllerState`] (weights, limits, scratch buffers and the
//! warm start carried between ticks). The QP is sized once per tick from
//! the active contact count before anything is assembled.

pub mod command;
pub mod config;
pub mod constraints;
pub mod contact;
pub mod controller;
pub mod error;
pub mod model;
pub mod objective;
pub mod problem;
pub mod qp;
pub mod tasks;
pub mod types;

pub use command::{SolutionParts, actuator_torque};
pub use config::{ControllerConfig, SolverConfig};
pub use constraints::{
    BlockSpan, ConstraintStack, ConstraintStackBuilder, Constraints, assemble_constraints,
};
pub use contact::{ContactBasis, contact_basis, resolve_supports, surface_tangents};
pub use controller::{AssembledTick, ControllerState, QpController, TickOutput};
pub use error::{ConfigError, ControllerError, InputError};
pub use model::{
    BodyJacobian, ContactPointKinematics, FlatTerrain, RigidBodyModel, TerrainContact, TerrainMap,
};
pub use objective::{Objective, assemble_objective};
pub use problem::{ProblemShape, QpDimensions, QpProblem};
pub use qp::{
    Basis, FailureReason, SolveDiagnostic, SolveReport, SolveStatus, SolverCascade, SolverTier,
    WarmStart,
};
pub use types::{
    BodyAccelInput, BodyAccelMode, RobotState, SupportRequest, SupportStateElement, TickInput,
    ZmpTracking,
};
