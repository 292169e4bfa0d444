//! Balance controller: persistent state plus the per-tick pipeline.
//!
//! ```text
//! TickInput ─► validate ─► resolve supports ─► size QP ─► dynamics
//!           ─► objective + constraints ─► solver cascade ─► torque
//! ```

use nalgebra::{DMatrix, DVector, Matrix3};
use tracing::warn;

use crate::command::{SolutionParts, actuator_torque};
use crate::config::ControllerConfig;
use crate::constraints::{ConstraintInputs, assemble_constraints};
use crate::contact::{ContactBasis, contact_basis, count_contact_points, resolve_supports, to_zero_based};
use crate::error::{ConfigError, ControllerError, InputError};
use crate::model::{FlatTerrain, RigidBodyModel, TerrainMap};
use crate::objective::{ContactTracking, ObjectiveInputs, assemble_objective};
use crate::problem::{QpDimensions, QpProblem};
use crate::qp::{SolveDiagnostic, SolveStatus, SolverCascade, SolverTier, WarmStart};
use crate::tasks::{AngularMomentumTask, LipmTask, angular_momentum_enabled, body_accel_rows};
use crate::types::{
    BodyAccelMode, BodyAccelTarget, FLOATING_BASE_DOF, RobotState, SupportStateElement, TickInput,
};

/// Largest deviation of `B_actᵀ B_act` from identity accepted as orthogonal.
const ORTHOGONALITY_TOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Persistent state
// ---------------------------------------------------------------------------

/// Dynamics buffers sized once at initialization and refreshed every tick.
#[derive(Clone, Debug)]
struct DynamicsScratch {
    h: DMatrix<f64>,
    c: DVector<f64>,
    h_float: DMatrix<f64>,
    c_float: DVector<f64>,
    h_act: DMatrix<f64>,
    c_act: DVector<f64>,
    com_jacobian: DMatrix<f64>,
    com_jacobian_dot: DMatrix<f64>,
    cmm: DMatrix<f64>,
    cmm_dot: DMatrix<f64>,
}

impl DynamicsScratch {
    fn new(nq: usize, nu: usize) -> Self {
        Self {
            h: DMatrix::zeros(nq, nq),
            c: DVector::zeros(nq),
            h_float: DMatrix::zeros(FLOATING_BASE_DOF, nq),
            c_float: DVector::zeros(FLOATING_BASE_DOF),
            h_act: DMatrix::zeros(nu, nq),
            c_act: DVector::zeros(nu),
            com_jacobian: DMatrix::zeros(3, nq),
            com_jacobian_dot: DMatrix::zeros(3, nq),
            cmm: DMatrix::zeros(6, nq),
            cmm_dot: DMatrix::zeros(6, nq),
        }
    }

    /// Mass matrix and bias with their floating and actuated partitions.
    fn refresh_dynamics<M: RigidBodyModel + ?Sized>(
        &mut self,
        model: &M,
        state: &RobotState,
        dims: &QpDimensions,
    ) {
        model.mass_matrix_and_bias(state, &mut self.h, &mut self.c);
        self.h_float.copy_from(&self.h.rows_range(dims.float_rows()));
        self.c_float.copy_from(&self.c.rows_range(dims.float_rows()));
        self.h_act.copy_from(&self.h.rows_range(dims.actuated_rows()));
        self.c_act.copy_from(&self.c.rows_range(dims.actuated_rows()));
    }
}

/// Everything that persists across ticks.
#[derive(Clone, Debug)]
pub struct ControllerState {
    config: ControllerConfig,
    body_accel_modes: Vec<BodyAccelMode>,
    w_qdd: DVector<f64>,
    w_kdot: Matrix3<f64>,
    angular_momentum: bool,
    /// nq×nu actuation map.
    actuation: DMatrix<f64>,
    /// Actuated rows of the actuation map (nu×nu, orthogonal).
    b_act: DMatrix<f64>,
    umin: DVector<f64>,
    umax: DVector<f64>,
    scratch: DynamicsScratch,
    warm_start: WarmStart,
}

impl ControllerState {
    /// Validate the configuration against the model and build the state.
    pub fn new(
        config: ControllerConfig,
        nq: usize,
        actuation: DMatrix<f64>,
        umin: DVector<f64>,
        umax: DVector<f64>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        config.validate_dof(nq)?;

        if actuation.nrows() != nq {
            return Err(ConfigError::DimensionMismatch {
                what: "actuation rows",
                expected: nq,
                got: actuation.nrows(),
            });
        }
        let nu = actuation.ncols();
        if nu + FLOATING_BASE_DOF != nq {
            return Err(ConfigError::FloatingBaseMismatch { nu, nq });
        }
        for (what, limit) in [("umin", &umin), ("umax", &umax)] {
            if limit.len() != nu {
                return Err(ConfigError::DimensionMismatch {
                    what,
                    expected: nu,
                    got: limit.len(),
                });
            }
        }
        for (index, (&lo, &hi)) in umin.iter().zip(umax.iter()).enumerate() {
            if lo > hi {
                return Err(ConfigError::InvertedTorqueLimits {
                    index,
                    umin: lo,
                    umax: hi,
                });
            }
        }

        let b_act = actuation.rows(FLOATING_BASE_DOF, nu).into_owned();
        let gram_error = (b_act.transpose() * &b_act - DMatrix::identity(nu, nu)).amax();
        if gram_error > ORTHOGONALITY_TOL {
            return Err(ConfigError::InvalidValue {
                field: "actuation".into(),
                message: "actuated block must be orthogonal".into(),
            });
        }
        if actuation.rows(0, FLOATING_BASE_DOF).amax() > 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "actuation".into(),
                message: "floating-base rows must be zero".into(),
            });
        }

        let w_kdot = config.w_kdot_matrix();
        Ok(Self {
            body_accel_modes: config.body_accel_modes(),
            w_qdd: DVector::from_vec(config.w_qdd.clone()),
            angular_momentum: angular_momentum_enabled(&w_kdot),
            w_kdot,
            actuation,
            b_act,
            umin,
            umax,
            scratch: DynamicsScratch::new(nq, nu),
            warm_start: WarmStart::default(),
            config,
        })
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn body_accel_modes(&self) -> &[BodyAccelMode] {
        &self.body_accel_modes
    }

    pub const fn actuation(&self) -> &DMatrix<f64> {
        &self.actuation
    }

    pub const fn warm_start(&self) -> &WarmStart {
        &self.warm_start
    }

    pub fn num_actuators(&self) -> usize {
        self.b_act.nrows()
    }
}

// ---------------------------------------------------------------------------
// Tick data
// ---------------------------------------------------------------------------

/// Per-tick problem before solving.
#[derive(Clone, Debug)]
pub struct AssembledTick {
    pub problem: QpProblem,
    pub supports: Vec<SupportStateElement>,
    pub contacts: ContactBasis,
    /// COM tracking data; `None` without contacts.
    pub lipm: Option<LipmTask>,
}

impl AssembledTick {
    pub const fn dims(&self) -> &QpDimensions {
        &self.problem.dims
    }
}

/// Result of one tick, in the host's output order.
#[derive(Clone, Debug)]
pub struct TickOutput {
    pub torque: DVector<f64>,
    pub qdd: DVector<f64>,
    pub status: SolveStatus,
    /// 1-based bodies of the active supports.
    pub active_supports: Vec<usize>,
    pub alpha: DVector<f64>,
    pub hqp: DMatrix<f64>,
    pub f: DVector<f64>,
    pub aeq: DMatrix<f64>,
    pub beq: DVector<f64>,
    /// `[Ain; -I; I]`.
    pub ain_lb_ub: DMatrix<f64>,
    /// `[bin; -lb; ub]`.
    pub bin_lb_ub: DVector<f64>,
    pub force_cost_diag: DVector<f64>,
    pub slack_cost_diag: DVector<f64>,
    /// Lyapunov-derivative estimate of the COM tracking task (zero without contacts).
    pub vdot: f64,
    /// Tier whose solution was used; `None` when every tier failed.
    pub tier: Option<SolverTier>,
    pub diagnostics: Vec<SolveDiagnostic>,
    pub dims: QpDimensions,
}

/// Input after index conversion and mode resolution.
struct ValidatedInput {
    targets: Vec<BodyAccelTarget>,
    constrained_joints: Vec<usize>,
}

// ---------------------------------------------------------------------------
// QpController
// ---------------------------------------------------------------------------

/// Whole-body balance QP controller.
pub struct QpController<M: RigidBodyModel> {
    model: M,
    terrain: Option<Box<dyn TerrainMap>>,
    state: ControllerState,
    cascade: SolverCascade,
}

impl<M: RigidBodyModel> QpController<M> {
    /// Build the controller. Without a terrain map the ground is flat at the
    /// per-tick `terrain_height`.
    pub fn new(
        config: ControllerConfig,
        model: M,
        actuation: DMatrix<f64>,
        umin: DVector<f64>,
        umax: DVector<f64>,
        terrain: Option<Box<dyn TerrainMap>>,
    ) -> Result<Self, ControllerError> {
        let state = ControllerState::new(config, model.num_dof(), actuation, umin, umax)?;
        if terrain.is_none() {
            warn!("no terrain map supplied, assuming flat terrain at the per-tick height");
        }
        let cascade = SolverCascade::new(&state.config.solver);
        Ok(Self {
            model,
            terrain,
            state,
            cascade,
        })
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    pub const fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Forget the stored basis and solution.
    pub fn reset_warm_start(&mut self) {
        self.state.warm_start.clear();
    }

    /// Build this tick's QP without solving it.
    pub fn assemble(&mut self, input: &TickInput) -> Result<AssembledTick, ControllerError> {
        let validated = self.validate(input)?;
        let model = &self.model;
        let state = &mut self.state;
        let robot = &input.state;
        let nq = model.num_dof();

        let supports = resolve_supports(model, &input.support)?;
        let dims = QpDimensions::new(nq, state.num_actuators(), count_contact_points(&supports));

        state.scratch.refresh_dynamics(model, robot, &dims);

        let flat = FlatTerrain::new(input.terrain_height);
        let terrain: &dyn TerrainMap = self.terrain.as_deref().unwrap_or(&flat);
        let contacts = contact_basis(model, robot, &supports, terrain, input.mu);

        let scratch = &mut state.scratch;
        let (lipm, angular) = if dims.has_contacts() {
            let com =
                model.center_of_mass(robot, &mut scratch.com_jacobian, &mut scratch.com_jacobian_dot);
            let lipm = LipmTask::new(
                &com,
                &scratch.com_jacobian,
                &scratch.com_jacobian_dot,
                &robot.qd,
                &input.zmp,
            );
            let angular = state.angular_momentum.then(|| {
                model.centroidal_momentum_matrix(robot, &mut scratch.cmm, &mut scratch.cmm_dot);
                AngularMomentumTask::new(
                    &scratch.cmm,
                    &scratch.cmm_dot,
                    &robot.qd,
                    state.w_kdot,
                    state.config.kp_ang,
                )
            });
            (Some(lipm), angular)
        } else {
            (None, None)
        };

        let body_rows = body_accel_rows(model, robot, &validated.targets, &supports);

        let objective = assemble_objective(
            &dims,
            &ObjectiveInputs {
                qdd_des: &input.qdd_des,
                w_qdd: &state.w_qdd,
                tracking: lipm.as_ref().map(|lipm| ContactTracking {
                    lipm,
                    zmp: &input.zmp,
                    angular: angular.as_ref(),
                }),
                body_objectives: &body_rows.objectives,
                w_grf: state.config.w_grf,
                w_slack: state.config.w_slack,
            },
        );

        let scratch = &state.scratch;
        let constraints = assemble_constraints(
            &dims,
            &ConstraintInputs {
                h_float: &scratch.h_float,
                c_float: &scratch.c_float,
                h_act: &scratch.h_act,
                c_act: &scratch.c_act,
                b_act: &state.b_act,
                umin: &state.umin,
                umax: &state.umax,
                contacts: &contacts,
                qd: &robot.qd,
                qdd_des: &input.qdd_des,
                body_rows: &body_rows.constraints,
                constrained_joints: &validated.constrained_joints,
                relative_accel_damping: state.config.relative_accel_damping,
                slack_limit: state.config.slack_limit,
            },
        );

        Ok(AssembledTick {
            problem: QpProblem::new(dims, objective, constraints),
            supports,
            contacts,
            lipm,
        })
    }

    /// Run one control tick.
    pub fn step(&mut self, input: &TickInput) -> Result<TickOutput, ControllerError> {
        let tick = self.assemble(input)?;
        let dims = tick.problem.dims;

        let report = self
            .cascade
            .solve(&tick.problem, input.use_fast_qp, &mut self.state.warm_start);

        let parts = SolutionParts::split(&dims, &report.alpha);
        let scratch = &self.state.scratch;
        let torque = actuator_torque(
            &dims,
            &parts,
            &self.state.b_act,
            &scratch.h_act,
            &scratch.c_act,
            &tick.contacts,
        );
        let vdot = tick
            .lipm
            .as_ref()
            .map_or(0.0, |lipm| lipm.lyapunov_derivative(&input.zmp, &parts.qdd));

        let (ain_lb_ub, bin_lb_ub) = tick.problem.stacked_inequalities();
        let problem = tick.problem;
        Ok(TickOutput {
            torque,
            qdd: parts.qdd,
            status: report.status,
            active_supports: tick.supports.iter().map(|s| s.body + 1).collect(),
            alpha: report.alpha,
            hqp: problem.cost.qdd,
            f: problem.f,
            aeq: problem.equalities.matrix,
            beq: problem.equalities.rhs,
            ain_lb_ub,
            bin_lb_ub,
            force_cost_diag: problem.cost.force,
            slack_cost_diag: problem.cost.slack,
            vdot,
            tier: report.tier,
            diagnostics: report.diagnostics,
            dims,
        })
    }

    /// Check input dimensions and indices, converting to 0-based.
    fn validate(&self, input: &TickInput) -> Result<ValidatedInput, InputError> {
        let nq = self.model.num_dof();
        for (what, len) in [
            ("qdd_des", input.qdd_des.len()),
            ("q", input.state.q.len()),
            ("qd", input.state.qd.len()),
        ] {
            if len != nq {
                return Err(InputError::DimensionMismatch {
                    what,
                    expected: nq,
                    got: len,
                });
            }
        }
        for (what, values) in [
            ("qdd_des", &input.qdd_des),
            ("q", &input.state.q),
            ("qd", &input.state.qd),
        ] {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(InputError::NonFinite { what });
            }
        }
        if !(input.mu.is_finite() && input.mu >= 0.0) {
            return Err(InputError::NonFinite { what: "mu" });
        }
        if !input.terrain_height.is_finite() {
            return Err(InputError::NonFinite {
                what: "terrain_height",
            });
        }

        let modes = &self.state.body_accel_modes;
        if input.body_accel_inputs.len() != modes.len() {
            return Err(InputError::DimensionMismatch {
                what: "body_accel_inputs",
                expected: modes.len(),
                got: input.body_accel_inputs.len(),
            });
        }
        let num_bodies = self.model.num_bodies();
        let mut targets = Vec::with_capacity(modes.len());
        for (accel_input, &mode) in input.body_accel_inputs.iter().zip(modes) {
            let body = to_zero_based(accel_input.body, "body-acceleration body")?;
            if body >= num_bodies {
                return Err(InputError::UnknownBody {
                    body: accel_input.body,
                    num_bodies,
                });
            }
            let accel = &accel_input.accel;
            if accel.iter().any(|a| a.is_infinite()) {
                return Err(InputError::NonFinite {
                    what: "body acceleration",
                });
            }
            targets.push(BodyAccelTarget {
                body,
                mode,
                axes: std::array::from_fn(|i| Some(accel[i]).filter(|a| !a.is_nan())),
            });
        }

        let mut constrained_joints = Vec::with_capacity(input.constrained_joints.len());
        for &joint in &input.constrained_joints {
            let index = to_zero_based(joint, "constrained joint")?;
            if index >= nq {
                return Err(InputError::UnknownJoint { joint, nq });
            }
            if !constrained_joints.contains(&index) {
                constrained_joints.push(index);
            }
        }

        Ok(ValidatedInput {
            targets,
            constrained_joints,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
