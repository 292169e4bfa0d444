//! Controller configuration, loaded once at initialization.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::BodyAccelMode;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_slack_limit() -> f64 {
    10.0
}
const fn default_w_slack() -> f64 {
    0.001
}
const fn default_kp_ang() -> f64 {
    1.0
}
const fn default_fast_max_iters() -> u32 {
    10
}
const fn default_active_set_max_iters() -> u32 {
    200
}
const fn default_interior_max_iters() -> u32 {
    100
}
const fn default_active_set_tol() -> f64 {
    1e-8
}
const fn default_interior_tol() -> f64 {
    1e-8
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Weights and limits of the balance QP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Symmetric bound on every relative-acceleration slack variable.
    #[serde(default = "default_slack_limit")]
    pub slack_limit: f64,

    /// Angular-momentum rate weight, row-major 3x3. All zeros disables the term.
    #[serde(default)]
    pub w_kdot: [[f64; 3]; 3],

    /// Quadratic weight on friction-cone basis coefficients.
    #[serde(default)]
    pub w_grf: f64,

    /// Quadratic weight on relative-acceleration slack.
    #[serde(default = "default_w_slack")]
    pub w_slack: f64,

    /// Proportional gain driving centroidal angular momentum to zero.
    #[serde(default = "default_kp_ang")]
    pub kp_ang: f64,

    /// Per-joint acceleration tracking weights (length = degrees of freedom).
    #[serde(default)]
    pub w_qdd: Vec<f64>,

    /// One signed weight per body-acceleration input slot.
    /// Negative: hard constraint. Positive: objective with that weight. Zero: ignored.
    #[serde(default)]
    pub body_accel_input_weights: Vec<f64>,

    /// Damping gain `k` in the softened contact constraint
    /// `Jp qdd + eps = (-Jpdot - k Jp) qd`.
    #[serde(default)]
    pub relative_accel_damping: f64,

    #[serde(default)]
    pub solver: SolverConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            slack_limit: default_slack_limit(),
            w_kdot: [[0.0; 3]; 3],
            w_grf: 0.0,
            w_slack: default_w_slack(),
            kp_ang: default_kp_ang(),
            w_qdd: Vec::new(),
            body_accel_input_weights: Vec::new(),
            relative_accel_damping: 0.0,
            solver: SolverConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.slack_limit.is_finite() && self.slack_limit > 0.0) {
            return Err(ConfigError::InvalidSlackLimit(self.slack_limit));
        }
        non_negative("w_grf", self.w_grf)?;
        non_negative("w_slack", self.w_slack)?;
        non_negative("kp_ang", self.kp_ang)?;
        non_negative("relative_accel_damping", self.relative_accel_damping)?;
        for (i, &w) in self.w_qdd.iter().enumerate() {
            if !(w.is_finite() && w >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("w_qdd[{i}]"),
                    message: format!("{w} (must be finite and >= 0)"),
                });
            }
        }
        if self.w_kdot.iter().flatten().any(|w| !w.is_finite()) {
            return Err(invalid("w_kdot", "entries must be finite"));
        }
        if self.body_accel_input_weights.iter().any(|w| !w.is_finite()) {
            return Err(invalid("body_accel_input_weights", "entries must be finite"));
        }
        self.solver.validate()
    }

    /// Check the per-joint weights against the model's degree-of-freedom count.
    pub fn validate_dof(&self, nq: usize) -> Result<(), ConfigError> {
        if self.w_qdd.len() != nq {
            return Err(ConfigError::DimensionMismatch {
                what: "w_qdd",
                expected: nq,
                got: self.w_qdd.len(),
            });
        }
        Ok(())
    }

    /// Angular-momentum weight as a matrix.
    pub fn w_kdot_matrix(&self) -> Matrix3<f64> {
        let w = &self.w_kdot;
        Matrix3::new(
            w[0][0], w[0][1], w[0][2], w[1][0], w[1][1], w[1][2], w[2][0], w[2][1], w[2][2],
        )
    }

    /// Resolve the signed body-acceleration weights into explicit modes.
    pub fn body_accel_modes(&self) -> Vec<BodyAccelMode> {
        self.body_accel_input_weights
            .iter()
            .map(|&w| BodyAccelMode::from_signed_weight(w))
            .collect()
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Iteration caps and tolerances for the three solver tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Working-set updates allowed on the fast path before it gives up.
    #[serde(default = "default_fast_max_iters")]
    pub fast_max_iters: u32,

    /// Working-set updates allowed for the warm-started active-set tier.
    #[serde(default = "default_active_set_max_iters")]
    pub active_set_max_iters: u32,

    /// Interior-point iteration cap for the cold tier.
    #[serde(default = "default_interior_max_iters")]
    pub interior_max_iters: u32,

    /// Constraint violation / multiplier tolerance for both active-set tiers.
    #[serde(default = "default_active_set_tol")]
    pub active_set_tol: f64,

    /// Absolute duality-gap tolerance for the cold tier.
    #[serde(default = "default_interior_tol")]
    pub tol_gap_abs: f64,

    /// Relative duality-gap tolerance for the cold tier.
    #[serde(default = "default_interior_tol")]
    pub tol_gap_rel: f64,

    /// Feasibility tolerance for the cold tier.
    #[serde(default = "default_interior_tol")]
    pub tol_feas: f64,

    /// Enable the interior-point presolve pass.
    #[serde(default)]
    pub presolve: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            fast_max_iters: default_fast_max_iters(),
            active_set_max_iters: default_active_set_max_iters(),
            interior_max_iters: default_interior_max_iters(),
            active_set_tol: default_active_set_tol(),
            tol_gap_abs: default_interior_tol(),
            tol_gap_rel: default_interior_tol(),
            tol_feas: default_interior_tol(),
            presolve: false,
        }
    }
}

impl SolverConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_max_iters == 0 {
            return Err(invalid("solver.fast_max_iters", "must be > 0"));
        }
        if self.active_set_max_iters == 0 {
            return Err(invalid("solver.active_set_max_iters", "must be > 0"));
        }
        if self.interior_max_iters == 0 {
            return Err(invalid("solver.interior_max_iters", "must be > 0"));
        }
        for (field, tol) in [
            ("solver.active_set_tol", self.active_set_tol),
            ("solver.tol_gap_abs", self.tol_gap_abs),
            ("solver.tol_gap_rel", self.tol_gap_rel),
            ("solver.tol_feas", self.tol_feas),
        ] {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(invalid(field, "must be finite and > 0"));
            }
        }
        Ok(())
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.into(),
            message: format!("{value} (must be finite and >= 0)"),
        })
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
