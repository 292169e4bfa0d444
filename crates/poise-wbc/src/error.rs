use thiserror::Error;

/// Top-level error type for poise-wbc.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),
}

/// Configuration errors, raised once at initialization.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid slack_limit: {0} (must be > 0)")]
    InvalidSlackLimit(f64),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Actuator count {nu} + 6 floating-base coordinates != {nq} degrees of freedom")]
    FloatingBaseMismatch { nu: usize, nq: usize },

    #[error("Actuator {index}: umin {umin} > umax {umax}")]
    InvertedTorqueLimits { index: usize, umin: f64, umax: f64 },
}

/// Per-tick input contract violations.
///
/// Copy + static messages for cheap propagation in the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("{what} index must be 1-based, got 0")]
    ZeroIndex { what: &'static str },

    #[error("Unknown body {body} (model has {num_bodies} bodies)")]
    UnknownBody { body: usize, num_bodies: usize },

    #[error("Body {body} has no contact point {point} (has {num_points})")]
    UnknownContactPoint {
        body: usize,
        point: usize,
        num_points: usize,
    },

    #[error("Unknown joint {joint} (model has {nq} degrees of freedom)")]
    UnknownJoint { joint: usize, nq: usize },

    #[error("{what} contains a non-finite value")]
    NonFinite { what: &'static str },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
