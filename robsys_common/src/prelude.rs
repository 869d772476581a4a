//! Prelude module for common re-exports.
//!
//! ```rust
//! use robsys_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, LogLevel, RobotConfig, SharedConfig, SystemConfig,
};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{
    ControlState, Opcode, DOF_FIELD_COUNT, DOF_RECORD_SIZE, MAX_DOF_RECORDS, MAX_MESSAGE_LENGTH,
    STATUS_FAILURE,
};

// ─── Robot Capabilities ─────────────────────────────────────────────
pub use crate::robot::{
    AxisHandle, ControlPhase, DofVariables, JointHandle, Robot, RobotError, RobotFactory,
};
