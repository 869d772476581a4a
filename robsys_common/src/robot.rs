//! Robot capability interface and error types.
//!
//! This module defines:
//! - `Robot` trait - Capabilities the control core calls on a robot controller
//! - `RobotFactory` trait - Construct-by-name entry point for controllers
//! - `AxisHandle` / `JointHandle` - Opaque per-DOF handles issued by a controller
//! - `DofVariables` - The seven kinematic/dynamic variables of one DOF
//! - `RobotError` enum - Error types for robot operations

use thiserror::Error;

/// Error types for robot operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RobotError {
    /// No configuration could be resolved for the requested name
    #[error("Robot configuration not found: {0}")]
    NotFound(String),

    /// Configuration exists but is unusable
    #[error("Robot configuration error: {0}")]
    ConfigError(String),

    /// Robot kind is not registered
    #[error("Unknown robot kind: {0}")]
    UnknownKind(String),

    /// Controller refused the requested operation
    #[error("Operation rejected: {0}")]
    Rejected(&'static str),

    /// Handle does not belong to this controller
    #[error("Invalid handle: {0}")]
    InvalidHandle(usize),
}

/// Kinematic and dynamic variables of one degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DofVariables {
    /// Position [rad or m].
    pub position: f64,
    /// Velocity [units/s].
    pub velocity: f64,
    /// Acceleration [units/s²].
    pub acceleration: f64,
    /// Force or torque [N or N·m].
    pub force: f64,
    /// Inertia [kg or kg·m²].
    pub inertia: f64,
    /// Stiffness [N/unit].
    pub stiffness: f64,
    /// Damping [N·s/unit].
    pub damping: f64,
}

impl DofVariables {
    /// Variables in wire field order.
    #[inline]
    pub const fn to_array(&self) -> [f64; 7] {
        [
            self.position,
            self.velocity,
            self.acceleration,
            self.force,
            self.inertia,
            self.stiffness,
            self.damping,
        ]
    }

    /// Build from values in wire field order.
    #[inline]
    pub const fn from_array(values: [f64; 7]) -> Self {
        Self {
            position: values[0],
            velocity: values[1],
            acceleration: values[2],
            force: values[3],
            inertia: values[4],
            stiffness: values[5],
            damping: values[6],
        }
    }
}

/// Control phase requested from an enabled robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPhase {
    /// Sensor offset acquisition.
    Offset,
    /// Calibration.
    Calibration,
    /// Signal preprocessing.
    Preprocessing,
    /// Normal operation.
    Operation,
}

/// Opaque axis handle, valid only for the controller that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisHandle(usize);

impl AxisHandle {
    /// Issue a handle. Only controllers should call this.
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Controller-private identifier.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Opaque joint handle, valid only for the controller that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointHandle(usize);

impl JointHandle {
    /// Issue a handle. Only controllers should call this.
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Controller-private identifier.
    #[inline]
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Capabilities of a robot controller.
///
/// The control core owns exactly one controller at a time through the
/// robot session. Every method may fail; failures are reported through
/// `Result`/`Option` and never unwind the cycle.
///
/// # Lifecycle
///
/// 1. Constructed by a [`RobotFactory`] from a configuration name
/// 2. `enable()` / `disable()` / `set_control_state()` driven by events
/// 3. Per-cycle measure reads and setpoint writes through handles
/// 4. `shutdown()` before the controller is dropped
pub trait Robot: Send {
    /// Configuration name the controller was built from.
    fn name(&self) -> &str;

    /// Enable actuation.
    fn enable(&mut self) -> Result<(), RobotError>;

    /// Disable actuation.
    fn disable(&mut self) -> Result<(), RobotError>;

    /// Switch the control phase of an enabled robot.
    fn set_control_state(&mut self, phase: ControlPhase) -> Result<(), RobotError>;

    /// Number of configured axes.
    fn axes_count(&self) -> usize;

    /// Name of the axis at `index`, `None` if unresolvable.
    fn axis_name(&self, index: usize) -> Option<&str>;

    /// Handle of the axis at `index`, `None` if unresolvable.
    fn axis(&self, index: usize) -> Option<AxisHandle>;

    /// Number of configured joints.
    fn joints_count(&self) -> usize;

    /// Name of the joint at `index`, `None` if unresolvable.
    fn joint_name(&self, index: usize) -> Option<&str>;

    /// Handle of the joint at `index`, `None` if unresolvable.
    fn joint(&self, index: usize) -> Option<JointHandle>;

    /// Current axis measurements. `None` when no fresh measurement is available.
    fn axis_measures(&mut self, axis: AxisHandle) -> Option<DofVariables>;

    /// Write axis setpoints.
    fn set_axis_setpoints(
        &mut self,
        axis: AxisHandle,
        setpoints: &DofVariables,
    ) -> Result<(), RobotError>;

    /// Current joint measurements. `None` when no fresh measurement is available.
    fn joint_measures(&mut self, joint: JointHandle) -> Option<DofVariables>;

    /// Release hardware before the controller is dropped.
    /// Default: no-op
    fn shutdown(&mut self) {}
}

/// Builds robot controllers from configuration names.
pub trait RobotFactory {
    /// Construct the controller described by `name`.
    ///
    /// # Errors
    /// Returns a [`RobotError`] if the name cannot be resolved or the
    /// controller cannot be initialized.
    fn create(&self, name: &str) -> Result<Box<dyn Robot>, RobotError>;
}

impl<F> RobotFactory for F
where
    F: Fn(&str) -> Result<Box<dyn Robot>, RobotError>,
{
    fn create(&self, name: &str) -> Result<Box<dyn Robot>, RobotError> {
        self(name)
    }
}
