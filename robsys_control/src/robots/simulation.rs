//! Simulated robot controller.
//!
//! Each axis follows its setpoints with a first-order lag: every measure
//! read closes `tracking_gain` of the remaining error. Joints are derived
//! from their driving axis through a transmission ratio. Useful for
//! development and for exercising clients without hardware.

use robsys_common::config::{AxisEntry, JointEntry, RobotConfig};
use robsys_common::robot::{
    AxisHandle, ControlPhase, DofVariables, JointHandle, Robot, RobotError,
};
use tracing::{debug, info};

/// Registry kind of the simulated robot.
pub const KIND: &str = "simulation";

struct SimulatedAxis {
    name: String,
    tracking_gain: f64,
    setpoints: DofVariables,
    measures: DofVariables,
}

impl SimulatedAxis {
    fn new(entry: &AxisEntry) -> Self {
        Self {
            name: entry.name.clone(),
            tracking_gain: entry.tracking_gain,
            setpoints: DofVariables::default(),
            measures: DofVariables::default(),
        }
    }

    fn step(&mut self) -> DofVariables {
        let target = self.setpoints.to_array();
        let mut current = self.measures.to_array();
        for (value, goal) in current.iter_mut().zip(target) {
            *value += self.tracking_gain * (goal - *value);
        }
        self.measures = DofVariables::from_array(current);
        self.measures
    }
}

struct SimulatedJoint {
    name: String,
    axis: usize,
    ratio: f64,
}

impl SimulatedJoint {
    fn new(entry: &JointEntry) -> Self {
        Self {
            name: entry.name.clone(),
            axis: entry.axis,
            ratio: entry.ratio,
        }
    }
}

/// Software robot implementing the [`Robot`] capability interface.
pub struct SimulatedRobot {
    name: String,
    enabled: bool,
    phase: Option<ControlPhase>,
    axes: Vec<SimulatedAxis>,
    joints: Vec<SimulatedJoint>,
}

impl SimulatedRobot {
    /// Build a simulated robot from an already validated configuration.
    pub fn new(name: &str, config: &RobotConfig) -> Self {
        info!(
            "Simulated robot '{}': {} axes, {} joints",
            name,
            config.axes.len(),
            config.joints.len()
        );
        Self {
            name: name.to_string(),
            enabled: false,
            phase: None,
            axes: config.axes.iter().map(SimulatedAxis::new).collect(),
            joints: config.joints.iter().map(SimulatedJoint::new).collect(),
        }
    }

    /// True while actuation is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Last commanded phase, `None` while disabled or before the first command.
    pub fn phase(&self) -> Option<ControlPhase> {
        self.phase
    }

    /// Last setpoints written to `axis`.
    pub fn axis_setpoints(&self, axis: AxisHandle) -> Option<DofVariables> {
        self.axes.get(axis.raw()).map(|a| a.setpoints)
    }

    fn resolved_axis(&self, index: usize) -> Option<&SimulatedAxis> {
        self.axes.get(index).filter(|a| !a.name.is_empty())
    }

    fn resolved_joint(&self, index: usize) -> Option<&SimulatedJoint> {
        self.joints.get(index).filter(|j| !j.name.is_empty())
    }
}

impl Robot for SimulatedRobot {
    fn name(&self) -> &str {
        &self.name
    }

    fn enable(&mut self) -> Result<(), RobotError> {
        self.enabled = true;
        debug!("Simulated robot '{}' enabled", self.name);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), RobotError> {
        self.enabled = false;
        self.phase = None;
        debug!("Simulated robot '{}' disabled", self.name);
        Ok(())
    }

    fn set_control_state(&mut self, phase: ControlPhase) -> Result<(), RobotError> {
        if !self.enabled {
            return Err(RobotError::Rejected("robot is disabled"));
        }
        self.phase = Some(phase);
        debug!("Simulated robot '{}' phase {:?}", self.name, phase);
        Ok(())
    }

    fn axes_count(&self) -> usize {
        self.axes.len()
    }

    fn axis_name(&self, index: usize) -> Option<&str> {
        self.resolved_axis(index).map(|a| a.name.as_str())
    }

    fn axis(&self, index: usize) -> Option<AxisHandle> {
        self.resolved_axis(index).map(|_| AxisHandle::new(index))
    }

    fn joints_count(&self) -> usize {
        self.joints.len()
    }

    fn joint_name(&self, index: usize) -> Option<&str> {
        self.resolved_joint(index).map(|j| j.name.as_str())
    }

    fn joint(&self, index: usize) -> Option<JointHandle> {
        self.resolved_joint(index).map(|_| JointHandle::new(index))
    }

    fn axis_measures(&mut self, axis: AxisHandle) -> Option<DofVariables> {
        self.axes.get_mut(axis.raw()).map(SimulatedAxis::step)
    }

    fn set_axis_setpoints(
        &mut self,
        axis: AxisHandle,
        setpoints: &DofVariables,
    ) -> Result<(), RobotError> {
        let sim = self
            .axes
            .get_mut(axis.raw())
            .ok_or(RobotError::InvalidHandle(axis.raw()))?;
        if !setpoints.to_array().iter().all(|v| v.is_finite()) {
            return Err(RobotError::Rejected("non-finite setpoint"));
        }
        sim.setpoints = *setpoints;
        Ok(())
    }

    fn joint_measures(&mut self, joint: JointHandle) -> Option<DofVariables> {
        let joint = self.joints.get(joint.raw())?;
        let axis = self.axes.get(joint.axis)?.measures;
        Some(DofVariables {
            position: axis.position * joint.ratio,
            velocity: axis.velocity * joint.ratio,
            acceleration: axis.acceleration * joint.ratio,
            ..axis
        })
    }

    fn shutdown(&mut self) {
        self.enabled = false;
        self.phase = None;
        info!("Simulated robot '{}' shut down", self.name);
    }
}

/// Constructor registered under [`KIND`].
pub fn create_robot(name: &str, config: &RobotConfig) -> Result<Box<dyn Robot>, RobotError> {
    Ok(Box::new(SimulatedRobot::new(name, config)))
}
