//! Robot session: the single owner of the active robot controller.
//!
//! The session holds the controller, the axis and joint handles resolved
//! from it in session order, and the descriptor published on refresh-info.
//! Handle lists and descriptor are rebuilt together on every refresh, so
//! the descriptor name lists always match the handle lists.

use robsys_common::protocol::MAX_DOF_RECORDS;
use robsys_common::robot::{
    AxisHandle, DofVariables, JointHandle, Robot, RobotError, RobotFactory,
};
use serde::Serialize;
use tracing::{info, warn};

/// Published description of the active robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotDescriptor {
    /// Configuration name.
    pub id: String,
    /// Resolved axis names in session order.
    pub axes: Vec<String>,
    /// Resolved joint names in session order.
    pub joints: Vec<String>,
}

/// Owner of the active controller and its handle lists.
pub struct Session {
    factory: Box<dyn RobotFactory>,
    robot: Option<Box<dyn Robot>>,
    axes: Vec<AxisHandle>,
    joints: Vec<JointHandle>,
    omitted_axes: Vec<usize>,
    omitted_joints: Vec<usize>,
    descriptor: Option<RobotDescriptor>,
}

impl Session {
    /// Create an empty session building controllers through `factory`.
    pub fn new(factory: Box<dyn RobotFactory>) -> Self {
        Self {
            factory,
            robot: None,
            axes: Vec::new(),
            joints: Vec::new(),
            omitted_axes: Vec::new(),
            omitted_joints: Vec::new(),
            descriptor: None,
        }
    }

    /// Replace the active controller with the one named `name`.
    ///
    /// With `None` the current state is kept and only the descriptor is
    /// returned. Otherwise the current controller is torn down first; on
    /// construction failure the session stays empty and `None` is returned.
    pub fn refresh(&mut self, name: Option<&str>) -> Option<&RobotDescriptor> {
        let Some(name) = name else {
            return self.descriptor.as_ref();
        };

        self.end();

        match self.factory.create(name) {
            Ok(robot) => self.install(name, robot),
            Err(e) => warn!("Failed to load robot '{}': {}", name, e),
        }
        self.descriptor.as_ref()
    }

    fn install(&mut self, name: &str, robot: Box<dyn Robot>) {
        let mut descriptor = RobotDescriptor {
            id: name.to_string(),
            axes: Vec::with_capacity(robot.axes_count()),
            joints: Vec::with_capacity(robot.joints_count()),
        };

        for index in 0..robot.axes_count() {
            match (robot.axis(index), robot.axis_name(index)) {
                (Some(handle), Some(axis_name)) => {
                    self.axes.push(handle);
                    descriptor.axes.push(axis_name.to_string());
                }
                _ => {
                    warn!("Robot '{}': axis {} unresolvable, omitted", name, index);
                    self.omitted_axes.push(index);
                }
            }
        }

        for index in 0..robot.joints_count() {
            match (robot.joint(index), robot.joint_name(index)) {
                (Some(handle), Some(joint_name)) => {
                    self.joints.push(handle);
                    descriptor.joints.push(joint_name.to_string());
                }
                _ => {
                    warn!("Robot '{}': joint {} unresolvable, omitted", name, index);
                    self.omitted_joints.push(index);
                }
            }
        }

        info!(
            "Robot '{}' loaded: {} axes, {} joints",
            name,
            self.axes.len(),
            self.joints.len()
        );
        if self.axes.len().max(self.joints.len()) > MAX_DOF_RECORDS {
            warn!(
                "Robot '{}' exceeds {} DOFs per batch, extra measures are not published",
                name, MAX_DOF_RECORDS
            );
        }
        self.robot = Some(robot);
        self.descriptor = Some(descriptor);
    }

    /// Tear down the active controller and release every handle.
    pub fn end(&mut self) {
        self.axes.clear();
        self.joints.clear();
        self.omitted_axes.clear();
        self.omitted_joints.clear();
        self.descriptor = None;

        if let Some(mut robot) = self.robot.take() {
            info!("Unloading robot '{}'", robot.name());
            robot.shutdown();
        }
    }

    /// True while a controller is active.
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.robot.is_some()
    }

    /// Active controller.
    pub fn robot_mut(&mut self) -> Option<&mut (dyn Robot + 'static)> {
        self.robot.as_deref_mut()
    }

    /// Current descriptor, `None` while no controller is active.
    #[inline]
    pub fn descriptor(&self) -> Option<&RobotDescriptor> {
        self.descriptor.as_ref()
    }

    /// JSON encoding of the descriptor, empty while no controller is active.
    pub fn descriptor_bytes(&self) -> Vec<u8> {
        let Some(descriptor) = &self.descriptor else {
            return Vec::new();
        };
        serde_json::to_vec(descriptor).unwrap_or_else(|e| {
            warn!("Failed to serialize descriptor of '{}': {}", descriptor.id, e);
            Vec::new()
        })
    }

    /// Number of resolved axes.
    #[inline]
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Number of resolved joints.
    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Handle of the axis at session position `index`.
    #[inline]
    pub fn get_axis(&self, index: usize) -> Option<AxisHandle> {
        self.axes.get(index).copied()
    }

    /// Handle of the joint at session position `index`.
    #[inline]
    pub fn get_joint(&self, index: usize) -> Option<JointHandle> {
        self.joints.get(index).copied()
    }

    /// Controller axis indices skipped by the last refresh.
    pub fn omitted_axes(&self) -> &[usize] {
        &self.omitted_axes
    }

    /// Controller joint indices skipped by the last refresh.
    pub fn omitted_joints(&self) -> &[usize] {
        &self.omitted_joints
    }

    /// Write setpoints to the axis at session position `index`.
    ///
    /// # Errors
    /// `InvalidHandle` for an out-of-range index, `Rejected` without an
    /// active controller, or whatever the controller reports.
    pub fn set_axis_setpoints(
        &mut self,
        index: usize,
        setpoints: &DofVariables,
    ) -> Result<(), RobotError> {
        let handle = self.get_axis(index).ok_or(RobotError::InvalidHandle(index))?;
        let robot = self
            .robot
            .as_deref_mut()
            .ok_or(RobotError::Rejected("no active robot"))?;
        robot.set_axis_setpoints(handle, setpoints)
    }

    /// Fresh measurements of the axis at session position `index`.
    pub fn axis_measures(&mut self, index: usize) -> Option<DofVariables> {
        let handle = self.get_axis(index)?;
        self.robot.as_deref_mut()?.axis_measures(handle)
    }

    /// Fresh measurements of the joint at session position `index`.
    pub fn joint_measures(&mut self, index: usize) -> Option<DofVariables> {
        let handle = self.get_joint(index)?;
        self.robot.as_deref_mut()?.joint_measures(handle)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}
