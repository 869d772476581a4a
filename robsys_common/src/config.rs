//! Configuration loading traits and types.
//!
//! All configuration lives under one directory passed on the command line:
//!
//! ```text
//! <config_dir>/
//! ├── system.toml          # optional: cycle time, ports, logging
//! └── robots/
//!     └── <robot_name>.toml # one file per robot configuration
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use robsys_common::config::{ConfigError, RobotConfig, SystemConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let system = SystemConfig::load_dir(Path::new("config"))?;
//!     let robot = RobotConfig::load_named(Path::new("config"), "arm1")?;
//!     println!("{}ms cycle, {} axes", system.cycle_time_ms, robot.axes.len());
//!     Ok(())
//! }
//! ```

use crate::protocol::{DEFAULT_AXES_PORT, DEFAULT_EVENTS_PORT, DEFAULT_JOINTS_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// File name of the optional system configuration.
pub const SYSTEM_CONFIG_FILE: &str = "system.toml";

/// Sub-directory holding one TOML file per robot configuration.
pub const ROBOTS_DIR: &str = "robots";

/// Default cycle period [ms].
pub const DEFAULT_CYCLE_TIME_MS: u64 = 5;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

fn default_service_name() -> String {
    "robsys_control".to_string()
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "robsys-lab-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

fn default_cycle_time_ms() -> u64 {
    DEFAULT_CYCLE_TIME_MS
}

fn default_events_port() -> u16 {
    DEFAULT_EVENTS_PORT
}

fn default_axes_port() -> u16 {
    DEFAULT_AXES_PORT
}

fn default_joints_port() -> u16 {
    DEFAULT_JOINTS_PORT
}

fn default_log_root() -> PathBuf {
    PathBuf::from("logs")
}

/// Process-wide settings loaded from `system.toml`.
///
/// Every field is optional; a missing file yields the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    /// Common settings.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Cycle period [ms].
    #[serde(default = "default_cycle_time_ms")]
    pub cycle_time_ms: u64,

    /// TCP port of the events channel.
    #[serde(default = "default_events_port")]
    pub events_port: u16,

    /// UDP port of the axes channel.
    #[serde(default = "default_axes_port")]
    pub axes_port: u16,

    /// UDP port of the joints channel.
    #[serde(default = "default_joints_port")]
    pub joints_port: u16,

    /// Root directory for per-user data logs.
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            cycle_time_ms: DEFAULT_CYCLE_TIME_MS,
            events_port: DEFAULT_EVENTS_PORT,
            axes_port: DEFAULT_AXES_PORT,
            joints_port: DEFAULT_JOINTS_PORT,
            log_root: default_log_root(),
        }
    }
}

impl SystemConfig {
    /// Load `system.toml` from `config_dir`, falling back to defaults if absent.
    ///
    /// # Errors
    /// Parse and validation errors are returned; a missing file is not an error.
    pub fn load_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(SYSTEM_CONFIG_FILE);
        let config = match Self::load(&path) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound(_)) => {
                info!("No {} in {}, using defaults", SYSTEM_CONFIG_FILE, config_dir.display());
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the system configuration.
    ///
    /// # Validation Rules
    /// 1. `cycle_time_ms` > 0
    /// 2. channel ports are pairwise distinct
    /// 3. shared section is valid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time_ms == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_time_ms must be greater than 0".to_string(),
            ));
        }

        let ports = [self.events_port, self.axes_port, self.joints_port];
        if ports[0] == ports[1] || ports[0] == ports[2] || ports[1] == ports[2] {
            return Err(ConfigError::ValidationError(format!(
                "channel ports must be distinct (events={}, axes={}, joints={})",
                self.events_port, self.axes_port, self.joints_port
            )));
        }

        self.shared.validate()
    }

    /// Cycle period as a `Duration`.
    #[inline]
    pub fn cycle_time(&self) -> Duration {
        Duration::from_millis(self.cycle_time_ms)
    }
}

fn default_tracking_gain() -> f64 {
    0.5
}

fn default_ratio() -> f64 {
    1.0
}

/// One axis entry of a robot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisEntry {
    /// Axis name. Empty names are unresolvable.
    #[serde(default)]
    pub name: String,

    /// Fraction of the setpoint error closed per measurement (simulation).
    #[serde(default = "default_tracking_gain")]
    pub tracking_gain: f64,
}

/// One joint entry of a robot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointEntry {
    /// Joint name. Empty names are unresolvable.
    #[serde(default)]
    pub name: String,

    /// Index of the driving axis.
    pub axis: usize,

    /// Transmission ratio from axis to joint.
    #[serde(default = "default_ratio")]
    pub ratio: f64,
}

/// Robot configuration loaded from `robots/<name>.toml`.
///
/// # TOML Example
///
/// ```toml
/// kind = "simulation"
///
/// [[axes]]
/// name = "shoulder"
///
/// [[joints]]
/// name = "j0"
/// axis = 0
/// ratio = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    /// Registered controller kind (e.g., "simulation").
    pub kind: String,

    /// Axes in session order.
    #[serde(default)]
    pub axes: Vec<AxisEntry>,

    /// Joints in session order.
    #[serde(default)]
    pub joints: Vec<JointEntry>,
}

impl RobotConfig {
    /// Path of the configuration file for `name`.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for names that are empty or
    /// would escape the robots directory.
    pub fn path_for(config_dir: &Path, name: &str) -> Result<PathBuf, ConfigError> {
        let escapes = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if escapes {
            return Err(ConfigError::ValidationError(format!(
                "invalid robot name {name:?}"
            )));
        }
        Ok(config_dir.join(ROBOTS_DIR).join(format!("{name}.toml")))
    }

    /// Resolve, load and validate the configuration for `name`.
    pub fn load_named(config_dir: &Path, name: &str) -> Result<Self, ConfigError> {
        let path = Self::path_for(config_dir, name)?;
        let config = Self::load(&path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the robot configuration.
    ///
    /// # Validation Rules
    /// 1. `kind` is not empty
    /// 2. non-empty axis names are unique, same for joints
    /// 3. every joint refers to an existing axis with a finite ratio
    /// 4. tracking gains lie in (0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind.is_empty() {
            return Err(ConfigError::ValidationError("kind cannot be empty".to_string()));
        }

        let mut names = std::collections::HashSet::new();
        for axis in self.axes.iter().filter(|a| !a.name.is_empty()) {
            if !names.insert(axis.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate axis name: {}",
                    axis.name
                )));
            }
            if !(axis.tracking_gain > 0.0 && axis.tracking_gain <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "axis {}: tracking_gain must be in (0, 1]",
                    axis.name
                )));
            }
        }

        names.clear();
        for joint in &self.joints {
            if !joint.name.is_empty() && !names.insert(joint.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate joint name: {}",
                    joint.name
                )));
            }
            if joint.axis >= self.axes.len() {
                return Err(ConfigError::ValidationError(format!(
                    "joint {:?} refers to axis {} but only {} axes are configured",
                    joint.name,
                    joint.axis,
                    self.axes.len()
                )));
            }
            if !joint.ratio.is_finite() {
                return Err(ConfigError::ValidationError(format!(
                    "joint {:?}: ratio must be finite",
                    joint.name
                )));
            }
        }

        Ok(())
    }
}
