//! Robot registry.
//!
//! Maps a robot kind to its constructor and resolves configuration names
//! against `<config_dir>/robots/<name>.toml`. Built at startup and handed
//! to the session as its [`RobotFactory`]; no global state.

use crate::robots::simulation;
use robsys_common::config::{ConfigError, RobotConfig};
use robsys_common::robot::{Robot, RobotError, RobotFactory};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Constructor for one robot kind.
pub type RobotConstructor = fn(&str, &RobotConfig) -> Result<Box<dyn Robot>, RobotError>;

/// Registry of available robot kinds.
pub struct RobotRegistry {
    config_dir: PathBuf,
    constructors: HashMap<&'static str, RobotConstructor>,
}

impl RobotRegistry {
    /// Create an empty registry resolving names under `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            constructors: HashMap::new(),
        }
    }

    /// Registry with every built-in robot kind.
    pub fn with_builtin_robots(config_dir: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(config_dir);
        registry.register(simulation::KIND, simulation::create_robot);
        registry
    }

    /// Register a constructor for `kind`.
    ///
    /// # Panics
    /// Panics if `kind` is already registered.
    pub fn register(&mut self, kind: &'static str, constructor: RobotConstructor) {
        if self.constructors.contains_key(kind) {
            panic!("Robot kind '{kind}' is already registered");
        }
        self.constructors.insert(kind, constructor);
    }

    /// Directory names are resolved against.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// List all registered kinds.
    pub fn list_kinds(&self) -> Vec<&'static str> {
        self.constructors.keys().copied().collect()
    }

    /// Build a controller of the configured kind.
    ///
    /// # Errors
    /// `RobotError::UnknownKind` if `config.kind` is not registered, or
    /// whatever the constructor reports.
    pub fn create_from(
        &self,
        name: &str,
        config: &RobotConfig,
    ) -> Result<Box<dyn Robot>, RobotError> {
        let constructor = self
            .constructors
            .get(config.kind.as_str())
            .ok_or_else(|| RobotError::UnknownKind(config.kind.clone()))?;
        constructor(name, config)
    }
}

impl RobotFactory for RobotRegistry {
    fn create(&self, name: &str) -> Result<Box<dyn Robot>, RobotError> {
        let config = RobotConfig::load_named(&self.config_dir, name).map_err(|e| match e {
            ConfigError::FileNotFound(path) => RobotError::NotFound(path.display().to_string()),
            other => RobotError::ConfigError(other.to_string()),
        })?;
        debug!("Resolved robot '{}' as kind '{}'", name, config.kind);
        self.create_from(name, &config)
    }
}
