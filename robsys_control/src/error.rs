//! Startup and runtime-setup errors of the control core.
//!
//! Per-message and per-DOF failures never reach this type: they are
//! logged and absorbed inside the cycle.

use crate::transport::TransportError;
use robsys_common::config::ConfigError;
use thiserror::Error;

/// Errors that stop the process before or outside the cycle loop.
#[derive(Debug, Error)]
pub enum SystemError {
    /// Configuration could not be loaded.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// A channel could not be opened.
    #[error("{channel} channel: {source}")]
    Channel {
        /// Channel name (events, axes, joints).
        channel: &'static str,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Signal handler installation failed.
    #[error("signal setup error: {0}")]
    Signal(String),
}
