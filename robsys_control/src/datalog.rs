//! Data logging hook driven by the `set-user` event.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Receives the operator name announced on the events channel.
pub trait DataLog: Send {
    /// Switch logging to `user`.
    fn set_user(&mut self, user: &str);
}

/// Logs user changes through `tracing` and tracks the per-user directory
/// `<log_root>/<user>`.
pub struct TracingDataLog {
    log_root: PathBuf,
    user_dir: Option<PathBuf>,
}

impl TracingDataLog {
    /// Create a logger rooted at `log_root`.
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            user_dir: None,
        }
    }

    /// Directory of the current user, if one was accepted.
    pub fn user_dir(&self) -> Option<&Path> {
        self.user_dir.as_deref()
    }
}

fn valid_user(user: &str) -> bool {
    !user.is_empty() && user != "." && user != ".." && !user.contains(['/', '\\', '\0'])
}

impl DataLog for TracingDataLog {
    fn set_user(&mut self, user: &str) {
        if !valid_user(user) {
            warn!("Rejected data log user name {:?}", user);
            return;
        }
        let dir = self.log_root.join(user);
        info!(user, dir = %dir.display(), "Data log user set");
        self.user_dir = Some(dir);
    }
}
