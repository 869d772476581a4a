//! Fatal fault handling.
//!
//! A memory fault leaves the address space in an unknown state. The
//! handler exits immediately: no teardown, no flushing, no unwinding.

use crate::error::SystemError;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use tracing::debug;

/// Signals treated as unrecoverable.
pub const FATAL_SIGNALS: [Signal; 2] = [Signal::SIGSEGV, Signal::SIGBUS];

extern "C" fn exit_on_fault(_signal: libc::c_int) {
    // SAFETY: `_exit` is async-signal-safe and never returns.
    unsafe { libc::_exit(libc::EXIT_FAILURE) }
}

/// Install the fail-fast handler for [`FATAL_SIGNALS`].
///
/// # Errors
/// `SystemError::Signal` if `sigaction` fails.
pub fn install_fatal_fault_handler() -> Result<(), SystemError> {
    let action = SigAction::new(
        SigHandler::Handler(exit_on_fault),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    for signal in FATAL_SIGNALS {
        // SAFETY: the handler only calls `_exit`.
        unsafe { sigaction(signal, &action) }
            .map_err(|e| SystemError::Signal(format!("sigaction({signal:?}): {e}")))?;
    }
    debug!("Fatal fault handler installed");
    Ok(())
}
