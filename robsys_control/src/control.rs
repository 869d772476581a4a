//! Control state machine driven by events-channel opcodes.
//!
//! Disabled → Enabled → {Offsetting, Calibrating, Preprocessing, Operating},
//! Disabled reachable from every state. Transitions are delegated to the
//! active controller; the state only changes when the controller accepts.

use crate::datalog::DataLog;
use crate::session::Session;
use crate::transport::Message;
use robsys_common::protocol::{ControlState, MAX_MESSAGE_LENGTH, Opcode, STATUS_FAILURE};
use robsys_common::robot::ControlPhase;
use tracing::{debug, info, warn};

/// Result of a control transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded, new state.
    Ok(ControlState),
    /// Transition rejected, reason.
    Rejected(&'static str),
}

impl TransitionResult {
    /// Status byte reported for this result.
    #[inline]
    pub const fn status_code(&self) -> u8 {
        match self {
            Self::Ok(state) => state.status_code(),
            Self::Rejected(_) => STATUS_FAILURE,
        }
    }
}

/// Control state holder.
#[derive(Debug, Clone, Default)]
pub struct ControlStateMachine {
    state: ControlState,
}

impl ControlStateMachine {
    /// Create a state machine in `Disabled`.
    pub const fn new() -> Self {
        Self {
            state: ControlState::Disabled,
        }
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> ControlState {
        self.state
    }

    /// Force `Disabled` without touching the controller.
    #[inline]
    pub fn reset(&mut self) {
        self.state = ControlState::Disabled;
    }

    /// Handle one event message.
    ///
    /// Returns the reply to send, or `None` for opcodes that are never
    /// replied to (`set-user` and unknown opcodes).
    pub fn apply(
        &mut self,
        opcode: u8,
        payload: &[u8],
        session: &mut Session,
        datalog: &mut dyn DataLog,
    ) -> Option<Message> {
        let Some(op) = Opcode::from_u8(opcode) else {
            debug!("Ignoring unknown opcode 0x{:02x}", opcode);
            return None;
        };

        match op {
            Opcode::RefreshInfo => Some(self.refresh_info(payload, session)),
            Opcode::SetUser => {
                match text_payload(payload) {
                    Some(user) => datalog.set_user(user),
                    None => warn!("set-user payload is not valid UTF-8"),
                }
                None
            }
            _ => {
                let result = self.transition(op, session);
                if let TransitionResult::Rejected(reason) = &result {
                    debug!("{:?} rejected in {:?}: {}", op, self.state, reason);
                }
                Some(reply(result.status_code(), &[]))
            }
        }
    }

    /// Attempt the transition requested by a control opcode.
    pub fn transition(&mut self, op: Opcode, session: &mut Session) -> TransitionResult {
        use ControlState::*;

        let Some(robot) = session.robot_mut() else {
            return TransitionResult::Rejected("no active robot");
        };

        let (outcome, next) = match op {
            Opcode::Disable => (robot.disable(), Disabled),
            Opcode::Enable => (robot.enable(), Enabled),
            Opcode::SetOffset => (robot.set_control_state(ControlPhase::Offset), Offsetting),
            Opcode::SetCalibration => (
                robot.set_control_state(ControlPhase::Calibration),
                Calibrating,
            ),
            Opcode::SetPreprocessing => (
                robot.set_control_state(ControlPhase::Preprocessing),
                Preprocessing,
            ),
            Opcode::SetOperation => (robot.set_control_state(ControlPhase::Operation), Operating),
            Opcode::RefreshInfo | Opcode::SetUser => {
                return TransitionResult::Rejected("not a control opcode");
            }
        };

        match outcome {
            Ok(()) => {
                if next != self.state {
                    info!("Control state {:?} -> {:?}", self.state, next);
                }
                self.state = next;
                TransitionResult::Ok(next)
            }
            Err(e) => {
                warn!("Robot refused {:?}: {}", op, e);
                TransitionResult::Rejected("robot refused transition")
            }
        }
    }

    fn refresh_info(&mut self, payload: &[u8], session: &mut Session) -> Message {
        if !payload.is_empty() {
            let Some(name) = text_payload(payload) else {
                warn!("refresh-info payload is not a valid robot name");
                return reply(STATUS_FAILURE, &[]);
            };
            info!("Hot-swapping robot to '{}'", name);
            session.refresh(Some(name));
            self.reset();
        }

        let descriptor = session.descriptor_bytes();
        if descriptor.len() > MAX_MESSAGE_LENGTH - 1 {
            warn!(
                "Descriptor of {} bytes does not fit in one message, sending none",
                descriptor.len()
            );
            return reply(STATUS_FAILURE, &[]);
        }
        reply(STATUS_FAILURE, &descriptor)
    }
}

/// Text payload with trailing NUL padding removed.
fn text_payload(payload: &[u8]) -> Option<&str> {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    std::str::from_utf8(&payload[..end]).ok()
}

fn reply(status: u8, payload: &[u8]) -> Message {
    let mut message = Message::new();
    // capacity > 0; callers keep payload within MAX_MESSAGE_LENGTH - 1
    let _ = message.push(status);
    let _ = message.extend_from_slice(payload);
    message
}
