//! Wire protocol constants shared by the control core and its clients.
//!
//! Three channels carry traffic:
//!
//! | Channel | Transport | Direction | Framing |
//! |---------|-----------|-----------|---------|
//! | events | TCP | request/reply | `[opcode:1][payload...]` → `[status:1][payload...]` |
//! | axes | UDP | request/reply | DOF batch |
//! | joints | UDP | publish | DOF batch |
//!
//! A DOF batch is `[count:1]` followed by `count` records of
//! `[index:1][7 × f32 little-endian]`.

use static_assertions::const_assert;

/// Upper bound for any message on any channel [bytes].
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// Number of numeric fields carried per DOF record.
pub const DOF_FIELD_COUNT: usize = 7;

/// Width of one encoded DOF field [bytes].
pub const DOF_FIELD_SIZE: usize = core::mem::size_of::<f32>();

/// Encoded size of the float block of one record [bytes].
pub const DOF_DATA_BLOCK_SIZE: usize = DOF_FIELD_COUNT * DOF_FIELD_SIZE;

/// Encoded size of one record: index byte + float block [bytes].
pub const DOF_RECORD_SIZE: usize = 1 + DOF_DATA_BLOCK_SIZE;

/// Size of the batch count prefix [bytes].
pub const BATCH_HEADER_SIZE: usize = 1;

/// Largest record count that fits in one message.
pub const MAX_DOF_RECORDS: usize = (MAX_MESSAGE_LENGTH - BATCH_HEADER_SIZE) / DOF_RECORD_SIZE;

const_assert!(BATCH_HEADER_SIZE + MAX_DOF_RECORDS * DOF_RECORD_SIZE <= MAX_MESSAGE_LENGTH);
const_assert!(MAX_DOF_RECORDS <= u8::MAX as usize);

/// Well-known TCP port of the events channel.
pub const DEFAULT_EVENTS_PORT: u16 = 50000;

/// Well-known UDP port of the axes channel.
pub const DEFAULT_AXES_PORT: u16 = 50001;

/// Well-known UDP port of the joints channel.
pub const DEFAULT_JOINTS_PORT: u16 = 50002;

/// Status byte for failed commands and for info replies.
pub const STATUS_FAILURE: u8 = 0x00;

/// Single-byte commands accepted on the events channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Serialize the robot descriptor (non-empty payload: hot-swap by name).
    RefreshInfo = 0x00,
    /// Disable the active robot.
    Disable = 0x01,
    /// Enable the active robot.
    Enable = 0x02,
    /// Enter the offset acquisition phase.
    SetOffset = 0x03,
    /// Enter the calibration phase.
    SetCalibration = 0x04,
    /// Enter the preprocessing phase.
    SetPreprocessing = 0x05,
    /// Enter the operation phase.
    SetOperation = 0x06,
    /// Forward a user name to the data logger. Never replied to.
    SetUser = 0x07,
}

impl Opcode {
    /// Convert from raw `u8`. Returns `None` for unknown opcodes.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::RefreshInfo),
            0x01 => Some(Self::Disable),
            0x02 => Some(Self::Enable),
            0x03 => Some(Self::SetOffset),
            0x04 => Some(Self::SetCalibration),
            0x05 => Some(Self::SetPreprocessing),
            0x06 => Some(Self::SetOperation),
            0x07 => Some(Self::SetUser),
            _ => None,
        }
    }
}

/// Control state of the session, reported through status codes.
///
/// Only one state is active at a time. `Disabled` is the initial state
/// and is reachable from every enabled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ControlState {
    /// Actuators released.
    #[default]
    Disabled = 0x01,
    /// Enabled, no phase commanded yet.
    Enabled = 0x02,
    /// Enabled, acquiring sensor offsets.
    Offsetting = 0x03,
    /// Enabled, calibrating.
    Calibrating = 0x04,
    /// Enabled, preprocessing.
    Preprocessing = 0x05,
    /// Enabled, operating.
    Operating = 0x06,
}

impl ControlState {
    /// Convert from a raw status code. Returns `None` for 0x00 and unknown values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Disabled),
            0x02 => Some(Self::Enabled),
            0x03 => Some(Self::Offsetting),
            0x04 => Some(Self::Calibrating),
            0x05 => Some(Self::Preprocessing),
            0x06 => Some(Self::Operating),
            _ => None,
        }
    }

    /// Status byte reported when a transition into this state succeeds.
    #[inline]
    pub const fn status_code(self) -> u8 {
        self as u8
    }

    /// True for every state except `Disabled`.
    #[inline]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}
