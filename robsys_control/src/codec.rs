//! DOF batch codec shared by the axes and joints channels.
//!
//! ```text
//! ┌──────────┬────────────────────────────────────────────────┐
//! │ count:u8 │ count × [ index:u8 | 7 × f32 little-endian ]   │
//! └──────────┴────────────────────────────────────────────────┘
//! ```
//!
//! Field order: position, velocity, acceleration, force, inertia,
//! stiffness, damping. A batch never holds more than [`MAX_DOF_RECORDS`]
//! records, so an encoded batch always fits in one message.

use crate::transport::Message;
use robsys_common::protocol::{
    BATCH_HEADER_SIZE, DOF_DATA_BLOCK_SIZE, DOF_FIELD_COUNT, DOF_FIELD_SIZE, DOF_RECORD_SIZE,
    MAX_DOF_RECORDS,
};
use robsys_common::robot::DofVariables;
use thiserror::Error;

/// Decoded records of one batch.
pub type DofBatch = heapless::Vec<DofRecord, MAX_DOF_RECORDS>;

/// Codec failures. All of them mean "discard this message".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Message has no count byte
    #[error("empty message")]
    Empty,

    /// Declared count can never fit in one message
    #[error("declared count {0} exceeds batch capacity")]
    CountExceedsCapacity(usize),

    /// Declared count reads past the supplied bytes
    #[error("declared {declared} records need {needed} bytes, only {available} supplied")]
    Truncated {
        /// Declared record count
        declared: usize,
        /// Bytes the declared count requires
        needed: usize,
        /// Bytes actually supplied
        available: usize,
    },

    /// A record carries NaN or an infinity
    #[error("record {record} (index {index}) holds a non-finite value")]
    NonFinite {
        /// Position of the record within the batch
        record: usize,
        /// DOF index the record addresses
        index: u8,
    },

    /// Encoder already holds a full batch
    #[error("batch full")]
    BatchFull,
}

/// One DOF entry as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DofRecord {
    /// Position of the axis/joint in session order.
    pub index: u8,
    /// Values in wire field order, reduced to `f32`.
    pub values: [f32; DOF_FIELD_COUNT],
}

impl DofRecord {
    /// Reduce `variables` to wire precision.
    pub fn from_variables(index: u8, variables: &DofVariables) -> Self {
        Self {
            index,
            values: variables.to_array().map(|v| v as f32),
        }
    }

    /// Widen back to controller precision.
    pub fn to_variables(&self) -> DofVariables {
        DofVariables::from_array(self.values.map(f64::from))
    }

    fn read(block: &[u8]) -> Self {
        let mut values = [0f32; DOF_FIELD_COUNT];
        for (value, chunk) in values
            .iter_mut()
            .zip(block[1..].chunks_exact(DOF_FIELD_SIZE))
        {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self {
            index: block[0],
            values,
        }
    }

    /// True if every value is a finite number.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// Bytes a batch of `count` records occupies.
#[inline]
pub const fn encoded_len(count: usize) -> usize {
    BATCH_HEADER_SIZE + count * DOF_RECORD_SIZE
}

/// Decode a DOF batch.
///
/// Bytes past the declared records are ignored.
///
/// # Errors
/// Returns `CodecError` if the count byte is missing, exceeds the batch
/// capacity, or would read past `bytes`. A single non-finite value
/// rejects the whole batch.
pub fn decode_batch(bytes: &[u8]) -> Result<DofBatch, CodecError> {
    let (&count, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    let count = count as usize;

    if count > MAX_DOF_RECORDS {
        return Err(CodecError::CountExceedsCapacity(count));
    }

    let needed = count * DOF_RECORD_SIZE;
    if needed > body.len() {
        return Err(CodecError::Truncated {
            declared: count,
            needed: encoded_len(count),
            available: bytes.len(),
        });
    }

    let mut batch = DofBatch::new();
    for (position, block) in body[..needed].chunks_exact(DOF_RECORD_SIZE).enumerate() {
        let record = DofRecord::read(block);
        if !record.is_finite() {
            return Err(CodecError::NonFinite {
                record: position,
                index: record.index,
            });
        }
        // count <= MAX_DOF_RECORDS == capacity
        let _ = batch.push(record);
    }
    Ok(batch)
}

/// Encode `records` as one batch.
///
/// # Errors
/// `BatchFull` if more than [`MAX_DOF_RECORDS`] records are supplied.
pub fn encode_batch(records: &[DofRecord]) -> Result<Message, CodecError> {
    let mut writer = BatchWriter::new();
    for record in records {
        writer.push(record)?;
    }
    Ok(writer.into_message())
}

/// Incremental batch encoder over a bounded message buffer.
pub struct BatchWriter {
    message: Message,
}

impl BatchWriter {
    /// Start an empty batch.
    pub fn new() -> Self {
        let mut message = Message::new();
        // capacity > 0
        let _ = message.push(0);
        Self { message }
    }

    /// Records written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.message[0] as usize
    }

    /// True if no record has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one record.
    ///
    /// # Errors
    /// `BatchFull` once [`MAX_DOF_RECORDS`] records are held; the batch is unchanged.
    pub fn push(&mut self, record: &DofRecord) -> Result<(), CodecError> {
        if self.len() >= MAX_DOF_RECORDS {
            return Err(CodecError::BatchFull);
        }

        let mut block = [0u8; DOF_RECORD_SIZE];
        block[0] = record.index;
        for (chunk, value) in block[1..1 + DOF_DATA_BLOCK_SIZE]
            .chunks_exact_mut(DOF_FIELD_SIZE)
            .zip(record.values)
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }

        self.message
            .extend_from_slice(&block)
            .map_err(|_| CodecError::BatchFull)?;
        self.message[0] += 1;
        Ok(())
    }

    /// Encoded bytes of the batch so far.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.message
    }

    /// Finish and take the encoded message.
    pub fn into_message(self) -> Message {
        self.message
    }
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new()
    }
}
