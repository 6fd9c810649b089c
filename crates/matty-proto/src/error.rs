//! Error types for report encoding and conversion.

use thiserror::Error;

/// Failures of the radio wire codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A field value does not fit its encoded bit width.
    #[error("{field} = {value} does not fit in {bits} bits")]
    OutOfRange {
        field: &'static str,
        value: i64,
        bits: u32,
    },

    /// Location given but latitude or longitude is NaN or infinite.
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    /// Packet is truncated or carries an unknown system code.
    #[error("malformed report packet: {0}")]
    MalformedInput(String),
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput(reason.into())
    }
}

/// Failures converting an API report view back into a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("unknown system identifier: {0:?}")]
    UnknownSystem(String),

    #[error("{field} = {value} is not a valid code")]
    InvalidValue { field: &'static str, value: i64 },
}
