//! Error types for the codec layer.
//!
//! [`FramingError`] covers every way the byte stream can stop describing a
//! well-formed frame. None of them are recoverable: once a length prefix is
//! wrong the position of the next frame boundary is unknown, so the session
//! owning the stream must be terminated. [`CodecError`] wraps framing errors
//! together with I/O failures so it can serve as the `tokio_util` codec error.

use std::io;

use thiserror::Error;

/// Wire-level issues in frame structure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// A length prefix was empty, non-numeric, or too long.
    #[error("invalid length prefix {token:?} for field {field}")]
    InvalidLength {
        /// Zero-based field index.
        field: usize,
        /// Offending token, lossily decoded.
        token: String,
    },

    /// A length prefix announced more bytes than the configured maximum.
    #[error("field {field} length {len} exceeds maximum {max}")]
    OversizedField {
        /// Zero-based field index.
        field: usize,
        /// Announced length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The single space between tokens was replaced by another byte.
    #[error("expected separator at offset {offset}, found byte {found:#04x}")]
    MissingSeparator {
        /// Byte offset within the frame.
        offset: usize,
        /// Byte found instead of a space.
        found: u8,
    },

    /// Field content was not valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Zero-based field index.
        field: usize,
    },

    /// The stream ended in the middle of a frame.
    #[error("stream ended mid-frame with {have} buffered bytes")]
    Truncated {
        /// Bytes left in the buffer when the stream ended.
        have: usize,
    },
}

/// Top-level codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The byte stream is malformed.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Returns the framing error when this is one.
    #[must_use]
    pub fn as_framing(&self) -> Option<&FramingError> {
        match self {
            Self::Framing(err) => Some(err),
            Self::Io(_) => None,
        }
    }
}
