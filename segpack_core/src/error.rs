//! The single error type shared by the codec, the volume writer and the reader.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    // =========================================================================
    // === Wire-format errors (corrupt or foreign input)
    // =========================================================================
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("truncated buffer: {what} at word {offset} needs {needed} word(s) but the buffer holds {available}")]
    TruncatedBuffer {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    // =========================================================================
    // === Encoder limits
    // =========================================================================
    #[error("too many distinct values in one block ({0}); use a smaller block size")]
    TooManyDistinctValues(usize),

    #[error("{field} offset {offset} does not fit in {bits} bits")]
    OffsetOverflow {
        field: &'static str,
        offset: usize,
        bits: u32,
    },

    #[error("internal invariant violated (this is a bug): {0}")]
    InvariantViolation(String),

    // =========================================================================
    // === Caller input
    // =========================================================================
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("unsupported volume metadata: {0}")]
    Metadata(String),

    // =========================================================================
    // === External error wrappers
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SegmentationError>;
