//! Error types for C3D reading and writing

use std::io;

use thiserror::Error;

use crate::processor::Processor;
use crate::writer::ConversionMode;

/// Errors that can occur when reading or writing C3D files
#[derive(Debug, Error)]
pub enum C3dError {
    /// IO error on the underlying handle
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File ended inside the 512-byte header block
    #[error("Truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    /// Processor tag in the parameter section is not 84, 85 or 86
    #[error("Unsupported processor tag: {0} (expected 84, 85 or 86)")]
    UnsupportedProcessor(u8),

    /// Parameter section records are malformed
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Typed parameter access against an incompatible element width
    #[error("Type mismatch for parameter {param}: requested width {expected}, stored width {actual}")]
    TypeMismatch {
        param: String,
        expected: i8,
        actual: i8,
    },

    /// Writer conversion mode not allowed for the source processor
    #[error("Cannot convert {processor} file with mode {mode}; only shallow_copy and copy_header are supported")]
    UnsupportedConversion {
        processor: Processor,
        mode: ConversionMode,
    },

    /// Write attempted without any buffered frames
    #[error("Attempted to write a file without frames")]
    EmptyWrite,

    /// ANALOG:BITS declares a sample width this crate cannot decode
    #[error("Analog data using {0} bits is not supported")]
    AnalogBitWidthUnsupported(u16),

    /// A group with the same id or name already exists
    #[error("Duplicate group: {0}")]
    DuplicateGroup(String),

    /// No group matches the given key
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    /// Frame shape does not match the layout being written
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Caller supplied a value the format cannot represent
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Reader metadata was moved into a Writer
    #[error("Reader was consumed by a writer conversion")]
    SourceConsumed,
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, C3dError>;

impl C3dError {
    pub(crate) fn metadata(details: impl std::fmt::Display) -> Self {
        Self::InvalidMetadata(details.to_string())
    }

    pub(crate) fn invalid_value(details: impl std::fmt::Display) -> Self {
        Self::InvalidValue(details.to_string())
    }
}
