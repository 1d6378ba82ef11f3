//! Error types for the logging engine.

use thiserror::Error;

/// Result type alias for fluxlog operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Error raised by [`crate::writer::Writer::write`].
///
/// `temporary` mirrors the spec's `TEMPORARY_ERROR` / `PERMANENT_ERROR`
/// distinction: temporary errors are retriable, permanent ones are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteError {
    /// Whether the writer considers this failure retriable.
    pub temporary: bool,
    /// Caller-defined error code, opaque to the engine.
    pub code: i32,
}

impl WriteError {
    /// Build a temporary (retriable) write error.
    pub fn temporary(code: i32) -> Self {
        Self { temporary: true, code }
    }

    /// Build a permanent (non-retriable) write error.
    pub fn permanent(code: i32) -> Self {
        Self { temporary: false, code }
    }
}

/// Main error type for the logging engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// A single frame's formatter demanded more bytes than the output
    /// buffer's entire capacity. Permanent; the frame is reverted and
    /// counted as lost.
    #[error(
        "frame of {frame_size} bytes exceeds the output buffer's capacity of {capacity} bytes"
    )]
    ExcessiveOutputByFrame {
        /// Bytes the formatter asked `OutputBuffer::reserve` for.
        frame_size: usize,
        /// Total capacity of the output buffer.
        capacity: usize,
    },

    /// A frame's `reserve`-induced flush reported a sink failure.
    #[error("flush failed ({}): code {code}", if *.temporary { "temporary" } else { "permanent" })]
    Flush {
        /// Whether the sink classified this failure as retriable.
        temporary: bool,
        /// The sink's raw error code.
        code: i32,
    },

    /// Raised out of the worker loop when the active error policy for a
    /// flush failure is `FAIL_IMMEDIATELY`. Terminates the worker thread.
    #[error("fatal flush error ({}): code {code}", if *.temporary { "temporary" } else { "permanent" })]
    FatalFlush {
        /// Whether the sink classified this failure as retriable.
        temporary: bool,
        /// The sink's raw error code.
        code: i32,
    },

    /// A requested frame size cannot ever fit in the input ring, even after
    /// a wraparound.
    #[error("frame of {frame_size} bytes cannot fit in a {max}-byte input buffer")]
    FrameTooLarge {
        /// Bytes requested via [`crate::input_buffer::InputBuffer::reserve`].
        frame_size: usize,
        /// `B - size_of::<DispatchHandle>()`, the largest frame the ring can ever hold.
        max: usize,
    },

    /// An `open`-time configuration value was invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable description of the invalid value.
        message: &'static str,
    },

    /// A user formatter ([`crate::dispatch::Loggable::format`]) failed for a
    /// reason unrelated to the output buffer's capacity or sink — never
    /// fatal to the worker, routed to the format-error callback instead of
    /// the flush-error policy machinery.
    #[error("format error: {0}")]
    Format(String),
}

impl LogError {
    /// Whether this error represents a condition the caller might recover
    /// from by retrying (as opposed to a logic error in how the engine was
    /// configured or used).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Flush { temporary: true, .. })
    }

    /// Whether this error, if produced inside the worker loop, should
    /// terminate the worker thread and mark the logger dead.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalFlush { .. })
    }

    /// Whether this is a user-formatter failure (routed to the format-error
    /// callback) rather than an output-buffer/sink failure (routed through
    /// the flush-error policy machinery).
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}
