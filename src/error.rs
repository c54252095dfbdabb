//! # Error Types
//!
//! Central error type for the demultiplexer core. Matches the taxonomy of
//! invalid-input / resource-exhaustion / protocol-discontinuity /
//! configuration errors: the first three are logged and handled locally by
//! the pipe that hit them and never escape `Pipe::input`; only allocation
//! failures and control-command misuse are returned to a caller.
//!
//! ## Example Usage
//!
//! ```rust
//! use mpegts_demux::error::{DemuxError, Result};
//!
//! fn check_pid(pid: u16) -> Result<()> {
//!     if pid > 0x1fff {
//!         return Err(DemuxError::PidOutOfRange(pid));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the mpegts-demux crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// Reserved for an eventual owning reader; the core never performs I/O
    /// itself, but downstream crates composing this one want to fold I/O
    /// errors into the same type.
    #[error("io error: {0}")]
    Io(String),

    /// The first (or only) flow-definition unit did not start with
    /// `"block."`, or a later flow-def was rejected by a subpipe.
    #[error("invalid flow definition: {0}")]
    InvalidFlowDef(String),

    /// A PID attribute fell outside `[0, 8191]`.
    #[error("PID out of range: {0}")]
    PidOutOfRange(u16),

    /// PSI section failed CRC-32/MPEG-2 validation.
    #[error("CRC mismatch: {0}")]
    Crc(String),

    /// Fewer bytes were available than the section header requires.
    #[error("PSI section too short")]
    SectionTooShort,

    /// Declared `section_length` did not match the bytes actually gathered.
    #[error("section length mismatch: expected {expected}, got {actual}")]
    SectionLengthMismatch {
        /// Bytes declared by the section header.
        expected: usize,
        /// Bytes actually gathered by the assembler.
        actual: usize,
    },

    /// A `Uref`/inner-pipe allocation failed; the current construction step
    /// is aborted and prior state is left untouched.
    #[error("resource exhausted: {0}")]
    AllocError(String),

    /// `SET_CONFORMANCE` was called with a value outside {auto, iso, dvb,
    /// atsc, isdb}.
    #[error("unknown conformance value: {0}")]
    UnknownConformance(String),

    /// A control command was sent to a pipe that does not implement it.
    #[error("unhandled control command")]
    UnhandledControl,
}

impl From<std::io::Error> for DemuxError {
    fn from(e: std::io::Error) -> Self {
        DemuxError::Io(e.to_string())
    }
}

/// A specialized `Result` type for mpegts-demux operations.
pub type Result<T> = std::result::Result<T, DemuxError>;
