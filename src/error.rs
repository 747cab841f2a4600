//! Error types for the enhancement engine.
//!
//! Only caller contract violations surface as errors. Numerical edge cases
//! (silence, near-zero noise estimates, out-of-domain special-function
//! arguments) are handled with epsilon floors or IEEE NaN returns instead.

use thiserror::Error;

/// Engine error codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Error {
    /// A supplied frame does not match the configured spectrum length.
    /// Frames are never truncated or padded; this is a framing bug at the
    /// call site.
    #[error("frame length mismatch: expected {expected} bins, got {got}")]
    FrameLength { expected: usize, got: usize },

    /// A configuration snapshot failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
