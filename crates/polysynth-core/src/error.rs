//! Error types for the polysynth voice engine.
//!
//! Only construction-time failures are representable here. Once an
//! [`crate::Engine`] exists, the command path and the audio path are both
//! infallible by construction: malformed commands are dropped and
//! out-of-range parameters are clamped, never surfaced as `Err`.

use std::fmt;

/// Errors that can occur while constructing an [`crate::Engine`].
#[derive(Debug)]
pub enum EngineError {
    /// The requested sample rate was zero.
    InvalidSampleRate(u32),
    /// The requested delay-ring capacity was zero.
    InvalidDelayCapacity(usize),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSampleRate(rate) => {
                write!(f, "invalid sample rate: {} (must be > 0)", rate)
            }
            Self::InvalidDelayCapacity(cap) => {
                write!(f, "invalid delay ring capacity: {} (must be > 0)", cap)
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Result type for engine construction.
pub type EngineResult<T> = Result<T, EngineError>;
