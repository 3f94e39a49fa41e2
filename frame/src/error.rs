//! Error types and the fatal termination path.
//!
//! Two kinds of failure exist in the frame core:
//!
//! - Recoverable failures (resource creation, counter resolution) are returned
//!   as [`GraphicsError`] and handled by the caller.
//! - Programming and sizing errors (arena exhaustion, pass graph cycles,
//!   releasing a frame slot twice) go through [`fatal!`]: the diagnostic is
//!   logged at error level and the process terminates. Release builds abort
//!   on panic, so nothing unwinds past a fatal error.

use thiserror::Error;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    #[error("feature not supported: {0}")]
    FeatureNotSupported(String),
    /// Out of GPU memory.
    #[error("out of GPU memory")]
    OutOfMemory,
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Reading back GPU counter samples failed.
    #[error("counter resolve failed: {0}")]
    CounterResolveFailed(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Log `message` at error level, then terminate.
///
/// Prefer the [`fatal!`] macro, which formats its arguments lazily.
#[cold]
#[track_caller]
pub fn fatal_error(message: std::fmt::Arguments<'_>) -> ! {
    let message = message.to_string();
    log::error!("{message}");
    panic!("{message}");
}

/// Log a formatted diagnostic and terminate the process.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::fatal_error(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::CounterResolveFailed("device lost".to_string());
        assert_eq!(err.to_string(), "counter resolve failed: device lost");
    }

    #[test]
    #[should_panic(expected = "arena exhausted: 64 bytes")]
    fn test_fatal_panics_with_message() {
        fatal!("arena exhausted: {} bytes", 64);
    }
}
