//! Error types for structured error handling.
//!
//! This module provides:
//! - `ForwardAdError`: Errors from level and dual tensor bookkeeping
//! - `EngineError`: Errors reported by a compute engine
//! - `ErrorKind`: Coarse taxonomy used by callers that only care about the class

use thiserror::Error;

use super::level::Level;

/// Result alias for forward-AD bookkeeping operations.
pub type Result<T> = std::result::Result<T, ForwardAdError>;

/// Coarse classification of a [`ForwardAdError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Level stack discipline was violated.
    InvalidState,
    /// A directly supplied argument was malformed.
    InvalidArgument,
    /// The compute engine rejected the request.
    Engine,
}

/// Errors from level stack and dual tensor registry operations.
///
/// All variants describe misuse of the nesting contract or a failure
/// reported by the engine; none of them are transient.
///
/// # Examples
/// ```
/// use fwdad_core::types::{ErrorKind, ForwardAdError, Level};
///
/// let err = ForwardAdError::NonTopLevelExit {
///     requested: Level::new(0),
///     current: 1,
/// };
/// assert_eq!(err.kind(), ErrorKind::InvalidState);
/// assert_eq!(
///     err.to_string(),
///     "cannot exit level 0: the innermost live level is 1"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardAdError {
    /// Exit requested for a level that is not the innermost live level.
    #[error("cannot exit level {requested}: the innermost live level is {current}")]
    NonTopLevelExit {
        /// Level the caller tried to exit
        requested: Level,
        /// Innermost live level, `-1` when none
        current: i64,
    },

    /// The engine allocated a level number other than the one the stack expected.
    #[error("engine allocated level {engine} but level {expected} was expected; engine level state was modified outside this session")]
    LevelCounterMismatch {
        /// Level the stack was about to push
        expected: Level,
        /// Level reported by the engine
        engine: i64,
    },

    /// An operation needing an active level ran with none.
    #[error("no forward AD level is active; enter a dual level first")]
    NoActiveLevel,

    /// An explicit level is not live in this session.
    #[error("level {level} is not live (stack depth {depth})")]
    LevelNotLive {
        /// Requested level
        level: Level,
        /// Stack depth at the time of the request
        depth: usize,
    },

    /// Entering another level would exceed the configured nesting bound.
    #[error("cannot enter another level: maximum nesting depth {max_depth} reached")]
    MaxDepthExceeded {
        /// Configured bound
        max_depth: usize,
    },

    /// A shared session lock was poisoned by a panicking holder.
    #[error("shared forward AD session is poisoned")]
    Poisoned,

    /// A directly supplied argument is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The compute engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ForwardAdError {
    /// Returns the error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForwardAdError::NonTopLevelExit { .. }
            | ForwardAdError::LevelCounterMismatch { .. }
            | ForwardAdError::NoActiveLevel
            | ForwardAdError::LevelNotLive { .. }
            | ForwardAdError::MaxDepthExceeded { .. }
            | ForwardAdError::Poisoned => ErrorKind::InvalidState,
            ForwardAdError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ForwardAdError::Engine(_) => ErrorKind::Engine,
        }
    }

    /// Returns `true` for stack discipline violations.
    pub fn is_invalid_state(&self) -> bool {
        self.kind() == ErrorKind::InvalidState
    }

    /// Returns `true` for malformed arguments.
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }
}

/// Errors reported by a compute engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The handle does not name a tensor owned by the engine.
    #[error("unknown tensor handle: {0}")]
    UnknownHandle(String),

    /// Operand shapes do not agree.
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// Shape of the first operand
        left: Vec<usize>,
        /// Shape of the second operand
        right: Vec<usize>,
    },

    /// Tensor data does not match its declared shape.
    #[error("invalid tensor data: {0}")]
    InvalidData(String),

    /// The level is not allocated on the engine side.
    #[error("level {0} is not allocated by the engine")]
    UnknownLevel(Level),

    /// Any other engine-side failure.
    #[error("engine failure: {0}")]
    Internal(String),
}
