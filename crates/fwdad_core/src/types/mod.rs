//! Core value types for forward-mode AD bookkeeping.
//!
//! This module provides:
//! - `Level`: nesting depth identifier for dual levels
//! - `DualTensor`: composite handle produced by `make_dual`
//! - Error types: `ForwardAdError`, `EngineError`, `ErrorKind`

pub mod dual;
pub mod error;
pub mod level;

pub use dual::DualTensor;
pub use error::{EngineError, ErrorKind, ForwardAdError, Result};
pub use level::Level;
