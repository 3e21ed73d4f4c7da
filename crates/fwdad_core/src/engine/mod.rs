//! Compute engine boundary.
//!
//! The level stack and registry never touch tensor data. Everything numeric
//! goes through [`ComputeEngine`], which owns tensor storage, the engine-side
//! per-level buffers and the composite dual representation.
//!
//! # Module Structure
//!
//! - [`host`]: `HostEngine`, a dense `f64` reference engine with tangent
//!   propagation for a handful of elementwise operations

use std::fmt::Debug;
use std::hash::Hash;

use crate::types::{EngineError, Level};

pub mod host;

pub use host::{HostEngine, TensorId};

/// Engine-side counterpart of the level stack and dual packing.
///
/// Implementations keep their own level counter; the session checks on
/// every allocation that it agrees with the stack and releases the level
/// again when it does not. Level numbers passed back in are always the
/// stack's.
pub trait ComputeEngine {
    /// Opaque tensor reference owned by the engine.
    type Handle: Copy + Eq + Hash + Debug;

    /// Allocates the next level and returns its number.
    fn allocate_level(&mut self) -> Result<i64, EngineError>;

    /// Releases `level`; the engine may drop any per-level buffers.
    fn release_level(&mut self, level: Level) -> Result<(), EngineError>;

    /// Builds the engine-native dual of `primal` with `tangent` at `level`.
    fn pack(
        &mut self,
        primal: Self::Handle,
        tangent: Self::Handle,
        level: Level,
    ) -> Result<Self::Handle, EngineError>;

    /// Splits `handle` into its primal and its tangent at `level`, if any.
    fn unpack(
        &mut self,
        handle: Self::Handle,
        level: Level,
    ) -> Result<(Self::Handle, Option<Self::Handle>), EngineError>;
}

impl<E: ComputeEngine + ?Sized> ComputeEngine for Box<E> {
    type Handle = E::Handle;

    fn allocate_level(&mut self) -> Result<i64, EngineError> {
        (**self).allocate_level()
    }

    fn release_level(&mut self, level: Level) -> Result<(), EngineError> {
        (**self).release_level(level)
    }

    fn pack(
        &mut self,
        primal: Self::Handle,
        tangent: Self::Handle,
        level: Level,
    ) -> Result<Self::Handle, EngineError> {
        (**self).pack(primal, tangent, level)
    }

    fn unpack(
        &mut self,
        handle: Self::Handle,
        level: Level,
    ) -> Result<(Self::Handle, Option<Self::Handle>), EngineError> {
        (**self).unpack(handle, level)
    }
}
