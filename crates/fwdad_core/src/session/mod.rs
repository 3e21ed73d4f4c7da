//! Forward-AD session: the public level and dual tensor operations.
//!
//! # Module Structure
//!
//! - [`level_stack`]: `LevelStack`, strict LIFO stack of live levels
//! - [`registry`]: `DualTensorRegistry`, (dual handle, level) → (primal, tangent)
//! - [`guard`]: `DualLevelGuard`, RAII scope around one level
//! - [`shared`]: `SharedForwardAdSession`, mutex-protected session for shared use
//!
//! # Level Defaulting
//!
//! Every operation taking `level: Option<Level>` resolves `None` to the
//! innermost live level of *this* session at the time of the call. There is
//! no hidden global: two sessions never see each other's levels.
//!
//! The `_at` variants (`make_dual_at`, `unpack_dual_at`) take the level
//! literally, with `None` as the explicit no-level sentinel.
//!
//! # Usage
//!
//! ```rust
//! use fwdad_core::engine::HostEngine;
//! use fwdad_core::session::ForwardAdSession;
//! use fwdad_core::types::Level;
//!
//! let mut session = ForwardAdSession::new(HostEngine::new());
//! let x = session.engine_mut().scalar(2.0);
//! let dx = session.engine_mut().scalar(1.0);
//!
//! let level = session.enter_level().unwrap();
//! assert_eq!(level, Level::ROOT);
//!
//! let dual = session.make_dual(x, dx, None).unwrap();
//! let y = session.engine_mut().mul(dual.handle(), dual.handle()).unwrap();
//! let (_, dy) = session.unpack_dual(y, None).unwrap();
//! assert_eq!(session.engine().values(dy.unwrap()).unwrap(), &[4.0]);
//!
//! session.exit_level(None).unwrap();
//! assert_eq!(session.current_level_raw(), -1);
//! ```

use tracing::debug;

use crate::config::{ConfigError, ForwardAdConfig};
use crate::engine::ComputeEngine;
use crate::types::{DualTensor, ForwardAdError, Level, Result};

pub mod guard;
pub mod level_stack;
pub mod registry;
pub mod shared;

pub use guard::DualLevelGuard;
pub use level_stack::LevelStack;
pub use registry::DualTensorRegistry;
pub use shared::SharedForwardAdSession;

/// Owner of one level stack, its dual tensor registry and the engine.
///
/// A session is confined to the call stack that owns it; methods take
/// `&mut self`, so nesting discipline cannot be broken by another thread.
#[derive(Debug)]
pub struct ForwardAdSession<E: ComputeEngine> {
    engine: E,
    levels: LevelStack,
    registry: DualTensorRegistry<E::Handle>,
    config: ForwardAdConfig,
}

impl<E: ComputeEngine> ForwardAdSession<E> {
    /// Creates a session with the default configuration.
    pub fn new(engine: E) -> Self {
        let config = ForwardAdConfig::default();
        Self {
            engine,
            levels: LevelStack::new(config.max_depth),
            registry: DualTensorRegistry::new(),
            config,
        }
    }

    /// Creates a session with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is invalid.
    pub fn with_config(engine: E, config: ForwardAdConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine,
            levels: LevelStack::new(config.max_depth),
            registry: DualTensorRegistry::new(),
            config,
        })
    }

    /// Enters a fresh level and returns it.
    ///
    /// This is the only way to obtain a level.
    pub fn enter_level(&mut self) -> Result<Level> {
        self.levels.push(&mut self.engine)
    }

    /// Exits `level`, defaulting to the innermost live level.
    ///
    /// The engine is told to release the level first; only once it agrees
    /// is the level popped and its registry entries purged.
    ///
    /// # Errors
    ///
    /// - `NoActiveLevel` if `level` is `None` and no level is live.
    /// - `NonTopLevelExit` if `level` is not the innermost live level.
    /// - `Engine` if the engine refuses the release.
    ///
    /// On every error the stack, registry and engine are unchanged, so the
    /// exit can be retried.
    pub fn exit_level(&mut self, level: Option<Level>) -> Result<()> {
        let level = match level.or_else(|| self.levels.current()) {
            Some(level) => level,
            None => return Err(ForwardAdError::NoActiveLevel),
        };

        self.levels.check_top(level)?;
        self.engine.release_level(level)?;
        self.levels.pop(level)?;
        self.registry.purge(level);
        Ok(())
    }

    /// Pairs `primal` with `tangent` at `level`, defaulting to the innermost level.
    ///
    /// # Errors
    ///
    /// - `NoActiveLevel` if no level is live and none was given.
    /// - `LevelNotLive` if an explicit level is not live.
    pub fn make_dual(
        &mut self,
        primal: E::Handle,
        tangent: E::Handle,
        level: Option<Level>,
    ) -> Result<DualTensor<E::Handle>> {
        let level = match level {
            Some(level) => level,
            None => self.levels.current().ok_or(ForwardAdError::NoActiveLevel)?,
        };
        self.make_dual_at(primal, tangent, Some(level))
    }

    /// Pairs `primal` with `tangent` at exactly `level`, with no defaulting.
    ///
    /// `None` is the explicit no-level sentinel.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `level` is `None`.
    /// - `LevelNotLive` if `level` is not live.
    pub fn make_dual_at(
        &mut self,
        primal: E::Handle,
        tangent: E::Handle,
        level: Option<Level>,
    ) -> Result<DualTensor<E::Handle>> {
        if let Some(level) = level {
            if !self.levels.is_live(level) {
                return Err(ForwardAdError::LevelNotLive {
                    level,
                    depth: self.levels.depth(),
                });
            }
        }

        self.registry
            .make_dual(&mut self.engine, primal, tangent, level)
    }

    /// Splits `tensor` into primal and tangent at `level`, defaulting to the
    /// innermost level.
    ///
    /// Never fails for a missing tangent: with no live level, or at a level
    /// that has already exited, the tensor is returned with `None`.
    pub fn unpack_dual(
        &mut self,
        tensor: E::Handle,
        level: Option<Level>,
    ) -> Result<(E::Handle, Option<E::Handle>)> {
        let level = level.or_else(|| self.levels.current());
        self.unpack_dual_at(tensor, level)
    }

    /// Splits `tensor` at exactly `level`, with no defaulting.
    ///
    /// `None` is the explicit no-level sentinel and always yields
    /// `(tensor, None)`, whatever the stack holds.
    pub fn unpack_dual_at(
        &mut self,
        tensor: E::Handle,
        level: Option<Level>,
    ) -> Result<(E::Handle, Option<E::Handle>)> {
        let level = match level {
            Some(level) if !self.levels.is_live(level) => {
                debug!(level = level.index(), "unpack at a level that is not live");
                None
            }
            level => level,
        };

        self.registry.unpack_dual(&mut self.engine, tensor, level)
    }

    /// Enters a level and returns a guard that exits it when dropped.
    pub fn dual_level(&mut self) -> Result<DualLevelGuard<'_, E>> {
        let level = self.enter_level()?;
        Ok(DualLevelGuard::new(self, level))
    }

    /// Runs `f` inside a fresh level.
    ///
    /// The level is exited whether `f` returns `Ok`, returns `Err` or
    /// unwinds. When `f` succeeds, a failure to exit is reported.
    pub fn with_dual_level<R, F>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self, Level) -> Result<R>,
    {
        let mut guard = self.dual_level()?;
        let level = guard.level();
        let value = f(&mut *guard, level)?;
        guard.exit()?;
        Ok(value)
    }

    /// Innermost live level.
    #[inline]
    pub fn current_level(&self) -> Option<Level> {
        self.levels.current()
    }

    /// Innermost live level as a raw integer, `-1` if none.
    #[inline]
    pub fn current_level_raw(&self) -> i64 {
        self.levels.current_raw()
    }

    /// Number of live levels.
    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.depth()
    }

    /// Shared access to the engine.
    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutable access to the engine, for tensor creation and operations.
    #[inline]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The dual tensor registry.
    #[inline]
    pub fn registry(&self) -> &DualTensorRegistry<E::Handle> {
        &self.registry
    }

    /// The configuration this session was built with.
    #[inline]
    pub fn config(&self) -> &ForwardAdConfig {
        &self.config
    }

    /// Consumes the session and returns the engine.
    pub fn into_engine(self) -> E {
        self.engine
    }
}
