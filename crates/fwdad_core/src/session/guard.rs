//! Scoped level acquisition.
//!
//! A [`DualLevelGuard`] owns one level for the lifetime of a block. It
//! dereferences to the session, so dual tensors are created through the
//! guard, and it exits its level when dropped on every exit path.
//!
//! # Example
//!
//! ```rust
//! use fwdad_core::engine::HostEngine;
//! use fwdad_core::session::ForwardAdSession;
//!
//! let mut session = ForwardAdSession::new(HostEngine::new());
//! let x = session.engine_mut().scalar(1.0);
//! let dx = session.engine_mut().scalar(1.0);
//!
//! {
//!     let mut guard = session.dual_level().unwrap();
//!     let dual = guard.make_dual(x, dx, None).unwrap();
//!     assert_eq!(dual.level(), guard.level());
//!     // level exited here
//! }
//!
//! assert_eq!(session.current_level(), None);
//! ```

use std::ops::{Deref, DerefMut};

use tracing::warn;

use super::ForwardAdSession;
use crate::engine::ComputeEngine;
use crate::types::{Level, Result};

/// RAII guard around a single level.
///
/// Dropping the guard exits its level. Levels entered inside the scope and
/// never exited are exited first, innermost first, since they cannot outlive
/// the scope. Failures during drop are logged; use [`DualLevelGuard::exit`]
/// to observe them.
pub struct DualLevelGuard<'a, E: ComputeEngine> {
    session: &'a mut ForwardAdSession<E>,
    level: Level,
    exited: bool,
}

impl<'a, E: ComputeEngine> DualLevelGuard<'a, E> {
    pub(crate) fn new(session: &'a mut ForwardAdSession<E>, level: Level) -> Self {
        Self {
            session,
            level,
            exited: false,
        }
    }

    /// The level owned by this guard.
    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Exits the level now and reports the outcome.
    ///
    /// Unlike drop, this does not close levels left open inside the scope:
    /// if one is still live the exit fails with `NonTopLevelExit`, and the
    /// guard's drop then cleans up.
    pub fn exit(mut self) -> Result<()> {
        self.session.exit_level(Some(self.level))?;
        self.exited = true;
        Ok(())
    }
}

impl<E: ComputeEngine> Deref for DualLevelGuard<'_, E> {
    type Target = ForwardAdSession<E>;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}

impl<E: ComputeEngine> DerefMut for DualLevelGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.session
    }
}

impl<E: ComputeEngine> Drop for DualLevelGuard<'_, E> {
    fn drop(&mut self) {
        if self.exited || !self.session.levels.is_live(self.level) {
            return;
        }

        while let Some(top) = self.session.current_level() {
            if top <= self.level {
                break;
            }
            warn!(
                level = top.index(),
                scope = self.level.index(),
                "exiting level left open inside a dual level scope"
            );
            if let Err(err) = self.session.exit_level(Some(top)) {
                warn!(level = top.index(), error = %err, "failed to exit nested level");
                return;
            }
        }

        if let Err(err) = self.session.exit_level(Some(self.level)) {
            warn!(level = self.level.index(), error = %err, "failed to exit dual level");
        }
    }
}

impl<E: ComputeEngine> std::fmt::Debug for DualLevelGuard<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualLevelGuard")
            .field("level", &self.level)
            .field("exited", &self.exited)
            .finish()
    }
}
