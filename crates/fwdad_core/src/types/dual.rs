//! Composite dual tensor handle.

use super::level::Level;

/// A dual tensor created by `make_dual`.
///
/// `handle` is the engine-native composite that downstream engine operations
/// treat as a single tensor carrying both primal and tangent. `primal` and
/// `tangent` are the handles it was built from. The value is only meaningful
/// while `level` is live; after the level exits the registry forgets it and
/// unpacking reports no tangent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DualTensor<H> {
    handle: H,
    primal: H,
    tangent: H,
    level: Level,
}

impl<H: Copy> DualTensor<H> {
    pub(crate) fn new(handle: H, primal: H, tangent: H, level: Level) -> Self {
        Self {
            handle,
            primal,
            tangent,
            level,
        }
    }

    /// Returns the composite handle to pass to engine operations.
    #[inline]
    pub fn handle(&self) -> H {
        self.handle
    }

    /// Returns the primal handle.
    #[inline]
    pub fn primal(&self) -> H {
        self.primal
    }

    /// Returns the tangent handle.
    #[inline]
    pub fn tangent(&self) -> H {
        self.tangent
    }

    /// Returns the owning level.
    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Extracts primal and tangent as a tuple.
    #[inline]
    pub fn into_parts(self) -> (H, H) {
        (self.primal, self.tangent)
    }
}
