//! Registry of dual tensors created through `make_dual`.
//!
//! Entries are grouped by owning level so that exiting a level drops all of
//! its entries in one step.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::debug;

use crate::engine::ComputeEngine;
use crate::types::{DualTensor, ForwardAdError, Level, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DualEntry<H> {
    primal: H,
    tangent: H,
}

/// Maps (dual handle, level) to the primal and tangent it was built from.
#[derive(Debug, Clone)]
pub struct DualTensorRegistry<H> {
    levels: BTreeMap<Level, HashMap<H, DualEntry<H>>>,
}

impl<H> Default for DualTensorRegistry<H> {
    fn default() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }
}

impl<H: Copy + Eq + Hash + Debug> DualTensorRegistry<H> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Packs `primal` and `tangent` at `level` and records the association.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when `level` is `None`; engine failures are
    /// propagated and leave the registry unchanged.
    pub fn make_dual<E>(
        &mut self,
        engine: &mut E,
        primal: H,
        tangent: H,
        level: Option<Level>,
    ) -> Result<DualTensor<H>>
    where
        E: ComputeEngine<Handle = H>,
    {
        let level = level.ok_or_else(|| {
            ForwardAdError::InvalidArgument(
                "make_dual needs a level; the no-level sentinel was given".to_string(),
            )
        })?;

        let handle = engine.pack(primal, tangent, level)?;
        self.levels
            .entry(level)
            .or_default()
            .insert(handle, DualEntry { primal, tangent });
        debug!(level = level.index(), handle = ?handle, "registered dual tensor");

        Ok(DualTensor::new(handle, primal, tangent, level))
    }

    /// Splits `tensor` into primal and tangent at `level`.
    ///
    /// With no level the tensor is returned with no tangent. Tensors this
    /// registry does not know (results of engine operations) are handed to
    /// the engine; a tensor with nothing tracked at `level` comes back as
    /// itself with no tangent.
    pub fn unpack_dual<E>(
        &self,
        engine: &mut E,
        tensor: H,
        level: Option<Level>,
    ) -> Result<(H, Option<H>)>
    where
        E: ComputeEngine<Handle = H>,
    {
        let Some(level) = level else {
            return Ok((tensor, None));
        };

        if let Some(entry) = self.lookup(tensor, level) {
            return Ok((entry.primal, Some(entry.tangent)));
        }

        match engine.unpack(tensor, level)? {
            (primal, Some(tangent)) => Ok((primal, Some(tangent))),
            (_, None) => Ok((tensor, None)),
        }
    }

    /// Removes every association recorded under `level`.
    ///
    /// Returns the number of entries removed.
    pub fn purge(&mut self, level: Level) -> usize {
        let removed = self.levels.remove(&level).map_or(0, |entries| entries.len());
        debug!(level = level.index(), removed, "purged dual tensors");
        removed
    }

    /// Returns `true` if `tensor` was registered at `level`.
    pub fn contains(&self, tensor: H, level: Level) -> bool {
        self.lookup(tensor, level).is_some()
    }

    /// Number of entries registered at `level`.
    pub fn entries_at(&self, level: Level) -> usize {
        self.levels.get(&level).map_or(0, HashMap::len)
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.levels.values().map(HashMap::len).sum()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.levels.values().all(HashMap::is_empty)
    }

    fn lookup(&self, tensor: H, level: Level) -> Option<&DualEntry<H>> {
        self.levels.get(&level).and_then(|entries| entries.get(&tensor))
    }
}
