//! Stack of live forward-AD levels.
//!
//! The stack only stores its depth: live levels are always `0..depth`. The
//! engine's level counter must follow it exactly; the stack is the single
//! source of truth and every allocation is checked against it.

use tracing::{debug, warn};

use crate::engine::ComputeEngine;
use crate::types::{ForwardAdError, Level, Result};

/// Strict LIFO stack of live levels.
#[derive(Debug, Clone)]
pub struct LevelStack {
    depth: usize,
    max_depth: usize,
}

impl LevelStack {
    /// Creates an empty stack bounded by `max_depth` live levels.
    pub fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
        }
    }

    /// Allocates the next level on the engine and makes it the top.
    ///
    /// # Errors
    ///
    /// - `MaxDepthExceeded` if the stack is full; the engine is not called.
    /// - `LevelCounterMismatch` if the engine hands out a different level
    ///   than `depth`. The level the engine allocated is handed back, so
    ///   neither side changes.
    pub fn push<E: ComputeEngine>(&mut self, engine: &mut E) -> Result<Level> {
        if self.depth >= self.max_depth {
            return Err(ForwardAdError::MaxDepthExceeded {
                max_depth: self.max_depth,
            });
        }

        let expected = self.next_level()?;
        let allocated = engine.allocate_level()?;
        if allocated != expected.as_raw() {
            if let Ok(Some(stray)) = Level::from_raw(allocated) {
                if let Err(err) = engine.release_level(stray) {
                    warn!(level = stray.index(), error = %err, "failed to release mismatched engine level");
                }
            }
            return Err(ForwardAdError::LevelCounterMismatch {
                expected,
                engine: allocated,
            });
        }

        self.depth += 1;
        debug!(level = expected.index(), depth = self.depth, "entered dual level");
        Ok(expected)
    }

    /// Checks that `level` is the top without changing anything.
    ///
    /// # Errors
    ///
    /// `NonTopLevelExit` when `level` is not the top.
    pub fn check_top(&self, level: Level) -> Result<()> {
        match self.current() {
            Some(top) if top == level => Ok(()),
            current => Err(ForwardAdError::NonTopLevelExit {
                requested: level,
                current: Level::raw(current),
            }),
        }
    }

    /// Removes `level`, which must be the top.
    ///
    /// # Errors
    ///
    /// `NonTopLevelExit` when `level` is not the top; the stack is unchanged.
    pub fn pop(&mut self, level: Level) -> Result<()> {
        self.check_top(level)?;
        self.depth -= 1;
        debug!(level = level.index(), depth = self.depth, "exited dual level");
        Ok(())
    }

    /// Returns the innermost live level.
    #[inline]
    pub fn current(&self) -> Option<Level> {
        self.depth.checked_sub(1).map(|top| Level::new(top as u32))
    }

    /// Returns the innermost live level as a raw integer, `-1` if none.
    #[inline]
    pub fn current_raw(&self) -> i64 {
        Level::raw(self.current())
    }

    /// Number of live levels.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns `true` if no level is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Returns `true` if `level` is live.
    #[inline]
    pub fn is_live(&self, level: Level) -> bool {
        (level.index() as usize) < self.depth
    }

    /// Configured nesting bound.
    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn next_level(&self) -> Result<Level> {
        u32::try_from(self.depth)
            .map(Level::new)
            .map_err(|_| ForwardAdError::MaxDepthExceeded {
                max_depth: self.max_depth,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HostEngine;
    use crate::types::{EngineError, ErrorKind};

    /// Engine whose level counter starts ahead of the stack.
    struct SkewedEngine {
        next: i64,
        released: Vec<Level>,
    }

    impl ComputeEngine for SkewedEngine {
        type Handle = u32;

        fn allocate_level(&mut self) -> std::result::Result<i64, EngineError> {
            let level = self.next;
            self.next += 1;
            Ok(level)
        }

        fn release_level(&mut self, level: Level) -> std::result::Result<(), EngineError> {
            self.released.push(level);
            self.next -= 1;
            Ok(())
        }

        fn pack(&mut self, primal: u32, _t: u32, _l: Level) -> std::result::Result<u32, EngineError> {
            Ok(primal)
        }

        fn unpack(
            &mut self,
            handle: u32,
            _level: Level,
        ) -> std::result::Result<(u32, Option<u32>), EngineError> {
            Ok((handle, None))
        }
    }

    #[test]
    fn test_push_pop_sequence() {
        let mut engine = HostEngine::new();
        let mut stack = LevelStack::new(8);
        assert_eq!(stack.current(), None);
        assert_eq!(stack.current_raw(), -1);

        let l0 = stack.push(&mut engine).unwrap();
        let l1 = stack.push(&mut engine).unwrap();
        assert_eq!((l0.index(), l1.index()), (0, 1));
        assert_eq!(stack.depth(), 2);
        assert!(stack.is_live(l0) && stack.is_live(l1));
        assert!(!stack.is_live(Level::new(2)));

        stack.pop(l1).unwrap();
        stack.pop(l0).unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_pop_non_top_leaves_stack_unchanged() {
        let mut engine = HostEngine::new();
        let mut stack = LevelStack::new(8);
        let l0 = stack.push(&mut engine).unwrap();
        let _l1 = stack.push(&mut engine).unwrap();

        let err = stack.pop(l0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(
            err,
            ForwardAdError::NonTopLevelExit {
                requested: l0,
                current: 1
            }
        );
        assert_eq!(stack.depth(), 2);
    }

    #[test]
    fn test_pop_on_empty_stack() {
        let mut stack = LevelStack::new(8);
        let err = stack.pop(Level::ROOT).unwrap_err();
        assert_eq!(
            err,
            ForwardAdError::NonTopLevelExit {
                requested: Level::ROOT,
                current: -1
            }
        );
    }

    #[test]
    fn test_engine_mismatch_is_detected() {
        let mut engine = SkewedEngine {
            next: 3,
            released: Vec::new(),
        };
        let mut stack = LevelStack::new(8);
        let err = stack.push(&mut engine).unwrap_err();
        assert_eq!(
            err,
            ForwardAdError::LevelCounterMismatch {
                expected: Level::ROOT,
                engine: 3
            }
        );
        assert!(stack.is_empty());
        assert_eq!(engine.released, vec![Level::new(3)]);
    }

    #[test]
    fn test_mismatch_hands_level_back_to_engine() {
        let mut engine = HostEngine::new();
        engine.allocate_level().unwrap();
        let mut stack = LevelStack::new(8);

        for _ in 0..3 {
            let err = stack.push(&mut engine).unwrap_err();
            assert_eq!(
                err,
                ForwardAdError::LevelCounterMismatch {
                    expected: Level::ROOT,
                    engine: 1
                }
            );
            assert_eq!(engine.live_levels(), 1);
        }
        assert!(stack.is_empty());
    }

    #[test]
    fn test_check_top_does_not_pop() {
        let mut engine = HostEngine::new();
        let mut stack = LevelStack::new(8);
        let l0 = stack.push(&mut engine).unwrap();
        stack.check_top(l0).unwrap();
        assert!(stack.check_top(Level::new(1)).is_err());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_max_depth_does_not_touch_engine() {
        let mut engine = HostEngine::new();
        let mut stack = LevelStack::new(1);
        stack.push(&mut engine).unwrap();
        let err = stack.push(&mut engine).unwrap_err();
        assert_eq!(err, ForwardAdError::MaxDepthExceeded { max_depth: 1 });
        assert_eq!(engine.live_levels(), 1);
    }
}
