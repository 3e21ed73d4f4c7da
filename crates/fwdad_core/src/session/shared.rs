//! Mutex-protected session for callers that must share one instance.
//!
//! Every operation takes the lock for its own duration only. Levels entered
//! from different call stacks still share one LIFO stack, so interleaved
//! nesting fails with `NonTopLevelExit` instead of corrupting state. Prefer
//! one [`ForwardAdSession`] per thread where possible.

use std::sync::{Arc, Mutex, MutexGuard};

use super::ForwardAdSession;
use crate::engine::ComputeEngine;
use crate::types::{DualTensor, ForwardAdError, Level, Result};

/// Cloneable handle to a session behind a mutex.
///
/// # Example
///
/// ```rust
/// use fwdad_core::engine::HostEngine;
/// use fwdad_core::session::SharedForwardAdSession;
///
/// let shared = SharedForwardAdSession::from_engine(HostEngine::new());
/// let worker = shared.clone();
///
/// std::thread::spawn(move || {
///     let level = worker.enter_level().unwrap();
///     worker.exit_level(Some(level)).unwrap();
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(shared.current_level().unwrap(), None);
/// ```
pub struct SharedForwardAdSession<E: ComputeEngine> {
    inner: Arc<Mutex<ForwardAdSession<E>>>,
}

impl<E: ComputeEngine> Clone for SharedForwardAdSession<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: ComputeEngine> SharedForwardAdSession<E> {
    /// Wraps an existing session.
    pub fn new(session: ForwardAdSession<E>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Wraps a fresh session with the default configuration.
    pub fn from_engine(engine: E) -> Self {
        Self::new(ForwardAdSession::new(engine))
    }

    /// See [`ForwardAdSession::enter_level`].
    pub fn enter_level(&self) -> Result<Level> {
        self.lock()?.enter_level()
    }

    /// See [`ForwardAdSession::exit_level`].
    pub fn exit_level(&self, level: Option<Level>) -> Result<()> {
        self.lock()?.exit_level(level)
    }

    /// See [`ForwardAdSession::make_dual`].
    pub fn make_dual(
        &self,
        primal: E::Handle,
        tangent: E::Handle,
        level: Option<Level>,
    ) -> Result<DualTensor<E::Handle>> {
        self.lock()?.make_dual(primal, tangent, level)
    }

    /// See [`ForwardAdSession::make_dual_at`].
    pub fn make_dual_at(
        &self,
        primal: E::Handle,
        tangent: E::Handle,
        level: Option<Level>,
    ) -> Result<DualTensor<E::Handle>> {
        self.lock()?.make_dual_at(primal, tangent, level)
    }

    /// See [`ForwardAdSession::unpack_dual_at`].
    pub fn unpack_dual_at(
        &self,
        tensor: E::Handle,
        level: Option<Level>,
    ) -> Result<(E::Handle, Option<E::Handle>)> {
        self.lock()?.unpack_dual_at(tensor, level)
    }

    /// See [`ForwardAdSession::unpack_dual`].
    pub fn unpack_dual(
        &self,
        tensor: E::Handle,
        level: Option<Level>,
    ) -> Result<(E::Handle, Option<E::Handle>)> {
        self.lock()?.unpack_dual(tensor, level)
    }

    /// Innermost live level.
    pub fn current_level(&self) -> Result<Option<Level>> {
        Ok(self.lock()?.current_level())
    }

    /// Number of live levels.
    pub fn depth(&self) -> Result<usize> {
        Ok(self.lock()?.depth())
    }

    /// Runs `f` with exclusive access to the session.
    ///
    /// Use this for sequences that must not interleave with other users,
    /// such as a whole [`ForwardAdSession::with_dual_level`] scope.
    pub fn with_session<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut ForwardAdSession<E>) -> Result<R>,
    {
        let mut session = self.lock()?;
        f(&mut session)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ForwardAdSession<E>>> {
        self.inner.lock().map_err(|_| ForwardAdError::Poisoned)
    }
}

impl<E: ComputeEngine> std::fmt::Debug for SharedForwardAdSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedForwardAdSession")
            .field("strong_count", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HostEngine;
    use std::thread;

    #[test]
    fn test_shared_roundtrip() {
        let shared = SharedForwardAdSession::from_engine(HostEngine::new());
        let (x, dx) = shared
            .with_session(|s| {
                let x = s.engine_mut().scalar(2.0);
                let dx = s.engine_mut().scalar(1.0);
                Ok((x, dx))
            })
            .unwrap();

        let level = shared.enter_level().unwrap();
        let dual = shared.make_dual(x, dx, None).unwrap();
        assert_eq!(shared.unpack_dual(dual.handle(), Some(level)).unwrap(), (x, Some(dx)));
        shared.exit_level(None).unwrap();
        assert_eq!(shared.depth().unwrap(), 0);
    }

    #[test]
    fn test_interleaved_nesting_fails_loudly() {
        let shared = SharedForwardAdSession::from_engine(HostEngine::new());
        let outer = shared.enter_level().unwrap();

        let worker = shared.clone();
        let inner = thread::spawn(move || worker.enter_level().unwrap())
            .join()
            .unwrap();
        assert_eq!(inner, Level::new(1));

        let err = shared.exit_level(Some(outer)).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(shared.depth().unwrap(), 2);

        shared.exit_level(Some(inner)).unwrap();
        shared.exit_level(Some(outer)).unwrap();
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let shared = SharedForwardAdSession::from_engine(HostEngine::new());
        let worker = shared.clone();
        let _ = thread::spawn(move || {
            let _ = worker.with_session(|_| -> Result<()> { panic!("poison") });
        })
        .join();

        assert_eq!(shared.enter_level().unwrap_err(), ForwardAdError::Poisoned);
    }

    #[test]
    fn test_scoped_work_under_one_lock() {
        let shared = SharedForwardAdSession::from_engine(HostEngine::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let worker = shared.clone();
                thread::spawn(move || {
                    worker
                        .with_session(|s| {
                            s.with_dual_level(|s, level| {
                                assert_eq!(level, Level::ROOT);
                                let x = s.engine_mut().scalar(i as f64);
                                let dx = s.engine_mut().scalar(1.0);
                                let dual = s.make_dual(x, dx, None)?;
                                let y = s.engine_mut().mul(dual.handle(), dual.handle())?;
                                let (_, dy) = s.unpack_dual(y, None)?;
                                Ok(s.engine().values(dy.expect("tangent"))?[0])
                            })
                        })
                        .unwrap()
                })
            })
            .collect();

        let mut tangents: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        tangents.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(tangents, vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(shared.depth().unwrap(), 0);
    }
}
