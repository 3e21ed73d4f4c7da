//! Host reference engine.
//!
//! `HostEngine` stores dense `f64` tensors in memory. Each tensor carries an
//! ordered map from live level to the handle of its tangent at that level, so
//! nested levels keep independent tangent layers. Elementwise operations
//! propagate every layer present on either operand with the forward-mode
//! chain rule; a layer missing on one operand counts as a zero tangent.
//!
//! Tangent tensors are ordinary tensors and do not carry tangents of their
//! own.
//!
//! # Usage
//!
//! ```rust
//! use fwdad_core::engine::{ComputeEngine, HostEngine};
//! use fwdad_core::types::Level;
//!
//! let mut engine = HostEngine::new();
//! let level = Level::new(engine.allocate_level().unwrap() as u32);
//!
//! let x = engine.vector(vec![3.0]);
//! let dx = engine.vector(vec![1.0]);
//! let dual = engine.pack(x, dx, level).unwrap();
//!
//! // d(x * x)/dx = 2x
//! let y = engine.mul(dual, dual).unwrap();
//! let (primal, tangent) = engine.unpack(y, level).unwrap();
//! assert_eq!(engine.values(primal).unwrap(), &[9.0]);
//! assert_eq!(engine.values(tangent.unwrap()).unwrap(), &[6.0]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use tracing::trace;

use super::ComputeEngine;
use crate::types::{EngineError, Level};

/// Handle of a tensor owned by [`HostEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TensorId(u64);

impl TensorId {
    /// Returns the raw identifier.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct HostTensor {
    data: Vec<f64>,
    shape: Vec<usize>,
    tangents: BTreeMap<Level, TensorId>,
}

/// Dense host-memory compute engine.
#[derive(Debug, Default)]
pub struct HostEngine {
    tensors: HashMap<TensorId, HostTensor>,
    next_id: u64,
    live_levels: u32,
}

impl HostEngine {
    /// Creates an empty engine with no live levels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a tensor with the given row-major data and shape.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidData` if `data.len()` is not the product of `shape`.
    pub fn tensor(&mut self, data: Vec<f64>, shape: &[usize]) -> Result<TensorId, EngineError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(EngineError::InvalidData(format!(
                "{} values do not fill shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(self.insert(data, shape.to_vec(), BTreeMap::new()))
    }

    /// Stores a one-dimensional tensor.
    pub fn vector(&mut self, data: Vec<f64>) -> TensorId {
        let shape = vec![data.len()];
        self.insert(data, shape, BTreeMap::new())
    }

    /// Stores a zero-dimensional tensor.
    pub fn scalar(&mut self, value: f64) -> TensorId {
        self.insert(vec![value], Vec::new(), BTreeMap::new())
    }

    /// Returns the values of a tensor.
    pub fn values(&self, id: TensorId) -> Result<&[f64], EngineError> {
        Ok(&self.get(id)?.data)
    }

    /// Returns the shape of a tensor.
    pub fn shape(&self, id: TensorId) -> Result<&[usize], EngineError> {
        Ok(&self.get(id)?.shape)
    }

    /// Returns the levels at which a tensor carries a tangent, innermost last.
    pub fn tangent_levels(&self, id: TensorId) -> Result<Vec<Level>, EngineError> {
        Ok(self.get(id)?.tangents.keys().copied().collect())
    }

    /// Number of levels currently allocated on the engine side.
    pub fn live_levels(&self) -> u32 {
        self.live_levels
    }

    /// Number of stored tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Returns `true` if no tensors are stored.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Drops a tensor. Its tangent tensors are left alone.
    pub fn free(&mut self, id: TensorId) -> Result<(), EngineError> {
        self.tensors
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| EngineError::UnknownHandle(id.to_string()))
    }

    /// Elementwise `a + b`.
    pub fn add(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EngineError> {
        self.binary(a, b, |x, y| x + y, |_, _, dx, dy| dx + dy)
    }

    /// Elementwise `a - b`.
    pub fn sub(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EngineError> {
        self.binary(a, b, |x, y| x - y, |_, _, dx, dy| dx - dy)
    }

    /// Elementwise `a * b` (product rule).
    pub fn mul(&mut self, a: TensorId, b: TensorId) -> Result<TensorId, EngineError> {
        self.binary(a, b, |x, y| x * y, |x, y, dx, dy| x * dy + y * dx)
    }

    /// Multiplies every element by a constant.
    pub fn scale(&mut self, a: TensorId, factor: f64) -> Result<TensorId, EngineError> {
        self.unary(a, |x| x * factor, |_, dx| dx * factor)
    }

    /// Elementwise `exp(a)`.
    pub fn exp(&mut self, a: TensorId) -> Result<TensorId, EngineError> {
        self.unary(a, f64::exp, |x, dx| x.exp() * dx)
    }

    /// Elementwise `sin(a)`.
    pub fn sin(&mut self, a: TensorId) -> Result<TensorId, EngineError> {
        self.unary(a, f64::sin, |x, dx| x.cos() * dx)
    }

    fn get(&self, id: TensorId) -> Result<&HostTensor, EngineError> {
        self.tensors
            .get(&id)
            .ok_or_else(|| EngineError::UnknownHandle(id.to_string()))
    }

    fn insert(
        &mut self,
        data: Vec<f64>,
        shape: Vec<usize>,
        tangents: BTreeMap<Level, TensorId>,
    ) -> TensorId {
        let id = TensorId(self.next_id);
        self.next_id += 1;
        self.tensors.insert(
            id,
            HostTensor {
                data,
                shape,
                tangents,
            },
        );
        id
    }

    fn tangent_values<'a>(
        &'a self,
        tensor: &HostTensor,
        level: Level,
    ) -> Result<Option<&'a [f64]>, EngineError> {
        match tensor.tangents.get(&level) {
            Some(&id) => Ok(Some(&self.get(id)?.data)),
            None => Ok(None),
        }
    }

    fn check_level(&self, level: Level) -> Result<(), EngineError> {
        if level.index() < self.live_levels {
            Ok(())
        } else {
            Err(EngineError::UnknownLevel(level))
        }
    }

    /// Stores `data` with one tangent layer per entry of `layers`.
    fn insert_with_layers(
        &mut self,
        data: Vec<f64>,
        shape: Vec<usize>,
        layers: Vec<(Level, Vec<f64>)>,
    ) -> TensorId {
        let mut tangents = BTreeMap::new();
        for (level, tangent) in layers {
            let id = self.insert(tangent, shape.clone(), BTreeMap::new());
            tangents.insert(level, id);
        }
        self.insert(data, shape, tangents)
    }

    fn unary<P, T>(&mut self, a: TensorId, primal_op: P, tangent_op: T) -> Result<TensorId, EngineError>
    where
        P: Fn(f64) -> f64,
        T: Fn(f64, f64) -> f64,
    {
        let input = self.get(a)?;
        let data: Vec<f64> = input.data.iter().map(|&x| primal_op(x)).collect();

        let mut layers = Vec::with_capacity(input.tangents.len());
        for &level in input.tangents.keys() {
            if let Some(dx) = self.tangent_values(input, level)? {
                let tangent = input
                    .data
                    .iter()
                    .zip(dx)
                    .map(|(&x, &d)| tangent_op(x, d))
                    .collect();
                layers.push((level, tangent));
            }
        }
        let shape = input.shape.clone();

        Ok(self.insert_with_layers(data, shape, layers))
    }

    fn binary<P, T>(
        &mut self,
        a: TensorId,
        b: TensorId,
        primal_op: P,
        tangent_op: T,
    ) -> Result<TensorId, EngineError>
    where
        P: Fn(f64, f64) -> f64,
        T: Fn(f64, f64, f64, f64) -> f64,
    {
        let lhs = self.get(a)?;
        let rhs = self.get(b)?;
        if lhs.shape != rhs.shape {
            return Err(EngineError::ShapeMismatch {
                left: lhs.shape.clone(),
                right: rhs.shape.clone(),
            });
        }

        let data: Vec<f64> = lhs
            .data
            .iter()
            .zip(&rhs.data)
            .map(|(&x, &y)| primal_op(x, y))
            .collect();

        let levels: BTreeSet<Level> = lhs
            .tangents
            .keys()
            .chain(rhs.tangents.keys())
            .copied()
            .collect();

        let mut layers = Vec::with_capacity(levels.len());
        for level in levels {
            let dx = self.tangent_values(lhs, level)?;
            let dy = self.tangent_values(rhs, level)?;
            let tangent = (0..data.len())
                .map(|i| {
                    tangent_op(
                        lhs.data[i],
                        rhs.data[i],
                        dx.map_or(0.0, |d| d[i]),
                        dy.map_or(0.0, |d| d[i]),
                    )
                })
                .collect();
            layers.push((level, tangent));
        }
        let shape = lhs.shape.clone();

        Ok(self.insert_with_layers(data, shape, layers))
    }
}

impl ComputeEngine for HostEngine {
    type Handle = TensorId;

    fn allocate_level(&mut self) -> Result<i64, EngineError> {
        let level = self.live_levels;
        self.live_levels += 1;
        trace!(level, "host engine allocated level");
        Ok(i64::from(level))
    }

    fn release_level(&mut self, level: Level) -> Result<(), EngineError> {
        self.check_level(level)?;
        if level.index() + 1 != self.live_levels {
            return Err(EngineError::Internal(format!(
                "level {} released while level {} is live",
                level,
                self.live_levels - 1
            )));
        }
        self.live_levels -= 1;

        let mut stripped = 0usize;
        for tensor in self.tensors.values_mut() {
            if tensor.tangents.remove(&level).is_some() {
                stripped += 1;
            }
        }
        trace!(level = level.index(), stripped, "host engine released level");
        Ok(())
    }

    fn pack(
        &mut self,
        primal: TensorId,
        tangent: TensorId,
        level: Level,
    ) -> Result<TensorId, EngineError> {
        self.check_level(level)?;
        let p = self.get(primal)?;
        let t = self.get(tangent)?;
        if p.shape != t.shape {
            return Err(EngineError::ShapeMismatch {
                left: p.shape.clone(),
                right: t.shape.clone(),
            });
        }

        let mut tangents = p.tangents.clone();
        tangents.insert(level, tangent);
        let data = p.data.clone();
        let shape = p.shape.clone();
        Ok(self.insert(data, shape, tangents))
    }

    fn unpack(
        &mut self,
        handle: TensorId,
        level: Level,
    ) -> Result<(TensorId, Option<TensorId>), EngineError> {
        let tensor = self.get(handle)?;
        let Some(tangent) = tensor.tangents.get(&level).copied() else {
            return Ok((handle, None));
        };

        let mut tangents = tensor.tangents.clone();
        tangents.remove(&level);
        let data = tensor.data.clone();
        let shape = tensor.shape.clone();
        let primal = self.insert(data, shape, tangents);
        Ok((primal, Some(tangent)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn level(engine: &mut HostEngine) -> Level {
        Level::new(engine.allocate_level().unwrap() as u32)
    }

    #[test]
    fn test_tensor_rejects_bad_shape() {
        let mut engine = HostEngine::new();
        let err = engine.tensor(vec![1.0, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidData(_)));

        let ok = engine.tensor(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        assert_eq!(engine.shape(ok).unwrap(), &[2, 2]);
    }

    #[test]
    fn test_scalar_has_empty_shape() {
        let mut engine = HostEngine::new();
        let s = engine.scalar(2.5);
        assert!(engine.shape(s).unwrap().is_empty());
        assert_eq!(engine.values(s).unwrap(), &[2.5]);
    }

    #[test]
    fn test_levels_allocate_sequentially() {
        let mut engine = HostEngine::new();
        assert_eq!(engine.allocate_level().unwrap(), 0);
        assert_eq!(engine.allocate_level().unwrap(), 1);
        assert_eq!(engine.live_levels(), 2);
    }

    #[test]
    fn test_release_out_of_order_is_rejected() {
        let mut engine = HostEngine::new();
        let outer = level(&mut engine);
        let _inner = level(&mut engine);
        assert!(matches!(
            engine.release_level(outer),
            Err(EngineError::Internal(_))
        ));
        assert!(matches!(
            engine.release_level(Level::new(5)),
            Err(EngineError::UnknownLevel(_))
        ));
    }

    #[test]
    fn test_pack_requires_live_level_and_matching_shape() {
        let mut engine = HostEngine::new();
        let x = engine.vector(vec![1.0, 2.0]);
        let dx = engine.vector(vec![1.0, 1.0]);
        assert!(matches!(
            engine.pack(x, dx, Level::ROOT),
            Err(EngineError::UnknownLevel(_))
        ));

        let l0 = level(&mut engine);
        let short = engine.vector(vec![1.0]);
        assert!(matches!(
            engine.pack(x, short, l0),
            Err(EngineError::ShapeMismatch { .. })
        ));
        assert!(engine.pack(x, dx, l0).is_ok());
    }

    #[test]
    fn test_unpack_plain_tensor_returns_same_handle() {
        let mut engine = HostEngine::new();
        let l0 = level(&mut engine);
        let x = engine.vector(vec![1.0]);
        assert_eq!(engine.unpack(x, l0).unwrap(), (x, None));
    }

    #[test]
    fn test_product_rule() {
        let mut engine = HostEngine::new();
        let l0 = level(&mut engine);
        let x = engine.vector(vec![2.0, -1.0]);
        let dx = engine.vector(vec![1.0, 1.0]);
        let c = engine.vector(vec![3.0, 4.0]);
        let dual = engine.pack(x, dx, l0).unwrap();

        // d(c * x) = c * dx since c is constant
        let y = engine.mul(c, dual).unwrap();
        let (_, tangent) = engine.unpack(y, l0).unwrap();
        assert_eq!(engine.values(tangent.unwrap()).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_unary_chain_rule() {
        let mut engine = HostEngine::new();
        let l0 = level(&mut engine);
        let x = engine.scalar(0.5);
        let dx = engine.scalar(2.0);
        let dual = engine.pack(x, dx, l0).unwrap();

        let e = engine.exp(dual).unwrap();
        let s = engine.sin(dual).unwrap();
        let k = engine.scale(dual, -3.0).unwrap();

        let (_, de) = engine.unpack(e, l0).unwrap();
        let (_, ds) = engine.unpack(s, l0).unwrap();
        let (_, dk) = engine.unpack(k, l0).unwrap();
        assert_relative_eq!(engine.values(de.unwrap()).unwrap()[0], 0.5_f64.exp() * 2.0, epsilon = 1e-12);
        assert_relative_eq!(engine.values(ds.unwrap()).unwrap()[0], 0.5_f64.cos() * 2.0, epsilon = 1e-12);
        assert_relative_eq!(engine.values(dk.unwrap()).unwrap()[0], -6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nested_levels_keep_separate_layers() {
        let mut engine = HostEngine::new();
        let l0 = level(&mut engine);
        let l1 = level(&mut engine);

        let x = engine.scalar(3.0);
        let dx0 = engine.scalar(1.0);
        let dx1 = engine.scalar(10.0);
        let d0 = engine.pack(x, dx0, l0).unwrap();
        let d01 = engine.pack(d0, dx1, l1).unwrap();
        assert_eq!(engine.tangent_levels(d01).unwrap(), vec![l0, l1]);

        let y = engine.add(d01, d01).unwrap();
        let (_, t0) = engine.unpack(y, l0).unwrap();
        let (_, t1) = engine.unpack(y, l1).unwrap();
        assert_eq!(engine.values(t0.unwrap()).unwrap(), &[2.0]);
        assert_eq!(engine.values(t1.unwrap()).unwrap(), &[20.0]);
    }

    #[test]
    fn test_release_strips_tangent_layer() {
        let mut engine = HostEngine::new();
        let l0 = level(&mut engine);
        let x = engine.scalar(1.0);
        let dx = engine.scalar(1.0);
        let dual = engine.pack(x, dx, l0).unwrap();

        engine.release_level(l0).unwrap();
        assert!(engine.tangent_levels(dual).unwrap().is_empty());
        assert_eq!(engine.live_levels(), 0);
    }

    #[test]
    fn test_binary_shape_mismatch() {
        let mut engine = HostEngine::new();
        let a = engine.vector(vec![1.0, 2.0]);
        let b = engine.vector(vec![1.0]);
        assert!(matches!(
            engine.sub(a, b),
            Err(EngineError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_free_unknown_handle() {
        let mut engine = HostEngine::new();
        let a = engine.scalar(1.0);
        engine.free(a).unwrap();
        assert!(matches!(engine.free(a), Err(EngineError::UnknownHandle(_))));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_tensor_ids_are_sequential() {
        let mut engine = HostEngine::new();
        let a = engine.scalar(1.0);
        let b = engine.vector(vec![1.0, 2.0]);
        assert_eq!((a.raw(), b.raw()), (0, 1));
        assert_eq!(b.to_string(), "t1");
        assert_eq!(
            engine.values(TensorId(7)).unwrap_err(),
            EngineError::UnknownHandle("t7".to_string())
        );
    }
}
