use std::sync::atomic::{AtomicU64, Ordering};

use crate::tensors::Matrix;

static NEXT_PARAM_ID: AtomicU64 = AtomicU64::new(0);

/// Stable handle optimizers key their per-parameter state on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    fn next() -> Self {
        Self(NEXT_PARAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw handle value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A learnable tensor together with its optimizer handle.
///
/// The id is issued once at construction and never changes, however the value is
/// moved around. Cloning issues a fresh id, so a copied layer never shares optimizer
/// state with the one it was copied from.
#[derive(Debug)]
pub struct Param {
    id: ParamId,
    value: Matrix,
}

impl Param {
    /// Wraps `value` under a new id.
    #[must_use]
    pub fn new(value: Matrix) -> Self {
        Self {
            id: ParamId::next(),
            value,
        }
    }

    /// Optimizer handle.
    #[must_use]
    pub fn id(&self) -> ParamId {
        self.id
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> &Matrix {
        &self.value
    }

    /// Mutable access for optimizers.
    pub fn value_mut(&mut self) -> &mut Matrix {
        &mut self.value
    }

    /// Consumes the parameter and returns its value.
    #[must_use]
    pub fn into_inner(self) -> Matrix {
        self.value
    }
}

impl Clone for Param {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}
