//! Optimizers
//!
//! An [`Optimizer`] receives one layer's parameters and their batch-averaged
//! gradients and updates the parameters in place. A single instance serves every
//! layer of a network: per-parameter state (velocity, moment estimates) is kept in a
//! table keyed by [`ParamId`], created lazily the first time a parameter is seen and
//! reused on every later call.
//!
//! | Optimizer   | Rule                                                        |
//! |-------------|-------------------------------------------------------------|
//! | [`Sgd`]     | `v = μ·v + η·g`, `θ -= v`                                   |
//! | [`RmsProp`] | `s = γ·s + (1-γ)·g²`, `θ -= η·g / (√s + ε)`                 |
//! | [`Adam`]    | bias-corrected first/second moments, `θ -= η·m̂ / (√v̂ + ε)` |
//!
//! Gradients are validated against their parameters, and existing state against the
//! parameter shapes, before anything is written.

mod adam;
mod rmsprop;
mod sgd;

pub use adam::{Adam, AdamConfig};
pub use rmsprop::{RmsProp, RmsPropConfig};
pub use sgd::{Sgd, SgdConfig};

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::{Error, Result};
use crate::layers::{Param, ParamId};
use crate::tensors::Matrix;

/// Update rule applied to a layer's parameters after each batch.
pub trait Optimizer: Send {
    /// Step size.
    fn learning_rate(&self) -> f64;

    /// Updates `weights` and `biases` in place from their batch-averaged gradients.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if a gradient does not match its parameter.
    /// - [`Error::InvalidState`] if stored state for a parameter has a different shape.
    fn update(
        &mut self,
        weights: &mut Param,
        biases: &mut Param,
        grad_weights: &Matrix,
        grad_biases: &Matrix,
    ) -> Result<()>;
}

/// Lazily created per-parameter buffers.
#[derive(Debug, Clone, Default)]
pub(crate) struct StateTable {
    slots: HashMap<ParamId, Matrix>,
}

impl StateTable {
    /// Fails if a slot already exists for `param` with a different shape.
    pub(crate) fn check(&self, param: &Param) -> Result<()> {
        match self.slots.get(&param.id()) {
            Some(slot) if slot.shape() != param.value().shape() => Err(Error::InvalidState(format!(
                "optimizer state for parameter {} is {}, parameter is now {}",
                param.id().get(),
                slot.shape(),
                param.value().shape()
            ))),
            _ => Ok(()),
        }
    }

    /// The buffer for `param`, zero-filled on first use.
    pub(crate) fn slot(&mut self, param: &Param) -> Result<&mut Matrix> {
        match self.slots.entry(param.id()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(param.value().map(|_| 0.0)?)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

pub(crate) fn check_gradient(param: &Param, grad: &Matrix) -> Result<()> {
    if param.value().shape() != grad.shape() {
        return Err(Error::shape("optimizer update", param.value().shape(), grad.shape()));
    }
    Ok(())
}

pub(crate) fn check_learning_rate(learning_rate: f64) -> Result<()> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(Error::invalid(format!(
            "learning rate must be positive and finite, got {learning_rate}"
        )));
    }
    Ok(())
}

pub(crate) fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..1.0).contains(&value) {
        return Err(Error::invalid(format!("{name} must lie in [0, 1), got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;

    #[test]
    fn state_is_created_once_per_parameter() {
        let pool = ThreadPool::new(1).unwrap();
        let p = Param::new(Matrix::filled(&pool, 2, 2, 3.0).unwrap());
        let mut table = StateTable::default();

        table.slot(&p).unwrap().add_scalar_assign(1.0).unwrap();
        assert_eq!(table.slot(&p).unwrap().as_slice(), &[1.0; 4]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn gradient_shape_is_checked() {
        let pool = ThreadPool::new(1).unwrap();
        let p = Param::new(Matrix::zeros(&pool, 2, 2).unwrap());
        let g = Matrix::zeros(&pool, 2, 1).unwrap();
        assert!(matches!(check_gradient(&p, &g), Err(Error::ShapeMismatch { .. })));
    }
}
