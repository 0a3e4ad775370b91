//! Learnable layers and the gradient protocol they share.
//!
//! # Training Cycle
//!
//! Per layer and per batch:
//! 1. [`Layer::reset_gradients`] zeroes the accumulators
//! 2. one or more [`Layer::forward`] / [`Layer::backward`] pairs; backward *adds* into
//!    the accumulators, it never overwrites them
//! 3. exactly one [`Layer::apply_gradients`], which divides the accumulated gradients
//!    by the batch size and hands them to an [`Optimizer`]
//!
//! Forward returns a [`LayerContext`] value that backward consumes, so a backward call
//! always sees the state of its own forward call. Passing the context of a different
//! layer kind is reported as [`Error::InvalidState`].
//!
//! ## Variants
//!
//! | Kind        | Tag | Parameters                     |
//! |-------------|-----|--------------------------------|
//! | `Dense`     | 0   | weights, biases                |
//! | `BatchNorm` | 1   | gamma, beta (+ running stats)  |
//!
//! ## Example
//!
//! ```rust
//! use feedforward::activations::Activation;
//! use feedforward::init::Initializer;
//! use feedforward::layers::{Dense, Layer};
//! use feedforward::optim::Sgd;
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let mut layer = Layer::from(
//!     Dense::with_seed(&pool, 3, 1, Initializer::XavierNormal, Activation::Sigmoid, 42).unwrap(),
//! );
//!
//! let x = Matrix::column(&pool, &[1.0, 2.0, 3.0]).unwrap();
//! layer.reset_gradients().unwrap();
//! let (_, ctx) = layer.forward(&x).unwrap();
//! let dx = layer.backward(&ctx, &Matrix::column(&pool, &[0.5]).unwrap()).unwrap();
//! assert_eq!((dx.rows(), dx.cols()), (3, 1));
//! layer.apply_gradients(&mut Sgd::default(), 1).unwrap();
//! ```

mod batchnorm;
mod dense;
mod param;

pub use batchnorm::{BatchNorm, BatchNormConfig, BatchNormContext};
pub use dense::{Dense, DenseContext};
pub use param::{Param, ParamId};

use std::fmt;

use crate::error::{Error, Result};
use crate::optim::Optimizer;
use crate::tensors::Matrix;

/// Layer kind; the discriminant is the persisted tag.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Fully-connected.
    Dense = 0,
    /// Batch normalization.
    BatchNorm = 1,
}

impl LayerKind {
    /// Stable persisted tag.
    #[must_use]
    pub const fn tag(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for LayerKind {
    type Error = Error;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(Self::Dense),
            1 => Ok(Self::BatchNorm),
            other => Err(Error::invalid(format!("unknown layer tag {other}"))),
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::BatchNorm => "batch norm",
        })
    }
}

/// One node of a layer stack.
#[derive(Debug, Clone)]
pub enum Layer {
    /// Fully-connected layer.
    Dense(Dense),
    /// Batch normalization layer.
    BatchNorm(BatchNorm),
}

/// Forward state of a [`Layer`], consumed by [`Layer::backward`].
#[derive(Debug, Clone)]
pub enum LayerContext {
    /// Produced by a dense layer.
    Dense(DenseContext),
    /// Produced by a batch normalization layer.
    BatchNorm(BatchNormContext),
}

impl LayerContext {
    fn kind(&self) -> LayerKind {
        match self {
            Self::Dense(_) => LayerKind::Dense,
            Self::BatchNorm(_) => LayerKind::BatchNorm,
        }
    }
}

impl From<Dense> for Layer {
    fn from(layer: Dense) -> Self {
        Self::Dense(layer)
    }
}

impl From<BatchNorm> for Layer {
    fn from(layer: BatchNorm) -> Self {
        Self::BatchNorm(layer)
    }
}

impl Layer {
    /// Kind tag.
    #[must_use]
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Dense(_) => LayerKind::Dense,
            Self::BatchNorm(_) => LayerKind::BatchNorm,
        }
    }

    /// Number of rows the layer expects in its input.
    #[must_use]
    pub fn input_size(&self) -> usize {
        match self {
            Self::Dense(layer) => layer.inputs(),
            Self::BatchNorm(layer) => layer.features(),
        }
    }

    /// Number of rows the layer produces.
    #[must_use]
    pub fn output_size(&self) -> usize {
        match self {
            Self::Dense(layer) => layer.outputs(),
            Self::BatchNorm(layer) => layer.features(),
        }
    }

    /// Runs the layer on a `input_size × batch` matrix.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the input has the wrong number of rows.
    pub fn forward(&mut self, input: &Matrix) -> Result<(Matrix, LayerContext)> {
        match self {
            Self::Dense(layer) => {
                let (out, ctx) = layer.forward(input)?;
                Ok((out, LayerContext::Dense(ctx)))
            }
            Self::BatchNorm(layer) => {
                let (out, ctx) = layer.forward(input)?;
                Ok((out, LayerContext::BatchNorm(ctx)))
            }
        }
    }

    /// Accumulates parameter gradients and returns `dL/d(input)`.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if `context` was produced by another layer kind.
    /// - [`Error::ShapeMismatch`] if `grad` does not match the forward output.
    pub fn backward(&mut self, context: &LayerContext, grad: &Matrix) -> Result<Matrix> {
        match (self, context) {
            (Self::Dense(layer), LayerContext::Dense(ctx)) => layer.backward(ctx, grad),
            (Self::BatchNorm(layer), LayerContext::BatchNorm(ctx)) => layer.backward(ctx, grad),
            (layer, ctx) => Err(Error::InvalidState(format!(
                "{} backward received a {} forward context",
                layer.kind(),
                ctx.kind()
            ))),
        }
    }

    /// Zeroes the gradient accumulators.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn reset_gradients(&mut self) -> Result<()> {
        match self {
            Self::Dense(layer) => layer.reset_gradients(),
            Self::BatchNorm(layer) => layer.reset_gradients(),
        }
    }

    /// Divides the accumulated gradients by `batch_size` and lets `optimizer` update
    /// the parameters.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `batch_size` is zero; optimizer errors are forwarded.
    pub fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer, batch_size: usize) -> Result<()> {
        match self {
            Self::Dense(layer) => layer.apply_gradients(optimizer, batch_size),
            Self::BatchNorm(layer) => layer.apply_gradients(optimizer, batch_size),
        }
    }

    /// Whether the layer uses batch statistics; always `true` for dense layers.
    #[must_use]
    pub fn is_training(&self) -> bool {
        match self {
            Self::Dense(_) => true,
            Self::BatchNorm(layer) => layer.is_training(),
        }
    }

    /// Toggles training mode on layers that have one; a no-op for dense layers.
    pub fn set_training(&mut self, training: bool) {
        if let Self::BatchNorm(layer) = self {
            layer.set_training(training);
        }
    }
}

fn check_batch_size(batch_size: usize) -> Result<f64> {
    if batch_size == 0 {
        return Err(Error::invalid("batch size must be positive"));
    }
    Ok(batch_size as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;

    #[test]
    fn context_from_another_kind_is_rejected() {
        let pool = ThreadPool::new(1).unwrap();
        let w = Matrix::filled(&pool, 2, 2, 1.0).unwrap();
        let b = Matrix::zeros(&pool, 2, 1).unwrap();
        let mut dense = Layer::from(Dense::from_parameters(w, b, crate::activations::Activation::Identity).unwrap());
        let mut norm = Layer::from(BatchNorm::new(&pool, 2, BatchNormConfig::default()).unwrap());

        let x = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 5.0]]).unwrap();
        let (_, norm_ctx) = norm.forward(&x).unwrap();
        let result = dense.backward(&norm_ctx, &x);
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn cloned_parameters_get_fresh_ids() {
        let pool = ThreadPool::new(1).unwrap();
        let p = Param::new(Matrix::zeros(&pool, 1, 1).unwrap());
        let q = p.clone();
        assert_ne!(p.id(), q.id());
        assert_eq!(p.value(), q.value());
    }

    #[test]
    fn layer_tags_are_stable() {
        assert_eq!(LayerKind::try_from(0).unwrap(), LayerKind::Dense);
        assert_eq!(LayerKind::try_from(1).unwrap(), LayerKind::BatchNorm);
        assert!(LayerKind::try_from(2).is_err());
    }
}
