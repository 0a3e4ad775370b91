//! Activation functions and their hand-derived gradients.
//!
//! # Forward Contexts
//!
//! Every activation follows the same pattern:
//! 1. [`Activation::forward`] computes the output and returns an [`ActivationContext`]
//!    holding exactly what the gradient needs (the input for ReLU, the output for
//!    Sigmoid and Softmax).
//! 2. [`Activation::backward`] takes that context and the upstream gradient and returns
//!    `dL/d(input)`.
//!
//! The context is a value, so one forward pass can only ever be paired with its own
//! backward pass. Handing a context produced by a different activation is reported as
//! [`Error::InvalidState`].
//!
//! ## Layout
//!
//! Inputs are `features × batch`. Softmax normalizes each column (one sample).
//!
//! ## Example
//!
//! ```rust
//! use feedforward::activations::Activation;
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let x = Matrix::column(&pool, &[-1.0, 0.0, 2.0]).unwrap();
//! let (y, ctx) = Activation::Relu.forward(&x).unwrap();
//! assert_eq!(y.as_slice(), &[0.0, 0.0, 2.0]);
//!
//! let upstream = Matrix::filled(&pool, 3, 1, 1.0).unwrap();
//! let dx = Activation::Relu.backward(&ctx, &upstream).unwrap();
//! assert_eq!(dx.as_slice(), &[0.0, 0.0, 1.0]);
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::tensors::Matrix;

/// Sigmoid inputs are clamped to this magnitude before `exp`.
const SIGMOID_CLIP: f64 = 700.0;

/// Closed set of activations; the discriminant is the persisted tag.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activation {
    /// `max(0, x)`
    Relu = 0,
    /// `1 / (1 + e^-x)`
    Sigmoid = 1,
    /// Column-wise `e^x / Σe^x`
    Softmax = 2,
    /// Passes the input through unchanged.
    #[default]
    Identity = 3,
}

/// State captured by [`Activation::forward`] for the matching backward call.
#[derive(Debug, Clone)]
pub enum ActivationContext {
    /// ReLU keeps the forward input; the gradient mask is its sign.
    Relu {
        /// Forward input.
        input: Matrix,
    },
    /// Sigmoid keeps its output `s`; the local derivative is `s·(1-s)`.
    Sigmoid {
        /// Forward output.
        output: Matrix,
    },
    /// Softmax keeps its output for the Jacobian-vector product.
    Softmax {
        /// Forward output.
        output: Matrix,
    },
    /// Nothing to keep.
    Identity,
}

impl ActivationContext {
    fn kind(&self) -> Activation {
        match self {
            Self::Relu { .. } => Activation::Relu,
            Self::Sigmoid { .. } => Activation::Sigmoid,
            Self::Softmax { .. } => Activation::Softmax,
            Self::Identity => Activation::Identity,
        }
    }
}

impl Activation {
    /// Stable persisted tag.
    #[must_use]
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Applies the activation to `input`.
    ///
    /// # Returns
    /// - the activated matrix, same shape as `input`
    /// - the context [`Activation::backward`] needs
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn forward(self, input: &Matrix) -> Result<(Matrix, ActivationContext)> {
        match self {
            Self::Relu => {
                let output = input.map(|x| x.max(0.0))?;
                Ok((
                    output,
                    ActivationContext::Relu {
                        input: input.clone(),
                    },
                ))
            }
            Self::Sigmoid => {
                let output = input.map(|x| 1.0 / (1.0 + (-x.clamp(-SIGMOID_CLIP, SIGMOID_CLIP)).exp()))?;
                Ok((
                    output.clone(),
                    ActivationContext::Sigmoid { output },
                ))
            }
            Self::Softmax => {
                let output = softmax(input)?;
                Ok((
                    output.clone(),
                    ActivationContext::Softmax { output },
                ))
            }
            Self::Identity => Ok((input.clone(), ActivationContext::Identity)),
        }
    }

    /// Maps `dL/d(output)` to `dL/d(input)`.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if `context` was produced by another activation.
    /// - [`Error::ShapeMismatch`] if `grad` does not match the forward shape.
    pub fn backward(self, context: &ActivationContext, grad: &Matrix) -> Result<Matrix> {
        match (self, context) {
            (Self::Relu, ActivationContext::Relu { input }) => {
                let mask = input.map(|x| if x > 0.0 { 1.0 } else { 0.0 })?;
                grad.cwise_product(&mask)
            }
            (Self::Sigmoid, ActivationContext::Sigmoid { output }) => {
                let local = output.map(|s| s * (1.0 - s))?;
                grad.cwise_product(&local)
            }
            (Self::Softmax, ActivationContext::Softmax { output }) => {
                // J·g per column: y ⊙ (g - Σ(y ⊙ g))
                let weighted = output.cwise_product(grad)?;
                let dots = weighted.col_wise().sum()?;
                let centered = grad.row_wise().sub(&dots)?;
                output.cwise_product(&centered)
            }
            (Self::Identity, ActivationContext::Identity) => Ok(grad.clone()),
            (expected, other) => Err(Error::InvalidState(format!(
                "{expected} backward received a {} forward context",
                other.kind()
            ))),
        }
    }
}

/// Numerically stable softmax over each column.
fn softmax(input: &Matrix) -> Result<Matrix> {
    let max = input.col_wise().max_coeff()?;
    let exp = input.row_wise().sub(&max)?.map(f64::exp)?;
    let sums = exp.col_wise().sum()?;
    exp.row_wise().div(&sums)
}

impl TryFrom<i32> for Activation {
    type Error = Error;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(Self::Relu),
            1 => Ok(Self::Sigmoid),
            2 => Ok(Self::Softmax),
            3 => Ok(Self::Identity),
            other => Err(Error::invalid(format!("unknown activation tag {other}"))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
            Self::Identity => "identity",
        })
    }
}
