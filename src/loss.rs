//! Loss functions and their gradients with respect to the predictions.
//!
//! Predictions and targets share the `outputs × batch` layout. Every function checks
//! the shapes first and fails with [`Error::ShapeMismatch`] if they differ.
//!
//! | Loss                      | Value                                          | Gradient                              |
//! |---------------------------|------------------------------------------------|---------------------------------------|
//! | `MeanSquaredError`        | `mean((t - p)²)`                               | `2(p - t) / count`                    |
//! | `BinaryCrossEntropy`      | `-Σ[t·ln(p+ε) + (1-t)·ln(1-p+ε)] / batch`      | `-t/(p+ε) + (1-t)/(1-p+ε)`            |
//! | `CategoricalCrossEntropy` | `-Σ t·ln(p+ε) / batch`                         | `-t/(p+ε)`                            |
//!
//! `ε = 1e-15`. Categorical cross-entropy expects one-hot targets and a softmax output
//! layer; its gradient is evaluated densely and relies on the softmax backward pass
//! to produce the familiar `p - t`.

use std::fmt;

use crate::error::{Error, Result};
use crate::tensors::Matrix;

/// Guards logarithms and denominators against zero.
pub const EPSILON: f64 = 1e-15;

/// Scalar training objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Loss {
    /// Mean squared error.
    MeanSquaredError,
    /// Binary cross-entropy, for sigmoid outputs.
    BinaryCrossEntropy,
    /// Categorical cross-entropy, for softmax outputs with one-hot targets.
    CategoricalCrossEntropy,
}

fn check_shapes(op: &'static str, predictions: &Matrix, targets: &Matrix) -> Result<()> {
    if predictions.shape() != targets.shape() {
        return Err(Error::shape(op, predictions.shape(), targets.shape()));
    }
    if predictions.is_empty() {
        return Err(Error::invalid("loss of an empty batch"));
    }
    Ok(())
}

impl Loss {
    /// Loss value for a batch.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if the shapes differ.
    /// - [`Error::InvalidArgument`] for an empty batch.
    pub fn compute(self, predictions: &Matrix, targets: &Matrix) -> Result<f64> {
        check_shapes("loss", predictions, targets)?;
        let samples = predictions.cols() as f64;
        match self {
            Self::MeanSquaredError => {
                let count = predictions.len() as f64;
                Ok(targets.sub(predictions)?.map(|d| d * d)?.sum()? / count)
            }
            Self::BinaryCrossEntropy => {
                let terms = zip(predictions, targets, |p, t| {
                    t * (p + EPSILON).ln() + (1.0 - t) * (1.0 - p + EPSILON).ln()
                })?;
                Ok(-terms.sum()? / samples)
            }
            Self::CategoricalCrossEntropy => {
                let terms = zip(predictions, targets, |p, t| t * (p + EPSILON).ln())?;
                Ok(-terms.sum()? / samples)
            }
        }
    }

    /// Gradient of the loss with respect to `predictions`, same shape.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if the shapes differ.
    /// - [`Error::InvalidArgument`] for an empty batch.
    pub fn gradient(self, predictions: &Matrix, targets: &Matrix) -> Result<Matrix> {
        check_shapes("loss gradient", predictions, targets)?;
        match self {
            Self::MeanSquaredError => {
                let count = predictions.len() as f64;
                predictions.sub(targets)?.scale(2.0 / count)
            }
            Self::BinaryCrossEntropy => zip(predictions, targets, |p, t| {
                -t / (p + EPSILON) + (1.0 - t) / (1.0 - p + EPSILON)
            }),
            Self::CategoricalCrossEntropy => zip(predictions, targets, |p, t| -t / (p + EPSILON)),
        }
    }
}

fn zip<F>(predictions: &Matrix, targets: &Matrix, f: F) -> Result<Matrix>
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    let p = predictions.as_slice();
    let t = targets.as_slice();
    let cols = predictions.cols();
    Matrix::from_fn(predictions.pool(), predictions.rows(), cols, |r, c| {
        let i = r * cols + c;
        f(p[i], t[i])
    })
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MeanSquaredError => "mse",
            Self::BinaryCrossEntropy => "binary cross-entropy",
            Self::CategoricalCrossEntropy => "categorical cross-entropy",
        })
    }
}
