//! Evaluation metrics over predictions and targets laid out one sample per row.

use std::fmt;

use crate::error::{Error, Result};
use crate::tensors::Matrix;

/// Score reported by [`crate::model::Network::evaluate`] and during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Fraction of samples classified correctly.
    ///
    /// With several outputs the predicted class is the index of the largest output
    /// (first one on ties) and is compared with the target's. With a single output the
    /// prediction and the target are both rounded and compared.
    Accuracy,
    /// Sum of absolute errors divided by the number of samples.
    MeanAbsoluteError,
}

impl Metric {
    /// Scores `predictions` against `targets` (`samples × outputs` each).
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if the shapes differ.
    /// - [`Error::InvalidArgument`] if there are no samples.
    pub fn compute(self, predictions: &Matrix, targets: &Matrix) -> Result<f64> {
        if predictions.shape() != targets.shape() {
            return Err(Error::shape("metric", predictions.shape(), targets.shape()));
        }
        if predictions.is_empty() {
            return Err(Error::invalid(format!("{self} of an empty set")));
        }
        let samples = predictions.rows() as f64;

        match self {
            Self::Accuracy => {
                let correct = predictions
                    .row_slices()
                    .zip(targets.row_slices())
                    .filter(|(p, t)| {
                        if p.len() > 1 {
                            argmax(p) == argmax(t)
                        } else {
                            p[0].round() == t[0].round()
                        }
                    })
                    .count();
                Ok(correct as f64 / samples)
            }
            Self::MeanAbsoluteError => Ok(targets.sub(predictions)?.map(f64::abs)?.sum()? / samples),
        }
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value { (i, v) } else { (best, best_value) }
        })
        .0
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accuracy => "accuracy",
            Self::MeanAbsoluteError => "mae",
        })
    }
}
