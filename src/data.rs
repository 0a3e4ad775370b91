//! Dataset helpers.
//!
//! A dataset matrix holds one sample per row (the way samples arrive from a file); a
//! batch matrix holds one sample per column (the way layers consume them). These
//! helpers select and reorder dataset rows and convert between the two layouts.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::pool::ThreadPool;
use crate::tensors::Matrix;

/// Rows `start..end` of `data` as a new matrix.
///
/// # Errors
/// [`Error::InvalidArgument`] unless `start < end <= data.rows()`.
pub fn slice_rows(data: &Matrix, start: usize, end: usize) -> Result<Matrix> {
    if start >= end || end > data.rows() {
        return Err(Error::invalid(format!(
            "row range {start}..{end} is empty or outside 0..{}",
            data.rows()
        )));
    }
    let cols = data.cols();
    let values = data.as_slice()[start * cols..end * cols].to_vec();
    Matrix::from_vec(data.pool(), end - start, cols, values)
}

/// Picks rows of `data` in the given order; row `i` of the result is `data[order[i]]`.
///
/// # Errors
/// [`Error::InvalidArgument`] if `order` is empty or names a row that does not exist.
pub fn reorder_rows(data: &Matrix, order: &[usize]) -> Result<Matrix> {
    if let Some(&bad) = order.iter().find(|&&i| i >= data.rows()) {
        return Err(Error::invalid(format!(
            "row index {bad} is outside 0..{}",
            data.rows()
        )));
    }
    let cols = data.cols();
    let src = data.as_slice();
    Matrix::from_fn(data.pool(), order.len(), cols, |r, c| src[order[r] * cols + c])
}

/// A uniformly shuffled permutation of `0..len`.
pub(crate) fn permutation<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

/// Shuffles two datasets with the same permutation so sample pairs stay aligned.
///
/// # Errors
/// [`Error::InvalidArgument`] if the row counts differ or the datasets are empty.
pub fn shuffle_pairs<R: Rng + ?Sized>(x: &Matrix, y: &Matrix, rng: &mut R) -> Result<(Matrix, Matrix)> {
    if x.rows() != y.rows() {
        return Err(Error::invalid(format!(
            "{} input samples but {} target samples",
            x.rows(),
            y.rows()
        )));
    }
    let order = permutation(x.rows(), rng);
    Ok((reorder_rows(x, &order)?, reorder_rows(y, &order)?))
}

/// One-hot encodes class labels into a `labels.len() × classes` dataset.
///
/// # Errors
/// [`Error::InvalidArgument`] if a label is not below `classes`, or nothing to encode.
pub fn one_hot(pool: &ThreadPool, labels: &[usize], classes: usize) -> Result<Matrix> {
    if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
        return Err(Error::invalid(format!("label {bad} is not below {classes} classes")));
    }
    Matrix::from_fn(pool, labels.len(), classes, |r, c| if labels[r] == c { 1.0 } else { 0.0 })
}

/// Dataset (`samples × features`) to batch (`features × samples`).
///
/// # Errors
/// Pool errors are forwarded.
pub fn rows_to_batch(data: &Matrix) -> Result<Matrix> {
    data.transpose()
}

/// Batch (`features × samples`) to dataset (`samples × features`).
///
/// # Errors
/// Pool errors are forwarded.
pub fn batch_to_rows(batch: &Matrix) -> Result<Matrix> {
    batch.transpose()
}
