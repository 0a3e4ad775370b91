//! Core tensor data structures and operations.
//!
//! # Dense Matrix Engine
//!
//! This module defines [`Matrix`], the fixed rank-2 tensor every other part of the
//! crate computes with: a row-major `rows × cols` buffer of `f64`.
//!
//! It supports:
//! - Construction from a fill value, a parallel index function, a sequential generator,
//!   explicit data, or a nested row list
//! - Element-wise arithmetic against another matrix or a scalar, in both allocating and
//!   in-place forms
//! - Matrix product, transpose, Hadamard product, `map`, `sum`, `max_coeff`
//! - Broadcasting views through [`Matrix::row_wise`] and [`Matrix::col_wise`]
//!   (see [`crate::broadcast`])
//! - A fixed-width binary form (see [`crate::modelio`])
//!
//! ## Design Highlights
//! - Every operation is dispatched to the [`ThreadPool`] the matrix was created with
//! - `data.len() == rows * cols` always holds; a default-constructed matrix is `0 × 0`
//! - Shape and divisor checks run before any work is scheduled, so a failed
//!   operation never leaves a half-written result behind
//! - Only the `*_assign` forms mutate the receiver; everything else allocates
//!
//! ## Example
//!
//! ```rust
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let a = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
//! let b = a.transpose().unwrap();
//! let c = a.matmul(&b).unwrap();
//! assert_eq!(c.as_slice(), &[5.0, 11.0, 11.0, 25.0]);
//! ```

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{Error, Result};
use crate::ops::cpu;
use crate::pool::ThreadPool;

/// Dimensions of a [`Matrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl Shape {
    /// Creates a shape.
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of elements.
    #[must_use]
    pub const fn len(self) -> usize {
        self.rows * self.cols
    }

    /// Whether the shape holds no elements.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl From<(usize, usize)> for Shape {
    fn from((rows, cols): (usize, usize)) -> Self {
        Self { rows, cols }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Row-major dense matrix of `f64` bound to a worker pool.
///
/// - `shape` is fixed after construction except through [`Matrix::take`] and
///   [`Matrix::matmul_assign`].
/// - Cloning duplicates the buffer and shares the pool.
#[derive(Clone)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    pool: ThreadPool,
}

fn check_dims(rows: usize, cols: usize) -> Result<()> {
    if rows == 0 || cols == 0 {
        return Err(Error::invalid(format!(
            "matrix dimensions must be positive, got {rows}x{cols}"
        )));
    }
    Ok(())
}

impl Matrix {
    /// Creates a `0 × 0` matrix.
    #[must_use]
    pub fn empty(pool: &ThreadPool) -> Self {
        Self {
            rows: 0,
            cols: 0,
            data: Vec::new(),
            pool: pool.clone(),
        }
    }

    /// Creates a `rows × cols` matrix with every element set to `value`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if either dimension is zero.
    pub fn filled(pool: &ThreadPool, rows: usize, cols: usize, value: f64) -> Result<Self> {
        check_dims(rows, cols)?;
        Ok(Self {
            rows,
            cols,
            data: vec![value; rows * cols],
            pool: pool.clone(),
        })
    }

    /// Creates a `rows × cols` matrix of zeros.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if either dimension is zero.
    pub fn zeros(pool: &ThreadPool, rows: usize, cols: usize) -> Result<Self> {
        Self::filled(pool, rows, cols, 0.0)
    }

    /// Wraps row-major `data` as a `rows × cols` matrix.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if a dimension is zero or `data.len() != rows * cols`.
    pub fn from_vec(pool: &ThreadPool, rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        check_dims(rows, cols)?;
        if data.len() != rows * cols {
            return Err(Error::invalid(format!(
                "{} data elements do not fit a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data,
            pool: pool.clone(),
        })
    }

    /// Builds a matrix by evaluating `f(row, col)` for every cell on the pool.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for zero dimensions; pool errors are forwarded.
    pub fn from_fn<F>(pool: &ThreadPool, rows: usize, cols: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        check_dims(rows, cols)?;
        let mut data = vec![0.0; rows * cols];
        pool.parallel_chunks_mut(&mut data, cols, |r, row| {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = f(r, c);
            }
        })?;
        Ok(Self {
            rows,
            cols,
            data,
            pool: pool.clone(),
        })
    }

    /// Builds a matrix from a stateful generator, called once per cell in row-major
    /// order on the calling thread.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if either dimension is zero.
    pub fn from_generator<F>(pool: &ThreadPool, rows: usize, cols: usize, mut generator: F) -> Result<Self>
    where
        F: FnMut() -> f64,
    {
        check_dims(rows, cols)?;
        let data = (0..rows * cols).map(|_| generator()).collect();
        Ok(Self {
            rows,
            cols,
            data,
            pool: pool.clone(),
        })
    }

    /// Builds a matrix from a nested row list.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if there are no rows, the rows are empty, or the
    /// rows have different lengths.
    pub fn from_rows<R: AsRef<[f64]>>(pool: &ThreadPool, rows: &[R]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(Error::invalid("cannot build a matrix from zero rows"));
        };
        let cols = first.as_ref().len();
        check_dims(rows.len(), cols)?;

        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(Error::invalid(format!(
                    "ragged row list: row {i} has {} values, row 0 has {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(pool, rows.len(), cols, data)
    }

    /// Builds an `n × 1` column vector.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `values` is empty.
    pub fn column(pool: &ThreadPool, values: &[f64]) -> Result<Self> {
        Self::from_vec(pool, values.len(), 1, values.to_vec())
    }

    /// Builds a `1 × n` row vector.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `values` is empty.
    pub fn row(pool: &ThreadPool, values: &[f64]) -> Result<Self> {
        Self::from_vec(pool, 1, values.len(), values.to_vec())
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Dimensions as a [`Shape`].
    #[must_use]
    pub fn shape(&self) -> Shape {
        Shape::new(self.rows, self.cols)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the matrix is `0 × 0`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major view of the elements.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Consumes the matrix and returns its row-major buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// The pool this matrix dispatches its operations to.
    #[must_use]
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Checked element access.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    /// Iterates the rows as slices.
    pub fn row_slices(&self) -> impl Iterator<Item = &[f64]> {
        // `chunks(0)` panics; an empty matrix simply has no rows
        self.data.chunks(self.cols.max(1))
    }

    /// Copies the rows out as a nested list.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.row_slices().map(<[f64]>::to_vec).collect()
    }

    /// Moves the buffer out, leaving `self` as a `0 × 0` matrix on the same pool.
    pub fn take(&mut self) -> Self {
        let rows = std::mem::take(&mut self.rows);
        let cols = std::mem::take(&mut self.cols);
        Self {
            rows,
            cols,
            data: std::mem::take(&mut self.data),
            pool: self.pool.clone(),
        }
    }

    fn with_data(&self, rows: usize, cols: usize, data: Vec<f64>) -> Self {
        Self {
            rows,
            cols,
            data,
            pool: self.pool.clone(),
        }
    }

    fn ensure_same_shape(&self, other: &Self, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::shape(op, self.shape(), other.shape()));
        }
        Ok(())
    }

    fn ensure_no_zero(values: &[f64], op: &'static str) -> Result<()> {
        if values.iter().any(|&v| v == 0.0) {
            return Err(Error::DivisionByZero { op });
        }
        Ok(())
    }

    fn zip_with<F>(&self, other: &Self, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let mut out = vec![0.0; self.data.len()];
        cpu::zip_map(&self.pool, &self.data, &other.data, &mut out, f)?;
        Ok(self.with_data(self.rows, self.cols, out))
    }

    /// Applies `f` to every element and returns the result.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn map<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(f64) -> f64 + Sync,
    {
        let mut out = vec![0.0; self.data.len()];
        cpu::map_into(&self.pool, &self.data, &mut out, f)?;
        Ok(self.with_data(self.rows, self.cols, out))
    }

    /// Applies `f` to every element in place.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn map_in_place<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(f64) -> f64 + Sync,
    {
        cpu::apply(&self.pool, &mut self.data, f)
    }

    /// Element-wise `self + other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape(other, "add")?;
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise `self - other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape(other, "sub")?;
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise (Hadamard) product.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ.
    pub fn cwise_product(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape(other, "cwise_product")?;
        self.zip_with(other, |a, b| a * b)
    }

    /// Element-wise `self / other`.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if the shapes differ.
    /// - [`Error::DivisionByZero`] if `other` contains a zero.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape(other, "div")?;
        Self::ensure_no_zero(&other.data, "div")?;
        self.zip_with(other, |a, b| a / b)
    }

    /// `self + scalar` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn add_scalar(&self, scalar: f64) -> Result<Self> {
        self.map(|x| x + scalar)
    }

    /// `self - scalar` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn sub_scalar(&self, scalar: f64) -> Result<Self> {
        self.map(|x| x - scalar)
    }

    /// `scalar - self` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn rsub_scalar(&self, scalar: f64) -> Result<Self> {
        self.map(|x| scalar - x)
    }

    /// `self * scalar` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn scale(&self, scalar: f64) -> Result<Self> {
        self.map(|x| x * scalar)
    }

    /// `self / scalar` for every element.
    ///
    /// # Errors
    /// [`Error::DivisionByZero`] if `scalar` is zero.
    pub fn div_scalar(&self, scalar: f64) -> Result<Self> {
        if scalar == 0.0 {
            return Err(Error::DivisionByZero { op: "div_scalar" });
        }
        self.map(|x| x / scalar)
    }

    /// `scalar / self` for every element.
    ///
    /// # Errors
    /// [`Error::DivisionByZero`] if `self` contains a zero.
    pub fn rdiv_scalar(&self, scalar: f64) -> Result<Self> {
        Self::ensure_no_zero(&self.data, "rdiv_scalar")?;
        self.map(|x| scalar / x)
    }

    /// Matrix product `self × other` into a freshly allocated matrix.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `self.cols() == other.rows()`.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.cols != other.rows {
            return Err(Error::shape("matmul", self.shape(), other.shape()));
        }
        let data = cpu::matmul(&self.pool, &self.data, &other.data, self.rows, self.cols, other.cols)?;
        Ok(self.with_data(self.rows, other.cols, data))
    }

    /// Returns the `cols × rows` transpose.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn transpose(&self) -> Result<Self> {
        let data = cpu::transpose(&self.pool, &self.data, self.rows, self.cols)?;
        Ok(self.with_data(self.cols, self.rows, data))
    }

    /// Sum of all elements (`0.0` for an empty matrix).
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn sum(&self) -> Result<f64> {
        cpu::sum(&self.pool, &self.data)
    }

    /// Largest element.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an empty matrix.
    pub fn max_coeff(&self) -> Result<f64> {
        if self.data.is_empty() {
            return Err(Error::invalid("max_coeff of an empty matrix"));
        }
        cpu::max(&self.pool, &self.data)
    }

    /// Element-wise `self += other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ; `self` is unchanged then.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.ensure_same_shape(other, "add_assign")?;
        cpu::zip_apply(&self.pool, &mut self.data, &other.data, |a, b| a + b)
    }

    /// Element-wise `self -= other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the shapes differ; `self` is unchanged then.
    pub fn sub_assign(&mut self, other: &Self) -> Result<()> {
        self.ensure_same_shape(other, "sub_assign")?;
        cpu::zip_apply(&self.pool, &mut self.data, &other.data, |a, b| a - b)
    }

    /// Element-wise `self /= other`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] or [`Error::DivisionByZero`]; `self` is unchanged then.
    pub fn div_assign(&mut self, other: &Self) -> Result<()> {
        self.ensure_same_shape(other, "div_assign")?;
        Self::ensure_no_zero(&other.data, "div_assign")?;
        cpu::zip_apply(&self.pool, &mut self.data, &other.data, |a, b| a / b)
    }

    /// `self += scalar` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn add_scalar_assign(&mut self, scalar: f64) -> Result<()> {
        self.map_in_place(|x| x + scalar)
    }

    /// `self -= scalar` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn sub_scalar_assign(&mut self, scalar: f64) -> Result<()> {
        self.map_in_place(|x| x - scalar)
    }

    /// `self *= scalar` for every element.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn scale_assign(&mut self, scalar: f64) -> Result<()> {
        self.map_in_place(|x| x * scalar)
    }

    /// `self /= scalar` for every element.
    ///
    /// # Errors
    /// [`Error::DivisionByZero`] if `scalar` is zero; `self` is unchanged then.
    pub fn div_scalar_assign(&mut self, scalar: f64) -> Result<()> {
        if scalar == 0.0 {
            return Err(Error::DivisionByZero {
                op: "div_scalar_assign",
            });
        }
        self.map_in_place(|x| x / scalar)
    }

    /// `self = self × other`.
    ///
    /// The product is computed into a temporary and then moved into `self`, so the
    /// shape may change to `self.rows() × other.cols()`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `self.cols() == other.rows()`.
    pub fn matmul_assign(&mut self, other: &Self) -> Result<()> {
        let product = self.matmul(other)?;
        *self = product;
        Ok(())
    }
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        // a stopped pool cannot run the reduction; compare on this thread instead
        cpu::all_equal(&self.pool, &self.data, &other.data).unwrap_or_else(|_| self.data == other.data)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    /// # Panics
    /// Panics if `row` or `col` is out of range.
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of range for a {} matrix",
            self.shape()
        );
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    /// # Panics
    /// Panics if `row` or `col` is out of range.
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of range for a {} matrix",
            self.shape()
        );
        &mut self.data[row * self.cols + col]
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const CELL_WIDTH: usize = 10;
        const PRECISION: usize = 6;

        let inner = " ".repeat(self.cols * (CELL_WIDTH + 1));
        writeln!(f, "┌{inner}┐")?;
        for row in self.row_slices() {
            write!(f, "│")?;
            for value in row {
                write!(f, "{value:>CELL_WIDTH$.PRECISION$} ")?;
            }
            writeln!(f, "│")?;
        }
        writeln!(f, "└{inner}┘")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ThreadPool {
        ThreadPool::new(2).unwrap()
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let pool = pool();
        assert!(matches!(Matrix::zeros(&pool, 0, 3), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            Matrix::from_vec(&pool, 2, 2, vec![1.0; 3]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let pool = pool();
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(Matrix::from_rows(&pool, &rows), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn take_leaves_an_empty_matrix() {
        let pool = pool();
        let mut a = Matrix::filled(&pool, 2, 3, 1.5).unwrap();
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(a.shape(), Shape::new(0, 0));
        assert_eq!(b.shape(), Shape::new(2, 3));
        assert_eq!(b.as_slice(), &[1.5; 6]);
    }

    #[test]
    fn failed_division_leaves_receiver_untouched() {
        let pool = pool();
        let mut a = Matrix::from_rows(&pool, &[[2.0, 4.0]]).unwrap();
        let zero = Matrix::from_rows(&pool, &[[1.0, 0.0]]).unwrap();
        assert!(matches!(a.div_assign(&zero), Err(Error::DivisionByZero { .. })));
        assert_eq!(a.as_slice(), &[2.0, 4.0]);
    }

    #[test]
    fn display_draws_a_bordered_table() {
        let pool = pool();
        let a = Matrix::from_rows(&pool, &[[1.0, -2.5]]).unwrap();
        let text = a.to_string();
        assert!(text.starts_with('┌'));
        assert!(text.contains("  1.000000"));
        assert!(text.contains(" -2.500000"));
        assert_eq!(text.lines().count(), 3);
    }
}
