//! Row- and column-broadcasting views over a [`Matrix`].
//!
//! A batch stores one sample per column, so per-sample work (softmax max-subtraction)
//! combines a `1 × cols` row vector with every row, and per-feature work (batch
//! normalization) combines a `rows × 1` column vector with every column.
//!
//! [`RowWise`] and [`ColWise`] borrow the matrix they were created from and cannot
//! outlive it. The other operand's shape must match the bound axis exactly; there is
//! no implicit broadcasting of anything else.
//!
//! ```rust
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let x = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
//!
//! // one value per column
//! let col_max = x.col_wise().max_coeff().unwrap();
//! assert_eq!(col_max.as_slice(), &[3.0, 4.0]);
//!
//! // one value per row
//! let row_sum = x.row_wise().sum().unwrap();
//! assert_eq!(row_sum.as_slice(), &[3.0, 7.0]);
//! ```

use crate::error::{Error, Result};
use crate::tensors::{Matrix, Shape};

impl Matrix {
    /// Views the matrix row by row: a `1 × cols` operand applies to every row.
    #[must_use]
    pub fn row_wise(&self) -> RowWise<'_> {
        RowWise { matrix: self }
    }

    /// Views the matrix column by column: a `rows × 1` operand applies to every column.
    #[must_use]
    pub fn col_wise(&self) -> ColWise<'_> {
        ColWise { matrix: self }
    }
}

/// Row-broadcasting view created by [`Matrix::row_wise`].
#[derive(Debug, Clone, Copy)]
pub struct RowWise<'a> {
    matrix: &'a Matrix,
}

/// Column-broadcasting view created by [`Matrix::col_wise`].
#[derive(Debug, Clone, Copy)]
pub struct ColWise<'a> {
    matrix: &'a Matrix,
}

/// Runs `f(row_index, col_index, value)` for every cell, one output row per work item.
fn build<F>(src: &Matrix, f: F) -> Result<Matrix>
where
    F: Fn(usize, usize, f64) -> f64 + Sync,
{
    let cols = src.cols();
    let data = src.as_slice();
    Matrix::from_fn(src.pool(), src.rows(), cols, |r, c| f(r, c, data[r * cols + c]))
}

impl RowWise<'_> {
    fn check(&self, op: &'static str, vector: &Matrix) -> Result<()> {
        let expected = Shape::new(1, self.matrix.cols());
        if vector.shape() != expected {
            return Err(Error::shape(op, self.matrix.shape(), vector.shape()));
        }
        Ok(())
    }

    /// Adds the row vector to every row.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `vector` is `1 × cols`.
    pub fn add(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("row_wise add", vector)?;
        let v = vector.as_slice();
        build(self.matrix, |_, c, x| x + v[c])
    }

    /// Subtracts the row vector from every row.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `vector` is `1 × cols`.
    pub fn sub(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("row_wise sub", vector)?;
        let v = vector.as_slice();
        build(self.matrix, |_, c, x| x - v[c])
    }

    /// Multiplies every row by the row vector, element by element.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `vector` is `1 × cols`.
    pub fn mul(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("row_wise mul", vector)?;
        let v = vector.as_slice();
        build(self.matrix, |_, c, x| x * v[c])
    }

    /// Divides every row by the row vector, element by element.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] unless `vector` is `1 × cols`.
    /// - [`Error::DivisionByZero`] if `vector` contains a zero.
    pub fn div(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("row_wise div", vector)?;
        let v = vector.as_slice();
        if v.contains(&0.0) {
            return Err(Error::DivisionByZero { op: "row_wise div" });
        }
        build(self.matrix, |_, c, x| x / v[c])
    }

    /// Sums each row, giving a `rows × 1` column vector.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an empty matrix.
    pub fn sum(&self) -> Result<Matrix> {
        let m = self.matrix;
        let cols = m.cols();
        let data = m.as_slice();
        Matrix::from_fn(m.pool(), m.rows(), 1, |r, _| data[r * cols..(r + 1) * cols].iter().sum())
    }
}

impl ColWise<'_> {
    fn check(&self, op: &'static str, vector: &Matrix) -> Result<()> {
        let expected = Shape::new(self.matrix.rows(), 1);
        if vector.shape() != expected {
            return Err(Error::shape(op, self.matrix.shape(), vector.shape()));
        }
        Ok(())
    }

    /// Adds the column vector to every column.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `vector` is `rows × 1`.
    pub fn add(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("col_wise add", vector)?;
        let v = vector.as_slice();
        build(self.matrix, |r, _, x| x + v[r])
    }

    /// Subtracts the column vector from every column.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `vector` is `rows × 1`.
    pub fn sub(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("col_wise sub", vector)?;
        let v = vector.as_slice();
        build(self.matrix, |r, _, x| x - v[r])
    }

    /// Multiplies every column by the column vector, element by element.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] unless `vector` is `rows × 1`.
    pub fn mul(&self, vector: &Matrix) -> Result<Matrix> {
        self.check("col_wise mul", vector)?;
        let v = vector.as_slice();
        build(self.matrix, |r, _, x| x * v[r])
    }

    /// Sums each column, giving a `1 × cols` row vector.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an empty matrix.
    pub fn sum(&self) -> Result<Matrix> {
        self.reduce(0.0, |acc, x| acc + x)
    }

    /// Largest value of each column, giving a `1 × cols` row vector.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an empty matrix.
    pub fn max_coeff(&self) -> Result<Matrix> {
        self.reduce(f64::NEG_INFINITY, f64::max)
    }

    fn reduce<F>(&self, init: f64, fold: F) -> Result<Matrix>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let m = self.matrix;
        let (rows, cols) = (m.rows(), m.cols());
        let data = m.as_slice();
        // parallel over columns; each worker walks its column top to bottom
        Matrix::from_fn(m.pool(), 1, cols, |_, c| {
            (0..rows).map(|r| data[r * cols + c]).fold(init, &fold)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;

    fn sample(pool: &ThreadPool) -> Matrix {
        Matrix::from_rows(pool, &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap()
    }

    #[test]
    fn row_vector_applies_to_every_row() {
        let pool = ThreadPool::new(2).unwrap();
        let x = sample(&pool);
        let v = Matrix::row(&pool, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(x.row_wise().sub(&v).unwrap().as_slice(), &[0.0, 0.0, 0.0, 3.0, 3.0, 3.0]);
        assert_eq!(x.row_wise().div(&v).unwrap().as_slice(), &[1.0, 1.0, 1.0, 4.0, 2.5, 2.0]);
    }

    #[test]
    fn column_vector_applies_to_every_column() {
        let pool = ThreadPool::new(2).unwrap();
        let x = sample(&pool);
        let v = Matrix::column(&pool, &[10.0, 100.0]).unwrap();
        assert_eq!(
            x.col_wise().mul(&v).unwrap().as_slice(),
            &[10.0, 20.0, 30.0, 400.0, 500.0, 600.0]
        );
        assert_eq!(x.col_wise().sum().unwrap().as_slice(), &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn wrong_axis_is_a_shape_mismatch() {
        let pool = ThreadPool::new(2).unwrap();
        let x = sample(&pool);
        let column = Matrix::column(&pool, &[1.0, 2.0]).unwrap();
        let row = Matrix::row(&pool, &[1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(x.row_wise().sub(&column), Err(Error::ShapeMismatch { .. })));
        assert!(matches!(x.col_wise().add(&row), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn zero_in_row_divisor_is_rejected() {
        let pool = ThreadPool::new(2).unwrap();
        let x = sample(&pool);
        let v = Matrix::row(&pool, &[1.0, 0.0, 3.0]).unwrap();
        assert!(matches!(x.row_wise().div(&v), Err(Error::DivisionByZero { .. })));
    }
}
