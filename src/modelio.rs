//! Robust saving/loading of matrices, layers and layer stacks.
//!
//! # Binary Format
//!
//! Fixed-width fields in native byte order, no header or padding:
//!
//! ```text
//! matrix     := i32 rows, i32 cols, f64 × (rows·cols)   row-major, rows > 0, cols > 0
//! layer      := i32 tag, body
//!   dense      (tag 0) := i32 activation, matrix weights, matrix biases
//!   batch norm (tag 1) := f64 momentum, matrix running_mean, matrix running_var,
//!                         matrix gamma, matrix beta
//! model      := i32 layer_count, layer × layer_count     forward order
//! ```
//!
//! # Design Principles
//! - Headers are validated before any element is read, so a bad dimension never
//!   triggers a huge allocation
//! - A stream that ends early, or holds values the format forbids, is reported as
//!   [`Error::CorruptFormat`]; other I/O failures stay [`Error::Io`]
//! - Unknown layer or activation tags are reported as [`Error::InvalidArgument`]
//!
//! # Limitations
//! - Native endianness: files are not portable across byte orders
//! - Batch-norm epsilon is not stored; loaded layers use the default
//!
//! # Example
//!
//! ```rust
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//!
//! let pool = ThreadPool::new(1).unwrap();
//! let m = Matrix::from_rows(&pool, &[[1.0, 2.0], [3.0, 4.0]]).unwrap();
//!
//! let mut bytes = Vec::new();
//! m.save(&mut bytes).unwrap();
//! assert_eq!(bytes.len(), 4 + 4 + 4 * 8);
//!
//! let back = Matrix::load(&pool, &mut bytes.as_slice()).unwrap();
//! assert_eq!(m, back);
//! ```

use std::io::{self, Read, Write};

use briny::prelude::*;

use crate::activations::Activation;
use crate::error::{Error, Result};
use crate::layers::{BatchNorm, BatchNormConfig, Dense, Layer, LayerKind};
use crate::pool::ThreadPool;
use crate::tensors::Matrix;

/// Dimensions as read from a stream, before they are trusted.
struct PackedHeader {
    rows: i32,
    cols: i32,
}

impl Validate for PackedHeader {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.rows <= 0 || self.cols <= 0 {
            return Err(ValidationError);
        }
        // the element count must be addressable
        let rows = usize::try_from(self.rows).map_err(|_| ValidationError)?;
        let cols = usize::try_from(self.cols).map_err(|_| ValidationError)?;
        rows.checked_mul(cols).ok_or(ValidationError)?;
        Ok(())
    }
}

fn read_error(err: io::Error, what: &str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::corrupt(format!("stream ended while reading {what}"))
    } else {
        Error::Io(err)
    }
}

fn read_i32<R: Read + ?Sized>(reader: &mut R, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| read_error(e, what))?;
    Ok(i32::from_ne_bytes(buf))
}

fn read_f64<R: Read + ?Sized>(reader: &mut R, what: &str) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(|e| read_error(e, what))?;
    Ok(f64::from_ne_bytes(buf))
}

fn dim_to_i32(dim: usize) -> Result<i32> {
    i32::try_from(dim).map_err(|_| Error::invalid(format!("dimension {dim} does not fit the format")))
}

/// Writes `matrix` in the persisted form.
///
/// # Errors
/// - [`Error::InvalidArgument`] for an empty matrix or one too large for `i32` dimensions.
/// - [`Error::Io`] if the writer fails.
pub fn write_matrix<W: Write + ?Sized>(writer: &mut W, matrix: &Matrix) -> Result<()> {
    if matrix.is_empty() {
        return Err(Error::invalid("an empty matrix has no persisted form"));
    }
    writer.write_all(&dim_to_i32(matrix.rows())?.to_ne_bytes())?;
    writer.write_all(&dim_to_i32(matrix.cols())?.to_ne_bytes())?;
    for value in matrix.as_slice() {
        writer.write_all(&value.to_ne_bytes())?;
    }
    Ok(())
}

/// Reads one matrix in the persisted form.
///
/// # Errors
/// - [`Error::CorruptFormat`] for non-positive dimensions or a truncated stream.
/// - [`Error::Io`] for any other read failure.
pub fn read_matrix<R: Read + ?Sized>(pool: &ThreadPool, reader: &mut R) -> Result<Matrix> {
    let rows = read_i32(reader, "matrix rows")?;
    let cols = read_i32(reader, "matrix cols")?;
    let header = TrustedData::new(PackedHeader { rows, cols })
        .map_err(|_| Error::corrupt(format!("invalid matrix dimensions {rows}x{cols}")))?
        .into_inner();

    // validated positive above
    let (rows, cols) = (header.rows as usize, header.cols as usize);
    let count = rows * cols;
    let mut data = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        data.push(read_f64(reader, "matrix data")?);
    }
    Matrix::from_vec(pool, rows, cols, data)
}

impl Matrix {
    /// Writes the matrix in its persisted form (see [`crate::modelio`]).
    ///
    /// # Errors
    /// Same as [`write_matrix`].
    pub fn save<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_matrix(writer, self)
    }

    /// Reads a matrix from its persisted form (see [`crate::modelio`]).
    ///
    /// # Errors
    /// Same as [`read_matrix`].
    pub fn load<R: Read + ?Sized>(pool: &ThreadPool, reader: &mut R) -> Result<Self> {
        read_matrix(pool, reader)
    }
}

/// Writes one layer: its tag followed by its body.
///
/// # Errors
/// [`Error::Io`] if the writer fails.
pub fn write_layer<W: Write + ?Sized>(writer: &mut W, layer: &Layer) -> Result<()> {
    writer.write_all(&layer.kind().tag().to_ne_bytes())?;
    match layer {
        Layer::Dense(dense) => {
            writer.write_all(&dense.activation().tag().to_ne_bytes())?;
            write_matrix(writer, dense.weights())?;
            write_matrix(writer, dense.biases())
        }
        Layer::BatchNorm(norm) => {
            writer.write_all(&norm.config().momentum.to_ne_bytes())?;
            write_matrix(writer, norm.running_mean())?;
            write_matrix(writer, norm.running_var())?;
            write_matrix(writer, norm.gamma())?;
            write_matrix(writer, norm.beta())
        }
    }
}

/// Reads one layer. Loaded layers start with zeroed gradients and in training mode.
///
/// # Errors
/// - [`Error::InvalidArgument`] for an unknown layer or activation tag.
/// - [`Error::CorruptFormat`] for a truncated stream or inconsistent parameter shapes.
/// - [`Error::Io`] for any other read failure.
pub fn read_layer<R: Read + ?Sized>(pool: &ThreadPool, reader: &mut R) -> Result<Layer> {
    let kind = LayerKind::try_from(read_i32(reader, "layer tag")?)?;
    let layer: Layer = match kind {
        LayerKind::Dense => {
            let activation = Activation::try_from(read_i32(reader, "activation tag")?)?;
            let weights = read_matrix(pool, reader)?;
            let biases = read_matrix(pool, reader)?;
            Dense::from_parameters(weights, biases, activation)
                .map_err(|e| Error::corrupt(format!("dense layer: {e}")))?
                .into()
        }
        LayerKind::BatchNorm => {
            let config = BatchNormConfig {
                momentum: read_f64(reader, "batch norm momentum")?,
                ..BatchNormConfig::default()
            };
            let running_mean = read_matrix(pool, reader)?;
            let running_var = read_matrix(pool, reader)?;
            let gamma = read_matrix(pool, reader)?;
            let beta = read_matrix(pool, reader)?;
            BatchNorm::from_parts(config, gamma, beta, running_mean, running_var)
                .map_err(|e| Error::corrupt(format!("batch norm layer: {e}")))?
                .into()
        }
    };
    Ok(layer)
}

/// Writes a layer count followed by every layer in forward order.
///
/// # Errors
/// [`Error::Io`] if the writer fails.
pub fn write_layers<W: Write + ?Sized>(writer: &mut W, layers: &[Layer]) -> Result<()> {
    writer.write_all(&dim_to_i32(layers.len())?.to_ne_bytes())?;
    for layer in layers {
        write_layer(writer, layer)?;
    }
    Ok(())
}

/// Reads a layer stack and checks that consecutive widths line up.
///
/// # Errors
/// - [`Error::CorruptFormat`] for a negative count, mismatched widths, or a truncated stream.
/// - Everything [`read_layer`] reports.
pub fn read_layers<R: Read + ?Sized>(pool: &ThreadPool, reader: &mut R) -> Result<Vec<Layer>> {
    let count = read_i32(reader, "layer count")?;
    let count = usize::try_from(count).map_err(|_| Error::corrupt(format!("negative layer count {count}")))?;

    let mut layers: Vec<Layer> = Vec::with_capacity(count.min(1024));
    for index in 0..count {
        let layer = read_layer(pool, reader)?;
        if let Some(prev) = layers.last() {
            if prev.output_size() != layer.input_size() {
                return Err(Error::corrupt(format!(
                    "layer {index} expects {} inputs but layer {} produces {}",
                    layer.input_size(),
                    index - 1,
                    prev.output_size()
                )));
            }
        }
        layers.push(layer);
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_dimensions_are_corrupt() {
        let pool = ThreadPool::new(1).unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0_i32.to_ne_bytes());
        bytes.extend_from_slice(&3_i32.to_ne_bytes());
        let result = read_matrix(&pool, &mut bytes.as_slice());
        assert!(matches!(result, Err(Error::CorruptFormat(_))));
    }

    #[test]
    fn truncated_data_is_corrupt() {
        let pool = ThreadPool::new(1).unwrap();
        let m = Matrix::filled(&pool, 2, 2, 1.0).unwrap();
        let mut bytes = Vec::new();
        m.save(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(Matrix::load(&pool, &mut bytes.as_slice()), Err(Error::CorruptFormat(_))));
    }

    #[test]
    fn unknown_layer_tag_is_invalid() {
        let pool = ThreadPool::new(1).unwrap();
        let bytes = 7_i32.to_ne_bytes();
        assert!(matches!(
            read_layer(&pool, &mut bytes.as_slice()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn batch_norm_layer_round_trips() {
        let pool = ThreadPool::new(1).unwrap();
        let mut norm = BatchNorm::new(&pool, 2, BatchNormConfig::default()).unwrap();
        let x = Matrix::from_rows(&pool, &[[1.0, 3.0], [2.0, 8.0]]).unwrap();
        norm.forward(&x).unwrap();
        let layer = Layer::from(norm);

        let mut bytes = Vec::new();
        write_layer(&mut bytes, &layer).unwrap();
        let Layer::BatchNorm(back) = read_layer(&pool, &mut bytes.as_slice()).unwrap() else {
            panic!("expected a batch norm layer");
        };
        let Layer::BatchNorm(orig) = &layer else { unreachable!() };
        assert_eq!(back.running_mean(), orig.running_mean());
        assert_eq!(back.running_var(), orig.running_var());
        assert_eq!(back.config().momentum, 0.9);
    }
}
