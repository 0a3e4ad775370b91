//! Layer stacks.
//!
//! # Network
//!
//! A [`Network`] owns an ordered list of [`Layer`]s and the [`ThreadPool`] they compute
//! on. The order is the forward order; backward walks it in reverse.
//!
//! Two layouts appear in its API:
//! - *batch* layout, one sample per column, for [`Network::forward`] and
//!   [`Network::backward`]
//! - *dataset* layout, one sample per row, for [`Network::predict`],
//!   [`Network::evaluate`] and [`Network::fit`](crate::train)
//!
//! ## Inference Mode
//!
//! [`Network::inference_mode`] returns a guard that switches every batch-norm layer to
//! its running statistics. Dropping the guard restores each layer's previous mode,
//! also when an error is propagated out of the guarded block or a panic unwinds
//! through it. `predict` and `evaluate` use it internally.
//!
//! ## Example
//!
//! ```rust
//! use feedforward::activations::Activation;
//! use feedforward::init::Initializer;
//! use feedforward::layers::Dense;
//! use feedforward::model::Network;
//! use feedforward::pool::ThreadPool;
//! use feedforward::tensors::Matrix;
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let mut net = Network::new(&pool);
//! net.add_layer(Dense::with_seed(&pool, 2, 4, Initializer::HeNormal, Activation::Relu, 1).unwrap()).unwrap();
//! net.add_layer(Dense::with_seed(&pool, 4, 1, Initializer::XavierNormal, Activation::Sigmoid, 2).unwrap()).unwrap();
//!
//! let samples = Matrix::from_rows(&pool, &[[0.0, 1.0], [1.0, 1.0]]).unwrap();
//! let out = net.predict(&samples).unwrap();
//! assert_eq!((out.rows(), out.cols()), (2, 1));
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use tracing::debug;

use crate::data::{batch_to_rows, rows_to_batch};
use crate::error::{Error, Result};
use crate::layers::{Layer, LayerContext};
use crate::loss::Loss;
use crate::metrics::Metric;
use crate::modelio::{read_layers, write_layers};
use crate::optim::Optimizer;
use crate::pool::ThreadPool;
use crate::tensors::{Matrix, Shape};

/// Ordered stack of layers bound to a worker pool.
#[derive(Debug, Clone)]
pub struct Network {
    pool: ThreadPool,
    layers: Vec<Layer>,
}

/// Output of [`Network::forward`] plus the per-layer state backward needs.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    output: Matrix,
    contexts: Vec<LayerContext>,
}

impl ForwardPass {
    /// Network output, `outputs × batch`.
    #[must_use]
    pub fn output(&self) -> &Matrix {
        &self.output
    }

    /// Consumes the pass and returns the output.
    #[must_use]
    pub fn into_output(self) -> Matrix {
        self.output
    }
}

impl Network {
    /// Creates an empty network.
    #[must_use]
    pub fn new(pool: &ThreadPool) -> Self {
        Self {
            pool: pool.clone(),
            layers: Vec::new(),
        }
    }

    /// The pool every layer computes on.
    #[must_use]
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Layers in forward order.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the network has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Input width, if any layer is present.
    #[must_use]
    pub fn input_size(&self) -> Option<usize> {
        self.layers.first().map(Layer::input_size)
    }

    /// Output width, if any layer is present.
    #[must_use]
    pub fn output_size(&self) -> Option<usize> {
        self.layers.last().map(Layer::output_size)
    }

    /// Appends a layer.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the layer's input width differs from the current
    /// output width.
    pub fn add_layer(&mut self, layer: impl Into<Layer>) -> Result<()> {
        let layer = layer.into();
        if let Some(out) = self.output_size() {
            if out != layer.input_size() {
                return Err(Error::shape(
                    "add_layer",
                    Shape::new(out, 1),
                    Shape::new(layer.input_size(), 1),
                ));
            }
        }
        debug!(kind = %layer.kind(), inputs = layer.input_size(), outputs = layer.output_size(), "layer added");
        self.layers.push(layer);
        Ok(())
    }

    /// Runs every layer on a batch (`inputs × batch`).
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the batch has the wrong number of rows.
    pub fn forward(&mut self, input: &Matrix) -> Result<ForwardPass> {
        let mut contexts = Vec::with_capacity(self.layers.len());
        let mut output = input.clone();
        for layer in &mut self.layers {
            let (next, ctx) = layer.forward(&output)?;
            contexts.push(ctx);
            output = next;
        }
        Ok(ForwardPass { output, contexts })
    }

    /// Propagates `grad` (same shape as the pass output) back through every layer,
    /// accumulating parameter gradients, and returns `dL/d(input)`.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if `pass` does not come from this network's layers.
    /// - [`Error::ShapeMismatch`] if `grad` does not match the pass output.
    pub fn backward(&mut self, pass: &ForwardPass, grad: &Matrix) -> Result<Matrix> {
        if pass.contexts.len() != self.layers.len() {
            return Err(Error::InvalidState(format!(
                "forward pass covers {} layers, network has {}",
                pass.contexts.len(),
                self.layers.len()
            )));
        }
        let mut grad = grad.clone();
        for (layer, ctx) in self.layers.iter_mut().zip(&pass.contexts).rev() {
            grad = layer.backward(ctx, &grad)?;
        }
        Ok(grad)
    }

    /// Zeroes every layer's gradient accumulators.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn reset_gradients(&mut self) -> Result<()> {
        self.layers.iter_mut().try_for_each(Layer::reset_gradients)
    }

    /// Applies the accumulated gradients of every layer, averaged over `batch_size`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `batch_size` is zero; optimizer errors are forwarded.
    pub fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer, batch_size: usize) -> Result<()> {
        self.layers
            .iter_mut()
            .try_for_each(|layer| layer.apply_gradients(optimizer, batch_size))
    }

    /// Switches every batch-norm layer into training or inference mode.
    pub fn set_training(&mut self, training: bool) {
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    /// Puts the network in inference mode until the returned guard is dropped.
    pub fn inference_mode(&mut self) -> InferenceGuard<'_> {
        let previous = self.layers.iter().map(Layer::is_training).collect();
        self.set_training(false);
        InferenceGuard {
            network: self,
            previous,
        }
    }

    /// Predicts a dataset (`samples × inputs`), returning `samples × outputs`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if the samples have the wrong width.
    pub fn predict(&mut self, samples: &Matrix) -> Result<Matrix> {
        let batch = rows_to_batch(samples)?;
        let mut guard = self.inference_mode();
        let output = guard.forward(&batch)?.into_output();
        batch_to_rows(&output)
    }

    /// Predicts a single sample.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `sample` is empty.
    /// - [`Error::ShapeMismatch`] if it has the wrong width.
    pub fn predict_sample(&mut self, sample: &[f64]) -> Result<Vec<f64>> {
        let column = Matrix::column(&self.pool, sample)?;
        let mut guard = self.inference_mode();
        Ok(guard.forward(&column)?.into_output().into_vec())
    }

    /// Loss of the network on a dataset, in inference mode.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `x` or `y` has the wrong width or they disagree on
    /// the number of samples.
    pub fn loss(&mut self, x: &Matrix, y: &Matrix, loss: Loss) -> Result<f64> {
        let targets = rows_to_batch(y)?;
        let batch = rows_to_batch(x)?;
        let mut guard = self.inference_mode();
        let output = guard.forward(&batch)?.into_output();
        loss.compute(&output, &targets)
    }

    /// Scores the network on a dataset with one metric.
    ///
    /// # Errors
    /// Same as [`Network::evaluate_all`].
    pub fn evaluate(&mut self, x: &Matrix, y: &Matrix, metric: Metric) -> Result<f64> {
        let predictions = self.predict(x)?;
        metric.compute(&predictions, y)
    }

    /// Scores the network on a dataset with several metrics, predicting only once.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `x` or `y` has the wrong width or they disagree on
    /// the number of samples.
    pub fn evaluate_all(&mut self, x: &Matrix, y: &Matrix, metrics: &[Metric]) -> Result<Vec<(Metric, f64)>> {
        let predictions = self.predict(x)?;
        metrics
            .iter()
            .map(|&metric| Ok((metric, metric.compute(&predictions, y)?)))
            .collect()
    }

    /// Writes every layer to `writer` (see [`crate::modelio`]).
    ///
    /// # Errors
    /// [`Error::Io`] if the writer fails.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_layers(writer, &self.layers)
    }

    /// Reads a network written by [`Network::write_to`].
    ///
    /// # Errors
    /// [`Error::CorruptFormat`], [`Error::InvalidArgument`] or [`Error::Io`] as
    /// [`crate::modelio::read_layers`] reports them.
    pub fn read_from<R: Read + ?Sized>(pool: &ThreadPool, reader: &mut R) -> Result<Self> {
        Ok(Self {
            pool: pool.clone(),
            layers: read_layers(pool, reader)?,
        })
    }

    /// Saves the network to a file, replacing it if it exists.
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        debug!(path = %path.display(), layers = self.layers.len(), "network saved");
        Ok(())
    }

    /// Loads a network saved with [`Network::save`].
    ///
    /// # Errors
    /// [`Error::Io`] if the file cannot be opened; otherwise as [`Network::read_from`].
    pub fn load(pool: &ThreadPool, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let network = Self::read_from(pool, &mut reader)?;
        debug!(path = %path.display(), layers = network.layers.len(), "network loaded");
        Ok(network)
    }
}

/// Keeps a [`Network`] in inference mode; see [`Network::inference_mode`].
#[derive(Debug)]
pub struct InferenceGuard<'a> {
    network: &'a mut Network,
    previous: Vec<bool>,
}

impl Deref for InferenceGuard<'_> {
    type Target = Network;

    fn deref(&self) -> &Network {
        self.network
    }
}

impl DerefMut for InferenceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Network {
        self.network
    }
}

impl Drop for InferenceGuard<'_> {
    fn drop(&mut self) {
        for (layer, &training) in self.network.layers.iter_mut().zip(&self.previous) {
            layer.set_training(training);
        }
    }
}
