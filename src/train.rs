//! Mini-batch training loop.
//!
//! [`Network::fit`] shuffles the dataset once, carves a validation split off its head,
//! then for every epoch reshuffles the training part, runs it in mini-batches (the last
//! one may be short) and records the sample-averaged loss. Training stops early when
//! the epoch loss has not improved by at least `min_delta` for `patience` consecutive
//! epochs.
//!
//! Progress goes through `tracing`: `info` per epoch, `trace` per batch.

use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, trace};

use crate::data::{rows_to_batch, shuffle_pairs, slice_rows};
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::metrics::Metric;
use crate::model::Network;
use crate::optim::Optimizer;
use crate::tensors::{Matrix, Shape};

/// Settings for [`Network::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Maximum number of passes over the training split.
    pub epochs: usize,
    /// Samples per gradient step.
    pub batch_size: usize,
    /// Fraction of the (shuffled) dataset held out for validation, in `[0, 1)`.
    pub validation_split: f64,
    /// Epochs without improvement tolerated before stopping.
    pub patience: usize,
    /// Smallest loss decrease that counts as improvement.
    pub min_delta: f64,
    /// Seed for shuffling; `None` draws one from the operating system.
    pub shuffle_seed: Option<u64>,
    /// Metrics reported after every epoch.
    pub metrics: Vec<Metric>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 1,
            validation_split: 0.0,
            patience: 10,
            min_delta: 1e-4,
            shuffle_seed: None,
            metrics: Vec::new(),
        }
    }
}

impl FitConfig {
    fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::invalid("epochs must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid("batch size must be > 0"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(Error::invalid(format!(
                "validation split must lie in [0, 1), got {}",
                self.validation_split
            )));
        }
        if self.patience == 0 {
            return Err(Error::invalid("patience must be > 0"));
        }
        if !(self.min_delta.is_finite() && self.min_delta >= 0.0) {
            return Err(Error::invalid(format!(
                "min delta must be finite and >= 0, got {}",
                self.min_delta
            )));
        }
        Ok(())
    }
}

/// What happened in one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    /// One-based epoch number.
    pub epoch: usize,
    /// Training loss averaged over samples.
    pub loss: f64,
    /// Loss on the validation split, if there is one.
    pub validation_loss: Option<f64>,
    /// Configured metrics, on the validation split if there is one, else on the
    /// training split.
    pub metrics: Vec<(Metric, f64)>,
}

/// Outcome of [`Network::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// One entry per completed epoch.
    pub epochs: Vec<EpochReport>,
    /// Whether early stopping ended training before `epochs` ran out.
    pub stopped_early: bool,
}

impl FitReport {
    /// Training loss of the last epoch.
    #[must_use]
    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.loss)
    }
}

impl Network {
    /// Trains on a dataset (`samples × inputs` and `samples × outputs`).
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for an empty network, an invalid config, mismatched
    ///   sample counts, or a validation split that leaves nothing to train on.
    /// - [`Error::ShapeMismatch`] if the dataset widths do not fit the network.
    pub fn fit(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        optimizer: &mut dyn Optimizer,
        loss: Loss,
        config: &FitConfig,
    ) -> Result<FitReport> {
        config.validate()?;
        self.check_dataset(x, y)?;

        let samples = x.rows();
        let held_out = (samples as f64 * config.validation_split) as usize;
        if held_out >= samples {
            return Err(Error::invalid(format!(
                "validation split {} leaves no training samples out of {samples}",
                config.validation_split
            )));
        }

        let mut rng = config
            .shuffle_seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let (x, y) = shuffle_pairs(x, y, &mut rng)?;
        let validation = if held_out > 0 {
            Some((slice_rows(&x, 0, held_out)?, slice_rows(&y, 0, held_out)?))
        } else {
            None
        };
        let mut x_train = slice_rows(&x, held_out, samples)?;
        let mut y_train = slice_rows(&y, held_out, samples)?;
        let train_len = x_train.rows();

        info!(
            samples = train_len,
            validation = held_out,
            epochs = config.epochs,
            batch_size = config.batch_size,
            optimizer_lr = optimizer.learning_rate(),
            %loss,
            "training started"
        );
        let started = Instant::now();

        let mut best = f64::INFINITY;
        let mut waited = 0;
        let mut report = FitReport {
            epochs: Vec::with_capacity(config.epochs),
            stopped_early: false,
        };

        for epoch in 1..=config.epochs {
            (x_train, y_train) = shuffle_pairs(&x_train, &y_train, &mut rng)?;

            let mut total = 0.0;
            for (batch, start) in (0..train_len).step_by(config.batch_size).enumerate() {
                let end = (start + config.batch_size).min(train_len);
                let inputs = rows_to_batch(&slice_rows(&x_train, start, end)?)?;
                let targets = rows_to_batch(&slice_rows(&y_train, start, end)?)?;
                let batch_loss = self.step(&inputs, &targets, optimizer, loss)?;
                trace!(epoch, batch = batch + 1, loss = batch_loss, "batch finished");
                total += batch_loss * (end - start) as f64;
            }
            let epoch_loss = total / train_len as f64;

            let validation_loss = match &validation {
                Some((vx, vy)) => Some(self.loss(vx, vy, loss)?),
                None => None,
            };
            let metrics = if config.metrics.is_empty() {
                Vec::new()
            } else {
                match &validation {
                    Some((vx, vy)) => self.evaluate_all(vx, vy, &config.metrics)?,
                    None => self.evaluate_all(&x_train, &y_train, &config.metrics)?,
                }
            };

            info!(epoch, loss = epoch_loss, validation_loss = ?validation_loss, metrics = ?metrics, "epoch finished");
            report.epochs.push(EpochReport {
                epoch,
                loss: epoch_loss,
                validation_loss,
                metrics,
            });

            if epoch_loss < best - config.min_delta {
                best = epoch_loss;
                waited = 0;
            } else {
                waited += 1;
                if waited >= config.patience {
                    info!(epoch, best_loss = best, "stopping early");
                    report.stopped_early = true;
                    break;
                }
            }
        }

        info!(
            epochs = report.epochs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "training finished"
        );
        Ok(report)
    }

    /// Runs one gradient step on a dataset batch (`samples × inputs`,
    /// `samples × outputs`) and returns the batch loss.
    ///
    /// # Errors
    /// Same shape checks as [`Network::fit`].
    pub fn train_on_batch(
        &mut self,
        x: &Matrix,
        y: &Matrix,
        optimizer: &mut dyn Optimizer,
        loss: Loss,
    ) -> Result<f64> {
        self.check_dataset(x, y)?;
        self.step(&rows_to_batch(x)?, &rows_to_batch(y)?, optimizer, loss)
    }

    /// reset, forward, loss, backward, apply; inputs in batch layout
    fn step(&mut self, inputs: &Matrix, targets: &Matrix, optimizer: &mut dyn Optimizer, loss: Loss) -> Result<f64> {
        self.reset_gradients()?;
        let pass = self.forward(inputs)?;
        let value = loss.compute(pass.output(), targets)?;
        let grad = loss.gradient(pass.output(), targets)?;
        self.backward(&pass, &grad)?;
        self.apply_gradients(optimizer, inputs.cols())?;
        Ok(value)
    }

    fn check_dataset(&self, x: &Matrix, y: &Matrix) -> Result<()> {
        let (Some(inputs), Some(outputs)) = (self.input_size(), self.output_size()) else {
            return Err(Error::invalid("cannot train a network without layers"));
        };
        if x.is_empty() || x.rows() != y.rows() {
            return Err(Error::invalid(format!(
                "{} input samples but {} target samples",
                x.rows(),
                y.rows()
            )));
        }
        if x.cols() != inputs {
            return Err(Error::shape("fit inputs", Shape::new(x.rows(), inputs), x.shape()));
        }
        if y.cols() != outputs {
            return Err(Error::shape("fit targets", Shape::new(y.rows(), outputs), y.shape()));
        }
        Ok(())
    }
}
