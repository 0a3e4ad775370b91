use crate::error::{Error, Result};
use crate::optim::Optimizer;
use crate::pool::ThreadPool;
use crate::tensors::{Matrix, Shape};

use super::{Param, check_batch_size};

/// Hyper-parameters of a [`BatchNorm`] layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormConfig {
    /// Added to the variance before the square root.
    pub epsilon: f64,
    /// Weight of the previous running statistic in each update.
    pub momentum: f64,
}

impl Default for BatchNormConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            momentum: 0.9,
        }
    }
}

impl BatchNormConfig {
    fn validate(&self) -> Result<()> {
        if !(self.epsilon > 0.0) {
            return Err(Error::invalid(format!("batch norm epsilon must be positive, got {}", self.epsilon)));
        }
        if !(0.0..=1.0).contains(&self.momentum) {
            return Err(Error::invalid(format!(
                "batch norm momentum must lie in [0, 1], got {}",
                self.momentum
            )));
        }
        Ok(())
    }
}

/// Per-feature batch normalization.
///
/// Each row of a `features × batch` input is one feature. In training mode the row is
/// normalized with the batch mean and variance, and the running statistics are
/// updated as `running = momentum·running + (1 - momentum)·batch`. In inference mode
/// the running statistics are used instead. Either way the result is scaled by
/// `gamma` and shifted by `beta`.
///
/// The layer starts in training mode; callers flip it with [`BatchNorm::set_training`]
/// (or through [`crate::model::Network::inference_mode`]).
#[derive(Debug, Clone)]
pub struct BatchNorm {
    config: BatchNormConfig,
    gamma: Param,
    beta: Param,
    running_mean: Matrix,
    running_var: Matrix,
    grad_gamma: Matrix,
    grad_beta: Matrix,
    training: bool,
}

/// Forward state consumed by [`BatchNorm::backward`].
#[derive(Debug, Clone)]
pub struct BatchNormContext {
    normalized: Matrix,
    inv_std: Matrix,
    training: bool,
}

impl BatchNorm {
    /// Creates a layer over `features` rows with `gamma = 1`, `beta = 0`, running
    /// mean `0` and running variance `1`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for zero features or an out-of-range config.
    pub fn new(pool: &ThreadPool, features: usize, config: BatchNormConfig) -> Result<Self> {
        Self::from_parts(
            config,
            Matrix::filled(pool, features, 1, 1.0)?,
            Matrix::zeros(pool, features, 1)?,
            Matrix::zeros(pool, features, 1)?,
            Matrix::filled(pool, features, 1, 1.0)?,
        )
    }

    /// Rebuilds a layer from persisted state.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for an out-of-range config.
    /// - [`Error::ShapeMismatch`] unless all four vectors are `features × 1`.
    pub fn from_parts(
        config: BatchNormConfig,
        gamma: Matrix,
        beta: Matrix,
        running_mean: Matrix,
        running_var: Matrix,
    ) -> Result<Self> {
        config.validate()?;
        let expected = Shape::new(gamma.rows(), 1);
        if gamma.is_empty() || gamma.cols() != 1 {
            return Err(Error::invalid(format!(
                "batch norm gamma must be a non-empty column, got {}",
                gamma.shape()
            )));
        }
        for part in [&beta, &running_mean, &running_var] {
            if part.shape() != expected {
                return Err(Error::shape("batch norm state", expected, part.shape()));
            }
        }
        let pool = gamma.pool().clone();
        Ok(Self {
            config,
            grad_gamma: Matrix::zeros(&pool, expected.rows, 1)?,
            grad_beta: Matrix::zeros(&pool, expected.rows, 1)?,
            gamma: Param::new(gamma),
            beta: Param::new(beta),
            running_mean,
            running_var,
            training: true,
        })
    }

    /// Number of features (rows) the layer normalizes.
    #[must_use]
    pub fn features(&self) -> usize {
        self.gamma.value().rows()
    }

    /// Hyper-parameters.
    #[must_use]
    pub fn config(&self) -> BatchNormConfig {
        self.config
    }

    /// Whether batch statistics are used.
    #[must_use]
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Switches between training (batch statistics) and inference (running statistics).
    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// Learnable scale, `features × 1`.
    #[must_use]
    pub fn gamma(&self) -> &Matrix {
        self.gamma.value()
    }

    /// Learnable shift, `features × 1`.
    #[must_use]
    pub fn beta(&self) -> &Matrix {
        self.beta.value()
    }

    /// Running mean, `features × 1`.
    #[must_use]
    pub fn running_mean(&self) -> &Matrix {
        &self.running_mean
    }

    /// Running (biased) variance, `features × 1`.
    #[must_use]
    pub fn running_var(&self) -> &Matrix {
        &self.running_var
    }

    /// Normalizes `input`, updating the running statistics in training mode.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `input.rows() != self.features()`.
    pub fn forward(&mut self, input: &Matrix) -> Result<(Matrix, BatchNormContext)> {
        if input.rows() != self.features() {
            return Err(Error::shape(
                "batch norm forward",
                Shape::new(self.features(), input.cols()),
                input.shape(),
            ));
        }

        let eps = self.config.epsilon;
        let (normalized, inv_std) = if self.training {
            let m = input.cols() as f64;
            let mean = input.row_wise().sum()?.div_scalar(m)?;
            let centered = input.col_wise().sub(&mean)?;
            let var = centered.map(|x| x * x)?.row_wise().sum()?.div_scalar(m)?;
            let inv_std = var.map(|v| 1.0 / (v + eps).sqrt())?;
            let normalized = centered.col_wise().mul(&inv_std)?;

            let momentum = self.config.momentum;
            let running_mean = self.running_mean.scale(momentum)?.add(&mean.scale(1.0 - momentum)?)?;
            let running_var = self.running_var.scale(momentum)?.add(&var.scale(1.0 - momentum)?)?;
            self.running_mean = running_mean;
            self.running_var = running_var;

            (normalized, inv_std)
        } else {
            let inv_std = self.running_var.map(|v| 1.0 / (v + eps).sqrt())?;
            let normalized = input.col_wise().sub(&self.running_mean)?.col_wise().mul(&inv_std)?;
            (normalized, inv_std)
        };

        let output = normalized
            .col_wise()
            .mul(self.gamma.value())?
            .col_wise()
            .add(self.beta.value())?;

        Ok((
            output,
            BatchNormContext {
                normalized,
                inv_std,
                training: self.training,
            },
        ))
    }

    /// Accumulates `dγ`, `dβ` and returns `dL/d(input)`.
    ///
    /// A context from a training-mode forward pass uses the full batch-norm gradient;
    /// an inference-mode context treats the statistics as constants.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `grad` does not match the forward output.
    pub fn backward(&mut self, context: &BatchNormContext, grad: &Matrix) -> Result<Matrix> {
        let x_hat = &context.normalized;
        let d_gamma = grad.cwise_product(x_hat)?.row_wise().sum()?;
        let d_beta = grad.row_wise().sum()?;
        let d_x_hat = grad.col_wise().mul(self.gamma.value())?;

        let dx = if context.training {
            // (1 / mσ) · (m·dx̂ - Σdx̂ - x̂·Σ(dx̂·x̂))
            let m = grad.cols() as f64;
            let sum_d = d_x_hat.row_wise().sum()?;
            let sum_dx = d_x_hat.cwise_product(x_hat)?.row_wise().sum()?;
            let projected = x_hat.col_wise().mul(&sum_dx)?;
            let inner = d_x_hat.scale(m)?.col_wise().sub(&sum_d)?.sub(&projected)?;
            inner.col_wise().mul(&context.inv_std.div_scalar(m)?)?
        } else {
            d_x_hat.col_wise().mul(&context.inv_std)?
        };

        self.grad_gamma.add_assign(&d_gamma)?;
        self.grad_beta.add_assign(&d_beta)?;
        Ok(dx)
    }

    /// Zeroes the gradient accumulators.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn reset_gradients(&mut self) -> Result<()> {
        self.grad_gamma.map_in_place(|_| 0.0)?;
        self.grad_beta.map_in_place(|_| 0.0)
    }

    /// Averages `dγ`, `dβ` over `batch_size` and hands them to `optimizer`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `batch_size` is zero; optimizer errors are forwarded.
    pub fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer, batch_size: usize) -> Result<()> {
        let divisor = check_batch_size(batch_size)?;
        let gg = self.grad_gamma.div_scalar(divisor)?;
        let gb = self.grad_beta.div_scalar(divisor)?;
        optimizer.update(&mut self.gamma, &mut self.beta, &gg, &gb)
    }
}
