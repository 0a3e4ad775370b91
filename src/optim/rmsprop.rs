use crate::error::{Error, Result};
use crate::layers::Param;
use crate::tensors::Matrix;

use super::{Optimizer, StateTable, check_gradient, check_learning_rate, check_unit_interval};

/// Hyper-parameters of [`RmsProp`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RmsPropConfig {
    /// Step size `η`.
    pub learning_rate: f64,
    /// Decay of the squared-gradient average `γ`.
    pub gamma: f64,
    /// Added to the root before dividing.
    pub epsilon: f64,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            gamma: 0.9,
            epsilon: 1e-8,
        }
    }
}

/// RMSProp: scales each step by a running root-mean-square of the gradient.
#[derive(Debug, Clone)]
pub struct RmsProp {
    config: RmsPropConfig,
    mean_square: StateTable,
}

impl RmsProp {
    /// Creates the optimizer.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a non-positive learning rate or epsilon, or a
    /// `gamma` outside `[0, 1)`.
    pub fn new(config: RmsPropConfig) -> Result<Self> {
        check_learning_rate(config.learning_rate)?;
        check_unit_interval("gamma", config.gamma)?;
        if !(config.epsilon > 0.0) {
            return Err(Error::invalid(format!("epsilon must be positive, got {}", config.epsilon)));
        }
        Ok(Self {
            config,
            mean_square: StateTable::default(),
        })
    }

    /// Hyper-parameters.
    #[must_use]
    pub fn config(&self) -> RmsPropConfig {
        self.config
    }

    /// Number of parameters with a squared-gradient buffer.
    #[must_use]
    pub fn tracked_params(&self) -> usize {
        self.mean_square.len()
    }

    fn step(&mut self, param: &mut Param, grad: &Matrix) -> Result<()> {
        let RmsPropConfig {
            learning_rate,
            gamma,
            epsilon,
        } = self.config;
        let mean_square = self.mean_square.slot(param)?;
        let squared = grad.map(|g| (1.0 - gamma) * g * g)?;
        *mean_square = mean_square.scale(gamma)?.add(&squared)?;

        let denom = mean_square.map(|s| s.sqrt() + epsilon)?;
        let update = grad.scale(learning_rate)?.div(&denom)?;
        param.value_mut().sub_assign(&update)
    }
}

impl Default for RmsProp {
    fn default() -> Self {
        Self {
            config: RmsPropConfig::default(),
            mean_square: StateTable::default(),
        }
    }
}

impl Optimizer for RmsProp {
    fn learning_rate(&self) -> f64 {
        self.config.learning_rate
    }

    fn update(
        &mut self,
        weights: &mut Param,
        biases: &mut Param,
        grad_weights: &Matrix,
        grad_biases: &Matrix,
    ) -> Result<()> {
        check_gradient(weights, grad_weights)?;
        check_gradient(biases, grad_biases)?;
        self.mean_square.check(weights)?;
        self.mean_square.check(biases)?;

        self.step(weights, grad_weights)?;
        self.step(biases, grad_biases)
    }
}
