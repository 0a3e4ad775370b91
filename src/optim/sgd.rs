use crate::error::Result;
use crate::layers::Param;
use crate::tensors::Matrix;

use super::{Optimizer, StateTable, check_gradient, check_learning_rate, check_unit_interval};

/// Hyper-parameters of [`Sgd`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SgdConfig {
    /// Step size `η`.
    pub learning_rate: f64,
    /// Velocity decay `μ`; `0` gives plain gradient descent.
    pub momentum: f64,
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            momentum: 0.9,
        }
    }
}

/// Stochastic gradient descent with momentum.
#[derive(Debug, Clone)]
pub struct Sgd {
    config: SgdConfig,
    velocity: StateTable,
}

impl Sgd {
    /// Creates the optimizer.
    ///
    /// # Errors
    /// [`crate::Error::InvalidArgument`] for a non-positive learning rate or a momentum
    /// outside `[0, 1)`.
    pub fn new(config: SgdConfig) -> Result<Self> {
        check_learning_rate(config.learning_rate)?;
        check_unit_interval("momentum", config.momentum)?;
        Ok(Self {
            config,
            velocity: StateTable::default(),
        })
    }

    /// Hyper-parameters.
    #[must_use]
    pub fn config(&self) -> SgdConfig {
        self.config
    }

    /// Number of parameters with a velocity buffer.
    #[must_use]
    pub fn tracked_params(&self) -> usize {
        self.velocity.len()
    }

    fn step(&mut self, param: &mut Param, grad: &Matrix) -> Result<()> {
        let SgdConfig {
            learning_rate,
            momentum,
        } = self.config;
        let velocity = self.velocity.slot(param)?;
        *velocity = velocity.scale(momentum)?.add(&grad.scale(learning_rate)?)?;
        param.value_mut().sub_assign(velocity)
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self {
            config: SgdConfig::default(),
            velocity: StateTable::default(),
        }
    }
}

impl Optimizer for Sgd {
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
        self.velocity.check(weights)?;
        self.velocity.check(biases)?;

        self.step(weights, grad_weights)?;
        self.step(biases, grad_biases)
    }
}
