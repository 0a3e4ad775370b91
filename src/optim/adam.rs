use crate::error::{Error, Result};
use crate::layers::Param;
use crate::tensors::Matrix;

use super::{Optimizer, StateTable, check_gradient, check_learning_rate, check_unit_interval};

/// Hyper-parameters of [`Adam`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    /// Step size `η`.
    pub learning_rate: f64,
    /// Decay of the first moment.
    pub beta1: f64,
    /// Decay of the second moment.
    pub beta2: f64,
    /// Added to the root of the second moment before dividing.
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl AdamConfig {
    /// Default config with another learning rate.
    #[must_use]
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Self::default()
        }
    }
}

/// Adam with bias-corrected moment estimates.
///
/// The time step `t` is shared by every parameter the instance updates and advances
/// once per [`Optimizer::update`] call.
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    first: StateTable,
    second: StateTable,
    t: u64,
}

impl Adam {
    /// Creates the optimizer.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for a non-positive learning rate or epsilon, or a beta
    /// outside `[0, 1)`.
    pub fn new(config: AdamConfig) -> Result<Self> {
        check_learning_rate(config.learning_rate)?;
        check_unit_interval("beta1", config.beta1)?;
        check_unit_interval("beta2", config.beta2)?;
        if !(config.epsilon > 0.0) {
            return Err(Error::invalid(format!("epsilon must be positive, got {}", config.epsilon)));
        }
        Ok(Self {
            config,
            first: StateTable::default(),
            second: StateTable::default(),
            t: 0,
        })
    }

    /// Hyper-parameters.
    #[must_use]
    pub fn config(&self) -> AdamConfig {
        self.config
    }

    /// Number of `update` calls so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Number of parameters with moment buffers.
    #[must_use]
    pub fn tracked_params(&self) -> usize {
        self.first.len()
    }

    fn step(&mut self, param: &mut Param, grad: &Matrix) -> Result<()> {
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);

        let m = self.first.slot(param)?;
        *m = m.scale(beta1)?.add(&grad.scale(1.0 - beta1)?)?;
        let m_hat = m.div_scalar(correction1)?;

        let v = self.second.slot(param)?;
        *v = v.scale(beta2)?.add(&grad.map(|g| (1.0 - beta2) * g * g)?)?;
        let denom = v.div_scalar(correction2)?.map(|x| x.sqrt() + epsilon)?;

        let update = m_hat.scale(learning_rate)?.div(&denom)?;
        param.value_mut().sub_assign(&update)
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            config: AdamConfig::default(),
            first: StateTable::default(),
            second: StateTable::default(),
            t: 0,
        }
    }
}

impl Optimizer for Adam {
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
        for table in [&self.first, &self.second] {
            table.check(weights)?;
            table.check(biases)?;
        }

        self.t += 1;
        self.step(weights, grad_weights)?;
        self.step(biases, grad_biases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPool;

    #[test]
    fn first_step_moves_each_weight_by_the_learning_rate() {
        let pool = ThreadPool::new(1).unwrap();
        let mut w = Param::new(Matrix::from_rows(&pool, &[[1.0, -1.0]]).unwrap());
        let mut b = Param::new(Matrix::column(&pool, &[0.0]).unwrap());
        let gw = Matrix::from_rows(&pool, &[[3.0, -0.001]]).unwrap();
        let gb = Matrix::column(&pool, &[0.5]).unwrap();

        let mut adam = Adam::new(AdamConfig::with_learning_rate(0.1)).unwrap();
        adam.update(&mut w, &mut b, &gw, &gb).unwrap();

        assert_eq!(adam.steps(), 1);
        assert!((w.value()[(0, 0)] - 0.9).abs() < 1e-6);
        assert!((w.value()[(0, 1)] + 0.9).abs() < 1e-4);
        assert!((b.value()[(0, 0)] + 0.1).abs() < 1e-6);
    }
}
