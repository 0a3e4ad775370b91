use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::activations::{Activation, ActivationContext};
use crate::error::{Error, Result};
use crate::init::Initializer;
use crate::optim::Optimizer;
use crate::pool::ThreadPool;
use crate::tensors::{Matrix, Shape};

use super::{Param, check_batch_size};

/// Fully-connected layer: `activation(W·X + b)`.
///
/// - `W` is `outputs × inputs`, `b` is `outputs × 1`
/// - `X` holds one sample per column
#[derive(Debug, Clone)]
pub struct Dense {
    weights: Param,
    biases: Param,
    grad_weights: Matrix,
    grad_biases: Matrix,
    activation: Activation,
}

/// Forward state consumed by [`Dense::backward`].
#[derive(Debug, Clone)]
pub struct DenseContext {
    input: Matrix,
    activation: ActivationContext,
}

impl Dense {
    /// Creates a layer whose weights are drawn from an entropy-seeded generator.
    /// Biases start at zero.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `inputs` or `outputs` is zero.
    pub fn new(
        pool: &ThreadPool,
        inputs: usize,
        outputs: usize,
        init: Initializer,
        activation: Activation,
    ) -> Result<Self> {
        Self::with_rng(pool, inputs, outputs, init, activation, &mut StdRng::from_os_rng())
    }

    /// Like [`Dense::new`] but reproducible: the same seed yields the same weights.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `inputs` or `outputs` is zero.
    pub fn with_seed(
        pool: &ThreadPool,
        inputs: usize,
        outputs: usize,
        init: Initializer,
        activation: Activation,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(pool, inputs, outputs, init, activation, &mut StdRng::seed_from_u64(seed))
    }

    /// Draws the weights from a caller-supplied generator.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `inputs` or `outputs` is zero.
    pub fn with_rng<R: Rng + ?Sized>(
        pool: &ThreadPool,
        inputs: usize,
        outputs: usize,
        init: Initializer,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        let weights = init.weights(pool, inputs, outputs, rng)?;
        let biases = Matrix::zeros(pool, outputs, 1)?;
        Self::from_parameters(weights, biases, activation)
    }

    /// Builds a layer around existing parameters.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if `weights` is empty.
    /// - [`Error::ShapeMismatch`] unless `biases` is `weights.rows() × 1`.
    pub fn from_parameters(weights: Matrix, biases: Matrix, activation: Activation) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::invalid("dense layer needs a non-empty weight matrix"));
        }
        if biases.shape() != Shape::new(weights.rows(), 1) {
            return Err(Error::shape("dense biases", weights.shape(), biases.shape()));
        }
        let pool = weights.pool().clone();
        Ok(Self {
            grad_weights: Matrix::zeros(&pool, weights.rows(), weights.cols())?,
            grad_biases: Matrix::zeros(&pool, biases.rows(), 1)?,
            weights: Param::new(weights),
            biases: Param::new(biases),
            activation,
        })
    }

    /// Width of the input (rows of a batch).
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.weights.value().cols()
    }

    /// Width of the output.
    #[must_use]
    pub fn outputs(&self) -> usize {
        self.weights.value().rows()
    }

    /// Activation applied after the affine map.
    #[must_use]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Weight matrix, `outputs × inputs`.
    #[must_use]
    pub fn weights(&self) -> &Matrix {
        self.weights.value()
    }

    /// Bias column, `outputs × 1`.
    #[must_use]
    pub fn biases(&self) -> &Matrix {
        self.biases.value()
    }

    /// Weight gradient accumulated since the last reset.
    #[must_use]
    pub fn weight_gradients(&self) -> &Matrix {
        &self.grad_weights
    }

    /// Bias gradient accumulated since the last reset.
    #[must_use]
    pub fn bias_gradients(&self) -> &Matrix {
        &self.grad_biases
    }

    /// Computes `activation(W·X + b)` for a `inputs × batch` input.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if `input.rows() != self.inputs()`.
    pub fn forward(&self, input: &Matrix) -> Result<(Matrix, DenseContext)> {
        let z = self
            .weights
            .value()
            .matmul(input)?
            .col_wise()
            .add(self.biases.value())?;
        let (output, activation) = self.activation.forward(&z)?;
        Ok((
            output,
            DenseContext {
                input: input.clone(),
                activation,
            },
        ))
    }

    /// Accumulates parameter gradients and returns `dL/d(input)`.
    ///
    /// # Errors
    /// - [`Error::ShapeMismatch`] if `grad` does not match the forward output.
    /// - [`Error::InvalidState`] if `context` came from a different activation.
    pub fn backward(&mut self, context: &DenseContext, grad: &Matrix) -> Result<Matrix> {
        let dz = self.activation.backward(&context.activation, grad)?;
        let dw = dz.matmul(&context.input.transpose()?)?;
        let db = dz.row_wise().sum()?;
        let dx = self.weights.value().transpose()?.matmul(&dz)?;

        self.grad_weights.add_assign(&dw)?;
        self.grad_biases.add_assign(&db)?;
        Ok(dx)
    }

    /// Zeroes the gradient accumulators.
    ///
    /// # Errors
    /// Pool errors are forwarded.
    pub fn reset_gradients(&mut self) -> Result<()> {
        self.grad_weights.map_in_place(|_| 0.0)?;
        self.grad_biases.map_in_place(|_| 0.0)
    }

    /// Averages the accumulated gradients over `batch_size` and hands them to `optimizer`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `batch_size` is zero; optimizer errors are forwarded.
    pub fn apply_gradients(&mut self, optimizer: &mut dyn Optimizer, batch_size: usize) -> Result<()> {
        let divisor = check_batch_size(batch_size)?;
        let gw = self.grad_weights.div_scalar(divisor)?;
        let gb = self.grad_biases.div_scalar(divisor)?;
        optimizer.update(&mut self.weights, &mut self.biases, &gw, &gb)
    }
}
