//! Weight initialization schemes.
//!
//! | Scheme          | Distribution                            |
//! |-----------------|-----------------------------------------|
//! | `HeNormal`      | `N(0, √(2 / fan_in))`                   |
//! | `HeUniform`     | `U(±√(6 / fan_in))`                     |
//! | `XavierNormal`  | `N(0, √(2 / (fan_in + fan_out)))`       |
//! | `XavierUniform` | `U(±√(6 / (fan_in + fan_out)))`         |
//!
//! The caller owns the generator, so a layer seeded with a fixed value reproduces the
//! same draw.

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::{Error, Result};
use crate::pool::ThreadPool;
use crate::tensors::Matrix;

/// Weight initializer; the discriminant is the persisted tag.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Initializer {
    /// He normal, for ReLU stacks.
    #[default]
    HeNormal = 0,
    /// He uniform.
    HeUniform = 1,
    /// Xavier/Glorot normal, for sigmoid and softmax outputs.
    XavierNormal = 2,
    /// Xavier/Glorot uniform.
    XavierUniform = 3,
}

impl Initializer {
    /// Stable tag.
    #[must_use]
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Standard deviation (normal schemes) or half-width (uniform schemes).
    #[must_use]
    pub fn scale(self, fan_in: usize, fan_out: usize) -> f64 {
        let fan_in = fan_in as f64;
        let fan_sum = fan_in + fan_out as f64;
        match self {
            Self::HeNormal => (2.0 / fan_in).sqrt(),
            Self::HeUniform => (6.0 / fan_in).sqrt(),
            Self::XavierNormal => (2.0 / fan_sum).sqrt(),
            Self::XavierUniform => (6.0 / fan_sum).sqrt(),
        }
    }

    /// Draws a `fan_out × fan_in` weight matrix.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if either fan is zero.
    pub fn weights<R: Rng + ?Sized>(
        self,
        pool: &ThreadPool,
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<Matrix> {
        if fan_in == 0 || fan_out == 0 {
            return Err(Error::invalid(format!(
                "cannot initialize weights with fan_in {fan_in} and fan_out {fan_out}"
            )));
        }
        let scale = self.scale(fan_in, fan_out);
        match self {
            Self::HeNormal | Self::XavierNormal => {
                let dist = Normal::new(0.0, scale).map_err(|e| Error::invalid(e.to_string()))?;
                Matrix::from_generator(pool, fan_out, fan_in, || dist.sample(rng))
            }
            Self::HeUniform | Self::XavierUniform => {
                let dist = Uniform::new_inclusive(-scale, scale).map_err(|e| Error::invalid(e.to_string()))?;
                Matrix::from_generator(pool, fan_out, fan_in, || dist.sample(rng))
            }
        }
    }
}

impl TryFrom<i32> for Initializer {
    type Error = Error;

    fn try_from(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(Self::HeNormal),
            1 => Ok(Self::HeUniform),
            2 => Ok(Self::XavierNormal),
            3 => Ok(Self::XavierUniform),
            other => Err(Error::invalid(format!("unknown initializer tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn uniform_draws_stay_inside_the_limit() {
        let pool = ThreadPool::new(1).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let w = Initializer::HeUniform.weights(&pool, 6, 4, &mut rng).unwrap();
        assert_eq!((w.rows(), w.cols()), (4, 6));
        assert!(w.as_slice().iter().all(|x| x.abs() <= 1.0));
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let pool = ThreadPool::new(1).unwrap();
        let a = Initializer::XavierNormal
            .weights(&pool, 3, 3, &mut StdRng::seed_from_u64(11))
            .unwrap();
        let b = Initializer::XavierNormal
            .weights(&pool, 3, 3, &mut StdRng::seed_from_u64(11))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normal_draws_have_roughly_the_right_spread() {
        let pool = ThreadPool::new(2).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let w = Initializer::HeNormal.weights(&pool, 50, 200, &mut rng).unwrap();
        let n = w.len() as f64;
        let mean = w.sum().unwrap() / n;
        let var = w.as_slice().iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.02);
        assert!((var.sqrt() - 0.2).abs() < 0.02);
    }
}
