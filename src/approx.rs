//! Utilities to approximate equality of floating point values and matrices.
//!
//! Used by the test-suite and by callers that compare training outputs, where exact
//! `==` is too strict after a few thousand parallel reductions.

use crate::tensors::Matrix;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected minimum epsilon accepted on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon accepted on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-12;

/// The approximated equality enumerated, best first.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

impl ApproxEquality {
    fn grade(diff: f64) -> Self {
        if diff < F64_MIN_ERROR {
            Self::Precise
        } else if diff < F64_AVG_ERROR {
            Self::Partial
        } else if diff < F64_MAX_ERROR {
            Self::Relative
        } else {
            // NaN lands here too
            Self::Scarce
        }
    }
}

/// Distance between two values of comparable shape.
pub trait RelativeEq<Rhs: ?Sized = Self> {
    /// Largest absolute element difference, or `None` if the shapes differ.
    fn max_abs_diff(&self, rhs: &Rhs) -> Option<f64>;

    /// Grades the worst element difference.
    fn approx_eq(&self, rhs: &Rhs) -> ApproxEquality {
        self.max_abs_diff(rhs)
            .map_or(ApproxEquality::Scarce, ApproxEquality::grade)
    }
}

impl RelativeEq for f64 {
    fn max_abs_diff(&self, rhs: &Self) -> Option<f64> {
        Some((self - rhs).abs())
    }
}

impl RelativeEq for [f64] {
    fn max_abs_diff(&self, rhs: &Self) -> Option<f64> {
        if self.len() != rhs.len() {
            return None;
        }
        // NaN must not be swallowed by f64::max
        self.iter().zip(rhs).try_fold(0.0_f64, |worst, (a, b)| {
            let diff = (a - b).abs();
            if diff.is_nan() { None } else { Some(worst.max(diff)) }
        })
        .or(Some(f64::NAN))
    }
}

impl<const N: usize> RelativeEq<[f64]> for [f64; N] {
    fn max_abs_diff(&self, rhs: &[f64]) -> Option<f64> {
        self.as_slice().max_abs_diff(rhs)
    }
}

impl RelativeEq for Matrix {
    fn max_abs_diff(&self, rhs: &Self) -> Option<f64> {
        if self.shape() != rhs.shape() {
            return None;
        }
        self.as_slice().max_abs_diff(rhs.as_slice())
    }
}

impl RelativeEq<[f64]> for Matrix {
    fn max_abs_diff(&self, rhs: &[f64]) -> Option<f64> {
        self.as_slice().max_abs_diff(rhs)
    }
}

/// Approximates equality: `true` for [`ApproxEquality::Partial`] or better.
pub fn approx_eq<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B) -> bool {
    a.approx_eq(b) <= ApproxEquality::Partial
}

/// `true` if every element differs by at most `tolerance` and the shapes agree.
pub fn within<A: RelativeEq<B> + ?Sized, B: ?Sized>(a: &A, b: &B, tolerance: f64) -> bool {
    a.max_abs_diff(b).is_some_and(|diff| diff <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_follow_the_thresholds() {
        assert_eq!(1.0_f64.approx_eq(&1.0), ApproxEquality::Precise);
        assert_eq!(1.0_f64.approx_eq(&1.000_000_1), ApproxEquality::Partial);
        assert_eq!(1.0_f64.approx_eq(&1.0001), ApproxEquality::Relative);
        assert_eq!(1.0_f64.approx_eq(&1.1), ApproxEquality::Scarce);
    }

    #[test]
    fn nan_and_length_mismatch_are_never_equal() {
        assert!(!within([1.0, f64::NAN].as_slice(), [1.0, f64::NAN].as_slice(), 1.0));
        assert!(!within([1.0, 2.0].as_slice(), [1.0].as_slice(), 1.0));
        assert!(within(&[1.0, 2.0], [1.05, 1.95].as_slice(), 0.1));
    }
}
