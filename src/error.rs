//! Error taxonomy shared by every module of the crate.
//!
//! All failures are raised at the point of detection and returned to the caller.
//! Checks run before any mutation, so an operation that returns an error leaves its
//! operands untouched.

use crate::tensors::Shape;

/// Every failure the engine, layers, optimizers and persistence code can report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two operands have dimension-incompatible shapes.
    #[error("shape mismatch in {op}: left is {left}, right is {right}")]
    ShapeMismatch {
        /// Name of the operation that rejected the operands.
        op: &'static str,
        /// Shape of the receiver / left operand.
        left: Shape,
        /// Shape of the argument / right operand.
        right: Shape,
    },

    /// A scalar divisor of zero, or a divisor matrix containing a zero.
    #[error("division by zero in {op}")]
    DivisionByZero {
        /// Name of the operation that rejected the divisor.
        op: &'static str,
    },

    /// Bad caller input: zero dimensions, ragged rows, unknown tags, bad indices.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A persisted stream does not contain what the format requires.
    #[error("corrupt format: {0}")]
    CorruptFormat(String),

    /// Reading or writing a persisted stream failed.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not allowed in the current state (e.g. the pool is stopped).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A task running on the worker pool panicked.
    #[error("worker task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    pub(crate) fn shape(op: &'static str, left: Shape, right: Shape) -> Self {
        Self::ShapeMismatch { op, left, right }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptFormat(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
