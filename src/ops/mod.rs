//! # Operation Layer
//!
//! Tensor operations are split in two: [`crate::tensors::Matrix`] validates shapes and
//! divisors, then calls into the kernels here, which only know about flat row-major
//! buffers and the [`crate::pool::ThreadPool`] that runs them.
//!
//! ## Submodules
//!
//! - `cpu` — parallel CPU kernels (the only backend)
//!
//! ## Extending
//!
//! To add an operation:
//!
//! 1. Write the flat-buffer kernel in `cpu`, partitioning the outer loop over the pool
//! 2. Add the shape/consistency checks and the public method on `Matrix`

pub(crate) mod cpu;
