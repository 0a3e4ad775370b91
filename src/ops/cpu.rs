//! Parallel CPU kernels
//!
//! # CPU Kernels
//!
//! The flat-buffer routines behind every [`Matrix`](crate::tensors::Matrix) operation.
//! Each kernel hands its outer loop to the [`ThreadPool`] and runs the inner loop
//! sequentially on the worker that owns that part of the output, so there is never
//! nested parallelism and no two workers write the same cell.
//!
//! ## Implemented Kernels
//!
//! - `map_into` / `apply`: unary element-wise transforms
//! - `zip_map` / `zip_apply`: binary element-wise transforms
//! - `matmul`: `m×k · k×n` product, one output row per work item
//! - `transpose`: one output row per work item
//! - `sum` / `max`: block reductions, one partial per worker
//! - `all_equal`: equality reduction through a shared atomic flag
//!
//! ## Design Goals
//!
//! - Shape checks happen in the caller; kernels trust their lengths
//! - Deterministic results for a given thread count
//! - No `unsafe`: disjoint writes come from [`ThreadPool::parallel_chunks_mut`]

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::pool::ThreadPool;

/// `dst[i] = f(src[i])`
pub(crate) fn map_into<F>(pool: &ThreadPool, src: &[f64], dst: &mut [f64], f: F) -> Result<()>
where
    F: Fn(f64) -> f64 + Sync,
{
    debug_assert_eq!(src.len(), dst.len());
    pool.parallel_chunks_mut(dst, 1, |i, out| out[0] = f(src[i]))
}

/// `dst[i] = f(dst[i])`
pub(crate) fn apply<F>(pool: &ThreadPool, dst: &mut [f64], f: F) -> Result<()>
where
    F: Fn(f64) -> f64 + Sync,
{
    pool.parallel_chunks_mut(dst, 1, |_, out| out[0] = f(out[0]))
}

/// `out[i] = f(a[i], b[i])`
pub(crate) fn zip_map<F>(pool: &ThreadPool, a: &[f64], b: &[f64], out: &mut [f64], f: F) -> Result<()>
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());
    pool.parallel_chunks_mut(out, 1, |i, cell| cell[0] = f(a[i], b[i]))
}

/// `dst[i] = f(dst[i], src[i])`
pub(crate) fn zip_apply<F>(pool: &ThreadPool, dst: &mut [f64], src: &[f64], f: F) -> Result<()>
where
    F: Fn(f64, f64) -> f64 + Sync,
{
    debug_assert_eq!(src.len(), dst.len());
    pool.parallel_chunks_mut(dst, 1, |i, cell| cell[0] = f(cell[0], src[i]))
}

/// Row-major `C = A × B` with `A: m×k` and `B: k×n`.
///
/// Allocates a fresh `m×n` buffer; the inputs are never aliased.
pub(crate) fn matmul(pool: &ThreadPool, a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Result<Vec<f64>> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);

    let mut out = vec![0.0; m * n];
    pool.parallel_chunks_mut(&mut out, n, |i, row| {
        let a_row = &a[i * k..(i + 1) * k];
        for (l, &a_il) in a_row.iter().enumerate() {
            let b_row = &b[l * n..(l + 1) * n];
            for (c, &b_lj) in row.iter_mut().zip(b_row) {
                *c += a_il * b_lj;
            }
        }
    })?;
    Ok(out)
}

/// Transposes a `rows×cols` buffer into a `cols×rows` one.
pub(crate) fn transpose(pool: &ThreadPool, src: &[f64], rows: usize, cols: usize) -> Result<Vec<f64>> {
    debug_assert_eq!(src.len(), rows * cols);

    let mut out = vec![0.0; rows * cols];
    pool.parallel_chunks_mut(&mut out, rows, |j, out_row| {
        for (i, cell) in out_row.iter_mut().enumerate() {
            *cell = src[i * cols + j];
        }
    })?;
    Ok(out)
}

/// Runs `fold` over one contiguous block per worker and returns the partials.
fn block_partials<F>(pool: &ThreadPool, data: &[f64], fold: F) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let per_block = data.len().div_ceil(pool.threads());
    let blocks = data.len().div_ceil(per_block);

    let mut partials = vec![0.0; blocks];
    pool.parallel_chunks_mut(&mut partials, 1, |b, slot| {
        let start = b * per_block;
        let end = (start + per_block).min(data.len());
        slot[0] = fold(&data[start..end]);
    })?;
    Ok(partials)
}

/// Sum of all elements; `0.0` for an empty buffer.
pub(crate) fn sum(pool: &ThreadPool, data: &[f64]) -> Result<f64> {
    let partials = block_partials(pool, data, |block| block.iter().sum())?;
    Ok(partials.iter().sum())
}

/// Largest element; `-inf` for an empty buffer.
pub(crate) fn max(pool: &ThreadPool, data: &[f64]) -> Result<f64> {
    let fold = |block: &[f64]| block.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let partials = block_partials(pool, data, fold)?;
    Ok(fold(&partials))
}

/// Element-by-element equality of two buffers of the same length.
pub(crate) fn all_equal(pool: &ThreadPool, a: &[f64], b: &[f64]) -> Result<bool> {
    debug_assert_eq!(a.len(), b.len());

    // workers only ever flip the flag from true to false
    let equal = AtomicBool::new(true);
    pool.parallel_for(0..a.len(), |i| {
        if a[i] != b[i] {
            equal.store(false, Ordering::Relaxed);
        }
    })?;
    Ok(equal.load(Ordering::Relaxed))
}
