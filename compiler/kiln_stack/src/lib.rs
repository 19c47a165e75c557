//! Stack growth for the recursive compiler walks.
//!
//! The compiling visitor recurses once per nested expression and statement.
//! Generated kernels (unrolled math, long operator chains) can nest far
//! deeper than hand-written ones, so recursive entry points wrap their body
//! in [`ensure_sufficient_stack`].
//!
//! Native targets grow the stack with `stacker`; WASM calls through.

/// Remaining stack below which a new segment is allocated.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const SEGMENT_SIZE: usize = 2 * 1024 * 1024;

/// Run `f`, first growing the stack if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
