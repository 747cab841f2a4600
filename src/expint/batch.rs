//! Batched E1 evaluation.
//!
//! The LSA gain law evaluates E1 over a whole frame's `v` vector at once, so
//! the batch entry point is the hot path. On x86/x86_64 an AVX2 kernel is
//! selected once at runtime via CPU feature detection; everywhere else (and
//! for block shapes the kernel hands back) the scalar engine runs per lane.
//! Every path shares the scalar regime constants, so batched and scalar
//! results agree to rounding.

use super::e1;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
cpufeatures::new!(cpuid_avx2, "avx2");

/// Evaluate `out[i] = E1(xs[i])` for every element.
///
/// Panics if the slices differ in length (programmer error, like any
/// mismatched scratch buffer).
pub fn e1_batch(xs: &[f64], out: &mut [f64]) {
    assert_eq!(xs.len(), out.len(), "e1_batch slice length mismatch");

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    if cpuid_avx2::get() {
        // Safety: AVX2 support was just confirmed at runtime.
        unsafe { super::x86::e1_blocks_avx2(xs, out) };
        return;
    }

    #[allow(unreachable_code)]
    e1_blocks_scalar(xs, out);
}

pub(crate) fn e1_blocks_scalar(xs: &[f64], out: &mut [f64]) {
    for (x, o) in xs.iter().zip(out.iter_mut()) {
        *o = e1(*x);
    }
}
