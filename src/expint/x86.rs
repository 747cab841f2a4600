//! AVX2 block kernel for batched E1.
//!
//! Blocks of 4 `f64` lanes. A block is vectorized only when every lane falls
//! in the asymptotic regime on the same side of the extra-terms split, i.e.
//! when all lanes run the identical instruction sequence; mixed blocks and
//! the series/continued-fraction regimes use the scalar engine per lane.
//!
//! `exp` stays scalar per lane: only IEEE-exact mul/add/div are vectorized,
//! in the same operation order as [`super::e1_asymptotic`], so this path is
//! numerically interchangeable with the scalar one.

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use super::{e1, E1_ASYMPTOTIC_THRESHOLD, E1_EXTRA_TERMS_THRESHOLD};

const LANES: usize = 4;

/// Safety: caller must have confirmed AVX2 support.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn e1_blocks_avx2(xs: &[f64], out: &mut [f64]) {
    let mut chunks = xs.chunks_exact(LANES);
    let mut out_chunks = out.chunks_exact_mut(LANES);

    for (block, out_block) in (&mut chunks).zip(&mut out_chunks) {
        let all_asymptotic = block.iter().all(|&x| x > E1_ASYMPTOTIC_THRESHOLD);
        if all_asymptotic {
            let above_split = block[0] > E1_EXTRA_TERMS_THRESHOLD;
            if block
                .iter()
                .all(|&x| (x > E1_EXTRA_TERMS_THRESHOLD) == above_split)
            {
                e1_asymptotic_block(block, out_block, above_split);
                continue;
            }
        }
        for (x, o) in block.iter().zip(out_block.iter_mut()) {
            *o = e1(*x);
        }
    }

    for (x, o) in chunks.remainder().iter().zip(out_chunks.into_remainder()) {
        *o = e1(*x);
    }
}

/// Horner evaluation of e^{-x}/x * P(1/x) over one regime-uniform block.
#[target_feature(enable = "avx2")]
unsafe fn e1_asymptotic_block(block: &[f64], out_block: &mut [f64], extra_terms: bool) {
    debug_assert_eq!(block.len(), LANES);

    // exp has no AVX2 instruction; computing it scalar per lane keeps the
    // result identical to the scalar path.
    let exps = [
        (-block[0]).exp(),
        (-block[1]).exp(),
        (-block[2]).exp(),
        (-block[3]).exp(),
    ];

    let x = _mm256_loadu_pd(block.as_ptr());
    let u = _mm256_div_pd(_mm256_set1_pd(1.0), x);

    // Same Horner step order as the scalar e1_asymptotic.
    let mut p = if extra_terms {
        let t = _mm256_mul_pd(_mm256_set1_pd(-120.0), u);
        let t = _mm256_add_pd(t, _mm256_set1_pd(24.0));
        let t = _mm256_mul_pd(t, u);
        let t = _mm256_sub_pd(t, _mm256_set1_pd(6.0));
        let t = _mm256_mul_pd(t, u);
        _mm256_add_pd(t, _mm256_set1_pd(2.0))
    } else {
        let t = _mm256_mul_pd(_mm256_set1_pd(-6.0), u);
        _mm256_add_pd(t, _mm256_set1_pd(2.0))
    };
    p = _mm256_mul_pd(p, u);
    p = _mm256_sub_pd(p, _mm256_set1_pd(1.0));
    p = _mm256_mul_pd(p, u);
    p = _mm256_add_pd(p, _mm256_set1_pd(1.0));

    let e = _mm256_loadu_pd(exps.as_ptr());
    let result = _mm256_mul_pd(_mm256_mul_pd(e, u), p);
    _mm256_storeu_pd(out_block.as_mut_ptr(), result);
}
