//! SIMD-optimized f64 kernels for factor scoring
//!
//! Factor files carry double precision values, so every kernel here works on
//! `f64`. x86_64 gets an AVX2+FMA path selected at runtime; every other target
//! uses a four-lane scalar loop that LLVM vectorizes on its own.
//!
//! Both paths always use unaligned loads. Scores for one (query, item) pair
//! must not depend on where the allocator placed either slice, otherwise the
//! exact scan and the ball tree could disagree on near-ties.
//!
//! | Platform     | ISA      | Width            | Functions used                  |
//! |--------------|----------|------------------|---------------------------------|
//! | x86_64+AVX2  | AVX2+FMA | 256-bit (4×f64)  | `_mm256_fmadd_pd`, `_mm256_sub_pd` |
//! | other        | scalar   | 4 accumulators   | unrolled iterator               |

// ============================================================================
// x86_64 AVX2 intrinsics (runtime feature detection)
// ============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn hsum_pd(acc: std::arch::x86_64::__m256d) -> f64 {
    use std::arch::x86_64::*;

    let hi = _mm256_extractf128_pd(acc, 1);
    let lo = _mm256_castpd256_pd128(acc);
    let sum128 = _mm_add_pd(lo, hi);
    let shuf = _mm_unpackhi_pd(sum128, sum128);
    _mm_cvtsd_f64(_mm_add_sd(sum128, shuf))
}

/// AVX2+FMA dot product: 4 doubles per iteration
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn dot_avx2(a: &[f64], b: &[f64]) -> f64 {
    use std::arch::x86_64::*;

    let n = a.len();
    let chunks = n / 4;

    let mut acc = _mm256_setzero_pd();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let va = _mm256_loadu_pd(a_ptr.add(i * 4));
        let vb = _mm256_loadu_pd(b_ptr.add(i * 4));
        acc = _mm256_fmadd_pd(va, vb, acc);
    }

    let mut sum = hsum_pd(acc);
    for i in (chunks * 4)..n {
        sum += a[i] * b[i];
    }
    sum
}

/// AVX2+FMA squared L2 distance: 4 doubles per iteration
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn l2_squared_avx2(a: &[f64], b: &[f64]) -> f64 {
    use std::arch::x86_64::*;

    let n = a.len();
    let chunks = n / 4;

    let mut acc = _mm256_setzero_pd();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let va = _mm256_loadu_pd(a_ptr.add(i * 4));
        let vb = _mm256_loadu_pd(b_ptr.add(i * 4));
        let diff = _mm256_sub_pd(va, vb);
        acc = _mm256_fmadd_pd(diff, diff, acc);
    }

    let mut sum = hsum_pd(acc);
    for i in (chunks * 4)..n {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

// ============================================================================
// Scalar fallback
// ============================================================================

#[inline]
fn dot_scalar(a: &[f64], b: &[f64]) -> f64 {
    let mut lanes = [0.0f64; 4];
    let mut a_chunks = a.chunks_exact(4);
    let mut b_chunks = b.chunks_exact(4);
    for (ca, cb) in (&mut a_chunks).zip(&mut b_chunks) {
        for lane in 0..4 {
            lanes[lane] += ca[lane] * cb[lane];
        }
    }
    let tail: f64 = a_chunks
        .remainder()
        .iter()
        .zip(b_chunks.remainder())
        .map(|(x, y)| x * y)
        .sum();
    (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]) + tail
}

#[inline]
fn l2_squared_scalar(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

// ============================================================================
// Public dispatch functions
// ============================================================================

/// Dot product of two equal-length vectors.
#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { dot_avx2(a, b) };
        }
    }

    #[allow(unreachable_code)]
    dot_scalar(a, b)
}

/// Squared Euclidean distance ||a - b||².
#[inline(always)]
pub fn l2_distance_squared(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Vector length mismatch");

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { l2_squared_avx2(a, b) };
        }
    }

    #[allow(unreachable_code)]
    l2_squared_scalar(a, b)
}

/// Euclidean distance ||a - b||.
#[inline(always)]
pub fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    l2_distance_squared(a, b).sqrt()
}

/// Squared Euclidean norm ||v||².
#[inline]
pub fn norm_squared(v: &[f64]) -> f64 {
    dot(v, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_basic() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        assert!((dot(&a, &b) - 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_dot_with_remainder() {
        // 5 elements exercises both the vector body and the tail
        let a = [1.0, 0.5, -2.0, 3.0, 4.0];
        let b = [2.0, 2.0, 1.0, 1.0, 0.25];
        let expected: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_dot_matches_scalar_on_long_vectors() {
        let a: Vec<f64> = (0..257).map(|i| (i as f64).sin()).collect();
        let b: Vec<f64> = (0..257).map(|i| (i as f64 * 0.5).cos()).collect();
        assert!((dot(&a, &b) - dot_scalar(&a, &b)).abs() < 1e-9);
    }

    #[test]
    fn test_dot_empty() {
        assert_eq!(dot(&[], &[]), 0.0);
    }

    #[test]
    fn test_score_with_bias_multiplier() {
        // [1.0, u] · [bias, f] == bias + u·f
        let user = [1.0, 0.5];
        let item = [9.0, 0.3];
        assert!((dot(&user, &item) - 9.15).abs() < 1e-12);
    }

    #[test]
    fn test_l2_distance() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0];
        assert!((l2_distance(&a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_l2_distance_squared_symmetry() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        assert_eq!(l2_distance_squared(&a, &b), l2_distance_squared(&b, &a));
        assert!((l2_distance_squared(&a, &b) - 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_norm_squared() {
        assert!((norm_squared(&[3.0, 4.0]) - 25.0).abs() < 1e-12);
    }
}
