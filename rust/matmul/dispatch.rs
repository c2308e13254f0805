//! Per-element-type kernel dispatch.
//!
//! The selection itself is [`select_kernel`]; this module maps each
//! selection to a concrete function and vector type for the build target.
//! Row-blocked kernels take the vector width [`best_width`] picks for the
//! output row.

use super::kernels;
#[allow(unused_imports)]
use super::micro;
use super::{select_kernel, ElementKind, KernelKind};
use crate::simd::{best_width, NativeF32, NativeF64, TIER};

#[cfg(target_arch = "x86_64")]
use crate::simd::x86;

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
use crate::simd::neon;

/// 128-bit vectors used by the row-blocked kernel for narrow rows.
#[cfg(target_arch = "x86_64")]
type Narrow32 = x86::F32x4;
#[cfg(target_arch = "x86_64")]
type Narrow64 = x86::F64x2;

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
type Narrow32 = neon::F32x4;
#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
type Narrow64 = neon::F64x2;

#[cfg(not(any(target_arch = "x86_64", all(target_arch = "aarch64", target_feature = "neon"))))]
type Narrow32 = crate::simd::Packed<f32, 4>;
#[cfg(not(any(target_arch = "x86_64", all(target_arch = "aarch64", target_feature = "neon"))))]
type Narrow64 = crate::simd::Packed<f64, 2>;

pub(crate) fn matmul_f32<const M: usize, const K: usize, const N: usize>(
    a: &[f32],
    b: &[f32],
    out: &mut [f32],
) {
    let kind = select_kernel(M, K, N, ElementKind::F32, TIER);
    log_trace!(kernel = kind.name(), m = M, k = K, n = N, "f32 matmul");
    match kind {
        KernelKind::Micro => micro_f32::<M, K, N>(a, b, out),
        KernelKind::RowBlocked => row_blocked_f32::<M, K, N>(a, b, out),
        KernelKind::MatVec => kernels::matvec::<f32, NativeF32, M, K>(a, b, out),
        KernelKind::Blocked => kernels::blocked::<f32, M, K, N>(a, b, out),
    }
}

pub(crate) fn matmul_f64<const M: usize, const K: usize, const N: usize>(
    a: &[f64],
    b: &[f64],
    out: &mut [f64],
) {
    let kind = select_kernel(M, K, N, ElementKind::F64, TIER);
    log_trace!(kernel = kind.name(), m = M, k = K, n = N, "f64 matmul");
    match kind {
        KernelKind::Micro => micro_f64::<M, K, N>(a, b, out),
        KernelKind::RowBlocked => row_blocked_f64::<M, K, N>(a, b, out),
        KernelKind::MatVec => kernels::matvec::<f64, NativeF64, M, K>(a, b, out),
        KernelKind::Blocked => kernels::blocked::<f64, M, K, N>(a, b, out),
    }
}

// region: Micro

fn micro_f32<const M: usize, const K: usize, const N: usize>(a: &[f32], b: &[f32], out: &mut [f32]) {
    match M {
        #[cfg(target_arch = "x86_64")]
        2 => micro::f32_222(a, b, out),
        #[cfg(target_arch = "x86_64")]
        3 => micro::f32_333(a, b, out),
        #[cfg(any(target_arch = "x86_64", all(target_arch = "aarch64", target_feature = "neon")))]
        4 => micro::f32_444(a, b, out),
        #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
        8 => micro::f32_888(a, b, out),
        _ => row_blocked_f32::<M, K, N>(a, b, out),
    }
}

fn micro_f64<const M: usize, const K: usize, const N: usize>(a: &[f64], b: &[f64], out: &mut [f64]) {
    match M {
        #[cfg(any(target_arch = "x86_64", all(target_arch = "aarch64", target_feature = "neon")))]
        2 => micro::f64_222(a, b, out),
        #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
        3 => micro::f64_333(a, b, out),
        #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
        4 => micro::f64_444(a, b, out),
        #[cfg(all(target_arch = "x86_64", target_feature = "avx512f"))]
        8 => micro::f64_888(a, b, out),
        _ => row_blocked_f64::<M, K, N>(a, b, out),
    }
}

// endregion: Micro

// region: Row Blocked

fn row_blocked_f32<const M: usize, const K: usize, const N: usize>(
    a: &[f32],
    b: &[f32],
    out: &mut [f32],
) {
    match best_width::<f32>(N) {
        #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
        8 => kernels::row_blocked::<f32, x86::F32x8, M, K, N>(a, b, out),
        _ => kernels::row_blocked::<f32, Narrow32, M, K, N>(a, b, out),
    }
}

fn row_blocked_f64<const M: usize, const K: usize, const N: usize>(
    a: &[f64],
    b: &[f64],
    out: &mut [f64],
) {
    match best_width::<f64>(N) {
        #[cfg(all(target_arch = "x86_64", target_feature = "avx512f"))]
        8 => kernels::row_blocked::<f64, x86::F64x8, M, K, N>(a, b, out),
        #[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
        4 => kernels::row_blocked::<f64, x86::F64x4, M, K, N>(a, b, out),
        _ => kernels::row_blocked::<f64, Narrow64, M, K, N>(a, b, out),
    }
}

// endregion: Row Blocked

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::tensor::Matrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // Calls the row-blocked path directly, whatever the build tier selects.
    #[test]
    fn row_blocked_paths_match_reference() {
        let mut rng = StdRng::seed_from_u64(11);

        let a = random_matrix::<f32, 8, 5>(&mut rng);
        let b = random_matrix::<f32, 5, 8>(&mut rng);
        let mut c = Matrix::<f32, 8, 8>::zeros();
        row_blocked_f32::<8, 5, 8>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (8, 5, 8), 1e-6);

        let a = random_matrix::<f64, 3, 6>(&mut rng);
        let b = random_matrix::<f64, 6, 3>(&mut rng);
        let mut c = Matrix::<f64, 3, 3>::zeros();
        row_blocked_f64::<3, 6, 3>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (3, 6, 3), 1e-12);

        let a = random_matrix::<f64, 8, 8>(&mut rng);
        let b = random_matrix::<f64, 8, 8>(&mut rng);
        let mut c = Matrix::<f64, 8, 8>::zeros();
        row_blocked_f64::<8, 8, 8>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (8, 8, 8), 1e-12);
    }

    #[test]
    fn row_blocked_covers_every_row_width() {
        let mut rng = StdRng::seed_from_u64(13);
        macro_rules! check {
            ($t:ty, $kernel:ident, $n:literal, $tolerance:expr) => {{
                let a = random_matrix::<$t, $n, 11>(&mut rng);
                let b = random_matrix::<$t, 11, $n>(&mut rng);
                let mut c = Matrix::<$t, $n, $n>::splat(<$t>::NAN);
                $kernel::<$n, 11, $n>(a.as_slice(), b.as_slice(), c.as_mut_slice());
                assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), ($n, 11, $n), $tolerance);
            }};
        }
        check!(f32, row_blocked_f32, 2, 1e-6);
        check!(f32, row_blocked_f32, 3, 1e-6);
        check!(f32, row_blocked_f32, 4, 1e-6);
        check!(f32, row_blocked_f32, 8, 1e-6);
        check!(f64, row_blocked_f64, 2, 1e-12);
        check!(f64, row_blocked_f64, 3, 1e-12);
        check!(f64, row_blocked_f64, 4, 1e-12);
        check!(f64, row_blocked_f64, 8, 1e-12);
    }

    #[test]
    fn micro_paths_match_reference() {
        let mut rng = StdRng::seed_from_u64(12);
        macro_rules! check {
            ($t:ty, $micro:ident, $n:literal, $tolerance:expr) => {{
                let a = random_matrix::<$t, $n, $n>(&mut rng);
                let b = random_matrix::<$t, $n, $n>(&mut rng);
                let mut c = Matrix::<$t, $n, $n>::zeros();
                $micro::<$n, $n, $n>(a.as_slice(), b.as_slice(), c.as_mut_slice());
                assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), ($n, $n, $n), $tolerance);
            }};
        }
        check!(f32, micro_f32, 2, 1e-6);
        check!(f32, micro_f32, 3, 1e-6);
        check!(f32, micro_f32, 4, 1e-6);
        check!(f32, micro_f32, 8, 1e-6);
        check!(f64, micro_f64, 2, 1e-12);
        check!(f64, micro_f64, 3, 1e-12);
        check!(f64, micro_f64, 4, 1e-12);
        check!(f64, micro_f64, 8, 1e-12);
    }
}
