//! Fully unrolled square micro-kernels.
//!
//! Each kernel keeps one output row per register, broadcasts the elements of
//! the matching row of `a` and accumulates against the rows of `b` with fused
//! multiply-add where available. Operands are dense row-major slices of
//! exactly `n×n` elements.
#![allow(unused_unsafe)]

#[cfg(target_arch = "x86_64")]
pub(crate) use x86_kernels::*;

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
pub(crate) use neon_kernels::*;

#[cfg(target_arch = "x86_64")]
mod x86_kernels {
    use core::arch::x86_64::*;

    use crate::simd::x86::{F32x4, F64x2};
    #[cfg(target_feature = "avx")]
    use crate::simd::x86::{F32x8, F64x4};
    #[cfg(target_feature = "avx512f")]
    use crate::simd::x86::F64x8;
    use crate::simd::SimdVector;

    // region: SSE

    /// `2×2×2` in `f32`: the whole product fits one register.
    #[inline]
    pub(crate) fn f32_222(a: &[f32], b: &[f32], out: &mut [f32]) {
        let a = F32x4::load(&a[..4]);
        let b = F32x4::load(&b[..4]);
        // [a00, a00, a10, a10] and [a01, a01, a11, a11]
        let a_first = F32x4(unsafe { _mm_shuffle_ps::<0b10_10_00_00>(a.0, a.0) });
        let a_second = F32x4(unsafe { _mm_shuffle_ps::<0b11_11_01_01>(a.0, a.0) });
        // [b00, b01, b00, b01] and [b10, b11, b10, b11]
        let b_top = F32x4(unsafe { _mm_movelh_ps(b.0, b.0) });
        let b_bottom = F32x4(unsafe { _mm_movehl_ps(b.0, b.0) });
        a_second
            .mul_add(b_bottom, a_first * b_top)
            .store(&mut out[..4]);
    }

    /// `3×3×3` in `f32`. Rows are written with overlapping four-lane stores
    /// in order, so each store's spare lane is overwritten by the next row;
    /// the last row uses a partial store.
    #[inline]
    pub(crate) fn f32_333(a: &[f32], b: &[f32], out: &mut [f32]) {
        assert!(a.len() >= 9 && b.len() >= 9 && out.len() >= 9);
        let b0 = F32x4::load(&b[0..]);
        let b1 = F32x4::load(&b[3..]);
        let b2 = F32x4::load_partial(&b[6..9]);
        let row = |i: usize| {
            let acc = F32x4::splat(a[3 * i]) * b0;
            let acc = F32x4::splat(a[3 * i + 1]).mul_add(b1, acc);
            F32x4::splat(a[3 * i + 2]).mul_add(b2, acc)
        };
        row(0).store(&mut out[0..]);
        row(1).store(&mut out[3..]);
        row(2).store_partial(&mut out[6..9]);
    }

    /// `4×4×4` in `f32`, broadcasting lanes of each `a` row with shuffles.
    #[inline]
    pub(crate) fn f32_444(a: &[f32], b: &[f32], out: &mut [f32]) {
        assert!(a.len() >= 16 && b.len() >= 16 && out.len() >= 16);
        let b0 = F32x4::load(&b[0..]);
        let b1 = F32x4::load(&b[4..]);
        let b2 = F32x4::load(&b[8..]);
        let b3 = F32x4::load(&b[12..]);
        for i in 0..4 {
            let r = F32x4::load(&a[4 * i..]).0;
            let (x0, x1, x2, x3) = unsafe {
                (
                    F32x4(_mm_shuffle_ps::<0x00>(r, r)),
                    F32x4(_mm_shuffle_ps::<0x55>(r, r)),
                    F32x4(_mm_shuffle_ps::<0xAA>(r, r)),
                    F32x4(_mm_shuffle_ps::<0xFF>(r, r)),
                )
            };
            let acc = x0 * b0;
            let acc = x1.mul_add(b1, acc);
            let acc = x2.mul_add(b2, acc);
            x3.mul_add(b3, acc).store(&mut out[4 * i..]);
        }
    }

    /// `2×2×2` in `f64`, one row per SSE2 register.
    #[inline]
    pub(crate) fn f64_222(a: &[f64], b: &[f64], out: &mut [f64]) {
        assert!(a.len() >= 4 && b.len() >= 4 && out.len() >= 4);
        let b0 = F64x2::load(&b[0..]);
        let b1 = F64x2::load(&b[2..]);
        let top = F64x2::splat(a[1]).mul_add(b1, F64x2::splat(a[0]) * b0);
        let bottom = F64x2::splat(a[3]).mul_add(b1, F64x2::splat(a[2]) * b0);
        top.store(&mut out[0..]);
        bottom.store(&mut out[2..]);
    }

    // endregion: SSE

    // region: AVX

    /// `8×8×8` in `f32`, one row per AVX register.
    #[cfg(target_feature = "avx")]
    #[inline]
    pub(crate) fn f32_888(a: &[f32], b: &[f32], out: &mut [f32]) {
        assert!(a.len() >= 64 && b.len() >= 64 && out.len() >= 64);
        let b_rows: [F32x8; 8] = core::array::from_fn(|k| F32x8::load(&b[8 * k..]));
        for i in 0..8 {
            let a_row = &a[8 * i..8 * i + 8];
            let mut acc = F32x8::splat(a_row[0]) * b_rows[0];
            for k in 1..8 {
                acc = F32x8::splat(a_row[k]).mul_add(b_rows[k], acc);
            }
            acc.store(&mut out[8 * i..]);
        }
    }

    /// `3×3×3` in `f64`. Rows 0 and 1 are written with overlapping
    /// four-lane stores in order; row 2 is split into a 128-bit and a scalar
    /// store.
    #[cfg(target_feature = "avx")]
    #[inline]
    pub(crate) fn f64_333(a: &[f64], b: &[f64], out: &mut [f64]) {
        assert!(a.len() >= 9 && b.len() >= 9 && out.len() >= 9);
        let b0 = F64x4::load(&b[0..]);
        let b1 = F64x4::load(&b[3..]);
        let b2 = F64x4::load_partial(&b[6..9]);
        let row = |i: usize| {
            let acc = F64x4::splat(a[3 * i]) * b0;
            let acc = F64x4::splat(a[3 * i + 1]).mul_add(b1, acc);
            F64x4::splat(a[3 * i + 2]).mul_add(b2, acc)
        };
        row(0).store(&mut out[0..]);
        row(1).store(&mut out[3..]);
        row(2).store_partial(&mut out[6..9]);
    }

    /// `4×4×4` in `f64`, one row per AVX register.
    #[cfg(target_feature = "avx")]
    #[inline]
    pub(crate) fn f64_444(a: &[f64], b: &[f64], out: &mut [f64]) {
        assert!(a.len() >= 16 && b.len() >= 16 && out.len() >= 16);
        let b_rows: [F64x4; 4] = core::array::from_fn(|k| F64x4::load(&b[4 * k..]));
        for i in 0..4 {
            let acc = F64x4::splat(a[4 * i]) * b_rows[0];
            let acc = F64x4::splat(a[4 * i + 1]).mul_add(b_rows[1], acc);
            let acc = F64x4::splat(a[4 * i + 2]).mul_add(b_rows[2], acc);
            F64x4::splat(a[4 * i + 3])
                .mul_add(b_rows[3], acc)
                .store(&mut out[4 * i..]);
        }
    }

    // endregion: AVX

    // region: AVX-512

    /// `8×8×8` in `f64`, one row per AVX-512 register.
    #[cfg(target_feature = "avx512f")]
    #[inline]
    pub(crate) fn f64_888(a: &[f64], b: &[f64], out: &mut [f64]) {
        assert!(a.len() >= 64 && b.len() >= 64 && out.len() >= 64);
        let b_rows: [F64x8; 8] = core::array::from_fn(|k| F64x8::load(&b[8 * k..]));
        for i in 0..8 {
            let a_row = &a[8 * i..8 * i + 8];
            let mut acc = F64x8::splat(a_row[0]) * b_rows[0];
            for k in 1..8 {
                acc = F64x8::splat(a_row[k]).mul_add(b_rows[k], acc);
            }
            acc.store(&mut out[8 * i..]);
        }
    }

    // endregion: AVX-512
}

#[cfg(all(target_arch = "aarch64", target_feature = "neon"))]
mod neon_kernels {
    use core::arch::aarch64::*;

    use crate::simd::neon::{F32x4, F64x2};
    use crate::simd::SimdVector;

    /// `4×4×4` in `f32`, multiplying `b` rows by lanes of the `a` row in
    /// place with `fmla` by element.
    #[inline]
    pub(crate) fn f32_444(a: &[f32], b: &[f32], out: &mut [f32]) {
        assert!(a.len() >= 16 && b.len() >= 16 && out.len() >= 16);
        let b0 = F32x4::load(&b[0..]).0;
        let b1 = F32x4::load(&b[4..]).0;
        let b2 = F32x4::load(&b[8..]).0;
        let b3 = F32x4::load(&b[12..]).0;
        for i in 0..4 {
            let r = F32x4::load(&a[4 * i..]).0;
            let acc = unsafe {
                let acc = vmulq_laneq_f32::<0>(b0, r);
                let acc = vfmaq_laneq_f32::<1>(acc, b1, r);
                let acc = vfmaq_laneq_f32::<2>(acc, b2, r);
                vfmaq_laneq_f32::<3>(acc, b3, r)
            };
            F32x4(acc).store(&mut out[4 * i..]);
        }
    }

    /// `2×2×2` in `f64`.
    #[inline]
    pub(crate) fn f64_222(a: &[f64], b: &[f64], out: &mut [f64]) {
        assert!(a.len() >= 4 && b.len() >= 4 && out.len() >= 4);
        let b0 = F64x2::load(&b[0..]).0;
        let b1 = F64x2::load(&b[2..]).0;
        for i in 0..2 {
            let r = F64x2::load(&a[2 * i..]).0;
            let acc = unsafe {
                let acc = vmulq_laneq_f64::<0>(b0, r);
                vfmaq_laneq_f64::<1>(acc, b1, r)
            };
            F64x2(acc).store(&mut out[2 * i..]);
        }
    }
}
