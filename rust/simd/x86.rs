//! x86-64 vectors: SSE (always), AVX and AVX-512F when enabled at build time.
//!
//! Every load and store checks the slice length before touching memory, so
//! the safe API cannot read or write out of bounds. Aligned variants also
//! check the alignment.
#![allow(unused_unsafe)]

use core::arch::x86_64::*;
use core::ops::{Add, Div, Mul, Neg, Sub};

use super::SimdVector;

macro_rules! impl_binary_ops {
    ($name:ident, $add:ident, $sub:ident, $mul:ident, $div:ident) => {
        impl Add for $name {
            type Output = Self;
            #[inline(always)]
            fn add(self, rhs: Self) -> Self {
                Self(unsafe { $add(self.0, rhs.0) })
            }
        }
        impl Sub for $name {
            type Output = Self;
            #[inline(always)]
            fn sub(self, rhs: Self) -> Self {
                Self(unsafe { $sub(self.0, rhs.0) })
            }
        }
        impl Mul for $name {
            type Output = Self;
            #[inline(always)]
            fn mul(self, rhs: Self) -> Self {
                Self(unsafe { $mul(self.0, rhs.0) })
            }
        }
        impl Div for $name {
            type Output = Self;
            #[inline(always)]
            fn div(self, rhs: Self) -> Self {
                Self(unsafe { $div(self.0, rhs.0) })
            }
        }
    };
}

#[inline(always)]
fn check_aligned<T>(ptr: *const T, bytes: usize) {
    assert!(
        ptr as usize % bytes == 0,
        "aligned vector access on a misaligned address"
    );
}

// region: SSE

/// Four `f32` lanes in an SSE register.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct F32x4(pub __m128);

impl_binary_ops!(F32x4, _mm_add_ps, _mm_sub_ps, _mm_mul_ps, _mm_div_ps);

impl Neg for F32x4 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self(unsafe { _mm_xor_ps(self.0, _mm_set1_ps(-0.0)) })
    }
}

impl SimdVector for F32x4 {
    type Scalar = f32;
    const LANES: usize = 4;

    #[inline(always)]
    fn splat(value: f32) -> Self {
        Self(unsafe { _mm_set1_ps(value) })
    }

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm_setzero_ps() })
    }

    #[inline(always)]
    fn load(src: &[f32]) -> Self {
        assert!(src.len() >= 4);
        Self(unsafe { _mm_loadu_ps(src.as_ptr()) })
    }

    #[inline(always)]
    fn load_aligned(src: &[f32]) -> Self {
        assert!(src.len() >= 4);
        check_aligned(src.as_ptr(), 16);
        Self(unsafe { _mm_load_ps(src.as_ptr()) })
    }

    #[inline(always)]
    fn store(self, dst: &mut [f32]) {
        assert!(dst.len() >= 4);
        unsafe { _mm_storeu_ps(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn store_aligned(self, dst: &mut [f32]) {
        assert!(dst.len() >= 4);
        check_aligned(dst.as_ptr(), 16);
        unsafe { _mm_store_ps(dst.as_mut_ptr(), self.0) }
    }

    /// Three-wide rows are written as one 64-bit store plus one scalar store.
    #[inline(always)]
    fn store_partial(self, dst: &mut [f32]) {
        let ptr = dst.as_mut_ptr();
        unsafe {
            match dst.len() {
                0 => {}
                1 => _mm_store_ss(ptr, self.0),
                2 => _mm_storel_epi64(ptr as *mut __m128i, _mm_castps_si128(self.0)),
                3 => {
                    _mm_storel_epi64(ptr as *mut __m128i, _mm_castps_si128(self.0));
                    _mm_store_ss(ptr.add(2), _mm_movehl_ps(self.0, self.0));
                }
                _ => _mm_storeu_ps(ptr, self.0),
            }
        }
    }

    #[cfg(target_feature = "fma")]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm_fmadd_ps(self.0, a.0, b.0) })
    }

    #[cfg(not(target_feature = "fma"))]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm_add_ps(_mm_mul_ps(self.0, a.0), b.0) })
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(unsafe { _mm_andnot_ps(_mm_set1_ps(-0.0), self.0) })
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(unsafe { _mm_sqrt_ps(self.0) })
    }

    #[inline(always)]
    fn reduce_sum(self) -> f32 {
        unsafe {
            let high = _mm_movehl_ps(self.0, self.0);
            let pairs = _mm_add_ps(self.0, high);
            let second = _mm_shuffle_ps::<0b01>(pairs, pairs);
            _mm_cvtss_f32(_mm_add_ss(pairs, second))
        }
    }
}

/// Two `f64` lanes in an SSE2 register.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct F64x2(pub __m128d);

impl_binary_ops!(F64x2, _mm_add_pd, _mm_sub_pd, _mm_mul_pd, _mm_div_pd);

impl Neg for F64x2 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self(unsafe { _mm_xor_pd(self.0, _mm_set1_pd(-0.0)) })
    }
}

impl SimdVector for F64x2 {
    type Scalar = f64;
    const LANES: usize = 2;

    #[inline(always)]
    fn splat(value: f64) -> Self {
        Self(unsafe { _mm_set1_pd(value) })
    }

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm_setzero_pd() })
    }

    #[inline(always)]
    fn load(src: &[f64]) -> Self {
        assert!(src.len() >= 2);
        Self(unsafe { _mm_loadu_pd(src.as_ptr()) })
    }

    #[inline(always)]
    fn load_aligned(src: &[f64]) -> Self {
        assert!(src.len() >= 2);
        check_aligned(src.as_ptr(), 16);
        Self(unsafe { _mm_load_pd(src.as_ptr()) })
    }

    #[inline(always)]
    fn store(self, dst: &mut [f64]) {
        assert!(dst.len() >= 2);
        unsafe { _mm_storeu_pd(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn store_aligned(self, dst: &mut [f64]) {
        assert!(dst.len() >= 2);
        check_aligned(dst.as_ptr(), 16);
        unsafe { _mm_store_pd(dst.as_mut_ptr(), self.0) }
    }

    #[cfg(target_feature = "fma")]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm_fmadd_pd(self.0, a.0, b.0) })
    }

    #[cfg(not(target_feature = "fma"))]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm_add_pd(_mm_mul_pd(self.0, a.0), b.0) })
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(unsafe { _mm_andnot_pd(_mm_set1_pd(-0.0), self.0) })
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(unsafe { _mm_sqrt_pd(self.0) })
    }

    #[inline(always)]
    fn reduce_sum(self) -> f64 {
        unsafe { _mm_cvtsd_f64(_mm_add_sd(self.0, _mm_unpackhi_pd(self.0, self.0))) }
    }
}

// endregion: SSE

// region: AVX

/// Eight `f32` lanes in an AVX register.
#[cfg(target_feature = "avx")]
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct F32x8(pub __m256);

#[cfg(target_feature = "avx")]
impl_binary_ops!(F32x8, _mm256_add_ps, _mm256_sub_ps, _mm256_mul_ps, _mm256_div_ps);

#[cfg(target_feature = "avx")]
impl Neg for F32x8 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self(unsafe { _mm256_xor_ps(self.0, _mm256_set1_ps(-0.0)) })
    }
}

#[cfg(target_feature = "avx")]
impl SimdVector for F32x8 {
    type Scalar = f32;
    const LANES: usize = 8;

    #[inline(always)]
    fn splat(value: f32) -> Self {
        Self(unsafe { _mm256_set1_ps(value) })
    }

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm256_setzero_ps() })
    }

    #[inline(always)]
    fn load(src: &[f32]) -> Self {
        assert!(src.len() >= 8);
        Self(unsafe { _mm256_loadu_ps(src.as_ptr()) })
    }

    #[inline(always)]
    fn load_aligned(src: &[f32]) -> Self {
        assert!(src.len() >= 8);
        check_aligned(src.as_ptr(), 32);
        Self(unsafe { _mm256_load_ps(src.as_ptr()) })
    }

    #[inline(always)]
    fn store(self, dst: &mut [f32]) {
        assert!(dst.len() >= 8);
        unsafe { _mm256_storeu_ps(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn store_aligned(self, dst: &mut [f32]) {
        assert!(dst.len() >= 8);
        check_aligned(dst.as_ptr(), 32);
        unsafe { _mm256_store_ps(dst.as_mut_ptr(), self.0) }
    }

    #[cfg(target_feature = "fma")]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm256_fmadd_ps(self.0, a.0, b.0) })
    }

    #[cfg(not(target_feature = "fma"))]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm256_add_ps(_mm256_mul_ps(self.0, a.0), b.0) })
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(unsafe { _mm256_andnot_ps(_mm256_set1_ps(-0.0), self.0) })
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(unsafe { _mm256_sqrt_ps(self.0) })
    }

    #[inline(always)]
    fn reduce_sum(self) -> f32 {
        let (low, high) = unsafe {
            (
                _mm256_castps256_ps128(self.0),
                _mm256_extractf128_ps::<1>(self.0),
            )
        };
        (F32x4(low) + F32x4(high)).reduce_sum()
    }
}

/// Four `f64` lanes in an AVX register.
#[cfg(target_feature = "avx")]
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct F64x4(pub __m256d);

#[cfg(target_feature = "avx")]
impl_binary_ops!(F64x4, _mm256_add_pd, _mm256_sub_pd, _mm256_mul_pd, _mm256_div_pd);

#[cfg(target_feature = "avx")]
impl Neg for F64x4 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self(unsafe { _mm256_xor_pd(self.0, _mm256_set1_pd(-0.0)) })
    }
}

#[cfg(target_feature = "avx")]
impl SimdVector for F64x4 {
    type Scalar = f64;
    const LANES: usize = 4;

    #[inline(always)]
    fn splat(value: f64) -> Self {
        Self(unsafe { _mm256_set1_pd(value) })
    }

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm256_setzero_pd() })
    }

    #[inline(always)]
    fn load(src: &[f64]) -> Self {
        assert!(src.len() >= 4);
        Self(unsafe { _mm256_loadu_pd(src.as_ptr()) })
    }

    #[inline(always)]
    fn load_aligned(src: &[f64]) -> Self {
        assert!(src.len() >= 4);
        check_aligned(src.as_ptr(), 32);
        Self(unsafe { _mm256_load_pd(src.as_ptr()) })
    }

    #[inline(always)]
    fn store(self, dst: &mut [f64]) {
        assert!(dst.len() >= 4);
        unsafe { _mm256_storeu_pd(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn store_aligned(self, dst: &mut [f64]) {
        assert!(dst.len() >= 4);
        check_aligned(dst.as_ptr(), 32);
        unsafe { _mm256_store_pd(dst.as_mut_ptr(), self.0) }
    }

    /// Three-wide rows are written as one 128-bit store plus one scalar store.
    #[inline(always)]
    fn store_partial(self, dst: &mut [f64]) {
        let ptr = dst.as_mut_ptr();
        unsafe {
            let low = _mm256_castpd256_pd128(self.0);
            match dst.len() {
                0 => {}
                1 => _mm_store_sd(ptr, low),
                2 => _mm_storeu_pd(ptr, low),
                3 => {
                    _mm_storeu_pd(ptr, low);
                    _mm_store_sd(ptr.add(2), _mm256_extractf128_pd::<1>(self.0));
                }
                _ => _mm256_storeu_pd(ptr, self.0),
            }
        }
    }

    #[cfg(target_feature = "fma")]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm256_fmadd_pd(self.0, a.0, b.0) })
    }

    #[cfg(not(target_feature = "fma"))]
    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm256_add_pd(_mm256_mul_pd(self.0, a.0), b.0) })
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(unsafe { _mm256_andnot_pd(_mm256_set1_pd(-0.0), self.0) })
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(unsafe { _mm256_sqrt_pd(self.0) })
    }

    #[inline(always)]
    fn reduce_sum(self) -> f64 {
        let (low, high) = unsafe {
            (
                _mm256_castpd256_pd128(self.0),
                _mm256_extractf128_pd::<1>(self.0),
            )
        };
        (F64x2(low) + F64x2(high)).reduce_sum()
    }
}

// endregion: AVX

// region: AVX-512

/// Sixteen `f32` lanes in an AVX-512 register.
#[cfg(target_feature = "avx512f")]
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct F32x16(pub __m512);

#[cfg(target_feature = "avx512f")]
impl_binary_ops!(F32x16, _mm512_add_ps, _mm512_sub_ps, _mm512_mul_ps, _mm512_div_ps);

#[cfg(target_feature = "avx512f")]
impl Neg for F32x16 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self(unsafe { _mm512_sub_ps(_mm512_set1_ps(-0.0), self.0) })
    }
}

#[cfg(target_feature = "avx512f")]
impl SimdVector for F32x16 {
    type Scalar = f32;
    const LANES: usize = 16;

    #[inline(always)]
    fn splat(value: f32) -> Self {
        Self(unsafe { _mm512_set1_ps(value) })
    }

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm512_setzero_ps() })
    }

    #[inline(always)]
    fn load(src: &[f32]) -> Self {
        assert!(src.len() >= 16);
        Self(unsafe { _mm512_loadu_ps(src.as_ptr()) })
    }

    #[inline(always)]
    fn load_aligned(src: &[f32]) -> Self {
        assert!(src.len() >= 16);
        check_aligned(src.as_ptr(), 64);
        Self(unsafe { _mm512_load_ps(src.as_ptr()) })
    }

    #[inline(always)]
    fn store(self, dst: &mut [f32]) {
        assert!(dst.len() >= 16);
        unsafe { _mm512_storeu_ps(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn store_aligned(self, dst: &mut [f32]) {
        assert!(dst.len() >= 16);
        check_aligned(dst.as_ptr(), 64);
        unsafe { _mm512_store_ps(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm512_fmadd_ps(self.0, a.0, b.0) })
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(unsafe { _mm512_abs_ps(self.0) })
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(unsafe { _mm512_sqrt_ps(self.0) })
    }

    #[inline(always)]
    fn reduce_sum(self) -> f32 {
        unsafe { _mm512_reduce_add_ps(self.0) }
    }
}

/// Eight `f64` lanes in an AVX-512 register.
#[cfg(target_feature = "avx512f")]
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct F64x8(pub __m512d);

#[cfg(target_feature = "avx512f")]
impl_binary_ops!(F64x8, _mm512_add_pd, _mm512_sub_pd, _mm512_mul_pd, _mm512_div_pd);

#[cfg(target_feature = "avx512f")]
impl Neg for F64x8 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self(unsafe { _mm512_sub_pd(_mm512_set1_pd(-0.0), self.0) })
    }
}

#[cfg(target_feature = "avx512f")]
impl SimdVector for F64x8 {
    type Scalar = f64;
    const LANES: usize = 8;

    #[inline(always)]
    fn splat(value: f64) -> Self {
        Self(unsafe { _mm512_set1_pd(value) })
    }

    #[inline(always)]
    fn zero() -> Self {
        Self(unsafe { _mm512_setzero_pd() })
    }

    #[inline(always)]
    fn load(src: &[f64]) -> Self {
        assert!(src.len() >= 8);
        Self(unsafe { _mm512_loadu_pd(src.as_ptr()) })
    }

    #[inline(always)]
    fn load_aligned(src: &[f64]) -> Self {
        assert!(src.len() >= 8);
        check_aligned(src.as_ptr(), 64);
        Self(unsafe { _mm512_load_pd(src.as_ptr()) })
    }

    #[inline(always)]
    fn store(self, dst: &mut [f64]) {
        assert!(dst.len() >= 8);
        unsafe { _mm512_storeu_pd(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn store_aligned(self, dst: &mut [f64]) {
        assert!(dst.len() >= 8);
        check_aligned(dst.as_ptr(), 64);
        unsafe { _mm512_store_pd(dst.as_mut_ptr(), self.0) }
    }

    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(unsafe { _mm512_fmadd_pd(self.0, a.0, b.0) })
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(unsafe { _mm512_abs_pd(self.0) })
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(unsafe { _mm512_sqrt_pd(self.0) })
    }

    #[inline(always)]
    fn reduce_sum(self) -> f64 {
        unsafe { _mm512_reduce_add_pd(self.0) }
    }
}

// endregion: AVX-512

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_reduce_and_partial_store() {
        let v = F32x4::load(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(v.reduce_sum(), 10.0);

        let mut row = [0.0f32; 4];
        v.store_partial(&mut row[..3]);
        assert_eq!(row, [1.0, 2.0, 3.0, 0.0]);

        let d = F64x2::load(&[2.5, -4.0]);
        assert_eq!(d.abs().reduce_sum(), 6.5);
        assert_eq!((-d).lane(1), 4.0);
    }

    #[cfg(target_feature = "avx")]
    #[test]
    fn avx_three_wide_store() {
        let v = F64x4::load(&[1.0, 2.0, 3.0, 4.0]);
        let mut row = [9.0f64; 4];
        v.store_partial(&mut row[..3]);
        assert_eq!(row, [1.0, 2.0, 3.0, 9.0]);
        assert_eq!(v.reduce_sum(), 10.0);
    }
}
