//! Element types accepted by tensors and kernels.
//!
//! - [`f32`] and [`f64`] use the native SIMD vectors of the build target and
//!   the shape-specialised matmul kernels.
//! - `half::f16` (feature `half`) goes through the portable single-lane vector
//!   and the generic blocked matmul.
//!
//! Each type fixes its default SIMD vector, the default tolerance used by the
//! tensor predicates, and the matmul dispatcher to use.

use core::fmt::{Debug, Display};
use core::ops::{Add, Div, Mul, Neg, Sub};

use crate::matmul::{self, ElementKind};
use crate::simd::{NativeF32, NativeF64, SimdVector};

/// Compatibility function for pre 1.85 Rust versions lacking `f32::abs` in `core`.
#[inline(always)]
pub(crate) fn f32_abs_compat(x: f32) -> f32 {
    f32::from_bits(x.to_bits() & 0x7FFF_FFFF)
}

/// Compatibility function for pre 1.85 Rust versions lacking `f64::abs` in `core`.
#[inline(always)]
pub(crate) fn f64_abs_compat(x: f64) -> f64 {
    f64::from_bits(x.to_bits() & 0x7FFF_FFFF_FFFF_FFFF)
}

// Fused multiply-add is only used when the target executes it in hardware.
// Elsewhere the product is rounded before the addition, in the same order.

#[cfg(all(feature = "std", any(target_feature = "fma", target_feature = "neon")))]
#[inline(always)]
fn fused_f32(a: f32, b: f32, c: f32) -> f32 {
    a.mul_add(b, c)
}

#[cfg(not(all(feature = "std", any(target_feature = "fma", target_feature = "neon"))))]
#[inline(always)]
fn fused_f32(a: f32, b: f32, c: f32) -> f32 {
    a * b + c
}

#[cfg(all(feature = "std", any(target_feature = "fma", target_feature = "neon")))]
#[inline(always)]
fn fused_f64(a: f64, b: f64, c: f64) -> f64 {
    a.mul_add(b, c)
}

#[cfg(not(all(feature = "std", any(target_feature = "fma", target_feature = "neon"))))]
#[inline(always)]
fn fused_f64(a: f64, b: f64, c: f64) -> f64 {
    a * b + c
}

// Sealed trait pattern to prevent external implementations
mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    #[cfg(feature = "half")]
    impl Sealed for half::f16 {}
}

/// A numeric element stored in tensors.
pub trait Element:
    private::Sealed
    + Copy
    + Default
    + PartialEq
    + PartialOrd
    + Debug
    + Display
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Widest SIMD vector enabled for this type in the current build.
    type Simd: SimdVector<Scalar = Self>;

    /// Key used by the matmul kernel selection table.
    const KIND: ElementKind;
    const ZERO: Self;
    const ONE: Self;
    /// Default tolerance of the tensor predicates.
    const TOLERANCE: f64;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn abs(self) -> Self;

    #[cfg(feature = "std")]
    fn sqrt(self) -> Self;

    /// Computes `self * a + b`, fused when the target has hardware FMA.
    fn mul_add(self, a: Self, b: Self) -> Self;

    /// Writes the `M×N` product of the row-major `M×K` matrix `a` and `K×N`
    /// matrix `b` into `out`, using the fastest kernel available for this type.
    #[inline]
    fn matmul_kernel<const M: usize, const K: usize, const N: usize>(
        a: &[Self],
        b: &[Self],
        out: &mut [Self],
    ) {
        matmul::kernels::blocked::<Self, M, K, N>(a, b, out)
    }
}

impl Element for f32 {
    type Simd = NativeF32;

    const KIND: ElementKind = ElementKind::F32;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TOLERANCE: f64 = 1e-6;

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn abs(self) -> Self {
        f32_abs_compat(self)
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        fused_f32(self, a, b)
    }

    #[inline]
    fn matmul_kernel<const M: usize, const K: usize, const N: usize>(
        a: &[Self],
        b: &[Self],
        out: &mut [Self],
    ) {
        matmul::dispatch::matmul_f32::<M, K, N>(a, b, out)
    }
}

impl Element for f64 {
    type Simd = NativeF64;

    const KIND: ElementKind = ElementKind::F64;
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const TOLERANCE: f64 = 1e-14;

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline(always)]
    fn abs(self) -> Self {
        f64_abs_compat(self)
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        fused_f64(self, a, b)
    }

    #[inline]
    fn matmul_kernel<const M: usize, const K: usize, const N: usize>(
        a: &[Self],
        b: &[Self],
        out: &mut [Self],
    ) {
        matmul::dispatch::matmul_f64::<M, K, N>(a, b, out)
    }
}

#[cfg(feature = "half")]
impl Element for half::f16 {
    type Simd = crate::simd::Packed<half::f16, 1>;

    const KIND: ElementKind = ElementKind::Other;
    const ZERO: Self = half::f16::ZERO;
    const ONE: Self = half::f16::ONE;
    const TOLERANCE: f64 = 1e-3;

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        half::f16::from_f64(value)
    }

    #[inline(always)]
    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }

    #[inline(always)]
    fn abs(self) -> Self {
        half::f16::from_bits(self.to_bits() & 0x7FFF)
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        half::f16::from_f32(self.to_f32().sqrt())
    }

    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        half::f16::from_f32(fused_f32(self.to_f32(), a.to_f32(), b.to_f32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_compat_clears_sign() {
        assert_eq!(f32_abs_compat(-2.5), 2.5);
        assert_eq!(f64_abs_compat(-0.0).to_bits(), 0.0f64.to_bits());
        assert_eq!(<f64 as Element>::abs(-7.0), 7.0);
    }

    #[test]
    fn conversions_through_f64() {
        assert_eq!(<f32 as Element>::from_f64(0.5), 0.5f32);
        assert_eq!(<f32 as Element>::to_f64(0.25), 0.25);
        assert_eq!(<f64 as Element>::KIND, ElementKind::F64);
    }

    #[test]
    fn mul_add_matches_on_exact_values() {
        assert_eq!(<f32 as Element>::mul_add(3.0, 4.0, 5.0), 17.0);
        assert_eq!(<f64 as Element>::mul_add(-2.0, 8.0, 1.0), -15.0);
    }

    #[cfg(feature = "half")]
    #[test]
    fn half_roundtrips_small_integers() {
        let x = <half::f16 as Element>::from_f64(3.0);
        assert_eq!(x.to_f64(), 3.0);
        assert_eq!(<half::f16 as Element>::abs(-x).to_f64(), 3.0);
    }
}
