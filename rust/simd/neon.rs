//! aarch64 Advanced SIMD vectors. NEON has no alignment requirements and
//! always fuses multiply-add.
#![allow(unused_unsafe)]

use core::arch::aarch64::*;
use core::ops::{Add, Div, Mul, Neg, Sub};

use super::SimdVector;

macro_rules! impl_neon {
    (
        $name:ident, $register:ty, $scalar:ty, $lanes:expr,
        dup = $dup:ident, load = $load:ident, store = $store:ident,
        add = $add:ident, sub = $sub:ident, mul = $mul:ident, div = $div:ident,
        neg = $neg:ident, abs = $abs:ident, sqrt = $sqrt:ident, fma = $fma:ident,
        sum = $sum:ident
    ) => {
        #[derive(Debug, Clone, Copy)]
        #[repr(transparent)]
        pub struct $name(pub $register);

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

        impl Neg for $name {
            type Output = Self;
            #[inline(always)]
            fn neg(self) -> Self {
                Self(unsafe { $neg(self.0) })
            }
        }

        impl SimdVector for $name {
            type Scalar = $scalar;
            const LANES: usize = $lanes;

            #[inline(always)]
            fn splat(value: $scalar) -> Self {
                Self(unsafe { $dup(value) })
            }

            #[inline(always)]
            fn load(src: &[$scalar]) -> Self {
                assert!(src.len() >= $lanes);
                Self(unsafe { $load(src.as_ptr()) })
            }

            #[inline(always)]
            fn store(self, dst: &mut [$scalar]) {
                assert!(dst.len() >= $lanes);
                unsafe { $store(dst.as_mut_ptr(), self.0) }
            }

            #[inline(always)]
            fn mul_add(self, a: Self, b: Self) -> Self {
                Self(unsafe { $fma(b.0, self.0, a.0) })
            }

            #[inline(always)]
            fn abs(self) -> Self {
                Self(unsafe { $abs(self.0) })
            }

            #[cfg(feature = "std")]
            #[inline(always)]
            fn sqrt(self) -> Self {
                Self(unsafe { $sqrt(self.0) })
            }

            #[inline(always)]
            fn reduce_sum(self) -> $scalar {
                unsafe { $sum(self.0) }
            }
        }
    };
}

impl_neon!(
    F32x4, float32x4_t, f32, 4,
    dup = vdupq_n_f32, load = vld1q_f32, store = vst1q_f32,
    add = vaddq_f32, sub = vsubq_f32, mul = vmulq_f32, div = vdivq_f32,
    neg = vnegq_f32, abs = vabsq_f32, sqrt = vsqrtq_f32, fma = vfmaq_f32,
    sum = vaddvq_f32
);

impl_neon!(
    F64x2, float64x2_t, f64, 2,
    dup = vdupq_n_f64, load = vld1q_f64, store = vst1q_f64,
    add = vaddq_f64, sub = vsubq_f64, mul = vmulq_f64, div = vdivq_f64,
    neg = vnegq_f64, abs = vabsq_f64, sqrt = vsqrtq_f64, fma = vfmaq_f64,
    sum = vaddvq_f64
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neon_fma_and_sum() {
        let a = F32x4::load(&[1.0, 2.0, 3.0, 4.0]);
        let r = a.mul_add(F32x4::splat(2.0), F32x4::splat(1.0));
        assert_eq!(r.reduce_sum(), 24.0);
        assert_eq!(F64x2::splat(-3.0).abs().reduce_sum(), 6.0);
    }
}
