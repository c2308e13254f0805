//! Portable lane-array vector used by the serial tier and by element types
//! without native SIMD support.

use core::ops::{Add, Div, Mul, Neg, Sub};

use super::SimdVector;
use crate::scalars::Element;

/// `W` lanes of `T` stored as a plain array. Arithmetic is lane-wise and left
/// to the optimiser to vectorise.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct Packed<T, const W: usize>(pub [T; W]);

macro_rules! impl_lanewise {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Element, const W: usize> $trait for Packed<T, W> {
            type Output = Self;

            #[inline(always)]
            fn $method(self, rhs: Self) -> Self {
                Self(core::array::from_fn(|i| self.0[i] $op rhs.0[i]))
            }
        }
    };
}

impl_lanewise!(Add, add, +);
impl_lanewise!(Sub, sub, -);
impl_lanewise!(Mul, mul, *);
impl_lanewise!(Div, div, /);

impl<T: Element, const W: usize> Neg for Packed<T, W> {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        Self(self.0.map(|x| -x))
    }
}

impl<T: Element, const W: usize> SimdVector for Packed<T, W> {
    type Scalar = T;
    const LANES: usize = W;

    #[inline(always)]
    fn splat(value: T) -> Self {
        Self([value; W])
    }

    #[inline(always)]
    fn load(src: &[T]) -> Self {
        let mut lanes = [T::ZERO; W];
        lanes.copy_from_slice(&src[..W]);
        Self(lanes)
    }

    #[inline(always)]
    fn store(self, dst: &mut [T]) {
        dst[..W].copy_from_slice(&self.0);
    }

    #[inline(always)]
    fn load_partial(src: &[T]) -> Self {
        let mut lanes = [T::ZERO; W];
        lanes[..src.len()].copy_from_slice(src);
        Self(lanes)
    }

    #[inline(always)]
    fn store_partial(self, dst: &mut [T]) {
        let count = dst.len();
        dst.copy_from_slice(&self.0[..count]);
    }

    #[inline(always)]
    fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        Self(core::array::from_fn(f))
    }

    #[inline(always)]
    fn lane(self, index: usize) -> T {
        self.0[index]
    }

    #[inline(always)]
    fn mul_add(self, a: Self, b: Self) -> Self {
        Self(core::array::from_fn(|i| self.0[i].mul_add(a.0[i], b.0[i])))
    }

    #[inline(always)]
    fn abs(self) -> Self {
        Self(self.0.map(T::abs))
    }

    #[cfg(feature = "std")]
    #[inline(always)]
    fn sqrt(self) -> Self {
        Self(self.0.map(T::sqrt))
    }

    #[inline(always)]
    fn reduce_sum(self) -> T {
        self.0.iter().fold(T::ZERO, |acc, &x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanewise_arithmetic() {
        let a = Packed([1.0f32, 2.0, 3.0]);
        let b = Packed::<f32, 3>::splat(2.0);
        assert_eq!((a + b).0, [3.0, 4.0, 5.0]);
        assert_eq!((a * b).0, [2.0, 4.0, 6.0]);
        assert_eq!((a / b).0, [0.5, 1.0, 1.5]);
        assert_eq!((-a).abs().0, a.0);
        assert_eq!(a.reduce_sum(), 6.0);
    }

    #[test]
    fn partial_transfers() {
        let v = Packed::<f64, 4>::load_partial(&[7.0, 8.0]);
        assert_eq!(v.0, [7.0, 8.0, 0.0, 0.0]);
        let mut out = [0.0; 3];
        v.store_partial(&mut out[..2]);
        assert_eq!(out, [7.0, 8.0, 0.0]);
    }

    #[cfg(feature = "std")]
    #[test]
    fn sqrt_lanewise() {
        let v = Packed([4.0f64, 9.0]).sqrt();
        assert_eq!(v.0, [2.0, 3.0]);
    }
}
