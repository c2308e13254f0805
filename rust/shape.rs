//! Compile-time shape markers and stride metadata.
//!
//! Every tensor carries its rank and per-axis extents in its type through a
//! [`Shape`] marker such as [`Dim2<3, 3>`]. The marker also picks the nested
//! array used as storage, so a `Tensor<f32, Dim2<3, 3>>` owns a plain
//! `[[f32; 3]; 3]` with no heap allocation.
//!
//! The "stride" here is the SIMD chunk width of an element type, the unit the
//! assignment loop uses to split work into a vectorised body and a scalar tail.

use core::fmt::Debug;

use crate::scalars::Element;
use crate::simd::SimdVector;

/// Highest rank supported by the shape markers.
pub const MAX_RANK: usize = 4;

mod private {
    pub trait Sealed {}
}

// region: Rank Markers

/// Type-level rank. Assignments require the source and destination ranks to
/// be the same type, so rank disagreements are rejected at compile time.
pub trait Rank: private::Sealed + Copy + Debug + 'static {
    const VALUE: usize;
}

/// Rank of broadcast scalar operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank0;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank1;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank2;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank3;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank4;

/// Rank of an elementwise node combining operands of ranks `Self` and `Rhs`.
/// Equal ranks combine to themselves; a scalar combines with anything.
pub trait Broadcast<Rhs: Rank>: Rank {
    type Output: Rank;
}

impl private::Sealed for Rank0 {}
impl Rank for Rank0 {
    const VALUE: usize = 0;
}
impl Broadcast<Rank0> for Rank0 {
    type Output = Rank0;
}

macro_rules! impl_rank {
    ($name:ident, $value:expr) => {
        impl private::Sealed for $name {}
        impl Rank for $name {
            const VALUE: usize = $value;
        }
        impl Broadcast<$name> for $name {
            type Output = $name;
        }
        impl Broadcast<Rank0> for $name {
            type Output = $name;
        }
        impl Broadcast<$name> for Rank0 {
            type Output = $name;
        }
    };
}

impl_rank!(Rank1, 1);
impl_rank!(Rank2, 2);
impl_rank!(Rank3, 3);
impl_rank!(Rank4, 4);

// endregion: Rank Markers

// region: Shape Markers

/// Compile-time extents of a dense tensor.
pub trait Shape: Copy + Debug + Default + 'static {
    type Rank: Rank;
    /// Multi-index type, `[usize; RANK]`.
    type Index: Copy + Debug;
    /// Row-major nested array holding `SIZE` elements.
    type Buffer<T: Element>: Copy + Debug + PartialEq;

    /// Per-axis extents, outermost first.
    const DIMS: &'static [usize];
    /// Total number of elements.
    const SIZE: usize;

    fn filled<T: Element>(value: T) -> Self::Buffer<T>;
    fn flat<T: Element>(buffer: &Self::Buffer<T>) -> &[T];
    fn flat_mut<T: Element>(buffer: &mut Self::Buffer<T>) -> &mut [T];

    /// Row-major linear offset of `index`, or `None` when out of bounds.
    fn offset(index: Self::Index) -> Option<usize>;
}

/// Rank-1 shape of `N` elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim1<const N: usize>;

/// Rank-2 shape of `M` rows and `N` columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim2<const M: usize, const N: usize>;

/// Rank-3 shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim3<const M: usize, const N: usize, const P: usize>;

/// Rank-4 shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dim4<const M: usize, const N: usize, const P: usize, const Q: usize>;

impl<const N: usize> Shape for Dim1<N> {
    type Rank = Rank1;
    type Index = [usize; 1];
    type Buffer<T: Element> = [T; N];

    const DIMS: &'static [usize] = &[N];
    const SIZE: usize = N;

    #[inline(always)]
    fn filled<T: Element>(value: T) -> [T; N] {
        [value; N]
    }

    #[inline(always)]
    fn flat<T: Element>(buffer: &[T; N]) -> &[T] {
        buffer
    }

    #[inline(always)]
    fn flat_mut<T: Element>(buffer: &mut [T; N]) -> &mut [T] {
        buffer
    }

    #[inline(always)]
    fn offset([i]: [usize; 1]) -> Option<usize> {
        (i < N).then_some(i)
    }
}

impl<const M: usize, const N: usize> Shape for Dim2<M, N> {
    type Rank = Rank2;
    type Index = [usize; 2];
    type Buffer<T: Element> = [[T; N]; M];

    const DIMS: &'static [usize] = &[M, N];
    const SIZE: usize = M * N;

    #[inline(always)]
    fn filled<T: Element>(value: T) -> [[T; N]; M] {
        [[value; N]; M]
    }

    #[inline(always)]
    fn flat<T: Element>(buffer: &[[T; N]; M]) -> &[T] {
        buffer.as_flattened()
    }

    #[inline(always)]
    fn flat_mut<T: Element>(buffer: &mut [[T; N]; M]) -> &mut [T] {
        buffer.as_flattened_mut()
    }

    #[inline(always)]
    fn offset([i, j]: [usize; 2]) -> Option<usize> {
        (i < M && j < N).then_some(i * N + j)
    }
}

impl<const M: usize, const N: usize, const P: usize> Shape for Dim3<M, N, P> {
    type Rank = Rank3;
    type Index = [usize; 3];
    type Buffer<T: Element> = [[[T; P]; N]; M];

    const DIMS: &'static [usize] = &[M, N, P];
    const SIZE: usize = M * N * P;

    #[inline(always)]
    fn filled<T: Element>(value: T) -> [[[T; P]; N]; M] {
        [[[value; P]; N]; M]
    }

    #[inline(always)]
    fn flat<T: Element>(buffer: &[[[T; P]; N]; M]) -> &[T] {
        buffer.as_flattened().as_flattened()
    }

    #[inline(always)]
    fn flat_mut<T: Element>(buffer: &mut [[[T; P]; N]; M]) -> &mut [T] {
        buffer.as_flattened_mut().as_flattened_mut()
    }

    #[inline(always)]
    fn offset([i, j, k]: [usize; 3]) -> Option<usize> {
        (i < M && j < N && k < P).then_some((i * N + j) * P + k)
    }
}

impl<const M: usize, const N: usize, const P: usize, const Q: usize> Shape for Dim4<M, N, P, Q> {
    type Rank = Rank4;
    type Index = [usize; 4];
    type Buffer<T: Element> = [[[[T; Q]; P]; N]; M];

    const DIMS: &'static [usize] = &[M, N, P, Q];
    const SIZE: usize = M * N * P * Q;

    #[inline(always)]
    fn filled<T: Element>(value: T) -> [[[[T; Q]; P]; N]; M] {
        [[[[value; Q]; P]; N]; M]
    }

    #[inline(always)]
    fn flat<T: Element>(buffer: &[[[[T; Q]; P]; N]; M]) -> &[T] {
        buffer.as_flattened().as_flattened().as_flattened()
    }

    #[inline(always)]
    fn flat_mut<T: Element>(buffer: &mut [[[[T; Q]; P]; N]; M]) -> &mut [T] {
        buffer
            .as_flattened_mut()
            .as_flattened_mut()
            .as_flattened_mut()
    }

    #[inline(always)]
    fn offset([i, j, k, l]: [usize; 4]) -> Option<usize> {
        (i < M && j < N && k < P && l < Q).then_some(((i * N + j) * P + k) * Q + l)
    }
}

// endregion: Shape Markers

// region: Stride Metadata

/// Product of the extents.
pub const fn size_of(dims: &[usize]) -> usize {
    let mut size = 1;
    let mut axis = 0;
    while axis < dims.len() {
        size *= dims[axis];
        axis += 1;
    }
    size
}

/// SIMD chunk width used for element type `T`.
pub const fn stride_of<T: Element>() -> usize {
    <T::Simd as SimdVector>::LANES
}

/// Largest multiple of `stride` not exceeding `size`.
pub const fn round_down(size: usize, stride: usize) -> usize {
    size - size % stride
}

/// Number of elements selected by the half-open range `first..last` stepping
/// by `step`.
pub const fn span(first: usize, last: usize, step: usize) -> usize {
    if last <= first {
        0
    } else {
        (last - first).div_ceil(step)
    }
}

/// Maps a row-major linear position to the offset of the same multi-index in
/// a column-major buffer with the same extents.
pub(crate) fn column_major_offset(dims: &[usize], row_major: usize) -> usize {
    let mut remaining = row_major;
    let mut index = [0usize; MAX_RANK];
    for axis in (0..dims.len()).rev() {
        index[axis] = remaining % dims[axis];
        remaining /= dims[axis];
    }
    let mut offset = 0;
    let mut stride = 1;
    for axis in 0..dims.len() {
        offset += index[axis] * stride;
        stride *= dims[axis];
    }
    offset
}

// endregion: Stride Metadata

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_and_dims() {
        assert_eq!(<Dim1<7> as Shape>::SIZE, 7);
        assert_eq!(<Dim2<3, 4> as Shape>::SIZE, 12);
        assert_eq!(<Dim3<2, 3, 4> as Shape>::DIMS, &[2, 3, 4]);
        assert_eq!(<Dim4<2, 2, 2, 2> as Shape>::SIZE, 16);
        assert_eq!(size_of(&[2, 3, 5]), 30);
        assert_eq!(<<Dim2<2, 2> as Shape>::Rank as Rank>::VALUE, 2);
    }

    #[test]
    fn offsets_are_row_major() {
        assert_eq!(Dim2::<3, 4>::offset([1, 2]), Some(6));
        assert_eq!(Dim2::<3, 4>::offset([3, 0]), None);
        assert_eq!(Dim3::<2, 3, 4>::offset([1, 2, 3]), Some(23));
        assert_eq!(Dim4::<2, 2, 2, 2>::offset([1, 0, 1, 1]), Some(11));
    }

    #[test]
    fn nested_buffers_flatten_in_order() {
        let buffer: [[f32; 3]; 2] = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(Dim2::<2, 3>::flat(&buffer), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let filled = Dim3::<2, 2, 2>::filled(9.0f64);
        assert!(Dim3::<2, 2, 2>::flat(&filled).iter().all(|&x| x == 9.0));
    }

    #[test]
    fn ranges() {
        assert_eq!(span(0, 3, 1), 3);
        assert_eq!(span(1, 8, 2), 4);
        assert_eq!(span(4, 4, 1), 0);
        assert_eq!(round_down(11, 4), 8);
        assert!(stride_of::<f32>() >= 1);
    }

    #[test]
    fn column_major_mapping() {
        // 2x3: row-major (0,1) is linear 1, column-major offset 0 + 1*2 = 2.
        assert_eq!(column_major_offset(&[2, 3], 1), 2);
        assert_eq!(column_major_offset(&[2, 3], 3), 1);
        assert_eq!(column_major_offset(&[2, 3], 5), 5);
    }
}
