//! Fixed-shape dense tensors.
//!
//! This module provides:
//!
//! - [`Tensor`]: stack-allocated, 64-byte aligned, rank and extents in the type
//! - [`Vector`] and [`Matrix`]: rank-1 and rank-2 aliases
//! - [`TensorCells`]: a shared handle whose views may overlap each other
//! - [`TensorError`]: the error type of fallible constructors and assignments
//!
//! # Example
//!
//! ```rust
//! use fixtensor::{Layout, Matrix};
//!
//! let a = Matrix::<f64, 2, 2>::from([[1.0, 2.0], [3.0, 4.0]]);
//! let b = Matrix::<f64, 2, 2>::try_from_slice(&[1.0, 3.0, 2.0, 4.0], Layout::ColumnMajor).unwrap();
//! assert!(a.is_equal(&b, 0.0));
//! ```

use core::cell::Cell;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

use crate::assign::Destination;
use crate::expression::Expression;
use crate::matmul;
use crate::scalars::{f64_abs_compat, Element};
use crate::shape::{column_major_offset, Dim1, Dim2, Rank, Shape, MAX_RANK};

/// Alignment of every tensor buffer, enough for the widest vector register.
pub const SIMD_ALIGNMENT: usize = 64;

// region: Error Types

/// Fixed-size shape descriptor for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeDescriptor {
    dims: [usize; MAX_RANK],
    ndim: usize,
}

impl ShapeDescriptor {
    /// Create from a slice (truncates if > MAX_RANK).
    pub fn from_slice(shape: &[usize]) -> Self {
        let mut dims = [0usize; MAX_RANK];
        let ndim = shape.len().min(MAX_RANK);
        dims[..ndim].copy_from_slice(&shape[..ndim]);
        Self { dims, ndim }
    }

    /// Return as a slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.dims[..self.ndim]
    }
}

impl core::fmt::Display for ShapeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[")?;
        for (i, &d) in self.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

/// Error type for tensor construction and assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Source and destination disagree in size or in a per-axis extent.
    /// Raised before anything is written.
    ShapeMismatch {
        expected: ShapeDescriptor,
        got: ShapeDescriptor,
    },
}

#[cfg(feature = "std")]
impl std::error::Error for TensorError {}

impl core::fmt::Display for TensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TensorError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {}, got {}", expected, got)
            }
        }
    }
}

// endregion: Error Types

// region: Tensor

/// Memory order of a raw buffer handed to [`Tensor::try_from_slice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// A dense tensor of element type `T` whose rank and extents are fixed by
/// the shape marker `S`. Storage is a nested array in row-major order.
#[derive(Clone, Copy, PartialEq)]
#[repr(C, align(64))]
pub struct Tensor<T: Element, S: Shape> {
    data: S::Buffer<T>,
}

/// Rank-1 tensor of `N` elements.
pub type Vector<T, const N: usize> = Tensor<T, Dim1<N>>;

/// Rank-2 tensor of `M` rows and `N` columns.
pub type Matrix<T, const M: usize, const N: usize> = Tensor<T, Dim2<M, N>>;

impl<T: Element, S: Shape> Tensor<T, S> {
    /// Tensor with every element equal to zero.
    #[inline]
    pub fn zeros() -> Self {
        Self {
            data: S::filled(T::ZERO),
        }
    }

    /// Broadcast-fills every element with `value`, a SIMD chunk at a time.
    pub fn splat(value: T) -> Self {
        let mut tensor = Self::zeros();
        tensor.fill(value);
        tensor
    }

    /// Overwrites every element with `value`.
    pub fn fill(&mut self, value: T) {
        use crate::simd::SimdVector;
        let lanes = <T::Simd as SimdVector>::LANES;
        let chunk = T::Simd::splat(value);
        let data = self.as_mut_slice();
        let body = data.len() - data.len() % lanes;
        for start in (0..body).step_by(lanes) {
            chunk.store_aligned(&mut data[start..]);
        }
        for slot in &mut data[body..] {
            *slot = value;
        }
    }

    /// Copies `data` into a new tensor. With [`Layout::ColumnMajor`] the
    /// buffer is read in column-major order and transposed into row-major
    /// storage.
    pub fn try_from_slice(data: &[T], layout: Layout) -> Result<Self, TensorError> {
        if data.len() != S::SIZE {
            return Err(TensorError::ShapeMismatch {
                expected: ShapeDescriptor::from_slice(S::DIMS),
                got: ShapeDescriptor::from_slice(&[data.len()]),
            });
        }
        let mut tensor = Self::zeros();
        match layout {
            Layout::RowMajor => tensor.as_mut_slice().copy_from_slice(data),
            Layout::ColumnMajor => {
                for (linear, slot) in tensor.as_mut_slice().iter_mut().enumerate() {
                    *slot = data[column_major_offset(S::DIMS, linear)];
                }
            }
        }
        Ok(tensor)
    }

    /// Evaluates `src` into a new tensor.
    pub fn try_from_expr<E>(src: E) -> Result<Self, TensorError>
    where
        E: Expression<Scalar = T, Rank = S::Rank>,
    {
        let mut tensor = Self::zeros();
        tensor.try_assign(src)?;
        Ok(tensor)
    }

    /// Evaluates `src` into a new tensor.
    ///
    /// # Panics
    ///
    /// Panics if the shape of `src` disagrees with `S`.
    pub fn from_expr<E>(src: E) -> Self
    where
        E: Expression<Scalar = T, Rank = S::Rank>,
    {
        Self::try_from_expr(src).expect("expression shape does not match the tensor")
    }

    /// Fills with `0, 1, 2, ...` in row-major order.
    pub fn arange() -> Self {
        let mut tensor = Self::zeros();
        for (i, slot) in tensor.as_mut_slice().iter_mut().enumerate() {
            *slot = T::from_f64(i as f64);
        }
        tensor
    }

    /// Per-axis extents.
    #[inline(always)]
    pub fn shape(&self) -> &'static [usize] {
        S::DIMS
    }

    /// Total number of elements.
    #[inline(always)]
    pub fn size(&self) -> usize {
        S::SIZE
    }

    #[inline(always)]
    pub fn rank(&self) -> usize {
        S::Rank::VALUE
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        S::flat(&self.data)
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        S::flat_mut(&mut self.data)
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const T {
        self.as_slice().as_ptr()
    }

    /// The nested array backing this tensor.
    #[inline(always)]
    pub fn as_array(&self) -> &S::Buffer<T> {
        &self.data
    }

    /// Element at a multi-index, or `None` when out of bounds.
    #[inline]
    pub fn get(&self, index: S::Index) -> Option<T> {
        S::offset(index).map(|offset| self.as_slice()[offset])
    }

    /// Converts every element through `f64` into `U`.
    pub fn cast<U: Element>(&self) -> Tensor<U, S> {
        let mut out = Tensor::<U, S>::zeros();
        for (dst, &src) in out.as_mut_slice().iter_mut().zip(self.as_slice()) {
            *dst = U::from_f64(src.to_f64());
        }
        out
    }

    /// Shared handle through which overlapping views of this tensor can be
    /// read and written within one statement.
    pub fn cells(&mut self) -> TensorCells<'_, T, S> {
        TensorCells {
            cells: Cell::from_mut(self.as_mut_slice()).as_slice_of_cells(),
            _shape: PhantomData,
        }
    }

    /// Returns `true` if every axis has the same extent.
    pub fn is_uniform(&self) -> bool {
        S::DIMS.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Returns `true` if `other` has the same rank and size and every element
    /// differs by at most `tolerance`.
    pub fn is_equal<S2: Shape>(&self, other: &Tensor<T, S2>, tolerance: f64) -> bool {
        if S::Rank::VALUE != S2::Rank::VALUE || S::SIZE != S2::SIZE {
            return false;
        }
        self.as_slice()
            .iter()
            .zip(other.as_slice())
            .all(|(&a, &b)| (a - b).abs().to_f64() <= tolerance)
    }
}

impl<T: Element, S: Shape> Default for Tensor<T, S> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<T: Element, S: Shape> core::fmt::Debug for Tensor<T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &S::DIMS)
            .field("data", &self.as_slice())
            .finish()
    }
}

impl<T: Element, const N: usize> From<[T; N]> for Tensor<T, Dim1<N>> {
    fn from(data: [T; N]) -> Self {
        Self { data }
    }
}

impl<T: Element, const M: usize, const N: usize> From<[[T; N]; M]> for Tensor<T, Dim2<M, N>> {
    fn from(data: [[T; N]; M]) -> Self {
        Self { data }
    }
}

impl<T: Element, const M: usize, const N: usize, const P: usize> From<[[[T; P]; N]; M]>
    for Tensor<T, crate::shape::Dim3<M, N, P>>
{
    fn from(data: [[[T; P]; N]; M]) -> Self {
        Self { data }
    }
}

impl<T: Element, S: Shape> Index<S::Index> for Tensor<T, S> {
    type Output = T;

    fn index(&self, index: S::Index) -> &T {
        match S::offset(index) {
            Some(offset) => &self.as_slice()[offset],
            None => panic!("index {:?} out of bounds for shape {:?}", index, S::DIMS),
        }
    }
}

impl<T: Element, S: Shape> IndexMut<S::Index> for Tensor<T, S> {
    fn index_mut(&mut self, index: S::Index) -> &mut T {
        match S::offset(index) {
            Some(offset) => &mut self.as_mut_slice()[offset],
            None => panic!("index {:?} out of bounds for shape {:?}", index, S::DIMS),
        }
    }
}

// endregion: Tensor

// region: Matrix Queries

impl<T: Element, const M: usize, const N: usize> Matrix<T, M, N> {
    pub fn transpose(&self) -> Matrix<T, N, M> {
        let mut out = Matrix::<T, N, M>::zeros();
        let src = self.as_slice();
        let dst = out.as_mut_slice();
        for i in 0..M {
            for j in 0..N {
                dst[j * M + i] = src[i * N + j];
            }
        }
        out
    }

    /// Returns `true` if the matrix is square and `a[i][j]` and `a[j][i]`
    /// differ by at most `tolerance` everywhere.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        if M != N {
            return false;
        }
        let data = self.as_slice();
        (0..N).all(|i| {
            (i + 1..N).all(|j| (data[i * N + j] - data[j * N + i]).abs().to_f64() <= tolerance)
        })
    }

    /// Returns `true` if the matrix is square and `AᵀA` equals the identity
    /// within the element type's default tolerance.
    pub fn is_orthogonal(&self) -> bool {
        if M != N {
            return false;
        }
        let product = matmul::matmul(&self.transpose(), self);
        product.as_slice().iter().enumerate().all(|(i, &x)| {
            let expected = if i / N == i % N { T::ONE } else { T::ZERO };
            (x - expected).abs().to_f64() <= T::TOLERANCE
        })
    }
}

impl<T: Element, const N: usize> Matrix<T, N, N> {
    /// The identity matrix.
    pub fn eye() -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            out.as_mut_slice()[i * N + i] = T::ONE;
        }
        out
    }

    /// Sum of the diagonal.
    pub fn trace(&self) -> T {
        let data = self.as_slice();
        (0..N).fold(T::ZERO, |acc, i| acc + data[i * N + i])
    }

    /// Determinant by LU decomposition with partial pivoting, accumulated in
    /// `f64`.
    pub fn determinant(&self) -> T {
        let mut lu = [[0.0f64; N]; N];
        for (i, row) in lu.iter_mut().enumerate() {
            for (j, slot) in row.iter_mut().enumerate() {
                *slot = self.as_slice()[i * N + j].to_f64();
            }
        }
        let mut det = 1.0f64;
        for col in 0..N {
            let mut pivot = col;
            for row in col + 1..N {
                if f64_abs_compat(lu[row][col]) > f64_abs_compat(lu[pivot][col]) {
                    pivot = row;
                }
            }
            if lu[pivot][col] == 0.0 {
                return T::ZERO;
            }
            if pivot != col {
                lu.swap(pivot, col);
                det = -det;
            }
            det *= lu[col][col];
            for row in col + 1..N {
                let factor = lu[row][col] / lu[col][col];
                for k in col..N {
                    lu[row][k] -= factor * lu[col][k];
                }
            }
        }
        T::from_f64(det)
    }

    /// Returns `true` if the trace vanishes within `tolerance`.
    pub fn is_deviatoric(&self, tolerance: f64) -> bool {
        self.trace().abs().to_f64() < tolerance
    }
}

impl<T: Element> Matrix<T, 3, 3> {
    /// Returns `true` for an orthogonal matrix with determinant one.
    pub fn does_belong_to_so3(&self, tolerance: f64) -> bool {
        self.is_orthogonal() && f64_abs_compat(self.determinant().to_f64() - 1.0) <= tolerance
    }

    /// Returns `true` for a matrix with determinant one.
    pub fn does_belong_to_sl3(&self, tolerance: f64) -> bool {
        f64_abs_compat(self.determinant().to_f64() - 1.0) <= tolerance
    }
}

// endregion: Matrix Queries

// region: TensorCells

/// A shared-reference handle over a tensor's elements.
///
/// Obtained from [`Tensor::cells`]. Several handles and views created from it
/// may refer to the same elements at once, so a statement such as "assign
/// elements `1..4` into elements `0..3`" can be written without `unsafe`.
/// Assigning into a `TensorCells` detects aliasing with the source expression
/// automatically.
pub struct TensorCells<'a, T: Element, S: Shape> {
    cells: &'a [Cell<T>],
    _shape: PhantomData<S>,
}

impl<T: Element, S: Shape> Clone for TensorCells<'_, T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element, S: Shape> Copy for TensorCells<'_, T, S> {}

impl<'a, T: Element, S: Shape> TensorCells<'a, T, S> {
    #[inline(always)]
    pub fn as_cells(&self) -> &'a [Cell<T>] {
        self.cells
    }

    /// Element at a row-major linear position.
    #[inline(always)]
    pub fn get(&self, index: usize) -> T {
        self.cells[index].get()
    }

    #[inline(always)]
    pub fn set(&self, index: usize, value: T) {
        self.cells[index].set(value)
    }

    /// Copies the current contents into an owned tensor.
    pub fn snapshot(&self) -> Tensor<T, S> {
        let mut out = Tensor::zeros();
        for (dst, src) in out.as_mut_slice().iter_mut().zip(self.cells) {
            *dst = src.get();
        }
        out
    }

    /// Overwrites every element with the contents of `src`.
    pub fn copy_from(&self, src: &Tensor<T, S>) {
        for (dst, &value) in self.cells.iter().zip(src.as_slice()) {
            dst.set(value);
        }
    }
}

impl<T: Element, S: Shape> core::fmt::Debug for TensorCells<'_, T, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TensorCells")
            .field("shape", &S::DIMS)
            .field("data", &self.snapshot().as_slice())
            .finish()
    }
}

// endregion: TensorCells
