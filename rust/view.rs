//! Fixed-range strided windows into rank-1 and rank-2 tensors.
//!
//! A view is described entirely by const generics: the extents of the tensor
//! it looks into, plus a `FIRST..LAST` half-open range and a `STEP` for every
//! axis. Out-of-range descriptors are rejected when the view type is
//! instantiated, not at run time.
//!
//! Views created from a `&Tensor` are read-only. Views created from
//! [`TensorCells`] are writable and may overlap each other. When the source
//! of an assignment reads the same elements a view destination writes, the
//! caller raises the destination's sticky alias flag with
//! [`View1::aliased`]; the assignment then goes through a temporary and
//! lowers the flag again.

use core::cell::Cell;

use crate::expression::{impl_expression_operators, Expression};
use crate::scalars::Element;
use crate::shape::{span, Dim1, Dim2, Rank1, Rank2};
use crate::simd::{SimdVector, MAX_LANES};
use crate::tensor::{Matrix, Tensor, TensorCells, Vector};

// region: Backing

/// Storage a view reads from.
pub trait Backing: Copy {
    type Scalar: Element;

    fn len(&self) -> usize;

    fn read(&self, offset: usize) -> Self::Scalar;

    /// Start address of the storage, used for alias detection.
    fn address(&self) -> *const ();

    /// Reads `V::LANES` contiguous elements starting at `offset`.
    #[inline(always)]
    fn load<V: SimdVector<Scalar = Self::Scalar>>(&self, offset: usize) -> V {
        V::from_fn(|lane| self.read(offset + lane))
    }
}

/// Storage a view can also write into.
pub trait BackingMut: Backing {
    fn write(&self, offset: usize, value: Self::Scalar);

    /// Writes all lanes of `value` contiguously starting at `offset`.
    #[inline(always)]
    fn store<V: SimdVector<Scalar = Self::Scalar>>(&self, offset: usize, value: V) {
        let mut buffer = [Self::Scalar::ZERO; MAX_LANES];
        value.store(&mut buffer);
        for (lane, &x) in buffer[..V::LANES].iter().enumerate() {
            self.write(offset + lane, x);
        }
    }
}

impl<'a, T: Element> Backing for &'a [T] {
    type Scalar = T;

    #[inline(always)]
    fn len(&self) -> usize {
        <[T]>::len(self)
    }

    #[inline(always)]
    fn read(&self, offset: usize) -> T {
        self[offset]
    }

    #[inline(always)]
    fn address(&self) -> *const () {
        self.as_ptr() as *const ()
    }

    #[inline(always)]
    fn load<V: SimdVector<Scalar = T>>(&self, offset: usize) -> V {
        V::load(&self[offset..])
    }
}

impl<'a, T: Element> Backing for &'a [Cell<T>] {
    type Scalar = T;

    #[inline(always)]
    fn len(&self) -> usize {
        <[Cell<T>]>::len(self)
    }

    #[inline(always)]
    fn read(&self, offset: usize) -> T {
        self[offset].get()
    }

    #[inline(always)]
    fn address(&self) -> *const () {
        self.as_ptr() as *const ()
    }
}

impl<'a, T: Element> BackingMut for &'a [Cell<T>] {
    #[inline(always)]
    fn write(&self, offset: usize, value: T) {
        self[offset].set(value)
    }
}

// endregion: Backing

// region: View1

/// Elements `FIRST, FIRST + STEP, ...` below `LAST` of an `N`-element vector.
#[derive(Debug, Clone, Copy)]
pub struct View1<B, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize> {
    base: B,
    aliased: bool,
}

impl<B: Backing, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize>
    View1<B, N, FIRST, LAST, STEP>
{
    const VALID: () = assert!(
        STEP > 0 && FIRST <= LAST && LAST <= N,
        "view range out of bounds"
    );

    /// Number of selected elements.
    pub const LEN: usize = span(FIRST, LAST, STEP);

    #[inline(always)]
    pub(crate) fn new(base: B) -> Self {
        let () = Self::VALID;
        debug_assert_eq!(base.len(), N);
        Self {
            base,
            aliased: false,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        Self::LEN
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        Self::LEN == 0
    }

    /// Offset in the underlying vector of the `index`-th selected element.
    #[inline(always)]
    pub const fn offset(index: usize) -> usize {
        FIRST + STEP * index
    }

    #[inline]
    pub fn get(&self, index: usize) -> B::Scalar {
        assert!(index < Self::LEN, "view index {} out of bounds", index);
        self.base.read(Self::offset(index))
    }

    /// Raises the alias flag: the next assignment into this view evaluates
    /// through a temporary. The flag is lowered by that assignment.
    pub fn aliased(&mut self) -> &mut Self {
        self.aliased = true;
        self
    }

    pub fn is_aliased(&self) -> bool {
        self.aliased
    }

    #[inline(always)]
    pub(crate) fn lower_alias_flag(&mut self) -> bool {
        core::mem::take(&mut self.aliased)
    }

    #[inline(always)]
    pub(crate) fn base_address(&self) -> *const () {
        self.base.address()
    }

    #[inline(always)]
    pub(crate) fn read_chunk<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize) -> V {
        if STEP == 1 {
            self.base.load(FIRST + index)
        } else {
            V::from_fn(|lane| self.base.read(Self::offset(index + lane)))
        }
    }
}

impl<B: BackingMut, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize>
    View1<B, N, FIRST, LAST, STEP>
{
    #[inline]
    pub fn set(&self, index: usize, value: B::Scalar) {
        assert!(index < Self::LEN, "view index {} out of bounds", index);
        self.base.write(Self::offset(index), value)
    }

    #[inline(always)]
    pub(crate) fn write_chunk<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize, value: V) {
        if STEP == 1 {
            self.base.store(FIRST + index, value)
        } else {
            let mut buffer = [B::Scalar::ZERO; MAX_LANES];
            value.store(&mut buffer);
            for (lane, &x) in buffer[..V::LANES].iter().enumerate() {
                self.base.write(Self::offset(index + lane), x);
            }
        }
    }

    /// Copies the whole underlying vector into an owned tensor.
    pub(crate) fn snapshot_base(&self) -> Vector<B::Scalar, N> {
        let mut out = Vector::zeros();
        for (offset, slot) in out.as_mut_slice().iter_mut().enumerate() {
            *slot = self.base.read(offset);
        }
        out
    }

    /// Writes the selected elements of `src` back through this view.
    pub(crate) fn copy_selection_from(&self, src: &Vector<B::Scalar, N>) {
        for index in 0..Self::LEN {
            let offset = Self::offset(index);
            self.base.write(offset, src.as_slice()[offset]);
        }
    }
}

impl<'v, B: Backing, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize> Expression
    for &'v View1<B, N, FIRST, LAST, STEP>
{
    type Scalar = B::Scalar;
    type Rank = Rank1;

    #[inline(always)]
    fn size(&self) -> usize {
        View1::<B, N, FIRST, LAST, STEP>::LEN
    }

    #[inline(always)]
    fn dimension(&self, _axis: usize) -> usize {
        View1::<B, N, FIRST, LAST, STEP>::LEN
    }

    #[inline(always)]
    fn eval_scalar(&self, index: usize) -> B::Scalar {
        self.base.read(View1::<B, N, FIRST, LAST, STEP>::offset(index))
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize) -> V {
        self.read_chunk(index)
    }

    fn aliases(&self, address: *const ()) -> bool {
        self.base.address() == address
    }
}

impl<T: Element, const N: usize> Tensor<T, Dim1<N>> {
    /// Read-only view of elements `FIRST..LAST` stepping by `STEP`.
    pub fn view<const FIRST: usize, const LAST: usize, const STEP: usize>(
        &self,
    ) -> View1<&[T], N, FIRST, LAST, STEP> {
        View1::new(self.as_slice())
    }
}

impl<'a, T: Element, const N: usize> TensorCells<'a, T, Dim1<N>> {
    /// Writable view of elements `FIRST..LAST` stepping by `STEP`.
    pub fn view<const FIRST: usize, const LAST: usize, const STEP: usize>(
        &self,
    ) -> View1<&'a [Cell<T>], N, FIRST, LAST, STEP> {
        View1::new(self.as_cells())
    }
}

// endregion: View1

// region: View2

/// Rows `F0..L0` stepping by `S0` and columns `F1..L1` stepping by `S1` of an
/// `M×N` matrix. Elements are visited in row-major order.
#[derive(Debug, Clone, Copy)]
pub struct View2<
    B,
    const M: usize,
    const N: usize,
    const F0: usize,
    const L0: usize,
    const S0: usize,
    const F1: usize,
    const L1: usize,
    const S1: usize,
> {
    base: B,
    aliased: bool,
}

impl<
        B: Backing,
        const M: usize,
        const N: usize,
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize,
    > View2<B, M, N, F0, L0, S0, F1, L1, S1>
{
    const VALID: () = assert!(
        S0 > 0 && S1 > 0 && F0 <= L0 && L0 <= M && F1 <= L1 && L1 <= N,
        "view range out of bounds"
    );

    pub const ROWS: usize = span(F0, L0, S0);
    pub const COLS: usize = span(F1, L1, S1);
    pub const LEN: usize = Self::ROWS * Self::COLS;

    #[inline(always)]
    pub(crate) fn new(base: B) -> Self {
        let () = Self::VALID;
        debug_assert_eq!(base.len(), M * N);
        Self {
            base,
            aliased: false,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        Self::LEN
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        Self::LEN == 0
    }

    /// Offset in the underlying matrix of the `index`-th selected element.
    #[inline(always)]
    pub const fn offset(index: usize) -> usize {
        let row = index / Self::COLS;
        let col = index % Self::COLS;
        (F0 + S0 * row) * N + F1 + S1 * col
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> B::Scalar {
        assert!(row < Self::ROWS && col < Self::COLS, "view index [{}, {}] out of bounds", row, col);
        self.base.read(Self::offset(row * Self::COLS + col))
    }

    /// Raises the alias flag: the next assignment into this view evaluates
    /// through a temporary. The flag is lowered by that assignment.
    pub fn aliased(&mut self) -> &mut Self {
        self.aliased = true;
        self
    }

    pub fn is_aliased(&self) -> bool {
        self.aliased
    }

    #[inline(always)]
    pub(crate) fn lower_alias_flag(&mut self) -> bool {
        core::mem::take(&mut self.aliased)
    }

    #[inline(always)]
    pub(crate) fn base_address(&self) -> *const () {
        self.base.address()
    }

    #[inline(always)]
    pub(crate) fn read_chunk<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize) -> V {
        if S1 == 1 && index % Self::COLS + V::LANES <= Self::COLS {
            self.base.load(Self::offset(index))
        } else {
            V::from_fn(|lane| self.base.read(Self::offset(index + lane)))
        }
    }
}

impl<
        B: BackingMut,
        const M: usize,
        const N: usize,
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize,
    > View2<B, M, N, F0, L0, S0, F1, L1, S1>
{
    #[inline]
    pub fn set(&self, row: usize, col: usize, value: B::Scalar) {
        assert!(row < Self::ROWS && col < Self::COLS, "view index [{}, {}] out of bounds", row, col);
        self.base.write(Self::offset(row * Self::COLS + col), value)
    }

    #[inline(always)]
    pub(crate) fn write_chunk<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize, value: V) {
        if S1 == 1 && index % Self::COLS + V::LANES <= Self::COLS {
            self.base.store(Self::offset(index), value)
        } else {
            let mut buffer = [B::Scalar::ZERO; MAX_LANES];
            value.store(&mut buffer);
            for (lane, &x) in buffer[..V::LANES].iter().enumerate() {
                self.base.write(Self::offset(index + lane), x);
            }
        }
    }

    pub(crate) fn snapshot_base(&self) -> Matrix<B::Scalar, M, N> {
        let mut out = Matrix::zeros();
        for (offset, slot) in out.as_mut_slice().iter_mut().enumerate() {
            *slot = self.base.read(offset);
        }
        out
    }

    pub(crate) fn copy_selection_from(&self, src: &Matrix<B::Scalar, M, N>) {
        for index in 0..Self::LEN {
            let offset = Self::offset(index);
            self.base.write(offset, src.as_slice()[offset]);
        }
    }
}

impl<
        'v,
        B: Backing,
        const M: usize,
        const N: usize,
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize,
    > Expression for &'v View2<B, M, N, F0, L0, S0, F1, L1, S1>
{
    type Scalar = B::Scalar;
    type Rank = Rank2;

    #[inline(always)]
    fn size(&self) -> usize {
        View2::<B, M, N, F0, L0, S0, F1, L1, S1>::LEN
    }

    #[inline(always)]
    fn dimension(&self, axis: usize) -> usize {
        [
            View2::<B, M, N, F0, L0, S0, F1, L1, S1>::ROWS,
            View2::<B, M, N, F0, L0, S0, F1, L1, S1>::COLS,
        ][axis]
    }

    #[inline(always)]
    fn eval_scalar(&self, index: usize) -> B::Scalar {
        self.base
            .read(View2::<B, M, N, F0, L0, S0, F1, L1, S1>::offset(index))
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize) -> V {
        self.read_chunk(index)
    }

    fn aliases(&self, address: *const ()) -> bool {
        self.base.address() == address
    }
}

impl<T: Element, const M: usize, const N: usize> Tensor<T, Dim2<M, N>> {
    /// Read-only view of rows `F0..L0` by `S0` and columns `F1..L1` by `S1`.
    #[allow(clippy::type_complexity)]
    pub fn view2<
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize,
    >(
        &self,
    ) -> View2<&[T], M, N, F0, L0, S0, F1, L1, S1> {
        View2::new(self.as_slice())
    }
}

impl<'a, T: Element, const M: usize, const N: usize> TensorCells<'a, T, Dim2<M, N>> {
    /// Writable view of rows `F0..L0` by `S0` and columns `F1..L1` by `S1`.
    #[allow(clippy::type_complexity)]
    pub fn view2<
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize,
    >(
        &self,
    ) -> View2<&'a [Cell<T>], M, N, F0, L0, S0, F1, L1, S1> {
        View2::new(self.as_cells())
    }
}

// endregion: View2

impl_expression_operators!(
    ['v, B: Backing, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize]
    &'v View1<B, N, FIRST, LAST, STEP>
);
impl_expression_operators!(
    [
        'v,
        B: Backing,
        const M: usize,
        const N: usize,
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize
    ]
    &'v View2<B, M, N, F0, L0, S0, F1, L1, S1>
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::Packed;

    #[test]
    fn strided_view_sizes_and_offsets() {
        let v = Vector::<f64, 10>::arange();
        let every_third = v.view::<1, 10, 3>();
        assert_eq!(every_third.len(), 3);
        assert_eq!(every_third.get(0), 1.0);
        assert_eq!(every_third.get(2), 7.0);

        let empty = v.view::<4, 4, 1>();
        assert!(empty.is_empty());

        let expr = &every_third;
        assert_eq!(expr.size(), 3);
        let chunk: Packed<f64, 2> = expr.eval_vector(1);
        assert_eq!(chunk.0, [4.0, 7.0]);
    }

    #[test]
    fn contiguous_view_loads_directly() {
        let v = Vector::<f32, 8>::arange();
        let window = v.view::<2, 7, 1>();
        let chunk: Packed<f32, 4> = (&window).eval_vector(0);
        assert_eq!(chunk.0, [2.0, 3.0, 4.0, 5.0]);
        assert_eq!((&window).eval_scalar(4), 6.0);
    }

    #[test]
    fn matrix_view_walks_rows() {
        let m = Matrix::<f64, 4, 5>::arange();
        let block = m.view2::<1, 3, 1, 0, 5, 2>();
        assert_eq!(View2::<&[f64], 4, 5, 1, 3, 1, 0, 5, 2>::ROWS, 2);
        assert_eq!(block.len(), 6);
        assert_eq!(block.get(0, 0), 5.0);
        assert_eq!(block.get(1, 2), 14.0);

        let expr = &block;
        assert_eq!(expr.dimension(0), 2);
        assert_eq!(expr.dimension(1), 3);
        let chunk: Packed<f64, 4> = expr.eval_vector(1);
        assert_eq!(chunk.0, [7.0, 9.0, 10.0, 12.0]);

        let interior = m.view2::<1, 3, 1, 1, 4, 1>();
        let row: Packed<f64, 2> = (&interior).eval_vector(0);
        assert_eq!(row.0, [6.0, 7.0]);
        let straddling: Packed<f64, 2> = (&interior).eval_vector(2);
        assert_eq!(straddling.0, [8.0, 11.0]);
    }

    #[test]
    fn writable_views_share_storage() {
        let mut t = Vector::<f32, 6>::zeros();
        let cells = t.cells();
        let evens = cells.view::<0, 6, 2>();
        let odds = cells.view::<1, 6, 2>();
        evens.set(1, 3.0);
        odds.set(2, 5.0);
        odds.write_chunk(0, Packed::<f32, 2>([7.0, 8.0]));
        assert_eq!(t.as_slice(), &[0.0, 7.0, 3.0, 8.0, 0.0, 5.0]);
    }

    #[test]
    fn alias_flag_is_sticky_until_taken() {
        let mut t = Vector::<f64, 4>::zeros();
        let cells = t.cells();
        let mut view = cells.view::<0, 3, 1>();
        assert!(!view.is_aliased());
        view.aliased();
        assert!(view.is_aliased());
        assert!(view.lower_alias_flag());
        assert!(!view.is_aliased());
    }

    #[test]
    fn views_report_their_base_address() {
        let t = Vector::<f64, 4>::zeros();
        let other = Vector::<f64, 4>::zeros();
        let view = t.view::<1, 3, 1>();
        assert!((&view).aliases(t.as_ptr() as *const ()));
        assert!(!(&view).aliases(other.as_ptr() as *const ()));
        let expr = &view + &view * 2.0;
        assert!(expr.aliases(t.as_ptr() as *const ()));
    }
}
