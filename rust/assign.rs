//! The assignment protocol.
//!
//! Every write of an expression into storage goes through [`assign`]:
//!
//! 1. The source tree is checked for internally inconsistent operands, then
//!    against the destination: the sizes must agree, and in debug builds so
//!    must every per-axis extent. A mismatch returns
//!    [`TensorError::ShapeMismatch`] before any element is written.
//! 2. If the destination may be read while it is being written, the source
//!    is evaluated into a temporary copy of the destination, which is then
//!    copied back. Tensors and [`TensorCells`] detect this with
//!    [`does_alias`]; views take the caller-raised sticky flag.
//! 3. Otherwise the destination is walked once in row-major order, first in
//!    chunks of the element type's native SIMD width, then element by element
//!    for the remainder. The chunked phase is compiled in with the
//!    `vectorised-assign` feature and produces the same values as the
//!    element-wise loop.
//!
//! Scalar right-hand sides go through [`assign_scalar`]. Division by a scalar
//! multiplies by its reciprocal, so `x /= 3.0` may differ from `x[i] / 3.0`
//! in the last bit. The lazy `&x / 3.0` uses the same reciprocal, so the
//! compound and expanded forms agree exactly.

use crate::aliasing::does_alias;
use crate::expression::Expression;
use crate::scalars::Element;
use crate::shape::{round_down, Rank, Rank1, Rank2, Shape, MAX_RANK};
use crate::simd::SimdVector;
use crate::tensor::{ShapeDescriptor, Tensor, TensorCells, TensorError};
use crate::view::{BackingMut, View1, View2};

/// Whether the chunked phase of the assignment loop is compiled in.
pub const VECTORISED_ASSIGN: bool = cfg!(feature = "vectorised-assign");

/// The operator of an assignment: `=`, `+=`, `-=`, `*=` or `/=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    /// Combines the current destination element with the source element.
    #[inline(always)]
    pub fn apply_scalar<T: Element>(self, current: T, value: T) -> T {
        match self {
            AssignOp::Assign => value,
            AssignOp::Add => current + value,
            AssignOp::Sub => current - value,
            AssignOp::Mul => current * value,
            AssignOp::Div => current / value,
        }
    }

    #[inline(always)]
    pub fn apply_vector<V: SimdVector>(self, current: V, value: V) -> V {
        match self {
            AssignOp::Assign => value,
            AssignOp::Add => current + value,
            AssignOp::Sub => current - value,
            AssignOp::Mul => current * value,
            AssignOp::Div => current / value,
        }
    }
}

// region: Destination

/// Storage an expression can be assigned into.
pub trait Destination: Sized {
    type Scalar: Element;
    type Rank: Rank;

    /// Tensors and cell handles compare addresses with the source tree on
    /// every assignment. Views leave it to the caller.
    const DETECTS_ALIASING: bool = true;

    fn size(&self) -> usize;

    fn dimension(&self, axis: usize) -> usize;

    /// Start address of the underlying storage.
    fn address(&self) -> *const ();

    /// Lowers the sticky alias flag, returning whether it was raised.
    #[inline(always)]
    fn take_alias_flag(&mut self) -> bool {
        false
    }

    fn read(&self, index: usize) -> Self::Scalar;

    fn write(&mut self, index: usize, value: Self::Scalar);

    fn read_vector<V: SimdVector<Scalar = Self::Scalar>>(&self, index: usize) -> V;

    fn write_vector<V: SimdVector<Scalar = Self::Scalar>>(&mut self, index: usize, value: V);

    /// Evaluates `src` into a private copy of this destination's storage and
    /// copies the result back.
    fn assign_through_temporary<E>(
        &mut self,
        src: &E,
        op: AssignOp,
        vectorised: bool,
    ) -> Result<(), TensorError>
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>;

    fn shape(&self) -> ShapeDescriptor {
        let rank = Self::Rank::VALUE;
        let mut dims = [0usize; MAX_RANK];
        for (axis, dim) in dims[..rank].iter_mut().enumerate() {
            *dim = self.dimension(axis);
        }
        ShapeDescriptor::from_slice(&dims[..rank])
    }

    /// `self = src`.
    fn try_assign<E>(&mut self, src: E) -> Result<(), TensorError>
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>,
    {
        assign(self, &src, AssignOp::Assign)
    }

    /// `self += src`.
    fn try_add_assign<E>(&mut self, src: E) -> Result<(), TensorError>
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>,
    {
        assign(self, &src, AssignOp::Add)
    }

    /// `self -= src`.
    fn try_sub_assign<E>(&mut self, src: E) -> Result<(), TensorError>
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>,
    {
        assign(self, &src, AssignOp::Sub)
    }

    /// `self *= src`, elementwise.
    fn try_mul_assign<E>(&mut self, src: E) -> Result<(), TensorError>
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>,
    {
        assign(self, &src, AssignOp::Mul)
    }

    /// `self /= src`, elementwise.
    fn try_div_assign<E>(&mut self, src: E) -> Result<(), TensorError>
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>,
    {
        assign(self, &src, AssignOp::Div)
    }

    /// `self = src`.
    ///
    /// # Panics
    ///
    /// Panics if the shape of `src` disagrees with the destination.
    fn set_to<E>(&mut self, src: E)
    where
        E: Expression<Scalar = Self::Scalar, Rank = Self::Rank>,
    {
        self.try_assign(src)
            .expect("assignment source shape does not match the destination")
    }
}

/// Assigns `src` into `dst` with the compound operator `op`.
///
/// Returns [`TensorError::ShapeMismatch`], leaving `dst` untouched, if `src`
/// disagrees with `dst` in size or, in debug builds, in any per-axis extent.
pub fn assign<D, E>(dst: &mut D, src: &E, op: AssignOp) -> Result<(), TensorError>
where
    D: Destination,
    E: Expression<Scalar = D::Scalar, Rank = D::Rank>,
{
    assign_with_mode(dst, src, op, VECTORISED_ASSIGN)
}

pub(crate) fn assign_with_mode<D, E>(
    dst: &mut D,
    src: &E,
    op: AssignOp,
    vectorised: bool,
) -> Result<(), TensorError>
where
    D: Destination,
    E: Expression<Scalar = D::Scalar, Rank = D::Rank>,
{
    check_shapes(dst, src)?;

    // Non-short-circuiting so the flag is always lowered.
    let aliased = dst.take_alias_flag() | (D::DETECTS_ALIASING && does_alias(dst, src));
    if aliased {
        log_debug!(
            size = dst.size(),
            ?op,
            "destination aliases the source, evaluating through a temporary"
        );
        return dst.assign_through_temporary(src, op, vectorised);
    }

    let size = dst.size();
    let mut index = 0;
    if vectorised {
        let lanes = <<D::Scalar as Element>::Simd as SimdVector>::LANES;
        let body = round_down(size, lanes);
        while index < body {
            let value: <D::Scalar as Element>::Simd = src.eval_vector(index);
            let result = match op {
                AssignOp::Assign => value,
                _ => op.apply_vector(dst.read_vector(index), value),
            };
            dst.write_vector(index, result);
            index += lanes;
        }
    }
    while index < size {
        let value = src.eval_scalar(index);
        let result = match op {
            AssignOp::Assign => value,
            _ => op.apply_scalar(dst.read(index), value),
        };
        dst.write(index, result);
        index += 1;
    }
    Ok(())
}

fn check_shapes<D, E>(dst: &D, src: &E) -> Result<(), TensorError>
where
    D: Destination,
    E: Expression<Scalar = D::Scalar, Rank = D::Rank>,
{
    src.check_shape()?;
    let consistent = dst.size() == src.size()
        && (!cfg!(debug_assertions)
            || (0..D::Rank::VALUE).all(|axis| dst.dimension(axis) == src.dimension(axis)));
    if consistent {
        Ok(())
    } else {
        Err(TensorError::ShapeMismatch {
            expected: dst.shape(),
            got: src.shape(),
        })
    }
}

/// Applies `op` with the same scalar `value` to every element of `dst`.
/// Division multiplies by the reciprocal of `value`.
pub fn assign_scalar<D: Destination>(dst: &mut D, value: D::Scalar, op: AssignOp) {
    assign_scalar_with_mode(dst, value, op, VECTORISED_ASSIGN)
}

pub(crate) fn assign_scalar_with_mode<D: Destination>(
    dst: &mut D,
    value: D::Scalar,
    op: AssignOp,
    vectorised: bool,
) {
    // A scalar never aliases, but the flag is still consumed.
    dst.take_alias_flag();
    let (op, value) = match op {
        AssignOp::Div => (AssignOp::Mul, D::Scalar::ONE / value),
        other => (other, value),
    };

    let size = dst.size();
    let mut index = 0;
    if vectorised {
        let lanes = <<D::Scalar as Element>::Simd as SimdVector>::LANES;
        let chunk = <D::Scalar as Element>::Simd::splat(value);
        let body = round_down(size, lanes);
        while index < body {
            let result = match op {
                AssignOp::Assign => chunk,
                _ => op.apply_vector(dst.read_vector(index), chunk),
            };
            dst.write_vector(index, result);
            index += lanes;
        }
    }
    while index < size {
        let result = op.apply_scalar(dst.read(index), value);
        dst.write(index, result);
        index += 1;
    }
}

// endregion: Destination

// region: Destination Impls

impl<T: Element, S: Shape> Destination for Tensor<T, S> {
    type Scalar = T;
    type Rank = S::Rank;

    #[inline(always)]
    fn size(&self) -> usize {
        S::SIZE
    }

    #[inline(always)]
    fn dimension(&self, axis: usize) -> usize {
        S::DIMS[axis]
    }

    #[inline(always)]
    fn address(&self) -> *const () {
        self.as_ptr() as *const ()
    }

    #[inline(always)]
    fn read(&self, index: usize) -> T {
        self.as_slice()[index]
    }

    #[inline(always)]
    fn write(&mut self, index: usize, value: T) {
        self.as_mut_slice()[index] = value;
    }

    #[inline(always)]
    fn read_vector<V: SimdVector<Scalar = T>>(&self, index: usize) -> V {
        V::load(&self.as_slice()[index..])
    }

    #[inline(always)]
    fn write_vector<V: SimdVector<Scalar = T>>(&mut self, index: usize, value: V) {
        value.store(&mut self.as_mut_slice()[index..]);
    }

    fn assign_through_temporary<E>(
        &mut self,
        src: &E,
        op: AssignOp,
        vectorised: bool,
    ) -> Result<(), TensorError>
    where
        E: Expression<Scalar = T, Rank = S::Rank>,
    {
        let mut temporary = *self;
        assign_with_mode(&mut temporary, src, op, vectorised)?;
        *self = temporary;
        Ok(())
    }
}

impl<'a, T: Element, S: Shape> Destination for TensorCells<'a, T, S> {
    type Scalar = T;
    type Rank = S::Rank;

    #[inline(always)]
    fn size(&self) -> usize {
        S::SIZE
    }

    #[inline(always)]
    fn dimension(&self, axis: usize) -> usize {
        S::DIMS[axis]
    }

    #[inline(always)]
    fn address(&self) -> *const () {
        self.as_cells().as_ptr() as *const ()
    }

    #[inline(always)]
    fn read(&self, index: usize) -> T {
        self.get(index)
    }

    #[inline(always)]
    fn write(&mut self, index: usize, value: T) {
        self.set(index, value)
    }

    #[inline(always)]
    fn read_vector<V: SimdVector<Scalar = T>>(&self, index: usize) -> V {
        V::from_fn(|lane| self.get(index + lane))
    }

    #[inline(always)]
    fn write_vector<V: SimdVector<Scalar = T>>(&mut self, index: usize, value: V) {
        let mut buffer = [T::ZERO; crate::simd::MAX_LANES];
        value.store(&mut buffer);
        for (lane, &x) in buffer[..V::LANES].iter().enumerate() {
            self.set(index + lane, x);
        }
    }

    fn assign_through_temporary<E>(
        &mut self,
        src: &E,
        op: AssignOp,
        vectorised: bool,
    ) -> Result<(), TensorError>
    where
        E: Expression<Scalar = T, Rank = S::Rank>,
    {
        let mut temporary = self.snapshot();
        assign_with_mode(&mut temporary, src, op, vectorised)?;
        self.copy_from(&temporary);
        Ok(())
    }
}

impl<B, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize> Destination
    for View1<B, N, FIRST, LAST, STEP>
where
    B: BackingMut,
{
    type Scalar = B::Scalar;
    type Rank = Rank1;

    const DETECTS_ALIASING: bool = false;

    #[inline(always)]
    fn size(&self) -> usize {
        Self::LEN
    }

    #[inline(always)]
    fn dimension(&self, _axis: usize) -> usize {
        Self::LEN
    }

    fn address(&self) -> *const () {
        self.base_address()
    }

    #[inline(always)]
    fn take_alias_flag(&mut self) -> bool {
        self.lower_alias_flag()
    }

    #[inline(always)]
    fn read(&self, index: usize) -> B::Scalar {
        self.get(index)
    }

    #[inline(always)]
    fn write(&mut self, index: usize, value: B::Scalar) {
        self.set(index, value)
    }

    #[inline(always)]
    fn read_vector<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize) -> V {
        self.read_chunk(index)
    }

    #[inline(always)]
    fn write_vector<V: SimdVector<Scalar = B::Scalar>>(&mut self, index: usize, value: V) {
        self.write_chunk(index, value)
    }

    fn assign_through_temporary<E>(
        &mut self,
        src: &E,
        op: AssignOp,
        vectorised: bool,
    ) -> Result<(), TensorError>
    where
        E: Expression<Scalar = B::Scalar, Rank = Rank1>,
    {
        let mut temporary = self.snapshot_base();
        {
            let mut staged = temporary.cells().view::<FIRST, LAST, STEP>();
            assign_with_mode(&mut staged, src, op, vectorised)?;
        }
        self.copy_selection_from(&temporary);
        Ok(())
    }
}

impl<
        B,
        const M: usize,
        const N: usize,
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize,
    > Destination for View2<B, M, N, F0, L0, S0, F1, L1, S1>
where
    B: BackingMut,
{
    type Scalar = B::Scalar;
    type Rank = Rank2;

    const DETECTS_ALIASING: bool = false;

    #[inline(always)]
    fn size(&self) -> usize {
        Self::LEN
    }

    #[inline(always)]
    fn dimension(&self, axis: usize) -> usize {
        [Self::ROWS, Self::COLS][axis]
    }

    fn address(&self) -> *const () {
        self.base_address()
    }

    #[inline(always)]
    fn take_alias_flag(&mut self) -> bool {
        self.lower_alias_flag()
    }

    #[inline(always)]
    fn read(&self, index: usize) -> B::Scalar {
        self.get(index / Self::COLS, index % Self::COLS)
    }

    #[inline(always)]
    fn write(&mut self, index: usize, value: B::Scalar) {
        self.set(index / Self::COLS, index % Self::COLS, value)
    }

    #[inline(always)]
    fn read_vector<V: SimdVector<Scalar = B::Scalar>>(&self, index: usize) -> V {
        self.read_chunk(index)
    }

    #[inline(always)]
    fn write_vector<V: SimdVector<Scalar = B::Scalar>>(&mut self, index: usize, value: V) {
        self.write_chunk(index, value)
    }

    fn assign_through_temporary<E>(
        &mut self,
        src: &E,
        op: AssignOp,
        vectorised: bool,
    ) -> Result<(), TensorError>
    where
        E: Expression<Scalar = B::Scalar, Rank = Rank2>,
    {
        let mut temporary = self.snapshot_base();
        {
            let mut staged = temporary.cells().view2::<F0, L0, S0, F1, L1, S1>();
            assign_with_mode(&mut staged, src, op, vectorised)?;
        }
        self.copy_selection_from(&temporary);
        Ok(())
    }
}

// endregion: Destination Impls

// region: Operator Overloads

/// Implements `= += -= *= /=` operator traits for a destination type, against
/// any expression of the same rank and against `f32`/`f64` scalars. The
/// expression forms panic on a shape mismatch.
macro_rules! impl_assign_operators {
    ([$($generics:tt)*] $ty:ty $(where $($bounds:tt)*)?) => {
        impl_assign_operators!(@op [$($generics)*] $ty, AddAssign, add_assign, try_add_assign, Add $(, $($bounds)*)?);
        impl_assign_operators!(@op [$($generics)*] $ty, SubAssign, sub_assign, try_sub_assign, Sub $(, $($bounds)*)?);
        impl_assign_operators!(@op [$($generics)*] $ty, MulAssign, mul_assign, try_mul_assign, Mul $(, $($bounds)*)?);
        impl_assign_operators!(@op [$($generics)*] $ty, DivAssign, div_assign, try_div_assign, Div $(, $($bounds)*)?);
    };
    (@op [$($generics:tt)*] $ty:ty, $trait:ident, $method:ident, $try_method:ident, $op:ident $(, $($bounds:tt)*)?) => {
        impl<$($generics)*, E> core::ops::$trait<E> for $ty
        where
            Self: Destination,
            E: Expression<Scalar = <Self as Destination>::Scalar, Rank = <Self as Destination>::Rank>,
            $($($bounds)*)?
        {
            #[inline]
            fn $method(&mut self, src: E) {
                self.$try_method(src)
                    .expect("assignment source shape does not match the destination")
            }
        }

        impl<$($generics)*> core::ops::$trait<f32> for $ty
        where
            Self: Destination<Scalar = f32>,
            $($($bounds)*)?
        {
            #[inline]
            fn $method(&mut self, value: f32) {
                assign_scalar(self, value, AssignOp::$op)
            }
        }

        impl<$($generics)*> core::ops::$trait<f64> for $ty
        where
            Self: Destination<Scalar = f64>,
            $($($bounds)*)?
        {
            #[inline]
            fn $method(&mut self, value: f64) {
                assign_scalar(self, value, AssignOp::$op)
            }
        }
    };
}

impl_assign_operators!([T: Element, S: Shape] Tensor<T, S>);
impl_assign_operators!(['a, T: Element, S: Shape] TensorCells<'a, T, S>);
impl_assign_operators!(
    [B: BackingMut, const N: usize, const FIRST: usize, const LAST: usize, const STEP: usize]
    View1<B, N, FIRST, LAST, STEP>
);
impl_assign_operators!(
    [
        B: BackingMut,
        const M: usize,
        const N: usize,
        const F0: usize,
        const L0: usize,
        const S0: usize,
        const F1: usize,
        const L1: usize,
        const S1: usize
    ]
    View2<B, M, N, F0, L0, S0, F1, L1, S1>
);

// endregion: Operator Overloads

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::MatMul;
    use crate::tensor::{Matrix, Vector};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SENTINEL: f64 = -12345.0;

    #[test]
    fn mismatched_size_leaves_destination_untouched() {
        let mut dst = Vector::<f64, 6>::splat(SENTINEL);
        let mut wider = Vector::<f64, 8>::arange();
        let cells = wider.cells();
        let source = cells.view::<0, 7, 1>();
        let err = dst.try_assign(&source).unwrap_err();
        assert_eq!(
            err,
            TensorError::ShapeMismatch {
                expected: ShapeDescriptor::from_slice(&[6]),
                got: ShapeDescriptor::from_slice(&[7]),
            }
        );
        assert!(dst.as_slice().iter().all(|&x| x == SENTINEL));

        let err = dst.try_add_assign(&source + &source).unwrap_err();
        assert!(matches!(err, TensorError::ShapeMismatch { .. }));
        assert!(dst.as_slice().iter().all(|&x| x == SENTINEL));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn mismatched_axes_leave_destination_untouched() {
        let mut dst = Matrix::<f64, 2, 3>::splat(SENTINEL);
        let src = Matrix::<f64, 3, 2>::arange();
        let err = dst.try_assign(&src).unwrap_err();
        assert_eq!(format!("{}", err), "shape mismatch: expected [2, 3], got [3, 2]");
        assert!(dst.as_slice().iter().all(|&x| x == SENTINEL));
    }

    #[test]
    fn inconsistent_operands_are_rejected_before_writing() {
        let mut dst = Matrix::<f64, 2, 3>::splat(SENTINEL);
        let a = Matrix::<f64, 2, 3>::arange();
        let b = Matrix::<f64, 3, 2>::arange();
        assert!(dst.try_assign(&a + &b).is_err());
        assert!(dst.as_slice().iter().all(|&x| x == SENTINEL));
    }

    #[test]
    #[should_panic(expected = "assignment source shape does not match the destination")]
    fn operator_form_panics_on_mismatch() {
        let mut dst = Vector::<f32, 4>::zeros();
        let wide = Vector::<f32, 6>::zeros();
        dst += &wide.view::<0, 5, 1>();
    }

    #[test]
    fn shift_left_through_flagged_view() {
        let mut x = Vector::<f64, 4>::from([1.0, 2.0, 3.0, 4.0]);
        let cells = x.cells();
        let source = cells.view::<1, 4, 1>();
        let mut target = cells.view::<0, 3, 1>();
        target.aliased();
        target.try_assign(&source).unwrap();
        assert!(!target.is_aliased());
        assert_eq!(x.as_slice(), &[2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn shift_right_needs_the_flag() {
        let original = Vector::<f64, 9>::arange();

        let mut x = original;
        let cells = x.cells();
        let source = cells.view::<0, 8, 1>();
        cells.view::<1, 9, 1>().aliased().try_assign(&source).unwrap();
        assert_eq!(x.as_slice(), &[0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        // Without the flag, an element-by-element right shift would smear the
        // first element. The vectorised loop may read ahead of its writes, so
        // only the scalar loop is checked.
        let mut y = original;
        let cells = y.cells();
        let source = cells.view::<0, 8, 1>();
        assign_with_mode(&mut cells.view::<1, 9, 1>(), &&source, AssignOp::Assign, false).unwrap();
        assert!(y.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn compound_assignment_through_flagged_view() {
        let mut x = Vector::<f32, 5>::from([1.0, 2.0, 3.0, 4.0, 5.0]);
        let cells = x.cells();
        let source = cells.view::<0, 4, 1>();
        cells.view::<1, 5, 1>().aliased().try_add_assign(&source).unwrap();
        assert_eq!(x.as_slice(), &[1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn flagged_matrix_view_shifts_a_block() {
        let mut m = Matrix::<f64, 3, 3>::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        let cells = m.cells();
        let lower = cells.view2::<1, 3, 1, 0, 2, 1>();
        cells.view2::<0, 2, 1, 1, 3, 1>().aliased().try_assign(&lower).unwrap();
        assert_eq!(m.as_slice(), &[1.0, 4.0, 5.0, 4.0, 7.0, 8.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn cells_destination_detects_aliasing() {
        let mut x = Matrix::<f64, 2, 2>::from([[1.0, 2.0], [3.0, 4.0]]);
        let y = Matrix::<f64, 2, 2>::from([[0.0, 1.0], [1.0, 0.0]]);
        let mut cells = x.cells();
        cells.try_assign(MatMul::new(cells, &y)).unwrap();
        assert_eq!(x.as_slice(), &[2.0, 1.0, 4.0, 3.0]);

        let mut z = Vector::<f32, 3>::from([1.0, 2.0, 3.0]);
        let mut cells = z.cells();
        cells += cells * 2.0f32;
        assert_eq!(z.as_slice(), &[3.0, 6.0, 9.0]);
    }

    #[test]
    fn compound_operators_match_expanded_forms() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Matrix::<f64, 5, 7>::try_from_slice(
            &(0..35).map(|_| rng.gen_range(-4.0..4.0)).collect::<Vec<f64>>(),
            crate::tensor::Layout::RowMajor,
        )
        .unwrap();
        let b = Matrix::<f64, 5, 7>::try_from_slice(
            &(0..35).map(|_| rng.gen_range(1.0..4.0)).collect::<Vec<f64>>(),
            crate::tensor::Layout::RowMajor,
        )
        .unwrap();

        let mut x = a;
        x += &b;
        assert_eq!(x, Matrix::from_expr(&a + &b));
        let mut x = a;
        x -= &b;
        assert_eq!(x, Matrix::from_expr(&a - &b));
        let mut x = a;
        x *= &b;
        assert_eq!(x, Matrix::from_expr(&a * &b));
        let mut x = a;
        x /= &b;
        assert_eq!(x, Matrix::from_expr(&a / &b));

        let mut x = a;
        x += 1.5;
        assert_eq!(x, Matrix::from_expr(&a + 1.5));
        let mut x = a;
        x -= 1.5;
        assert_eq!(x, Matrix::from_expr(&a - 1.5));
        let mut x = a;
        x *= 1.5;
        assert_eq!(x, Matrix::from_expr(&a * 1.5));
        let mut x = a;
        x /= 4.0;
        assert_eq!(x, Matrix::from_expr(&a / 4.0));
        let mut x = a;
        x /= 3.0;
        assert_eq!(x, Matrix::from_expr(&a / 3.0));
    }

    #[test]
    fn scalar_division_agrees_with_the_lazy_quotient() {
        let a = Vector::<f64, 64>::arange();
        let mut x = a;
        x /= 3.0;
        assert_eq!(x, Vector::from_expr(&a / 3.0));

        let a = Vector::<f32, 29>::arange();
        let mut x = a;
        x /= 7.0;
        assert_eq!(x, Vector::from_expr(&a / 7.0f32));
        let mut y = a;
        assign_scalar_with_mode(&mut y, 7.0, AssignOp::Div, false);
        assert_eq!(x, y);
    }

    #[test]
    fn scalar_division_multiplies_by_the_reciprocal() {
        let mut x = Vector::<f64, 3>::from([1.0, 2.0, 10.0]);
        x /= 3.0;
        let reciprocal = 1.0 / 3.0;
        assert_eq!(x.as_slice(), &[reciprocal, 2.0 * reciprocal, 10.0 * reciprocal]);
    }

    fn random_vector<const N: usize>(rng: &mut StdRng) -> Vector<f32, N> {
        let mut v = Vector::<f32, N>::zeros();
        for slot in v.as_mut_slice() {
            *slot = rng.gen_range(-2.0..2.0);
        }
        v
    }

    #[test]
    fn vectorised_and_scalar_loops_agree() {
        let mut rng = StdRng::seed_from_u64(42);
        let a = random_vector::<37>(&mut rng);
        let b = random_vector::<37>(&mut rng);
        let start = random_vector::<37>(&mut rng);
        for op in [
            AssignOp::Assign,
            AssignOp::Add,
            AssignOp::Sub,
            AssignOp::Mul,
            AssignOp::Div,
        ] {
            let expr = (&a * &b - &a) / 2.0f32 + 1.0f32;
            let mut vectorised = start;
            let mut scalar = start;
            assign_with_mode(&mut vectorised, &expr, op, true).unwrap();
            assign_with_mode(&mut scalar, &expr, op, false).unwrap();
            assert_eq!(vectorised, scalar, "{:?}", op);

            let mut vectorised = start;
            let mut scalar = start;
            assign_scalar_with_mode(&mut vectorised, 0.75, op, true);
            assign_scalar_with_mode(&mut scalar, 0.75, op, false);
            assert_eq!(vectorised, scalar, "{:?}", op);
        }

        let mut m = Matrix::<f64, 6, 6>::arange();
        let mut n = m;
        let strided = Matrix::<f64, 6, 6>::splat(2.0);
        let src = strided.view2::<0, 6, 2, 1, 6, 1>();
        let dst_v = m.cells();
        assign_with_mode(&mut dst_v.view2::<1, 4, 1, 0, 5, 1>(), &&src, AssignOp::Mul, true).unwrap();
        let dst_s = n.cells();
        assign_with_mode(&mut dst_s.view2::<1, 4, 1, 0, 5, 1>(), &&src, AssignOp::Mul, false).unwrap();
        assert_eq!(m, n);
        assert_eq!(m[[1, 0]], 12.0);
        assert_eq!(m[[1, 5]], 11.0);
    }

    #[test]
    fn strided_view_destination() {
        let mut x = Vector::<f64, 7>::zeros();
        let cells = x.cells();
        let evens = Vector::<f64, 4>::from([1.0, 2.0, 3.0, 4.0]);
        cells.view::<0, 7, 2>().set_to(&evens);
        let mut odds = cells.view::<1, 7, 2>();
        odds += 5.0;
        assert_eq!(x.as_slice(), &[1.0, 5.0, 2.0, 5.0, 3.0, 5.0, 4.0]);
    }

    #[test]
    fn try_from_expr_and_set_to() {
        let a = Matrix::<f32, 3, 3>::eye();
        let doubled = Matrix::<f32, 3, 3>::try_from_expr(&a + &a).unwrap();
        assert_eq!(doubled.trace(), 6.0);
        let mut c = Matrix::<f32, 3, 3>::zeros();
        c.set_to(-&doubled);
        assert_eq!(c[[2, 2]], -2.0);
    }
}
