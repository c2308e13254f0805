//! Lazy expression nodes.
//!
//! Applying `+ - * /` to tensors, views or other nodes builds a tree of
//! small, borrowed, stack-allocated nodes. Nothing is computed until the tree
//! is assigned into a [`Destination`](crate::assign::Destination), which then
//! asks the root for one element or one SIMD chunk at a time.
//!
//! Leaves are `&Tensor`, [`TensorCells`], views (by reference, see
//! [`crate::view`]) and broadcast scalars ([`Splat`]). Inner nodes are
//! [`Binary`], [`Unary`], [`Cast`] and [`MatMul`]. A matrix product cannot be
//! evaluated element by element efficiently, so [`MatMul`] hands the whole
//! tile to the kernel dispatcher on first use and serves elements from the
//! cached result afterwards.

use core::cell::OnceCell;
use core::fmt::Debug;
use core::marker::PhantomData;

use crate::matmul;
use crate::scalars::Element;
use crate::shape::{Broadcast, Dim2, Rank, Rank0, Rank2, Shape, MAX_RANK};
use crate::simd::SimdVector;
use crate::tensor::{Matrix, ShapeDescriptor, Tensor, TensorCells, TensorError};

/// A value that can be evaluated element by element.
pub trait Expression {
    type Scalar: Element;
    /// Rank marker; assignments require it to equal the destination's.
    type Rank: Rank;

    /// Number of elements.
    fn size(&self) -> usize;

    /// Extent along `axis`, outermost first.
    fn dimension(&self, axis: usize) -> usize;

    /// Element at a row-major linear position.
    fn eval_scalar(&self, index: usize) -> Self::Scalar;

    /// `V::LANES` consecutive elements starting at a row-major linear position.
    fn eval_vector<V: SimdVector<Scalar = Self::Scalar>>(&self, index: usize) -> V;

    /// Returns `true` if any leaf of this tree starts at `address`.
    fn aliases(&self, address: *const ()) -> bool;

    /// Verifies that the operands of every elementwise node agree in shape.
    fn check_shape(&self) -> Result<(), TensorError> {
        Ok(())
    }

    /// Element at a multi-index.
    fn eval_scalar_at(&self, index: &[usize]) -> Self::Scalar {
        let mut linear = 0;
        for (axis, &i) in index.iter().enumerate() {
            linear = linear * self.dimension(axis) + i;
        }
        self.eval_scalar(linear)
    }

    fn shape(&self) -> ShapeDescriptor {
        let rank = Self::Rank::VALUE;
        let mut dims = [0usize; MAX_RANK];
        for (axis, dim) in dims[..rank].iter_mut().enumerate() {
            *dim = self.dimension(axis);
        }
        ShapeDescriptor::from_slice(&dims[..rank])
    }
}

// region: Leaves

impl<'a, T: Element, S: Shape> Expression for &'a Tensor<T, S> {
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
    fn eval_scalar(&self, index: usize) -> T {
        self.as_slice()[index]
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = T>>(&self, index: usize) -> V {
        V::load(&self.as_slice()[index..])
    }

    #[inline(always)]
    fn aliases(&self, address: *const ()) -> bool {
        self.as_ptr() as *const () == address
    }
}

impl<'a, T: Element, S: Shape> Expression for TensorCells<'a, T, S> {
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
    fn eval_scalar(&self, index: usize) -> T {
        self.get(index)
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = T>>(&self, index: usize) -> V {
        V::from_fn(|lane| self.get(index + lane))
    }

    #[inline(always)]
    fn aliases(&self, address: *const ()) -> bool {
        self.as_cells().as_ptr() as *const () == address
    }
}

/// A scalar broadcast against the other operand of a [`Binary`] node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat<T>(pub T);

impl<T: Element> Expression for Splat<T> {
    type Scalar = T;
    type Rank = Rank0;

    fn size(&self) -> usize {
        1
    }

    fn dimension(&self, _axis: usize) -> usize {
        1
    }

    #[inline(always)]
    fn eval_scalar(&self, _index: usize) -> T {
        self.0
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = T>>(&self, _index: usize) -> V {
        V::splat(self.0)
    }

    fn aliases(&self, _address: *const ()) -> bool {
        false
    }
}

// endregion: Leaves

// region: Operators

/// Elementwise binary operator of a [`Binary`] node.
pub trait BinaryOperator: Copy + Debug + 'static {
    fn scalar<T: Element>(lhs: T, rhs: T) -> T;
    fn vector<V: SimdVector>(lhs: V, rhs: V) -> V;
}

/// Elementwise unary operator of a [`Unary`] node.
pub trait UnaryOperator: Copy + Debug + 'static {
    fn scalar<T: Element>(value: T) -> T;
    fn vector<V: SimdVector>(value: V) -> V;
}

macro_rules! binary_operator {
    ($name:ident, $op:tt) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl BinaryOperator for $name {
            #[inline(always)]
            fn scalar<T: Element>(lhs: T, rhs: T) -> T {
                lhs $op rhs
            }

            #[inline(always)]
            fn vector<V: SimdVector>(lhs: V, rhs: V) -> V {
                lhs $op rhs
            }
        }
    };
}

binary_operator!(AddOp, +);
binary_operator!(SubOp, -);
binary_operator!(MulOp, *);
binary_operator!(DivOp, /);

/// How a [`BinaryOperator`] applies a scalar right-hand side. Division by a
/// scalar multiplies by its reciprocal, matching `/=`.
pub trait ScalarOperator: BinaryOperator {
    type Applied: BinaryOperator;
    fn prepare<T: Element>(rhs: T) -> T;
}

macro_rules! scalar_operator {
    ($name:ident) => {
        impl ScalarOperator for $name {
            type Applied = $name;

            #[inline(always)]
            fn prepare<T: Element>(rhs: T) -> T {
                rhs
            }
        }
    };
}

scalar_operator!(AddOp);
scalar_operator!(SubOp);
scalar_operator!(MulOp);

impl ScalarOperator for DivOp {
    type Applied = MulOp;

    #[inline(always)]
    fn prepare<T: Element>(rhs: T) -> T {
        T::ONE / rhs
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NegOp;

impl UnaryOperator for NegOp {
    #[inline(always)]
    fn scalar<T: Element>(value: T) -> T {
        -value
    }

    #[inline(always)]
    fn vector<V: SimdVector>(value: V) -> V {
        -value
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbsOp;

impl UnaryOperator for AbsOp {
    #[inline(always)]
    fn scalar<T: Element>(value: T) -> T {
        value.abs()
    }

    #[inline(always)]
    fn vector<V: SimdVector>(value: V) -> V {
        value.abs()
    }
}

#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SqrtOp;

#[cfg(feature = "std")]
impl UnaryOperator for SqrtOp {
    #[inline(always)]
    fn scalar<T: Element>(value: T) -> T {
        value.sqrt()
    }

    #[inline(always)]
    fn vector<V: SimdVector>(value: V) -> V {
        value.sqrt()
    }
}

// endregion: Operators

// region: Binary

/// Elementwise combination of two operands of equal shape, or of one operand
/// and a broadcast scalar.
#[derive(Debug, Clone, Copy)]
pub struct Binary<L, R, Op> {
    lhs: L,
    rhs: R,
    _op: PhantomData<Op>,
}

impl<L, R, Op> Binary<L, R, Op> {
    #[inline(always)]
    pub fn new(lhs: L, rhs: R) -> Self {
        Self {
            lhs,
            rhs,
            _op: PhantomData,
        }
    }

    pub fn lhs(&self) -> &L {
        &self.lhs
    }

    pub fn rhs(&self) -> &R {
        &self.rhs
    }
}

impl<L, R, Op> Expression for Binary<L, R, Op>
where
    L: Expression,
    R: Expression<Scalar = L::Scalar>,
    L::Rank: Broadcast<R::Rank>,
    Op: BinaryOperator,
{
    type Scalar = L::Scalar;
    type Rank = <L::Rank as Broadcast<R::Rank>>::Output;

    #[inline(always)]
    fn size(&self) -> usize {
        if L::Rank::VALUE == 0 {
            self.rhs.size()
        } else {
            self.lhs.size()
        }
    }

    #[inline(always)]
    fn dimension(&self, axis: usize) -> usize {
        if L::Rank::VALUE == 0 {
            self.rhs.dimension(axis)
        } else {
            self.lhs.dimension(axis)
        }
    }

    #[inline(always)]
    fn eval_scalar(&self, index: usize) -> Self::Scalar {
        Op::scalar(self.lhs.eval_scalar(index), self.rhs.eval_scalar(index))
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = Self::Scalar>>(&self, index: usize) -> V {
        Op::vector(self.lhs.eval_vector::<V>(index), self.rhs.eval_vector::<V>(index))
    }

    fn aliases(&self, address: *const ()) -> bool {
        self.lhs.aliases(address) || self.rhs.aliases(address)
    }

    fn check_shape(&self) -> Result<(), TensorError> {
        self.lhs.check_shape()?;
        self.rhs.check_shape()?;
        if L::Rank::VALUE == 0 || R::Rank::VALUE == 0 {
            return Ok(());
        }
        let consistent = self.lhs.size() == self.rhs.size()
            && (0..L::Rank::VALUE).all(|axis| self.lhs.dimension(axis) == self.rhs.dimension(axis));
        if consistent {
            Ok(())
        } else {
            Err(TensorError::ShapeMismatch {
                expected: self.lhs.shape(),
                got: self.rhs.shape(),
            })
        }
    }
}

// endregion: Binary

// region: Unary

/// Elementwise function of one operand.
#[derive(Debug, Clone, Copy)]
pub struct Unary<E, Op> {
    inner: E,
    _op: PhantomData<Op>,
}

impl<E, Op> Unary<E, Op> {
    #[inline(always)]
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            _op: PhantomData,
        }
    }
}

impl<E: Expression, Op: UnaryOperator> Expression for Unary<E, Op> {
    type Scalar = E::Scalar;
    type Rank = E::Rank;

    #[inline(always)]
    fn size(&self) -> usize {
        self.inner.size()
    }

    #[inline(always)]
    fn dimension(&self, axis: usize) -> usize {
        self.inner.dimension(axis)
    }

    #[inline(always)]
    fn eval_scalar(&self, index: usize) -> E::Scalar {
        Op::scalar(self.inner.eval_scalar(index))
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = E::Scalar>>(&self, index: usize) -> V {
        Op::vector(self.inner.eval_vector::<V>(index))
    }

    fn aliases(&self, address: *const ()) -> bool {
        self.inner.aliases(address)
    }

    fn check_shape(&self) -> Result<(), TensorError> {
        self.inner.check_shape()
    }
}

// endregion: Unary

// region: Cast

/// Converts the elements of an expression to another element type.
#[derive(Debug, Clone, Copy)]
pub struct Cast<E, U> {
    inner: E,
    _target: PhantomData<U>,
}

impl<E, U> Cast<E, U> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            _target: PhantomData,
        }
    }
}

impl<E: Expression, U: Element> Expression for Cast<E, U> {
    type Scalar = U;
    type Rank = E::Rank;

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn dimension(&self, axis: usize) -> usize {
        self.inner.dimension(axis)
    }

    #[inline(always)]
    fn eval_scalar(&self, index: usize) -> U {
        U::from_f64(self.inner.eval_scalar(index).to_f64())
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = U>>(&self, index: usize) -> V {
        V::from_fn(|lane| self.eval_scalar(index + lane))
    }

    fn aliases(&self, address: *const ()) -> bool {
        self.inner.aliases(address)
    }

    fn check_shape(&self) -> Result<(), TensorError> {
        self.inner.check_shape()
    }
}

// endregion: Cast

// region: MatMul

/// A rank-2 operand of a lazy matrix product with compile-time extents.
pub trait MatrixOperand<const R: usize, const C: usize>: Expression<Rank = Rank2> {
    /// Runs `f` on the operand as a dense matrix, copying it out first when
    /// it is not already one.
    fn with_matrix<Out>(&self, f: impl FnOnce(&Matrix<Self::Scalar, R, C>) -> Out) -> Out;
}

impl<'a, T: Element, const R: usize, const C: usize> MatrixOperand<R, C> for &'a Matrix<T, R, C> {
    #[inline(always)]
    fn with_matrix<Out>(&self, f: impl FnOnce(&Matrix<T, R, C>) -> Out) -> Out {
        f(self)
    }
}

impl<'a, T: Element, const R: usize, const C: usize> MatrixOperand<R, C>
    for TensorCells<'a, T, Dim2<R, C>>
{
    fn with_matrix<Out>(&self, f: impl FnOnce(&Matrix<T, R, C>) -> Out) -> Out {
        f(&self.snapshot())
    }
}

/// Lazy `M×K` by `K×N` matrix product. The kernel runs once, on the first
/// element request.
pub struct MatMul<L, R, const M: usize, const K: usize, const N: usize>
where
    L: MatrixOperand<M, K>,
    R: MatrixOperand<K, N, Scalar = L::Scalar>,
{
    lhs: L,
    rhs: R,
    product: OnceCell<Matrix<L::Scalar, M, N>>,
}

impl<L, R, const M: usize, const K: usize, const N: usize> MatMul<L, R, M, K, N>
where
    L: MatrixOperand<M, K>,
    R: MatrixOperand<K, N, Scalar = L::Scalar>,
{
    pub fn new(lhs: L, rhs: R) -> Self {
        Self {
            lhs,
            rhs,
            product: OnceCell::new(),
        }
    }

    /// The evaluated product.
    pub fn product(&self) -> &Matrix<L::Scalar, M, N> {
        self.product.get_or_init(|| {
            self.lhs
                .with_matrix(|a| self.rhs.with_matrix(|b| matmul::matmul(a, b)))
        })
    }
}

impl<L, R, const M: usize, const K: usize, const N: usize> Expression for MatMul<L, R, M, K, N>
where
    L: MatrixOperand<M, K>,
    R: MatrixOperand<K, N, Scalar = L::Scalar>,
{
    type Scalar = L::Scalar;
    type Rank = Rank2;

    fn size(&self) -> usize {
        M * N
    }

    fn dimension(&self, axis: usize) -> usize {
        [M, N][axis]
    }

    #[inline(always)]
    fn eval_scalar(&self, index: usize) -> L::Scalar {
        self.product().as_slice()[index]
    }

    #[inline(always)]
    fn eval_vector<V: SimdVector<Scalar = L::Scalar>>(&self, index: usize) -> V {
        V::load(&self.product().as_slice()[index..])
    }

    fn aliases(&self, address: *const ()) -> bool {
        self.lhs.aliases(address) || self.rhs.aliases(address)
    }
}

// endregion: MatMul

// region: Operator Overloads

/// Implements `+ - * /` against any expression or an `f32`/`f64` scalar,
/// and unary `-`, for an expression type.
macro_rules! impl_expression_operators {
    ([$($generics:tt)*] $ty:ty $(where $($bounds:tt)*)?) => {
        $crate::expression::impl_expression_operators!(@binary [$($generics)*] $ty, Add, add, AddOp $(, $($bounds)*)?);
        $crate::expression::impl_expression_operators!(@binary [$($generics)*] $ty, Sub, sub, SubOp $(, $($bounds)*)?);
        $crate::expression::impl_expression_operators!(@binary [$($generics)*] $ty, Mul, mul, MulOp $(, $($bounds)*)?);
        $crate::expression::impl_expression_operators!(@binary [$($generics)*] $ty, Div, div, DivOp $(, $($bounds)*)?);

        impl<$($generics)*> core::ops::Neg for $ty
        where
            Self: $crate::expression::Expression,
            $($($bounds)*)?
        {
            type Output = $crate::expression::Unary<Self, $crate::expression::NegOp>;

            #[inline(always)]
            fn neg(self) -> Self::Output {
                $crate::expression::Unary::new(self)
            }
        }
    };
    (@binary [$($generics:tt)*] $ty:ty, $trait:ident, $method:ident, $op:ident $(, $($bounds:tt)*)?) => {
        impl<$($generics)*, Rhs> core::ops::$trait<Rhs> for $ty
        where
            Self: $crate::expression::Expression,
            Rhs: $crate::expression::Expression<Scalar = <Self as $crate::expression::Expression>::Scalar>,
            <Self as $crate::expression::Expression>::Rank: $crate::shape::Broadcast<Rhs::Rank>,
            $($($bounds)*)?
        {
            type Output = $crate::expression::Binary<Self, Rhs, $crate::expression::$op>;

            #[inline(always)]
            fn $method(self, rhs: Rhs) -> Self::Output {
                $crate::expression::Binary::new(self, rhs)
            }
        }

        $crate::expression::impl_expression_operators!(@scalar [$($generics)*] $ty, $trait, $method, $op, f32 $(, $($bounds)*)?);
        $crate::expression::impl_expression_operators!(@scalar [$($generics)*] $ty, $trait, $method, $op, f64 $(, $($bounds)*)?);
    };
    (@scalar [$($generics:tt)*] $ty:ty, $trait:ident, $method:ident, $op:ident, $scalar:ty $(, $($bounds:tt)*)?) => {
        impl<$($generics)*> core::ops::$trait<$scalar> for $ty
        where
            Self: $crate::expression::Expression<Scalar = $scalar>,
            $($($bounds)*)?
        {
            type Output = $crate::expression::Binary<
                Self,
                $crate::expression::Splat<$scalar>,
                <$crate::expression::$op as $crate::expression::ScalarOperator>::Applied,
            >;

            #[inline(always)]
            fn $method(self, rhs: $scalar) -> Self::Output {
                let rhs = <$crate::expression::$op as $crate::expression::ScalarOperator>::prepare(rhs);
                $crate::expression::Binary::new(self, $crate::expression::Splat(rhs))
            }
        }
    };
}

pub(crate) use impl_expression_operators;

impl_expression_operators!(['a, T: Element, S: Shape] &'a Tensor<T, S>);
impl_expression_operators!(['a, T: Element, S: Shape] TensorCells<'a, T, S>);
impl_expression_operators!([L, R, Op] Binary<L, R, Op>);
impl_expression_operators!([E, Op] Unary<E, Op>);
impl_expression_operators!([E, U: Element] Cast<E, U>);
impl_expression_operators!(
    [L, R, const M: usize, const K: usize, const N: usize] MatMul<L, R, M, K, N>
    where L: MatrixOperand<M, K>, R: MatrixOperand<K, N, Scalar = L::Scalar>
);

/// Elementwise functions and conversions available on every expression.
pub trait ExpressionExt: Expression + Sized {
    fn abs(self) -> Unary<Self, AbsOp> {
        Unary::new(self)
    }

    #[cfg(feature = "std")]
    fn sqrt(self) -> Unary<Self, SqrtOp> {
        Unary::new(self)
    }

    fn cast<U: Element>(self) -> Cast<Self, U> {
        Cast::new(self)
    }
}

impl<E: Expression> ExpressionExt for E {}

// endregion: Operator Overloads

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Dim1;
    use crate::simd::Packed;
    use crate::tensor::Vector;

    #[test]
    fn nodes_evaluate_lazily_per_element() {
        let a = Vector::<f64, 5>::from([1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = Vector::<f64, 5>::splat(2.0);
        let expr = (&a + &b) * 3.0 - &a / &b;
        assert_eq!(expr.size(), 5);
        assert_eq!(expr.dimension(0), 5);
        assert_eq!(expr.eval_scalar(0), 9.0 - 0.5);
        assert_eq!(expr.eval_scalar(4), 21.0 - 2.5);

        let chunk: Packed<f64, 2> = expr.eval_vector(2);
        assert_eq!(chunk.0, [15.0 - 1.5, 18.0 - 2.0]);
    }

    #[test]
    fn unary_nodes() {
        let a = Vector::<f32, 3>::from([-1.0, 4.0, -9.0]);
        let neg = -&a;
        assert_eq!(neg.eval_scalar(0), 1.0);
        assert_eq!((&a).abs().eval_scalar(2), 9.0);
        #[cfg(feature = "std")]
        assert_eq!((&a).abs().sqrt().eval_scalar(1), 2.0);
    }

    #[test]
    fn cast_node_changes_element_type() {
        let a = Vector::<f32, 4>::from([0.5, 1.5, 2.5, 3.5]);
        let wide = ExpressionExt::cast::<f64>(&a) * 2.0;
        assert_eq!(wide.eval_scalar(3), 7.0);
        let chunk: Packed<f64, 4> = wide.eval_vector(0);
        assert_eq!(chunk.0, [1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn scalar_on_either_side_keeps_tensor_shape() {
        let a = Matrix::<f64, 2, 3>::arange();
        let expr = &a * 2.0;
        assert_eq!(expr.size(), 6);
        assert_eq!(expr.dimension(1), 3);
        let flipped = Binary::<_, _, SubOp>::new(Splat(10.0), &a);
        assert_eq!(flipped.size(), 6);
        assert_eq!(flipped.eval_scalar(5), 5.0);
        assert_eq!(flipped.eval_scalar_at(&[1, 1]), 6.0);
    }

    #[test]
    fn mismatched_operands_are_reported() {
        let a = Matrix::<f64, 2, 3>::zeros();
        let b = Matrix::<f64, 3, 2>::zeros();
        let err = (&a + &b).check_shape().unwrap_err();
        assert_eq!(
            err,
            TensorError::ShapeMismatch {
                expected: ShapeDescriptor::from_slice(&[2, 3]),
                got: ShapeDescriptor::from_slice(&[3, 2]),
            }
        );
        assert!((&a + &a).check_shape().is_ok());
    }

    #[test]
    fn alias_detection_walks_both_operands() {
        let a = Vector::<f32, 4>::zeros();
        let b = Vector::<f32, 4>::zeros();
        let address = a.as_ptr() as *const ();
        assert!((&a).aliases(address));
        assert!(!(&b).aliases(address));
        assert!((&b + &b * &a).aliases(address));
        assert!(!(&b + 1.0f32).aliases(address));
        assert!((-(&a)).aliases(address));
    }

    #[test]
    fn lazy_matmul_node() {
        let a = Matrix::<f32, 2, 2>::from([[1.0, 2.0], [3.0, 4.0]]);
        let b = Matrix::<f32, 2, 2>::from([[5.0, 6.0], [7.0, 8.0]]);
        let product = MatMul::new(&a, &b);
        assert_eq!(product.eval_scalar(0), 19.0);
        assert_eq!(product.eval_scalar_at(&[1, 1]), 50.0);
        let shifted = MatMul::new(&a, &b) + 1.0;
        assert_eq!(shifted.eval_scalar(2), 44.0);
        assert!(product.aliases(b.as_ptr() as *const ()));
        assert_eq!(product.shape(), ShapeDescriptor::from_slice(&[2, 2]));
    }

    #[test]
    fn cells_are_leaves() {
        let mut t = Tensor::<f64, Dim1<3>>::from([1.0, 2.0, 3.0]);
        let cells = t.cells();
        let doubled = cells + cells;
        assert_eq!(doubled.eval_scalar(2), 6.0);
        let chunk: Packed<f64, 2> = doubled.eval_vector(1);
        assert_eq!(chunk.0, [4.0, 6.0]);
    }
}
