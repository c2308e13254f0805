//! Matrix products with compile-time extents.
//!
//! [`matmul`] multiplies an `M×K` by a `K×N` matrix through the fastest kernel
//! compiled for the element type and instruction-set tier, most specific
//! first:
//!
//! | Kernel                  | Shapes                                  |
//! |-------------------------|-----------------------------------------|
//! | [`KernelKind::Micro`]      | `2×2×2`, `3×3×3`, `4×4×4`, `8×8×8`  |
//! | [`KernelKind::RowBlocked`] | `M = N ∈ {2, 3, 4, 8}`, any `K`     |
//! | [`KernelKind::MatVec`]     | `N = 1`                             |
//! | [`KernelKind::Blocked`]    | everything else                     |
//!
//! Micro-kernels exist only for the tiers listed in [`select_kernel`]; a
//! missing micro-kernel falls back to the row-blocked kernel and a missing
//! tier to the blocked kernel. Accumulation fuses multiply-add where the
//! target has FMA, so results agree across tiers within a tolerance but not
//! bit for bit.
//!
//! # Example
//!
//! ```rust
//! use fixtensor::{kernel_for, KernelKind, Matrix, Vector};
//!
//! let a = Matrix::<f64, 3, 2>::from([[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
//! let x = Vector::<f64, 2>::from([2.0, 3.0]);
//! assert_eq!(a.matvec(&x).as_slice(), &[2.0, 3.0, 5.0]);
//! assert_ne!(kernel_for::<f64, 5, 3, 7>(), KernelKind::Micro);
//! ```

pub(crate) mod dispatch;
pub(crate) mod kernels;
mod micro;

use crate::expression::{MatMul, MatrixOperand};
use crate::scalars::Element;
use crate::simd::{Tier, TIER};
use crate::tensor::{Matrix, Vector};

/// Element type key of the kernel selection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    F64,
    /// Any type served only by the blocked kernel.
    Other,
}

/// Kernel family chosen for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// Fully unrolled square kernel.
    Micro,
    /// Row-blocked kernel for small square outputs with any inner length.
    RowBlocked,
    /// Matrix-vector kernel.
    MatVec,
    /// Generic cache-blocked triple loop.
    Blocked,
}

impl KernelKind {
    pub const fn name(self) -> &'static str {
        match self {
            KernelKind::Micro => "micro",
            KernelKind::RowBlocked => "row-blocked",
            KernelKind::MatVec => "matvec",
            KernelKind::Blocked => "blocked",
        }
    }
}

/// Returns `true` if a micro-kernel for the `n×n×n` product exists on `tier`.
///
/// | Tier    | `f32`      | `f64`      |
/// |---------|------------|------------|
/// | SSE     | 2, 3, 4    | 2          |
/// | AVX     | 2, 3, 4, 8 | 2, 3, 4    |
/// | AVX-512 | 2, 3, 4, 8 | 2, 3, 4, 8 |
/// | NEON    | 4          | 2          |
const fn has_micro(n: usize, element: ElementKind, tier: Tier) -> bool {
    match (tier, element) {
        (Tier::Sse, ElementKind::F32) => matches!(n, 2 | 3 | 4),
        (Tier::Sse, ElementKind::F64) => n == 2,
        (Tier::Avx, ElementKind::F32) => matches!(n, 2 | 3 | 4 | 8),
        (Tier::Avx, ElementKind::F64) => matches!(n, 2 | 3 | 4),
        (Tier::Avx512, ElementKind::F32 | ElementKind::F64) => matches!(n, 2 | 3 | 4 | 8),
        (Tier::Neon, ElementKind::F32) => n == 4,
        (Tier::Neon, ElementKind::F64) => n == 2,
        _ => false,
    }
}

/// The kernel family used for an `m×k` by `k×n` product of `element` on
/// `tier`.
pub const fn select_kernel(
    m: usize,
    k: usize,
    n: usize,
    element: ElementKind,
    tier: Tier,
) -> KernelKind {
    if matches!(tier, Tier::Serial) || matches!(element, ElementKind::Other) {
        return KernelKind::Blocked;
    }
    let square_family = m == n && matches!(n, 2 | 3 | 4 | 8);
    if square_family && k == n && has_micro(n, element, tier) {
        KernelKind::Micro
    } else if square_family {
        KernelKind::RowBlocked
    } else if n == 1 {
        KernelKind::MatVec
    } else {
        KernelKind::Blocked
    }
}

/// The kernel family this build uses for `Matrix<T, M, K> × Matrix<T, K, N>`.
pub const fn kernel_for<T: Element, const M: usize, const K: usize, const N: usize>() -> KernelKind {
    select_kernel(M, K, N, T::KIND, TIER)
}

/// Writes `a × b` into `out`.
#[inline]
pub fn matmul_into<T: Element, const M: usize, const K: usize, const N: usize>(
    a: &Matrix<T, M, K>,
    b: &Matrix<T, K, N>,
    out: &mut Matrix<T, M, N>,
) {
    T::matmul_kernel::<M, K, N>(a.as_slice(), b.as_slice(), out.as_mut_slice())
}

/// Returns `a × b`.
#[inline]
pub fn matmul<T: Element, const M: usize, const K: usize, const N: usize>(
    a: &Matrix<T, M, K>,
    b: &Matrix<T, K, N>,
) -> Matrix<T, M, N> {
    let mut out = Matrix::zeros();
    matmul_into(a, b, &mut out);
    out
}

/// Returns `a × x`.
#[inline]
pub fn matvec<T: Element, const M: usize, const K: usize>(
    a: &Matrix<T, M, K>,
    x: &Vector<T, K>,
) -> Vector<T, M> {
    let mut out = Vector::zeros();
    T::matmul_kernel::<M, K, 1>(a.as_slice(), x.as_slice(), out.as_mut_slice());
    out
}

/// Returns `a × b` for operands of different element types, converting both
/// to `C` and using the blocked kernel.
pub fn matmul_mixed<A, B, C, const M: usize, const K: usize, const N: usize>(
    a: &Matrix<A, M, K>,
    b: &Matrix<B, K, N>,
) -> Matrix<C, M, N>
where
    A: Element,
    B: Element,
    C: Element,
{
    let a = a.cast::<C>();
    let b = b.cast::<C>();
    let mut out = Matrix::zeros();
    kernels::blocked::<C, M, K, N>(a.as_slice(), b.as_slice(), out.as_mut_slice());
    out
}

/// A lazy product node, evaluated on first element access. Useful as an
/// operand of a larger expression.
pub fn lazy_matmul<L, R, const M: usize, const K: usize, const N: usize>(
    lhs: L,
    rhs: R,
) -> MatMul<L, R, M, K, N>
where
    L: MatrixOperand<M, K>,
    R: MatrixOperand<K, N, Scalar = L::Scalar>,
{
    MatMul::new(lhs, rhs)
}

impl<T: Element, const M: usize, const K: usize> Matrix<T, M, K> {
    /// Returns `self × other`.
    #[inline]
    pub fn matmul<const N: usize>(&self, other: &Matrix<T, K, N>) -> Matrix<T, M, N> {
        matmul(self, other)
    }

    /// Returns `self × x`.
    #[inline]
    pub fn matvec(&self, x: &Vector<T, K>) -> Vector<T, M> {
        matvec(self, x)
    }

    /// Lazy `self × rhs` for use inside a larger expression.
    pub fn lazy_matmul<'a, R, const N: usize>(&'a self, rhs: R) -> MatMul<&'a Self, R, M, K, N>
    where
        R: MatrixOperand<K, N, Scalar = T>,
    {
        MatMul::new(self, rhs)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn two_by_two_is_exact() {
        let a = Matrix::<f32, 2, 2>::from([[1.0, 2.0], [3.0, 4.0]]);
        let b = Matrix::<f32, 2, 2>::from([[5.0, 6.0], [7.0, 8.0]]);
        assert_eq!(matmul(&a, &b).as_slice(), &[19.0, 22.0, 43.0, 50.0]);

        let a = a.cast::<f64>();
        let b = b.cast::<f64>();
        assert_eq!(a.matmul(&b).as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn identity_squared_is_identity() {
        let eye = Matrix::<f64, 4, 4>::eye();
        let product = eye.matmul(&eye);
        assert_eq!(product, eye);
        assert!(product.is_symmetric(<f64 as Element>::TOLERANCE));
        assert!(product.is_orthogonal());
    }

    #[test]
    fn selection_table() {
        use ElementKind::*;
        use KernelKind::*;

        assert_eq!(select_kernel(2, 2, 2, F32, Tier::Sse), Micro);
        assert_eq!(select_kernel(3, 3, 3, F32, Tier::Sse), Micro);
        assert_eq!(select_kernel(8, 8, 8, F32, Tier::Sse), RowBlocked);
        assert_eq!(select_kernel(8, 8, 8, F32, Tier::Avx), Micro);
        assert_eq!(select_kernel(3, 3, 3, F64, Tier::Sse), RowBlocked);
        assert_eq!(select_kernel(3, 3, 3, F64, Tier::Avx), Micro);
        assert_eq!(select_kernel(8, 8, 8, F64, Tier::Avx), RowBlocked);
        assert_eq!(select_kernel(8, 8, 8, F64, Tier::Avx512), Micro);
        assert_eq!(select_kernel(2, 2, 2, F32, Tier::Neon), RowBlocked);
        assert_eq!(select_kernel(4, 4, 4, F32, Tier::Neon), Micro);

        assert_eq!(select_kernel(4, 17, 4, F64, Tier::Avx512), RowBlocked);
        assert_eq!(select_kernel(2, 1, 2, F32, Tier::Sse), RowBlocked);
        assert_eq!(select_kernel(4, 4, 3, F32, Tier::Avx), Blocked);
        assert_eq!(select_kernel(5, 5, 5, F64, Tier::Avx), Blocked);
        assert_eq!(select_kernel(13, 9, 1, F32, Tier::Neon), MatVec);
        assert_eq!(select_kernel(1, 9, 1, F64, Tier::Sse), MatVec);

        assert_eq!(select_kernel(4, 4, 4, F32, Tier::Serial), Blocked);
        assert_eq!(select_kernel(4, 4, 4, Other, Tier::Avx512), Blocked);
        assert_eq!(select_kernel(7, 3, 1, Other, Tier::Avx), Blocked);
    }

    #[test]
    fn kernel_for_uses_the_build_tier() {
        assert_eq!(kernel_for::<f32, 4, 4, 4>(), select_kernel(4, 4, 4, ElementKind::F32, TIER));
        assert_eq!(kernel_for::<f64, 6, 2, 1>(), select_kernel(6, 2, 1, ElementKind::F64, TIER));
        assert_eq!(KernelKind::RowBlocked.name(), "row-blocked");
    }

    macro_rules! check_shapes {
        ($rng:expr, $t:ty, $tolerance:expr, $(($m:literal, $k:literal, $n:literal)),+ $(,)?) => {
            $({
                let a = random_matrix::<$t, $m, $k>($rng);
                let b = random_matrix::<$t, $k, $n>($rng);
                let c = matmul(&a, &b);
                assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), ($m, $k, $n), $tolerance);
            })+
        };
    }

    #[test]
    fn every_kernel_family_matches_reference_f32() {
        let mut rng = StdRng::seed_from_u64(1);
        check_shapes!(
            &mut rng, f32, 1e-6,
            (2, 2, 2), (3, 3, 3), (4, 4, 4), (8, 8, 8),
            (2, 7, 2), (3, 1, 3), (3, 10, 3), (4, 9, 4), (8, 3, 8), (8, 12, 8),
            (1, 5, 1), (7, 12, 1), (8, 3, 1), (15, 9, 1), (17, 16, 1),
            (5, 3, 7), (3, 4, 5), (16, 20, 17), (1, 1, 9),
        );
    }

    #[test]
    fn every_kernel_family_matches_reference_f64() {
        let mut rng = StdRng::seed_from_u64(2);
        check_shapes!(
            &mut rng, f64, 1e-12,
            (2, 2, 2), (3, 3, 3), (4, 4, 4), (8, 8, 8),
            (2, 7, 2), (3, 1, 3), (3, 10, 3), (4, 9, 4), (8, 3, 8), (8, 12, 8),
            (1, 5, 1), (7, 12, 1), (8, 3, 1), (15, 9, 1), (17, 16, 1),
            (5, 3, 7), (3, 4, 5), (16, 20, 17), (1, 1, 9),
        );
    }

    #[test]
    fn matvec_and_into() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = random_matrix::<f64, 11, 6>(&mut rng);
        let x = random_matrix::<f64, 6, 1>(&mut rng);
        let x_vec = Vector::<f64, 6>::try_from_slice(x.as_slice(), crate::tensor::Layout::RowMajor).unwrap();
        let y = a.matvec(&x_vec);
        assert_matches_reference(a.as_slice(), x.as_slice(), y.as_slice(), (11, 6, 1), 1e-12);

        let mut c = Matrix::<f64, 11, 1>::splat(99.0);
        matmul_into(&a, &x, &mut c);
        assert_eq!(c.as_slice(), y.as_slice());
    }

    #[test]
    fn mixed_element_types() {
        let a = Matrix::<f32, 2, 3>::from([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let b = Matrix::<f64, 3, 2>::from([[1.0, 0.5], [0.0, 0.25], [2.0, 0.0]]);
        let c: Matrix<f64, 2, 2> = matmul_mixed(&a, &b);
        assert_eq!(c.as_slice(), &[7.0, 1.0, 16.0, 3.25]);
    }

    #[test]
    fn lazy_product_feeds_expressions() {
        let a = Matrix::<f64, 2, 2>::from([[1.0, 2.0], [3.0, 4.0]]);
        let b = Matrix::<f64, 2, 2>::from([[5.0, 6.0], [7.0, 8.0]]);
        let shifted = Matrix::<f64, 2, 2>::from_expr(a.lazy_matmul(&b) - &a);
        assert_eq!(shifted.as_slice(), &[18.0, 20.0, 40.0, 46.0]);
        let twice = Matrix::<f64, 2, 2>::from_expr(lazy_matmul(&a, &b) * 2.0);
        assert_eq!(twice.as_slice(), &[38.0, 44.0, 86.0, 100.0]);
    }
}
