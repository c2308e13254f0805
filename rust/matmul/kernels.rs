//! Generic kernels, parameterised by element and vector type.
//!
//! All operands are dense row-major slices: `a` is `M×K`, `b` is `K×N` and
//! `out` is `M×N`.

use crate::scalars::Element;
use crate::shape::round_down;
use crate::simd::SimdVector;

/// Most vectors a row-blocked output row may span.
pub(crate) const MAX_ROW_CHUNKS: usize = 4;

/// Tile edge of the blocked kernel.
const BLOCK: usize = 16;

/// Row-blocked kernel for short output rows and any `K`.
///
/// Every output row lives in at most [`MAX_ROW_CHUNKS`] vector accumulators.
/// Each step of the `K` loop loads one row of `b` and broadcasts one element
/// of every row of `a` against it. Rows narrower than a whole number of
/// vectors end with a partial load and a partial store.
pub(crate) fn row_blocked<T, V, const M: usize, const K: usize, const N: usize>(
    a: &[T],
    b: &[T],
    out: &mut [T],
) where
    T: Element,
    V: SimdVector<Scalar = T>,
{
    let chunks = N.div_ceil(V::LANES);
    assert!(chunks <= MAX_ROW_CHUNKS, "row of {} elements is too wide", N);
    assert!(a.len() >= M * K && b.len() >= K * N && out.len() >= M * N);

    let mut acc = [[V::zero(); MAX_ROW_CHUNKS]; M];
    let mut b_row = [V::zero(); MAX_ROW_CHUNKS];
    for k in 0..K {
        let row = &b[k * N..(k + 1) * N];
        for (c, slot) in b_row[..chunks].iter_mut().enumerate() {
            let start = c * V::LANES;
            *slot = if N - start >= V::LANES {
                V::load(&row[start..])
            } else {
                V::load_partial(&row[start..])
            };
        }
        for (i, acc_row) in acc.iter_mut().enumerate() {
            let scale = V::splat(a[i * K + k]);
            for c in 0..chunks {
                acc_row[c] = scale.mul_add(b_row[c], acc_row[c]);
            }
        }
    }

    for (i, acc_row) in acc.iter().enumerate() {
        let row = &mut out[i * N..(i + 1) * N];
        for (c, value) in acc_row[..chunks].iter().enumerate() {
            let start = c * V::LANES;
            if N - start >= V::LANES {
                value.store(&mut row[start..]);
            } else {
                value.store_partial(&mut row[start..]);
            }
        }
    }
}

/// Matrix-vector kernel: `out = a × x` for an `M×K` matrix `a`.
///
/// Rows are processed eight at a time, vectorised along `K`, with the last
/// `M % 8` rows handled by a seven- to one-row variant of the same loop.
pub(crate) fn matvec<T, V, const M: usize, const K: usize>(a: &[T], x: &[T], out: &mut [T])
where
    T: Element,
    V: SimdVector<Scalar = T>,
{
    assert!(a.len() >= M * K && x.len() >= K && out.len() >= M);
    let mut row = 0;
    while row + 8 <= M {
        matvec_rows::<T, V, K, 8>(&a[row * K..], x, &mut out[row..row + 8]);
        row += 8;
    }
    let rows = &a[row * K..];
    let tail = &mut out[row..M];
    match M - row {
        7 => matvec_rows::<T, V, K, 7>(rows, x, tail),
        6 => matvec_rows::<T, V, K, 6>(rows, x, tail),
        5 => matvec_rows::<T, V, K, 5>(rows, x, tail),
        4 => matvec_rows::<T, V, K, 4>(rows, x, tail),
        3 => matvec_rows::<T, V, K, 3>(rows, x, tail),
        2 => matvec_rows::<T, V, K, 2>(rows, x, tail),
        1 => matvec_rows::<T, V, K, 1>(rows, x, tail),
        _ => {}
    }
}

#[inline(always)]
fn matvec_rows<T, V, const K: usize, const R: usize>(a: &[T], x: &[T], out: &mut [T])
where
    T: Element,
    V: SimdVector<Scalar = T>,
{
    let body = round_down(K, V::LANES);
    let mut acc = [V::zero(); R];
    let mut k = 0;
    while k < body {
        let xv = V::load(&x[k..]);
        for (r, slot) in acc.iter_mut().enumerate() {
            *slot = V::load(&a[r * K + k..]).mul_add(xv, *slot);
        }
        k += V::LANES;
    }
    for (r, (slot, partial)) in out.iter_mut().zip(acc).enumerate() {
        let mut sum = partial.reduce_sum();
        for k in body..K {
            sum = a[r * K + k].mul_add(x[k], sum);
        }
        *slot = sum;
    }
}

/// Cache-blocked `i-k-j` triple loop for any shape and element type. The
/// innermost loop runs over contiguous output columns and uses the element
/// type's native vector where a whole chunk fits.
pub(crate) fn blocked<T: Element, const M: usize, const K: usize, const N: usize>(
    a: &[T],
    b: &[T],
    out: &mut [T],
) {
    log_trace!(m = M, k = K, n = N, "blocked matmul fallback");
    assert!(a.len() >= M * K && b.len() >= K * N && out.len() >= M * N);
    let lanes = <T::Simd as SimdVector>::LANES;
    out[..M * N].fill(T::ZERO);

    for i0 in (0..M).step_by(BLOCK) {
        let i1 = (i0 + BLOCK).min(M);
        for k0 in (0..K).step_by(BLOCK) {
            let k1 = (k0 + BLOCK).min(K);
            for j0 in (0..N).step_by(BLOCK) {
                let j1 = (j0 + BLOCK).min(N);
                for i in i0..i1 {
                    for k in k0..k1 {
                        let scale = a[i * K + k];
                        let broadcast = T::Simd::splat(scale);
                        let b_row = &b[k * N..(k + 1) * N];
                        let c_row = &mut out[i * N..(i + 1) * N];
                        let mut j = j0;
                        while j + lanes <= j1 {
                            let c = T::Simd::load(&c_row[j..]);
                            broadcast
                                .mul_add(T::Simd::load(&b_row[j..]), c)
                                .store(&mut c_row[j..]);
                            j += lanes;
                        }
                        while j < j1 {
                            c_row[j] = scale.mul_add(b_row[j], c_row[j]);
                            j += 1;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::simd::Packed;
    use crate::tensor::Matrix;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn row_blocked_handles_partial_rows() {
        let mut rng = StdRng::seed_from_u64(21);

        let a = random_matrix::<f64, 3, 4>(&mut rng);
        let b = random_matrix::<f64, 4, 3>(&mut rng);
        let mut c = Matrix::<f64, 3, 3>::splat(f64::NAN);
        row_blocked::<f64, Packed<f64, 2>, 3, 4, 3>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (3, 4, 3), 1e-12);

        let a = random_matrix::<f32, 3, 9>(&mut rng);
        let b = random_matrix::<f32, 9, 3>(&mut rng);
        let mut c = Matrix::<f32, 3, 3>::splat(f32::NAN);
        row_blocked::<f32, Packed<f32, 4>, 3, 9, 3>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (3, 9, 3), 1e-6);

        let a = random_matrix::<f64, 8, 2>(&mut rng);
        let b = random_matrix::<f64, 2, 8>(&mut rng);
        let mut c = Matrix::<f64, 8, 8>::zeros();
        row_blocked::<f64, Packed<f64, 2>, 8, 2, 8>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (8, 2, 8), 1e-12);
    }

    #[test]
    fn matvec_covers_every_row_tail() {
        let mut rng = StdRng::seed_from_u64(22);
        macro_rules! check {
            ($($m:literal),+) => {$({
                let a = random_matrix::<f64, $m, 7>(&mut rng);
                let x = random_matrix::<f64, 7, 1>(&mut rng);
                let mut y = Matrix::<f64, $m, 1>::splat(f64::NAN);
                matvec::<f64, Packed<f64, 4>, $m, 7>(a.as_slice(), x.as_slice(), y.as_mut_slice());
                assert_matches_reference(a.as_slice(), x.as_slice(), y.as_slice(), ($m, 7, 1), 1e-12);
            })+};
        }
        check!(1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17);
    }

    #[test]
    fn blocked_spans_several_tiles() {
        let mut rng = StdRng::seed_from_u64(23);
        let a = random_matrix::<f32, 19, 33>(&mut rng);
        let b = random_matrix::<f32, 33, 21>(&mut rng);
        let mut c = Matrix::<f32, 19, 21>::splat(5.0);
        blocked::<f32, 19, 33, 21>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_matches_reference(a.as_slice(), b.as_slice(), c.as_slice(), (19, 33, 21), 1e-6);
    }

    #[test]
    fn empty_inner_dimension_yields_zeros() {
        let a = Matrix::<f64, 2, 0>::zeros();
        let b = Matrix::<f64, 0, 2>::zeros();
        let mut c = Matrix::<f64, 2, 2>::splat(1.0);
        blocked::<f64, 2, 0, 2>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_eq!(c.as_slice(), &[0.0; 4]);
        row_blocked::<f64, Packed<f64, 2>, 2, 0, 2>(a.as_slice(), b.as_slice(), c.as_mut_slice());
        assert_eq!(c.as_slice(), &[0.0; 4]);
    }
}
