#![allow(unused)]
use fixtensor::{Element, Matrix, Vector};
use rand::Rng;

pub(crate) fn generate_random_matrix<T: Element, const M: usize, const N: usize>() -> Matrix<T, M, N> {
    let mut out = Matrix::zeros();
    for slot in out.as_mut_slice() {
        *slot = T::from_f64(rand::thread_rng().gen());
    }
    out
}

pub(crate) fn generate_random_vector<T: Element, const N: usize>() -> Vector<T, N> {
    let mut out = Vector::zeros();
    for slot in out.as_mut_slice() {
        *slot = T::from_f64(rand::thread_rng().gen());
    }
    out
}

/// Textbook `i-j-k` triple loop over the flattened operands.
pub(crate) fn matmul_cpu<const M: usize, const K: usize, const N: usize>(a: &[f32], b: &[f32], out: &mut [f32]) {
    for i in 0..M {
        for j in 0..N {
            out[i * N + j] = (0..K).map(|k| a[i * K + k] * b[k * N + j]).sum();
        }
    }
}

/// `out = a * b + a` written as two passes over plain slices.
pub(crate) fn fused_update_cpu(a: &[f32], b: &[f32], out: &mut [f32]) {
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x * y;
    }
    for (o, x) in out.iter_mut().zip(a) {
        *o += x;
    }
}
