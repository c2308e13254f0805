//! # fixtensor - Fixed-Shape Tensors with SIMD Expression Evaluation
//!
//! * Rank and per-axis extents are part of the tensor type; storage is an
//!   aligned nested array on the stack, never on the heap.
//! * Arithmetic builds lazy expression trees that are evaluated once, in a
//!   single vectorised pass, when assigned into a destination.
//! * Matrix products are routed to shape-specialised kernels: fully unrolled
//!   micro-kernels for 2×2×2, 3×3×3, 4×4×4 and 8×8×8, row-blocked kernels for
//!   small square outputs with any inner length, a matrix-vector kernel and a
//!   generic blocked fallback.
//! * Targets x86 SSE, AVX, AVX-512 and Arm NEON, selected at build time.
//!
//! ## Building blocks
//!
//! * [`Tensor`], [`Matrix`], [`Vector`] - dense values.
//! * [`Expression`] - anything that can be evaluated element by element.
//! * [`Destination`] - anything an expression can be assigned into: tensors,
//!   [`TensorCells`] handles and writable views.
//! * [`View1`], [`View2`] - strided fixed-range windows into a tensor.
//! * [`matmul()`] - the kernel dispatcher.
//!
//! # Example
//!
//! ```rust
//! use fixtensor::{Destination, Matrix, Vector};
//!
//! let a = Matrix::<f32, 2, 2>::from([[1.0, 2.0], [3.0, 4.0]]);
//! let b = Matrix::<f32, 2, 2>::from([[5.0, 6.0], [7.0, 8.0]]);
//! assert_eq!(a.matmul(&b).as_slice(), &[19.0, 22.0, 43.0, 50.0]);
//!
//! let mut x = Vector::<f64, 4>::from([1.0, 2.0, 3.0, 4.0]);
//! let y = Vector::<f64, 4>::splat(0.5);
//! x.try_assign(&y * 2.0 + &y).unwrap();
//! assert_eq!(x.as_slice(), &[1.5; 4]);
//! x /= 2.0;
//! assert_eq!(x.as_slice(), &[0.75; 4]);
//! ```
//!
//! # Overlapping assignment
//!
//! A tensor cannot be borrowed mutably and immutably at once, so in-place
//! shifts go through [`Tensor::cells`], which hands out views sharing the
//! same elements. Raising the alias flag on the destination view makes the
//! assignment evaluate through a temporary:
//!
//! ```rust
//! use fixtensor::{Destination, Vector};
//!
//! let mut x = Vector::<f32, 4>::from([1.0, 2.0, 3.0, 4.0]);
//! let cells = x.cells();
//! let source = cells.view::<1, 4, 1>();
//! cells.view::<0, 3, 1>().aliased().try_assign(&source).unwrap();
//! assert_eq!(x.as_slice(), &[2.0, 3.0, 4.0, 4.0]);
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

/// Emits a `tracing` event at TRACE level when the `tracing` feature is on.
macro_rules! log_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        tracing::trace!($($arg)*);
    };
}

/// Emits a `tracing` event at DEBUG level when the `tracing` feature is on.
macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        tracing::debug!($($arg)*);
    };
}

pub mod aliasing;
pub mod assign;
pub mod expression;
pub mod matmul;
pub mod scalars;
pub mod shape;
pub mod simd;
pub mod tensor;
pub mod view;

pub use aliasing::does_alias;
pub use assign::{assign, assign_scalar, AssignOp, Destination};
pub use expression::{Binary, Cast, Expression, ExpressionExt, MatMul, MatrixOperand, Splat, Unary};
pub use matmul::{
    kernel_for, lazy_matmul, matmul, matmul_into, matmul_mixed, matvec, select_kernel, ElementKind,
    KernelKind,
};
pub use scalars::Element;
pub use shape::{Dim1, Dim2, Dim3, Dim4, Shape};
pub use simd::{best_width, cap, capabilities, Packed, SimdVector, Tier, TIER};
pub use tensor::{
    Layout, Matrix, ShapeDescriptor, Tensor, TensorCells, TensorError, Vector, SIMD_ALIGNMENT,
};
pub use view::{Backing, BackingMut, View1, View2};
