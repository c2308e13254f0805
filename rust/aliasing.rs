//! Alias detection between an assignment's destination and its source tree.
//!
//! Detection compares start addresses only. A source leaf aliases the
//! destination when it begins at the destination's first element; partial
//! overlaps between strided views are not detected, and view destinations
//! rely on the caller-raised flag instead (see [`crate::view`]).

use crate::assign::Destination;
use crate::expression::Expression;

/// Returns `true` if any leaf reachable from `src` starts at the same address
/// as `dst`. Binary and matrix-product nodes check both operands.
#[inline]
pub fn does_alias<D: Destination, E: Expression>(dst: &D, src: &E) -> bool {
    src.aliases(dst.address())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::MatMul;
    use crate::tensor::{Matrix, Vector};

    #[test]
    fn distinct_tensors_do_not_alias() {
        let a = Vector::<f32, 8>::zeros();
        let b = Vector::<f32, 8>::zeros();
        let dst = Vector::<f32, 8>::zeros();
        assert!(!does_alias(&dst, &(&a + &b)));
        assert!(!does_alias(&dst, &(&a * 2.0f32)));
    }

    #[test]
    fn cells_alias_with_their_own_leaves() {
        let mut t = Vector::<f64, 4>::zeros();
        let other = Vector::<f64, 4>::zeros();
        let cells = t.cells();
        assert!(does_alias(&cells, &cells));
        assert!(does_alias(&cells, &(&other - cells)));
        assert!(does_alias(&cells, &(-(&other + cells * 3.0))));
        assert!(!does_alias(&cells, &(&other + 1.0)));

        let shifted = cells.view::<0, 4, 1>();
        assert!(does_alias(&cells, &(&shifted + &other)));
    }

    #[test]
    fn matmul_operands_are_walked() {
        let mut c = Matrix::<f64, 3, 3>::eye();
        let b = Matrix::<f64, 3, 3>::eye();
        let cells = c.cells();
        assert!(does_alias(&cells, &MatMul::new(cells, &b)));
        assert!(does_alias(&cells, &(MatMul::new(&b, cells) + &b)));
        assert!(!does_alias(&cells, &MatMul::new(&b, &b)));
    }
}
