// overload.rs
// `std::ops` arithmetic on graph nodes.
//
// # Panics
//
// The operator traits cannot return a `Result`, so a failing operation
// (for example adding two matrices of different shapes) panics with the
// error message, like ndarray's own arithmetic operators. Use the functions
// in `crate::ops` to get the error instead.

use super::{Operand, add, div, mul, neg, sub};
use crate::error::Result;
use crate::graph::Var;

fn overloaded(result: Result<Var>) -> Var {
    result.unwrap_or_else(|e| panic!("{e}"))
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl<R: Into<Operand>> std::ops::$trait<R> for Var {
            type Output = Var;

            fn $method(self, rhs: R) -> Var {
                overloaded($func(self, rhs))
            }
        }

        impl<R: Into<Operand>> std::ops::$trait<R> for &Var {
            type Output = Var;

            fn $method(self, rhs: R) -> Var {
                overloaded($func(self, rhs))
            }
        }

        impl std::ops::$trait<Var> for f64 {
            type Output = Var;

            fn $method(self, rhs: Var) -> Var {
                overloaded($func(self, rhs))
            }
        }

        impl std::ops::$trait<&Var> for f64 {
            type Output = Var;

            fn $method(self, rhs: &Var) -> Var {
                overloaded($func(self, rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, add);
impl_binary_op!(Sub, sub, sub);
impl_binary_op!(Mul, mul, mul);
impl_binary_op!(Div, div, div);

impl std::ops::Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        overloaded(neg(self))
    }
}

impl std::ops::Neg for &Var {
    type Output = Var;

    fn neg(self) -> Var {
        overloaded(neg(self))
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{Var, VarName};
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_operators_build_graph() {
        let x = Var::variable(3.0, "x").unwrap();
        let y = Var::variable(2.0, "y").unwrap();
        let f = &x * &y + 2.0 * &x - &y / 4.0;
        // f = xy + 2x - y/4
        assert_relative_eq!(f.value().as_scalar().unwrap(), 6.0 + 6.0 - 0.5);
        let derivatives = f.derivatives();
        assert_relative_eq!(derivatives[&VarName::from("x")][[0, 0, 0, 0]], 4.0);
        assert_relative_eq!(derivatives[&VarName::from("y")][[0, 0, 0, 0]], 2.75);
    }

    #[test]
    fn test_negation() {
        let x = Var::variable(3.0, "x").unwrap();
        let f = -&x;
        assert_relative_eq!(f.value().as_scalar().unwrap(), -3.0);
        assert_relative_eq!(f.derivatives()[&VarName::from("x")][[0, 0, 0, 0]], -1.0);
    }

    #[test]
    #[should_panic(expected = "Shape mismatch")]
    fn test_shape_mismatch_panics() {
        let a = Var::variable(arr2(&[[1.0, 2.0]]), "a").unwrap();
        let b = Var::variable(arr2(&[[1.0], [2.0]]), "b").unwrap();
        let _ = a + b;
    }
}
