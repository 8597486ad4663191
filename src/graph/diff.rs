// diff.rs
// User-facing differentiation: shape squeezing and result selection.

use super::engine::ReversePass;
use super::node::{Var, VarName};
use crate::block::Block;
use crate::error::{Error, Result};
use crate::value::Shape;
use ndarray::{ArrayD, Axis};
use std::collections::BTreeMap;

/// A derivative as returned to the user: a plain number, or an array whose
/// unit axes have been dropped (or the raw 4-D block).
#[derive(Debug, Clone, PartialEq)]
pub enum Derivative {
    Scalar(f64),
    Array(ArrayD<f64>),
}

impl Derivative {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Derivative::Scalar(s) => Some(*s),
            Derivative::Array(_) => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Derivative::Scalar(_) => None,
            Derivative::Array(array) => Some(array),
        }
    }

    /// Empty for a scalar.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Derivative::Scalar(_) => Vec::new(),
            Derivative::Array(array) => array.shape().to_vec(),
        }
    }
}

impl PartialEq<f64> for Derivative {
    fn eq(&self, other: &f64) -> bool {
        self.as_scalar() == Some(*other)
    }
}

/// Which derivatives `differentiate` should return.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Wrt {
    /// Everything the node has.
    #[default]
    All,
    One(VarName),
    Many(Vec<VarName>),
}

impl From<VarName> for Wrt {
    fn from(value: VarName) -> Self {
        Wrt::One(value)
    }
}

impl From<&VarName> for Wrt {
    fn from(value: &VarName) -> Self {
        Wrt::One(value.clone())
    }
}

impl From<&str> for Wrt {
    fn from(value: &str) -> Self {
        Wrt::One(value.into())
    }
}

impl From<String> for Wrt {
    fn from(value: String) -> Self {
        Wrt::One(value.into())
    }
}

impl From<i64> for Wrt {
    fn from(value: i64) -> Self {
        Wrt::One(value.into())
    }
}

impl From<i32> for Wrt {
    fn from(value: i32) -> Self {
        Wrt::One(value.into())
    }
}

impl From<Vec<VarName>> for Wrt {
    fn from(value: Vec<VarName>) -> Self {
        Wrt::Many(value)
    }
}

impl From<Vec<&str>> for Wrt {
    fn from(value: Vec<&str>) -> Self {
        Wrt::Many(value.into_iter().map(VarName::from).collect())
    }
}

impl From<&[&str]> for Wrt {
    fn from(value: &[&str]) -> Self {
        Wrt::Many(value.iter().copied().map(VarName::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Wrt {
    fn from(value: [&str; N]) -> Self {
        Wrt::Many(value.into_iter().map(VarName::from).collect())
    }
}

/// Result of `differentiate`, shaped by the `Wrt` that was asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Differentiated {
    Single(Derivative),
    Map(BTreeMap<VarName, Derivative>),
    List(Vec<Derivative>),
}

impl Differentiated {
    pub fn as_single(&self) -> Option<&Derivative> {
        match self {
            Differentiated::Single(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<VarName, Derivative>> {
        match self {
            Differentiated::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Derivative]> {
        match self {
            Differentiated::List(list) => Some(list),
            _ => None,
        }
    }

    /// Shortcut for a single scalar result.
    pub fn as_scalar(&self) -> Option<f64> {
        self.as_single().and_then(Derivative::as_scalar)
    }
}

impl Var {
    /// Collapse a 4-D block for input `name` into a conventional Jacobian.
    ///
    /// Scalar inputs drop both trailing axes, leaving a scalar for a scalar
    /// node and the node's own `(m, n)` shape otherwise. Matrix inputs must
    /// match the trailing axes exactly; then one unit axis of the input pair
    /// and one unit axis of the value pair are dropped. Hence a scalar node
    /// and a `(3, 1)` input give a `(1, 3)` row, and a `(3, 1)` node with a
    /// `(3, 1)` input gives a `(3, 3)` Jacobian.
    pub fn squeeze(&self, name: &VarName, block: &Block) -> Result<Derivative> {
        let shape = self
            .context()
            .and_then(|ctx| ctx.shape_of(name))
            .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
        let (m, n, k, l) = block.dim();

        match shape {
            Shape::Scalar => {
                if (k, l) != (1, 1) {
                    return Err(Error::shape_mismatch(&[m, n, 1, 1], block.shape()));
                }
                if self.value().is_scalar() {
                    return Ok(Derivative::Scalar(block[[0, 0, 0, 0]]));
                }
                let matrix = block
                    .clone()
                    .index_axis_move(Axis(3), 0)
                    .index_axis_move(Axis(2), 0);
                Ok(Derivative::Array(matrix.into_dyn()))
            }
            Shape::Matrix(rows, cols) => {
                if (k, l) != (rows, cols) {
                    return Err(Error::shape_mismatch(&[m, n, rows, cols], block.shape()));
                }
                // Input axes first, so the value axes keep their positions.
                let mut jacobian = block.clone().into_dyn();
                if k == 1 {
                    jacobian = jacobian.remove_axis(Axis(2));
                } else if l == 1 {
                    jacobian = jacobian.remove_axis(Axis(3));
                }
                if m == 1 {
                    jacobian = jacobian.remove_axis(Axis(0));
                } else if n == 1 {
                    jacobian = jacobian.remove_axis(Axis(1));
                }
                Ok(Derivative::Array(jacobian))
            }
        }
    }

    /// Derivatives of this node.
    ///
    /// Reverse and Mix nodes run a reverse pass on first use; the result is
    /// kept, so later calls are lookups. With `raw` the 4-D blocks are
    /// returned unsqueezed.
    ///
    /// - `Wrt::All`: `0` with no derivatives, the single value with one,
    ///   otherwise the full map.
    /// - `Wrt::Many`: one entry per name in order, `0` for missing names.
    /// - `Wrt::One`: the value, or `UnknownVariable` if it is missing.
    pub fn differentiate(&self, wrt: impl Into<Wrt>, raw: bool) -> Result<Differentiated> {
        self.ensure_derivatives()?;
        let derivatives = self.derivatives();
        let convert = |name: &VarName, block: &Block| -> Result<Derivative> {
            if raw {
                Ok(Derivative::Array(block.clone().into_dyn()))
            } else {
                self.squeeze(name, block)
            }
        };

        match wrt.into() {
            Wrt::All => {
                let mut map: BTreeMap<VarName, Derivative> = derivatives
                    .iter()
                    .map(|(name, block)| Ok((name.clone(), convert(name, block)?)))
                    .collect::<Result<_>>()?;
                if map.len() > 1 {
                    return Ok(Differentiated::Map(map));
                }
                Ok(Differentiated::Single(
                    map.pop_first()
                        .map_or(Derivative::Scalar(0.0), |(_, derivative)| derivative),
                ))
            }
            Wrt::Many(names) => {
                let list = names
                    .iter()
                    .map(|name| {
                        name.validate("wrt")?;
                        match derivatives.get(name) {
                            Some(block) => convert(name, block),
                            None => Ok(Derivative::Scalar(0.0)),
                        }
                    })
                    .collect::<Result<_>>()?;
                Ok(Differentiated::List(list))
            }
            Wrt::One(name) => {
                name.validate("wrt")?;
                let block = derivatives
                    .get(&name)
                    .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
                Ok(Differentiated::Single(convert(&name, block)?))
            }
        }
    }

    /// Squeezed derivative with respect to one input.
    pub fn grad(&self, name: impl Into<VarName>) -> Result<Derivative> {
        let name = name.into();
        match self.differentiate(Wrt::One(name.clone()), false)? {
            Differentiated::Single(derivative) => Ok(derivative),
            _ => Err(Error::UnknownVariable(name)),
        }
    }

    /// Squeezed derivatives with respect to every input the node depends on.
    pub fn grads(&self) -> Result<BTreeMap<VarName, Derivative>> {
        self.ensure_derivatives()?;
        self.derivatives()
            .iter()
            .map(|(name, block)| Ok((name.clone(), self.squeeze(name, block)?)))
            .collect()
    }

    fn ensure_derivatives(&self) -> Result<()> {
        let needs_pass = {
            let node = self.node();
            node.derivatives.is_empty() && node.provenance.is_some()
        };
        if needs_pass && !self.is_constant() {
            ReversePass::new(self).run()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block;
    use crate::value::Value;
    use ndarray::arr2;

    #[test]
    fn test_squeeze_scalar_to_scalar() {
        let x = Var::variable(2.0, "x").unwrap();
        let block = block::identity_for(&Value::from(2.0));
        assert_eq!(x.squeeze(&"x".into(), &block).unwrap(), 1.0);
    }

    #[test]
    fn test_squeeze_unknown_name() {
        let x = Var::variable(2.0, "x").unwrap();
        let block = block::identity_for(&Value::from(2.0));
        assert!(matches!(
            x.squeeze(&"y".into(), &block),
            Err(Error::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_squeeze_checks_trailing_axes() {
        let x = Var::variable(arr2(&[[1.0], [2.0], [3.0]]), "x").unwrap();
        let wrong = Block::zeros((1, 1, 1, 3));
        assert!(matches!(
            x.squeeze(&"x".into(), &wrong),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_squeeze_matrix_keeps_non_unit_axes() {
        let w = Var::variable(arr2(&[[1.0, 2.0], [3.0, 4.0]]), "w").unwrap();
        let block = w.derivatives()[&VarName::from("w")].clone();
        let jacobian = w.squeeze(&"w".into(), &block).unwrap();
        assert_eq!(jacobian.shape(), vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_wrt_conversions() {
        assert_eq!(Wrt::from("x"), Wrt::One(VarName::from("x")));
        assert_eq!(Wrt::from(3), Wrt::One(VarName::Index(3)));
        assert_eq!(
            Wrt::from(["x", "y"]),
            Wrt::Many(vec![VarName::from("x"), VarName::from("y")])
        );
    }

    #[test]
    fn test_empty_wrt_name_is_invalid() {
        let x = Var::variable(2.0, "x").unwrap();
        assert!(matches!(
            x.differentiate("", false),
            Err(Error::InvalidArgument { .. })
        ));
    }
}
