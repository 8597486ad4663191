// matrix.rs
// Matrix operations for the computational graph.
// Neither is element-wise, so both replace the shared chain rules with their
// own block contractions.

use super::basic::rhs;
use super::{LocalDerivatives, Operator, Skip};
use crate::block;
use crate::error::Result;
use crate::graph::{DerivativeMap, PendingAdjoint, Var};
use crate::value::Value;

/// Matrix multiplication: output = a @ b
#[derive(Debug, Clone, Copy, Default)]
pub struct MatMul;

impl Operator for MatMul {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.matmul(rhs(b)?)
    }

    /// The "local derivative" of a product is the other factor; the
    /// contraction that applies it lives in `forward` and `backprop`.
    fn local_derivative(
        &self,
        a: &Value,
        b: Option<&Value>,
        _out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        let b = rhs(b)?;
        LocalDerivatives::binary(skip, || Ok(b.clone()), || Ok(a.clone()))
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "@"
    }

    fn forward(&self, a: &Var, b: Option<&Var>, _out: &Value) -> Result<DerivativeMap> {
        let Some(b) = b else {
            return Ok(DerivativeMap::new());
        };
        let a_node = a.node();
        let b_node = b.node();
        let a_value = a_node.value.to_matrix();
        let b_value = b_node.value.to_matrix();

        let mut derivatives = DerivativeMap::new();
        for (name, da) in &a_node.derivatives {
            block::accumulate(
                &mut derivatives,
                name.clone(),
                block::matmul_forward_lhs(da, &b_value)?,
            )?;
        }
        for (name, db) in &b_node.derivatives {
            block::accumulate(
                &mut derivatives,
                name.clone(),
                block::matmul_forward_rhs(&a_value, db)?,
            )?;
        }
        Ok(derivatives)
    }

    fn backprop(
        &self,
        a: &Var,
        b: Option<&Var>,
        _out: &Value,
        adjoint: &PendingAdjoint,
    ) -> Result<()> {
        let Some(b) = b else {
            return Ok(());
        };
        // Copied up front: `a` and `b` may be the same node.
        let a_value = a.value().to_matrix();
        let b_value = b.value().to_matrix();

        for (consumer, dfdc) in adjoint {
            if !a.is_constant() {
                a.accumulate_pending(*consumer, block::matmul_reverse_lhs(dfdc, &b_value)?)?;
            }
            if !b.is_constant() {
                b.accumulate_pending(*consumer, block::matmul_reverse_rhs(dfdc, &a_value)?)?;
            }
        }
        Ok(())
    }
}

/// Matrix transpose: output = a^T. Scalars pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transpose;

impl Operator for Transpose {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.transpose())
    }

    fn local_derivative(
        &self,
        _a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(Value::Scalar(1.0)))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        ".T"
    }

    fn forward(&self, a: &Var, _b: Option<&Var>, _out: &Value) -> Result<DerivativeMap> {
        Ok(a.node()
            .derivatives
            .iter()
            .map(|(name, block)| (name.clone(), block::transpose_forward(block)))
            .collect())
    }

    fn backprop(
        &self,
        a: &Var,
        _b: Option<&Var>,
        _out: &Value,
        adjoint: &PendingAdjoint,
    ) -> Result<()> {
        if a.is_constant() {
            return Ok(());
        }
        for (consumer, dfdc) in adjoint {
            a.accumulate_pending(*consumer, block::transpose_reverse(dfdc))?;
        }
        Ok(())
    }
}
