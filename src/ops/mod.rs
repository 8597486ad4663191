// ops/mod.rs
// The elementary operation table. Every operator states its value and its
// local derivatives; the forward and reverse chain rules below are shared by
// all element-wise operators. Operators that are not element-wise (MatMul,
// Transpose) override `forward` and `backprop`.
use crate::block;
use crate::error::{Error, Result};
use crate::graph::{DerivativeMap, GraphContext, PendingAdjoint, Provenance, Var};
use crate::value::Value;
use log::trace;
use ndarray::Array2;
use std::any::type_name;
use std::rc::Rc;

pub mod basic;
pub mod matrix;
pub mod overload;
pub mod unary;

pub use basic::{Add, Div, Mul, Pow, Sub};
pub use matrix::{MatMul, Transpose};
pub use unary::{Abs, Cos, Exp, Log, Logistic, Neg, Pos, Sin, Tan};

/// Operands whose local derivative is not needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Skip {
    pub lhs: bool,
    pub rhs: bool,
}

impl Skip {
    /// Constants never need a local derivative.
    pub fn for_operands(a: &Var, b: Option<&Var>) -> Self {
        Self {
            lhs: a.is_constant(),
            rhs: b.is_none_or(Var::is_constant),
        }
    }
}

/// Local partial derivatives of a result with respect to each operand.
/// `None` marks a skipped operand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalDerivatives {
    pub lhs: Option<Value>,
    pub rhs: Option<Value>,
}

impl LocalDerivatives {
    pub fn unary(lhs: Value) -> Self {
        Self { lhs: Some(lhs), rhs: None }
    }

    /// Build both sides, evaluating each only when it is not skipped.
    pub fn binary(
        skip: Skip,
        lhs: impl FnOnce() -> Result<Value>,
        rhs: impl FnOnce() -> Result<Value>,
    ) -> Result<Self> {
        Ok(Self {
            lhs: if skip.lhs { None } else { Some(lhs()?) },
            rhs: if skip.rhs { None } else { Some(rhs()?) },
        })
    }
}

// All operators in the computational graph implement this trait.
pub trait Operator: std::fmt::Debug {
    /// Numeric result of the operation.
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value>;

    /// Local derivatives of the result `out` with respect to `a` and `b`.
    fn local_derivative(
        &self,
        a: &Value,
        b: Option<&Value>,
        out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives>;

    // Get number of inputs this operator expects
    fn num_inputs(&self) -> usize;

    /// Short label used when drawing the graph.
    fn symbol(&self) -> &'static str;

    fn name(&self) -> String {
        let full_name = type_name::<Self>();
        full_name
            .rsplit("::")
            .next()
            .unwrap_or(full_name)
            .to_string()
    }

    /// Forward chain rule: combine the operands' derivative maps with the
    /// local derivatives into the result's derivative map.
    fn forward(&self, a: &Var, b: Option<&Var>, out: &Value) -> Result<DerivativeMap> {
        let local = {
            let a_value = a.value();
            let b_value = b.map(|b| b.value());
            self.local_derivative(&a_value, b_value.as_deref(), out, Skip::for_operands(a, b))?
        };

        let mut derivatives = DerivativeMap::new();
        chain_forward(&mut derivatives, a, local.lhs.as_ref(), out.dims())?;
        if let Some(b) = b {
            chain_forward(&mut derivatives, b, local.rhs.as_ref(), out.dims())?;
        }
        Ok(derivatives)
    }

    /// Reverse chain rule: multiply the adjoint by each operand's local
    /// derivative and accumulate it into that operand's pending adjoint,
    /// keyed by the same consumer.
    fn backprop(
        &self,
        a: &Var,
        b: Option<&Var>,
        out: &Value,
        adjoint: &PendingAdjoint,
    ) -> Result<()> {
        let local = {
            let a_value = a.value();
            let b_value = b.map(|b| b.value());
            self.local_derivative(&a_value, b_value.as_deref(), out, Skip::for_operands(a, b))?
        };

        chain_reverse(a, local.lhs.as_ref(), adjoint)?;
        if let Some(b) = b {
            chain_reverse(b, local.rhs.as_ref(), adjoint)?;
        }
        Ok(())
    }
}

fn chain_forward(
    derivatives: &mut DerivativeMap,
    operand: &Var,
    local: Option<&Value>,
    out: (usize, usize),
) -> Result<()> {
    let Some(local) = local else {
        return Ok(());
    };
    let node = operand.node();
    for (name, block) in &node.derivatives {
        block::accumulate(
            derivatives,
            name.clone(),
            block::scale_forward(block, local, out)?,
        )?;
    }
    Ok(())
}

fn chain_reverse(operand: &Var, local: Option<&Value>, adjoint: &PendingAdjoint) -> Result<()> {
    let Some(local) = local else {
        return Ok(());
    };
    let dims = operand.value().dims();
    for (consumer, block) in adjoint {
        operand.accumulate_pending(*consumer, block::scale_reverse(block, local, dims)?)?;
    }
    Ok(())
}

/// An operand as handed to the dispatcher: a plain value or a graph node.
#[derive(Debug, Clone)]
pub enum Operand {
    Constant(Value),
    Node(Var),
}

impl Operand {
    pub fn into_var(self) -> Var {
        match self {
            Operand::Constant(value) => Var::constant(value),
            Operand::Node(var) => var,
        }
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Constant(Value::Scalar(value))
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Constant(Value::from(value))
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Constant(value)
    }
}

impl From<Array2<f64>> for Operand {
    fn from(value: Array2<f64>) -> Self {
        Operand::Constant(Value::Matrix(value))
    }
}

impl From<Var> for Operand {
    fn from(value: Var) -> Self {
        Operand::Node(value)
    }
}

impl From<&Var> for Operand {
    fn from(value: &Var) -> Self {
        Operand::Node(value.clone())
    }
}

/// Apply a unary operator, producing a new node.
pub fn apply_unary(op: Rc<dyn Operator>, a: impl Into<Operand>) -> Result<Var> {
    apply(op, vec![a.into().into_var()])
}

/// Apply a binary operator, producing a new node.
pub fn apply_binary(
    op: Rc<dyn Operator>,
    a: impl Into<Operand>,
    b: impl Into<Operand>,
) -> Result<Var> {
    apply(op, vec![a.into().into_var(), b.into().into_var()])
}

fn apply(op: Rc<dyn Operator>, operands: Vec<Var>) -> Result<Var> {
    if operands.len() != op.num_inputs() {
        return Err(Error::invalid_argument(
            "operands",
            format!(
                "{} expects {} inputs, got {}",
                op.name(),
                op.num_inputs(),
                operands.len()
            ),
        ));
    }

    let a = &operands[0];
    let b = operands.get(1);

    let value = {
        let a_value = a.value();
        let b_value = b.map(|b| b.value());
        op.compute(&a_value, b_value.as_deref())?
    };

    let mode = b.map_or(a.mode(), |b| a.mode().combine(b.mode()));
    let context = GraphContext::merge(
        a.context().as_ref(),
        b.and_then(Var::context).as_ref(),
    )?;

    // Reverse and Mix results are differentiated later by a backward pass.
    let derivatives = if mode.is_eager() {
        op.forward(a, b, &value)?
    } else {
        DerivativeMap::new()
    };

    let provenance = Provenance {
        op: Rc::clone(&op),
        operands: operands.clone(),
    };
    let var = Var::from_operation(value, mode, context, provenance, derivatives);
    trace!(
        "{} -> node {} ({:?}, shape {}, {} derivative(s))",
        op.name(),
        var.id().0,
        mode,
        var.value().shape(),
        var.node().derivatives.len()
    );
    Ok(var)
}

pub fn add(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(Add), a, b)
}

pub fn sub(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(Sub), a, b)
}

pub fn mul(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(Mul), a, b)
}

pub fn div(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(Div), a, b)
}

pub fn pow(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(Pow), a, b)
}

pub fn sqrt(a: impl Into<Operand>) -> Result<Var> {
    pow(a, 0.5)
}

pub fn neg(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Neg), a)
}

pub fn pos(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Pos), a)
}

pub fn abs(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Abs), a)
}

pub fn exp(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Exp), a)
}

/// Logarithm of `a` in base `base`. Both may be graph nodes.
pub fn log(a: impl Into<Operand>, base: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(Log), a, base)
}

/// Natural logarithm.
pub fn ln(a: impl Into<Operand>) -> Result<Var> {
    log(a, std::f64::consts::E)
}

pub fn logistic(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Logistic), a)
}

pub fn sigmoid(a: impl Into<Operand>) -> Result<Var> {
    logistic(a)
}

pub fn sin(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Sin), a)
}

pub fn cos(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Cos), a)
}

pub fn tan(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Tan), a)
}

pub fn matmul(a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Var> {
    apply_binary(Rc::new(MatMul), a, b)
}

pub fn transpose(a: impl Into<Operand>) -> Result<Var> {
    apply_unary(Rc::new(Transpose), a)
}

impl Var {
    pub fn pow(&self, exponent: impl Into<Operand>) -> Result<Var> {
        pow(self, exponent)
    }

    pub fn sqrt(&self) -> Result<Var> {
        sqrt(self)
    }

    pub fn abs(&self) -> Result<Var> {
        abs(self)
    }

    pub fn exp(&self) -> Result<Var> {
        exp(self)
    }

    pub fn log(&self, base: impl Into<Operand>) -> Result<Var> {
        log(self, base)
    }

    pub fn ln(&self) -> Result<Var> {
        ln(self)
    }

    pub fn sigmoid(&self) -> Result<Var> {
        logistic(self)
    }

    pub fn sin(&self) -> Result<Var> {
        sin(self)
    }

    pub fn cos(&self) -> Result<Var> {
        cos(self)
    }

    pub fn tan(&self) -> Result<Var> {
        tan(self)
    }

    pub fn matmul(&self, other: impl Into<Operand>) -> Result<Var> {
        matmul(self, other)
    }

    /// Matrix transpose; a no-op on scalars.
    pub fn t(&self) -> Result<Var> {
        transpose(self)
    }
}
