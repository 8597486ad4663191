// unary.rs
// Elementary functions. All element-wise; Log takes its base as a second
// operand so the base itself can be differentiated.

use super::basic::rhs;
use super::{LocalDerivatives, Operator, Skip};
use crate::error::Result;
use crate::value::Value;

/// Negation: output = -a
#[derive(Debug, Clone, Copy, Default)]
pub struct Neg;

impl Operator for Neg {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(|x| -x))
    }

    fn local_derivative(
        &self,
        _a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(Value::Scalar(-1.0)))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "-"
    }
}

/// Unary plus: output = a
#[derive(Debug, Clone, Copy, Default)]
pub struct Pos;

impl Operator for Pos {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.clone())
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
        "+"
    }
}

/// Element-wise absolute value: output = |a|
#[derive(Debug, Clone, Copy, Default)]
pub struct Abs;

impl Operator for Abs {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(f64::abs))
    }

    fn local_derivative(
        &self,
        a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        // Zero takes the positive branch.
        Ok(LocalDerivatives::unary(a.map(|x| if x < 0.0 { -1.0 } else { 1.0 })))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "abs"
    }
}

/// Element-wise exponential: output = exp(a)
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl Operator for Exp {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(f64::exp))
    }

    fn local_derivative(
        &self,
        _a: &Value,
        _b: Option<&Value>,
        out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(out.clone()))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "exp"
    }
}

/// Element-wise logarithm in an arbitrary base: output = log_b(a)
#[derive(Debug, Clone, Copy, Default)]
pub struct Log;

impl Operator for Log {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.zip_with(rhs(b)?, |x, base| x.ln() / base.ln())
    }

    fn local_derivative(
        &self,
        a: &Value,
        b: Option<&Value>,
        out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        // dc/da = 1 / (a ln b), dc/db = -c / (b ln b)
        let b = rhs(b)?;
        LocalDerivatives::binary(
            skip,
            || a.zip_with(b, |x, base| 1.0 / (x * base.ln())),
            || out.zip_with(b, |c, base| -c / (base * base.ln())),
        )
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "log"
    }
}

/// Logistic sigmoid: output = 1 / (1 + exp(-a))
#[derive(Debug, Clone, Copy, Default)]
pub struct Logistic;

impl Operator for Logistic {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(|x| 1.0 / (1.0 + (-x).exp())))
    }

    fn local_derivative(
        &self,
        _a: &Value,
        _b: Option<&Value>,
        out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(out.map(|c| c * (1.0 - c))))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "sigmoid"
    }
}

/// Element-wise sine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sin;

impl Operator for Sin {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(f64::sin))
    }

    fn local_derivative(
        &self,
        a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(a.map(f64::cos)))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "sin"
    }
}

/// Element-wise cosine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cos;

impl Operator for Cos {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(f64::cos))
    }

    fn local_derivative(
        &self,
        a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(a.map(|x| -x.sin())))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "cos"
    }
}

/// Element-wise tangent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tan;

impl Operator for Tan {
    fn compute(&self, a: &Value, _b: Option<&Value>) -> Result<Value> {
        Ok(a.map(f64::tan))
    }

    fn local_derivative(
        &self,
        a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        _skip: Skip,
    ) -> Result<LocalDerivatives> {
        Ok(LocalDerivatives::unary(a.map(|x| 1.0 / x.cos().powi(2))))
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn symbol(&self) -> &'static str {
        "tan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn local(op: &dyn Operator, x: f64) -> f64 {
        let a = Value::from(x);
        let out = op.compute(&a, None).unwrap();
        op.local_derivative(&a, None, &out, Skip::default())
            .unwrap()
            .lhs
            .and_then(|v| v.as_scalar())
            .unwrap()
    }

    #[test]
    fn test_elementary_local_derivatives() {
        assert_relative_eq!(local(&Neg, 2.0), -1.0);
        assert_relative_eq!(local(&Abs, -2.0), -1.0);
        assert_relative_eq!(local(&Abs, 0.0), 1.0);
        assert_relative_eq!(local(&Exp, 1.0), 1.0f64.exp());
        assert_relative_eq!(local(&Logistic, 0.0), 0.25);
        assert_relative_eq!(local(&Sin, 0.5), 0.5f64.cos());
        assert_relative_eq!(local(&Cos, 0.5), -(0.5f64.sin()));
        assert_relative_eq!(local(&Tan, 0.3), 1.0 / 0.3f64.cos().powi(2));
    }

    #[test]
    fn test_log_with_base() {
        let (a, b) = (Value::from(8.0), Value::from(2.0));
        let out = Log.compute(&a, Some(&b)).unwrap();
        assert_relative_eq!(out.as_scalar().unwrap(), 3.0, epsilon = 1e-12);

        let local = Log.local_derivative(&a, Some(&b), &out, Skip::default()).unwrap();
        assert_relative_eq!(
            local.lhs.unwrap().as_scalar().unwrap(),
            1.0 / (8.0 * 2.0f64.ln())
        );
        assert_relative_eq!(
            local.rhs.unwrap().as_scalar().unwrap(),
            -3.0 / (2.0 * 2.0f64.ln()),
            epsilon = 1e-12
        );
    }
}
