// basic.rs
// Basic arithmetic operators. Binary, element-wise, with scalar broadcasting.

use super::{LocalDerivatives, Operator, Skip};
use crate::error::{Error, Result};
use crate::value::Value;

pub(super) fn rhs(b: Option<&Value>) -> Result<&Value> {
    b.ok_or_else(|| Error::invalid_argument("operands", "binary operation requires 2 inputs"))
}

/// Element-wise addition: output = a + b
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl Operator for Add {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.zip_with(rhs(b)?, |x, y| x + y)
    }

    fn local_derivative(
        &self,
        _a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        LocalDerivatives::binary(skip, || Ok(Value::Scalar(1.0)), || Ok(Value::Scalar(1.0)))
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "+"
    }
}

/// Element-wise subtraction: output = a - b
#[derive(Debug, Clone, Copy, Default)]
pub struct Sub;

impl Operator for Sub {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.zip_with(rhs(b)?, |x, y| x - y)
    }

    fn local_derivative(
        &self,
        _a: &Value,
        _b: Option<&Value>,
        _out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        LocalDerivatives::binary(skip, || Ok(Value::Scalar(1.0)), || Ok(Value::Scalar(-1.0)))
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "-"
    }
}

/// Element-wise multiplication: output = a * b
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl Operator for Mul {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.zip_with(rhs(b)?, |x, y| x * y)
    }

    fn local_derivative(
        &self,
        a: &Value,
        b: Option<&Value>,
        _out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        // d(a*b)/da = b, d(a*b)/db = a
        let b = rhs(b)?;
        LocalDerivatives::binary(skip, || Ok(b.clone()), || Ok(a.clone()))
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "*"
    }
}

/// Element-wise division: output = a / b
#[derive(Debug, Clone, Copy, Default)]
pub struct Div;

impl Operator for Div {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.zip_with(rhs(b)?, |x, y| x / y)
    }

    fn local_derivative(
        &self,
        _a: &Value,
        b: Option<&Value>,
        out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        // dc/da = 1/b, dc/db = -c/b
        let b = rhs(b)?;
        LocalDerivatives::binary(
            skip,
            || Ok(b.map(|y| 1.0 / y)),
            || out.zip_with(b, |c, y| -c / y),
        )
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "/"
    }
}

/// Element-wise power: output = a ^ b
#[derive(Debug, Clone, Copy, Default)]
pub struct Pow;

impl Operator for Pow {
    fn compute(&self, a: &Value, b: Option<&Value>) -> Result<Value> {
        a.zip_with(rhs(b)?, f64::powf)
    }

    fn local_derivative(
        &self,
        a: &Value,
        b: Option<&Value>,
        out: &Value,
        skip: Skip,
    ) -> Result<LocalDerivatives> {
        // dc/da = b * a^(b-1), dc/db = ln(a) * c
        let b = rhs(b)?;
        LocalDerivatives::binary(
            skip,
            || a.zip_with(b, |x, y| y * x.powf(y - 1.0)),
            || a.zip_with(out, |x, c| x.ln() * c),
        )
    }

    fn num_inputs(&self) -> usize {
        2
    }

    fn symbol(&self) -> &'static str {
        "power"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn both() -> Skip {
        Skip::default()
    }

    #[test]
    fn test_div_local_derivatives() {
        let (a, b) = (Value::from(4.0), Value::from(2.0));
        let out = Div.compute(&a, Some(&b)).unwrap();
        assert_eq!(out, Value::from(2.0));
        let local = Div.local_derivative(&a, Some(&b), &out, both()).unwrap();
        assert_eq!(local.lhs, Some(Value::from(0.5)));
        assert_eq!(local.rhs, Some(Value::from(-1.0)));
    }

    #[test]
    fn test_pow_local_derivatives() {
        let (a, b) = (Value::from(4.0), Value::from(2.0));
        let out = Pow.compute(&a, Some(&b)).unwrap();
        let local = Pow.local_derivative(&a, Some(&b), &out, both()).unwrap();
        assert_relative_eq!(local.lhs.unwrap().as_scalar().unwrap(), 8.0);
        assert_relative_eq!(
            local.rhs.unwrap().as_scalar().unwrap(),
            16.0 * 4.0f64.ln()
        );
    }

    #[test]
    fn test_skipped_sides_are_not_evaluated() {
        let (a, b) = (Value::from(-2.0), Value::from(3.0));
        let out = Pow.compute(&a, Some(&b)).unwrap();
        let skip = Skip { lhs: false, rhs: true };
        let local = Pow.local_derivative(&a, Some(&b), &out, skip).unwrap();
        assert_relative_eq!(local.lhs.unwrap().as_scalar().unwrap(), 12.0);
        assert!(local.rhs.is_none());
    }

    #[test]
    fn test_mul_broadcasts_scalar() {
        let m = Value::from(arr2(&[[1.0, 2.0]]));
        let out = Mul.compute(&Value::from(3.0), Some(&m)).unwrap();
        assert_eq!(out, Value::from(arr2(&[[3.0, 6.0]])));
    }
}
