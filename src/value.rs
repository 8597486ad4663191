// value.rs
// Numeric payload of a graph node: either a plain scalar or a 2-D matrix.
// Higher ranks are rejected up front so every derivative block stays 4-D.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayD, Ix2, Zip};
use std::fmt;

/// Shape of a value as recorded in the shape registry.
///
/// Scalars keep their own variant instead of `(1, 1)` so that `squeeze`
/// can tell a true scalar apart from a one-element matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Matrix(usize, usize),
}

impl Shape {
    /// Rows and columns, with scalars mapped to `(1, 1)`.
    pub fn dims(&self) -> (usize, usize) {
        match *self {
            Shape::Scalar => (1, 1),
            Shape::Matrix(rows, cols) => (rows, cols),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Shape::Scalar)
    }

    /// numpy-style shape: `[]` for scalars, `[rows, cols]` otherwise.
    pub fn to_vec(&self) -> Vec<usize> {
        match *self {
            Shape::Scalar => Vec::new(),
            Shape::Matrix(rows, cols) => vec![rows, cols],
        }
    }

    pub fn len(&self) -> usize {
        let (rows, cols) = self.dims();
        rows * cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "()"),
            Shape::Matrix(rows, cols) => write!(f, "({}, {})", rows, cols),
        }
    }
}

/// Value held by a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Matrix(Array2<f64>),
}

impl Value {
    /// Build a value from a dynamic-rank array. Rank 0 becomes a scalar,
    /// rank 2 a matrix, anything else fails with `UnsupportedRank`.
    pub fn from_array(array: ArrayD<f64>) -> Result<Self> {
        match array.ndim() {
            0 => Ok(Value::Scalar(array.iter().copied().next().unwrap_or_default())),
            2 => Ok(Value::Matrix(array.into_dimensionality::<Ix2>()?)),
            ndim => Err(Error::UnsupportedRank { ndim }),
        }
    }

    /// Build a row-major matrix from a flat vector.
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        let len = data.len();
        Array2::from_shape_vec((rows, cols), data)
            .map(Value::Matrix)
            .map_err(|_| Error::shape_mismatch(&[rows, cols], &[len]))
    }

    pub fn shape(&self) -> Shape {
        match self {
            Value::Scalar(_) => Shape::Scalar,
            Value::Matrix(m) => Shape::Matrix(m.nrows(), m.ncols()),
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        self.shape().dims()
    }

    pub fn len(&self) -> usize {
        self.shape().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Matrix(_) => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Array2<f64>> {
        match self {
            Value::Scalar(_) => None,
            Value::Matrix(m) => Some(m),
        }
    }

    /// Copy into a matrix; scalars become `1x1`.
    pub fn to_matrix(&self) -> Array2<f64> {
        match self {
            Value::Scalar(s) => Array2::from_elem((1, 1), *s),
            Value::Matrix(m) => m.clone(),
        }
    }

    /// Element access with scalar broadcasting: a scalar ignores the index.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            Value::Scalar(s) => *s,
            Value::Matrix(m) => m[[row, col]],
        }
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(f(*s)),
            Value::Matrix(m) => Value::Matrix(m.mapv(f)),
        }
    }

    /// Element-wise binary combination.
    ///
    /// A scalar combines with anything. Two matrices must have the same
    /// shape: there is no implicit broadcasting between matrices.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
            (Value::Scalar(a), Value::Matrix(b)) => Ok(Value::Matrix(b.mapv(|y| f(*a, y)))),
            (Value::Matrix(a), Value::Scalar(b)) => Ok(Value::Matrix(a.mapv(|x| f(x, *b)))),
            (Value::Matrix(a), Value::Matrix(b)) => {
                if a.dim() != b.dim() {
                    return Err(Error::shape_mismatch(a.shape(), b.shape()));
                }
                Ok(Value::Matrix(
                    Zip::from(a).and(b).map_collect(|&x, &y| f(x, y)),
                ))
            }
        }
    }

    /// Matrix product. Both operands must be matrices with a matching
    /// inner dimension.
    pub fn matmul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Matrix(a), Value::Matrix(b)) => {
                if a.ncols() != b.nrows() {
                    return Err(Error::shape_mismatch(
                        &[a.ncols(), b.ncols()],
                        &[b.nrows(), b.ncols()],
                    ));
                }
                Ok(Value::Matrix(a.dot(b)))
            }
            _ => Err(Error::invalid_argument(
                "matmul",
                format!(
                    "both operands must be matrices, got {} and {}",
                    self.shape(),
                    other.shape()
                ),
            )),
        }
    }

    pub fn transpose(&self) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(*s),
            Value::Matrix(m) => Value::Matrix(m.t().as_standard_layout().into_owned()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0.0)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Scalar(value as f64)
    }
}

impl From<Array2<f64>> for Value {
    fn from(value: Array2<f64>) -> Self {
        Value::Matrix(value)
    }
}

impl TryFrom<ArrayD<f64>> for Value {
    type Error = Error;

    fn try_from(value: ArrayD<f64>) -> Result<Self> {
        Value::from_array(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Matrix(m) => write!(f, "{}", m),
        }
    }
}
