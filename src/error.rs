//! Error types for jacograd

use crate::graph::VarName;
use thiserror::Error;

/// Result type alias using jacograd's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or differentiating a graph.
///
/// All of them are usage errors: they are reported at the point of detection
/// and nothing inside the crate retries or recovers from them.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument provided to a constructor or to `differentiate`
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Shape mismatch between a value, a seed, an operand or a derivative block
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Values must be scalars or 2-D matrices
    #[error("Unsupported rank {ndim}: only scalars and 2-D matrices are supported")]
    UnsupportedRank {
        /// Number of dimensions of the rejected value
        ndim: usize,
    },

    /// Lookup of a variable that is not registered or has no derivative
    #[error("Unknown variable '{0}'")]
    UnknownVariable(VarName),

    /// Reshape failure inside a block contraction
    #[error("Layout error: {0}")]
    Layout(#[from] ndarray::ShapeError),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
