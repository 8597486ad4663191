//! # Jacograd
//!
//! Jacograd is a small dual-mode automatic differentiation engine over scalars
//! and 2-D matrices, built on `ndarray`.
//!
//! ## Features
//!
//! - Forward-mode differentiation, computed eagerly as the graph is built
//! - Reverse-mode differentiation with degree-gated backpropagation
//! - Mixed graphs, where forward sub-results feed a reverse pass
//! - Full Jacobians for matrix-valued nodes, squeezed to conventional shapes
//! - Operator overloading for intuitive expressions
//! - Graph visualization (requires GraphViz installed)
//!
//! ```
//! use jacograd::{Mode, Var, VarName};
//!
//! let x = Var::variable(3.0, "x").unwrap();
//! let y = Var::builder(2.0).name("y").mode(Mode::Reverse).build().unwrap();
//! let f = &x * &y + x.sin().unwrap();
//!
//! let df = f.grads().unwrap();
//! assert!((df[&VarName::from("x")].as_scalar().unwrap() - (2.0 + 3.0f64.cos())).abs() < 1e-12);
//! assert_eq!(df[&VarName::from("y")], 3.0);
//! ```
pub mod block;
pub mod error;
pub mod graph;
pub mod initializers;
pub mod naming;
pub mod ops;
pub mod value;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use graph::{
    Derivative, Differentiated, GraphContext, Mode, NodeId, Seed, Var, VarBuilder, VarName, Wrt,
};
pub use naming::NameCounter;
pub use value::{Shape, Value};
