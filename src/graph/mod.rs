pub mod context;
pub mod diff;
pub mod engine;
pub mod mode;
pub mod node;
pub mod plot;

pub use context::GraphContext;
pub use diff::{Derivative, Differentiated, Wrt};
pub use engine::{DegreeMap, ReversePass, count_out_degrees};
pub use mode::Mode;
pub use node::{DerivativeMap, NodeId, PendingAdjoint, Provenance, Seed, Var, VarBuilder, VarName};
pub use plot::{GraphVisualizer, VisualizationConfig};
