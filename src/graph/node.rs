use super::context::GraphContext;
use super::mode::Mode;
use crate::block::{self, Block};
use crate::error::{Error, Result};
use crate::ops::Operator;
use crate::value::Value;
use ndarray::{Array1, Array2, ArrayD};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// ATOMIC auto incrementing id for all nodes.
static NODE_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn new() -> Self {
        Self(NODE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Name of an input variable: a label or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarName {
    Label(String),
    Index(i64),
}

impl VarName {
    /// Names must be usable as lookup keys; an empty label is not.
    pub(crate) fn validate(&self, arg: &'static str) -> Result<()> {
        match self {
            VarName::Label(label) if label.is_empty() => {
                Err(Error::invalid_argument(arg, "variable names cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for VarName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarName::Label(label) => write!(f, "{}", label),
            VarName::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for VarName {
    fn from(value: &str) -> Self {
        VarName::Label(value.to_string())
    }
}

impl From<String> for VarName {
    fn from(value: String) -> Self {
        VarName::Label(value)
    }
}

impl From<&VarName> for VarName {
    fn from(value: &VarName) -> Self {
        value.clone()
    }
}

impl From<i64> for VarName {
    fn from(value: i64) -> Self {
        VarName::Index(value)
    }
}

impl From<i32> for VarName {
    fn from(value: i32) -> Self {
        VarName::Index(value as i64)
    }
}

/// Derivatives of a node keyed by input variable name.
pub type DerivativeMap = BTreeMap<VarName, Block>;

/// Reverse-pass adjoint waiting to be expanded, keyed by the consumer the
/// adjoint belongs to (the output of the pass).
pub type PendingAdjoint = BTreeMap<NodeId, Block>;

/// How a node was produced.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub op: Rc<dyn Operator>,
    pub operands: Vec<Var>,
}

// A node in the computational graph.
// Leaves are inputs or constants; every other node records its operator and
// operands so the reverse pass can walk back through it.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) value: Value,
    pub(crate) name: Option<VarName>,
    pub(crate) mode: Mode,
    pub(crate) derivatives: DerivativeMap,
    pub(crate) context: Option<GraphContext>,
    pub(crate) provenance: Option<Provenance>,
    // Reverse-pass transient state. Both are None outside a pass.
    pub(crate) out_degree: Option<usize>,
    pub(crate) pending: Option<PendingAdjoint>,
}

/// Handle to a graph node. Cloning is cheap and shares the node.
#[derive(Clone)]
pub struct Var(Rc<RefCell<Node>>);

impl Var {
    /// A constant: no name, no registry entry, never differentiated.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::from_node(Node {
            id: NodeId::new(),
            value: value.into(),
            name: None,
            mode: Mode::Constant,
            derivatives: DerivativeMap::new(),
            context: None,
            provenance: None,
            out_degree: None,
            pending: None,
        })
    }

    /// A forward-mode input named `name` with the default unit seed.
    pub fn variable(value: impl Into<Value>, name: impl Into<VarName>) -> Result<Self> {
        Self::builder(value).name(name).build()
    }

    pub fn builder(value: impl Into<Value>) -> VarBuilder {
        VarBuilder::new(value)
    }

    pub(crate) fn from_node(node: Node) -> Self {
        Var(Rc::new(RefCell::new(node)))
    }

    pub(crate) fn from_operation(
        value: Value,
        mode: Mode,
        context: Option<GraphContext>,
        provenance: Provenance,
        derivatives: DerivativeMap,
    ) -> Self {
        Self::from_node(Node {
            id: NodeId::new(),
            value,
            name: None,
            mode,
            derivatives,
            context,
            provenance: Some(provenance),
            out_degree: None,
            pending: None,
        })
    }

    pub(crate) fn node(&self) -> Ref<'_, Node> {
        self.0.borrow()
    }

    pub(crate) fn node_mut(&self) -> RefMut<'_, Node> {
        self.0.borrow_mut()
    }

    pub fn id(&self) -> NodeId {
        self.node().id
    }

    pub fn value(&self) -> Ref<'_, Value> {
        Ref::map(self.node(), |node| &node.value)
    }

    /// Re-assign the value. The shape must not change: derivative blocks and
    /// registry entries were sized from it.
    ///
    /// Nothing downstream is recomputed. Nodes already built from this one
    /// keep their old values and derivatives, so rebuild the graph after
    /// changing an input.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let mut node = self.node_mut();
        if value.shape() != node.value.shape() {
            return Err(Error::shape_mismatch(
                &node.value.shape().to_vec(),
                &value.shape().to_vec(),
            ));
        }
        node.value = value;
        Ok(())
    }

    pub fn name(&self) -> Option<VarName> {
        self.node().name.clone()
    }

    pub fn mode(&self) -> Mode {
        self.node().mode
    }

    pub fn is_constant(&self) -> bool {
        self.node().mode == Mode::Constant
    }

    pub fn is_leaf(&self) -> bool {
        self.node().provenance.is_none()
    }

    pub fn context(&self) -> Option<GraphContext> {
        self.node().context.clone()
    }

    /// Snapshot of the current derivative map (unsqueezed 4-D blocks).
    pub fn derivatives(&self) -> DerivativeMap {
        self.node().derivatives.clone()
    }

    pub fn provenance(&self) -> Option<Provenance> {
        self.node().provenance.clone()
    }

    pub fn operands(&self) -> Vec<Var> {
        self.node()
            .provenance
            .as_ref()
            .map(|p| p.operands.clone())
            .unwrap_or_default()
    }

    pub fn op(&self) -> Option<Rc<dyn Operator>> {
        self.node().provenance.as_ref().map(|p| Rc::clone(&p.op))
    }

    /// Remaining out-degree during a reverse pass; None outside one.
    pub fn out_degree(&self) -> Option<usize> {
        self.node().out_degree
    }

    /// Adjoint not yet expanded; None outside a reverse pass.
    pub fn pending_adjoint(&self) -> Option<PendingAdjoint> {
        self.node().pending.clone()
    }

    pub fn ptr_eq(&self, other: &Var) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Add `block` to this node's pending adjoint for `consumer`.
    pub fn accumulate_pending(&self, consumer: NodeId, block: Block) -> Result<()> {
        let mut node = self.node_mut();
        let pending = node.pending.get_or_insert_with(PendingAdjoint::new);
        block::accumulate(pending, consumer, block)
    }

    /// Add `block` to this node's derivative with respect to `name`.
    pub(crate) fn accumulate_derivative(&self, name: VarName, block: Block) -> Result<()> {
        block::accumulate(&mut self.node_mut().derivatives, name, block)
    }

    pub(crate) fn take_pending(&self) -> PendingAdjoint {
        self.node_mut()
            .pending
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Decrement the remaining out-degree, returning the new count.
    pub(crate) fn decrement_degree(&self) -> Option<usize> {
        let mut node = self.node_mut();
        let degree = node.out_degree.as_mut()?;
        *degree = degree.saturating_sub(1);
        Some(*degree)
    }

    pub(crate) fn reset_transient(&self, out_degree: usize) {
        let mut node = self.node_mut();
        node.out_degree = Some(out_degree);
        node.pending = Some(PendingAdjoint::new());
    }

    pub(crate) fn clear_transient(&self) {
        let mut node = self.node_mut();
        node.out_degree = None;
        node.pending = None;
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.node();
        f.debug_struct("Var")
            .field("id", &node.id.0)
            .field("name", &node.name)
            .field("mode", &node.mode)
            .field("value", &node.value)
            .field("derivatives", &node.derivatives.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Initial derivative of an input variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Seed {
    Scalar(f64),
    Array(ArrayD<f64>),
}

impl Seed {
    /// Broadcast the seed to a `(rows, cols)` matrix. Arrays are read in
    /// logical order and only need a matching element count.
    fn to_matrix(&self, dims: (usize, usize)) -> Result<Array2<f64>> {
        let seed = match self {
            Seed::Scalar(s) => Array2::from_elem(dims, *s),
            Seed::Array(array) => {
                if array.len() != dims.0 * dims.1 {
                    return Err(Error::shape_mismatch(&[dims.0, dims.1], array.shape()));
                }
                Array2::from_shape_vec(dims, array.iter().copied().collect())?
            }
        };
        if seed.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid_argument("seed", "seed values must be finite"));
        }
        Ok(seed)
    }
}

impl From<f64> for Seed {
    fn from(value: f64) -> Self {
        Seed::Scalar(value)
    }
}

impl From<i32> for Seed {
    fn from(value: i32) -> Self {
        Seed::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for Seed {
    fn from(value: Vec<f64>) -> Self {
        Seed::Array(Array1::from(value).into_dyn())
    }
}

impl From<Array2<f64>> for Seed {
    fn from(value: Array2<f64>) -> Self {
        Seed::Array(value.into_dyn())
    }
}

impl From<ArrayD<f64>> for Seed {
    fn from(value: ArrayD<f64>) -> Self {
        Seed::Array(value)
    }
}

/// Builder for input and constant nodes.
#[derive(Debug, Clone)]
pub struct VarBuilder {
    value: Value,
    name: Option<VarName>,
    seed: Option<Seed>,
    mode: Mode,
    context: Option<GraphContext>,
}

impl VarBuilder {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            name: None,
            seed: None,
            mode: Mode::default(),
            context: None,
        }
    }

    pub fn name(mut self, name: impl Into<VarName>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = Some(seed.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Register into an existing registry instead of a fresh one.
    pub fn context(mut self, context: &GraphContext) -> Self {
        self.context = Some(context.clone());
        self
    }

    pub fn build(self) -> Result<Var> {
        let Some(name) = self.name else {
            if self.seed.is_some() {
                return Err(Error::invalid_argument("seed", "a seed requires a name"));
            }
            return Ok(Var::constant(self.value));
        };

        name.validate("name")?;
        if self.mode == Mode::Constant {
            return Err(Error::invalid_argument(
                "mode",
                "a named variable cannot be constant",
            ));
        }

        let seed = self.seed.unwrap_or(Seed::Scalar(1.0));
        let identity = block::identity(&seed.to_matrix(self.value.dims())?);

        let context = self.context.unwrap_or_default();
        context.register(name.clone(), self.value.shape())?;

        let mut derivatives = DerivativeMap::new();
        derivatives.insert(name.clone(), identity);

        Ok(Var::from_node(Node {
            id: NodeId::new(),
            value: self.value,
            name: Some(name),
            mode: self.mode,
            derivatives,
            context: Some(context),
            provenance: None,
            out_degree: None,
            pending: None,
        }))
    }
}
