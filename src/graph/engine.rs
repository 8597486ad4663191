// engine.rs
// Reverse pass. Adjoints flow from the output towards the inputs; a node is
// expanded only after every consumer has contributed to its adjoint.

use super::node::{NodeId, PendingAdjoint, Var};
use crate::block;
use crate::error::Result;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Out-degree of every node reachable from an output, counted per edge.
#[derive(Debug, Default)]
pub struct DegreeMap {
    entries: BTreeMap<NodeId, (Var, usize)>,
}

impl DegreeMap {
    pub fn degree(&self, var: &Var) -> Option<usize> {
        self.entries.get(&var.id()).map(|(_, degree)| *degree)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, usize)> {
        self.entries.values().map(|(var, degree)| (var, *degree))
    }
}

/// Breadth-first walk over operands starting at `output`.
///
/// Every occurrence of a node as an operand adds one to its degree, so in
/// `x * x` the node `x` has degree 2. Each node is enqueued once. The output
/// itself is not an operand and gets no entry, and operands of nodes that
/// already carry derivatives are not visited.
pub fn count_out_degrees(output: &Var) -> DegreeMap {
    let mut degrees = DegreeMap::default();
    let mut seen = BTreeSet::from([output.id()]);
    let mut queue = VecDeque::from([output.clone()]);

    while let Some(node) = queue.pop_front() {
        for operand in node.operands() {
            let id = operand.id();
            degrees
                .entries
                .entry(id)
                .or_insert_with(|| (operand.clone(), 0))
                .1 += 1;
            // Nodes that carry their own derivatives end the walk: the
            // reverse pass merges at them and never expands their operands.
            if seen.insert(id) && operand.node().derivatives.is_empty() {
                queue.push_back(operand);
            }
        }
    }
    degrees
}

type Observer<'a> = Box<dyn FnMut(&Var, &PendingAdjoint) + 'a>;

/// One reverse-mode differentiation of `output`.
///
/// On completion the output's derivative map holds d output / d name for
/// every named input reached, and no node keeps any transient state.
pub struct ReversePass<'a> {
    output: Var,
    observer: Option<Observer<'a>>,
}

impl<'a> ReversePass<'a> {
    pub fn new(output: &Var) -> Self {
        Self {
            output: output.clone(),
            observer: None,
        }
    }

    /// Call `observer` on every node expansion, with the node and its
    /// complete pending adjoint.
    pub fn with_observer(mut self, observer: impl FnMut(&Var, &PendingAdjoint) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Count degrees, seed the output and propagate.
    ///
    /// A no-op on constants and on outputs that already carry derivatives,
    /// so repeated calls never double count.
    pub fn run(mut self) -> Result<()> {
        let output = self.output.clone();
        if output.is_constant() || !output.node().derivatives.is_empty() {
            return Ok(());
        }

        let degrees = count_out_degrees(&output);
        for (var, degree) in degrees.iter() {
            var.reset_transient(degree);
        }
        output.reset_transient(0);
        debug!(
            "Reverse pass from {} over {} node(s)",
            output.id(),
            degrees.len()
        );

        let seed = block::identity_for(&output.value());
        let result = output
            .accumulate_pending(output.id(), seed)
            .and_then(|_| self.backward(&output));

        // Transient state never outlives the pass, even on failure.
        for (var, _) in degrees.iter() {
            var.clear_transient();
        }
        output.clear_transient();

        if result.is_ok() {
            debug!(
                "Reverse pass from {} done: {} derivative(s)",
                output.id(),
                output.node().derivatives.len()
            );
        }
        result
    }

    fn backward(&mut self, node: &Var) -> Result<()> {
        if node.is_constant() {
            return Ok(());
        }

        if !node.node().derivatives.is_empty() {
            return self.merge_into_output(node);
        }

        let Some(provenance) = node.provenance() else {
            return Ok(());
        };
        let adjoint = node.take_pending();
        if adjoint.is_empty() {
            return Ok(());
        }
        trace!(
            "Expanding {} ({}) into {} operand(s)",
            node.id(),
            provenance.op.name(),
            provenance.operands.len()
        );
        if let Some(observer) = self.observer.as_mut() {
            observer(node, &adjoint);
        }

        let value = node.value().clone();
        let a = &provenance.operands[0];
        let b = provenance.operands.get(1);
        provenance.op.backprop(a, b, &value, &adjoint)?;

        for operand in &provenance.operands {
            if operand.decrement_degree() == Some(0) {
                self.backward(operand)?;
            }
        }
        Ok(())
    }

    /// Node with its own derivatives (an input, or a forward-computed node
    /// inside a reverse graph): chain them with the adjoint and stop.
    fn merge_into_output(&mut self, node: &Var) -> Result<()> {
        let adjoint = node.take_pending();
        if adjoint.is_empty() {
            return Ok(());
        }
        trace!("Merging {} into {}", node.id(), self.output.id());
        if let Some(observer) = self.observer.as_mut() {
            observer(node, &adjoint);
        }

        let derivatives = node.derivatives();
        for (consumer, dfdc) in &adjoint {
            // Every adjoint in a pass is keyed by the output.
            debug_assert_eq!(*consumer, self.output.id());
            for (name, dcdx) in &derivatives {
                self.output
                    .accumulate_derivative(name.clone(), block::merge(dcdx, dfdc)?)?;
            }
        }
        Ok(())
    }
}

impl Var {
    /// Run a reverse pass rooted at this node.
    pub fn backward(&self) -> Result<()> {
        ReversePass::new(self).run()
    }
}
