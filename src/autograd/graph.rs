//! Computation graph: node arena, epoch-tagged accumulator slots, topological
//! ordering, and the four pass drivers (forward, forward_dot, backward,
//! hvp_backward). Each node holds: an operator tag, input node ids, and the
//! four epoch-tagged scalar slots described in the epoch protocol.

use crate::epoch::Slot;
use crate::ops::{Op, OpRegistry, Operator};
use crate::scratch::ScratchPool;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("invalid node id {0}")]
    InvalidNode(NodeId),
    #[error("{op:?} requires {expected} input(s), got {actual}")]
    ArityMismatch {
        op: Operator,
        expected: &'static str,
        actual: usize,
    },
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Node identifier: a stable index into the graph's arena.
pub type NodeId = usize;

/// A single node in the graph: an operator tag, its input ids, and the
/// four epoch-tagged accumulator slots (value, dot, gradient, grad_dot).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub op: Operator,
    pub inputs: Vec<NodeId>,
    pub value: Slot<f64>,
    pub dot: Slot<f64>,
    pub gradient: Slot<f64>,
    pub grad_dot: Slot<f64>,
}

impl Node {
    fn leaf(op: Operator) -> Self {
        Node {
            op,
            inputs: Vec::new(),
            value: Slot::new(),
            dot: Slot::new(),
            gradient: Slot::new(),
            grad_dot: Slot::new(),
        }
    }
}

/// Computation graph: owns all nodes, the four pass-epoch counters, the op
/// registry, and a per-thread scratch pool for n-ary rules.
pub struct Graph {
    nodes: Vec<Node>,
    registry: OpRegistry,
    scratch: ScratchPool,
    cur_val_epoch: u64,
    cur_dot_epoch: u64,
    cur_grad_epoch: u64,
    cur_gdot_epoch: u64,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            nodes: Vec::new(),
            registry: OpRegistry::new(),
            scratch: ScratchPool::new(),
            cur_val_epoch: 0,
            cur_dot_epoch: 0,
            cur_grad_epoch: 0,
            cur_gdot_epoch: 0,
        }
    }

    // ---- construction ----------------------------------------------

    /// Create a constant leaf. Its tangent is definitionally zero on every
    /// pass (see `ops::constant`).
    pub fn cte(&mut self, value: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::leaf(Operator::Cte));
        self.set_value(id, value);
        id
    }

    /// Create a variable leaf. Its tangent is caller-supplied via
    /// `set_dot` before a `forward_dot` pass.
    pub fn var(&mut self, value: f64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::leaf(Operator::Var));
        self.set_value(id, value);
        id
    }

    /// Append an operator node over `inputs`, validating arity up front.
    /// This is the graph builder's job; the pass functions themselves stay
    /// silently permissive at evaluation time (spec §7).
    pub fn apply(&mut self, op: Operator, inputs: &[NodeId]) -> GraphResult<NodeId> {
        if !op.accepts_arity(inputs.len()) {
            return Err(GraphError::ArityMismatch {
                op,
                expected: arity_description(op),
                actual: inputs.len(),
            });
        }
        for &id in inputs {
            if id >= self.nodes.len() {
                return Err(GraphError::InvalidNode(id));
            }
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            op,
            inputs: inputs.to_vec(),
            value: Slot::new(),
            dot: Slot::new(),
            gradient: Slot::new(),
            grad_dot: Slot::new(),
        });
        Ok(id)
    }

    pub fn add(&mut self, inputs: &[NodeId]) -> GraphResult<NodeId> {
        self.apply(Operator::Add, inputs)
    }
    pub fn sub(&mut self, a: NodeId, b: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Subtract, &[a, b])
    }
    pub fn mul(&mut self, inputs: &[NodeId]) -> GraphResult<NodeId> {
        self.apply(Operator::Multiply, inputs)
    }
    pub fn div(&mut self, a: NodeId, b: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Divide, &[a, b])
    }
    pub fn sin(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Sin, &[a])
    }
    pub fn cos(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Cos, &[a])
    }
    pub fn tan(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Tan, &[a])
    }
    pub fn exp(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Exp, &[a])
    }
    pub fn log(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Log, &[a])
    }
    pub fn tanh(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Tanh, &[a])
    }
    pub fn relu(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Relu, &[a])
    }
    pub fn silu(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Silu, &[a])
    }
    pub fn gelu(&mut self, a: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Gelu, &[a])
    }
    pub fn softmax(&mut self, inputs: &[NodeId]) -> GraphResult<NodeId> {
        self.apply(Operator::Softmax, inputs)
    }
    pub fn max(&mut self, a: NodeId, b: NodeId) -> GraphResult<NodeId> {
        self.apply(Operator::Max, &[a, b])
    }

    // ---- arena / epoch accessors used by ops::* rule bodies --------

    pub fn op(&self, id: NodeId) -> Operator {
        self.nodes[id].op
    }

    pub fn arity(&self, id: NodeId) -> usize {
        self.nodes[id].inputs.len()
    }

    pub fn inputs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].inputs
    }

    pub fn scratch(&mut self) -> &mut ScratchPool {
        &mut self.scratch
    }

    /// Pooled `(vals, dots, pre, suf)` scratch for `ops::nary_multiply`:
    /// `vals[i]`/`dots[i]` are `ids[i]`'s current value/dot, and `pre`/`suf`
    /// are filled in as the prefix/suffix product tables (`pre[i] =
    /// product(vals[0..i])`, `suf[i] = product(vals[i..])`, `suf[m] = 1`),
    /// so `product of all but i = pre[i] * suf[i+1]`. Reads `self.nodes` and
    /// `self.scratch` directly (disjoint fields) so the fill loop never
    /// needs a second borrow of the pool.
    pub fn multiply_scratch(&mut self, ids: &[NodeId]) -> (&[f64], &[f64], &[f64], &[f64]) {
        let cur_val = self.cur_val_epoch;
        let cur_dot = self.cur_dot_epoch;
        let nodes = &self.nodes;
        let (vals, dots, pre, suf) = self.scratch.nary_buffers(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            vals[i] = nodes[id].value.read(cur_val);
            dots[i] = nodes[id].dot.read(cur_dot);
        }
        let m = ids.len();
        for i in 0..m {
            pre[i + 1] = pre[i] * vals[i];
        }
        for i in (0..m).rev() {
            suf[i] = suf[i + 1] * vals[i];
        }
        (vals, dots, pre, suf)
    }

    pub fn value(&self, id: NodeId) -> f64 {
        self.nodes[id].value.read(self.cur_val_epoch)
    }
    pub fn dot(&self, id: NodeId) -> f64 {
        self.nodes[id].dot.read(self.cur_dot_epoch)
    }
    pub fn gradient(&self, id: NodeId) -> f64 {
        self.nodes[id].gradient.read(self.cur_grad_epoch)
    }
    pub fn grad_dot(&self, id: NodeId) -> f64 {
        self.nodes[id].grad_dot.read(self.cur_gdot_epoch)
    }

    pub fn set_value(&mut self, id: NodeId, v: f64) {
        let cur = self.cur_val_epoch;
        self.nodes[id].value.set(cur, v);
    }
    pub fn touch_value(&mut self, id: NodeId) {
        let cur = self.cur_val_epoch;
        self.nodes[id].value.touch(cur);
    }
    pub fn set_dot(&mut self, id: NodeId, v: f64) {
        let cur = self.cur_dot_epoch;
        self.nodes[id].dot.set(cur, v);
    }
    pub fn touch_dot(&mut self, id: NodeId) {
        let cur = self.cur_dot_epoch;
        self.nodes[id].dot.touch(cur);
    }
    pub fn set_gradient(&mut self, id: NodeId, v: f64) {
        let cur = self.cur_grad_epoch;
        self.nodes[id].gradient.set(cur, v);
    }
    pub fn set_grad_dot(&mut self, id: NodeId, v: f64) {
        let cur = self.cur_gdot_epoch;
        self.nodes[id].grad_dot.set(cur, v);
    }

    /// `inputs[k].gradient += delta`, lazily zeroing on a fresh grad epoch.
    pub fn accumulate_gradient(&mut self, id: NodeId, delta: f64) {
        let cur = self.cur_grad_epoch;
        *self.nodes[id].gradient.ensure_zero(cur) += delta;
    }

    /// `inputs[k].grad_dot += delta`, lazily zeroing on a fresh gdot epoch.
    pub fn accumulate_grad_dot(&mut self, id: NodeId, delta: f64) {
        let cur = self.cur_gdot_epoch;
        *self.nodes[id].grad_dot.ensure_zero(cur) += delta;
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Raw node arena, for snapshotting (`state_io::save_graph`). Epoch
    /// tags are carried with each node's slots, so a restored graph's
    /// slots read as live/stale exactly as they did at save time.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The four pass-epoch counters, in `(val, dot, grad, gdot)` order.
    pub fn epochs(&self) -> (u64, u64, u64, u64) {
        (
            self.cur_val_epoch,
            self.cur_dot_epoch,
            self.cur_grad_epoch,
            self.cur_gdot_epoch,
        )
    }

    /// Rebuild a graph from a node arena and epoch counters previously
    /// obtained from [`Graph::nodes`]/[`Graph::epochs`]. The registry and
    /// scratch pool are fresh; neither carries state across a save/load.
    pub fn from_parts(nodes: Vec<Node>, epochs: (u64, u64, u64, u64)) -> Self {
        Graph {
            nodes,
            registry: OpRegistry::new(),
            scratch: ScratchPool::new(),
            cur_val_epoch: epochs.0,
            cur_dot_epoch: epochs.1,
            cur_grad_epoch: epochs.2,
            cur_gdot_epoch: epochs.3,
        }
    }

    // ---- ordering ----------------------------------------------------

    /// Forward topological order over the ancestors of `from` (inputs
    /// before consumers; `from` last).
    pub fn topo_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.topo_dfs(from, &mut visited, &mut order);
        order
    }

    fn topo_dfs(&self, id: NodeId, visited: &mut HashSet<NodeId>, order: &mut Vec<NodeId>) {
        if !visited.insert(id) {
            return;
        }
        for &input_id in &self.nodes[id].inputs {
            self.topo_dfs(input_id, visited, order);
        }
        order.push(id);
    }

    /// Reverse topological order over the ancestors of `from` (`from`
    /// first; inputs last). Used by `backward`/`hvp_backward`.
    pub fn reverse_topo_order(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = self.topo_order(from);
        order.reverse();
        order
    }

    // ---- pass drivers --------------------------------------------------

    /// Primal pass: bump `cur_val_epoch`, then visit `order` (must be
    /// forward topological) dispatching each node's `forward`.
    pub fn forward(&mut self, order: &[NodeId]) {
        self.cur_val_epoch = self.cur_val_epoch.wrapping_add(1);
        self.run_pass(order, |op, g, id| op.forward(g, id));
    }

    /// Forward tangent pass: bump `cur_dot_epoch`, then visit `order` (must
    /// be forward topological) dispatching each node's `forward_dot`.
    /// Assumes a `forward` pass already populated the primal values this
    /// pass reads (the val epoch is untouched here).
    pub fn forward_dot(&mut self, order: &[NodeId]) {
        self.cur_dot_epoch = self.cur_dot_epoch.wrapping_add(1);
        self.run_pass(order, |op, g, id| op.forward_dot(g, id));
    }

    /// Reverse gradient pass: bump `cur_grad_epoch`, seed `gradient` on each
    /// `(node, value)` pair in `seed` (typically the single output, weight
    /// `1.0`), then visit `order` (must be reverse topological) dispatching
    /// each node's `backward`.
    ///
    /// The seed is applied *after* the epoch bump, not before: `gradient` is
    /// an accumulator slot with no producer of its own for the output node
    /// (nothing in `order` "touches" it the way a leaf's own `forward` call
    /// re-validates its `value` every pass), so writing it under the old
    /// epoch and bumping afterward would leave it reading as stale zero.
    pub fn backward(&mut self, order: &[NodeId], seed: &[(NodeId, f64)]) {
        self.cur_grad_epoch = self.cur_grad_epoch.wrapping_add(1);
        for &(id, v) in seed {
            self.set_gradient(id, v);
        }
        self.run_pass(order, |op, g, id| op.backward(g, id));
    }

    /// Forward-over-reverse Hessian-vector pass: a standalone, complete
    /// reverse sweep that accumulates both `gradient` (first order) and
    /// `grad_dot` (second order) in one traversal, per the per-operator
    /// `hvp_backward` rule bodies (spec §4.2-4.7). Bumps both
    /// `cur_grad_epoch` and `cur_gdot_epoch` so it never double-counts
    /// against a `gradient` slot last written by a separate `backward`
    /// call, then seeds `gradient`/`grad_dot` from `grad_seed`/`gdot_seed`
    /// (same after-the-bump reasoning as `backward`) before visiting `order`
    /// (must be reverse topological).
    pub fn hvp_backward(
        &mut self,
        order: &[NodeId],
        grad_seed: &[(NodeId, f64)],
        gdot_seed: &[(NodeId, f64)],
    ) {
        self.cur_grad_epoch = self.cur_grad_epoch.wrapping_add(1);
        self.cur_gdot_epoch = self.cur_gdot_epoch.wrapping_add(1);
        for &(id, v) in grad_seed {
            self.set_gradient(id, v);
        }
        for &(id, v) in gdot_seed {
            self.set_grad_dot(id, v);
        }
        self.run_pass(order, |op, g, id| op.hvp_backward(g, id));
    }

    fn run_pass(&mut self, order: &[NodeId], dispatch: impl Fn(&dyn Op, &mut Graph, NodeId)) {
        for &id in order {
            let op_tag = self.nodes[id].op;
            let Some(rule) = self.registry.get(op_tag) else {
                continue; // Operator::Unknown and any future tag: no-op.
            };
            dispatch(rule.as_ref(), self, id);
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

fn arity_description(op: Operator) -> &'static str {
    use crate::ops::Arity;
    match op.arity() {
        Arity::Nullary => "0",
        Arity::Unary => "1",
        Arity::Binary => "2",
        Arity::NAry => ">=1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topo_order_visits_inputs_before_consumers() {
        let mut g = Graph::new();
        let a = g.var(2.0);
        let b = g.var(3.0);
        let sum = g.add(&[a, b]).unwrap();
        let order = g.topo_order(sum);
        let pos = |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(sum));
        assert!(pos(b) < pos(sum));
    }

    #[test]
    fn reverse_topo_order_is_exact_reverse() {
        let mut g = Graph::new();
        let a = g.var(2.0);
        let b = g.var(3.0);
        let sum = g.add(&[a, b]).unwrap();
        let fwd = g.topo_order(sum);
        let rev = g.reverse_topo_order(sum);
        let mut fwd_reversed = fwd.clone();
        fwd_reversed.reverse();
        assert_eq!(rev, fwd_reversed);
    }

    #[test]
    fn apply_rejects_arity_mismatch() {
        let mut g = Graph::new();
        let a = g.var(1.0);
        let err = g.apply(Operator::Sin, &[a, a]).unwrap_err();
        assert!(matches!(err, GraphError::ArityMismatch { .. }));
    }

    #[test]
    fn apply_rejects_invalid_input_id() {
        let mut g = Graph::new();
        let err = g.apply(Operator::Sin, &[42]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidNode(42)));
    }

    #[test]
    fn epochs_are_lazy_and_monotonic() {
        let mut g = Graph::new();
        let a = g.var(1.0);
        let order = g.topo_order(a);
        g.forward(&order);
        assert_eq!(g.value(a), 1.0);
        g.forward(&order);
        assert_eq!(g.value(a), 1.0);
    }
}
