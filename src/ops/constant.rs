//! Nullary leaves: `Cte` and `Var`. Neither has a rule body in the usual
//! sense — their `value` (and, for `Var`, their `dot`) is written directly
//! by the graph builder or by the caller's input-feeding step
//! (`Graph::set_value`, `Graph::set_dot`), not derived from inputs. The
//! `Op` impl only re-validates liveness for the current epoch.

use crate::autograd::{Graph, NodeId};
use crate::ops::{Op, Operator};

/// Constant leaf: `value` is fixed at construction; `dot` is definitionally
/// zero on every `forward_dot` pass, never caller-supplied.
pub struct Cte;

impl Op for Cte {
    fn id(&self) -> Operator {
        Operator::Cte
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        graph.touch_value(node);
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        graph.set_dot(node, 0.0);
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId) {}

    fn hvp_backward(&self, _graph: &mut Graph, _node: NodeId) {}
}

/// Variable leaf: both `value` and `dot` are caller-supplied, ahead of the
/// pass, via `Graph::set_value`/`Graph::set_dot`. `forward`/`forward_dot`
/// merely re-stamp the already-stored raw value as live for this epoch.
pub struct Var;

impl Op for Var {
    fn id(&self) -> Operator {
        Operator::Var
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        graph.touch_value(node);
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        graph.touch_dot(node);
    }

    fn backward(&self, _graph: &mut Graph, _node: NodeId) {}

    fn hvp_backward(&self, _graph: &mut Graph, _node: NodeId) {}
}
