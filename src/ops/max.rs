//! Binary, nonsmooth `max(a, b)`. Ties route entirely to the first input
//! (spec §4.7); no smoothing, no splitting the tangent/adjoint across both
//! branches.

use crate::autograd::{Graph, NodeId};
use crate::ops::{Op, Operator};

pub struct Max;

/// `true` if `a` wins (including the tie case).
fn a_wins(a: f64, b: f64) -> bool {
    a >= b
}

impl Op for Max {
    fn id(&self) -> Operator {
        Operator::Max
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        graph.set_value(node, if a_wins(va, vb) { va } else { vb });
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        let winner_dot = if a_wins(va, vb) {
            graph.dot(a)
        } else {
            graph.dot(b)
        };
        graph.set_dot(node, winner_dot);
    }

    fn backward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        let w = graph.gradient(node);
        if a_wins(va, vb) {
            graph.accumulate_gradient(a, w);
            graph.accumulate_gradient(b, 0.0);
        } else {
            graph.accumulate_gradient(a, 0.0);
            graph.accumulate_gradient(b, w);
        }
    }

    fn hvp_backward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        let w = graph.gradient(node);
        let wdot = graph.grad_dot(node);
        if a_wins(va, vb) {
            graph.accumulate_gradient(a, w);
            graph.accumulate_gradient(b, 0.0);
            graph.accumulate_grad_dot(a, wdot);
            graph.accumulate_grad_dot(b, 0.0);
        } else {
            graph.accumulate_gradient(a, 0.0);
            graph.accumulate_gradient(b, w);
            graph.accumulate_grad_dot(a, 0.0);
            graph.accumulate_grad_dot(b, wdot);
        }
    }
}
