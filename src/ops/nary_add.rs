//! N-ary Add: sum of all inputs. Arity-polymorphic (2..=N); arity exactly 2
//! coincides with, and reuses, the binary `add` rule's pure functions from
//! `binary` as a fast path (spec §4.4).

use crate::ops::binary::AddRule;
use crate::ops::{Op, Operator};
use crate::autograd::{Graph, NodeId};

pub struct Add;

impl Op for Add {
    fn id(&self) -> Operator {
        Operator::Add
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        let m = graph.arity(node);
        if m == 0 {
            return;
        }
        if m == 2 {
            let inputs = graph.inputs(node);
            let (a, b) = (inputs[0], inputs[1]);
            let sum = AddRule::f(graph.value(a), graph.value(b));
            graph.set_value(node, sum);
            return;
        }
        let sum = graph
            .inputs(node)
            .to_vec()
            .iter()
            .map(|&id| graph.value(id))
            .sum();
        graph.set_value(node, sum);
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        let m = graph.arity(node);
        if m == 0 {
            return;
        }
        if m == 2 {
            let inputs = graph.inputs(node);
            let (a, b) = (inputs[0], inputs[1]);
            graph.set_dot(node, graph.dot(a) + graph.dot(b));
            return;
        }
        let sum = graph
            .inputs(node)
            .to_vec()
            .iter()
            .map(|&id| graph.dot(id))
            .sum();
        graph.set_dot(node, sum);
    }

    fn backward(&self, graph: &mut Graph, node: NodeId) {
        let m = graph.arity(node);
        if m == 0 {
            return;
        }
        let w = graph.gradient(node);
        for id in graph.inputs(node).to_vec() {
            graph.accumulate_gradient(id, w);
        }
    }

    fn hvp_backward(&self, graph: &mut Graph, node: NodeId) {
        let m = graph.arity(node);
        if m == 0 {
            return;
        }
        let w = graph.gradient(node);
        let wdot = graph.grad_dot(node);
        for id in graph.inputs(node).to_vec() {
            graph.accumulate_gradient(id, w);
            graph.accumulate_grad_dot(id, wdot);
        }
    }
}
