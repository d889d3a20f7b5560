//! Single-component softmax: the node holds all `m` logits as inputs and
//! produces `y₀ = softmax(x)[0]` (spec §4.6). Scalar-only per this crate's
//! scope (no broadcasting/tensor shapes); a caller wanting the full softmax
//! vector builds one node per component, each reading the same inputs.

use crate::autograd::{Graph, NodeId};
use crate::ops::{Op, Operator};

pub struct Softmax;

/// Stable softmax weights over `xs`, written into `out` (same length).
fn softmax_weights(xs: &[f64], out: &mut [f64]) {
    let xmax = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut z = 0.0;
    for (y, &x) in out.iter_mut().zip(xs) {
        *y = (x - xmax).exp();
        z += *y;
    }
    debug_assert!(z > 0.0, "softmax normalizer must be positive for finite inputs");
    let denom = z.max(1.0);
    for y in out.iter_mut() {
        *y /= denom;
    }
}

impl Op for Softmax {
    fn id(&self) -> Operator {
        Operator::Softmax
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        let xs: Vec<f64> = ids.iter().map(|&id| graph.value(id)).collect();
        let y = graph.scratch().softmax_y(xs.len());
        softmax_weights(&xs, y);
        let y0 = y[0];
        graph.set_value(node, y0);
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        let xs: Vec<f64> = ids.iter().map(|&id| graph.value(id)).collect();
        let xdots: Vec<f64> = ids.iter().map(|&id| graph.dot(id)).collect();
        let mut y = vec![0.0; xs.len()];
        softmax_weights(&xs, &mut y);
        let s: f64 = y.iter().zip(&xdots).map(|(yi, xi)| yi * xi).sum();
        graph.set_dot(node, y[0] * (xdots[0] - s));
    }

    fn backward(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        let xs: Vec<f64> = ids.iter().map(|&id| graph.value(id)).collect();
        let mut y = vec![0.0; xs.len()];
        softmax_weights(&xs, &mut y);
        let w = graph.gradient(node);
        let y0 = y[0];
        for (k, &id) in ids.iter().enumerate() {
            let dy0_dxk = if k == 0 { y0 * (1.0 - y0) } else { -y0 * y[k] };
            graph.accumulate_gradient(id, w * dy0_dxk);
        }
    }

    fn hvp_backward(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        let xs: Vec<f64> = ids.iter().map(|&id| graph.value(id)).collect();
        let xdots: Vec<f64> = ids.iter().map(|&id| graph.dot(id)).collect();
        let mut y = vec![0.0; xs.len()];
        softmax_weights(&xs, &mut y);
        let w = graph.gradient(node);
        let wdot = graph.grad_dot(node);
        let y0 = y[0];
        let s: f64 = y.iter().zip(&xdots).map(|(yi, xi)| yi * xi).sum();

        for (k, &id) in ids.iter().enumerate() {
            let dy0_dxk = if k == 0 { y0 * (1.0 - y0) } else { -y0 * y[k] };
            graph.accumulate_gradient(id, w * dy0_dxk);

            let hv_k = if k == 0 {
                y0 * (1.0 - 2.0 * y0) * (xdots[0] - s)
            } else {
                y0 * y[k] * (2.0 * s - xdots[0] - xdots[k])
            };
            graph.accumulate_grad_dot(id, wdot * dy0_dxk + w * hv_k);
        }
    }
}
