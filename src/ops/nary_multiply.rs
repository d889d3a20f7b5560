//! N-ary Multiply: product of all inputs, via prefix/suffix product tables
//! pooled in the graph's `ScratchPool` (spec §4.5) through
//! `Graph::multiply_scratch`, which draws `vals`/`dots`/`pre`/`suf` all from
//! the pool rather than allocating fresh per call. Arity exactly 2 uses a
//! closed-form fast path, both for the ordinary passes and, notably, for
//! `hvp_backward`'s second-order term (no prefix/suffix table needed at
//! m=2). For `m >= 3`, `hvp_backward`'s cross term is built without
//! division so a zero input does not produce `0/0` (see
//! `excluded_pair_product`).

use crate::autograd::{Graph, NodeId};
use crate::ops::{Op, Operator};

pub struct Multiply;

/// `prod(vals[ℓ] for ℓ not in {i,k})` without dividing by `vals[i]`/`vals[k]`,
/// so a zero input among the excluded indices still yields the correct
/// (possibly nonzero) product of the rest.
fn excluded_pair_product(vals: &[f64], pre: &[f64], suf: &[f64], i: usize, k: usize) -> f64 {
    let (lo, hi) = if i < k { (i, k) } else { (k, i) };
    let mut mid = 1.0;
    for &v in &vals[lo + 1..hi] {
        if v == 0.0 {
            return 0.0;
        }
        mid *= v;
    }
    pre[lo] * mid * suf[hi + 1]
}

impl Op for Multiply {
    fn id(&self) -> Operator {
        Operator::Multiply
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        if ids.len() == 2 {
            let prod = graph.value(ids[0]) * graph.value(ids[1]);
            graph.set_value(node, prod);
            return;
        }
        let prod: f64 = graph.multiply_scratch(&ids).0.iter().product();
        graph.set_value(node, prod);
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        if ids.len() == 2 {
            let (a, b) = (ids[0], ids[1]);
            let (va, vb) = (graph.value(a), graph.value(b));
            let (da, db) = (graph.dot(a), graph.dot(b));
            graph.set_dot(node, da * vb + db * va);
            return;
        }
        let zdot = {
            let (_vals, dots, pre, suf) = graph.multiply_scratch(&ids);
            (0..ids.len())
                .map(|i| dots[i] * pre[i] * suf[i + 1])
                .sum::<f64>()
        };
        graph.set_dot(node, zdot);
    }

    fn backward(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        let w = graph.gradient(node);
        if ids.len() == 2 {
            let (a, b) = (ids[0], ids[1]);
            let (va, vb) = (graph.value(a), graph.value(b));
            graph.accumulate_gradient(a, w * vb);
            graph.accumulate_gradient(b, w * va);
            return;
        }
        let deltas: Vec<f64> = {
            let (_vals, _dots, pre, suf) = graph.multiply_scratch(&ids);
            (0..ids.len()).map(|i| w * pre[i] * suf[i + 1]).collect()
        };
        for (&id, &delta) in ids.iter().zip(&deltas) {
            graph.accumulate_gradient(id, delta);
        }
    }

    fn hvp_backward(&self, graph: &mut Graph, node: NodeId) {
        let ids = graph.inputs(node).to_vec();
        if ids.is_empty() {
            return;
        }
        let w = graph.gradient(node);
        let wdot = graph.grad_dot(node);

        if ids.len() == 2 {
            let (a, b) = (ids[0], ids[1]);
            let (va, vb) = (graph.value(a), graph.value(b));
            let (da, db) = (graph.dot(a), graph.dot(b));
            graph.accumulate_gradient(a, w * vb);
            graph.accumulate_gradient(b, w * va);
            graph.accumulate_grad_dot(a, wdot * vb + w * db);
            graph.accumulate_grad_dot(b, wdot * va + w * da);
            return;
        }

        let m = ids.len();
        let mut grad_deltas = vec![0.0; m];
        let mut gdot_deltas = vec![0.0; m];
        {
            let (vals, dots, pre, suf) = graph.multiply_scratch(&ids);
            for i in 0..m {
                let excl_i = pre[i] * suf[i + 1];
                grad_deltas[i] = w * excl_i;

                let cross: f64 = (0..m)
                    .filter(|&k| k != i)
                    .map(|k| dots[k] * excluded_pair_product(vals, pre, suf, i, k))
                    .sum();
                gdot_deltas[i] = wdot * excl_i + w * cross;
            }
        }
        for i in 0..m {
            graph.accumulate_gradient(ids[i], grad_deltas[i]);
            graph.accumulate_grad_dot(ids[i], gdot_deltas[i]);
        }
    }
}
