//! Binary rule template: each rule supplies `f`, first partials `dfa`/`dfb`,
//! and second partials `d2aa`/`d2ab`/`d2bb`, behind a `BinaryRule` trait.
//! The generic [`BinaryOp`] adapter derives the four pass bodies once.
//! `Add`'s arity-2 fast path lives here too (see `nary_add` for the general
//! reducer); `Multiply`'s arity-2 fast path lives in `nary_multiply`.

use crate::autograd::{Graph, NodeId};
use crate::numeric::safe_div;
use crate::ops::{Op, Operator};
use std::marker::PhantomData;

/// `f`, first partials, second partials of a scalar function of two `f64`
/// arguments.
pub trait BinaryRule: Send + Sync {
    const OPERATOR: Operator;

    fn f(a: f64, b: f64) -> f64;
    fn dfa(a: f64, b: f64) -> f64;
    fn dfb(a: f64, b: f64) -> f64;
    fn d2aa(a: f64, b: f64) -> f64;
    fn d2ab(a: f64, b: f64) -> f64;
    fn d2bb(a: f64, b: f64) -> f64;

    /// Tangent contribution `dfa*adot + dfb*bdot`. A rule may override this
    /// to share a subexpression with the partials (Div below).
    fn forward_dot_value(a: f64, b: f64, adot: f64, bdot: f64) -> f64 {
        Self::dfa(a, b) * adot + Self::dfb(a, b) * bdot
    }
}

/// Generic adapter: binds a [`BinaryRule`] to the [`Op`] trait.
pub struct BinaryOp<R: BinaryRule>(PhantomData<R>);

impl<R: BinaryRule> BinaryOp<R> {
    pub const fn new() -> Self {
        BinaryOp(PhantomData)
    }
}

impl<R: BinaryRule> Op for BinaryOp<R> {
    fn id(&self) -> Operator {
        R::OPERATOR
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        graph.set_value(node, R::f(va, vb));
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        let (da, db) = (graph.dot(a), graph.dot(b));
        graph.set_dot(node, R::forward_dot_value(va, vb, da, db));
    }

    fn backward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        let w = graph.gradient(node);
        graph.accumulate_gradient(a, w * R::dfa(va, vb));
        graph.accumulate_gradient(b, w * R::dfb(va, vb));
    }

    fn hvp_backward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 2 {
            return;
        }
        let inputs = graph.inputs(node);
        let (a, b) = (inputs[0], inputs[1]);
        let (va, vb) = (graph.value(a), graph.value(b));
        let (da, db) = (graph.dot(a), graph.dot(b));
        let w = graph.gradient(node);
        let wdot = graph.grad_dot(node);
        graph.accumulate_gradient(a, w * R::dfa(va, vb));
        graph.accumulate_gradient(b, w * R::dfb(va, vb));
        graph.accumulate_grad_dot(
            a,
            wdot * R::dfa(va, vb) + w * (R::d2aa(va, vb) * da + R::d2ab(va, vb) * db),
        );
        graph.accumulate_grad_dot(
            b,
            wdot * R::dfb(va, vb) + w * (R::d2ab(va, vb) * da + R::d2bb(va, vb) * db),
        );
    }
}

/// `a + b`, the arity-2 fast path for `Operator::Add` (see `nary_add` for
/// arity != 2).
pub struct AddRule;
impl BinaryRule for AddRule {
    const OPERATOR: Operator = Operator::Add;
    fn f(a: f64, b: f64) -> f64 {
        a + b
    }
    fn dfa(_a: f64, _b: f64) -> f64 {
        1.0
    }
    fn dfb(_a: f64, _b: f64) -> f64 {
        1.0
    }
    fn d2aa(_a: f64, _b: f64) -> f64 {
        0.0
    }
    fn d2ab(_a: f64, _b: f64) -> f64 {
        0.0
    }
    fn d2bb(_a: f64, _b: f64) -> f64 {
        0.0
    }
}

pub struct SubRule;
impl BinaryRule for SubRule {
    const OPERATOR: Operator = Operator::Subtract;
    fn f(a: f64, b: f64) -> f64 {
        a - b
    }
    fn dfa(_a: f64, _b: f64) -> f64 {
        1.0
    }
    fn dfb(_a: f64, _b: f64) -> f64 {
        -1.0
    }
    fn d2aa(_a: f64, _b: f64) -> f64 {
        0.0
    }
    fn d2ab(_a: f64, _b: f64) -> f64 {
        0.0
    }
    fn d2bb(_a: f64, _b: f64) -> f64 {
        0.0
    }
}
pub type Sub = BinaryOp<SubRule>;

/// `a / b`, `0.0` at `b == 0` (spec §4.3 domain guard). `forward_dot_value`
/// shares the `b*b` subexpression with the partials rather than recomputing
/// it twice.
pub struct DivRule;
impl BinaryRule for DivRule {
    const OPERATOR: Operator = Operator::Divide;
    fn f(a: f64, b: f64) -> f64 {
        safe_div(a, b)
    }
    fn dfa(_a: f64, b: f64) -> f64 {
        safe_div(1.0, b)
    }
    fn dfb(a: f64, b: f64) -> f64 {
        if b == 0.0 {
            0.0
        } else {
            -a / (b * b)
        }
    }
    fn d2aa(_a: f64, _b: f64) -> f64 {
        0.0
    }
    fn d2ab(_a: f64, b: f64) -> f64 {
        if b == 0.0 {
            0.0
        } else {
            -1.0 / (b * b)
        }
    }
    fn d2bb(a: f64, b: f64) -> f64 {
        if b == 0.0 {
            0.0
        } else {
            2.0 * a / (b * b * b)
        }
    }
    fn forward_dot_value(a: f64, b: f64, adot: f64, bdot: f64) -> f64 {
        if b == 0.0 {
            0.0
        } else {
            (adot * b - a * bdot) / (b * b)
        }
    }
}
pub type Div = BinaryOp<DivRule>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::Graph;

    const H: f64 = 1e-5;

    fn central_diff2(f: impl Fn(f64, f64) -> f64, a: f64, b: f64) -> (f64, f64) {
        let dfa = (f(a + H, b) - f(a - H, b)) / (2.0 * H);
        let dfb = (f(a, b + H) - f(a, b - H)) / (2.0 * H);
        (dfa, dfb)
    }

    #[test]
    fn sub_matches_finite_differences() {
        let (a, b) = (3.0, 1.5);
        let (dfa, dfb) = central_diff2(SubRule::f, a, b);
        assert!((dfa - SubRule::dfa(a, b)).abs() < 1e-6);
        assert!((dfb - SubRule::dfb(a, b)).abs() < 1e-6);
    }

    #[test]
    fn div_matches_finite_differences_away_from_singularity() {
        for &(a, b) in &[(3.0, 1.5), (-2.0, 4.0), (0.0, 2.0)] {
            let (dfa, dfb) = central_diff2(DivRule::f, a, b);
            assert!((dfa - DivRule::dfa(a, b)).abs() < 1e-6);
            assert!((dfb - DivRule::dfb(a, b)).abs() < 1e-6);
        }
    }

    #[test]
    fn div_guards_zero_denominator() {
        assert_eq!(DivRule::f(5.0, 0.0), 0.0);
        assert_eq!(DivRule::dfa(5.0, 0.0), 0.0);
        assert_eq!(DivRule::dfb(5.0, 0.0), 0.0);
        assert_eq!(DivRule::d2ab(5.0, 0.0), 0.0);
        assert_eq!(DivRule::d2bb(5.0, 0.0), 0.0);
    }

    #[test]
    fn sub_scenario_through_graph() {
        let mut g = Graph::new();
        let a = g.var(5.0);
        let b = g.var(2.0);
        let y = g.sub(a, b).unwrap();
        let order = g.topo_order(y);
        g.forward(&order);
        assert_eq!(g.value(y), 3.0);

        let rev = g.reverse_topo_order(y);
        g.backward(&rev, &[(y, 1.0)]);
        assert_eq!(g.gradient(a), 1.0);
        assert_eq!(g.gradient(b), -1.0);
    }
}
