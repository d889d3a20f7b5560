//! Unary rule template: each rule supplies `f`, `df`, `d2`; the generic
//! [`UnaryOp`] adapter derives the four pass bodies once. A rule may
//! override `forward_dot_value` to share a subexpression with the primal
//! value already produced for this node (Log, Tan).

use crate::autograd::{Graph, NodeId};
use crate::numeric::{gelu_phi, safe_recip, stable_sigmoid};
use crate::ops::{Op, Operator};
use std::marker::PhantomData;

/// `f`, first derivative `df`, second derivative `d2` of a scalar function.
pub trait UnaryRule: Send + Sync {
    const OPERATOR: Operator;

    fn f(x: f64) -> f64;
    fn df(x: f64) -> f64;
    fn d2(x: f64) -> f64;

    /// Tangent contribution `dy = df(x) * xdot`. `y` is the primal value
    /// already computed for this node this val-epoch; a rule may read it
    /// instead of recomputing a subexpression of `df`.
    fn forward_dot_value(x: f64, _y: f64, xdot: f64) -> f64 {
        Self::df(x) * xdot
    }
}

/// Generic adapter: binds a [`UnaryRule`] to the [`Op`] trait.
pub struct UnaryOp<R: UnaryRule>(PhantomData<R>);

impl<R: UnaryRule> UnaryOp<R> {
    pub const fn new() -> Self {
        UnaryOp(PhantomData)
    }
}

impl<R: UnaryRule> Op for UnaryOp<R> {
    fn id(&self) -> Operator {
        R::OPERATOR
    }

    fn forward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 1 {
            return;
        }
        let a = graph.inputs(node)[0];
        let x = graph.value(a);
        graph.set_value(node, R::f(x));
    }

    fn forward_dot(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 1 {
            return;
        }
        let a = graph.inputs(node)[0];
        let x = graph.value(a);
        let xdot = graph.dot(a);
        let y = graph.value(node);
        graph.set_dot(node, R::forward_dot_value(x, y, xdot));
    }

    fn backward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 1 {
            return;
        }
        let a = graph.inputs(node)[0];
        let x = graph.value(a);
        let w = graph.gradient(node);
        graph.accumulate_gradient(a, w * R::df(x));
    }

    fn hvp_backward(&self, graph: &mut Graph, node: NodeId) {
        if graph.arity(node) != 1 {
            return;
        }
        let a = graph.inputs(node)[0];
        let x = graph.value(a);
        let xdot = graph.dot(a);
        let w = graph.gradient(node);
        let wdot = graph.grad_dot(node);
        graph.accumulate_gradient(a, w * R::df(x));
        graph.accumulate_grad_dot(a, wdot * R::df(x) + w * R::d2(x) * xdot);
    }
}

pub struct SinRule;
impl UnaryRule for SinRule {
    const OPERATOR: Operator = Operator::Sin;
    fn f(x: f64) -> f64 {
        x.sin()
    }
    fn df(x: f64) -> f64 {
        x.cos()
    }
    fn d2(x: f64) -> f64 {
        -x.sin()
    }
}
pub type Sin = UnaryOp<SinRule>;

pub struct CosRule;
impl UnaryRule for CosRule {
    const OPERATOR: Operator = Operator::Cos;
    fn f(x: f64) -> f64 {
        x.cos()
    }
    fn df(x: f64) -> f64 {
        -x.sin()
    }
    fn d2(x: f64) -> f64 {
        -x.cos()
    }
}
pub type Cos = UnaryOp<CosRule>;

pub struct ExpRule;
impl UnaryRule for ExpRule {
    const OPERATOR: Operator = Operator::Exp;
    fn f(x: f64) -> f64 {
        x.exp()
    }
    fn df(x: f64) -> f64 {
        x.exp()
    }
    fn d2(x: f64) -> f64 {
        x.exp()
    }
}
pub type Exp = UnaryOp<ExpRule>;

/// `ln x`; derivative clamped to 0 at `x == 0` (spec §4.2 domain guard).
pub struct LogRule;
impl UnaryRule for LogRule {
    const OPERATOR: Operator = Operator::Log;
    fn f(x: f64) -> f64 {
        x.ln()
    }
    fn df(x: f64) -> f64 {
        safe_recip(x)
    }
    fn d2(x: f64) -> f64 {
        if x == 0.0 {
            0.0
        } else {
            -1.0 / (x * x)
        }
    }
    fn forward_dot_value(x: f64, _y: f64, xdot: f64) -> f64 {
        safe_recip(x) * xdot
    }
}
pub type Log = UnaryOp<LogRule>;

/// `tan x`; derivative clamped to 0 where `cos x == 0` (spec §4.2 domain
/// guard). `forward_dot_value` reuses the already-computed primal `tan x`
/// to form `sec^2 x = 1 + tan^2 x` instead of recomputing `cos x`.
pub struct TanRule;
impl UnaryRule for TanRule {
    const OPERATOR: Operator = Operator::Tan;
    fn f(x: f64) -> f64 {
        x.tan()
    }
    fn df(x: f64) -> f64 {
        let c = x.cos();
        if c == 0.0 {
            0.0
        } else {
            1.0 / (c * c)
        }
    }
    fn d2(x: f64) -> f64 {
        let c = x.cos();
        if c == 0.0 {
            0.0
        } else {
            2.0 * x.sin() / (c * c * c)
        }
    }
    fn forward_dot_value(x: f64, y: f64, xdot: f64) -> f64 {
        if x.cos() == 0.0 {
            0.0
        } else {
            (1.0 + y * y) * xdot
        }
    }
}
pub type Tan = UnaryOp<TanRule>;

pub struct TanhRule;
impl UnaryRule for TanhRule {
    const OPERATOR: Operator = Operator::Tanh;
    fn f(x: f64) -> f64 {
        x.tanh()
    }
    fn df(x: f64) -> f64 {
        let t = x.tanh();
        1.0 - t * t
    }
    fn d2(x: f64) -> f64 {
        let t = x.tanh();
        -2.0 * t * (1.0 - t * t)
    }
}
pub type Tanh = UnaryOp<TanhRule>;

/// `max(x, 0)`; nonsmooth at 0, left-subgradient (derivative 0 at x == 0).
pub struct ReluRule;
impl UnaryRule for ReluRule {
    const OPERATOR: Operator = Operator::Relu;
    fn f(x: f64) -> f64 {
        x.max(0.0)
    }
    fn df(x: f64) -> f64 {
        if x > 0.0 {
            1.0
        } else {
            0.0
        }
    }
    fn d2(_x: f64) -> f64 {
        0.0
    }
}
pub type Relu = UnaryOp<ReluRule>;

/// `x * sigmoid(x)`, using the numerically stable sigmoid.
pub struct SiluRule;
impl UnaryRule for SiluRule {
    const OPERATOR: Operator = Operator::Silu;
    fn f(x: f64) -> f64 {
        x * stable_sigmoid(x)
    }
    fn df(x: f64) -> f64 {
        let s = stable_sigmoid(x);
        s * (1.0 + x * (1.0 - s))
    }
    fn d2(x: f64) -> f64 {
        let s = stable_sigmoid(x);
        s * (1.0 - s) * (2.0 + x * (1.0 - 2.0 * s))
    }
}
pub type Silu = UnaryOp<SiluRule>;

/// `0.5 x (1 + erf(x / sqrt 2))`, the exact erf-based Gelu.
pub struct GeluRule;
impl UnaryRule for GeluRule {
    const OPERATOR: Operator = Operator::Gelu;
    fn f(x: f64) -> f64 {
        0.5 * x * (1.0 + crate::numeric::erf(x / std::f64::consts::SQRT_2))
    }
    fn df(x: f64) -> f64 {
        let erf_term = crate::numeric::erf(x / std::f64::consts::SQRT_2);
        0.5 * (1.0 + erf_term) + 0.5 * x * gelu_phi(x)
    }
    fn d2(x: f64) -> f64 {
        gelu_phi(x) * (1.0 - 0.5 * x * x)
    }
}
pub type Gelu = UnaryOp<GeluRule>;
