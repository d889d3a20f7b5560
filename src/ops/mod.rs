//! Operators as first-class objects: the `Operator` tag, the `Op` trait
//! (the four pass entry points plus a name), and the registry that maps a
//! tag to its rule implementation. Adding an operator means implementing
//! the trait and registering it; no change to the graph driver.

use crate::autograd::{Graph, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod binary;
pub mod constant;
pub mod max;
pub mod nary_add;
pub mod nary_multiply;
pub mod softmax;
pub mod unary;

#[derive(Error, Debug)]
#[error("op error: {0}")]
pub struct OpError(pub String);

pub type OpResult<T> = Result<T, OpError>;

/// Closed set of operator tags. Mirrors the external `Operator` enum named
/// in the spec; `Unknown` is reserved so a tag this build doesn't recognize
/// (e.g. deserialized from a newer snapshot) dispatches to a no-op instead
/// of panicking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Operator {
    Cte,
    Var,
    Add,
    Subtract,
    Multiply,
    Divide,
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Max,
    Tanh,
    Silu,
    Gelu,
    Relu,
    Softmax,
    Unknown,
}

/// How many inputs an operator accepts, for construction-time validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Nullary,
    Unary,
    Binary,
    /// At least one input; Add and Multiply additionally special-case
    /// arity 2 as a fast path (see `nary_add`, `nary_multiply`).
    NAry,
}

impl Operator {
    pub fn arity(self) -> Arity {
        match self {
            Operator::Cte | Operator::Var => Arity::Nullary,
            Operator::Sin
            | Operator::Cos
            | Operator::Tan
            | Operator::Exp
            | Operator::Log
            | Operator::Tanh
            | Operator::Silu
            | Operator::Gelu
            | Operator::Relu => Arity::Unary,
            Operator::Subtract | Operator::Divide | Operator::Max => Arity::Binary,
            Operator::Add | Operator::Multiply | Operator::Softmax => Arity::NAry,
            Operator::Unknown => Arity::NAry,
        }
    }

    /// True if `n` inputs satisfy this operator's arity class.
    pub fn accepts_arity(self, n: usize) -> bool {
        match self.arity() {
            Arity::Nullary => n == 0,
            Arity::Unary => n == 1,
            Arity::Binary => n == 2,
            Arity::NAry => n >= 1,
        }
    }
}

/// Stable, human-readable name for an operator. A single closed-set switch
/// over the tag, independent of the registry.
pub fn name(op: Operator) -> &'static str {
    match op {
        Operator::Cte => "Cte",
        Operator::Var => "Var",
        Operator::Add => "Add",
        Operator::Subtract => "Subtract",
        Operator::Multiply => "Multiply",
        Operator::Divide => "Divide",
        Operator::Sin => "Sin",
        Operator::Cos => "Cos",
        Operator::Tan => "Tan",
        Operator::Exp => "Exp",
        Operator::Log => "Log",
        Operator::Max => "Max",
        Operator::Tanh => "Tanh",
        Operator::Silu => "Silu",
        Operator::Gelu => "Gelu",
        Operator::Relu => "Relu",
        Operator::Softmax => "Softmax",
        Operator::Unknown => "Unknown",
    }
}

/// Unified operator trait: the four passes, dispatched on `node`'s inputs
/// read from and written into `graph`.
///
/// Every method must be permissive at arity mismatch: if the node does not
/// carry the arity this op expects, the method returns without reading or
/// writing any slot (see spec §7, "Arity mismatch").
pub trait Op: Send + Sync {
    fn id(&self) -> Operator;

    fn name(&self) -> &'static str {
        name(self.id())
    }

    /// Primal pass: compute and `set` this node's `value`.
    fn forward(&self, graph: &mut Graph, node: NodeId);

    /// Forward-mode tangent pass: compute and `set` this node's `dot`.
    fn forward_dot(&self, graph: &mut Graph, node: NodeId);

    /// Reverse-mode gradient pass: accumulate into each input's `gradient`.
    fn backward(&self, graph: &mut Graph, node: NodeId);

    /// Forward-over-reverse Hessian-vector pass: accumulate into each
    /// input's `gradient` and `grad_dot`.
    fn hvp_backward(&self, graph: &mut Graph, node: NodeId);
}

/// Registry: `Operator` tag -> rule implementation. The graph driver looks
/// the op up once per node per pass; this is the "closed-set switch over
/// the tag" the spec describes, realized as a lookup table instead of a
/// literal `match` so registering a new op never touches the driver.
pub struct OpRegistry {
    ops: HashMap<Operator, Arc<dyn Op>>,
}

impl OpRegistry {
    pub fn new() -> Self {
        let mut reg = OpRegistry {
            ops: HashMap::new(),
        };
        reg.register(Arc::new(constant::Cte));
        reg.register(Arc::new(constant::Var));
        reg.register(Arc::new(nary_add::Add));
        reg.register(Arc::new(binary::Sub));
        reg.register(Arc::new(nary_multiply::Multiply));
        reg.register(Arc::new(binary::Div));
        reg.register(Arc::new(unary::Sin));
        reg.register(Arc::new(unary::Cos));
        reg.register(Arc::new(unary::Tan));
        reg.register(Arc::new(unary::Exp));
        reg.register(Arc::new(unary::Log));
        reg.register(Arc::new(max::Max));
        reg.register(Arc::new(unary::Tanh));
        reg.register(Arc::new(unary::Silu));
        reg.register(Arc::new(unary::Gelu));
        reg.register(Arc::new(unary::Relu));
        reg.register(Arc::new(softmax::Softmax));
        reg
    }

    pub fn register(&mut self, op: Arc<dyn Op>) {
        self.ops.insert(op.id(), op);
    }

    pub fn get(&self, id: Operator) -> Option<Arc<dyn Op>> {
        self.ops.get(&id).cloned()
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_non_unknown_operator_is_registered() {
        let reg = OpRegistry::new();
        let all = [
            Operator::Cte,
            Operator::Var,
            Operator::Add,
            Operator::Subtract,
            Operator::Multiply,
            Operator::Divide,
            Operator::Sin,
            Operator::Cos,
            Operator::Tan,
            Operator::Exp,
            Operator::Log,
            Operator::Max,
            Operator::Tanh,
            Operator::Silu,
            Operator::Gelu,
            Operator::Relu,
            Operator::Softmax,
        ];
        for op in all {
            assert!(reg.get(op).is_some(), "{:?} not registered", op);
        }
        assert!(reg.get(Operator::Unknown).is_none());
    }

    #[test]
    fn arity_classes_match_spec_table() {
        assert!(Operator::Cte.accepts_arity(0));
        assert!(!Operator::Cte.accepts_arity(1));
        assert!(Operator::Sin.accepts_arity(1));
        assert!(!Operator::Sin.accepts_arity(2));
        assert!(Operator::Subtract.accepts_arity(2));
        assert!(!Operator::Subtract.accepts_arity(3));
        assert!(Operator::Add.accepts_arity(1));
        assert!(Operator::Add.accepts_arity(5));
        assert!(!Operator::Add.accepts_arity(0));
    }
}
