//! adcore: reverse-mode automatic differentiation core.
//!
//! Layers: epoch protocol + node record (storage) -> ops (per-operator rule
//! table) -> autograd (graph arena, topological driver, numerical checks).
//!
//! The crate supports four passes over a DAG of scalar arithmetic nodes:
//! primal evaluation, forward-mode tangent propagation (JVP), reverse-mode
//! gradient accumulation (VJP), and forward-over-reverse Hessian-vector
//! products (HVP). See [`ops`] for the per-operator rule table and
//! [`epoch`] for the lazy-zeroing accumulator protocol that makes repeated
//! passes over a shared graph cheap.

pub mod autograd;
pub mod epoch;
pub mod numeric;
pub mod ops;
pub mod scratch;
pub mod state_io;

pub use autograd::{Graph, GraphError, GraphResult, Node, NodeId};
pub use epoch::Slot;
pub use ops::{name, Op, OpError, OpRegistry, OpResult, Operator};
pub use scratch::ScratchPool;
pub use state_io::GraphState;
