//! Per-thread scratch pool for n-ary operators (Add, Multiply, Softmax).
//!
//! Multiply's prefix/suffix product tables and Softmax's per-input weight
//! vector need scratch space proportional to a node's arity. Rather than
//! allocate a fresh `Vec` on every pass, the pool keeps a handful of
//! growable buffers and lends them out through [`ScratchPool::nary_buffers`]
//! and [`ScratchPool::softmax_y`]; buffers grow monotonically to the largest
//! arity seen and are never aliased across threads.

use std::cell::RefCell;

/// Growable scalar buffers reused across n-ary rule invocations.
#[derive(Default)]
pub struct ScratchPool {
    vals: Vec<f64>,
    dots: Vec<f64>,
    pre: Vec<f64>,
    suf: Vec<f64>,
    y: Vec<f64>,
}

impl ScratchPool {
    pub fn new() -> Self {
        ScratchPool::default()
    }

    fn grow(buf: &mut Vec<f64>, len: usize) {
        if buf.len() < len {
            buf.resize(len, 0.0);
        }
    }

    /// Borrow `vals`/`dots`/`pre`/`suf` together, sized for one n-ary call
    /// over `m` inputs. `vals`/`dots` are cleared to zero for the caller to
    /// fill with each input's value/dot; `pre`/`suf` are sized `m + 1` and
    /// cleared to one (the product tables' identity element) for the caller
    /// to build the prefix/suffix tables into. Handed out together so a
    /// caller building the prefix/suffix tables from `vals` never needs a
    /// second borrow of the pool.
    pub fn nary_buffers(
        &mut self,
        m: usize,
    ) -> (&mut [f64], &mut [f64], &mut [f64], &mut [f64]) {
        Self::grow(&mut self.vals, m);
        Self::grow(&mut self.dots, m);
        Self::grow(&mut self.pre, m + 1);
        Self::grow(&mut self.suf, m + 1);
        self.vals[..m].fill(0.0);
        self.dots[..m].fill(0.0);
        self.pre[..m + 1].fill(1.0);
        self.suf[..m + 1].fill(1.0);
        (
            &mut self.vals[..m],
            &mut self.dots[..m],
            &mut self.pre[..m + 1],
            &mut self.suf[..m + 1],
        )
    }

    /// Borrow the softmax output-weight buffer sized to `m`, cleared to zero.
    pub fn softmax_y(&mut self, m: usize) -> &mut [f64] {
        Self::grow(&mut self.y, m);
        self.y[..m].fill(0.0);
        &mut self.y[..m]
    }
}

thread_local! {
    static THREAD_POOL: RefCell<ScratchPool> = RefCell::new(ScratchPool::new());
}

/// Run `f` with exclusive access to this thread's scratch pool.
///
/// Equivalent to owning a [`ScratchPool`] directly (as [`crate::Graph`]
/// does by default) but usable by callers who want rule evaluation to reach
/// into `thread_local!` storage instead of threading a pool through every
/// call, matching the spec's "per-thread scratch pool" framing.
pub fn with_thread_pool<R>(f: impl FnOnce(&mut ScratchPool) -> R) -> R {
    THREAD_POOL.with(|cell| f(&mut cell.borrow_mut()))
}
