//! The uniform trap from actor code into the kernel (spec ยง4.7).
//!
//! A user actor fills in a `Simcall` (a closure capturing the kernel
//! mutation it wants, plus an optional observer for introspection) and
//! yields. The maestro's `handle_simcall` step runs the closure with
//! exclusive access to the `Engine`; the closure either answers the call
//! immediately or registers the issuing actor as a waiter on some
//! activity. There is deliberately no hand-rolled per-simcall-type
//! dispatch table — the closure *is* the dispatch, exactly as spec ยง9
//! asks for.

use crate::errors::SimcallError;
use crate::{ActivityId, Pid};

/// Whether a simcall was answered synchronously or is waiting on an
/// activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    None,
    RunAnswered,
    RunBlocking,
}

/// The result an actor's blocking call eventually reads back.
#[derive(Debug, Clone)]
pub enum SimcallResult {
    Unit,
    NewPid(Pid),
    /// Handed back by `exec_async`/`comm_isend`-style calls that start an
    /// activity without blocking on it (spec ยง6's asynchronous variants).
    NewActivity(ActivityId),
    Failure(SimcallError),
}

/// Typed, introspectable description of a simcall's arguments — carried
/// separately from the closure so a future tracer or model-checker could
/// read "what was requested" without understanding every closure body
/// (spec ยง4.7's explicit mention of that use case; this crate has no such
/// consumer yet, but the seam is real).
pub trait SimcallObserver: std::fmt::Debug {
    fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

#[derive(Debug)]
pub struct NoObserver;
impl SimcallObserver for NoObserver {}

/// One pending trap, attached to the issuing actor until the maestro's
/// `handle_simcall` step consumes it.
pub struct Simcall {
    pub issuer: Pid,
    pub kind: CallKind,
    pub code: Box<dyn FnOnce(&mut crate::engine::Engine, Pid) -> SimcallOutcome>,
    pub observer: Box<dyn SimcallObserver>,
}

/// What running a simcall's `code` produced.
pub enum SimcallOutcome {
    /// Answered synchronously; the actor is runnable again this pass.
    Answered(SimcallResult),
    /// Registered as a waiter on `ActivityId`; stays blocked until it
    /// completes, fails, or is canceled.
    Blocked(ActivityId),
}
