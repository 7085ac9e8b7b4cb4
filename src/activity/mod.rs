//! Activities: in-flight Exec/Comm/Sleep/IO operations that bind an LMM
//! variable to the actors waiting on them.
//!
//! Spec ยง3 describes a single abstract `ActivityImpl` with four concrete
//! variants. Rather than a trait object per activity (there is no part of
//! this crate that needs to hold a `Vec<Box<dyn Activity>>` of mixed kinds
//! without knowing which), this crate closes the variant set with
//! [`ActivityKind`], an enum holding each kind's own data — the same
//! pattern the teacher uses for `NetworkEvent` in `network.rs`. Common
//! bookkeeping (state, waiters, the LMM variable, remaining work) lives
//! once on [`ActivityImpl`] instead of being duplicated per variant.

pub mod comm;
pub mod exec;
pub mod io;
pub mod sleep;

pub use comm::CommImpl;
pub use exec::ExecImpl;
pub use io::IoImpl;
pub use sleep::SleepImpl;

use crate::errors::SimcallError;
use crate::lmm;
use crate::Pid;

/// Activity lifecycle state, per spec ยง3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Inited,
    Starting,
    Started,
    Waiting,
    Done,
    Canceled,
    Failed,
}

impl ActivityState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActivityState::Done | ActivityState::Canceled | ActivityState::Failed
        )
    }
}

/// The per-kind payload of an activity.
pub enum ActivityKind {
    Exec(ExecImpl),
    Comm(CommImpl),
    Sleep(SleepImpl),
    Io(IoImpl),
}

/// A single in-flight activity: an Exec, Comm, Sleep or I/O operation, plus
/// the bookkeeping common to all four.
pub struct ActivityImpl {
    pub name: String,
    pub state: ActivityState,
    pub kind: ActivityKind,
    /// Actors blocked in a `wait()` on this activity; woken on completion,
    /// cancellation or failure.
    pub waiting_actors: Vec<Pid>,
    /// The LMM variable(s) this activity drives. A sequential exec or a
    /// point-to-point comm uses exactly one; a parallel task binds several
    /// hosts/links to a single rate via one variable with many edges, so
    /// one variable id still suffices — callers needing per-edge detail
    /// keep their own bookkeeping (see `ExecImpl::host_flops`).
    pub variable: Option<lmm::VariableId>,
    /// Remaining work, in the activity's native unit (flops or bytes).
    pub remaining: f64,
    /// Network activities only: latency countdown before the transfer
    /// competes for bandwidth (spec ยง4.3).
    pub latency_remaining: f64,
    pub failure: Option<SimcallError>,
}

impl ActivityImpl {
    pub fn new(name: impl Into<String>, kind: ActivityKind, remaining: f64) -> ActivityImpl {
        ActivityImpl {
            name: name.into(),
            state: ActivityState::Inited,
            kind,
            waiting_actors: Vec::new(),
            variable: None,
            remaining,
            latency_remaining: 0.0,
            failure: None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self.kind, ActivityKind::Comm(_))
    }

    /// Debits `rate * delta` from the remaining work, transitioning to
    /// `Done` at or below zero. No-op for terminal or not-yet-started
    /// activities. Returns true if this call made the activity terminal.
    pub fn account(&mut self, rate: f64, delta: f64) -> bool {
        if self.state.is_terminal() || self.state != ActivityState::Started {
            return false;
        }
        if self.latency_remaining > 0.0 {
            self.latency_remaining = (self.latency_remaining - delta).max(0.0);
            return false;
        }
        self.remaining -= rate * delta;
        if self.remaining <= lmm::PRECISION {
            self.remaining = 0.0;
            self.state = ActivityState::Done;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = ActivityState::Canceled;
            self.failure = Some(SimcallError::Cancel(self.name.clone()));
        }
    }

    pub fn fail(&mut self, reason: SimcallError) {
        if !self.state.is_terminal() {
            self.state = ActivityState::Failed;
            self.failure = Some(reason);
        }
    }

    pub fn take_waiters(&mut self) -> Vec<Pid> {
        std::mem::take(&mut self.waiting_actors)
    }
}
