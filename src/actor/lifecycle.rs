//! Actor creation, state, and the `ThisActor` handle user code runs
//! against. Spec ยง3/ยง4.9, plus `attach`/`detach`/`restart_count`/
//! `properties` from `original_source/src/kernel/actor/ActorImpl.cpp`.

use super::context::{ActorBody, ActorSyncHandle, Context};
use crate::clock::EventHandle;
use crate::errors::SimcallError;
use crate::simcall::{Simcall, SimcallResult};
use crate::{ActivityId, Pid};
use std::collections::HashMap;
use std::rc::Rc;

/// Produces a fresh `ActorBody` each time it is called. Stored on a
/// host's boot roster so a restarted actor starts from the beginning of
/// its code, per spec ยง3's actor lifecycle and ยง8's auto-restart
/// invariant.
pub type ActorFactory = Rc<dyn Fn() -> ActorBody>;

/// A callback run (in reverse registration order) as an actor unwinds,
/// per spec ยง3/ยง9.
pub type OnExitHook = Box<dyn FnOnce(bool)>;

/// State flags orthogonal to the coarse lifecycle phase (spec ยง3).
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorFlags {
    pub suspended: bool,
    pub daemon: bool,
    pub wannadie: bool,
    pub auto_restart: bool,
}

/// A simulated actor: one cooperatively-scheduled "thread" of user code.
/// `maestro` is the distinguished `ActorImpl` with `code = None`: it has
/// no context (it never runs as a resumed actor; it *is* the resumer).
pub struct ActorImpl {
    pub pid: Pid,
    pub ppid: Pid,
    pub name: String,
    pub host: String,
    pub flags: ActorFlags,
    pub kill_timer: Option<EventHandle>,
    pub on_exit: Vec<OnExitHook>,
    /// Mailboxes this actor owns as the assigned receiver.
    pub owned_mailboxes: Vec<String>,
    /// Activities this actor holds a strong reference to (spawned but not
    /// yet collected).
    pub activities: Vec<ActivityId>,
    /// The subset of `activities` this actor is currently blocked on.
    pub waiting_synchros: Vec<ActivityId>,
    pub pending_simcall: Option<Simcall>,
    pub restart_count: u32,
    pub properties: HashMap<String, String>,
    pub context: Option<Box<dyn Context>>,
    /// Set once, by `Engine::attach`, for a pseudo-actor representing
    /// code that runs on a thread the kernel did not create.
    pub attached: bool,
}

impl ActorImpl {
    pub fn new(pid: Pid, ppid: Pid, name: impl Into<String>, host: impl Into<String>) -> ActorImpl {
        ActorImpl {
            pid,
            ppid,
            name: name.into(),
            host: host.into(),
            flags: ActorFlags::default(),
            kill_timer: None,
            on_exit: Vec::new(),
            owned_mailboxes: Vec::new(),
            activities: Vec::new(),
            waiting_synchros: Vec::new(),
            pending_simcall: None,
            restart_count: 0,
            properties: HashMap::new(),
            context: None,
            attached: false,
        }
    }

    pub fn is_maestro(&self) -> bool {
        self.pid == 0
    }

    pub fn on_exit(&mut self, hook: OnExitHook) {
        self.on_exit.push(hook);
    }

    /// Takes every registered `on_exit` hook, most-recently-registered
    /// first. The caller runs them and decides how to handle an
    /// individual hook panicking (spec ยง7: shutdown continues either way).
    pub fn take_on_exit_hooks(&mut self) -> Vec<OnExitHook> {
        let mut hooks = std::mem::take(&mut self.on_exit);
        hooks.reverse();
        hooks
    }
}

/// The handle user code runs against: `ThisActor::sleep_for`, `::execute`,
/// `::send`/`::recv`, and friends each file a [`Simcall`], yield, and read
/// back the answer once the maestro resumes them.
pub struct ThisActor {
    pid: Pid,
    engine: *mut crate::engine::Engine,
    sync: ActorSyncHandle,
}

// SAFETY: `ThisActor` is only ever constructed on its own actor thread and
// only dereferences `engine` while holding its turn, matching the
// `AssertSend` contract in `context.rs`.
unsafe impl Send for ThisActor {}

impl ThisActor {
    pub(crate) fn new(pid: Pid, engine: *mut crate::engine::Engine, sync: ActorSyncHandle) -> ThisActor {
        ThisActor { pid, engine, sync }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[allow(clippy::mut_from_ref)]
    fn engine(&self) -> &mut crate::engine::Engine {
        // SAFETY: see the struct-level comment.
        unsafe { &mut *self.engine }
    }

    pub fn now(&self) -> crate::clock::Time {
        self.engine().now()
    }

    /// Files `code` as this actor's pending simcall and blocks until the
    /// maestro answers it or its activity completes.
    fn trap(&self, code: impl FnOnce(&mut crate::engine::Engine, Pid) -> crate::simcall::SimcallOutcome + 'static) -> SimcallResult {
        {
            let engine = self.engine();
            let actor = engine.actor_mut(self.pid).expect("actor missing from its own engine");
            actor.pending_simcall = Some(Simcall {
                issuer: self.pid,
                kind: crate::simcall::CallKind::None,
                code: Box::new(code),
                observer: Box::new(crate::simcall::NoObserver),
            });
        }
        self.sync.yield_now();
        self.engine().take_simcall_result(self.pid)
    }

    fn trap_unit(&self, code: impl FnOnce(&mut crate::engine::Engine, Pid) -> crate::simcall::SimcallOutcome + 'static) -> Result<(), SimcallError> {
        match self.trap(code) {
            SimcallResult::Unit => Ok(()),
            SimcallResult::Failure(e) => Err(e),
            SimcallResult::NewPid(_) => Ok(()),
            SimcallResult::NewActivity(_) => Ok(()),
        }
    }

    /// Like `trap_unit`, but for a call that hands back a fresh activity
    /// token instead of `Unit` (spec ยง6's `exec_async`/`parallel_execute`).
    fn trap_activity(
        &self,
        code: impl FnOnce(&mut crate::engine::Engine, Pid) -> crate::simcall::SimcallOutcome + 'static,
    ) -> Result<ActivityId, SimcallError> {
        match self.trap(code) {
            SimcallResult::NewActivity(id) => Ok(id),
            SimcallResult::Failure(e) => Err(e),
            _ => unreachable!("trap_activity's simcall must answer with NewActivity or Failure"),
        }
    }

    pub fn sleep_for(&self, duration: f64) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_sleep(pid, duration))
    }

    pub fn execute(&self, flops: f64) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_execute(pid, flops))
    }

    pub fn send(&self, mailbox: impl Into<String>, size_bytes: f64) -> Result<(), SimcallError> {
        let pid = self.pid;
        let mailbox = mailbox.into();
        self.trap_unit(move |engine, _| engine.simcall_send(pid, &mailbox, size_bytes))
    }

    pub fn recv(&self, mailbox: impl Into<String>) -> Result<(), SimcallError> {
        let pid = self.pid;
        let mailbox = mailbox.into();
        self.trap_unit(move |engine, _| engine.simcall_recv(pid, &mailbox))
    }

    pub fn read(&self, disk: impl Into<String>, size_bytes: f64) -> Result<(), SimcallError> {
        let pid = self.pid;
        let disk = disk.into();
        self.trap_unit(move |engine, _| engine.simcall_io(pid, &disk, false, size_bytes))
    }

    pub fn write(&self, disk: impl Into<String>, size_bytes: f64) -> Result<(), SimcallError> {
        let pid = self.pid;
        let disk = disk.into();
        self.trap_unit(move |engine, _| engine.simcall_io(pid, &disk, true, size_bytes))
    }

    /// Blocks until `target` terminates (spec's "join as a Sleep activity
    /// completed early by the joinee's on_exit hook").
    pub fn join(&self, target: Pid, timeout: Option<f64>) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_join(pid, target, timeout))
    }

    /// Forcibly terminates `target` (spec ยง9's `kill`). Takes effect the
    /// next time `target` is resumed, per `Engine::kill_actor`'s Thread-mode
    /// caveat.
    pub fn kill(&self, target: Pid) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_kill(pid, target))
    }

    /// Blocks this actor until another actor calls `resume(self.pid())`.
    pub fn suspend(&self) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_suspend(pid))
    }

    /// Wakes `target` out of a `suspend()` call. A no-op if it isn't
    /// currently suspended.
    pub fn resume(&self, target: Pid) -> Result<(), SimcallError> {
        let _ = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_resume_actor(target))
    }

    /// Flags this actor as a daemon: it no longer keeps the simulation
    /// alive by itself once every non-daemon actor has finished (spec ยง9).
    pub fn daemonize(&self) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_set_daemon(pid, true))
    }

    pub fn undaemonize(&self) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_set_daemon(pid, false))
    }

    /// Schedules this actor to be killed at simulated time `date`.
    pub fn set_kill_time(&self, date: crate::clock::Time) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| {
            engine.set_kill_time(pid, date);
            crate::simcall::SimcallOutcome::Answered(SimcallResult::Unit)
        })
    }

    /// Starts a compute activity without blocking, returning a token to
    /// `wait`/`test`/`cancel` on later.
    pub fn exec_async(&self, flops: f64) -> Result<ActivityId, SimcallError> {
        let pid = self.pid;
        self.trap_activity(move |engine, _| engine.simcall_exec_async(pid, flops))
    }

    /// Runs flops on several hosts and bytes over the links between them as
    /// one rate-coupled task, blocking until it finishes.
    pub fn parallel_execute(&self, host_flops: Vec<(String, f64)>, host_comms: Vec<(String, String, f64)>) -> Result<(), SimcallError> {
        let pid = self.pid;
        self.trap_unit(move |engine, _| engine.simcall_parallel_execute(pid, host_flops, host_comms))
    }

    /// Blocks until `token` reaches a terminal state.
    pub fn wait(&self, token: ActivityId) -> Result<(), SimcallError> {
        self.trap_unit(move |engine, _| engine.simcall_wait(token))
    }

    /// Non-blocking poll: true once `token` has finished, failed, or been
    /// canceled. Reads directly, without trapping, since this actor holds
    /// its turn for the whole call.
    pub fn test(&self, token: ActivityId) -> bool {
        self.engine().test_activity(token)
    }

    /// Cancels an in-flight activity; anyone already blocked on it wakes
    /// with `SimcallError::Cancel`.
    pub fn cancel(&self, token: ActivityId) -> Result<(), SimcallError> {
        self.trap_unit(move |engine, _| engine.simcall_cancel(token))
    }

    /// True if `mailbox` already has a send queued, without consuming it.
    pub fn iprobe(&self, mailbox: impl Into<String>) -> bool {
        let mailbox = mailbox.into();
        self.engine().iprobe(&mailbox)
    }

    /// Cooperative yield with no blocking condition: gives the maestro a
    /// chance to run other ready actors, then resumes this one in the
    /// next pass. If this actor was force-killed while yielded (`kill()`
    /// can land on a plain yield the same as on a blocking call), unwinds
    /// immediately instead of resuming as though nothing happened.
    pub fn yield_now(&self) {
        if self.trap_unit(move |_engine, _| crate::simcall::SimcallOutcome::Answered(SimcallResult::Unit)).is_err() {
            std::panic::panic_any(super::context::ActorExit);
        }
    }

    /// Ends this actor's execution immediately (no further code runs).
    pub fn exit(&self) -> ! {
        let pid = self.pid;
        let _ = self.trap(move |engine, _| {
            engine.mark_wannadie(pid);
            crate::simcall::SimcallOutcome::Answered(SimcallResult::Unit)
        });
        std::panic::panic_any(super::context::ActorExit);
    }
}
