//! Context factory: swaps execution between the maestro and a single
//! actor, exactly one of them running at any instant (spec ยง4.8).
//!
//! This crate implements the **Thread** variant only: one OS thread per
//! actor, handed off through a `parking_lot::Mutex` + `Condvar` pair that
//! enforces "at most one of {maestro, this actor} runs at a time" (spec
//! ยง9's "one-thread-at-a-time with a single mutex+condvar"). The
//! `Ucontext`/`Boost.Context`/`Raw` variants need to swap raw stacks via
//! unsafe assembly or platform FFI outside what safe, portable Rust (or a
//! crate in this pack) can express; Thread-mode has an identical contract
//! from both sides, so it stands in as the sole, fully-working
//! implementation (see DESIGN.md).

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Maestro,
    Actor,
    Finished,
}

/// The mutex+condvar pair shared between one actor's OS thread and the
/// maestro thread that resumes it.
pub struct ActorSync {
    turn: Mutex<Turn>,
    condvar: Condvar,
}

impl ActorSync {
    fn new() -> Arc<ActorSync> {
        Arc::new(ActorSync {
            turn: Mutex::new(Turn::Maestro),
            condvar: Condvar::new(),
        })
    }

    /// Called by the maestro thread: hands control to the actor and
    /// blocks until it yields back (or terminates).
    fn resume(&self) {
        let mut turn = self.turn.lock();
        if *turn == Turn::Finished {
            return;
        }
        *turn = Turn::Actor;
        self.condvar.notify_all();
        self.condvar.wait_while(&mut turn, |t| *t == Turn::Actor);
    }

    /// Called from the actor's own thread: hands control back to the
    /// maestro and blocks until resumed again.
    pub fn yield_now(&self) {
        let mut turn = self.turn.lock();
        *turn = Turn::Maestro;
        self.condvar.notify_all();
        self.condvar.wait_while(&mut turn, |t| *t == Turn::Maestro);
    }

    /// Called once, from the actor's own thread, as it returns for good.
    fn finish(&self) {
        let mut turn = self.turn.lock();
        *turn = Turn::Finished;
        self.condvar.notify_all();
    }

    /// Blocks the calling (actor) thread until the maestro hands it its
    /// first turn. Every actor thread starts parked here.
    fn wait_for_first_turn(&self) {
        let mut turn = self.turn.lock();
        self.condvar.wait_while(&mut turn, |t| *t == Turn::Maestro);
    }
}

/// Shared handle to an actor's sync pair, passed into `ThisActor`.
pub type ActorSyncHandle = Arc<ActorSync>;

/// Unwind marker thrown by `ThisActor::exit` (and by a `yield_now` that
/// observes it was force-killed) to stop the actor's stack from the
/// inside, without its body ever returning normally. Caught at the
/// thread-spawn boundary below and never let past it; mirrors the
/// original kernel's `ForcefulKillException` (`ActorImpl.cpp`), which
/// unwinds the actor's native stack the same way.
pub(crate) struct ActorExit;

/// A value that is not `Send` but is safe to move into an actor's OS
/// thread because the `ActorSync` handoff protocol guarantees at most one
/// of {maestro, this actor} ever touches it at a time.
///
/// SAFETY: every access to the wrapped value happens either (a) on the
/// maestro thread while the corresponding `ActorSync` reports `Turn::Maestro`
/// or `Turn::Finished`, or (b) on the actor thread while it reports
/// `Turn::Actor`. Those two windows never overlap, so sharing non-`Sync`
/// kernel state this way cannot race.
struct AssertSend<T>(T);
unsafe impl<T> Send for AssertSend<T> {}

/// An actor's executable body: a plain closure taking a handle it uses to
/// perform simcalls. `FnOnce` because one run consumes it; restart
/// recreates a fresh body from the actor's `ActorFactory`.
pub type ActorBody = Box<dyn FnOnce(super::lifecycle::ThisActor)>;

/// The maestro-facing half of a running actor's context.
pub trait Context {
    /// Resumes this actor; blocks until it yields or terminates.
    fn resume(&self);
    fn is_finished(&self) -> bool;
}

pub struct ThreadContext {
    sync: Arc<ActorSync>,
    handle: Option<JoinHandle<()>>,
}

impl Context for ThreadContext {
    fn resume(&self) {
        self.sync.resume();
    }

    fn is_finished(&self) -> bool {
        matches!(*self.sync.turn.lock(), Turn::Finished)
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Builds `Context`s. A trait so the kernel could in principle be built
/// against a different variant without touching call sites (spec ยง4.8);
/// only `ThreadContextFactory` is implemented here.
pub trait ContextFactory {
    /// `engine` is a raw pointer to the owning `Engine`; the actor body
    /// dereferences it only while holding its turn (see `AssertSend`'s
    /// safety note).
    fn create(&self, engine: *mut crate::engine::Engine, pid: crate::Pid, body: ActorBody) -> Box<dyn Context>;
}

pub struct ThreadContextFactory;

impl ContextFactory for ThreadContextFactory {
    fn create(&self, engine: *mut crate::engine::Engine, pid: crate::Pid, body: ActorBody) -> Box<dyn Context> {
        let sync = ActorSync::new();
        let thread_sync = sync.clone();
        // SAFETY: see `AssertSend`'s doc comment; the protocol below keeps
        // `engine` and `body` single-owner at every instant.
        let payload = AssertSend((engine, body));
        let handle = std::thread::Builder::new()
            .name(format!("actor-{}", pid))
            .spawn(move || {
                let AssertSend((engine, body)) = payload;
                thread_sync.wait_for_first_turn();
                // SAFETY: we hold the turn (Turn::Actor) for the whole
                // body call; `ThisActor` re-derefs `engine` only under the
                // same guarantee, never storing the raw pointer past a
                // `yield_now()` call boundary without re-checking turn.
                let this_actor = super::lifecycle::ThisActor::new(pid, engine, thread_sync.clone());
                // `exit()` (and a force-killed `yield_now()`) stop the actor
                // by unwinding rather than returning, so `finish()` must run
                // unconditionally here rather than after `body()` returns.
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(this_actor)));
                thread_sync.finish();
                if let Err(payload) = result {
                    if !payload.is::<ActorExit>() {
                        std::panic::resume_unwind(payload);
                    }
                }
            })
            .expect("spawning an actor thread");
        Box::new(ThreadContext {
            sync,
            handle: Some(handle),
        })
    }
}
