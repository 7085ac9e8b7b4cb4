//! Deterministic, single-process simulation kernel for distributed
//! applications: cooperative actor scheduling, max-min fair resource
//! contention, and hierarchical network routing.
//!
//! The [`engine::Engine`] owns every piece of simulated state — hosts,
//! links, disks, actors, and in-flight activities — in flat, name/id-keyed
//! maps. User code runs inside [`actor::ThisActor`]: each call
//! (`sleep_for`, `execute`, `send`/`recv`, ...) files a [`simcall::Simcall`],
//! yields control back to the maestro, and resumes once that simcall is
//! answered or its underlying activity completes.

pub mod activity;
pub mod actor;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod host;
pub mod lmm;
pub mod logger;
pub mod mailbox;
pub mod resource;
pub mod routing;
pub mod simcall;

/// Identifies an actor. `0` is reserved for the maestro pseudo-actor.
pub type Pid = u64;

/// Identifies a live or completed [`activity::ActivityImpl`].
pub type ActivityId = u64;

pub use engine::Engine;
