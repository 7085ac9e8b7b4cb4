//! Actor execution contexts and lifecycle bookkeeping (spec ยง3/ยง4.8/ยง4.9).

pub mod context;
pub mod lifecycle;

pub use context::{ActorBody, Context, ContextFactory, ThreadContextFactory};
pub use lifecycle::{ActorFactory, ActorFlags, ActorImpl, OnExitHook, ThisActor};
