//! Typed failures that can be observed by simulated actors, plus the
//! setup-time errors raised while building a platform.
//!
//! Kernel invariant violations are not represented here: those are
//! programmer errors and abort the simulation via `assert!`/`unreachable!`,
//! matching the `xbt_assert`/`xbt_die` policy of the kernel this crate is
//! modeled on.

use thiserror::Error;

/// Failures that can be thrown from a blocking simcall (`Comm::wait`,
/// `Exec::wait`, `sleep_for`, ...) back into the issuing actor.
#[derive(Error, Debug, Clone)]
pub enum SimcallError {
    /// A host this activity or actor depends on is off.
    #[error("host '{0}' failed")]
    HostFailure(String),

    /// A link in the activity's route is off.
    #[error("network failure on link '{0}'")]
    NetworkFailure(String),

    /// The blocking operation exceeded its deadline.
    #[error("timeout after {0} seconds")]
    Timeout(f64),

    /// The activity was explicitly cancelled.
    #[error("activity '{0}' cancelled")]
    Cancel(String),

    /// The actor was killed; only observable during its own unwind.
    #[error("actor killed: {0}")]
    ForcefulKill(String),
}

impl SimcallError {
    /// Whether a caller could plausibly retry after this error clears.
    pub fn is_transient(&self) -> bool {
        matches!(self, SimcallError::Timeout(_) | SimcallError::Cancel(_))
    }

    /// Whether this error can only be observed while the actor that raised
    /// it is unwinding its own stack (never delivered to anyone else).
    pub fn is_unwind_only(&self) -> bool {
        matches!(self, SimcallError::ForcefulKill(_))
    }
}

/// Setup-time errors: raised while a platform is being built, never
/// delivered to a running actor.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    /// A name collides with an existing host, link, router or zone.
    #[error("duplicate name '{0}' in zone '{1}'")]
    DuplicateName(String, String),

    /// A route or resource referenced a netpoint that does not exist.
    #[error("unknown netpoint '{0}'")]
    UnknownNetpoint(String),

    /// An operation requires the zone to be sealed (or unsealed) first.
    #[error("zone '{0}' is {1}sealed, which this operation forbids")]
    SealState(String, &'static str),

    /// No route could be resolved between two netpoints.
    #[error("no route between '{0}' and '{1}'")]
    NoRoute(String, String),

    /// A profile file failed to parse.
    #[error("malformed profile file: {0}")]
    ProfileParse(String),
}

/// Result alias for platform-construction code.
pub type PlatformResult<T> = Result<T, PlatformError>;
