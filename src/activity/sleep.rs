//! Sleep activities: a pure time advance on one host, with no resource
//! contention — implemented as a variable on a dedicated
//! infinite-capacity constraint so it always runs at rate 1.0 and finishes
//! exactly after the requested duration (spec ยง4.4).

use super::{ActivityImpl, ActivityKind, ActivityState};
use crate::lmm;

pub struct SleepImpl {
    pub host: String,
    pub duration: f64,
}

impl SleepImpl {
    /// `sleep_constraint` is a per-engine constraint of effectively
    /// infinite capacity (see `Engine::sleep_constraint`) shared by every
    /// sleeping actor; since its capacity never saturates, every bound
    /// variable gets rate exactly 1.0 (its only demand), so `remaining`
    /// (in seconds) counts down at wall-clock pace.
    pub fn new(
        system: &mut lmm::System,
        name: impl Into<String>,
        host: impl Into<String>,
        duration: f64,
        sleep_constraint: lmm::ConstraintId,
    ) -> ActivityImpl {
        let kind = SleepImpl {
            host: host.into(),
            duration,
        };
        let variable = system.add_variable(1.0, Some(1.0));
        system.expand(variable, sleep_constraint, 1.0);
        let mut activity = ActivityImpl::new(name, ActivityKind::Sleep(kind), duration);
        activity.variable = Some(variable);
        activity.state = ActivityState::Started;
        activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_runs_at_rate_one() {
        let mut sys = lmm::System::new();
        let sleep_constraint = sys.add_constraint(f64::INFINITY, lmm::SharingPolicy::FatPipe);
        let mut activity = SleepImpl::new(&mut sys, "nap", "h1", 2.0, sleep_constraint);
        sys.solve();
        let rate = sys.rate(activity.variable.unwrap());
        assert!((rate - 1.0).abs() < 1e-6);
        assert!(activity.account(rate, 2.0));
    }
}
