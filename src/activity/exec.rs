//! Exec activities: a sequential compute unit on one host, or a parallel
//! task coupling flops on several hosts and bytes on the links between
//! them into a single LMM variable.

use super::{ActivityImpl, ActivityKind, ActivityState};
use crate::lmm;

/// A sequential or parallel compute task.
pub struct ExecImpl {
    /// `(host name, flops demanded on that host, its cpu constraint)`.
    /// A sequential exec has exactly one entry.
    pub host_flops: Vec<(String, f64, lmm::ConstraintId)>,
}

impl ExecImpl {
    /// A single-host exec: `flops` of work at `constraint`'s peak rate.
    pub fn sequential(
        system: &mut lmm::System,
        name: impl Into<String>,
        host: impl Into<String>,
        flops: f64,
        constraint: lmm::ConstraintId,
    ) -> ActivityImpl {
        let host = host.into();
        let kind = ExecImpl {
            host_flops: vec![(host.clone(), flops, constraint)],
        };
        let mut activity = ActivityImpl::new(name, ActivityKind::Exec(kind), flops);
        let variable = system.add_variable(1.0, None);
        system.expand(variable, constraint, 1.0);
        activity.variable = Some(variable);
        activity.state = ActivityState::Started;
        activity
    }

    /// A parallel task: `flops_per_host[i]` flops executed on
    /// `hosts[i]`'s cpu, coupled by a single rate shared across every
    /// participating cpu and link (spec ยง4.4). `links` lists the link
    /// constraints the inter-host byte exchange traverses alongside their
    /// per-unit-rate byte coefficient.
    pub fn parallel(
        system: &mut lmm::System,
        name: impl Into<String>,
        hosts: Vec<(String, f64, lmm::ConstraintId)>,
        links: Vec<(lmm::ConstraintId, f64)>,
    ) -> ActivityImpl {
        assert!(!hosts.is_empty(), "a parallel task needs at least one host");
        let total_flops: f64 = hosts.iter().map(|(_, f, _)| f).sum();
        let variable = system.add_variable(1.0, None);
        for (_, flops, constraint) in &hosts {
            // one unit of the shared rate consumes `flops / total` of this
            // host's cpu capacity, so the whole task advances as a unit.
            let coeff = if total_flops > 0.0 { flops / total_flops } else { 0.0 };
            system.expand(variable, *constraint, coeff);
        }
        for (constraint, coeff) in &links {
            system.expand(variable, *constraint, *coeff);
        }
        let kind = ExecImpl { host_flops: hosts };
        let mut activity = ActivityImpl::new(name, ActivityKind::Exec(kind), total_flops);
        activity.variable = Some(variable);
        activity.state = ActivityState::Started;
        activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Cpu, ResourceSharing};

    #[test]
    fn sequential_exec_completes_after_flops_over_peak_seconds() {
        let mut sys = lmm::System::new();
        let cpu = Cpu::new(&mut sys, "h1", vec![1000.0], 1, ResourceSharing::Shared);
        let mut activity = ExecImpl::sequential(&mut sys, "compute", "h1", 5000.0, cpu.constraint());
        sys.solve();
        let rate = sys.rate(activity.variable.unwrap());
        assert_eq!(rate, 1000.0);
        let finished = activity.account(rate, 5.0);
        assert!(finished);
        assert_eq!(activity.state, ActivityState::Done);
    }
}
