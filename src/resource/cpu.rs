//! The CPU resource model: a list of per-pstate peak speeds, a core count,
//! an optional concurrency limit, and one LMM constraint.

use super::{Resource, ResourceSharing};
use crate::lmm;

/// A host's processor. One `Cpu` per host (per spec ยง3, a host has a
/// single, unique CPU; multicore is modeled as `core_count`, not multiple
/// `Cpu`s).
pub struct Cpu {
    name: String,
    pstates: Vec<f64>,
    current_pstate: usize,
    core_count: u32,
    concurrency_limit: Option<u32>,
    is_on: bool,
    constraint: lmm::ConstraintId,
}

impl Cpu {
    /// Registers a new CPU constraint in `system` and returns the model.
    /// `pstates` lists peak flops/s for each performance level, pstate 0
    /// active initially.
    pub fn new(
        system: &mut lmm::System,
        name: impl Into<String>,
        pstates: Vec<f64>,
        core_count: u32,
        policy: ResourceSharing,
    ) -> Cpu {
        assert!(!pstates.is_empty(), "a cpu needs at least one pstate");
        let capacity = pstates[0] * core_count as f64;
        let constraint = system.add_constraint(capacity, policy.into());
        Cpu {
            name: name.into(),
            pstates,
            current_pstate: 0,
            core_count,
            concurrency_limit: None,
            is_on: true,
            constraint,
        }
    }

    pub fn constraint(&self) -> lmm::ConstraintId {
        self.constraint
    }

    /// Peak speed at the current pstate, total across cores.
    pub fn peak(&self) -> f64 {
        self.pstates[self.current_pstate] * self.core_count as f64
    }

    pub fn core_count(&self) -> u32 {
        self.core_count
    }

    pub fn pstate_count(&self) -> usize {
        self.pstates.len()
    }

    pub fn current_pstate(&self) -> usize {
        self.current_pstate
    }

    /// Switches performance level, updating the LMM constraint's capacity
    /// to match (unless the cpu is off, in which case the new pstate takes
    /// effect on the next `turn_on`).
    pub fn set_pstate(&mut self, system: &mut lmm::System, pstate: usize) {
        assert!(pstate < self.pstates.len(), "pstate out of range");
        self.current_pstate = pstate;
        if self.is_on {
            system.constraint_mut(self.constraint).set_capacity(self.peak());
        }
    }

    pub fn concurrency_limit(&self) -> Option<u32> {
        self.concurrency_limit
    }

    pub fn set_concurrency_limit(&mut self, limit: Option<u32>) {
        self.concurrency_limit = limit;
    }

    /// Applies a fractional availability scale (from a profile event) to the
    /// peak speed at the current pstate.
    pub fn apply_speed_scale(&mut self, system: &mut lmm::System, scale: f64) {
        if self.is_on {
            system
                .constraint_mut(self.constraint)
                .set_capacity(self.peak() * scale.max(0.0));
        }
    }

    pub fn turn_on(&mut self, system: &mut lmm::System) {
        if !self.is_on {
            self.is_on = true;
            system.constraint_mut(self.constraint).set_capacity(self.peak());
        }
    }

    /// Zeroes the constraint's capacity. Callers (the host) are
    /// responsible for cancelling in-flight actions and notifying their
    /// waiters with a `HostFailure`.
    pub fn turn_off(&mut self, system: &mut lmm::System) {
        if self.is_on {
            self.is_on = false;
            system.constraint_mut(self.constraint).set_capacity(0.0);
        }
    }

}

impl Resource for Cpu {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_on(&self) -> bool {
        self.is_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_scales_with_core_count() {
        let mut sys = lmm::System::new();
        let cpu = Cpu::new(&mut sys, "h1", vec![1e9], 4, ResourceSharing::Shared);
        assert_eq!(cpu.peak(), 4e9);
    }

    #[test]
    fn pstate_switch_changes_peak_and_constraint() {
        let mut sys = lmm::System::new();
        let mut cpu = Cpu::new(&mut sys, "h1", vec![1e9, 2e9], 1, ResourceSharing::Shared);
        cpu.set_pstate(&mut sys, 1);
        assert_eq!(cpu.peak(), 2e9);
        assert_eq!(sys.constraint(cpu.constraint()).capacity(), 2e9);
    }

    #[test]
    fn turn_off_zeroes_capacity() {
        let mut sys = lmm::System::new();
        let mut cpu = Cpu::new(&mut sys, "h1", vec![1e9], 1, ResourceSharing::Shared);
        cpu.turn_off(&mut sys);
        assert!(!cpu.is_on());
        assert_eq!(sys.constraint(cpu.constraint()).capacity(), 0.0);
    }
}
