//! The Link resource model: peak bandwidth, latency, one of several
//! sharing policies, and (for split-duplex) a pair of directional links.

use super::Resource;
use crate::lmm::{self, SharingPolicy};

/// Bandwidth-sharing policy for a single link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSharing {
    Shared,
    FatPipe,
    NonLinear,
    Wifi,
}

impl From<LinkSharing> for SharingPolicy {
    fn from(l: LinkSharing) -> SharingPolicy {
        match l {
            LinkSharing::Shared => SharingPolicy::Shared,
            LinkSharing::FatPipe => SharingPolicy::FatPipe,
            LinkSharing::NonLinear => SharingPolicy::NonLinear,
            LinkSharing::Wifi => SharingPolicy::Wifi,
        }
    }
}

/// A single directional (or shared-both-ways) link.
pub struct Link {
    name: String,
    /// Static peak bandwidth as declared by the platform; profile-driven
    /// scaling multiplies this rather than compounding on itself.
    base_bandwidth: f64,
    bandwidth: f64,
    latency: f64,
    policy: LinkSharing,
    is_on: bool,
    constraint: lmm::ConstraintId,
}

impl Link {
    pub fn new(
        system: &mut lmm::System,
        name: impl Into<String>,
        bandwidth: f64,
        latency: f64,
        policy: LinkSharing,
    ) -> Link {
        let constraint = system.add_constraint(bandwidth, policy.into());
        Link {
            name: name.into(),
            base_bandwidth: bandwidth,
            bandwidth,
            latency,
            policy,
            is_on: true,
            constraint,
        }
    }

    pub fn constraint(&self) -> lmm::ConstraintId {
        self.constraint
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn latency(&self) -> f64 {
        self.latency
    }

    pub fn policy(&self) -> LinkSharing {
        self.policy
    }

    pub fn set_bandwidth(&mut self, system: &mut lmm::System, bandwidth: f64) {
        self.base_bandwidth = bandwidth.max(0.0);
        self.bandwidth = self.base_bandwidth;
        if self.is_on {
            system.constraint_mut(self.constraint).set_capacity(self.bandwidth);
        }
    }

    /// Applies a fractional bandwidth profile event (spec ยง6: a bandwidth
    /// profile value is a fraction of peak, not an absolute). Multiplies
    /// against `base_bandwidth`, not the already-scaled `bandwidth`, so
    /// repeated events don't compound.
    pub fn apply_bandwidth_scale(&mut self, system: &mut lmm::System, scale: f64) {
        self.bandwidth = self.base_bandwidth * scale.max(0.0);
        if self.is_on {
            system.constraint_mut(self.constraint).set_capacity(self.bandwidth);
        }
    }

    pub fn set_latency(&mut self, latency: f64) {
        self.latency = latency.max(0.0);
    }

    /// Records the per-host rate cap used by `LinkSharing::Wifi`; `host_rate`
    /// is the rate this particular station is allowed on the shared medium.
    pub fn set_host_wifi_rate(&mut self, system: &mut lmm::System, station: lmm::VariableId, host_rate: f64) {
        debug_assert_eq!(self.policy, LinkSharing::Wifi);
        system.constraint_mut(self.constraint).set_variable_cap(station, host_rate);
    }

    pub fn turn_on(&mut self, system: &mut lmm::System) {
        if !self.is_on {
            self.is_on = true;
            system.constraint_mut(self.constraint).set_capacity(self.bandwidth);
        }
    }

    pub fn turn_off(&mut self, system: &mut lmm::System) {
        if self.is_on {
            self.is_on = false;
            system.constraint_mut(self.constraint).set_capacity(0.0);
        }
    }
}

impl Resource for Link {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_on(&self) -> bool {
        self.is_on
    }
}

/// A split-duplex link: independent UP and DOWN directional sub-links, each
/// a full `Link` in its own right. Spec ยง4.5: routes pick whichever
/// sub-link matches their direction of travel.
pub struct SplitDuplexLink {
    name: String,
    pub up: Link,
    pub down: Link,
}

impl SplitDuplexLink {
    pub fn new(
        system: &mut lmm::System,
        name: impl Into<String>,
        bandwidth: f64,
        latency: f64,
    ) -> SplitDuplexLink {
        let name = name.into();
        let up = Link::new(system, format!("{}_UP", name), bandwidth, latency, LinkSharing::Shared);
        let down = Link::new(system, format!("{}_DOWN", name), bandwidth, latency, LinkSharing::Shared);
        SplitDuplexLink { name, up, down }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sub-link to use given a direction of travel: `forward` is true
    /// when traversing from the link's nominal src to its nominal dst.
    pub fn directional(&self, forward: bool) -> &Link {
        if forward {
            &self.up
        } else {
            &self.down
        }
    }

    pub fn directional_mut(&mut self, forward: bool) -> &mut Link {
        if forward {
            &mut self.up
        } else {
            &mut self.down
        }
    }

    /// Applies a fractional bandwidth profile event to both sub-links.
    pub fn apply_bandwidth_scale(&mut self, system: &mut lmm::System, scale: f64) {
        self.up.apply_bandwidth_scale(system, scale);
        self.down.apply_bandwidth_scale(system, scale);
    }

    pub fn turn_on(&mut self, system: &mut lmm::System) {
        self.up.turn_on(system);
        self.down.turn_on(system);
    }

    pub fn turn_off(&mut self, system: &mut lmm::System) {
        self.up.turn_off(system);
        self.down.turn_off(system);
    }

    pub fn is_on(&self) -> bool {
        self.up.is_on() || self.down.is_on()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_duplex_directions_are_independent() {
        let mut sys = lmm::System::new();
        let mut link = SplitDuplexLink::new(&mut sys, "backbone", 100.0, 0.001);
        link.up.turn_off(&mut sys);
        assert!(!link.up.is_on());
        assert!(link.down.is_on());
        assert!(link.is_on());
    }

    #[test]
    fn bandwidth_scale_does_not_compound_across_events() {
        let mut sys = lmm::System::new();
        let mut link = Link::new(&mut sys, "l0", 100.0, 0.0, LinkSharing::Shared);
        link.apply_bandwidth_scale(&mut sys, 0.5);
        assert_eq!(link.bandwidth, 50.0);
        link.apply_bandwidth_scale(&mut sys, 0.25);
        assert_eq!(link.bandwidth, 25.0);
        assert_eq!(sys.constraint(link.constraint()).capacity(), 25.0);
    }

    #[test]
    fn wifi_rate_cap_is_recorded_on_constraint() {
        let mut sys = lmm::System::new();
        let mut link = Link::new(&mut sys, "ap", 54.0, 0.0001, LinkSharing::Wifi);
        let var = sys.add_variable(1.0, None);
        link.set_host_wifi_rate(&mut sys, var, 6.0);
        sys.expand(var, link.constraint(), 1.0);
        sys.solve();
        assert!(sys.rate(var) <= 6.0 + 1e-6);
    }
}
