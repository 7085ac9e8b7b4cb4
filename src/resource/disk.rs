//! The Disk resource model: independent (or coupled) read/write bandwidth
//! constraints.

use super::Resource;
use crate::lmm::{self, SharingPolicy};

/// A host-attached disk. Read and write share a constraint only if built
/// via [`Disk::new_shared_rw`]; otherwise they are independent, matching
/// the common case of separate physical read/write paths.
pub struct Disk {
    name: String,
    read_bandwidth: f64,
    write_bandwidth: f64,
    is_on: bool,
    read_constraint: lmm::ConstraintId,
    write_constraint: lmm::ConstraintId,
}

impl Disk {
    /// Independent read and write constraints.
    pub fn new(
        system: &mut lmm::System,
        name: impl Into<String>,
        read_bandwidth: f64,
        write_bandwidth: f64,
    ) -> Disk {
        let read_constraint = system.add_constraint(read_bandwidth, SharingPolicy::Shared);
        let write_constraint = system.add_constraint(write_bandwidth, SharingPolicy::Shared);
        Disk {
            name: name.into(),
            read_bandwidth,
            write_bandwidth,
            is_on: true,
            read_constraint,
            write_constraint,
        }
    }

    /// A single shared read/write constraint (a disk whose head cannot
    /// seek for both directions at once).
    pub fn new_shared_rw(system: &mut lmm::System, name: impl Into<String>, bandwidth: f64) -> Disk {
        let constraint = system.add_constraint(bandwidth, SharingPolicy::Shared);
        Disk {
            name: name.into(),
            read_bandwidth: bandwidth,
            write_bandwidth: bandwidth,
            is_on: true,
            read_constraint: constraint,
            write_constraint: constraint,
        }
    }

    pub fn read_constraint(&self) -> lmm::ConstraintId {
        self.read_constraint
    }

    pub fn write_constraint(&self) -> lmm::ConstraintId {
        self.write_constraint
    }

    pub fn constraint_for(&self, write: bool) -> lmm::ConstraintId {
        if write {
            self.write_constraint
        } else {
            self.read_constraint
        }
    }

    pub fn turn_on(&mut self, system: &mut lmm::System) {
        if !self.is_on {
            self.is_on = true;
            system.constraint_mut(self.read_constraint).set_capacity(self.read_bandwidth);
            system.constraint_mut(self.write_constraint).set_capacity(self.write_bandwidth);
        }
    }

    pub fn turn_off(&mut self, system: &mut lmm::System) {
        if self.is_on {
            self.is_on = false;
            system.constraint_mut(self.read_constraint).set_capacity(0.0);
            system.constraint_mut(self.write_constraint).set_capacity(0.0);
        }
    }
}

impl Resource for Disk {
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
    fn shared_rw_disk_uses_one_constraint_for_both() {
        let mut sys = lmm::System::new();
        let disk = Disk::new_shared_rw(&mut sys, "d0", 500.0);
        assert_eq!(disk.read_constraint(), disk.write_constraint());
    }

    #[test]
    fn independent_disk_has_separate_constraints() {
        let mut sys = lmm::System::new();
        let disk = Disk::new(&mut sys, "d0", 200.0, 100.0);
        assert_ne!(disk.read_constraint(), disk.write_constraint());
    }
}
