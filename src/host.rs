//! Host aggregate: a CPU, a set of disks, resident actors, and owned VMs.
//! Spec ยง3/ยง4.6.

use crate::actor::ActorFactory;
use crate::resource::{Cpu, Disk, Resource};
use crate::Pid;
use std::collections::HashMap;

/// One entry in a host's restart roster: the information needed to
/// recreate an actor that was running when the host died, in the same
/// order, from the beginning of its code (`ActorImpl.cpp`'s
/// `actors_at_boot_`).
pub struct BootEntry {
    pub name: String,
    pub factory: ActorFactory,
    pub auto_restart: bool,
}

/// A physical host, or a VM (a `Host` that additionally pins a resource on
/// a physical host — modeled by `pinned_on`, spec ยง3).
pub struct Host {
    pub name: String,
    pub cpu: Cpu,
    pub disks: HashMap<String, Disk>,
    pub zone: String,
    pub actors: Vec<Pid>,
    pub actors_at_boot: Vec<BootEntry>,
    pub is_on: bool,
    /// `Some(physical host name)` if this Host is a VM.
    pub pinned_on: Option<String>,
    /// Names of VMs pinned onto this host (spec ยง3's `Host.vms`); empty for
    /// a VM itself, since VMs do not nest.
    pub vms: Vec<String>,
}

impl Host {
    pub fn new(name: impl Into<String>, cpu: Cpu, zone: impl Into<String>) -> Host {
        Host {
            name: name.into(),
            cpu,
            disks: HashMap::new(),
            zone: zone.into(),
            actors: Vec::new(),
            actors_at_boot: Vec::new(),
            is_on: true,
            pinned_on: None,
            vms: Vec::new(),
        }
    }

    pub fn add_disk(&mut self, disk: Disk) {
        self.disks.insert(disk.name().to_string(), disk);
    }

    /// Registers `vm` as pinned to this physical host.
    pub fn add_vm(&mut self, vm: impl Into<String>) {
        let vm = vm.into();
        if !self.vms.contains(&vm) {
            self.vms.push(vm);
        }
    }

    pub fn add_actor(&mut self, pid: Pid) {
        if !self.actors.contains(&pid) {
            self.actors.push(pid);
        }
    }

    pub fn remove_actor(&mut self, pid: Pid) {
        self.actors.retain(|&p| p != pid);
    }

    /// Records (or updates) a boot-roster entry so this actor can be
    /// recreated if the host reboots.
    pub fn record_boot_entry(&mut self, name: impl Into<String>, factory: ActorFactory, auto_restart: bool) {
        let name = name.into();
        self.actors_at_boot.retain(|e| e.name != name);
        self.actors_at_boot.push(BootEntry {
            name,
            factory,
            auto_restart,
        });
    }

    /// Prunes the boot roster to only `auto_restart` entries, called when
    /// the host is turned off (spec ยง4.6). Resident actors have already
    /// been killed by the caller (`Engine::turn_off_host`) by this point.
    pub fn prune_boot_roster(&mut self) {
        self.actors_at_boot.retain(|e| e.auto_restart);
    }

    /// Asserts the host has no resident actors; checked on teardown
    /// (`HostImpl::~HostImpl`'s invariant, spec ยง2 "Supplemented").
    pub fn assert_actor_list_empty(&self) {
        assert!(
            self.actors.is_empty(),
            "host '{}' destroyed with {} resident actor(s) still alive",
            self.name,
            self.actors.len()
        );
    }
}

impl Resource for Host {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_on(&self) -> bool {
        self.is_on
    }
}
