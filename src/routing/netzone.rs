//! A single node in the hierarchical network topology: the struct itself.
//! The tree-walking algorithm that resolves routes across zones lives in
//! `routing::RoutingEngine` (`mod.rs`), which owns every `NetZone` by name
//! so it can walk parent/child links without `Rc`/`Weak` cycles.

use super::route::Route;
use super::strategy::RoutingStrategy;
use std::collections::HashMap;

pub struct NetZone {
    pub name: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub hosts: Vec<String>,
    pub routers: Vec<String>,
    /// role → netpoint name, e.g. `"default"` → the host/router used as
    /// this zone's ingress/egress point when addressed from its parent.
    pub gateways: HashMap<String, String>,
    pub strategy: Box<dyn RoutingStrategy>,
    pub bypass: HashMap<(String, String), Route>,
    pub sealed: bool,
}

impl NetZone {
    pub fn new(name: impl Into<String>, parent: Option<String>, strategy: Box<dyn RoutingStrategy>) -> NetZone {
        NetZone {
            name: name.into(),
            parent,
            children: Vec::new(),
            hosts: Vec::new(),
            routers: Vec::new(),
            gateways: HashMap::new(),
            strategy,
            bypass: HashMap::new(),
            sealed: false,
        }
    }

    pub fn set_gateway(&mut self, role: impl Into<String>, netpoint: impl Into<String>) {
        self.gateways.insert(role.into(), netpoint.into());
    }

    /// The netpoint this zone is addressed through from its parent: an
    /// explicit `"default"` gateway if set, otherwise its sole host or
    /// sole router if unambiguous.
    pub fn effective_gateway(&self) -> Option<String> {
        if let Some(gw) = self.gateways.get("default") {
            return Some(gw.clone());
        }
        if self.hosts.len() == 1 && self.routers.is_empty() {
            return Some(self.hosts[0].clone());
        }
        if self.routers.len() == 1 && self.hosts.is_empty() {
            return Some(self.routers[0].clone());
        }
        None
    }
}
