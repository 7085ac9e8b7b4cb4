//! Hierarchical network-zone routing: netpoints, zones, route resolution
//! with bypass routes and split-duplex direction selection. Spec ยง4.5.

pub mod netpoint;
pub mod netzone;
pub mod route;
pub mod strategy;

pub use netpoint::{NetPoint, NetPointKind};
pub use netzone::NetZone;
pub use route::{Route, RouteLink};
pub use strategy::RoutingStrategy;

use crate::errors::{PlatformError, PlatformResult};
use std::collections::HashMap;

/// Owns every netpoint and zone by name, and implements
/// `get_global_route`. A flat name-keyed map rather than `Rc`/`Weak` tree
/// pointers, per spec ยง9's "engine... passed by reference... never looked
/// up statically": tests can build as many `RoutingEngine`s as they like.
pub struct RoutingEngine {
    netpoints: HashMap<String, NetPoint>,
    zones: HashMap<String, NetZone>,
    root: String,
    next_id: usize,
    link_latencies: HashMap<String, f64>,
}

impl RoutingEngine {
    pub fn new(root_name: impl Into<String>, strategy: Box<dyn RoutingStrategy>) -> RoutingEngine {
        let root_name = root_name.into();
        let mut zones = HashMap::new();
        zones.insert(root_name.clone(), NetZone::new(root_name.clone(), None, strategy));
        let mut netpoints = HashMap::new();
        netpoints.insert(
            root_name.clone(),
            NetPoint::new(root_name.clone(), NetPointKind::NetZone, root_name.clone(), 0),
        );
        RoutingEngine {
            netpoints,
            zones,
            root: root_name,
            next_id: 1,
            link_latencies: HashMap::new(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn zone(&self, name: &str) -> Option<&NetZone> {
        self.zones.get(name)
    }

    pub fn zone_mut(&mut self, name: &str) -> Option<&mut NetZone> {
        self.zones.get_mut(name)
    }

    pub fn netpoint(&self, name: &str) -> Option<&NetPoint> {
        self.netpoints.get(name)
    }

    fn fresh_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Records a link's latency so `get_global_route` can sum it into a
    /// route's total. Call this whenever a link is created anywhere in
    /// the platform (this module holds names only, not `Link` objects).
    pub fn register_link_latency(&mut self, link_name: impl Into<String>, latency: f64) {
        self.link_latencies.insert(link_name.into(), latency);
    }

    pub fn create_zone(
        &mut self,
        name: impl Into<String>,
        parent: &str,
        strategy: Box<dyn RoutingStrategy>,
    ) -> PlatformResult<()> {
        let name = name.into();
        if self.netpoints.contains_key(&name) {
            return Err(PlatformError::DuplicateName(name, parent.to_string()));
        }
        let parent_zone = self
            .zones
            .get(parent)
            .ok_or_else(|| PlatformError::UnknownNetpoint(parent.to_string()))?;
        if parent_zone.sealed {
            return Err(PlatformError::SealState(parent.to_string(), ""));
        }
        let id = self.fresh_id();
        self.netpoints
            .insert(name.clone(), NetPoint::new(name.clone(), NetPointKind::NetZone, parent.to_string(), id));
        self.zones.insert(name.clone(), NetZone::new(name.clone(), Some(parent.to_string()), strategy));
        self.zones.get_mut(parent).unwrap().children.push(name);
        Ok(())
    }

    pub fn create_host_netpoint(&mut self, name: impl Into<String>, zone: &str) -> PlatformResult<()> {
        let name = name.into();
        if self.netpoints.contains_key(&name) {
            return Err(PlatformError::DuplicateName(name, zone.to_string()));
        }
        let z = self
            .zones
            .get_mut(zone)
            .ok_or_else(|| PlatformError::UnknownNetpoint(zone.to_string()))?;
        if z.sealed {
            return Err(PlatformError::SealState(zone.to_string(), ""));
        }
        let id = self.fresh_id();
        z.hosts.push(name.clone());
        self.netpoints
            .insert(name.clone(), NetPoint::new(name, NetPointKind::Host, zone.to_string(), id));
        Ok(())
    }

    pub fn create_router_netpoint(&mut self, name: impl Into<String>, zone: &str) -> PlatformResult<()> {
        let name = name.into();
        if self.netpoints.contains_key(&name) {
            return Err(PlatformError::DuplicateName(name, zone.to_string()));
        }
        let z = self
            .zones
            .get_mut(zone)
            .ok_or_else(|| PlatformError::UnknownNetpoint(zone.to_string()))?;
        if z.sealed {
            return Err(PlatformError::SealState(zone.to_string(), ""));
        }
        let id = self.fresh_id();
        z.routers.push(name.clone());
        self.netpoints
            .insert(name.clone(), NetPoint::new(name, NetPointKind::Router, zone.to_string(), id));
        Ok(())
    }

    pub fn add_bypass_route(&mut self, zone: &str, src: &str, dst: &str, route: Route) -> PlatformResult<()> {
        let z = self
            .zones
            .get_mut(zone)
            .ok_or_else(|| PlatformError::UnknownNetpoint(zone.to_string()))?;
        z.bypass.insert((src.to_string(), dst.to_string()), route);
        Ok(())
    }

    /// Idempotent: sealing twice is a no-op (spec ยง8).
    pub fn seal(&mut self, zone: &str) -> PlatformResult<()> {
        let z = self
            .zones
            .get_mut(zone)
            .ok_or_else(|| PlatformError::UnknownNetpoint(zone.to_string()))?;
        z.sealed = true;
        Ok(())
    }

    fn require_sealed(&self, zone: &str) -> PlatformResult<()> {
        match self.zones.get(zone) {
            Some(z) if z.sealed => Ok(()),
            Some(_) => Err(PlatformError::SealState(zone.to_string(), "not ")),
            None => Err(PlatformError::UnknownNetpoint(zone.to_string())),
        }
    }

    /// Leaf-to-root chain of zone names containing `zone_name`, inclusive.
    fn ancestor_chain(&self, zone_name: &str) -> Vec<String> {
        let mut chain = vec![zone_name.to_string()];
        let mut cur = zone_name.to_string();
        while let Some(parent) = self.zones.get(&cur).and_then(|z| z.parent.clone()) {
            chain.push(parent.clone());
            cur = parent;
        }
        chain
    }

    /// `(lca, src_depth, dst_depth)`: `src_depth`/`dst_depth` are how many
    /// zones separate `src`'s/`dst`'s own zone from the LCA (0 means their
    /// own zone *is* the LCA).
    fn find_lca(src_chain: &[String], dst_chain: &[String]) -> (String, usize, usize) {
        let src_rev: Vec<&String> = src_chain.iter().rev().collect();
        let dst_rev: Vec<&String> = dst_chain.iter().rev().collect();
        let mut common = 0;
        while common < src_rev.len() && common < dst_rev.len() && src_rev[common] == dst_rev[common] {
            common += 1;
        }
        let lca = src_rev[common - 1].clone();
        (lca, src_chain.len() - common, dst_chain.len() - common)
    }

    fn route_latency(&self, route: &Route) -> f64 {
        route
            .links
            .iter()
            .map(|l| self.link_latencies.get(&l.link_name).copied().unwrap_or(0.0))
            .sum()
    }

    /// Resolves the route and cumulative latency between two netpoints,
    /// per the algorithm in spec ยง4.5: ancestor chains, common-suffix
    /// strip to find the LCA, bypass-table check, then local routing at
    /// the LCA with recursive descent/ascent through intermediate zones.
    pub fn get_global_route(&self, src: &str, dst: &str) -> PlatformResult<(Route, f64)> {
        if src == dst {
            return Ok((Route::new(), 0.0));
        }
        let src_np = self
            .netpoints
            .get(src)
            .ok_or_else(|| PlatformError::UnknownNetpoint(src.to_string()))?;
        let dst_np = self
            .netpoints
            .get(dst)
            .ok_or_else(|| PlatformError::UnknownNetpoint(dst.to_string()))?;

        let src_chain = self.ancestor_chain(&src_np.englobing_zone);
        let dst_chain = self.ancestor_chain(&dst_np.englobing_zone);
        let (lca, src_depth, dst_depth) = Self::find_lca(&src_chain, &dst_chain);
        self.require_sealed(&lca)?;

        if let Some(route) = self.zones[&lca].bypass.get(&(src.to_string(), dst.to_string())) {
            let latency = self.route_latency(route);
            return Ok((route.clone(), latency));
        }

        let src_gateway_np = if src_depth == 0 {
            src.to_string()
        } else {
            src_chain[src_depth - 1].clone()
        };
        let dst_gateway_np = if dst_depth == 0 {
            dst.to_string()
        } else {
            dst_chain[dst_depth - 1].clone()
        };

        let local = self.zones[&lca]
            .strategy
            .get_local_route(&src_gateway_np, &dst_gateway_np)
            .ok_or_else(|| PlatformError::NoRoute(src.to_string(), dst.to_string()))?;
        let mut full = local;

        if src_depth > 0 {
            let sub_zone = &src_chain[src_depth - 1];
            if let Some(gw) = self.zones[sub_zone].effective_gateway() {
                if gw != src {
                    let (descent, _) = self.get_global_route(src, &gw)?;
                    full.prepend(&descent);
                }
            }
        }
        if dst_depth > 0 {
            let sub_zone = &dst_chain[dst_depth - 1];
            if let Some(gw) = self.zones[sub_zone].effective_gateway() {
                if gw != dst {
                    let (ascent, _) = self.get_global_route(&gw, dst)?;
                    full.append_route(&ascent);
                }
            }
        }

        let latency = self.route_latency(&full);
        Ok((full, latency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategy::{ClusterRoutingStrategy, FullRoutingStrategy};

    #[test]
    fn same_zone_route_uses_local_strategy_directly() {
        let mut engine = RoutingEngine::new("root", Box::new(ClusterRoutingStrategy::new("backbone")));
        engine.create_host_netpoint("h1", "root").unwrap();
        engine.create_host_netpoint("h2", "root").unwrap();
        engine.register_link_latency("backbone", 0.001);
        engine.seal("root").unwrap();

        let (route, latency) = engine.get_global_route("h1", "h2").unwrap();
        assert_eq!(route.links.len(), 1);
        assert_eq!(latency, 0.001);
    }

    #[test]
    fn bypass_route_overrides_default_hierarchical_latency() {
        let mut root_strategy = FullRoutingStrategy::new();
        root_strategy.add_route("z1", "z2", Route::single_link("default_wan", true), true);
        let mut engine = RoutingEngine::new("z0", Box::new(root_strategy));
        engine.create_zone("z1", "z0", Box::new(FullRoutingStrategy::new())).unwrap();
        engine.create_zone("z2", "z0", Box::new(FullRoutingStrategy::new())).unwrap();
        engine.create_host_netpoint("h1", "z1").unwrap();
        engine.create_host_netpoint("h2", "z2").unwrap();

        engine.register_link_latency("default_wan", 0.010);
        engine.register_link_latency("fast_bypass", 0.001);
        engine.seal("z0").unwrap();
        engine.seal("z1").unwrap();
        engine.seal("z2").unwrap();

        let (_default_route, default_latency) = engine.get_global_route("h1", "h2").unwrap();
        assert_eq!(default_latency, 0.010);

        engine
            .add_bypass_route("z0", "h1", "h2", Route::single_link("fast_bypass", true))
            .unwrap();
        let (bypass_route, bypass_latency) = engine.get_global_route("h1", "h2").unwrap();
        assert_eq!(bypass_route.links.len(), 1);
        assert_eq!(bypass_latency, 0.001);
    }
}
