//! Intra-zone routing strategies: given two netpoints local to the same
//! zone, produce the route between them. Spec ยง4.5.

use super::route::Route;
use std::collections::HashMap;

/// One intra-zone routing algorithm. Zones own a `Box<dyn RoutingStrategy>`
/// chosen at creation time.
pub trait RoutingStrategy {
    /// Resolves the local route between two netpoints both directly
    /// addressable in this zone (hosts, routers, or child-zone gateways).
    /// `None` means no route is configured.
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route>;
}

/// Explicit route table, one entry per ordered pair (spec's "Full").
#[derive(Default)]
pub struct FullRoutingStrategy {
    table: HashMap<(String, String), Route>,
}

impl FullRoutingStrategy {
    pub fn new() -> FullRoutingStrategy {
        FullRoutingStrategy::default()
    }

    pub fn add_route(&mut self, src: &str, dst: &str, route: Route, symmetric: bool) {
        self.table.insert((src.to_string(), dst.to_string()), route.clone());
        if symmetric {
            let mut reversed = route;
            reversed.links.reverse();
            for link in &mut reversed.links {
                link.forward = !link.forward;
            }
            std::mem::swap(&mut reversed.gw_src, &mut reversed.gw_dst);
            self.table.insert((dst.to_string(), src.to_string()), reversed);
        }
    }
}

impl RoutingStrategy for FullRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        self.table.get(&(src.to_string(), dst.to_string())).cloned()
    }
}

/// All-pairs shortest path, precomputed once at seal time via
/// Floyd-Warshall over the declared direct links (spec's "Floyd").
#[derive(Default)]
pub struct FloydRoutingStrategy {
    resolved: HashMap<(String, String), Route>,
}

impl FloydRoutingStrategy {
    /// `direct_links`: `(src, dst, link_name, latency, symmetric)` edges.
    /// Computes shortest paths by total latency and bakes them in; `seal`
    /// calls this once the zone's edge list is final.
    pub fn compute(direct_links: &[(String, String, String, f64, bool)]) -> FloydRoutingStrategy {
        let mut nodes: Vec<String> = Vec::new();
        for (s, d, _, _, _) in direct_links {
            if !nodes.contains(s) {
                nodes.push(s.clone());
            }
            if !nodes.contains(d) {
                nodes.push(d.clone());
            }
        }
        let n = nodes.len();
        let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, s)| (s.as_str(), i)).collect();

        let mut dist = vec![vec![f64::INFINITY; n]; n];
        let mut next_hop: Vec<Vec<Option<(String, f64, bool)>>> = vec![vec![None; n]; n];
        for i in 0..n {
            dist[i][i] = 0.0;
        }
        for (s, d, link, lat, symmetric) in direct_links {
            let i = index[s.as_str()];
            let j = index[d.as_str()];
            if *lat < dist[i][j] {
                dist[i][j] = *lat;
                next_hop[i][j] = Some((link.clone(), *lat, true));
            }
            if *symmetric && *lat < dist[j][i] {
                dist[j][i] = *lat;
                next_hop[j][i] = Some((link.clone(), *lat, false));
            }
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if dist[i][k] + dist[k][j] < dist[i][j] {
                        dist[i][j] = dist[i][k] + dist[k][j];
                        next_hop[i][j] = next_hop[i][k].clone();
                    }
                }
            }
        }

        let mut resolved = HashMap::new();
        for i in 0..n {
            for j in 0..n {
                if i == j || !dist[i][j].is_finite() {
                    continue;
                }
                let mut route = Route::new();
                let mut cur = i;
                let mut guard = 0;
                while cur != j && guard <= n {
                    guard += 1;
                    if let Some((link, _, forward)) = &next_hop[cur][j] {
                        route.links.push(super::route::RouteLink::new(link.clone(), *forward));
                        // advance toward j: re-derive next node by scanning
                        // the direct edge that this hop represents.
                        cur = direct_links
                            .iter()
                            .find(|(s, d, l, _, _)| l == link && (s == &nodes[cur] || d == &nodes[cur]))
                            .map(|(s, d, _, _, _)| if s == &nodes[cur] { index[d.as_str()] } else { index[s.as_str()] })
                            .unwrap_or(j);
                    } else {
                        break;
                    }
                }
                resolved.insert((nodes[i].clone(), nodes[j].clone()), route);
            }
        }
        FloydRoutingStrategy { resolved }
    }
}

impl RoutingStrategy for FloydRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        self.resolved.get(&(src.to_string(), dst.to_string())).cloned()
    }
}

/// Single-source shortest path computed on demand, no precomputation
/// (spec's "Dijkstra").
pub struct DijkstraRoutingStrategy {
    edges: Vec<(String, String, String, f64, bool)>,
}

impl DijkstraRoutingStrategy {
    pub fn new(edges: Vec<(String, String, String, f64, bool)>) -> DijkstraRoutingStrategy {
        DijkstraRoutingStrategy { edges }
    }

    fn neighbors(&self, node: &str) -> Vec<(String, String, f64, bool)> {
        let mut out = Vec::new();
        for (s, d, link, lat, symmetric) in &self.edges {
            if s == node {
                out.push((d.clone(), link.clone(), *lat, true));
            } else if *symmetric && d == node {
                out.push((s.clone(), link.clone(), *lat, false));
            }
        }
        out
    }
}

impl RoutingStrategy for DijkstraRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        use std::cmp::Ordering;
        use std::collections::BinaryHeap;

        #[derive(PartialEq)]
        struct HeapEntry(f64, String);
        impl Eq for HeapEntry {}
        impl Ord for HeapEntry {
            fn cmp(&self, other: &Self) -> Ordering {
                other.0.partial_cmp(&self.0).unwrap_or(Ordering::Equal)
            }
        }
        impl PartialOrd for HeapEntry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut dist: HashMap<String, f64> = HashMap::new();
        let mut prev: HashMap<String, (String, String, bool)> = HashMap::new();
        let mut heap = BinaryHeap::new();
        dist.insert(src.to_string(), 0.0);
        heap.push(HeapEntry(0.0, src.to_string()));

        while let Some(HeapEntry(d, node)) = heap.pop() {
            if d > *dist.get(&node).unwrap_or(&f64::INFINITY) {
                continue;
            }
            if node == dst {
                break;
            }
            for (neighbor, link, lat, forward) in self.neighbors(&node) {
                let nd = d + lat;
                if nd < *dist.get(&neighbor).unwrap_or(&f64::INFINITY) {
                    dist.insert(neighbor.clone(), nd);
                    prev.insert(neighbor.clone(), (node.clone(), link, forward));
                    heap.push(HeapEntry(nd, neighbor));
                }
            }
        }

        if !dist.contains_key(dst) {
            return None;
        }
        let mut route = Route::new();
        let mut cur = dst.to_string();
        let mut hops = Vec::new();
        while cur != src {
            let (prev_node, link, forward) = prev.get(&cur)?.clone();
            hops.push(super::route::RouteLink::new(link, forward));
            cur = prev_node;
        }
        hops.reverse();
        route.links = hops;
        Some(route)
    }
}

/// Hub-and-spoke: every route goes through a fixed center netpoint.
pub struct StarRoutingStrategy {
    center: String,
    spokes: HashMap<String, Route>,
}

impl StarRoutingStrategy {
    pub fn new(center: impl Into<String>) -> StarRoutingStrategy {
        StarRoutingStrategy {
            center: center.into(),
            spokes: HashMap::new(),
        }
    }

    pub fn add_spoke(&mut self, node: &str, route_to_center: Route) {
        self.spokes.insert(node.to_string(), route_to_center);
    }
}

impl RoutingStrategy for StarRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        if src == self.center {
            return self.spokes.get(dst).cloned();
        }
        if dst == self.center {
            return self.spokes.get(src).cloned();
        }
        let to_center = self.spokes.get(src)?;
        let from_center = self.spokes.get(dst)?;
        let mut route = to_center.clone();
        route.append_route(from_center);
        Some(route)
    }
}

/// Host → shared backbone link → host.
pub struct ClusterRoutingStrategy {
    backbone: String,
}

impl ClusterRoutingStrategy {
    pub fn new(backbone: impl Into<String>) -> ClusterRoutingStrategy {
        ClusterRoutingStrategy { backbone: backbone.into() }
    }
}

impl RoutingStrategy for ClusterRoutingStrategy {
    fn get_local_route(&self, _src: &str, _dst: &str) -> Option<Route> {
        Some(Route::single_link(self.backbone.clone(), true))
    }
}

/// A k-ary fat-tree: hosts register a `(pod, edge_switch, port)` coordinate;
/// routing goes up to the lowest common pod/edge ancestor then back down,
/// one link per level crossed, addressed by the naming convention the zone
/// builder used when wiring the tree (`level{L}_{index}`).
pub struct FatTreeRoutingStrategy {
    coordinates: HashMap<String, (usize, usize, usize)>,
}

impl FatTreeRoutingStrategy {
    pub fn new() -> FatTreeRoutingStrategy {
        FatTreeRoutingStrategy { coordinates: HashMap::new() }
    }

    pub fn register(&mut self, host: &str, pod: usize, edge_switch: usize, port: usize) {
        self.coordinates.insert(host.to_string(), (pod, edge_switch, port));
    }
}

impl Default for FatTreeRoutingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingStrategy for FatTreeRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        let (sp, se, _) = *self.coordinates.get(src)?;
        let (dp, de, _) = *self.coordinates.get(dst)?;
        let mut route = Route::new();
        if sp == dp && se == de {
            return Some(route);
        }
        route.links.push(super::route::RouteLink::new(format!("edge_{}_{}", sp, se), true));
        if sp != dp {
            route.links.push(super::route::RouteLink::new(format!("core_{}_{}", sp, dp), true));
        } else {
            route.links.push(super::route::RouteLink::new(format!("pod_agg_{}", sp), true));
        }
        route.links.push(super::route::RouteLink::new(format!("edge_{}_{}", dp, de), false));
        Some(route)
    }
}

/// Dragonfly: hosts register `(group, router, port)`; routing crosses one
/// intra-group link (if same group) or one inter-group link plus the two
/// local hops to/from the group's gateway router.
pub struct DragonflyRoutingStrategy {
    coordinates: HashMap<String, (usize, usize, usize)>,
}

impl DragonflyRoutingStrategy {
    pub fn new() -> DragonflyRoutingStrategy {
        DragonflyRoutingStrategy { coordinates: HashMap::new() }
    }

    pub fn register(&mut self, host: &str, group: usize, router: usize, port: usize) {
        self.coordinates.insert(host.to_string(), (group, router, port));
    }
}

impl Default for DragonflyRoutingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingStrategy for DragonflyRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        let (sg, sr, _) = *self.coordinates.get(src)?;
        let (dg, dr, _) = *self.coordinates.get(dst)?;
        let mut route = Route::new();
        if sg == dg {
            if sr != dr {
                route.links.push(super::route::RouteLink::new(format!("intra_{}_{}_{}", sg, sr, dr), true));
            }
            return Some(route);
        }
        route.links.push(super::route::RouteLink::new(format!("local_{}_{}", sg, sr), true));
        route.links.push(super::route::RouteLink::new(format!("global_{}_{}", sg, dg), true));
        route.links.push(super::route::RouteLink::new(format!("local_{}_{}", dg, dr), false));
        Some(route)
    }
}

/// An n-dimensional torus; hosts register integer coordinates, one per
/// axis. Routing dials each axis down to zero difference, one hop per
/// unit of remaining offset, shortest direction first (with wraparound).
pub struct TorusRoutingStrategy {
    dimensions: Vec<usize>,
    coordinates: HashMap<String, Vec<usize>>,
}

impl TorusRoutingStrategy {
    pub fn new(dimensions: Vec<usize>) -> TorusRoutingStrategy {
        TorusRoutingStrategy {
            dimensions,
            coordinates: HashMap::new(),
        }
    }

    pub fn register(&mut self, host: &str, coordinate: Vec<usize>) {
        assert_eq!(coordinate.len(), self.dimensions.len());
        self.coordinates.insert(host.to_string(), coordinate);
    }
}

impl RoutingStrategy for TorusRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        let from = self.coordinates.get(src)?.clone();
        let to = self.coordinates.get(dst)?.clone();
        let mut route = Route::new();
        let mut cur = from;
        for axis in 0..self.dimensions.len() {
            let size = self.dimensions[axis];
            while cur[axis] != to[axis] {
                let forward_steps = (to[axis] + size - cur[axis]) % size;
                let backward_steps = (cur[axis] + size - to[axis]) % size;
                let (dir, forward) = if forward_steps <= backward_steps { (1i64, true) } else { (-1i64, false) };
                let from_coord = cur[axis];
                cur[axis] = ((cur[axis] as i64 + dir).rem_euclid(size as i64)) as usize;
                route
                    .links
                    .push(super::route::RouteLink::new(format!("torus_ax{}_{}", axis, from_coord), forward));
            }
        }
        Some(route)
    }
}

/// Coordinate-derived latency/bandwidth: route "length" is the Euclidean
/// distance between two hosts' Vivaldi coordinates; the resolved route is
/// a single virtual link whose latency the zone computes from that
/// distance (see `NetZone::vivaldi_link_for`).
pub struct VivaldiRoutingStrategy {
    coordinates: HashMap<String, (f64, f64, f64)>,
}

impl VivaldiRoutingStrategy {
    pub fn new() -> VivaldiRoutingStrategy {
        VivaldiRoutingStrategy { coordinates: HashMap::new() }
    }

    pub fn register(&mut self, host: &str, x: f64, y: f64, height: f64) {
        self.coordinates.insert(host.to_string(), (x, y, height));
    }

    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        let (ax, ay, ah) = *self.coordinates.get(a)?;
        let (bx, by, bh) = *self.coordinates.get(b)?;
        Some((((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()) + ah + bh)
    }
}

impl Default for VivaldiRoutingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingStrategy for VivaldiRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        if self.coordinates.contains_key(src) && self.coordinates.contains_key(dst) {
            Some(Route::single_link(format!("vivaldi_{}_{}", src, dst), true))
        } else {
            None
        }
    }
}

/// A single shared-medium link; traversed once if either endpoint is the
/// access point, twice otherwise (station → AP → station).
pub struct WifiRoutingStrategy {
    access_point: String,
    shared_link: String,
}

impl WifiRoutingStrategy {
    pub fn new(access_point: impl Into<String>, shared_link: impl Into<String>) -> WifiRoutingStrategy {
        WifiRoutingStrategy {
            access_point: access_point.into(),
            shared_link: shared_link.into(),
        }
    }
}

impl RoutingStrategy for WifiRoutingStrategy {
    fn get_local_route(&self, src: &str, dst: &str) -> Option<Route> {
        let mut route = Route::new();
        if src == self.access_point || dst == self.access_point {
            route.links.push(super::route::RouteLink::new(self.shared_link.clone(), true));
        } else {
            route.links.push(super::route::RouteLink::new(self.shared_link.clone(), true));
            route.links.push(super::route::RouteLink::new(self.shared_link.clone(), false));
        }
        Some(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_table_symmetric_route_is_reversed() {
        let mut full = FullRoutingStrategy::new();
        full.add_route("h1", "h2", Route::single_link("l0", true), true);
        let r = full.get_local_route("h2", "h1").unwrap();
        assert_eq!(r.links[0].link_name, "l0");
        assert!(!r.links[0].forward);
    }

    #[test]
    fn floyd_precomputes_two_hop_path() {
        let edges = vec![
            ("a".to_string(), "b".to_string(), "ab".to_string(), 1.0, true),
            ("b".to_string(), "c".to_string(), "bc".to_string(), 1.0, true),
        ];
        let floyd = FloydRoutingStrategy::compute(&edges);
        let route = floyd.get_local_route("a", "c").unwrap();
        assert_eq!(route.links.len(), 2);
    }

    #[test]
    fn dijkstra_finds_shortest_of_two_paths() {
        let edges = vec![
            ("a".to_string(), "b".to_string(), "direct".to_string(), 10.0, true),
            ("a".to_string(), "c".to_string(), "ac".to_string(), 1.0, true),
            ("c".to_string(), "b".to_string(), "cb".to_string(), 1.0, true),
        ];
        let dij = DijkstraRoutingStrategy::new(edges);
        let route = dij.get_local_route("a", "b").unwrap();
        assert_eq!(route.links.len(), 2);
    }

    #[test]
    fn torus_routes_shortest_direction_with_wraparound() {
        let mut torus = TorusRoutingStrategy::new(vec![4]);
        torus.register("h0", vec![0]);
        torus.register("h3", vec![3]);
        let route = torus.get_local_route("h0", "h3").unwrap();
        // going backward (wrap) is 1 hop vs 3 hops forward
        assert_eq!(route.links.len(), 1);
    }

    #[test]
    fn wifi_route_through_access_point_is_two_hops_between_stations() {
        let wifi = WifiRoutingStrategy::new("ap", "medium");
        let route = wifi.get_local_route("station1", "station2").unwrap();
        assert_eq!(route.links.len(), 2);
    }
}
