//! A resolved route: an ordered list of links plus the gateway netpoints at
//! each zone boundary it crosses.

/// One link traversal within a route, with the direction needed to pick a
/// split-duplex link's UP or DOWN sub-link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLink {
    pub link_name: String,
    /// True if traversed in the link's nominal src→dst direction.
    pub forward: bool,
}

impl RouteLink {
    pub fn new(link_name: impl Into<String>, forward: bool) -> RouteLink {
        RouteLink {
            link_name: link_name.into(),
            forward,
        }
    }
}

/// `{gw_src, gw_dst, link_list[]}` per spec ยง3.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub gw_src: Option<String>,
    pub gw_dst: Option<String>,
    pub links: Vec<RouteLink>,
}

impl Route {
    pub fn new() -> Route {
        Route::default()
    }

    pub fn single_link(link_name: impl Into<String>, forward: bool) -> Route {
        Route {
            gw_src: None,
            gw_dst: None,
            links: vec![RouteLink::new(link_name, forward)],
        }
    }

    /// Inserts `prefix`'s links before this route's own, keeping this
    /// route's `gw_dst` but adopting `prefix`'s `gw_src`.
    pub fn prepend(&mut self, prefix: &Route) {
        let mut links = prefix.links.clone();
        links.append(&mut self.links);
        self.links = links;
        self.gw_src = prefix.gw_src.clone();
    }

    /// Appends `suffix`'s links after this route's own, keeping this
    /// route's `gw_src` but adopting `suffix`'s `gw_dst`.
    pub fn append_route(&mut self, suffix: &Route) {
        self.links.extend(suffix.links.iter().cloned());
        self.gw_dst = suffix.gw_dst.clone();
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
