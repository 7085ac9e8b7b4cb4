//! Addressable network elements: hosts, routers, and netzones themselves
//! (a zone is addressable as a single point from its parent's perspective).

/// What kind of thing a [`NetPoint`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetPointKind {
    Host,
    Router,
    NetZone,
}

/// One addressable element. Names are globally unique (spec ยง3); `id` is a
/// dense index assigned at creation, handy for routing-table arrays.
#[derive(Debug, Clone)]
pub struct NetPoint {
    pub name: String,
    pub kind: NetPointKind,
    pub englobing_zone: String,
    pub id: usize,
}

impl NetPoint {
    pub fn new(name: impl Into<String>, kind: NetPointKind, englobing_zone: impl Into<String>, id: usize) -> NetPoint {
        NetPoint {
            name: name.into(),
            kind,
            englobing_zone: englobing_zone.into(),
            id,
        }
    }
}
