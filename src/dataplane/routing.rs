//! IP forwarding table
//!
//! RIP installs and withdraws routes here; policy routing resolves the
//! egress interface of a configured next hop through it.

use std::fmt;
use std::net::Ipv4Addr;

use super::interface::mask_to_prefix;

/// Route entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network
    pub destination: Ipv4Addr,
    /// Subnet mask
    pub mask: Ipv4Addr,
    /// Next hop (None for directly connected)
    pub next_hop: Option<Ipv4Addr>,
    /// Outgoing interface index
    pub interface: usize,
    /// Route metric
    pub metric: u32,
    /// Route source
    pub source: RouteSource,
}

impl Route {
    pub fn connected(destination: Ipv4Addr, mask: Ipv4Addr, interface: usize) -> Self {
        Self {
            destination,
            mask,
            next_hop: None,
            interface,
            metric: 0,
            source: RouteSource::Connected,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        mask_to_prefix(self.mask)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.destination) & u32::from(self.mask)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ", self.destination, self.prefix_len())?;
        match self.next_hop {
            Some(hop) => write!(f, "via {}", hop)?,
            None => write!(f, "directly connected")?,
        }
        write!(
            f,
            ", interface {}, metric {}, {}",
            self.interface, self.metric, self.source
        )
    }
}

/// Source of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Directly connected network
    Connected,
    /// Static route from config
    Static,
    /// Learned via RIP
    Rip,
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Static => write!(f, "static"),
            Self::Rip => write!(f, "rip"),
        }
    }
}

/// Forwarding table consulted and updated by the routing engines
pub trait ForwardingTable {
    /// Install or replace the route for `(destination, mask)`
    fn add_route(&mut self, route: Route);

    /// Withdraw a route; the destination becomes unreachable
    fn remove_route(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool;

    /// Longest prefix match
    fn lookup(&self, addr: Ipv4Addr) -> Option<&Route>;
}

/// Routing table using longest prefix match
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Vec<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Get all routes
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl ForwardingTable for RoutingTable {
    fn add_route(&mut self, route: Route) {
        // Remove existing route with same destination/mask
        self.routes
            .retain(|r| r.destination != route.destination || r.mask != route.mask);

        self.routes.push(route);

        // Sort by prefix length (longest first) for LPM
        self.routes
            .sort_by(|a, b| b.prefix_len().cmp(&a.prefix_len()));
    }

    fn remove_route(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        let before = self.routes.len();
        self.routes
            .retain(|r| r.destination != destination || r.mask != mask);
        self.routes.len() != before
    }

    fn lookup(&self, addr: Ipv4Addr) -> Option<&Route> {
        self.routes.iter().find(|route| route.contains(addr))
    }
}
