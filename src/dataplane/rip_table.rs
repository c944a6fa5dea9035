//! RIP route table
//!
//! Routes are kept sorted by destination so lookups are a binary search.
//! Flushed routes stay in place as tombstones and are revived when a
//! neighbor advertises the destination again.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::protocol::rip::INFINITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipRoute {
    pub destination: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Unspecified for directly attached wired networks
    pub next_hop: Ipv4Addr,
    pub tag: u16,
    pub metric: u32,
    pub outgoing: usize,
    pub learned: usize,
    /// Zero when no timeout is pending
    pub timeout: Duration,
    /// Zero when no flush is pending
    pub flush: Duration,
    pub changed: bool,
    pub flushed: bool,
}

impl RipRoute {
    pub fn new(
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        next_hop: Ipv4Addr,
        metric: u32,
        interface: usize,
    ) -> Self {
        Self {
            destination,
            mask,
            next_hop,
            tag: 0,
            metric,
            outgoing: interface,
            learned: interface,
            timeout: Duration::ZERO,
            flush: Duration::ZERO,
            changed: true,
            flushed: false,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.metric < INFINITY
    }
}

#[derive(Debug, Default)]
pub struct RipTable {
    routes: Vec<RipRoute>,
}

impl RipTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, destination: Ipv4Addr) -> std::result::Result<usize, usize> {
        self.routes
            .binary_search_by_key(&u32::from(destination), |r| u32::from(r.destination))
    }

    pub fn get(&self, destination: Ipv4Addr) -> Option<&RipRoute> {
        self.position(destination).ok().map(|i| &self.routes[i])
    }

    pub fn get_mut(&mut self, destination: Ipv4Addr) -> Option<&mut RipRoute> {
        match self.position(destination) {
            Ok(i) => Some(&mut self.routes[i]),
            Err(_) => None,
        }
    }

    /// Insert keeping destination order. Duplicates are an invariant violation.
    pub fn add(&mut self, route: RipRoute) -> &mut RipRoute {
        match self.position(route.destination) {
            Ok(_) => panic!("cannot add duplicate RIP route to {}", route.destination),
            Err(i) => {
                self.routes.insert(i, route);
                &mut self.routes[i]
            }
        }
    }

    pub fn routes(&self) -> &[RipRoute] {
        &self.routes
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RipRoute> {
        self.routes.iter_mut()
    }

    pub fn clear_changed(&mut self) {
        for route in &mut self.routes {
            route.changed = false;
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Natural mask of an address class (A, B, C); host mask for class D,
/// zero otherwise
pub fn classful_mask(addr: Ipv4Addr) -> Ipv4Addr {
    match addr.octets()[0] {
        1..=127 => Ipv4Addr::new(255, 0, 0, 0),
        128..=191 => Ipv4Addr::new(255, 255, 0, 0),
        192..=223 => Ipv4Addr::new(255, 255, 255, 0),
        224..=239 => Ipv4Addr::BROADCAST,
        _ => Ipv4Addr::UNSPECIFIED,
    }
}

/// Classful network containing `addr`
pub fn major_network(addr: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) & u32::from(classful_mask(addr)))
}

pub fn in_different_major_network(a: Ipv4Addr, b: Ipv4Addr) -> bool {
    major_network(a) != major_network(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(a: u8, b: u8) -> RipRoute {
        RipRoute::new(
            Ipv4Addr::new(10, a, b, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::UNSPECIFIED,
            1,
            0,
        )
    }

    #[test]
    fn test_table_stays_sorted() {
        let mut table = RipTable::new();
        for (a, b) in [(5, 0), (1, 9), (3, 3), (1, 2), (200, 1)] {
            table.add(route(a, b));
        }

        let order: Vec<_> = table.routes().iter().map(|r| r.destination).collect();
        let mut sorted = order.clone();
        sorted.sort_by_key(|a| u32::from(*a));
        assert_eq!(order, sorted);

        assert!(table.get(Ipv4Addr::new(10, 3, 3, 0)).is_some());
        assert!(table.get(Ipv4Addr::new(10, 3, 4, 0)).is_none());
        assert_eq!(table.len(), 5);
    }

    #[test]
    #[should_panic(expected = "duplicate RIP route")]
    fn test_duplicate_route_panics() {
        let mut table = RipTable::new();
        table.add(route(1, 1));
        table.add(route(1, 1));
    }

    #[test]
    fn test_clear_changed() {
        let mut table = RipTable::new();
        table.add(route(1, 1));
        table.add(route(1, 2)).changed = false;
        table.clear_changed();
        assert!(table.routes().iter().all(|r| !r.changed));
    }

    #[test]
    fn test_classful_masks() {
        assert_eq!(classful_mask(Ipv4Addr::new(10, 1, 2, 3)), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(classful_mask(Ipv4Addr::new(172, 16, 2, 3)), Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(classful_mask(Ipv4Addr::new(192, 168, 2, 3)), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(classful_mask(Ipv4Addr::new(224, 0, 0, 9)), Ipv4Addr::BROADCAST);
        assert_eq!(classful_mask(Ipv4Addr::new(250, 0, 0, 1)), Ipv4Addr::UNSPECIFIED);

        assert_eq!(major_network(Ipv4Addr::new(172, 16, 2, 3)), Ipv4Addr::new(172, 16, 0, 0));
        assert!(!in_different_major_network(Ipv4Addr::new(10, 1, 0, 0), Ipv4Addr::new(10, 9, 9, 9)));
        assert!(in_different_major_network(Ipv4Addr::new(10, 1, 0, 0), Ipv4Addr::new(11, 1, 0, 0)));
    }
}
