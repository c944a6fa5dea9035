//! Policy-Based Routing (PBR)
//!
//! A route map bound to an ingress interface (or to locally generated
//! traffic) can override the forwarding decision of a packet:
//! - rewrite the IP precedence
//! - pick the next hop
//! - pick the egress interface
//!
//! Only `match length` / `match ip address` and the five forwarding set
//! clauses are meaningful here; anything else is rejected when binding.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, warn};

use super::interface::Interface;
use super::route_map::{
    AclVerifier, InterfaceRef, MatchClause, RouteMapEngine, RouteMapType, ValueBag,
};
use super::routing::ForwardingTable;
use crate::protocol::ipv4::Ipv4Packet;
use crate::telemetry::{PbrStats, TraceWriter};
use crate::{Error, Result};

/// Outcome of policy routing for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Send on `interface` toward `next_hop`
    Forward { interface: usize, next_hop: Ipv4Addr },
    /// Not handled; the packet takes normal destination-based forwarding
    Decline,
}

/// Interface and next hop chosen from one pair of set lists
#[derive(Debug, Default)]
struct Selection {
    interface: Option<usize>,
    next_hop: Option<Ipv4Addr>,
}

/// Per-node policy routing state
#[derive(Debug)]
pub struct PolicyRouting {
    node: u32,
    bindings: BTreeMap<usize, String>,
    local: Option<String>,
    pub stats: PbrStats,
    trace: Option<TraceWriter>,
}

impl PolicyRouting {
    pub fn new(node: u32) -> Self {
        Self {
            node,
            bindings: BTreeMap::new(),
            local: None,
            stats: PbrStats::new(),
            trace: None,
        }
    }

    pub fn set_trace(&mut self, trace: Option<TraceWriter>) {
        self.trace = trace;
    }

    /// Route map bound to an interface, or to local traffic for `None`
    pub fn binding(&self, interface: Option<usize>) -> Option<&str> {
        match interface {
            Some(index) => self.bindings.get(&index).map(String::as_str),
            None => self.local.as_deref(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.local.is_some() || !self.bindings.is_empty()
    }

    /// Bind `tag` to an interface (`IP POLICY ROUTE-MAP`) or to local
    /// traffic (`IP LOCAL POLICY ROUTE-MAP`).
    ///
    /// An undefined route map only warns and leaves the binding point
    /// unbound. Returns whether the binding was made.
    pub fn bind(
        &mut self,
        interface: Option<usize>,
        tag: &str,
        maps: &RouteMapEngine,
    ) -> Result<bool> {
        let Some(map) = maps.find_by_tag(tag) else {
            warn!(node = self.node, "route map {} is not defined, policy routing not enabled", tag);
            return Ok(false);
        };

        if self.binding(interface).is_some() {
            return Err(Error::Config(match interface {
                Some(index) => format!("interface {} already has a policy route map", index),
                None => "local policy route map already configured".to_string(),
            }));
        }

        for entry in map.entries() {
            for clause in &entry.matches {
                if !matches!(clause, MatchClause::Length { .. } | MatchClause::IpAddress(_)) {
                    return Err(Error::Config(format!(
                        "match clause '{}' in route map {} seq {} is not allowed for policy routing",
                        clause, tag, entry.seq
                    )));
                }
            }
            for clause in &entry.sets {
                if !clause.is_policy_routing() {
                    return Err(Error::Config(format!(
                        "set clause '{}' in route map {} seq {} is not allowed for policy routing",
                        clause, tag, entry.seq
                    )));
                }
            }
        }

        match interface {
            Some(index) => {
                self.bindings.insert(index, tag.to_string());
            }
            None => self.local = Some(tag.to_string()),
        }
        debug!(node = self.node, interface = ?interface, "policy route map {} bound", tag);
        Ok(true)
    }

    /// Run the route map bound at `interface` (`None` for local traffic)
    /// against `packet`. A precedence rewrite stays on the packet even when
    /// the decision is to decline.
    #[allow(clippy::too_many_arguments)]
    pub fn route(
        &mut self,
        interface: Option<usize>,
        packet: &mut Ipv4Packet,
        maps: &RouteMapEngine,
        acl: &dyn AclVerifier,
        fib: &dyn ForwardingTable,
        interfaces: &[Interface],
        now: Duration,
    ) -> PolicyDecision {
        let Some(tag) = self.binding(interface).map(str::to_string) else {
            return PolicyDecision::Decline;
        };

        let mut bag = ValueBag {
            length: Some(u32::from(packet.total_length())),
            src: packet.src_addr(),
            dst: packet.dst_addr(),
            ..Default::default()
        };

        let mut precedence_set = false;
        let mut selection = None;
        if let Some(entry) = maps.action(&tag, &mut bag, acl) {
            if entry.map_type == RouteMapType::Deny {
                debug!(node = self.node, "route map {} seq {} denies policy routing", tag, entry.seq);
            } else {
                if let Some(precedence) = bag.precedence {
                    packet.set_precedence(precedence);
                    self.stats.precedence_set.inc();
                    precedence_set = true;
                }
                selection = self.select(&bag, fib, interfaces);
            }
        }

        let decision = match selection {
            Some(Selection {
                interface: Some(egress),
                next_hop,
            }) => PolicyDecision::Forward {
                interface: egress,
                next_hop: next_hop.unwrap_or(bag.dst),
            },
            _ => PolicyDecision::Decline,
        };

        match decision {
            PolicyDecision::Forward { .. } => self.stats.binding(interface).routed.inc(),
            PolicyDecision::Decline if !precedence_set => {
                self.stats.binding(interface).not_routed.inc()
            }
            PolicyDecision::Decline => {}
        }

        if let PolicyDecision::Forward { interface: egress, next_hop } = decision {
            debug!(
                node = self.node,
                "policy routed {} -> {} via interface {} next hop {}",
                bag.src, bag.dst, egress, next_hop
            );
            self.trace_packet(interface, packet, egress, next_hop, now);
        }
        decision
    }

    /// Resolve next hop and interface from the primary lists, or from the
    /// default lists when neither primary list is set.
    fn select(
        &self,
        bag: &ValueBag,
        fib: &dyn ForwardingTable,
        interfaces: &[Interface],
    ) -> Option<Selection> {
        let (next_hops, egress) = if bag.next_hops.is_none() && bag.interfaces.is_none() {
            (&bag.default_next_hops, &bag.default_interfaces)
        } else {
            (&bag.next_hops, &bag.interfaces)
        };
        if next_hops.is_none() && egress.is_none() {
            return None;
        }

        let mut selection = Selection::default();
        if let Some(hops) = next_hops {
            let usable = hops.iter().find_map(|hop| {
                let route = fib.lookup(*hop)?;
                is_enabled(interfaces, route.interface).then_some((*hop, route.interface))
            });
            match usable {
                Some((hop, index)) => {
                    selection.next_hop = Some(hop);
                    selection.interface = Some(index);
                }
                None => warn!(node = self.node, "all next hops set by policy routing are down"),
            }
        }

        if let Some(refs) = egress {
            match first_enabled(refs, interfaces) {
                Some(index) => selection.interface = Some(index),
                None => {
                    warn!(
                        node = self.node,
                        "all interfaces set by policy routing are down, action aborted"
                    );
                    return None;
                }
            }
        }
        Some(selection)
    }

    fn trace_packet(
        &mut self,
        interface: Option<usize>,
        packet: &Ipv4Packet,
        egress: usize,
        next_hop: Ipv4Addr,
        now: Duration,
    ) {
        let Some(trace) = self.trace.as_mut() else {
            return;
        };
        let ingress = match interface {
            Some(index) => index.to_string(),
            None => "NA".to_string(),
        };
        trace.write_line(&format!(
            "{} {} {:15.6} {:>15} {:>15} {} {} {:>15} {}",
            self.node,
            ingress,
            now.as_secs_f64(),
            packet.src_addr(),
            packet.dst_addr(),
            if interface.is_none() { "Y" } else { "N" },
            packet.tos(),
            next_hop,
            egress
        ));
    }
}

fn is_enabled(interfaces: &[Interface], index: usize) -> bool {
    interfaces.iter().any(|i| i.index == index && i.enabled)
}

fn first_enabled(refs: &[InterfaceRef], interfaces: &[Interface]) -> Option<usize> {
    refs.iter().find_map(|r| {
        let index = r.index()?;
        is_enabled(interfaces, index).then_some(index)
    })
}
