//! Simulated router node
//!
//! Ties the engines of one node together: the interfaces, the forwarding
//! table, the routing policy context, the optional RIP engine and the
//! node's event queue. IPv4 packets pass through
//! - the inbound access lists of the ingress interface
//! - policy routing, falling back to the forwarding table
//! - the outbound access lists of the egress interface

use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::acl::{AclPacket, Direction, Verdict};
use super::context::RoutingPolicyContext;
use super::interface::{is_own_address, Interface};
use super::pbr::PolicyDecision;
use super::rip::{RipDatagram, RipEngine, RipSettings};
use super::routing::{ForwardingTable, Route, RoutingTable};
use super::timer::{EventQueue, Scheduler, TimerEvent};
use crate::protocol::ipv4::{proto, Ipv4Packet, PRECEDENCE_SHIFT};
use crate::protocol::rip::RIP_PORT;
use crate::protocol::tcp::TcpFlags;
use crate::{Error, Result};

/// Precedence RIP datagrams are sent with (internet control)
const RIP_PRECEDENCE: u8 = 6;

/// Result of pushing an IPv4 packet through a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardAction {
    /// Send `packet` on `interface` toward `next_hop`
    Forward {
        interface: usize,
        next_hop: Ipv4Addr,
        packet: Vec<u8>,
    },
    /// Addressed to this node
    Local,
    /// No route to destination
    NoRoute { dst_addr: Ipv4Addr },
    /// Dropped by an access list
    Filtered {
        interface: usize,
        direction: Direction,
    },
    /// Malformed or arrived on an unusable interface
    Dropped,
}

/// One router of the simulated network
#[derive(Debug)]
pub struct Node {
    id: u32,
    interfaces: Vec<Interface>,
    fib: RoutingTable,
    policy: RoutingPolicyContext,
    rip: Option<RipEngine>,
    queue: EventQueue,
    started: bool,
}

impl Node {
    /// Create a node; the networks of enabled interfaces become connected
    /// routes.
    pub fn new(id: u32, interfaces: Vec<Interface>) -> Self {
        let mut fib = RoutingTable::new();
        for iface in interfaces.iter().filter(|i| i.enabled) {
            fib.add_route(Route::connected(iface.network(), iface.mask, iface.index));
        }
        Self {
            id,
            interfaces,
            fib,
            policy: RoutingPolicyContext::new(id),
            rip: None,
            queue: EventQueue::new(),
            started: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn interface(&self, index: usize) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.index == index)
    }

    fn interface_position(&self, index: usize) -> Result<usize> {
        self.interfaces
            .iter()
            .position(|i| i.index == index)
            .ok_or(Error::InterfaceNotFound { index })
    }

    pub fn fib(&self) -> &RoutingTable {
        &self.fib
    }

    pub fn policy(&self) -> &RoutingPolicyContext {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut RoutingPolicyContext {
        &mut self.policy
    }

    pub fn rip(&self) -> Option<&RipEngine> {
        self.rip.as_ref()
    }

    /// Run RIP on this node; takes effect at [`Node::start`]
    pub fn enable_rip(&mut self, settings: RipSettings, seed: u64) {
        self.rip = Some(RipEngine::new(self.id, settings, seed));
    }

    /// Current simulated time of this node
    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline()
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Move the node clock forward without firing anything
    pub fn advance_to(&mut self, at: Duration) {
        self.queue.advance_to(at);
    }

    /// Start the routing protocol. Calling it twice is harmless.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(node = self.id, interfaces = self.interfaces.len(), "node started");
        if let Some(rip) = self.rip.as_mut() {
            rip.start(&self.interfaces, &mut self.fib, &mut self.queue);
        }
    }

    /// Fire the earliest event due at or before `until`. `None` when
    /// nothing is due; otherwise the RIP datagrams the event produced.
    pub fn step(&mut self, until: Duration) -> Option<Vec<RipDatagram>> {
        let event = self.queue.pop_due(until)?;
        Some(self.handle_timer(&event))
    }

    /// Dispatch a timer event to the engine that scheduled it
    pub fn handle_timer(&mut self, event: &TimerEvent) -> Vec<RipDatagram> {
        trace!(node = self.id, ?event, "timer");
        match event {
            TimerEvent::AclLog { .. }
            | TimerEvent::ReflexiveTimeout { .. }
            | TimerEvent::ReflexiveFinGrace { .. } => {
                self.policy.acl.handle_timer(event, &mut self.queue);
                Vec::new()
            }
            TimerEvent::RipRequest
            | TimerEvent::RipRegularUpdate
            | TimerEvent::RipTriggeredUpdate
            | TimerEvent::RipRouteTimer { .. } => match self.rip.as_mut() {
                Some(rip) => rip.handle_timer(event, &self.interfaces, &mut self.fib, &mut self.queue),
                None => {
                    warn!(node = self.id, ?event, "RIP timer without RIP engine");
                    Vec::new()
                }
            },
        }
    }

    /// Deliver a RIP datagram received on `datagram.interface`. The
    /// inbound access lists of that interface see it as UDP 520 traffic.
    pub fn receive_rip(&mut self, datagram: &RipDatagram) -> Vec<RipDatagram> {
        let Some(rip) = self.rip.as_mut() else {
            trace!(node = self.id, "RIP datagram ignored, RIP not running");
            return Vec::new();
        };
        if !self
            .interfaces
            .iter()
            .any(|i| i.index == datagram.interface && i.enabled)
        {
            debug!(node = self.id, interface = datagram.interface, "RIP datagram on a down interface");
            return Vec::new();
        }

        let packet = AclPacket {
            src: datagram.src,
            dst: datagram.dst,
            protocol: proto::UDP,
            tos: RIP_PRECEDENCE << PRECEDENCE_SHIFT,
            src_port: RIP_PORT,
            dst_port: RIP_PORT,
            tcp_flags: TcpFlags::default(),
            icmp_type: 0,
            icmp_code: 0,
            igmp_type: 0,
        };
        let verdict = self.policy.acl.filter_at_interface(
            datagram.interface,
            Direction::In,
            &packet,
            &self.interfaces,
            &mut self.queue,
        );
        if verdict == Verdict::Drop {
            debug!(node = self.id, "RIP datagram from {} filtered", datagram.src);
            return Vec::new();
        }

        rip.receive(datagram, &self.interfaces, &mut self.fib, &mut self.queue)
    }

    /// Forward an IPv4 packet received on `ingress`
    pub fn forward(&mut self, ingress: usize, data: &[u8]) -> ForwardAction {
        if !self.interface(ingress).is_some_and(|i| i.enabled) {
            debug!(node = self.id, interface = ingress, "packet on unknown or down interface");
            return ForwardAction::Dropped;
        }
        let (mut packet, classified) = match parse(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(node = self.id, "dropping packet: {}", e);
                return ForwardAction::Dropped;
            }
        };

        let verdict = self.policy.acl.filter_at_interface(
            ingress,
            Direction::In,
            &classified,
            &self.interfaces,
            &mut self.queue,
        );
        if verdict == Verdict::Drop {
            return ForwardAction::Filtered {
                interface: ingress,
                direction: Direction::In,
            };
        }

        if is_own_address(&self.interfaces, packet.dst_addr()) {
            trace!(node = self.id, "packet for {} delivered locally", packet.dst_addr());
            return ForwardAction::Local;
        }

        self.route_and_filter(Some(ingress), &mut packet)
    }

    /// Send a locally generated IPv4 packet; the local policy route map
    /// applies instead of an interface binding.
    pub fn send_local(&mut self, data: &[u8]) -> ForwardAction {
        let mut packet = match Ipv4Packet::from_bytes(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(node = self.id, "dropping local packet: {}", e);
                return ForwardAction::Dropped;
            }
        };
        if is_own_address(&self.interfaces, packet.dst_addr()) {
            return ForwardAction::Local;
        }
        self.route_and_filter(None, &mut packet)
    }

    fn route_and_filter(&mut self, ingress: Option<usize>, packet: &mut Ipv4Packet) -> ForwardAction {
        let now = self.queue.now();
        let decision = self
            .policy
            .policy_route(ingress, packet, &self.fib, &self.interfaces, now);

        let (egress, next_hop) = match decision {
            PolicyDecision::Forward {
                interface,
                next_hop,
            } => (interface, next_hop),
            PolicyDecision::Decline => {
                let dst = packet.dst_addr();
                match self.fib.lookup(dst) {
                    Some(route) => (route.interface, route.next_hop.unwrap_or(dst)),
                    None => {
                        debug!(node = self.id, "no route to {}", dst);
                        return ForwardAction::NoRoute { dst_addr: dst };
                    }
                }
            }
        };

        // policy routing may have rewritten the precedence
        let classified = match AclPacket::from_ipv4(packet.as_bytes()) {
            Ok(classified) => classified,
            Err(e) => {
                debug!(node = self.id, "dropping packet: {}", e);
                return ForwardAction::Dropped;
            }
        };
        let verdict = self.policy.acl.filter_at_interface(
            egress,
            Direction::Out,
            &classified,
            &self.interfaces,
            &mut self.queue,
        );
        if verdict == Verdict::Drop {
            return ForwardAction::Filtered {
                interface: egress,
                direction: Direction::Out,
            };
        }

        debug!(
            node = self.id,
            "forwarding {} -> {} via {} on interface {}",
            packet.src_addr(),
            packet.dst_addr(),
            next_hop,
            egress
        );
        ForwardAction::Forward {
            interface: egress,
            next_hop,
            packet: packet.as_bytes().to_vec(),
        }
    }

    /// Bring an interface up or down; RIP reacts when it is running
    pub fn set_interface_status(&mut self, index: usize, up: bool) -> Result<()> {
        let position = self.interface_position(index)?;
        if self.interfaces[position].enabled == up {
            return Ok(());
        }
        self.interfaces[position].enabled = up;
        let iface = self.interfaces[position].clone();
        info!(node = self.id, interface = index, up, "interface status changed");

        if up {
            self.fib
                .add_route(Route::connected(iface.network(), iface.mask, index));
        } else {
            self.fib.remove_route(iface.network(), iface.mask);
        }
        if self.started {
            if let Some(rip) = self.rip.as_mut() {
                rip.interface_status(&iface, up, &mut self.fib, &mut self.queue);
            }
        }
        Ok(())
    }

    /// `IP ADDRESS a m` on an interface
    pub fn set_interface_address(&mut self, index: usize, address: Ipv4Addr, mask: Ipv4Addr) -> Result<()> {
        let position = self.interface_position(index)?;
        let old = self.interfaces[position].clone();
        if old.address == address && old.mask == mask {
            return Ok(());
        }
        if old.enabled {
            self.fib.remove_route(old.network(), old.mask);
        }
        let iface = &mut self.interfaces[position];
        iface.address = address;
        iface.mask = mask;
        let iface = iface.clone();
        if iface.enabled {
            self.fib
                .add_route(Route::connected(iface.network(), iface.mask, index));
        }
        debug!(node = self.id, interface = index, "address set to {}/{}", address, mask);

        if self.started {
            if let Some(rip) = self.rip.as_mut() {
                rip.address_changed(&iface, &mut self.fib, &mut self.queue);
            }
        }
        Ok(())
    }

    /// Access lists, route maps, forwarding table and RIP table
    pub fn show(&self) -> String {
        let mut out = format!("node {}\n", self.id);
        out.push_str(&self.policy.acl.show(None));
        out.push_str(&self.policy.route_maps.show(None));
        out.push_str("forwarding table\n");
        for route in self.fib.routes() {
            out.push_str(&format!("  {}\n", route));
        }
        if let Some(rip) = &self.rip {
            out.push_str(&rip.show());
        }
        out
    }

    /// All statistics of the node as name/value pairs
    pub fn export_stats(&self) -> Vec<(String, u64)> {
        let mut stats = self.policy.acl.stats.export();
        stats.extend(self.policy.pbr.stats.export());
        if let Some(rip) = &self.rip {
            stats.extend(rip.stats.export());
        }
        stats
    }
}

fn parse(data: &[u8]) -> Result<(Ipv4Packet, AclPacket)> {
    let packet = Ipv4Packet::from_bytes(data)?;
    let classified = AclPacket::from_ipv4(data)?;
    Ok((packet, classified))
}
