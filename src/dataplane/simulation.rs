//! Network simulation harness
//!
//! Nodes keep their own event queues. The network repeatedly fires the
//! globally earliest event and hands the RIP datagrams it produced to every
//! node with an enabled interface on the sender's subnet.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, trace};

use super::interface::Interface;
use super::node::Node;
use super::rip::RipDatagram;
use crate::protocol::rip::RIP_MULTICAST;
use crate::{Error, Result};

/// A datagram in flight from one node to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub from: u32,
    pub to: u32,
    pub datagram: RipDatagram,
}

#[derive(Debug, Default)]
pub struct Network {
    nodes: Vec<Node>,
    now: Duration,
    events: u64,
    delivered: u64,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.iter().any(|n| n.id() == node.id()) {
            return Err(Error::Config(format!("duplicate node id {}", node.id())));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_mut(&mut self, id: u32) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Timer events fired so far
    pub fn events_processed(&self) -> u64 {
        self.events
    }

    /// RIP datagrams handed to a receiving node so far
    pub fn datagrams_delivered(&self) -> u64 {
        self.delivered
    }

    pub fn start(&mut self) {
        for node in &mut self.nodes {
            node.start();
        }
        info!(nodes = self.nodes.len(), "network started");
    }

    /// Fire every event due at or before `until` in time order, then move
    /// all clocks to `until`. Returns the number of events fired.
    pub fn run_until(&mut self, until: Duration) -> u64 {
        let before = self.events;
        while let Some(index) = self.earliest(until) {
            let Some(deadline) = self.nodes[index].next_deadline() else {
                break;
            };
            self.now = self.now.max(deadline);
            let Some(sent) = self.nodes[index].step(until) else {
                break;
            };
            self.events += 1;
            let from = self.nodes[index].id();
            self.flood(from, sent);
        }
        self.now = self.now.max(until);
        for node in &mut self.nodes {
            if node.now() < self.now {
                node.advance_to(self.now);
            }
        }
        self.events - before
    }

    /// Node holding the earliest deadline not after `until`; ties go to the
    /// node added first.
    fn earliest(&self, until: Duration) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.next_deadline().map(|d| (d, i)))
            .filter(|(d, _)| *d <= until)
            .min()
            .map(|(_, i)| i)
    }

    /// Deliver datagrams sent by node `from`, and the replies they
    /// provoke, until the exchange settles.
    fn flood(&mut self, from: u32, sent: Vec<RipDatagram>) {
        let mut pending: VecDeque<(u32, RipDatagram)> =
            sent.into_iter().map(|d| (from, d)).collect();

        while let Some((sender, datagram)) = pending.pop_front() {
            for delivery in self.receivers(sender, &datagram) {
                let Some(node) = self.nodes.iter_mut().find(|n| n.id() == delivery.to) else {
                    continue;
                };
                if node.now() < self.now {
                    node.advance_to(self.now);
                }
                trace!(
                    from = delivery.from,
                    to = delivery.to,
                    interface = delivery.datagram.interface,
                    "RIP datagram delivered"
                );
                self.delivered += 1;
                let replies = node.receive_rip(&delivery.datagram);
                pending.extend(replies.into_iter().map(|d| (delivery.to, d)));
            }
        }
    }

    /// Nodes with an enabled interface on the subnet `datagram` was sent
    /// to, excluding the sender itself
    fn receivers(&self, sender: u32, datagram: &RipDatagram) -> Vec<Delivery> {
        let Some(egress) = self
            .node(sender)
            .and_then(|n| n.interface(datagram.interface))
            .filter(|i| i.enabled)
        else {
            debug!(node = sender, interface = datagram.interface, "datagram on unusable interface dropped");
            return Vec::new();
        };

        let mut deliveries = Vec::new();
        for node in self.nodes.iter().filter(|n| n.id() != sender) {
            for iface in node.interfaces() {
                if !iface.enabled || !same_subnet(egress, iface) || !accepts(iface, datagram.dst) {
                    continue;
                }
                deliveries.push(Delivery {
                    from: sender,
                    to: node.id(),
                    datagram: RipDatagram {
                        interface: iface.index,
                        ..datagram.clone()
                    },
                });
            }
        }
        deliveries
    }
}

fn same_subnet(a: &Interface, b: &Interface) -> bool {
    a.contains(b.address) && b.contains(a.address)
}

fn accepts(iface: &Interface, dst: Ipv4Addr) -> bool {
    dst == RIP_MULTICAST || dst == Ipv4Addr::BROADCAST || dst == iface.broadcast() || dst == iface.address
}
