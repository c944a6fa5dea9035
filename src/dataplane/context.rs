//! Per-node routing policy context
//!
//! Bundles the access-list, route-map and policy-routing engines of one
//! node. Nothing in here is shared between nodes.

use std::time::Duration;

use super::acl::AccessListEngine;
use super::interface::Interface;
use super::pbr::{PolicyDecision, PolicyRouting};
use super::route_map::RouteMapEngine;
use super::routing::ForwardingTable;
use crate::protocol::ipv4::Ipv4Packet;
use crate::telemetry::TraceWriter;

#[derive(Debug)]
pub struct RoutingPolicyContext {
    pub acl: AccessListEngine,
    pub route_maps: RouteMapEngine,
    pub pbr: PolicyRouting,
}

impl RoutingPolicyContext {
    pub fn new(node: u32) -> Self {
        Self {
            acl: AccessListEngine::new(node),
            route_maps: RouteMapEngine::new(node),
            pbr: PolicyRouting::new(node),
        }
    }

    pub fn node(&self) -> u32 {
        self.acl.node()
    }

    /// Enable or disable the trace files of both packet engines
    pub fn set_traces(&mut self, acl: Option<TraceWriter>, pbr: Option<TraceWriter>) {
        self.acl.set_trace(acl);
        self.pbr.set_trace(pbr);
    }

    /// Policy-route a packet received on `interface` (`None` for locally
    /// generated traffic). Route-map IP matches consult this node's access
    /// lists.
    pub fn policy_route(
        &mut self,
        interface: Option<usize>,
        packet: &mut Ipv4Packet,
        fib: &dyn ForwardingTable,
        interfaces: &[Interface],
        now: Duration,
    ) -> PolicyDecision {
        self.pbr.route(
            interface,
            packet,
            &self.route_maps,
            &self.acl,
            fib,
            interfaces,
            now,
        )
    }
}
