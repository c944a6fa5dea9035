//! Control-plane engines of a simulated router node
//!
//! Access lists gate packets at interfaces, route maps drive policy
//! routing, and RIP maintains the forwarding table. [`Node`] ties one
//! node's engines together; [`Network`] connects nodes.

pub mod acl;
pub mod acl_parser;
pub mod address_match;
mod context;
pub mod interface;
mod node;
pub mod pbr;
pub mod reflexive;
pub mod rip;
pub mod rip_table;
pub mod route_map;
pub mod route_map_parser;
pub mod routing;
mod simulation;
pub mod timer;

pub use acl::{AccessListEngine, AccessListRule, AclId, AclPacket, Direction, ListKind, Verdict};
pub use context::RoutingPolicyContext;
pub use interface::{prefix_to_mask, Interface, Medium};
pub use node::{ForwardAction, Node};
pub use pbr::{PolicyDecision, PolicyRouting};
pub use rip::{
    Compatibility, RipDatagram, RipEngine, RipInterfaceSettings, RipSettings, SplitHorizon,
};
pub use rip_table::{RipRoute, RipTable};
pub use route_map::{AclVerifier, MatchClause, RouteMapEngine, RouteMapType, SetClause, ValueBag};
pub use routing::{ForwardingTable, Route, RouteSource, RoutingTable};
pub use simulation::{Delivery, Network};
pub use timer::{EventQueue, RouteTimerKind, Scheduler, TimerEvent};
