//! RIP (versions 1 and 2)
//!
//! Timer-driven distance-vector routing. The engine never sends anything
//! itself: every handler returns the datagrams to put on the wire, and all
//! waiting goes through the [`Scheduler`]. Per-route timers are cancelled by
//! zeroing their stored deadline and revalidated when the event fires.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::interface::{is_own_address, Interface, Medium};
use super::rip_table::{
    classful_mask, in_different_major_network, major_network, RipRoute, RipTable,
};
use super::routing::{ForwardingTable, Route, RouteSource};
use super::timer::{RouteTimerKind, Scheduler, TimerEvent};
use crate::protocol::rip::{
    RipBuilder, RipCommand, RipPacket, RipVersion, Rte, INFINITY, MAX_RTES, RIP_MULTICAST,
};
use crate::telemetry::RipStats;

/// Regular update period before jitter
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const UPDATE_JITTER: f64 = 0.15;

/// Triggered update delay before jitter
pub const TRIGGER_DELAY: Duration = Duration::from_secs(5);
const TRIGGER_JITTER: f64 = 0.8;

/// Initial request delay before jitter
pub const STARTUP_DELAY: Duration = Duration::from_millis(100);
const STARTUP_JITTER: f64 = 1.0;

pub const TIMEOUT_DELAY: Duration = Duration::from_secs(180);
pub const FLUSH_DELAY: Duration = Duration::from_secs(120);

const HOST_MASK: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Split horizon variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitHorizon {
    #[serde(rename = "no")]
    Off,
    #[default]
    Simple,
    PoisonedReverse,
}

/// Which RIP versions an interface speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Compatibility {
    #[default]
    #[serde(rename = "ripv2-only")]
    V2Only,
    #[serde(rename = "ripv1-only")]
    V1Only,
    #[serde(rename = "ripv1-compatible")]
    V1Compatible,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RipInterfaceSettings {
    /// RIP runs on this interface
    pub active: bool,
    pub auto_summary: bool,
    pub compatibility: Compatibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipSettings {
    pub version: RipVersion,
    pub split_horizon: SplitHorizon,
    pub border_router: bool,
    /// Indexed by interface index
    pub interfaces: Vec<RipInterfaceSettings>,
}

impl Default for RipSettings {
    fn default() -> Self {
        Self {
            version: RipVersion::V2,
            split_horizon: SplitHorizon::Simple,
            border_router: false,
            interfaces: Vec::new(),
        }
    }
}

/// A RIP message over UDP port 520
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipDatagram {
    /// Egress interface when sending, ingress interface when receiving
    pub interface: usize,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RipState {
    Idle,
    HandleRegularUpdateAlarm,
    HandleTriggeredUpdateAlarm,
    HandleRouteTimerAlarm,
    HandleFromTransport,
    HandleRequestAlarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseKind {
    /// Regular update
    AllRoutes,
    /// Triggered update
    ChangedRoutes,
    /// Answer to a whole-table request
    Requested { requester: Ipv4Addr },
    /// Answer to a RIPv1 request on a RIPv2 node
    RequestedCompatible { requester: Ipv4Addr },
}

fn jittered(rng: &mut StdRng, base: Duration, fraction: f64) -> Duration {
    let span = (base.as_nanos() as f64 * fraction) as u64;
    base - Duration::from_nanos(rng.gen_range(0..span.max(1)))
}

/// Move a route timer deadline to `now + delay`, scheduling an event only
/// when none is pending
fn arm_timer<S: Scheduler>(
    slot: &mut Duration,
    destination: Ipv4Addr,
    kind: RouteTimerKind,
    delay: Duration,
    scheduler: &mut S,
) {
    let now = scheduler.now();
    let deadline = now + delay;
    if slot.is_zero() {
        scheduler.schedule(delay, TimerEvent::RipRouteTimer { destination, kind });
    } else {
        assert!(*slot >= now, "RIP route timer for {} in the past", destination);
        assert!(
            deadline >= *slot,
            "restarted RIP route timer for {} must not move backwards",
            destination
        );
    }
    *slot = deadline;
}

fn interface(interfaces: &[Interface], index: usize) -> Option<&Interface> {
    interfaces.iter().find(|i| i.index == index)
}

fn learned_route(route: &RipRoute) -> Route {
    Route {
        destination: route.destination,
        mask: route.mask,
        next_hop: (!route.next_hop.is_unspecified()).then_some(route.next_hop),
        interface: route.outgoing,
        metric: route.metric,
        source: RouteSource::Rip,
    }
}

/// Per-node RIP instance
#[derive(Debug)]
pub struct RipEngine {
    node: u32,
    settings: RipSettings,
    table: RipTable,
    state: RipState,
    triggered_scheduled: bool,
    next_regular_update: Duration,
    update_rng: StdRng,
    trigger_rng: StdRng,
    pub stats: RipStats,
}

impl RipEngine {
    pub fn new(node: u32, mut settings: RipSettings, seed: u64) -> Self {
        if settings.version == RipVersion::V1 {
            for iface in &mut settings.interfaces {
                iface.compatibility = Compatibility::V1Only;
            }
        }
        let base = seed ^ (u64::from(node) << 32);
        Self {
            node,
            settings,
            table: RipTable::new(),
            state: RipState::Idle,
            triggered_scheduled: false,
            next_regular_update: Duration::ZERO,
            update_rng: StdRng::seed_from_u64(base.wrapping_add(1)),
            trigger_rng: StdRng::seed_from_u64(base.wrapping_add(2)),
            stats: RipStats::new(),
        }
    }

    pub fn version(&self) -> RipVersion {
        self.settings.version
    }

    pub fn settings(&self) -> &RipSettings {
        &self.settings
    }

    pub fn routes(&self) -> &[RipRoute] {
        self.table.routes()
    }

    pub fn route(&self, destination: Ipv4Addr) -> Option<&RipRoute> {
        self.table.get(destination)
    }

    pub fn next_regular_update(&self) -> Duration {
        self.next_regular_update
    }

    pub fn triggered_update_pending(&self) -> bool {
        self.triggered_scheduled
    }

    fn iface_settings(&self, index: usize) -> RipInterfaceSettings {
        self.settings
            .interfaces
            .get(index)
            .copied()
            .unwrap_or_default()
    }

    fn is_active(&self, iface: &Interface) -> bool {
        iface.enabled && self.iface_settings(iface.index).active
    }

    fn enter(&mut self, state: RipState) {
        assert!(
            self.state == RipState::Idle,
            "inconsistent RIP state at node {}: {:?} while handling {:?}",
            self.node,
            self.state,
            state
        );
        self.state = state;
    }

    fn leave(&mut self) {
        self.state = RipState::Idle;
    }

    /// Install the directly connected routes and schedule the initial
    /// whole-table request.
    pub fn start<S: Scheduler>(
        &mut self,
        interfaces: &[Interface],
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) {
        for iface in interfaces {
            if !self.iface_settings(iface.index).active {
                continue;
            }
            let (destination, mask, next_hop) = if iface.is_wired() {
                let mask = match self.settings.version {
                    RipVersion::V1 => classful_mask(iface.address),
                    RipVersion::V2 => iface.mask,
                };
                (iface.network(), mask, Ipv4Addr::UNSPECIFIED)
            } else {
                (iface.address, HOST_MASK, iface.address)
            };
            if self.table.get(destination).is_some() {
                continue;
            }
            let route = self.table.add(RipRoute::new(destination, mask, next_hop, 0, iface.index));
            route.changed = false;
            fib.add_route(Route::connected(destination, mask, iface.index));
        }

        let mut startup = StdRng::seed_from_u64(u64::from(self.node));
        let delay = jittered(&mut startup, STARTUP_DELAY, STARTUP_JITTER);
        scheduler.schedule(delay, TimerEvent::RipRequest);
        info!(node = self.node, routes = self.table.len(), "RIP started");
    }

    /// Dispatch a RIP timer event. Non-RIP events are ignored.
    pub fn handle_timer<S: Scheduler>(
        &mut self,
        event: &TimerEvent,
        interfaces: &[Interface],
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) -> Vec<RipDatagram> {
        match event {
            TimerEvent::RipRequest => {
                self.enter(RipState::HandleRequestAlarm);
                let out = self.request_alarm(interfaces, scheduler);
                self.leave();
                out
            }
            TimerEvent::RipRegularUpdate => {
                self.enter(RipState::HandleRegularUpdateAlarm);
                let out = self.regular_update(interfaces, scheduler);
                self.leave();
                out
            }
            TimerEvent::RipTriggeredUpdate => {
                self.enter(RipState::HandleTriggeredUpdateAlarm);
                let out = self.triggered_update(interfaces);
                self.leave();
                out
            }
            TimerEvent::RipRouteTimer { destination, kind } => {
                self.enter(RipState::HandleRouteTimerAlarm);
                self.route_timer(*destination, *kind, fib, scheduler);
                self.leave();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Process a datagram received on UDP port 520
    pub fn receive<S: Scheduler>(
        &mut self,
        datagram: &RipDatagram,
        interfaces: &[Interface],
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) -> Vec<RipDatagram> {
        self.enter(RipState::HandleFromTransport);
        let out = self.from_transport(datagram, interfaces, fib, scheduler);
        self.leave();
        out
    }

    fn from_transport<S: Scheduler>(
        &mut self,
        datagram: &RipDatagram,
        interfaces: &[Interface],
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) -> Vec<RipDatagram> {
        if is_own_address(interfaces, datagram.src) && datagram.dst == RIP_MULTICAST {
            return Vec::new();
        }
        let Some(iface) = interface(interfaces, datagram.interface) else {
            warn!(node = self.node, interface = datagram.interface, "RIP datagram on unknown interface");
            return Vec::new();
        };
        let packet = match RipPacket::parse(&datagram.payload) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(node = self.node, "dropping RIP datagram from {}: {}", datagram.src, e);
                self.stats.invalid_packets.inc();
                return Vec::new();
            }
        };
        match packet.command {
            RipCommand::Request => self.process_request(&packet, datagram.src, iface, fib),
            RipCommand::Response => {
                self.process_response(&packet, datagram.src, iface, interfaces, fib, scheduler);
                Vec::new()
            }
        }
    }

    fn process_request(
        &mut self,
        packet: &RipPacket,
        src: Ipv4Addr,
        iface: &Interface,
        fib: &mut dyn ForwardingTable,
    ) -> Vec<RipDatagram> {
        if packet.version == RipVersion::V1
            && self.iface_settings(iface.index).compatibility == Compatibility::V2Only
        {
            self.stats.invalid_packets.inc();
            return Vec::new();
        }
        if packet.entries.is_empty() || packet.entries.len() > MAX_RTES {
            self.stats.invalid_packets.inc();
            return Vec::new();
        }
        self.stats.requests_received.inc();

        if packet.entries.len() != 1 || !packet.entries[0].is_whole_table_request() {
            warn!(node = self.node, "RIP does not support diagnostic requests (from {})", src);
            return Vec::new();
        }

        if !iface.is_wired() {
            // No subnet route toward the requester on a shared medium
            fib.add_route(Route {
                destination: src,
                mask: HOST_MASK,
                next_hop: Some(src),
                interface: iface.index,
                metric: 0,
                source: RouteSource::Rip,
            });
        }
        let kind = if self.settings.version == RipVersion::V2 && packet.version == RipVersion::V1 {
            ResponseKind::RequestedCompatible { requester: src }
        } else {
            ResponseKind::Requested { requester: src }
        };
        self.build_responses(iface, kind)
    }

    fn process_response<S: Scheduler>(
        &mut self,
        packet: &RipPacket,
        src: Ipv4Addr,
        iface: &Interface,
        interfaces: &[Interface],
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) {
        if packet.entries.is_empty() || packet.entries.len() > MAX_RTES {
            self.stats.invalid_packets.inc();
            return;
        }
        if self.settings.version == RipVersion::V2 && packet.is_authenticated() {
            // Authenticated updates are not supported
            self.stats.invalid_packets.inc();
            return;
        }
        self.stats.responses_received.inc();

        let now = scheduler.now();
        let classless = self.settings.version == RipVersion::V2 && packet.version == RipVersion::V2;

        for rte in &packet.entries {
            if rte.is_authentication() || is_own_address(interfaces, rte.address) {
                continue;
            }

            let next_hop = if !rte.next_hop.is_unspecified()
                && self.table.get(rte.next_hop).is_some()
                && !in_different_major_network(rte.next_hop, iface.address)
                && iface.is_wired()
            {
                rte.next_hop
            } else {
                src
            };
            let (mask, tag) = if classless {
                (rte.mask, rte.tag)
            } else if iface.is_wired() {
                (classful_mask(rte.address), 0)
            } else {
                (HOST_MASK, 0)
            };
            let metric = rte.metric.min(INFINITY);

            let known = self.table.get(rte.address).map(|r| r.flushed);
            if known.is_none()
                && major_network(rte.address) == rte.address
                && self
                    .table
                    .routes()
                    .iter()
                    .any(|r| !in_different_major_network(rte.address, r.destination))
            {
                // Summary of a major network we are part of
                continue;
            }

            if known.is_none_or(|flushed| flushed) {
                if metric >= INFINITY {
                    continue;
                }
                let route = match self.table.get_mut(rte.address) {
                    Some(route) => {
                        route.next_hop = next_hop;
                        route.metric = metric;
                        route.outgoing = iface.index;
                        route.learned = iface.index;
                        route.changed = true;
                        route.flushed = false;
                        route
                    }
                    None => {
                        let route = self.table.add(RipRoute::new(
                            rte.address,
                            mask,
                            next_hop,
                            metric,
                            iface.index,
                        ));
                        route.tag = tag;
                        route
                    }
                };
                fib.add_route(learned_route(route));
                route.flush = Duration::ZERO;
                arm_timer(
                    &mut route.timeout,
                    route.destination,
                    RouteTimerKind::Timeout,
                    TIMEOUT_DELAY,
                    scheduler,
                );
                debug!(node = self.node, "RIP learned {} via {} metric {}", rte.address, next_hop, metric);
                self.schedule_triggered_update(scheduler);
                continue;
            }

            let Some(route) = self.table.get_mut(rte.address) else {
                continue;
            };
            let changed = (route.next_hop == src
                && (metric != route.metric || route.learned != iface.index))
                || metric < route.metric
                || (!route.timeout.is_zero()
                    && route.next_hop != next_hop
                    && metric != INFINITY
                    && metric == route.metric
                    && now + TIMEOUT_DELAY / 2 >= route.timeout);

            if changed {
                let mut update_fib = false;
                if route.metric != metric {
                    route.metric = metric;
                    update_fib = true;
                }
                if route.learned != iface.index {
                    route.learned = iface.index;
                    route.outgoing = iface.index;
                    update_fib = true;
                }
                if route.next_hop != next_hop {
                    route.next_hop = next_hop;
                    update_fib = true;
                }

                if route.is_reachable() {
                    if update_fib {
                        fib.add_route(learned_route(route));
                    }
                    route.flush = Duration::ZERO;
                    arm_timer(
                        &mut route.timeout,
                        route.destination,
                        RouteTimerKind::Timeout,
                        TIMEOUT_DELAY,
                        scheduler,
                    );
                } else {
                    fib.remove_route(route.destination, route.mask);
                    route.timeout = Duration::ZERO;
                    arm_timer(
                        &mut route.flush,
                        route.destination,
                        RouteTimerKind::Flush,
                        FLUSH_DELAY,
                        scheduler,
                    );
                }
                route.changed = true;
                self.schedule_triggered_update(scheduler);
            } else if route.next_hop == src && route.flush.is_zero() {
                arm_timer(
                    &mut route.timeout,
                    route.destination,
                    RouteTimerKind::Timeout,
                    TIMEOUT_DELAY,
                    scheduler,
                );
            }
        }
    }

    fn schedule_triggered_update<S: Scheduler>(&mut self, scheduler: &mut S) {
        let delay = jittered(&mut self.trigger_rng, TRIGGER_DELAY, TRIGGER_JITTER);
        if !self.triggered_scheduled && self.next_regular_update > scheduler.now() + delay {
            scheduler.schedule(delay, TimerEvent::RipTriggeredUpdate);
            self.triggered_scheduled = true;
        }
    }

    fn schedule_regular_update<S: Scheduler>(&mut self, scheduler: &mut S) {
        let delay = jittered(&mut self.update_rng, UPDATE_INTERVAL, UPDATE_JITTER);
        scheduler.schedule(delay, TimerEvent::RipRegularUpdate);
        self.next_regular_update = scheduler.now() + delay;
    }

    fn request_alarm<S: Scheduler>(
        &mut self,
        interfaces: &[Interface],
        scheduler: &mut S,
    ) -> Vec<RipDatagram> {
        let mut out = Vec::new();
        for iface in interfaces.iter().filter(|i| self.is_active(i)) {
            let compatibility = self.iface_settings(iface.index).compatibility;
            let version = if self.settings.version == RipVersion::V2
                && compatibility != Compatibility::V1Only
            {
                RipVersion::V2
            } else {
                RipVersion::V1
            };
            let dst = if compatibility == Compatibility::V2Only {
                RIP_MULTICAST
            } else if iface.is_wired() {
                iface.broadcast()
            } else {
                Ipv4Addr::BROADCAST
            };
            out.push(RipDatagram {
                interface: iface.index,
                src: iface.address,
                dst,
                payload: RipBuilder::request(version).build(),
            });
            self.stats.requests_sent.inc();
        }
        self.schedule_regular_update(scheduler);
        out
    }

    fn regular_update<S: Scheduler>(
        &mut self,
        interfaces: &[Interface],
        scheduler: &mut S,
    ) -> Vec<RipDatagram> {
        self.stats.regular_update_events.inc();
        let mut out = Vec::new();
        for iface in interfaces.iter().filter(|i| self.is_active(i)) {
            out.extend(self.build_responses(iface, ResponseKind::AllRoutes));
        }
        self.schedule_regular_update(scheduler);
        self.table.clear_changed();
        out
    }

    fn triggered_update(&mut self, interfaces: &[Interface]) -> Vec<RipDatagram> {
        self.stats.triggered_update_events.inc();
        let mut out = Vec::new();
        for iface in interfaces.iter().filter(|i| self.is_active(i)) {
            out.extend(self.build_responses(iface, ResponseKind::ChangedRoutes));
        }
        self.table.clear_changed();
        self.triggered_scheduled = false;
        out
    }

    fn build_responses(&self, iface: &Interface, kind: ResponseKind) -> Vec<RipDatagram> {
        let settings = self.iface_settings(iface.index);
        let version = if self.settings.version == RipVersion::V1
            || matches!(kind, ResponseKind::RequestedCompatible { .. })
            || settings.compatibility == Compatibility::V1Only
        {
            RipVersion::V1
        } else {
            RipVersion::V2
        };
        let dst = match kind {
            ResponseKind::Requested { requester }
            | ResponseKind::RequestedCompatible { requester } => requester,
            _ if settings.compatibility == Compatibility::V2Only => RIP_MULTICAST,
            _ if iface.is_wired() => iface.broadcast(),
            _ => Ipv4Addr::BROADCAST,
        };
        let split_medium = iface.is_wired() || iface.medium == Medium::Tunnel;
        let summarize = self.settings.border_router
            && settings.auto_summary
            && (self.settings.split_horizon == SplitHorizon::Off || !iface.is_wired());

        let routes = self.table.routes();
        let mut entries = Vec::new();
        for (index, route) in routes.iter().enumerate() {
            if route.flushed {
                continue;
            }
            let own_route = route.learned == iface.index && split_medium;
            if own_route && self.settings.split_horizon == SplitHorizon::Simple {
                continue;
            }
            if kind == ResponseKind::ChangedRoutes && !route.changed {
                continue;
            }

            let mut address = route.destination;
            let mut mask = route.mask;
            let mut metric = route.metric;
            if summarize && in_different_major_network(address, iface.address) {
                let covered = routes[..index].iter().any(|r| {
                    !r.flushed && !in_different_major_network(address, r.destination)
                });
                if covered {
                    continue;
                }
                metric = routes[index + 1..]
                    .iter()
                    .filter(|r| !in_different_major_network(address, r.destination))
                    .map(|r| r.metric)
                    .fold(metric, u32::min);
                address = major_network(address);
                mask = classful_mask(address);
            }

            let metric = if own_route && self.settings.split_horizon == SplitHorizon::PoisonedReverse {
                INFINITY
            } else {
                (metric + 1).min(INFINITY)
            };
            let rte = match version {
                RipVersion::V2 => {
                    let next_hop = if route.outgoing == iface.index {
                        route.next_hop
                    } else {
                        Ipv4Addr::UNSPECIFIED
                    };
                    Rte::route(address, mask, next_hop, metric, route.tag)
                }
                RipVersion::V1 => Rte::route(address, Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, metric, 0),
            };
            entries.push(rte);
        }

        let mut out = Vec::new();
        for chunk in entries.chunks(MAX_RTES) {
            let mut builder = RipBuilder::new(RipCommand::Response, version);
            for rte in chunk {
                builder.push(*rte);
            }
            out.push(RipDatagram {
                interface: iface.index,
                src: iface.address,
                dst,
                payload: builder.build(),
            });
            match kind {
                ResponseKind::ChangedRoutes => self.stats.triggered_packets_sent.inc(),
                ResponseKind::AllRoutes => self.stats.regular_packets_sent.inc(),
                _ => self.stats.request_responses_sent.inc(),
            }
        }
        out
    }

    fn route_timer<S: Scheduler>(
        &mut self,
        destination: Ipv4Addr,
        kind: RouteTimerKind,
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) {
        let now = scheduler.now();
        let Some(route) = self.table.get_mut(destination) else {
            panic!("RIP timer fired for unknown route {}", destination);
        };
        let deadline = match kind {
            RouteTimerKind::Timeout => route.timeout,
            RouteTimerKind::Flush => route.flush,
        };
        if deadline.is_zero() {
            return;
        }
        assert!(deadline >= now, "RIP route timer for {} in the past", destination);
        if deadline > now {
            scheduler.schedule(deadline - now, TimerEvent::RipRouteTimer { destination, kind });
            return;
        }

        match kind {
            RouteTimerKind::Timeout => {
                assert!(route.is_reachable(), "timed out RIP route {} already unreachable", destination);
                assert!(route.flush.is_zero(), "timed out RIP route {} has a flush pending", destination);
                self.stats.route_timeouts.inc();
                fib.remove_route(route.destination, route.mask);
                route.metric = INFINITY;
                route.changed = true;
                route.timeout = Duration::ZERO;
                arm_timer(&mut route.flush, destination, RouteTimerKind::Flush, FLUSH_DELAY, scheduler);
                debug!(node = self.node, "RIP route {} timed out", destination);
                self.schedule_triggered_update(scheduler);
            }
            RouteTimerKind::Flush => {
                assert!(!route.is_reachable(), "flushed RIP route {} still reachable", destination);
                assert!(route.timeout.is_zero(), "flushed RIP route {} has a timeout pending", destination);
                route.flushed = true;
                route.flush = Duration::ZERO;
                debug!(node = self.node, "RIP route {} flushed", destination);
            }
        }
    }

    /// React to an interface going down (`up == false`) or coming back
    pub fn interface_status<S: Scheduler>(
        &mut self,
        iface: &Interface,
        up: bool,
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) {
        if up {
            let network = if iface.is_wired() { iface.network() } else { iface.address };
            if let Some(route) = self.table.get_mut(network) {
                route.next_hop = if iface.is_wired() {
                    Ipv4Addr::UNSPECIFIED
                } else {
                    iface.address
                };
                route.outgoing = iface.index;
                route.learned = iface.index;
                route.metric = 0;
                route.changed = true;
                route.flushed = false;
                route.timeout = Duration::ZERO;
                route.flush = Duration::ZERO;
                fib.add_route(Route::connected(route.destination, route.mask, iface.index));
            }
            info!(node = self.node, interface = iface.index, "RIP interface up");
        } else {
            for route in self.table.iter_mut().filter(|r| r.outgoing == iface.index) {
                route.metric = INFINITY;
                route.changed = true;
                fib.remove_route(route.destination, route.mask);
                route.timeout = Duration::ZERO;
                arm_timer(
                    &mut route.flush,
                    route.destination,
                    RouteTimerKind::Flush,
                    FLUSH_DELAY,
                    scheduler,
                );
            }
            info!(node = self.node, interface = iface.index, "RIP interface down");
        }
        self.schedule_triggered_update(scheduler);
    }

    /// An interface received a new address
    pub fn address_changed<S: Scheduler>(
        &mut self,
        iface: &Interface,
        fib: &mut dyn ForwardingTable,
        scheduler: &mut S,
    ) {
        if self.table.get(iface.address).is_none() {
            let (mask, metric) = if iface.is_wired() {
                (iface.mask, 1)
            } else {
                (HOST_MASK, 0)
            };
            self.table
                .add(RipRoute::new(iface.address, mask, iface.address, metric, iface.index));
            fib.add_route(Route {
                metric,
                ..Route::connected(iface.address, mask, iface.index)
            });
        }
        self.schedule_triggered_update(scheduler);
    }

    /// Import a route from another routing source
    pub fn redistribute(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        next_hop: Ipv4Addr,
        interface: usize,
        cost: u32,
    ) {
        if let Some(route) = self.table.get_mut(destination) {
            if route.metric > cost {
                route.metric = cost;
                route.next_hop = next_hop;
                route.outgoing = interface;
                route.learned = interface;
                route.changed = true;
                route.flushed = false;
                route.timeout = Duration::ZERO;
                route.flush = Duration::ZERO;
            }
            return;
        }
        let route = self
            .table
            .add(RipRoute::new(destination, mask, next_hop, cost, interface));
        route.tag = match self.settings.version {
            RipVersion::V2 => 1,
            RipVersion::V1 => 0,
        };
        route.changed = false;
    }

    /// Route table dump
    pub fn show(&self) -> String {
        let mut out = format!(
            "RIP route table of node {} ({} routes)\n{:<16} {:<16} {:<16} {:>6} {:>5} {:>4} {:>7}\n",
            self.node,
            self.table.len(),
            "destination",
            "mask",
            "next hop",
            "metric",
            "tag",
            "out",
            "learned"
        );
        for route in self.table.routes() {
            out.push_str(&format!(
                "{:<16} {:<16} {:<16} {:>6} {:>5} {:>4} {:>7}{}\n",
                route.destination.to_string(),
                route.mask.to_string(),
                route.next_hop.to_string(),
                route.metric,
                route.tag,
                route.outgoing,
                route.learned,
                if route.flushed { " flushed" } else { "" }
            ));
        }
        out
    }
}
