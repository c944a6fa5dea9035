//! Statistics for the control-plane engines.
//!
//! Counters are atomic so a snapshot can be exported while a node keeps
//! running; the per-interface maps are owned by the engine that updates them.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Resets the counter to zero.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Why an access list dropped a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No rule matched (implicit deny)
    Mismatch,
    /// Explicit deny in a standard list
    StandardDeny,
    /// Explicit deny in an extended list
    ExtendedDeny,
}

/// Drop counters for one traffic direction.
#[derive(Debug, Default)]
pub struct DirectionDrops {
    pub mismatch: Counter,
    pub standard_deny: Counter,
    pub extended_deny: Counter,
}

impl DirectionDrops {
    fn record(&self, reason: DropReason) {
        match reason {
            DropReason::Mismatch => self.mismatch.inc(),
            DropReason::StandardDeny => self.standard_deny.inc(),
            DropReason::ExtendedDeny => self.extended_deny.inc(),
        }
    }

    pub fn total(&self) -> u64 {
        self.mismatch.get() + self.standard_deny.get() + self.extended_deny.get()
    }
}

/// Access-list drops on one interface.
#[derive(Debug, Default)]
pub struct AclInterfaceStats {
    pub inbound: DirectionDrops,
    pub outbound: DirectionDrops,
}

/// Access-list statistics of a node.
#[derive(Debug, Default)]
pub struct AclStats {
    interfaces: BTreeMap<usize, AclInterfaceStats>,
}

impl AclStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a drop on `interface`; `inbound` selects the direction.
    pub fn record_drop(&mut self, interface: usize, inbound: bool, reason: DropReason) {
        let stats = self.interfaces.entry(interface).or_default();
        if inbound {
            stats.inbound.record(reason);
        } else {
            stats.outbound.record(reason);
        }
    }

    pub fn interface(&self, interface: usize) -> Option<&AclInterfaceStats> {
        self.interfaces.get(&interface)
    }

    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = Vec::new();
        for (index, stats) in &self.interfaces {
            for (dir, drops) in [("in", &stats.inbound), ("out", &stats.outbound)] {
                result.extend([
                    (
                        format!("acl_if{}_{}_mismatch_drops", index, dir),
                        drops.mismatch.get(),
                    ),
                    (
                        format!("acl_if{}_{}_standard_deny_drops", index, dir),
                        drops.standard_deny.get(),
                    ),
                    (
                        format!("acl_if{}_{}_extended_deny_drops", index, dir),
                        drops.extended_deny.get(),
                    ),
                ]);
            }
        }
        result
    }
}

/// Routed / not routed pair for one binding point.
#[derive(Debug, Default)]
pub struct PbrBindingStats {
    pub routed: Counter,
    pub not_routed: Counter,
}

/// Policy routing statistics of a node.
#[derive(Debug, Default)]
pub struct PbrStats {
    pub local: PbrBindingStats,
    interfaces: BTreeMap<usize, PbrBindingStats>,
    /// Packets whose precedence was rewritten
    pub precedence_set: Counter,
}

impl PbrStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding stats for an interface, or the local binding for `None`.
    pub fn binding(&mut self, interface: Option<usize>) -> &PbrBindingStats {
        match interface {
            Some(index) => self.interfaces.entry(index).or_default(),
            None => &self.local,
        }
    }

    pub fn interface(&self, interface: usize) -> Option<&PbrBindingStats> {
        self.interfaces.get(&interface)
    }

    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("pbr_local_routed".into(), self.local.routed.get()),
            ("pbr_local_not_routed".into(), self.local.not_routed.get()),
            ("pbr_precedence_set".into(), self.precedence_set.get()),
        ];
        for (index, stats) in &self.interfaces {
            result.extend([
                (format!("pbr_if{}_routed", index), stats.routed.get()),
                (format!("pbr_if{}_not_routed", index), stats.not_routed.get()),
            ]);
        }
        result
    }
}

/// RIP protocol counters.
#[derive(Debug, Default)]
pub struct RipStats {
    pub regular_update_events: Counter,
    pub triggered_update_events: Counter,
    pub route_timeouts: Counter,
    pub requests_sent: Counter,
    pub requests_received: Counter,
    pub invalid_packets: Counter,
    pub responses_received: Counter,
    pub regular_packets_sent: Counter,
    pub triggered_packets_sent: Counter,
    pub request_responses_sent: Counter,
}

impl RipStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export(&self) -> Vec<(String, u64)> {
        vec![
            ("rip_regular_update_events".into(), self.regular_update_events.get()),
            ("rip_triggered_update_events".into(), self.triggered_update_events.get()),
            ("rip_route_timeouts".into(), self.route_timeouts.get()),
            ("rip_requests_sent".into(), self.requests_sent.get()),
            ("rip_requests_received".into(), self.requests_received.get()),
            ("rip_invalid_packets".into(), self.invalid_packets.get()),
            ("rip_responses_received".into(), self.responses_received.get()),
            ("rip_regular_packets_sent".into(), self.regular_packets_sent.get()),
            ("rip_triggered_packets_sent".into(), self.triggered_packets_sent.get()),
            ("rip_request_responses_sent".into(), self.request_responses_sent.get()),
        ]
    }
}
