//! Discrete-event scheduling
//!
//! Engines never sleep: they ask a [`Scheduler`] to deliver a
//! [`TimerEvent`] after a delay and revalidate their own state when it fires.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::acl::RuleId;
use super::reflexive::SessionId;

/// Which per-route timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTimerKind {
    Timeout,
    Flush,
}

/// Timer events understood by the node dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    RipRequest,
    RipRegularUpdate,
    RipTriggeredUpdate,
    RipRouteTimer {
        destination: Ipv4Addr,
        kind: RouteTimerKind,
    },
    /// Periodic packet-count report of a logging access-list rule
    AclLog { rule: RuleId },
    ReflexiveTimeout { session: SessionId },
    /// Grace period after the second FIN of a reflexive TCP session
    ReflexiveFinGrace { session: SessionId },
}

/// Simulated clock plus event submission
pub trait Scheduler {
    /// Current simulation time since start
    fn now(&self) -> Duration;

    /// Deliver `event` after `delay`
    fn schedule(&mut self, delay: Duration, event: TimerEvent);
}

#[derive(Debug)]
struct Scheduled {
    at: Duration,
    seq: u64,
    event: TimerEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Priority queue of pending events; ties fire in submission order
#[derive(Debug, Default)]
pub struct EventQueue {
    now: Duration,
    seq: u64,
    pending: BinaryHeap<Reverse<Scheduled>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the earliest pending event
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.peek().map(|Reverse(s)| s.at)
    }

    /// Pop the earliest event due at or before `until`, advancing the clock
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerEvent> {
        if self.next_deadline()? > until {
            return None;
        }
        let Reverse(scheduled) = self.pending.pop()?;
        self.now = scheduled.at;
        Some(scheduled.event)
    }

    /// Move the clock forward without firing anything
    pub fn advance_to(&mut self, at: Duration) {
        assert!(at >= self.now, "clock moved backwards: {:?} < {:?}", at, self.now);
        self.now = at;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending events, earliest first (diagnostics and tests)
    pub fn pending(&self) -> Vec<(Duration, TimerEvent)> {
        let mut events: Vec<_> = self
            .pending
            .iter()
            .map(|Reverse(s)| (s.at, s.seq, s.event.clone()))
            .collect();
        events.sort_by_key(|(at, seq, _)| (*at, *seq));
        events.into_iter().map(|(at, _, event)| (at, event)).collect()
    }
}

impl Scheduler for EventQueue {
    fn now(&self) -> Duration {
        self.now
    }

    fn schedule(&mut self, delay: Duration, event: TimerEvent) {
        self.seq += 1;
        self.pending.push(Reverse(Scheduled {
            at: self.now + delay,
            seq: self.seq,
            event,
        }));
    }
}
