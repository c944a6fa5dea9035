//! Reflexive access-list sessions
//!
//! A session is opened when a `reflect`-flagged permit rule sees a new
//! connection from an attached network. It owns one dynamic rule mirroring
//! the triggering packet; the rule lives in the reflexive list named by the
//! `reflect` clause and is evaluated wherever that list is nested with
//! `evaluate`.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use super::acl::RuleId;

/// Default idle timeout of a reflexive session
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Largest accepted reflexive timeout in seconds
pub const MAX_TIMEOUT_SECS: u64 = 2_147_483;

/// Grace period after the second FIN
pub const FIN_GRACE: Duration = Duration::from_secs(5);

/// Slot of a session plus the number of times that slot was reused, so a
/// timer armed for an earlier occupant never reaches the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId {
    pub slot: usize,
    pub generation: u32,
}

/// Exact connection identity (ports are zero for portless protocols)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiveTuple {
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FiveTuple {
    pub fn reversed(&self) -> Self {
        Self {
            protocol: self.protocol,
            src: self.dst,
            dst: self.src,
            src_port: self.dst_port,
            dst_port: self.src_port,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReflexiveSession {
    pub id: SessionId,
    /// Reflexive list holding the dynamic rule
    pub list: String,
    /// Direction of the packet that opened the session
    pub forward: FiveTuple,
    pub rule: RuleId,
    pub timeout: Duration,
    pub last_packet_sent: Duration,
    pub fin_count: u8,
    pub removed: bool,
}

/// Result of checking a session against its idle timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCheck {
    AlreadyRemoved,
    Expired,
    /// Still active; re-check after this much time
    Remaining(Duration),
}

/// Session records plus the dynamic rules of each reflexive list.
/// A removed session keeps its slot until the next open reuses it.
#[derive(Debug, Default)]
pub struct ReflexiveTable {
    sessions: Vec<ReflexiveSession>,
    free: Vec<usize>,
    lists: HashMap<String, Vec<RuleId>>,
    names: Vec<String>,
}

fn list_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl ReflexiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live session opened by exactly this forward tuple
    pub fn find(&self, tuple: &FiveTuple) -> Option<SessionId> {
        self.sessions
            .iter()
            .find(|s| !s.removed && s.forward == *tuple)
            .map(|s| s.id)
    }

    pub fn open(
        &mut self,
        list: &str,
        forward: FiveTuple,
        rule: RuleId,
        timeout: Duration,
        now: Duration,
    ) -> SessionId {
        let id = match self.free.pop() {
            Some(slot) => SessionId {
                slot,
                generation: self.sessions[slot].id.generation.wrapping_add(1),
            },
            None => SessionId {
                slot: self.sessions.len(),
                generation: 0,
            },
        };
        let session = ReflexiveSession {
            id,
            list: list.to_string(),
            forward,
            rule,
            timeout,
            last_packet_sent: now,
            fin_count: 0,
            removed: false,
        };
        if id.slot == self.sessions.len() {
            self.sessions.push(session);
        } else {
            self.sessions[id.slot] = session;
        }

        let key = list_key(list);
        if !self.names.iter().any(|n| list_key(n) == key) {
            self.names.push(list.to_string());
        }
        self.lists.entry(key).or_default().push(rule);
        id
    }

    /// The session in `id`'s slot. A stale id yields the slot's current
    /// occupant; use [`ReflexiveTable::is_live`] to tell them apart.
    pub fn session(&self, id: SessionId) -> &ReflexiveSession {
        match self.sessions.get(id.slot) {
            Some(session) => session,
            None => panic!("reflexive session {:?} does not exist", id),
        }
    }

    fn session_mut(&mut self, id: SessionId) -> &mut ReflexiveSession {
        match self.sessions.get_mut(id.slot) {
            Some(session) => session,
            None => panic!("reflexive session {:?} does not exist", id),
        }
    }

    /// True while `id` names an open session
    pub fn is_live(&self, id: SessionId) -> bool {
        self.sessions
            .get(id.slot)
            .is_some_and(|s| s.id == id && !s.removed)
    }

    pub fn touch(&mut self, id: SessionId, now: Duration) {
        self.session_mut(id).last_packet_sent = now;
    }

    /// Count a FIN; true exactly when this is the second one
    pub fn note_fin(&mut self, id: SessionId) -> bool {
        let session = self.session_mut(id);
        session.fin_count = session.fin_count.saturating_add(1);
        session.fin_count == 2
    }

    pub fn check_timeout(&self, id: SessionId, now: Duration) -> TimeoutCheck {
        if !self.is_live(id) {
            return TimeoutCheck::AlreadyRemoved;
        }
        let session = self.session(id);
        let expiry = session.last_packet_sent + session.timeout;
        if now >= expiry {
            TimeoutCheck::Expired
        } else {
            TimeoutCheck::Remaining(expiry - now)
        }
    }

    /// Mark the session removed in both directions, detach its rule and
    /// release the slot. Returns the rule to free, or `None` if the
    /// session was already removed.
    pub fn close(&mut self, id: SessionId) -> Option<RuleId> {
        if !self.is_live(id) {
            return None;
        }
        let session = self.session_mut(id);
        session.removed = true;
        let rule = session.rule;
        let key = list_key(&session.list);
        if let Some(rules) = self.lists.get_mut(&key) {
            rules.retain(|r| *r != rule);
        }
        self.free.push(id.slot);
        Some(rule)
    }

    /// Dynamic rules currently held by a reflexive list
    pub fn rules_of(&self, list: &str) -> &[RuleId] {
        self.lists
            .get(&list_key(list))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names of reflexive lists that have held rules
    pub fn list_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = &ReflexiveSession> {
        self.sessions.iter().filter(|s| !s.removed)
    }

    /// Session slots allocated so far, open or not
    pub fn slots(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple() -> FiveTuple {
        FiveTuple {
            protocol: 6,
            src: Ipv4Addr::new(10, 0, 1, 2),
            dst: Ipv4Addr::new(20, 0, 0, 5),
            src_port: 40000,
            dst_port: 80,
        }
    }

    #[test]
    fn test_open_find_close() {
        let mut table = ReflexiveTable::new();
        let id = table.open("Mirror", tuple(), RuleId(3), DEFAULT_TIMEOUT, Duration::ZERO);

        assert_eq!(table.find(&tuple()), Some(id));
        assert_eq!(table.find(&tuple().reversed()), None);
        assert_eq!(table.rules_of("mirror"), &[RuleId(3)]);

        assert_eq!(table.close(id), Some(RuleId(3)));
        assert!(table.rules_of("mirror").is_empty());
        assert_eq!(table.find(&tuple()), None);
        // Second close is a no-op
        assert_eq!(table.close(id), None);
        assert_eq!(table.check_timeout(id, Duration::ZERO), TimeoutCheck::AlreadyRemoved);
    }

    #[test]
    fn test_timeout_rearms_for_remainder() {
        let mut table = ReflexiveTable::new();
        let id = table.open("m", tuple(), RuleId(0), Duration::from_secs(10), Duration::ZERO);
        table.touch(id, Duration::from_secs(4));

        assert_eq!(
            table.check_timeout(id, Duration::from_secs(10)),
            TimeoutCheck::Remaining(Duration::from_secs(4))
        );
        assert_eq!(table.check_timeout(id, Duration::from_secs(14)), TimeoutCheck::Expired);
    }

    #[test]
    fn test_second_fin_detected_once() {
        let mut table = ReflexiveTable::new();
        let id = table.open("m", tuple(), RuleId(0), DEFAULT_TIMEOUT, Duration::ZERO);
        assert!(!table.note_fin(id));
        assert!(table.note_fin(id));
        assert!(!table.note_fin(id));
    }

    #[test]
    fn test_closed_slots_are_reused() {
        let mut table = ReflexiveTable::new();
        let first = table.open("m", tuple(), RuleId(0), DEFAULT_TIMEOUT, Duration::ZERO);
        for n in 1..100 {
            let id = table.open("m", tuple().reversed(), RuleId(n), DEFAULT_TIMEOUT, Duration::ZERO);
            assert_eq!(table.close(id), Some(RuleId(n)));
        }
        assert_eq!(table.slots(), 2);
        assert_eq!(table.active_sessions().count(), 1);
        assert_eq!(table.list_names().collect::<Vec<_>>(), vec!["m"]);
        assert!(table.is_live(first));
    }

    #[test]
    fn test_stale_id_does_not_reach_new_session() {
        let mut table = ReflexiveTable::new();
        let old = table.open("m", tuple(), RuleId(0), Duration::from_secs(10), Duration::ZERO);
        table.close(old);
        let new = table.open("m", tuple(), RuleId(1), Duration::from_secs(10), Duration::ZERO);
        assert_eq!(new.slot, old.slot);
        assert_ne!(new, old);

        assert_eq!(table.check_timeout(old, Duration::from_secs(30)), TimeoutCheck::AlreadyRemoved);
        assert_eq!(table.close(old), None);
        assert!(table.is_live(new));
        assert_eq!(table.find(&tuple()), Some(new));
        assert_eq!(table.rules_of("m"), &[RuleId(1)]);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_unknown_session_panics() {
        let table = ReflexiveTable::new();
        table.session(SessionId {
            slot: 7,
            generation: 0,
        });
    }
}
