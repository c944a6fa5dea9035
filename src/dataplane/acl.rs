//! Access control lists
//!
//! Numbered (1..199) and named rule chains evaluated first-match-wins with
//! tri-state field matching. Rules live in one arena and lists refer to them
//! by [`RuleId`]; a named list may nest a reflexive list with `evaluate`,
//! whose dynamic rules are then evaluated at that position.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::address_match::{
    combine, match_address, match_scalar, MatchResult, PortMatch, PortOperator,
};
use super::interface::{is_attached, is_own_address, Interface};
use super::reflexive::{
    FiveTuple, ReflexiveTable, SessionId, TimeoutCheck, DEFAULT_TIMEOUT, FIN_GRACE,
};
use super::timer::{Scheduler, TimerEvent};
use crate::protocol::icmp::{IcmpHeader, IgmpHeader};
use crate::protocol::ipv4::{proto, Ipv4Header, PRECEDENCE_SHIFT};
use crate::protocol::tcp::{TcpFlags, TcpHeader};
use crate::protocol::udp;
use crate::telemetry::{AclStats, DropReason, TraceWriter};
use crate::{Error, Result};

/// Highest numbered access list
pub const MAX_NUMBERED: u16 = 199;

/// Highest standard numbered access list
pub const MAX_STANDARD: u16 = 99;

/// Interval between log reports of a logging rule
pub const LOG_INTERVAL: Duration = Duration::from_secs(300);

/// Longest accepted remark
pub const MAX_REMARK_LEN: usize = 100;

/// Index of a rule in the engine's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

/// Identity of an access list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AclId {
    Number(u16),
    Name(String),
}

impl AclId {
    /// Numbers in 1..199 are numbered lists, anything else is a name
    pub fn parse(token: &str) -> Result<Self> {
        match token.parse::<i64>() {
            Ok(n) if (1..=i64::from(MAX_NUMBERED)).contains(&n) => Ok(AclId::Number(n as u16)),
            Ok(n) => Err(Error::Config(format!(
                "access list number {} outside 1..{}",
                n, MAX_NUMBERED
            ))),
            Err(_) => Ok(AclId::Name(token.to_string())),
        }
    }

    /// Kind implied by a list number; named lists declare their own
    pub fn numbered_kind(&self) -> Option<ListKind> {
        match self {
            AclId::Number(n) if *n <= MAX_STANDARD => Some(ListKind::Standard),
            AclId::Number(_) => Some(ListKind::Extended),
            AclId::Name(_) => None,
        }
    }

    fn key(&self) -> String {
        match self {
            AclId::Number(n) => n.to_string(),
            AclId::Name(name) => name.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for AclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclId::Number(n) => write!(f, "{}", n),
            AclId::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Permit,
    Deny,
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterType::Permit => "permit",
            FilterType::Deny => "deny",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Source address only
    Standard,
    Extended,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogMode {
    #[default]
    None,
    Log,
    /// Log including the receiving interface
    LogInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        })
    }
}

/// Outcome of filtering a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Drop,
}

/// Protocol-specific rule criteria
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProtocolParams {
    #[default]
    None,
    /// TCP or UDP ports; `established` only applies to TCP
    Ports {
        src: PortMatch,
        dst: PortMatch,
        established: bool,
    },
    /// ICMP type and code, -1 when unset
    Icmp { icmp_type: i32, code: i32 },
    /// IGMP message type
    Igmp { igmp_type: i32 },
}

/// `reflect` clause of a static rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectSpec {
    pub name: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessListRule {
    pub list: AclId,
    pub kind: ListKind,
    pub filter: FilterType,
    /// 0 matches any protocol
    pub protocol: u8,
    pub src_addr: Ipv4Addr,
    pub src_wildcard: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub dst_wildcard: Ipv4Addr,
    pub params: ProtocolParams,
    /// -1 when unset
    pub precedence: i32,
    /// -1 when unset
    pub tos: i32,
    pub log: LogMode,
    pub reflect: Option<ReflectSpec>,
    /// Session owning this rule when it was created dynamically
    pub session: Option<SessionId>,
    pub freed: bool,
    pub hits: u64,
    log_packets: u64,
    log_timer_on: bool,
}

/// All-wildcard address
pub const ANY_WILDCARD: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

impl AccessListRule {
    /// Rule matching any packet; callers fill in the criteria
    pub fn new(list: AclId, kind: ListKind, filter: FilterType) -> Self {
        Self {
            list,
            kind,
            filter,
            protocol: proto::ANY,
            src_addr: Ipv4Addr::UNSPECIFIED,
            src_wildcard: ANY_WILDCARD,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            dst_wildcard: ANY_WILDCARD,
            params: ProtocolParams::None,
            precedence: -1,
            tos: -1,
            log: LogMode::None,
            reflect: None,
            session: None,
            freed: false,
            hits: 0,
            log_packets: 0,
            log_timer_on: false,
        }
    }

    /// Tri-state evaluation against a classified packet
    pub fn evaluate(&self, packet: &AclPacket) -> MatchResult {
        if self.protocol != proto::ANY && self.protocol != packet.protocol {
            return MatchResult::NoMatch;
        }

        let mut results = vec![match_address(self.src_addr, self.src_wildcard, packet.src)];

        if self.kind == ListKind::Extended {
            results.push(match_address(self.dst_addr, self.dst_wildcard, packet.dst));
            results.push(match_scalar(self.tos, i32::from(packet.tos_bits())));
            results.push(match_scalar(self.precedence, i32::from(packet.precedence())));
        }

        match (self.protocol, &self.params) {
            (
                proto::TCP,
                ProtocolParams::Ports {
                    src,
                    dst,
                    established,
                },
            ) => {
                if *established {
                    results.push(if packet.tcp_flags.is_established() {
                        MatchResult::Match
                    } else {
                        MatchResult::NoMatch
                    });
                }
                results.push(src.matches(packet.src_port));
                results.push(dst.matches(packet.dst_port));
            }
            (proto::UDP, ProtocolParams::Ports { src, dst, .. }) => {
                results.push(src.matches(packet.src_port));
                results.push(dst.matches(packet.dst_port));
            }
            (proto::ICMP, ProtocolParams::Icmp { icmp_type, code }) => {
                results.push(match_scalar(*icmp_type, i32::from(packet.icmp_type)));
                results.push(match_scalar(*code, i32::from(packet.icmp_code)));
            }
            (proto::IGMP, ProtocolParams::Igmp { igmp_type }) => {
                results.push(match_scalar(*igmp_type, i32::from(packet.igmp_type)));
            }
            _ => {}
        }

        combine(results)
    }

    pub fn matches(&self, packet: &AclPacket) -> bool {
        self.evaluate(packet).is_satisfied()
    }
}

fn fmt_address(f: &mut fmt::Formatter<'_>, addr: Ipv4Addr, wildcard: Ipv4Addr) -> fmt::Result {
    if u32::from(addr) & !u32::from(wildcard) == 0 {
        f.write_str(" any")
    } else if wildcard == Ipv4Addr::UNSPECIFIED {
        write!(f, " host {}", addr)
    } else {
        write!(f, " {} {}", addr, wildcard)
    }
}

fn fmt_port(f: &mut fmt::Formatter<'_>, port: &PortMatch) -> fmt::Result {
    if port.port == 0 {
        return Ok(());
    }
    match port.operator {
        PortOperator::Range => {
            write!(f, " range {} {}", port.port, port.max_port)
        }
        op => write!(f, " {} {}", op.as_str(), port.port),
    }
}

impl fmt::Display for AccessListRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filter)?;
        if self.kind == ListKind::Extended {
            match self.protocol {
                proto::ANY => f.write_str(" ip")?,
                proto::ICMP => f.write_str(" icmp")?,
                proto::IGMP => f.write_str(" igmp")?,
                proto::TCP => f.write_str(" tcp")?,
                proto::UDP => f.write_str(" udp")?,
                other => write!(f, " {}", other)?,
            }
        }
        fmt_address(f, self.src_addr, self.src_wildcard)?;
        if let ProtocolParams::Ports { src, .. } = &self.params {
            fmt_port(f, src)?;
        }
        if self.kind == ListKind::Extended {
            fmt_address(f, self.dst_addr, self.dst_wildcard)?;
        }
        match &self.params {
            ProtocolParams::Ports {
                dst, established, ..
            } => {
                fmt_port(f, dst)?;
                if *established {
                    f.write_str(" established")?;
                }
            }
            ProtocolParams::Icmp { icmp_type, code } if *icmp_type >= 0 => {
                write!(f, " {}", icmp_type)?;
                if *code >= 0 {
                    write!(f, " {}", code)?;
                }
            }
            ProtocolParams::Igmp { igmp_type } if *igmp_type >= 0 => {
                write!(f, " {}", igmp_type)?;
            }
            _ => {}
        }
        if self.precedence >= 0 {
            write!(f, " precedence {}", self.precedence)?;
        }
        if self.tos >= 0 {
            write!(f, " tos {}", self.tos)?;
        }
        match self.log {
            LogMode::None => {}
            LogMode::Log => f.write_str(" log")?,
            LogMode::LogInput => f.write_str(" log-input")?,
        }
        if let Some(reflect) = &self.reflect {
            write!(f, " reflect {}", reflect.name)?;
            if let Some(timeout) = reflect.timeout {
                write!(f, " timeout {}", timeout.as_secs())?;
            }
        }
        Ok(())
    }
}

/// Fields of an IPv4 packet the access lists look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclPacket {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: u8,
    pub tos: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: TcpFlags,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub igmp_type: u8,
}

impl AclPacket {
    /// Classify raw IPv4 bytes; truncated transport headers leave their
    /// fields zero.
    pub fn from_ipv4(data: &[u8]) -> Result<Self> {
        let header = Ipv4Header::parse(data)?;
        let mut packet = Self {
            src: header.src_addr(),
            dst: header.dst_addr(),
            protocol: header.protocol(),
            tos: header.tos(),
            src_port: 0,
            dst_port: 0,
            tcp_flags: TcpFlags::default(),
            icmp_type: 0,
            icmp_code: 0,
            igmp_type: 0,
        };

        let payload = header.payload();
        match packet.protocol {
            proto::TCP => {
                if let Ok(tcp) = TcpHeader::parse(payload) {
                    packet.src_port = tcp.src_port();
                    packet.dst_port = tcp.dst_port();
                    packet.tcp_flags = tcp.flags();
                }
            }
            proto::UDP => {
                if let Ok((src_port, dst_port)) = udp::ports(payload) {
                    packet.src_port = src_port;
                    packet.dst_port = dst_port;
                }
            }
            proto::ICMP => {
                if let Ok(icmp) = IcmpHeader::parse(payload) {
                    packet.icmp_type = icmp.icmp_type();
                    packet.icmp_code = icmp.code();
                }
            }
            proto::IGMP => {
                if let Ok(igmp) = IgmpHeader::parse(payload) {
                    packet.igmp_type = igmp.igmp_type();
                }
            }
            _ => {}
        }

        Ok(packet)
    }

    pub fn precedence(&self) -> u8 {
        self.tos >> PRECEDENCE_SHIFT
    }

    /// Four type-of-service bits between precedence and the reserved bit
    pub fn tos_bits(&self) -> u8 {
        (self.tos >> 1) & 0x0F
    }

    pub fn five_tuple(&self) -> FiveTuple {
        FiveTuple {
            protocol: self.protocol,
            src: self.src,
            dst: self.dst,
            src_port: self.src_port,
            dst_port: self.dst_port,
        }
    }
}

/// Entry of a list: a rule, or the nesting point of a reflexive list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    Rule(RuleId),
    Evaluate(String),
}

#[derive(Debug, Clone)]
pub struct AccessList {
    pub id: AclId,
    pub kind: ListKind,
    pub entries: Vec<ListEntry>,
    pub remarks: Vec<String>,
    pub freed: bool,
}

impl AccessList {
    fn new(id: AclId, kind: ListKind) -> Self {
        Self {
            id,
            kind,
            entries: Vec::new(),
            remarks: Vec::new(),
            freed: false,
        }
    }
}

/// Lists applied to one interface
#[derive(Debug, Clone, Default)]
pub struct InterfaceBinding {
    pub inbound: Vec<AclId>,
    pub outbound: Vec<AclId>,
}

enum ChainOutcome {
    Matched(RuleId),
    NoMatch,
    Undefined(AclId),
}

/// Per-node access list state
#[derive(Debug)]
pub struct AccessListEngine {
    node: u32,
    rules: Vec<AccessListRule>,
    /// Slots of freed reflexive mirror rules, reused by the next session
    free_mirrors: Vec<RuleId>,
    numbered: Vec<Option<AccessList>>,
    named: HashMap<String, AccessList>,
    reflexive: ReflexiveTable,
    bindings: BTreeMap<usize, InterfaceBinding>,
    reflexive_timeout: Option<Duration>,
    pub stats: AclStats,
    trace: Option<TraceWriter>,
}

impl AccessListEngine {
    pub fn new(node: u32) -> Self {
        Self {
            node,
            rules: Vec::new(),
            free_mirrors: Vec::new(),
            numbered: vec![None; usize::from(MAX_NUMBERED)],
            named: HashMap::new(),
            reflexive: ReflexiveTable::new(),
            bindings: BTreeMap::new(),
            reflexive_timeout: None,
            stats: AclStats::new(),
            trace: None,
        }
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    pub fn set_trace(&mut self, trace: Option<TraceWriter>) {
        self.trace = trace;
    }

    /// Global `ip reflexive-list timeout`
    pub fn set_reflexive_timeout(&mut self, timeout: Duration) {
        self.reflexive_timeout = Some(timeout);
    }

    pub fn reflexive(&self) -> &ReflexiveTable {
        &self.reflexive
    }

    pub fn rule(&self, id: RuleId) -> &AccessListRule {
        match self.rules.get(id.0) {
            Some(rule) => rule,
            None => panic!("access list rule {:?} does not exist", id),
        }
    }

    fn rule_mut(&mut self, id: RuleId) -> &mut AccessListRule {
        match self.rules.get_mut(id.0) {
            Some(rule) => rule,
            None => panic!("access list rule {:?} does not exist", id),
        }
    }

    /// Defined, not removed list
    pub fn list(&self, id: &AclId) -> Option<&AccessList> {
        let list = match id {
            AclId::Number(n) => self.numbered.get(usize::from(*n).checked_sub(1)?)?.as_ref(),
            AclId::Name(_) => self.named.get(&id.key()),
        }?;
        (!list.freed).then_some(list)
    }

    fn list_slot(&mut self, id: &AclId) -> Option<&mut Option<AccessList>> {
        match id {
            AclId::Number(n) => self.numbered.get_mut(usize::from(*n).checked_sub(1)?),
            AclId::Name(_) => None,
        }
    }

    /// Get or create a live list. A removed list is replaced by a fresh one.
    fn list_for_update(&mut self, id: &AclId, kind: ListKind) -> Result<&mut AccessList> {
        let fresh = AccessList::new(id.clone(), kind);
        let list = match id {
            AclId::Number(_) => {
                let slot = self
                    .list_slot(id)
                    .ok_or_else(|| Error::Config(format!("invalid access list {}", id)))?;
                if slot.as_ref().is_none_or(|l| l.freed) {
                    *slot = Some(fresh);
                }
                slot.as_mut()
                    .ok_or_else(|| Error::Config(format!("invalid access list {}", id)))?
            }
            AclId::Name(_) => {
                let entry = self.named.entry(id.key()).or_insert_with(|| fresh.clone());
                if entry.freed {
                    *entry = fresh;
                }
                entry
            }
        };
        if list.kind != kind {
            return Err(Error::Config(format!(
                "access list {} already defined as {:?}",
                id, list.kind
            )));
        }
        Ok(list)
    }

    /// Declare a named list (`ip access-list standard|extended NAME`)
    pub fn declare_named(&mut self, name: &str, kind: ListKind) -> Result<()> {
        self.list_for_update(&AclId::Name(name.to_string()), kind)
            .map(|_| ())
    }

    /// Append a rule to the end of its list
    pub fn add_rule(&mut self, rule: AccessListRule) -> Result<RuleId> {
        if let Some(reflect) = &rule.reflect {
            if rule.kind != ListKind::Extended
                || rule.filter != FilterType::Permit
                || matches!(rule.list, AclId::Number(_))
            {
                return Err(Error::Config(format!(
                    "reflect {} allowed only in permit rules of named extended lists",
                    reflect.name
                )));
            }
        }

        let id = RuleId(self.rules.len());
        let list_id = rule.list.clone();
        let kind = rule.kind;
        self.list_for_update(&list_id, kind)?
            .entries
            .push(ListEntry::Rule(id));
        self.rules.push(rule);
        Ok(id)
    }

    /// `evaluate NAME` inside a named list
    pub fn add_evaluate(&mut self, list: &AclId, reflexive: &str) -> Result<()> {
        let kind = self
            .list(list)
            .map(|l| l.kind)
            .ok_or_else(|| Error::Config(format!("evaluate outside of a defined list {}", list)))?;
        if kind != ListKind::Extended || matches!(list, AclId::Number(_)) {
            return Err(Error::Config(format!(
                "evaluate {} allowed only in named extended lists",
                reflexive
            )));
        }
        self.list_for_update(list, kind)?
            .entries
            .push(ListEntry::Evaluate(reflexive.to_string()));
        Ok(())
    }

    pub fn add_remark(&mut self, list: &AclId, kind: ListKind, text: &str) -> Result<()> {
        if text.len() > MAX_REMARK_LEN {
            return Err(Error::Config(format!(
                "remark longer than {} characters",
                MAX_REMARK_LEN
            )));
        }
        self.list_for_update(list, kind)?
            .remarks
            .push(text.to_string());
        Ok(())
    }

    /// Free every rule of a list; filtering then treats it as undefined
    pub fn remove_list(&mut self, id: &AclId) -> bool {
        let rule_ids: Vec<RuleId> = match self.list(id) {
            Some(list) => list
                .entries
                .iter()
                .filter_map(|e| match e {
                    ListEntry::Rule(r) => Some(*r),
                    ListEntry::Evaluate(_) => None,
                })
                .collect(),
            None => return false,
        };
        for rule in rule_ids {
            self.rule_mut(rule).freed = true;
        }
        match id {
            AclId::Number(_) => {
                if let Some(Some(list)) = self.list_slot(id) {
                    list.freed = true;
                }
            }
            AclId::Name(_) => {
                if let Some(list) = self.named.get_mut(&id.key()) {
                    list.freed = true;
                }
            }
        }
        info!(node = self.node, "access list {} removed", id);
        true
    }

    pub fn bind(&mut self, interface: usize, direction: Direction, id: AclId) {
        let binding = self.bindings.entry(interface).or_default();
        let lists = match direction {
            Direction::In => &mut binding.inbound,
            Direction::Out => &mut binding.outbound,
        };
        if !lists.contains(&id) {
            lists.push(id);
        }
    }

    pub fn binding(&self, interface: usize) -> Option<&InterfaceBinding> {
        self.bindings.get(&interface)
    }

    /// Live rules of a list in evaluation order, nested reflexive rules
    /// expanded in place. `None` when the list is undefined or empty.
    fn chain_rules(&self, id: &AclId) -> Option<Vec<RuleId>> {
        let list = self.list(id)?;
        if list.entries.is_empty() {
            return None;
        }
        let mut rules = Vec::new();
        for entry in &list.entries {
            match entry {
                ListEntry::Rule(rule) => rules.push(*rule),
                ListEntry::Evaluate(name) => rules.extend_from_slice(self.reflexive.rules_of(name)),
            }
        }
        rules.retain(|r| !self.rule(*r).freed);
        Some(rules)
    }

    fn match_chain(&self, lists: &[AclId], packet: &AclPacket) -> ChainOutcome {
        for id in lists {
            let Some(rules) = self.chain_rules(id) else {
                return ChainOutcome::Undefined(id.clone());
            };
            if let Some(rule) = rules.into_iter().find(|r| self.rule(*r).matches(packet)) {
                return ChainOutcome::Matched(rule);
            }
        }
        ChainOutcome::NoMatch
    }

    /// Filter a packet through the lists bound to an interface direction.
    /// Interfaces without bound lists pass everything.
    pub fn filter_at_interface<S: Scheduler>(
        &mut self,
        interface: usize,
        direction: Direction,
        packet: &AclPacket,
        interfaces: &[Interface],
        scheduler: &mut S,
    ) -> Verdict {
        let lists = match self.bindings.get(&interface) {
            Some(binding) => match direction {
                Direction::In => binding.inbound.clone(),
                Direction::Out => binding.outbound.clone(),
            },
            None => Vec::new(),
        };
        if lists.is_empty() {
            return Verdict::Permit;
        }
        self.filter_chain(&lists, packet, interface, direction, interfaces, scheduler)
    }

    /// Filter a packet through a single list
    pub fn filter_packet<S: Scheduler>(
        &mut self,
        list: &AclId,
        packet: &AclPacket,
        interface: usize,
        direction: Direction,
        interfaces: &[Interface],
        scheduler: &mut S,
    ) -> Verdict {
        self.filter_chain(
            std::slice::from_ref(list),
            packet,
            interface,
            direction,
            interfaces,
            scheduler,
        )
    }

    fn filter_chain<S: Scheduler>(
        &mut self,
        lists: &[AclId],
        packet: &AclPacket,
        interface: usize,
        direction: Direction,
        interfaces: &[Interface],
        scheduler: &mut S,
    ) -> Verdict {
        let matched = match self.match_chain(lists, packet) {
            ChainOutcome::Undefined(id) => {
                warn!(
                    node = self.node,
                    "access list {} is not defined, filtering aborted", id
                );
                return Verdict::Permit;
            }
            ChainOutcome::NoMatch => None,
            ChainOutcome::Matched(rule) => Some(rule),
        };

        if let Some(rule) = matched {
            self.on_rule_hit(rule, packet, interface, direction, interfaces, scheduler);
        }

        if is_own_address(interfaces, packet.src) {
            return Verdict::Permit;
        }

        let reason = match matched {
            Some(rule) => {
                let rule = self.rule(rule);
                match (rule.filter, rule.kind) {
                    (FilterType::Permit, _) => return Verdict::Permit,
                    (FilterType::Deny, ListKind::Standard) => DropReason::StandardDeny,
                    (FilterType::Deny, ListKind::Extended) => DropReason::ExtendedDeny,
                }
            }
            None => {
                self.write_trace(scheduler.now(), packet, None, interface, direction);
                DropReason::Mismatch
            }
        };

        debug!(
            node = self.node,
            interface,
            %direction,
            "access list dropped {} -> {} ({:?})",
            packet.src,
            packet.dst,
            reason
        );
        self.stats
            .record_drop(interface, direction == Direction::In, reason);
        Verdict::Drop
    }

    fn on_rule_hit<S: Scheduler>(
        &mut self,
        rule_id: RuleId,
        packet: &AclPacket,
        interface: usize,
        direction: Direction,
        interfaces: &[Interface],
        scheduler: &mut S,
    ) {
        let now = scheduler.now();
        let (session, reflect, filter) = {
            let rule = self.rule_mut(rule_id);
            rule.hits += 1;
            (rule.session, rule.reflect.clone(), rule.filter)
        };

        if let Some(session) = session {
            self.reflexive.touch(session, now);
            self.track_tcp_close(session, packet, true, scheduler);
        } else if let (Some(reflect), FilterType::Permit) = (reflect, filter) {
            let tuple = packet.five_tuple();
            match self.reflexive.find(&tuple) {
                Some(session) => self.track_tcp_close(session, packet, false, scheduler),
                None if is_attached(interfaces, packet.src) => {
                    self.open_session(&reflect, rule_id, packet, scheduler);
                }
                None => {}
            }
        }

        if filter == FilterType::Deny {
            self.write_trace(now, packet, Some(rule_id), interface, direction);
        }

        self.log_hit(rule_id, packet, interface, scheduler);
    }

    /// RST closes immediately (return direction only); the second FIN in
    /// either direction arms the grace timer.
    fn track_tcp_close<S: Scheduler>(
        &mut self,
        session: SessionId,
        packet: &AclPacket,
        return_direction: bool,
        scheduler: &mut S,
    ) {
        if packet.protocol != proto::TCP {
            return;
        }
        if return_direction && packet.tcp_flags.rst {
            self.remove_session(session);
            return;
        }
        if packet.tcp_flags.fin && self.reflexive.note_fin(session) {
            debug!(node = self.node, ?session, "second FIN, closing in {:?}", FIN_GRACE);
            scheduler.schedule(FIN_GRACE, TimerEvent::ReflexiveFinGrace { session });
        }
    }

    fn open_session<S: Scheduler>(
        &mut self,
        reflect: &ReflectSpec,
        trigger: RuleId,
        packet: &AclPacket,
        scheduler: &mut S,
    ) {
        let timeout = reflect
            .timeout
            .or(self.reflexive_timeout)
            .unwrap_or(DEFAULT_TIMEOUT);

        let trigger_params = self.rule(trigger).params.clone();
        let mut mirror = AccessListRule::new(
            AclId::Name(reflect.name.clone()),
            ListKind::Extended,
            FilterType::Permit,
        );
        mirror.protocol = packet.protocol;
        mirror.src_addr = packet.dst;
        mirror.src_wildcard = Ipv4Addr::UNSPECIFIED;
        mirror.dst_addr = packet.src;
        mirror.dst_wildcard = Ipv4Addr::UNSPECIFIED;
        mirror.params = match trigger_params {
            params @ (ProtocolParams::Icmp { .. } | ProtocolParams::Igmp { .. }) => params,
            _ if packet.protocol == proto::TCP || packet.protocol == proto::UDP => {
                ProtocolParams::Ports {
                    src: PortMatch::exact(packet.dst_port),
                    dst: PortMatch::exact(packet.src_port),
                    established: false,
                }
            }
            _ => ProtocolParams::None,
        };

        let rule_id = self
            .free_mirrors
            .pop()
            .unwrap_or(RuleId(self.rules.len()));
        let now = scheduler.now();
        let session = self
            .reflexive
            .open(&reflect.name, packet.five_tuple(), rule_id, timeout, now);
        mirror.session = Some(session);
        if rule_id.0 == self.rules.len() {
            self.rules.push(mirror);
        } else {
            *self.rule_mut(rule_id) = mirror;
        }

        info!(
            node = self.node,
            "reflexive list {} opened {} -> {} (timeout {:?})",
            reflect.name,
            packet.dst,
            packet.src,
            timeout
        );
        scheduler.schedule(timeout, TimerEvent::ReflexiveTimeout { session });
    }

    /// Close a reflexive session. Closing twice, or through an id whose
    /// slot was reused, is a no-op.
    pub fn remove_session(&mut self, session: SessionId) -> bool {
        let Some(rule) = self.reflexive.close(session) else {
            return false;
        };
        self.rule_mut(rule).freed = true;
        self.free_mirrors.push(rule);
        debug!(node = self.node, ?session, "reflexive session removed");
        true
    }

    /// Rule slots allocated so far, static and dynamic
    pub fn rule_slots(&self) -> usize {
        self.rules.len()
    }

    fn log_hit<S: Scheduler>(
        &mut self,
        rule_id: RuleId,
        packet: &AclPacket,
        interface: usize,
        scheduler: &mut S,
    ) {
        let node = self.node;
        let rule = self.rule_mut(rule_id);
        if rule.log == LogMode::None {
            return;
        }
        rule.log_packets += 1;
        if rule.log_timer_on {
            return;
        }
        rule.log_timer_on = true;

        let via = match rule.log {
            LogMode::LogInput => format!(" via interface {}", interface),
            _ => String::new(),
        };
        info!(
            node,
            "list {} {} {} {} -> {}{}, {} packet(s)",
            rule.list,
            rule.filter,
            packet.protocol,
            packet.src,
            packet.dst,
            via,
            rule.log_packets
        );
        rule.log_packets = 0;
        scheduler.schedule(LOG_INTERVAL, TimerEvent::AclLog { rule: rule_id });
    }

    /// Handle the access-list timer events; others are ignored
    pub fn handle_timer<S: Scheduler>(&mut self, event: &TimerEvent, scheduler: &mut S) {
        match *event {
            TimerEvent::AclLog { rule } => self.report_log(rule, scheduler),
            TimerEvent::ReflexiveTimeout { session } => {
                match self.reflexive.check_timeout(session, scheduler.now()) {
                    TimeoutCheck::AlreadyRemoved => {}
                    TimeoutCheck::Expired => {
                        debug!(node = self.node, ?session, "reflexive session timed out");
                        self.remove_session(session);
                    }
                    TimeoutCheck::Remaining(left) => {
                        scheduler.schedule(left, TimerEvent::ReflexiveTimeout { session });
                    }
                }
            }
            TimerEvent::ReflexiveFinGrace { session } => {
                self.remove_session(session);
            }
            _ => {}
        }
    }

    fn report_log<S: Scheduler>(&mut self, rule_id: RuleId, scheduler: &mut S) {
        let node = self.node;
        let rule = self.rule_mut(rule_id);
        if rule.freed {
            info!(node, "access list {} removed, aborting log", rule.list);
            rule.log_timer_on = false;
            return;
        }
        info!(
            node,
            "list {} {}, {} packet(s) in the last {:?}",
            rule.list,
            rule.filter,
            rule.log_packets,
            LOG_INTERVAL
        );
        rule.log_packets = 0;
        scheduler.schedule(LOG_INTERVAL, TimerEvent::AclLog { rule: rule_id });
    }

    fn write_trace(
        &mut self,
        now: Duration,
        packet: &AclPacket,
        rule: Option<RuleId>,
        interface: usize,
        direction: Direction,
    ) {
        let Some(mut trace) = self.trace.take() else {
            return;
        };
        let cause = match rule {
            Some(rule) => format!("list {} deny", self.rule(rule).list),
            None => "no match".to_string(),
        };
        trace.write_line(&format!(
            "{:.6} node {} interface {} {} {} proto {} {}:{} -> {}:{}",
            now.as_secs_f64(),
            self.node,
            interface,
            direction,
            cause,
            packet.protocol,
            packet.src,
            packet.src_port,
            packet.dst,
            packet.dst_port
        ));
        self.trace = Some(trace);
    }

    /// Address-only check used by route maps. A rule is satisfied when one
    /// address matches and the other matches or is unconstrained.
    pub fn verify_address_match(&self, list: &AclId, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        let Some(rules) = self.list(list).and_then(|_| self.chain_rules(list)) else {
            warn!(
                node = self.node,
                "no access list {} defined, route map follows default action", list
            );
            return false;
        };

        let mut last = (MatchResult::NoMatch, MatchResult::NoMatch);
        for rule_id in rules {
            let rule = self.rule(rule_id);
            let src_result = match_address(rule.src_addr, rule.src_wildcard, src);
            let dst_result = match rule.kind {
                ListKind::Extended => match_address(rule.dst_addr, rule.dst_wildcard, dst),
                ListKind::Standard => MatchResult::NotApplicable,
            };
            let applicable = |r: MatchResult| r != MatchResult::NoMatch;
            if (src_result == MatchResult::Match && applicable(dst_result))
                || (dst_result == MatchResult::Match && applicable(src_result))
            {
                return true;
            }
            last = (src_result, dst_result);
        }

        last == (MatchResult::NotApplicable, MatchResult::NotApplicable)
    }

    fn lists_in_order(&self) -> Vec<&AccessList> {
        let mut named: Vec<&AccessList> = self.named.values().filter(|l| !l.freed).collect();
        named.sort_by_key(|l| l.id.key());
        self.numbered
            .iter()
            .flatten()
            .filter(|l| !l.freed)
            .chain(named)
            .collect()
    }

    fn render_list(&self, list: &AccessList, out: &mut String) {
        let kind = match list.kind {
            ListKind::Standard => "Standard",
            ListKind::Extended => "Extended",
        };
        out.push_str(&format!("{} IP access list {}\n", kind, list.id));
        for remark in &list.remarks {
            out.push_str(&format!("    remark {}\n", remark));
        }
        for entry in &list.entries {
            match entry {
                ListEntry::Rule(id) => {
                    let rule = self.rule(*id);
                    if !rule.freed {
                        out.push_str(&format!("    {} ({} matches)\n", rule, rule.hits));
                    }
                }
                ListEntry::Evaluate(name) => out.push_str(&format!("    evaluate {}\n", name)),
            }
        }
    }

    /// `show access-list [id]`
    pub fn show(&self, id: Option<&AclId>) -> String {
        let mut out = String::new();
        match id {
            Some(id) => match self.list(id) {
                Some(list) => self.render_list(list, &mut out),
                None => out.push_str(&format!("No access list {} defined\n", id)),
            },
            None => {
                for list in self.lists_in_order() {
                    self.render_list(list, &mut out);
                }
                let mut names: Vec<&str> = self.reflexive.list_names().collect();
                names.sort_unstable();
                names.dedup();
                for name in names {
                    out.push_str(&format!("Reflexive IP access list {}\n", name));
                    for rule in self.reflexive.rules_of(name) {
                        let rule = self.rule(*rule);
                        out.push_str(&format!("    {} ({} matches)\n", rule, rule.hits));
                    }
                }
            }
        }
        out
    }

    /// `clear access-list counters [id]`
    pub fn clear_counters(&mut self, id: Option<&AclId>) {
        let rule_ids: Vec<RuleId> = match id {
            Some(id) => self
                .list(id)
                .map(|l| {
                    l.entries
                        .iter()
                        .filter_map(|e| match e {
                            ListEntry::Rule(r) => Some(*r),
                            ListEntry::Evaluate(_) => None,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            None => (0..self.rules.len()).map(RuleId).collect(),
        };
        for rule in rule_ids {
            self.rule_mut(rule).hits = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::interface::{prefix_to_mask, Medium};
    use crate::dataplane::timer::EventQueue;
    use crate::protocol::ipv4::Ipv4Builder;
    use crate::protocol::tcp::TcpBuilder;

    fn interfaces() -> Vec<Interface> {
        vec![
            Interface::new(0, Ipv4Addr::new(10, 0, 1, 1), prefix_to_mask(24), Medium::Wired),
            Interface::new(1, Ipv4Addr::new(20, 0, 0, 1), prefix_to_mask(24), Medium::Wired),
        ]
    }

    fn tcp_packet(src: [u8; 4], sport: u16, dst: [u8; 4], dport: u16, flags: TcpFlags) -> AclPacket {
        let segment = TcpBuilder::new()
            .src_port(sport)
            .dst_port(dport)
            .flags(flags)
            .build();
        let data = Ipv4Builder::new()
            .protocol(proto::TCP)
            .src_addr(Ipv4Addr::from(src))
            .dst_addr(Ipv4Addr::from(dst))
            .payload(&segment)
            .build();
        AclPacket::from_ipv4(&data).unwrap()
    }

    fn standard(n: u16, filter: FilterType, addr: [u8; 4], wildcard: [u8; 4]) -> AccessListRule {
        let mut rule = AccessListRule::new(AclId::Number(n), ListKind::Standard, filter);
        rule.src_addr = Ipv4Addr::from(addr);
        rule.src_wildcard = Ipv4Addr::from(wildcard);
        rule
    }

    #[test]
    fn test_acl_id_parse() {
        assert_eq!(AclId::parse("10").unwrap(), AclId::Number(10));
        assert_eq!(AclId::parse("inbound").unwrap(), AclId::Name("inbound".into()));
        assert!(AclId::parse("200").is_err());
        assert_eq!(AclId::Number(150).numbered_kind(), Some(ListKind::Extended));
    }

    #[test]
    fn test_first_match_wins() {
        let mut engine = AccessListEngine::new(1);
        engine
            .add_rule(standard(1, FilterType::Deny, [10, 0, 9, 5], [0, 0, 0, 0]))
            .unwrap();
        engine
            .add_rule(standard(1, FilterType::Permit, [10, 0, 9, 0], [0, 0, 0, 255]))
            .unwrap();
        let mut queue = EventQueue::new();
        let ifs = interfaces();

        let denied = tcp_packet([10, 0, 9, 5], 1, [20, 0, 0, 9], 80, TcpFlags::default());
        let permitted = tcp_packet([10, 0, 9, 6], 1, [20, 0, 0, 9], 80, TcpFlags::default());
        let unmatched = tcp_packet([10, 0, 8, 6], 1, [20, 0, 0, 9], 80, TcpFlags::default());

        let id = AclId::Number(1);
        assert_eq!(engine.filter_packet(&id, &denied, 0, Direction::In, &ifs, &mut queue), Verdict::Drop);
        assert_eq!(engine.filter_packet(&id, &permitted, 0, Direction::In, &ifs, &mut queue), Verdict::Permit);
        assert_eq!(engine.filter_packet(&id, &unmatched, 0, Direction::In, &ifs, &mut queue), Verdict::Drop);

        let drops = engine.stats.interface(0).unwrap();
        assert_eq!(drops.inbound.standard_deny.get(), 1);
        assert_eq!(drops.inbound.mismatch.get(), 1);
    }

    #[test]
    fn test_neutral_fields_match_anything() {
        let mut engine = AccessListEngine::new(1);
        engine
            .add_rule(AccessListRule::new(AclId::Number(101), ListKind::Extended, FilterType::Permit))
            .unwrap();
        let mut queue = EventQueue::new();
        let packet = tcp_packet([1, 2, 3, 4], 5, [6, 7, 8, 9], 10, TcpFlags::default());
        assert_eq!(
            engine.filter_packet(&AclId::Number(101), &packet, 0, Direction::In, &interfaces(), &mut queue),
            Verdict::Permit
        );
    }

    #[test]
    fn test_extended_ports_and_established() {
        let mut rule = AccessListRule::new(AclId::Number(110), ListKind::Extended, FilterType::Permit);
        rule.protocol = proto::TCP;
        rule.params = ProtocolParams::Ports {
            src: PortMatch::exact(0),
            dst: PortMatch::new(PortOperator::Eq, 80),
            established: true,
        };

        let syn = TcpFlags {
            syn: true,
            ..Default::default()
        };
        let ack = TcpFlags {
            ack: true,
            ..Default::default()
        };
        assert!(!rule.matches(&tcp_packet([1, 1, 1, 1], 999, [2, 2, 2, 2], 80, syn)));
        assert!(rule.matches(&tcp_packet([1, 1, 1, 1], 999, [2, 2, 2, 2], 80, ack)));
        assert!(!rule.matches(&tcp_packet([1, 1, 1, 1], 999, [2, 2, 2, 2], 81, ack)));
    }

    #[test]
    fn test_precedence_only_checked_for_extended() {
        let data = Ipv4Builder::new()
            .precedence(5)
            .src_addr(Ipv4Addr::new(1, 1, 1, 1))
            .build();
        let packet = AclPacket::from_ipv4(&data).unwrap();

        let mut extended = AccessListRule::new(AclId::Number(120), ListKind::Extended, FilterType::Permit);
        extended.precedence = 3;
        assert!(!extended.matches(&packet));
        extended.precedence = 5;
        assert!(extended.matches(&packet));

        let mut std_rule = AccessListRule::new(AclId::Number(5), ListKind::Standard, FilterType::Permit);
        std_rule.precedence = 3;
        assert!(std_rule.matches(&packet));
    }

    #[test]
    fn test_undefined_and_removed_lists_permit() {
        let mut engine = AccessListEngine::new(1);
        let mut queue = EventQueue::new();
        let packet = tcp_packet([10, 0, 9, 5], 1, [20, 0, 0, 9], 80, TcpFlags::default());
        let ifs = interfaces();
        let id = AclId::Number(2);

        assert_eq!(engine.filter_packet(&id, &packet, 0, Direction::In, &ifs, &mut queue), Verdict::Permit);

        engine
            .add_rule(standard(2, FilterType::Deny, [10, 0, 9, 5], [0, 0, 0, 0]))
            .unwrap();
        assert_eq!(engine.filter_packet(&id, &packet, 0, Direction::In, &ifs, &mut queue), Verdict::Drop);

        assert!(engine.remove_list(&id));
        assert!(engine.list(&id).is_none());
        assert_eq!(engine.filter_packet(&id, &packet, 0, Direction::In, &ifs, &mut queue), Verdict::Permit);
    }

    #[test]
    fn test_own_source_never_dropped() {
        let mut engine = AccessListEngine::new(1);
        engine
            .add_rule(standard(3, FilterType::Deny, [10, 0, 1, 1], [0, 0, 0, 0]))
            .unwrap();
        let mut queue = EventQueue::new();
        let packet = tcp_packet([10, 0, 1, 1], 1, [20, 0, 0, 9], 80, TcpFlags::default());
        assert_eq!(
            engine.filter_packet(&AclId::Number(3), &packet, 0, Direction::Out, &interfaces(), &mut queue),
            Verdict::Permit
        );
        assert!(engine.stats.interface(0).is_none());
    }

    #[test]
    fn test_log_timer_started_once() {
        let mut engine = AccessListEngine::new(1);
        let mut rule = standard(4, FilterType::Permit, [0, 0, 0, 0], [255, 255, 255, 255]);
        rule.log = LogMode::Log;
        let rule_id = engine.add_rule(rule).unwrap();
        let mut queue = EventQueue::new();
        let packet = tcp_packet([10, 0, 9, 5], 1, [20, 0, 0, 9], 80, TcpFlags::default());
        let ifs = interfaces();

        for _ in 0..3 {
            engine.filter_packet(&AclId::Number(4), &packet, 0, Direction::In, &ifs, &mut queue);
        }
        assert_eq!(queue.pending(), vec![(LOG_INTERVAL, TimerEvent::AclLog { rule: rule_id })]);
        assert_eq!(engine.rule(rule_id).hits, 3);

        // Report re-arms; a freed rule stops the cycle
        let event = queue.pop_due(LOG_INTERVAL).unwrap();
        engine.handle_timer(&event, &mut queue);
        assert_eq!(queue.len(), 1);
        engine.remove_list(&AclId::Number(4));
        let event = queue.pop_due(LOG_INTERVAL * 2).unwrap();
        engine.handle_timer(&event, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_verify_address_match() {
        let mut engine = AccessListEngine::new(1);
        engine
            .add_rule(standard(5, FilterType::Permit, [10, 0, 0, 0], [0, 255, 255, 255]))
            .unwrap();
        assert!(engine.verify_address_match(&AclId::Number(5), Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::new(30, 0, 0, 1)));
        assert!(!engine.verify_address_match(&AclId::Number(5), Ipv4Addr::new(11, 1, 1, 1), Ipv4Addr::new(30, 0, 0, 1)));
        assert!(!engine.verify_address_match(&AclId::Number(6), Ipv4Addr::new(10, 1, 1, 1), Ipv4Addr::UNSPECIFIED));

        engine
            .add_rule(standard(7, FilterType::Permit, [0, 0, 0, 0], [255, 255, 255, 255]))
            .unwrap();
        assert!(engine.verify_address_match(&AclId::Number(7), Ipv4Addr::new(99, 1, 1, 1), Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_reflect_rejected_outside_named_extended_permit() {
        let mut engine = AccessListEngine::new(1);
        let mut rule = AccessListRule::new(AclId::Number(150), ListKind::Extended, FilterType::Permit);
        rule.reflect = Some(ReflectSpec {
            name: "mirror".into(),
            timeout: None,
        });
        assert!(engine.add_rule(rule).is_err());
    }

    fn reflexive_engine() -> AccessListEngine {
        let mut engine = AccessListEngine::new(1);
        let outbound = AclId::Name("outbound".into());
        let inbound = AclId::Name("inbound".into());
        let mut rule = AccessListRule::new(outbound.clone(), ListKind::Extended, FilterType::Permit);
        rule.protocol = proto::TCP;
        rule.reflect = Some(ReflectSpec {
            name: "mirror".into(),
            timeout: Some(Duration::from_secs(60)),
        });
        engine.add_rule(rule).unwrap();
        engine.declare_named("inbound", ListKind::Extended).unwrap();
        engine.add_evaluate(&inbound, "mirror").unwrap();
        engine.bind(1, Direction::Out, outbound);
        engine.bind(1, Direction::In, inbound);
        engine
    }

    #[test]
    fn test_reflexive_session_permits_return_traffic() {
        let mut engine = reflexive_engine();
        let mut queue = EventQueue::new();
        let ifs = interfaces();
        let none = TcpFlags::default();

        let reply = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], 40000, none);
        assert_eq!(engine.filter_at_interface(1, Direction::In, &reply, &ifs, &mut queue), Verdict::Drop);

        let request = tcp_packet([10, 0, 1, 5], 40000, [20, 0, 0, 9], 80, none);
        assert_eq!(engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue), Verdict::Permit);
        assert_eq!(engine.reflexive().active_sessions().count(), 1);
        assert_eq!(engine.reflexive().rules_of("mirror").len(), 1);

        // Same flow again reuses the session
        engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue);
        assert_eq!(engine.reflexive().active_sessions().count(), 1);

        assert_eq!(engine.filter_at_interface(1, Direction::In, &reply, &ifs, &mut queue), Verdict::Permit);
        // Other ports are not covered by the mirror rule
        let stray = tcp_packet([20, 0, 0, 9], 81, [10, 0, 1, 5], 40000, none);
        assert_eq!(engine.filter_at_interface(1, Direction::In, &stray, &ifs, &mut queue), Verdict::Drop);

        let shown = engine.show(None);
        assert!(shown.contains("Reflexive IP access list mirror"));
        assert!(shown.contains("permit tcp host 20.0.0.9 eq 80 host 10.0.1.5 eq 40000"));
    }

    #[test]
    fn test_unattached_source_opens_no_session() {
        let mut engine = reflexive_engine();
        let mut queue = EventQueue::new();
        let request = tcp_packet([30, 0, 0, 5], 40000, [20, 0, 0, 9], 80, TcpFlags::default());
        engine.filter_at_interface(1, Direction::Out, &request, &interfaces(), &mut queue);
        assert_eq!(engine.reflexive().active_sessions().count(), 0);
    }

    #[test]
    fn test_reflexive_rst_closes_session() {
        let mut engine = reflexive_engine();
        let mut queue = EventQueue::new();
        let ifs = interfaces();
        let request = tcp_packet([10, 0, 1, 5], 40000, [20, 0, 0, 9], 80, TcpFlags::default());
        engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue);

        let rst = TcpFlags {
            rst: true,
            ..Default::default()
        };
        let reset = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], 40000, rst);
        assert_eq!(engine.filter_at_interface(1, Direction::In, &reset, &ifs, &mut queue), Verdict::Permit);
        assert_eq!(engine.reflexive().active_sessions().count(), 0);

        let reply = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], 40000, TcpFlags::default());
        assert_eq!(engine.filter_at_interface(1, Direction::In, &reply, &ifs, &mut queue), Verdict::Drop);

        // The pending idle timer finds the session gone
        let event = queue.pop_due(Duration::from_secs(60)).unwrap();
        assert_eq!(event, TimerEvent::ReflexiveTimeout {
                session: SessionId {
                    slot: 0,
                    generation: 0
                }
            });
        engine.handle_timer(&event, &mut queue);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_closed_sessions_reuse_storage() {
        let mut engine = reflexive_engine();
        let mut queue = EventQueue::new();
        let ifs = interfaces();
        let rst = TcpFlags {
            rst: true,
            ..Default::default()
        };
        for port in 40000..40050 {
            let request = tcp_packet([10, 0, 1, 5], port, [20, 0, 0, 9], 80, TcpFlags::default());
            engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue);
            let reset = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], port, rst);
            assert_eq!(engine.filter_at_interface(1, Direction::In, &reset, &ifs, &mut queue), Verdict::Permit);
        }
        // the outbound rule plus one mirror slot
        assert_eq!(engine.rule_slots(), 2);
        assert_eq!(engine.reflexive().slots(), 1);

        // Idle timers of the closed sessions leave a later one alone
        queue.advance_to(Duration::from_secs(30));
        let request = tcp_packet([10, 0, 1, 5], 41000, [20, 0, 0, 9], 80, TcpFlags::default());
        engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue);
        while let Some(event) = queue.pop_due(Duration::from_secs(60)) {
            engine.handle_timer(&event, &mut queue);
        }
        assert_eq!(engine.reflexive().active_sessions().count(), 1);
        let reply = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], 41000, TcpFlags::default());
        assert_eq!(engine.filter_at_interface(1, Direction::In, &reply, &ifs, &mut queue), Verdict::Permit);
        assert_eq!(engine.rule_slots(), 2);
    }

    #[test]
    fn test_reflexive_second_fin_starts_grace() {
        let mut engine = reflexive_engine();
        let mut queue = EventQueue::new();
        let ifs = interfaces();
        let fin = TcpFlags {
            fin: true,
            ack: true,
            ..Default::default()
        };
        let request = tcp_packet([10, 0, 1, 5], 40000, [20, 0, 0, 9], 80, TcpFlags::default());
        engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue);

        let out_fin = tcp_packet([10, 0, 1, 5], 40000, [20, 0, 0, 9], 80, fin);
        engine.filter_at_interface(1, Direction::Out, &out_fin, &ifs, &mut queue);
        let in_fin = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], 40000, fin);
        engine.filter_at_interface(1, Direction::In, &in_fin, &ifs, &mut queue);

        let grace = queue
            .pending()
            .into_iter()
            .find(|(_, e)| matches!(e, TimerEvent::ReflexiveFinGrace { .. }));
        assert_eq!(grace.map(|(at, _)| at), Some(FIN_GRACE));

        let event = queue.pop_due(FIN_GRACE).unwrap();
        engine.handle_timer(&event, &mut queue);
        assert_eq!(engine.reflexive().active_sessions().count(), 0);
    }

    #[test]
    fn test_reflexive_idle_timeout_rearms() {
        let mut engine = reflexive_engine();
        let mut queue = EventQueue::new();
        let ifs = interfaces();
        let request = tcp_packet([10, 0, 1, 5], 40000, [20, 0, 0, 9], 80, TcpFlags::default());
        engine.filter_at_interface(1, Direction::Out, &request, &ifs, &mut queue);

        queue.advance_to(Duration::from_secs(20));
        let reply = tcp_packet([20, 0, 0, 9], 80, [10, 0, 1, 5], 40000, TcpFlags::default());
        engine.filter_at_interface(1, Direction::In, &reply, &ifs, &mut queue);

        let event = queue.pop_due(Duration::from_secs(60)).unwrap();
        engine.handle_timer(&event, &mut queue);
        assert_eq!(engine.reflexive().active_sessions().count(), 1);
        assert_eq!(queue.next_deadline(), Some(Duration::from_secs(80)));

        let event = queue.pop_due(Duration::from_secs(80)).unwrap();
        engine.handle_timer(&event, &mut queue);
        assert_eq!(engine.reflexive().active_sessions().count(), 0);
    }

    #[test]
    fn test_show_and_clear_counters() {
        let mut engine = AccessListEngine::new(1);
        engine
            .add_rule(standard(8, FilterType::Deny, [10, 0, 9, 5], [0, 0, 0, 0]))
            .unwrap();
        engine.add_remark(&AclId::Number(8), ListKind::Standard, "block host").unwrap();
        let mut queue = EventQueue::new();
        let packet = tcp_packet([10, 0, 9, 5], 1, [20, 0, 0, 9], 80, TcpFlags::default());
        engine.filter_packet(&AclId::Number(8), &packet, 0, Direction::In, &interfaces(), &mut queue);

        let shown = engine.show(Some(&AclId::Number(8)));
        assert!(shown.contains("Standard IP access list 8"));
        assert!(shown.contains("remark block host"));
        assert!(shown.contains("deny host 10.0.9.5 (1 matches)"));

        engine.clear_counters(None);
        assert!(engine.show(None).contains("(0 matches)"));
    }
}
