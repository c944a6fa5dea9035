//! Route maps
//!
//! Named, sequence-ordered entries of match and set clauses. An entry
//! matches when any of its match clauses does; a matching permit entry then
//! applies every set clause to the caller's [`ValueBag`].

use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, warn};

use super::acl::{AccessListEngine, AclId};
use crate::{Error, Result};

/// Sequence number given to entries declared without one
pub const DEFAULT_SEQ: u32 = 10;

/// Local preference written by `set local-preference` without a value
pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// Bounds of `set metric`
pub const MIN_SET_METRIC: i32 = -294_967_295;
pub const MAX_SET_METRIC: i32 = 294_967_295;

/// Largest `match length` bound
pub const MAX_MATCH_LENGTH: u32 = 0x7FFF_FFFF;

/// Address-only access-list check used by the IP match clauses
pub trait AclVerifier {
    fn verify_address_match(&self, list: &AclId, src: Ipv4Addr, dst: Ipv4Addr) -> bool;
}

impl AclVerifier for AccessListEngine {
    fn verify_address_match(&self, list: &AclId, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        AccessListEngine::verify_address_match(self, list, src, dst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMapType {
    Permit,
    Deny,
}

impl fmt::Display for RouteMapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteMapType::Permit => "permit",
            RouteMapType::Deny => "deny",
        })
    }
}

/// Interface named by type and number, e.g. `ethernet 0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRef {
    pub kind: String,
    pub number: String,
}

impl InterfaceRef {
    pub fn new(kind: &str, number: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            number: number.to_string(),
        }
    }

    /// Interface index when the number is numeric
    pub fn index(&self) -> Option<usize> {
        self.number.parse().ok()
    }

    fn same(&self, other: &InterfaceRef) -> bool {
        self.kind == other.kind && self.number.eq_ignore_ascii_case(&other.number)
    }
}

impl fmt::Display for InterfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    Local,
    Internal,
    ExternalType1,
    ExternalType2,
    Level1,
    Level2,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Local => "local",
            RouteType::Internal => "internal",
            RouteType::ExternalType1 => "external type-1",
            RouteType::ExternalType2 => "external type-2",
            RouteType::Level1 => "level-1",
            RouteType::Level2 => "level-2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Level1,
    Level2,
    Level12,
    StubArea,
    Backbone,
}

impl Level {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "level-1" => Some(Level::Level1),
            "level-2" => Some(Level::Level2),
            "level-1-2" => Some(Level::Level12),
            "stub-area" => Some(Level::StubArea),
            "backbone" => Some(Level::Backbone),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Level1 => "level-1",
            Level::Level2 => "level-2",
            Level::Level12 => "level-1-2",
            Level::StubArea => "stub-area",
            Level::Backbone => "backbone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Internal,
    External,
    Type1,
    Type2,
}

impl MetricType {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "internal" => Some(MetricType::Internal),
            "external" => Some(MetricType::External),
            "type-1" => Some(MetricType::Type1),
            "type-2" => Some(MetricType::Type2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Internal => "internal",
            MetricType::External => "external",
            MetricType::Type1 => "type-1",
            MetricType::Type2 => "type-2",
        }
    }
}

/// `match ...` clauses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchClause {
    /// Stored only; never matches
    AsPath(Vec<u32>),
    /// Stored only; never matches
    Community(Vec<String>),
    /// Stored only; never matches
    ExtCommunity(Vec<String>),
    Interface(Vec<InterfaceRef>),
    IpAddress(Vec<AclId>),
    IpNextHop(Vec<AclId>),
    IpRouteSource(Vec<AclId>),
    Length { min: u32, max: u32 },
    Metric(u32),
    RouteType(RouteType),
    Tag(Vec<u32>),
}

impl MatchClause {
    pub fn matches(&self, bag: &ValueBag, acl: &dyn AclVerifier) -> bool {
        let any_list = |lists: &[AclId], src: Ipv4Addr, dst: Ipv4Addr| {
            lists.iter().any(|l| acl.verify_address_match(l, src, dst))
        };
        match self {
            MatchClause::AsPath(_) | MatchClause::Community(_) | MatchClause::ExtCommunity(_) => {
                false
            }
            MatchClause::Interface(interfaces) => bag
                .interface
                .as_ref()
                .is_some_and(|i| interfaces.iter().any(|m| m.same(i))),
            MatchClause::IpAddress(lists) => any_list(lists, bag.src, bag.dst),
            MatchClause::IpNextHop(lists) => any_list(lists, bag.next_hop, bag.next_hop),
            MatchClause::IpRouteSource(lists) => {
                any_list(lists, Ipv4Addr::UNSPECIFIED, bag.route_source)
            }
            MatchClause::Length { min, max } => {
                bag.length.is_some_and(|len| *min <= len && len <= *max)
            }
            MatchClause::Metric(metric) => bag.metric == Some(*metric),
            MatchClause::RouteType(route_type) => bag.route_type == Some(*route_type),
            MatchClause::Tag(tags) => bag.tag.is_some_and(|t| tags.contains(&t)),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for MatchClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchClause::AsPath(paths) => write!(f, "as-path {}", join(paths)),
            MatchClause::Community(c) => write!(f, "community {}", join(c)),
            MatchClause::ExtCommunity(c) => write!(f, "extcommunity {}", join(c)),
            MatchClause::Interface(i) => write!(f, "interface {}", join(i)),
            MatchClause::IpAddress(l) => write!(f, "ip address (access-lists): {}", join(l)),
            MatchClause::IpNextHop(l) => write!(f, "ip next-hop (access-lists): {}", join(l)),
            MatchClause::IpRouteSource(l) => {
                write!(f, "ip route-source (access-lists): {}", join(l))
            }
            MatchClause::Length { min, max } => write!(f, "length {} {}", min, max),
            MatchClause::Metric(m) => write!(f, "metric {}", m),
            MatchClause::RouteType(t) => write!(f, "route-type {}", t.as_str()),
            MatchClause::Tag(tags) => write!(f, "tag {}", join(tags)),
        }
    }
}

/// `set ...` clauses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetClause {
    AutomaticTag,
    DefaultInterface(Vec<InterfaceRef>),
    Interface(Vec<InterfaceRef>),
    IpDefaultNextHop(Vec<Ipv4Addr>),
    IpDefaultNextHopVerifyAvailability,
    IpNextHop(Vec<Ipv4Addr>),
    IpNextHopVerifyAvailability,
    IpPrecedence(u8),
    Level(Level),
    LocalPreference(u32),
    Metric(i32),
    MetricType(MetricType),
    NextHop(Ipv4Addr),
    Tag(u32),
}

impl SetClause {
    pub fn apply(&self, bag: &mut ValueBag) {
        match self {
            SetClause::AutomaticTag => bag.automatic_tag = true,
            SetClause::DefaultInterface(i) => bag.default_interfaces = Some(i.clone()),
            SetClause::Interface(i) => bag.interfaces = Some(i.clone()),
            SetClause::IpDefaultNextHop(n) => bag.default_next_hops = Some(n.clone()),
            SetClause::IpDefaultNextHopVerifyAvailability => {
                bag.default_next_hop_verify = true;
            }
            SetClause::IpNextHop(n) => bag.next_hops = Some(n.clone()),
            SetClause::IpNextHopVerifyAvailability => bag.next_hop_verify = true,
            SetClause::IpPrecedence(p) => bag.precedence = Some(*p),
            SetClause::Level(l) => bag.level = Some(*l),
            SetClause::LocalPreference(p) => bag.local_preference = Some(*p),
            SetClause::Metric(m) => bag.set_metric = Some(*m),
            SetClause::MetricType(t) => bag.metric_type = Some(*t),
            SetClause::NextHop(n) => bag.set_next_hop = Some(*n),
            SetClause::Tag(t) => bag.set_tag = Some(*t),
        }
    }

    /// Clause kinds usable for policy routing
    pub fn is_policy_routing(&self) -> bool {
        matches!(
            self,
            SetClause::IpPrecedence(_)
                | SetClause::IpNextHop(_)
                | SetClause::Interface(_)
                | SetClause::IpDefaultNextHop(_)
                | SetClause::DefaultInterface(_)
        )
    }
}

impl fmt::Display for SetClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetClause::AutomaticTag => f.write_str("automatic-tag"),
            SetClause::DefaultInterface(i) => write!(f, "default interface {}", join(i)),
            SetClause::Interface(i) => write!(f, "interface {}", join(i)),
            SetClause::IpDefaultNextHop(n) => write!(f, "ip default next-hop {}", join(n)),
            SetClause::IpDefaultNextHopVerifyAvailability => {
                f.write_str("ip default next-hop verify-availability")
            }
            SetClause::IpNextHop(n) => write!(f, "ip next-hop {}", join(n)),
            SetClause::IpNextHopVerifyAvailability => {
                f.write_str("ip next-hop verify-availability")
            }
            SetClause::IpPrecedence(p) => write!(f, "ip precedence {}", p),
            SetClause::Level(l) => write!(f, "level {}", l.as_str()),
            SetClause::LocalPreference(p) => write!(f, "local-preference {}", p),
            SetClause::Metric(m) => write!(f, "metric {}", m),
            SetClause::MetricType(t) => write!(f, "metric-type {}", t.as_str()),
            SetClause::NextHop(n) => write!(f, "next-hop {}", n),
            SetClause::Tag(t) => write!(f, "tag {}", t),
        }
    }
}

/// Inputs a caller offers to match clauses, and the outputs set clauses
/// write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueBag {
    pub interface: Option<InterfaceRef>,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub route_source: Ipv4Addr,
    pub length: Option<u32>,
    pub metric: Option<u32>,
    pub route_type: Option<RouteType>,
    pub tag: Option<u32>,

    pub automatic_tag: bool,
    pub default_interfaces: Option<Vec<InterfaceRef>>,
    pub interfaces: Option<Vec<InterfaceRef>>,
    pub default_next_hops: Option<Vec<Ipv4Addr>>,
    pub default_next_hop_verify: bool,
    pub next_hops: Option<Vec<Ipv4Addr>>,
    pub next_hop_verify: bool,
    pub precedence: Option<u8>,
    pub level: Option<Level>,
    pub local_preference: Option<u32>,
    pub set_metric: Option<i32>,
    pub metric_type: Option<MetricType>,
    pub set_next_hop: Option<Ipv4Addr>,
    pub set_tag: Option<u32>,
}

impl Default for ValueBag {
    fn default() -> Self {
        Self {
            interface: None,
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
            next_hop: Ipv4Addr::UNSPECIFIED,
            route_source: Ipv4Addr::UNSPECIFIED,
            length: None,
            metric: None,
            route_type: None,
            tag: None,
            automatic_tag: false,
            default_interfaces: None,
            interfaces: None,
            default_next_hops: None,
            default_next_hop_verify: false,
            next_hops: None,
            next_hop_verify: false,
            precedence: None,
            level: None,
            local_preference: None,
            set_metric: None,
            metric_type: None,
            set_next_hop: None,
            set_tag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMapEntry {
    pub tag: String,
    pub seq: u32,
    pub map_type: RouteMapType,
    pub matches: Vec<MatchClause>,
    pub sets: Vec<SetClause>,
}

impl RouteMapEntry {
    pub fn new(tag: &str, seq: u32, map_type: RouteMapType) -> Self {
        Self {
            tag: tag.to_string(),
            seq,
            map_type,
            matches: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// OR across match clauses; an entry without match clauses never matches
    pub fn evaluate(&self, bag: &ValueBag, acl: &dyn AclVerifier) -> bool {
        self.matches.iter().any(|m| m.matches(bag, acl))
    }

    /// Apply every set clause in order
    pub fn apply(&self, bag: &mut ValueBag) {
        for set in &self.sets {
            set.apply(bag);
        }
    }

    /// Evaluate, and on a permit match apply. Returns whether it matched.
    pub fn action(&self, bag: &mut ValueBag, acl: &dyn AclVerifier) -> bool {
        if !self.evaluate(bag, acl) {
            return false;
        }
        if self.map_type == RouteMapType::Permit {
            self.apply(bag);
        }
        true
    }
}

/// All entries sharing a tag, ascending by sequence number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMap {
    pub tag: String,
    entries: Vec<RouteMapEntry>,
}

impl RouteMap {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[RouteMapEntry] {
        &self.entries
    }

    pub fn find_entry_by_sequence(&self, seq: u32) -> Option<&RouteMapEntry> {
        self.entries
            .binary_search_by_key(&seq, |e| e.seq)
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Per-node route-map store with the "current entry" that MATCH and SET
/// lines attach to.
#[derive(Debug, Default)]
pub struct RouteMapEngine {
    node: u32,
    maps: Vec<RouteMap>,
    current: Option<(String, u32)>,
}

impl RouteMapEngine {
    pub fn new(node: u32) -> Self {
        Self {
            node,
            ..Default::default()
        }
    }

    pub fn find_by_tag(&self, tag: &str) -> Option<&RouteMap> {
        self.maps.iter().find(|m| m.tag == tag)
    }

    pub fn maps(&self) -> &[RouteMap] {
        &self.maps
    }

    /// `ROUTE-MAP tag [PERMIT|DENY] [seq]`. A sequence already present in
    /// the map is an error, whatever the type.
    pub fn declare_entry(
        &mut self,
        tag: &str,
        map_type: Option<RouteMapType>,
        seq: Option<u32>,
    ) -> Result<()> {
        let seq = seq.unwrap_or(DEFAULT_SEQ);
        let index = match self.maps.iter().position(|m| m.tag == tag) {
            Some(index) => index,
            None => {
                self.maps.push(RouteMap::new(tag));
                self.maps.len() - 1
            }
        };
        let map = &mut self.maps[index];

        match map.entries.binary_search_by_key(&seq, |e| e.seq) {
            Ok(_) => {
                return Err(Error::Config(format!(
                    "route map {} already has sequence {}",
                    tag, seq
                )));
            }
            Err(position) => {
                let entry = RouteMapEntry::new(tag, seq, map_type.unwrap_or(RouteMapType::Permit));
                map.entries.insert(position, entry);
            }
        }
        self.current = Some((tag.to_string(), seq));
        Ok(())
    }

    fn current_entry(&mut self) -> Result<&mut RouteMapEntry> {
        let Some((tag, seq)) = self.current.clone() else {
            return Err(Error::Config("MATCH/SET before any ROUTE-MAP".into()));
        };
        self.maps
            .iter_mut()
            .find(|m| m.tag == tag)
            .and_then(|m| m.entries.iter_mut().find(|e| e.seq == seq))
            .ok_or_else(|| Error::Config(format!("route map {} {} was removed", tag, seq)))
    }

    pub fn add_match(&mut self, clause: MatchClause) -> Result<()> {
        self.current_entry()?.matches.push(clause);
        Ok(())
    }

    pub fn add_set(&mut self, clause: SetClause) -> Result<()> {
        self.current_entry()?.sets.push(clause);
        Ok(())
    }

    /// `NO MATCH ...`: drop the first equal clause of the current entry
    pub fn remove_match(&mut self, clause: &MatchClause) -> Result<bool> {
        let node = self.node;
        let entry = self.current_entry()?;
        match entry.matches.iter().position(|m| m == clause) {
            Some(index) => {
                entry.matches.remove(index);
                Ok(true)
            }
            None => {
                warn!(node, "no such match clause in route map {}: {}", entry.tag, clause);
                Ok(false)
            }
        }
    }

    /// `NO SET ...`: drop the first equal clause of the current entry
    pub fn remove_set(&mut self, clause: &SetClause) -> Result<bool> {
        let node = self.node;
        let entry = self.current_entry()?;
        match entry.sets.iter().position(|s| s == clause) {
            Some(index) => {
                entry.sets.remove(index);
                Ok(true)
            }
            None => {
                warn!(node, "no such set clause in route map {}: {}", entry.tag, clause);
                Ok(false)
            }
        }
    }

    /// `NO ROUTE-MAP tag [seq]`: remove one entry, or the whole map
    pub fn remove(&mut self, tag: &str, seq: Option<u32>) -> Result<()> {
        let index = self
            .maps
            .iter()
            .position(|m| m.tag == tag)
            .ok_or_else(|| Error::Config(format!("no route map {} defined", tag)))?;

        match seq {
            None => {
                self.maps.remove(index);
            }
            Some(seq) => {
                let map = &mut self.maps[index];
                let position = map
                    .entries
                    .binary_search_by_key(&seq, |e| e.seq)
                    .map_err(|_| {
                        Error::Config(format!("no sequence {} in route map {}", seq, tag))
                    })?;
                map.entries.remove(position);
                if map.entries.is_empty() {
                    self.maps.remove(index);
                }
            }
        }

        if self
            .current
            .as_ref()
            .is_some_and(|(t, s)| t == tag && seq.is_none_or(|seq| seq == *s))
        {
            self.current = None;
        }
        debug!(node = self.node, "route map {} removed", tag);
        Ok(())
    }

    /// Walk a map's entries in order; the first matching entry decides.
    /// Returns the matching entry, already applied when it is a permit.
    pub fn action<'a>(
        &'a self,
        tag: &str,
        bag: &mut ValueBag,
        acl: &dyn AclVerifier,
    ) -> Option<&'a RouteMapEntry> {
        let Some(map) = self.find_by_tag(tag) else {
            warn!(node = self.node, "no route map {} defined, actions aborted", tag);
            return None;
        };
        map.entries.iter().find(|e| e.action(bag, acl))
    }

    /// `SHOW ROUTE-MAP [tag]`
    pub fn show(&self, tag: Option<&str>) -> String {
        let mut out = String::new();
        for map in self
            .maps
            .iter()
            .filter(|m| tag.is_none_or(|t| t == m.tag))
        {
            for entry in &map.entries {
                out.push_str(&format!(
                    "route-map {}, {}, sequence {}\n",
                    entry.tag, entry.map_type, entry.seq
                ));
                out.push_str("  Match clauses:\n");
                for clause in &entry.matches {
                    out.push_str(&format!("    {}\n", clause));
                }
                out.push_str("  Set clauses:\n");
                for clause in &entry.sets {
                    out.push_str(&format!("    {}\n", clause));
                }
            }
        }
        if out.is_empty() {
            if let Some(tag) = tag {
                out.push_str(&format!("No route map {} defined\n", tag));
            }
        }
        out
    }
}
