//! Access-list statement grammar
//!
//! Parses the criteria part of `ACCESS-LIST n ...` lines and the body lines
//! of named lists into [`AclStatement`]s. Keywords are case-insensitive.

use std::net::Ipv4Addr;
use std::time::Duration;

use super::acl::{
    AccessListRule, AclId, FilterType, ListKind, LogMode, ProtocolParams, ReflectSpec,
    ANY_WILDCARD, MAX_REMARK_LEN,
};
use super::address_match::{PortMatch, PortOperator};
use super::reflexive::MAX_TIMEOUT_SECS;
use crate::protocol::icmp::{icmp_type, igmp_type};
use crate::protocol::ipv4::proto;
use crate::{Error, Result};

/// Well-known TCP port names
pub const TCP_PORT_NAMES: &[(&str, u16)] = &[
    ("bgp", 179),
    ("chargen", 19),
    ("cmd", 514),
    ("daytime", 13),
    ("discard", 9),
    ("domain", 53),
    ("echo", 7),
    ("exec", 512),
    ("finger", 79),
    ("ftp", 21),
    ("ftp-data", 20),
    ("gopher", 70),
    ("hostname", 101),
    ("ident", 113),
    ("irc", 194),
    ("klogin", 543),
    ("kshell", 544),
    ("lpd", 515),
    ("nntp", 119),
    ("pop2", 109),
    ("pop3", 110),
    ("smtp", 25),
    ("sunrpc", 111),
    ("syslog", 514),
    ("tacacs-ds", 65),
    ("talk", 517),
    ("telnet", 23),
    ("time", 37),
    ("uucp", 540),
    ("whois", 43),
    ("www", 80),
];

/// Well-known UDP port names
pub const UDP_PORT_NAMES: &[(&str, u16)] = &[
    ("biff", 512),
    ("bootpc", 68),
    ("bootps", 67),
    ("discard", 9),
    ("dns", 53),
    ("dnsix", 195),
    ("echo", 7),
    ("mobile-ip", 434),
    ("nameserver", 42),
    ("netbios-dgm", 138),
    ("netbios-ns", 137),
    ("ntp", 123),
    ("rip", 520),
    ("snmp", 161),
    ("snmptrap", 162),
    ("sunrpc", 111),
    ("syslog", 514),
    ("tacacs-ds", 65),
    ("talk", 517),
    ("tftp", 69),
    ("time", 37),
    ("who", 513),
    ("xdmcp", 177),
];

/// ICMP message names with type and optional code
pub const ICMP_NAMES: &[(&str, u8, Option<u8>)] = &[
    ("administratively-prohibited", icmp_type::UNREACHABLE, Some(13)),
    ("alternate-address", icmp_type::ALTERNATE_ADDRESS, None),
    ("conversion-error", icmp_type::CONVERSION_ERROR, None),
    ("echo", icmp_type::ECHO, None),
    ("echo-reply", icmp_type::ECHO_REPLY, None),
    ("host-unreachable", icmp_type::UNREACHABLE, Some(1)),
    ("information-reply", icmp_type::INFORMATION_REPLY, None),
    ("information-request", icmp_type::INFORMATION_REQUEST, None),
    ("mask-reply", icmp_type::MASK_REPLY, None),
    ("mask-request", icmp_type::MASK_REQUEST, None),
    ("mobile-redirect", icmp_type::MOBILE_REDIRECT, None),
    ("net-unreachable", icmp_type::UNREACHABLE, Some(0)),
    ("parameter-problem", icmp_type::PARAMETER_PROBLEM, None),
    ("port-unreachable", icmp_type::UNREACHABLE, Some(3)),
    ("protocol-unreachable", icmp_type::UNREACHABLE, Some(2)),
    ("redirect", icmp_type::REDIRECT, None),
    ("router-advertisement", icmp_type::ROUTER_ADVERTISEMENT, None),
    ("router-solicitation", icmp_type::ROUTER_SOLICITATION, None),
    ("source-quench", icmp_type::SOURCE_QUENCH, None),
    ("time-exceeded", icmp_type::TIME_EXCEEDED, None),
    ("timestamp-reply", icmp_type::TIMESTAMP_REPLY, None),
    ("timestamp-request", icmp_type::TIMESTAMP_REQUEST, None),
    ("traceroute", icmp_type::TRACEROUTE, None),
    ("unreachable", icmp_type::UNREACHABLE, None),
];

pub const IGMP_NAMES: &[(&str, u8)] = &[
    ("dvmrp", igmp_type::DVMRP),
    ("host-query", igmp_type::HOST_QUERY),
    ("host-report", igmp_type::HOST_REPORT),
    ("pim", igmp_type::PIM),
    ("trace", igmp_type::TRACE),
];

pub const PRECEDENCE_NAMES: &[(&str, u8)] = &[
    ("routine", 0),
    ("priority", 1),
    ("immediate", 2),
    ("flash", 3),
    ("flash-override", 4),
    ("critical", 5),
    ("internet", 6),
    ("network", 7),
];

pub const TOS_NAMES: &[(&str, u8)] = &[
    ("normal", 0),
    ("min-monetary-cost", 1),
    ("max-reliability", 2),
    ("max-throughput", 4),
    ("min-delay", 8),
];

fn lookup<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| *v)
}

/// Precedence by name or number 0..7
pub fn parse_precedence(token: &str) -> Result<u8> {
    if let Some(value) = lookup(PRECEDENCE_NAMES, token) {
        return Ok(value);
    }
    match token.parse::<u8>() {
        Ok(n) if n <= 7 => Ok(n),
        _ => Err(Error::Config(format!("invalid precedence '{}'", token))),
    }
}

/// TOS by name or one of the defined values
pub fn parse_tos(token: &str) -> Result<u8> {
    if let Some(value) = lookup(TOS_NAMES, token) {
        return Ok(value);
    }
    match token.parse::<u8>() {
        Ok(n) if TOS_NAMES.iter().any(|(_, v)| *v == n) => Ok(n),
        _ => Err(Error::Config(format!("invalid tos '{}'", token))),
    }
}

/// Whitespace token cursor over one configuration line
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(line: &'a str) -> Self {
        Self {
            tokens: line.split_whitespace().collect(),
            pos: 0,
        }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).copied()
    }

    pub fn next(&mut self) -> Option<&'a str> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    /// Next token, or an error naming what was missing
    pub fn expect(&mut self, what: &str) -> Result<&'a str> {
        self.next()
            .ok_or_else(|| Error::Config(format!("missing {}", what)))
    }

    /// Consume the next token if it equals `keyword` (ignoring case)
    pub fn eat(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(token) if token.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Everything not yet consumed, joined by single spaces
    pub fn rest(&mut self) -> String {
        let rest = self.tokens[self.pos.min(self.tokens.len())..].join(" ");
        self.pos = self.tokens.len();
        rest
    }

    pub fn number<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.expect(what)?;
        token
            .parse()
            .map_err(|_| Error::Config(format!("invalid {} '{}'", what, token)))
    }

    pub fn address(&mut self, what: &str) -> Result<Ipv4Addr> {
        let token = self.expect(what)?;
        token
            .parse()
            .map_err(|_| Error::Config(format!("invalid {} '{}'", what, token)))
    }

    /// Fail if anything is left over
    pub fn finish(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(Error::Config(format!("unexpected '{}'", token))),
        }
    }
}

/// One parsed access-list line
#[derive(Debug, Clone, PartialEq)]
pub enum AclStatement {
    Rule(AccessListRule),
    Remark(String),
    Evaluate(String),
}

/// Parse `PERMIT|DENY|REMARK|EVALUATE ...` for the given list
pub fn parse_statement(list: &AclId, kind: ListKind, tokens: &mut Tokens<'_>) -> Result<AclStatement> {
    let keyword = tokens.expect("PERMIT or DENY")?;
    let filter = if keyword.eq_ignore_ascii_case("permit") {
        FilterType::Permit
    } else if keyword.eq_ignore_ascii_case("deny") {
        FilterType::Deny
    } else if keyword.eq_ignore_ascii_case("remark") {
        let text = tokens.rest();
        if text.is_empty() {
            return Err(Error::Config("empty remark".into()));
        }
        if text.len() > MAX_REMARK_LEN {
            return Err(Error::Config(format!(
                "remark longer than {} characters",
                MAX_REMARK_LEN
            )));
        }
        return Ok(AclStatement::Remark(text));
    } else if keyword.eq_ignore_ascii_case("evaluate") {
        if matches!(list, AclId::Number(_)) || kind != ListKind::Extended {
            return Err(Error::Config(
                "EVALUATE allowed only in named extended lists".into(),
            ));
        }
        let name = tokens.expect("reflexive list name")?.to_string();
        tokens.finish()?;
        return Ok(AclStatement::Evaluate(name));
    } else {
        return Err(Error::Config(format!(
            "expected PERMIT, DENY or REMARK, found '{}'",
            keyword
        )));
    };

    let mut rule = AccessListRule::new(list.clone(), kind, filter);

    if kind == ListKind::Standard {
        let (addr, wildcard) = parse_address(tokens)?;
        rule.src_addr = addr;
        rule.src_wildcard = wildcard;
        parse_trailer(&mut rule, tokens)?;
        return Ok(AclStatement::Rule(rule));
    }

    let protocol = tokens.expect("protocol")?;
    rule.protocol = parse_protocol(protocol)?;

    let (addr, wildcard) = parse_address(tokens)?;
    rule.src_addr = addr;
    rule.src_wildcard = wildcard;

    match rule.protocol {
        proto::TCP | proto::UDP => {
            let src = parse_port(rule.protocol, tokens)?;
            let (addr, wildcard) = parse_address(tokens)?;
            rule.dst_addr = addr;
            rule.dst_wildcard = wildcard;
            let dst = parse_port(rule.protocol, tokens)?;
            let established = rule.protocol == proto::TCP && tokens.eat("established");
            if src.is_some() || dst.is_some() || established {
                rule.params = ProtocolParams::Ports {
                    src: src.unwrap_or(PortMatch::exact(0)),
                    dst: dst.unwrap_or(PortMatch::exact(0)),
                    established,
                };
            }
        }
        proto::ICMP => {
            let (addr, wildcard) = parse_address(tokens)?;
            rule.dst_addr = addr;
            rule.dst_wildcard = wildcard;
            if let Some((icmp_type, code)) = parse_icmp(tokens)? {
                rule.params = ProtocolParams::Icmp { icmp_type, code };
            }
        }
        proto::IGMP => {
            let (addr, wildcard) = parse_address(tokens)?;
            rule.dst_addr = addr;
            rule.dst_wildcard = wildcard;
            if let Some(igmp_type) = parse_igmp(tokens)? {
                rule.params = ProtocolParams::Igmp { igmp_type };
            }
        }
        _ => {
            let (addr, wildcard) = parse_address(tokens)?;
            rule.dst_addr = addr;
            rule.dst_wildcard = wildcard;
        }
    }

    parse_trailer(&mut rule, tokens)?;

    if rule.reflect.is_some() {
        if filter == FilterType::Deny {
            return Err(Error::Config("REFLECT not allowed in a deny rule".into()));
        }
        if matches!(list, AclId::Number(_)) {
            return Err(Error::Config(
                "REFLECT allowed only in named extended lists".into(),
            ));
        }
    }

    Ok(AclStatement::Rule(rule))
}

fn parse_protocol(token: &str) -> Result<u8> {
    match token.to_ascii_lowercase().as_str() {
        "ip" => Ok(proto::ANY),
        "tcp" => Ok(proto::TCP),
        "udp" => Ok(proto::UDP),
        "icmp" => Ok(proto::ICMP),
        "igmp" => Ok(proto::IGMP),
        other => other
            .parse::<u8>()
            .map_err(|_| Error::Config(format!("unsupported protocol '{}'", token))),
    }
}

/// `ANY`, `HOST a`, or `a [wildcard]`
fn parse_address(tokens: &mut Tokens<'_>) -> Result<(Ipv4Addr, Ipv4Addr)> {
    if tokens.eat("any") {
        return Ok((Ipv4Addr::UNSPECIFIED, ANY_WILDCARD));
    }
    if tokens.eat("host") {
        return Ok((tokens.address("host address")?, Ipv4Addr::UNSPECIFIED));
    }
    let addr = tokens.address("address")?;
    let wildcard = match tokens.peek().and_then(|t| t.parse::<Ipv4Addr>().ok()) {
        Some(wildcard) => {
            tokens.next();
            wildcard
        }
        None => Ipv4Addr::UNSPECIFIED,
    };
    Ok((addr, wildcard))
}

fn port_value(protocol: u8, token: &str) -> Result<u16> {
    let table = if protocol == proto::TCP {
        TCP_PORT_NAMES
    } else {
        UDP_PORT_NAMES
    };
    lookup(table, token)
        .or_else(|| token.parse::<u16>().ok())
        .ok_or_else(|| Error::Config(format!("invalid port '{}'", token)))
}

/// Optional `op port` or `RANGE min max`
fn parse_port(protocol: u8, tokens: &mut Tokens<'_>) -> Result<Option<PortMatch>> {
    let Some(operator) = tokens.peek().and_then(PortOperator::parse) else {
        return Ok(None);
    };
    tokens.next();
    let first = port_value(protocol, tokens.expect("port")?)?;
    if operator == PortOperator::Range {
        let last = port_value(protocol, tokens.expect("range upper port")?)?;
        if last < first {
            return Err(Error::Config(format!("empty port range {} {}", first, last)));
        }
        return Ok(Some(PortMatch::range(first, last)));
    }
    Ok(Some(PortMatch::new(operator, first)))
}

fn parse_icmp(tokens: &mut Tokens<'_>) -> Result<Option<(i32, i32)>> {
    let Some(token) = tokens.peek() else {
        return Ok(None);
    };
    if let Some((_, icmp_type, code)) = ICMP_NAMES
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(token))
    {
        tokens.next();
        return Ok(Some((
            i32::from(*icmp_type),
            code.map(i32::from).unwrap_or(-1),
        )));
    }
    let Ok(icmp_type) = token.parse::<u8>() else {
        return Ok(None);
    };
    tokens.next();
    let code = match tokens.peek().and_then(|t| t.parse::<u8>().ok()) {
        Some(code) => {
            tokens.next();
            i32::from(code)
        }
        None => -1,
    };
    Ok(Some((i32::from(icmp_type), code)))
}

fn parse_igmp(tokens: &mut Tokens<'_>) -> Result<Option<i32>> {
    let Some(token) = tokens.peek() else {
        return Ok(None);
    };
    let value = lookup(IGMP_NAMES, token).or_else(|| token.parse::<u8>().ok());
    if value.is_some() {
        tokens.next();
    }
    Ok(value.map(i32::from))
}

/// `PRECEDENCE`, `TOS`, `LOG`, `LOG-INPUT` and `REFLECT name [TIMEOUT s]`
fn parse_trailer(rule: &mut AccessListRule, tokens: &mut Tokens<'_>) -> Result<()> {
    while let Some(token) = tokens.next() {
        match token.to_ascii_lowercase().as_str() {
            "log" => rule.log = LogMode::Log,
            "log-input" => rule.log = LogMode::LogInput,
            "precedence" if rule.kind == ListKind::Extended => {
                rule.precedence = i32::from(parse_precedence(tokens.expect("precedence")?)?);
            }
            "tos" if rule.kind == ListKind::Extended => {
                rule.tos = i32::from(parse_tos(tokens.expect("tos")?)?);
            }
            "reflect" if rule.kind == ListKind::Extended => {
                let name = tokens.expect("reflexive list name")?.to_string();
                let timeout = if tokens.eat("timeout") {
                    Some(parse_reflexive_timeout(tokens.expect("timeout")?)?)
                } else {
                    None
                };
                rule.reflect = Some(ReflectSpec { name, timeout });
            }
            "reflect" => {
                return Err(Error::Config(
                    "REFLECT not applicable to standard lists".into(),
                ));
            }
            _ => return Err(Error::Config(format!("unexpected '{}'", token))),
        }
    }
    Ok(())
}

/// Reflexive timeout in seconds, 0..2147483
pub fn parse_reflexive_timeout(token: &str) -> Result<Duration> {
    match token.parse::<u64>() {
        Ok(secs) if secs <= MAX_TIMEOUT_SECS => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "reflexive timeout '{}' outside 0..{}",
            token, MAX_TIMEOUT_SECS
        ))),
    }
}
