//! Route-map statement grammar (`ROUTE-MAP`, `MATCH`, `SET`)

use super::acl::AclId;
use super::acl_parser::{parse_precedence, Tokens};
use super::route_map::{
    InterfaceRef, Level, MatchClause, MetricType, RouteMapType, RouteType, SetClause,
    DEFAULT_LOCAL_PREF, MAX_MATCH_LENGTH, MAX_SET_METRIC, MIN_SET_METRIC,
};
use crate::{Error, Result};

/// Interface types accepted in `interface` clauses
pub const INTERFACE_TYPES: &[&str] = &[
    "atm",
    "ethernet",
    "fastethernet",
    "gigabitethernet",
    "loopback",
    "serial",
    "tunnel",
    "wireless",
];

/// Bounds of `match as-path`
const AS_PATH_LISTS: std::ops::RangeInclusive<u32> = 1..=199;

/// `tag [PERMIT|DENY] [seq]` following `ROUTE-MAP`
pub fn parse_header(tokens: &mut Tokens<'_>) -> Result<(String, Option<RouteMapType>, Option<u32>)> {
    let tag = tokens.expect("route map tag")?.to_string();
    let map_type = if tokens.eat("permit") {
        Some(RouteMapType::Permit)
    } else if tokens.eat("deny") {
        Some(RouteMapType::Deny)
    } else {
        None
    };
    let seq = match tokens.peek() {
        Some(_) => Some(tokens.number::<u32>("sequence number")?),
        None => None,
    };
    tokens.finish()?;
    Ok((tag, map_type, seq))
}

/// `tag [seq]` following `NO ROUTE-MAP`
pub fn parse_removal(tokens: &mut Tokens<'_>) -> Result<(String, Option<u32>)> {
    let tag = tokens.expect("route map tag")?.to_string();
    // the type keyword is accepted and ignored
    let _ = tokens.eat("permit") || tokens.eat("deny");
    let seq = match tokens.peek() {
        Some(_) => Some(tokens.number::<u32>("sequence number")?),
        None => None,
    };
    tokens.finish()?;
    Ok((tag, seq))
}

fn rest_list<T>(
    tokens: &mut Tokens<'_>,
    what: &str,
    mut parse: impl FnMut(&str) -> Result<T>,
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    while let Some(token) = tokens.next() {
        items.push(parse(token)?);
    }
    if items.is_empty() {
        return Err(Error::Config(format!("missing {}", what)));
    }
    Ok(items)
}

fn parse_u32(token: &str, what: &str) -> Result<u32> {
    token
        .parse::<u32>()
        .map_err(|_| Error::Config(format!("invalid {} '{}'", what, token)))
}

fn parse_interfaces(tokens: &mut Tokens<'_>) -> Result<Vec<InterfaceRef>> {
    let mut interfaces = Vec::new();
    while let Some(kind) = tokens.next() {
        if !INTERFACE_TYPES.iter().any(|t| t.eq_ignore_ascii_case(kind)) {
            return Err(Error::Config(format!("invalid interface type '{}'", kind)));
        }
        let number = tokens.expect("interface number")?;
        interfaces.push(InterfaceRef::new(kind, number));
    }
    if interfaces.is_empty() {
        return Err(Error::Config("missing interface".into()));
    }
    Ok(interfaces)
}

fn parse_acl_lists(tokens: &mut Tokens<'_>) -> Result<Vec<AclId>> {
    rest_list(tokens, "access list", AclId::parse)
}

/// Everything after `MATCH`
pub fn parse_match(tokens: &mut Tokens<'_>) -> Result<MatchClause> {
    let keyword = tokens.expect("match keyword")?.to_ascii_lowercase();
    let clause = match keyword.as_str() {
        "as-path" => MatchClause::AsPath(rest_list(tokens, "as-path list", |t| {
            let n = parse_u32(t, "as-path list")?;
            if AS_PATH_LISTS.contains(&n) {
                Ok(n)
            } else {
                Err(Error::Config(format!("as-path list {} outside 1..199", n)))
            }
        })?),
        "community" => MatchClause::Community(rest_list(tokens, "community", |t| Ok(t.to_string()))?),
        "extcommunity" => {
            MatchClause::ExtCommunity(rest_list(tokens, "extcommunity", |t| Ok(t.to_string()))?)
        }
        "interface" => MatchClause::Interface(parse_interfaces(tokens)?),
        "ip" => {
            let kind = tokens.expect("ip match kind")?.to_ascii_lowercase();
            match kind.as_str() {
                "address" => MatchClause::IpAddress(parse_acl_lists(tokens)?),
                "next-hop" => MatchClause::IpNextHop(parse_acl_lists(tokens)?),
                "route-source" => MatchClause::IpRouteSource(parse_acl_lists(tokens)?),
                other => return Err(Error::Config(format!("unknown 'match ip {}'", other))),
            }
        }
        "length" => {
            let min = tokens.number::<u32>("minimum length")?;
            let max = tokens.number::<u32>("maximum length")?;
            if min > max || max > MAX_MATCH_LENGTH {
                return Err(Error::Config(format!("invalid length bounds {} {}", min, max)));
            }
            MatchClause::Length { min, max }
        }
        "metric" => MatchClause::Metric(tokens.number::<u32>("metric")?),
        "route-type" => {
            let kind = tokens.expect("route type")?.to_ascii_lowercase();
            MatchClause::RouteType(match kind.as_str() {
                "local" => RouteType::Local,
                "internal" => RouteType::Internal,
                "external" => {
                    if tokens.eat("type-1") {
                        RouteType::ExternalType1
                    } else {
                        tokens.eat("type-2");
                        RouteType::ExternalType2
                    }
                }
                "level-1" => RouteType::Level1,
                "level-2" => RouteType::Level2,
                other => return Err(Error::Config(format!("invalid route type '{}'", other))),
            })
        }
        "tag" => MatchClause::Tag(rest_list(tokens, "tag", |t| parse_u32(t, "tag"))?),
        other => return Err(Error::Config(format!("unknown match keyword '{}'", other))),
    };
    tokens.finish()?;
    Ok(clause)
}

fn parse_next_hops(tokens: &mut Tokens<'_>) -> Result<Vec<std::net::Ipv4Addr>> {
    rest_list(tokens, "next hop", |t| {
        t.parse()
            .map_err(|_| Error::Config(format!("invalid next hop '{}'", t)))
    })
}

/// Everything after `SET`
pub fn parse_set(tokens: &mut Tokens<'_>) -> Result<SetClause> {
    let keyword = tokens.expect("set keyword")?.to_ascii_lowercase();
    let clause = match keyword.as_str() {
        "automatic-tag" => SetClause::AutomaticTag,
        "default" => {
            if !tokens.eat("interface") {
                return Err(Error::Config("expected 'set default interface'".into()));
            }
            SetClause::DefaultInterface(parse_interfaces(tokens)?)
        }
        "interface" => SetClause::Interface(parse_interfaces(tokens)?),
        "ip" => {
            if tokens.eat("default") {
                if !tokens.eat("next-hop") {
                    return Err(Error::Config("expected 'set ip default next-hop'".into()));
                }
                if tokens.eat("verify-availability") {
                    SetClause::IpDefaultNextHopVerifyAvailability
                } else {
                    SetClause::IpDefaultNextHop(parse_next_hops(tokens)?)
                }
            } else if tokens.eat("next-hop") {
                if tokens.eat("verify-availability") {
                    SetClause::IpNextHopVerifyAvailability
                } else {
                    SetClause::IpNextHop(parse_next_hops(tokens)?)
                }
            } else if tokens.eat("precedence") {
                SetClause::IpPrecedence(parse_precedence(tokens.expect("precedence")?)?)
            } else {
                return Err(Error::Config("unknown 'set ip' clause".into()));
            }
        }
        "level" => {
            let token = tokens.expect("level")?;
            SetClause::Level(
                Level::parse(token)
                    .ok_or_else(|| Error::Config(format!("invalid level '{}'", token)))?,
            )
        }
        "local-preference" => SetClause::LocalPreference(match tokens.peek() {
            Some(_) => tokens.number::<u32>("local preference")?,
            None => DEFAULT_LOCAL_PREF,
        }),
        "metric" => {
            let token = tokens.expect("metric")?;
            let metric = token
                .parse::<i32>()
                .ok()
                .filter(|m| (MIN_SET_METRIC..=MAX_SET_METRIC).contains(m))
                .ok_or_else(|| Error::Config(format!("impermissible metric '{}'", token)))?;
            SetClause::Metric(metric)
        }
        "metric-type" => {
            let token = tokens.expect("metric type")?;
            SetClause::MetricType(
                MetricType::parse(token)
                    .ok_or_else(|| Error::Config(format!("invalid metric type '{}'", token)))?,
            )
        }
        "next-hop" => SetClause::NextHop(tokens.address("next hop")?),
        "tag" => SetClause::Tag(tokens.number::<u32>("tag")?),
        other => return Err(Error::Config(format!("unknown set keyword '{}'", other))),
    };
    tokens.finish()?;
    Ok(clause)
}
