//! Tri-state field comparisons shared by access lists and route maps

use std::net::Ipv4Addr;

/// Outcome of comparing one rule field against a packet field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Match,
    NoMatch,
    /// The rule leaves this field unconstrained
    NotApplicable,
}

impl MatchResult {
    fn from_bool(matched: bool) -> Self {
        if matched {
            MatchResult::Match
        } else {
            MatchResult::NoMatch
        }
    }

    /// AND combination where `NotApplicable` is neutral
    pub fn and(self, other: MatchResult) -> MatchResult {
        match (self, other) {
            (MatchResult::NoMatch, _) | (_, MatchResult::NoMatch) => MatchResult::NoMatch,
            (MatchResult::NotApplicable, MatchResult::NotApplicable) => MatchResult::NotApplicable,
            _ => MatchResult::Match,
        }
    }

    /// True unless some applicable field failed
    pub fn is_satisfied(self) -> bool {
        self != MatchResult::NoMatch
    }
}

/// Combine a sequence of field results
pub fn combine<I>(results: I) -> MatchResult
where
    I: IntoIterator<Item = MatchResult>,
{
    results
        .into_iter()
        .fold(MatchResult::NotApplicable, MatchResult::and)
}

/// Port comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    /// Inclusive range, the rule carries (min, max)
    Range,
}

impl PortOperator {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "EQ" => Some(PortOperator::Eq),
            "NEQ" => Some(PortOperator::Neq),
            "GT" => Some(PortOperator::Gt),
            "LT" => Some(PortOperator::Lt),
            "RANGE" => Some(PortOperator::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortOperator::Eq => "eq",
            PortOperator::Neq => "neq",
            PortOperator::Gt => "gt",
            PortOperator::Lt => "lt",
            PortOperator::Range => "range",
        }
    }
}

/// A port constraint: operator, port, and upper bound for ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMatch {
    pub operator: PortOperator,
    pub port: u16,
    pub max_port: u16,
}

impl PortMatch {
    pub fn new(operator: PortOperator, port: u16) -> Self {
        Self {
            operator,
            port,
            max_port: port,
        }
    }

    pub fn range(min: u16, max: u16) -> Self {
        Self {
            operator: PortOperator::Range,
            port: min,
            max_port: max,
        }
    }

    pub fn exact(port: u16) -> Self {
        Self::new(PortOperator::Eq, port)
    }

    pub fn matches(&self, packet_port: u16) -> MatchResult {
        match_port(self, packet_port)
    }
}

/// Address under wildcard mask; an all-wildcard rule address means "any"
pub fn match_address(rule_addr: Ipv4Addr, wildcard: Ipv4Addr, candidate: Ipv4Addr) -> MatchResult {
    let care = !u32::from(wildcard);
    let rule = u32::from(rule_addr) & care;
    if rule == 0 {
        return MatchResult::NotApplicable;
    }
    MatchResult::from_bool(u32::from(candidate) & care == rule)
}

/// Port under operator. GT/LT compare rule against packet as written in
/// the rule (`rule > packet` for LT).
pub fn match_port(rule: &PortMatch, packet_port: u16) -> MatchResult {
    if rule.port == 0 {
        return MatchResult::NotApplicable;
    }
    let matched = match rule.operator {
        PortOperator::Eq => rule.port == packet_port,
        PortOperator::Neq => rule.port != packet_port,
        PortOperator::Gt => rule.port < packet_port,
        PortOperator::Lt => rule.port > packet_port,
        PortOperator::Range => rule.port <= packet_port && packet_port <= rule.max_port,
    };
    MatchResult::from_bool(matched)
}

/// Scalar with -1 as "unset"
pub fn match_scalar(rule_value: i32, packet_value: i32) -> MatchResult {
    if rule_value == -1 {
        return MatchResult::NotApplicable;
    }
    MatchResult::from_bool(rule_value == packet_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_address_any_is_not_applicable() {
        let any = match_address(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(255, 255, 255, 255),
            Ipv4Addr::new(10, 1, 2, 3),
        );
        assert_eq!(any, MatchResult::NotApplicable);

        // Address bits hidden by the wildcard also count as any
        let hidden = match_address(
            Ipv4Addr::new(0, 0, 0, 7),
            Ipv4Addr::new(0, 0, 0, 255),
            Ipv4Addr::new(10, 1, 2, 3),
        );
        assert_eq!(hidden, MatchResult::NotApplicable);
    }

    #[test]
    fn test_match_address_wildcard() {
        let rule = Ipv4Addr::new(10, 1, 0, 0);
        let wildcard = Ipv4Addr::new(0, 0, 255, 255);
        assert_eq!(
            match_address(rule, wildcard, Ipv4Addr::new(10, 1, 9, 9)),
            MatchResult::Match
        );
        assert_eq!(
            match_address(rule, wildcard, Ipv4Addr::new(10, 2, 0, 1)),
            MatchResult::NoMatch
        );
    }

    #[test]
    fn test_match_port_operators() {
        assert_eq!(match_port(&PortMatch::exact(0), 80), MatchResult::NotApplicable);
        assert_eq!(match_port(&PortMatch::exact(80), 80), MatchResult::Match);
        assert_eq!(
            match_port(&PortMatch::new(PortOperator::Neq, 80), 80),
            MatchResult::NoMatch
        );
        // GT 1023 matches ports above 1023
        assert_eq!(
            match_port(&PortMatch::new(PortOperator::Gt, 1023), 1024),
            MatchResult::Match
        );
        assert_eq!(
            match_port(&PortMatch::new(PortOperator::Gt, 1023), 1023),
            MatchResult::NoMatch
        );
        assert_eq!(
            match_port(&PortMatch::new(PortOperator::Lt, 1024), 22),
            MatchResult::Match
        );
    }

    #[test]
    fn test_match_port_range_inclusive() {
        let range = PortMatch::range(20, 21);
        assert_eq!(range.matches(20), MatchResult::Match);
        assert_eq!(range.matches(21), MatchResult::Match);
        assert_eq!(range.matches(22), MatchResult::NoMatch);
        assert_eq!(range.matches(19), MatchResult::NoMatch);
    }

    #[test]
    fn test_match_scalar_sentinel() {
        assert_eq!(match_scalar(-1, 5), MatchResult::NotApplicable);
        assert_eq!(match_scalar(5, 5), MatchResult::Match);
        assert_eq!(match_scalar(4, 5), MatchResult::NoMatch);
    }

    #[test]
    fn test_combine_neutral_fields() {
        use MatchResult::*;
        assert_eq!(combine([NotApplicable, NotApplicable]), NotApplicable);
        assert_eq!(combine([NotApplicable, Match]), Match);
        assert_eq!(combine([Match, NoMatch, NotApplicable]), NoMatch);
        assert!(combine([NotApplicable]).is_satisfied());
        assert!(!combine([NoMatch]).is_satisfied());
    }
}
