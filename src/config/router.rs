//! Line-oriented router configuration
//!
//! One text file may configure several routers; each router's statements
//! follow a `NODE-IDENTIFIER id` line. Keywords are case-insensitive and
//! lines that belong to no known statement are ignored, so the same file
//! can carry statements for other protocols.
//!
//! Access lists, interfaces and route maps are read first. Policy routing
//! bindings are read in a second pass so they can name route maps defined
//! further down.

use tracing::debug;

use crate::dataplane::acl::{AclId, Direction};
use crate::dataplane::acl_parser::{parse_reflexive_timeout, parse_statement, AclStatement, Tokens};
use crate::dataplane::route_map_parser::{parse_header, parse_match, parse_removal, parse_set};
use crate::dataplane::{ListKind, Node};
use crate::{Error, Result};

/// Lines of `text` belonging to router `node`, blank lines and `!`
/// comments removed
pub fn node_section(text: &str, node: u32) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut ours = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
            continue;
        }
        let mut tokens = Tokens::new(line);
        if tokens.eat("node-identifier") {
            ours = tokens.next().and_then(|t| t.parse::<u32>().ok()) == Some(node);
            continue;
        }
        if ours {
            lines.push(line);
        }
    }
    lines
}

/// Apply the statements for `node` found in `text`. Returns the output of
/// `SHOW` statements in order.
pub fn apply(node: &mut Node, text: &str) -> Result<Vec<String>> {
    let lines = node_section(text, node.id());
    let mut parser = Parser {
        node,
        named: None,
        interface: None,
        shown: Vec::new(),
    };
    for line in &lines {
        parser.statement(line).map_err(|e| in_line(parser.node.id(), line, e))?;
    }

    let mut interface = None;
    for line in &lines {
        policy_statement(parser.node, &mut interface, line)
            .map_err(|e| in_line(parser.node.id(), line, e))?;
    }
    Ok(parser.shown)
}

fn in_line(node: u32, line: &str, error: Error) -> Error {
    match error {
        Error::Config(message) => Error::router_config(node, line, message),
        other => other,
    }
}

struct Parser<'a> {
    node: &'a mut Node,
    /// Last named list; bare PERMIT/DENY/REMARK lines extend it
    named: Option<(AclId, ListKind)>,
    interface: Option<usize>,
    shown: Vec<String>,
}

impl Parser<'_> {
    fn statement(&mut self, line: &str) -> Result<()> {
        let mut tokens = Tokens::new(line);
        let Some(first) = tokens.peek() else {
            return Ok(());
        };

        match first.to_ascii_lowercase().as_str() {
            "access-list" => {
                tokens.next();
                self.numbered_list(&mut tokens)
            }
            "permit" | "deny" | "evaluate" | "remark" => self.named_list_line(&mut tokens),
            "interface" => {
                tokens.next();
                let index = tokens.number::<usize>("interface index")?;
                tokens.finish()?;
                if self.node.interface(index).is_none() {
                    return Err(Error::Config(format!("wrong interface index {}", index)));
                }
                self.interface = Some(index);
                Ok(())
            }
            "ip" => {
                tokens.next();
                self.ip_statement(&mut tokens)
            }
            "route-map" => {
                tokens.next();
                let (tag, map_type, seq) = parse_header(&mut tokens)?;
                self.node
                    .policy_mut()
                    .route_maps
                    .declare_entry(&tag, map_type, seq)
            }
            "match" => {
                tokens.next();
                let clause = parse_match(&mut tokens)?;
                self.node.policy_mut().route_maps.add_match(clause)
            }
            "set" => {
                tokens.next();
                let clause = parse_set(&mut tokens)?;
                self.node.policy_mut().route_maps.add_set(clause)
            }
            "no" => {
                tokens.next();
                self.removal(&mut tokens)
            }
            "show" => {
                tokens.next();
                if !tokens.eat("route-map") {
                    return Err(Error::Config("only SHOW ROUTE-MAP is supported".into()));
                }
                let tag = tokens.next();
                tokens.finish()?;
                let shown = self.node.policy().route_maps.show(tag);
                self.shown.push(shown);
                Ok(())
            }
            _ => {
                debug!(node = self.node.id(), "ignoring router config line '{}'", line);
                Ok(())
            }
        }
    }

    /// `ACCESS-LIST n PERMIT|DENY|REMARK ...`
    fn numbered_list(&mut self, tokens: &mut Tokens<'_>) -> Result<()> {
        let id = AclId::parse(tokens.expect("access list number")?)?;
        let Some(kind) = id.numbered_kind() else {
            return Err(Error::Config(format!(
                "access list number expected, found '{}'",
                id
            )));
        };
        self.add_statement(&id, kind, tokens)
    }

    fn named_list_line(&mut self, tokens: &mut Tokens<'_>) -> Result<()> {
        let Some((id, kind)) = self.named.clone() else {
            return Err(Error::Config("no named access list to extend".into()));
        };
        self.add_statement(&id, kind, tokens)
    }

    fn add_statement(&mut self, id: &AclId, kind: ListKind, tokens: &mut Tokens<'_>) -> Result<()> {
        let acl = &mut self.node.policy_mut().acl;
        match parse_statement(id, kind, tokens)? {
            AclStatement::Rule(rule) => acl.add_rule(rule).map(|_| ()),
            AclStatement::Remark(text) => acl.add_remark(id, kind, &text),
            AclStatement::Evaluate(name) => acl.add_evaluate(id, &name),
        }
    }

    fn ip_statement(&mut self, tokens: &mut Tokens<'_>) -> Result<()> {
        if tokens.eat("access-list") {
            let kind = if tokens.eat("standard") {
                ListKind::Standard
            } else if tokens.eat("extended") {
                ListKind::Extended
            } else {
                return Err(Error::Config("expected STANDARD or EXTENDED".into()));
            };
            let name = tokens.expect("access list name")?;
            tokens.finish()?;
            if AclId::parse(name)?.numbered_kind().is_some() {
                return Err(Error::Config(format!("'{}' is not a list name", name)));
            }
            self.node.policy_mut().acl.declare_named(name, kind)?;
            self.named = Some((AclId::Name(name.to_string()), kind));
            return Ok(());
        }

        if tokens.eat("access-group") {
            let Some(interface) = self.interface else {
                return Err(Error::Config("IP ACCESS-GROUP outside of an INTERFACE".into()));
            };
            let id = AclId::parse(tokens.expect("access list")?)?;
            let direction = if tokens.eat("in") {
                Direction::In
            } else if tokens.eat("out") {
                Direction::Out
            } else {
                return Err(Error::Config("expected IN or OUT".into()));
            };
            tokens.finish()?;
            self.node.policy_mut().acl.bind(interface, direction, id);
            return Ok(());
        }

        if tokens.eat("address") {
            let address = tokens.address("interface address")?;
            if !tokens.is_empty() {
                tokens.address("subnet mask")?;
                if !tokens.is_empty() && !tokens.eat("secondary") {
                    return Err(Error::Config("expected SECONDARY".into()));
                }
            }
            tokens.finish()?;
            // selects the interface owning the address
            match self.node.interfaces().iter().find(|i| i.address == address) {
                Some(iface) => self.interface = Some(iface.index),
                None => debug!(node = self.node.id(), "no interface with address {}", address),
            }
            return Ok(());
        }

        if tokens.eat("reflexive-list") {
            if !tokens.eat("timeout") {
                return Err(Error::Config("expected TIMEOUT".into()));
            }
            let timeout = parse_reflexive_timeout(tokens.expect("timeout")?)?;
            tokens.finish()?;
            self.node.policy_mut().acl.set_reflexive_timeout(timeout);
            return Ok(());
        }

        // IP [LOCAL] POLICY ROUTE-MAP is read in the second pass
        Ok(())
    }

    /// `NO ROUTE-MAP|MATCH|SET|ACCESS-LIST ...`
    fn removal(&mut self, tokens: &mut Tokens<'_>) -> Result<()> {
        let maps = &mut self.node.policy_mut().route_maps;
        if tokens.eat("route-map") {
            let (tag, seq) = parse_removal(tokens)?;
            return maps.remove(&tag, seq);
        }
        if tokens.eat("match") {
            let clause = parse_match(tokens)?;
            return maps.remove_match(&clause).map(|_| ());
        }
        if tokens.eat("set") {
            let clause = parse_set(tokens)?;
            return maps.remove_set(&clause).map(|_| ());
        }
        if tokens.eat("access-list") {
            let id = AclId::parse(tokens.expect("access list")?)?;
            tokens.finish()?;
            self.node.policy_mut().acl.remove_list(&id);
            return Ok(());
        }
        Err(Error::Config("expected ROUTE-MAP, MATCH, SET or ACCESS-LIST after NO".into()))
    }
}

/// `INTERFACE n` and `IP [LOCAL] POLICY ROUTE-MAP tag`
fn policy_statement(node: &mut Node, interface: &mut Option<usize>, line: &str) -> Result<()> {
    let mut tokens = Tokens::new(line);
    if tokens.eat("interface") {
        // validated in the first pass
        *interface = tokens.next().and_then(|t| t.parse().ok());
        return Ok(());
    }
    if !tokens.eat("ip") {
        return Ok(());
    }
    let local = tokens.eat("local");
    if !(tokens.eat("policy") && tokens.eat("route-map")) {
        return Ok(());
    }
    let tag = tokens.expect("route map tag")?;
    tokens.finish()?;

    let binding = if local {
        None
    } else {
        match *interface {
            Some(index) => Some(index),
            None => {
                return Err(Error::Config(
                    "interface index not defined before setting policy routing".into(),
                ))
            }
        }
    };
    let context = node.policy_mut();
    context.pbr.bind(binding, tag, &context.route_maps)?;
    Ok(())
}
