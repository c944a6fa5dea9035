//! Configuration management
//!
//! Handles the node file (user-defined TOML), its resolved form with every
//! default filled in, and the line-oriented router configuration each node
//! may point at.

mod router;
mod types;
mod validation;

pub use router::{apply as apply_router_config, node_section};
pub use types::*;
pub use validation::{validate, ValidationResult};

use std::net::Ipv4Addr;
use std::path::Path;

use tracing::{debug, info};

use crate::dataplane::{
    prefix_to_mask, Interface, Network, Node, RipInterfaceSettings, RipSettings,
};
use crate::protocol::rip::RipVersion;
use crate::telemetry::{TraceWriter, ACCESS_LIST_TRACE_FILE, PBR_TRACE_FILE};
use crate::{Error, Result};

/// Seed used when the node file does not set one
pub const DEFAULT_SEED: u64 = 1;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
    Ok(config)
}

/// Parse `a.b.c.d/len`
pub fn parse_address(s: &str) -> Result<(Ipv4Addr, u8)> {
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| Error::Config(format!("address '{}' missing prefix length", s)))?;
    let addr: Ipv4Addr = addr
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid address '{}'", s)))?;
    let len: u8 = len
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid prefix length in '{}'", s)))?;
    if len > 32 {
        return Err(Error::Config(format!("prefix length {} out of range in '{}'", len, s)));
    }
    Ok((addr, len))
}

/// Fill in every default. Fails on anything `validate` reports as an error.
pub fn resolve(config: &Config) -> Result<ResolvedConfig> {
    let result = validate(config);
    if let Some(first) = result.errors.first() {
        return Err(Error::Config(first.clone()));
    }

    let mut nodes = Vec::with_capacity(config.nodes.len());
    for node in &config.nodes {
        let runs_rip = node.rip_version.is_some();
        let mut interfaces = Vec::with_capacity(node.interfaces.len());
        for iface in &node.interfaces {
            let (address, prefix_len) = parse_address(&iface.address)?;
            interfaces.push(ResolvedInterface {
                index: iface.index,
                address,
                prefix_len,
                medium: iface.medium.unwrap_or_default(),
                enabled: iface.enabled.unwrap_or(true),
                rip: runs_rip && iface.rip.unwrap_or(true),
                rip_auto_summary: iface.rip_auto_summary.unwrap_or(true),
                rip_compatibility: iface.rip_compatibility.unwrap_or_default(),
            });
        }
        interfaces.sort_by_key(|i| i.index);

        nodes.push(ResolvedNode {
            id: node.id,
            access_list_statistics: node.access_list_statistics.unwrap_or(false),
            access_list_trace: node.access_list_trace.unwrap_or(false),
            policy_routing_statistics: node.policy_routing_statistics.unwrap_or(false),
            pbr_trace: node.pbr_trace.unwrap_or(false),
            router_config: node.router_config.clone(),
            rip: node.rip_version.map(|version| ResolvedRip {
                version,
                split_horizon: node.split_horizon.unwrap_or_default(),
                border_router: node.rip_border_router.unwrap_or(false),
            }),
            interfaces,
        });
    }

    Ok(ResolvedConfig {
        generated_at: chrono::Utc::now().to_rfc3339(),
        seed: config.simulation.seed.unwrap_or(DEFAULT_SEED),
        trace_dir: config
            .simulation
            .trace_dir
            .clone()
            .unwrap_or_else(|| ".".to_string()),
        log: config.log.clone().unwrap_or_default(),
        nodes,
    })
}

/// Build one node from its resolved configuration. Router configuration
/// paths are taken relative to `base_dir`.
pub fn build_node(resolved: &ResolvedConfig, node: &ResolvedNode, base_dir: &Path) -> Result<Node> {
    let interfaces = node
        .interfaces
        .iter()
        .map(|i| {
            let mut iface = Interface::new(i.index, i.address, prefix_to_mask(i.prefix_len), i.medium);
            iface.enabled = i.enabled;
            iface
        })
        .collect();
    let mut built = Node::new(node.id, interfaces);

    if let Some(rip) = &node.rip {
        let version = RipVersion::from_u8(rip.version)
            .ok_or_else(|| Error::Config(format!("node {}: unsupported RIP version {}", node.id, rip.version)))?;
        let settings = RipSettings {
            version,
            split_horizon: rip.split_horizon,
            border_router: rip.border_router,
            interfaces: node
                .interfaces
                .iter()
                .map(|i| RipInterfaceSettings {
                    active: i.rip,
                    auto_summary: i.rip_auto_summary,
                    compatibility: i.rip_compatibility,
                })
                .collect(),
        };
        built.enable_rip(settings, resolved.seed);
    }

    let trace_dir = Path::new(&resolved.trace_dir);
    let acl_trace = node
        .access_list_trace
        .then(|| TraceWriter::new(trace_dir.join(ACCESS_LIST_TRACE_FILE)));
    let pbr_trace = node
        .pbr_trace
        .then(|| TraceWriter::new(trace_dir.join(PBR_TRACE_FILE)));
    built.policy_mut().set_traces(acl_trace, pbr_trace);

    if let Some(file) = &node.router_config {
        let path = base_dir.join(file);
        let text = std::fs::read_to_string(&path).map_err(Error::Io)?;
        for shown in router::apply(&mut built, &text)? {
            info!(node = node.id, "\n{}", shown);
        }
        debug!(node = node.id, path = %path.display(), "router configuration applied");
    }

    Ok(built)
}

/// Build the whole simulated network
pub fn build_network(resolved: &ResolvedConfig, base_dir: &Path) -> Result<Network> {
    let mut network = Network::new();
    for node in &resolved.nodes {
        network.add_node(build_node(resolved, node, base_dir)?)?;
    }
    info!(nodes = resolved.nodes.len(), "network built");
    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::{Compatibility, ForwardingTable, Medium, SplitHorizon};

    const NODES: &str = r#"
[log]
level = "debug"

[simulation]
seed = 7

[[node]]
id = 1
rip-version = 2
split-horizon = "poisoned-reverse"
access-list-statistics = true

[[node.interface]]
index = 1
address = "10.1.0.1/24"
rip-auto-summary = false

[[node.interface]]
index = 0
address = "10.0.0.1/24"
medium = "wireless"
rip-compatibility = "ripv1-compatible"

[[node]]
id = 2

[[node.interface]]
index = 0
address = "10.0.0.2/24"
enabled = false
"#;

    #[test]
    fn test_parse_address() {
        assert_eq!(
            parse_address("192.168.1.1/24").unwrap(),
            (Ipv4Addr::new(192, 168, 1, 1), 24)
        );
        assert!(parse_address("192.168.1.1").is_err());
        assert!(parse_address("192.168.1.1/40").is_err());
        assert!(parse_address("host/24").is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let config: Config = toml::from_str(NODES).unwrap();
        let resolved = resolve(&config).unwrap();

        assert_eq!(resolved.seed, 7);
        assert_eq!(resolved.trace_dir, ".");
        assert_eq!(resolved.log.level, "debug");
        assert!(chrono::DateTime::parse_from_rfc3339(&resolved.generated_at).is_ok());

        let first = &resolved.nodes[0];
        assert!(first.access_list_statistics);
        assert!(!first.pbr_trace);
        let rip = first.rip.as_ref().unwrap();
        assert_eq!(rip.version, 2);
        assert_eq!(rip.split_horizon, SplitHorizon::PoisonedReverse);
        assert!(!rip.border_router);

        // sorted by index
        assert_eq!(first.interfaces[0].index, 0);
        assert_eq!(first.interfaces[0].medium, Medium::Wireless);
        assert_eq!(first.interfaces[0].rip_compatibility, Compatibility::V1Compatible);
        assert!(first.interfaces[0].rip_auto_summary);
        assert!(!first.interfaces[1].rip_auto_summary);
        assert!(first.interfaces.iter().all(|i| i.rip && i.enabled));

        let second = &resolved.nodes[1];
        assert!(second.rip.is_none());
        assert!(!second.interfaces[0].rip);
        assert!(!second.interfaces[0].enabled);
    }

    #[test]
    fn test_resolve_rejects_invalid() {
        let mut config: Config = toml::from_str(NODES).unwrap();
        config.nodes[1].id = 1;
        assert!(resolve(&config).is_err());
    }

    #[test]
    fn test_resolved_round_trips_through_toml() {
        let config: Config = toml::from_str(NODES).unwrap();
        let resolved = resolve(&config).unwrap();
        let text = toml::to_string_pretty(&resolved).unwrap();
        let back: ResolvedConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, resolved);
    }

    #[test]
    fn test_build_network() {
        let config: Config = toml::from_str(NODES).unwrap();
        let resolved = resolve(&config).unwrap();
        let network = build_network(&resolved, Path::new(".")).unwrap();

        let first = network.node(1).unwrap();
        assert!(first.rip().is_some());
        assert_eq!(first.interfaces().len(), 2);
        assert!(first.fib().lookup(Ipv4Addr::new(10, 1, 0, 9)).is_some());

        let second = network.node(2).unwrap();
        assert!(second.rip().is_none());
        assert!(second.fib().lookup(Ipv4Addr::new(10, 0, 0, 9)).is_none());
    }

    #[test]
    fn test_missing_router_config_file() {
        let mut config: Config = toml::from_str(NODES).unwrap();
        config.nodes[0].router_config = Some("does-not-exist.cfg".to_string());
        let resolved = resolve(&config).unwrap();
        assert!(matches!(
            build_network(&resolved, Path::new("/nonexistent")),
            Err(Error::Io(_))
        ));
    }
}
