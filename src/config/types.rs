//! Configuration types

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::dataplane::{Compatibility, Medium, SplitHorizon};
use crate::telemetry::LogConfig;

/// User-defined node configuration (nodes.toml)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationConfig {
    /// Seed for the per-node jitter generators
    pub seed: Option<u64>,
    /// Directory the trace files are written to
    pub trace_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    pub id: u32,
    #[serde(default, rename = "interface")]
    pub interfaces: Vec<InterfaceConfig>,
    /// RIP runs on the node when set (1 or 2)
    pub rip_version: Option<u8>,
    pub split_horizon: Option<SplitHorizon>,
    pub rip_border_router: Option<bool>,
    pub access_list_statistics: Option<bool>,
    pub access_list_trace: Option<bool>,
    pub policy_routing_statistics: Option<bool>,
    pub pbr_trace: Option<bool>,
    /// Line-oriented router configuration, relative to this file
    pub router_config: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceConfig {
    pub index: usize,
    /// `a.b.c.d/len`
    pub address: String,
    pub medium: Option<Medium>,
    pub enabled: Option<bool>,
    /// RIP runs on this interface; defaults to on when the node runs RIP
    pub rip: Option<bool>,
    pub rip_auto_summary: Option<bool>,
    pub rip_compatibility: Option<Compatibility>,
}

// ============================================================================
// Resolved configuration (generated, includes all defaults)
// ============================================================================

/// Configuration with every default filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedConfig {
    pub generated_at: String,
    pub seed: u64,
    pub trace_dir: String,
    pub log: LogConfig,
    #[serde(rename = "node")]
    pub nodes: Vec<ResolvedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedNode {
    pub id: u32,
    pub access_list_statistics: bool,
    pub access_list_trace: bool,
    pub policy_routing_statistics: bool,
    pub pbr_trace: bool,
    pub router_config: Option<String>,
    pub rip: Option<ResolvedRip>,
    #[serde(rename = "interface")]
    pub interfaces: Vec<ResolvedInterface>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedRip {
    pub version: u8,
    pub split_horizon: SplitHorizon,
    pub border_router: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolvedInterface {
    pub index: usize,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub medium: Medium,
    pub enabled: bool,
    pub rip: bool,
    pub rip_auto_summary: bool,
    pub rip_compatibility: Compatibility,
}
