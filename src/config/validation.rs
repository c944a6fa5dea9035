//! Configuration validation

use std::collections::HashSet;

use super::{parse_address, Config, NodeConfig};

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.nodes.is_empty() {
        result.warn("no [[node]] defined, nothing to simulate");
    }

    let mut ids = HashSet::new();
    for node in &config.nodes {
        if !ids.insert(node.id) {
            result.error(format!("node {}: duplicate node id", node.id));
        }
        validate_interfaces(node, &mut result);
        validate_rip(node, &mut result);
    }

    result
}

fn validate_interfaces(node: &NodeConfig, result: &mut ValidationResult) {
    if node.interfaces.is_empty() {
        result.warn(format!("node {}: no interfaces defined", node.id));
    }

    let mut indexes = HashSet::new();
    for iface in &node.interfaces {
        if !indexes.insert(iface.index) {
            result.error(format!(
                "node {}: interface {} defined twice",
                node.id, iface.index
            ));
        }
        if let Err(e) = parse_address(&iface.address) {
            result.error(format!(
                "node {}: interface {}: {}",
                node.id, iface.index, e
            ));
        }
    }

    // Interface indexes address a dense table
    if let Some(max) = node.interfaces.iter().map(|i| i.index).max() {
        if max + 1 != node.interfaces.len() && indexes.len() == node.interfaces.len() {
            result.error(format!(
                "node {}: interface indexes must run from 0 to {} without gaps",
                node.id,
                node.interfaces.len() - 1
            ));
        }
    }
}

fn validate_rip(node: &NodeConfig, result: &mut ValidationResult) {
    match node.rip_version {
        Some(1) | Some(2) => {}
        Some(v) => result.error(format!(
            "node {}: rip-version should be either 1 or 2, got {}",
            node.id, v
        )),
        None => {
            let rip_keys = node.split_horizon.is_some()
                || node.rip_border_router.is_some()
                || node.interfaces.iter().any(|i| {
                    i.rip.is_some() || i.rip_auto_summary.is_some() || i.rip_compatibility.is_some()
                });
            if rip_keys {
                result.warn(format!(
                    "node {}: RIP keys set without rip-version, RIP stays off",
                    node.id
                ));
            }
        }
    }

    if node.rip_version == Some(1) {
        for iface in &node.interfaces {
            if iface.rip_compatibility.is_some() {
                result.warn(format!(
                    "node {}: interface {}: rip-compatibility ignored for RIPv1",
                    node.id, iface.index
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceConfig;
    use crate::dataplane::{Compatibility, SplitHorizon};

    fn make_node(id: u32) -> NodeConfig {
        NodeConfig {
            id,
            interfaces: vec![make_interface(0, "10.0.0.1/24")],
            rip_version: Some(2),
            split_horizon: None,
            rip_border_router: None,
            access_list_statistics: None,
            access_list_trace: None,
            policy_routing_statistics: None,
            pbr_trace: None,
            router_config: None,
        }
    }

    fn make_interface(index: usize, address: &str) -> InterfaceConfig {
        InterfaceConfig {
            index,
            address: address.to_string(),
            medium: None,
            enabled: None,
            rip: None,
            rip_auto_summary: None,
            rip_compatibility: None,
        }
    }

    fn make_config(nodes: Vec<NodeConfig>) -> Config {
        Config {
            nodes,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = make_config(vec![make_node(1)]);
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_config_warns() {
        let result = validate(&Config::default());
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("no [[node]]")));
    }

    #[test]
    fn test_duplicate_node_id() {
        let config = make_config(vec![make_node(1), make_node(1)]);
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("duplicate node id")));
    }

    #[test]
    fn test_bad_interface_address() {
        let mut node = make_node(1);
        node.interfaces = vec![
            make_interface(0, "10.0.0.1/33"),
            make_interface(1, "10.0.0.300/24"),
        ];
        let result = validate(&make_config(vec![node]));
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_duplicate_interface_index() {
        let mut node = make_node(1);
        node.interfaces.push(make_interface(0, "10.1.0.1/24"));
        let result = validate(&make_config(vec![node]));
        assert!(result.errors.iter().any(|e| e.contains("defined twice")));
    }

    #[test]
    fn test_interface_gap() {
        let mut node = make_node(1);
        node.interfaces.push(make_interface(2, "10.1.0.1/24"));
        let result = validate(&make_config(vec![node]));
        assert!(result.errors.iter().any(|e| e.contains("without gaps")));
    }

    #[test]
    fn test_bad_rip_version() {
        let mut node = make_node(1);
        node.rip_version = Some(3);
        let result = validate(&make_config(vec![node]));
        assert!(result.errors.iter().any(|e| e.contains("either 1 or 2")));
    }

    #[test]
    fn test_rip_keys_without_version() {
        let mut node = make_node(1);
        node.rip_version = None;
        node.split_horizon = Some(SplitHorizon::PoisonedReverse);
        let result = validate(&make_config(vec![node]));
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("RIP stays off")));
    }

    #[test]
    fn test_compatibility_ignored_for_v1() {
        let mut node = make_node(1);
        node.rip_version = Some(1);
        node.interfaces[0].rip_compatibility = Some(Compatibility::V2Only);
        let result = validate(&make_config(vec![node]));
        assert!(!result.has_errors());
        assert!(result.warnings.iter().any(|w| w.contains("ignored for RIPv1")));
    }

    #[test]
    fn test_node_without_interfaces() {
        let mut node = make_node(1);
        node.interfaces.clear();
        let result = validate(&make_config(vec![node]));
        assert!(result.warnings.iter().any(|w| w.contains("no interfaces")));
    }
}
