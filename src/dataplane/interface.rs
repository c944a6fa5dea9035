//! Node interfaces

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Link medium of an interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Medium {
    /// Point-to-point or broadcast wire (subnet routes, subnet broadcast)
    #[default]
    Wired,
    /// Shared radio channel (host routes, limited broadcast)
    Wireless,
    /// Point-to-point tunnel
    Tunnel,
}

/// A numbered interface of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub index: usize,
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub medium: Medium,
    pub enabled: bool,
}

impl Interface {
    pub fn new(index: usize, address: Ipv4Addr, mask: Ipv4Addr, medium: Medium) -> Self {
        Self {
            index,
            address,
            mask,
            medium,
            enabled: true,
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & u32::from(self.mask))
    }

    /// Directed broadcast of the attached subnet
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) | !u32::from(self.mask))
    }

    /// Whether `addr` lies in the attached subnet
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & u32::from(self.mask) == u32::from(self.network())
    }

    pub fn is_wired(&self) -> bool {
        self.medium == Medium::Wired
    }
}

/// Mask with `prefix_len` leading ones
pub fn prefix_to_mask(prefix_len: u8) -> Ipv4Addr {
    if prefix_len == 0 {
        Ipv4Addr::UNSPECIFIED
    } else {
        Ipv4Addr::from(!0u32 << (32 - u32::from(prefix_len.min(32))))
    }
}

/// Number of leading ones of a contiguous mask
pub fn mask_to_prefix(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

/// Whether `addr` is one of the node's own interface addresses
pub fn is_own_address(interfaces: &[Interface], addr: Ipv4Addr) -> bool {
    interfaces.iter().any(|i| i.address == addr)
}

/// Whether `addr` falls inside one of the node's attached subnets
pub fn is_attached(interfaces: &[Interface], addr: Ipv4Addr) -> bool {
    interfaces.iter().any(|i| i.contains(addr))
}
