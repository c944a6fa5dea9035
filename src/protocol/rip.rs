//! RIP protocol - RFC 1058, RFC 2453
//!
//! Message parsing and building for RIPv1 and RIPv2. Authentication entries
//! are recognized but never verified.

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// RIP UDP port
pub const RIP_PORT: u16 = 520;

/// RIPv2 multicast group
pub const RIP_MULTICAST: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 9);

/// Command + version + must-be-zero
pub const HEADER_SIZE: usize = 4;

/// Size of one route table entry
pub const RTE_SIZE: usize = 20;

/// Maximum route entries carried in one message
pub const MAX_RTES: usize = 25;

/// Largest message on the wire (4 + 25 * 20)
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_RTES * RTE_SIZE;

/// Unreachable metric
pub const INFINITY: u32 = 16;

/// Address family identifiers
pub mod afi {
    /// Whole-table request marker
    pub const UNSPECIFIED: u16 = 0;
    pub const IP: u16 = 2;
    pub const AUTHENTICATION: u16 = 0xFFFF;
}

/// RIP commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RipCommand {
    Request = 1,
    Response = 2,
}

impl RipCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RipCommand::Request),
            2 => Some(RipCommand::Response),
            _ => None,
        }
    }
}

/// Protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RipVersion {
    V1 = 1,
    V2 = 2,
}

impl RipVersion {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RipVersion::V1),
            2 => Some(RipVersion::V2),
            _ => None,
        }
    }
}

/// Route table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rte {
    pub afi: u16,
    pub tag: u16,
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
}

impl Rte {
    /// IP route entry
    pub fn route(address: Ipv4Addr, mask: Ipv4Addr, next_hop: Ipv4Addr, metric: u32, tag: u16) -> Self {
        Self {
            afi: afi::IP,
            tag,
            address,
            mask,
            next_hop,
            metric,
        }
    }

    /// The single entry of a whole-table request
    pub fn whole_table_request() -> Self {
        Self {
            afi: afi::UNSPECIFIED,
            tag: 0,
            address: Ipv4Addr::UNSPECIFIED,
            mask: Ipv4Addr::UNSPECIFIED,
            next_hop: Ipv4Addr::UNSPECIFIED,
            metric: INFINITY,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.afi == afi::AUTHENTICATION
    }

    pub fn is_whole_table_request(&self) -> bool {
        self.afi == afi::UNSPECIFIED && self.metric == INFINITY
    }

    fn parse(chunk: &[u8]) -> Self {
        let addr = |offset: usize| {
            Ipv4Addr::new(
                chunk[offset],
                chunk[offset + 1],
                chunk[offset + 2],
                chunk[offset + 3],
            )
        };
        Self {
            afi: u16::from_be_bytes([chunk[0], chunk[1]]),
            tag: u16::from_be_bytes([chunk[2], chunk[3]]),
            address: addr(4),
            mask: addr(8),
            next_hop: addr(12),
            metric: u32::from_be_bytes([chunk[16], chunk[17], chunk[18], chunk[19]]),
        }
    }

    fn write(&self, version: RipVersion, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.afi.to_be_bytes());
        match version {
            // Must-be-zero fields in RIPv1
            RipVersion::V1 => {
                buffer.extend_from_slice(&[0, 0]);
                buffer.extend_from_slice(&self.address.octets());
                buffer.extend_from_slice(&[0; 8]);
            }
            RipVersion::V2 => {
                buffer.extend_from_slice(&self.tag.to_be_bytes());
                buffer.extend_from_slice(&self.address.octets());
                buffer.extend_from_slice(&self.mask.octets());
                buffer.extend_from_slice(&self.next_hop.octets());
            }
        }
        buffer.extend_from_slice(&self.metric.to_be_bytes());
    }
}

/// Decoded RIP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipPacket {
    pub command: RipCommand,
    pub version: RipVersion,
    pub entries: Vec<Rte>,
}

impl RipPacket {
    /// Parse a RIP message (UDP payload)
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("RIP message too short".into()));
        }

        let command = RipCommand::from_u8(buffer[0])
            .ok_or_else(|| Error::Parse(format!("unknown RIP command {}", buffer[0])))?;
        let version = RipVersion::from_u8(buffer[1])
            .ok_or_else(|| Error::Parse(format!("unsupported RIP version {}", buffer[1])))?;

        let body = &buffer[HEADER_SIZE..];
        if body.len() % RTE_SIZE != 0 {
            return Err(Error::Parse("RIP message has a partial route entry".into()));
        }

        let entries = body.chunks_exact(RTE_SIZE).map(Rte::parse).collect();

        Ok(Self {
            command,
            version,
            entries,
        })
    }

    /// Whether the first entry is an authentication TLV
    pub fn is_authenticated(&self) -> bool {
        self.entries.first().is_some_and(Rte::is_authentication)
    }
}

/// Builder for RIP messages
#[derive(Debug, Clone)]
pub struct RipBuilder {
    command: RipCommand,
    version: RipVersion,
    entries: Vec<Rte>,
}

impl RipBuilder {
    pub fn new(command: RipCommand, version: RipVersion) -> Self {
        Self {
            command,
            version,
            entries: Vec::new(),
        }
    }

    pub fn request(version: RipVersion) -> Self {
        Self::new(RipCommand::Request, version).entry(Rte::whole_table_request())
    }

    pub fn entry(mut self, rte: Rte) -> Self {
        self.entries.push(rte);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_RTES
    }

    /// Add an entry in place, refusing past the per-message limit
    pub fn push(&mut self, rte: Rte) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(rte);
        true
    }

    pub fn build(self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE + self.entries.len() * RTE_SIZE);
        buffer.push(self.command as u8);
        buffer.push(self.version as u8);
        buffer.extend_from_slice(&[0, 0]);
        for rte in &self.entries {
            rte.write(self.version, &mut buffer);
        }
        buffer
    }
}
