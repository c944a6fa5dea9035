//! ICMP (RFC 792) and IGMP (RFC 2236) type fields
//!
//! Access lists match ICMP type/code and IGMP message type, so only the
//! leading bytes of each header are exposed.

use crate::{Error, Result};

/// ICMP header size (minimum)
pub const ICMP_HEADER_SIZE: usize = 8;

/// IGMP message size
pub const IGMP_HEADER_SIZE: usize = 8;

/// ICMP message types
pub mod icmp_type {
    pub const ECHO_REPLY: u8 = 0;
    pub const UNREACHABLE: u8 = 3;
    pub const SOURCE_QUENCH: u8 = 4;
    pub const REDIRECT: u8 = 5;
    pub const ALTERNATE_ADDRESS: u8 = 6;
    pub const ECHO: u8 = 8;
    pub const ROUTER_ADVERTISEMENT: u8 = 9;
    pub const ROUTER_SOLICITATION: u8 = 10;
    pub const TIME_EXCEEDED: u8 = 11;
    pub const PARAMETER_PROBLEM: u8 = 12;
    pub const TIMESTAMP_REQUEST: u8 = 13;
    pub const TIMESTAMP_REPLY: u8 = 14;
    pub const INFORMATION_REQUEST: u8 = 15;
    pub const INFORMATION_REPLY: u8 = 16;
    pub const MASK_REQUEST: u8 = 17;
    pub const MASK_REPLY: u8 = 18;
    pub const TRACEROUTE: u8 = 30;
    pub const CONVERSION_ERROR: u8 = 31;
    pub const MOBILE_REDIRECT: u8 = 32;
}

/// IGMP message types
pub mod igmp_type {
    pub const HOST_QUERY: u8 = 0x11;
    pub const HOST_REPORT: u8 = 0x12;
    pub const DVMRP: u8 = 0x13;
    pub const PIM: u8 = 0x14;
    pub const TRACE: u8 = 0x15;
}

/// Parsed ICMP header (zero-copy reference)
#[derive(Debug)]
pub struct IcmpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse("ICMP header too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }
}

/// Parsed IGMP header (zero-copy reference)
#[derive(Debug)]
pub struct IgmpHeader<'a> {
    buffer: &'a [u8],
}

impl<'a> IgmpHeader<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < IGMP_HEADER_SIZE {
            return Err(Error::Parse("IGMP header too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn igmp_type(&self) -> u8 {
        self.buffer[0]
    }
}

/// Minimal ICMP message (type, code, zero checksum and body)
pub fn build_icmp(icmp_type: u8, code: u8) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE];
    buffer[0] = icmp_type;
    buffer[1] = code;
    buffer
}

/// Minimal IGMP message of the given type
pub fn build_igmp(igmp_type: u8) -> Vec<u8> {
    let mut buffer = vec![0u8; IGMP_HEADER_SIZE];
    buffer[0] = igmp_type;
    buffer
}
