//! IPv4 protocol - RFC 791
//!
//! Header view for classification plus an owned packet whose type-of-service
//! byte can be rewritten by policy routing.

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// IP protocol numbers understood by the access-list matcher
pub mod proto {
    pub const ANY: u8 = 0;
    pub const ICMP: u8 = 1;
    pub const IGMP: u8 = 2;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

/// Precedence occupies the top three bits of the TOS byte
pub const PRECEDENCE_SHIFT: u8 = 5;

/// TOS bits with the precedence cleared
const PRECEDENCE_CLEAR_MASK: u8 = 0x1F;

fn check_header(buffer: &[u8]) -> Result<usize> {
    if buffer.len() < MIN_HEADER_SIZE {
        return Err(Error::Parse("IPv4 header too short".into()));
    }

    if buffer[0] >> 4 != 4 {
        return Err(Error::Parse("not an IPv4 packet".into()));
    }

    let header_len = ((buffer[0] & 0x0F) as usize) * 4;
    if header_len < MIN_HEADER_SIZE || buffer.len() < header_len {
        return Err(Error::Parse("IPv4 header truncated".into()));
    }

    Ok(header_len)
}

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        let header_len = check_header(buffer)?;
        Ok(Self { buffer, header_len })
    }

    /// Full type-of-service byte
    pub fn tos(&self) -> u8 {
        self.buffer[1]
    }

    /// IP precedence (0..7)
    pub fn precedence(&self) -> u8 {
        self.buffer[1] >> PRECEDENCE_SHIFT
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Transport payload
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }
}

/// RFC 1071 checksum over a header slice
pub fn checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in header.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += word as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Owned IPv4 datagram travelling through the forwarding path
#[derive(Debug, Clone)]
pub struct Ipv4Packet {
    buffer: Vec<u8>,
    header_len: usize,
}

impl Ipv4Packet {
    /// Create from raw bytes (copies the data)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header_len = check_header(data)?;
        Ok(Self {
            buffer: data.to_vec(),
            header_len,
        })
    }

    /// Borrow as a header view
    pub fn header(&self) -> Ipv4Header<'_> {
        Ipv4Header {
            buffer: &self.buffer,
            header_len: self.header_len,
        }
    }

    pub fn tos(&self) -> u8 {
        self.buffer[1]
    }

    pub fn precedence(&self) -> u8 {
        self.buffer[1] >> PRECEDENCE_SHIFT
    }

    /// Rewrite the precedence bits, keeping the rest of the TOS byte
    pub fn set_precedence(&mut self, precedence: u8) {
        let tos = (self.buffer[1] & PRECEDENCE_CLEAR_MASK) | ((precedence & 0x07) << PRECEDENCE_SHIFT);
        self.buffer[1] = tos;
        self.update_checksum();
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        self.header().src_addr()
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        self.header().dst_addr()
    }

    /// Recalculate and update header checksum
    pub fn update_checksum(&mut self) {
        self.buffer[10] = 0;
        self.buffer[11] = 0;
        let sum = checksum(&self.buffer[..self.header_len]);
        self.buffer[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    pub fn validate_checksum(&self) -> bool {
        checksum(&self.buffer[..self.header_len]) == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Builder for constructing IPv4 packets
#[derive(Debug, Clone)]
pub struct Ipv4Builder {
    tos: u8,
    ttl: u8,
    protocol: u8,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
    payload: Vec<u8>,
}

impl Ipv4Builder {
    pub fn new() -> Self {
        Self {
            tos: 0,
            ttl: 64,
            protocol: proto::ANY,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            payload: Vec::new(),
        }
    }

    pub fn tos(mut self, tos: u8) -> Self {
        self.tos = tos;
        self
    }

    pub fn precedence(mut self, precedence: u8) -> Self {
        self.tos = (self.tos & PRECEDENCE_CLEAR_MASK) | ((precedence & 0x07) << PRECEDENCE_SHIFT);
        self
    }

    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn protocol(mut self, protocol: u8) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn src_addr(mut self, addr: Ipv4Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv4Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_length = (MIN_HEADER_SIZE + self.payload.len()) as u16;
        let mut buffer = vec![0u8; MIN_HEADER_SIZE + self.payload.len()];

        // Version 4, IHL 5
        buffer[0] = 0x45;
        buffer[1] = self.tos;
        buffer[2..4].copy_from_slice(&total_length.to_be_bytes());
        // DF set, no fragmentation
        buffer[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
        buffer[8] = self.ttl;
        buffer[9] = self.protocol;
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[MIN_HEADER_SIZE..].copy_from_slice(&self.payload);

        let sum = checksum(&buffer[..MIN_HEADER_SIZE]);
        buffer[10..12].copy_from_slice(&sum.to_be_bytes());

        buffer
    }
}

impl Default for Ipv4Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        Ipv4Builder::new()
            .tos(0x1C)
            .protocol(proto::UDP)
            .src_addr(Ipv4Addr::new(10, 0, 1, 2))
            .dst_addr(Ipv4Addr::new(10, 0, 2, 2))
            .payload(&[0u8; 12])
            .build()
    }

    #[test]
    fn test_parse_built_header() {
        let data = sample();
        let header = Ipv4Header::parse(&data).unwrap();
        assert_eq!(header.protocol(), proto::UDP);
        assert_eq!(header.src_addr(), Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(header.dst_addr(), Ipv4Addr::new(10, 0, 2, 2));
        assert_eq!(header.total_length(), 32);
        assert_eq!(header.payload().len(), 12);
        assert_eq!(header.tos(), 0x1C);
        assert_eq!(header.precedence(), 0);
    }

    #[test]
    fn test_parse_rejects_short_and_non_v4() {
        assert!(Ipv4Header::parse(&[0x45; 10]).is_err());

        let mut data = sample();
        data[0] = 0x65;
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_set_precedence_keeps_low_tos_bits() {
        let mut packet = Ipv4Packet::from_bytes(&sample()).unwrap();
        packet.set_precedence(5);

        assert_eq!(packet.precedence(), 5);
        assert_eq!(packet.tos() & 0x1F, 0x1C);
        assert!(packet.validate_checksum());
    }

    #[test]
    fn test_builder_precedence() {
        let data = Ipv4Builder::new().precedence(6).build();
        let header = Ipv4Header::parse(&data).unwrap();
        assert_eq!(header.precedence(), 6);
        assert_eq!(checksum(&data[..MIN_HEADER_SIZE]), 0);
    }
}
