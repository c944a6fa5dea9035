//! UDP protocol - RFC 768
//!
//! Access lists only look at the ports; RIP rides on UDP port 520.

use crate::{Error, Result};

/// UDP header size (fixed)
pub const HEADER_SIZE: usize = 8;

/// Source and destination port of the datagram in `buffer`
pub fn ports(buffer: &[u8]) -> Result<(u16, u16)> {
    match buffer {
        [s0, s1, d0, d1, _, _, _, _, ..] => Ok((
            u16::from_be_bytes([*s0, *s1]),
            u16::from_be_bytes([*d0, *d1]),
        )),
        _ => Err(Error::Parse("UDP header too short".into())),
    }
}

/// Builder for UDP datagrams (checksum left zero, which IPv4 permits)
#[derive(Debug, Clone, Default)]
pub struct UdpBuilder {
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl UdpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, data: &[u8]) -> Self {
        self.payload = data.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let length = (HEADER_SIZE + self.payload.len()) as u16;
        [
            &self.src_port.to_be_bytes()[..],
            &self.dst_port.to_be_bytes(),
            &length.to_be_bytes(),
            &[0, 0],
            &self.payload,
        ]
        .concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rip_ports() {
        let data = UdpBuilder::new()
            .src_port(520)
            .dst_port(520)
            .payload(&[2, 2, 0, 0])
            .build();
        assert_eq!(data.len(), 12);
        assert_eq!(u16::from_be_bytes([data[4], data[5]]), 12);
        assert_eq!(ports(&data).unwrap(), (520, 520));
    }

    #[test]
    fn test_header_too_short() {
        assert!(ports(&[0u8; 4]).is_err());
    }
}
