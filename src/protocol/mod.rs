//! Wire formats
//!
//! Header views used for packet classification and the RIP message codec.

pub mod icmp;
pub mod ipv4;
pub mod rip;
pub mod tcp;
pub mod udp;
