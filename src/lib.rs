//! ctlplane - Router control-plane core
//!
//! RIP, access lists, route maps and policy-based routing for simulated
//! router nodes. Every engine is timer driven through a per-node event
//! queue, so whole networks run deterministically in simulated time.

pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
