//! Telemetry module for logging, statistics and trace files.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters for access-list, policy-routing and RIP statistics
//! - Best-effort packet trace writers

mod logging;
mod metrics;
mod trace;

pub use logging::{init_logging, LogConfig};
pub use metrics::{
    AclInterfaceStats, AclStats, Counter, DirectionDrops, DropReason, PbrBindingStats, PbrStats,
    RipStats,
};
pub use trace::{TraceWriter, ACCESS_LIST_TRACE_FILE, PBR_TRACE_FILE};
