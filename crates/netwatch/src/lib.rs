//! Local network interface enumeration and change monitoring.
//!
//! [`snapshot`] captures the current IPv4 interface set; the
//! [`InterfaceMonitor`] polls it and emits an event whenever the set
//! changes. [`subnet`] holds the broadcast/host-range math used by the
//! discovery service.

pub mod monitor;
pub mod subnet;
pub mod types;

pub use monitor::{InterfaceMonitor, local_ipv4s, snapshot};
pub use types::{IfaceAddr, LinkKind, NetInterface};

use std::time::Duration;

/// Interface poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
