//! Zero-configuration peer discovery for the local broadcast domain.
//!
//! Peers announce themselves once a second over UDP broadcast and learn
//! about each other passively. When broadcast is filtered (guest Wi-Fi,
//! host firewalls), a one-shot subnet sweep probes the transfer port of
//! every host on directly attached /24-or-smaller subnets instead.

pub mod platform;
pub mod service;
pub mod sweep;
pub mod types;

pub use platform::os_tag;
pub use service::{DiscoveryConfig, DiscoveryService};
pub use sweep::probe_peer;
pub use types::{DiscoveryEvent, DiscoveryStatus, Peer};

use std::time::Duration;

/// Delay after a discovery (re)start before the sweep fallback arms.
pub const SWEEP_DELAY: Duration = Duration::from_secs(5);

/// Connect timeout for a single sweep probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Maximum probes in flight during a sweep.
pub const PROBE_BATCH: usize = 15;

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to bind discovery socket: {0}")]
    Bind(std::io::Error),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}
