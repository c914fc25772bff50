use std::net::Ipv4Addr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A remote host participating in the protocol.
///
/// Keyed by IPv4 address. `name` is the hostname the peer announced, or a
/// synthesized label when only the TCP-probe path has seen it so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub address: Ipv4Addr,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

impl Peer {
    /// Builds the placeholder record for a peer found by TCP probe.
    pub fn probed(address: Ipv4Addr) -> Self {
        Self {
            address,
            name: format!("Discovered Device ({address})"),
            os: None,
            last_seen: Some(Instant::now()),
        }
    }

    /// Returns `true` while the name is the probe-path placeholder.
    pub fn has_synthesized_name(&self) -> bool {
        self.name == format!("Discovered Device ({})", self.address)
    }
}

/// Discovery service activity, surfaced so front-ends can show what the
/// engine is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryStatus {
    Idle,
    AdvancedScanning,
}

/// Events emitted by the discovery service.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// The peer table was emptied (discovery restarted).
    PeersCleared,
    /// A peer was seen for the first time this session.
    PeerDiscovered(Peer),
    /// The service entered or left the active sweep.
    Status(DiscoveryStatus),
}
