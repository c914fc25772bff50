use std::path::PathBuf;

use etherlink_discovery::{DiscoveryStatus, Peer};
use etherlink_netwatch::NetInterface;
use etherlink_protocol::TransferProgress;

/// Everything the engine reports, as one tagged stream.
///
/// Front-ends subscribe once and match on the variant instead of wiring a
/// callback per event name.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The local interface set changed.
    InterfacesChanged(Vec<NetInterface>),
    /// Discovery restarted and emptied the peer table.
    PeersCleared,
    /// A peer was seen for the first time this discovery session.
    PeerDiscovered(Peer),
    /// Discovery entered or left the active subnet sweep.
    DiscoveryStatus(DiscoveryStatus),
    /// Throttled progress for an active transfer.
    TransferProgress(TransferProgress),
    /// A transfer reached a clean end.
    TransferComplete {
        transfer_id: String,
        filename: String,
        /// Destination path, present on the receiving side.
        path: Option<PathBuf>,
    },
    /// A transfer failed or was cancelled.
    TransferError {
        transfer_id: String,
        message: String,
    },
}
