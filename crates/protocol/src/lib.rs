//! Wire formats for the EtherLink LAN transfer protocol.
//!
//! Two independent protocols share this crate:
//!
//! - **Presence** (UDP, port 9000): a single JSON datagram announcing a
//!   host, no framing, no reply. See [`PresenceFrame`].
//! - **Transfer** (TCP, port 9001): one JSON metadata line terminated by
//!   `\n`, followed by exactly `size` raw file bytes, then a half-close.
//!   See [`wire`] for the codec.

pub mod frames;
pub mod types;
pub mod wire;

pub use frames::{PresenceFrame, TransferMeta};
pub use types::{TransferProgress, TransferStatus};

use std::time::Duration;

/// UDP port for presence announcements.
pub const DEFAULT_DISCOVERY_PORT: u16 = 9000;

/// TCP port for file transfers.
pub const DEFAULT_TRANSFER_PORT: u16 = 9001;

/// Maximum bytes of metadata allowed before the terminating newline.
pub const METADATA_LIMIT: usize = 64 * 1024;

/// Interval between presence broadcasts.
pub const PRESENCE_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum spacing between progress events for a single transfer.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata exceeds {METADATA_LIMIT} bytes without a terminator")]
    HeaderTooLong,

    #[error("stream ended before the metadata terminator")]
    Truncated,

    #[error("malformed metadata: {0}")]
    BadHeader(String),
}
