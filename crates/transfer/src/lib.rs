//! TCP file transfer between peers.
//!
//! The listener side ([`receiver::TransferListener`]) is bound for the
//! engine's whole lifetime so a host can always receive. The sender side
//! ([`sender`]) drives one connection per (peer, file). In-flight
//! transfers are tracked in the [`registry::TransferRegistry`], which is
//! where cancel/pause/resume commands land.
//!
//! # Wire format
//!
//! One metadata JSON line terminated by `\n`, then exactly `size` raw file
//! bytes, then a half-close. See `etherlink_protocol::wire`.

pub mod progress;
pub mod receiver;
pub mod registry;
pub mod sender;

pub use progress::ProgressThrottle;
pub use receiver::TransferListener;
pub use registry::{BatchGuard, Direction, FlowControl, TransferHandle, TransferRegistry};
pub use sender::{send_batch, send_one};

use std::path::PathBuf;
use std::time::Duration;

use etherlink_protocol::TransferProgress;

/// Timeout for the outbound TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for a single stalled socket write on the sending side.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Read/write buffer size for the streaming copy loops.
pub const COPY_BUFFER: usize = 64 * 1024;

/// Pause between successive files to the same peer, letting the OS
/// reclaim the previous connection's resources.
pub const INTER_FILE_DELAY: Duration = Duration::from_millis(100);

/// Events emitted by senders and the listener.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Progress(TransferProgress),
    Complete {
        transfer_id: String,
        filename: String,
        /// Destination path; set on the receiving side only.
        path: Option<PathBuf>,
    },
    Error {
        transfer_id: String,
        message: String,
    },
}

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] etherlink_protocol::ProtocolError),

    #[error("connection timed out")]
    Timeout,

    #[error("stream ended after {received} of {expected} bytes")]
    ShortStream { received: u64, expected: u64 },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("batch has no peers or no files")]
    EmptyBatch,

    #[error("a batch is already in progress")]
    BatchActive,

    #[error("transfer already registered: {0}")]
    DuplicateTransfer(String),

    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("unusable file name: {0:?}")]
    InvalidName(String),
}
