//! The EtherLink engine.
//!
//! A process-wide handle that owns the transfer listener, the interface
//! monitor, the discovery service, and the transfer registry, and exposes
//! the command surface front-ends drive. Every internal event funnels
//! into one typed [`EngineEvent`] stream.
//!
//! The engine is built as an explicit handle rather than a global so
//! tests can run several of them against loopback with ephemeral ports.

pub mod config;
pub mod engine;
pub mod events;

pub use config::EngineConfig;
pub use engine::Engine;
pub use events::EngineEvent;

/// Errors surfaced by engine commands.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Discovery(#[from] etherlink_discovery::DiscoveryError),

    #[error(transparent)]
    Transfer(#[from] etherlink_transfer::TransferError),
}
