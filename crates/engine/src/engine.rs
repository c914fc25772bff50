use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use etherlink_discovery::{DiscoveryConfig, DiscoveryEvent, DiscoveryService, Peer, os_tag};
use etherlink_netwatch::{InterfaceMonitor, NetInterface};
use etherlink_transfer::{TransferEvent, TransferListener, TransferRegistry, send_batch};

use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::EngineError;

/// The process-wide transfer engine.
///
/// Created with [`Engine::start`]; lives until [`Engine::shutdown`]. The
/// transfer listener binds immediately so the host can receive whether or
/// not discovery is running.
pub struct Engine {
    discovery: Arc<DiscoveryService>,
    registry: Arc<TransferRegistry>,
    downloads_dir: Arc<RwLock<PathBuf>>,
    transfer_tx: mpsc::Sender<TransferEvent>,
    transfer_port: u16,
    events_rx: Mutex<Option<mpsc::Receiver<EngineEvent>>>,
    cancel: CancellationToken,
    batch_seq: AtomicU64,
}

impl Engine {
    /// Binds the listener, starts the interface monitor, and wires the
    /// event forwarders. Discovery stays idle until
    /// [`start_discovery`](Self::start_discovery).
    pub async fn start(config: EngineConfig) -> Result<Arc<Self>, EngineError> {
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(256);

        let downloads_dir = Arc::new(RwLock::new(config.downloads_dir.clone()));
        let registry = TransferRegistry::new();

        // Receive side: up for the engine's whole lifetime.
        let (transfer_tx, transfer_rx) = mpsc::channel(256);
        let listener = TransferListener::bind(
            config.transfer_port,
            Arc::clone(&downloads_dir),
            Arc::clone(&registry),
            transfer_tx.clone(),
        )
        .await?;
        let transfer_port = listener.local_addr()?.port();
        tokio::spawn(Arc::new(listener).run(cancel.child_token()));

        // Discovery: constructed now, sessions begin on command.
        let discovery = DiscoveryService::new(DiscoveryConfig {
            discovery_port: config.discovery_port,
            transfer_port,
            name: config.name.clone(),
            os: os_tag().into(),
        });

        // Interface monitor.
        let mut monitor = InterfaceMonitor::new();
        let monitor_rx = monitor.take_events();
        let monitor_cancel = cancel.child_token();
        tokio::spawn(async move { monitor.run(monitor_cancel).await });

        // Funnel every sub-stream into the single engine event bus.
        tokio::spawn(forward_transfer(transfer_rx, events_tx.clone()));
        if let Some(rx) = discovery.take_events() {
            tokio::spawn(forward_discovery(rx, events_tx.clone()));
        }
        if let Some(rx) = monitor_rx {
            tokio::spawn(forward_interfaces(rx, events_tx.clone()));
        }

        info!(name = %config.name, transfer_port, "engine started");
        Ok(Arc::new(Self {
            discovery,
            registry,
            downloads_dir,
            transfer_tx,
            transfer_port,
            events_rx: Mutex::new(Some(events_rx)),
            cancel,
            batch_seq: AtomicU64::new(1),
        }))
    }

    /// Takes the engine event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<EngineEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// The bound transfer port (differs from the configured one when 0).
    pub fn transfer_port(&self) -> u16 {
        self.transfer_port
    }

    /// Starts (or restarts) peer discovery. Clears the peer table.
    pub async fn start_discovery(&self) -> Result<(), EngineError> {
        self.discovery.start().await?;
        Ok(())
    }

    /// Stops discovery and releases the UDP port. The transfer listener
    /// stays up.
    pub fn stop_discovery(&self) {
        self.discovery.stop();
    }

    /// Currently known peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.discovery.peers()
    }

    /// One-off TCP reachability probe; registers the peer on success.
    pub async fn check_peer(&self, addr: Ipv4Addr) -> bool {
        self.discovery.check_peer(addr).await
    }

    /// Starts a batch send of every file to every peer.
    ///
    /// Fails synchronously if a batch is already running or any source
    /// file is missing. Returns the batch id (synthesized when the caller
    /// did not supply one).
    pub async fn send_batch(
        &self,
        batch_id: Option<String>,
        peers: Vec<SocketAddr>,
        files: Vec<PathBuf>,
    ) -> Result<String, EngineError> {
        let id = batch_id
            .unwrap_or_else(|| format!("batch-{}", self.batch_seq.fetch_add(1, Ordering::Relaxed)));
        send_batch(
            Arc::clone(&self.registry),
            self.transfer_tx.clone(),
            id.clone(),
            peers,
            files,
        )
        .await?;
        Ok(id)
    }

    /// Maps a bare peer address onto the transfer port this engine targets.
    pub fn transfer_addr(&self, peer: Ipv4Addr) -> SocketAddr {
        SocketAddr::new(peer.into(), self.transfer_port)
    }

    /// Cancels a transfer if it is still active. Idempotent.
    pub fn cancel_transfer(&self, id: &str) {
        self.registry.cancel(id);
    }

    /// Pauses a transfer's stream flow. `false` for unknown ids.
    pub fn pause_transfer(&self, id: &str) -> bool {
        self.registry.pause(id)
    }

    /// Resumes a paused transfer from its exact byte offset.
    pub fn resume_transfer(&self, id: &str) -> bool {
        self.registry.resume(id)
    }

    /// Repoints the downloads directory, creating it if absent. Applies
    /// from the next accepted connection.
    pub async fn set_downloads_dir(&self, path: PathBuf) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&path).await?;
        *self.downloads_dir.write().unwrap() = path.clone();
        info!(dir = %path.display(), "downloads directory repointed");
        Ok(())
    }

    /// The current downloads directory.
    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir.read().unwrap().clone()
    }

    /// Stops everything: discovery, listener, monitor, forwarders.
    pub fn shutdown(&self) {
        info!("engine shutting down");
        self.discovery.stop();
        self.cancel.cancel();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.discovery.stop();
        self.cancel.cancel();
    }
}

async fn forward_transfer(
    mut rx: mpsc::Receiver<TransferEvent>,
    tx: mpsc::Sender<EngineEvent>,
) {
    while let Some(event) = rx.recv().await {
        let mapped = match event {
            TransferEvent::Progress(p) => EngineEvent::TransferProgress(p),
            TransferEvent::Complete {
                transfer_id,
                filename,
                path,
            } => EngineEvent::TransferComplete {
                transfer_id,
                filename,
                path,
            },
            TransferEvent::Error {
                transfer_id,
                message,
            } => EngineEvent::TransferError {
                transfer_id,
                message,
            },
        };
        if tx.send(mapped).await.is_err() {
            return;
        }
    }
}

async fn forward_discovery(
    mut rx: mpsc::Receiver<DiscoveryEvent>,
    tx: mpsc::Sender<EngineEvent>,
) {
    while let Some(event) = rx.recv().await {
        let mapped = match event {
            DiscoveryEvent::PeersCleared => EngineEvent::PeersCleared,
            DiscoveryEvent::PeerDiscovered(peer) => EngineEvent::PeerDiscovered(peer),
            DiscoveryEvent::Status(status) => EngineEvent::DiscoveryStatus(status),
        };
        if tx.send(mapped).await.is_err() {
            return;
        }
    }
}

async fn forward_interfaces(
    mut rx: mpsc::Receiver<Vec<NetInterface>>,
    tx: mpsc::Sender<EngineEvent>,
) {
    while let Some(interfaces) = rx.recv().await {
        if tx
            .send(EngineEvent::InterfacesChanged(interfaces))
            .await
            .is_err()
        {
            return;
        }
    }
}
