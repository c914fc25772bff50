use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use etherlink_netwatch::subnet::{directed_broadcast, naive_broadcast};
use etherlink_netwatch::types::is_internal;
use etherlink_protocol::{PRESENCE_INTERVAL, PresenceFrame};

use crate::sweep::{probe_peer, sweep_targets};
use crate::types::{DiscoveryEvent, DiscoveryStatus, Peer};
use crate::{DiscoveryError, PROBE_BATCH, SWEEP_DELAY};

/// Discovery service configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port for presence frames (0 = OS-assigned, for tests).
    pub discovery_port: u16,
    /// TCP port peers accept transfers on (sweep probe target).
    pub transfer_port: u16,
    /// Display name announced in presence frames.
    pub name: String,
    /// Operating-system tag announced in presence frames.
    pub os: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_port: etherlink_protocol::DEFAULT_DISCOVERY_PORT,
            transfer_port: etherlink_protocol::DEFAULT_TRANSFER_PORT,
            name: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "EtherLink Device".into()),
            os: crate::platform::os_tag().into(),
        }
    }
}

/// Announces this host and tracks peers on the broadcast domain.
///
/// One discovery *session* runs between `start` and `stop`; restarting
/// clears the peer table so every still-reachable peer is re-announced to
/// consumers that dropped their local list.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    peers: Arc<RwLock<HashMap<Ipv4Addr, Peer>>>,
    events_tx: mpsc::Sender<DiscoveryEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<DiscoveryEvent>>>,
    session: Mutex<Option<CancellationToken>>,
}

impl DiscoveryService {
    pub fn new(config: DiscoveryConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(64);
        Arc::new(Self {
            config,
            peers: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            session: Mutex::new(None),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<DiscoveryEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Returns all currently known peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().unwrap().values().cloned().collect()
    }

    /// Starts (or restarts) a discovery session.
    ///
    /// Clears the peer table, binds the UDP socket, and spawns the
    /// broadcaster, the listener, and the armed sweep fallback.
    pub async fn start(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        self.stop();

        self.peers.write().unwrap().clear();
        let _ = self.events_tx.try_send(DiscoveryEvent::PeersCleared);

        let socket = Arc::new(
            bind_broadcast_socket(self.config.discovery_port).map_err(DiscoveryError::Bind)?,
        );
        let port = socket.local_addr()?.port();
        info!(port, "discovery session started");

        let cancel = CancellationToken::new();
        *self.session.lock().unwrap() = Some(cancel.clone());

        let broadcaster = Arc::clone(self);
        let bcast_socket = Arc::clone(&socket);
        let bcast_cancel = cancel.clone();
        tokio::spawn(async move {
            broadcaster.broadcast_loop(bcast_socket, port, bcast_cancel).await;
        });

        let listener = Arc::clone(self);
        let listen_cancel = cancel.clone();
        tokio::spawn(async move {
            listener.receive_loop(socket, listen_cancel).await;
        });

        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            sweeper.sweep_after_delay(cancel).await;
        });

        Ok(())
    }

    /// Ends the current session. The UDP socket is released with the
    /// session tasks; the peer table keeps its last contents.
    pub fn stop(&self) {
        if let Some(token) = self.session.lock().unwrap().take() {
            token.cancel();
            info!("discovery session stopped");
        }
    }

    /// One-off reachability probe for a specific address.
    ///
    /// A successful probe registers the peer through the same synthesized
    /// path as the sweep.
    pub async fn check_peer(&self, addr: Ipv4Addr) -> bool {
        if probe_peer(addr, self.config.transfer_port).await {
            self.note_peer(addr, None, None);
            true
        } else {
            false
        }
    }

    /// Sends one presence frame per second to every broadcast target of
    /// every connected interface.
    async fn broadcast_loop(&self, socket: Arc<UdpSocket>, port: u16, cancel: CancellationToken) {
        let frame = PresenceFrame::discovery(&self.config.name, &self.config.os).to_bytes();
        let mut ticker = tokio::time::interval(PRESENCE_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    for iface in etherlink_netwatch::snapshot() {
                        for addr in &iface.addrs {
                            if is_internal(addr.ip) {
                                continue;
                            }
                            let targets = [
                                Ipv4Addr::BROADCAST,
                                directed_broadcast(addr.ip, addr.netmask),
                                naive_broadcast(addr.ip),
                            ];
                            for target in targets {
                                if let Err(e) = socket.send_to(&frame, (target, port)).await {
                                    debug!(%target, "presence send failed: {e}");
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Receives presence frames until the session ends.
    async fn receive_loop(&self, socket: Arc<UdpSocket>, cancel: CancellationToken) {
        let mut buf = [0u8; 2048];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = socket.recv_from(&mut buf) => match result {
                    Ok((n, SocketAddr::V4(src))) => {
                        let locals = etherlink_netwatch::local_ipv4s();
                        self.handle_datagram(&buf[..n], *src.ip(), &locals);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("discovery receive error: {e}");
                        return;
                    }
                }
            }
        }
    }

    /// Processes one received datagram.
    ///
    /// Frames from our own addresses are dropped (every broadcast comes
    /// back to us), and anything unparseable is discarded without a log;
    /// the broadcast port receives arbitrary traffic.
    pub(crate) fn handle_datagram(&self, payload: &[u8], src: Ipv4Addr, locals: &[Ipv4Addr]) {
        if locals.contains(&src) {
            return;
        }
        let Some(PresenceFrame::Discovery { name, os }) = PresenceFrame::parse(payload) else {
            return;
        };
        self.note_peer(src, Some(name), os);
    }

    /// Upserts the peer table.
    ///
    /// `PeerDiscovered` fires only on first sight within the session. A
    /// real hostname arriving later replaces a probe-path placeholder
    /// silently; `last_seen` refreshes either way.
    fn note_peer(&self, addr: Ipv4Addr, name: Option<String>, os: Option<String>) {
        let discovered = {
            let mut peers = self.peers.write().unwrap();
            match peers.get_mut(&addr) {
                Some(existing) => {
                    existing.last_seen = Some(Instant::now());
                    if let Some(name) = name {
                        existing.name = name;
                    }
                    if os.is_some() {
                        existing.os = os;
                    }
                    None
                }
                None => {
                    let peer = match name {
                        Some(name) => Peer {
                            address: addr,
                            name,
                            os,
                            last_seen: Some(Instant::now()),
                        },
                        None => Peer::probed(addr),
                    };
                    peers.insert(addr, peer.clone());
                    Some(peer)
                }
            }
        };

        if let Some(peer) = discovered {
            info!(peer = %peer.address, name = %peer.name, "peer discovered");
            // Best effort: a saturated consumer loses events, never packets.
            let _ = self.events_tx.try_send(DiscoveryEvent::PeerDiscovered(peer));
        }
    }

    /// Arms the sweep fallback: if nothing announced itself within the
    /// grace period, start probing.
    async fn sweep_after_delay(self: Arc<Self>, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(SWEEP_DELAY) => {}
        }
        if !self.peers.read().unwrap().is_empty() {
            return;
        }
        self.run_sweep(cancel).await;
    }

    /// Probes the attached subnets until a peer turns up or targets run out.
    async fn run_sweep(&self, cancel: CancellationToken) {
        use futures_util::StreamExt;

        let _ = self
            .events_tx
            .try_send(DiscoveryEvent::Status(DiscoveryStatus::AdvancedScanning));

        let locals = etherlink_netwatch::local_ipv4s();
        let targets = sweep_targets(&etherlink_netwatch::snapshot(), &locals);
        info!(targets = targets.len(), "starting subnet sweep");

        let port = self.config.transfer_port;
        let mut probes = futures_util::stream::iter(
            targets
                .into_iter()
                .map(|ip| async move { (ip, probe_peer(ip, port).await) }),
        )
        .buffer_unordered(PROBE_BATCH);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = probes.next() => match next {
                    Some((ip, true)) => {
                        self.note_peer(ip, None, None);
                        break;
                    }
                    Some((_, false)) => {
                        // A presence frame may have landed while we probed.
                        if !self.peers.read().unwrap().is_empty() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        let _ = self
            .events_tx
            .try_send(DiscoveryEvent::Status(DiscoveryStatus::Idle));
        info!("subnet sweep finished");
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Binds the presence socket with address reuse and broadcast enabled.
///
/// Reuse matters because a restart re-binds the port before the old
/// socket's close has fully propagated.
fn bind_broadcast_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    let addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    fn test_service() -> (Arc<DiscoveryService>, Receiver<DiscoveryEvent>) {
        let service = DiscoveryService::new(DiscoveryConfig {
            discovery_port: 0,
            transfer_port: 0,
            name: "test-host".into(),
            os: "linux".into(),
        });
        let events = service.take_events().unwrap();
        (service, events)
    }

    fn frame(name: &str) -> Vec<u8> {
        PresenceFrame::discovery(name, "linux").to_bytes()
    }

    #[tokio::test]
    async fn frames_from_local_addresses_are_dropped() {
        let (service, mut events) = test_service();
        let me = Ipv4Addr::new(192, 168, 1, 5);

        service.handle_datagram(&frame("myself"), me, &[me]);

        assert!(service.peers().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn peer_discovered_fires_once_per_session() {
        let (service, mut events) = test_service();
        let peer_ip = Ipv4Addr::new(192, 168, 1, 9);

        service.handle_datagram(&frame("den-pc"), peer_ip, &[]);
        service.handle_datagram(&frame("den-pc"), peer_ip, &[]);
        service.handle_datagram(&frame("den-pc"), peer_ip, &[]);

        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, DiscoveryEvent::PeerDiscovered(ref p) if p.address == peer_ip && p.name == "den-pc")
        );
        assert!(events.try_recv().is_err());
        assert_eq!(service.peers().len(), 1);
    }

    #[tokio::test]
    async fn malformed_datagrams_are_ignored() {
        let (service, mut events) = test_service();
        let src = Ipv4Addr::new(192, 168, 1, 9);

        service.handle_datagram(b"garbage", src, &[]);
        service.handle_datagram(br#"{"type":"other","name":"x"}"#, src, &[]);
        service.handle_datagram(b"", src, &[]);

        assert!(service.peers().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_clears_table_and_re_emits() {
        let (service, mut events) = test_service();
        let peer_ip = Ipv4Addr::new(10, 0, 0, 3);

        service.start().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DiscoveryEvent::PeersCleared);

        service.handle_datagram(&frame("atlas"), peer_ip, &[]);
        assert!(matches!(
            events.recv().await.unwrap(),
            DiscoveryEvent::PeerDiscovered(_)
        ));

        // Restart: table empties, the same peer is announced again.
        service.start().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), DiscoveryEvent::PeersCleared);
        assert!(service.peers().is_empty());

        service.handle_datagram(&frame("atlas"), peer_ip, &[]);
        assert!(matches!(
            events.recv().await.unwrap(),
            DiscoveryEvent::PeerDiscovered(ref p) if p.address == peer_ip
        ));

        service.stop();
    }

    #[tokio::test]
    async fn hostname_replaces_probe_placeholder_silently() {
        let (service, mut events) = test_service();
        let peer_ip = Ipv4Addr::new(10, 0, 0, 7);

        // Probe path first: synthesized name, one event.
        service.note_peer(peer_ip, None, None);
        assert!(matches!(
            events.recv().await.unwrap(),
            DiscoveryEvent::PeerDiscovered(ref p) if p.has_synthesized_name()
        ));

        // Presence frame later: record updates, no second event.
        service.handle_datagram(&frame("atlas"), peer_ip, &[]);
        assert!(events.try_recv().is_err());

        let peers = service.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name, "atlas");
        assert_eq!(peers[0].os.as_deref(), Some("linux"));
    }

    #[tokio::test]
    async fn check_peer_registers_synthetic_peer() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let service = DiscoveryService::new(DiscoveryConfig {
            discovery_port: 0,
            transfer_port: port,
            name: "probe-host".into(),
            os: "linux".into(),
        });
        let mut events = service.take_events().unwrap();

        assert!(service.check_peer(Ipv4Addr::LOCALHOST).await);
        assert!(matches!(
            events.recv().await.unwrap(),
            DiscoveryEvent::PeerDiscovered(ref p)
                if p.name == "Discovered Device (127.0.0.1)"
        ));
        assert_eq!(service.peers().len(), 1);

        accept.abort();
    }

    #[tokio::test]
    async fn check_peer_fails_for_unreachable_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let service = DiscoveryService::new(DiscoveryConfig {
            discovery_port: 0,
            transfer_port: port,
            name: "probe-host".into(),
            os: "linux".into(),
        });

        assert!(!service.check_peer(Ipv4Addr::LOCALHOST).await);
        assert!(service.peers().is_empty());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let (service, _events) = test_service();
        service.stop();
        service.stop();
    }
}
