//! The transfer listener (receiving side).
//!
//! Bound once for the engine's lifetime so peers can always deliver,
//! independent of discovery state. Each accepted connection is one file:
//! metadata line, payload bytes, half-close.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use etherlink_protocol::{TransferProgress, TransferStatus, wire};

use crate::progress::ProgressThrottle;
use crate::registry::{Direction, FlowControl, TransferHandle, TransferRegistry};
use crate::{COPY_BUFFER, TransferError, TransferEvent};

/// Accepts inbound transfer connections and writes the files to disk.
pub struct TransferListener {
    listener: TcpListener,
    downloads_dir: Arc<RwLock<PathBuf>>,
    registry: Arc<TransferRegistry>,
    events_tx: mpsc::Sender<TransferEvent>,
    conn_seq: AtomicU64,
}

impl TransferListener {
    /// Binds the listener and ensures the downloads directory exists.
    ///
    /// `port` 0 binds an OS-assigned port (tests). The downloads directory
    /// is shared with the engine so a repoint applies to the next
    /// connection without a rebind.
    pub async fn bind(
        port: u16,
        downloads_dir: Arc<RwLock<PathBuf>>,
        registry: Arc<TransferRegistry>,
        events_tx: mpsc::Sender<TransferEvent>,
    ) -> Result<Self, TransferError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;

        let dir = downloads_dir.read().unwrap().clone();
        tokio::fs::create_dir_all(&dir).await?;

        info!(addr = %listener.local_addr()?, "transfer listener bound");
        Ok(Self {
            listener,
            downloads_dir,
            registry,
            events_tx,
            conn_seq: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the token is cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("transfer listener stopping");
                    return;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => error!("accept error: {e}"),
                }
            }
        }
    }

    /// Drives one inbound transfer from accept to terminal status.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let seq = self.conn_seq.fetch_add(1, Ordering::Relaxed);
        let provisional = format!("recv-{seq}");
        debug!(%peer, transfer = %provisional, "incoming transfer connection");

        let (handle, flow) = TransferHandle::new(Direction::Receive);
        if let Err(e) = self.registry.register(&provisional, handle) {
            error!(transfer = %provisional, "failed to register transfer: {e}");
            return;
        }

        // Announce before the metadata arrives: very small files complete
        // faster than the first throttled tick, and consumers still need
        // to see that a transfer happened.
        let _ = self
            .events_tx
            .try_send(TransferEvent::Progress(TransferProgress {
                transfer_id: provisional.clone(),
                status: TransferStatus::Connecting,
                filename: String::new(),
                progress: 0,
                bytes: 0,
                total: 0,
                speed_mbps: 0.0,
            }));

        let downloads = self.downloads_dir.read().unwrap().clone();
        let mut id = provisional;
        let result = self.receive(stream, &mut id, downloads, flow).await;
        self.registry.remove(&id);

        match result {
            Ok((filename, dest)) => {
                info!(transfer = %id, file = %filename, "receive complete");
                let _ = self.events_tx.try_send(TransferEvent::Complete {
                    transfer_id: id,
                    filename,
                    path: Some(dest),
                });
            }
            Err(e) => {
                warn!(transfer = %id, "receive failed: {e}");
                let _ = self.events_tx.try_send(TransferEvent::Error {
                    transfer_id: id,
                    message: e.to_string(),
                });
            }
        }
    }

    async fn receive(
        &self,
        stream: TcpStream,
        id: &mut String,
        downloads: PathBuf,
        mut flow: FlowControl,
    ) -> Result<(String, PathBuf), TransferError> {
        // The buffered reader owns the metadata/payload boundary: payload
        // bytes pulled in alongside the header wait in its buffer and are
        // the first thing the copy loop drains.
        let mut reader = BufReader::with_capacity(COPY_BUFFER, stream);

        let meta = tokio::select! {
            _ = flow.cancel.cancelled() => return Err(TransferError::Cancelled),
            meta = wire::read_meta(&mut reader) => meta?,
        };

        // Adopt the sender's id so cross-host cancel targets line up. A
        // colliding id (already active here) keeps the provisional one
        // instead of failing the stream.
        if let Some(wire_id) = &meta.transfer_id {
            if wire_id != id {
                match self.registry.rekey(id, wire_id) {
                    Ok(()) => *id = wire_id.clone(),
                    Err(e) => debug!(transfer = %id, "keeping provisional id: {e}"),
                }
            }
        }

        let filename = sanitize_basename(&meta.name)?;
        tokio::fs::create_dir_all(&downloads).await?;
        let dest = downloads.join(&filename);
        let mut file = tokio::fs::File::create(&dest).await?;
        debug!(transfer = %id, file = %filename, size = meta.size, "receiving");

        let mut throttle = ProgressThrottle::new(
            id.clone(),
            filename.clone(),
            TransferStatus::Receiving,
            meta.size,
            self.events_tx.clone(),
        );
        throttle.force(0);

        let mut buf = vec![0u8; COPY_BUFFER];
        let mut received: u64 = 0;
        while received < meta.size {
            flow.wait_if_paused().await?;

            let want = ((meta.size - received) as usize).min(buf.len());
            let n = tokio::select! {
                _ = flow.cancel.cancelled() => return Err(TransferError::Cancelled),
                n = reader.read(&mut buf[..want]) => n?,
            };
            if n == 0 {
                return Err(TransferError::ShortStream {
                    received,
                    expected: meta.size,
                });
            }

            file.write_all(&buf[..n]).await?;
            received += n as u64;
            throttle.tick(received);
        }

        file.flush().await?;
        throttle.force(meta.size);

        Ok((filename, dest))
    }
}

/// Reduces the declared name to a bare file name.
///
/// Directory components (either separator style) are stripped; names that
/// reduce to nothing are a protocol violation.
fn sanitize_basename(name: &str) -> Result<String, TransferError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    if base.is_empty() || base == "." || base == ".." {
        return Err(TransferError::InvalidName(name.into()));
    }
    Ok(base.to_string())
}
