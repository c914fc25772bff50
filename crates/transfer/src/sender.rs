//! The transfer sender (outbound side) and the batch driver.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use etherlink_protocol::{TransferMeta, TransferProgress, TransferStatus, wire};

use crate::progress::ProgressThrottle;
use crate::registry::{Direction, FlowControl, TransferHandle, TransferRegistry};
use crate::{
    CONNECT_TIMEOUT, COPY_BUFFER, IDLE_TIMEOUT, INTER_FILE_DELAY, TransferError, TransferEvent,
};

/// Sends one file to one peer, from registration to terminal status.
///
/// Emits `Complete` or `Error` and releases the registry slot exactly
/// once, whatever path the transfer exits through.
pub async fn send_one(
    id: String,
    peer: SocketAddr,
    path: PathBuf,
    registry: Arc<TransferRegistry>,
    events_tx: mpsc::Sender<TransferEvent>,
) {
    let (handle, mut flow) = TransferHandle::new(Direction::Send);
    if let Err(e) = registry.register(&id, handle) {
        let _ = events_tx.try_send(TransferEvent::Error {
            transfer_id: id,
            message: e.to_string(),
        });
        return;
    }

    let result = stream_file(&id, peer, &path, &events_tx, &mut flow).await;
    registry.remove(&id);

    match result {
        Ok(filename) => {
            info!(transfer = %id, file = %filename, %peer, "send complete");
            let _ = events_tx.try_send(TransferEvent::Complete {
                transfer_id: id,
                filename,
                path: None,
            });
        }
        Err(e) => {
            warn!(transfer = %id, %peer, "send failed: {e}");
            let _ = events_tx.try_send(TransferEvent::Error {
                transfer_id: id,
                message: e.to_string(),
            });
        }
    }
}

async fn stream_file(
    id: &str,
    peer: SocketAddr,
    path: &Path,
    events_tx: &mpsc::Sender<TransferEvent>,
    flow: &mut FlowControl,
) -> Result<String, TransferError> {
    let size = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m.len(),
        _ => return Err(TransferError::SourceMissing(path.to_path_buf())),
    };
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;

    let _ = events_tx.try_send(TransferEvent::Progress(TransferProgress {
        transfer_id: id.into(),
        status: TransferStatus::Connecting,
        filename: filename.clone(),
        progress: 0,
        bytes: 0,
        total: size,
        speed_mbps: 0.0,
    }));

    let stream = tokio::select! {
        _ = flow.cancel.cancelled() => return Err(TransferError::Cancelled),
        result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(peer)) => match result {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(TransferError::Timeout),
        }
    };
    debug!(transfer = id, %peer, "transfer connection established");

    let mut writer = BufWriter::with_capacity(COPY_BUFFER, stream);
    let meta = TransferMeta {
        transfer_id: Some(id.into()),
        name: filename.clone(),
        size,
    };

    // The header must be flushed to the kernel before the first payload
    // byte; a cancel that wins this race leaves at most an unterminated
    // header, which the peer rejects rather than misparses.
    tokio::select! {
        _ = flow.cancel.cancelled() => return Err(TransferError::Cancelled),
        result = wire::write_meta(&mut writer, &meta) => result?,
    }

    let mut file = tokio::fs::File::open(path).await?;
    let mut throttle = ProgressThrottle::new(
        id.into(),
        filename.clone(),
        TransferStatus::Sending,
        size,
        events_tx.clone(),
    );
    throttle.force(0);

    let mut buf = vec![0u8; COPY_BUFFER];
    let mut sent: u64 = 0;
    while sent < size {
        flow.wait_if_paused().await?;

        let want = ((size - sent) as usize).min(buf.len());
        let n = tokio::select! {
            _ = flow.cancel.cancelled() => return Err(TransferError::Cancelled),
            n = file.read(&mut buf[..want]) => n?,
        };
        if n == 0 {
            // Source shrank underneath us; the declared size is now a lie.
            return Err(TransferError::ShortStream {
                received: sent,
                expected: size,
            });
        }

        tokio::select! {
            _ = flow.cancel.cancelled() => return Err(TransferError::Cancelled),
            result = tokio::time::timeout(IDLE_TIMEOUT, writer.write_all(&buf[..n])) => match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(TransferError::Timeout),
            }
        }

        sent += n as u64;
        throttle.tick(sent);
    }

    writer.flush().await?;
    let mut stream = writer.into_inner();
    stream.shutdown().await?;
    throttle.force(size);

    Ok(filename)
}

/// Id for the k-th (peer, file) pair of a batch.
///
/// The first pair keeps the batch id verbatim so single-file sends retain
/// the caller's id; later pairs get a numeric suffix.
fn pair_transfer_id(batch_id: &str, index: usize) -> String {
    if index == 0 {
        batch_id.to_string()
    } else {
        format!("{batch_id}-{index}")
    }
}

/// Starts a batch: every file to every peer.
///
/// Validates synchronously (the batch slot and every source file) and
/// returns before any connection is made. Peers run in parallel; files to
/// the same peer run serially with a short gap so the OS can reclaim the
/// previous socket. The batch slot frees itself when the last peer task
/// finishes.
pub async fn send_batch(
    registry: Arc<TransferRegistry>,
    events_tx: mpsc::Sender<TransferEvent>,
    batch_id: String,
    peers: Vec<SocketAddr>,
    files: Vec<PathBuf>,
) -> Result<(), TransferError> {
    if peers.is_empty() || files.is_empty() {
        return Err(TransferError::EmptyBatch);
    }

    let guard = registry.try_begin_batch()?;

    for file in &files {
        match tokio::fs::metadata(file).await {
            Ok(m) if m.is_file() => {}
            _ => return Err(TransferError::SourceMissing(file.clone())),
        }
    }

    info!(batch = %batch_id, peers = peers.len(), files = files.len(), "starting batch");
    let file_count = files.len();

    tokio::spawn(async move {
        let mut peer_tasks = Vec::with_capacity(peers.len());
        for (pi, peer) in peers.into_iter().enumerate() {
            let registry = Arc::clone(&registry);
            let events_tx = events_tx.clone();
            let files = files.clone();
            let batch_id = batch_id.clone();

            peer_tasks.push(tokio::spawn(async move {
                for (fi, file) in files.into_iter().enumerate() {
                    let id = pair_transfer_id(&batch_id, pi * file_count + fi);
                    send_one(id, peer, file, Arc::clone(&registry), events_tx.clone()).await;
                    if fi + 1 < file_count {
                        tokio::time::sleep(INTER_FILE_DELAY).await;
                    }
                }
            }));
        }

        for task in peer_tasks {
            let _ = task.await;
        }
        debug!("batch finished");
        drop(guard);
    });

    Ok(())
}
