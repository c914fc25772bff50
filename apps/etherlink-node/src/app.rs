//! The node's run loop: start the engine, announce, log what happens.

use anyhow::Context;
use tracing::{debug, info, warn};

use etherlink_engine::{Engine, EngineConfig, EngineEvent};

use crate::config::NodeConfig;

pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let mut engine_config = EngineConfig {
        name: config.name,
        discovery_port: config.discovery_port,
        transfer_port: config.transfer_port,
        ..EngineConfig::default()
    };
    if let Some(dir) = config.downloads_dir {
        engine_config.downloads_dir = dir;
    }

    let engine = Engine::start(engine_config).await?;
    let mut events = engine
        .take_events()
        .context("engine events already taken")?;

    // A blocked UDP port degrades the node to receive-only; transfers
    // still work toward us.
    if let Err(e) = engine.start_discovery().await {
        warn!("discovery unavailable, running receive-only: {e}");
    }

    info!(
        transfer_port = engine.transfer_port(),
        downloads = %engine.downloads_dir().display(),
        "node ready"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            }
        }
    }

    engine.shutdown();
    Ok(())
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::InterfacesChanged(interfaces) => {
            let connected = interfaces.iter().filter(|i| i.connected).count();
            info!(total = interfaces.len(), connected, "interfaces changed");
        }
        EngineEvent::PeersCleared => info!("peer list cleared"),
        EngineEvent::PeerDiscovered(peer) => {
            info!(addr = %peer.address, name = %peer.name, os = ?peer.os, "peer discovered");
        }
        EngineEvent::DiscoveryStatus(status) => debug!(?status, "discovery status"),
        EngineEvent::TransferProgress(p) => {
            debug!(
                transfer = %p.transfer_id,
                status = %p.status,
                progress = p.progress,
                speed_mbps = format!("{:.2}", p.speed_mbps),
                "transfer progress"
            );
        }
        EngineEvent::TransferComplete {
            transfer_id,
            filename,
            path,
        } => {
            info!(transfer = %transfer_id, file = %filename, path = ?path, "transfer complete");
        }
        EngineEvent::TransferError {
            transfer_id,
            message,
        } => {
            warn!(transfer = %transfer_id, "transfer failed: {message}");
        }
    }
}
