use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::POLL_INTERVAL;
use crate::types::{IfaceAddr, NetInterface, classify_link, is_internal, mac_for};

/// Captures the current IPv4 interface set.
///
/// Interfaces and their addresses come back sorted so that the serialized
/// form is deterministic and snapshots can be compared byte-for-byte.
pub fn snapshot() -> Vec<NetInterface> {
    let Ok(ifaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };

    let mut grouped: BTreeMap<String, Vec<IfaceAddr>> = BTreeMap::new();
    for iface in ifaces {
        let if_addrs::IfAddr::V4(v4) = iface.addr else {
            continue;
        };
        grouped.entry(iface.name.clone()).or_default().push(IfaceAddr {
            ip: v4.ip,
            netmask: v4.netmask,
            mac: mac_for(&iface.name),
        });
    }

    grouped
        .into_iter()
        .map(|(name, mut addrs)| {
            addrs.sort_by_key(|a| u32::from(a.ip));
            let connected = addrs.iter().any(|a| !is_internal(a.ip));
            NetInterface {
                kind: classify_link(&name),
                name,
                addrs,
                connected,
            }
        })
        .collect()
}

/// All local non-internal IPv4 addresses, across every interface.
pub fn local_ipv4s() -> Vec<Ipv4Addr> {
    snapshot()
        .iter()
        .flat_map(|i| i.addrs.iter())
        .map(|a| a.ip)
        .filter(|ip| !is_internal(*ip))
        .collect()
}

/// Polls the interface set and emits a fresh snapshot whenever it changes.
pub struct InterfaceMonitor {
    events_tx: mpsc::Sender<Vec<NetInterface>>,
    events_rx: Option<mpsc::Receiver<Vec<NetInterface>>>,
}

impl InterfaceMonitor {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(8);
        Self {
            events_tx: tx,
            events_rx: Some(rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<Vec<NetInterface>>> {
        self.events_rx.take()
    }

    /// Runs the poll loop until the token is cancelled.
    ///
    /// The first observation is always emitted so consumers get a baseline.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        let mut last_serialized: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("interface monitor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    let current = snapshot();
                    let serialized = match serde_json::to_string(&current) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("failed to serialize interface snapshot: {e}");
                            continue;
                        }
                    };
                    if last_serialized.as_deref() != Some(&serialized) {
                        last_serialized = Some(serialized);
                        debug!(interfaces = current.len(), "interface set changed");
                        if self.events_tx.send(current).await.is_err() {
                            // Receiver gone; nothing left to notify.
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl Default for InterfaceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_deterministic() {
        let a = serde_json::to_string(&snapshot()).unwrap();
        let b = serde_json::to_string(&snapshot()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn local_ipv4s_excludes_loopback() {
        for ip in local_ipv4s() {
            assert!(!ip.is_loopback());
            assert!(!ip.is_link_local());
        }
    }

    #[tokio::test]
    async fn monitor_emits_baseline_then_stops() {
        let mut monitor = InterfaceMonitor::new();
        let mut events = monitor.take_events().unwrap();
        assert!(monitor.take_events().is_none());

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move { monitor.run(run_cancel).await });

        // The first tick fires immediately and the set always differs from
        // the initial None, so a baseline event arrives right away.
        let baseline = tokio::time::timeout(std::time::Duration::from_secs(2), events.recv())
            .await
            .expect("baseline snapshot")
            .expect("channel open");
        let _ = baseline;

        cancel.cancel();
        handle.await.unwrap();
    }
}
