//! Active subnet sweep: the fallback for networks that filter broadcast.
//!
//! Rather than waiting forever for presence frames that a firewall is
//! eating, the sweep TCP-connects to the transfer port of every host on
//! the directly attached subnets. A host that accepts is running the
//! engine; nothing is sent on the probe connection.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use tokio::net::TcpStream;

use etherlink_netwatch::types::is_internal;
use etherlink_netwatch::{NetInterface, subnet};

use crate::PROBE_TIMEOUT;

/// Attempts a TCP connect to `addr` on the transfer port.
///
/// Returns `true` if the connect succeeds within the probe timeout. The
/// connection is closed immediately; no data is exchanged.
pub async fn probe_peer(addr: Ipv4Addr, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((addr, port))).await,
        Ok(Ok(_))
    )
}

/// Builds the sweep target list from an interface snapshot.
///
/// Hosts of every /24-or-smaller subnet on a non-internal interface
/// address, minus this host's own addresses, deduplicated in order.
pub(crate) fn sweep_targets(interfaces: &[NetInterface], locals: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let locals: HashSet<&Ipv4Addr> = locals.iter().collect();
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for iface in interfaces {
        for addr in &iface.addrs {
            if is_internal(addr.ip) {
                continue;
            }
            let Some(hosts) = subnet::subnet_hosts(addr.ip, addr.netmask) else {
                continue;
            };
            for host in hosts {
                if !locals.contains(&host) && seen.insert(host) {
                    targets.push(host);
                }
            }
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherlink_netwatch::{IfaceAddr, LinkKind};

    fn iface(name: &str, ip: [u8; 4], mask: [u8; 4]) -> NetInterface {
        NetInterface {
            name: name.into(),
            kind: LinkKind::Unknown,
            addrs: vec![IfaceAddr {
                ip: ip.into(),
                netmask: mask.into(),
                mac: None,
            }],
            connected: true,
        }
    }

    #[test]
    fn targets_exclude_local_addresses() {
        let me = Ipv4Addr::new(192, 168, 1, 42);
        let targets = sweep_targets(
            &[iface("eth0", [192, 168, 1, 42], [255, 255, 255, 0])],
            &[me],
        );
        assert_eq!(targets.len(), 253);
        assert!(!targets.contains(&me));
    }

    #[test]
    fn targets_skip_wide_subnets() {
        let targets = sweep_targets(
            &[iface("eth0", [10, 0, 0, 5], [255, 255, 0, 0])],
            &[],
        );
        assert!(targets.is_empty());
    }

    #[test]
    fn targets_skip_loopback_interfaces() {
        let targets = sweep_targets(
            &[iface("lo", [127, 0, 0, 1], [255, 0, 0, 0])],
            &[],
        );
        assert!(targets.is_empty());
    }

    #[test]
    fn targets_deduplicate_overlapping_subnets() {
        let targets = sweep_targets(
            &[
                iface("eth0", [192, 168, 1, 10], [255, 255, 255, 0]),
                iface("wlan0", [192, 168, 1, 20], [255, 255, 255, 0]),
            ],
            &[],
        );
        assert_eq!(targets.len(), 254);
    }

    #[tokio::test]
    async fn probe_succeeds_against_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Keep the listener alive while probing.
        let accept = tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        assert!(probe_peer(Ipv4Addr::LOCALHOST, port).await);
        accept.abort();
    }

    #[tokio::test]
    async fn probe_fails_against_closed_port() {
        // Bind and drop to get a port that is very likely closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(!probe_peer(Ipv4Addr::LOCALHOST, port).await);
    }
}
