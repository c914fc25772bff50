use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Physical link classification, derived from the interface name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Wired,
    Wireless,
    Unknown,
}

/// Classifies an interface by conventional naming.
pub fn classify_link(name: &str) -> LinkKind {
    let lower = name.to_lowercase();
    if ["wi-fi", "wlan", "wireless"].iter().any(|t| lower.contains(t)) {
        LinkKind::Wireless
    } else if lower.contains("eth") {
        LinkKind::Wired
    } else {
        LinkKind::Unknown
    }
}

/// One IPv4 assignment on an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfaceAddr {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// An observed network interface with its IPv4 assignments.
///
/// `connected` is `true` iff at least one non-internal (non-loopback,
/// non-link-local) IPv4 address is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    pub name: String,
    pub kind: LinkKind,
    pub addrs: Vec<IfaceAddr>,
    pub connected: bool,
}

/// Returns `true` for addresses that never leave this host's stack:
/// loopback (127/8) and link-local (169.254/16).
pub fn is_internal(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_link_local()
}

/// Reads the interface's MAC address from sysfs.
#[cfg(target_os = "linux")]
pub(crate) fn mac_for(name: &str) -> Option<String> {
    let raw = std::fs::read_to_string(format!("/sys/class/net/{name}/address")).ok()?;
    let mac = raw.trim();
    if mac.is_empty() || mac == "00:00:00:00:00:00" {
        None
    } else {
        Some(mac.to_string())
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn mac_for(_name: &str) -> Option<String> {
    None
}
