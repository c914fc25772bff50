//! IPv4 broadcast and host-range arithmetic.

use std::net::Ipv4Addr;

/// Directed broadcast of the subnet: `(ip & mask) | !mask`.
pub fn directed_broadcast(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let ip = u32::from(ip);
    let mask = u32::from(mask);
    Ipv4Addr::from((ip & mask) | !mask)
}

/// The naive `x.y.z.255` form some stacks respond to regardless of mask.
pub fn naive_broadcast(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// Enumerates the host addresses of the subnet containing `ip`.
///
/// Returns `None` for subnets wider than a /24; probing thousands of
/// hosts is not worth the traffic. /31 and /32 yield an empty range.
pub fn subnet_hosts(ip: Ipv4Addr, mask: Ipv4Addr) -> Option<Vec<Ipv4Addr>> {
    let mask_bits = u32::from(mask);
    if mask_bits.count_zeros() > 8 {
        return None;
    }

    let network = u32::from(ip) & mask_bits;
    let broadcast = network | !mask_bits;
    if broadcast - network < 2 {
        // /31 and /32 have no host range.
        return Some(Vec::new());
    }
    Some(((network + 1)..broadcast).map(Ipv4Addr::from).collect())
}
