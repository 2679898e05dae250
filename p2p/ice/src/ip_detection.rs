//! IP address detection utilities
//!
//! Finds the LAN address a host candidate should advertise. The primary
//! method "connects" a UDP socket towards a public address, which makes the
//! kernel pick the outbound interface without sending anything. When that
//! fails (no default route), `ip addr` output is scanned instead.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

const ROUTE_PROBE_TARGET: &str = "8.8.8.8:80";

/// Detects the local IP address for LAN connections.
///
/// Prefers private ranges (192.168/16, 10/8, 172.16/12) and never returns
/// loopback or link-local addresses.
///
/// # Returns
/// The detected address, or `0.0.0.0` when nothing usable was found
pub fn detect_local_ip() -> IpAddr {
    if let Some(ip) = detect_via_route() {
        return IpAddr::V4(ip);
    }

    #[cfg(target_family = "unix")]
    if let Some(ip) = select_best_ip(&detect_via_ip_command()) {
        return IpAddr::V4(ip);
    }

    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn detect_via_route() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(ROUTE_PROBE_TARGET).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if is_valid_lan_ip(&ip) => Some(ip),
        _ => None,
    }
}

#[cfg(target_family = "unix")]
fn detect_via_ip_command() -> Vec<Ipv4Addr> {
    use std::process::Command;

    let mut candidate_ips = Vec::new();
    if let Ok(output) = Command::new("ip").args(["-4", "addr"]).output()
        && output.status.success()
        && let Ok(result) = String::from_utf8(output.stdout)
    {
        for line in result.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("inet ")
                && let Some(ip_part) = rest.split(['/', ' ']).next()
                && let Ok(ip) = ip_part.parse::<Ipv4Addr>()
                && is_valid_lan_ip(&ip)
            {
                candidate_ips.push(ip);
            }
        }
    }
    candidate_ips
}

/// Checks if an IP is valid for LAN connections
pub fn is_valid_lan_ip(ip: &Ipv4Addr) -> bool {
    !(ip.is_loopback() || ip.is_link_local() || ip.is_unspecified())
}

/// Picks the most LAN-like address, in 192.168, 10, 172.16-31 order.
fn select_best_ip(candidates: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    let rank = |ip: &Ipv4Addr| {
        let octets = ip.octets();
        match octets {
            [192, 168, ..] => 0,
            [10, ..] => 1,
            [172, b, ..] if (16..=31).contains(&b) => 2,
            _ => 3,
        }
    };
    candidates.iter().min_by_key(|ip| rank(ip)).copied()
}
