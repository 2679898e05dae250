//! Local candidate gathering
//!
//! A host candidate for the media socket on the detected LAN address, plus
//! one server-reflexive candidate per STUN server that answers.

use crate::candidate::Candidate;
use crate::ip_detection::detect_local_ip;
use crate::stun::query_reflexive_address;
use logging::Logger;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherOptions {
    /// `host:port` strings, tried in order.
    pub stun_servers: Vec<String>,
    pub stun_timeout: Duration,
    /// Overrides LAN address detection; useful on multi-homed hosts.
    pub host_address: Option<IpAddr>,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            stun_servers: Vec::new(),
            stun_timeout: Duration::from_millis(1_500),
            host_address: None,
        }
    }
}

/// Gathers candidates for `socket`, highest priority first.
///
/// STUN failures are logged and skipped; the host candidate is always
/// present when the socket has a local address.
pub fn gather_candidates(socket: &UdpSocket, options: &GatherOptions, logger: &Logger) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let Ok(local) = socket.local_addr() else {
        logger.error("Media socket has no local address, no candidates gathered");
        return candidates;
    };

    let host_ip = match options.host_address {
        Some(ip) => ip,
        None if local.ip().is_unspecified() => detect_local_ip(),
        None => local.ip(),
    };
    let host = Candidate::host(SocketAddr::new(host_ip, local.port()));
    logger.debug(&format!("Host candidate {}", host.to_sdp_value()));
    candidates.push(host);

    for server in &options.stun_servers {
        let Some(server_addr) = server.to_socket_addrs().ok().and_then(|mut a| a.next()) else {
            logger.warn(&format!("Cannot resolve STUN server {}", server));
            continue;
        };
        match query_reflexive_address(socket, server_addr, options.stun_timeout) {
            Ok(mapped) => {
                let srflx = Candidate::server_reflexive(mapped, local);
                logger.info(&format!("Server-reflexive candidate {} via {}", mapped, server));
                if !candidates.iter().any(|c| c.socket_addr() == mapped) {
                    candidates.push(srflx);
                }
                break;
            }
            Err(e) => logger.warn(&format!("STUN query to {} failed: {}", server, e)),
        }
    }

    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    candidates
}
