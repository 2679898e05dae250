//! Connectivity checks
//!
//! A path is proven by a request/response exchange over the media socket:
//!
//! ```text
//! +---------+------+----------------------+
//! | "P2PV"  | kind | transaction id (8 B) |
//! +---------+------+----------------------+
//! ```
//!
//! Requests go to every remote candidate and are retransmitted until one
//! answers; the first responder wins. Requests from the peer are answered
//! while waiting so both sides punch through their NATs at the same time.

use crate::errors::{IceError, Result};
use crate::relay::ChannelData;
use rand::RngCore;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const PROBE_MAGIC: &[u8; 4] = b"P2PV";
pub const PROBE_SIZE: usize = 13;
pub const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(200);

const KIND_REQUEST: u8 = 0x01;
const KIND_RESPONSE: u8 = 0x02;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Request([u8; 8]),
    Response([u8; 8]),
}

impl Probe {
    pub fn new_request() -> Self {
        let mut id = [0u8; 8];
        rand::rng().fill_bytes(&mut id);
        Probe::Request(id)
    }

    pub fn encode(&self) -> [u8; PROBE_SIZE] {
        let (kind, id) = match self {
            Probe::Request(id) => (KIND_REQUEST, id),
            Probe::Response(id) => (KIND_RESPONSE, id),
        };
        let mut bytes = [0u8; PROBE_SIZE];
        bytes[..4].copy_from_slice(PROBE_MAGIC);
        bytes[4] = kind;
        bytes[5..].copy_from_slice(id);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PROBE_SIZE || &bytes[..4] != PROBE_MAGIC {
            return None;
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[5..]);
        match bytes[4] {
            KIND_REQUEST => Some(Probe::Request(id)),
            KIND_RESPONSE => Some(Probe::Response(id)),
            _ => None,
        }
    }
}

/// Answers `bytes` if it is a probe request. Returns whether it was a probe
/// of any kind, so callers can skip it.
pub fn answer_probe(socket: &UdpSocket, bytes: &[u8], from: SocketAddr) -> bool {
    match Probe::decode(bytes) {
        Some(Probe::Request(id)) => {
            let _ = socket.send_to(&Probe::Response(id).encode(), from);
            true
        }
        Some(Probe::Response(_)) => true,
        None => false,
    }
}

/// Probes `targets` until one answers, `timeout` elapses or `cancel` is set.
///
/// With `relay_channel`, every datagram is ChannelData-framed and `targets`
/// are relay addresses.
///
/// # Returns
/// * `Ok(SocketAddr)` - The address that answered first
/// * `Err(IceError::ConnectivityTimeout)` - Nobody answered in time
/// * `Err(IceError::Cancelled)` - `cancel` was raised
pub fn run_connectivity_check(
    socket: &UdpSocket,
    targets: &[SocketAddr],
    relay_channel: Option<u16>,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<SocketAddr> {
    if targets.is_empty() {
        return Err(IceError::NoCandidates);
    }

    let request = Probe::new_request();
    let Probe::Request(transaction_id) = request else {
        return Err(IceError::NoCandidates);
    };
    let request_bytes = frame(&request.encode(), relay_channel)?;

    let deadline = Instant::now() + timeout;
    let mut next_send = Instant::now();
    let mut buf = [0u8; 1500];
    socket.set_read_timeout(Some(POLL_INTERVAL))?;

    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(IceError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(IceError::ConnectivityTimeout(timeout));
        }
        if now >= next_send {
            for target in targets {
                // Unreachable candidates are expected; keep probing the rest.
                let _ = socket.send_to(&request_bytes, *target);
            }
            next_send = now + RETRANSMIT_INTERVAL;
        }

        let (size, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            // ICMP port unreachable from a dead candidate surfaces here on some platforms.
            Err(e) if e.kind() == ErrorKind::ConnectionReset => continue,
            Err(e) => return Err(e.into()),
        };

        let payload = match relay_channel {
            Some(channel) => match ChannelData::parse(&buf[..size]) {
                Some(data) if data.channel == channel => data.data,
                _ => continue,
            },
            None => &buf[..size],
        };

        match Probe::decode(payload) {
            Some(Probe::Response(id)) if id == transaction_id => return Ok(from),
            Some(Probe::Request(id)) => {
                let response = frame(&Probe::Response(id).encode(), relay_channel)?;
                let _ = socket.send_to(&response, from);
            }
            _ => {}
        }
    }
}

fn frame(bytes: &[u8], relay_channel: Option<u16>) -> Result<Vec<u8>> {
    match relay_channel {
        Some(channel) => ChannelData::wrap(channel, bytes),
        None => Ok(bytes.to_vec()),
    }
}
