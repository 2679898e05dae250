//! Direct-then-relay path selection

use super::descriptor::PathKind;
use super::{NegotiationError, Result};
use crate::cancel::CancelToken;
use logging::Logger;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Runs connectivity probes toward the peer.
pub trait PathProber {
    /// Probes the peer's direct candidates; returns the address that answered.
    fn probe_direct(
        &self,
        targets: &[SocketAddr],
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<SocketAddr>;

    /// Probes the peer through its relay.
    fn probe_relay(
        &self,
        relay: SocketAddr,
        channel: Option<u16>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<SocketAddr>;
}

/// Probes over the negotiation socket, so the proven NAT binding is the
/// one the media channel will use.
pub struct UdpProber<'a> {
    socket: &'a UdpSocket,
}

impl<'a> UdpProber<'a> {
    pub fn new(socket: &'a UdpSocket) -> Self {
        Self { socket }
    }
}

impl PathProber for UdpProber<'_> {
    fn probe_direct(
        &self,
        targets: &[SocketAddr],
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<SocketAddr> {
        Ok(ice::run_connectivity_check(
            self.socket,
            targets,
            None,
            timeout,
            cancel.as_atomic(),
        )?)
    }

    fn probe_relay(
        &self,
        relay: SocketAddr,
        channel: Option<u16>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<SocketAddr> {
        ice::run_connectivity_check(self.socket, &[relay], channel, timeout, cancel.as_atomic())?;
        Ok(relay)
    }
}

/// A path that answered probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvenPath {
    pub kind: PathKind,
    pub endpoint: SocketAddr,
    pub relay_channel: Option<u16>,
}

/// Tries the direct candidates, then falls back to the relay.
///
/// # Arguments
///
/// * `direct` - Peer host and server-reflexive addresses
/// * `relay` - Peer relay address and channel number, if it advertised one
///
/// # Errors
///
/// * `Cancelled` - As soon as `cancel` is raised, without trying the relay
/// * The relay probe's error, or the direct one when there is no relay
pub fn negotiate_path(
    prober: &dyn PathProber,
    direct: &[SocketAddr],
    relay: Option<(SocketAddr, Option<u16>)>,
    direct_timeout: Duration,
    relay_timeout: Duration,
    cancel: &CancelToken,
    logger: &Logger,
) -> Result<ProvenPath> {
    let direct_error = if direct.is_empty() {
        NegotiationError::Timeout(Duration::ZERO)
    } else {
        match prober.probe_direct(direct, direct_timeout, cancel) {
            Ok(endpoint) => {
                logger.info(&format!("Direct path to {} proven", endpoint));
                return Ok(ProvenPath {
                    kind: PathKind::Direct,
                    endpoint,
                    relay_channel: None,
                });
            }
            Err(NegotiationError::Cancelled) => return Err(NegotiationError::Cancelled),
            Err(e) => e,
        }
    };

    let Some((relay_addr, channel)) = relay else {
        logger.warn(&format!("Direct path failed ({}), peer offers no relay", direct_error));
        return Err(direct_error);
    };

    logger.info(&format!(
        "Direct path failed ({}), falling back to relay {}",
        direct_error, relay_addr
    ));
    let endpoint = prober.probe_relay(relay_addr, channel, relay_timeout, cancel)?;
    logger.info(&format!("Relayed path via {} proven", endpoint));
    Ok(ProvenPath {
        kind: PathKind::Relayed,
        endpoint,
        relay_channel: channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedProber {
        direct: Result<SocketAddr>,
        relay: Result<SocketAddr>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl PathProber for ScriptedProber {
        fn probe_direct(&self, _: &[SocketAddr], _: Duration, _: &CancelToken) -> Result<SocketAddr> {
            self.calls.lock().unwrap().push("direct");
            self.direct.clone()
        }

        fn probe_relay(
            &self,
            _: SocketAddr,
            _: Option<u16>,
            _: Duration,
            _: &CancelToken,
        ) -> Result<SocketAddr> {
            self.calls.lock().unwrap().push("relay");
            self.relay.clone()
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn run(prober: &ScriptedProber, relay: Option<(SocketAddr, Option<u16>)>) -> Result<ProvenPath> {
        negotiate_path(
            prober,
            &[addr("10.0.0.2:5000")],
            relay,
            Duration::from_millis(10),
            Duration::from_millis(10),
            &CancelToken::new(),
            &Logger::disabled(),
        )
    }

    #[test]
    fn test_direct_success_skips_relay() {
        let prober = ScriptedProber {
            direct: Ok(addr("10.0.0.2:5000")),
            relay: Ok(addr("1.1.1.1:3478")),
            calls: Mutex::new(Vec::new()),
        };
        let path = run(&prober, Some((addr("1.1.1.1:3478"), Some(0x4000)))).unwrap();
        assert_eq!(path.kind, PathKind::Direct);
        assert_eq!(*prober.calls.lock().unwrap(), vec!["direct"]);
    }

    #[test]
    fn test_direct_timeout_falls_back_to_relay() {
        let prober = ScriptedProber {
            direct: Err(NegotiationError::Timeout(Duration::from_millis(10))),
            relay: Ok(addr("1.1.1.1:3478")),
            calls: Mutex::new(Vec::new()),
        };
        let path = run(&prober, Some((addr("1.1.1.1:3478"), Some(0x4000)))).unwrap();
        assert_eq!(path.kind, PathKind::Relayed);
        assert_eq!(path.endpoint, addr("1.1.1.1:3478"));
        assert_eq!(path.relay_channel, Some(0x4000));
        assert_eq!(*prober.calls.lock().unwrap(), vec!["direct", "relay"]);
    }

    #[test]
    fn test_no_relay_reports_direct_error() {
        let prober = ScriptedProber {
            direct: Err(NegotiationError::Timeout(Duration::from_millis(10))),
            relay: Ok(addr("1.1.1.1:3478")),
            calls: Mutex::new(Vec::new()),
        };
        assert_eq!(
            run(&prober, None).unwrap_err(),
            NegotiationError::Timeout(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_cancel_does_not_fall_back() {
        let prober = ScriptedProber {
            direct: Err(NegotiationError::Cancelled),
            relay: Ok(addr("1.1.1.1:3478")),
            calls: Mutex::new(Vec::new()),
        };
        let err = run(&prober, Some((addr("1.1.1.1:3478"), None))).unwrap_err();
        assert_eq!(err, NegotiationError::Cancelled);
        assert_eq!(*prober.calls.lock().unwrap(), vec!["direct"]);
    }

    #[test]
    fn test_udp_prober_over_loopback() {
        let local = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let peer_addr = peer.local_addr().unwrap();
        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (size, from) = peer.recv_from(&mut buf).unwrap();
            assert!(ice::answer_probe(&peer, &buf[..size], from));
        });

        let prober = UdpProber::new(&local);
        let found = prober
            .probe_direct(&[peer_addr], Duration::from_secs(2), &CancelToken::new())
            .unwrap();
        assert_eq!(found, peer_addr);
        responder.join().unwrap();
    }
}
