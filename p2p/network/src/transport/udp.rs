//! UDP transport bound to one negotiated endpoint

use crate::error::{Result, TransportError};
use ice::ChannelData;
use logging::Logger;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

const MAX_DATAGRAM: usize = 65536;
const STATS_LOG_BYTES: u64 = 1_000_000;

/// UDP socket that only talks to `remote`.
///
/// With a relay channel every datagram is ChannelData-framed in both
/// directions and `remote` is the relay's address.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    relay_channel: Option<u16>,
    logger: Logger,
    bytes_sent: u64,
    bytes_received: u64,
    ignored: u64,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Wraps an already bound socket.
    ///
    /// # Arguments
    /// * `socket` - Bound socket, usually the one that won negotiation
    /// * `remote` - Negotiated peer or relay address
    /// * `relay_channel` - ChannelData channel for relayed paths
    /// * `poll_interval` - Read timeout for [`UdpTransport::receive`]
    pub fn new(
        socket: UdpSocket,
        remote: SocketAddr,
        relay_channel: Option<u16>,
        poll_interval: Duration,
        logger: Logger,
    ) -> Result<Self> {
        if let Some(channel) = relay_channel
            && !ChannelData::is_valid_channel(channel)
        {
            return Err(TransportError::InvalidPacket(format!(
                "relay channel {:#06x} outside 0x4000-0x7FFF",
                channel
            )));
        }
        socket
            .set_read_timeout(Some(poll_interval))
            .map_err(|e| TransportError::Io(format!("Error setting read timeout: {}", e)))?;

        logger.info(&format!(
            "UDP transport {} -> {}{}",
            socket.local_addr()?,
            remote,
            relay_channel
                .map(|c| format!(" (relay channel {:#06x})", c))
                .unwrap_or_default()
        ));

        Ok(Self {
            socket,
            remote,
            relay_channel,
            logger,
            bytes_sent: 0,
            bytes_received: 0,
            ignored: 0,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Binds a fresh socket.
    pub fn bind(
        bind_addr: SocketAddr,
        remote: SocketAddr,
        relay_channel: Option<u16>,
        poll_interval: Duration,
        logger: Logger,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| TransportError::Io(format!("Error creating socket: {}", e)))?;
        Self::new(socket, remote, relay_channel, poll_interval, logger)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn relay_channel(&self) -> Option<u16> {
        self.relay_channel
    }

    /// Sends one datagram to the remote, framed for the relay if needed.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        let framed;
        let bytes = match self.relay_channel {
            Some(channel) => {
                framed = ChannelData::wrap(channel, data)?;
                framed.as_slice()
            }
            None => data,
        };
        let sent = self
            .socket
            .send_to(bytes, self.remote)
            .map_err(|e| TransportError::Io(format!("Error sending: {}", e)))?;
        self.update_send_stats(sent);
        Ok(sent)
    }

    /// Waits up to the poll interval for a datagram from the remote.
    ///
    /// # Returns
    /// * `Ok(Some(data))` - Payload, with relay framing removed
    /// * `Ok(None)` - Nothing arrived, or the datagram was ignored
    /// * `Err` - Socket error
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>> {
        let (size, from) = match self.socket.recv_from(&mut self.buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            // ICMP unreachable from an earlier send; the peer may come back.
            Err(e) if e.kind() == ErrorKind::ConnectionReset => return Ok(None),
            Err(e) => return Err(TransportError::Io(format!("Error receiving: {}", e))),
        };

        if from != self.remote {
            self.ignore(&format!("Ignoring datagram from unexpected address {}", from));
            return Ok(None);
        }

        let payload = match self.relay_channel {
            Some(channel) => {
                let unwrapped = ChannelData::parse(&self.buf[..size])
                    .filter(|data| data.channel == channel)
                    .map(|data| data.data.to_vec());
                match unwrapped {
                    Some(data) => data,
                    None => {
                        self.ignore("Ignoring datagram without matching ChannelData framing");
                        return Ok(None);
                    }
                }
            }
            None => self.buf[..size].to_vec(),
        };
        self.update_receive_stats(size);
        Ok(Some(payload))
    }

    /// Answers a connectivity probe from the remote so late probes from the
    /// peer still succeed. Returns whether `payload` was a probe.
    pub fn answer_probe(&mut self, payload: &[u8]) -> bool {
        match ice::Probe::decode(payload) {
            Some(ice::Probe::Request(id)) => {
                let response = ice::Probe::Response(id).encode();
                if let Err(e) = self.send(&response) {
                    self.logger
                        .debug(&format!("Failed to answer connectivity probe: {}", e));
                }
                true
            }
            Some(ice::Probe::Response(_)) => true,
            None => false,
        }
    }

    fn ignore(&mut self, message: &str) {
        self.ignored += 1;
        if self.ignored == 1 || self.ignored.is_multiple_of(100) {
            self.logger
                .debug(&format!("{} ({} ignored so far)", message, self.ignored));
        }
    }

    fn update_send_stats(&mut self, sent: usize) {
        self.bytes_sent += sent as u64;
        if self.bytes_sent % STATS_LOG_BYTES < sent as u64 {
            self.logger
                .debug(&format!("Total bytes sent: {}", self.bytes_sent));
        }
    }

    fn update_receive_stats(&mut self, size: usize) {
        self.bytes_received += size as u64;
        if self.bytes_received % STATS_LOG_BYTES < size as u64 {
            self.logger
                .debug(&format!("Total bytes received: {}", self.bytes_received));
        }
    }

    /// Returns transport statistics (bytes_sent, bytes_received, ignored datagrams)
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.bytes_sent, self.bytes_received, self.ignored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(50);

    fn bound() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").unwrap()
    }

    fn receive_within(transport: &mut UdpTransport, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if let Some(data) = transport.receive().unwrap() {
                return Some(data);
            }
        }
        None
    }

    #[test]
    fn test_send_receive() {
        let a = bound();
        let b = bound();
        let (addr_a, addr_b) = (a.local_addr().unwrap(), b.local_addr().unwrap());
        let mut ta = UdpTransport::new(a, addr_b, None, POLL, Logger::disabled()).unwrap();
        let mut tb = UdpTransport::new(b, addr_a, None, POLL, Logger::disabled()).unwrap();

        assert_eq!(ta.send(&[10, 20, 30]).unwrap(), 3);
        assert_eq!(receive_within(&mut tb, Duration::from_secs(1)), Some(vec![10, 20, 30]));
        assert_eq!(ta.stats().0, 3);
        assert_eq!(tb.stats().1, 3);
    }

    #[test]
    fn test_receive_times_out_empty() {
        let socket = bound();
        let remote = bound().local_addr().unwrap();
        let mut transport =
            UdpTransport::new(socket, remote, None, POLL, Logger::disabled()).unwrap();
        assert_eq!(transport.receive().unwrap(), None);
    }

    #[test]
    fn test_ignores_foreign_sender() {
        let socket = bound();
        let local = socket.local_addr().unwrap();
        let expected = bound();
        let stranger = bound();
        let mut transport = UdpTransport::new(
            socket,
            expected.local_addr().unwrap(),
            None,
            POLL,
            Logger::disabled(),
        )
        .unwrap();

        stranger.send_to(b"intruder", local).unwrap();
        expected.send_to(b"peer", local).unwrap();
        assert_eq!(
            receive_within(&mut transport, Duration::from_secs(1)),
            Some(b"peer".to_vec())
        );
        assert_eq!(transport.stats().2, 1);
    }

    #[test]
    fn test_relay_framing() {
        let socket = bound();
        let local = socket.local_addr().unwrap();
        let relay = bound();
        let mut transport = UdpTransport::new(
            socket,
            relay.local_addr().unwrap(),
            Some(0x4001),
            POLL,
            Logger::disabled(),
        )
        .unwrap();

        transport.send(b"media").unwrap();
        let mut buf = [0u8; 64];
        let (size, _) = relay.recv_from(&mut buf).unwrap();
        let framed = ChannelData::parse(&buf[..size]).unwrap();
        assert_eq!(framed.channel, 0x4001);
        assert_eq!(framed.data, b"media");

        relay
            .send_to(&ChannelData::wrap(0x4002, b"other").unwrap(), local)
            .unwrap();
        relay
            .send_to(&ChannelData::wrap(0x4001, b"back").unwrap(), local)
            .unwrap();
        assert_eq!(
            receive_within(&mut transport, Duration::from_secs(1)),
            Some(b"back".to_vec())
        );
    }

    #[test]
    fn test_rejects_invalid_relay_channel() {
        let result = UdpTransport::new(
            bound(),
            bound().local_addr().unwrap(),
            Some(0x0001),
            POLL,
            Logger::disabled(),
        );
        assert!(matches!(result, Err(TransportError::InvalidPacket(_))));
    }
}
