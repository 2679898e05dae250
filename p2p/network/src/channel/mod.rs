//! Transport channel
//!
//! A [`Channel`] is one generation of a media path. Opening it spawns a
//! worker that owns the socket; the handle queues outbound media and hands
//! out the inbound [`PacketStream`] once. A reconnect opens a new channel
//! with the next generation number, so sequence numbers restart cleanly.

mod config;
mod keepalive;
mod nack;
mod worker;

pub use config::ChannelConfig;
pub use keepalive::{KeepaliveAction, KeepaliveTracker};
pub use nack::{NackTracker, SendHistory};

use crate::codec::{FramePacket, H264Packetizer};
use crate::error::{Result, TransportError};
use crate::transport::UdpTransport;
use logging::Logger;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use worker::{ChannelThreadParams, run_channel_thread};

const VIDEO_CLOCK_RATE: u64 = 90_000;

/// Where a channel sends: the peer itself, or a relay plus channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    pub endpoint: SocketAddr,
    pub relay_channel: Option<u16>,
}

impl ChannelTarget {
    pub fn direct(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            relay_channel: None,
        }
    }

    pub fn relayed(relay: SocketAddr, channel: u16) -> Self {
        Self {
            endpoint: relay,
            relay_channel: Some(channel),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub retransmitted: u64,
    pub retransmits_received: u64,
    pub nacks_sent: u64,
    pub nacks_received: u64,
    pub stale_dropped: u64,
    pub duplicates: u64,
    pub reordered: u64,
    pub lost: u64,
    pub invalid: u64,
    pub queue_overflow: u64,
    pub keepalives_sent: u64,
    pub keepalive_acks: u64,
}

/// Inbound packets of one generation, in sequence order.
///
/// Ends after a terminal error (`Dead`, `RemoteBye`, `Io`) or when the
/// channel closes.
pub struct PacketStream {
    receiver: Receiver<Result<FramePacket>>,
    generation: u32,
}

impl PacketStream {
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Result<FramePacket>, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Iterator for PacketStream {
    type Item = Result<FramePacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

pub struct Channel {
    generation: u32,
    target: ChannelTarget,
    local_addr: SocketAddr,
    outgoing: Option<SyncSender<Vec<FramePacket>>>,
    packets: Option<Receiver<Result<FramePacket>>>,
    packetizer: H264Packetizer,
    stats: Arc<Mutex<ChannelStats>>,
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    opened_at: Instant,
    logger: Logger,
}

impl Channel {
    /// Opens a channel toward `target`.
    ///
    /// # Arguments
    /// * `target` - Negotiated endpoint and optional relay channel
    /// * `socket` - The socket that won negotiation, so NAT bindings stay
    ///   valid; a fresh one is bound from `config.bind_address` if `None`
    /// * `generation` - Stamped on every received packet
    ///
    /// # Errors
    /// `Io` if the socket cannot be prepared or the worker cannot start.
    pub fn open(
        target: ChannelTarget,
        socket: Option<UdpSocket>,
        generation: u32,
        config: &ChannelConfig,
        logger: &Logger,
    ) -> Result<Self> {
        let logger = logger.for_component("CHANNEL");
        let transport_logger = logger.for_component("UDP");
        let transport = match socket {
            Some(socket) => UdpTransport::new(
                socket,
                target.endpoint,
                target.relay_channel,
                config.poll_interval(),
                transport_logger,
            )?,
            None => UdpTransport::bind(
                config.bind_addr()?,
                target.endpoint,
                target.relay_channel,
                config.poll_interval(),
                transport_logger,
            )?,
        };
        let local_addr = transport.local_addr()?;

        let (outgoing_tx, outgoing_rx) = mpsc::sync_channel(config.send_queue.max(1));
        let (packets_tx, packets_rx) = mpsc::sync_channel(config.recv_queue.max(1));
        let stats = Arc::new(Mutex::new(ChannelStats::default()));
        let alive = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let params = ChannelThreadParams {
            transport,
            generation,
            config: config.clone(),
            outgoing: outgoing_rx,
            packets: packets_tx,
            stats: Arc::clone(&stats),
            alive: Arc::clone(&alive),
            stop: Arc::clone(&stop),
            logger: logger.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("channel-gen{}", generation))
            .spawn(move || run_channel_thread(params))
            .map_err(|e| TransportError::Io(format!("Failed to spawn channel worker: {}", e)))?;

        logger.info(&format!(
            "Opened channel generation {} on {} -> {}",
            generation, local_addr, target.endpoint
        ));

        Ok(Self {
            generation,
            target,
            local_addr,
            outgoing: Some(outgoing_tx),
            packets: Some(packets_rx),
            packetizer: H264Packetizer::new(config.max_payload_size),
            stats,
            alive,
            stop,
            handle: Some(handle),
            opened_at: Instant::now(),
            logger,
        })
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn target(&self) -> ChannelTarget {
        self.target
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Takes the inbound stream. Returns `None` after the first call.
    pub fn packets(&mut self) -> Option<PacketStream> {
        self.packets.take().map(|receiver| PacketStream {
            receiver,
            generation: self.generation,
        })
    }

    /// Sends `bytes` as one access unit stamped with the channel clock.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let ticks = self.opened_at.elapsed().as_micros() as u64 * VIDEO_CLOCK_RATE / 1_000_000;
        self.send_unit(bytes, ticks as u32)
    }

    /// Packetizes and sends one Annex-B access unit.
    ///
    /// # Errors
    /// `Closed` once the worker has stopped.
    pub fn send_unit(&self, access_unit: &[u8], timestamp: u32) -> Result<()> {
        if !self.is_alive() {
            return Err(TransportError::Closed);
        }
        let outgoing = self.outgoing.as_ref().ok_or(TransportError::Closed)?;
        let packets = self.packetizer.packetize(access_unit, timestamp);
        outgoing.send(packets).map_err(|_| TransportError::Closed)
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| {
                self.logger.error("Channel stats mutex poisoned, recovering");
                poisoned.into_inner()
            })
            .clone()
    }

    /// Stops the worker, which says bye to the peer. Idempotent.
    pub fn close(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.outgoing = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                self.logger.error("Channel worker panicked");
            }
            self.logger
                .info(&format!("Closed channel generation {}", self.generation));
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}
