//! Channel worker thread
//!
//! Owns the socket for one generation: sends queued media, keeps the
//! path alive, reorders inbound media and serves NACKs in both directions.

use super::ChannelStats;
use super::config::ChannelConfig;
use super::keepalive::{KeepaliveAction, KeepaliveTracker};
use super::nack::{NackTracker, SendHistory};
use crate::codec::{Datagram, FramePacket, ReorderBuffer};
use crate::error::{Result, TransportError};
use crate::transport::UdpTransport;
use logging::Logger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const DELIVERY_RETRY: Duration = Duration::from_millis(10);
const RECEIVE_LOG_INTERVAL: u64 = 100;

pub(crate) struct ChannelThreadParams {
    pub transport: UdpTransport,
    pub generation: u32,
    pub config: ChannelConfig,
    pub outgoing: Receiver<Vec<FramePacket>>,
    pub packets: SyncSender<Result<FramePacket>>,
    pub stats: Arc<Mutex<ChannelStats>>,
    pub alive: Arc<AtomicBool>,
    pub stop: Arc<AtomicBool>,
    pub logger: Logger,
}

enum Flow {
    Continue,
    /// The channel ended; whether to say bye to the peer.
    End { send_bye: bool },
}

struct ChannelWorker {
    transport: UdpTransport,
    generation: u32,
    config: ChannelConfig,
    packets: SyncSender<Result<FramePacket>>,
    alive: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    logger: Logger,
    keepalive: KeepaliveTracker,
    reorder: ReorderBuffer,
    history: SendHistory,
    nacks: NackTracker,
    next_sequence: u32,
    stats: ChannelStats,
}

pub(crate) fn run_channel_thread(params: ChannelThreadParams) {
    let ChannelThreadParams {
        transport,
        generation,
        config,
        outgoing,
        packets,
        stats,
        alive,
        stop,
        logger,
    } = params;

    logger.info(&format!("Channel worker started (generation {})", generation));

    let mut worker = ChannelWorker {
        keepalive: KeepaliveTracker::new(config.keepalive_interval(), config.max_missed_acks),
        reorder: ReorderBuffer::new(config.reorder_window),
        history: SendHistory::new(config.history_size),
        nacks: NackTracker::default(),
        next_sequence: 0,
        stats: ChannelStats::default(),
        transport,
        generation,
        config,
        packets,
        alive,
        stop,
        logger,
    };

    let send_bye = loop {
        if worker.stop.load(Ordering::SeqCst) {
            break true;
        }
        if let Flow::End { send_bye } = worker.step(&outgoing) {
            break send_bye;
        }
        publish_stats(&stats, &worker.stats, &worker.logger);
    };

    worker.alive.store(false, Ordering::SeqCst);
    if send_bye {
        worker.send_datagram(&Datagram::Bye);
    }
    publish_stats(&stats, &worker.stats, &worker.logger);
    worker.logger.info(&format!(
        "Channel worker stopped (generation {}, received {}, lost {})",
        worker.generation, worker.stats.packets_received, worker.stats.lost
    ));
}

fn publish_stats(shared: &Arc<Mutex<ChannelStats>>, local: &ChannelStats, logger: &Logger) {
    let mut guard = shared.lock().unwrap_or_else(|poisoned| {
        logger.error("Channel stats mutex poisoned, recovering");
        poisoned.into_inner()
    });
    *guard = local.clone();
}

impl ChannelWorker {
    fn step(&mut self, outgoing: &Receiver<Vec<FramePacket>>) -> Flow {
        loop {
            match outgoing.try_recv() {
                Ok(batch) => self.send_media(batch),
                Err(TryRecvError::Empty) => break,
                // The channel handle is gone.
                Err(TryRecvError::Disconnected) => return Flow::End { send_bye: true },
            }
        }

        match self.keepalive.poll(Instant::now()) {
            KeepaliveAction::Idle => {}
            KeepaliveAction::SendPing(id) => {
                self.stats.keepalives_sent += 1;
                self.send_datagram(&Datagram::Keepalive(id));
            }
            KeepaliveAction::Dead(missed) => {
                self.logger.warn(&format!(
                    "Peer missed {} keepalive acks, channel generation {} is dead",
                    missed, self.generation
                ));
                self.end_with(TransportError::Dead {
                    generation: self.generation,
                    missed_acks: missed,
                });
                return Flow::End { send_bye: false };
            }
        }

        let bytes = match self.transport.receive() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                self.logger.error(&format!("Channel socket failed: {}", e));
                self.end_with(e);
                return Flow::End { send_bye: false };
            }
        };
        if self.transport.answer_probe(&bytes) {
            return Flow::Continue;
        }

        match Datagram::decode(&bytes) {
            Ok(datagram) => self.handle(datagram),
            Err(e) => {
                self.stats.invalid += 1;
                self.logger.debug(&format!("Dropping datagram: {}", e));
                Flow::Continue
            }
        }
    }

    fn handle(&mut self, datagram: Datagram) -> Flow {
        match datagram {
            Datagram::Media { packet, retransmit } => {
                self.receive_media(packet, retransmit);
            }
            Datagram::Keepalive(id) => self.send_datagram(&Datagram::KeepaliveAck(id)),
            Datagram::KeepaliveAck(id) => {
                if self.keepalive.on_ack(id) {
                    self.stats.keepalive_acks += 1;
                }
            }
            Datagram::Nack(sequences) => self.retransmit(&sequences),
            Datagram::Bye => {
                self.logger.info(&format!(
                    "Peer closed channel generation {}",
                    self.generation
                ));
                for packet in self.reorder.flush() {
                    self.deliver(Ok(packet));
                }
                self.end_with(TransportError::RemoteBye);
                return Flow::End { send_bye: false };
            }
        }
        Flow::Continue
    }

    fn receive_media(&mut self, packet: FramePacket, retransmit: bool) {
        self.stats.packets_received += 1;
        self.stats.bytes_received += packet.payload.len() as u64;
        if retransmit {
            self.stats.retransmits_received += 1;
        }
        if self.stats.packets_received.is_multiple_of(RECEIVE_LOG_INTERVAL) {
            self.logger.debug(&format!(
                "Received {} media packets (lost {}, stale {})",
                self.stats.packets_received, self.stats.lost, self.stats.stale_dropped
            ));
        }

        let released = self.reorder.push(packet.with_generation(self.generation));
        for packet in released {
            self.deliver_media(packet);
        }

        if self.config.nack_enabled {
            let fresh = self.nacks.fresh(&self.reorder.missing());
            if !fresh.is_empty() {
                self.stats.nacks_sent += 1;
                self.logger
                    .debug(&format!("Requesting retransmission of {:?}", fresh));
                self.send_datagram(&Datagram::Nack(fresh));
            }
            if let Some(next) = self.reorder.next_expected() {
                self.nacks.prune(next);
            }
        }

        let reorder = self.reorder.stats();
        self.stats.lost = reorder.lost;
        self.stats.stale_dropped = reorder.stale_dropped;
        self.stats.duplicates = reorder.duplicates;
        self.stats.reordered = reorder.reordered;
    }

    fn send_media(&mut self, batch: Vec<FramePacket>) {
        for mut packet in batch {
            packet.sequence = self.next_sequence;
            packet.generation = self.generation;
            self.next_sequence = self.next_sequence.wrapping_add(1);
            self.stats.packets_sent += 1;
            self.stats.bytes_sent += packet.payload.len() as u64;
            self.send_datagram(&Datagram::media(packet.clone()));
            self.history.record(packet);
        }
    }

    fn retransmit(&mut self, sequences: &[u32]) {
        self.stats.nacks_received += 1;
        for sequence in sequences {
            let Some(packet) = self.history.get(*sequence).cloned() else {
                continue;
            };
            self.stats.retransmitted += 1;
            self.send_datagram(&Datagram::Media {
                packet,
                retransmit: true,
            });
        }
    }

    fn send_datagram(&mut self, datagram: &Datagram) {
        if let Err(e) = self.transport.send(&datagram.encode()) {
            self.logger.debug(&format!(
                "Failed to send {:?} datagram: {}",
                datagram.kind(),
                e
            ));
        }
    }

    /// Media never blocks the worker; overflow is counted and dropped.
    fn deliver_media(&mut self, packet: FramePacket) {
        match self.packets.try_send(Ok(packet)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.queue_overflow += 1;
                if self.stats.queue_overflow == 1 || self.stats.queue_overflow.is_multiple_of(100)
                {
                    self.logger.warn(&format!(
                        "Receive queue full, dropped {} packets",
                        self.stats.queue_overflow
                    ));
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Marks the channel dead before the stream sees the error.
    fn end_with(&mut self, error: TransportError) {
        self.alive.store(false, Ordering::SeqCst);
        self.deliver(Err(error));
    }

    /// Terminal items wait for room unless the channel is being closed.
    fn deliver(&mut self, item: Result<FramePacket>) {
        let mut item = item;
        loop {
            match self.packets.try_send(item) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(returned)) => {
                    if self.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    item = returned;
                    thread::sleep(DELIVERY_RETRY);
                }
            }
        }
    }
}
