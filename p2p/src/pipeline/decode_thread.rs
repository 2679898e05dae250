//! Video decode thread
//!
//! Pops fed packets, restores their order within the jitter depth,
//! reassembles access units and decodes them. After any damage the decoder
//! is reset and units are discarded until the next keyframe.

use super::frame_queue::FrameQueue;
use super::{Counters, FailureSink, PipelineError};
use logging::Logger;
use media::{EncodedUnit, VideoDecoder};
use network::{FramePacket, H264Depacketizer, ReorderBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const PROGRESS_LOG_INTERVAL: u64 = 30;

/// Parameters for the video decode thread
pub struct DecodeThreadParams {
    pub intake: Receiver<FramePacket>,
    pub decoder: Box<dyn VideoDecoder>,
    pub jitter_depth: usize,
    pub stall_timeout: Duration,
    pub frames: Arc<FrameQueue>,
    pub counters: Arc<Counters>,
    pub stop: Arc<AtomicBool>,
    pub on_failure: FailureSink,
    pub logger: Logger,
}

struct DecodeState {
    decoder: Box<dyn VideoDecoder>,
    jitter: ReorderBuffer,
    depacketizer: H264Depacketizer,
    awaiting_keyframe: bool,
    /// When the current wait for a keyframe started.
    awaiting_since: Instant,
    lost_seen: u64,
    stale_seen: u64,
    frames: Arc<FrameQueue>,
    counters: Arc<Counters>,
    logger: Logger,
}

impl DecodeState {
    fn handle_packet(&mut self, packet: FramePacket) {
        Counters::add(&self.counters.packets_fed, 1);
        for ordered in self.jitter.push(packet) {
            self.handle_ordered(ordered);
        }
        self.sync_jitter_counters();
    }

    fn handle_ordered(&mut self, packet: FramePacket) {
        for unit in self.depacketizer.push(&packet) {
            self.handle_unit(unit);
        }
    }

    fn drain(&mut self) {
        for packet in self.jitter.flush() {
            self.handle_ordered(packet);
        }
        if let Some(unit) = self.depacketizer.flush() {
            self.handle_unit(unit);
        }
        self.sync_jitter_counters();
    }

    fn handle_unit(&mut self, unit: EncodedUnit) {
        if unit.damaged {
            self.discard(&unit, "lost packets");
            self.resync();
            return;
        }
        if self.awaiting_keyframe && !unit.keyframe {
            self.discard(&unit, "waiting for keyframe");
            return;
        }

        match self.decoder.decode(&unit) {
            Ok(Some(frame)) => {
                if self.awaiting_keyframe {
                    self.logger.info(&format!(
                        "Decoding from keyframe at ts {} (seq {})",
                        unit.timestamp, unit.first_sequence
                    ));
                    self.awaiting_keyframe = false;
                }
                Counters::add(&self.counters.units_decoded, 1);
                let decoded = self.counters.units_decoded.load(Ordering::Relaxed);
                if decoded.is_multiple_of(PROGRESS_LOG_INTERVAL) {
                    self.logger.info(&format!(
                        "DECODED frame #{}: {}x{}",
                        decoded, frame.width, frame.height
                    ));
                }
                if self.frames.push(frame) {
                    Counters::add(&self.counters.frames_dropped, 1);
                }
            }
            Ok(None) => {}
            Err(e) => {
                Counters::add(&self.counters.decode_errors, 1);
                self.logger.warn(&format!(
                    "Decode error on ts {} (seq {}..{}): {}",
                    unit.timestamp, unit.first_sequence, unit.last_sequence, e
                ));
                self.discard(&unit, "decode error");
                self.resync();
            }
        }
    }

    fn discard(&mut self, unit: &EncodedUnit, reason: &str) {
        Counters::add(&self.counters.units_discarded, 1);
        self.logger.debug(&format!(
            "Discarding unit ts {} (seq {}..{}): {}",
            unit.timestamp, unit.first_sequence, unit.last_sequence, reason
        ));
    }

    fn resync(&mut self) {
        if !self.awaiting_keyframe {
            self.awaiting_keyframe = true;
            self.awaiting_since = Instant::now();
            Counters::add(&self.counters.resyncs, 1);
            self.logger.info("Resyncing at next keyframe");
        }
        self.decoder.reset();
    }

    fn sync_jitter_counters(&mut self) {
        let stats = self.jitter.stats();
        Counters::add(&self.counters.lost, stats.lost - self.lost_seen);
        Counters::add(&self.counters.stale_dropped, stats.stale_dropped - self.stale_seen);
        self.lost_seen = stats.lost;
        self.stale_seen = stats.stale_dropped;
    }
}

pub fn run_decode_thread(params: DecodeThreadParams) {
    params.logger.info("Video Decode thread started");

    let mut state = DecodeState {
        decoder: params.decoder,
        jitter: ReorderBuffer::new(params.jitter_depth),
        depacketizer: H264Depacketizer::new(),
        awaiting_keyframe: true,
        awaiting_since: Instant::now(),
        lost_seen: 0,
        stale_seen: 0,
        frames: params.frames,
        counters: params.counters,
        logger: params.logger.clone(),
    };

    loop {
        if params.stop.load(Ordering::SeqCst) {
            break;
        }

        match params.intake.recv_timeout(POLL_INTERVAL) {
            Ok(packet) => state.handle_packet(packet),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                state.drain();
                break;
            }
        }

        if state.awaiting_keyframe {
            let waited = state.awaiting_since.elapsed();
            if waited >= params.stall_timeout {
                params
                    .logger
                    .error(&format!("No valid keyframe for {:?}, pipeline stalled", waited));
                (params.on_failure)(PipelineError::Stalled(waited));
                break;
            }
        }
    }

    params.logger.info("Video Decode thread stopped");
}
