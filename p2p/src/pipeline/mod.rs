//! Decode pipeline
//!
//! Two threads per session:
//!
//! - the decode thread reorders fed packets within the jitter depth,
//!   reassembles access units, decodes them and resyncs on the next
//!   keyframe after any damage;
//! - the present thread paces decoded frames by timestamp and hands them
//!   to the leased render surface.
//!
//! Frames that the surface cannot keep up with are dropped oldest first.

mod decode_thread;
mod frame_queue;
mod present_thread;

pub use frame_queue::FrameQueue;

use crate::config::PipelineConfig;
use decode_thread::{DecodeThreadParams, run_decode_thread};
use logging::Logger;
use media::{SurfaceLease, VideoDecoder};
use network::FramePacket;
use present_thread::{PresentThreadParams, run_present_thread};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No decodable keyframe for longer than the stall timeout.
    #[error("no valid keyframe for {0:?}")]
    Stalled(Duration),
    #[error("decode pipeline closed")]
    Closed,
}

/// Called from the decode thread when the pipeline gives up.
pub type FailureSink = Box<dyn Fn(PipelineError) + Send>;

const INTAKE_CAPACITY: usize = 256;

#[derive(Default)]
pub(crate) struct Counters {
    packets_fed: AtomicU64,
    units_decoded: AtomicU64,
    units_discarded: AtomicU64,
    frames_presented: AtomicU64,
    frames_dropped: AtomicU64,
    resyncs: AtomicU64,
    decode_errors: AtomicU64,
    stale_dropped: AtomicU64,
    lost: AtomicU64,
}

impl Counters {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStats {
            packets_fed: get(&self.packets_fed),
            units_decoded: get(&self.units_decoded),
            units_discarded: get(&self.units_discarded),
            frames_presented: get(&self.frames_presented),
            frames_dropped: get(&self.frames_dropped),
            resyncs: get(&self.resyncs),
            decode_errors: get(&self.decode_errors),
            stale_dropped: get(&self.stale_dropped),
            lost: get(&self.lost),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub packets_fed: u64,
    pub units_decoded: u64,
    /// Units thrown away: damaged, undecodable or waiting for a keyframe.
    pub units_discarded: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub resyncs: u64,
    pub decode_errors: u64,
    /// Packets older than the jitter window.
    pub stale_dropped: u64,
    /// Sequence numbers skipped by the jitter buffer.
    pub lost: u64,
}

/// Clonable feeding handle, used by the channel pump.
#[derive(Clone)]
pub struct PipelineIntake {
    sender: SyncSender<FramePacket>,
}

impl PipelineIntake {
    /// Blocks while the decode thread is behind.
    ///
    /// # Errors
    ///
    /// `Closed` once the pipeline has shut down.
    pub fn feed(&self, packet: FramePacket) -> Result<()> {
        self.sender.send(packet).map_err(|_| PipelineError::Closed)
    }
}

pub struct DecodePipeline {
    intake: Option<PipelineIntake>,
    frames: Arc<FrameQueue>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    decode_handle: Option<JoinHandle<()>>,
    present_handle: Option<JoinHandle<()>>,
    texture_id: i64,
    logger: Logger,
}

impl DecodePipeline {
    /// Starts the decode and present threads.
    ///
    /// # Arguments
    ///
    /// * `decoder` - Decoder chosen for the negotiated codec
    /// * `lease` - Render surface; released when the present thread exits
    /// * `jitter_depth` - Reorder window in packets
    /// * `on_failure` - Told about fatal errors such as `Stalled`
    ///
    /// # Errors
    ///
    /// `Closed` if a thread cannot be spawned.
    pub fn start(
        decoder: Box<dyn VideoDecoder>,
        lease: SurfaceLease,
        jitter_depth: usize,
        config: &PipelineConfig,
        on_failure: FailureSink,
        logger: &Logger,
    ) -> Result<Self> {
        let logger = logger.for_component("PIPELINE");
        let texture_id = lease.texture_id();
        let (intake_tx, intake_rx) = mpsc::sync_channel(INTAKE_CAPACITY);
        let frames = Arc::new(FrameQueue::new(config.frame_queue_capacity));
        let counters = Arc::new(Counters::default());
        let stop = Arc::new(AtomicBool::new(false));

        logger.info(&format!(
            "Starting pipeline: decoder {}, jitter depth {}, texture {}",
            decoder.name(),
            jitter_depth,
            texture_id
        ));

        let decode_params = DecodeThreadParams {
            intake: intake_rx,
            decoder,
            jitter_depth,
            stall_timeout: config.stall_timeout(),
            frames: Arc::clone(&frames),
            counters: Arc::clone(&counters),
            stop: Arc::clone(&stop),
            on_failure,
            logger: logger.clone(),
        };
        let decode_handle = thread::Builder::new()
            .name("video-decode".to_string())
            .spawn(move || run_decode_thread(decode_params))
            .map_err(|_| PipelineError::Closed)?;

        let present_params = PresentThreadParams {
            frames: Arc::clone(&frames),
            lease,
            fps: config.fps,
            no_frame_interval: config.no_frame_log_interval(),
            counters: Arc::clone(&counters),
            stop: Arc::clone(&stop),
            logger: logger.clone(),
        };
        let present_handle = match thread::Builder::new()
            .name("video-present".to_string())
            .spawn(move || run_present_thread(present_params))
        {
            Ok(handle) => handle,
            Err(e) => {
                logger.error(&format!("Failed to spawn present thread: {}", e));
                stop.store(true, Ordering::SeqCst);
                frames.close();
                let _ = decode_handle.join();
                return Err(PipelineError::Closed);
            }
        };

        Ok(Self {
            intake: Some(PipelineIntake { sender: intake_tx }),
            frames,
            counters,
            stop,
            decode_handle: Some(decode_handle),
            present_handle: Some(present_handle),
            texture_id,
            logger,
        })
    }

    /// Feeds one packet, blocking while the decode thread is behind.
    pub fn feed(&self, packet: FramePacket) -> Result<()> {
        self.intake.as_ref().ok_or(PipelineError::Closed)?.feed(packet)
    }

    /// A feeding handle for another thread.
    pub fn intake(&self) -> Option<PipelineIntake> {
        self.intake.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn texture_id(&self) -> i64 {
        self.texture_id
    }

    /// Stops both threads and waits for them. The render surface is
    /// released by the time this returns. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.intake = None;
        self.frames.close();

        let mut joined = false;
        for handle in [self.decode_handle.take(), self.present_handle.take()]
            .into_iter()
            .flatten()
        {
            joined = true;
            if handle.join().is_err() {
                self.logger.error("Pipeline thread panicked");
            }
        }
        if joined {
            let stats = self.stats();
            self.logger.info(&format!(
                "Pipeline stopped: {} packets, {} decoded, {} discarded, {} presented, {} dropped, {} resyncs",
                stats.packets_fed,
                stats.units_decoded,
                stats.units_discarded,
                stats.frames_presented,
                stats.frames_dropped,
                stats.resyncs
            ));
        }
    }
}

impl Drop for DecodePipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
