//! Video present thread
//!
//! Paces decoded frames by their 90 kHz timestamps and hands them to the
//! render surface. Owns the surface lease, so the surface is released as
//! soon as this thread exits.

use super::frame_queue::FrameQueue;
use super::Counters;
use logging::Logger;
use media::{DecodedFrame, SurfaceLease};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// A frame this far off its paced deadline, late or early, re-anchors the clock.
const MAX_LAG: Duration = Duration::from_secs(1);

/// Parameters for the video present thread
pub struct PresentThreadParams {
    pub frames: Arc<FrameQueue>,
    pub lease: SurfaceLease,
    pub fps: u32,
    pub no_frame_interval: Duration,
    pub counters: Arc<Counters>,
    pub stop: Arc<AtomicBool>,
    pub logger: Logger,
}

/// Maps stream timestamps to wall-clock deadlines.
struct PresentClock {
    anchor: Option<(u32, Instant)>,
    last: Option<(u32, Instant)>,
    frame_interval: Duration,
}

impl PresentClock {
    fn new(fps: u32) -> Self {
        Self {
            anchor: None,
            last: None,
            frame_interval: Duration::from_secs(1) / fps.max(1),
        }
    }

    fn deadline(&mut self, frame: &DecodedFrame, now: Instant) -> Instant {
        let paced = match (self.anchor, self.last) {
            // Timestamps that do not move fall back to the nominal rate.
            (Some(_), Some((pts, at))) if pts == frame.pts => Some(at + self.frame_interval),
            (Some((base_pts, base_at)), _) if frame.pts.wrapping_sub(base_pts) < u32::MAX / 2 => {
                Some(base_at + frame.offset_from(base_pts))
            }
            // Behind the anchor: the source restarted its timestamps.
            _ => None,
        };

        let deadline = match paced {
            Some(deadline)
                if now.saturating_duration_since(deadline) <= MAX_LAG
                    && deadline.saturating_duration_since(now) <= MAX_LAG =>
            {
                deadline
            }
            _ => {
                self.anchor = Some((frame.pts, now));
                now
            }
        };
        self.last = Some((frame.pts, deadline));
        deadline
    }
}

fn sleep_until(deadline: Instant, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(POLL_INTERVAL));
    }
}

pub fn run_present_thread(params: PresentThreadParams) {
    let texture_id = params.lease.texture_id();
    params
        .logger
        .info(&format!("Video Present thread started (texture {})", texture_id));

    let mut clock = PresentClock::new(params.fps);
    let mut last_frame_at = Instant::now();
    let mut reported_gap = false;
    let mut presented: u64 = 0;

    while !params.stop.load(Ordering::SeqCst) {
        let Some(frame) = params.frames.pop_timeout(POLL_INTERVAL) else {
            if params.frames.is_closed() {
                break;
            }
            if !reported_gap && last_frame_at.elapsed() >= params.no_frame_interval {
                params.logger.info(&format!(
                    "No frame for {:?} on texture {}",
                    last_frame_at.elapsed(),
                    texture_id
                ));
                reported_gap = true;
            }
            continue;
        };

        let deadline = clock.deadline(&frame, Instant::now());
        if !sleep_until(deadline, &params.stop) {
            break;
        }

        if let Err(e) = params.lease.present(&frame) {
            params
                .logger
                .warn(&format!("Surface rejected frame ts {}: {}", frame.pts, e));
            continue;
        }
        Counters::add(&params.counters.frames_presented, 1);
        presented += 1;
        last_frame_at = Instant::now();
        if reported_gap {
            params.logger.info("Frames resumed");
            reported_gap = false;
        }
        if presented.is_multiple_of(100) {
            params
                .logger
                .debug(&format!("Presented {} frames on texture {}", presented, texture_id));
        }
    }

    params.lease.release();
    params
        .logger
        .info(&format!("Video Present thread stopped, texture {} released", texture_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use media::PixelFormat;

    fn frame(pts: u32) -> DecodedFrame {
        DecodedFrame {
            width: 2,
            height: 2,
            format: PixelFormat::AnnexB,
            data: Vec::new(),
            pts,
        }
    }

    #[test]
    fn test_clock_paces_by_timestamp() {
        let mut clock = PresentClock::new(30);
        let start = Instant::now();
        assert_eq!(clock.deadline(&frame(0), start), start);
        assert_eq!(
            clock.deadline(&frame(3000), start),
            start + Duration::from_micros(33_333)
        );
    }

    #[test]
    fn test_clock_rebases_when_far_behind() {
        let mut clock = PresentClock::new(30);
        let start = Instant::now();
        clock.deadline(&frame(0), start);

        let late = start + Duration::from_secs(5);
        assert_eq!(clock.deadline(&frame(3000), late), late);
        assert_eq!(
            clock.deadline(&frame(6000), late),
            late + Duration::from_micros(33_333)
        );
    }

    #[test]
    fn test_clock_repeated_timestamp_uses_frame_rate() {
        let mut clock = PresentClock::new(25);
        let start = Instant::now();
        clock.deadline(&frame(900), start);
        assert_eq!(
            clock.deadline(&frame(900), start),
            start + Duration::from_millis(40)
        );
    }

    #[test]
    fn test_clock_reanchors_on_forward_jump() {
        let mut clock = PresentClock::new(30);
        let start = Instant::now();
        clock.deadline(&frame(0), start);
        clock.deadline(&frame(3000), start);

        let arrived = start + Duration::from_micros(33_333);
        let jumped = 3000 + 90_000 * 60;
        assert_eq!(clock.deadline(&frame(jumped), arrived), arrived);
        assert_eq!(
            clock.deadline(&frame(jumped + 3000), arrived),
            arrived + Duration::from_micros(33_333)
        );
    }

    #[test]
    fn test_clock_reanchors_on_backward_jump() {
        let mut clock = PresentClock::new(30);
        let start = Instant::now();
        clock.deadline(&frame(90_000 * 10), start);

        let restarted = start + Duration::from_millis(40);
        assert_eq!(clock.deadline(&frame(0), restarted), restarted);
        assert_eq!(
            clock.deadline(&frame(3000), restarted),
            restarted + Duration::from_micros(33_333)
        );
    }

    #[test]
    fn test_clock_reanchors_across_wrap_start() {
        let mut clock = PresentClock::new(30);
        let start = Instant::now();
        clock.deadline(&frame(u32::MAX - 1499), start);
        assert_eq!(
            clock.deadline(&frame(1500), start),
            start + Duration::from_micros(33_333)
        );
    }
}
