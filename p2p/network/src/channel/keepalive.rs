//! Keepalive bookkeeping
//!
//! One ping is outstanding at a time. Every interval that passes without
//! an acknowledgment counts as a miss; `max_missed` consecutive misses
//! declare the path dead.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    Idle,
    SendPing(u32),
    Dead(u32),
}

pub struct KeepaliveTracker {
    interval: Duration,
    max_missed: u32,
    next_id: u32,
    outstanding: Option<u32>,
    last_ping: Option<Instant>,
    missed: u32,
}

impl KeepaliveTracker {
    pub fn new(interval: Duration, max_missed: u32) -> Self {
        Self {
            interval,
            max_missed: max_missed.max(1),
            next_id: 0,
            outstanding: None,
            last_ping: None,
            missed: 0,
        }
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn poll(&mut self, now: Instant) -> KeepaliveAction {
        if let Some(last) = self.last_ping
            && now.duration_since(last) < self.interval
        {
            return KeepaliveAction::Idle;
        }

        if self.outstanding.is_some() {
            self.missed += 1;
            if self.missed >= self.max_missed {
                return KeepaliveAction::Dead(self.missed);
            }
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.outstanding = Some(id);
        self.last_ping = Some(now);
        KeepaliveAction::SendPing(id)
    }

    /// Records an acknowledgment. A late ack for an earlier ping still
    /// proves the path is alive.
    pub fn on_ack(&mut self, id: u32) -> bool {
        if id >= self.next_id {
            return false;
        }
        self.missed = 0;
        if self.outstanding == Some(id) {
            self.outstanding = None;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn test_first_poll_pings_immediately() {
        let mut tracker = KeepaliveTracker::new(INTERVAL, 3);
        let now = Instant::now();
        assert_eq!(tracker.poll(now), KeepaliveAction::SendPing(0));
        assert_eq!(tracker.poll(now + Duration::from_millis(50)), KeepaliveAction::Idle);
    }

    #[test]
    fn test_dead_after_max_missed() {
        let mut tracker = KeepaliveTracker::new(INTERVAL, 3);
        let start = Instant::now();
        assert_eq!(tracker.poll(start), KeepaliveAction::SendPing(0));
        assert_eq!(tracker.poll(start + INTERVAL), KeepaliveAction::SendPing(1));
        assert_eq!(tracker.poll(start + INTERVAL * 2), KeepaliveAction::SendPing(2));
        assert_eq!(tracker.poll(start + INTERVAL * 3), KeepaliveAction::Dead(3));
    }

    #[test]
    fn test_ack_resets_missed() {
        let mut tracker = KeepaliveTracker::new(INTERVAL, 2);
        let start = Instant::now();
        tracker.poll(start);
        tracker.poll(start + INTERVAL);
        assert_eq!(tracker.missed(), 1);

        // Late ack for ping 0 still counts.
        assert!(tracker.on_ack(0));
        assert_eq!(tracker.missed(), 0);
        assert!(tracker.on_ack(1));
        assert_eq!(tracker.poll(start + INTERVAL * 2), KeepaliveAction::SendPing(2));
        assert_eq!(tracker.missed(), 0);
    }

    #[test]
    fn test_ack_for_unsent_ping_ignored() {
        let mut tracker = KeepaliveTracker::new(INTERVAL, 2);
        assert!(!tracker.on_ack(0));
        tracker.poll(Instant::now());
        assert!(!tracker.on_ack(5));
    }
}
