//! Sequence reordering within a bounded window
//!
//! Packets are released strictly in sequence order. A packet that arrives
//! ahead of a gap waits until the gap fills or the buffered span reaches
//! the window, at which point the gap is skipped and counted as lost.
//! A packet from a new generation resets the expected sequence.

use super::frame_packet::FramePacket;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderStats {
    pub released: u64,
    /// Packets that arrived ahead of a gap.
    pub reordered: u64,
    /// Packets older than the next expected sequence.
    pub stale_dropped: u64,
    pub duplicates: u64,
    /// Sequence numbers skipped because they never arrived.
    pub lost: u64,
    pub generation_resets: u64,
}

pub struct ReorderBuffer {
    window: usize,
    generation: Option<u32>,
    next_expected: Option<u32>,
    pending: BTreeMap<u32, FramePacket>,
    stats: ReorderStats,
}

impl ReorderBuffer {
    /// `window` is clamped to at least 1.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            generation: None,
            next_expected: None,
            pending: BTreeMap::new(),
            stats: ReorderStats::default(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn next_expected(&self) -> Option<u32> {
        self.next_expected
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &ReorderStats {
        &self.stats
    }

    /// Adds a packet and returns everything that became releasable, in order.
    pub fn push(&mut self, packet: FramePacket) -> Vec<FramePacket> {
        if self.generation != Some(packet.generation) {
            if self.generation.is_some() {
                self.stats.generation_resets += 1;
            }
            self.generation = Some(packet.generation);
            self.next_expected = Some(packet.sequence);
            self.pending.clear();
        }

        let next = *self.next_expected.get_or_insert(packet.sequence);
        let sequence = packet.sequence;

        if sequence < next {
            self.stats.stale_dropped += 1;
            return Vec::new();
        }
        if self.pending.contains_key(&sequence) {
            self.stats.duplicates += 1;
            return Vec::new();
        }
        if sequence != next {
            self.stats.reordered += 1;
        }
        self.pending.insert(sequence, packet);

        let mut released = self.drain_contiguous();
        while self.span() >= self.window {
            self.skip_gap();
            released.extend(self.drain_contiguous());
        }
        released
    }

    /// Releases everything buffered, skipping any gaps.
    pub fn flush(&mut self) -> Vec<FramePacket> {
        let mut released = Vec::new();
        while !self.pending.is_empty() {
            self.skip_gap();
            released.extend(self.drain_contiguous());
        }
        released
    }

    /// Sequence numbers missing between the next expected one and the
    /// highest buffered packet.
    pub fn missing(&self) -> Vec<u32> {
        let (Some(next), Some(&highest)) = (self.next_expected, self.pending.keys().next_back())
        else {
            return Vec::new();
        };
        (next..highest)
            .filter(|sequence| !self.pending.contains_key(sequence))
            .collect()
    }

    pub fn reset(&mut self) {
        self.generation = None;
        self.next_expected = None;
        self.pending.clear();
    }

    fn span(&self) -> usize {
        match (self.next_expected, self.pending.keys().next_back()) {
            (Some(next), Some(&highest)) => (highest - next) as usize + 1,
            _ => 0,
        }
    }

    fn drain_contiguous(&mut self) -> Vec<FramePacket> {
        let mut released = Vec::new();
        while let Some(next) = self.next_expected
            && let Some(packet) = self.pending.remove(&next)
        {
            self.next_expected = Some(next.wrapping_add(1));
            self.stats.released += 1;
            released.push(packet);
        }
        released
    }

    fn skip_gap(&mut self) {
        if let Some((&first, _)) = self.pending.iter().next() {
            if let Some(next) = self.next_expected {
                self.stats.lost += u64::from(first - next);
            }
            self.next_expected = Some(first);
        }
    }
}
