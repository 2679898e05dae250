//! NACK-based retransmission state
//!
//! The sender keeps a bounded history of media packets by sequence
//! number. The receiver requests each missing sequence at most once.

use crate::codec::FramePacket;
use std::collections::{BTreeSet, VecDeque};

pub struct SendHistory {
    capacity: usize,
    packets: VecDeque<FramePacket>,
}

impl SendHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            packets: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Records a sent packet. Sequences are expected to be contiguous.
    pub fn record(&mut self, packet: FramePacket) {
        if self.capacity == 0 {
            return;
        }
        if self.packets.len() == self.capacity {
            self.packets.pop_front();
        }
        self.packets.push_back(packet);
    }

    pub fn get(&self, sequence: u32) -> Option<&FramePacket> {
        let first = self.packets.front()?.sequence;
        let index = sequence.checked_sub(first)? as usize;
        self.packets
            .get(index)
            .filter(|packet| packet.sequence == sequence)
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }
}

#[derive(Default)]
pub struct NackTracker {
    requested: BTreeSet<u32>,
}

impl NackTracker {
    /// Filters `missing` down to sequences not requested before.
    pub fn fresh(&mut self, missing: &[u32]) -> Vec<u32> {
        missing
            .iter()
            .copied()
            .filter(|sequence| self.requested.insert(*sequence))
            .collect()
    }

    /// Forgets requests below `next_expected`.
    pub fn prune(&mut self, next_expected: u32) {
        self.requested = self.requested.split_off(&next_expected);
    }

    pub fn outstanding(&self) -> usize {
        self.requested.len()
    }
}
