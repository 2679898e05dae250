//! Bounded decoded-frame queue between the decode and present threads
//!
//! When the renderer falls behind, the oldest frame is dropped to make room.

use media::DecodedFrame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

struct QueueState {
    frames: VecDeque<DecodedFrame>,
    closed: bool,
}

pub struct FrameQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Condvar::new(),
            capacity,
        }
    }

    /// Queues `frame`.
    ///
    /// # Returns
    ///
    /// `true` if the oldest frame was dropped to make room. Frames pushed
    /// after `close` are discarded and also count as dropped.
    pub fn push(&self, frame: DecodedFrame) -> bool {
        let mut state = self.lock();
        if state.closed {
            return true;
        }
        let dropped = if state.frames.len() >= self.capacity {
            state.frames.pop_front();
            true
        } else {
            false
        };
        state.frames.push_back(frame);
        drop(state);
        self.ready.notify_one();
        dropped
    }

    /// Waits up to `timeout` for a frame. `None` on timeout or once closed
    /// and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<DecodedFrame> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.frames.is_empty() && !s.closed)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.frames.pop_front()
    }

    /// Wakes waiters; queued frames are discarded.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.frames.clear();
        drop(state);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
