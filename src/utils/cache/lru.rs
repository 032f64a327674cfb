use std::collections::VecDeque;

use crate::buffer::FrameId;
use crate::error::VellumResult;
use crate::utils::cache::Replacer;

/// Classic least-recently-used replacement.
///
/// Tracking begins when a frame is first marked evictable and ends when it
/// is pinned again, so the queue only ever holds eviction candidates. The
/// front of the queue is the coldest frame.
#[derive(Debug)]
pub struct LRUReplacer {
    capacity: usize,
    queue: VecDeque<FrameId>,
}

impl LRUReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
        }
    }

    fn position(&self, frame_id: FrameId) -> Option<usize> {
        self.queue.iter().position(|tracked| *tracked == frame_id)
    }
}

impl Replacer for LRUReplacer {
    fn record_access(&mut self, frame_id: FrameId) -> VellumResult<()> {
        if let Some(pos) = self.position(frame_id) {
            self.queue.remove(pos);
            self.queue.push_back(frame_id);
        }
        Ok(())
    }

    fn evict(&mut self) -> Option<FrameId> {
        self.queue.pop_front()
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> VellumResult<()> {
        match (self.position(frame_id), evictable) {
            (None, true) => {
                if self.queue.len() < self.capacity {
                    self.queue.push_back(frame_id);
                }
            }
            (Some(pos), false) => {
                self.queue.remove(pos);
            }
            _ => {}
        }
        Ok(())
    }

    fn remove(&mut self, frame_id: FrameId) -> VellumResult<()> {
        if let Some(pos) = self.position(frame_id) {
            self.queue.remove(pos);
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}
