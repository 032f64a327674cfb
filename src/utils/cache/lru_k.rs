use std::collections::{HashMap, VecDeque};

use crate::buffer::FrameId;
use crate::error::{VellumError, VellumResult};
use crate::utils::cache::Replacer;

#[derive(Debug)]
struct LRUKNode {
    k: usize,
    /// Timestamps of the most recent accesses, oldest first, at most k kept.
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LRUKNode {
    fn new(k: usize) -> Self {
        Self {
            k,
            history: VecDeque::with_capacity(k),
            is_evictable: false,
        }
    }

    fn record_access(&mut self, timestamp: u64) {
        self.history.push_back(timestamp);
        if self.history.len() > self.k {
            self.history.pop_front();
        }
    }

    /// Backward k-distance at `now`. A frame with fewer than k recorded
    /// accesses ranks as infinite; within that cohort the earliest first
    /// access wins, which the subtraction from `u64::MAX` encodes.
    fn k_distance(&self, now: u64) -> u64 {
        let oldest = *self.history.front().unwrap();
        if self.history.len() < self.k {
            u64::MAX - oldest
        } else {
            now - oldest
        }
    }
}

/// LRU-K replacement: the victim is the evictable frame with the largest
/// backward k-distance.
#[derive(Debug)]
pub struct LRUKReplacer {
    // number of evictable frames
    current_size: usize,
    // upper bound on tracked frames
    replacer_size: usize,
    k: usize,
    node_store: HashMap<FrameId, LRUKNode>,
    // logical clock, one tick per recorded access
    current_timestamp: u64,
}

impl LRUKReplacer {
    pub fn with_k(num_frames: usize, k: usize) -> Self {
        debug_assert!(k > 0);
        Self {
            current_size: 0,
            replacer_size: num_frames,
            k,
            node_store: HashMap::with_capacity(num_frames),
            current_timestamp: 0,
        }
    }
}

impl Replacer for LRUKReplacer {
    fn record_access(&mut self, frame_id: FrameId) -> VellumResult<()> {
        if frame_id >= self.replacer_size {
            return Err(VellumError::Internal(format!(
                "frame id {} out of range for replacer over {} frames",
                frame_id, self.replacer_size
            )));
        }
        match self.node_store.get_mut(&frame_id) {
            Some(node) => node.record_access(self.current_timestamp),
            None => {
                // At capacity an unseen frame is ignored; the pool never
                // tracks more frames than it owns.
                if self.node_store.len() >= self.replacer_size {
                    return Ok(());
                }
                let mut node = LRUKNode::new(self.k);
                node.record_access(self.current_timestamp);
                self.node_store.insert(frame_id, node);
            }
        }
        self.current_timestamp += 1;
        Ok(())
    }

    fn evict(&mut self) -> Option<FrameId> {
        let mut victim: Option<(FrameId, u64)> = None;
        for (frame_id, node) in self.node_store.iter() {
            if !node.is_evictable {
                continue;
            }
            let distance = node.k_distance(self.current_timestamp);
            match victim {
                Some((_, best)) if distance <= best => {}
                _ => victim = Some((*frame_id, distance)),
            }
        }
        let (frame_id, _) = victim?;
        self.node_store.remove(&frame_id);
        self.current_size -= 1;
        Some(frame_id)
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) -> VellumResult<()> {
        if frame_id >= self.replacer_size {
            return Err(VellumError::Internal(format!(
                "frame id {} out of range for replacer over {} frames",
                frame_id, self.replacer_size
            )));
        }
        if let Some(node) = self.node_store.get_mut(&frame_id) {
            if node.is_evictable != evictable {
                node.is_evictable = evictable;
                if evictable {
                    self.current_size += 1;
                } else {
                    self.current_size -= 1;
                }
            }
        }
        Ok(())
    }

    fn remove(&mut self, frame_id: FrameId) -> VellumResult<()> {
        match self.node_store.get(&frame_id) {
            Some(node) if !node.is_evictable => Err(VellumError::Internal(format!(
                "cannot remove non-evictable frame {} from replacer",
                frame_id
            ))),
            Some(_) => {
                self.node_store.remove(&frame_id);
                self.current_size -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn size(&self) -> usize {
        self.current_size
    }
}
