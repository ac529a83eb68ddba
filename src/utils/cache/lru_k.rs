use super::Replacer;
use crate::buffer::FrameId;
use crate::error::{VellumError, VellumResult};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Access history for one frame: at most `k` timestamps, most recent first.
#[derive(Debug)]
struct LruKNode {
    history: VecDeque<u64>,
    is_evictable: bool,
}

impl LruKNode {
    fn new(timestamp: u64) -> Self {
        let mut history = VecDeque::new();
        history.push_front(timestamp);
        Self {
            history,
            is_evictable: false,
        }
    }

    /// The key this node is ordered by in whichever list it lives in.
    ///
    /// Below `k` accesses the history never rotates, so the back entry is
    /// the first-access timestamp and orders the new list by arrival. At
    /// exactly `k` entries the back is the k-th-most-recent access, the
    /// backward K-distance that orders the cache list.
    fn order_key(&self) -> u64 {
        *self.history.back().unwrap()
    }
}

/// LRU-K replacement over two ordered lists.
///
/// Frames with fewer than `k` recorded accesses are probationary: they are
/// evicted in arrival order no matter how often they were touched, which
/// keeps one-off scans from displacing the working set. Frames with `k`
/// accesses are evicted by oldest backward K-distance.
///
/// Both lists are kept as ordered sets of `(order key, frame id)`; a node
/// stores its current key, so locating an entry never scans a list.
#[derive(Debug)]
pub struct LRUKReplacer {
    // count of evictable frames
    current_size: usize,
    // frame ids must stay below this
    replacer_size: usize,
    k: usize,
    node_store: HashMap<FrameId, LruKNode>,
    // frames with < k accesses, keyed by first-access timestamp
    new_frames: BTreeSet<(u64, FrameId)>,
    // frames with k accesses, keyed by k-th-most-recent timestamp
    cache_frames: BTreeSet<(u64, FrameId)>,
    // monotonic, bumped once per record_access
    current_timestamp: u64,
}

impl LRUKReplacer {
    pub fn with_k(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "LRU-K requires k >= 1");
        Self {
            current_size: 0,
            replacer_size: num_frames,
            k,
            node_store: HashMap::with_capacity(num_frames),
            new_frames: BTreeSet::new(),
            cache_frames: BTreeSet::new(),
            current_timestamp: 0,
        }
    }
}

impl Replacer for LRUKReplacer {
    fn record_access(&mut self, frame_id: FrameId) -> VellumResult<()> {
        if frame_id >= self.replacer_size {
            return Err(VellumError::Internal(format!(
                "frame {} is out of range for a pool of {} frames",
                frame_id, self.replacer_size
            )));
        }
        let timestamp = self.current_timestamp;
        self.current_timestamp += 1;

        if let Some(node) = self.node_store.get_mut(&frame_id) {
            if node.history.len() < self.k - 1 {
                // probationary: position in the new list is fixed by arrival
                node.history.push_front(timestamp);
            } else if node.history.len() == self.k - 1 {
                // graduates into the cache list
                self.new_frames.remove(&(node.order_key(), frame_id));
                node.history.push_front(timestamp);
                self.cache_frames.insert((node.order_key(), frame_id));
            } else {
                // rotate: drop the oldest access, re-key by the new k-th-back
                self.cache_frames.remove(&(node.order_key(), frame_id));
                node.history.pop_back();
                node.history.push_front(timestamp);
                self.cache_frames.insert((node.order_key(), frame_id));
            }
            return Ok(());
        }

        let node = LruKNode::new(timestamp);
        if self.k == 1 {
            self.cache_frames.insert((timestamp, frame_id));
        } else {
            self.new_frames.insert((timestamp, frame_id));
        }
        self.node_store.insert(frame_id, node);
        Ok(())
    }

    fn evict(&mut self) -> Option<FrameId> {
        if let Some(&(key, frame_id)) = self
            .new_frames
            .iter()
            .find(|(_, f)| self.node_store[f].is_evictable)
        {
            self.new_frames.remove(&(key, frame_id));
            self.node_store.remove(&frame_id);
            self.current_size -= 1;
            return Some(frame_id);
        }

        if let Some(&(key, frame_id)) = self
            .cache_frames
            .iter()
            .find(|(_, f)| self.node_store[f].is_evictable)
        {
            self.cache_frames.remove(&(key, frame_id));
            self.node_store.remove(&frame_id);
            self.current_size -= 1;
            return Some(frame_id);
        }

        None
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if let Some(node) = self.node_store.get_mut(&frame_id) {
            if node.is_evictable && !evictable {
                self.current_size -= 1;
            } else if !node.is_evictable && evictable {
                self.current_size += 1;
            }
            node.is_evictable = evictable;
        }
    }

    fn remove(&mut self, frame_id: FrameId) -> VellumResult<()> {
        let Some(node) = self.node_store.get(&frame_id) else {
            return Ok(());
        };
        if !node.is_evictable {
            return Err(VellumError::Internal(format!(
                "frame {} is not evictable",
                frame_id
            )));
        }
        let key = node.order_key();
        if node.history.len() < self.k {
            self.new_frames.remove(&(key, frame_id));
        } else {
            self.cache_frames.remove(&(key, frame_id));
        }
        self.node_store.remove(&frame_id);
        self.current_size -= 1;
        Ok(())
    }

    fn size(&self) -> usize {
        self.current_size
    }
}
