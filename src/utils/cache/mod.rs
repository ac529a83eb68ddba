use crate::buffer::FrameId;
use crate::error::VellumResult;

pub mod lru_k;

/// Replacement policy over pool frames.
pub trait Replacer {
    /// Records a logical access to `frame_id` at the next timestamp.
    fn record_access(&mut self, frame_id: FrameId) -> VellumResult<()>;

    /// Picks a victim, removes its bookkeeping entirely, and returns it.
    /// `None` when no frame is evictable.
    fn evict(&mut self) -> Option<FrameId>;

    /// Toggles whether `frame_id` may be chosen by `evict`. No-op on a
    /// frame the replacer has never seen.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool);

    /// Extracts a frame's entry regardless of its access history. Errors if
    /// the frame is present but not evictable; no-op if absent.
    fn remove(&mut self, frame_id: FrameId) -> VellumResult<()>;

    /// Number of evictable frames.
    fn size(&self) -> usize;
}
