use bytes::Bytes;
use log::debug;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::frame::{AtomicPageId, FrameHeader, FrameId, PageId, PAGE_SIZE};
use super::page_guard::{ReadPageGuard, WritePageGuard};
use crate::config::BufferPoolConfig;
use crate::error::{VellumError, VellumResult};
use crate::storage::disk_scheduler::DiskScheduler;
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;

/// Page table and free list, guarded together by the single pool latch.
#[derive(Debug)]
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_frames: VecDeque<FrameId>,
}

/// The buffer pool: a bounded set of frames caching pages of the backing
/// file, handed out to clients as scoped read/write guards.
///
/// All admission and eviction decisions happen under one pool latch, which
/// is also held across the synchronous disk round trip of a miss so no two
/// threads can race on loading the same frame. Lock ranks, outermost
/// first: pool latch, replacer latch, frame latch.
#[derive(Debug)]
pub struct BufferPoolManager {
    num_frames: usize,
    next_page_id: AtomicPageId,
    frames: Vec<Arc<FrameHeader>>,
    state: Mutex<PoolState>,
    replacer: Arc<Mutex<LRUKReplacer>>,
    disk_scheduler: Arc<DiskScheduler>,
}

impl BufferPoolManager {
    pub fn new(num_frames: usize, disk_scheduler: Arc<DiskScheduler>, k_dist: usize) -> Self {
        let mut frames = Vec::with_capacity(num_frames);
        let mut free_frames = VecDeque::with_capacity(num_frames);
        for i in 0..num_frames {
            frames.push(Arc::new(FrameHeader::new(i)));
            free_frames.push_back(i);
        }

        Self {
            num_frames,
            next_page_id: AtomicPageId::new(0),
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(num_frames),
                free_frames,
            }),
            replacer: Arc::new(Mutex::new(LRUKReplacer::with_k(num_frames, k_dist))),
            disk_scheduler,
        }
    }

    pub fn new_with_config(config: BufferPoolConfig, disk_scheduler: Arc<DiskScheduler>) -> Self {
        Self::new(config.buffer_pool_size, disk_scheduler, config.lru_k_k)
    }

    /// Number of frames this pool manages.
    pub fn size(&self) -> usize {
        self.num_frames
    }

    /// Allocates the next page id and grows the backing file to host it.
    /// The page is not loaded into memory.
    pub fn new_page(&self) -> VellumResult<PageId> {
        let _state = self.state.lock();
        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        self.await_completion(self.disk_scheduler.schedule_increase_disk_space(page_id)?)?;
        Ok(page_id)
    }

    /// Acquires a shared lease on `page_id`, loading it on a miss.
    /// `Ok(None)` means every frame is pinned.
    pub fn checked_read_page(&self, page_id: PageId) -> VellumResult<Option<ReadPageGuard>> {
        let Some(frame) = self.pin_frame(page_id)? else {
            return Ok(None);
        };
        Ok(Some(ReadPageGuard::new(
            page_id,
            frame,
            self.replacer.clone(),
        )))
    }

    /// Acquires an exclusive lease on `page_id`, loading it on a miss.
    /// `Ok(None)` means every frame is pinned.
    pub fn checked_write_page(&self, page_id: PageId) -> VellumResult<Option<WritePageGuard>> {
        let Some(frame) = self.pin_frame(page_id)? else {
            return Ok(None);
        };
        Ok(Some(WritePageGuard::new(
            page_id,
            frame,
            self.replacer.clone(),
        )))
    }

    /// `checked_read_page` that panics when no frame is available or the
    /// read fails. Test convenience only.
    pub fn read_page(&self, page_id: PageId) -> ReadPageGuard {
        match self.checked_read_page(page_id) {
            Ok(Some(guard)) => guard,
            Ok(None) => panic!("checked_read_page failed to bring in page {}", page_id),
            Err(e) => panic!("checked_read_page failed for page {}: {}", page_id, e),
        }
    }

    /// `checked_write_page` that panics when no frame is available or the
    /// read fails. Test convenience only.
    pub fn write_page(&self, page_id: PageId) -> WritePageGuard {
        match self.checked_write_page(page_id) {
            Ok(Some(guard)) => guard,
            Ok(None) => panic!("checked_write_page failed to bring in page {}", page_id),
            Err(e) => panic!("checked_write_page failed for page {}: {}", page_id, e),
        }
    }

    /// Writes a resident dirty page back to disk, waiting for completion.
    /// Returns `Ok(false)` if the page is not resident. The dirty bit is
    /// left set; eviction recycles the frame anyway and a redundant flush
    /// only re-writes identical bytes.
    pub fn flush_page(&self, page_id: PageId) -> VellumResult<bool> {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        if self.frames[frame_id].meta().is_dirty {
            self.flush_frame(frame_id, page_id)?;
        }
        Ok(true)
    }

    /// Flushes every resident dirty page, waiting for each write.
    pub fn flush_all_pages(&self) -> VellumResult<()> {
        let state = self.state.lock();
        for (&page_id, &frame_id) in state.page_table.iter() {
            if self.frames[frame_id].meta().is_dirty {
                self.flush_frame(frame_id, page_id)?;
            }
        }
        Ok(())
    }

    /// Drops a page from the pool and hints deallocation to the scheduler.
    /// Returns `Ok(false)` if the page is resident and pinned. A resident
    /// dirty page is discarded without flushing: delete wins.
    pub fn delete_page(&self, page_id: PageId) -> VellumResult<bool> {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            self.await_completion(self.disk_scheduler.schedule_deallocate(page_id)?)?;
            return Ok(true);
        };

        let frame = &self.frames[frame_id];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        frame.reset();
        state.page_table.remove(&page_id);
        state.free_frames.push_back(frame_id);
        {
            let mut replacer = self.replacer.lock();
            replacer.set_evictable(frame_id, true);
            replacer.remove(frame_id)?;
        }
        self.await_completion(self.disk_scheduler.schedule_deallocate(page_id)?)?;
        Ok(true)
    }

    /// Pin count of a resident page, `None` if absent. Diagnostic.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<usize> {
        let state = self.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(self.frames[frame_id].pin_count() as usize)
    }

    /// Resolves `page_id` to a pinned, non-evictable frame, loading it from
    /// disk on a miss. `Ok(None)` means the pool is full of pinned frames.
    ///
    /// The pool latch is held through the whole resolution, including the
    /// disk await, and released before the caller takes the frame latch;
    /// the pin taken here keeps the frame resident in between.
    fn pin_frame(&self, page_id: PageId) -> VellumResult<Option<Arc<FrameHeader>>> {
        let mut state = self.state.lock();

        let frame_id = if let Some(&frame_id) = state.page_table.get(&page_id) {
            frame_id
        } else {
            let frame_id = if let Some(frame_id) = state.free_frames.pop_front() {
                frame_id
            } else {
                match self.evict_victim(&mut state)? {
                    Some(frame_id) => frame_id,
                    None => return Ok(None),
                }
            };
            state.page_table.insert(page_id, frame_id);
            if let Err(e) = self.load_frame(frame_id, page_id) {
                // the frame's bytes are undefined now; retire the mapping
                // instead of exposing them
                state.page_table.remove(&page_id);
                state.free_frames.push_back(frame_id);
                return Err(e);
            }
            frame_id
        };

        let frame = self.frames[frame_id].clone();
        frame.pin();
        frame.meta().page_id = Some(page_id);
        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id)?;
            replacer.set_evictable(frame_id, false);
        }
        Ok(Some(frame))
    }

    /// Reads `page_id` from disk into the frame's buffer and resets its
    /// metadata. Called with the pool latch held.
    fn load_frame(&self, frame_id: FrameId, page_id: PageId) -> VellumResult<()> {
        let data = self.await_completion(self.disk_scheduler.schedule_read(page_id)?)?;
        let frame = &self.frames[frame_id];
        {
            let _write = frame.rwlatch().write();
            unsafe { frame.data_mut().copy_from_slice(&data[..PAGE_SIZE]) };
        }
        let mut meta = frame.meta();
        meta.page_id = Some(page_id);
        meta.is_dirty = false;
        Ok(())
    }

    /// Picks a victim through the replacer, flushing it first if dirty.
    /// Called with the pool latch held; `Ok(None)` means nothing is
    /// evictable.
    fn evict_victim(&self, state: &mut PoolState) -> VellumResult<Option<FrameId>> {
        loop {
            let victim = self.replacer.lock().evict();
            let Some(victim) = victim else {
                return Ok(None);
            };
            let frame = &self.frames[victim];

            if frame.pin_count() > 0 {
                // a fetch re-pinned this frame before the dropping guard got
                // around to marking it evictable; re-register and retry
                let mut replacer = self.replacer.lock();
                replacer.record_access(victim)?;
                replacer.set_evictable(victim, false);
                continue;
            }

            let meta = *frame.meta();
            if let Some(evicted_page_id) = meta.page_id {
                if meta.is_dirty {
                    debug!(
                        "flushing dirty page {} evicted from frame {}",
                        evicted_page_id, victim
                    );
                    self.flush_frame(victim, evicted_page_id)?;
                }
                state.page_table.remove(&evicted_page_id);
            }
            frame.reset();
            return Ok(Some(victim));
        }
    }

    /// Copies the frame's bytes under its read latch and writes them through
    /// the scheduler, waiting for completion. The dirty bit is untouched.
    fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> VellumResult<()> {
        let frame = &self.frames[frame_id];
        let bytes = {
            let _read = frame.rwlatch().read();
            Bytes::copy_from_slice(unsafe { frame.data() })
        };
        self.await_completion(self.disk_scheduler.schedule_write(page_id, bytes)?)?;
        Ok(())
    }

    fn await_completion<T>(
        &self,
        receiver: std::sync::mpsc::Receiver<VellumResult<T>>,
    ) -> VellumResult<T> {
        receiver
            .recv()
            .map_err(|e| VellumError::Internal(format!("Disk scheduler disconnected: {}", e)))?
    }
}
