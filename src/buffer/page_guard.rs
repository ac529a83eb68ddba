use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use std::mem::{self, ManuallyDrop};
use std::sync::Arc;

use super::frame::{FrameHeader, FrameId, PageId};
use crate::utils::cache::lru_k::LRUKReplacer;
use crate::utils::cache::Replacer;

/// Shared lease over one resident page.
///
/// Holds the frame's read lock for its whole lifetime, so any number of
/// read guards may coexist while write guards are shut out. The pool pins
/// the frame and records the access before the guard is built; dropping
/// the guard releases the lock, unpins, and re-marks the frame evictable
/// once the last pin is gone. Guards keep the frame and the replacer alive
/// through shared handles, so releasing one is safe even if it outlives
/// the pool.
#[derive(Debug)]
pub struct ReadPageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    replacer: Arc<Mutex<LRUKReplacer>>,
    guard: ManuallyDrop<RwLockReadGuard<'static, ()>>,
}

impl ReadPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        replacer: Arc<Mutex<LRUKReplacer>>,
    ) -> Self {
        let guard = frame.rwlatch().read();
        // The lifetime is erased so the guard can live beside the Arc that
        // owns the lock; it is dropped manually before the Arc goes away.
        let guard_static: RwLockReadGuard<'static, ()> = unsafe {
            mem::transmute::<RwLockReadGuard<'_, ()>, RwLockReadGuard<'static, ()>>(guard)
        };
        ReadPageGuard {
            page_id,
            frame,
            replacer,
            guard: ManuallyDrop::new(guard_static),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        // Shared access is protected by the read lock held for the guard's
        // lifetime.
        unsafe { self.frame.data() }
    }

    pub fn is_dirty(&self) -> bool {
        self.frame.meta().is_dirty
    }

    pub fn pin_count(&self) -> u32 {
        self.frame.pin_count()
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        release_pin(&self.frame, &self.replacer);
    }
}

/// Exclusive lease over one resident page.
///
/// Holds the frame's write lock and marks the frame dirty at construction;
/// the dirty bit stays set after the guard drops, until the page is
/// flushed or the frame is recycled.
#[derive(Debug)]
pub struct WritePageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    replacer: Arc<Mutex<LRUKReplacer>>,
    guard: ManuallyDrop<RwLockWriteGuard<'static, ()>>,
}

impl WritePageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        replacer: Arc<Mutex<LRUKReplacer>>,
    ) -> Self {
        let guard = frame.rwlatch().write();
        let guard_static: RwLockWriteGuard<'static, ()> = unsafe {
            mem::transmute::<RwLockWriteGuard<'_, ()>, RwLockWriteGuard<'static, ()>>(guard)
        };
        frame.meta().is_dirty = true;
        WritePageGuard {
            page_id,
            frame,
            replacer,
            guard: ManuallyDrop::new(guard_static),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        unsafe { self.frame.data() }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        // Exclusive access is protected by the write lock held for the
        // guard's lifetime.
        unsafe { self.frame.data_mut() }
    }

    pub fn is_dirty(&self) -> bool {
        self.frame.meta().is_dirty
    }

    pub fn pin_count(&self) -> u32 {
        self.frame.pin_count()
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame.frame_id()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        release_pin(&self.frame, &self.replacer);
    }
}

fn release_pin(frame: &Arc<FrameHeader>, replacer: &Arc<Mutex<LRUKReplacer>>) {
    if frame.unpin() == 1 {
        replacer.lock().set_evictable(frame.frame_id(), true);
    }
}
