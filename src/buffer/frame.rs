use parking_lot::{Mutex, MutexGuard, RwLock};
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

pub type PageId = u32;
pub type AtomicPageId = AtomicU32;
pub type FrameId = usize;

pub const PAGE_SIZE: usize = 4096;

/// Frame metadata mutated under the pool latch or the frame's writer lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameMeta {
    pub page_id: Option<PageId>,
    pub is_dirty: bool,
}

/// One slot of the pool.
///
/// The byte buffer is reachable only through the unsafe slice accessors;
/// callers must hold `rwlatch` in the matching mode for as long as the
/// returned slice is alive.
pub struct FrameHeader {
    frame_id: FrameId,
    pin_count: AtomicU32,
    meta: Mutex<FrameMeta>,
    rwlatch: RwLock<()>,
    data: UnsafeCell<Box<[u8]>>,
}

unsafe impl Send for FrameHeader {}
unsafe impl Sync for FrameHeader {}

impl FrameHeader {
    pub(crate) fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            pin_count: AtomicU32::new(0),
            meta: Mutex::new(FrameMeta::default()),
            rwlatch: RwLock::new(()),
            data: UnsafeCell::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    /// Increments the pin count, returning the previous value.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Decrements the pin count, returning the previous value.
    pub(crate) fn unpin(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::SeqCst)
    }

    pub(crate) fn meta(&self) -> MutexGuard<'_, FrameMeta> {
        self.meta.lock()
    }

    pub(crate) fn rwlatch(&self) -> &RwLock<()> {
        &self.rwlatch
    }

    /// # Safety
    ///
    /// The caller must hold `rwlatch` in read or write mode while the slice
    /// is alive.
    pub(crate) unsafe fn data(&self) -> &[u8] {
        &(*self.data.get()).as_ref()[..]
    }

    /// # Safety
    ///
    /// The caller must hold `rwlatch` in write mode while the slice is
    /// alive.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut [u8] {
        &mut (*self.data.get()).as_mut()[..]
    }

    /// Returns the frame to its pristine state: zeroed bytes, no resident
    /// page, clean, unpinned.
    pub(crate) fn reset(&self) {
        let _write = self.rwlatch.write();
        unsafe { self.data_mut().fill(0) };
        *self.meta.lock() = FrameMeta::default();
        self.pin_count.store(0, Ordering::SeqCst);
    }
}

impl fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHeader")
            .field("frame_id", &self.frame_id)
            .field("pin_count", &self.pin_count)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
