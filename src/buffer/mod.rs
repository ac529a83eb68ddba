mod buffer_pool;
mod frame;
mod page_guard;

pub use buffer_pool::BufferPoolManager;
pub use frame::{AtomicPageId, FrameHeader, FrameId, FrameMeta, PageId, PAGE_SIZE};
pub use page_guard::{ReadPageGuard, WritePageGuard};
