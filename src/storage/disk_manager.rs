use log::debug;
use parking_lot::{Mutex, MutexGuard};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::buffer::{PageId, PAGE_SIZE};
use crate::error::{VellumError, VellumResult};

static EMPTY_PAGE: [u8; PAGE_SIZE] = [0; PAGE_SIZE];

/// Raw page I/O against the single backing file. The file handle is wrapped
/// in a mutex so only one thread touches it at a time; in practice the only
/// caller is the disk scheduler's worker thread.
#[derive(Debug)]
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    pub fn try_new(db_path: impl AsRef<Path>) -> VellumResult<Self> {
        let db_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path.as_ref())?;

        let db_file_len = db_file.metadata()?.len();
        if db_file_len % PAGE_SIZE as u64 != 0 {
            return Err(VellumError::Storage(format!(
                "db file size {} is not a multiple of the page size {}",
                db_file_len, PAGE_SIZE
            )));
        }
        debug!(
            "opened db file {:?} holding {} pages",
            db_path.as_ref(),
            db_file_len / PAGE_SIZE as u64
        );

        Ok(Self {
            db_file: Mutex::new(db_file),
        })
    }

    pub fn read_page(&self, page_id: PageId) -> VellumResult<[u8; PAGE_SIZE]> {
        let mut guard = self.db_file.lock();
        guard.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        let mut page = [0u8; PAGE_SIZE];
        guard.read_exact(&mut page)?;
        Ok(page)
    }

    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> VellumResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(VellumError::Internal(format!(
                "page data is {} bytes, expected {}",
                data.len(),
                PAGE_SIZE
            )));
        }
        let mut guard = self.db_file.lock();
        Self::write_page_internal(&mut guard, page_id, data)
    }

    /// Grows the backing file until `page_id` is addressable, zero-filling
    /// the new region. Never shrinks the file.
    pub fn increase_disk_space(&self, page_id: PageId) -> VellumResult<()> {
        let guard = self.db_file.lock();
        let required = (page_id as u64 + 1) * PAGE_SIZE as u64;
        if guard.metadata()?.len() < required {
            guard.set_len(required)?;
        }
        Ok(())
    }

    /// Deallocation hint. The page's region is zeroed but never handed back:
    /// page ids are allocated monotonically and not reused.
    pub fn deallocate_page(&self, page_id: PageId) -> VellumResult<()> {
        let mut guard = self.db_file.lock();
        if (page_id as u64 + 1) * PAGE_SIZE as u64 <= guard.metadata()?.len() {
            Self::write_page_internal(&mut guard, page_id, &EMPTY_PAGE)?;
        }
        debug!("deallocated page {}", page_id);
        Ok(())
    }

    pub fn db_file_len(&self) -> VellumResult<u64> {
        let guard = self.db_file.lock();
        Ok(guard.metadata()?.len())
    }

    fn write_page_internal(
        guard: &mut MutexGuard<File>,
        page_id: PageId,
        data: &[u8],
    ) -> VellumResult<()> {
        guard.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
        guard.write_all(data)?;
        guard.flush()?;
        Ok(())
    }
}
