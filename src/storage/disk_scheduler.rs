use bytes::{Bytes, BytesMut};
use log::{debug, error};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use super::disk_manager::DiskManager;
use crate::buffer::PageId;
use crate::error::{VellumError, VellumResult};

// Type alias for the sender part of a completion channel
pub type DiskCommandResultSender<T> = Sender<VellumResult<T>>;
// Type alias for the receiver part of a completion channel
pub type DiskCommandResultReceiver<T> = Receiver<VellumResult<T>>;

/// Requests sent from the buffer pool to the scheduler worker. Every variant
/// carries the completion handle its result is delivered on.
#[derive(Debug)]
pub enum DiskRequest {
    Read {
        page_id: PageId,
        result_sender: DiskCommandResultSender<BytesMut>,
    },
    Write {
        page_id: PageId,
        data: Bytes,
        result_sender: DiskCommandResultSender<()>,
    },
    IncreaseDiskSpace {
        page_id: PageId,
        result_sender: DiskCommandResultSender<()>,
    },
    Deallocate {
        page_id: PageId,
        result_sender: DiskCommandResultSender<()>,
    },
    Shutdown,
}

/// Serializes all disk traffic through one background worker thread fed by a
/// FIFO channel; requests are served in submission order.
#[derive(Debug)]
pub struct DiskScheduler {
    request_sender: Sender<DiskRequest>,
    worker_thread: Option<thread::JoinHandle<()>>,
}

impl DiskScheduler {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (request_sender, request_receiver) = mpsc::channel::<DiskRequest>();
        let worker_thread = thread::Builder::new()
            .name("disk-scheduler-worker".to_string())
            .spawn(move || {
                Self::io_worker_loop(request_receiver, disk_manager);
            })
            .expect("Failed to spawn DiskScheduler worker thread");

        DiskScheduler {
            request_sender,
            worker_thread: Some(worker_thread),
        }
    }

    /// Builds a fresh completion handle: the sender travels with a request
    /// and the caller blocks on the receiver to observe completion.
    pub fn create_promise<T>() -> (DiskCommandResultSender<T>, DiskCommandResultReceiver<T>) {
        mpsc::channel()
    }

    /// Enqueues a request; returns as soon as it is handed to the worker.
    pub fn schedule(&self, request: DiskRequest) -> VellumResult<()> {
        self.request_sender
            .send(request)
            .map_err(|e| VellumError::Internal(format!("Failed to send disk request: {}", e)))
    }

    pub fn schedule_read(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<BytesMut>> {
        let (tx, rx) = Self::create_promise();
        self.schedule(DiskRequest::Read {
            page_id,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    pub fn schedule_write(
        &self,
        page_id: PageId,
        data: Bytes,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = Self::create_promise();
        self.schedule(DiskRequest::Write {
            page_id,
            data,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    pub fn schedule_increase_disk_space(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = Self::create_promise();
        self.schedule(DiskRequest::IncreaseDiskSpace {
            page_id,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    pub fn schedule_deallocate(
        &self,
        page_id: PageId,
    ) -> VellumResult<DiskCommandResultReceiver<()>> {
        let (tx, rx) = Self::create_promise();
        self.schedule(DiskRequest::Deallocate {
            page_id,
            result_sender: tx,
        })?;
        Ok(rx)
    }

    // The background worker loop that processes disk requests
    fn io_worker_loop(receiver: Receiver<DiskRequest>, disk_manager: Arc<DiskManager>) {
        debug!("Disk I/O worker thread started.");
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::Read {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager
                        .read_page(page_id)
                        .map(|data| BytesMut::from(&data[..]));
                    if result_sender.send(result).is_err() {
                        error!("DiskScheduler failed to send Read result for {}", page_id);
                    }
                }
                DiskRequest::Write {
                    page_id,
                    data,
                    result_sender,
                } => {
                    let result = disk_manager.write_page(page_id, &data);
                    if result_sender.send(result).is_err() {
                        error!("DiskScheduler failed to send Write result for {}", page_id);
                    }
                }
                DiskRequest::IncreaseDiskSpace {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager.increase_disk_space(page_id);
                    if result_sender.send(result).is_err() {
                        error!(
                            "DiskScheduler failed to send IncreaseDiskSpace result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::Deallocate {
                    page_id,
                    result_sender,
                } => {
                    let result = disk_manager.deallocate_page(page_id);
                    if result_sender.send(result).is_err() {
                        error!(
                            "DiskScheduler failed to send Deallocate result for {}",
                            page_id
                        );
                    }
                }
                DiskRequest::Shutdown => {
                    debug!("Disk I/O worker thread received Shutdown signal.");
                    break;
                }
            }
        }
        debug!("Disk I/O worker thread finished.");
    }
}

// Graceful shutdown: stop the worker and wait for it.
impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Ignore the error if the channel is already closed.
        let _ = self.request_sender.send(DiskRequest::Shutdown);
        if let Some(handle) = self.worker_thread.take() {
            if let Err(e) = handle.join() {
                error!("Disk worker thread panicked: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PAGE_SIZE;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_scheduler() -> (TempDir, Arc<DiskScheduler>, Arc<DiskManager>) {
        let temp_dir = TempDir::new().expect("unable to create temporary working directory");
        let dm = Arc::new(DiskManager::try_new(temp_dir.path().join("test.db")).unwrap());
        let scheduler = Arc::new(DiskScheduler::new(dm.clone()));
        (temp_dir, scheduler, dm)
    }

    fn create_dummy_page_bytes(content: &str) -> Bytes {
        let mut data = BytesMut::zeroed(PAGE_SIZE);
        let content_bytes = content.as_bytes();
        let len = std::cmp::min(content_bytes.len(), PAGE_SIZE);
        data[..len].copy_from_slice(&content_bytes[..len]);
        data.freeze()
    }

    fn read_page_content(data: &BytesMut) -> String {
        let first_null = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..first_null]).to_string()
    }

    #[test]
    fn test_scheduler_grow_write_read() -> VellumResult<()> {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();

        scheduler
            .schedule_increase_disk_space(0)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        let content = "Hello DiskScheduler!";
        let rx_write = scheduler.schedule_write(0, create_dummy_page_bytes(content))?;
        rx_write
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        let rx_read = scheduler.schedule_read(0)?;
        let read_result = rx_read
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        assert_eq!(read_page_content(&read_result), content);

        Ok(())
    }

    #[test]
    fn test_scheduler_requests_served_in_submission_order() -> VellumResult<()> {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();

        scheduler
            .schedule_increase_disk_space(0)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        // Two writes to the same page followed by a read: the read must see
        // the later write.
        let rx1 = scheduler.schedule_write(0, create_dummy_page_bytes("first"))?;
        let rx2 = scheduler.schedule_write(0, create_dummy_page_bytes("second"))?;
        let rx3 = scheduler.schedule_read(0)?;

        rx1.recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        rx2.recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        let data = rx3
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        assert_eq!(read_page_content(&data), "second");

        Ok(())
    }

    #[test]
    fn test_scheduler_deallocate() -> VellumResult<()> {
        let (_temp_dir, scheduler, dm) = create_test_scheduler();

        scheduler
            .schedule_increase_disk_space(0)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        scheduler
            .schedule_write(0, create_dummy_page_bytes("Test Data"))?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        scheduler
            .schedule_deallocate(0)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        let data_after_dealloc = dm.read_page(0)?;
        assert!(data_after_dealloc.iter().all(|&b| b == 0));

        Ok(())
    }

    #[test]
    fn test_concurrent_reads() -> VellumResult<()> {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();

        scheduler
            .schedule_increase_disk_space(0)?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;
        scheduler
            .schedule_write(0, create_dummy_page_bytes("Concurrent Test"))?
            .recv()
            .map_err(|e| VellumError::Internal(format!("RecvError: {}", e)))??;

        let mut handles = vec![];
        for i in 0..10u64 {
            let scheduler_clone = scheduler.clone();
            handles.push(thread::spawn(move || {
                thread::sleep(Duration::from_millis(i * 5));
                scheduler_clone
                    .schedule_read(0)
                    .map_err(|e| e.to_string())
                    .and_then(|rx| rx.recv().map_err(|e| e.to_string()))
                    .and_then(|res| res.map_err(|e| e.to_string()))
            }));
        }

        for handle in handles {
            match handle.join().unwrap() {
                Ok(read_data) => assert_eq!(read_page_content(&read_data), "Concurrent Test"),
                Err(e) => panic!("Concurrent read thread failed: {}", e),
            }
        }

        Ok(())
    }

    #[test]
    fn test_scheduler_shutdown() {
        let (_temp_dir, scheduler, _dm) = create_test_scheduler();

        let scheduler_clone = scheduler.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            // Scheduling after shutdown either fails to enqueue or the
            // completion channel reports a disconnect.
            scheduler_clone
                .schedule_increase_disk_space(0)
                .map_err(|e| e.to_string())
                .and_then(|rx| rx.recv().map_err(|e| e.to_string()))
        });

        drop(scheduler);
        // Either outcome is acceptable; the point is no hang or panic.
        let _ = handle.join().unwrap();
    }
}
