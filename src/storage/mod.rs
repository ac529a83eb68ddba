pub mod disk_manager;
pub mod disk_scheduler;

pub use disk_manager::DiskManager;
pub use disk_scheduler::{
    DiskCommandResultReceiver, DiskCommandResultSender, DiskRequest, DiskScheduler,
};
