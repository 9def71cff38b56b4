//! Retry queue for resources that could not be fetched inline
//!
//! - [`file`]: the on-disk queue format
//! - [`manager`]: round-robin passes that re-attempt queued resources
//! - [`import`]: turning bundle error logs into queue entries

pub mod file;
pub mod import;
pub mod manager;

pub use file::QueueFile;
pub use import::import_failure_logs;
pub use manager::RetryQueueManager;
