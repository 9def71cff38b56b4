//! Test configuration helpers

use ocr_harvest::Config;
use std::path::Path;
use std::time::Duration;

/// Configuration for a temporary archive root
///
/// Retries are fast and few, the queue does not pause between items and the
/// disk space check is off, so tests finish quickly on any machine.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::for_root(root);
    config.fetch.timeout = Duration::from_secs(5);
    config.retry.max_attempts = 3;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.queue.item_delay = Duration::ZERO;
    config.disk_space.enabled = false;
    config
}

/// Initialise a test subscriber once; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("ocr_harvest=debug")
        .try_init();
}
