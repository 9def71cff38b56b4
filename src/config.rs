//! Configuration types for ocr-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resource fetching configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single request (default: 1 second)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient fetch failures
///
/// The defaults give five attempts spaced by a fixed quarter second. Set
/// `backoff_multiplier` above 1.0 for exponential backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 250 ms)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Retry queue configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue file name inside the archive root (default: "missing.txt")
    #[serde(default = "default_queue_file")]
    pub file_name: String,

    /// Pause after every item (default: 1 second)
    #[serde(default = "default_item_delay", with = "duration_serde")]
    pub item_delay: Duration,

    /// Stop after this many passes even if items remain (default: unbounded)
    #[serde(default)]
    pub max_passes: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            file_name: default_queue_file(),
            item_delay: default_item_delay(),
            max_passes: None,
        }
    }
}

/// Names of the working directories and files under the archive root
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Manifests waiting to be processed (default: "manifests")
    #[serde(default = "default_todo_dir")]
    pub todo_dir: String,

    /// Manifests being processed (default: "in_progress")
    #[serde(default = "default_progress_dir")]
    pub progress_dir: String,

    /// Manifests fully processed (default: "ocr_complete")
    #[serde(default = "default_finished_dir")]
    pub finished_dir: String,

    /// Scratch space for archive expansion (default: "staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// Per-bundle error log name (default: "failures.log")
    #[serde(default = "default_error_log")]
    pub error_log: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            todo_dir: default_todo_dir(),
            progress_dir: default_progress_dir(),
            finished_dir: default_finished_dir(),
            staging_dir: default_staging_dir(),
            error_log: default_error_log(),
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking before writing bundle archives (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space to maintain (default: 64 MB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Multiplier for the estimated archive size (default: 1.0)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
            size_multiplier: default_size_multiplier(),
        }
    }
}

/// Date reorganization configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReorganizeConfig {
    /// Delete the bundle archive once its marker exists (default: false)
    #[serde(default)]
    pub remove_archive: bool,
}

/// Main configuration, shared by every pipeline component
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Archive root all components work under
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Resource fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retries for a single resource
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retry queue behaviour
    #[serde(default)]
    pub queue: QueueConfig,

    /// Directory and file names
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Disk space checks
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Date reorganization
    #[serde(default)]
    pub reorganize: ReorganizeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            queue: QueueConfig::default(),
            layout: LayoutConfig::default(),
            disk_space: DiskSpaceConfig::default(),
            reorganize: ReorganizeConfig::default(),
        }
    }
}

impl Config {
    /// Default configuration for the given archive root
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Reject settings no component can work with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(config_error("max_attempts must be at least 1", "retry.max_attempts"));
        }
        if self.fetch.timeout.is_zero() {
            return Err(config_error("timeout must be positive", "fetch.timeout"));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }

        let names = [
            ("layout.todo_dir", &self.layout.todo_dir),
            ("layout.progress_dir", &self.layout.progress_dir),
            ("layout.finished_dir", &self.layout.finished_dir),
            ("layout.staging_dir", &self.layout.staging_dir),
            ("layout.error_log", &self.layout.error_log),
            ("queue.file_name", &self.queue.file_name),
        ];
        for (i, (key, name)) in names.iter().enumerate() {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(config_error("must be a plain, non-empty name", key));
            }
            // two-digit names are reserved for bundle subdirectories
            if name.len() == 2 && name.bytes().all(|b| b.is_ascii_digit()) {
                return Err(config_error("collides with bundle subdirectories", key));
            }
            if names[..i].iter().any(|(_, other)| other == name) {
                return Err(config_error("name is used twice", key));
            }
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: format!("{key}: {message}"),
        key: Some(key.to_string()),
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_user_agent() -> String {
    concat!("ocr-harvest/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_queue_file() -> String {
    "missing.txt".to_string()
}

fn default_item_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_todo_dir() -> String {
    "manifests".to_string()
}

fn default_progress_dir() -> String {
    "in_progress".to_string()
}

fn default_finished_dir() -> String {
    "ocr_complete".to_string()
}

fn default_staging_dir() -> String {
    "staging".to_string()
}

fn default_error_log() -> String {
    "failures.log".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_free_space() -> u64 {
    64 * 1024 * 1024
}

fn default_size_multiplier() -> f64 {
    1.0
}

// Durations are written as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
