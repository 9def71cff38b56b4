//! Wall-clock abstraction
//!
//! Timestamps end up in error logs and in the names of imported failure logs.
//! Components take a [`Clock`] so tests can pin them.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Source of the current time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at one instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// The system clock as a shared handle
pub fn system() -> SharedClock {
    Arc::new(SystemClock)
}

/// Compact timestamp for file names, e.g. `20240131T235959Z`
pub fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}
