use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock capability.
///
/// The pipeline never reads the system time directly; every temporal check
/// goes through a `Clock` so that tests can pin or move time at will.
pub trait Clock: Send + Sync {
    /// Current time as POSIX seconds.
    fn now(&self) -> u64;
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A clock pinned to an explicit instant, movable at runtime.
///
/// Meant for tests and offline validation of historic certificates.
#[derive(Debug, Default)]
pub struct FixedClock {
    at: AtomicU64,
}

impl FixedClock {
    /// Creates a clock reporting `at` seconds since the epoch.
    pub fn new(at: u64) -> Self {
        Self {
            at: AtomicU64::new(at),
        }
    }

    /// Moves the clock to a new instant.
    pub fn set(&self, at: u64) {
        self.at.store(at, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.at.load(Ordering::Relaxed)
    }
}
