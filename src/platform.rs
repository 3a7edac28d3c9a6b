//! Platform primitives: monotonic clock, locks, and atomics.
//!
//! The native core is specified against abstract platform primitives
//! (§4.9) so that the concurrency model (§5) is stated independently of any
//! particular OS. In this implementation the abstraction is thin — it wraps
//! `std`/`parking_lot` types under names that match the spec's vocabulary,
//! rather than reimplementing them.

use std::time::Instant;

/// A read/write lock. Readers (cache `get` fast path, router `lookup`) do
/// not block each other; writers (cache `set`, router `add`) are exclusive.
pub use parking_lot::RwLock;

/// A plain mutex, used where a single critical section (not reader/writer
/// split) is the natural shape — e.g. task queue internals.
pub use parking_lot::Mutex;

/// A condition variable, used by `stream_wait_for_drain` and
/// `wait_for_result` to suspend cooperatively instead of busy-polling.
pub use parking_lot::Condvar;

pub use std::sync::atomic::Ordering;
pub use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize};

/// Monotonic nanosecond clock, anchored at process start. Never goes
/// backwards; safe to use for TTL and timeout arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Nanoseconds elapsed since this clock was constructed.
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_CLOCK: once_cell::sync::Lazy<Clock> = once_cell::sync::Lazy::new(Clock::new);

/// Process-wide monotonic nanosecond timestamp, suitable for
/// `created_at`/`expires_at`/`last_access` fields that are only ever
/// compared against each other.
pub fn now_ns() -> u64 {
    PROCESS_CLOCK.now_ns()
}

pub fn now_ms() -> u64 {
    PROCESS_CLOCK.now_ms()
}

/// Spawns a named OS thread, used by the task engine's worker pool.
pub fn spawn_thread<F>(name: impl Into<String>, f: F) -> std::thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .expect("failed to spawn platform thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn process_clock_advances() {
        let a = now_ns();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = now_ns();
        assert!(b > a);
    }
}
