//! Task engine: priority queues + worker pool for background work (§4.8).
//!
//! Four priority queues (`Critical` > `High` > `Normal` > `Low`) feed a pool
//! of worker threads that drain the highest-priority non-empty queue first.
//! Workers are OS threads (§5 "classic thread pool"), not tokio tasks — the
//! task engine is where CPU- or blocking-bound work the event loop
//! shouldn't run gets offloaded to.

mod pool;
mod queue;

pub use pool::{TaskEngine, TaskStats, TaskStatsSnapshot};
pub use queue::Priority;

use std::sync::Arc;
use std::time::Duration;

use crate::error::CoreError;

pub type TaskId = u64;
pub type TaskPayload = Arc<dyn Fn() -> Result<Vec<u8>, CoreError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

/// A unit of background work (§3 "Task").
pub struct Task {
    pub id: TaskId,
    pub priority: Priority,
    pub payload: TaskPayload,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff_factor: f64,
}
