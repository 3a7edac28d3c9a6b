//! Worker pool, auto-scaling, retries, and the public task engine API
//! (§4.8).

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::config::TaskConfig;
use crate::error::CoreError;
use crate::platform::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize};

use super::queue::PriorityQueues;
use super::{Priority, Task, TaskId, TaskPayload, TaskStatus};

struct ResultSlot {
    status: Mutex<TaskStatus>,
    result: Mutex<Option<Result<Vec<u8>, CoreError>>>,
    condvar: Condvar,
    retries_done: AtomicU32,
}

impl ResultSlot {
    fn new() -> Self {
        Self {
            status: Mutex::new(TaskStatus::Pending),
            result: Mutex::new(None),
            condvar: Condvar::new(),
            retries_done: AtomicU32::new(0),
        }
    }

    /// Writes a terminal status/result, unless the slot was cancelled while
    /// the task was running — `cancel()` must win that race, never a
    /// `Succeeded`/`Failed` outcome computed from a payload that had already
    /// been told to stop mattering. Returns whether the write happened.
    fn set_terminal(&self, status: TaskStatus, result: Result<Vec<u8>, CoreError>) -> bool {
        let mut current = self.status.lock();
        if *current == TaskStatus::Cancelled {
            return false;
        }
        *current = status;
        drop(current);
        *self.result.lock() = Some(result);
        self.condvar.notify_all();
        true
    }
}

/// Process-global task engine statistics (§9).
#[derive(Debug, Default)]
pub struct TaskStats {
    pub submitted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub retried: AtomicU64,
    pub cancelled: AtomicU64,
    pub timed_out: AtomicU64,
    pub running: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskStatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub running: usize,
    pub queued: usize,
    pub worker_count: usize,
}

struct Shared {
    queues: PriorityQueues,
    results: DashMap<TaskId, Arc<ResultSlot>>,
    next_id: AtomicU64,
    stats: TaskStats,
    running: AtomicBool,
    worker_target: AtomicUsize,
    worker_count: AtomicUsize,
    wake: Arc<(Mutex<()>, Condvar)>,
    config: TaskConfig,
}

impl Shared {
    fn requeue(self: &Arc<Self>, task: Arc<Task>) {
        self.queues.push(task);
        self.wake.1.notify_all();
    }

    fn execute(self: &Arc<Self>, task: Arc<Task>) {
        let slot = match self.results.get(&task.id) {
            Some(s) => s.clone(),
            None => return,
        };

        {
            let mut status = slot.status.lock();
            if *status == TaskStatus::Cancelled {
                return;
            }
            *status = TaskStatus::Running;
        }
        self.stats.running.fetch_add(1, Ordering::Relaxed);

        let start = Instant::now();
        let outcome = (task.payload)();
        let elapsed = start.elapsed();
        self.stats.running.fetch_sub(1, Ordering::Relaxed);

        // `cancel()` may have flipped the slot to `Cancelled` while the
        // payload was running; a cancelled task's outcome must never
        // overwrite that status or be counted towards succeeded/failed.
        if *slot.status.lock() == TaskStatus::Cancelled {
            return;
        }

        if elapsed > task.timeout {
            self.handle_timeout(&task, &slot);
            return;
        }

        match outcome {
            Ok(bytes) => {
                if slot.set_terminal(TaskStatus::Succeeded, Ok(bytes)) {
                    self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(err) => self.handle_failure(&task, &slot, err),
        }
    }

    fn handle_timeout(self: &Arc<Self>, task: &Arc<Task>, slot: &Arc<ResultSlot>) {
        if *slot.status.lock() == TaskStatus::Cancelled {
            return;
        }
        self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
        self.retry_or_fail(task, slot, CoreError::Timeout(task.timeout));
    }

    fn handle_failure(self: &Arc<Self>, task: &Arc<Task>, slot: &Arc<ResultSlot>, err: CoreError) {
        self.retry_or_fail(task, slot, err);
    }

    fn retry_or_fail(self: &Arc<Self>, task: &Arc<Task>, slot: &Arc<ResultSlot>, err: CoreError) {
        let attempt = slot.retries_done.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= task.max_retries {
            let mut status = slot.status.lock();
            if *status == TaskStatus::Cancelled {
                return;
            }
            *status = TaskStatus::Pending;
            drop(status);
            self.stats.retried.fetch_add(1, Ordering::Relaxed);
            let backoff_ms =
                (10f64 * task.retry_backoff_factor.powi(attempt as i32)).min(5_000.0) as u64;
            let engine = self.clone();
            let retry_task = task.clone();
            crate::platform::spawn_thread(format!("task-retry-{}", task.id), move || {
                std::thread::sleep(Duration::from_millis(backoff_ms));
                engine.requeue(retry_task);
            });
        } else if slot.set_terminal(TaskStatus::Failed, Err(err)) {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    loop {
        if !shared.running.load(Ordering::Relaxed) {
            return;
        }
        if worker_id >= shared.worker_target.load(Ordering::Relaxed) {
            shared.worker_count.fetch_sub(1, Ordering::Relaxed);
            return;
        }

        match shared.queues.try_pop() {
            Some(task) => shared.execute(task),
            None => {
                let (lock, cvar) = &*shared.wake;
                let mut guard = lock.lock();
                cvar.wait_for(&mut guard, Duration::from_millis(200));
            }
        }
    }
}

/// The task engine: priority queues, a scaling worker pool, retries with
/// exponential backoff, and per-task result retrieval.
pub struct TaskEngine {
    shared: Arc<Shared>,
    monitor: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl TaskEngine {
    pub fn create(config: TaskConfig) -> Self {
        let shared = Arc::new(Shared {
            queues: PriorityQueues::new(),
            results: DashMap::new(),
            next_id: AtomicU64::new(1),
            stats: TaskStats::default(),
            running: AtomicBool::new(false),
            worker_target: AtomicUsize::new(config.min_workers.max(1)),
            worker_count: AtomicUsize::new(0),
            wake: Arc::new((Mutex::new(()), Condvar::new())),
            config,
        });
        Self {
            shared,
            monitor: Mutex::new(None),
        }
    }

    /// Starts the worker pool (and the auto-scale monitor if configured).
    pub fn start(&self) {
        if self
            .shared
            .running
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        let target = self.shared.worker_target.load(Ordering::Relaxed);
        for id in 0..target {
            self.spawn_worker(id);
        }

        if self.shared.config.auto_scale {
            let shared = self.shared.clone();
            let handle = crate::platform::spawn_thread("task-autoscale", move || {
                autoscale_monitor(shared);
            });
            *self.monitor.lock() = Some(handle);
        }
    }

    fn spawn_worker(&self, id: usize) {
        self.shared.worker_count.fetch_add(1, Ordering::Relaxed);
        let shared = self.shared.clone();
        std::thread::Builder::new()
            .name(format!("catzilla-task-worker-{id}"))
            .spawn(move || worker_loop(shared, id))
            .expect("failed to spawn task worker");
    }

    /// Signals workers to stop; if `wait` is true, blocks until the worker
    /// count reaches zero.
    pub fn stop(&self, wait: bool) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.worker_target.store(0, Ordering::SeqCst);
        self.shared.wake.1.notify_all();
        if wait {
            while self.shared.worker_count.load(Ordering::Relaxed) > 0 {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    pub fn destroy(self) {
        self.stop(true);
    }

    /// `add_task(payload, priority, delay_ms, max_retries) -> task_id`.
    pub fn add_task(
        &self,
        payload: TaskPayload,
        priority: Priority,
        delay_ms: u64,
        max_retries: u32,
    ) -> TaskId {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.results.insert(id, Arc::new(ResultSlot::new()));
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let task = Arc::new(Task {
            id,
            priority,
            payload,
            timeout: self.shared.config.default_timeout,
            max_retries,
            retry_backoff_factor: 2.0,
        });

        if delay_ms == 0 {
            self.shared.requeue(task);
        } else {
            let shared = self.shared.clone();
            crate::platform::spawn_thread(format!("task-delay-{id}"), move || {
                std::thread::sleep(Duration::from_millis(delay_ms));
                shared.requeue(task);
            });
        }
        id
    }

    /// Cancels a task. Pending tasks are marked so a worker skips them when
    /// popped; a task already running completes but its result is
    /// discarded by the caller's perspective (status reports `Cancelled`).
    pub fn cancel(&self, id: TaskId) -> bool {
        if let Some(slot) = self.shared.results.get(&id) {
            let mut status = slot.status.lock();
            if matches!(*status, TaskStatus::Pending | TaskStatus::Running) {
                *status = TaskStatus::Cancelled;
                drop(status);
                self.shared.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                slot.condvar.notify_all();
                return true;
            }
        }
        false
    }

    pub fn get_status(&self, id: TaskId) -> Option<TaskStatus> {
        self.shared.results.get(&id).map(|s| *s.status.lock())
    }

    /// `wait_for_result(id, timeout) -> (ok, bytes)`.
    pub fn wait_for_result(&self, id: TaskId, timeout: Duration) -> (bool, Vec<u8>) {
        let slot = match self.shared.results.get(&id) {
            Some(s) => s.clone(),
            None => return (false, Vec::new()),
        };

        let deadline = Instant::now() + timeout;
        let mut status = slot.status.lock();
        while !matches!(
            *status,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::TimedOut
        ) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (false, Vec::new());
            }
            let timed_out = slot.condvar.wait_for(&mut status, remaining).timed_out();
            if timed_out {
                break;
            }
        }

        match slot.result.lock().take() {
            Some(Ok(bytes)) => (true, bytes),
            _ => (false, Vec::new()),
        }
    }

    pub fn stats(&self) -> TaskStatsSnapshot {
        TaskStatsSnapshot {
            submitted: self.shared.stats.submitted.load(Ordering::Relaxed),
            succeeded: self.shared.stats.succeeded.load(Ordering::Relaxed),
            failed: self.shared.stats.failed.load(Ordering::Relaxed),
            retried: self.shared.stats.retried.load(Ordering::Relaxed),
            cancelled: self.shared.stats.cancelled.load(Ordering::Relaxed),
            timed_out: self.shared.stats.timed_out.load(Ordering::Relaxed),
            running: self.shared.stats.running.load(Ordering::Relaxed),
            queued: self.shared.queues.total_queued(),
            worker_count: self.shared.worker_count.load(Ordering::Relaxed),
        }
    }
}

/// Periodically recomputes queue pressure and adjusts the worker target
/// between `min_workers` and `max_workers` (§4.8 "Auto-scaling").
fn autoscale_monitor(shared: Arc<Shared>) {
    const TARGET_PER_WORKER: f64 = 8.0;
    const SCALE_UP_THRESHOLD: f64 = 1.5;
    const SCALE_DOWN_THRESHOLD: f64 = 0.25;
    const COOLDOWN: Duration = Duration::from_millis(500);

    let mut last_scale = Instant::now() - COOLDOWN;
    while shared.running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
        let workers = shared.worker_target.load(Ordering::Relaxed).max(1);
        let pressure = shared.queues.total_queued() as f64 / (workers as f64 * TARGET_PER_WORKER);

        if last_scale.elapsed() < COOLDOWN {
            continue;
        }

        if pressure > SCALE_UP_THRESHOLD && workers < shared.config.max_workers {
            let new_id = workers;
            shared.worker_target.store(workers + 1, Ordering::SeqCst);
            shared.worker_count.fetch_add(1, Ordering::Relaxed);
            let worker_shared = shared.clone();
            std::thread::Builder::new()
                .name(format!("catzilla-task-worker-{new_id}"))
                .spawn(move || worker_loop(worker_shared, new_id))
                .ok();
            last_scale = Instant::now();
        } else if pressure < SCALE_DOWN_THRESHOLD && workers > shared.config.min_workers.max(1) {
            shared.worker_target.store(workers - 1, Ordering::SeqCst);
            shared.wake.1.notify_all();
            last_scale = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TaskConfig {
        TaskConfig {
            min_workers: 1,
            max_workers: 4,
            queue_capacity: 64,
            default_timeout: Duration::from_secs(5),
            max_retries: 2,
            auto_scale: false,
        }
    }

    #[test]
    fn submitted_task_runs_and_succeeds() {
        let engine = TaskEngine::create(config());
        engine.start();
        let id = engine.add_task(
            Arc::new(|| Ok(b"done".to_vec())),
            Priority::Normal,
            0,
            0,
        );
        let (ok, bytes) = engine.wait_for_result(id, Duration::from_secs(2));
        assert!(ok);
        assert_eq!(bytes, b"done");
        engine.stop(true);
    }

    #[test]
    fn failing_task_retries_then_terminally_fails() {
        let engine = TaskEngine::create(config());
        engine.start();
        let id = engine.add_task(
            Arc::new(|| Err(CoreError::Internal("boom".into()))),
            Priority::Normal,
            0,
            1,
        );
        let (ok, _) = engine.wait_for_result(id, Duration::from_secs(3));
        assert!(!ok);
        assert_eq!(engine.get_status(id), Some(TaskStatus::Failed));
        assert_eq!(engine.stats().retried, 1);
        engine.stop(true);
    }

    #[test]
    fn cancelling_a_pending_task_prevents_execution() {
        let engine = TaskEngine::create(config());
        // Don't start workers yet, so the task stays queued.
        let id = engine.add_task(Arc::new(|| Ok(Vec::new())), Priority::Low, 0, 0);
        assert!(engine.cancel(id));
        assert_eq!(engine.get_status(id), Some(TaskStatus::Cancelled));
    }

    #[test]
    fn priority_queue_drains_highest_first() {
        let queues = PriorityQueues::new();
        let make = |id: TaskId, p: Priority| {
            Arc::new(Task {
                id,
                priority: p,
                payload: Arc::new(|| Ok(Vec::new())),
                timeout: Duration::from_secs(1),
                max_retries: 0,
                retry_backoff_factor: 2.0,
            })
        };
        queues.push(make(1, Priority::Low));
        queues.push(make(2, Priority::Critical));
        queues.push(make(3, Priority::Normal));

        assert_eq!(queues.try_pop().unwrap().id, 2);
        assert_eq!(queues.try_pop().unwrap().id, 3);
        assert_eq!(queues.try_pop().unwrap().id, 1);
    }
}
