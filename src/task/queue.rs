//! Per-priority MPMC queues backing the task engine (§3 "Queue").

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::Task;

/// Task priority, highest first in declaration order (§3 "Task").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    pub const ORDER: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

/// Four independent MPMC channels, one per priority level.
pub struct PriorityQueues {
    senders: [Sender<Arc<Task>>; 4],
    receivers: [Receiver<Arc<Task>>; 4],
}

impl PriorityQueues {
    pub fn new() -> Self {
        let channels: Vec<(Sender<Arc<Task>>, Receiver<Arc<Task>>)> =
            (0..4).map(|_| unbounded()).collect();
        let mut senders = Vec::with_capacity(4);
        let mut receivers = Vec::with_capacity(4);
        for (s, r) in channels {
            senders.push(s);
            receivers.push(r);
        }
        Self {
            senders: senders.try_into().unwrap_or_else(|_| unreachable!()),
            receivers: receivers.try_into().unwrap_or_else(|_| unreachable!()),
        }
    }

    pub fn push(&self, task: Arc<Task>) {
        let _ = self.senders[task.priority.index()].send(task);
    }

    /// Polls queues highest-priority first, returning the first task found
    /// without blocking.
    pub fn try_pop(&self) -> Option<Arc<Task>> {
        for priority in Priority::ORDER {
            if let Ok(task) = self.receivers[priority.index()].try_recv() {
                return Some(task);
            }
        }
        None
    }

    pub fn total_queued(&self) -> usize {
        self.receivers.iter().map(|r| r.len()).sum()
    }
}

impl Default for PriorityQueues {
    fn default() -> Self {
        Self::new()
    }
}
