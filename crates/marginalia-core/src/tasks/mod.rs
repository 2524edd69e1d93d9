//! Task Runner (C15): three priority queues with soft/hard time limits,
//! late-ack semantics, and exponential-backoff retry.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Queue priority level, FIFO within a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Default,
    High,
}

/// Soft/hard time limit pair, in seconds.
#[derive(Debug, Clone, Copy)]
pub struct TimeLimits {
    pub soft_seconds: u64,
    pub hard_seconds: u64,
}

pub const DEFAULT_TIME_LIMITS: TimeLimits = TimeLimits { soft_seconds: 300, hard_seconds: 600 };
pub const PROCESS_BOOK_TIME_LIMITS: TimeLimits = TimeLimits { soft_seconds: 1800, hard_seconds: 3600 };

pub const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Retrying,
}

/// A unit of work: a JSON-only payload dispatched to a named handler.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub payload: Value,
    pub priority: Priority,
    pub limits: TimeLimits,
    pub status: TaskStatus,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(name: impl Into<String>, payload: Value, priority: Priority) -> Self {
        let name = name.into();
        let limits = if name == "process_book" { PROCESS_BOOK_TIME_LIMITS } else { DEFAULT_TIME_LIMITS };
        Self {
            id: Uuid::new_v4(),
            name,
            payload,
            priority,
            limits,
            status: TaskStatus::Queued,
            attempt: 0,
            enqueued_at: Utc::now(),
            not_before: None,
            last_error: None,
        }
    }
}

/// Exponential backoff: `INITIAL_RETRY_DELAY * 2^(attempt - 1)`, for
/// `attempt` in `1..=MAX_RETRY_ATTEMPTS`.
pub fn backoff_delay(attempt: u32) -> Duration {
    INITIAL_RETRY_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1))
}

/// Three FIFO-within-level priority queues plus a fire-and-forget
/// supplementary queue for tasks nobody waits on the result of.
#[derive(Debug, Default)]
pub struct TaskQueue {
    high_priority: VecDeque<Task>,
    default: VecDeque<Task>,
    low_priority: VecDeque<Task>,
    fire_and_forget: VecDeque<Task>,
    in_flight: std::collections::HashMap<Uuid, Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: Task) {
        match task.priority {
            Priority::High => self.high_priority.push_back(task),
            Priority::Default => self.default.push_back(task),
            Priority::Low => self.low_priority.push_back(task),
        }
    }

    /// Enqueue without ever requiring a caller to look up the result.
    pub fn enqueue_fire_and_forget(&mut self, task: Task) {
        self.fire_and_forget.push_back(task);
    }

    /// Pop the next runnable task: high priority first, then default, then
    /// low, then fire-and-forget; within a level, FIFO, skipping tasks whose
    /// `not_before` hasn't elapsed.
    pub fn pop_next(&mut self, now: DateTime<Utc>) -> Option<Task> {
        for queue in [&mut self.high_priority, &mut self.default, &mut self.low_priority, &mut self.fire_and_forget] {
            if let Some(idx) = queue.iter().position(|t| t.not_before.is_none_or(|nb| nb <= now)) {
                let mut task = queue.remove(idx).expect("index from position");
                task.status = TaskStatus::Running;
                task.attempt += 1;
                self.in_flight.insert(task.id, task.clone());
                return Some(task);
            }
        }
        None
    }

    pub fn ack_success(&mut self, task_id: Uuid) -> Option<Task> {
        self.in_flight.remove(&task_id).map(|mut t| {
            t.status = TaskStatus::Succeeded;
            t
        })
    }

    /// A failed task is retried with exponential backoff up to
    /// `MAX_RETRY_ATTEMPTS`, after which it is marked `Failed` permanently.
    pub fn ack_failure(&mut self, task_id: Uuid, now: DateTime<Utc>, error: impl Into<String>) -> Option<TaskStatus> {
        let mut task = self.in_flight.remove(&task_id)?;
        task.last_error = Some(error.into());
        if task.attempt >= MAX_RETRY_ATTEMPTS {
            task.status = TaskStatus::Failed;
            let status = task.status;
            Some(status)
        } else {
            task.status = TaskStatus::Retrying;
            task.not_before = Some(now + chrono::Duration::from_std(backoff_delay(task.attempt)).unwrap_or_default());
            let status = task.status;
            self.enqueue(task);
            Some(status)
        }
    }

    /// A worker that disappears mid-task (lost heartbeat) re-queues its
    /// in-flight task immediately, without counting it as a failed attempt —
    /// the work was never actually observed to fail.
    pub fn requeue_lost_worker_tasks(&mut self, task_ids: &[Uuid]) {
        for id in task_ids {
            if let Some(mut task) = self.in_flight.remove(id) {
                task.status = TaskStatus::Queued;
                task.attempt = task.attempt.saturating_sub(1);
                self.enqueue(task);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.high_priority.len() + self.default.len() + self.low_priority.len() + self.fire_and_forget.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
