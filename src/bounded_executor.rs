use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ExecutorError;

/// A deferred unit of work handed to [`run_bounded`].
pub type Task<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send + 'static>;

/// Box a closure as a [`Task`].
pub fn task<T, E, F>(f: F) -> Task<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    Box::new(f)
}

/// Why a task did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskFailure<E> {
    /// The task returned `Err`.
    #[error("{0}")]
    Failed(E),
    /// The task panicked before returning.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Settled result of one task, stored at the task's submission index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Fulfilled { value: T },
    Rejected { reason: TaskFailure<E> },
}

impl<T, E> Outcome<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled { .. })
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fulfilled()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fulfilled { value } => Some(value),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&TaskFailure<E>> {
        match self {
            Outcome::Fulfilled { .. } => None,
            Outcome::Rejected { reason } => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<T, TaskFailure<E>> {
        match self {
            Outcome::Fulfilled { value } => Ok(value),
            Outcome::Rejected { reason } => Err(reason),
        }
    }
}

/// Normalized parallelism for [`run_bounded`].
///
/// Malformed limits are never rejected: anything non-finite or below 1 becomes
/// 1, fractional values are floored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConcurrencyLimit(usize);

impl ConcurrencyLimit {
    pub fn get(self) -> usize {
        self.0
    }

    /// Effective worker count for a run of `task_count` tasks.
    pub fn clamp_to(self, task_count: usize) -> usize {
        self.0.min(task_count)
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        ConcurrencyLimit(1)
    }
}

impl From<usize> for ConcurrencyLimit {
    fn from(v: usize) -> Self {
        ConcurrencyLimit(v.max(1))
    }
}

impl From<u32> for ConcurrencyLimit {
    fn from(v: u32) -> Self {
        ConcurrencyLimit::from(usize::try_from(v).unwrap_or(usize::MAX))
    }
}

impl From<i64> for ConcurrencyLimit {
    fn from(v: i64) -> Self {
        if v < 1 {
            return ConcurrencyLimit(1);
        }
        ConcurrencyLimit::from(usize::try_from(v).unwrap_or(usize::MAX))
    }
}

impl From<i32> for ConcurrencyLimit {
    fn from(v: i32) -> Self {
        ConcurrencyLimit::from(i64::from(v))
    }
}

impl From<f64> for ConcurrencyLimit {
    fn from(v: f64) -> Self {
        if !v.is_finite() || v < 1.0 {
            return ConcurrencyLimit(1);
        }
        // Float-to-int `as` saturates, so huge values clamp to usize::MAX.
        ConcurrencyLimit(v.floor() as usize)
    }
}

struct Job<T, E> {
    index: usize,
    run: Task<T, E>,
}

fn lock_queue<T, E>(queue: &Mutex<VecDeque<Job<T, E>>>) -> MutexGuard<'_, VecDeque<Job<T, E>>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render a panic payload the way an uncaught panic would print it.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(_) => "Unknown error".to_string(),
    }
}

fn settle<T, E>(run: Task<T, E>) -> Outcome<T, E> {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(value)) => Outcome::Fulfilled { value },
        Ok(Err(err)) => Outcome::Rejected {
            reason: TaskFailure::Failed(err),
        },
        Err(payload) => Outcome::Rejected {
            reason: TaskFailure::Panicked(panic_message(payload)),
        },
    }
}

/// Run `tasks` with at most `limit` executing at once and collect every outcome.
///
/// Workers pull the next unstarted task as soon as their previous one settles
/// (sliding window, not batches). Outcomes are returned in submission order.
/// A task's error or panic is recorded as [`Outcome::Rejected`] and never stops
/// the other tasks; `Err` is reserved for executor infrastructure failures.
pub fn run_bounded<T, E>(
    limit: impl Into<ConcurrencyLimit>,
    tasks: Vec<Task<T, E>>,
) -> Result<Vec<Outcome<T, E>>, ExecutorError>
where
    T: Send + 'static,
    E: Send + 'static,
{
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let limit = limit.into();
    let expected_count = tasks.len();
    let worker_count = limit.clamp_to(expected_count);
    let queue: VecDeque<Job<T, E>> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, run)| Job { index, run })
        .collect();

    let queue = Arc::new(Mutex::new(queue));
    let (tx, rx) = mpsc::channel::<(usize, Outcome<T, E>)>();

    let mut handles = Vec::with_capacity(worker_count);
    for worker in 0..worker_count {
        let queue = Arc::clone(&queue);
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("bounded-worker-{worker}"))
            .spawn(move || loop {
                let job = lock_queue(&queue).pop_front();
                let Some(job) = job else {
                    break;
                };
                debug!(task = job.index, worker, "task started");
                let outcome = settle(job.run);
                debug!(
                    task = job.index,
                    worker,
                    fulfilled = outcome.is_fulfilled(),
                    "task settled"
                );
                if tx.send((job.index, outcome)).is_err() {
                    break;
                }
            });
        match spawned {
            Ok(handle) => handles.push(handle),
            // The remaining workers drain the queue, just with less parallelism.
            Err(source) if !handles.is_empty() => {
                warn!(worker, error = %source, "bounded executor running with fewer workers");
                break;
            }
            Err(source) => return Err(ExecutorError::Spawn { worker, source }),
        }
    }
    drop(tx);

    let mut slots: Vec<Option<Outcome<T, E>>> = (0..expected_count).map(|_| None).collect();
    for (index, outcome) in rx {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(outcome);
        }
    }

    for h in handles {
        if h.join().is_err() {
            return Err(ExecutorError::WorkerLost);
        }
    }

    let out: Vec<Outcome<T, E>> = slots.into_iter().flatten().collect();
    if out.len() != expected_count {
        return Err(ExecutorError::OutcomeCount {
            expected: expected_count,
            got: out.len(),
        });
    }

    let rejected = out.iter().filter(|o| o.is_rejected()).count();
    info!(
        tasks = expected_count,
        limit = worker_count,
        fulfilled = expected_count - rejected,
        rejected,
        "bounded run settled"
    );
    Ok(out)
}
