//! Process-wide bounded thread pool.
//!
//! A fixed set of named threads pulls jobs from one FIFO queue. Submissions
//! beyond capacity wait in the queue; the pool never grows. Every job runs
//! under `catch_unwind`, so a panicking task is reported to whoever joins its
//! [`TaskHandle`] and the pool thread keeps serving.
//!
//! The pool also counts tasks in flight (queued or running). A caller that is
//! itself a pool thread can [`try_reserve`](ThreadPool::try_reserve) slots:
//! while in-flight tasks never exceed capacity, every reserved task is
//! guaranteed an idle thread, so waiting on it cannot deadlock the pool.

use anyhow::{Result, anyhow};
use crossbeam::channel::{self, Receiver, Sender};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread;

use crate::config::ParForConfig;

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

static GLOBAL_POOL: LazyLock<ThreadPool> = LazyLock::new(|| {
    let capacity = ParForConfig::global().pool_capacity();
    ThreadPool::new(capacity).unwrap_or_else(|err| {
        tracing::warn!("Could not start {capacity} pool threads ({err:#}), retrying with one");
        ThreadPool::new(1).unwrap_or_else(|err| panic!("cannot start the shared thread pool: {err:#}"))
    })
});

thread_local! {
    /// Id of the pool owning the current thread, if any
    static CURRENT_POOL: Cell<Option<usize>> = const { Cell::new(None) };
}

struct PoolState {
    id: usize,
    capacity: usize,
    in_flight: AtomicUsize,
}

/// Fixed-size pool of reusable worker threads
pub struct ThreadPool {
    state: Arc<PoolState>,
    sender: Sender<Job>,
}

impl ThreadPool {
    /// Start a pool with `capacity` threads (at least one)
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = channel::unbounded::<Job>();
        let state = Arc::new(PoolState {
            id,
            capacity,
            in_flight: AtomicUsize::new(0),
        });

        for n in 0..capacity {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("parfor-pool-{id}-{n}"))
                .spawn(move || {
                    CURRENT_POOL.with(|current| current.set(Some(id)));
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                })
                .map_err(|err| anyhow!("failed to spawn pool thread {n}: {err}"))?;
        }
        tracing::debug!("Started thread pool {id} with {capacity} threads");

        Ok(Self { state, sender })
    }

    /// The shared pool used by every loop that does not bring its own
    pub fn global() -> &'static ThreadPool {
        &GLOBAL_POOL
    }

    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Tasks queued or running right now
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Whether the calling thread belongs to this pool
    pub fn is_worker_thread(&self) -> bool {
        CURRENT_POOL.with(|current| current.get() == Some(self.state.id))
    }

    /// Queue `task`; excess submissions wait in FIFO order
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.state.in_flight.fetch_add(1, Ordering::AcqRel);
        self.dispatch(task)
    }

    /// Claim up to `wanted` slots that currently have an idle thread
    pub fn try_reserve(&self, wanted: usize) -> Reservation<'_> {
        let mut current = self.state.in_flight.load(Ordering::Acquire);
        loop {
            let granted = wanted.min(self.state.capacity.saturating_sub(current));
            if granted == 0 {
                return Reservation { pool: self, slots: 0 };
            }
            match self.state.in_flight.compare_exchange_weak(
                current,
                current + granted,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Reservation { pool: self, slots: granted },
                Err(actual) => current = actual,
            }
        }
    }

    fn dispatch<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        let state = self.state.clone();
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .unwrap_or_else(|payload| Err(anyhow!("pool task panicked: {}", panic_message(&*payload))));
            // Free the slot before the joiner can observe completion
            state.in_flight.fetch_sub(1, Ordering::AcqRel);
            let _ = result_tx.send(outcome);
        });

        if self.sender.send(job).is_err() {
            // The job (and its result sender) was dropped, so join reports it
            self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!("Thread pool {} is shut down, task dropped", self.state.id);
        }
        TaskHandle { result_rx }
    }
}

/// Slots claimed by [`ThreadPool::try_reserve`]; unused slots are released on drop
pub struct Reservation<'p> {
    pool: &'p ThreadPool,
    slots: usize,
}

impl Reservation<'_> {
    /// Slots still available to submit into
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Run `task` on a reserved slot, or `None` when the reservation is used up
    pub fn submit<T, F>(&mut self, task: F) -> Option<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if self.slots == 0 {
            return None;
        }
        self.slots -= 1;
        Some(self.pool.dispatch(task))
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.slots > 0 {
            self.pool.state.in_flight.fetch_sub(self.slots, Ordering::AcqRel);
        }
    }
}

/// Completion handle for one submitted task
pub struct TaskHandle<T> {
    result_rx: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes; its error (or panic) is returned here
    pub fn join(self) -> Result<T> {
        self.result_rx
            .recv()
            .map_err(|_| anyhow!("pool task was dropped before it ran"))?
    }

    /// Whether the task has already delivered its result
    pub fn is_finished(&self) -> bool {
        !self.result_rx.is_empty()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
