//! Parallel-for controller: the public entry point of the engine.
//!
//! One invocation creates a fresh cursor, abort signal and result aggregator,
//! submits N workers to a [`ThreadPool`], joins every one of them and returns
//! exactly one [`RunOutcome`]. Nothing created for a run outlives it.
//!
//! A loop started from inside another loop's body links its stop token to
//! the enclosing run, so cancelling or failing the outer loop also stops the
//! nested one at its next check.

use anyhow::anyhow;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::aggregator::ResultAggregator;
use super::cancel::{AbortSignal, AbortState, CancellationToken, Cancelled, enclosing_stop};
use super::cursor::{WorkCursor, range_len};
use super::pool::{TaskHandle, ThreadPool};
use super::progress::{CadenceSettings, ProgressBridge, ProgressReporter};
use super::worker::{LoopBody, RunContext, WorkerExit, run_worker};
use crate::config::ParForConfig;

/// Terminal result of one parallel loop
pub enum RunOutcome<R> {
    /// Every index was processed; the non-empty results, unordered
    Success(Vec<R>),
    /// The loop was interrupted; partial results are discarded
    Cancelled,
    /// A loop body failed; the first failure is the cause
    Failed(anyhow::Error),
}

impl<R> RunOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    pub fn results(&self) -> Option<&[R]> {
        match self {
            RunOutcome::Success(results) => Some(results),
            _ => None,
        }
    }

    /// Short name of the outcome for logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success(_) => "success",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed(_) => "failed",
        }
    }

    /// Convert into a `Result`; cancellation becomes a [`Cancelled`] error
    pub fn into_result(self) -> anyhow::Result<Vec<R>> {
        match self {
            RunOutcome::Success(results) => Ok(results),
            RunOutcome::Cancelled => Err(Cancelled.into()),
            RunOutcome::Failed(err) => Err(err),
        }
    }
}

impl<R> fmt::Debug for RunOutcome<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success(results) => write!(f, "Success({} results)", results.len()),
            RunOutcome::Cancelled => write!(f, "Cancelled"),
            RunOutcome::Failed(err) => write!(f, "Failed({err:#})"),
        }
    }
}

/// Builder for one parallel loop over the inclusive range `[lo, hi]`
pub struct ParFor<'p> {
    name: String,
    lo: i64,
    hi: i64,
    workers: Option<usize>,
    default_workers: usize,
    check_interval: usize,
    cadence: CadenceSettings,
    progress: Option<Arc<dyn ProgressReporter>>,
    interrupt: CancellationToken,
    pool: &'p ThreadPool,
}

impl ParFor<'static> {
    /// Loop over `[lo, hi]` on the shared pool with the global settings.
    ///
    /// Worker count, check interval and progress cadence come from
    /// [`ParForConfig::global`]. Unless [`ParForConfig::install_global`] ran
    /// first, the first call in the process loads it, reading
    /// `~/.config/parfor/config.toml`, then `parfor.toml`/`parfor.json`/`parfor.yaml`
    /// in the working directory, then `PARFOR_*` environment variables. The
    /// shared pool is sized from the same configuration. Use
    /// [`with_config`](ParFor::with_config) and [`with_pool`](ParFor::with_pool)
    /// to avoid depending on the environment.
    pub fn new(lo: i64, hi: i64) -> Self {
        let config = ParForConfig::global();
        Self {
            name: "parfor".to_string(),
            lo,
            hi,
            workers: None,
            default_workers: config.default_workers(),
            check_interval: config.run.check_interval,
            cadence: config.cadence(),
            progress: None,
            interrupt: CancellationToken::new(),
            pool: ThreadPool::global(),
        }
    }
}

impl<'p> ParFor<'p> {
    /// Name used in logs and worker spans
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Desired worker count, clamped to `[1, range length, pool capacity]`
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Iterations between interruption checks (K)
    pub fn check_interval(mut self, check_interval: usize) -> Self {
        self.check_interval = check_interval.max(1);
        self
    }

    pub fn cadence(mut self, cadence: CadenceSettings) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Token whose cancellation interrupts the loop
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    /// Apply run settings from a loaded configuration
    pub fn with_config(mut self, config: &ParForConfig) -> Self {
        self.default_workers = config.default_workers();
        self.check_interval = config.run.check_interval.max(1);
        self.cadence = config.cadence();
        self
    }

    /// Run on `pool` instead of the shared one
    pub fn with_pool<'q>(self, pool: &'q ThreadPool) -> ParFor<'q> {
        ParFor {
            name: self.name,
            lo: self.lo,
            hi: self.hi,
            workers: self.workers,
            default_workers: self.default_workers,
            check_interval: self.check_interval,
            cadence: self.cadence,
            progress: self.progress,
            interrupt: self.interrupt,
            pool,
        }
    }

    /// Workers this loop would use, before any nested-saturation limit
    pub fn worker_count(&self) -> usize {
        let len = range_len(self.lo, self.hi).unwrap_or(u64::MAX);
        self.worker_count_for(len)
    }

    fn worker_count_for(&self, len: u64) -> usize {
        let requested = self.workers.unwrap_or(self.default_workers);
        let by_len = usize::try_from(len).unwrap_or(usize::MAX);
        requested.min(by_len).min(self.pool.capacity()).max(1)
    }

    /// Run `body` for every index and block until all workers have joined
    pub fn run<R, F>(self, body: F) -> RunOutcome<R>
    where
        R: Send + 'static,
        F: Fn(i64, usize) -> anyhow::Result<Option<R>> + Send + Sync + 'static,
    {
        self.run_body(body)
    }

    /// [`run`](Self::run) for any [`LoopBody`] implementation
    pub fn run_body<R, B>(self, body: B) -> RunOutcome<R>
    where
        R: Send + 'static,
        B: LoopBody<R> + 'static,
    {
        self.spawn_body(body).wait()
    }

    /// Start the loop and return at once; see [`RunHandle`]
    pub fn spawn<R, F>(self, body: F) -> RunHandle<R, F>
    where
        R: Send + 'static,
        F: Fn(i64, usize) -> anyhow::Result<Option<R>> + Send + Sync + 'static,
    {
        self.spawn_body(body)
    }

    /// [`spawn`](Self::spawn) for any [`LoopBody`] implementation
    pub fn spawn_body<R, B>(self, body: B) -> RunHandle<R, B>
    where
        R: Send + 'static,
        B: LoopBody<R> + 'static,
    {
        let cursor = match WorkCursor::new(self.lo, self.hi) {
            Ok(cursor) => cursor,
            Err(err) => return RunHandle::ready(RunOutcome::Failed(err)),
        };
        if cursor.is_empty() {
            tracing::debug!("{}: empty range [{}, {}]", self.name, self.lo, self.hi);
            return RunHandle::ready(RunOutcome::Success(Vec::new()));
        }
        let signal = AbortSignal::linked(std::iter::once(self.interrupt.clone()).chain(enclosing_stop()));
        if signal.stop_requested() {
            tracing::debug!("{}: cancelled before start", self.name);
            return RunHandle::ready(RunOutcome::Cancelled);
        }

        let wanted = self.worker_count_for(cursor.len());
        let ctx = Arc::new(RunContext {
            name: self.name,
            progress: ProgressBridge::new(self.progress, self.lo, cursor.len()),
            cursor,
            body,
            aggregator: ResultAggregator::new(),
            signal,
            interrupt: self.interrupt.clone(),
            check_interval: self.check_interval,
            cadence: self.cadence,
        });
        ctx.progress.start();
        let started = Instant::now();

        let tasks = if self.pool.is_worker_thread() {
            let mut reservation = self.pool.try_reserve(wanted);
            let slots = reservation.slots();
            if slots == 0 {
                tracing::debug!(
                    "{}: pool saturated, running [{}, {}] inline",
                    ctx.name,
                    self.lo,
                    self.hi
                );
                run_worker(&ctx, 0);
                Vec::new()
            } else {
                tracing::debug!(
                    "{}: nested loop over [{}, {}] with {slots} reserved workers",
                    ctx.name,
                    self.lo,
                    self.hi
                );
                (0..slots)
                    .filter_map(|worker_id| reservation.submit(worker_task(&ctx, worker_id)))
                    .collect()
            }
        } else {
            tracing::debug!(
                "{}: loop over [{}, {}] with {wanted} workers",
                ctx.name,
                self.lo,
                self.hi
            );
            (0..wanted)
                .map(|worker_id| self.pool.submit(worker_task(&ctx, worker_id)))
                .collect()
        };

        RunHandle {
            state: Some(HandleState::Running {
                ctx,
                tasks,
                interrupt: self.interrupt,
                started,
            }),
        }
    }
}

fn worker_task<R, B>(
    ctx: &Arc<RunContext<R, B>>,
    worker_id: usize,
) -> impl FnOnce() -> anyhow::Result<WorkerExit> + Send + 'static
where
    R: Send + 'static,
    B: LoopBody<R> + 'static,
{
    let ctx = ctx.clone();
    move || Ok(run_worker(&ctx, worker_id))
}

/// Run `body` over `[lo, hi]` on `pool` with at most `desired_workers` workers.
///
/// Cancelling `interrupt` ends the run with [`RunOutcome::Cancelled`]. Without
/// a token the run still stops when an enclosing loop does.
pub fn run<R, B>(
    lo: i64,
    hi: i64,
    body: B,
    pool: &ThreadPool,
    progress: Option<Arc<dyn ProgressReporter>>,
    desired_workers: usize,
    interrupt: Option<CancellationToken>,
) -> RunOutcome<R>
where
    R: Send + 'static,
    B: LoopBody<R> + 'static,
{
    let mut parfor = ParFor::new(lo, hi).with_pool(pool).workers(desired_workers);
    parfor.progress = progress;
    if let Some(token) = interrupt {
        parfor = parfor.cancellation(token);
    }
    parfor.run_body(body)
}

enum HandleState<R, B> {
    Ready(RunOutcome<R>),
    Running {
        ctx: Arc<RunContext<R, B>>,
        tasks: Vec<TaskHandle<WorkerExit>>,
        interrupt: CancellationToken,
        started: Instant,
    },
}

/// A loop started with [`ParFor::spawn`].
///
/// Dropping the handle without calling [`wait`](Self::wait) interrupts the
/// loop and joins its workers.
pub struct RunHandle<R, B> {
    state: Option<HandleState<R, B>>,
}

impl<R, B> RunHandle<R, B> {
    fn ready(outcome: RunOutcome<R>) -> Self {
        Self {
            state: Some(HandleState::Ready(outcome)),
        }
    }

    /// Abort the loop; workers stop at their next claim
    pub fn interrupt(&self) {
        if let Some(HandleState::Running { ctx, .. }) = &self.state {
            ctx.signal.cancel();
        }
    }

    /// Whether every worker has already returned
    pub fn is_finished(&self) -> bool {
        match &self.state {
            Some(HandleState::Running { tasks, .. }) => tasks.iter().all(TaskHandle::is_finished),
            _ => true,
        }
    }

    /// Join every worker and return the outcome
    pub fn wait(mut self) -> RunOutcome<R> {
        match self.state.take() {
            Some(state) => finish(state),
            None => RunOutcome::Failed(anyhow!("run handle already consumed")),
        }
    }
}

impl<R, B> Drop for RunHandle<R, B> {
    fn drop(&mut self) {
        if let Some(HandleState::Running { ctx, tasks, .. }) = self.state.take() {
            ctx.signal.cancel();
            for task in tasks {
                let _ = task.join();
            }
            tracing::debug!("{}: run handle dropped, loop interrupted", ctx.name);
        }
    }
}

fn finish<R, B>(state: HandleState<R, B>) -> RunOutcome<R> {
    let (ctx, tasks, interrupt, started) = match state {
        HandleState::Ready(outcome) => return outcome,
        HandleState::Running {
            ctx,
            tasks,
            interrupt,
            started,
        } => (ctx, tasks, interrupt, started),
    };

    for task in tasks {
        if let Err(err) = task.join() {
            ctx.signal
                .fail(err.context(format!("{}: worker task failed", ctx.name)));
        }
    }
    if interrupt.is_cancelled() || ctx.signal.stop_requested() {
        ctx.signal.cancel();
    }

    let Ok(ctx) = Arc::try_unwrap(ctx) else {
        return RunOutcome::Failed(anyhow!("parallel loop state still shared after all workers joined"));
    };
    let outcome = match ctx.signal.into_state() {
        AbortState::Running => {
            ctx.progress.complete();
            RunOutcome::Success(ctx.aggregator.drain())
        }
        AbortState::Cancelled => RunOutcome::Cancelled,
        AbortState::Failed(err) => RunOutcome::Failed(err),
    };
    tracing::debug!(
        "{}: finished with {} after {:?}",
        ctx.name,
        outcome.label(),
        started.elapsed()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::progress::AtomicProgress;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_run_collects_results() {
        let pool = ThreadPool::new(4).unwrap();
        let outcome = ParFor::new(0, 99)
            .with_pool(&pool)
            .workers(4)
            .run(|i, _| Ok(Some(i * 3)));

        let mut results = outcome.into_result().unwrap();
        results.sort();
        assert_eq!(results, (0..100).map(|i| i * 3).collect::<Vec<_>>());
    }

    #[test]
    fn test_worker_count_clamping() {
        let pool = ThreadPool::new(3).unwrap();
        assert_eq!(ParFor::new(0, 99).with_pool(&pool).workers(0).worker_count(), 1);
        assert_eq!(ParFor::new(0, 1).with_pool(&pool).workers(8).worker_count(), 2);
        assert_eq!(ParFor::new(0, 99).with_pool(&pool).workers(8).worker_count(), 3);
    }

    #[test]
    fn test_empty_range_succeeds_without_workers() {
        let pool = ThreadPool::new(1).unwrap();
        let outcome: RunOutcome<i64> = ParFor::new(5, 4).with_pool(&pool).run(|_, _| {
            panic!("body must not run for an empty range");
        });
        assert_eq!(outcome.results().map(<[i64]>::len), Some(0));
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_oversized_range_fails() {
        let outcome: RunOutcome<i64> = ParFor::new(i64::MIN, i64::MAX).run(|_, _| Ok(None));
        assert!(outcome.is_failed());
    }

    #[test]
    fn test_precancelled_token() {
        let token = CancellationToken::new();
        token.cancel();
        let outcome: RunOutcome<i64> = ParFor::new(0, 9).cancellation(token).run(|_, _| Ok(None));
        assert!(outcome.is_cancelled());
        assert!(crate::parallel::is_cancellation(&outcome.into_result().unwrap_err()));
    }

    #[test]
    fn test_progress_reaches_completion() {
        let pool = ThreadPool::new(2).unwrap();
        let progress = Arc::new(AtomicProgress::new());
        progress.set_indeterminate(true);

        let outcome = ParFor::new(0, 499)
            .with_pool(&pool)
            .workers(2)
            .check_interval(4)
            .progress(progress.clone())
            .run(|i, _| Ok(Some(i)));

        assert!(outcome.is_success());
        assert_eq!(progress.value(), 100);
        assert!(!progress.is_indeterminate());
    }

    #[test]
    fn test_spawn_and_interrupt() {
        let pool = ThreadPool::new(2).unwrap();
        let processed = Arc::new(AtomicUsize::new(0));
        let counter = processed.clone();

        let handle = ParFor::new(0, 1_000_000)
            .with_pool(&pool)
            .workers(2)
            .spawn(move |i, _| {
                counter.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(Duration::from_micros(50));
                Ok(Some(i))
            });
        while processed.load(Ordering::Relaxed) < 10 {
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.interrupt();

        let outcome = handle.wait();
        assert!(outcome.is_cancelled());
        assert!(processed.load(Ordering::Relaxed) < 100_000);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_dropped_handle_joins_workers() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = ParFor::new(0, 1_000_000)
            .with_pool(&pool)
            .workers(2)
            .spawn(|i, _| {
                std::thread::sleep(Duration::from_micros(20));
                Ok(Some(i))
            });
        drop(handle);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_outcome_debug_and_labels() {
        let success: RunOutcome<u8> = RunOutcome::Success(vec![1, 2]);
        assert_eq!(format!("{success:?}"), "Success(2 results)");
        assert_eq!(success.label(), "success");
        assert_eq!(RunOutcome::<u8>::Cancelled.label(), "cancelled");
        let failed: RunOutcome<u8> = RunOutcome::Failed(anyhow!("boom"));
        assert_eq!(failed.label(), "failed");
        assert!(failed.results().is_none());
    }
}
