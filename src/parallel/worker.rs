use std::panic::{self, AssertUnwindSafe};

use super::aggregator::ResultAggregator;
use super::cancel::{AbortSignal, CancellationToken, EnclosingScope, is_cancellation};
use super::cursor::WorkCursor;
use super::pool::panic_message;
use super::progress::{CadenceSettings, ProgressBridge, ProgressCadence};

/// Per-index computation run by the workers of a parallel loop.
///
/// `worker_id` is stable for the lifetime of one worker (`0..N`), so bodies
/// can keep one scratch slot per worker instead of sharing mutable state.
/// Returning `Ok(None)` contributes nothing to the result set; an `Err` (or a
/// panic) stops the whole loop.
pub trait LoopBody<R>: Send + Sync {
    fn process(&self, index: i64, worker_id: usize) -> anyhow::Result<Option<R>>;
}

impl<R, F> LoopBody<R> for F
where
    F: Fn(i64, usize) -> anyhow::Result<Option<R>> + Send + Sync,
{
    #[inline]
    fn process(&self, index: i64, worker_id: usize) -> anyhow::Result<Option<R>> {
        self(index, worker_id)
    }
}

/// How a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The range was exhausted
    Done,
    /// The abort flag was seen, set, or an interruption was observed
    Aborted,
}

/// State of one invocation shared by all of its workers
pub(crate) struct RunContext<R, B> {
    pub name: String,
    pub cursor: WorkCursor,
    pub body: B,
    pub aggregator: ResultAggregator<R>,
    pub signal: AbortSignal,
    pub progress: ProgressBridge,
    pub interrupt: CancellationToken,
    pub check_interval: usize,
    pub cadence: CadenceSettings,
}

/// Claim indices and run the body until the range is exhausted, the abort
/// flag is set, or a stop is requested.
///
/// Loops started by the body on this thread link to this run's stop token
/// for as long as the worker runs.
pub(crate) fn run_worker<R, B>(ctx: &RunContext<R, B>, worker_id: usize) -> WorkerExit
where
    B: LoopBody<R>,
{
    let span = tracing::trace_span!("parfor_worker", name = %ctx.name, worker_id);
    let _enter = span.enter();
    let _scope = EnclosingScope::enter(ctx.signal.stop_token().clone());

    let check_interval = ctx.check_interval.max(1);
    let mut cadence = ProgressCadence::new(ctx.cadence);
    let mut since_check = 0usize;

    loop {
        let Some(index) = ctx.cursor.next() else {
            return WorkerExit::Done;
        };
        if ctx.signal.is_aborted() {
            tracing::trace!("Worker {worker_id} stopping, abort observed at index {index}");
            return WorkerExit::Aborted;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| ctx.body.process(index, worker_id))) {
            Ok(Ok(Some(result))) => ctx.aggregator.add(result),
            Ok(Ok(None)) => {}
            // A nested loop stopped by cancellation and the body passed it on
            Ok(Err(err)) if is_cancellation(&err) => {
                ctx.signal.cancel();
                return WorkerExit::Aborted;
            }
            Ok(Err(err)) => {
                ctx.signal
                    .fail(err.context(format!("{}: loop body failed at index {index}", ctx.name)));
                return WorkerExit::Aborted;
            }
            Err(payload) => {
                ctx.signal.fail(anyhow::anyhow!(
                    "{}: loop body panicked at index {index}: {}",
                    ctx.name,
                    panic_message(&*payload)
                ));
                return WorkerExit::Aborted;
            }
        }

        since_check += 1;
        if since_check == check_interval {
            since_check = 0;
            if ctx.progress.is_attached() && cadence.tick() {
                ctx.progress.report_index(index);
            }
            if ctx.interrupt.is_cancelled() || ctx.signal.stop_requested() {
                ctx.signal.cancel();
                return WorkerExit::Aborted;
            }
        }
    }
}
