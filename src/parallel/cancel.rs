//! Cancellation and first-failure coordination for one parallel loop.
//!
//! A [`CancellationToken`] is the caller-facing "interrupt" switch: the thread
//! that invokes a loop (or anyone holding a clone) flips it, and workers notice
//! at their next periodic check. An [`AbortSignal`] is created fresh for every
//! invocation and shared only with that invocation's workers; it moves one way
//! from running to either cancelled or failed, and the first transition wins.
//!
//! While a worker runs, the stop token of its invocation is recorded for the
//! worker's thread. A loop started from inside a loop body links to it, so
//! stopping an outer loop also stops every loop nested in it.

use std::cell::RefCell;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Error marking a loop that stopped because it was interrupted.
///
/// Callers tell a user-requested stop apart from a failure with
/// [`is_cancellation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parallel loop cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// True when `err` reports a cancellation rather than a failure
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.is::<Cancelled>()
}

/// Cloneable interrupt flag shared between a caller and the loops it starts
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    parents: Vec<CancellationToken>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that also reads as cancelled once `self` is cancelled.
    /// Cancelling the child does not touch the parent.
    pub fn child(&self) -> Self {
        Self::linked([self.clone()])
    }

    pub(crate) fn linked(parents: impl IntoIterator<Item = CancellationToken>) -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                parents: parents.into_iter().collect(),
            }),
        }
    }

    /// Request cancellation of every loop watching this token
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire) || self.state.parents.iter().any(CancellationToken::is_cancelled)
    }
}

thread_local! {
    /// Stop token of the invocation whose worker is running on this thread
    static ENCLOSING: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

/// Stop token of the loop this thread is currently working for, if any
pub(crate) fn enclosing_stop() -> Option<CancellationToken> {
    ENCLOSING.with(|current| current.borrow().clone())
}

/// Records a stop token for the current thread until dropped, then restores
/// the previous one (inline nested runs stack on the same thread)
pub(crate) struct EnclosingScope {
    previous: Option<CancellationToken>,
}

impl EnclosingScope {
    pub(crate) fn enter(stop: CancellationToken) -> Self {
        let previous = ENCLOSING.with(|current| current.replace(Some(stop)));
        Self { previous }
    }
}

impl Drop for EnclosingScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ENCLOSING.with(|current| *current.borrow_mut() = previous);
    }
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const FAILED: u8 = 2;

/// Terminal state of an [`AbortSignal`] once all workers have joined
#[derive(Debug)]
pub enum AbortState {
    Running,
    Cancelled,
    Failed(anyhow::Error),
}

/// Per-invocation abort flag plus the "first error" cell.
///
/// Its stop token is cancelled on the first transition and also follows the
/// tokens it was linked to, so workers polling [`stop_requested`](Self::stop_requested)
/// see both their own run stopping and any enclosing run stopping.
pub struct AbortSignal {
    state: AtomicU8,
    first_error: OnceLock<anyhow::Error>,
    stop: CancellationToken,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::linked([])
    }

    /// A signal whose stop token also follows `parents`
    pub fn linked(parents: impl IntoIterator<Item = CancellationToken>) -> Self {
        Self {
            state: AtomicU8::new(RUNNING),
            first_error: OnceLock::new(),
            stop: CancellationToken::linked(parents),
        }
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Whether this run or anything it is linked to has been asked to stop
    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Whether any participant has left the running state
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    /// Move to cancelled; returns false if another transition already won
    pub fn cancel(&self) -> bool {
        let won = self.transition(CANCELLED);
        if won {
            tracing::info!("Aborting parallel loop: cancellation requested");
        }
        won
    }

    /// Move to failed with `err` as the cause; only the first failure is kept
    pub fn fail(&self, err: anyhow::Error) -> bool {
        if self.transition(FAILED) {
            tracing::info!("Aborting parallel loop: {err:#}");
            // Only the transition winner reaches this point, so the cell is empty.
            let _ = self.first_error.set(err);
            true
        } else {
            tracing::warn!("Additional failure after abort, only the first will be reported: {err:#}");
            false
        }
    }

    fn transition(&self, to: u8) -> bool {
        let won = self
            .state
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.stop.cancel();
        }
        won
    }

    /// Consume the signal after every worker has joined
    pub fn into_state(self) -> AbortState {
        match self.state.into_inner() {
            RUNNING => AbortState::Running,
            CANCELLED => AbortState::Cancelled,
            _ => AbortState::Failed(
                self.first_error
                    .into_inner()
                    .unwrap_or_else(|| anyhow::anyhow!("parallel loop failed without a recorded cause")),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_signal_stop_token_follows_links_and_transitions() {
        let interrupt = CancellationToken::new();
        let signal = AbortSignal::linked([interrupt.clone()]);
        assert!(!signal.stop_requested());

        interrupt.cancel();
        assert!(signal.stop_requested());
        // Linked tokens request a stop; they do not decide the outcome
        assert!(!signal.is_aborted());

        let signal = AbortSignal::new();
        assert!(signal.fail(anyhow::anyhow!("bad tile")));
        assert!(signal.stop_token().is_cancelled());
    }

    #[test]
    fn test_enclosing_scope_stacks_and_restores() {
        assert!(enclosing_stop().is_none());
        let outer = CancellationToken::new();
        {
            let _outer_scope = EnclosingScope::enter(outer.clone());
            let inner = CancellationToken::new();
            {
                let _inner_scope = EnclosingScope::enter(inner.clone());
                inner.cancel();
                assert!(enclosing_stop().is_some_and(|stop| stop.is_cancelled()));
            }
            assert!(enclosing_stop().is_some_and(|stop| !stop.is_cancelled()));
        }
        assert!(enclosing_stop().is_none());
    }

    #[test]
    fn test_first_failure_wins() {
        let signal = AbortSignal::new();
        assert!(signal.fail(anyhow::anyhow!("first")));
        assert!(!signal.fail(anyhow::anyhow!("second")));
        assert!(!signal.cancel());
        assert!(signal.is_aborted());

        match signal.into_state() {
            AbortState::Failed(err) => assert_eq!(err.to_string(), "first"),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_cancel_blocks_later_failure() {
        let signal = AbortSignal::new();
        assert!(signal.cancel());
        assert!(!signal.fail(anyhow::anyhow!("late")));
        assert!(matches!(signal.into_state(), AbortState::Cancelled));
    }

    #[test]
    fn test_concurrent_failures_record_exactly_one() {
        let signal = Arc::new(AbortSignal::new());
        let winners: usize = (0..8)
            .map(|i| {
                let signal = signal.clone();
                thread::spawn(move || signal.fail(anyhow::anyhow!("worker {i}")))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
        let signal = Arc::try_unwrap(signal).ok().unwrap();
        assert!(matches!(signal.into_state(), AbortState::Failed(_)));
    }

    #[test]
    fn test_cancellation_is_detectable() {
        let err: anyhow::Error = Cancelled.into();
        assert!(is_cancellation(&err));
        assert!(!is_cancellation(&anyhow::anyhow!("boom")));
        assert_eq!(err.to_string(), "parallel loop cancelled");
    }
}
