//! Task plumbing: boxed jobs, completion handles, and the pending form
//! returned by `shutdown_now`.

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::error;

use crate::gameloop::LoopContext;
use crate::types::{Error, Result, panic_message};

/// A unit of work bound for a loop's worker thread.
pub(crate) type Job = Box<dyn FnOnce(&mut LoopContext) + Send>;

/// Wrap `f` into a queueable job and the handle that observes it.
///
/// A panic inside `f` is contained to the job: it is logged, the result
/// sender is dropped, and the handle resolves to [`Error::Aborted`].
pub(crate) fn package<F, R>(f: F, loop_name: Arc<str>) -> (Job, TaskHandle<R>)
where
    F: FnOnce(&mut LoopContext) -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job: Job = Box::new(move |ctx| {
        match catch_unwind(AssertUnwindSafe(|| f(ctx))) {
            Ok(value) => {
                // Nobody listening is fine: the submitter dropped the handle.
                let _ = tx.send(value);
            }
            Err(payload) => {
                error!(
                    game_loop = %loop_name,
                    reason = panic_message(payload.as_ref()),
                    "task panicked"
                );
            }
        }
    });
    (job, TaskHandle::pending(rx))
}

/// Execute `f` synchronously for the same-thread submission shortcut.
pub(crate) fn run_inline<F, R>(f: F, ctx: &mut LoopContext, loop_name: &str) -> Result<R>
where
    F: FnOnce(&mut LoopContext) -> R,
{
    match catch_unwind(AssertUnwindSafe(|| f(ctx))) {
        Ok(value) => Ok(value),
        Err(payload) => {
            error!(
                game_loop = loop_name,
                reason = panic_message(payload.as_ref()),
                "inline task panicked"
            );
            Err(Error::Aborted)
        }
    }
}

/// Completion handle for a submitted task.
///
/// Resolves exactly once: `Ok` with the task's return value, or
/// [`Error::Aborted`] if the task was dropped before running or panicked.
/// Await it from async code, or [`TaskHandle::wait`] from a plain thread.
pub struct TaskHandle<R> {
    inner: HandleInner<R>,
}

enum HandleInner<R> {
    Ready(Option<Result<R>>),
    Pending(oneshot::Receiver<R>),
}

impl<R> TaskHandle<R> {
    pub(crate) fn ready(result: Result<R>) -> Self {
        Self {
            inner: HandleInner::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<R>) -> Self {
        Self {
            inner: HandleInner::Pending(rx),
        }
    }

    /// Block the calling thread until the task completes.
    ///
    /// Must not be called from an async context, nor from a task running
    /// on the loop the work was queued to (self-deadlock).
    pub fn wait(self) -> Result<R> {
        match self.inner {
            HandleInner::Ready(slot) => slot.expect("task handle already consumed"),
            HandleInner::Pending(rx) => rx.blocking_recv().map_err(|_| Error::Aborted),
        }
    }
}

impl<R> Unpin for TaskHandle<R> {}

impl<R> Future for TaskHandle<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            HandleInner::Ready(slot) => {
                Poll::Ready(slot.take().expect("task handle polled after completion"))
            }
            HandleInner::Pending(rx) => {
                Pin::new(rx).poll(cx).map(|r| r.map_err(|_| Error::Aborted))
            }
        }
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            HandleInner::Ready(_) => "ready",
            HandleInner::Pending(_) => "pending",
        };
        f.debug_struct("TaskHandle").field("state", &state).finish()
    }
}

/// A queued-but-never-started task reclaimed by `shutdown_now`.
///
/// The closure is opaque. Re-queueing it on another loop (via
/// [`GameLoop::submit_pending`](super::GameLoop::submit_pending)) runs it
/// there and resolves the original submitter's handle.
pub struct PendingTask {
    pub(crate) job: Job,
}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingTask")
    }
}
