//! The single-thread-affine executor handle.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use super::context;
use super::task::{self, Job, PendingTask, TaskHandle};
use super::worker;
use crate::gameloop::LoopContext;
use crate::types::{Error, LoopId, LoopState, Result};

pub(crate) enum WorkItem {
    Task {
        job: Job,
        enqueued_at: Instant,
    },
    TickNow {
        done: oneshot::Sender<()>,
        enqueued_at: Instant,
    },
}

impl WorkItem {
    pub(crate) fn enqueued_at(&self) -> Instant {
        match self {
            WorkItem::Task { enqueued_at, .. } | WorkItem::TickNow { enqueued_at, .. } => {
                *enqueued_at
            }
        }
    }
}

pub(crate) struct TickSchedule {
    pub(crate) period: Duration,
    pub(crate) next_deadline: Instant,
}

pub(crate) struct Queue {
    pub(crate) items: VecDeque<WorkItem>,
    pub(crate) tick: Option<TickSchedule>,
    pub(crate) last_tick: Option<Instant>,
    pub(crate) last_elapse: Option<Duration>,
    pub(crate) stop_now: bool,
}

pub(crate) struct LoopInner {
    pub(crate) id: LoopId,
    pub(crate) name: Arc<str>,
    pub(crate) state: AtomicU8,
    pub(crate) queue: Mutex<Queue>,
    pub(crate) wakeup: Condvar,
    term_rx: watch::Receiver<bool>,
}

/// Handle to a single-thread-affine executor.
///
/// Cloneable and cheap; every clone addresses the same worker thread. The
/// worker owns the loop's entities, and `submit` is the only way to reach
/// them from another thread.
#[derive(Clone)]
pub struct GameLoop {
    inner: Arc<LoopInner>,
}

impl GameLoop {
    /// Spawn a loop whose dedicated worker thread is named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let id = LoopId::next();
        let (term_tx, term_rx) = watch::channel(false);
        let inner = Arc::new(LoopInner {
            id,
            name: Arc::clone(&name),
            state: AtomicU8::new(LoopState::Running as u8),
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                tick: None,
                last_tick: None,
                last_elapse: None,
                stop_now: false,
            }),
            wakeup: Condvar::new(),
            term_rx,
        });

        let worker_inner = Arc::clone(&inner);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker::run(worker_inner, term_tx))
            .expect("failed to spawn game loop worker thread");

        debug!(game_loop = %name, id = %id, "game loop spawned");
        Self { inner }
    }

    pub fn id(&self) -> LoopId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// True iff the calling thread is this loop's worker thread. The
    /// binding is observable only while the worker is executing work.
    pub fn in_game_loop(&self) -> bool {
        context::current_loop() == Some(self.inner.id)
    }

    /// Start periodic ticking on the worker thread.
    ///
    /// Idempotent guard: if ticking is already active the call returns
    /// false and leaves the running cadence untouched. Each tick receives
    /// the elapsed time since the previous one (or since this call, for
    /// the first tick).
    pub fn run(&self, initial_delay: Duration, period: Duration) -> bool {
        assert!(!period.is_zero(), "tick period must be non-zero");
        let mut queue = self.inner.queue.lock();
        if queue.tick.is_some() || self.state().is_shutdown() {
            return false;
        }
        let now = Instant::now();
        queue.last_tick = Some(now);
        queue.tick = Some(TickSchedule {
            period,
            next_deadline: now + initial_delay,
        });
        drop(queue);
        self.inner.wakeup.notify_all();
        info!(game_loop = %self.inner.name, ?initial_delay, ?period, "periodic ticking started");
        true
    }

    /// The active tick cadence, if `run` has been accepted.
    pub fn tick_period(&self) -> Option<Duration> {
        self.inner.queue.lock().tick.as_ref().map(|t| t.period)
    }

    /// The elapse handed to the most recent tick pass.
    pub fn last_tick_elapse(&self) -> Option<Duration> {
        self.inner.queue.lock().last_elapse
    }

    /// Run `f` on this loop's worker thread and observe its result.
    ///
    /// Called from the worker itself while the context is at rest (entity
    /// ticks, event handlers), `f` executes synchronously in place and the
    /// returned handle is already resolved: no thread hop, no chance of
    /// self-deadlock. Called from a task body (which holds the context),
    /// the submission falls back to the queue; do not block on the handle
    /// from inside that task. Queued submissions run in FIFO order among
    /// themselves and relative to the periodic tick.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce(&mut LoopContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.in_game_loop() {
            if let Some(mut ctx) = context::checkout(self.inner.id) {
                let result = task::run_inline(f, &mut ctx, &self.inner.name);
                context::checkin(ctx);
                return Ok(TaskHandle::ready(result));
            }
        }
        let (job, handle) = task::package(f, Arc::clone(&self.inner.name));
        self.enqueue(WorkItem::Task {
            job,
            enqueued_at: Instant::now(),
        })?;
        Ok(handle)
    }

    /// Fire-and-forget submission.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut LoopContext) + Send + 'static,
    {
        self.submit(f).map(drop)
    }

    /// Queue one tick pass outside the periodic cadence, with a real
    /// computed elapse. This is the manual tick driver; deterministic
    /// tests use it instead of wall-clock cadences.
    pub fn trigger_tick(&self) -> Result<TaskHandle<()>> {
        let (done, rx) = oneshot::channel();
        self.enqueue(WorkItem::TickNow {
            done,
            enqueued_at: Instant::now(),
        })?;
        Ok(TaskHandle::pending(rx))
    }

    /// Re-queue a task reclaimed by [`GameLoop::shutdown_now`]; the
    /// original submitter's handle resolves when it runs here.
    pub fn submit_pending(&self, task: PendingTask) -> Result<()> {
        self.enqueue(WorkItem::Task {
            job: task.job,
            enqueued_at: Instant::now(),
        })
    }

    fn enqueue(&self, item: WorkItem) -> Result<()> {
        let mut queue = self.inner.queue.lock();
        if self.state().is_shutdown() {
            return Err(Error::Rejected(self.inner.name.to_string()));
        }
        queue.items.push_back(item);
        drop(queue);
        self.inner.wakeup.notify_all();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Stop accepting new work. Queued and in-flight work finishes, the
    /// periodic tick stops, then the worker exits.
    pub fn shutdown(&self) {
        let queue = self.inner.queue.lock();
        let transitioned = self
            .inner
            .state
            .compare_exchange(
                LoopState::Running as u8,
                LoopState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        drop(queue);
        if transitioned {
            info!(game_loop = %self.inner.name, "shutdown initiated");
            self.inner.wakeup.notify_all();
        }
    }

    /// Stop immediately. Never-started queued tasks are returned to the
    /// caller; the in-flight task (if any) finishes, then the worker exits
    /// without draining anything further.
    pub fn shutdown_now(&self) -> Vec<PendingTask> {
        let mut queue = self.inner.queue.lock();
        let _ = self.inner.state.compare_exchange(
            LoopState::Running as u8,
            LoopState::ShuttingDown as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        queue.stop_now = true;
        let reclaimed: Vec<PendingTask> = queue
            .items
            .drain(..)
            .filter_map(|item| match item {
                WorkItem::Task { job, .. } => Some(PendingTask { job }),
                WorkItem::TickNow { .. } => None,
            })
            .collect();
        drop(queue);
        self.inner.wakeup.notify_all();
        info!(game_loop = %self.inner.name, reclaimed = reclaimed.len(), "immediate shutdown");
        reclaimed
    }

    pub fn is_shutdown(&self) -> bool {
        self.state().is_shutdown()
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Wait up to `timeout` for the worker to fully drain and exit.
    /// Returns true iff termination happened within the window.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        if self.is_terminated() {
            return true;
        }
        let mut term_rx = self.inner.term_rx.clone();
        // A closed channel means the worker is gone, which is termination
        // for every practical purpose.
        tokio::time::timeout(timeout, term_rx.wait_for(|done| *done))
            .await
            .is_ok()
    }
}

impl fmt::Debug for GameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLoop")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
