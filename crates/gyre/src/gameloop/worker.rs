//! The worker thread behind a game loop.
//!
//! One thread per loop, living from spawn until shutdown completes. The
//! queue lock is held only while picking work; task bodies and entity
//! ticks run with it released.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, error};

use super::context;
use super::game_loop::{LoopInner, WorkItem};
use crate::gameloop::LoopContext;
use crate::types::{LoopState, panic_message};

enum Step {
    Run(WorkItem),
    Tick,
    Exit,
}

pub(crate) fn run(inner: Arc<LoopInner>, term_tx: watch::Sender<bool>) {
    context::install(Box::new(LoopContext::new(inner.id, Arc::clone(&inner.name))));
    debug!(game_loop = %inner.name, "worker started");

    loop {
        match next_step(&inner) {
            Step::Run(item) => execute(&inner, item),
            Step::Tick => tick_pass(&inner),
            Step::Exit => break,
        }
    }

    // Entities are dropped here, on the thread that owned them.
    context::teardown();
    inner
        .state
        .store(LoopState::Terminated as u8, Ordering::SeqCst);
    let _ = term_tx.send(true);
    debug!(game_loop = %inner.name, "worker stopped");
}

/// Pick the next unit of work, parking until one is available.
///
/// A due tick competes with the queue front by time: the tick runs first
/// unless a task was enqueued before the tick's deadline.
fn next_step(inner: &LoopInner) -> Step {
    let mut queue = inner.queue.lock();
    loop {
        if queue.stop_now {
            queue.items.clear();
            return Step::Exit;
        }
        let shutting_down =
            LoopState::from_u8(inner.state.load(Ordering::SeqCst)).is_shutdown();

        if !shutting_down {
            let now = Instant::now();
            let due = queue
                .tick
                .as_ref()
                .map(|t| t.next_deadline)
                .filter(|deadline| *deadline <= now);
            if let Some(deadline) = due {
                let tick_first = match queue.items.front() {
                    Some(item) => item.enqueued_at() > deadline,
                    None => true,
                };
                if tick_first {
                    if let Some(tick) = queue.tick.as_mut() {
                        tick.next_deadline += tick.period;
                    }
                    return Step::Tick;
                }
            }
        }

        if let Some(item) = queue.items.pop_front() {
            return Step::Run(item);
        }
        if shutting_down {
            return Step::Exit;
        }

        match queue.tick.as_ref().map(|t| t.next_deadline) {
            Some(deadline) => {
                // Timeout or signal, the loop above re-derives what is due.
                let _ = inner.wakeup.wait_until(&mut queue, deadline);
            }
            None => inner.wakeup.wait(&mut queue),
        }
    }
}

fn execute(inner: &Arc<LoopInner>, item: WorkItem) {
    match item {
        WorkItem::Task { job, .. } => {
            let mut ctx =
                context::checkout(inner.id).expect("context at rest between tasks");
            job(&mut ctx);
            context::checkin(ctx);
        }
        WorkItem::TickNow { done, .. } => {
            tick_pass(inner);
            let _ = done.send(());
        }
    }
}

/// One tick over a snapshot of the owned entities.
///
/// Each entity is checked out of the registry while its tick runs, so
/// handler code submitting inline may mutate the entity set (including
/// removing the ticked entity itself) without corrupting the iteration.
/// A panicking entity is logged and isolated; the pass continues.
fn tick_pass(inner: &Arc<LoopInner>) {
    let elapse = {
        let mut queue = inner.queue.lock();
        let now = Instant::now();
        let elapse = now - queue.last_tick.unwrap_or(now);
        queue.last_tick = Some(now);
        queue.last_elapse = Some(elapse);
        elapse
    };

    let ids = with_context(inner, |ctx| ctx.entities().ids());
    for id in ids {
        let checked_out = with_context(inner, |ctx| ctx.entities_mut().checkout(&id));
        let Some(mut entity) = checked_out else {
            // Unregistered since the snapshot.
            continue;
        };

        let result = catch_unwind(AssertUnwindSafe(|| entity.tick(elapse)));
        if let Err(payload) = result {
            error!(
                game_loop = %inner.name,
                entity = %id,
                reason = panic_message(payload.as_ref()),
                "entity tick panicked; continuing tick pass"
            );
        }

        with_context(inner, |ctx| ctx.entities_mut().checkin(entity));
    }
}

fn with_context<R>(inner: &LoopInner, f: impl FnOnce(&mut LoopContext) -> R) -> R {
    let mut ctx = context::checkout(inner.id).expect("context at rest during tick pass");
    let result = f(&mut ctx);
    context::checkin(ctx);
    result
}
