//! Worker-side execution context and the thread-local slot carrying it.
//!
//! Each worker thread parks its context in a thread-local slot. Running a
//! task checks the context out for the duration of the task body; entity
//! ticks run with the context checked back in, which is what lets handler
//! code submit to its own loop inline without aliasing.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use crate::ecs::{Entity, EntityRegistry};
use crate::types::LoopId;

/// State owned by a loop's worker thread, lent to each submitted task.
///
/// The context is the loop's own entity (hosting the [`EntityRegistry`]
/// and any further components callers attach) plus the loop's identity.
pub struct LoopContext {
    loop_id: LoopId,
    name: Arc<str>,
    entity: Entity,
}

impl LoopContext {
    pub(crate) fn new(loop_id: LoopId, name: Arc<str>) -> Self {
        let mut entity = Entity::new(name.as_ref());
        entity.add_component(EntityRegistry::new());
        Self {
            loop_id,
            name,
            entity,
        }
    }

    pub fn loop_id(&self) -> LoopId {
        self.loop_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The loop's own entity; host loop-wide components here.
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    /// The registry of entities owned by this loop.
    pub fn entities(&self) -> &EntityRegistry {
        self.entity
            .get_component::<EntityRegistry>()
            .expect("entity registry installed at construction")
    }

    pub fn entities_mut(&mut self) -> &mut EntityRegistry {
        self.entity
            .get_component_mut::<EntityRegistry>()
            .expect("entity registry installed at construction")
    }
}

thread_local! {
    static ACTIVE_LOOP: Cell<Option<LoopId>> = const { Cell::new(None) };
    static CONTEXT_SLOT: RefCell<Option<Box<LoopContext>>> = const { RefCell::new(None) };
}

/// The loop bound to the calling thread, if any.
pub(crate) fn current_loop() -> Option<LoopId> {
    ACTIVE_LOOP.with(Cell::get)
}

/// Bind the calling thread as a worker: publish its identity and park the
/// context. Called once at worker startup.
pub(crate) fn install(ctx: Box<LoopContext>) {
    ACTIVE_LOOP.with(|active| active.set(Some(ctx.loop_id())));
    CONTEXT_SLOT.with(|slot| *slot.borrow_mut() = Some(ctx));
}

/// Drop the context on the worker thread (entities are released where
/// they were owned) and clear the binding. Called once at worker exit.
pub(crate) fn teardown() {
    CONTEXT_SLOT.with(|slot| slot.borrow_mut().take());
    ACTIVE_LOOP.with(|active| active.set(None));
}

/// Take the context out of the slot, if this thread is `id`'s worker and
/// no task body currently holds it.
pub(crate) fn checkout(id: LoopId) -> Option<Box<LoopContext>> {
    if current_loop() != Some(id) {
        return None;
    }
    CONTEXT_SLOT.with(|slot| slot.borrow_mut().take())
}

pub(crate) fn checkin(ctx: Box<LoopContext>) {
    CONTEXT_SLOT.with(|slot| *slot.borrow_mut() = Some(ctx));
}
