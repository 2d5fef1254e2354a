//! Per-entity event dispatch
//!
//! Each entity owns one bus. Component types declare their handlers
//! explicitly (one declaration list per type, resolved once at
//! registration); the bus keeps an event-type-keyed dispatch table whose
//! entries fire synchronously, in component-registration order, on
//! whichever thread posts the event. The bus itself never crosses threads.

mod handler;

pub use handler::{Event, Handler, Subscriber};

pub(crate) use handler::Binding;

use std::any::TypeId;
use std::collections::HashMap;

use tracing::debug;

use crate::ecs::Component;

/// Override-aware handler registry for one entity.
pub struct EventBus {
    owner: String,
    /// Event type -> bindings in component-registration order.
    bindings: HashMap<TypeId, Vec<Binding>>,
    /// Component type -> the (event, slot) keys it has active.
    registered: HashMap<TypeId, Vec<(TypeId, &'static str)>>,
}

impl EventBus {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            bindings: HashMap::new(),
            registered: HashMap::new(),
        }
    }

    /// Register the handler slots declared by component type `C`.
    ///
    /// The declaration list is deduplicated on (event type, slot name),
    /// keeping the last declaration, before slots are bound. Returns the
    /// number of newly added slots; a second registration of the same
    /// component type adds nothing and returns 0.
    pub fn register<C: Subscriber + 'static>(&mut self) -> usize {
        let component = TypeId::of::<C>();
        if self.registered.contains_key(&component) {
            return 0;
        }

        let mut resolved: Vec<Handler<C>> = Vec::new();
        for handler in C::handlers() {
            match resolved
                .iter_mut()
                .find(|h| h.event == handler.event && h.slot == handler.slot)
            {
                Some(existing) => *existing = handler,
                None => resolved.push(handler),
            }
        }

        let slots = self.registered.entry(component).or_default();
        for handler in &resolved {
            slots.push((handler.event, handler.slot));
            self.bindings
                .entry(handler.event)
                .or_default()
                .push(Binding::bind(handler));
        }

        let added = resolved.len();
        debug!(
            entity = %self.owner,
            component = std::any::type_name::<C>(),
            added,
            "registered event handlers"
        );
        added
    }

    /// Remove every active slot of component type `C`; returns the count.
    pub fn unregister<C: Component + 'static>(&mut self) -> usize {
        let component = TypeId::of::<C>();
        let Some(slots) = self.registered.remove(&component) else {
            return 0;
        };
        for (event, _) in &slots {
            if let Some(list) = self.bindings.get_mut(event) {
                list.retain(|b| b.component_type() != component);
                if list.is_empty() {
                    self.bindings.remove(event);
                }
            }
        }
        debug!(
            entity = %self.owner,
            component = std::any::type_name::<C>(),
            removed = slots.len(),
            "unregistered event handlers"
        );
        slots.len()
    }

    /// Total number of active handler slots.
    pub fn slot_count(&self) -> usize {
        self.registered.values().map(Vec::len).sum()
    }

    /// Snapshot of the bindings for one event type, in delivery order.
    pub(crate) fn bindings_for(&self, event: TypeId) -> Vec<Binding> {
        self.bindings.get(&event).cloned().unwrap_or_default()
    }
}
