//! Handler declarations and their type-erased bound form.

use std::any::{Any, TypeId};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::ecs::{AsAny, Component};
use crate::types::panic_message;

/// Marker for types that can be posted through an event bus.
///
/// Dispatch is keyed by the event's exact concrete type; there is no
/// matching against wrapper or "parent" event types.
pub trait Event: Any {}

/// One handler declaration for component type `C`.
///
/// `slot` identifies the handler within a declaration chain: two
/// declarations with the same slot name and event type are the same
/// logical handler, and the one listed last wins at registration.
pub struct Handler<C> {
    pub(crate) event: TypeId,
    pub(crate) event_name: &'static str,
    pub(crate) slot: &'static str,
    pub(crate) invoke: Arc<dyn Fn(&mut C, &dyn Any) + Send + Sync>,
}

impl<C: Component + 'static> Handler<C> {
    pub fn new<E: Event>(slot: &'static str, f: fn(&mut C, &E)) -> Self {
        Self {
            event: TypeId::of::<E>(),
            event_name: std::any::type_name::<E>(),
            slot,
            invoke: Arc::new(move |component, event| {
                if let Some(event) = event.downcast_ref::<E>() {
                    f(component, event);
                }
            }),
        }
    }
}

/// Explicit handler declarations for a component type.
///
/// Composition replaces inheritance: a component wrapping another type's
/// behavior lists that type's declarations first, then its own. A later
/// declaration with the same (event, slot) key overrides the earlier one.
pub trait Subscriber: Component + Sized {
    fn handlers() -> Vec<Handler<Self>>;
}

/// A handler bound into an entity's dispatch table.
#[derive(Clone)]
pub(crate) struct Binding {
    component: TypeId,
    component_name: &'static str,
    event_name: &'static str,
    slot: &'static str,
    invoke: Arc<dyn Fn(&mut dyn Component, &dyn Any) + Send + Sync>,
}

impl Binding {
    pub(crate) fn bind<C: Component + 'static>(handler: &Handler<C>) -> Self {
        let invoke = Arc::clone(&handler.invoke);
        Self {
            component: TypeId::of::<C>(),
            component_name: std::any::type_name::<C>(),
            event_name: handler.event_name,
            slot: handler.slot,
            invoke: Arc::new(move |component, event| {
                if let Some(component) = (*component).as_any_mut().downcast_mut::<C>() {
                    invoke(component, event);
                }
            }),
        }
    }

    pub(crate) fn component_type(&self) -> TypeId {
        self.component
    }

    pub(crate) fn component_name(&self) -> &'static str {
        self.component_name
    }

    /// Invoke the handler, containing any panic to this one delivery.
    pub(crate) fn dispatch(&self, component: &mut dyn Component, event: &dyn Any, owner: &str) {
        let result = catch_unwind(AssertUnwindSafe(|| (self.invoke)(component, event)));
        if let Err(payload) = result {
            error!(
                entity = owner,
                component = self.component_name,
                slot = self.slot,
                event = self.event_name,
                reason = panic_message(payload.as_ref()),
                "event handler panicked; continuing delivery"
            );
        }
    }
}
