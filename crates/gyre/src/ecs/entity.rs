//! Entities: a string identity plus a capability-typed component map and
//! an event bus mediating between the components.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::ecs::{AsAny, Component};
use crate::eventbus::{Event, EventBus, Subscriber};

/// A stateful object owned by at most one game loop at a time.
///
/// Behavior lives in components; ticking an entity ticks each of its
/// components. The entity also owns the [`EventBus`] that mediates events
/// between its components.
pub struct Entity {
    id: String,
    components: HashMap<TypeId, Box<dyn Component>>,
    bus: EventBus,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let bus = EventBus::new(id.clone());
        Self {
            id,
            components: HashMap::new(),
            bus,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Attach a component. One instance per concrete type: returns false
    /// (dropping `component`) if that type is already present.
    pub fn add_component<C: Component + 'static>(&mut self, mut component: C) -> bool {
        if self.components.contains_key(&TypeId::of::<C>()) {
            return false;
        }
        component.on_attach(&self.id);
        self.components.insert(TypeId::of::<C>(), Box::new(component));
        true
    }

    /// Capability lookup by concrete type.
    pub fn get_component<C: Component + 'static>(&self) -> Option<&C> {
        self.components
            .get(&TypeId::of::<C>())
            .and_then(|c| (**c).as_any().downcast_ref())
    }

    pub fn get_component_mut<C: Component + 'static>(&mut self) -> Option<&mut C> {
        self.components
            .get_mut(&TypeId::of::<C>())
            .and_then(|c| (**c).as_any_mut().downcast_mut())
    }

    pub fn has_component<C: Component + 'static>(&self) -> bool {
        self.components.contains_key(&TypeId::of::<C>())
    }

    /// Detach and return a component. Handler slots registered for it stay
    /// in the bus but are skipped at delivery until unregistered.
    pub fn remove_component<C: Component + 'static>(&mut self) -> Option<C> {
        let boxed = self.components.remove(&TypeId::of::<C>())?;
        boxed.into_any().downcast::<C>().ok().map(|c| *c)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Tick every component. Ordering across components is unspecified.
    pub fn tick(&mut self, elapse: Duration) {
        for component in self.components.values_mut() {
            component.tick(elapse);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Event bus surface
    // ─────────────────────────────────────────────────────────────────────

    /// Register the handler slots declared by component type `C`.
    /// Returns the number of newly added slots (0 if already registered).
    pub fn register_subscriber<C: Subscriber + 'static>(&mut self) -> usize {
        self.bus.register::<C>()
    }

    /// Remove every active handler slot of component type `C`.
    /// Returns the number of slots removed.
    pub fn unregister_subscriber<C: Component + 'static>(&mut self) -> usize {
        self.bus.unregister::<C>()
    }

    /// Deliver `event` to every handler registered for its exact type,
    /// synchronously, in component-registration order. A panicking handler
    /// is logged and skipped; delivery continues.
    pub fn post<E: Event>(&mut self, event: &E) {
        let bindings = self.bus.bindings_for(TypeId::of::<E>());
        for binding in bindings {
            let Some(component) = self.components.get_mut(&binding.component_type()) else {
                tracing::debug!(
                    entity = %self.id,
                    component = binding.component_name(),
                    "skipping handler: component no longer attached"
                );
                continue;
            };
            binding.dispatch(&mut **component, event, &self.id);
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("components", &self.components.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Position {
        x: f64,
        y: f64,
    }

    impl Component for Position {}

    struct TickCounter {
        ticks: usize,
        total: Duration,
    }

    impl Component for TickCounter {
        fn tick(&mut self, elapse: Duration) {
            self.ticks += 1;
            self.total += elapse;
        }
    }

    struct OwnerAware {
        owner: Option<String>,
    }

    impl Component for OwnerAware {
        fn on_attach(&mut self, owner: &str) {
            self.owner = Some(owner.to_string());
        }
    }

    #[test]
    fn test_one_component_per_type() {
        let mut entity = Entity::new("e1");
        assert!(entity.add_component(Position::default()));
        assert!(!entity.add_component(Position { x: 1.0, y: 1.0 }));
        assert_eq!(entity.component_count(), 1);
        // The first instance survives the rejected second add.
        assert_eq!(entity.get_component::<Position>().unwrap().x, 0.0);
    }

    #[test]
    fn test_typed_lookup_and_removal() {
        let mut entity = Entity::new("e2");
        entity.add_component(Position { x: 3.0, y: 4.0 });

        assert!(entity.has_component::<Position>());
        entity.get_component_mut::<Position>().unwrap().y = 5.0;

        let removed = entity.remove_component::<Position>().unwrap();
        assert_eq!(removed.y, 5.0);
        assert!(!entity.has_component::<Position>());
        assert!(entity.remove_component::<Position>().is_none());
    }

    #[test]
    fn test_owner_back_reference() {
        let mut entity = Entity::new("owner-1");
        entity.add_component(OwnerAware { owner: None });
        assert_eq!(
            entity.get_component::<OwnerAware>().unwrap().owner.as_deref(),
            Some("owner-1")
        );
    }

    #[test]
    fn test_tick_reaches_every_component() {
        let mut entity = Entity::new("e3");
        entity.add_component(TickCounter {
            ticks: 0,
            total: Duration::ZERO,
        });
        entity.add_component(Position::default());

        entity.tick(Duration::from_millis(16));
        entity.tick(Duration::from_millis(16));

        let counter = entity.get_component::<TickCounter>().unwrap();
        assert_eq!(counter.ticks, 2);
        assert_eq!(counter.total, Duration::from_millis(32));
    }
}
