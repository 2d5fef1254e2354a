//! The component trait: capability-typed units of state and behavior.

use std::any::Any;
use std::time::Duration;

/// Upcast support for capability lookup by concrete type.
///
/// Blanket-implemented for everything `'static`; component authors never
/// implement this by hand.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A unit of state and behavior owned by exactly one [`Entity`](super::Entity).
///
/// An entity holds at most one component per concrete type; lookups are
/// keyed by that type. Components that want a back-reference to their
/// owner store the id handed to [`Component::on_attach`]. The reference
/// is the id, never a pointer, so ownership stays acyclic.
pub trait Component: AsAny + Send {
    /// Called once when the component is added to an entity.
    fn on_attach(&mut self, _owner: &str) {}

    /// Periodic tick, driven by the owning entity's tick.
    fn tick(&mut self, _elapse: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Labeled {
        owner: Option<String>,
    }

    impl Component for Labeled {
        fn on_attach(&mut self, owner: &str) {
            self.owner = Some(owner.to_string());
        }
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let boxed: Box<dyn Component> = Box::new(Labeled { owner: None });
        assert!((*boxed).as_any().downcast_ref::<Labeled>().is_some());

        let unboxed = boxed.into_any().downcast::<Labeled>();
        assert!(unboxed.is_ok());
    }
}
