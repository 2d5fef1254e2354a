//! The per-loop entity registry component.

use std::collections::HashMap;

use tracing::debug;

use crate::ecs::{Component, Entity};

/// Registry of the entities owned by one game loop.
///
/// Installed on every loop's own entity at worker startup; all access is
/// thread-confined to that loop's worker. During a tick pass each entity
/// is checked out of the map while its tick runs, so handler code running
/// inline may mutate the registry (including unregistering the very
/// entity being ticked) without corrupting the iteration.
pub struct EntityRegistry {
    entities: HashMap<String, Entity>,
    /// Id of the entity currently checked out for its tick, if any.
    ticking: Option<String>,
    /// Set when the checked-out entity was unregistered mid-tick.
    doomed: bool,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            ticking: None,
            doomed: false,
        }
    }

    /// Take ownership of an entity. Returns false if an entity with the
    /// same id is already owned.
    pub fn register(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(entity.id()) {
            return false;
        }
        if self.ticking.as_deref() == Some(entity.id()) && !self.doomed {
            return false;
        }
        debug!(entity = entity.id(), "entity registered");
        self.entities.insert(entity.id().to_string(), entity);
        true
    }

    /// Release and return an entity. Unregistering the entity currently
    /// being ticked marks it for removal instead; it is dropped when its
    /// tick returns, and `None` is returned here.
    pub fn unregister(&mut self, id: &str) -> Option<Entity> {
        if let Some(entity) = self.entities.remove(id) {
            debug!(entity = id, "entity unregistered");
            return Some(entity);
        }
        if self.ticking.as_deref() == Some(id) && !self.doomed {
            debug!(entity = id, "entity unregistered during its own tick");
            self.doomed = true;
        }
        None
    }

    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
            || (self.ticking.as_deref() == Some(id) && !self.doomed)
    }

    pub fn entity_count(&self) -> usize {
        let ticking = usize::from(self.ticking.is_some() && !self.doomed);
        self.entities.len() + ticking
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Point-in-time snapshot of the owned ids.
    pub fn ids(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Remove `id` from the map for the duration of its tick.
    pub(crate) fn checkout(&mut self, id: &str) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.ticking = Some(id.to_string());
        self.doomed = false;
        Some(entity)
    }

    /// Return a checked-out entity, unless it doomed itself mid-tick.
    pub(crate) fn checkin(&mut self, entity: Entity) {
        let doomed = std::mem::replace(&mut self.doomed, false);
        self.ticking = None;
        if doomed {
            return;
        }
        self.entities.insert(entity.id().to_string(), entity);
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for EntityRegistry {}
