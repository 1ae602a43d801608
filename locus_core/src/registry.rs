//! The entity registry: one arena, several synchronized indices.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Registry                                                 │
//! │                                                          │
//! │  slots: Vec<Slot>          arena, generational handles   │
//! │  entities: Vec<Handle>     flat, insertion order         │
//! │  by_type: tag → (id → Handle)                            │
//! │  by_id: id → Handle                                      │
//! │  roots: Vec<Handle>        entities with no parent       │
//! │  controllables: Vec<Handle>                              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every index is updated in the same call that touches the arena, so no
//! caller can observe them out of step.

use crate::entity::{Entity, EntityHandle};
use crate::error::SpaceError;
use crate::factory::NewEntity;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Per-type index: entity ID → handle.
pub type TypeIndex = BTreeMap<String, EntityHandle>;

#[derive(Debug)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Owner of every live entity.
#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    entities: Vec<EntityHandle>,
    by_type: BTreeMap<String, TypeIndex>,
    by_id: HashMap<String, EntityHandle>,
    roots: Vec<EntityHandle>,
    controllables: Vec<EntityHandle>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All live entities in insertion order.
    pub fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    /// Root entities in insertion order.
    pub fn roots(&self) -> &[EntityHandle] {
        &self.roots
    }

    /// Controllable entities in registration order.
    pub fn controllables(&self) -> &[EntityHandle] {
        &self.controllables
    }

    /// Resolves a handle. Stale handles resolve to `None`.
    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    /// Resolves a handle mutably.
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    /// Resolves a handle or fails with `EntityNotFound`.
    pub fn entity(&self, handle: EntityHandle) -> Result<&Entity, SpaceError> {
        self.get(handle)
            .ok_or_else(|| SpaceError::EntityNotFound(handle.to_string()))
    }

    pub(crate) fn entity_mut(&mut self, handle: EntityHandle) -> Result<&mut Entity, SpaceError> {
        self.get_mut(handle)
            .ok_or_else(|| SpaceError::EntityNotFound(handle.to_string()))
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Looks up an entity by exact ID.
    pub fn lookup(&self, id: &str) -> Option<EntityHandle> {
        self.by_id.get(id).copied()
    }

    /// IDs of all live entities, in insertion order.
    pub fn ids(&self) -> Vec<String> {
        self.entities
            .iter()
            .filter_map(|h| self.get(*h))
            .map(|e| e.id().to_string())
            .collect()
    }

    /// Returns all entities whose ID matches a glob-like pattern.
    ///
    /// `*` matches any run of characters, `?` exactly one. Order is
    /// insertion order.
    pub fn matching(&self, pattern: &str) -> Vec<EntityHandle> {
        self.entities
            .iter()
            .copied()
            .filter(|h| {
                self.get(*h)
                    .map(|e| match_pattern(e.id(), pattern))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Returns the ID index for a type tag.
    ///
    /// A tag stays known once registered, even when all its entities are gone.
    pub fn by_type(&self, type_tag: &str) -> Result<&TypeIndex, SpaceError> {
        self.by_type
            .get(type_tag)
            .ok_or_else(|| SpaceError::TypeNotFound(type_tag.to_string()))
    }

    /// Inserts an entity tree, attaching it to `parent` if given.
    ///
    /// All IDs are validated before anything is inserted, so a failed add
    /// leaves the registry untouched.
    pub(crate) fn add(
        &mut self,
        new: NewEntity,
        parent: Option<EntityHandle>,
    ) -> Result<EntityHandle, SpaceError> {
        if let Some(parent) = parent {
            self.entity(parent)?;
        }
        let mut seen = HashSet::new();
        self.validate_ids(&new, &mut seen)?;

        let handle = self.insert_tree(new, parent);
        Ok(handle)
    }

    fn validate_ids<'a>(
        &self,
        new: &'a NewEntity,
        seen: &mut HashSet<&'a str>,
    ) -> Result<(), SpaceError> {
        let id = new.entity.id();
        if self.by_id.contains_key(id) || !seen.insert(id) {
            return Err(SpaceError::DuplicateEntityId(id.to_string()));
        }
        for (_, component) in &new.components {
            self.validate_ids(component, seen)?;
        }
        Ok(())
    }

    fn insert_tree(&mut self, new: NewEntity, parent: Option<EntityHandle>) -> EntityHandle {
        let NewEntity {
            mut entity,
            components,
        } = new;
        entity.parent = parent;
        if !components.is_empty() {
            entity.composable.get_or_insert_with(Default::default);
        }
        let handle = self.insert_one(entity);

        for (name, component) in components {
            let child = self.insert_tree(component, Some(handle));
            if let Some(composable) = self.get_mut(handle).and_then(|e| e.composable.as_mut()) {
                composable.attach(name, child);
            }
        }
        handle
    }

    fn insert_one(&mut self, entity: Entity) -> EntityHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entity = None;
                EntityHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entity: None,
                });
                EntityHandle {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        let id = entity.id().to_string();
        self.entities.push(handle);
        self.by_type
            .entry(entity.type_tag().to_string())
            .or_default()
            .insert(id.clone(), handle);
        self.by_id.insert(id, handle);
        if entity.is_root() {
            self.roots.push(handle);
        }
        if entity.as_controllable().is_some() {
            self.controllables.push(handle);
        }

        self.slots[handle.index as usize].entity = Some(entity);
        handle
    }

    /// Removes an entity and, first, every component it owns (post-order).
    ///
    /// Returns the removed IDs in removal order.
    pub(crate) fn remove(&mut self, handle: EntityHandle) -> Result<Vec<String>, SpaceError> {
        let parent = self.entity(handle)?.parent();
        let mut removed = Vec::new();
        self.remove_tree(handle, &mut removed);

        if let Some(composable) = parent
            .and_then(|p| self.get_mut(p))
            .and_then(|e| e.composable.as_mut())
        {
            composable.detach(handle);
        }
        debug!("Removed {} entities: {:?}", removed.len(), removed);
        Ok(removed)
    }

    fn remove_tree(&mut self, handle: EntityHandle, removed: &mut Vec<String>) {
        let children: Vec<EntityHandle> = self
            .get(handle)
            .and_then(|e| e.as_composable())
            .map(|c| c.components().map(|(_, h)| h).collect())
            .unwrap_or_default();
        for child in children {
            self.remove_tree(child, removed);
        }

        let slot = &mut self.slots[handle.index as usize];
        let Some(entity) = slot.entity.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        self.entities.retain(|h| *h != handle);
        self.roots.retain(|h| *h != handle);
        self.controllables.retain(|h| *h != handle);
        self.by_id.remove(entity.id());
        if let Some(index) = self.by_type.get_mut(entity.type_tag()) {
            index.remove(entity.id());
        }
        removed.push(entity.id().to_string());
    }

    /// Registers an entity in the controllable list.
    ///
    /// The entity must carry a controller; registering twice is a no-op.
    pub(crate) fn add_controllable(&mut self, handle: EntityHandle) -> Result<(), SpaceError> {
        let entity = self.entity(handle)?;
        if entity.as_controllable().is_none() {
            return Err(SpaceError::missing(entity.id(), "controllable"));
        }
        if !self.controllables.contains(&handle) {
            self.controllables.push(handle);
        }
        Ok(())
    }

    /// Unregisters an entity from the controllable list, if present.
    pub(crate) fn remove_controllable(&mut self, handle: EntityHandle) {
        self.controllables.retain(|h| *h != handle);
    }

    /// Walks up to the topmost ancestor.
    pub fn root_of(&self, handle: EntityHandle) -> Result<EntityHandle, SpaceError> {
        let mut current = handle;
        while let Some(parent) = self.entity(current)?.parent() {
            current = parent;
        }
        Ok(current)
    }

    /// Returns the named component of a composable entity.
    pub fn component(&self, handle: EntityHandle, name: &str) -> Option<EntityHandle> {
        self.get(handle)?.as_composable()?.component(name)
    }

    /// Returns the entity itself if embodied, else its embodied `body` component.
    pub fn embodied_of(&self, handle: EntityHandle) -> Option<EntityHandle> {
        let entity = self.get(handle)?;
        if entity.as_embodied().is_some() {
            return Some(handle);
        }
        self.component(handle, "body")
            .filter(|c| self.get(*c).and_then(|e| e.as_embodied()).is_some())
    }

    /// Returns the entity itself if positional, else its positional `position` component.
    pub fn positional_of(&self, handle: EntityHandle) -> Option<EntityHandle> {
        let entity = self.get(handle)?;
        if entity.is_positional() {
            return Some(handle);
        }
        self.component(handle, "position")
            .filter(|c| self.get(*c).map(|e| e.is_positional()).unwrap_or(false))
    }

    /// Handles of an entity and all its descendants, parents first.
    pub fn subtree(&self, handle: EntityHandle) -> Vec<EntityHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.get(current) else {
                continue;
            };
            out.push(current);
            if let Some(composable) = entity.as_composable() {
                let children: Vec<EntityHandle> = composable.components().map(|(_, h)| h).collect();
                stack.extend(children.into_iter().rev());
            }
        }
        out
    }

    /// Resets every entity to its configuration-time state.
    pub(crate) fn reset_all(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Some(entity) = slot.entity.as_mut() {
                entity.reset();
            }
        }
    }

    /// Checks that every index agrees with the arena.
    pub fn is_consistent(&self) -> bool {
        let live: Vec<EntityHandle> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.entity.is_some())
            .map(|(i, s)| EntityHandle {
                index: i as u32,
                generation: s.generation,
            })
            .collect();
        if live.len() != self.entities.len() || live.iter().any(|h| !self.entities.contains(h)) {
            return false;
        }

        let typed: usize = self.by_type.values().map(|index| index.len()).sum();
        if typed != live.len() || self.by_id.len() != live.len() {
            return false;
        }

        live.iter().all(|h| {
            let Some(entity) = self.get(*h) else {
                return false;
            };
            let typed_ok = self
                .by_type
                .get(entity.type_tag())
                .and_then(|index| index.get(entity.id()))
                == Some(h);
            let root_ok = entity.is_root() == self.roots.contains(h);
            let parent_ok = match entity.parent() {
                None => true,
                Some(p) => self
                    .get(p)
                    .and_then(|pe| pe.as_composable())
                    .map(|c| c.components().any(|(_, child)| child == *h))
                    .unwrap_or(false),
            };
            let reachable = self
                .root_of(*h)
                .map(|r| self.roots.contains(&r))
                .unwrap_or(false);
            typed_ok && root_ok && parent_ok && reachable
        }) && self.controllables.iter().all(|h| self.contains(*h))
    }
}

/// Glob-like match: `*` any run, `?` any single character.
pub fn match_pattern(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
