//! Physics-engine binder.
//!
//! Engines house roots, never components: the root of an embodied entity is
//! what gets added, while the containment test uses the embodied entity's own
//! reference point. A movable body may live in one engine only; a static body
//! goes to every engine whose domain contains it.

use crate::entity::EntityHandle;
use crate::error::SpaceError;
use crate::registry::Registry;
use locus_env::{EngineEntity, PhysicsEngine};
use tracing::debug;

/// Collects every body in the root's subtree into the engine-facing view.
pub fn engine_entity(registry: &Registry, root: EntityHandle) -> Result<EngineEntity, SpaceError> {
    let root_id = registry.entity(root)?.id().to_string();
    let bodies = registry
        .subtree(root)
        .into_iter()
        .filter_map(|h| registry.get(h))
        .filter_map(|e| e.as_embodied().map(|body| body.descriptor(e.id())))
        .collect();
    Ok(EngineEntity { root_id, bodies })
}

/// First embodied entity in a root's subtree, parents first.
pub fn first_embodied(registry: &Registry, root: EntityHandle) -> Option<EntityHandle> {
    registry.embodied_of(root).or_else(|| {
        registry
            .subtree(root)
            .into_iter()
            .find(|h| registry.get(*h).and_then(|e| e.as_embodied()).is_some())
    })
}

/// Adds the root of `embodied` to the engine(s) that can house it.
///
/// Returns the indices of the engines the root was added to, in engine
/// order. Only the engines are mutated. If adding to one of several engines
/// fails, the earlier adds are undone.
pub fn assign_to_engine(
    registry: &Registry,
    engines: &mut [Box<dyn PhysicsEngine>],
    embodied: EntityHandle,
) -> Result<Vec<usize>, SpaceError> {
    let entity = registry.entity(embodied)?;
    let body = entity
        .as_embodied()
        .ok_or_else(|| SpaceError::missing(entity.id(), "embodied"))?;
    let root = registry.root_of(embodied)?;
    let root_id = registry.entity(root)?.id().to_string();

    let position = body.pose().position;
    let matches: Vec<usize> = engines
        .iter()
        .enumerate()
        .filter(|(_, engine)| engine.is_point_contained(&position))
        .map(|(i, _)| i)
        .collect();

    if matches.is_empty() {
        return Err(SpaceError::NoHousingEngine { entity: root_id });
    }
    if body.is_movable() && matches.len() > 1 {
        return Err(SpaceError::AmbiguousEngine {
            entity: entity.id().to_string(),
            engines: matches.iter().map(|&i| engines[i].id().to_string()).collect(),
        });
    }

    let view = engine_entity(registry, root)?;
    for (n, &i) in matches.iter().enumerate() {
        if let Err(err) = engines[i].add_entity(view.clone()) {
            release(engines, &matches[..n], &root_id);
            return Err(err.into());
        }
        debug!("Added \"{}\" to engine \"{}\"", root_id, engines[i].id());
    }
    Ok(matches)
}

/// Removes a root from the given engines. Engines that no longer hold it are skipped.
pub fn release(engines: &mut [Box<dyn PhysicsEngine>], housing: &[usize], root_id: &str) {
    for &i in housing {
        let Some(engine) = engines.get_mut(i) else {
            continue;
        };
        if engine.contains_entity(root_id) && engine.remove_entity(root_id).is_ok() {
            debug!("Removed \"{}\" from engine \"{}\"", root_id, engine.id());
        }
    }
}

/// True if any of the housing engines reports the body as colliding.
pub fn is_colliding(engines: &[Box<dyn PhysicsEngine>], housing: &[usize], body_id: &str) -> bool {
    housing
        .iter()
        .filter_map(|&i| engines.get(i))
        .any(|engine| engine.is_colliding(body_id))
}
