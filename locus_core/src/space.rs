//! The space: owner of the registry, the engines and the simulation clock.
//!
//! # Step
//!
//! One call to [`Space::update`] runs, in order:
//!
//! 1. increment the clock
//! 2. controllable `act`
//! 3. physics update (engines, then body/anchor/tag write-back)
//! 4. media update
//! 5. pre-step hook
//! 6. controllable `sense`
//! 7. post-step hook
//!
//! Every mutation of the registry or of an engine's entity set goes through
//! `&mut Space`, so there is a single writer.

use crate::binder;
use crate::entity::{EntityHandle, Pose, StepContext};
use crate::error::SpaceError;
use crate::factory::{EntityFactory, NewEntity};
use crate::registry::{Registry, TypeIndex};
use locus_env::{ConfigNode, Medium, PhysicsEngine};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Space configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpaceConfig {
    /// Seed for the placement RNG
    pub seed: u64,
}

/// Arena extent: a box centered on `center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArenaBounds {
    pub center: Vector3<f64>,
    pub size: Vector3<f64>,
}

impl ArenaBounds {
    /// Returns true if the point lies inside the arena (bounds included).
    pub fn contains(&self, point: &Vector3<f64>) -> bool {
        let half = self.size * 0.5;
        (0..3).all(|i| (point[i] - self.center[i]).abs() <= half[i])
    }
}

impl Default for ArenaBounds {
    fn default() -> Self {
        Self {
            center: Vector3::zeros(),
            size: Vector3::zeros(),
        }
    }
}

/// Read-only view handed to loop functions.
#[derive(Debug, Clone, Copy)]
pub struct SpaceView<'a> {
    pub tick: u64,
    pub registry: &'a Registry,
    pub arena: &'a ArenaBounds,
}

/// User hooks run around the sense phase.
pub trait LoopFunctions: Send {
    /// Runs after the media update, before `sense`.
    fn pre_step(&mut self, _space: &SpaceView<'_>) {}

    /// Runs last in the step.
    fn post_step(&mut self, _space: &SpaceView<'_>) {}

    fn reset(&mut self) {}
}

/// Loop functions that do nothing.
#[derive(Debug, Default)]
pub struct NoLoopFunctions;

impl LoopFunctions for NoLoopFunctions {}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Act,
    Sense,
}

/// Spatial state manager.
pub struct Space {
    config: SpaceConfig,
    pub(crate) registry: Registry,
    pub(crate) engines: Vec<Box<dyn PhysicsEngine>>,
    media: Vec<Box<dyn Medium>>,
    loop_functions: Box<dyn LoopFunctions>,
    pub(crate) factory: EntityFactory,
    /// Root → indices of the engines housing it
    housing: HashMap<EntityHandle, Vec<usize>>,
    pub(crate) rng: ChaCha8Rng,
    clock: u64,
    arena: ArenaBounds,
}

impl std::fmt::Debug for Space {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Space")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("arena", &self.arena)
            .field("entities", &self.registry.len())
            .field("engines", &self.engines.iter().map(|e| e.id()).collect::<Vec<_>>())
            .field("media", &self.media.iter().map(|m| m.id()).collect::<Vec<_>>())
            .finish()
    }
}

impl Space {
    /// Creates an empty space with no engines and the built-in factory.
    pub fn new(config: SpaceConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            config,
            registry: Registry::new(),
            engines: Vec::new(),
            media: Vec::new(),
            loop_functions: Box::new(NoLoopFunctions),
            factory: EntityFactory::default(),
            housing: HashMap::new(),
            rng,
            clock: 0,
            arena: ArenaBounds::default(),
        }
    }

    pub fn with_engine(mut self, engine: Box<dyn PhysicsEngine>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn with_medium(mut self, medium: Box<dyn Medium>) -> Self {
        self.media.push(medium);
        self
    }

    pub fn with_loop_functions(mut self, loop_functions: Box<dyn LoopFunctions>) -> Self {
        self.loop_functions = loop_functions;
        self
    }

    pub fn with_factory(mut self, factory: EntityFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn factory_mut(&mut self) -> &mut EntityFactory {
        &mut self.factory
    }

    /// Current tick. Zero before the first step and after a reset.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn arena(&self) -> &ArenaBounds {
        &self.arena
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable registry access for per-entity state (payloads, enable flags).
    ///
    /// Structural changes stay on `Space` so engines remain in sync.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn engines(&self) -> &[Box<dyn PhysicsEngine>] {
        &self.engines
    }

    pub fn media(&self) -> &[Box<dyn Medium>] {
        &self.media
    }

    /// Indices of the engines housing the root of `handle`.
    pub fn housing(&self, handle: EntityHandle) -> Option<&[usize]> {
        let root = self.registry.root_of(handle).ok()?;
        self.housing.get(&root).map(Vec::as_slice)
    }

    /// Loads a scene: arena attributes, direct entities, then distribute directives.
    pub fn init(&mut self, scene: &ConfigNode) -> Result<(), SpaceError> {
        self.arena = ArenaBounds {
            center: scene.vector3_or("center", Vector3::zeros())?,
            size: scene.vector3("size")?,
        };

        for node in scene.children.iter().filter(|c| c.name() != "distribute") {
            let new = self.factory.create(node)?;
            self.add_entity(new)?;
        }
        for node in scene.children_named("distribute") {
            self.distribute(node)?;
        }

        info!(
            "Space initialized: {} entities ({} roots) across {} engines",
            self.registry.len(),
            self.registry.roots().len(),
            self.engines.len()
        );
        Ok(())
    }

    /// Restores every entity to its configuration-time state and zeroes the clock.
    ///
    /// Structure is untouched, so calling it twice is the same as once.
    pub fn reset(&mut self) -> Result<(), SpaceError> {
        self.clock = 0;
        self.registry.reset_all();
        for engine in self.engines.iter_mut() {
            engine.reset();
        }
        for medium in self.media.iter_mut() {
            medium.reset();
        }
        self.loop_functions.reset();
        self.resync_engines()?;
        self.update_tags()?;
        info!("Space reset: {} entities", self.registry.len());
        Ok(())
    }

    /// Removes every root, last first, until none remain.
    pub fn destroy(&mut self) -> Result<(), SpaceError> {
        let mut removed = 0;
        while let Some(&root) = self.registry.roots().last() {
            removed += self.remove_entity(root)?.len();
        }
        info!("Space destroyed: {} entities removed", removed);
        Ok(())
    }

    /// Runs one simulation step.
    pub fn update(&mut self) -> Result<(), SpaceError> {
        self.clock += 1;
        self.run_controllers(Phase::Act);
        self.update_physics()?;
        self.update_media();
        self.loop_functions.pre_step(&SpaceView {
            tick: self.clock,
            registry: &self.registry,
            arena: &self.arena,
        });
        self.run_controllers(Phase::Sense);
        self.loop_functions.post_step(&SpaceView {
            tick: self.clock,
            registry: &self.registry,
            arena: &self.arena,
        });
        Ok(())
    }

    fn run_controllers(&mut self, phase: Phase) {
        let tick = self.clock;
        for handle in self.registry.controllables().to_vec() {
            let body = self
                .registry
                .root_of(handle)
                .ok()
                .and_then(|root| binder::first_embodied(&self.registry, root))
                .and_then(|body| self.registry.get(body))
                .map(|e| (e.id().to_string(), e.pose().copied()));
            let (body_id, body_pose) = match body {
                Some((id, pose)) => (Some(id), pose),
                None => (None, None),
            };
            let Some(entity) = self.registry.get_mut(handle) else {
                continue;
            };
            if !entity.is_enabled() {
                continue;
            }
            let id = entity.id().to_string();
            let Some(state) = entity.as_controllable_mut() else {
                continue;
            };
            let ctx = StepContext {
                tick,
                entity_id: &id,
                body_id: body_id.as_deref(),
                body_pose,
            };
            match phase {
                Phase::Act => state.controller_mut().act(&ctx),
                Phase::Sense => state.controller_mut().sense(&ctx),
            }
        }
    }

    fn update_physics(&mut self) -> Result<(), SpaceError> {
        for engine in self.engines.iter_mut() {
            engine.update();
        }
        let moved: Vec<_> = self.engines.iter().flat_map(|e| e.moved_bodies()).collect();
        for body in moved {
            let Some(entity) = self
                .registry
                .lookup(&body.id)
                .and_then(|h| self.registry.get_mut(h))
            else {
                continue;
            };
            entity.move_to(Pose::new(body.position, body.orientation));
        }
        self.update_tags()
    }

    fn update_media(&mut self) {
        for medium in self.media.iter_mut() {
            let tags = self.registry.tag_readings(medium.id());
            medium.update(&tags);
        }
    }

    fn update_tags(&mut self) -> Result<(), SpaceError> {
        for equipment in self.registry.tag_equipments() {
            if self.registry.entity(equipment)?.is_enabled() {
                self.registry.update_tag_equipment(equipment)?;
            }
        }
        Ok(())
    }

    /// Pushes the current body poses to every engine housing a root.
    ///
    /// Roots are re-added in registry order, so each engine ends up with the
    /// same entity order it had after scene loading.
    fn resync_engines(&mut self) -> Result<(), SpaceError> {
        let housed: Vec<(EntityHandle, Vec<usize>)> = self
            .registry
            .roots()
            .iter()
            .filter_map(|root| self.housing.get(root).map(|h| (*root, h.clone())))
            .collect();
        for (root, housing) in housed {
            let view = binder::engine_entity(&self.registry, root)?;
            binder::release(&mut self.engines, &housing, &view.root_id);
            for &i in &housing {
                self.engines[i].add_entity(view.clone())?;
            }
        }
        Ok(())
    }

    /// Registers an entity tree as a new root and houses it in the engine(s).
    ///
    /// If no engine can take it, the registry add is undone.
    pub fn add_entity(&mut self, new: NewEntity) -> Result<EntityHandle, SpaceError> {
        let handle = self.registry.add(new, None)?;
        if let Some(body) = binder::first_embodied(&self.registry, handle) {
            match binder::assign_to_engine(&self.registry, &mut self.engines, body) {
                Ok(housing) => {
                    self.housing.insert(handle, housing);
                }
                Err(err) => {
                    self.registry.remove(handle)?;
                    return Err(err);
                }
            }
        }
        debug!("Added entity \"{}\"", self.registry.entity(handle)?.id());
        Ok(handle)
    }

    /// Removes an entity and its components from the registry and the engines.
    ///
    /// Removing a component refreshes its root in the engines that house it.
    pub fn remove_entity(&mut self, handle: EntityHandle) -> Result<Vec<String>, SpaceError> {
        let root = self.registry.root_of(handle)?;
        let root_id = self.registry.entity(root)?.id().to_string();

        if root != handle {
            for equipment in self.registry.subtree(handle) {
                let entity = self.registry.entity(equipment)?;
                if entity.as_tag_equipment().is_some() && entity.is_enabled() {
                    self.registry.disable_tag_equipment(equipment)?;
                }
            }
        }

        let housing = self.housing.remove(&root).unwrap_or_default();
        binder::release(&mut self.engines, &housing, &root_id);
        let removed = self.registry.remove(handle)?;

        if root != handle && !housing.is_empty() {
            let view = binder::engine_entity(&self.registry, root)?;
            if !view.bodies.is_empty() {
                for &i in &housing {
                    self.engines[i].add_entity(view.clone())?;
                }
                self.housing.insert(root, housing);
            }
        }
        Ok(removed)
    }

    /// Entities whose ID matches a `*`/`?` pattern, in insertion order.
    pub fn entities_matching(&self, pattern: &str) -> Vec<EntityHandle> {
        self.registry.matching(pattern)
    }

    /// ID index of a type tag.
    pub fn entities_by_type(&self, type_tag: &str) -> Result<&TypeIndex, SpaceError> {
        self.registry.by_type(type_tag)
    }

    pub fn add_controllable(&mut self, handle: EntityHandle) -> Result<(), SpaceError> {
        self.registry.add_controllable(handle)
    }

    pub fn remove_controllable(&mut self, handle: EntityHandle) {
        self.registry.remove_controllable(handle)
    }

    /// Houses the root of an embodied entity that is not housed yet.
    pub fn assign_to_engine(&mut self, embodied: EntityHandle) -> Result<Vec<usize>, SpaceError> {
        let housing = binder::assign_to_engine(&self.registry, &mut self.engines, embodied)?;
        let root = self.registry.root_of(embodied)?;
        let entry = self.housing.entry(root).or_default();
        for &i in &housing {
            if !entry.contains(&i) {
                entry.push(i);
            }
        }
        entry.sort_unstable();
        Ok(housing)
    }

    /// True if the body collides in any of the engines housing its root.
    pub fn is_colliding(&self, body: EntityHandle) -> Result<bool, SpaceError> {
        let id = self.registry.entity(body)?.id();
        Ok(self
            .housing(body)
            .map(|housing| binder::is_colliding(&self.engines, housing, id))
            .unwrap_or(false))
    }

    /// Indexes a tag equipment in a medium and enables it.
    pub fn add_tags_to_medium(&mut self, equipment: EntityHandle, medium: &str) -> Result<(), SpaceError> {
        if !self.media.iter().any(|m| m.id() == medium) {
            return Err(SpaceError::UnknownMedium(medium.to_string()));
        }
        self.registry.add_tag_equipment_to_medium(equipment, medium)
    }

    /// Drops a tag equipment from its medium and disables it.
    pub fn remove_tags_from_medium(&mut self, equipment: EntityHandle) -> Result<(), SpaceError> {
        self.registry.remove_tag_equipment_from_medium(equipment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::testing::BoxEngine;
    use crate::entity::{Controller, EmbodiedState, Entity};
    use approx::assert_relative_eq;
    use locus_env::{BodyPose, EngineEntity, EnvError, TagReading};
    use nalgebra::UnitQuaternion;
    use std::sync::{Arc, Mutex};

    fn open_space() -> Space {
        Space::new(SpaceConfig::default())
            .with_engine(BoxEngine::boxed("dyn2d_0", [-10.0, -10.0, -1.0], [10.0, 10.0, 1.0]))
    }

    fn crate_node(id: &str, x: f64, movable: bool) -> ConfigNode {
        ConfigNode::new("box")
            .with_attribute("id", id)
            .with_attribute("size", "0.2,0.2,0.2")
            .with_attribute("movable", movable)
            .with_child(ConfigNode::new("body").with_attribute("position", format!("{x},0,0")))
    }

    fn robot_node(id: &str, x: f64, controller: bool) -> ConfigNode {
        let mut node = ConfigNode::new("robot")
            .with_attribute("id", id)
            .with_child(ConfigNode::new("body").with_attribute("position", format!("{x},0,0")))
            .with_child(
                ConfigNode::new("anchor")
                    .with_attribute("id", "top")
                    .with_attribute("position", "0,0,0.1"),
            )
            .with_child(
                ConfigNode::new("tags").with_child(
                    ConfigNode::new("tag")
                        .with_attribute("anchor", "top")
                        .with_attribute("position", "0,0,0.01")
                        .with_attribute("payload", "init"),
                ),
            );
        if controller {
            node.add_child(ConfigNode::new("controller").with_attribute("name", "trace"));
        }
        node
    }

    #[derive(Debug)]
    struct Trace {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Controller for Trace {
        fn act(&mut self, ctx: &StepContext<'_>) {
            self.log.lock().unwrap().push(format!("act {}", ctx.tick));
        }

        fn sense(&mut self, ctx: &StepContext<'_>) {
            self.log.lock().unwrap().push(format!("sense {}", ctx.tick));
        }
    }

    struct TraceHooks {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl LoopFunctions for TraceHooks {
        fn pre_step(&mut self, space: &SpaceView<'_>) {
            self.log.lock().unwrap().push(format!("pre {}", space.tick));
        }

        fn post_step(&mut self, space: &SpaceView<'_>) {
            self.log.lock().unwrap().push(format!("post {}", space.tick));
        }
    }

    struct TraceMedium {
        log: Arc<Mutex<Vec<String>>>,
        seen: Arc<Mutex<Vec<TagReading>>>,
    }

    impl Medium for TraceMedium {
        fn id(&self) -> &str {
            "tags"
        }

        fn update(&mut self, tags: &[TagReading]) {
            self.log.lock().unwrap().push("medium".to_string());
            *self.seen.lock().unwrap() = tags.to_vec();
        }
    }

    /// Engine that drifts every body +1 on x per update.
    struct Drift {
        inner: BoxEngine,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl PhysicsEngine for Drift {
        fn id(&self) -> &str {
            self.inner.id()
        }
        fn is_point_contained(&self, p: &Vector3<f64>) -> bool {
            self.inner.is_point_contained(p)
        }
        fn add_entity(&mut self, entity: EngineEntity) -> Result<(), EnvError> {
            self.inner.add_entity(entity)
        }
        fn remove_entity(&mut self, root_id: &str) -> Result<(), EnvError> {
            self.inner.remove_entity(root_id)
        }
        fn contains_entity(&self, root_id: &str) -> bool {
            self.inner.contains_entity(root_id)
        }
        fn is_colliding(&self, body_id: &str) -> bool {
            self.inner.is_colliding(body_id)
        }
        fn update(&mut self) {
            self.log.lock().unwrap().push("physics".to_string());
            for body in self.inner.entities.iter_mut().flat_map(|e| e.bodies.iter_mut()) {
                body.position.x += 1.0;
            }
        }
        fn moved_bodies(&self) -> Vec<BodyPose> {
            self.inner
                .entities
                .iter()
                .flat_map(|e| e.bodies.iter())
                .map(|b| BodyPose {
                    id: b.id.clone(),
                    position: b.position,
                    orientation: b.orientation,
                })
                .collect()
        }
        fn entity_ids(&self) -> Vec<String> {
            self.inner.entity_ids()
        }
    }

    fn traced_space(log: &Arc<Mutex<Vec<String>>>, seen: &Arc<Mutex<Vec<TagReading>>>) -> Space {
        let mut factory = EntityFactory::with_builtins();
        let controller_log = Arc::clone(log);
        factory.register_controller(
            "trace",
            Box::new(move |_| {
                Ok(Box::new(Trace {
                    log: Arc::clone(&controller_log),
                }) as Box<dyn Controller>)
            }),
        );
        Space::new(SpaceConfig::default())
            .with_engine(Box::new(Drift {
                inner: BoxEngine::new("drift", [-10.0, -10.0, -1.0], [10.0, 10.0, 1.0]),
                log: Arc::clone(log),
            }))
            .with_medium(Box::new(TraceMedium {
                log: Arc::clone(log),
                seen: Arc::clone(seen),
            }))
            .with_loop_functions(Box::new(TraceHooks { log: Arc::clone(log) }))
            .with_factory(factory)
    }

    #[test]
    fn test_init_places_direct_entities_then_distributions() {
        let scene = ConfigNode::new("arena")
            .with_attribute("size", "20,20,2")
            .with_child(
                ConfigNode::new("distribute")
                    .with_child(
                        ConfigNode::new("position")
                            .with_attribute("method", "grid")
                            .with_attribute("center", "0,5,0")
                            .with_attribute("distances", "1,0,0")
                            .with_attribute("layout", "3,1,1"),
                    )
                    .with_child(
                        ConfigNode::new("orientation")
                            .with_attribute("method", "constant")
                            .with_attribute("values", "0,0,0"),
                    )
                    .with_child(
                        ConfigNode::new("entity")
                            .with_attribute("quantity", 3)
                            .with_attribute("max_trials", 0)
                            .with_child(crate_node("c", 0.0, true)),
                    ),
            )
            .with_child(crate_node("wall", 0.0, false));
        let mut space = open_space();

        space.init(&scene).unwrap();

        assert_eq!(space.registry().ids(), vec!["wall", "c0", "c1", "c2"]);
        assert_relative_eq!(space.arena().size, Vector3::new(20.0, 20.0, 2.0));
        assert!(space.arena().contains(&Vector3::new(9.0, -9.0, 0.0)));
    }

    #[test]
    fn test_step_phase_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut space = traced_space(&log, &seen);
        space.add_entity(space.factory.create(&robot_node("fb0", 0.0, true)).unwrap()).unwrap();

        space.update().unwrap();

        assert_eq!(space.clock(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["act 1", "physics", "medium", "pre 1", "sense 1", "post 1"]
        );
    }

    #[test]
    fn test_reset_keeps_engine_entity_order() {
        let mut space = open_space();
        for i in 0..16 {
            let node = crate_node(&format!("b{i}"), f64::from(i) * 0.5 - 4.0, true);
            space.add_entity(space.factory.create(&node).unwrap()).unwrap();
        }
        let before = space.engines()[0].entity_ids();
        assert_eq!(before.first().map(String::as_str), Some("b0"));

        space.reset().unwrap();
        assert_eq!(space.engines()[0].entity_ids(), before);

        space.reset().unwrap();
        assert_eq!(space.engines()[0].entity_ids(), before);
    }

    #[test]
    fn test_physics_write_back_moves_bodies_anchors_and_tags() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut space = traced_space(&log, &seen);
        let fb0 = space
            .add_entity(space.factory.create(&robot_node("fb0", 0.0, true)).unwrap())
            .unwrap();
        let tags = space.registry().component(fb0, "tags").unwrap();
        space.add_tags_to_medium(tags, "tags").unwrap();

        space.update().unwrap();
        space.update().unwrap();

        let body = space.registry().component(fb0, "body").unwrap();
        let body_state = space.registry().get(body).unwrap().as_embodied().unwrap();
        assert_relative_eq!(body_state.pose().position, Vector3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(
            body_state.anchor("top").unwrap().pose.position,
            Vector3::new(2.0, 0.0, 0.1)
        );

        let readings = seen.lock().unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].id, "fb0.tags.tag_0");
        assert_eq!(readings[0].payload, "init");
        assert_relative_eq!(readings[0].position, Vector3::new(2.0, 0.0, 0.11), epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_medium() {
        let mut space = open_space();
        let fb0 = space
            .add_entity(space.factory.create(&robot_node("fb0", 0.0, false)).unwrap())
            .unwrap();
        let tags = space.registry().component(fb0, "tags").unwrap();

        assert!(matches!(
            space.add_tags_to_medium(tags, "radio"),
            Err(SpaceError::UnknownMedium(m)) if m == "radio"
        ));
        assert!(!space.registry().get(tags).unwrap().is_enabled());
    }

    #[test]
    fn test_reset_zeroes_clock_and_keeps_ids() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut space = traced_space(&log, &seen);
        let fb0 = space
            .add_entity(space.factory.create(&robot_node("fb0", 0.0, true)).unwrap())
            .unwrap();
        let tags = space.registry().component(fb0, "tags").unwrap();
        space.add_tags_to_medium(tags, "tags").unwrap();
        space.registry_mut().set_tag_payloads(tags, "changed").unwrap();
        for _ in 0..3 {
            space.update().unwrap();
        }
        let ids = space.registry().ids();

        space.reset().unwrap();
        space.reset().unwrap();

        assert_eq!(space.clock(), 0);
        assert_eq!(space.registry().ids(), ids);
        let body = space.registry().component(fb0, "body").unwrap();
        assert_relative_eq!(
            space.registry().get(body).unwrap().pose().unwrap().position,
            Vector3::zeros()
        );
        let tag = space.registry().tag(tags, 0).unwrap();
        let tag_entity = space.registry().get(tag).unwrap();
        assert_eq!(tag_entity.as_tag().unwrap().payload(), "init");
        assert_relative_eq!(tag_entity.pose().unwrap().position, Vector3::new(0.0, 0.0, 0.11), epsilon = 1e-12);
        assert!(space.engines()[0].contains_entity("fb0"));
    }

    #[test]
    fn test_destroy_empties_everything() {
        let mut space = open_space();
        for (i, x) in [-3.0, 0.0, 3.0].into_iter().enumerate() {
            let new = space.factory.create(&crate_node(&format!("c{i}"), x, true)).unwrap();
            space.add_entity(new).unwrap();
        }

        space.destroy().unwrap();

        assert!(space.registry().roots().is_empty());
        assert!(space.registry().is_empty());
        assert!(space.engines()[0].entity_ids().is_empty());
        assert!(space.registry().is_consistent());
    }

    #[test]
    fn test_add_without_housing_engine_is_undone() {
        let mut space = open_space();
        let new = space.factory.create(&crate_node("far", 50.0, true)).unwrap();

        let err = space.add_entity(new).unwrap_err();

        assert!(matches!(err, SpaceError::NoHousingEngine { entity } if entity == "far"));
        assert!(space.registry().is_empty());
        assert!(space.registry().lookup("far").is_none());
    }

    #[test]
    fn test_overlapping_domains() {
        let mut space = Space::new(SpaceConfig::default())
            .with_engine(BoxEngine::boxed("west", [-5.0, -5.0, -1.0], [1.0, 5.0, 1.0]))
            .with_engine(BoxEngine::boxed("east", [-1.0, -5.0, -1.0], [5.0, 5.0, 1.0]));

        let err = space
            .add_entity(space.factory.create(&crate_node("mover", 0.0, true)).unwrap())
            .unwrap_err();
        assert!(matches!(&err, SpaceError::AmbiguousEngine { engines, .. } if engines == &["west", "east"]));
        assert!(space.registry().is_empty());

        let wall = space
            .add_entity(space.factory.create(&crate_node("wall", 0.0, false)).unwrap())
            .unwrap();
        assert_eq!(space.housing(wall), Some(&[0, 1][..]));
        assert!(space.engines().iter().all(|e| e.contains_entity("wall")));

        let east = space
            .add_entity(space.factory.create(&crate_node("east_only", 3.0, true)).unwrap())
            .unwrap();
        assert_eq!(space.housing(east), Some(&[1][..]));
        assert!(!space.engines()[0].contains_entity("east_only"));
    }

    #[test]
    fn test_remove_component_refreshes_engine_view() {
        let mut space = open_space();
        let pose = Pose::new(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity());
        let body = |id: &str| NewEntity::new(Entity::new(id, "body").with_body(EmbodiedState::new(pose, Vector3::repeat(0.1), true)));
        let new = NewEntity::new(Entity::new("pair", "pair").composable())
            .with_component("body", body("pair.body"))
            .with_component("extra", body("pair.extra"));
        let pair = space.add_entity(new).unwrap();
        let extra = space.registry().component(pair, "extra").unwrap();

        let removed = space.remove_entity(extra).unwrap();

        assert_eq!(removed, vec!["pair.extra"]);
        assert!(space.engines()[0].contains_entity("pair"));
        assert!(!space.is_colliding(space.registry().component(pair, "body").unwrap()).unwrap());
        assert!(space.registry().is_consistent());
    }

    #[test]
    fn test_remove_tag_equipment_releases_anchors() {
        let mut space = open_space();
        let fb0 = space
            .add_entity(space.factory.create(&robot_node("fb0", 0.0, false)).unwrap())
            .unwrap();
        let tags = space.registry().component(fb0, "tags").unwrap();
        let body = space.registry().component(fb0, "body").unwrap();
        let anchor_enabled = |space: &Space| {
            space
                .registry()
                .get(body)
                .and_then(|e| e.as_embodied())
                .and_then(|b| b.anchor("top"))
                .map(|a| a.is_enabled())
                .unwrap()
        };
        space.registry_mut().enable_tag_equipment(tags).unwrap();
        assert!(anchor_enabled(&space));

        space.remove_entity(tags).unwrap();

        assert!(!anchor_enabled(&space));
        assert!(space.registry().component(fb0, "tags").is_none());
        assert!(space.registry().lookup("fb0.tags.tag_0").is_none());
    }

    #[test]
    fn test_controllable_registration_through_space() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut space = traced_space(&log, &seen);
        let fb0 = space
            .add_entity(space.factory.create(&robot_node("fb0", 0.0, true)).unwrap())
            .unwrap();
        let controller = space.registry().component(fb0, "controller").unwrap();

        space.remove_controllable(controller);
        space.update().unwrap();
        assert!(!log.lock().unwrap().iter().any(|l| l.starts_with("act")));

        space.add_controllable(controller).unwrap();
        space.update().unwrap();
        assert!(log.lock().unwrap().iter().any(|l| l == "act 2"));
    }
}
