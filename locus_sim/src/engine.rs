//! Kinematic box-domain physics engine.
//!
//! The engine owns an axis-aligned domain and moves movable bodies with the
//! velocities controllers posted on a shared [`ActuatorBoard`]. There is no
//! contact resolution: a move that would leave the domain or overlap another
//! body is simply refused for that tick.

use locus_env::{BodyDescriptor, BodyPose, EngineEntity, EnvError, PhysicsEngine};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Desired velocities, keyed by body ID. Written in `act`, read in the physics update.
pub type ActuatorBoard = Arc<Mutex<HashMap<String, Vector3<f64>>>>;

/// Creates an empty actuator board.
pub fn actuator_board() -> ActuatorBoard {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Declarative engine description, as found in scene files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Engine ID
    pub id: String,

    /// Domain lower corner [x, y, z]
    pub min: [f64; 3],

    /// Domain upper corner [x, y, z]
    pub max: [f64; 3],

    /// Integration step in seconds
    #[serde(default = "default_dt")]
    pub dt: f64,
}

fn default_dt() -> f64 {
    0.1
}

impl EngineSpec {
    pub fn new(id: &str, min: [f64; 3], max: [f64; 3]) -> Self {
        Self {
            id: id.to_string(),
            min,
            max,
            dt: default_dt(),
        }
    }
}

/// Returns true if two boxes centered on their positions overlap.
pub fn overlaps(a: &BodyDescriptor, b: &BodyDescriptor) -> bool {
    overlaps_at(&a.position, a, b)
}

fn overlaps_at(position: &Vector3<f64>, a: &BodyDescriptor, b: &BodyDescriptor) -> bool {
    (0..3).all(|i| (position[i] - b.position[i]).abs() * 2.0 < a.size[i] + b.size[i])
}

/// Box-domain engine with kinematic motion and AABB collision.
#[derive(Debug)]
pub struct KinematicEngine {
    id: String,
    min: Vector3<f64>,
    max: Vector3<f64>,
    dt: f64,
    entities: Vec<EngineEntity>,
    board: ActuatorBoard,
    moved: Vec<BodyPose>,
    ticks: u64,
    blocked: u64,
}

impl KinematicEngine {
    /// Creates an engine from its spec, reading commands from `board`.
    pub fn new(spec: &EngineSpec, board: ActuatorBoard) -> Self {
        Self {
            id: spec.id.clone(),
            min: Vector3::from(spec.min),
            max: Vector3::from(spec.max),
            dt: spec.dt,
            entities: Vec::new(),
            board,
            moved: Vec::new(),
            ticks: 0,
            blocked: 0,
        }
    }

    /// Number of updates since creation or reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of refused moves since creation or reset.
    pub fn blocked_moves(&self) -> u64 {
        self.blocked
    }

    /// Returns a housed body by ID.
    pub fn body(&self, body_id: &str) -> Option<&BodyDescriptor> {
        self.entities.iter().find_map(|e| e.body(body_id))
    }

    fn bodies(&self) -> impl Iterator<Item = &BodyDescriptor> {
        self.entities.iter().flat_map(|e| e.bodies.iter())
    }

    fn commands(&self) -> HashMap<String, Vector3<f64>> {
        self.lock_board().clone()
    }

    fn lock_board(&self) -> MutexGuard<'_, HashMap<String, Vector3<f64>>> {
        match self.board.lock() {
            Ok(board) => board,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PhysicsEngine for KinematicEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_point_contained(&self, point: &Vector3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    fn add_entity(&mut self, entity: EngineEntity) -> Result<(), EnvError> {
        if self.contains_entity(&entity.root_id) {
            return Err(EnvError::engine(
                &self.id,
                format!("entity \"{}\" is already housed", entity.root_id),
            ));
        }
        self.entities.push(entity);
        Ok(())
    }

    fn remove_entity(&mut self, root_id: &str) -> Result<(), EnvError> {
        let index = self
            .entities
            .iter()
            .position(|e| e.root_id == root_id)
            .ok_or_else(|| EnvError::engine(&self.id, format!("entity \"{root_id}\" not found")))?;
        let removed = self.entities.remove(index);
        // Stale commands would move a body re-added under the same ID
        let mut board = self.lock_board();
        for body in &removed.bodies {
            board.remove(&body.id);
        }
        Ok(())
    }

    fn contains_entity(&self, root_id: &str) -> bool {
        self.entities.iter().any(|e| e.root_id == root_id)
    }

    fn is_colliding(&self, body_id: &str) -> bool {
        let Some(body) = self.body(body_id) else {
            return false;
        };
        self.bodies()
            .filter(|other| other.id != body.id)
            .any(|other| overlaps(body, other))
    }

    fn update(&mut self) {
        self.ticks += 1;
        self.moved.clear();
        let commands = self.commands();

        for e in 0..self.entities.len() {
            for b in 0..self.entities[e].bodies.len() {
                let body = &self.entities[e].bodies[b];
                let Some(velocity) = commands.get(&body.id) else {
                    continue;
                };
                if !body.movable || velocity.norm() == 0.0 {
                    continue;
                }
                let target = body.position + velocity * self.dt;
                let free = self.is_point_contained(&target)
                    && !self
                        .bodies()
                        .filter(|other| other.id != body.id)
                        .any(|other| overlaps_at(&target, body, other));
                if !free {
                    self.blocked += 1;
                    debug!("Engine \"{}\": move of \"{}\" refused", self.id, body.id);
                    continue;
                }

                let body = &mut self.entities[e].bodies[b];
                body.position = target;
                self.moved.push(BodyPose {
                    id: body.id.clone(),
                    position: body.position,
                    orientation: body.orientation,
                });
            }
        }
    }

    fn moved_bodies(&self) -> Vec<BodyPose> {
        self.moved.clone()
    }

    fn entity_ids(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.root_id.clone()).collect()
    }

    fn reset(&mut self) {
        self.lock_board().clear();
        self.moved.clear();
        self.ticks = 0;
        self.blocked = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;
    use proptest::prelude::*;

    fn body(id: &str, x: f64, movable: bool) -> BodyDescriptor {
        BodyDescriptor {
            id: id.to_string(),
            position: Vector3::new(x, 0.0, 0.0),
            orientation: UnitQuaternion::identity(),
            size: Vector3::repeat(0.2),
            movable,
        }
    }

    fn root(id: &str, x: f64, movable: bool) -> EngineEntity {
        EngineEntity {
            root_id: id.to_string(),
            bodies: vec![body(&format!("{id}.body"), x, movable)],
        }
    }

    fn engine(board: &ActuatorBoard) -> KinematicEngine {
        KinematicEngine::new(
            &EngineSpec::new("dyn2d_0", [-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]),
            Arc::clone(board),
        )
    }

    #[test]
    fn test_domain_containment() {
        let engine = engine(&actuator_board());
        assert!(engine.is_point_contained(&Vector3::new(1.0, -1.0, 0.0)));
        assert!(!engine.is_point_contained(&Vector3::new(1.01, 0.0, 0.0)));
    }

    #[test]
    fn test_add_remove_roots() {
        let mut engine = engine(&actuator_board());
        engine.add_entity(root("fb0", 0.0, true)).unwrap();

        assert!(engine.add_entity(root("fb0", 0.5, true)).is_err());
        assert_eq!(engine.entity_ids(), vec!["fb0"]);

        engine.remove_entity("fb0").unwrap();
        assert!(engine.remove_entity("fb0").is_err());
        assert!(!engine.contains_entity("fb0"));
    }

    #[test]
    fn test_remove_drops_pending_commands() {
        let board = actuator_board();
        let mut engine = engine(&board);
        engine.add_entity(root("a", 0.0, true)).unwrap();
        engine.add_entity(root("b", 0.5, true)).unwrap();
        {
            let mut commands = board.lock().unwrap();
            commands.insert("a.body".to_string(), Vector3::new(1.0, 0.0, 0.0));
            commands.insert("b.body".to_string(), Vector3::new(0.0, 1.0, 0.0));
        }

        engine.remove_entity("a").unwrap();
        assert!(!board.lock().unwrap().contains_key("a.body"));
        assert!(board.lock().unwrap().contains_key("b.body"));

        // Re-adding under the same ID starts without a velocity
        engine.add_entity(root("a", 0.0, true)).unwrap();
        engine.update();
        assert_relative_eq!(engine.body("a.body").unwrap().position.x, 0.0);

        engine.reset();
        assert!(board.lock().unwrap().is_empty());
    }

    #[test]
    fn test_aabb_collision() {
        let mut engine = engine(&actuator_board());
        engine.add_entity(root("a", 0.0, true)).unwrap();
        engine.add_entity(root("b", 0.15, false)).unwrap();
        engine.add_entity(root("c", 0.6, true)).unwrap();

        assert!(engine.is_colliding("a.body"));
        assert!(engine.is_colliding("b.body"));
        assert!(!engine.is_colliding("c.body"));
        assert!(!engine.is_colliding("unknown"));
    }

    #[test]
    fn test_update_moves_commanded_bodies() {
        let board = actuator_board();
        let mut engine = engine(&board);
        engine.add_entity(root("a", 0.0, true)).unwrap();
        board
            .lock()
            .unwrap()
            .insert("a.body".to_string(), Vector3::new(1.0, 0.0, 0.0));

        engine.update();
        engine.update();

        assert_relative_eq!(engine.body("a.body").unwrap().position.x, 0.2, epsilon = 1e-12);
        let moved = engine.moved_bodies();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, "a.body");
        assert_eq!(engine.ticks(), 2);
    }

    #[test]
    fn test_blocked_moves() {
        let board = actuator_board();
        let mut engine = engine(&board);
        engine.add_entity(root("a", 0.0, true)).unwrap();
        engine.add_entity(root("wall", 0.25, false)).unwrap();
        engine.add_entity(root("edge", -0.95, true)).unwrap();
        {
            let mut commands = board.lock().unwrap();
            commands.insert("a.body".to_string(), Vector3::new(1.0, 0.0, 0.0));
            commands.insert("edge.body".to_string(), Vector3::new(-1.0, 0.0, 0.0));
            commands.insert("wall.body".to_string(), Vector3::new(1.0, 0.0, 0.0));
        }

        engine.update();

        assert_relative_eq!(engine.body("a.body").unwrap().position.x, 0.0);
        assert_relative_eq!(engine.body("edge.body").unwrap().position.x, -0.95);
        assert_relative_eq!(engine.body("wall.body").unwrap().position.x, 0.25);
        assert_eq!(engine.blocked_moves(), 2);
        assert!(engine.moved_bodies().is_empty());
    }

    #[test]
    fn test_spec_from_json_defaults_dt() {
        let spec: EngineSpec =
            serde_json::from_str(r#"{"id":"e0","min":[-1,-1,0],"max":[1,1,1]}"#).unwrap();
        assert_eq!(spec.dt, 0.1);
        assert_eq!(spec.min, [-1.0, -1.0, 0.0]);
    }

    proptest! {
        #[test]
        fn prop_moves_stay_in_domain(
            vx in -5.0f64..5.0,
            vy in -5.0f64..5.0,
            steps in 1usize..30,
        ) {
            let board = actuator_board();
            let mut engine = engine(&board);
            engine.add_entity(root("a", 0.0, true)).unwrap();
            engine.add_entity(root("post", 0.5, false)).unwrap();
            board
                .lock()
                .unwrap()
                .insert("a.body".to_string(), Vector3::new(vx, vy, 0.0));

            for _ in 0..steps {
                engine.update();
            }

            let position = engine.body("a.body").unwrap().position;
            prop_assert!(engine.is_point_contained(&position));
            prop_assert!(!engine.is_colliding("a.body"));
        }
    }
}
