//! Physics engine abstraction.

use crate::error::EnvError;
use crate::types::{BodyPose, EngineEntity};
use nalgebra::Vector3;

/// The capability set the space needs from a physics engine.
///
/// Integration, contact resolution and the engine's internal data layout are
/// opaque to the space; it only asks four questions and issues a blocking
/// `update` once per tick.
///
/// # Housing rule
///
/// A movable body is housed by at most one engine. A static body may be
/// housed by every engine whose domain contains its reference point.
pub trait PhysicsEngine: Send {
    /// Returns the engine's ID (used in error reports).
    fn id(&self) -> &str;
    
    /// Returns true if the point falls inside this engine's domain.
    fn is_point_contained(&self, point: &Vector3<f64>) -> bool;
    
    /// Starts simulating a root entity and its bodies.
    ///
    /// # Returns
    /// * `Err(EnvError::EngineError)` - The root is already housed here
    fn add_entity(&mut self, entity: EngineEntity) -> Result<(), EnvError>;
    
    /// Stops simulating a root entity.
    fn remove_entity(&mut self, root_id: &str) -> Result<(), EnvError>;
    
    /// Returns true if the root is currently housed by this engine.
    fn contains_entity(&self, root_id: &str) -> bool;
    
    /// Returns true if the given body overlaps any other body in this engine.
    fn is_colliding(&self, body_id: &str) -> bool;
    
    /// Advances the engine by one tick. Blocks until done.
    fn update(&mut self);
    
    /// Returns poses of bodies that moved during the last update.
    fn moved_bodies(&self) -> Vec<BodyPose> {
        Vec::new()
    }
    
    /// Returns the IDs of the housed roots.
    fn entity_ids(&self) -> Vec<String>;
    
    /// Restores the engine to its post-initialization state.
    fn reset(&mut self) {}
}
