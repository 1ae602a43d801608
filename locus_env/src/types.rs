//! Value types exchanged between the space and its physics engines.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Geometric description of one embodied entity, as handed to an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDescriptor {
    /// Fully qualified entity ID of the embodied entity
    pub id: String,
    
    /// Reference point [x, y, z] in the global frame
    pub position: Vector3<f64>,
    
    /// Orientation in the global frame
    pub orientation: UnitQuaternion<f64>,
    
    /// Bounding box size [x, y, z] in meters
    pub size: Vector3<f64>,
    
    /// Whether the body can move (movable bodies live in one engine only)
    pub movable: bool,
}

/// A root entity and every body in its subtree.
///
/// Engines house roots: removing the root removes all of its bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEntity {
    /// ID of the root entity
    pub root_id: String,
    
    /// Bodies owned by the root (the root itself when embodied, or its components)
    pub bodies: Vec<BodyDescriptor>,
}

impl EngineEntity {
    /// Returns the body with the given ID, if housed here.
    pub fn body(&self, id: &str) -> Option<&BodyDescriptor> {
        self.bodies.iter().find(|b| b.id == id)
    }
}

/// Updated pose of a body after an engine step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyPose {
    /// Embodied entity ID
    pub id: String,
    
    /// New position [x, y, z]
    pub position: Vector3<f64>,
    
    /// New orientation
    pub orientation: UnitQuaternion<f64>,
}

/// A tag as seen by the medium it is indexed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReading {
    /// Tag entity ID
    pub id: String,
    
    /// Current payload
    pub payload: String,
    
    /// Global position of the tag center
    pub position: Vector3<f64>,
    
    /// Global orientation of the tag plane
    pub orientation: UnitQuaternion<f64>,
    
    /// Side length of the square tag in meters
    pub side_length: f64,
}
