//! The entity model.
//!
//! An [`Entity`] is a node identified by a unique string ID and optionally
//! owned by a parent. Instead of a class hierarchy, each entity carries a
//! small closed set of optional capability slots:
//!
//! - **positional**: a pose in the global frame
//! - **embodied**: a pose plus a collision body and its anchors
//! - **composable**: named child components (handles into the registry arena)
//! - **controllable**: a behavior run in the act and sense phases
//!
//! Capability queries return `Option<&T>`; there is no downcasting.

use crate::tags::{TagEquipment, TagState};
use locus_env::{BodyDescriptor, ConfigNode, EnvError};
use nalgebra::{UnitQuaternion, Vector3};
use std::fmt;

/// Handle into the registry arena.
///
/// The generation makes handles to removed entities detectably stale, so
/// non-owning references never alias a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Position and orientation in the global frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    /// Creates a pose.
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// The origin, unrotated.
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// Reads `position` (required) and `orientation` (optional, Euler degrees) from a node.
    pub fn from_node(node: &ConfigNode) -> Result<Self, EnvError> {
        let position = node.vector3("position")?;
        let angles = node.vector3_or("orientation", Vector3::zeros())?;
        Ok(Self::new(position, orientation_from_euler_degrees(&angles)))
    }

    /// Applies a local offset expressed in this pose's frame.
    pub fn compose(&self, offset: &Pose) -> Pose {
        Pose::new(
            self.position + self.orientation * offset.position,
            self.orientation * offset.orientation,
        )
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Converts scene-format Euler angles to a quaternion.
///
/// The vector holds degrees in (z, y, x) order: yaw, pitch, roll.
pub fn orientation_from_euler_degrees(angles: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(
        angles.z.to_radians(),
        angles.y.to_radians(),
        angles.x.to_radians(),
    )
}

/// Positional capability: a pose, plus the configured one for reset.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalState {
    pose: Pose,
    initial: Pose,
}

impl PositionalState {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            initial: pose,
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn move_to(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn reset(&mut self) {
        self.pose = self.initial;
    }
}

/// A named reference frame on a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    /// Anchor name, unique within its body
    pub id: String,

    /// Local offset from the body's reference point
    pub offset: Pose,

    /// Current global pose
    pub pose: Pose,

    /// Number of dependents that asked for updates
    in_use: u32,
}

impl Anchor {
    /// Returns true if at least one dependent enabled this anchor.
    pub fn is_enabled(&self) -> bool {
        self.in_use > 0
    }
}

/// Name of the anchor every body carries at its reference point.
pub const ORIGIN_ANCHOR: &str = "origin";

/// Embodied capability: a pose, a collision box, and anchors.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbodiedState {
    pose: Pose,
    initial: Pose,
    size: Vector3<f64>,
    movable: bool,
    anchors: Vec<Anchor>,
}

impl EmbodiedState {
    /// Creates a body. The origin anchor is added and permanently enabled.
    pub fn new(pose: Pose, size: Vector3<f64>, movable: bool) -> Self {
        Self {
            pose,
            initial: pose,
            size,
            movable,
            anchors: vec![Anchor {
                id: ORIGIN_ANCHOR.to_string(),
                offset: Pose::identity(),
                pose,
                in_use: 1,
            }],
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn size(&self) -> &Vector3<f64> {
        &self.size
    }

    pub fn is_movable(&self) -> bool {
        self.movable
    }

    /// Adds a named anchor. Fails if the name is taken.
    pub fn add_anchor(&mut self, id: &str, offset: Pose) -> Result<(), EnvError> {
        if self.anchor(id).is_some() {
            return Err(EnvError::invalid_attribute("anchor", id, "duplicate anchor id"));
        }
        self.anchors.push(Anchor {
            id: id.to_string(),
            offset,
            pose: self.pose.compose(&offset),
            in_use: 0,
        });
        Ok(())
    }

    pub fn anchor(&self, id: &str) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.id == id)
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// Enables an anchor. Its pose is refreshed on the 0 → 1 transition.
    pub fn enable_anchor(&mut self, id: &str) -> bool {
        let body_pose = self.pose;
        match self.anchors.iter_mut().find(|a| a.id == id) {
            Some(anchor) => {
                if anchor.in_use == 0 {
                    anchor.pose = body_pose.compose(&anchor.offset);
                }
                anchor.in_use += 1;
                true
            }
            None => false,
        }
    }

    /// Releases one use of an anchor. The origin anchor never turns off.
    pub fn disable_anchor(&mut self, id: &str) -> bool {
        match self.anchors.iter_mut().find(|a| a.id == id) {
            Some(anchor) => {
                if anchor.id != ORIGIN_ANCHOR {
                    anchor.in_use = anchor.in_use.saturating_sub(1);
                }
                true
            }
            None => false,
        }
    }

    /// Moves the body and refreshes its enabled anchors.
    pub fn move_to(&mut self, pose: Pose) {
        self.pose = pose;
        self.update_anchors();
    }

    /// Recomputes the global pose of every enabled anchor.
    pub fn update_anchors(&mut self) {
        let body_pose = self.pose;
        for anchor in self.anchors.iter_mut().filter(|a| a.in_use > 0) {
            anchor.pose = body_pose.compose(&anchor.offset);
        }
    }

    pub fn reset(&mut self) {
        self.move_to(self.initial);
    }

    /// Builds the descriptor handed to physics engines.
    pub fn descriptor(&self, id: &str) -> BodyDescriptor {
        BodyDescriptor {
            id: id.to_string(),
            position: self.pose.position,
            orientation: self.pose.orientation,
            size: self.size,
            movable: self.movable,
        }
    }
}

/// Composable capability: named components owned by this entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposableState {
    components: Vec<(String, EntityHandle)>,
}

impl ComposableState {
    /// Returns the handle of the named component.
    pub fn component(&self, name: &str) -> Option<EntityHandle> {
        self.components
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, h)| *h)
    }

    pub fn has_component(&self, name: &str) -> bool {
        self.component(name).is_some()
    }

    /// Iterates over (name, handle) pairs in attachment order.
    pub fn components(&self) -> impl Iterator<Item = (&str, EntityHandle)> {
        self.components.iter().map(|(n, h)| (n.as_str(), *h))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub(crate) fn attach(&mut self, name: String, handle: EntityHandle) {
        self.components.push((name, handle));
    }

    pub(crate) fn detach(&mut self, handle: EntityHandle) {
        self.components.retain(|(_, h)| *h != handle);
    }
}

/// What a controller sees when one of its phases runs.
#[derive(Debug, Clone)]
pub struct StepContext<'a> {
    /// Current simulation tick
    pub tick: u64,

    /// ID of the controllable entity
    pub entity_id: &'a str,

    /// ID of the body the controller drives, if any
    pub body_id: Option<&'a str>,

    /// Pose of that body
    pub body_pose: Option<Pose>,
}

/// Behavior of a controllable entity, executed once per step in two passes.
pub trait Controller: Send + fmt::Debug {
    /// Applies the decisions of the previous step (before physics).
    fn act(&mut self, ctx: &StepContext<'_>);

    /// Reads the new state and decides (after physics and the pre-step hook).
    fn sense(&mut self, ctx: &StepContext<'_>);

    /// Restores the controller to its configured state.
    fn reset(&mut self) {}
}

/// Controllable capability.
#[derive(Debug)]
pub struct ControllableState {
    controller_id: String,
    controller: Box<dyn Controller>,
}

impl ControllableState {
    pub fn new(controller_id: impl Into<String>, controller: Box<dyn Controller>) -> Self {
        Self {
            controller_id: controller_id.into(),
            controller,
        }
    }

    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    pub fn controller_mut(&mut self) -> &mut dyn Controller {
        self.controller.as_mut()
    }
}

/// A simulated object.
#[derive(Debug)]
pub struct Entity {
    id: String,
    type_tag: String,
    pub(crate) parent: Option<EntityHandle>,
    enabled: bool,
    positional: Option<PositionalState>,
    embodied: Option<EmbodiedState>,
    pub(crate) composable: Option<ComposableState>,
    controllable: Option<ControllableState>,
    pub(crate) tag: Option<TagState>,
    pub(crate) tag_equipment: Option<TagEquipment>,
}

impl Entity {
    /// Creates a bare entity with no capabilities.
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            parent: None,
            enabled: true,
            positional: None,
            embodied: None,
            composable: None,
            controllable: None,
            tag: None,
            tag_equipment: None,
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.positional = Some(PositionalState::new(pose));
        self
    }

    pub fn with_body(mut self, body: EmbodiedState) -> Self {
        self.embodied = Some(body);
        self
    }

    pub fn with_controller(mut self, state: ControllableState) -> Self {
        self.controllable = Some(state);
        self
    }

    pub fn with_tag(mut self, tag: TagState) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_tag_equipment(mut self, equipment: TagEquipment) -> Self {
        self.tag_equipment = Some(equipment);
        self.enabled = false;
        self.composable.get_or_insert_with(ComposableState::default);
        self
    }

    pub fn composable(mut self) -> Self {
        self.composable.get_or_insert_with(ComposableState::default);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn parent(&self) -> Option<EntityHandle> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Pose of a positional or embodied entity.
    pub fn pose(&self) -> Option<&Pose> {
        match (&self.embodied, &self.positional) {
            (Some(body), _) => Some(body.pose()),
            (None, Some(positional)) => Some(positional.pose()),
            (None, None) => None,
        }
    }

    /// True for positional and embodied entities.
    pub fn is_positional(&self) -> bool {
        self.positional.is_some() || self.embodied.is_some()
    }

    pub fn as_positional(&self) -> Option<&PositionalState> {
        self.positional.as_ref()
    }

    pub fn as_positional_mut(&mut self) -> Option<&mut PositionalState> {
        self.positional.as_mut()
    }

    pub fn as_embodied(&self) -> Option<&EmbodiedState> {
        self.embodied.as_ref()
    }

    pub fn as_embodied_mut(&mut self) -> Option<&mut EmbodiedState> {
        self.embodied.as_mut()
    }

    pub fn as_composable(&self) -> Option<&ComposableState> {
        self.composable.as_ref()
    }

    pub fn as_controllable(&self) -> Option<&ControllableState> {
        self.controllable.as_ref()
    }

    pub fn as_controllable_mut(&mut self) -> Option<&mut ControllableState> {
        self.controllable.as_mut()
    }

    pub fn as_tag(&self) -> Option<&TagState> {
        self.tag.as_ref()
    }

    pub fn as_tag_equipment(&self) -> Option<&TagEquipment> {
        self.tag_equipment.as_ref()
    }

    /// Moves a positional or embodied entity.
    pub fn move_to(&mut self, pose: Pose) -> bool {
        if let Some(body) = self.embodied.as_mut() {
            body.move_to(pose);
            true
        } else if let Some(positional) = self.positional.as_mut() {
            positional.move_to(pose);
            true
        } else {
            false
        }
    }

    /// Restores configuration-time state. Structure is left untouched.
    pub fn reset(&mut self) {
        if let Some(positional) = self.positional.as_mut() {
            positional.reset();
        }
        if let Some(body) = self.embodied.as_mut() {
            body.reset();
        }
        if let Some(controllable) = self.controllable.as_mut() {
            controllable.controller.reset();
        }
        if let Some(tag) = self.tag.as_mut() {
            tag.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_anchor_follows_enabled_only() {
        let mut body = EmbodiedState::new(Pose::identity(), Vector3::new(1.0, 1.0, 1.0), true);
        body.add_anchor("turret", Pose::new(Vector3::new(0.0, 0.0, 0.5), UnitQuaternion::identity()))
            .unwrap();

        body.move_to(Pose::new(Vector3::new(2.0, 0.0, 0.0), UnitQuaternion::identity()));
        // Disabled: still at its creation pose
        assert_relative_eq!(body.anchor("turret").unwrap().pose.position.x, 0.0);

        assert!(body.enable_anchor("turret"));
        assert_relative_eq!(body.anchor("turret").unwrap().pose.position.x, 2.0);

        body.move_to(Pose::new(Vector3::new(3.0, 1.0, 0.0), UnitQuaternion::identity()));
        let turret = body.anchor("turret").unwrap();
        assert_relative_eq!(turret.pose.position, Vector3::new(3.0, 1.0, 0.5));
    }

    #[test]
    fn test_anchor_offset_is_rotated() {
        let yaw90 = orientation_from_euler_degrees(&Vector3::new(90.0, 0.0, 0.0));
        let mut body = EmbodiedState::new(Pose::new(Vector3::zeros(), yaw90), Vector3::repeat(0.2), true);
        body.add_anchor("front", Pose::new(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()))
            .unwrap();

        let front = body.anchor("front").unwrap();
        assert_relative_eq!(front.pose.position, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_origin_anchor_cannot_be_disabled() {
        let mut body = EmbodiedState::new(Pose::identity(), Vector3::repeat(1.0), false);
        body.disable_anchor(ORIGIN_ANCHOR);
        body.disable_anchor(ORIGIN_ANCHOR);
        assert!(body.anchor(ORIGIN_ANCHOR).unwrap().is_enabled());
        assert!(body.add_anchor(ORIGIN_ANCHOR, Pose::identity()).is_err());
    }

    #[test]
    fn test_reset_restores_initial_pose() {
        let start = Pose::new(Vector3::new(1.0, 2.0, 0.0), UnitQuaternion::identity());
        let mut entity = Entity::new("box0", "box")
            .with_body(EmbodiedState::new(start, Vector3::repeat(0.5), true));

        entity.move_to(Pose::new(Vector3::new(9.0, 9.0, 0.0), UnitQuaternion::identity()));
        entity.reset();

        assert_eq!(entity.pose(), Some(&start));
    }

    #[test]
    fn test_capability_queries() {
        let light = Entity::new("l0", "light").with_pose(Pose::identity());
        assert!(light.is_positional());
        assert!(light.as_embodied().is_none());

        let note = Entity::new("n0", "note");
        assert!(!note.is_positional());
        assert!(note.pose().is_none());
    }
}
