//! Tag-equipped entities.
//!
//! A tag equipment is a composable component whose children are tags
//! (positional entities carrying a payload). Each tag is pinned to an anchor
//! of the parent's `body` with a fixed local offset. The anchor reference is
//! by name and resolved on every update, never held as a pointer.

use crate::entity::{EntityHandle, Pose};
use crate::error::SpaceError;
use crate::registry::Registry;
use locus_env::TagReading;

/// Tag capability: the payload a camera would decode.
#[derive(Debug, Clone, PartialEq)]
pub struct TagState {
    payload: String,
    initial_payload: String,
    side_length: f64,
    medium: Option<String>,
}

impl TagState {
    pub fn new(payload: impl Into<String>, side_length: f64) -> Self {
        let payload = payload.into();
        Self {
            initial_payload: payload.clone(),
            payload,
            side_length,
            medium: None,
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = payload.into();
    }

    pub fn side_length(&self) -> f64 {
        self.side_length
    }

    /// ID of the medium the tag is indexed in, if any.
    pub fn medium(&self) -> Option<&str> {
        self.medium.as_deref()
    }

    pub(crate) fn reset(&mut self) {
        self.payload = self.initial_payload.clone();
    }
}

/// One tag pinned to an anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct TagInstance {
    /// Component name of the tag inside the equipment
    pub component: String,

    /// Anchor name on the parent's body
    pub anchor: String,

    /// Offset from the anchor frame
    pub offset: Pose,
}

/// Tag equipment capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagEquipment {
    instances: Vec<TagInstance>,
}

impl TagEquipment {
    pub fn new(instances: Vec<TagInstance>) -> Self {
        Self { instances }
    }

    pub fn instances(&self) -> &[TagInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl Registry {
    fn equipment(&self, handle: EntityHandle) -> Result<&TagEquipment, SpaceError> {
        let entity = self.entity(handle)?;
        entity
            .as_tag_equipment()
            .ok_or_else(|| SpaceError::missing(entity.id(), "tag-equipped"))
    }

    /// Resolves the body the equipment's anchors belong to (the parent's `body`).
    fn equipment_body(&self, handle: EntityHandle) -> Result<EntityHandle, SpaceError> {
        let entity = self.entity(handle)?;
        entity
            .parent()
            .and_then(|parent| self.embodied_of(parent))
            .ok_or_else(|| SpaceError::missing(entity.id(), "attached to an embodied parent"))
    }

    /// Returns the handle of the tag at `index`.
    pub fn tag(&self, equipment: EntityHandle, index: usize) -> Result<EntityHandle, SpaceError> {
        let instances = self.equipment(equipment)?.instances();
        let instance = instances.get(index).ok_or_else(|| SpaceError::Equipment {
            entity: self.entity(equipment).map(|e| e.id().to_string()).unwrap_or_default(),
            reason: format!("index out of bounds: {} >= {}", index, instances.len()),
        })?;
        self.component(equipment, &instance.component)
            .ok_or_else(|| SpaceError::EntityNotFound(instance.component.clone()))
    }

    fn tags(&self, equipment: EntityHandle) -> Result<Vec<EntityHandle>, SpaceError> {
        (0..self.equipment(equipment)?.len())
            .map(|i| self.tag(equipment, i))
            .collect()
    }

    fn with_tag_state(
        &mut self,
        tag: EntityHandle,
        f: impl FnOnce(&mut TagState),
    ) -> Result<(), SpaceError> {
        let entity = self.entity_mut(tag)?;
        let id = entity.id().to_string();
        let state = entity.tag.as_mut().ok_or(SpaceError::missing(id, "a tag"))?;
        f(state);
        Ok(())
    }

    /// Sets the payload of one tag.
    pub fn set_tag_payload(
        &mut self,
        equipment: EntityHandle,
        index: usize,
        payload: &str,
    ) -> Result<(), SpaceError> {
        let tag = self.tag(equipment, index)?;
        self.with_tag_state(tag, |state| state.set_payload(payload))
    }

    /// Sets every tag to the same payload.
    pub fn set_tag_payloads(&mut self, equipment: EntityHandle, payload: &str) -> Result<(), SpaceError> {
        for tag in self.tags(equipment)? {
            self.with_tag_state(tag, |state| state.set_payload(payload))?;
        }
        Ok(())
    }

    /// Sets one payload per tag. The list length must match the tag count.
    pub fn set_tag_payloads_from(
        &mut self,
        equipment: EntityHandle,
        payloads: &[String],
    ) -> Result<(), SpaceError> {
        let tags = self.tags(equipment)?;
        if tags.len() != payloads.len() {
            return Err(SpaceError::Equipment {
                entity: self.entity(equipment)?.id().to_string(),
                reason: format!(
                    "number of tags ({}) does not equal the number of payloads ({})",
                    tags.len(),
                    payloads.len()
                ),
            });
        }
        for (tag, payload) in tags.into_iter().zip(payloads) {
            self.with_tag_state(tag, |state| state.set_payload(payload.as_str()))?;
        }
        Ok(())
    }

    /// Enables the equipment and the anchors its tags hang from.
    pub fn enable_tag_equipment(&mut self, equipment: EntityHandle) -> Result<(), SpaceError> {
        if self.entity(equipment)?.is_enabled() {
            return Ok(());
        }
        let anchors: Vec<String> = self
            .equipment(equipment)?
            .instances()
            .iter()
            .map(|i| i.anchor.clone())
            .collect();
        let body = self.equipment_body(equipment)?;
        let state = self
            .entity_mut(body)?
            .as_embodied_mut()
            .ok_or_else(|| SpaceError::EntityNotFound(body.to_string()))?;
        for anchor in &anchors {
            state.enable_anchor(anchor);
        }
        self.entity_mut(equipment)?.set_enabled(true);
        Ok(())
    }

    /// Disables the equipment and releases its anchors.
    pub fn disable_tag_equipment(&mut self, equipment: EntityHandle) -> Result<(), SpaceError> {
        if !self.entity(equipment)?.is_enabled() {
            return Ok(());
        }
        let anchors: Vec<String> = self
            .equipment(equipment)?
            .instances()
            .iter()
            .map(|i| i.anchor.clone())
            .collect();
        let body = self.equipment_body(equipment)?;
        if let Some(state) = self.entity_mut(body)?.as_embodied_mut() {
            for anchor in &anchors {
                state.disable_anchor(anchor);
            }
        }
        self.entity_mut(equipment)?.set_enabled(false);
        Ok(())
    }

    /// Moves every enabled tag to its anchor pose composed with its offset.
    pub fn update_tag_equipment(&mut self, equipment: EntityHandle) -> Result<(), SpaceError> {
        let instances = self.equipment(equipment)?.instances().to_vec();
        let body = self.equipment_body(equipment)?;

        let mut moves = Vec::with_capacity(instances.len());
        {
            let body_entity = self.entity(body)?;
            let state = body_entity
                .as_embodied()
                .ok_or_else(|| SpaceError::missing(body_entity.id(), "embodied"))?;
            for (i, instance) in instances.iter().enumerate() {
                let anchor = state.anchor(&instance.anchor).ok_or_else(|| SpaceError::Equipment {
                    entity: body_entity.id().to_string(),
                    reason: format!("unknown anchor \"{}\"", instance.anchor),
                })?;
                moves.push((self.tag(equipment, i)?, anchor.pose.compose(&instance.offset)));
            }
        }

        for (tag, pose) in moves {
            let entity = self.entity_mut(tag)?;
            if entity.is_enabled() {
                entity.move_to(pose);
            }
        }
        Ok(())
    }

    /// Indexes the tags in a medium and enables the equipment.
    pub(crate) fn add_tag_equipment_to_medium(
        &mut self,
        equipment: EntityHandle,
        medium: &str,
    ) -> Result<(), SpaceError> {
        for tag in self.tags(equipment)? {
            self.with_tag_state(tag, |state| state.medium = Some(medium.to_string()))?;
        }
        self.enable_tag_equipment(equipment)?;
        self.update_tag_equipment(equipment)
    }

    /// Drops the tags from their medium and disables the equipment.
    pub(crate) fn remove_tag_equipment_from_medium(
        &mut self,
        equipment: EntityHandle,
    ) -> Result<(), SpaceError> {
        for tag in self.tags(equipment)? {
            self.with_tag_state(tag, |state| state.medium = None)?;
        }
        self.disable_tag_equipment(equipment)
    }

    /// Enabled tags indexed in the given medium, in insertion order.
    pub fn tag_readings(&self, medium: &str) -> Vec<TagReading> {
        self.entities()
            .iter()
            .filter_map(|h| self.get(*h))
            .filter(|e| e.is_enabled())
            .filter(|e| {
                e.parent()
                    .and_then(|p| self.get(p))
                    .map(|p| p.is_enabled())
                    .unwrap_or(true)
            })
            .filter_map(|e| {
                let tag = e.as_tag()?;
                if tag.medium() != Some(medium) {
                    return None;
                }
                let pose = e.pose()?;
                Some(TagReading {
                    id: e.id().to_string(),
                    payload: tag.payload().to_string(),
                    position: pose.position,
                    orientation: pose.orientation,
                    side_length: tag.side_length(),
                })
            })
            .collect()
    }

    /// Handles of all tag equipment entities.
    pub fn tag_equipments(&self) -> Vec<EntityHandle> {
        self.entities()
            .iter()
            .copied()
            .filter(|h| self.get(*h).map(|e| e.as_tag_equipment().is_some()).unwrap_or(false))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::EntityFactory;
    use approx::assert_relative_eq;
    use locus_env::ConfigNode;
    use nalgebra::{UnitQuaternion, Vector3};

    fn tagged_robot(registry: &mut Registry) -> (EntityHandle, EntityHandle) {
        let node = ConfigNode::new("robot")
            .with_attribute("id", "fb0")
            .with_child(ConfigNode::new("body").with_attribute("position", "1,0,0"))
            .with_child(
                ConfigNode::new("anchor")
                    .with_attribute("id", "top")
                    .with_attribute("position", "0,0,0.2"),
            )
            .with_child(
                ConfigNode::new("tags")
                    .with_child(
                        ConfigNode::new("tag")
                            .with_attribute("anchor", "top")
                            .with_attribute("position", "0.05,0,0")
                            .with_attribute("payload", "a"),
                    )
                    .with_child(
                        ConfigNode::new("tag")
                            .with_attribute("anchor", "origin")
                            .with_attribute("position", "0,0,0")
                            .with_attribute("payload", "b")
                            .with_attribute("side_length", 0.05),
                    ),
            );
        let new = EntityFactory::default().create(&node).unwrap();
        let robot = registry.add(new, None).unwrap();
        let tags = registry.component(robot, "tags").unwrap();
        (robot, tags)
    }

    fn anchor_enabled(registry: &Registry, robot: EntityHandle, anchor: &str) -> bool {
        let body = registry.component(robot, "body").unwrap();
        registry
            .get(body)
            .and_then(|e| e.as_embodied())
            .and_then(|b| b.anchor(anchor))
            .map(|a| a.is_enabled())
            .unwrap_or(false)
    }

    #[test]
    fn test_enable_propagates_to_anchors() {
        let mut registry = Registry::new();
        let (robot, tags) = tagged_robot(&mut registry);
        assert!(!registry.get(tags).unwrap().is_enabled());
        assert!(!anchor_enabled(&registry, robot, "top"));

        registry.enable_tag_equipment(tags).unwrap();
        registry.enable_tag_equipment(tags).unwrap();
        assert!(anchor_enabled(&registry, robot, "top"));

        registry.disable_tag_equipment(tags).unwrap();
        assert!(!anchor_enabled(&registry, robot, "top"));
        assert!(anchor_enabled(&registry, robot, "origin"));
    }

    #[test]
    fn test_update_places_tags_on_anchors() {
        let mut registry = Registry::new();
        let (robot, tags) = tagged_robot(&mut registry);
        registry.enable_tag_equipment(tags).unwrap();
        let body = registry.component(robot, "body").unwrap();
        let yaw90 = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        registry
            .get_mut(body)
            .unwrap()
            .move_to(Pose::new(Vector3::new(2.0, 0.0, 0.0), yaw90));

        registry.update_tag_equipment(tags).unwrap();

        let first = registry.tag(tags, 0).unwrap();
        let second = registry.tag(tags, 1).unwrap();
        assert_relative_eq!(
            registry.get(first).unwrap().pose().unwrap().position,
            Vector3::new(2.0, 0.05, 0.2),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            registry.get(second).unwrap().pose().unwrap().position,
            Vector3::new(2.0, 0.0, 0.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_disabled_tag_keeps_its_pose() {
        let mut registry = Registry::new();
        let (_, tags) = tagged_robot(&mut registry);
        let first = registry.tag(tags, 0).unwrap();
        registry.get_mut(first).unwrap().set_enabled(false);
        registry.enable_tag_equipment(tags).unwrap();

        registry.update_tag_equipment(tags).unwrap();

        assert_relative_eq!(
            registry.get(first).unwrap().pose().unwrap().position,
            Vector3::zeros()
        );
    }

    #[test]
    fn test_payload_operations() {
        let mut registry = Registry::new();
        let (_, tags) = tagged_robot(&mut registry);
        let payload = |registry: &Registry, i| {
            let tag = registry.tag(tags, i).unwrap();
            registry.get(tag).unwrap().as_tag().unwrap().payload().to_string()
        };

        registry.set_tag_payload(tags, 1, "z").unwrap();
        assert_eq!(payload(&registry, 1), "z");

        registry.set_tag_payloads(tags, "all").unwrap();
        assert_eq!((payload(&registry, 0), payload(&registry, 1)), ("all".to_string(), "all".to_string()));

        registry
            .set_tag_payloads_from(tags, &["x".to_string(), "y".to_string()])
            .unwrap();
        assert_eq!(payload(&registry, 0), "x");

        let err = registry.set_tag_payloads_from(tags, &["only".to_string()]).unwrap_err();
        assert!(matches!(err, SpaceError::Equipment { .. }));
        assert!(matches!(registry.tag(tags, 2), Err(SpaceError::Equipment { .. })));

        registry.reset_all();
        assert_eq!(payload(&registry, 0), "a");
        assert_eq!(payload(&registry, 1), "b");
    }

    #[test]
    fn test_medium_membership_and_readings() {
        let mut registry = Registry::new();
        let (_, tags) = tagged_robot(&mut registry);

        registry.add_tag_equipment_to_medium(tags, "cameras").unwrap();
        let readings = registry.tag_readings("cameras");
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].payload, "b");
        assert_relative_eq!(readings[1].side_length, 0.05);
        assert!(registry.tag_readings("radio").is_empty());

        registry.remove_tag_equipment_from_medium(tags).unwrap();
        assert!(registry.tag_readings("cameras").is_empty());
        assert!(!registry.get(tags).unwrap().is_enabled());
        assert_eq!(registry.tag_equipments(), vec![tags]);
    }
}
