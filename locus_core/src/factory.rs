//! Entity factory keyed on type tags.
//!
//! A constructor turns a configuration node into a [`NewEntity`]: an
//! unregistered entity tree that the registry later materializes in one
//! transactional insert. Built-in types:
//!
//! | tag     | capabilities                                             |
//! |---------|----------------------------------------------------------|
//! | `box`   | embodied (`size`, `movable`)                             |
//! | `light` | positional                                               |
//! | `robot` | composable: `body`, optional `controller`, optional `tags` |

use crate::entity::{
    ControllableState, Controller, EmbodiedState, Entity, Pose,
};
use crate::error::SpaceError;
use crate::tags::{TagEquipment, TagInstance, TagState};
use locus_env::ConfigNode;
use nalgebra::Vector3;
use std::collections::HashMap;

/// An entity tree built from configuration but not yet registered.
#[derive(Debug)]
pub struct NewEntity {
    pub entity: Entity,
    pub components: Vec<(String, NewEntity)>,
}

impl NewEntity {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            components: Vec::new(),
        }
    }

    /// Attaches a named component.
    pub fn with_component(mut self, name: &str, component: NewEntity) -> Self {
        self.components.push((name.to_string(), component));
        self
    }

    /// Returns a named component.
    pub fn component(&self, name: &str) -> Option<&NewEntity> {
        self.components
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// True if the entity or its `body` component is embodied.
    pub fn is_embodied(&self) -> bool {
        self.entity.as_embodied().is_some()
            || self
                .component("body")
                .map(|c| c.entity.as_embodied().is_some())
                .unwrap_or(false)
    }

    /// True if the entity or its `position` component is positional.
    pub fn is_positional(&self) -> bool {
        self.entity.is_positional()
            || self
                .component("position")
                .map(|c| c.entity.is_positional())
                .unwrap_or(false)
    }
}

/// Builds an entity tree from its configuration node.
pub type Constructor =
    Box<dyn Fn(&EntityFactory, &ConfigNode) -> Result<NewEntity, SpaceError> + Send + Sync>;

/// Builds a controller from its configuration node.
pub type ControllerConstructor =
    Box<dyn Fn(&ConfigNode) -> Result<Box<dyn Controller>, SpaceError> + Send + Sync>;

/// Registry of constructors.
pub struct EntityFactory {
    constructors: HashMap<String, Constructor>,
    controllers: HashMap<String, ControllerConstructor>,
}

impl std::fmt::Debug for EntityFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.constructors.keys().collect();
        types.sort();
        let mut controllers: Vec<&String> = self.controllers.keys().collect();
        controllers.sort();
        f.debug_struct("EntityFactory")
            .field("types", &types)
            .field("controllers", &controllers)
            .finish()
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl EntityFactory {
    /// Creates a factory with no constructors.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            controllers: HashMap::new(),
        }
    }

    /// Creates a factory knowing `box`, `light` and `robot`.
    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register("box", Box::new(|_, node| build_box(node)));
        factory.register("light", Box::new(|_, node| build_light(node)));
        factory.register("robot", Box::new(build_robot));
        factory
    }

    /// Registers (or replaces) the constructor for a type tag.
    pub fn register(&mut self, type_tag: &str, constructor: Constructor) {
        self.constructors.insert(type_tag.to_string(), constructor);
    }

    /// Registers (or replaces) a controller constructor.
    pub fn register_controller(&mut self, name: &str, constructor: ControllerConstructor) {
        self.controllers.insert(name.to_string(), constructor);
    }

    pub fn knows(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Creates the entity tree described by `node` (type tag = node name).
    pub fn create(&self, node: &ConfigNode) -> Result<NewEntity, SpaceError> {
        let constructor = self
            .constructors
            .get(node.name())
            .ok_or_else(|| SpaceError::UnknownEntityType(node.name().to_string()))?;
        constructor(self, node)
    }

    /// Creates a controller by name.
    pub fn create_controller(&self, name: &str, node: &ConfigNode) -> Result<Box<dyn Controller>, SpaceError> {
        let constructor = self
            .controllers
            .get(name)
            .ok_or_else(|| SpaceError::UnknownController(name.to_string()))?;
        constructor(node)
    }
}

/// ID of a component: `<parent id>.<name>`.
pub fn component_id(parent_id: &str, name: &str) -> String {
    format!("{parent_id}.{name}")
}

fn build_box(node: &ConfigNode) -> Result<NewEntity, SpaceError> {
    let id: String = node.attribute("id")?;
    let pose = Pose::from_node(node.child("body")?)?;
    let size = node.vector3("size")?;
    let movable = node.attribute_or("movable", true)?;
    let body = EmbodiedState::new(pose, size, movable);
    Ok(NewEntity::new(Entity::new(id, "box").with_body(body)))
}

fn build_light(node: &ConfigNode) -> Result<NewEntity, SpaceError> {
    let id: String = node.attribute("id")?;
    let pose = match node.child("body") {
        Ok(body) => Pose::from_node(body)?,
        Err(_) => Pose::from_node(node)?,
    };
    Ok(NewEntity::new(Entity::new(id, "light").with_pose(pose)))
}

fn build_robot(factory: &EntityFactory, node: &ConfigNode) -> Result<NewEntity, SpaceError> {
    let id: String = node.attribute("id")?;
    let body_node = node.child("body")?;
    let pose = Pose::from_node(body_node)?;
    let size = node.vector3_or("size", Vector3::new(0.1, 0.1, 0.1))?;
    let mut body = EmbodiedState::new(pose, size, true);
    for anchor in node.children_named("anchor") {
        let anchor_id: String = anchor.attribute("id")?;
        let offset = Pose::from_node(anchor)?;
        body.add_anchor(&anchor_id, offset)?;
    }

    let body_id = component_id(&id, "body");
    let mut robot = NewEntity::new(Entity::new(&id, "robot").composable());

    if let Ok(controller_node) = node.child("controller") {
        let name: String = controller_node.attribute("name")?;
        let controller = factory.create_controller(&name, controller_node)?;
        let entity = Entity::new(component_id(&id, "controller"), "controller")
            .with_controller(ControllableState::new(name, controller));
        robot = robot.with_component("controller", NewEntity::new(entity));
    }

    if let Ok(tags_node) = node.child("tags") {
        let equipment = build_tag_equipment(&component_id(&id, "tags"), tags_node)?;
        if let Some(eq) = equipment.entity.as_tag_equipment() {
            for instance in eq.instances() {
                if body.anchor(&instance.anchor).is_none() {
                    return Err(SpaceError::Equipment {
                        entity: body_id,
                        reason: format!("unknown anchor \"{}\"", instance.anchor),
                    });
                }
            }
        }
        robot = robot.with_component("tags", equipment);
    }

    // Body first: components are attached in this order.
    let mut components = vec![(
        "body".to_string(),
        NewEntity::new(Entity::new(body_id, "body").with_body(body)),
    )];
    components.append(&mut robot.components);
    robot.components = components;
    Ok(robot)
}

/// Builds a tag equipment from the `tag` children of `node`.
///
/// Each `tag` needs an `anchor`; `position`/`orientation` give the offset
/// from the anchor, `payload` and `side_length` are optional.
pub fn build_tag_equipment(id: &str, node: &ConfigNode) -> Result<NewEntity, SpaceError> {
    let mut instances = Vec::new();
    let mut tags = Vec::new();
    for (i, tag_node) in node.children_named("tag").enumerate() {
        let name = format!("tag_{i}");
        let anchor: String = tag_node.attribute("anchor")?;
        let offset = Pose::from_node(tag_node)?;
        let payload: String = tag_node.attribute_or("payload", String::new())?;
        let side_length = tag_node.attribute_or("side_length", 0.1)?;
        let tag = Entity::new(component_id(id, &name), "tag")
            .with_pose(Pose::identity())
            .with_tag(TagState::new(payload, side_length));
        tags.push((name.clone(), NewEntity::new(tag)));
        instances.push(TagInstance {
            component: name,
            anchor,
            offset,
        });
    }

    let mut equipment = NewEntity::new(
        Entity::new(id, "tags").with_tag_equipment(TagEquipment::new(instances)),
    );
    equipment.components = tags;
    Ok(equipment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::StepContext;

    #[derive(Debug)]
    struct Idle;

    impl Controller for Idle {
        fn act(&mut self, _ctx: &StepContext<'_>) {}
        fn sense(&mut self, _ctx: &StepContext<'_>) {}
    }

    fn robot_node() -> ConfigNode {
        ConfigNode::new("robot")
            .with_attribute("id", "fb0")
            .with_child(
                ConfigNode::new("body")
                    .with_attribute("position", "1,2,0")
                    .with_attribute("orientation", "90,0,0"),
            )
            .with_child(
                ConfigNode::new("anchor")
                    .with_attribute("id", "top")
                    .with_attribute("position", "0,0,0.2"),
            )
            .with_child(ConfigNode::new("controller").with_attribute("name", "idle"))
            .with_child(
                ConfigNode::new("tags").with_child(
                    ConfigNode::new("tag")
                        .with_attribute("anchor", "top")
                        .with_attribute("position", "0,0,0.01")
                        .with_attribute("payload", "7"),
                ),
            )
    }

    #[test]
    fn test_box_is_embodied() {
        let node = ConfigNode::new("box")
            .with_attribute("id", "wall")
            .with_attribute("size", "1,0.1,0.5")
            .with_attribute("movable", "false")
            .with_child(ConfigNode::new("body").with_attribute("position", "0,0,0"));
        let factory = EntityFactory::default();

        let new = factory.create(&node).unwrap();
        let body = new.entity.as_embodied().unwrap();
        assert!(!body.is_movable());
        assert!(new.is_embodied());
    }

    #[test]
    fn test_light_reads_plain_attributes() {
        let node = ConfigNode::new("light")
            .with_attribute("id", "l0")
            .with_attribute("position", "0,0,1");
        let new = EntityFactory::default().create(&node).unwrap();

        assert!(new.is_positional());
        assert!(!new.is_embodied());
        assert_eq!(new.entity.pose().unwrap().position, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_robot_components() {
        let mut factory = EntityFactory::default();
        factory.register_controller("idle", Box::new(|_| Ok(Box::new(Idle) as Box<dyn Controller>)));

        let new = factory.create(&robot_node()).unwrap();

        let names: Vec<&str> = new.components.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["body", "controller", "tags"]);
        assert!(new.is_embodied());
        assert_eq!(new.component("body").unwrap().entity.id(), "fb0.body");
        let tags = new.component("tags").unwrap();
        assert_eq!(tags.components.len(), 1);
        assert_eq!(tags.components[0].1.entity.id(), "fb0.tags.tag_0");
    }

    #[test]
    fn test_unknown_type_and_controller() {
        let factory = EntityFactory::default();
        assert!(matches!(
            factory.create(&ConfigNode::new("spaceship")),
            Err(SpaceError::UnknownEntityType(t)) if t == "spaceship"
        ));
        assert!(matches!(
            factory.create(&robot_node()),
            Err(SpaceError::UnknownController(c)) if c == "idle"
        ));
    }

    #[test]
    fn test_tag_on_unknown_anchor_is_rejected() {
        let mut factory = EntityFactory::default();
        factory.register_controller("idle", Box::new(|_| Ok(Box::new(Idle) as Box<dyn Controller>)));
        let mut node = robot_node();
        node.children.retain(|c| c.name != "anchor");

        assert!(matches!(factory.create(&node), Err(SpaceError::Equipment { .. })));
    }
}
