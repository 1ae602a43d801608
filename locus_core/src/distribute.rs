//! Rejection-sampling placement of entity copies.
//!
//! Each copy walks a small state machine:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            ▼                              │ retry
//!       Building ──► Checking ──► Rejected ─┘
//!                        │            │
//!                        ▼            ▼ trials > max_trials
//!                    Accepted     Exhausted
//! ```
//!
//! A placement counts as rejected when its body collides in any engine that
//! houses it. Positional entities without a body are accepted as drawn.

use crate::binder;
use crate::entity::EntityHandle;
use crate::error::SpaceError;
use crate::factory::NewEntity;
use crate::generators::{create_generator, PlacementGenerator};
use crate::space::Space;
use locus_env::ConfigNode;
use tracing::{debug, info};

/// A parsed `distribute` directive.
#[derive(Debug, Clone)]
pub struct DistributeDirective {
    pub position: ConfigNode,
    pub orientation: ConfigNode,
    pub quantity: u32,
    pub max_trials: u32,
    pub base_num: u64,
    /// First child of the `entity` node; its `id` is the base ID
    pub template: ConfigNode,
    pub base_id: String,
}

impl DistributeDirective {
    pub fn from_node(node: &ConfigNode) -> Result<Self, SpaceError> {
        let position = node.child("position")?.clone();
        let orientation = node.child("orientation")?.clone();
        let entity = node.child("entity")?;
        let quantity = entity.attribute("quantity")?;
        let max_trials = entity.attribute("max_trials")?;
        let base_num = entity.attribute_or("base_num", 0)?;
        let template = entity
            .children
            .first()
            .cloned()
            .ok_or_else(|| SpaceError::configuration("No entity to distribute specified"))?;
        let base_id = template.attribute("id")?;
        Ok(Self {
            position,
            orientation,
            quantity,
            max_trials,
            base_num,
            template,
            base_id,
        })
    }

    /// Type tag of the distributed entities.
    pub fn type_tag(&self) -> &str {
        self.template.name()
    }

    /// ID of the `i`-th copy. Fails when `base_num + i` does not fit in a u64.
    pub fn copy_id(&self, i: u32) -> Result<String, SpaceError> {
        let num = self.base_num.checked_add(u64::from(i)).ok_or_else(|| {
            SpaceError::configuration(format!(
                "'base_num' {} is too large to number copy #{}",
                self.base_num, i
            ))
        })?;
        Ok(format!("{}{}", self.base_id, num))
    }

    fn describe(&self) -> String {
        format!(
            "{} x \"{}\" with base id \"{}\"",
            self.quantity,
            self.type_tag(),
            self.base_id
        )
    }
}

/// Where a single copy is in its placement.
#[derive(Debug)]
pub enum PlacementState {
    /// Drawing a pose and building the entity
    Building,
    /// Built, not yet registered
    Checking(NewEntity),
    /// Registered and collision-free
    Accepted(EntityHandle),
    /// Registered but colliding; must be removed
    Rejected(EntityHandle),
    /// Out of trials
    Exhausted,
}

/// Trial bookkeeping for one copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlacementAttempt {
    pub trials: u32,
    pub retry: bool,
}

impl PlacementAttempt {
    /// Records a rejection. Returns false once the trial budget is spent.
    pub fn reject(&mut self, max_trials: u32) -> bool {
        self.trials += 1;
        self.retry = true;
        self.trials <= max_trials
    }
}

struct Distributor {
    directive: DistributeDirective,
    position: Box<dyn PlacementGenerator>,
    orientation: Box<dyn PlacementGenerator>,
}

impl Distributor {
    fn new(directive: DistributeDirective) -> Result<Self, SpaceError> {
        let position = create_generator(&directive.position)?;
        let orientation = create_generator(&directive.orientation)?;
        Ok(Self {
            directive,
            position,
            orientation,
        })
    }

    /// Draws a pose into the copy's `body` node and builds the entity.
    fn build(&mut self, space: &mut Space, tree: &mut ConfigNode, retry: bool) -> Result<NewEntity, SpaceError> {
        let position = self.position.generate(retry, &mut space.rng)?;
        let orientation = self.orientation.generate(retry, &mut space.rng)?;
        let body = tree.child_or_insert("body");
        body.set_vector3("position", &position);
        body.set_vector3("orientation", &orientation);
        space.factory.create(tree)
    }

    /// Registers the copy and decides whether it stays.
    fn check(&self, space: &mut Space, new: NewEntity) -> Result<PlacementState, SpaceError> {
        if !new.is_embodied() {
            if !new.is_positional() {
                return Err(SpaceError::CannotDistribute {
                    type_tag: self.directive.type_tag().to_string(),
                });
            }
            return Ok(PlacementState::Accepted(space.add_entity(new)?));
        }

        let handle = space.add_entity(new)?;
        let colliding = match binder::first_embodied(&space.registry, handle) {
            Some(body) => space.is_colliding(body)?,
            None => false,
        };
        if colliding {
            Ok(PlacementState::Rejected(handle))
        } else {
            Ok(PlacementState::Accepted(handle))
        }
    }

    fn place(&mut self, space: &mut Space, index: u32) -> Result<EntityHandle, SpaceError> {
        let mut tree = self.directive.template.clone();
        let id = self.directive.copy_id(index)?;
        tree.set_attribute("id", &id);

        let mut attempt = PlacementAttempt::default();
        let mut state = PlacementState::Building;
        loop {
            state = match state {
                PlacementState::Building => {
                    PlacementState::Checking(self.build(space, &mut tree, attempt.retry)?)
                }
                PlacementState::Checking(new) => self.check(space, new)?,
                PlacementState::Rejected(handle) => {
                    space.remove_entity(handle)?;
                    if attempt.reject(self.directive.max_trials) {
                        debug!("\"{}\" collides, trial {}", id, attempt.trials);
                        PlacementState::Building
                    } else {
                        PlacementState::Exhausted
                    }
                }
                PlacementState::Accepted(handle) => return Ok(handle),
                PlacementState::Exhausted => {
                    return Err(SpaceError::MaxTrialsExceeded {
                        type_tag: self.directive.type_tag().to_string(),
                        base_id: self.directive.base_id.clone(),
                        placed: index,
                        requested: self.directive.quantity,
                    })
                }
            };
        }
    }
}

impl Space {
    /// Runs a `distribute` directive: places `quantity` copies of the template.
    ///
    /// Copies placed before a failure stay in the space; the failing copy
    /// never does. Errors carry the directive as context.
    pub fn distribute(&mut self, node: &ConfigNode) -> Result<Vec<EntityHandle>, SpaceError> {
        let directive = DistributeDirective::from_node(node).map_err(|e| SpaceError::Distribution {
            directive: node.name().to_string(),
            source: Box::new(e),
        })?;
        let context = directive.describe();
        self.run_distribution(directive).map_err(|e| SpaceError::Distribution {
            directive: context,
            source: Box::new(e),
        })
    }

    fn run_distribution(&mut self, directive: DistributeDirective) -> Result<Vec<EntityHandle>, SpaceError> {
        let quantity = directive.quantity;
        let mut distributor = Distributor::new(directive)?;
        let mut placed = Vec::with_capacity(quantity as usize);
        for i in 0..quantity {
            placed.push(distributor.place(self, i)?);
        }
        info!(
            "Distributed {} \"{}\" entities (base id \"{}\")",
            placed.len(),
            distributor.directive.type_tag(),
            distributor.directive.base_id
        );
        Ok(placed)
    }
}
