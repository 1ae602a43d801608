//! Locus Core - Spatial State Manager for Multi-Agent Physical Simulation
//!
//! The core keeps the world's structural state consistent while a
//! simulation runs:
//! 1. **Registry**: every entity, indexed by type, ID, root and controllability
//! 2. **Binder**: which physics engine(s) house which root entities
//! 3. **Distribution**: stochastic, collision-free placement of entity copies
//! 4. **Clock**: the six-phase step that drives controllers, engines and media

pub mod binder;
pub mod distribute;
pub mod entity;
pub mod error;
pub mod factory;
pub mod generators;
pub mod registry;
pub mod space;
pub mod tags;

// Re-export key types for convenience
pub use distribute::{DistributeDirective, PlacementAttempt, PlacementState};
pub use entity::{
    orientation_from_euler_degrees, Anchor, ComposableState, ControllableState, Controller,
    EmbodiedState, Entity, EntityHandle, Pose, PositionalState, StepContext, ORIGIN_ANCHOR,
};
pub use error::SpaceError;
pub use factory::{component_id, EntityFactory, NewEntity};
pub use generators::{
    create_generator, ConstantGenerator, GaussianGenerator, GridGenerator, PlacementGenerator,
    UniformGenerator,
};
pub use registry::{match_pattern, Registry, TypeIndex};
pub use space::{ArenaBounds, LoopFunctions, NoLoopFunctions, Space, SpaceConfig, SpaceView};
pub use tags::{TagEquipment, TagInstance, TagState};
