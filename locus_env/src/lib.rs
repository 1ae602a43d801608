//! Locus Environment Abstraction Layer
//!
//! This crate defines the seam between the Locus space manager and the
//! collaborators it drives but does not implement:
//!
//! - **Physics engines**: spatial containment, root add/remove, collision test
//! - **Media**: per-tick update
//! - **Configuration**: the parsed scene tree
//!
//! The space owns its collaborators as trait objects and is their only
//! writer.
//!
//! # Example
//!
//! ```ignore
//! use locus_env::{ConfigNode, PhysicsEngine};
//!
//! fn housing<'a>(engines: &'a [Box<dyn PhysicsEngine>], p: &Vector3<f64>) -> Vec<&'a str> {
//!     engines
//!         .iter()
//!         .filter(|e| e.is_point_contained(p))
//!         .map(|e| e.id())
//!         .collect()
//! }
//! ```

mod config;
mod error;
mod medium;
mod physics;
mod types;

pub use config::{format_vector3, ConfigNode};
pub use error::EnvError;
pub use medium::Medium;
pub use physics::PhysicsEngine;
pub use types::{BodyDescriptor, BodyPose, EngineEntity, TagReading};
