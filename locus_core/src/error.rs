//! Error types for the space manager.

use locus_env::EnvError;
use thiserror::Error;

/// Errors raised by the registry, the engine binder and the distribution engine.
#[derive(Debug, Error)]
pub enum SpaceError {
    /// Malformed or contradictory parameters (e.g. uniform min > max)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The configuration tree itself is malformed
    #[error(transparent)]
    Env(#[from] EnvError),

    /// No engine domain contains the entity's reference point
    #[error("No physics engine can house entity \"{entity}\"")]
    NoHousingEngine { entity: String },

    /// A movable entity falls inside several engine domains
    #[error(
        "Multiple engines can house \"{entity}\", but a movable entity can only be added to a single engine. Conflicting engines: {}",
        .engines.join(", ")
    )]
    AmbiguousEngine { entity: String, engines: Vec<String> },

    /// Distribution requires a geometric identity
    #[error("Cannot distribute entities that are neither positional nor embodied, and \"{type_tag}\" is neither")]
    CannotDistribute { type_tag: String },

    /// The collision-retry budget ran out
    #[error(
        "Exceeded max trials when distributing \"{type_tag}\" entities with base id \"{base_id}\": placed only {placed} of {requested}"
    )]
    MaxTrialsExceeded {
        type_tag: String,
        base_id: String,
        placed: u32,
        requested: u32,
    },

    /// Lookup of a type tag that was never registered
    #[error("Entity map for type \"{0}\" not found")]
    TypeNotFound(String),

    /// The factory has no constructor for this type tag
    #[error("Unknown entity type \"{0}\"")]
    UnknownEntityType(String),

    /// The factory has no constructor for this controller
    #[error("Unknown controller \"{0}\"")]
    UnknownController(String),

    /// No medium with this ID is attached to the space
    #[error("Unknown medium \"{0}\"")]
    UnknownMedium(String),

    /// Entity IDs are unique across the registry
    #[error("Entity \"{0}\" already exists")]
    DuplicateEntityId(String),

    /// Stale or foreign handle, or unknown ID
    #[error("Entity {0} not found")]
    EntityNotFound(String),

    /// The entity lacks a capability the operation needs
    #[error("Entity \"{entity}\" is not {capability}")]
    MissingCapability {
        entity: String,
        capability: &'static str,
    },

    /// Grid placement cannot be retried
    #[error("Impossible to place entity #{placed} in grid: grid positions cannot be retried")]
    GridRetry { placed: u32 },

    /// More grid placements requested than cells in the layout
    #[error("Grid layout holds {capacity} entities, trying to place more (check the 'quantity' attribute)")]
    GridExhausted { capacity: u64 },

    /// Equipment misuse (bad tag index, payload count mismatch)
    #[error("Equipment \"{entity}\": {reason}")]
    Equipment { entity: String, reason: String },

    /// A distribute directive failed; wraps the underlying error
    #[error("Error while trying to distribute entities ({directive}): {source}")]
    Distribution {
        directive: String,
        source: Box<SpaceError>,
    },
}

impl SpaceError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a missing capability error.
    pub fn missing(entity: impl Into<String>, capability: &'static str) -> Self {
        Self::MissingCapability {
            entity: entity.into(),
            capability,
        }
    }

    /// Returns the innermost error, skipping distribution context wrappers.
    pub fn root_cause(&self) -> &SpaceError {
        let mut current = self;
        while let SpaceError::Distribution { source, .. } = current {
            current = source.as_ref();
        }
        current
    }
}
