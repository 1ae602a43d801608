//! Error types for the Locus collaborator interfaces.

use thiserror::Error;

/// Errors raised across the space/collaborator seam.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A required attribute is absent from a configuration node
    #[error("Missing attribute \"{attribute}\" in node <{node}>")]
    MissingAttribute { node: String, attribute: String },
    
    /// A required child node is absent
    #[error("Missing child node <{child}> in node <{node}>")]
    MissingChild { node: String, child: String },
    
    /// An attribute value could not be parsed into the requested type
    #[error("Invalid value \"{value}\" for attribute \"{attribute}\": {reason}")]
    InvalidAttribute {
        attribute: String,
        value: String,
        reason: String,
    },
    
    /// Physics engine rejected an add/remove request
    #[error("Physics engine \"{engine}\": {reason}")]
    EngineError { engine: String, reason: String },
    
    /// Medium rejected a request
    #[error("Medium \"{medium}\": {reason}")]
    MediumError { medium: String, reason: String },
}

impl EnvError {
    /// Creates a missing attribute error.
    pub fn missing_attribute(node: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            node: node.into(),
            attribute: attribute.into(),
        }
    }
    
    /// Creates an invalid attribute error.
    pub fn invalid_attribute(
        attribute: impl Into<String>,
        value: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }
    
    /// Creates an engine error.
    pub fn engine(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineError {
            engine: engine.into(),
            reason: reason.into(),
        }
    }
}
