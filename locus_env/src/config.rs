//! Hierarchical configuration tree.
//!
//! The concrete file syntax is somebody else's problem: a [`ConfigNode`] is
//! the parsed form, a named node with string attributes and ordered
//! children. It derives serde so scenes can travel as JSON.

use crate::error::EnvError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// A node of the configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigNode {
    /// Node name (for entities, the type tag)
    pub name: String,

    /// Attribute values, unparsed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    /// Child nodes in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    /// Creates an empty node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: &str, value: impl ToString) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    /// Returns the node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw attribute string, if present.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns true if the attribute is present.
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Parses a required attribute.
    pub fn attribute<T>(&self, key: &str) -> Result<T, EnvError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self
            .attribute_str(key)
            .ok_or_else(|| EnvError::missing_attribute(&self.name, key))?;
        raw.trim()
            .parse()
            .map_err(|e| EnvError::invalid_attribute(key, raw, e))
    }

    /// Parses an optional attribute, falling back to `default` when absent.
    ///
    /// A present but malformed value is still an error.
    pub fn attribute_or<T>(&self, key: &str, default: T) -> Result<T, EnvError>
    where
        T: FromStr,
        T::Err: Display,
    {
        if self.has_attribute(key) {
            self.attribute(key)
        } else {
            Ok(default)
        }
    }

    /// Parses a comma-separated list attribute.
    pub fn list<T>(&self, key: &str) -> Result<Vec<T>, EnvError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self
            .attribute_str(key)
            .ok_or_else(|| EnvError::missing_attribute(&self.name, key))?;
        raw.split(',')
            .map(|part| {
                part.trim()
                    .parse()
                    .map_err(|e| EnvError::invalid_attribute(key, raw, e))
            })
            .collect()
    }

    /// Parses a required "x,y,z" vector attribute.
    pub fn vector3(&self, key: &str) -> Result<Vector3<f64>, EnvError> {
        let values: Vec<f64> = self.list(key)?;
        match values.as_slice() {
            [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
            _ => Err(EnvError::invalid_attribute(
                key,
                self.attribute_str(key).unwrap_or_default(),
                format!("expected 3 values, found {}", values.len()),
            )),
        }
    }

    /// Parses an optional "x,y,z" vector attribute.
    pub fn vector3_or(&self, key: &str, default: Vector3<f64>) -> Result<Vector3<f64>, EnvError> {
        if self.has_attribute(key) {
            self.vector3(key)
        } else {
            Ok(default)
        }
    }

    /// Sets (or overwrites) an attribute.
    pub fn set_attribute(&mut self, key: &str, value: impl ToString) {
        self.attributes.insert(key.to_string(), value.to_string());
    }

    /// Sets a vector attribute in the "x,y,z" form read back by [`Self::vector3`].
    pub fn set_vector3(&mut self, key: &str, value: &Vector3<f64>) {
        self.set_attribute(key, format_vector3(value));
    }

    /// Returns true if a child with the given name exists.
    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|c| c.name == name)
    }

    /// Returns the first child with the given name.
    pub fn child(&self, name: &str) -> Result<&ConfigNode, EnvError> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| EnvError::MissingChild {
                node: self.name.clone(),
                child: name.to_string(),
            })
    }

    /// Returns the first child with the given name, mutably.
    pub fn child_mut(&mut self, name: &str) -> Result<&mut ConfigNode, EnvError> {
        let node = self.name.clone();
        self.children
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or(EnvError::MissingChild {
                node,
                child: name.to_string(),
            })
    }

    /// Returns the first child with the given name, creating it if needed.
    pub fn child_or_insert(&mut self, name: &str) -> &mut ConfigNode {
        let index = match self.children.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.children.push(ConfigNode::new(name));
                self.children.len() - 1
            }
        };
        &mut self.children[index]
    }

    /// Iterates over children with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Appends a child node.
    pub fn add_child(&mut self, child: ConfigNode) {
        self.children.push(child);
    }
}

/// Formats a vector as "x,y,z".
pub fn format_vector3(value: &Vector3<f64>) -> String {
    format!("{},{},{}", value.x, value.y, value.z)
}
