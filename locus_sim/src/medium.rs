//! Tag medium: keeps the tags visible this tick and answers range queries.

use locus_env::{Medium, TagReading};
use nalgebra::Vector3;

/// Medium indexing the tags of every enabled tag equipment attached to it.
#[derive(Debug, Clone, Default)]
pub struct TagMedium {
    id: String,
    tags: Vec<TagReading>,
    updates: u64,
}

impl TagMedium {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tags: Vec::new(),
            updates: 0,
        }
    }

    /// Tags seen in the last update.
    pub fn tags(&self) -> &[TagReading] {
        &self.tags
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Tags whose center lies within `range` of `point`, nearest first.
    pub fn visible_from(&self, point: &Vector3<f64>, range: f64) -> Vec<&TagReading> {
        let mut visible: Vec<(f64, &TagReading)> = self
            .tags
            .iter()
            .map(|tag| ((tag.position - point).norm(), tag))
            .filter(|(distance, _)| *distance <= range)
            .collect();
        visible.sort_by(|a, b| a.0.total_cmp(&b.0));
        visible.into_iter().map(|(_, tag)| tag).collect()
    }
}

impl Medium for TagMedium {
    fn id(&self) -> &str {
        &self.id
    }

    fn update(&mut self, tags: &[TagReading]) {
        self.updates += 1;
        self.tags = tags.to_vec();
    }

    fn reset(&mut self) {
        self.tags.clear();
        self.updates = 0;
    }
}
