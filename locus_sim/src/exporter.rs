//! JSON exporter for simulation replays.
//!
//! Captures root entity poses every few ticks so a run can be plotted or
//! diffed offline.

use locus_core::{binder, Space};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single frame of simulation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimFrame {
    /// Space clock when the frame was taken
    pub tick: u64,

    /// Poses of every root that has one
    pub entities: Vec<EntityPosition>,

    /// Tags visible in the media this tick
    #[serde(skip_serializing_if = "is_zero", default)]
    pub tag_readings: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Position of a root entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPosition {
    pub id: String,
    pub type_tag: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EntityPosition {
    pub fn new(id: &str, type_tag: &str, pos: Vector3<f64>) -> Self {
        Self {
            id: id.to_string(),
            type_tag: type_tag.to_string(),
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }
}

impl SimFrame {
    /// Takes a snapshot of the root poses in `space`.
    ///
    /// Composed roots report the pose of their first body, or of their first
    /// positional component when they have no body.
    pub fn capture(space: &Space) -> Self {
        let registry = space.registry();
        let entities = registry
            .roots()
            .iter()
            .filter_map(|&root| {
                let entity = registry.get(root)?;
                let carrier = binder::first_embodied(registry, root)
                    .or_else(|| registry.positional_of(root))?;
                let pose = registry.get(carrier)?.pose()?;
                Some(EntityPosition::new(entity.id(), entity.type_tag(), pose.position))
            })
            .collect();
        let tag_readings = space
            .media()
            .iter()
            .map(|m| registry.tag_readings(m.id()).len())
            .sum();
        Self {
            tick: space.clock(),
            entities,
            tag_readings,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Clock of the last frame
    pub ticks: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final result
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            ticks: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.ticks = frame.tick;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{actuator_board, EngineSpec, KinematicEngine};
    use locus_core::SpaceConfig;
    use locus_env::ConfigNode;

    #[test]
    fn test_capture_reports_roots_with_a_pose() {
        let scene = ConfigNode::new("arena")
            .with_attribute("size", "4,4,1")
            .with_child(
                ConfigNode::new("robot")
                    .with_attribute("id", "fb0")
                    .with_child(ConfigNode::new("body").with_attribute("position", "1,0,0")),
            )
            .with_child(
                ConfigNode::new("light")
                    .with_attribute("id", "l0")
                    .with_attribute("position", "0,0,2"),
            );
        let spec = EngineSpec::new("e0", [-2.0, -2.0, -1.0], [2.0, 2.0, 1.0]);
        let mut space = Space::new(SpaceConfig::default())
            .with_engine(Box::new(KinematicEngine::new(&spec, actuator_board())));
        space.init(&scene).unwrap();

        let frame = SimFrame::capture(&space);

        assert_eq!(frame.tick, 0);
        assert_eq!(
            frame.entities,
            vec![
                EntityPosition::new("fb0", "robot", Vector3::new(1.0, 0.0, 0.0)),
                EntityPosition::new("l0", "light", Vector3::new(0.0, 0.0, 2.0)),
            ]
        );
    }

    #[test]
    fn test_export_tracks_last_tick() {
        let mut export = SimExport::new("grid_fleet", 42);
        for tick in [10, 20] {
            export.add_frame(SimFrame {
                tick,
                entities: Vec::new(),
                tag_readings: 0,
            });
        }
        export.finalize(true, None);

        assert_eq!(export.ticks, 20);
        let json = serde_json::to_value(&export).unwrap();
        assert!(json.get("failure_reason").is_none());
        assert!(json["frames"][0].get("tag_readings").is_none());
    }
}
