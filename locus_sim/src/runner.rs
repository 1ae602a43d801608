//! Scenario runner: builds a space from a scene, steps it and checks the
//! structural guarantees at the end of the run.

use crate::controllers::register_controllers;
use crate::engine::{actuator_board, KinematicEngine};
use crate::exporter::{SimExport, SimFrame};
use crate::medium::TagMedium;
use crate::scenarios::{Expectation, SceneFile, ScenarioId};

use locus_core::{binder, EntityFactory, Space, SpaceConfig, SpaceError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a run before any check can be made.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error("Invalid scene file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Placement and controller seed
    pub seed: u64,

    /// Steps to run after loading the scene
    pub ticks: u64,

    /// Export a frame every this many ticks
    pub export_interval: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks: 200,
            export_interval: 10,
        }
    }
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario (or scene file) that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Root entities present after loading the scene
    pub placed: usize,

    /// Number of entities at the end of the run, before destroy
    pub final_entity_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Roots housed in at least one engine
    pub housed_roots: usize,

    /// Roots housed in more than one engine
    pub shared_roots: usize,

    /// Bodies colliding at the end of the run
    pub collisions: usize,

    /// Tags visible in the media on the last tick
    pub tag_readings: usize,

    /// Mean distance travelled by movable bodies
    pub mean_displacement: f64,
}

/// Loads a scene description from a JSON file.
pub fn load_scene(path: impl AsRef<Path>) -> Result<SceneFile, ScenarioError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Runs scenarios.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets the number of ticks.
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.config.ticks = ticks;
        self
    }

    /// Sets the export interval.
    pub fn with_export_interval(mut self, interval: u64) -> Self {
        self.config.export_interval = interval.max(1);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a canned scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);
        self.run_scene(scenario.name(), &scenario.scene(), None)
    }

    /// Runs a scene, recording frames into `export`.
    pub fn run_with_export(&self, name: &str, scene: &SceneFile, export: &mut SimExport) -> ScenarioResult {
        let result = self.run_scene(name, scene, Some(export));
        export.finalize(result.passed, result.failure_reason.clone());
        result
    }

    /// Runs a scene; a run that aborts with an error counts as failed.
    pub fn run_scene(&self, name: &str, scene: &SceneFile, export: Option<&mut SimExport>) -> ScenarioResult {
        match self.execute(name, scene, export) {
            Ok(result) => result,
            Err(e) => {
                warn!("Scenario {} aborted: {}", name, e);
                self.failed(name, 0, e.to_string())
            }
        }
    }

    /// Builds an empty space with one kinematic engine per spec and one tag
    /// medium per medium ID, sharing a fresh actuator board.
    pub fn build_space(&self, scene: &SceneFile) -> Space {
        let board = actuator_board();
        let mut factory = EntityFactory::with_builtins();
        register_controllers(&mut factory, &board);

        let mut space = Space::new(SpaceConfig { seed: self.config.seed }).with_factory(factory);
        for spec in &scene.engines {
            space = space.with_engine(Box::new(KinematicEngine::new(spec, Arc::clone(&board))));
        }
        for id in &scene.media {
            space = space.with_medium(Box::new(TagMedium::new(id)));
        }
        space
    }

    fn execute(
        &self,
        name: &str,
        scene: &SceneFile,
        mut export: Option<&mut SimExport>,
    ) -> Result<ScenarioResult, ScenarioError> {
        let mut space = self.build_space(scene);

        match (space.init(&scene.scene), scene.expectation) {
            (Err(e), Some(Expectation::Exhausted)) => return Ok(self.check_exhausted(name, &space, &e)),
            (Err(e), _) => return Err(e.into()),
            (Ok(()), Some(Expectation::Exhausted)) => {
                return Ok(self.failed(name, 0, "scene loaded, expected trials to run out".to_string()))
            }
            (Ok(()), _) => {}
        }

        let placed = space.registry().roots().len();
        if let Some(Expectation::Placed { roots }) = scene.expectation {
            if placed != roots {
                return Ok(self.failed(name, 0, format!("expected {roots} roots, found {placed}")));
            }
        }

        if let Some(medium) = scene.media.first() {
            for equipment in space.registry().tag_equipments() {
                space.add_tags_to_medium(equipment, medium)?;
            }
        }

        let start = movable_positions(&space);
        if let Some(export) = export.as_deref_mut() {
            export.add_frame(SimFrame::capture(&space));
        }
        for _ in 0..self.config.ticks {
            space.update()?;
            if space.clock() % self.config.export_interval.max(1) == 0 {
                if let Some(export) = export.as_deref_mut() {
                    export.add_frame(SimFrame::capture(&space));
                }
            }
        }

        let metrics = measure(&space, &start)?;
        let mut failures = housing_violations(&space)?;
        if metrics.collisions > 0 {
            failures.push(format!("{} colliding bodies", metrics.collisions));
        }
        let tags = space.entities_by_type("tag").map(|t| t.len()).unwrap_or(0);
        if !scene.media.is_empty() && metrics.tag_readings != tags {
            failures.push(format!("{} of {} tags visible", metrics.tag_readings, tags));
        }

        let final_entity_count = space.registry().len();
        let ids = space.registry().ids();
        space.reset()?;
        if space.clock() != 0 || space.registry().ids() != ids {
            failures.push("reset changed the entity set".to_string());
        }
        space.destroy()?;
        if !space.registry().is_empty() || space.engines().iter().any(|e| !e.entity_ids().is_empty()) {
            failures.push("destroy left entities behind".to_string());
        }
        let passed = failures.is_empty();
        info!(
            "{} {}: {} roots, {} shared, {} tag readings, mean displacement {:.2}m",
            if passed { "✓" } else { "✗" },
            name,
            placed,
            metrics.shared_roots,
            metrics.tag_readings,
            metrics.mean_displacement
        );

        Ok(ScenarioResult {
            scenario: name.to_string(),
            seed: self.config.seed,
            passed,
            total_ticks: self.config.ticks,
            placed,
            final_entity_count,
            failure_reason: (!passed).then(|| failures.join("; ")),
            metrics,
        })
    }

    /// The copies placed before the trial budget ran out must all be present.
    fn check_exhausted(&self, name: &str, space: &Space, error: &SpaceError) -> ScenarioResult {
        let SpaceError::MaxTrialsExceeded {
            base_id,
            placed,
            requested,
            ..
        } = error.root_cause()
        else {
            return self.failed(name, 0, format!("expected trials to run out, got: {error}"));
        };
        let present = space.entities_matching(&format!("{base_id}*")).len();
        info!(
            "{}: trials ran out after {}/{} copies ({} present)",
            name, placed, requested, present
        );
        if present != *placed as usize {
            return self.failed(name, 0, format!("{placed} copies placed but {present} present"));
        }
        ScenarioResult {
            scenario: name.to_string(),
            seed: self.config.seed,
            passed: true,
            total_ticks: 0,
            placed: present,
            final_entity_count: space.registry().len(),
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
        }
    }

    fn failed(&self, name: &str, ticks: u64, reason: String) -> ScenarioResult {
        ScenarioResult {
            scenario: name.to_string(),
            seed: self.config.seed,
            passed: false,
            total_ticks: ticks,
            placed: 0,
            final_entity_count: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

fn movable_positions(space: &Space) -> HashMap<String, Vector3<f64>> {
    let registry = space.registry();
    registry
        .roots()
        .iter()
        .filter_map(|&root| {
            let body = registry.get(binder::first_embodied(registry, root)?)?;
            let state = body.as_embodied().filter(|b| b.is_movable())?;
            Some((body.id().to_string(), state.pose().position))
        })
        .collect()
}

fn measure(space: &Space, start: &HashMap<String, Vector3<f64>>) -> Result<ScenarioMetrics, SpaceError> {
    let registry = space.registry();
    let mut metrics = ScenarioMetrics::default();
    let mut travelled = Vec::new();

    for &root in registry.roots() {
        let housing = space.housing(root).unwrap_or(&[]);
        if !housing.is_empty() {
            metrics.housed_roots += 1;
        }
        if housing.len() > 1 {
            metrics.shared_roots += 1;
        }
        let Some(body) = binder::first_embodied(registry, root) else {
            continue;
        };
        if space.is_colliding(body)? {
            metrics.collisions += 1;
        }
        let entity = registry.entity(body)?;
        if let (Some(state), Some(from)) = (entity.as_embodied(), start.get(entity.id())) {
            travelled.push((state.pose().position - from).norm());
        }
    }

    if !travelled.is_empty() {
        metrics.mean_displacement = travelled.iter().sum::<f64>() / travelled.len() as f64;
    }
    metrics.tag_readings = space
        .media()
        .iter()
        .map(|m| registry.tag_readings(m.id()).len())
        .sum();
    Ok(metrics)
}

/// Movable roots must sit in exactly one engine; static roots in every
/// engine whose domain contains them.
fn housing_violations(space: &Space) -> Result<Vec<String>, SpaceError> {
    let registry = space.registry();
    let mut violations = Vec::new();
    for &root in registry.roots() {
        let Some(body) = binder::first_embodied(registry, root) else {
            continue;
        };
        let entity = registry.entity(body)?;
        let Some(state) = entity.as_embodied() else {
            continue;
        };
        let housing = space.housing(root).unwrap_or(&[]);
        if state.is_movable() {
            if housing.len() != 1 {
                violations.push(format!("movable \"{}\" housed in {} engines", entity.id(), housing.len()));
            }
        } else {
            let containing = space
                .engines()
                .iter()
                .filter(|e| e.is_point_contained(&state.pose().position))
                .count();
            if housing.len() != containing {
                violations.push(format!(
                    "static \"{}\" housed in {} of {} containing engines",
                    entity.id(),
                    housing.len(),
                    containing
                ));
            }
        }
        debug!("\"{}\" housed in {:?}", entity.id(), housing);
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSpec;
    use locus_env::ConfigNode;

    fn runner() -> ScenarioRunner {
        ScenarioRunner::new(SimConfig::default()).with_ticks(25)
    }

    #[test]
    fn test_canned_scenarios_pass() {
        for scenario in ScenarioId::all() {
            let result = runner().run(scenario);
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
        }
    }

    #[test]
    fn test_grid_fleet_splits_across_engines() {
        let result = runner().run(ScenarioId::GridFleet);
        assert_eq!(result.placed, 12);
        assert_eq!(result.metrics.housed_roots, 12);
        assert_eq!(result.metrics.shared_roots, 0);
        assert_eq!(result.metrics.tag_readings, 12);
    }

    #[test]
    fn test_mixed_engines_shares_only_pillars() {
        let result = runner().run(ScenarioId::MixedEngines);
        assert_eq!(result.metrics.shared_roots, 3);
        // lamps are positional only
        assert_eq!(result.metrics.housed_roots, 13);
    }

    #[test]
    fn test_overcrowded_keeps_placed_copies() {
        let result = runner().run(ScenarioId::Overcrowded);
        assert!(result.passed);
        assert!(result.placed < 40);
        assert_eq!(result.final_entity_count, result.placed);
    }

    #[test]
    fn test_wrong_root_count_fails() {
        let mut scene = ScenarioId::GridFleet.scene();
        scene.expectation = Some(Expectation::Placed { roots: 5 });
        let result = runner().run_scene("grid_fleet", &scene, None);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("expected 5 roots"));
    }

    #[test]
    fn test_scene_errors_fail_the_run() {
        let scene = SceneFile {
            engines: vec![EngineSpec::new("e0", [-1.0, -1.0, -1.0], [1.0, 1.0, 1.0])],
            media: Vec::new(),
            scene: ConfigNode::new("arena")
                .with_attribute("size", "2,2,2")
                .with_child(ConfigNode::new("teapot").with_attribute("id", "t0")),
            expectation: None,
        };
        let result = runner().run_scene("teapot", &scene, None);
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("teapot"));
    }

    #[test]
    fn test_same_seed_same_frames() {
        let scene = ScenarioId::DenseSwarm.scene();
        let mut a = SimExport::new("dense_swarm", 42);
        let mut b = SimExport::new("dense_swarm", 42);

        assert!(runner().run_with_export("dense_swarm", &scene, &mut a).passed);
        assert!(runner().run_with_export("dense_swarm", &scene, &mut b).passed);

        // initial frame plus ticks 10 and 20
        assert_eq!(a.frames.len(), 3);
        assert_eq!(a.frames, b.frames);
        assert!(a.passed);

        let mut c = SimExport::new("dense_swarm", 7);
        runner().with_seed(7).run_with_export("dense_swarm", &scene, &mut c);
        assert_ne!(a.frames[0], c.frames[0]);
    }

    #[test]
    fn test_load_scene_from_json() {
        let path = std::env::temp_dir().join(format!("locus_scene_{}.json", std::process::id()));
        let json = serde_json::to_string(&ScenarioId::MixedEngines.scene()).unwrap();
        std::fs::write(&path, json).unwrap();

        let scene = load_scene(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(scene.engines.len(), 2);
        assert!(runner().run_scene("from_file", &scene, None).passed);
        assert!(matches!(load_scene("/nonexistent/scene.json"), Err(ScenarioError::Io(_))));
    }
}
