//! Canned placement and stepping scenarios.

use crate::engine::EngineSpec;
use locus_env::ConfigNode;
use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// 30 wandering robots distributed uniformly inside a walled arena
    DenseSwarm,

    /// 12 robots on a grid spanning two adjacent engines
    GridFleet,

    /// More boxes than the arena can hold: distribution must run out of trials
    Overcrowded,

    /// Static pillars in an engine overlap, movers and lights around them
    MixedEngines,
}

/// What a scenario is expected to end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// Scene loads with exactly this many roots
    Placed { roots: usize },

    /// Scene loading stops with an exhausted trial budget
    Exhausted,
}

/// Everything needed to build a space for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    /// Physics engines, in priority order
    pub engines: Vec<EngineSpec>,

    /// IDs of the tag media to create
    #[serde(default)]
    pub media: Vec<String>,

    /// Arena node: `center`/`size` attributes, entities and `distribute` children
    pub scene: ConfigNode,

    #[serde(default)]
    pub expectation: Option<Expectation>,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::DenseSwarm,
            ScenarioId::GridFleet,
            ScenarioId::Overcrowded,
            ScenarioId::MixedEngines,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::DenseSwarm => "dense_swarm",
            ScenarioId::GridFleet => "grid_fleet",
            ScenarioId::Overcrowded => "overcrowded",
            ScenarioId::MixedEngines => "mixed_engines",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::DenseSwarm => "30 tagged robots, uniform placement with retries, walled arena",
            ScenarioId::GridFleet => "4x3 grid of robots split across two adjacent engines",
            ScenarioId::Overcrowded => "40 boxes in a 1.5m square: must fail with max trials exceeded",
            ScenarioId::MixedEngines => "static pillars housed twice, movers housed once, lights unhoused",
        }
    }

    /// Builds the scene for this scenario.
    pub fn scene(&self) -> SceneFile {
        match self {
            ScenarioId::DenseSwarm => dense_swarm(),
            ScenarioId::GridFleet => grid_fleet(),
            ScenarioId::Overcrowded => overcrowded(),
            ScenarioId::MixedEngines => mixed_engines(),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dense_swarm" | "denseswarm" | "swarm" => Ok(ScenarioId::DenseSwarm),
            "grid_fleet" | "gridfleet" | "grid" => Ok(ScenarioId::GridFleet),
            "overcrowded" => Ok(ScenarioId::Overcrowded),
            "mixed_engines" | "mixedengines" | "mixed" => Ok(ScenarioId::MixedEngines),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

// ═══════════════════════════════════════════════════
// Scene building blocks
// ═══════════════════════════════════════════════════

fn arena(size: &str) -> ConfigNode {
    ConfigNode::new("arena")
        .with_attribute("center", "0,0,0")
        .with_attribute("size", size)
}

fn robot(id: &str, wander_seed: Option<u64>) -> ConfigNode {
    let mut node = ConfigNode::new("robot")
        .with_attribute("id", id)
        .with_attribute("size", "0.17,0.17,0.1")
        .with_child(ConfigNode::new("body").with_attribute("position", "0,0,0"))
        .with_child(
            ConfigNode::new("anchor")
                .with_attribute("id", "top")
                .with_attribute("position", "0,0,0.05"),
        )
        .with_child(
            ConfigNode::new("tags").with_child(
                ConfigNode::new("tag")
                    .with_attribute("anchor", "top")
                    .with_attribute("position", "0,0,0.001")
                    .with_attribute("payload", id)
                    .with_attribute("side_length", 0.08),
            ),
        );
    if let Some(seed) = wander_seed {
        node.add_child(
            ConfigNode::new("controller")
                .with_attribute("name", "wander")
                .with_attribute("speed", 0.3)
                .with_attribute("seed", seed),
        );
    }
    node
}

fn static_box(id: &str, position: &str, size: &str) -> ConfigNode {
    ConfigNode::new("box")
        .with_attribute("id", id)
        .with_attribute("size", size)
        .with_attribute("movable", false)
        .with_child(ConfigNode::new("body").with_attribute("position", position))
}

fn uniform(name: &str, min: &str, max: &str) -> ConfigNode {
    ConfigNode::new(name)
        .with_attribute("method", "uniform")
        .with_attribute("min", min)
        .with_attribute("max", max)
}

fn constant(name: &str, values: &str) -> ConfigNode {
    ConfigNode::new(name)
        .with_attribute("method", "constant")
        .with_attribute("values", values)
}

fn grid(center: &str, distances: &str, layout: &str) -> ConfigNode {
    ConfigNode::new("position")
        .with_attribute("method", "grid")
        .with_attribute("center", center)
        .with_attribute("distances", distances)
        .with_attribute("layout", layout)
}

fn distribute(position: ConfigNode, orientation: ConfigNode, quantity: u32, max_trials: u32, template: ConfigNode) -> ConfigNode {
    ConfigNode::new("distribute")
        .with_child(position)
        .with_child(orientation)
        .with_child(
            ConfigNode::new("entity")
                .with_attribute("quantity", quantity)
                .with_attribute("max_trials", max_trials)
                .with_child(template),
        )
}

fn any_yaw() -> ConfigNode {
    uniform("orientation", "0,0,0", "360,0,0")
}

fn dense_swarm() -> SceneFile {
    let scene = arena("6,6,1")
        .with_child(static_box("wall_north", "0,2.8,0", "5.6,0.1,0.5"))
        .with_child(static_box("wall_south", "0,-2.8,0", "5.6,0.1,0.5"))
        .with_child(static_box("wall_east", "2.8,0,0", "0.1,5.4,0.5"))
        .with_child(static_box("wall_west", "-2.8,0,0", "0.1,5.4,0.5"))
        .with_child(distribute(
            uniform("position", "-2.4,-2.4,0", "2.4,2.4,0"),
            any_yaw(),
            30,
            100,
            robot("fb", Some(7)),
        ));
    SceneFile {
        engines: vec![EngineSpec::new("dyn2d_0", [-3.0, -3.0, -0.5], [3.0, 3.0, 0.5])],
        media: vec!["tags".to_string()],
        scene,
        expectation: Some(Expectation::Placed { roots: 34 }),
    }
}

fn grid_fleet() -> SceneFile {
    let scene = arena("8,4,1").with_child(distribute(
        grid("0,0,0", "1,1,0", "4,3,1"),
        constant("orientation", "0,0,0"),
        12,
        0,
        robot("fleet", Some(3)),
    ));
    SceneFile {
        engines: vec![
            EngineSpec::new("west", [-4.0, -2.0, -0.5], [0.0, 2.0, 0.5]),
            EngineSpec::new("east", [0.0, -2.0, -0.5], [4.0, 2.0, 0.5]),
        ],
        media: vec!["tags".to_string()],
        scene,
        expectation: Some(Expectation::Placed { roots: 12 }),
    }
}

fn overcrowded() -> SceneFile {
    let crate_template = ConfigNode::new("box")
        .with_attribute("id", "crate")
        .with_attribute("size", "0.5,0.5,0.5");
    let scene = arena("2,2,1").with_child(distribute(
        uniform("position", "-0.75,-0.75,0", "0.75,0.75,0"),
        constant("orientation", "0,0,0"),
        40,
        20,
        crate_template,
    ));
    SceneFile {
        engines: vec![EngineSpec::new("dyn2d_0", [-1.0, -1.0, -0.5], [1.0, 1.0, 0.5])],
        media: Vec::new(),
        scene,
        expectation: Some(Expectation::Exhausted),
    }
}

fn mixed_engines() -> SceneFile {
    let pillar = ConfigNode::new("box")
        .with_attribute("id", "pillar")
        .with_attribute("size", "0.3,0.3,0.5")
        .with_attribute("movable", false);
    let lamp = ConfigNode::new("light").with_attribute("id", "lamp");
    let scene = arena("6,4,1")
        .with_child(distribute(
            grid("0,0,0", "0,1,0", "1,3,1"),
            constant("orientation", "0,0,0"),
            3,
            0,
            pillar,
        ))
        .with_child(distribute(
            uniform("position", "-2.8,-1.8,0", "-1.2,1.8,0"),
            any_yaw(),
            5,
            50,
            robot("left", Some(11)),
        ))
        .with_child(distribute(
            uniform("position", "1.2,-1.8,0", "2.8,1.8,0"),
            any_yaw(),
            5,
            50,
            robot("right", Some(13)),
        ))
        .with_child(distribute(
            constant("position", "0,0,1"),
            constant("orientation", "0,0,0"),
            3,
            0,
            lamp,
        ));
    SceneFile {
        engines: vec![
            EngineSpec::new("left", [-3.0, -2.0, -0.5], [1.0, 2.0, 0.5]),
            EngineSpec::new("right", [-1.0, -2.0, -0.5], [3.0, 2.0, 0.5]),
        ],
        media: vec!["tags".to_string()],
        scene,
        expectation: Some(Expectation::Placed { roots: 16 }),
    }
}
