//! Locus Simulation Harness
//!
//! Drives the Locus space the way a simulator would: concrete engines,
//! media and controllers plugged into the core, canned scenes, and a
//! runner that checks the structural guarantees after every run.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        ScenarioRunner                      │
//! │   SceneFile ──► Space::init ──► N × Space::update ──► checks│
//! │                     │                                      │
//! │   ┌─────────────────┼────────────────────┐                 │
//! │   ▼                 ▼                    ▼                 │
//! │ KinematicEngine  TagMedium        WanderController         │
//! │   ▲                                      │                 │
//! │   └────────── ActuatorBoard ◄────────────┘                 │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use locus_sim::{ScenarioRunner, SimConfig};
//! use locus_sim::scenarios::ScenarioId;
//!
//! let runner = ScenarioRunner::new(SimConfig { seed: 42, ..Default::default() });
//! let result = runner.run(ScenarioId::GridFleet);
//! assert!(result.passed);
//! ```

pub mod controllers;
pub mod engine;
pub mod exporter;
pub mod medium;
pub mod runner;
pub mod scenarios;

pub use controllers::{register_controllers, WanderController};
pub use engine::{actuator_board, ActuatorBoard, EngineSpec, KinematicEngine};
pub use exporter::{EntityPosition, SimExport, SimFrame};
pub use medium::TagMedium;
pub use runner::{load_scene, ScenarioError, ScenarioMetrics, ScenarioResult, ScenarioRunner, SimConfig};
pub use scenarios::{Expectation, SceneFile, ScenarioId};
