//! Example controllers for the simulation harness.

use crate::engine::ActuatorBoard;
use locus_core::{Controller, EntityFactory, SpaceError, StepContext};
use locus_env::ConfigNode;
use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::Arc;

/// Random walk in the xy plane.
///
/// `sense` turns the heading by a normally distributed angle; `act` posts
/// the resulting velocity for the driven body on the actuator board.
#[derive(Debug)]
pub struct WanderController {
    board: ActuatorBoard,
    speed: f64,
    turn: Normal<f64>,
    seed: u64,
    rng: Option<ChaCha8Rng>,
    heading: f64,
    steps: u64,
}

impl WanderController {
    /// Reads `speed` (m/s, default 0.2), `turn_std_dev` (rad, default 0.5) and `seed`.
    pub fn from_node(node: &ConfigNode, board: ActuatorBoard) -> Result<Self, SpaceError> {
        let speed = node.attribute_or("speed", 0.2)?;
        let std_dev: f64 = node.attribute_or("turn_std_dev", 0.5)?;
        let turn = Normal::new(0.0, std_dev)
            .map_err(|e| SpaceError::configuration(format!("wander: invalid turn_std_dev {std_dev}: {e}")))?;
        Ok(Self {
            board,
            speed,
            turn,
            seed: node.attribute_or("seed", 0)?,
            rng: None,
            heading: 0.0,
            steps: 0,
        })
    }

    /// Number of completed sense passes.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.heading.cos(), self.heading.sin(), 0.0) * self.speed
    }
}

/// FNV-1a, used to give every robot its own stream from a shared seed.
fn id_hash(id: &str) -> u64 {
    id.bytes().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
    })
}

impl Controller for WanderController {
    fn act(&mut self, ctx: &StepContext<'_>) {
        let Some(body_id) = ctx.body_id else {
            return;
        };
        let velocity = self.velocity();
        let mut board = match self.board.lock() {
            Ok(board) => board,
            Err(poisoned) => poisoned.into_inner(),
        };
        board.insert(body_id.to_string(), velocity);
    }

    fn sense(&mut self, ctx: &StepContext<'_>) {
        let seed = self.seed;
        let rng = self
            .rng
            .get_or_insert_with(|| ChaCha8Rng::seed_from_u64(seed ^ id_hash(ctx.entity_id)));
        self.heading += self.turn.sample(rng);
        self.steps += 1;
    }

    fn reset(&mut self) {
        self.rng = None;
        self.heading = 0.0;
        self.steps = 0;
    }
}

/// Registers the harness controllers (`wander`) on a factory.
pub fn register_controllers(factory: &mut EntityFactory, board: &ActuatorBoard) {
    let board = Arc::clone(board);
    factory.register_controller(
        "wander",
        Box::new(move |node| {
            Ok(Box::new(WanderController::from_node(node, Arc::clone(&board))?) as Box<dyn Controller>)
        }),
    );
}
