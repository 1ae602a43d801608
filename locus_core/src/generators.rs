//! Random placement generators.
//!
//! A generator turns its configuration and a retry flag into a 3-D vector.
//! Only the grid keeps state between calls: its cells are handed out in
//! order and cannot be re-drawn.

use crate::error::SpaceError;
use locus_env::{ConfigNode, EnvError};
use nalgebra::Vector3;
use rand::RngCore;
use rand_distr::{Distribution, Normal, Uniform};

/// Produces positions or orientations for distribution trials.
pub trait PlacementGenerator: Send + std::fmt::Debug {
    /// Draws the next value. `retry` is true after a rejected trial.
    fn generate(&mut self, retry: bool, rng: &mut dyn RngCore) -> Result<Vector3<f64>, SpaceError>;
}

/// Always the same vector.
#[derive(Debug, Clone)]
pub struct ConstantGenerator {
    value: Vector3<f64>,
}

impl ConstantGenerator {
    pub fn new(value: Vector3<f64>) -> Self {
        Self { value }
    }
}

impl PlacementGenerator for ConstantGenerator {
    fn generate(&mut self, _retry: bool, _rng: &mut dyn RngCore) -> Result<Vector3<f64>, SpaceError> {
        Ok(self.value)
    }
}

/// Per-axis uniform draw in [min, max]; degenerate axes return max.
#[derive(Debug, Clone)]
pub struct UniformGenerator {
    min: Vector3<f64>,
    max: Vector3<f64>,
}

impl UniformGenerator {
    /// Fails unless min ≤ max on every axis and each range width is finite.
    pub fn new(min: Vector3<f64>, max: Vector3<f64>) -> Result<Self, SpaceError> {
        if !min.iter().zip(max.iter()).all(|(lo, hi)| lo <= hi) {
            return Err(SpaceError::configuration(format!(
                "Uniform generator: the min is not less than or equal to max: {:?} / {:?}",
                min.as_slice(),
                max.as_slice()
            )));
        }
        if let Some(axis) = (0..3).find(|&i| !(max[i] - min[i]).is_finite()) {
            return Err(SpaceError::configuration(format!(
                "Uniform generator: range [{}, {}] on axis {} is too wide",
                min[axis], max[axis], axis
            )));
        }
        Ok(Self { min, max })
    }
}

impl PlacementGenerator for UniformGenerator {
    fn generate(&mut self, _retry: bool, rng: &mut dyn RngCore) -> Result<Vector3<f64>, SpaceError> {
        let mut out = Vector3::zeros();
        for axis in 0..3 {
            let (lo, hi) = (self.min[axis], self.max[axis]);
            out[axis] = if hi > lo {
                Uniform::new_inclusive(lo, hi).sample(&mut *rng)
            } else {
                hi
            };
        }
        Ok(out)
    }
}

/// Per-axis normal draw.
#[derive(Debug, Clone)]
pub struct GaussianGenerator {
    axes: [Normal<f64>; 3],
}

impl GaussianGenerator {
    /// Fails on a non-finite standard deviation. Negative values are accepted.
    pub fn new(mean: Vector3<f64>, std_dev: Vector3<f64>) -> Result<Self, SpaceError> {
        let axis = |i: usize| {
            Normal::new(mean[i], std_dev[i]).map_err(|e| {
                SpaceError::configuration(format!(
                    "Gaussian generator: invalid std_dev {} on axis {}: {}",
                    std_dev[i], i, e
                ))
            })
        };
        Ok(Self {
            axes: [axis(0)?, axis(1)?, axis(2)?],
        })
    }
}

impl PlacementGenerator for GaussianGenerator {
    fn generate(&mut self, _retry: bool, rng: &mut dyn RngCore) -> Result<Vector3<f64>, SpaceError> {
        Ok(Vector3::new(
            self.axes[0].sample(&mut *rng),
            self.axes[1].sample(&mut *rng),
            self.axes[2].sample(&mut *rng),
        ))
    }
}

/// Deterministic grid layout, x fastest, then y, then z.
#[derive(Debug, Clone)]
pub struct GridGenerator {
    center: Vector3<f64>,
    distances: Vector3<f64>,
    layout: [u32; 3],
    placed: u32,
}

impl GridGenerator {
    /// Fails if any layout dimension is zero.
    pub fn new(center: Vector3<f64>, distances: Vector3<f64>, layout: [u32; 3]) -> Result<Self, SpaceError> {
        if layout.contains(&0) {
            return Err(SpaceError::configuration(
                "'layout' values (distribute position, method 'grid') must all be different than 0",
            ));
        }
        Ok(Self {
            center,
            distances,
            layout,
            placed: 0,
        })
    }

    /// Number of cells in the layout.
    pub fn capacity(&self) -> u64 {
        self.layout.iter().map(|&n| u64::from(n)).product()
    }

    /// Number of cells handed out so far.
    pub fn placed(&self) -> u32 {
        self.placed
    }

    fn cell(&self, n: u32) -> Vector3<f64> {
        let n = u64::from(n);
        let [lx, ly, _] = self.layout.map(u64::from);
        let steps = [n % lx, (n / lx) % ly, n / (lx * ly)];
        let mut out = Vector3::zeros();
        for axis in 0..3 {
            let span = f64::from(self.layout[axis] - 1) * self.distances[axis] * 0.5;
            out[axis] = self.center[axis] + span - steps[axis] as f64 * self.distances[axis];
        }
        out
    }
}

impl PlacementGenerator for GridGenerator {
    fn generate(&mut self, retry: bool, _rng: &mut dyn RngCore) -> Result<Vector3<f64>, SpaceError> {
        if retry {
            return Err(SpaceError::GridRetry {
                placed: self.placed,
            });
        }
        if u64::from(self.placed) >= self.capacity() {
            return Err(SpaceError::GridExhausted {
                capacity: self.capacity(),
            });
        }
        let cell = self.cell(self.placed);
        self.placed += 1;
        Ok(cell)
    }
}

/// Builds a generator from a `position`/`orientation` node of a distribute directive.
pub fn create_generator(node: &ConfigNode) -> Result<Box<dyn PlacementGenerator>, SpaceError> {
    let method: String = node.attribute("method")?;
    match method.as_str() {
        "uniform" => Ok(Box::new(UniformGenerator::new(
            node.vector3("min")?,
            node.vector3("max")?,
        )?)),
        "gaussian" => Ok(Box::new(GaussianGenerator::new(
            node.vector3("mean")?,
            node.vector3("std_dev")?,
        )?)),
        "constant" => Ok(Box::new(ConstantGenerator::new(node.vector3("values")?))),
        "grid" => {
            let layout: Vec<u32> = node.list("layout")?;
            let layout: [u32; 3] = layout.as_slice().try_into().map_err(|_| {
                EnvError::invalid_attribute(
                    "layout",
                    node.attribute_str("layout").unwrap_or_default(),
                    "expected 3 comma-separated values",
                )
            })?;
            Ok(Box::new(GridGenerator::new(
                node.vector3("center")?,
                node.vector3("distances")?,
                layout,
            )?))
        }
        other => Err(SpaceError::configuration(format!(
            "Unknown distribution method \"{other}\""
        ))),
    }
}
