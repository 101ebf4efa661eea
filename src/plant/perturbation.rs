//! Sensor attack and fault models.
//!
//! - **SensorAttacker:** with probability `p`, adds a fixed bias.
//! - **FaultInjector:** with probability `p`, adds a uniform error in `[-m, m]`.
//! - **PerturbationChain:** applies several models in order.
//!
//! Each model owns its RNG so a run can be replayed from a seed.

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::plant::Perturbation;

/// Build an RNG from an optional seed; entropy otherwise.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}

pub struct SensorAttacker {
    probability: f64,
    strength: f64,
    rng: StdRng,
}

impl SensorAttacker {
    pub fn new(probability: f64, strength: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            strength,
            rng,
        }
    }
}

impl Perturbation for SensorAttacker {
    fn perturb(&mut self, true_value: f64) -> f64 {
        if self.rng.random_bool(self.probability) {
            true_value + self.strength
        } else {
            true_value
        }
    }
}

pub struct FaultInjector {
    probability: f64,
    magnitude: f64,
    rng: StdRng,
}

impl FaultInjector {
    pub fn new(probability: f64, magnitude: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            magnitude: magnitude.abs(),
            rng,
        }
    }
}

impl Perturbation for FaultInjector {
    fn perturb(&mut self, true_value: f64) -> f64 {
        if self.rng.random_bool(self.probability) {
            true_value + self.rng.random_range(-self.magnitude..=self.magnitude)
        } else {
            true_value
        }
    }
}

#[derive(Default)]
pub struct PerturbationChain {
    stages: Vec<Box<dyn Perturbation + Send>>,
}

impl PerturbationChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: impl Perturbation + Send + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Perturbation for PerturbationChain {
    fn perturb(&mut self, true_value: f64) -> f64 {
        self.stages
            .iter_mut()
            .fold(true_value, |value, stage| stage.perturb(value))
    }
}
