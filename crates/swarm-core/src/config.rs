use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

use crate::FlockError;
use crate::blend::BlendPolicy;

/// Static configuration shared by every agent of a flock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    /// Neighbor radius; also sizes the neighbor index cells and, doubled, the grid cells.
    pub interaction_radius: f32,
    /// Priority offset for the rule that dominated the previous blend, to damp switching.
    pub current_rule_bias: f32,
    /// How rule candidates are combined into one target.
    pub blend: BlendPolicy,
    /// Cruising speed used by low-urgency rules.
    pub min_speed: f32,
    /// Speed used by urgent rules.
    pub max_speed: f32,
    /// Distance agents try to keep from each other and from obstacles.
    pub separation_distance: f32,
    /// Number of cast grants handed out per tick.
    pub cast_budget: usize,
    /// Optional RNG seed for reproducible flocks.
    pub rng_seed: Option<u64>,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            interaction_radius: 1.0,
            current_rule_bias: 0.0,
            blend: BlendPolicy::default(),
            min_speed: 0.0,
            max_speed: 10.0,
            separation_distance: 0.5,
            cast_budget: 10,
            rng_seed: None,
        }
    }
}

impl FlockConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FlockError> {
        if !(self.interaction_radius.is_finite() && self.interaction_radius > 0.0) {
            return Err(FlockError::InvalidConfiguration(
                "interaction_radius must be positive",
            ));
        }
        if !self.current_rule_bias.is_finite() {
            return Err(FlockError::InvalidConfiguration(
                "current_rule_bias must be finite",
            ));
        }
        if !(self.min_speed.is_finite() && self.min_speed >= 0.0) {
            return Err(FlockError::InvalidConfiguration(
                "min_speed must be non-negative",
            ));
        }
        if !(self.max_speed.is_finite() && self.max_speed >= self.min_speed) {
            return Err(FlockError::InvalidConfiguration(
                "max_speed must be at least min_speed",
            ));
        }
        if !(self.separation_distance.is_finite() && self.separation_distance > 0.0) {
            return Err(FlockError::InvalidConfiguration(
                "separation_distance must be positive",
            ));
        }
        Ok(())
    }

    /// Edge length of the nearest-point grid cells.
    #[must_use]
    pub fn grid_cell_size(&self) -> f32 {
        self.interaction_radius * 2.0
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
