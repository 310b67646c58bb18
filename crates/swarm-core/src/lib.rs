//! Boid flocking core: per-agent state, pluggable steering rules, target blending and the
//! per-tick engine that ties them to the host.
//!
//! A tick refreshes every [`BoidState`] from the host's [`KinematicSource`], rebuilds the
//! neighbor index and the nearest-point grid, evaluates every rule for every agent in
//! parallel, blends the candidates into one [`SteeringTarget`] per agent, and hands the
//! targets to the host's [`Actuator`].

mod agent;
mod blend;
mod config;
mod engine;
mod geometry;
mod host;
mod record;
pub mod rules;

use serde::{Deserialize, Serialize};
use swarm_grid::GridError;
use swarm_index::IndexError;
use thiserror::Error;

pub use agent::{BoidId, BoidState, Kinematics, merge_population, wrap_roll_degrees};
pub use blend::{Blend, BlendPolicy, SteeringTarget, blend};
pub use config::FlockConfig;
pub use engine::{FlockEngine, TickReport};
pub use geometry::{
    positive_cone_distance, project_on_plane, sample_unit_ball, sample_unit_sphere, smoothstep,
};
pub use host::{
    ALL_LAYERS, Actuator, CastBudget, CastSensor, KinematicSource, LayerMask, NoRaycaster, Ray,
    RayHit, Raycaster, UniformCastBudget,
};
pub use record::{BoidSample, GridSample, Keyframe, MemoryRecorder, NullRecorder, RecordError, Recorder};
pub use rules::{BoidRule, Candidate, RuleContext, RuleError, RuleId, RuleSet, TickContext};

/// Flock clock (ticks processed since the engine was created).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors that can occur when constructing or configuring a flock.
#[derive(Debug, Error)]
pub enum FlockError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Index(#[from] IndexError),
}
