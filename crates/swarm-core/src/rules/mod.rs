//! Pluggable steering rules and the ordered registry that owns them.

use std::any::Any;
use std::fmt;

use glam::Vec3;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use swarm_grid::{Grid, PointBins, Tree};
use swarm_index::NeighborhoodIndex;
use thiserror::Error;

use crate::Tick;
use crate::agent::BoidState;
use crate::config::FlockConfig;
use crate::host::CastSensor;

mod alignment;
mod avoid_boids;
mod avoid_obstacles;
mod circle;
mod cohesion;
mod goal;
mod keep_moving;
mod scent;
mod separation;
mod swarm;

pub use alignment::{AlignmentRule, AlignmentSettings};
pub use avoid_boids::{AvoidBoidsRule, AvoidBoidsSettings};
pub use avoid_obstacles::{AvoidObstaclesRule, AvoidObstaclesSettings};
pub use circle::{CircleRule, CircleSettings};
pub use cohesion::{CohesionRule, CohesionSettings};
pub use goal::{GoalRule, GoalSettings};
pub use keep_moving::KeepMovingRule;
pub use scent::{ScentRule, ScentSettings};
pub use separation::{SeparationRule, SeparationSettings};
pub use swarm::{SwarmRule, SwarmSettings};

pub const PRIORITY_NONE: f32 = 0.0;
pub const PRIORITY_LOW: f32 = 1.0;
pub const PRIORITY_MEDIUM: f32 = 2.0;
pub const PRIORITY_HIGH: f32 = 3.0;
pub const PRIORITY_CRITICAL: f32 = 4.0;

slotmap::new_key_type! {
    /// Stable handle of a rule inside a [`RuleSet`].
    pub struct RuleId;
}

/// Errors raised by rule construction and evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// Steering proposal of one rule for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub direction: Vec3,
    pub speed: f32,
    pub priority: f32,
}

/// Read-only view handed to [`BoidRule::prepare`].
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub tick: Tick,
    /// Step length in seconds.
    pub dt: f32,
    /// Seconds simulated before this tick.
    pub elapsed: f64,
    pub config: &'a FlockConfig,
    pub states: &'a [BoidState],
}

/// Read-only snapshot shared by every evaluation of one tick.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub tick: Tick,
    pub config: &'a FlockConfig,
    /// Agent states sorted by identity; agent indices refer into this slice.
    pub states: &'a [BoidState],
    pub index: &'a dyn NeighborhoodIndex,
    /// Distance from each occupied cell centre to its nearest agent, in cell units.
    pub nearest_distance: &'a Grid<f32>,
    /// Index of the nearest agent per occupied cell.
    pub nearest_agent: &'a Tree<u32>,
    pub bins: &'a PointBins,
}

impl fmt::Debug for RuleContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContext")
            .field("tick", &self.tick)
            .field("agents", &self.states.len())
            .field("occupied_blocks", &self.bins.block_count())
            .finish()
    }
}

impl<'a> RuleContext<'a> {
    #[must_use]
    pub fn state(&self, agent: usize) -> &'a BoidState {
        &self.states[agent]
    }

    /// Visit every other agent within `radius` of `agent`, with its squared distance.
    pub fn for_each_neighbor<F>(&self, agent: usize, radius: f32, mut visit: F)
    where
        F: FnMut(usize, &'a BoidState, f32),
    {
        let states = self.states;
        self.index
            .neighbors_within(agent, radius * radius, &mut |idx, dist_sq| {
                if let Some(state) = states.get(idx) {
                    visit(idx, state, dist_sq.into_inner());
                }
            });
    }
}

/// Steering behaviour evaluated once per agent per tick.
///
/// `evaluate` runs concurrently for many agents and must not mutate the rule; per-tick
/// bookkeeping belongs in `prepare` and `cleanup`.
pub trait BoidRule: Any + Send + Sync {
    /// Static identifier used in logs.
    fn name(&self) -> &'static str;

    /// Called once per tick before any evaluation.
    fn prepare(&mut self, _ctx: &TickContext<'_>, _rng: &mut dyn RngCore) {}

    /// Propose a target for `agent`, or `None` when the rule has no opinion.
    ///
    /// Failures should be reported as [`RuleError`]. The engine also contains a panic to
    /// the failing `(agent, rule)` pair, but the panic hook still fires.
    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError>;

    /// Called once per tick after every evaluation.
    fn cleanup(&mut self) {}
}

pub(crate) fn require_positive(value: f32, message: &'static str) -> Result<(), RuleError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RuleError::InvalidConfiguration(message))
    }
}

/// Ordered registry of rules keyed by stable handles.
#[derive(Default)]
pub struct RuleSet {
    rules: SlotMap<RuleId, Box<dyn BoidRule>>,
    order: Vec<RuleId>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(_, rule)| rule.name()))
            .finish()
    }
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, returning its handle.
    pub fn push<R: BoidRule>(&mut self, rule: R) -> RuleId {
        self.push_boxed(Box::new(rule))
    }

    pub fn push_boxed(&mut self, rule: Box<dyn BoidRule>) -> RuleId {
        let id = self.rules.insert(rule);
        self.order.push(id);
        id
    }

    /// Remove a rule; other handles stay valid.
    pub fn remove(&mut self, id: RuleId) -> Option<Box<dyn BoidRule>> {
        let rule = self.rules.remove(id)?;
        self.order.retain(|other| *other != id);
        Some(rule)
    }

    /// Move a rule to `position` in evaluation order (clamped to the end).
    pub fn reorder(&mut self, id: RuleId, position: usize) -> bool {
        let Some(current) = self.order.iter().position(|other| *other == id) else {
            return false;
        };
        self.order.remove(current);
        let position = position.min(self.order.len());
        self.order.insert(position, id);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: RuleId) -> bool {
        self.rules.contains_key(id)
    }

    /// Handles in evaluation order.
    #[must_use]
    pub fn ids(&self) -> &[RuleId] {
        &self.order
    }

    #[must_use]
    pub fn get(&self, id: RuleId) -> Option<&dyn BoidRule> {
        self.rules.get(id).map(|rule| rule.as_ref())
    }

    /// Typed access to a rule, e.g. to move a goal between ticks.
    #[must_use]
    pub fn get_as<R: BoidRule>(&self, id: RuleId) -> Option<&R> {
        let rule: &dyn Any = &**self.rules.get(id)?;
        rule.downcast_ref::<R>()
    }

    pub fn get_as_mut<R: BoidRule>(&mut self, id: RuleId) -> Option<&mut R> {
        let rule: &mut dyn Any = &mut **self.rules.get_mut(id)?;
        rule.downcast_mut::<R>()
    }

    /// Rules in evaluation order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &dyn BoidRule)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.rules.get(*id).map(|rule| (*id, rule.as_ref())))
    }

    pub(crate) fn prepare_all(&mut self, ctx: &TickContext<'_>, rng: &mut dyn RngCore) {
        for id in &self.order {
            if let Some(rule) = self.rules.get_mut(*id) {
                rule.prepare(ctx, rng);
            }
        }
    }

    pub(crate) fn cleanup_all(&mut self) {
        for id in &self.order {
            if let Some(rule) = self.rules.get_mut(*id) {
                rule.cleanup();
            }
        }
    }
}
