//! Per-tick orchestration: refresh, index, rasterise, evaluate, blend, actuate.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use glam::Vec3;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use swarm_grid::{Grid, PointBins, PointCloudConverter, Tree};
use swarm_index::{NeighborhoodIndex, UniformGridIndex};
use tracing::{debug, warn};

use crate::agent::{BoidId, BoidState, merge_population};
use crate::blend::{SteeringTarget, blend};
use crate::config::FlockConfig;
use crate::host::{Actuator, CastBudget, CastSensor, KinematicSource, RayHit, Raycaster, UniformCastBudget};
use crate::record::Recorder;
use crate::rules::{Candidate, RuleContext, RuleError, RuleId, RuleSet, TickContext};
use crate::{FlockError, Tick};

/// Summary of one processed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    pub agents: usize,
    /// Agents that received a steering target.
    pub targets: usize,
    /// `(agent, rule)` evaluations that returned an error.
    pub rule_errors: usize,
    /// Casts forwarded to the host raycaster.
    pub casts: u32,
    pub occupied_cells: usize,
    pub occupied_blocks: usize,
    /// Whether the neighbor index rebuilt cleanly; when not, no agent saw neighbors.
    pub index_ok: bool,
}

/// What one agent's evaluation produced.
struct Outcome {
    target: Option<SteeringTarget>,
    dominant: Option<RuleId>,
    hit: Option<RayHit>,
    casts: u32,
    errors: usize,
}

/// Owns the agent states, the rule set and the per-tick spatial snapshot of one flock.
pub struct FlockEngine {
    config: FlockConfig,
    rules: RuleSet,
    states: Vec<BoidState>,
    index: Box<dyn NeighborhoodIndex>,
    nearest_distance: Grid<f32>,
    nearest_agent: Tree<u32>,
    bins: PointBins,
    budget: Box<dyn CastBudget>,
    rng: SmallRng,
    tick: Tick,
    elapsed: f64,
}

impl fmt::Debug for FlockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlockEngine")
            .field("tick", &self.tick)
            .field("agents", &self.states.len())
            .field("rules", &self.rules)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

impl FlockEngine {
    /// Build an engine with the default uniform-grid index and uniform cast budget.
    pub fn new(config: FlockConfig, rules: RuleSet) -> Result<Self, FlockError> {
        config.validate()?;
        let nearest_distance = Grid::with_cell_size(config.grid_cell_size())?;
        let index = UniformGridIndex::new(config.interaction_radius);
        let budget = UniformCastBudget::new(config.cast_budget);
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            rules,
            states: Vec::new(),
            index: Box::new(index),
            nearest_distance,
            nearest_agent: Tree::new(),
            bins: PointBins::default(),
            budget: Box::new(budget),
            rng,
            tick: Tick::zero(),
            elapsed: 0.0,
        })
    }

    /// Replace the strategy that hands out cast grants.
    pub fn set_cast_budget(&mut self, budget: Box<dyn CastBudget>) {
        self.budget = budget;
    }

    /// Replace the neighbor index; it is rebuilt at the start of every tick.
    pub fn set_index(&mut self, index: Box<dyn NeighborhoodIndex>) {
        self.index = index;
    }

    /// Align the agent set with `ids`.
    ///
    /// Known identities keep their state; new ones are created from `source`, falling back
    /// to default kinematics; the rest are dropped.
    pub fn sync_population(&mut self, ids: &[BoidId], source: &dyn KinematicSource) {
        let mut ids = ids.to_vec();
        let before = self.states.len();
        let old = std::mem::take(&mut self.states);
        self.states = merge_population(old, &mut ids, |id| {
            BoidState::new(id, source.kinematics(id).unwrap_or_default())
        });
        debug!(before, after = self.states.len(), "population synced");
    }

    /// Run one tick of `dt` seconds.
    pub fn tick(
        &mut self,
        source: &dyn KinematicSource,
        actuator: &mut dyn Actuator,
        raycaster: &dyn Raycaster,
        recorder: &mut dyn Recorder,
        dt: f32,
    ) -> TickReport {
        let tick = self.tick.next();
        if let Err(err) = recorder.begin_frame(tick, self.elapsed) {
            warn!(%err, "recorder rejected frame start");
        }

        self.stage_refresh(source);
        let index_ok = self.stage_index();
        self.stage_rasterise();
        self.stage_cast_budget();
        self.stage_prepare(tick, dt);
        let outcomes = self.stage_evaluate(tick, raycaster);
        let mut report = self.stage_actuate(tick, outcomes, actuator, recorder);
        self.rules.cleanup_all();

        if let Err(err) = recorder.record_grid(&self.nearest_distance) {
            warn!(%err, "recorder rejected grid");
        }
        if let Err(err) = recorder.commit_frame() {
            warn!(%err, "recorder rejected frame commit");
        }

        report.index_ok = index_ok;
        self.tick = tick;
        self.elapsed += f64::from(dt);
        debug!(
            tick = tick.0,
            agents = report.agents,
            targets = report.targets,
            rule_errors = report.rule_errors,
            casts = report.casts,
            "tick complete"
        );
        report
    }

    fn stage_refresh(&mut self, source: &dyn KinematicSource) {
        for state in &mut self.states {
            // Agents the host lost track of keep their last known state.
            if let Some(kinematics) = source.kinematics(state.id) {
                state.refresh(&kinematics);
            }
        }
    }

    fn stage_index(&mut self) -> bool {
        let positions: Vec<Vec3> = self.states.iter().map(|state| state.position).collect();
        match self.index.rebuild(&positions) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "neighbor index rebuild failed; agents see no neighbors");
                false
            }
        }
    }

    fn stage_rasterise(&mut self) {
        let positions: Vec<Vec3> = self.states.iter().map(|state| state.position).collect();
        self.nearest_distance.clear();
        self.nearest_agent.clear();
        self.bins = PointCloudConverter::convert(
            &positions,
            &mut self.nearest_distance,
            &mut self.nearest_agent,
        );
    }

    fn stage_cast_budget(&mut self) {
        for state in &mut self.states {
            state.allow_raycast = false;
        }
        self.budget.allot(&mut self.states, &mut self.rng);
    }

    fn stage_prepare(&mut self, tick: Tick, dt: f32) {
        let ctx = TickContext {
            tick,
            dt,
            elapsed: self.elapsed,
            config: &self.config,
            states: &self.states,
        };
        self.rules.prepare_all(&ctx, &mut self.rng);
    }

    fn stage_evaluate(&self, tick: Tick, raycaster: &dyn Raycaster) -> Vec<Outcome> {
        let ctx = RuleContext {
            tick,
            config: &self.config,
            states: &self.states,
            index: &*self.index,
            nearest_distance: &self.nearest_distance,
            nearest_agent: &self.nearest_agent,
            bins: &self.bins,
        };
        let rules = &self.rules;
        let config = &self.config;
        let states = &self.states;

        (0..states.len())
            .into_par_iter()
            .map(|agent| {
                let state = &states[agent];
                let mut sensor = CastSensor::for_state(raycaster, state);
                let mut candidates: Vec<(RuleId, Candidate)> = Vec::with_capacity(rules.len());
                let mut errors = 0usize;
                for (id, rule) in rules.iter() {
                    // A panicking rule is treated like one that returned an error.
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        rule.evaluate(&ctx, agent, &mut sensor)
                    }))
                    .unwrap_or_else(|_| Err(RuleError::Evaluation("rule panicked".to_string())));
                    match result {
                        Ok(Some(candidate)) => candidates.push((id, candidate)),
                        Ok(None) => {}
                        Err(err) => {
                            errors += 1;
                            warn!(boid = state.id.0, rule = rule.name(), %err, "rule evaluation failed");
                        }
                    }
                }
                let outcome = blend(
                    config.blend,
                    &candidates,
                    state.current_rule,
                    config.current_rule_bias,
                    state.direction,
                );
                Outcome {
                    target: outcome.target,
                    dominant: outcome.dominant,
                    hit: sensor.last_hit(),
                    casts: sensor.casts(),
                    errors,
                }
            })
            .collect()
    }

    fn stage_actuate(
        &mut self,
        tick: Tick,
        outcomes: Vec<Outcome>,
        actuator: &mut dyn Actuator,
        recorder: &mut dyn Recorder,
    ) -> TickReport {
        let mut report = TickReport {
            tick,
            agents: self.states.len(),
            targets: 0,
            rule_errors: 0,
            casts: 0,
            occupied_cells: self.nearest_agent.active_count(),
            occupied_blocks: self.bins.block_count(),
            index_ok: true,
        };
        for (state, outcome) in self.states.iter_mut().zip(outcomes) {
            state.last_hit = outcome.hit;
            state.current_rule = outcome.dominant;
            report.rule_errors += outcome.errors;
            report.casts += outcome.casts;

            if let Err(err) = recorder.record_state(state) {
                warn!(boid = state.id.0, %err, "recorder rejected state");
            }
            if let Some(target) = outcome.target {
                actuator.apply(state.id, &target);
                report.targets += 1;
                if let Err(err) = recorder.record_target(state.id, &target) {
                    warn!(boid = state.id.0, %err, "recorder rejected target");
                }
            }
        }
        report
    }

    /// Agent states sorted by identity.
    #[must_use]
    pub fn states(&self) -> &[BoidState] {
        &self.states
    }

    #[must_use]
    pub fn state(&self, id: BoidId) -> Option<&BoidState> {
        self.states
            .binary_search_by_key(&id, |state| state.id)
            .ok()
            .map(|idx| &self.states[idx])
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Mutable access to the rules between ticks.
    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    #[must_use]
    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    /// Ticks processed so far.
    #[must_use]
    pub const fn tick_count(&self) -> Tick {
        self.tick
    }

    /// Simulated seconds processed so far.
    #[must_use]
    pub const fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Distance from each occupied cell centre to its nearest agent, as of the last tick.
    #[must_use]
    pub fn nearest_distance(&self) -> &Grid<f32> {
        &self.nearest_distance
    }

    /// Nearest agent index per occupied cell, as of the last tick.
    #[must_use]
    pub fn nearest_agent(&self) -> &Tree<u32> {
        &self.nearest_agent
    }

    #[must_use]
    pub fn bins(&self) -> &PointBins {
        &self.bins
    }
}

