use glam::Vec3;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use swarm_grid::{CellCoord, Grid, ValueAccessor};
use tracing::trace;

use super::{BoidRule, Candidate, PRIORITY_LOW, RuleContext, RuleError, TickContext, require_positive};
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScentSettings {
    /// Edge length of the scent cells.
    pub cell_size: f32,
    /// Factor applied to every active cell once per tick, in `(0, 1]`.
    pub decay: f32,
    /// Cells weaker than this after decay are dropped.
    pub threshold: f32,
    /// Search reach around the agent, in cells.
    pub search_radius: u32,
}

impl Default for ScentSettings {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            decay: 0.9,
            threshold: 0.01,
            search_radius: 2,
        }
    }
}

/// Follow the strongest trail in a decaying scalar field that external code deposits into.
#[derive(Debug, Clone)]
pub struct ScentRule {
    settings: ScentSettings,
    field: Grid<f32>,
}

impl ScentRule {
    pub fn new(settings: ScentSettings) -> Result<Self, RuleError> {
        require_positive(settings.cell_size, "scent cell_size must be positive")?;
        if !(settings.decay > 0.0 && settings.decay <= 1.0) {
            return Err(RuleError::InvalidConfiguration(
                "scent decay must lie in (0, 1]",
            ));
        }
        if !(settings.threshold.is_finite() && settings.threshold >= 0.0) {
            return Err(RuleError::InvalidConfiguration(
                "scent threshold must be non-negative",
            ));
        }
        let field = Grid::with_cell_size(settings.cell_size)
            .map_err(|_| RuleError::InvalidConfiguration("scent cell_size must be positive"))?;
        Ok(Self { settings, field })
    }

    /// Add `amount` to the cell containing `point`, activating it.
    pub fn deposit(&mut self, point: Vec3, amount: f32) {
        let cell = self.field.cell_at(point);
        let tree = self.field.tree_mut();
        // Inactive cells may hold a decayed residue; start from zero.
        let (current, active) = tree.get(cell);
        tree.set(cell, if active { current + amount } else { amount });
    }

    #[must_use]
    pub const fn field(&self) -> &Grid<f32> {
        &self.field
    }

    /// Strongest active cell within the search reach of `position`.
    #[must_use]
    pub fn strongest_near(&self, position: Vec3) -> Option<(CellCoord, f32)> {
        let reach = self.settings.search_radius as i32;
        let center = self.field.cell_at(position);
        let field = self.field.read_accessor();
        let mut best: Option<(CellCoord, f32)> = None;
        for k in -reach..=reach {
            for j in -reach..=reach {
                for i in -reach..=reach {
                    let cell = center + CellCoord::new(i, j, k);
                    let (value, active) = field.get(cell);
                    if active && best.is_none_or(|(_, strongest)| value > strongest) {
                        best = Some((cell, value));
                    }
                }
            }
        }
        best
    }
}

impl BoidRule for ScentRule {
    fn name(&self) -> &'static str {
        "scent"
    }

    fn prepare(&mut self, _ctx: &TickContext<'_>, _rng: &mut dyn RngCore) {
        let ScentSettings {
            decay, threshold, ..
        } = self.settings;
        self.field.tree_mut().update_active(|_, value| {
            *value *= decay;
            *value >= threshold
        });
        let pruned = self.field.tree_mut().prune_empty_blocks();
        trace!(
            active = self.field.tree().active_count(),
            pruned, "scent field decayed"
        );
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let position = ctx.state(agent).position;
        let Some((cell, _)) = self.strongest_near(position) else {
            return Ok(None);
        };
        let Some(direction) = (self.field.cell_center(cell) - position).try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.min_speed,
            priority: PRIORITY_LOW,
        }))
    }
}
