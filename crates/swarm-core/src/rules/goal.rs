use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_MEDIUM, RuleContext, RuleError};
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalSettings {
    pub goal: Vec3,
    /// Distance to keep from the goal.
    pub distance: f32,
}

impl Default for GoalSettings {
    fn default() -> Self {
        Self {
            goal: Vec3::ZERO,
            distance: 1.0,
        }
    }
}

/// Approach a point while holding a fixed standoff distance.
#[derive(Debug, Clone)]
pub struct GoalRule {
    settings: GoalSettings,
}

impl GoalRule {
    pub fn new(settings: GoalSettings) -> Result<Self, RuleError> {
        if !settings.goal.is_finite() {
            return Err(RuleError::InvalidConfiguration("goal must be finite"));
        }
        if !(settings.distance.is_finite() && settings.distance >= 0.0) {
            return Err(RuleError::InvalidConfiguration(
                "goal distance must be non-negative",
            ));
        }
        Ok(Self { settings })
    }

    #[must_use]
    pub const fn goal(&self) -> Vec3 {
        self.settings.goal
    }

    /// Move the goal; takes effect on the next evaluation.
    pub fn set_goal(&mut self, goal: Vec3) {
        self.settings.goal = goal;
    }
}

impl BoidRule for GoalRule {
    fn name(&self) -> &'static str {
        "goal"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let delta = self.settings.goal - ctx.state(agent).position;
        let standoff = delta - delta.normalize_or_zero() * self.settings.distance;
        let Some(direction) = standoff.try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.min_speed,
            priority: PRIORITY_MEDIUM,
        }))
    }
}
