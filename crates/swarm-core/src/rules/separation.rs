use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_HIGH, RuleContext, RuleError, require_positive};
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationSettings {
    pub radius: f32,
}

impl Default for SeparationSettings {
    fn default() -> Self {
        Self { radius: 0.5 }
    }
}

/// Push away from close neighbors, weighted by inverse squared distance.
#[derive(Debug, Clone)]
pub struct SeparationRule {
    settings: SeparationSettings,
}

impl SeparationRule {
    pub fn new(settings: SeparationSettings) -> Result<Self, RuleError> {
        require_positive(settings.radius, "separation radius must be positive")?;
        Ok(Self { settings })
    }
}

impl BoidRule for SeparationRule {
    fn name(&self) -> &'static str {
        "separation"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let position = ctx.state(agent).position;
        let mut count = 0usize;
        let mut steer = Vec3::ZERO;
        ctx.for_each_neighbor(agent, self.settings.radius, |_, other, dist_sq| {
            if dist_sq > 0.0 {
                steer += (position - other.position) / dist_sq;
                count += 1;
            }
        });
        if count == 0 {
            return Ok(None);
        }
        // Symmetric neighborhoods cancel out; there is nothing to push against.
        let Some(direction) = steer.try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.max_speed,
            priority: PRIORITY_HIGH,
        }))
    }
}
