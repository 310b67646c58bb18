use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_MEDIUM, RuleContext, RuleError, require_positive};
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohesionSettings {
    pub radius: f32,
}

impl Default for CohesionSettings {
    fn default() -> Self {
        Self { radius: 1.0 }
    }
}

/// Steer toward the centroid of nearby agents at full speed.
#[derive(Debug, Clone)]
pub struct CohesionRule {
    settings: CohesionSettings,
}

impl CohesionRule {
    pub fn new(settings: CohesionSettings) -> Result<Self, RuleError> {
        require_positive(settings.radius, "cohesion radius must be positive")?;
        Ok(Self { settings })
    }
}

impl BoidRule for CohesionRule {
    fn name(&self) -> &'static str {
        "cohesion"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let mut count = 0usize;
        let mut centroid = Vec3::ZERO;
        ctx.for_each_neighbor(agent, self.settings.radius, |_, other, _| {
            centroid += other.position;
            count += 1;
        });
        if count == 0 {
            return Ok(None);
        }
        let centroid = centroid / count as f32;
        let Some(direction) = (centroid - ctx.state(agent).position).try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.max_speed,
            priority: PRIORITY_MEDIUM,
        }))
    }
}
