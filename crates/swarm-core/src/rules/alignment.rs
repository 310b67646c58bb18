use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_MEDIUM, RuleContext, RuleError, require_positive};
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    /// Neighbors closer than this are matched.
    pub radius: f32,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self { radius: 1.0 }
    }
}

/// Match the mean heading and forward speed of nearby agents.
#[derive(Debug, Clone)]
pub struct AlignmentRule {
    settings: AlignmentSettings,
}

impl AlignmentRule {
    pub fn new(settings: AlignmentSettings) -> Result<Self, RuleError> {
        require_positive(settings.radius, "alignment radius must be positive")?;
        Ok(Self { settings })
    }

    #[must_use]
    pub const fn settings(&self) -> &AlignmentSettings {
        &self.settings
    }
}

impl BoidRule for AlignmentRule {
    fn name(&self) -> &'static str {
        "alignment"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let mut count = 0usize;
        let mut heading = Vec3::ZERO;
        let mut speed = 0.0;
        ctx.for_each_neighbor(agent, self.settings.radius, |_, other, _| {
            heading += other.direction;
            speed += other.forward_speed();
            count += 1;
        });
        if count == 0 {
            return Ok(None);
        }
        Ok(Some(Candidate {
            direction: heading
                .try_normalize()
                .unwrap_or(ctx.state(agent).direction),
            speed: speed / count as f32,
            priority: PRIORITY_MEDIUM,
        }))
    }
}
