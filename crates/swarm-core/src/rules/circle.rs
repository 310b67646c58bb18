use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_LOW, RuleContext, RuleError, require_positive};
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleSettings {
    pub center: Vec3,
    pub radius: f32,
}

impl Default for CircleSettings {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 1.0,
        }
    }
}

/// Pull agents onto a horizontal circle around `center`.
#[derive(Debug, Clone)]
pub struct CircleRule {
    settings: CircleSettings,
}

impl CircleRule {
    pub fn new(settings: CircleSettings) -> Result<Self, RuleError> {
        require_positive(settings.radius, "circle radius must be positive")?;
        Ok(Self { settings })
    }

    /// Closest point on the circle to `position`. Points on the axis map to `+X`.
    #[must_use]
    pub fn nearest_point(&self, position: Vec3) -> Vec3 {
        let local = position - self.settings.center;
        let radial = Vec3::new(local.x, 0.0, local.z)
            .try_normalize()
            .unwrap_or(Vec3::X);
        self.settings.center + radial * self.settings.radius
    }
}

impl BoidRule for CircleRule {
    fn name(&self) -> &'static str {
        "circle"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let position = ctx.state(agent).position;
        let Some(direction) = (self.nearest_point(position) - position).try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.max_speed,
            priority: PRIORITY_LOW,
        }))
    }
}
