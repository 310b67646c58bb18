use glam::Vec3;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_MEDIUM, RuleContext, RuleError, TickContext, require_positive};
use crate::geometry::{project_on_plane, sample_unit_sphere};
use crate::host::{ALL_LAYERS, CastSensor, LayerMask, Ray};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidObstaclesSettings {
    /// How far ahead to look for obstacles.
    pub detection_distance: f32,
    pub layers: LayerMask,
    /// Seconds between redraws of the escape direction.
    pub random_dir_interval: f64,
}

impl Default for AvoidObstaclesSettings {
    fn default() -> Self {
        Self {
            detection_distance: 1.0,
            layers: ALL_LAYERS,
            random_dir_interval: 1.5,
        }
    }
}

/// Steer sideways away from obstacles found by probing along the heading.
///
/// A sphere of the separation radius is swept first, falling back to a thin ray. Agents
/// without a cast grant this tick reuse their cached hit. When the obstacle lies dead
/// ahead the shared escape direction breaks the tie.
#[derive(Debug, Clone)]
pub struct AvoidObstaclesRule {
    settings: AvoidObstaclesSettings,
    escape: Vec3,
    escape_drawn_at: Option<f64>,
}

impl AvoidObstaclesRule {
    pub fn new(settings: AvoidObstaclesSettings) -> Result<Self, RuleError> {
        require_positive(
            settings.detection_distance,
            "avoid_obstacles detection_distance must be positive",
        )?;
        if !(settings.random_dir_interval.is_finite() && settings.random_dir_interval >= 0.0) {
            return Err(RuleError::InvalidConfiguration(
                "avoid_obstacles random_dir_interval must be non-negative",
            ));
        }
        Ok(Self {
            settings,
            escape: Vec3::X,
            escape_drawn_at: None,
        })
    }

    /// Current tie-breaking escape direction.
    #[must_use]
    pub const fn escape_direction(&self) -> Vec3 {
        self.escape
    }
}

impl BoidRule for AvoidObstaclesRule {
    fn name(&self) -> &'static str {
        "avoid_obstacles"
    }

    fn prepare(&mut self, ctx: &TickContext<'_>, rng: &mut dyn RngCore) {
        let due = self
            .escape_drawn_at
            .is_none_or(|drawn| ctx.elapsed - drawn >= self.settings.random_dir_interval);
        if due {
            self.escape = sample_unit_sphere(rng);
            self.escape_drawn_at = Some(ctx.elapsed);
        }
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let state = ctx.state(agent);
        let ray = Ray {
            origin: state.position,
            direction: state.direction,
            max_distance: self.settings.detection_distance,
        };
        let radius = ctx.config.separation_distance;
        let hit = match sensor.sphere_cast(&ray, radius, self.settings.layers) {
            Some(hit) => Some(hit),
            None => sensor.raycast(&ray, self.settings.layers),
        };
        let Some(hit) = hit else {
            return Ok(None);
        };
        if hit.distance <= 0.0 {
            return Ok(None);
        }

        let away = state.position - hit.point;
        if away.length_squared() <= 0.0 {
            return Ok(None);
        }
        let steer = project_on_plane(away, state.direction)
            .try_normalize()
            .unwrap_or_else(|| project_on_plane(self.escape, state.direction).normalize_or_zero());
        let Some(direction) = steer.try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.max_speed,
            priority: PRIORITY_MEDIUM,
        }))
    }
}
