use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_HIGH, RuleContext, RuleError, require_positive};
use crate::geometry::positive_cone_distance;
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidBoidsSettings {
    /// Neighbors beyond this distance are ignored.
    pub max_radius: f32,
    /// Radius of the keep-out sphere around each neighbor.
    pub min_radius: f32,
    /// Correction passes before giving up.
    pub max_iterations: u32,
}

impl Default for AvoidBoidsSettings {
    fn default() -> Self {
        Self {
            max_radius: 1.0,
            min_radius: 0.1,
            max_iterations: 5,
        }
    }
}

/// Turn the heading out of the collision cone of every nearby agent.
///
/// Each pass sums how deep the heading reaches into each neighbor's cone and pushes it
/// back along the summed gradient; passes stop once no cone is hit. The candidate keeps
/// the current speed and scales its priority by the deepest penetration of the last
/// corrective pass.
#[derive(Debug, Clone)]
pub struct AvoidBoidsRule {
    settings: AvoidBoidsSettings,
}

impl AvoidBoidsRule {
    pub fn new(settings: AvoidBoidsSettings) -> Result<Self, RuleError> {
        require_positive(settings.min_radius, "avoid_boids min_radius must be positive")?;
        require_positive(
            settings.max_radius - settings.min_radius,
            "avoid_boids max_radius must exceed min_radius",
        )?;
        Ok(Self { settings })
    }
}

impl BoidRule for AvoidBoidsRule {
    fn name(&self) -> &'static str {
        "avoid_boids"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let state = ctx.state(agent);
        let mut offsets = Vec::new();
        ctx.for_each_neighbor(agent, self.settings.max_radius, |_, other, _| {
            offsets.push(other.position - state.position);
        });
        if offsets.is_empty() {
            return Ok(None);
        }

        let mut direction = state.direction;
        let mut weight = 0.0_f32;
        for _ in 0..self.settings.max_iterations {
            let mut depth_sum = 0.0;
            let mut depth_max = 0.0_f32;
            let mut gradient = Vec3::ZERO;
            let mut hits = 0usize;
            for offset in &offsets {
                if let Some((depth, grad)) =
                    positive_cone_distance(direction, *offset, self.settings.min_radius)
                {
                    depth_sum += depth;
                    depth_max = depth_max.max(depth);
                    gradient += grad;
                    hits += 1;
                }
            }
            if hits == 0 {
                break;
            }
            direction -= gradient * depth_sum;
            weight = depth_max;
        }

        if weight <= 0.0 {
            return Ok(None);
        }
        let Some(direction) = direction.try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: state.velocity.length(),
            priority: PRIORITY_HIGH * weight,
        }))
    }
}
