use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{BoidRule, Candidate, PRIORITY_MEDIUM, RuleContext, RuleError, require_positive};
use crate::geometry::smoothstep;
use crate::host::CastSensor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmSettings {
    /// Agents inside this distance have full influence.
    pub min_radius: f32,
    /// Agents beyond this distance have none.
    pub max_radius: f32,
    /// Extra weight of agents ahead versus behind, in `[0, 1]`.
    pub forward_asymmetry: f32,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            min_radius: 1.0,
            max_radius: 3.0,
            forward_asymmetry: 0.5,
        }
    }
}

/// Join the local swarm: head for its centre while swimming against its flow, and
/// follow its heading once aligned with it.
#[derive(Debug, Clone)]
pub struct SwarmRule {
    settings: SwarmSettings,
}

impl SwarmRule {
    pub fn new(settings: SwarmSettings) -> Result<Self, RuleError> {
        require_positive(settings.min_radius, "swarm min_radius must be positive")?;
        require_positive(
            settings.max_radius - settings.min_radius,
            "swarm max_radius must exceed min_radius",
        )?;
        if !(0.0..=1.0).contains(&settings.forward_asymmetry) {
            return Err(RuleError::InvalidConfiguration(
                "swarm forward_asymmetry must lie in [0, 1]",
            ));
        }
        Ok(Self { settings })
    }

    /// Influence of a neighbor at `offset` on an agent heading along `heading`.
    #[must_use]
    pub fn visibility(&self, offset: Vec3, heading: Vec3) -> f32 {
        let SwarmSettings {
            min_radius,
            max_radius,
            forward_asymmetry,
        } = self.settings;
        let facing = 0.5 * forward_asymmetry * offset.normalize_or_zero().dot(heading);
        let falloff = smoothstep(
            1.0,
            0.0,
            (offset.length() - min_radius) / (max_radius - min_radius),
        );
        (0.3 + 0.7 * facing) * falloff
    }
}

impl BoidRule for SwarmRule {
    fn name(&self) -> &'static str {
        "swarm"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let state = ctx.state(agent);
        let mut total = 0.0_f32;
        let mut offset_mean = Vec3::ZERO;
        let mut heading_mean = Vec3::ZERO;
        ctx.for_each_neighbor(agent, self.settings.max_radius, |_, other, _| {
            let offset = other.position - state.position;
            let weight = self.visibility(offset, state.direction);
            total += weight;
            offset_mean += offset * weight;
            heading_mean += other.direction * weight;
        });
        if total <= 0.0 {
            return Ok(None);
        }
        let offset_mean = offset_mean / total;
        let heading_mean = (heading_mean / total).normalize_or_zero();

        // 0 when swimming with the swarm, 1 when against it.
        let follow = smoothstep(1.0, 0.0, 0.5 + 0.5 * state.direction.dot(heading_mean));
        let steer = offset_mean.normalize_or_zero() * (1.0 - follow) + heading_mean * follow;
        let Some(direction) = steer.try_normalize() else {
            return Ok(None);
        };
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.max_speed * (1.0 - follow),
            priority: PRIORITY_MEDIUM,
        }))
    }
}
