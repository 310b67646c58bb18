use super::{BoidRule, Candidate, PRIORITY_LOW, RuleContext, RuleError};
use crate::host::CastSensor;

/// Keep the current heading at cruising speed.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepMovingRule;

impl BoidRule for KeepMovingRule {
    fn name(&self) -> &'static str {
        "keep_moving"
    }

    fn evaluate(
        &self,
        ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        let direction = ctx.state(agent).direction;
        if direction == glam::Vec3::ZERO {
            return Ok(None);
        }
        Ok(Some(Candidate {
            direction,
            speed: ctx.config.min_speed,
            priority: PRIORITY_LOW,
        }))
    }
}
