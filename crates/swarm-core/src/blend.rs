use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::rules::{Candidate, RuleId};

/// Effective priorities at or below this value never win a highest-priority selection.
const UNSET_PRIORITY: f32 = -1.0;

/// How the candidates of one agent are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendPolicy {
    /// Take the single candidate with the greatest effective priority.
    HighestPriority,
    /// Average every candidate with weight `exp(effective priority)`.
    #[default]
    WeightedAverage,
}

/// Desired heading and speed handed to the host for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteeringTarget {
    pub direction: Vec3,
    pub speed: f32,
}

impl SteeringTarget {
    /// Desired velocity; zero when the direction is degenerate.
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.direction.normalize_or_zero() * self.speed
    }
}

/// Outcome of blending one agent's candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Blend {
    pub target: Option<SteeringTarget>,
    /// Candidate with the greatest effective weight; becomes the agent's current rule.
    pub dominant: Option<RuleId>,
}

fn effective_priority(rule: RuleId, candidate: &Candidate, current: Option<RuleId>, bias: f32) -> f32 {
    if current == Some(rule) {
        candidate.priority + bias
    } else {
        candidate.priority
    }
}

/// Combine `candidates` under `policy`.
///
/// `current` receives `bias` on top of its priority. `heading` is used when the weighted
/// directions cancel out.
#[must_use]
pub fn blend(
    policy: BlendPolicy,
    candidates: &[(RuleId, Candidate)],
    current: Option<RuleId>,
    bias: f32,
    heading: Vec3,
) -> Blend {
    match policy {
        BlendPolicy::HighestPriority => highest_priority(candidates, current, bias),
        BlendPolicy::WeightedAverage => weighted_average(candidates, current, bias, heading),
    }
}

fn highest_priority(candidates: &[(RuleId, Candidate)], current: Option<RuleId>, bias: f32) -> Blend {
    let mut best = UNSET_PRIORITY;
    let mut outcome = Blend::default();
    for (rule, candidate) in candidates {
        let priority = effective_priority(*rule, candidate, current, bias);
        if priority > best {
            best = priority;
            outcome = Blend {
                target: Some(SteeringTarget {
                    direction: candidate.direction,
                    speed: candidate.speed,
                }),
                dominant: Some(*rule),
            };
        }
    }
    outcome
}

fn weighted_average(
    candidates: &[(RuleId, Candidate)],
    current: Option<RuleId>,
    bias: f32,
    heading: Vec3,
) -> Blend {
    // Weights are shifted by the largest exponent so `exp` stays within f32 range.
    let peak = candidates
        .iter()
        .map(|(rule, candidate)| effective_priority(*rule, candidate, current, bias))
        .fold(f32::NEG_INFINITY, f32::max);
    if !peak.is_finite() {
        return Blend::default();
    }
    let mut direction = Vec3::ZERO;
    let mut speed = 0.0;
    let mut total = 0.0;
    let mut dominant = None;
    let mut dominant_weight = 0.0;
    for (rule, candidate) in candidates {
        let weight = (effective_priority(*rule, candidate, current, bias) - peak).exp();
        direction += candidate.direction * weight;
        speed += candidate.speed * weight;
        total += weight;
        if weight > dominant_weight {
            dominant_weight = weight;
            dominant = Some(*rule);
        }
    }
    if !(total > 0.0 && total.is_finite()) {
        return Blend::default();
    }
    Blend {
        target: Some(SteeringTarget {
            direction: direction.try_normalize().unwrap_or(heading),
            speed: speed / total,
        }),
        dominant,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<RuleId> {
        let mut map = SlotMap::<RuleId, ()>::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn candidate(direction: Vec3, speed: f32, priority: f32) -> Candidate {
        Candidate {
            direction,
            speed,
            priority,
        }
    }

    #[test]
    fn no_candidates_means_no_target() {
        for policy in [BlendPolicy::HighestPriority, BlendPolicy::WeightedAverage] {
            let outcome = blend(policy, &[], None, 1.0, Vec3::Z);
            assert_eq!(outcome, Blend::default());
        }
    }

    #[test]
    fn highest_priority_applies_bias_to_current_rule() {
        let rules = ids(2);
        let candidates = [
            (rules[0], candidate(Vec3::X, 1.0, 2.0)),
            (rules[1], candidate(Vec3::Y, 2.0, 2.5)),
        ];
        let plain = blend(BlendPolicy::HighestPriority, &candidates, None, 0.0, Vec3::Z);
        assert_eq!(plain.dominant, Some(rules[1]));

        let biased = blend(BlendPolicy::HighestPriority, &candidates, Some(rules[0]), 1.0, Vec3::Z);
        assert_eq!(biased.dominant, Some(rules[0]));
        assert_eq!(biased.target.map(|t| t.direction), Some(Vec3::X));
    }

    #[test]
    fn highest_priority_ignores_candidates_at_or_below_sentinel() {
        let rules = ids(1);
        let candidates = [(rules[0], candidate(Vec3::X, 1.0, -1.0))];
        let outcome = blend(BlendPolicy::HighestPriority, &candidates, None, 0.0, Vec3::Z);
        assert!(outcome.target.is_none());
    }

    #[test]
    fn weighted_average_uses_exponential_weights() {
        let rules = ids(2);
        let candidates = [
            (rules[0], candidate(Vec3::X, 2.0, 0.0)),
            (rules[1], candidate(Vec3::Y, 4.0, 1.0)),
        ];
        let outcome = blend(BlendPolicy::WeightedAverage, &candidates, None, 0.0, Vec3::Z);
        let target = outcome.target.expect("target");
        let e = 1.0f32.exp();
        let expected_dir = Vec3::new(1.0, e, 0.0).normalize();
        assert!((target.direction - expected_dir).length() < 1e-5);
        assert!((target.speed - (2.0 + 4.0 * e) / (1.0 + e)).abs() < 1e-5);
        assert_eq!(outcome.dominant, Some(rules[1]));
    }

    #[test]
    fn large_bias_still_produces_a_target() {
        let rules = ids(2);
        let candidates = [
            (rules[0], candidate(Vec3::X, 2.0, 3.0)),
            (rules[1], candidate(Vec3::Y, 6.0, 1.0)),
        ];
        let outcome = blend(BlendPolicy::WeightedAverage, &candidates, Some(rules[0]), 90.0, Vec3::Z);
        let target = outcome.target.expect("target");
        assert_eq!(outcome.dominant, Some(rules[0]));
        assert!((target.direction - Vec3::X).length() < 1e-5);
        assert!((target.speed - 2.0).abs() < 1e-5);

        let shifted = [
            (rules[0], candidate(Vec3::X, 2.0, 200.0)),
            (rules[1], candidate(Vec3::Y, 4.0, 201.0)),
        ];
        let high = blend(BlendPolicy::WeightedAverage, &shifted, None, 0.0, Vec3::Z)
            .target
            .expect("target");
        let e = 1.0f32.exp();
        assert!((high.direction - Vec3::new(1.0, e, 0.0).normalize()).length() < 1e-5);
        assert!((high.speed - (2.0 + 4.0 * e) / (1.0 + e)).abs() < 1e-4);
    }

    #[test]
    fn cancelling_directions_fall_back_to_heading() {
        let rules = ids(2);
        let candidates = [
            (rules[0], candidate(Vec3::X, 1.0, 1.0)),
            (rules[1], candidate(Vec3::NEG_X, 3.0, 1.0)),
        ];
        let target = blend(BlendPolicy::WeightedAverage, &candidates, None, 0.0, Vec3::Y)
            .target
            .expect("target");
        assert_eq!(target.direction, Vec3::Y);
        assert!((target.speed - 2.0).abs() < 1e-6);
    }

    #[test]
    fn weighted_average_is_continuous_where_selection_jumps() {
        let rules = ids(2);
        let at = |policy, priority: f32| {
            let candidates = [
                (rules[0], candidate(Vec3::X, 1.0, 2.0)),
                (rules[1], candidate(Vec3::Y, 1.0, priority)),
            ];
            blend(policy, &candidates, None, 0.0, Vec3::Z)
                .target
                .expect("target")
                .direction
        };
        let eps = 1e-3;
        let jump = (at(BlendPolicy::HighestPriority, 2.0 - eps)
            - at(BlendPolicy::HighestPriority, 2.0 + eps))
        .length();
        let drift = (at(BlendPolicy::WeightedAverage, 2.0 - eps)
            - at(BlendPolicy::WeightedAverage, 2.0 + eps))
        .length();
        assert!(jump > 1.0);
        assert!(drift < 1e-2);
    }

    #[test]
    fn velocity_is_zero_for_degenerate_direction() {
        let target = SteeringTarget {
            direction: Vec3::ZERO,
            speed: 3.0,
        };
        assert_eq!(target.velocity(), Vec3::ZERO);
    }
}
