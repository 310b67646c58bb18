//! In-memory stand-in for a physics engine: bodies that chase their steering targets
//! under acceleration limits, and a flat floor to bump into.

use glam::{Quat, Vec3};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use swarm_core::{
    Actuator, BoidId, KinematicSource, Kinematics, LayerMask, Ray, RayHit, Raycaster,
    SteeringTarget, sample_unit_ball, sample_unit_sphere,
};

/// Limits applied when turning targets into motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodySettings {
    pub max_speed: f32,
    /// Forward acceleration limit, units per second squared.
    pub max_acceleration: f32,
    /// Braking limit, units per second squared.
    pub max_backward_acceleration: f32,
    /// Turn rate limit, degrees per second.
    pub max_turn_rate: f32,
    /// Fraction of velocity lost per second.
    pub drag: f32,
}

impl Default for BodySettings {
    fn default() -> Self {
        Self {
            max_speed: 10.0,
            max_acceleration: 0.5,
            max_backward_acceleration: 0.1,
            max_turn_rate: 180.0,
            drag: 0.1,
        }
    }
}

/// Scale `dv` so that `|v + dv|` does not exceed `max`.
///
/// Solves `|v + λ dv| = max` for the positive root and clamps `λ` to `[0, 1]`, so the
/// change never reverses and never overshoots what was asked.
#[must_use]
pub fn clamped_delta(v: Vec3, dv: Vec3, max: f32) -> Vec3 {
    if (v + dv).length_squared() <= max * max {
        return dv;
    }
    let dv_dv = dv.dot(dv);
    if dv_dv <= 0.0 {
        return dv;
    }
    let v_dv = v.dot(dv) / dv_dv;
    let discriminant = ((max * max - v.dot(v)) / dv_dv + v_dv * v_dv).max(0.0);
    let lambda = discriminant.sqrt() - v_dv;
    dv * lambda.clamp(0.0, 1.0)
}

/// Simulated bodies indexed by their [`BoidId`].
#[derive(Debug, Clone, Default)]
pub struct Bodies {
    bodies: Vec<Kinematics>,
}

impl Bodies {
    /// `count` bodies inside a ball of `radius`, each facing a random direction.
    pub fn spawn(count: usize, radius: f32, rng: &mut SmallRng) -> Self {
        let bodies = (0..count)
            .map(|_| Kinematics {
                position: sample_unit_ball(rng) * radius,
                forward: sample_unit_sphere(rng),
                ..Kinematics::default()
            })
            .collect();
        Self { bodies }
    }

    #[must_use]
    pub fn ids(&self) -> Vec<BoidId> {
        (0..self.bodies.len() as u64).map(BoidId).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Mean position and mean speed of all bodies.
    #[must_use]
    pub fn centroid_and_speed(&self) -> (Vec3, f32) {
        if self.bodies.is_empty() {
            return (Vec3::ZERO, 0.0);
        }
        let n = self.bodies.len() as f32;
        let centroid = self.bodies.iter().map(|b| b.position).sum::<Vec3>() / n;
        let speed = self.bodies.iter().map(|b| b.velocity.length()).sum::<f32>() / n;
        (centroid, speed)
    }

    /// Advance every body by `dt` toward its pending target.
    pub fn integrate(&mut self, targets: &PendingTargets, settings: &BodySettings, dt: f32) {
        for (body, target) in self.bodies.iter_mut().zip(&targets.targets) {
            if let Some(target) = target {
                steer(body, target, settings, dt);
            }
            body.velocity *= (1.0 - settings.drag * dt).max(0.0);
            body.position += body.velocity * dt;
        }
    }
}

fn steer(body: &mut Kinematics, target: &SteeringTarget, settings: &BodySettings, dt: f32) {
    let forward = body.forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return;
    }

    // Only the component along the heading is actuated.
    let wanted = clamped_delta(body.velocity, target.velocity() - body.velocity, settings.max_speed);
    let along = wanted.dot(forward).clamp(
        -settings.max_backward_acceleration * dt,
        settings.max_acceleration * dt,
    );
    body.velocity += forward * along;

    if let Some(desired) = target.direction.try_normalize() {
        let angle = forward.angle_between(desired);
        if angle > 0.0 {
            let step = (settings.max_turn_rate.to_radians() * dt / angle).min(1.0);
            let turn = Quat::IDENTITY.slerp(Quat::from_rotation_arc(forward, desired), step);
            body.forward = (turn * forward).normalize_or_zero();
        }
    }
}

impl KinematicSource for Bodies {
    fn kinematics(&self, id: BoidId) -> Option<Kinematics> {
        usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.bodies.get(idx))
            .copied()
    }
}

/// Targets emitted during one tick, applied by [`Bodies::integrate`] afterwards.
#[derive(Debug, Clone, Default)]
pub struct PendingTargets {
    targets: Vec<Option<SteeringTarget>>,
}

impl PendingTargets {
    pub fn reset(&mut self, count: usize) {
        self.targets.clear();
        self.targets.resize(count, None);
    }
}

impl Actuator for PendingTargets {
    fn apply(&mut self, id: BoidId, target: &SteeringTarget) {
        if let Some(slot) = usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.targets.get_mut(idx))
        {
            *slot = Some(*target);
        }
    }
}

/// Horizontal floor at `height`, hit from above only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Floor {
    pub height: f32,
}

impl Floor {
    fn cast(&self, ray: &Ray, lift: f32) -> Option<RayHit> {
        let clearance = ray.origin.y - (self.height + lift);
        if clearance < 0.0 {
            return Some(RayHit {
                point: Vec3::new(ray.origin.x, self.height, ray.origin.z),
                normal: Vec3::Y,
                distance: 0.0,
            });
        }
        if ray.direction.y >= 0.0 {
            return None;
        }
        let distance = clearance / -ray.direction.y;
        if distance > ray.max_distance {
            return None;
        }
        let center = ray.origin + ray.direction * distance;
        Some(RayHit {
            point: Vec3::new(center.x, self.height, center.z),
            normal: Vec3::Y,
            distance,
        })
    }
}

impl Raycaster for Floor {
    fn raycast(&self, ray: &Ray, _layers: LayerMask) -> Option<RayHit> {
        self.cast(ray, 0.0)
    }

    fn sphere_cast(&self, ray: &Ray, radius: f32, _layers: LayerMask) -> Option<RayHit> {
        self.cast(ray, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use swarm_core::ALL_LAYERS;

    #[test]
    fn clamped_delta_caps_resulting_speed() {
        let v = Vec3::new(3.0, 0.0, 0.0);
        let dv = Vec3::new(0.0, 8.0, 0.0);
        let clamped = clamped_delta(v, dv, 5.0);
        assert!(((v + clamped).length() - 5.0).abs() < 1e-4);
        assert!((clamped.normalize() - Vec3::Y).length() < 1e-6);

        let small = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(clamped_delta(v, small, 5.0), small);
    }

    #[test]
    fn clamped_delta_never_reverses() {
        let v = Vec3::new(6.0, 0.0, 0.0);
        let dv = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(clamped_delta(v, dv, 5.0), Vec3::ZERO);
    }

    #[test]
    fn acceleration_is_limited_along_heading() {
        let mut body = Kinematics {
            forward: Vec3::Z,
            ..Kinematics::default()
        };
        let target = SteeringTarget {
            direction: Vec3::Z,
            speed: 5.0,
        };
        let settings = BodySettings::default();
        steer(&mut body, &target, &settings, 0.5);
        assert!((body.velocity - Vec3::Z * 0.25).length() < 1e-6);
    }

    #[test]
    fn turning_is_rate_limited() {
        let mut body = Kinematics {
            forward: Vec3::Z,
            ..Kinematics::default()
        };
        let target = SteeringTarget {
            direction: Vec3::X,
            speed: 0.0,
        };
        let settings = BodySettings {
            max_turn_rate: 45.0,
            ..BodySettings::default()
        };
        steer(&mut body, &target, &settings, 1.0);
        assert!((body.forward.angle_between(Vec3::Z) - 45f32.to_radians()).abs() < 1e-4);
    }

    #[test]
    fn floor_is_hit_only_when_heading_down_within_range() {
        let floor = Floor { height: -5.0 };
        let down = Ray {
            origin: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            max_distance: 10.0,
        };
        let hit = floor.raycast(&down, ALL_LAYERS).expect("hit");
        assert!((hit.distance - 5.0).abs() < 1e-6);
        assert_eq!(hit.point, Vec3::new(0.0, -5.0, 0.0));

        let swept = floor.sphere_cast(&down, 1.0, ALL_LAYERS).expect("hit");
        assert!((swept.distance - 4.0).abs() < 1e-6);

        let up = Ray {
            direction: Vec3::Y,
            ..down
        };
        assert!(floor.raycast(&up, ALL_LAYERS).is_none());
        let short = Ray {
            max_distance: 1.0,
            ..down
        };
        assert!(floor.raycast(&short, ALL_LAYERS).is_none());
    }

    #[test]
    fn spawned_bodies_stay_inside_radius() {
        let mut rng = SmallRng::seed_from_u64(63948);
        let bodies = Bodies::spawn(64, 2.5, &mut rng);
        assert_eq!(bodies.len(), 64);
        assert!(bodies.bodies.iter().all(|b| b.position.length() <= 2.5 + 1e-5));
        assert!(bodies.kinematics(BoidId(63)).is_some());
        assert!(bodies.kinematics(BoidId(64)).is_none());
    }
}
