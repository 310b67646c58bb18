//! Contracts with the host engine: kinematic input, steering output, physics casts and the
//! per-tick cast budget.

use std::fmt;

use glam::Vec3;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::agent::{BoidId, BoidState, Kinematics};
use crate::blend::SteeringTarget;

/// Bitmask of physics layers a cast may hit.
pub type LayerMask = u32;

/// Mask matching every layer.
pub const ALL_LAYERS: LayerMask = LayerMask::MAX;

/// Supplies per-agent physical state at the start of a tick.
pub trait KinematicSource {
    /// Current snapshot of `id`, or `None` if the host has no body for it.
    fn kinematics(&self, id: BoidId) -> Option<Kinematics>;
}

/// Receives one steering target per agent per tick.
pub trait Actuator {
    fn apply(&mut self, id: BoidId, target: &SteeringTarget);
}

/// Half-line with a maximum travel distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    pub max_distance: f32,
}

/// Closest intersection reported by a cast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    /// Travel distance along the ray until contact.
    pub distance: f32,
}

/// Physics queries provided by the host. Must be callable from evaluation threads.
pub trait Raycaster: Sync {
    fn raycast(&self, ray: &Ray, layers: LayerMask) -> Option<RayHit>;

    /// Sweep a sphere of `radius` along `ray`.
    fn sphere_cast(&self, ray: &Ray, radius: f32, layers: LayerMask) -> Option<RayHit>;
}

/// Raycaster for hosts without physics; every cast misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRaycaster;

impl Raycaster for NoRaycaster {
    fn raycast(&self, _ray: &Ray, _layers: LayerMask) -> Option<RayHit> {
        None
    }

    fn sphere_cast(&self, _ray: &Ray, _radius: f32, _layers: LayerMask) -> Option<RayHit> {
        None
    }
}

/// One agent's cast access during evaluation.
///
/// When the agent holds a grant this tick every cast goes to the host and replaces the
/// cached hit; otherwise casts return the cached hit from an earlier tick.
pub struct CastSensor<'a> {
    raycaster: &'a dyn Raycaster,
    allowed: bool,
    hit: Option<RayHit>,
    casts: u32,
}

impl fmt::Debug for CastSensor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastSensor")
            .field("allowed", &self.allowed)
            .field("hit", &self.hit)
            .field("casts", &self.casts)
            .finish()
    }
}

impl<'a> CastSensor<'a> {
    #[must_use]
    pub fn new(raycaster: &'a dyn Raycaster, allowed: bool, hit: Option<RayHit>) -> Self {
        Self {
            raycaster,
            allowed,
            hit,
            casts: 0,
        }
    }

    /// Sensor seeded from an agent's persisted grant and cached hit.
    #[must_use]
    pub fn for_state(raycaster: &'a dyn Raycaster, state: &BoidState) -> Self {
        Self::new(raycaster, state.allow_raycast, state.last_hit)
    }

    #[must_use]
    pub const fn allowed(&self) -> bool {
        self.allowed
    }

    #[must_use]
    pub const fn last_hit(&self) -> Option<RayHit> {
        self.hit
    }

    /// Casts actually forwarded to the host.
    #[must_use]
    pub const fn casts(&self) -> u32 {
        self.casts
    }

    pub fn raycast(&mut self, ray: &Ray, layers: LayerMask) -> Option<RayHit> {
        if self.allowed {
            self.casts += 1;
            self.hit = self.raycaster.raycast(ray, layers);
        }
        self.hit
    }

    pub fn sphere_cast(&mut self, ray: &Ray, radius: f32, layers: LayerMask) -> Option<RayHit> {
        if self.allowed {
            self.casts += 1;
            self.hit = self.raycaster.sphere_cast(ray, radius, layers);
        }
        self.hit
    }
}

/// Strategy deciding which agents may cast this tick.
pub trait CastBudget: Send + Sync {
    /// Grant casts by setting `allow_raycast`. Flags are cleared before this is called.
    fn allot(&mut self, states: &mut [BoidState], rng: &mut dyn RngCore);
}

/// Grants `per_tick` casts to agents drawn uniformly at random, with replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformCastBudget {
    pub per_tick: usize,
}

impl UniformCastBudget {
    #[must_use]
    pub const fn new(per_tick: usize) -> Self {
        Self { per_tick }
    }
}

impl CastBudget for UniformCastBudget {
    fn allot(&mut self, states: &mut [BoidState], rng: &mut dyn RngCore) {
        if states.is_empty() {
            return;
        }
        for _ in 0..self.per_tick {
            let pick = rng.random_range(0..states.len());
            states[pick].allow_raycast = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    struct Wall;

    impl Raycaster for Wall {
        fn raycast(&self, ray: &Ray, _layers: LayerMask) -> Option<RayHit> {
            Some(RayHit {
                point: ray.origin + ray.direction,
                normal: -ray.direction,
                distance: 1.0,
            })
        }

        fn sphere_cast(&self, _ray: &Ray, _radius: f32, _layers: LayerMask) -> Option<RayHit> {
            None
        }
    }

    fn ray() -> Ray {
        Ray {
            origin: Vec3::ZERO,
            direction: Vec3::X,
            max_distance: 5.0,
        }
    }

    #[test]
    fn denied_sensor_returns_cached_hit_without_casting() {
        let cached = RayHit {
            point: Vec3::ONE,
            normal: Vec3::Y,
            distance: 2.0,
        };
        let mut sensor = CastSensor::new(&Wall, false, Some(cached));
        assert_eq!(sensor.raycast(&ray(), ALL_LAYERS), Some(cached));
        assert_eq!(sensor.sphere_cast(&ray(), 0.5, ALL_LAYERS), Some(cached));
        assert_eq!(sensor.casts(), 0);
    }

    #[test]
    fn granted_sensor_overwrites_cached_hit_even_on_miss() {
        let mut sensor = CastSensor::new(&Wall, true, None);
        let hit = sensor.raycast(&ray(), ALL_LAYERS).expect("hit");
        assert_eq!(hit.point, Vec3::X);
        assert_eq!(sensor.sphere_cast(&ray(), 0.5, ALL_LAYERS), None);
        assert_eq!(sensor.last_hit(), None);
        assert_eq!(sensor.casts(), 2);
    }

    #[test]
    fn uniform_budget_grants_at_most_per_tick() {
        let mut states: Vec<BoidState> = (0..50)
            .map(|id| BoidState::new(BoidId(id), Kinematics::default()))
            .collect();
        let mut rng = SmallRng::seed_from_u64(3);
        UniformCastBudget::new(10).allot(&mut states, &mut rng);
        let granted = states.iter().filter(|s| s.allow_raycast).count();
        assert!((1..=10).contains(&granted));

        UniformCastBudget::new(10).allot(&mut [], &mut rng);
    }
}
