use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::host::RayHit;
use crate::rules::RuleId;

/// Stable identity of one agent, assigned by the host.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BoidId(pub u64);

/// Physical snapshot of one agent as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Facing direction; need not be normalized.
    pub forward: Vec3,
    /// Roll around the forward axis in degrees, any range.
    pub roll: f32,
    pub angular_velocity: Vec3,
}

impl Default for Kinematics {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forward: Vec3::Z,
            roll: 0.0,
            angular_velocity: Vec3::ZERO,
        }
    }
}

/// Wrap an angle in degrees into `(-180, 180]`.
#[must_use]
pub fn wrap_roll_degrees(degrees: f32) -> f32 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { 180.0 } else { wrapped }
}

/// Per-agent state persisted across ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoidState {
    pub id: BoidId,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Unit facing direction.
    pub direction: Vec3,
    /// Degrees in `(-180, 180]`.
    pub roll: f32,
    pub angular_velocity: Vec3,
    /// Whether the agent may issue a fresh cast this tick.
    pub allow_raycast: bool,
    /// Result of the most recent cast, reused while casts are not allowed.
    pub last_hit: Option<RayHit>,
    /// Rule whose candidate dominated the previous blend.
    #[serde(skip)]
    pub current_rule: Option<RuleId>,
}

impl BoidState {
    /// Fresh state for `id` built from a host snapshot.
    #[must_use]
    pub fn new(id: BoidId, kinematics: Kinematics) -> Self {
        let mut state = Self {
            id,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::Z,
            roll: 0.0,
            angular_velocity: Vec3::ZERO,
            allow_raycast: false,
            last_hit: None,
            current_rule: None,
        };
        state.refresh(&kinematics);
        state
    }

    /// Copy the physical snapshot into the state. A zero forward vector keeps the previous
    /// direction.
    pub fn refresh(&mut self, kinematics: &Kinematics) {
        self.position = kinematics.position;
        self.velocity = kinematics.velocity;
        if let Some(direction) = kinematics.forward.try_normalize() {
            self.direction = direction;
        }
        self.roll = wrap_roll_degrees(kinematics.roll);
        self.angular_velocity = kinematics.angular_velocity;
    }

    /// Speed along the facing direction.
    #[must_use]
    pub fn forward_speed(&self) -> f32 {
        self.velocity.dot(self.direction)
    }
}

/// Merge a new identity set into a state sequence sorted by identity.
///
/// `ids` is sorted and deduplicated in place. Surviving identities keep their state,
/// new identities are created through `spawn`, and identities missing from `ids` are
/// dropped. Runs in `O(old + new)` after the sort.
pub fn merge_population<F>(old: Vec<BoidState>, ids: &mut Vec<BoidId>, mut spawn: F) -> Vec<BoidState>
where
    F: FnMut(BoidId) -> BoidState,
{
    ids.sort_unstable();
    ids.dedup();

    let mut merged = Vec::with_capacity(ids.len());
    let mut old = old.into_iter().peekable();
    for &id in ids.iter() {
        while old.next_if(|state| state.id < id).is_some() {}
        match old.next_if(|state| state.id == id) {
            Some(state) => merged.push(state),
            None => merged.push(spawn(id)),
        }
    }
    merged
}
