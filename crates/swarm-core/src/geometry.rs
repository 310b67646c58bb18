//! Small vector helpers shared by the steering rules and hosts.

use glam::Vec3;
use rand::{Rng, RngCore};

/// Hermite interpolation from `from` to `to`, with `t` clamped to `[0, 1]`.
#[must_use]
pub fn smoothstep(from: f32, to: f32, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let t = t * t * (3.0 - 2.0 * t);
    to * t + from * (1.0 - t)
}

/// Remove the component of `v` along `normal`. A zero normal leaves `v` unchanged.
#[must_use]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let len_sq = normal.length_squared();
    if len_sq > 0.0 {
        v - normal * (v.dot(normal) / len_sq)
    } else {
        v
    }
}

/// How deep `dir` reaches into the positive cone around `cone_dir` that encloses a sphere
/// of `cone_radius` at `cone_dir`.
///
/// Returns `(depth, gradient)` with `depth` in `(0, 1]` when inside, where the gradient
/// points back toward the cone axis. When the origin lies inside the sphere itself the
/// depth grows toward its centre and the gradient is the cone axis.
#[must_use]
pub fn positive_cone_distance(dir: Vec3, cone_dir: Vec3, cone_radius: f32) -> Option<(f32, Vec3)> {
    let radius_sq = cone_radius * cone_radius;
    let axis = cone_dir.normalize_or_zero();
    let side_sq = cone_dir.length_squared() - radius_sq;
    if side_sq <= 0.0 {
        let depth = if cone_radius > 0.0 {
            1.0 - cone_dir.length() / cone_radius
        } else {
            1.0
        };
        return Some((depth, axis));
    }

    let along = dir.dot(axis);
    if along <= 0.0 {
        return None;
    }
    let cone_part = axis * along;
    let ortho_part = dir - cone_part;
    let ortho_sq = ortho_part.length_squared();
    let cone_sq = cone_part.length_squared();
    if ortho_sq <= 0.0 || cone_sq <= 0.0 {
        // Heading straight down the axis has no usable gradient.
        return None;
    }

    let tan_sq = radius_sq / side_sq;
    let scale_sq = ortho_sq / (cone_sq * tan_sq);
    if scale_sq < 1.0 {
        Some((1.0 - scale_sq.sqrt(), -ortho_part.normalize_or_zero()))
    } else {
        None
    }
}

/// Uniform point on the unit sphere surface.
pub fn sample_unit_sphere(rng: &mut dyn RngCore) -> Vec3 {
    loop {
        let candidate = sample_cube(rng);
        let len_sq = candidate.length_squared();
        if len_sq > 1e-6 && len_sq <= 1.0 {
            return candidate / len_sq.sqrt();
        }
    }
}

/// Uniform point inside the unit ball.
pub fn sample_unit_ball(rng: &mut dyn RngCore) -> Vec3 {
    loop {
        let candidate = sample_cube(rng);
        if candidate.length_squared() <= 1.0 {
            return candidate;
        }
    }
}

fn sample_cube(rng: &mut dyn RngCore) -> Vec3 {
    Vec3::new(
        rng.random_range(-1.0..=1.0),
        rng.random_range(-1.0..=1.0),
        rng.random_range(-1.0..=1.0),
    )
}
