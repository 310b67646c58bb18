//! Spatial indexing abstractions for boid neighborhood queries.

use std::collections::HashMap;

use glam::{IVec3, Vec3};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NONE: usize = usize::MAX;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
///
/// Visitors receive the point index and its squared distance from the query origin.
pub trait NeighborhoodIndex: Send + Sync {
    /// Rebuild internal structures from positions. On error the index is left empty.
    fn rebuild(&mut self, positions: &[Vec3]) -> Result<(), IndexError>;

    /// Visit every indexed point within `radius` of `point`.
    fn query_radius(
        &self,
        point: Vec3,
        radius: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Visit neighbors of `agent_idx` within the provided squared radius, excluding the
    /// agent itself.
    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded uniform hash grid with per-cell intrusive linked lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell used for bucketing points.
    pub cell_size: f32,
    #[serde(skip)]
    heads: HashMap<IVec3, usize>,
    #[serde(skip)]
    next: Vec<usize>,
    #[serde(skip)]
    positions: Vec<Vec3>,
    /// Inclusive bounds of the occupied buckets.
    #[serde(skip)]
    bounds: Option<(IVec3, IVec3)>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            heads: HashMap::new(),
            next: Vec::new(),
            positions: Vec::new(),
            bounds: None,
        }
    }

    fn cell_of(&self, point: Vec3) -> IVec3 {
        (point / self.cell_size).floor().as_ivec3()
    }

    fn clear(&mut self) {
        self.heads.clear();
        self.next.clear();
        self.positions.clear();
        self.bounds = None;
    }

    fn scan(
        &self,
        point: Vec3,
        radius_sq: f32,
        skip: usize,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if self.positions.is_empty() || !point.is_finite() || !(radius_sq >= 0.0) {
            return;
        }
        let Some((lo, hi)) = self.bounds else {
            return;
        };
        let reach = (radius_sq.sqrt() / self.cell_size).ceil() as i64;
        let base = self.cell_of(point);
        // Scan range clipped to the occupied buckets; empty when the query misses them.
        let span = |center: i32, min: i32, max: i32| {
            let from = i64::from(center).saturating_sub(reach).max(i64::from(min));
            let to = i64::from(center).saturating_add(reach).min(i64::from(max));
            (from <= to).then(|| (from as i32, to as i32))
        };
        let (Some(xs), Some(ys), Some(zs)) = (
            span(base.x, lo.x, hi.x),
            span(base.y, lo.y, hi.y),
            span(base.z, lo.z, hi.z),
        ) else {
            return;
        };
        let width = |(from, to): (i32, i32)| (i64::from(to) - i64::from(from) + 1) as u64;
        let buckets = width(xs).saturating_mul(width(ys)).saturating_mul(width(zs));

        if buckets > self.positions.len() as u64 {
            for (candidate, position) in self.positions.iter().enumerate() {
                if candidate != skip && position.is_finite() {
                    let dist_sq = position.distance_squared(point);
                    if dist_sq <= radius_sq {
                        visitor(candidate, OrderedFloat(dist_sq));
                    }
                }
            }
            return;
        }

        for z in zs.0..=zs.1 {
            for y in ys.0..=ys.1 {
                for x in xs.0..=xs.1 {
                    let Some(&head) = self.heads.get(&IVec3::new(x, y, z)) else {
                        continue;
                    };
                    let mut candidate = head;
                    while candidate != NONE {
                        if candidate != skip {
                            let dist_sq = self.positions[candidate].distance_squared(point);
                            if dist_sq <= radius_sq {
                                visitor(candidate, OrderedFloat(dist_sq));
                            }
                        }
                        candidate = self.next[candidate];
                    }
                }
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[Vec3]) -> Result<(), IndexError> {
        self.clear();
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        self.positions.extend_from_slice(positions);
        self.next.resize(positions.len(), NONE);
        for (idx, position) in positions.iter().enumerate() {
            // Non-finite points are kept for indexing but never bucketed.
            if !position.is_finite() {
                continue;
            }
            let cell = self.cell_of(*position);
            self.bounds = Some(match self.bounds {
                Some((lo, hi)) => (lo.min(cell), hi.max(cell)),
                None => (cell, cell),
            });
            let head = self.heads.entry(cell).or_insert(NONE);
            self.next[idx] = *head;
            *head = idx;
        }
        Ok(())
    }

    fn query_radius(
        &self,
        point: Vec3,
        radius: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        self.scan(point, radius * radius, NONE, visitor);
    }

    fn neighbors_within(
        &self,
        agent_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if let Some(point) = self.positions.get(agent_idx) {
            self.scan(*point, radius_sq, agent_idx, visitor);
        }
    }

    fn len(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    fn sorted_neighbors(index: &UniformGridIndex, agent: usize, radius: f32) -> Vec<usize> {
        let mut found = Vec::new();
        index.neighbors_within(agent, radius * radius, &mut |idx, _| found.push(idx));
        found.sort_unstable();
        found
    }

    #[test]
    fn finds_mutual_neighbors_and_isolates_far_points() {
        let positions = [Vec3::ZERO, Vec3::new(0.1, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)];
        let mut index = UniformGridIndex::new(1.0);
        index.rebuild(&positions).expect("rebuild");

        assert_eq!(sorted_neighbors(&index, 0, 1.0), vec![1]);
        assert_eq!(sorted_neighbors(&index, 1, 1.0), vec![0]);
        assert!(sorted_neighbors(&index, 2, 1.0).is_empty());
    }

    #[test]
    fn reports_squared_distances() {
        let mut index = UniformGridIndex::new(0.5);
        index
            .rebuild(&[Vec3::new(-1.0, 0.0, 0.0), Vec3::new(-1.0, 0.6, 0.0)])
            .expect("rebuild");
        let mut hits = Vec::new();
        index.query_radius(Vec3::new(-1.0, 0.0, 0.0), 1.0, &mut |idx, d| hits.push((idx, d)));
        hits.sort();
        assert_eq!(hits[0], (0, OrderedFloat(0.0)));
        assert_eq!(hits[1].0, 1);
        assert!((hits[1].1.into_inner() - 0.36).abs() < 1e-5);
    }

    #[test]
    fn matches_brute_force_across_cell_boundaries() {
        let mut rng = SmallRng::seed_from_u64(0x5EED);
        let positions: Vec<Vec3> = (0..400)
            .map(|_| {
                Vec3::new(
                    rng.random_range(-8.0..8.0),
                    rng.random_range(-8.0..8.0),
                    rng.random_range(-8.0..8.0),
                )
            })
            .collect();
        let mut index = UniformGridIndex::new(0.75);
        index.rebuild(&positions).expect("rebuild");

        let radius = 1.6;
        for agent in (0..positions.len()).step_by(17) {
            let expected: Vec<usize> = (0..positions.len())
                .filter(|&other| {
                    other != agent
                        && positions[other].distance_squared(positions[agent]) <= radius * radius
                })
                .collect();
            assert_eq!(sorted_neighbors(&index, agent, radius), expected);
        }
    }

    #[test]
    fn invalid_cell_size_leaves_index_empty() {
        let mut index = UniformGridIndex::new(1.0);
        index.rebuild(&[Vec3::ZERO, Vec3::X]).expect("rebuild");
        index.cell_size = 0.0;
        assert!(matches!(
            index.rebuild(&[Vec3::ZERO]),
            Err(IndexError::InvalidConfig(_))
        ));
        assert!(index.is_empty());
        assert!(sorted_neighbors(&index, 0, 5.0).is_empty());
    }

    #[test]
    fn wide_radius_falls_back_to_a_linear_pass() {
        let positions = [Vec3::ZERO, Vec3::new(50.0, -20.0, 5.0), Vec3::splat(f32::NAN)];
        let mut index = UniformGridIndex::new(1.0);
        index.rebuild(&positions).expect("rebuild");

        assert_eq!(sorted_neighbors(&index, 0, 100.0), vec![1]);
        assert_eq!(sorted_neighbors(&index, 1, 1.0e30), vec![0]);
        assert_eq!(sorted_neighbors(&index, 0, f32::INFINITY), vec![1]);
    }

    #[test]
    fn queries_far_outside_the_occupied_buckets_see_nothing() {
        let mut index = UniformGridIndex::new(1.0);
        index.rebuild(&[Vec3::ZERO, Vec3::X]).expect("rebuild");
        let mut hits = 0;
        index.query_radius(Vec3::splat(1.0e9), 2.0, &mut |_, _| hits += 1);
        index.query_radius(Vec3::splat(-1.0e30), 10.0, &mut |_, _| hits += 1);
        assert_eq!(hits, 0);
    }

    #[test]
    fn out_of_range_agent_has_no_neighbors() {
        let mut index = UniformGridIndex::default();
        index.rebuild(&[Vec3::ZERO]).expect("rebuild");
        assert!(sorted_neighbors(&index, 3, 1.0).is_empty());
    }
}
