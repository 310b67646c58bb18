//! Instrumentation sinks that capture what the engine saw and decided each tick.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use swarm_grid::{CellCoord, Grid};
use thiserror::Error;

use crate::Tick;
use crate::agent::{BoidId, BoidState};
use crate::blend::SteeringTarget;

/// Failure reported by a recorder. The engine logs it and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("recorder sink failed: {0}")]
    Sink(String),
}

/// Per-tick capture hook.
///
/// The engine calls `begin_frame`, then `record_state` and `record_target` per agent,
/// then `record_grid` and finally `commit_frame`.
pub trait Recorder: Send {
    fn begin_frame(&mut self, tick: Tick, time: f64) -> Result<(), RecordError>;
    fn record_state(&mut self, state: &BoidState) -> Result<(), RecordError>;
    fn record_target(&mut self, id: BoidId, target: &SteeringTarget) -> Result<(), RecordError>;
    fn record_grid(&mut self, grid: &Grid<f32>) -> Result<(), RecordError>;
    fn commit_frame(&mut self) -> Result<(), RecordError>;
}

/// Recorder that drops everything.
#[derive(Debug, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn begin_frame(&mut self, _tick: Tick, _time: f64) -> Result<(), RecordError> {
        Ok(())
    }

    fn record_state(&mut self, _state: &BoidState) -> Result<(), RecordError> {
        Ok(())
    }

    fn record_target(&mut self, _id: BoidId, _target: &SteeringTarget) -> Result<(), RecordError> {
        Ok(())
    }

    fn record_grid(&mut self, _grid: &Grid<f32>) -> Result<(), RecordError> {
        Ok(())
    }

    fn commit_frame(&mut self) -> Result<(), RecordError> {
        Ok(())
    }
}

/// One agent as captured in a keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoidSample {
    pub id: BoidId,
    pub position: Vec3,
    pub direction: Vec3,
    pub velocity: Vec3,
    pub target: Option<SteeringTarget>,
}

/// One active cell of the nearest-point distance field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSample {
    pub cell: CellCoord,
    pub value: f32,
}

/// Everything captured for a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub tick: Tick,
    /// Simulated seconds at the start of the tick.
    pub time: f64,
    pub boids: Vec<BoidSample>,
    pub grid: Vec<GridSample>,
}

/// Keeps committed keyframes in memory for playback or export.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    frames: Vec<Keyframe>,
    pending: Option<Keyframe>,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn frames(&self) -> &[Keyframe] {
        &self.frames
    }

    #[must_use]
    pub fn into_frames(self) -> Vec<Keyframe> {
        self.frames
    }

    fn pending(&mut self) -> Result<&mut Keyframe, RecordError> {
        self.pending
            .as_mut()
            .ok_or_else(|| RecordError::Sink("no open frame".to_string()))
    }
}

impl Recorder for MemoryRecorder {
    fn begin_frame(&mut self, tick: Tick, time: f64) -> Result<(), RecordError> {
        if self.pending.is_some() {
            return Err(RecordError::Sink(format!(
                "frame for tick {} begun before the previous one was committed",
                tick.0
            )));
        }
        self.pending = Some(Keyframe {
            tick,
            time,
            boids: Vec::new(),
            grid: Vec::new(),
        });
        Ok(())
    }

    fn record_state(&mut self, state: &BoidState) -> Result<(), RecordError> {
        self.pending()?.boids.push(BoidSample {
            id: state.id,
            position: state.position,
            direction: state.direction,
            velocity: state.velocity,
            target: None,
        });
        Ok(())
    }

    fn record_target(&mut self, id: BoidId, target: &SteeringTarget) -> Result<(), RecordError> {
        let frame = self.pending()?;
        // Targets follow their state, so the match is almost always the last sample.
        let sample = frame
            .boids
            .iter_mut()
            .rev()
            .find(|sample| sample.id == id)
            .ok_or_else(|| RecordError::Sink(format!("target for unrecorded boid {}", id.0)))?;
        sample.target = Some(*target);
        Ok(())
    }

    fn record_grid(&mut self, grid: &Grid<f32>) -> Result<(), RecordError> {
        let frame = self.pending()?;
        frame.grid.clear();
        frame
            .grid
            .extend(grid.iter().map(|(cell, value)| GridSample { cell, value }));
        Ok(())
    }

    fn commit_frame(&mut self) -> Result<(), RecordError> {
        let frame = self
            .pending
            .take()
            .ok_or_else(|| RecordError::Sink("no open frame".to_string()))?;
        self.frames.push(frame);
        Ok(())
    }
}
