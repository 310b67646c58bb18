use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use swarm_core::rules::{
    AlignmentRule, AlignmentSettings, AvoidBoidsRule, AvoidBoidsSettings, AvoidObstaclesRule,
    AvoidObstaclesSettings, CohesionRule, CohesionSettings, GoalRule, GoalSettings,
    KeepMovingRule, SeparationRule, SeparationSettings, SwarmRule, SwarmSettings,
};
use swarm_core::{FlockConfig, FlockEngine, Keyframe, MemoryRecorder, NullRecorder, Recorder, RuleSet};
use tracing::info;

mod host;

use host::{Bodies, BodySettings, Floor, PendingTargets};

#[derive(Parser, Debug)]
#[command(
    name = "swarm-demo",
    version,
    about = "Run a headless boid flock against an in-memory host"
)]
struct Cli {
    /// Number of boids to spawn.
    #[arg(long, env = "SWARM_AGENTS", default_value_t = 200)]
    agents: usize,
    /// Ticks to simulate.
    #[arg(long, env = "SWARM_TICKS", default_value_t = 600)]
    ticks: u64,
    /// Seed for spawning and for the engine when the config file sets none.
    #[arg(long, env = "SWARM_SEED", default_value_t = 63948)]
    seed: u64,
    /// Seconds per tick.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,
    /// Radius of the spawn volume.
    #[arg(long, default_value_t = 2.5)]
    spawn_radius: f32,
    /// Optional JSON demo configuration.
    #[arg(short, long, env = "SWARM_CONFIG")]
    config: Option<PathBuf>,
    /// Write recorded keyframes to this JSON file.
    #[arg(long)]
    record: Option<PathBuf>,
    /// Log a summary every this many ticks.
    #[arg(long, default_value_t = 60)]
    log_every: u64,
}

/// Everything a demo run can be configured with from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    flock: FlockConfig,
    body: BodySettings,
    separation: SeparationSettings,
    alignment: AlignmentSettings,
    cohesion: CohesionSettings,
    avoid_boids: AvoidBoidsSettings,
    avoid_obstacles: AvoidObstaclesSettings,
    goal: GoalSettings,
    /// Swarm seeking is off unless configured.
    swarm: Option<SwarmSettings>,
    floor_height: Option<f32>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut demo = match &cli.config {
        Some(path) => load_config(path)?,
        None => DemoConfig {
            floor_height: Some(-5.0),
            ..DemoConfig::default()
        },
    };
    demo.flock.rng_seed.get_or_insert(cli.seed);

    let mut engine = FlockEngine::new(demo.flock.clone(), build_rules(&demo)?)
        .context("failed to build flock engine")?;
    let mut rng = SmallRng::seed_from_u64(cli.seed);
    let mut bodies = Bodies::spawn(cli.agents, cli.spawn_radius, &mut rng);
    engine.sync_population(&bodies.ids(), &bodies);
    let floor = Floor {
        height: demo.floor_height.unwrap_or(f32::NEG_INFINITY),
    };
    info!(
        agents = bodies.len(),
        rules = engine.rules().len(),
        ticks = cli.ticks,
        "Starting swarm demo"
    );

    let mut memory = MemoryRecorder::new();
    let mut discard = NullRecorder;
    let recorder: &mut dyn Recorder = if cli.record.is_some() {
        &mut memory
    } else {
        &mut discard
    };
    let mut targets = PendingTargets::default();
    for _ in 0..cli.ticks {
        targets.reset(bodies.len());
        let report = engine.tick(&bodies, &mut targets, &floor, recorder, cli.dt);
        bodies.integrate(&targets, &demo.body, cli.dt);

        if cli.log_every > 0 && report.tick.0 % cli.log_every == 0 {
            let (centroid, speed) = bodies.centroid_and_speed();
            info!(
                tick = report.tick.0,
                targets = report.targets,
                casts = report.casts,
                rule_errors = report.rule_errors,
                occupied_cells = report.occupied_cells,
                centroid = ?centroid,
                mean_speed = speed,
                "Flock progress"
            );
        }
    }

    if let Some(path) = &cli.record {
        write_frames(path, memory.frames())?;
        info!(frames = memory.frames().len(), path = %path.display(), "Wrote keyframes");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(path: &Path) -> Result<DemoConfig> {
    let file =
        File::open(path).with_context(|| format!("failed to open config {}", path.display()))?;
    serde_json::from_reader(file)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn build_rules(demo: &DemoConfig) -> Result<RuleSet> {
    let mut rules = RuleSet::new();
    rules.push(SeparationRule::new(demo.separation).context("separation rule")?);
    rules.push(AlignmentRule::new(demo.alignment).context("alignment rule")?);
    rules.push(CohesionRule::new(demo.cohesion).context("cohesion rule")?);
    rules.push(AvoidBoidsRule::new(demo.avoid_boids).context("avoid_boids rule")?);
    rules.push(AvoidObstaclesRule::new(demo.avoid_obstacles).context("avoid_obstacles rule")?);
    if let Some(swarm) = demo.swarm {
        rules.push(SwarmRule::new(swarm).context("swarm rule")?);
    }
    rules.push(GoalRule::new(demo.goal).context("goal rule")?);
    rules.push(KeepMovingRule);
    Ok(rules)
}

fn write_frames(path: &Path, frames: &[Keyframe]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), frames)
        .with_context(|| format!("failed to write keyframes to {}", path.display()))
}
