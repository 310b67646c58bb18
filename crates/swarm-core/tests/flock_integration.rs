use std::collections::{BTreeMap, HashMap};

use glam::Vec3;
use rand::RngCore;
use swarm_core::rules::{
    AvoidObstaclesRule, AvoidObstaclesSettings, KeepMovingRule, SeparationRule, SeparationSettings,
};
use swarm_core::{
    ALL_LAYERS, Actuator, BoidId, BoidRule, BoidState, CastBudget, CastSensor, Candidate,
    FlockConfig, FlockEngine, Keyframe, KinematicSource, Kinematics, LayerMask, MemoryRecorder,
    NoRaycaster, NullRecorder, Ray, RayHit, Raycaster, RuleContext, RuleError, RuleSet,
    SteeringTarget, Tick,
};

#[derive(Default)]
struct Bodies(BTreeMap<BoidId, Kinematics>);

impl Bodies {
    fn place(&mut self, id: u64, position: Vec3, forward: Vec3) {
        self.0.insert(
            BoidId(id),
            Kinematics {
                position,
                velocity: forward,
                forward,
                ..Kinematics::default()
            },
        );
    }

    fn ids(&self) -> Vec<BoidId> {
        self.0.keys().copied().collect()
    }
}

impl KinematicSource for Bodies {
    fn kinematics(&self, id: BoidId) -> Option<Kinematics> {
        self.0.get(&id).copied()
    }
}

#[derive(Default)]
struct Targets(HashMap<BoidId, SteeringTarget>);

impl Actuator for Targets {
    fn apply(&mut self, id: BoidId, target: &SteeringTarget) {
        self.0.insert(id, *target);
    }
}

fn seeded_config() -> FlockConfig {
    FlockConfig {
        rng_seed: Some(0xB01D),
        ..FlockConfig::default()
    }
}

fn separation_only() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.push(SeparationRule::new(SeparationSettings { radius: 1.0 }).expect("separation"));
    rules
}

#[test]
fn close_pair_repels_while_distant_agent_is_left_alone() {
    let mut bodies = Bodies::default();
    bodies.place(0, Vec3::ZERO, Vec3::Z);
    bodies.place(1, Vec3::new(0.1, 0.0, 0.0), Vec3::Z);
    bodies.place(2, Vec3::new(10.0, 0.0, 0.0), Vec3::Z);

    let mut engine = FlockEngine::new(seeded_config(), separation_only()).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);
    let mut targets = Targets::default();
    let report = engine.tick(&bodies, &mut targets, &NoRaycaster, &mut NullRecorder, 0.1);

    assert_eq!(report.tick, Tick(1));
    assert_eq!(report.agents, 3);
    assert_eq!(report.targets, 2);
    assert!(report.index_ok);
    assert_eq!(report.occupied_cells, 2);
    assert!((targets.0[&BoidId(0)].direction - Vec3::NEG_X).length() < 1e-5);
    assert!((targets.0[&BoidId(1)].direction - Vec3::X).length() < 1e-5);
    assert!(!targets.0.contains_key(&BoidId(2)));
    assert_eq!(engine.tick_count(), Tick(1));
    assert!((engine.elapsed() - 0.1).abs() < 1e-9);
}

#[test]
fn identities_keep_their_state_across_population_changes() {
    let mut bodies = Bodies::default();
    for id in 1..=3 {
        bodies.place(id, Vec3::new(id as f32 * 5.0, 0.0, 0.0), Vec3::X);
    }
    let mut rules = RuleSet::new();
    let keep = rules.push(KeepMovingRule);
    let mut engine = FlockEngine::new(seeded_config(), rules).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);
    engine.tick(&bodies, &mut Targets::default(), &NoRaycaster, &mut NullRecorder, 0.1);
    assert!(engine.states().iter().all(|s| s.current_rule == Some(keep)));

    bodies.0.remove(&BoidId(1));
    bodies.place(4, Vec3::new(20.0, 0.0, 0.0), Vec3::Y);
    engine.sync_population(&[BoidId(4), BoidId(3), BoidId(2), BoidId(3)], &bodies);

    let ids: Vec<BoidId> = engine.states().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![BoidId(2), BoidId(3), BoidId(4)]);
    assert_eq!(engine.state(BoidId(2)).and_then(|s| s.current_rule), Some(keep));
    assert_eq!(engine.state(BoidId(3)).and_then(|s| s.current_rule), Some(keep));
    let newcomer = engine.state(BoidId(4)).expect("spawned");
    assert_eq!(newcomer.current_rule, None);
    assert_eq!(newcomer.direction, Vec3::Y);
    assert!(engine.state(BoidId(1)).is_none());
}

#[test]
fn agents_missing_from_the_host_keep_their_last_state() {
    let mut bodies = Bodies::default();
    bodies.place(7, Vec3::ONE, Vec3::Z);
    let mut engine = FlockEngine::new(seeded_config(), RuleSet::new()).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);

    let lost = Bodies::default();
    let report = engine.tick(&lost, &mut Targets::default(), &NoRaycaster, &mut NullRecorder, 0.1);
    assert_eq!(report.targets, 0);
    assert_eq!(engine.state(BoidId(7)).map(|s| s.position), Some(Vec3::ONE));
}

struct FailsForFirstAgent;

impl BoidRule for FailsForFirstAgent {
    fn name(&self) -> &'static str {
        "fails_for_first_agent"
    }

    fn evaluate(
        &self,
        _ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        if agent == 0 {
            Err(RuleError::Evaluation("synthetic failure".to_string()))
        } else {
            Ok(None)
        }
    }
}

#[test]
fn failing_rule_does_not_block_other_rules_or_agents() {
    let mut bodies = Bodies::default();
    for id in 0..4 {
        bodies.place(id, Vec3::new(id as f32 * 3.0, 0.0, 0.0), Vec3::Z);
    }
    let mut rules = RuleSet::new();
    rules.push(FailsForFirstAgent);
    let keep = rules.push(KeepMovingRule);
    let mut engine = FlockEngine::new(seeded_config(), rules).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);

    let mut targets = Targets::default();
    let report = engine.tick(&bodies, &mut targets, &NoRaycaster, &mut NullRecorder, 0.1);
    assert_eq!(report.rule_errors, 1);
    assert_eq!(report.targets, 4);
    assert!((targets.0[&BoidId(0)].direction - Vec3::Z).length() < 1e-6);
    assert_eq!(engine.state(BoidId(0)).and_then(|s| s.current_rule), Some(keep));
}

struct PanicsForSecondAgent;

impl BoidRule for PanicsForSecondAgent {
    fn name(&self) -> &'static str {
        "panics_for_second_agent"
    }

    fn evaluate(
        &self,
        _ctx: &RuleContext<'_>,
        agent: usize,
        _sensor: &mut CastSensor<'_>,
    ) -> Result<Option<Candidate>, RuleError> {
        assert_ne!(agent, 1, "synthetic panic");
        Ok(None)
    }
}

#[test]
fn panicking_rule_is_contained_to_its_agent() {
    let mut bodies = Bodies::default();
    for id in 0..3 {
        bodies.place(id, Vec3::new(id as f32 * 3.0, 0.0, 0.0), Vec3::Z);
    }
    let mut rules = RuleSet::new();
    rules.push(PanicsForSecondAgent);
    let keep = rules.push(KeepMovingRule);
    let mut engine = FlockEngine::new(seeded_config(), rules).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);

    let mut targets = Targets::default();
    let report = engine.tick(&bodies, &mut targets, &NoRaycaster, &mut NullRecorder, 0.1);
    assert_eq!(report.rule_errors, 1);
    assert_eq!(report.targets, 3);
    assert!((targets.0[&BoidId(1)].direction - Vec3::Z).length() < 1e-6);
    assert_eq!(engine.state(BoidId(1)).and_then(|s| s.current_rule), Some(keep));
}

#[test]
fn removing_the_current_rule_between_ticks_is_harmless() {
    let mut bodies = Bodies::default();
    bodies.place(0, Vec3::ZERO, Vec3::Z);
    bodies.place(1, Vec3::new(0.2, 0.0, 0.0), Vec3::Z);
    let mut rules = separation_only();
    let keep = rules.push(KeepMovingRule);
    let config = FlockConfig {
        current_rule_bias: 2.0,
        ..seeded_config()
    };
    let mut engine = FlockEngine::new(config, rules).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);
    engine.tick(&bodies, &mut Targets::default(), &NoRaycaster, &mut NullRecorder, 0.1);

    let dominant = engine.state(BoidId(0)).and_then(|s| s.current_rule).expect("dominant");
    assert_ne!(dominant, keep);
    assert!(engine.rules_mut().remove(dominant).is_some());

    let mut targets = Targets::default();
    let report = engine.tick(&bodies, &mut targets, &NoRaycaster, &mut NullRecorder, 0.1);
    assert_eq!(report.targets, 2);
    assert!((targets.0[&BoidId(0)].direction - Vec3::Z).length() < 1e-6);
    assert_eq!(engine.state(BoidId(0)).and_then(|s| s.current_rule), Some(keep));
}

struct GrantAll;

impl CastBudget for GrantAll {
    fn allot(&mut self, states: &mut [BoidState], _rng: &mut dyn RngCore) {
        for state in states {
            state.allow_raycast = true;
        }
    }
}

struct Floor;

impl Raycaster for Floor {
    fn raycast(&self, ray: &Ray, _layers: LayerMask) -> Option<RayHit> {
        Some(RayHit {
            point: ray.origin + ray.direction * 0.5 + Vec3::NEG_Y * 0.1,
            normal: Vec3::Y,
            distance: 0.5,
        })
    }

    fn sphere_cast(&self, _ray: &Ray, _radius: f32, _layers: LayerMask) -> Option<RayHit> {
        None
    }
}

#[test]
fn cast_budget_controls_host_casts_and_hits_are_cached() {
    let mut bodies = Bodies::default();
    for id in 0..5 {
        bodies.place(id, Vec3::new(id as f32 * 4.0, 0.0, 0.0), Vec3::Z);
    }
    let avoid = AvoidObstaclesRule::new(AvoidObstaclesSettings {
        layers: ALL_LAYERS,
        ..AvoidObstaclesSettings::default()
    })
    .expect("avoid");
    let mut rules = RuleSet::new();
    rules.push(avoid);

    let mut engine = FlockEngine::new(
        FlockConfig {
            cast_budget: 0,
            ..seeded_config()
        },
        rules,
    )
    .expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);

    let report = engine.tick(&bodies, &mut Targets::default(), &Floor, &mut NullRecorder, 0.1);
    assert_eq!(report.casts, 0);
    assert_eq!(report.targets, 0);

    engine.set_cast_budget(Box::new(GrantAll));
    let report = engine.tick(&bodies, &mut Targets::default(), &Floor, &mut NullRecorder, 0.1);
    assert_eq!(report.casts, 10);
    assert_eq!(report.targets, 5);
    assert!(engine.states().iter().all(|s| s.last_hit.is_some()));

    engine.set_cast_budget(Box::new(swarm_core::UniformCastBudget::new(0)));
    let mut targets = Targets::default();
    let report = engine.tick(&bodies, &mut targets, &Floor, &mut NullRecorder, 0.1);
    assert_eq!(report.casts, 0);
    assert_eq!(report.targets, 5);
    assert!((targets.0[&BoidId(0)].direction - Vec3::Y).length() < 1e-5);
}

#[test]
fn recorded_keyframes_survive_json_export() {
    let mut bodies = Bodies::default();
    bodies.place(0, Vec3::ZERO, Vec3::Z);
    bodies.place(1, Vec3::new(0.3, 0.0, 0.0), Vec3::Z);
    let mut engine = FlockEngine::new(seeded_config(), separation_only()).expect("engine");
    engine.sync_population(&bodies.ids(), &bodies);

    let mut recorder = MemoryRecorder::new();
    for _ in 0..2 {
        engine.tick(&bodies, &mut Targets::default(), &NoRaycaster, &mut recorder, 0.5);
    }
    let frames = recorder.into_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].tick, Tick(2));
    assert!((frames[1].time - 0.5).abs() < 1e-9);
    assert!(frames[0].boids.iter().all(|b| b.target.is_some()));
    assert_eq!(frames[0].grid.len(), 1);

    let json = serde_json::to_string(&frames).expect("serialize");
    let parsed: Vec<Keyframe> = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(parsed, frames);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let config = FlockConfig {
        interaction_radius: -1.0,
        ..FlockConfig::default()
    };
    assert!(FlockEngine::new(config, RuleSet::new()).is_err());
}
