use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cue::Cue;
use crate::error::{GripError, Result};
use crate::pull::{PullDetector, PullEdge};
use crate::runtime::Step;

pub const TARGET_BODY_WEIGHT_FRACTION: f64 = 0.6;
pub const BULLSEYE_KG: f64 = 2.0;
pub const PERFECT_MATCH_KG: f64 = 2.0;
pub const FLYING_TOLERANCE_KG: f64 = 5.0;
pub const FLYING_LEVEL_POINTS: f64 = 100.0;
pub const DEFAULT_FLYING_LEVELS: [f64; 6] = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompetitionType {
    /// Best of three
    Hardest,
    /// Closest of three to a body-weight target
    Target,
    /// Two pulls, smallest difference
    Equal,
    /// Climb a ladder of targets, one miss ends the game
    Flying,
}

impl CompetitionType {
    pub fn title(&self) -> &'static str {
        match self {
            CompetitionType::Hardest => "Hardest Pull",
            CompetitionType::Target => "Hit the Target",
            CompetitionType::Equal => "Equal Pulls",
            CompetitionType::Flying => "Flying Game",
        }
    }
}

/// External inputs some modes need at configuration time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompetitionContext {
    pub body_weight_kg: Option<f64>,
    /// Overrides [`DEFAULT_FLYING_LEVELS`]
    pub level_targets: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionConfig {
    pub kind: CompetitionType,
    pub max_attempts: usize,
    pub target_force: Option<f64>,
    pub level_targets: Option<Vec<f64>>,
}

impl CompetitionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GripError::config("max attempts must be at least 1"));
        }
        match self.kind {
            CompetitionType::Hardest | CompetitionType::Equal => Ok(()),
            CompetitionType::Target => match self.target_force {
                Some(t) if t.is_finite() && t > 0.0 => Ok(()),
                other => Err(GripError::config(format!(
                    "target mode needs a positive target force, got {other:?}"
                ))),
            },
            CompetitionType::Flying => {
                let levels = self
                    .level_targets
                    .as_deref()
                    .ok_or_else(|| GripError::config("flying mode needs level targets"))?;
                if levels.is_empty() {
                    return Err(GripError::config("flying mode needs at least one level"));
                }
                if let Some(bad) = levels.iter().find(|t| !t.is_finite() || **t <= 0.0) {
                    return Err(GripError::config(format!(
                        "level targets must be positive, got {bad}"
                    )));
                }
                if self.max_attempts != levels.len() {
                    return Err(GripError::config(format!(
                        "flying mode has {} levels but {} attempts",
                        levels.len(),
                        self.max_attempts
                    )));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionPhase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionRunState {
    /// 1-based once running
    pub attempt: usize,
    pub score: f64,
    pub results: Vec<f64>,
    pub pull_in_progress: bool,
    pub pull_peak_so_far: f64,
    /// Flying mode only, 1-based
    pub current_level: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Bullseye,
    GoodTry,
    PerfectMatch,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlyingResult {
    Win,
    Lose,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CompetitionOutcome {
    Hardest {
        best: f64,
    },
    Target {
        target: f64,
        closest: f64,
        error: f64,
        verdict: Verdict,
    },
    Equal {
        first: f64,
        second: f64,
        difference: f64,
        verdict: Verdict,
    },
    Flying {
        result: FlyingResult,
        score: u32,
        level: usize,
    },
    /// Stopped before there were enough pulls to judge
    Incomplete,
}

impl CompetitionOutcome {
    pub fn headline(&self) -> String {
        match self {
            CompetitionOutcome::Hardest { best } => format!("Hardest Pull: {best:.1} kg"),
            CompetitionOutcome::Target { verdict, .. }
            | CompetitionOutcome::Equal { verdict, .. } => match verdict {
                Verdict::Bullseye => "Bullseye!",
                Verdict::GoodTry => "Good Try!",
                Verdict::PerfectMatch => "Perfect Match!",
                Verdict::Close => "Close!",
            }
            .to_string(),
            CompetitionOutcome::Flying { result, .. } => match result {
                FlyingResult::Win => "All Levels Complete!",
                FlyingResult::Lose => "Missed!",
                FlyingResult::Stopped => "Game stopped",
            }
            .to_string(),
            CompetitionOutcome::Incomplete => "Competition stopped".to_string(),
        }
    }
}

/// Whether the run used all its attempts or was cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    Completed,
    Ragged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionSummary {
    pub kind: CompetitionType,
    pub results: Vec<f64>,
    pub score: f64,
    pub outcome: CompetitionOutcome,
    pub completion: Completion,
}

/// Instruction line keys, one per prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    GetReady,
    PullWhenReady,
    Pull,
    HitIt,
    FirstPull,
    MatchTheFirst,
    MatchIt,
    HitTheTarget,
    Go,
    Finished,
}

impl Instruction {
    pub fn key(&self) -> &'static str {
        match self {
            Instruction::GetReady => "get_ready",
            Instruction::PullWhenReady => "pull_when_ready",
            Instruction::Pull => "pull",
            Instruction::HitIt => "hit_it",
            Instruction::FirstPull => "first_pull",
            Instruction::MatchTheFirst => "match_the_first",
            Instruction::MatchIt => "match_it",
            Instruction::HitTheTarget => "hit_the_target",
            Instruction::Go => "go",
            Instruction::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompSnapshot {
    pub phase: CompetitionPhase,
    pub instruction: Instruction,
    pub target_display: String,
    pub attempt_display: String,
    pub score_display: String,
    pub attempt: usize,
    pub max_attempts: usize,
    pub score: f64,
    pub pull_in_progress: bool,
    pub pull_peak: f64,
    pub force: f64,
}

pub type CompStep = Step<CompSnapshot, CompetitionSummary>;

#[derive(Debug, Clone)]
pub struct CompetitionEngine {
    config: CompetitionConfig,
    phase: CompetitionPhase,
    state: CompetitionRunState,
    detector: PullDetector,
}

impl CompetitionEngine {
    /// Derive mode parameters, failing on missing or malformed inputs
    pub fn configure(
        kind: CompetitionType,
        context: &CompetitionContext,
    ) -> Result<CompetitionConfig> {
        let config = match kind {
            CompetitionType::Hardest => CompetitionConfig {
                kind,
                max_attempts: 3,
                target_force: None,
                level_targets: None,
            },
            CompetitionType::Target => {
                let body_weight = context
                    .body_weight_kg
                    .ok_or_else(|| GripError::config("target mode needs a body weight"))?;
                if !body_weight.is_finite() || body_weight <= 0.0 {
                    return Err(GripError::config(format!(
                        "body weight must be positive, got {body_weight}"
                    )));
                }
                CompetitionConfig {
                    kind,
                    max_attempts: 3,
                    target_force: Some((body_weight * TARGET_BODY_WEIGHT_FRACTION).round()),
                    level_targets: None,
                }
            }
            CompetitionType::Equal => CompetitionConfig {
                kind,
                max_attempts: 2,
                target_force: None,
                level_targets: None,
            },
            CompetitionType::Flying => {
                let levels = context
                    .level_targets
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FLYING_LEVELS.to_vec());
                CompetitionConfig {
                    kind,
                    max_attempts: levels.len(),
                    target_force: None,
                    level_targets: Some(levels),
                }
            }
        };
        config.validate()?;
        debug!(?config, "competition configured");
        Ok(config)
    }

    /// Idle engine for `config`, nothing is scored until [`start`](Self::start)
    pub fn new(config: CompetitionConfig) -> Self {
        let current_level = match config.kind {
            CompetitionType::Flying => Some(1),
            _ => None,
        };
        Self {
            config,
            phase: CompetitionPhase::Idle,
            state: CompetitionRunState {
                attempt: 0,
                score: 0.0,
                results: Vec::new(),
                pull_in_progress: false,
                pull_peak_so_far: 0.0,
                current_level,
            },
            detector: PullDetector::default(),
        }
    }

    pub fn config(&self) -> &CompetitionConfig {
        &self.config
    }

    pub fn state(&self) -> &CompetitionRunState {
        &self.state
    }

    pub fn phase(&self) -> CompetitionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == CompetitionPhase::Running
    }

    pub fn start(&mut self) -> Result<Vec<Cue>> {
        if self.phase != CompetitionPhase::Idle {
            return Err(GripError::invalid_state(format!(
                "competition already {:?}",
                self.phase
            )));
        }
        self.config.validate()?;
        self.phase = CompetitionPhase::Running;
        self.state.attempt = 1;
        self.detector.reset();
        info!(
            kind = %self.config.kind,
            max_attempts = self.config.max_attempts,
            "competition started"
        );
        Ok(vec![Cue::speech("Get ready"), Cue::tone(800, 200), Cue::buzz()])
    }

    pub fn tick(&mut self, force: f64) -> CompStep {
        if !self.is_running() {
            return Step::quiet(self.snapshot(force));
        }

        let mut cues = Vec::new();
        let mut result = None;

        match self.detector.feed(force) {
            PullEdge::Started => {
                debug!(attempt = self.state.attempt, "pull started");
                cues.push(Cue::tone(1200, 100));
                cues.push(Cue::buzz());
            }
            PullEdge::Completed(peak) => {
                debug!(attempt = self.state.attempt, peak, "pull completed");
                result = self.score_pull(peak, &mut cues);
            }
            PullEdge::None => {}
        }
        self.state.pull_in_progress = self.detector.in_progress();
        self.state.pull_peak_so_far = self.detector.peak_so_far();

        Step {
            snapshot: self.snapshot(force),
            cues,
            result,
        }
    }

    /// End the game now; only the first call on an unfinished engine yields a summary
    pub fn stop(&mut self) -> CompStep {
        if self.phase == CompetitionPhase::Finished {
            return Step::quiet(self.snapshot(0.0));
        }
        let mut cues = Vec::new();
        let flying = match self.config.kind {
            CompetitionType::Flying => Some(FlyingResult::Stopped),
            _ => None,
        };
        let summary = self.finish(flying, Completion::Ragged, &mut cues);
        Step {
            snapshot: self.snapshot(0.0),
            cues,
            result: Some(summary),
        }
    }

    fn score_pull(&mut self, peak: f64, cues: &mut Vec<Cue>) -> Option<CompetitionSummary> {
        self.state.results.push(peak);
        cues.push(Cue::tone(1000, 100));
        cues.push(Cue::buzz());

        match self.config.kind {
            CompetitionType::Hardest => {
                if peak > self.state.score {
                    self.state.score = peak;
                    cues.push(Cue::speech("New best!"));
                }
                self.next_attempt_or_finish("Next attempt", cues)
            }
            CompetitionType::Target => {
                self.state.score = peak;
                self.next_attempt_or_finish("Next attempt", cues)
            }
            CompetitionType::Equal => self.next_attempt_or_finish("Pull again", cues),
            CompetitionType::Flying => {
                let levels = self.config.level_targets.as_deref().unwrap_or(&[]);
                let level = self.state.current_level.unwrap_or(1);
                let Some(&target) = levels.get(level - 1) else {
                    let lost = self.finish(Some(FlyingResult::Lose), Completion::Completed, cues);
                    return Some(lost);
                };

                if (peak - target).abs() <= FLYING_TOLERANCE_KG {
                    self.state.score += FLYING_LEVEL_POINTS;
                    if level >= levels.len() {
                        let won =
                            self.finish(Some(FlyingResult::Win), Completion::Completed, cues);
                        return Some(won);
                    }
                    self.state.current_level = Some(level + 1);
                    self.state.attempt += 1;
                    cues.push(Cue::speech(format!("Level {}!", level + 1)));
                    cues.push(Cue::double_buzz());
                    None
                } else {
                    debug!(peak, target, "flying level missed");
                    Some(self.finish(Some(FlyingResult::Lose), Completion::Completed, cues))
                }
            }
        }
    }

    fn next_attempt_or_finish(
        &mut self,
        prompt: &str,
        cues: &mut Vec<Cue>,
    ) -> Option<CompetitionSummary> {
        if self.state.attempt >= self.config.max_attempts {
            Some(self.finish(None, Completion::Completed, cues))
        } else {
            self.state.attempt += 1;
            cues.push(Cue::speech(prompt));
            None
        }
    }

    fn finish(
        &mut self,
        flying: Option<FlyingResult>,
        completion: Completion,
        cues: &mut Vec<Cue>,
    ) -> CompetitionSummary {
        self.phase = CompetitionPhase::Finished;
        self.detector.reset();
        self.state.pull_in_progress = false;
        self.state.pull_peak_so_far = 0.0;

        let outcome = self.outcome(flying);
        let summary = CompetitionSummary {
            kind: self.config.kind,
            results: self.state.results.clone(),
            score: self.state.score,
            outcome,
            completion,
        };
        info!(
            kind = %summary.kind,
            attempts = summary.results.len(),
            score = summary.score,
            ?completion,
            "competition finished"
        );

        cues.push(Cue::Speech(summary.outcome.headline()));
        cues.push(Cue::celebrate());
        summary
    }

    fn outcome(&self, flying: Option<FlyingResult>) -> CompetitionOutcome {
        let results = &self.state.results;
        match self.config.kind {
            CompetitionType::Hardest => {
                if results.is_empty() {
                    CompetitionOutcome::Incomplete
                } else {
                    CompetitionOutcome::Hardest {
                        best: self.state.score,
                    }
                }
            }
            CompetitionType::Target => {
                let target = self.config.target_force.unwrap_or(0.0);
                // First attempt wins ties.
                let closest = results.iter().copied().reduce(|best, val| {
                    if (val - target).abs() < (best - target).abs() {
                        val
                    } else {
                        best
                    }
                });
                match closest {
                    Some(closest) => {
                        let error = (closest - target).abs();
                        CompetitionOutcome::Target {
                            target,
                            closest,
                            error,
                            verdict: if error < BULLSEYE_KG {
                                Verdict::Bullseye
                            } else {
                                Verdict::GoodTry
                            },
                        }
                    }
                    None => CompetitionOutcome::Incomplete,
                }
            }
            CompetitionType::Equal => match results.as_slice() {
                [first, second, ..] => {
                    let difference = (first - second).abs();
                    CompetitionOutcome::Equal {
                        first: *first,
                        second: *second,
                        difference,
                        verdict: if difference < PERFECT_MATCH_KG {
                            Verdict::PerfectMatch
                        } else {
                            Verdict::Close
                        },
                    }
                }
                _ => CompetitionOutcome::Incomplete,
            },
            CompetitionType::Flying => CompetitionOutcome::Flying {
                result: flying.unwrap_or(FlyingResult::Stopped),
                score: self.state.score as u32,
                level: self.state.current_level.unwrap_or(1),
            },
        }
    }

    pub fn snapshot(&self, force: f64) -> CompSnapshot {
        let s = &self.state;
        let pulling = s.pull_in_progress;

        let instruction = match self.phase {
            CompetitionPhase::Idle => Instruction::GetReady,
            CompetitionPhase::Finished => Instruction::Finished,
            CompetitionPhase::Running => match (self.config.kind, pulling) {
                (CompetitionType::Hardest, true) => Instruction::Pull,
                (CompetitionType::Target, true) => Instruction::HitIt,
                (CompetitionType::Equal, true) => Instruction::MatchIt,
                (CompetitionType::Flying, true) => Instruction::Go,
                (CompetitionType::Hardest | CompetitionType::Target, false) => {
                    Instruction::PullWhenReady
                }
                (CompetitionType::Equal, false) if s.attempt <= 1 => Instruction::FirstPull,
                (CompetitionType::Equal, false) => Instruction::MatchTheFirst,
                (CompetitionType::Flying, false) => Instruction::HitTheTarget,
            },
        };

        let (target_display, attempt_display, score_display) = match self.config.kind {
            CompetitionType::Hardest => (
                format!("Best: {:.1} kg", s.score),
                format!("Attempt {} / {}", s.attempt, self.config.max_attempts),
                format!("Score: {:.1} kg", s.score),
            ),
            CompetitionType::Target => {
                let target = self.config.target_force.unwrap_or(0.0);
                let off_by = if s.score > 0.0 {
                    format!("{:.1}", (target - s.score).abs())
                } else {
                    "--".to_string()
                };
                (
                    format!("{target} kg"),
                    format!("Attempt {} / {}", s.attempt, self.config.max_attempts),
                    format!("Off by: {off_by} kg"),
                )
            }
            CompetitionType::Equal => (
                match s.results.first() {
                    Some(first) => format!("Match: {first:.1} kg"),
                    None => "Pull #1".to_string(),
                },
                format!("Pull {} / {}", s.attempt, self.config.max_attempts),
                match s.results.as_slice() {
                    [a, b, ..] => format!("Difference: {:.1} kg", (a - b).abs()),
                    _ => String::new(),
                },
            ),
            CompetitionType::Flying => {
                let levels = self.config.level_targets.as_deref().unwrap_or(&[]);
                let level = s.current_level.unwrap_or(1);
                let target = levels.get(level - 1).copied().unwrap_or(0.0);
                (
                    format!("Level {level}: {target} kg"),
                    format!("Level {level} / {}", levels.len()),
                    format!("Score: {}", s.score as u32),
                )
            }
        };

        CompSnapshot {
            phase: self.phase,
            instruction,
            target_display,
            attempt_display,
            score_display,
            attempt: s.attempt,
            max_attempts: self.config.max_attempts,
            score: s.score,
            pull_in_progress: pulling,
            pull_peak: s.pull_peak_so_far,
            force,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(kind: CompetitionType, ctx: CompetitionContext) -> CompetitionEngine {
        let config = CompetitionEngine::configure(kind, &ctx).unwrap();
        let mut engine = CompetitionEngine::new(config);
        engine.start().unwrap();
        engine
    }

    /// Feed one pull shaped 0 -> peak -> 0 and return the final step
    fn pull(engine: &mut CompetitionEngine, peak: f64) -> CompStep {
        engine.tick(0.0);
        engine.tick(peak);
        engine.tick(peak * 0.5);
        engine.tick(0.0)
    }

    #[test]
    fn target_needs_body_weight() {
        let err =
            CompetitionEngine::configure(CompetitionType::Target, &CompetitionContext::default())
                .unwrap_err();
        assert!(matches!(err, GripError::Configuration(_)));

        let ctx = CompetitionContext {
            body_weight_kg: Some(-3.0),
            ..Default::default()
        };
        assert!(CompetitionEngine::configure(CompetitionType::Target, &ctx).is_err());
    }

    #[test]
    fn target_force_is_rounded_share_of_body_weight() {
        let ctx = CompetitionContext {
            body_weight_kg: Some(72.5),
            ..Default::default()
        };
        let cfg = CompetitionEngine::configure(CompetitionType::Target, &ctx).unwrap();
        assert_eq!(cfg.target_force, Some(44.0));
        assert_eq!(cfg.max_attempts, 3);
    }

    #[test]
    fn flying_rejects_empty_ladder() {
        let ctx = CompetitionContext {
            level_targets: Some(vec![]),
            ..Default::default()
        };
        assert!(CompetitionEngine::configure(CompetitionType::Flying, &ctx).is_err());
    }

    fn hand_built(kind: CompetitionType, max_attempts: usize) -> CompetitionConfig {
        CompetitionConfig {
            kind,
            max_attempts,
            target_force: None,
            level_targets: None,
        }
    }

    fn assert_start_rejects(config: CompetitionConfig) {
        let mut e = CompetitionEngine::new(config);
        assert!(matches!(e.start(), Err(GripError::Configuration(_))));
        assert_eq!(e.phase(), CompetitionPhase::Idle);
    }

    #[test]
    fn start_rejects_target_without_target_force() {
        assert_start_rejects(hand_built(CompetitionType::Target, 3));
        assert_start_rejects(CompetitionConfig {
            target_force: Some(f64::NAN),
            ..hand_built(CompetitionType::Target, 3)
        });
        assert_start_rejects(CompetitionConfig {
            target_force: Some(0.0),
            ..hand_built(CompetitionType::Target, 3)
        });
    }

    #[test]
    fn start_rejects_zero_attempts() {
        assert_start_rejects(hand_built(CompetitionType::Hardest, 0));
        assert_start_rejects(hand_built(CompetitionType::Equal, 0));
    }

    #[test]
    fn start_rejects_flying_without_levels() {
        assert_start_rejects(hand_built(CompetitionType::Flying, 6));
        assert_start_rejects(CompetitionConfig {
            level_targets: Some(vec![]),
            ..hand_built(CompetitionType::Flying, 1)
        });
        assert_start_rejects(CompetitionConfig {
            level_targets: Some(vec![10.0, -5.0]),
            ..hand_built(CompetitionType::Flying, 2)
        });
    }

    #[test]
    fn start_rejects_flying_attempts_that_mismatch_ladder() {
        assert_start_rejects(CompetitionConfig {
            level_targets: Some(vec![10.0, 20.0]),
            ..hand_built(CompetitionType::Flying, 3)
        });
    }

    #[test]
    fn configured_configs_pass_validation() {
        for kind in [
            CompetitionType::Hardest,
            CompetitionType::Equal,
            CompetitionType::Flying,
        ] {
            let cfg = CompetitionEngine::configure(kind, &CompetitionContext::default()).unwrap();
            assert!(cfg.validate().is_ok());
        }
    }

    #[test]
    fn start_twice_is_invalid() {
        let mut e = engine(CompetitionType::Hardest, CompetitionContext::default());
        assert!(matches!(e.start(), Err(GripError::InvalidState(_))));
    }

    #[test]
    fn idle_engine_ignores_ticks() {
        let cfg =
            CompetitionEngine::configure(CompetitionType::Equal, &CompetitionContext::default())
                .unwrap();
        let mut e = CompetitionEngine::new(cfg);
        let step = e.tick(30.0);
        assert_eq!(step.snapshot.instruction, Instruction::GetReady);
        assert!(step.cues.is_empty());
        assert!(e.state().results.is_empty());
    }

    #[test]
    fn hardest_updates_score_per_attempt() {
        let mut e = engine(CompetitionType::Hardest, CompetitionContext::default());
        pull(&mut e, 30.0);
        assert_eq!(e.state().score, 30.0);
        assert_eq!(e.state().attempt, 2);
        pull(&mut e, 25.0);
        assert_eq!(e.state().score, 30.0);
        let step = pull(&mut e, 41.0);
        let summary = step.result.expect("third pull finishes");
        assert_eq!(summary.outcome, CompetitionOutcome::Hardest { best: 41.0 });
        assert_eq!(summary.results, vec![30.0, 25.0, 41.0]);
        assert_eq!(summary.completion, Completion::Completed);
        assert_eq!(e.phase(), CompetitionPhase::Finished);
    }

    #[test]
    fn results_track_attempt_index_while_running() {
        let mut e = engine(CompetitionType::Hardest, CompetitionContext::default());
        for peak in [10.0, 20.0] {
            pull(&mut e, peak);
            assert!(e.is_running());
            assert_eq!(e.state().results.len(), e.state().attempt - 1);
        }
    }

    #[test]
    fn equal_reports_difference() {
        let mut e = engine(CompetitionType::Equal, CompetitionContext::default());
        assert_eq!(e.tick(0.0).snapshot.instruction, Instruction::FirstPull);
        pull(&mut e, 30.0);
        let snap = e.tick(0.0).snapshot;
        assert_eq!(snap.instruction, Instruction::MatchTheFirst);
        assert_eq!(snap.target_display, "Match: 30.0 kg");
        let summary = pull(&mut e, 31.5).result.unwrap();
        match summary.outcome {
            CompetitionOutcome::Equal {
                difference, verdict, ..
            } => {
                assert!((difference - 1.5).abs() < 1e-9);
                assert_eq!(verdict, Verdict::PerfectMatch);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn equal_with_large_gap_is_close() {
        let mut e = engine(CompetitionType::Equal, CompetitionContext::default());
        pull(&mut e, 30.0);
        let summary = pull(&mut e, 20.0).result.unwrap();
        assert_eq!(summary.outcome.headline(), "Close!");
    }

    #[test]
    fn flying_win_clears_every_level() {
        let ctx = CompetitionContext {
            level_targets: Some(vec![10.0, 20.0]),
            ..Default::default()
        };
        let mut e = engine(CompetitionType::Flying, ctx);
        assert!(pull(&mut e, 9.0).result.is_none());
        assert_eq!(e.state().current_level, Some(2));
        let summary = pull(&mut e, 24.0).result.unwrap();
        assert_eq!(
            summary.outcome,
            CompetitionOutcome::Flying {
                result: FlyingResult::Win,
                score: 200,
                level: 2
            }
        );
        assert_eq!(summary.outcome.headline(), "All Levels Complete!");
    }

    #[test]
    fn stop_mid_pull_is_ragged() {
        let mut e = engine(CompetitionType::Hardest, CompetitionContext::default());
        pull(&mut e, 22.0);
        e.tick(15.0);
        assert!(e.state().pull_in_progress);
        let summary = e.stop().result.unwrap();
        assert_eq!(summary.completion, Completion::Ragged);
        assert_eq!(summary.results, vec![22.0]);
        assert!(e.stop().result.is_none());
    }

    #[test]
    fn stop_before_any_pull_is_incomplete() {
        let mut e = engine(CompetitionType::Target, CompetitionContext {
            body_weight_kg: Some(70.0),
            ..Default::default()
        });
        let summary = e.stop().result.unwrap();
        assert_eq!(summary.outcome, CompetitionOutcome::Incomplete);
        assert!(summary.results.is_empty());
    }

    #[test]
    fn pull_edges_raise_cues() {
        let mut e = engine(CompetitionType::Hardest, CompetitionContext::default());
        let start = e.tick(8.0);
        assert_eq!(start.cues, vec![Cue::tone(1200, 100), Cue::buzz()]);
        assert_eq!(start.snapshot.instruction, Instruction::Pull);
        let end = e.tick(0.5);
        assert!(end.cues.contains(&Cue::tone(1000, 100)));
        assert!(end.cues.contains(&Cue::speech("New best!")));
        assert!(end.cues.contains(&Cue::speech("Next attempt")));
    }

    #[test]
    fn target_snapshot_shows_error_distance() {
        let mut e = engine(CompetitionType::Target, CompetitionContext {
            body_weight_kg: Some(80.0),
            ..Default::default()
        });
        assert_eq!(e.tick(0.0).snapshot.score_display, "Off by: -- kg");
        pull(&mut e, 50.0);
        let snap = e.tick(0.0).snapshot;
        assert_eq!(snap.target_display, "48 kg");
        assert_eq!(snap.score_display, "Off by: 2.0 kg");
    }
}
