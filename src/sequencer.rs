use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cue::Cue;
use crate::error::{GripError, Result};
use crate::runtime::{Clock, Step, TICK_SECS};
use crate::session::SessionRecord;
use crate::util::max_or_zero;

pub const COUNTDOWN_SECS: f64 = 3.0;
pub const HAND_SWITCH_REST_SECS: f64 = 5.0;
/// Reported average force as a fraction of the best peak
pub const AVERAGE_FORCE_FACTOR: f64 = 0.7;

// Absorbs the drift of repeatedly subtracting 0.1 so that a 3 s countdown
// expires on tick 30 rather than 31.
const TIMER_EPSILON: f64 = 1e-6;

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
pub enum TestType {
    Peak,
    Endurance,
    Repeaters,
    Rfd,
    Critical,
    Failure,
}

impl TestType {
    pub fn title(&self) -> &'static str {
        match self {
            TestType::Peak => "Peak Force Test",
            TestType::Endurance => "Endurance Test",
            TestType::Repeaters => "Repeaters",
            TestType::Rfd => "RFD Test",
            TestType::Critical => "Critical Force",
            TestType::Failure => "To Failure",
        }
    }
}

impl FromStr for TestType {
    type Err = GripError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "peak" => Ok(TestType::Peak),
            "endurance" => Ok(TestType::Endurance),
            "repeaters" => Ok(TestType::Repeaters),
            "rfd" => Ok(TestType::Rfd),
            "critical" => Ok(TestType::Critical),
            "failure" => Ok(TestType::Failure),
            other => Err(GripError::config(format!("unknown test type: {other}"))),
        }
    }
}

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
pub enum Hand {
    Left,
    Right,
    Both,
}

impl FromStr for Hand {
    type Err = GripError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Hand::Left),
            "right" => Ok(Hand::Right),
            "both" => Ok(Hand::Both),
            other => Err(GripError::config(format!("unknown hand: {other}"))),
        }
    }
}

/// Hand currently on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveHand {
    Left,
    Right,
}

impl fmt::Display for ActiveHand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveHand::Left => write!(f, "Left"),
            ActiveHand::Right => write!(f, "Right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    pub test_type: TestType,
    pub work_duration_secs: f64,
    pub rep_count: u32,
    pub rest_secs: f64,
    pub hand: Hand,
}

impl TestConfig {
    /// Stock protocol for each test type
    pub fn preset(test_type: TestType) -> Self {
        let (work_duration_secs, rep_count) = match test_type {
            TestType::Peak => (7.0, 1),
            TestType::Endurance => (30.0, 1),
            TestType::Repeaters => (7.0, 5),
            TestType::Rfd => (5.0, 3),
            TestType::Critical => (180.0, 1),
            TestType::Failure => (999.0, 1),
        };
        Self {
            test_type,
            work_duration_secs,
            rep_count,
            rest_secs: 3.0,
            hand: Hand::Both,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.work_duration_secs.is_finite() || self.work_duration_secs <= 0.0 {
            return Err(GripError::config(format!(
                "work duration must be a positive number of seconds, got {}",
                self.work_duration_secs
            )));
        }
        if self.rep_count == 0 {
            return Err(GripError::config("rep count must be at least 1"));
        }
        if !self.rest_secs.is_finite() || self.rest_secs < 0.0 {
            return Err(GripError::config(format!(
                "rest must be zero or more seconds, got {}",
                self.rest_secs
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Countdown,
    Work,
    WorkLeft,
    RestBetweenHands,
    WorkRight,
    Rest,
    Finished,
}

impl Phase {
    pub fn is_work(&self) -> bool {
        matches!(self, Phase::Work | Phase::WorkLeft | Phase::WorkRight)
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Phase::Rest | Phase::RestBetweenHands)
    }

    /// Key for the instruction line
    pub fn instruction(&self) -> &'static str {
        match self {
            Phase::Countdown => "get_ready",
            Phase::Work | Phase::WorkLeft | Phase::WorkRight => "pull",
            Phase::Rest | Phase::RestBetweenHands => "rest",
            Phase::Finished => "finished",
        }
    }
}

/// Mutable state of one run
#[derive(Debug, Clone, PartialEq)]
pub struct TestRunState {
    pub phase: Phase,
    pub time_remaining_secs: f64,
    /// 1-based
    pub current_rep: u32,
    pub current_hand: ActiveHand,
    pub rep_peak: f64,
    pub left_rep_peak: f64,
    pub right_rep_peak: f64,
    pub best_peak: f64,
    pub total_work_secs: f64,
    pub left_hand_peaks: Vec<f64>,
    pub right_hand_peaks: Vec<f64>,
    pub started_at: DateTime<Utc>,
}

impl TestRunState {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Countdown,
            time_remaining_secs: COUNTDOWN_SECS,
            current_rep: 1,
            current_hand: ActiveHand::Left,
            rep_peak: 0.0,
            left_rep_peak: 0.0,
            right_rep_peak: 0.0,
            best_peak: 0.0,
            total_work_secs: 0.0,
            left_hand_peaks: Vec::new(),
            right_hand_peaks: Vec::new(),
            started_at,
        }
    }

    /// Peak accumulator for the current phase, 0 outside work
    pub fn current_peak(&self) -> f64 {
        match self.phase {
            Phase::WorkLeft => self.left_rep_peak,
            Phase::WorkRight => self.right_rep_peak,
            Phase::Work => self.rep_peak,
            _ => 0.0,
        }
    }
}

/// What a display binds to after every tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSnapshot {
    pub phase: Phase,
    pub time_remaining_secs: f64,
    pub current_peak: f64,
    pub best_peak: f64,
    pub current_rep: u32,
    pub rep_count: u32,
    /// Only set while a hand is working
    pub hand: Option<ActiveHand>,
    pub force: f64,
}

impl PhaseSnapshot {
    /// `m:ss`, clamped at zero
    pub fn timer_display(&self) -> String {
        let secs = self.time_remaining_secs.max(0.0);
        let minutes = (secs / 60.0).floor() as u64;
        let seconds = (secs % 60.0).floor() as u64;
        format!("{minutes}:{seconds:02}")
    }

    pub fn rep_display(&self) -> String {
        format!("Rep {} / {}", self.current_rep, self.rep_count)
    }
}

pub type TestStep = Step<PhaseSnapshot, SessionRecord>;

/// Runs one test from countdown to record
pub struct TestSequencer {
    config: TestConfig,
    state: TestRunState,
    clock: Arc<dyn Clock>,
    running: bool,
}

impl fmt::Debug for TestSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSequencer")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("running", &self.running)
            .finish()
    }
}

impl TestSequencer {
    /// Validate `config` and enter the countdown
    pub fn start(config: TestConfig, clock: Arc<dyn Clock>) -> Result<(Self, Vec<Cue>)> {
        config.validate()?;
        let state = TestRunState::new(clock.now());
        info!(
            test_type = %config.test_type,
            hand = %config.hand,
            reps = config.rep_count,
            work_secs = config.work_duration_secs,
            "test started"
        );
        let sequencer = Self {
            config,
            state,
            clock,
            running: true,
        };
        let cues = vec![Cue::speech("Get ready"), Cue::tone(800, 200), Cue::buzz()];
        Ok((sequencer, cues))
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    pub fn state(&self) -> &TestRunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn snapshot(&self, force: f64) -> PhaseSnapshot {
        let hand = match self.state.phase {
            Phase::Work | Phase::WorkLeft | Phase::WorkRight => Some(self.state.current_hand),
            _ => None,
        };
        PhaseSnapshot {
            phase: self.state.phase,
            time_remaining_secs: self.state.time_remaining_secs,
            current_peak: self.state.current_peak(),
            best_peak: self.state.best_peak,
            current_rep: self.state.current_rep,
            rep_count: self.config.rep_count,
            hand,
            force,
        }
    }

    /// Advance the run by one tick with the latest force sample
    pub fn tick(&mut self, force: f64) -> TestStep {
        if !self.running {
            return Step::quiet(self.snapshot(force));
        }

        let mut cues = Vec::new();
        self.state.time_remaining_secs -= TICK_SECS;

        if self.state.time_remaining_secs <= TIMER_EPSILON {
            if let Some(record) = self.advance_phase(&mut cues) {
                return Step {
                    snapshot: self.snapshot(force),
                    cues,
                    result: Some(record),
                };
            }
        }

        self.track_peak(force);

        Step {
            snapshot: self.snapshot(force),
            cues,
            result: None,
        }
    }

    /// End the run now; only the first call yields a record
    pub fn stop(&mut self) -> TestStep {
        if !self.running {
            return Step::quiet(self.snapshot(0.0));
        }
        let mut cues = Vec::new();
        let record = self.finish(&mut cues);
        Step {
            snapshot: self.snapshot(0.0),
            cues,
            result: Some(record),
        }
    }

    fn track_peak(&mut self, force: f64) {
        let s = &mut self.state;
        match s.phase {
            Phase::WorkLeft => s.left_rep_peak = s.left_rep_peak.max(force),
            Phase::WorkRight => s.right_rep_peak = s.right_rep_peak.max(force),
            Phase::Work => s.rep_peak = s.rep_peak.max(force),
            Phase::Countdown | Phase::RestBetweenHands | Phase::Rest | Phase::Finished => {}
        }
    }

    fn advance_phase(&mut self, cues: &mut Vec<Cue>) -> Option<SessionRecord> {
        let from = self.state.phase;
        let record = match from {
            Phase::Countdown => {
                self.begin_work(None, cues);
                None
            }
            Phase::WorkLeft => {
                self.commit(ActiveHand::Left, self.state.left_rep_peak);
                self.state.phase = Phase::RestBetweenHands;
                self.state.time_remaining_secs = HAND_SWITCH_REST_SECS;
                cues.extend(rest_cues());
                None
            }
            Phase::RestBetweenHands => {
                self.state.phase = Phase::WorkRight;
                self.state.current_hand = ActiveHand::Right;
                self.state.right_rep_peak = 0.0;
                self.state.time_remaining_secs = self.config.work_duration_secs;
                cues.extend(pull_cues("Right hand, Pull!".to_string()));
                None
            }
            Phase::WorkRight => {
                self.commit(ActiveHand::Right, self.state.right_rep_peak);
                self.rest_or_finish(cues)
            }
            Phase::Work => {
                let hand = self.state.current_hand;
                self.commit(hand, self.state.rep_peak);
                self.rest_or_finish(cues)
            }
            Phase::Rest => {
                self.state.current_rep += 1;
                let rep = self.state.current_rep;
                self.begin_work(Some(rep), cues);
                None
            }
            Phase::Finished => None,
        };
        debug!(?from, to = ?self.state.phase, rep = self.state.current_rep, "phase transition");
        record
    }

    /// Enter work for the configured hand; `rep` is set when coming back from rest
    fn begin_work(&mut self, rep: Option<u32>, cues: &mut Vec<Cue>) {
        let s = &mut self.state;
        match self.config.hand {
            Hand::Both => {
                s.phase = Phase::WorkLeft;
                s.current_hand = ActiveHand::Left;
                s.left_rep_peak = 0.0;
            }
            Hand::Left => {
                s.phase = Phase::Work;
                s.current_hand = ActiveHand::Left;
                s.rep_peak = 0.0;
            }
            Hand::Right => {
                s.phase = Phase::Work;
                s.current_hand = ActiveHand::Right;
                s.rep_peak = 0.0;
            }
        }
        s.time_remaining_secs = self.config.work_duration_secs;

        let announcement = match rep {
            Some(n) => format!("Rep {n}, {} hand", s.current_hand),
            None => format!("{} hand, Pull!", s.current_hand),
        };
        cues.extend(pull_cues(announcement));
    }

    fn commit(&mut self, hand: ActiveHand, peak: f64) {
        let s = &mut self.state;
        s.best_peak = s.best_peak.max(peak);
        match hand {
            ActiveHand::Left => s.left_hand_peaks.push(peak),
            ActiveHand::Right => s.right_hand_peaks.push(peak),
        }
        s.total_work_secs += self.config.work_duration_secs;
    }

    fn rest_or_finish(&mut self, cues: &mut Vec<Cue>) -> Option<SessionRecord> {
        if self.state.current_rep < self.config.rep_count {
            self.state.phase = Phase::Rest;
            self.state.time_remaining_secs = self.config.rest_secs;
            cues.extend(rest_cues());
            None
        } else {
            Some(self.finish(cues))
        }
    }

    fn finish(&mut self, cues: &mut Vec<Cue>) -> SessionRecord {
        self.running = false;
        self.state.phase = Phase::Finished;
        self.state.time_remaining_secs = 0.0;

        let now = self.clock.now();
        let elapsed_ms = (now - self.state.started_at).num_milliseconds().max(0);
        let s = &self.state;
        let average_force = if s.total_work_secs > 0.0 {
            s.best_peak * AVERAGE_FORCE_FACTOR
        } else {
            0.0
        };

        let record = SessionRecord {
            date: now,
            test_type: self.config.test_type,
            peak: s.best_peak,
            average_force,
            duration_secs: (elapsed_ms as f64 / 1000.0).round() as u64,
            reps: s.current_rep,
            hand: self.config.hand,
            left_peak: max_or_zero(&s.left_hand_peaks),
            right_peak: max_or_zero(&s.right_hand_peaks),
        };
        info!(
            peak = record.peak,
            reps = record.reps,
            duration_secs = record.duration_secs,
            "test finished"
        );

        cues.push(Cue::speech("Test complete!"));
        cues.push(Cue::delayed_tone(1000, 100, 0));
        cues.push(Cue::delayed_tone(1200, 100, 150));
        cues.push(Cue::delayed_tone(1400, 100, 300));
        cues.push(Cue::celebrate());
        record
    }
}

fn pull_cues(announcement: String) -> [Cue; 3] {
    [Cue::Speech(announcement), Cue::tone(1200, 200), Cue::buzz()]
}

fn rest_cues() -> [Cue; 3] {
    [Cue::speech("Rest"), Cue::tone(600, 200), Cue::double_buzz()]
}
