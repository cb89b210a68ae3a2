use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::competition::{
    CompSnapshot, CompetitionConfig, CompetitionContext, CompetitionEngine, CompetitionSummary,
    CompetitionType,
};
use crate::config::Settings;
use crate::cue::CueSink;
use crate::error::{GripError, Result};
use crate::runtime::{Clock, Step};
use crate::sequencer::{PhaseSnapshot, TestConfig, TestSequencer, TestType};
use crate::session::{SessionRecord, SessionSink};

/// Token for the run a `start_*` call created
#[derive(Debug, PartialEq, Eq)]
pub struct RunHandle {
    id: u64,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "run", rename_all = "lowercase")]
pub enum Snapshot {
    Test(PhaseSnapshot),
    Competition(CompSnapshot),
}

impl Snapshot {
    pub fn is_finished(&self) -> bool {
        match self {
            Snapshot::Test(s) => s.phase == crate::sequencer::Phase::Finished,
            Snapshot::Competition(s) => s.phase == crate::competition::CompetitionPhase::Finished,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "run", rename_all = "lowercase")]
pub enum RunOutcome {
    Session(SessionRecord),
    Competition(CompetitionSummary),
}

#[derive(Debug)]
enum ActiveRun {
    Test(TestSequencer),
    Competition(CompetitionEngine),
}

/// Run that ended on its own, outcome not collected yet
#[derive(Debug)]
struct FinishedRun {
    id: u64,
    snapshot: Snapshot,
    outcome: Option<RunOutcome>,
}

pub struct Console<C: CueSink, S: SessionSink> {
    settings: Settings,
    cues: C,
    sessions: S,
    clock: Arc<dyn Clock>,
    signal_connected: bool,
    level_targets: Option<Vec<f64>>,
    setup: Option<TestConfig>,
    active: Option<(u64, ActiveRun)>,
    finished: Option<FinishedRun>,
    next_id: u64,
}

impl<C: CueSink, S: SessionSink> Console<C, S> {
    pub fn new(settings: Settings, cues: C, sessions: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            cues,
            sessions,
            clock,
            signal_connected: false,
            level_targets: None,
            setup: None,
            active: None,
            finished: None,
            next_id: 1,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn set_signal_connected(&mut self, connected: bool) {
        if self.signal_connected != connected {
            info!(connected, "force signal");
        }
        self.signal_connected = connected;
    }

    /// Custom ladder for the flying game
    pub fn set_level_targets(&mut self, levels: Option<Vec<f64>>) {
        self.level_targets = levels;
    }

    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn pending_setup(&self) -> Option<&TestConfig> {
        self.setup.as_ref()
    }

    /// Open a setup for `test_type` with its stock parameters
    pub fn prepare_test(&mut self, test_type: TestType) -> Result<TestConfig> {
        self.ensure_idle()?;
        let config = TestConfig::preset(test_type);
        self.setup = Some(config.clone());
        Ok(config)
    }

    /// Close a setup that was never started
    pub fn abort_setup(&mut self) {
        if let Some(config) = self.setup.take() {
            debug!(test_type = %config.test_type, "setup discarded");
        }
    }

    pub fn start_test(&mut self, config: TestConfig) -> Result<RunHandle> {
        self.ensure_startable()?;
        let (sequencer, cues) = TestSequencer::start(config, Arc::clone(&self.clock))?;
        self.setup = None;
        self.cues.emit_all(cues);
        Ok(self.activate(ActiveRun::Test(sequencer)))
    }

    pub fn configure_competition(&self, kind: CompetitionType) -> Result<CompetitionConfig> {
        let context = CompetitionContext {
            body_weight_kg: Some(self.settings.body_weight_kg),
            level_targets: self.level_targets.clone(),
        };
        CompetitionEngine::configure(kind, &context)
    }

    pub fn start_competition(&mut self, config: CompetitionConfig) -> Result<RunHandle> {
        self.ensure_startable()?;
        let mut engine = CompetitionEngine::new(config);
        let cues = engine.start()?;
        self.setup = None;
        self.cues.emit_all(cues);
        Ok(self.activate(ActiveRun::Competition(engine)))
    }

    /// Advance the run by one tick with this force sample
    pub fn tick(&mut self, handle: &RunHandle, force: f64) -> Result<Snapshot> {
        if let Some(done) = self.finished.as_ref().filter(|f| f.id == handle.id) {
            return Ok(done.snapshot.clone());
        }
        let Some((id, run)) = self.active.as_mut() else {
            return Err(GripError::invalid_state(format!(
                "run {} is not active",
                handle.id
            )));
        };
        if *id != handle.id {
            return Err(GripError::invalid_state(format!(
                "run {} is not active (active run is {id})",
                handle.id
            )));
        }

        let (snapshot, cues, outcome) = match run {
            ActiveRun::Test(seq) => split(seq.tick(force), Snapshot::Test, RunOutcome::Session),
            ActiveRun::Competition(engine) => split(
                engine.tick(force),
                Snapshot::Competition,
                RunOutcome::Competition,
            ),
        };
        self.cues.emit_all(cues);

        if let Some(outcome) = outcome {
            self.persist(&outcome);
            self.active = None;
            self.finished = Some(FinishedRun {
                id: handle.id,
                snapshot: snapshot.clone(),
                outcome: Some(outcome),
            });
        }
        Ok(snapshot)
    }

    /// End the run, or collect the outcome of one that already ended
    pub fn stop(&mut self, handle: RunHandle) -> Option<RunOutcome> {
        if let Some(done) = self.finished.as_mut().filter(|f| f.id == handle.id) {
            let outcome = done.outcome.take();
            self.finished = None;
            return outcome;
        }

        match self.active.take() {
            Some((id, mut run)) if id == handle.id => {
                let (_, cues, outcome) = match &mut run {
                    ActiveRun::Test(seq) => split(seq.stop(), Snapshot::Test, RunOutcome::Session),
                    ActiveRun::Competition(engine) => {
                        split(engine.stop(), Snapshot::Competition, RunOutcome::Competition)
                    }
                };
                self.cues.emit_all(cues);
                if let Some(outcome) = &outcome {
                    self.persist(outcome);
                }
                info!(run = id, "run stopped");
                outcome
            }
            other => {
                self.active = other;
                debug!(run = handle.id, "stop on stale handle ignored");
                None
            }
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.active {
            Some((id, _)) => Err(GripError::invalid_state(format!("run {id} is active"))),
            None => Ok(()),
        }
    }

    fn ensure_startable(&self) -> Result<()> {
        self.ensure_idle()?;
        if !self.signal_connected {
            return Err(GripError::invalid_state("no force signal connected"));
        }
        Ok(())
    }

    fn activate(&mut self, run: ActiveRun) -> RunHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.finished = None;
        self.active = Some((id, run));
        debug!(run = id, "run activated");
        RunHandle { id }
    }

    /// Write test sessions to history, logging sink failures
    fn persist(&mut self, outcome: &RunOutcome) {
        if let RunOutcome::Session(record) = outcome {
            if let Err(e) = self.sessions.persist(record) {
                warn!(error = %e, "failed to persist session");
            }
        }
    }
}

fn split<Sn, R>(
    step: Step<Sn, R>,
    snapshot: impl FnOnce(Sn) -> Snapshot,
    outcome: impl FnOnce(R) -> RunOutcome,
) -> (Snapshot, Vec<crate::cue::Cue>, Option<RunOutcome>) {
    (snapshot(step.snapshot), step.cues, step.result.map(outcome))
}
