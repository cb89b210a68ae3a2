use std::{error::Error, sync::Arc, time::Duration};

use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand};
use gripmeter::{
    competition::CompetitionType,
    config::{FileSettingsStore, Settings, SettingsStore},
    console::{Console, RunHandle, RunOutcome, Snapshot},
    cue::{CueSink, GatedCueSink, TracingCueSink},
    logging::{init_logging, LogFormat, LogLevel},
    runtime::{
        Clock, Command, CommandSource, DriverEvent, FixedTicker, ManualClock, Runner,
        StdinCommandSource, SystemClock, Ticker, TICK_RATE_MS,
    },
    sensor::{ForceSource, PullProfile, SimulatedSensor},
    sequencer::{Hand, TestConfig, TestType},
    session::{SessionRecord, SessionSink},
    stats::SessionDb,
};

/// grip strength protocols and force mini-games for hangboard force sensors
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs timed grip strength protocols (peak, endurance, repeaters, RFD, critical force, to failure) and scored force mini-games, keeping a local history of finished sessions."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// log verbosity; RUST_LOG takes precedence when set
    #[clap(long, value_enum, global = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// log output format
    #[clap(long, value_enum, global = true, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// run a training protocol against the simulated sensor
    Test(TestArgs),
    /// play a force mini-game against the simulated sensor
    Compete(CompeteArgs),
    /// list recent sessions, newest first
    History {
        /// number of sessions to show
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// print as JSON lines
        #[clap(long)]
        json: bool,
    },
    /// show aggregate training statistics
    Stats {
        /// print as JSON
        #[clap(long)]
        json: bool,
    },
    /// delete every recorded session
    ClearHistory {
        /// required confirmation
        #[clap(long)]
        yes: bool,
    },
    /// show or change persisted settings
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum SettingsAction {
    /// print current settings
    Show,
    /// update one or more settings
    Set {
        /// body weight in kg, used by the target game
        #[clap(long)]
        body_weight: Option<f64>,
        /// enable tones and speech
        #[clap(long)]
        audio: Option<bool>,
        /// enable vibration
        #[clap(long)]
        haptic: Option<bool>,
        /// start a prepared test as soon as force passes the threshold
        #[clap(long)]
        auto_start: Option<bool>,
        /// auto start threshold in kg
        #[clap(long)]
        auto_start_threshold: Option<f64>,
    },
}

#[derive(Args, Debug, Clone)]
struct SimArgs {
    /// run ticks back to back instead of every 100 ms
    #[clap(long)]
    fast: bool,

    /// seed for the simulated sensor
    #[clap(long, default_value_t = 1)]
    seed: u64,
}

#[derive(Args, Debug, Clone)]
struct TestArgs {
    /// protocol to run
    #[clap(value_enum)]
    test_type: TestType,

    /// seconds per work phase (protocol default when omitted)
    #[clap(short = 'd', long)]
    duration: Option<f64>,

    /// number of reps
    #[clap(short = 'r', long)]
    reps: Option<u32>,

    /// seconds of rest between reps
    #[clap(long)]
    rest: Option<f64>,

    /// hand(s) to test
    #[clap(long, value_enum, default_value_t = Hand::Both)]
    hand: Hand,

    /// do not write the result to history
    #[clap(long)]
    no_save: bool,

    #[clap(flatten)]
    sim: SimArgs,
}

impl TestArgs {
    fn to_test_config(&self) -> TestConfig {
        let preset = TestConfig::preset(self.test_type);
        TestConfig {
            work_duration_secs: self.duration.unwrap_or(preset.work_duration_secs),
            rep_count: self.reps.unwrap_or(preset.rep_count),
            rest_secs: self.rest.unwrap_or(preset.rest_secs),
            hand: self.hand,
            ..preset
        }
    }
}

#[derive(Args, Debug, Clone)]
struct CompeteArgs {
    /// game to play
    #[clap(value_enum)]
    kind: CompetitionType,

    /// body weight override for this game, in kg
    #[clap(long)]
    body_weight: Option<f64>,

    /// comma separated level targets for the flying game
    #[clap(long, value_delimiter = ',')]
    levels: Vec<f64>,

    #[clap(flatten)]
    sim: SimArgs,
}

/// Discards sessions for `--no-save` runs.
struct NoHistory;

impl SessionSink for NoHistory {
    fn persist(&mut self, _record: &SessionRecord) -> gripmeter::Result<()> {
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format)?;

    let store = FileSettingsStore::new();
    match cli.command {
        Commands::Test(args) => run_test(&args, store.load()),
        Commands::Compete(args) => run_competition(&args, store.load()),
        Commands::History { limit, json } => show_history(limit, json),
        Commands::Stats { json } => show_stats(json),
        Commands::ClearHistory { yes } => clear_history(yes),
        Commands::Settings { action } => update_settings(&store, action),
    }
}

fn run_test(args: &TestArgs, settings: Settings) -> Result<(), Box<dyn Error>> {
    let config = args.to_test_config();
    config.validate()?;
    println!(
        "{} | {} x {}s, rest {}s, hand {}",
        config.test_type.title(),
        config.rep_count,
        config.work_duration_secs,
        config.rest_secs,
        config.hand
    );
    println!("type `s` + enter to stop, `q` + enter to quit");

    let outcome = if args.no_save {
        drive_test(config, settings, NoHistory, &args.sim)?
    } else {
        drive_test(config, settings, SessionDb::open_default()?, &args.sim)?
    };

    if let Some(RunOutcome::Session(record)) = outcome {
        print_session(&record);
    }
    Ok(())
}

fn drive_test<S: SessionSink>(
    config: TestConfig,
    settings: Settings,
    sessions: S,
    sim: &SimArgs,
) -> Result<Option<RunOutcome>, Box<dyn Error>> {
    let (mut console, mut driver) = setup(settings, sessions, sim);
    let handle = console.start_test(config)?;
    driver.run(&mut console, handle)
}

fn run_competition(args: &CompeteArgs, mut settings: Settings) -> Result<(), Box<dyn Error>> {
    if let Some(bw) = args.body_weight {
        settings.body_weight_kg = bw;
        settings.validate()?;
    }
    let (mut console, mut driver) = setup(settings, NoHistory, &args.sim);
    if !args.levels.is_empty() {
        console.set_level_targets(Some(args.levels.clone()));
    }
    let config = console.configure_competition(args.kind)?;
    println!("{} | {} attempt(s)", args.kind.title(), config.max_attempts);
    if let Some(target) = config.target_force {
        println!("target: {target} kg");
    }
    println!("type `s` + enter to stop, `q` + enter to quit");

    let handle = console.start_competition(config)?;
    if let Some(RunOutcome::Competition(summary)) = driver.run(&mut console, handle)? {
        println!();
        println!("{}", summary.outcome.headline());
        for (i, peak) in summary.results.iter().enumerate() {
            println!("  pull {}: {peak:.1} kg", i + 1);
        }
        println!("score: {:.1} ({:?})", summary.score, summary.completion);
    }
    Ok(())
}

type CliConsole<S> = Console<GatedCueSink<TracingCueSink>, S>;

fn setup<S: SessionSink>(
    settings: Settings,
    sessions: S,
    sim: &SimArgs,
) -> (CliConsole<S>, Driver<StdinCommandSource, FixedTicker>) {
    let cues = GatedCueSink::new(
        TracingCueSink,
        settings.audio_enabled,
        settings.haptic_enabled,
    );

    // In fast mode the wall clock barely moves, so the reported duration
    // follows simulated time instead.
    let sim_clock = sim.fast.then(|| ManualClock::new(Utc::now()));
    let clock: Arc<dyn Clock> = match &sim_clock {
        Some(manual) => Arc::new(manual.clone()),
        None => Arc::new(SystemClock),
    };
    let interval = if sim.fast {
        Duration::ZERO
    } else {
        Duration::from_millis(TICK_RATE_MS)
    };

    let sensor = SimulatedSensor::new(sim.seed, PullProfile::default());
    let mut console = Console::new(settings, cues, sessions, clock);
    console.set_signal_connected(sensor.is_connected());

    let driver = Driver {
        runner: Runner::new(StdinCommandSource::new(), FixedTicker::new(interval)),
        sensor,
        sim_clock,
    };
    (console, driver)
}

struct Driver<E: CommandSource, T: Ticker> {
    runner: Runner<E, T>,
    sensor: SimulatedSensor,
    sim_clock: Option<ManualClock>,
}

impl<E: CommandSource, T: Ticker> Driver<E, T> {
    fn run<C: CueSink, S: SessionSink>(
        &mut self,
        console: &mut Console<C, S>,
        handle: RunHandle,
    ) -> Result<Option<RunOutcome>, Box<dyn Error>> {
        let mut ticks: u64 = 0;
        loop {
            match self.runner.step() {
                DriverEvent::Command(Command::Stop) | DriverEvent::Command(Command::Quit) => {
                    return Ok(console.stop(handle));
                }
                DriverEvent::Tick => {
                    if let Some(clock) = &self.sim_clock {
                        clock.advance(chrono::Duration::milliseconds(TICK_RATE_MS as i64));
                    }
                    let force = self.sensor.advance();
                    let snapshot = console.tick(&handle, force)?;
                    if ticks % 10 == 0 || snapshot.is_finished() {
                        print_snapshot(&snapshot);
                    }
                    ticks += 1;
                    if snapshot.is_finished() {
                        return Ok(console.stop(handle));
                    }
                }
            }
        }
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    match snapshot {
        Snapshot::Test(s) => println!(
            "{:>8} {:<24} {:>5}  {}  force {:>5.1} kg  peak {:>5.1} kg",
            s.timer_display(),
            s.phase.instruction(),
            s.rep_display(),
            s.hand.map(|h| h.to_string()).unwrap_or_default(),
            s.force,
            s.current_peak.max(s.best_peak),
        ),
        Snapshot::Competition(s) => println!(
            "{:<16} {:<18} {:<16} {:<20} force {:>5.1} kg",
            s.instruction.key(),
            s.attempt_display,
            s.target_display,
            s.score_display,
            s.force,
        ),
    }
}

fn print_session(record: &SessionRecord) {
    println!();
    println!("peak:      {:.1} kg", record.peak);
    println!("average:   {:.1} kg", record.average_force);
    println!("duration:  {}s", record.duration_secs);
    println!("reps:      {}", record.reps);
    if record.hand == Hand::Both {
        println!("left:      {:.1} kg", record.left_peak);
        println!("right:     {:.1} kg", record.right_peak);
        if let Some(ratio) = record.hand_ratio() {
            println!("L/R ratio: {:.2}", ratio);
        }
    }
}

fn show_history(limit: usize, json: bool) -> Result<(), Box<dyn Error>> {
    let db = SessionDb::open_default()?;
    let sessions = db.recent(limit)?;
    if sessions.is_empty() {
        println!("no sessions recorded yet");
        return Ok(());
    }
    for s in sessions {
        if json {
            println!("{}", serde_json::to_string(&s)?);
        } else {
            println!(
                "{}  {:<10} {:>6.1} kg  avg {:>5.1} kg  {:>4}s  {} rep(s)  {}",
                s.date.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                s.test_type,
                s.peak,
                s.average_force,
                s.duration_secs,
                s.reps,
                s.hand,
            );
        }
    }
    Ok(())
}

fn show_stats(json: bool) -> Result<(), Box<dyn Error>> {
    let db = SessionDb::open_default()?;
    let stats = db.history_stats(Local::now())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("all-time peak:  {:.1} kg", stats.all_time_peak);
        println!("sessions:       {}", stats.total_sessions);
        println!("this week:      {}", stats.sessions_this_week);
        println!("average peak:   {:.1} kg", stats.average_peak);
        println!("streak:         {} day(s)", stats.streak_days);
    }
    Ok(())
}

fn clear_history(yes: bool) -> Result<(), Box<dyn Error>> {
    if !yes {
        return Err("refusing to clear history without --yes".into());
    }
    SessionDb::open_default()?.clear()?;
    println!("history cleared");
    Ok(())
}

fn update_settings(
    store: &FileSettingsStore,
    action: SettingsAction,
) -> Result<(), Box<dyn Error>> {
    let mut settings = store.load();
    if let SettingsAction::Set {
        body_weight,
        audio,
        haptic,
        auto_start,
        auto_start_threshold,
    } = action
    {
        if let Some(bw) = body_weight {
            settings.body_weight_kg = bw;
        }
        if let Some(audio) = audio {
            settings.audio_enabled = audio;
        }
        if let Some(haptic) = haptic {
            settings.haptic_enabled = haptic;
        }
        if let Some(enabled) = auto_start {
            settings.auto_start_enabled = enabled;
        }
        if let Some(kg) = auto_start_threshold {
            settings.auto_start_threshold_kg = kg;
        }
        store.save(&settings)?;
    }
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_defaults_to_preset() {
        let cli = Cli::parse_from(["gripmeter", "test", "repeaters"]);
        let Commands::Test(args) = cli.command else {
            panic!("expected test subcommand");
        };
        let cfg = args.to_test_config();
        assert_eq!(cfg, TestConfig::preset(TestType::Repeaters));
        assert!(!args.sim.fast);
        assert_eq!(args.sim.seed, 1);
    }

    #[test]
    fn test_subcommand_overrides() {
        let cli = Cli::parse_from([
            "gripmeter", "test", "rfd", "-d", "4", "-r", "2", "--rest", "6", "--hand", "left",
            "--fast", "--seed", "9",
        ]);
        let Commands::Test(args) = cli.command else {
            panic!("expected test subcommand");
        };
        let cfg = args.to_test_config();
        assert_eq!(cfg.test_type, TestType::Rfd);
        assert_eq!(cfg.work_duration_secs, 4.0);
        assert_eq!(cfg.rep_count, 2);
        assert_eq!(cfg.rest_secs, 6.0);
        assert_eq!(cfg.hand, Hand::Left);
        assert!(args.sim.fast);
        assert_eq!(args.sim.seed, 9);
    }

    #[test]
    fn compete_parses_level_list() {
        let cli = Cli::parse_from(["gripmeter", "compete", "flying", "--levels", "10,15,20"]);
        let Commands::Compete(args) = cli.command else {
            panic!("expected compete subcommand");
        };
        assert_eq!(args.kind, CompetitionType::Flying);
        assert_eq!(args.levels, vec![10.0, 15.0, 20.0]);
    }

    #[test]
    fn unknown_test_type_is_rejected() {
        assert!(Cli::try_parse_from(["gripmeter", "test", "deadhang"]).is_err());
    }

    #[test]
    fn global_log_flags() {
        let cli = Cli::parse_from([
            "gripmeter",
            "stats",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::Stats { json: false }));
    }

    #[test]
    fn settings_set_parses_flags() {
        let cli = Cli::parse_from([
            "gripmeter",
            "settings",
            "set",
            "--body-weight",
            "68.5",
            "--audio",
            "false",
            "--auto-start",
            "true",
        ]);
        match cli.command {
            Commands::Settings {
                action:
                    SettingsAction::Set {
                        body_weight,
                        audio,
                        haptic,
                        auto_start,
                        auto_start_threshold,
                    },
            } => {
                assert_eq!(body_weight, Some(68.5));
                assert_eq!(audio, Some(false));
                assert_eq!(haptic, None);
                assert_eq!(auto_start, Some(true));
                assert_eq!(auto_start_threshold, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn fast_driver_finishes_a_short_test() {
        let sim = SimArgs {
            fast: true,
            seed: 3,
        };
        let config = TestConfig {
            test_type: TestType::Peak,
            work_duration_secs: 1.0,
            rep_count: 1,
            rest_secs: 1.0,
            hand: Hand::Right,
        };
        let outcome = drive_test(config, Settings::default(), NoHistory, &sim).unwrap();
        match outcome {
            Some(RunOutcome::Session(record)) => {
                assert_eq!(record.reps, 1);
                assert_eq!(record.duration_secs, 4);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
