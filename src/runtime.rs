use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Driver period. Phase timers advance by exactly this much per tick.
pub const TICK_RATE_MS: u64 = 100;
pub const TICK_SECS: f64 = TICK_RATE_MS as f64 / 1000.0;

/// User commands that can interrupt the tick stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Stop,
    Quit,
}

/// Unified event type consumed by the driver loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverEvent {
    Command(Command),
    Tick,
}

/// Source of user commands.
pub trait CommandSource: Send + 'static {
    /// Block for up to `timeout` waiting for a command.
    fn recv_timeout(&self, timeout: Duration) -> Result<DriverEvent, RecvTimeoutError>;
}

/// Reads `s`/`stop` and `q`/`quit` lines from stdin on a background thread.
pub struct StdinCommandSource {
    rx: Receiver<DriverEvent>,
}

impl StdinCommandSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let cmd = match line.trim() {
                    "s" | "stop" => Command::Stop,
                    "q" | "quit" => Command::Quit,
                    _ => continue,
                };
                if tx.send(DriverEvent::Command(cmd)).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for StdinCommandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSource for StdinCommandSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<DriverEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Channel-fed source for tests and scripted runs
pub struct ChannelCommandSource {
    rx: Receiver<DriverEvent>,
}

impl ChannelCommandSource {
    pub fn new(rx: Receiver<DriverEvent>) -> Self {
        Self { rx }
    }
}

impl CommandSource for ChannelCommandSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<DriverEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICK_RATE_MS))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Runner that advances the driver one command/tick at a time
pub struct Runner<E: CommandSource, T: Ticker> {
    commands: E,
    ticker: T,
}

impl<E: CommandSource, T: Ticker> Runner<E, T> {
    pub fn new(commands: E, ticker: T) -> Self {
        Self { commands, ticker }
    }

    /// Blocks up to tick interval and returns the next command, or Tick on timeout
    pub fn step(&self) -> DriverEvent {
        match self.commands.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                DriverEvent::Tick
            }
        }
    }
}

/// Result of advancing a machine by one tick (or stopping it): the display
/// snapshot, cues to hand to a `CueSink`, and at most once per run the
/// machine's final result.
#[derive(Debug, Clone, PartialEq)]
pub struct Step<S, R> {
    pub snapshot: S,
    pub cues: Vec<crate::cue::Cue>,
    pub result: Option<R>,
}

impl<S, R> Step<S, R> {
    pub fn quiet(snapshot: S) -> Self {
        Self {
            snapshot,
            cues: Vec::new(),
            result: None,
        }
    }
}

/// Wall clock. Only used for the reported session date and duration;
/// phase timing never reads it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }
}
