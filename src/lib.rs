// Library surface for the binary, headless drivers and integration tests.
pub mod app_dirs;
pub mod competition;
pub mod config;
pub mod console;
pub mod cue;
pub mod error;
pub mod logging;
pub mod pull;
pub mod runtime;
pub mod sensor;
pub mod sequencer;
pub mod session;
pub mod stats;
pub mod util;

pub use error::{GripError, Result};
