use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Cue {
    /// Sine beep, `offset_ms` after the start of its batch
    Tone {
        frequency_hz: u32,
        duration_ms: u32,
        offset_ms: u32,
    },
    Speech(String),
    /// Vibration pattern in ms (on, off, on, ...)
    Haptic(Vec<u32>),
}

impl Cue {
    pub fn tone(frequency_hz: u32, duration_ms: u32) -> Self {
        Cue::Tone {
            frequency_hz,
            duration_ms,
            offset_ms: 0,
        }
    }

    pub fn delayed_tone(frequency_hz: u32, duration_ms: u32, offset_ms: u32) -> Self {
        Cue::Tone {
            frequency_hz,
            duration_ms,
            offset_ms,
        }
    }

    pub fn speech(text: impl Into<String>) -> Self {
        Cue::Speech(text.into())
    }

    pub fn buzz() -> Self {
        Cue::Haptic(vec![50])
    }

    pub fn double_buzz() -> Self {
        Cue::Haptic(vec![100, 50, 100])
    }

    pub fn celebrate() -> Self {
        Cue::Haptic(vec![100, 50, 100, 50, 100])
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Cue::Tone { .. } | Cue::Speech(_))
    }
}

/// Consumer of cues; implementations swallow their own failures
pub trait CueSink {
    fn emit(&mut self, cue: Cue);

    fn emit_all(&mut self, cues: Vec<Cue>) {
        for cue in cues {
            self.emit(cue);
        }
    }
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCueSink;

impl CueSink for NullCueSink {
    fn emit(&mut self, _cue: Cue) {}
}

/// Keeps every cue, clones share the same buffer
#[derive(Debug, Default, Clone)]
pub struct RecordingCueSink {
    cues: Arc<Mutex<Vec<Cue>>>,
}

impl RecordingCueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.cues()
            .into_iter()
            .filter_map(|c| match c {
                Cue::Speech(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut c) = self.cues.lock() {
            c.clear();
        }
    }
}

impl CueSink for RecordingCueSink {
    fn emit(&mut self, cue: Cue) {
        if let Ok(mut c) = self.cues.lock() {
            c.push(cue);
        }
    }
}

/// Renders cues as log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCueSink;

impl CueSink for TracingCueSink {
    fn emit(&mut self, cue: Cue) {
        match cue {
            Cue::Tone {
                frequency_hz,
                duration_ms,
                offset_ms,
            } => tracing::debug!(frequency_hz, duration_ms, offset_ms, "tone"),
            Cue::Speech(text) => tracing::info!(target: "gripmeter::speech", "{text}"),
            Cue::Haptic(pattern) => tracing::debug!(?pattern, "haptic"),
        }
    }
}

/// Applies audio and haptic preferences before forwarding
#[derive(Debug, Clone)]
pub struct GatedCueSink<S: CueSink> {
    inner: S,
    pub audio_enabled: bool,
    pub haptic_enabled: bool,
}

impl<S: CueSink> GatedCueSink<S> {
    pub fn new(inner: S, audio_enabled: bool, haptic_enabled: bool) -> Self {
        Self {
            inner,
            audio_enabled,
            haptic_enabled,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: CueSink> CueSink for GatedCueSink<S> {
    fn emit(&mut self, cue: Cue) {
        let allowed = if cue.is_audio() {
            self.audio_enabled
        } else {
            self.haptic_enabled
        };
        if allowed {
            self.inner.emit(cue);
        }
    }
}
