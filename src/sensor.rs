use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait ForceSource {
    /// Latest reading in kg
    fn current_force(&self) -> f64;

    fn is_connected(&self) -> bool {
        true
    }
}

/// Lock-free cell a reader thread writes into
#[derive(Debug, Clone, Default)]
pub struct SharedForce {
    bits: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
}

impl SharedForce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, kg: f64) {
        self.bits.store(kg.to_bits(), Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        if !connected {
            self.set(0.0);
        }
    }
}

impl ForceSource for SharedForce {
    fn current_force(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Shape of the simulated pulls, in kg and ticks
#[derive(Debug, Clone, PartialEq)]
pub struct PullProfile {
    pub peak_min_kg: f64,
    pub peak_max_kg: f64,
    pub pull_ticks: (u32, u32),
    pub rest_ticks: (u32, u32),
    pub noise_kg: f64,
}

impl Default for PullProfile {
    fn default() -> Self {
        Self {
            peak_min_kg: 25.0,
            peak_max_kg: 55.0,
            pull_ticks: (30, 80),
            rest_ticks: (10, 30),
            noise_kg: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Wave {
    Resting { remaining: u32 },
    Pulling { tick: u32, length: u32, peak: f64 },
}

/// Seeded stand-in for a device producing noisy half-sine pulls
#[derive(Debug)]
pub struct SimulatedSensor {
    rng: StdRng,
    profile: PullProfile,
    wave: Wave,
    output: SharedForce,
}

impl SimulatedSensor {
    pub fn new(seed: u64, profile: PullProfile) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let remaining = rng.gen_range(profile.rest_ticks.0..=profile.rest_ticks.1);
        let output = SharedForce::new();
        output.set_connected(true);
        Self {
            rng,
            profile,
            wave: Wave::Resting { remaining },
            output,
        }
    }

    /// Handle other threads can read
    pub fn shared(&self) -> SharedForce {
        self.output.clone()
    }

    /// Produce the next sample and publish it
    pub fn advance(&mut self) -> f64 {
        let noise = self.rng.gen_range(0.0..=self.profile.noise_kg);
        let (force, next) = match self.wave {
            Wave::Resting { remaining } if remaining > 0 => (
                noise,
                Wave::Resting {
                    remaining: remaining - 1,
                },
            ),
            Wave::Resting { .. } => {
                let (lo, hi) = self.profile.pull_ticks;
                let length = self.rng.gen_range(lo..=hi).max(2);
                let peak = self
                    .rng
                    .gen_range(self.profile.peak_min_kg..=self.profile.peak_max_kg);
                (
                    noise,
                    Wave::Pulling {
                        tick: 0,
                        length,
                        peak,
                    },
                )
            }
            Wave::Pulling { tick, length, peak } if tick < length => {
                let shape = (PI * f64::from(tick) / f64::from(length)).sin();
                (
                    peak * shape + noise,
                    Wave::Pulling {
                        tick: tick + 1,
                        length,
                        peak,
                    },
                )
            }
            Wave::Pulling { .. } => {
                let (lo, hi) = self.profile.rest_ticks;
                (
                    noise,
                    Wave::Resting {
                        remaining: self.rng.gen_range(lo..=hi),
                    },
                )
            }
        };
        self.wave = next;
        self.output.set(force);
        force
    }
}

impl ForceSource for SimulatedSensor {
    fn current_force(&self) -> f64 {
        self.output.current_force()
    }

    fn is_connected(&self) -> bool {
        self.output.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pull::{PullDetector, PullEdge};

    #[test]
    fn shared_force_is_visible_through_clones() {
        let writer = SharedForce::new();
        let reader = writer.clone();
        writer.set(31.25);
        assert_eq!(reader.current_force(), 31.25);
    }

    #[test]
    fn disconnect_zeroes_the_reading() {
        let force = SharedForce::new();
        force.set_connected(true);
        force.set(12.0);
        force.set_connected(false);
        assert!(!force.is_connected());
        assert_eq!(force.current_force(), 0.0);
    }

    #[test]
    fn same_seed_same_signal() {
        let mut a = SimulatedSensor::new(7, PullProfile::default());
        let mut b = SimulatedSensor::new(7, PullProfile::default());
        for _ in 0..200 {
            assert_eq!(a.advance(), b.advance());
        }
    }

    #[test]
    fn simulated_pulls_are_detected_within_profile() {
        let profile = PullProfile::default();
        let mut sensor = SimulatedSensor::new(42, profile.clone());
        let mut detector = PullDetector::default();
        let mut peaks = Vec::new();
        for _ in 0..1000 {
            let force = sensor.advance();
            assert!(force >= 0.0);
            if let PullEdge::Completed(peak) = detector.feed(force) {
                peaks.push(peak);
            }
        }
        assert!(peaks.len() >= 5);
        assert!(peaks
            .iter()
            .all(|p| *p <= profile.peak_max_kg + profile.noise_kg));
    }
}
