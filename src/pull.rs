pub const PULL_START_KG: f64 = 5.0;
pub const PULL_END_KG: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PullEdge {
    /// Nothing changed this sample
    None,
    Started,
    /// Pull ended, carrying its peak
    Completed(f64),
}

#[derive(Debug, Clone)]
pub struct PullDetector {
    start_kg: f64,
    end_kg: f64,
    in_progress: bool,
    peak: f64,
}

impl Default for PullDetector {
    fn default() -> Self {
        Self::new(PULL_START_KG, PULL_END_KG)
    }
}

impl PullDetector {
    pub fn new(start_kg: f64, end_kg: f64) -> Self {
        debug_assert!(end_kg < start_kg);
        Self {
            start_kg,
            end_kg,
            in_progress: false,
            peak: 0.0,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Running maximum of the current pull, 0 when idle
    pub fn peak_so_far(&self) -> f64 {
        if self.in_progress {
            self.peak
        } else {
            0.0
        }
    }

    pub fn feed(&mut self, force: f64) -> PullEdge {
        let mut edge = PullEdge::None;

        if !self.in_progress && force > self.start_kg {
            self.in_progress = true;
            self.peak = 0.0;
            edge = PullEdge::Started;
        }

        if self.in_progress && force > self.peak {
            self.peak = force;
        }

        if self.in_progress && force < self.end_kg {
            self.in_progress = false;
            return PullEdge::Completed(self.peak);
        }

        edge
    }

    pub fn reset(&mut self) {
        self.in_progress = false;
        self.peak = 0.0;
    }
}
