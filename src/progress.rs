use serde::Serialize;

pub const SCAN_TICK_MS: u64 = 100;
pub const DOWNLOAD_TICK_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanStep {
    pub id: &'static str,
    pub label: &'static str,
    pub duration_ms: u64,
}

const fn step(id: &'static str, label: &'static str, duration_ms: u64) -> ScanStep {
    ScanStep {
        id,
        label,
        duration_ms,
    }
}

pub const SCAN_STEPS: [ScanStep; 10] = [
    step("calibrating", "Calibrating scanner optics", 2000),
    step("pl_frames", "Capturing PL frames", 3000),
    step("xpl_frames", "Capturing XPL frames", 3000),
    step("tiff_stack", "Generating raw TIFF stack", 4000),
    step("metadata", "Extracting metadata", 2000),
    step("thumbnails", "Generating thumbnails", 2500),
    step("deepzoom", "Preparing DeepZoom tiles", 3500),
    step("verifying", "Verifying dataset", 2000),
    step("uploading", "Uploading to repository", 3000),
    step("checksum", "Final checksum verification", 1500),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub completed_now: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressSimulator {
    total_ms: u64,
    percent: f64,
    completed: bool,
}

impl ProgressSimulator {
    pub fn new(total_ms: u64) -> Self {
        Self {
            total_ms,
            percent: 0.0,
            completed: false,
        }
    }

    pub fn percent_at(elapsed_ms: u64, total_ms: u64) -> f64 {
        if total_ms == 0 {
            return 100.0;
        }
        (elapsed_ms as f64 / total_ms as f64 * 100.0).min(100.0)
    }

    pub fn advance(&mut self, elapsed_ms: u64) -> ProgressUpdate {
        let percent = Self::percent_at(elapsed_ms, self.total_ms);
        self.percent = self.percent.max(percent);
        let completed_now = !self.completed && self.percent >= 100.0;
        if completed_now {
            self.completed = true;
        }
        ProgressUpdate {
            percent: self.percent,
            completed_now,
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPosition {
    pub active: usize,
    pub completed: usize,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct StepSnapshot<'a> {
    pub active: &'a ScanStep,
    pub completed: Vec<&'a str>,
    pub finished_now: bool,
}

impl StepSnapshot<'_> {
    pub fn active_id(&self) -> &str {
        self.active.id
    }
}

#[derive(Debug, Clone)]
pub struct StepSequencer {
    steps: Vec<ScanStep>,
    boundaries: Vec<u64>,
    finished: bool,
}

impl StepSequencer {
    pub fn new(steps: Vec<ScanStep>) -> Self {
        assert!(!steps.is_empty(), "step sequence must contain at least one step");
        let boundaries = steps
            .iter()
            .scan(0u64, |acc, step| {
                *acc += step.duration_ms;
                Some(*acc)
            })
            .collect();
        Self {
            steps,
            boundaries,
            finished: false,
        }
    }

    pub fn scan() -> Self {
        Self::new(SCAN_STEPS.to_vec())
    }

    pub fn steps(&self) -> &[ScanStep] {
        &self.steps
    }

    pub fn total_ms(&self) -> u64 {
        self.boundaries.last().copied().unwrap_or(0)
    }

    pub fn position_at(&self, elapsed_ms: u64) -> StepPosition {
        match self
            .boundaries
            .iter()
            .position(|boundary| elapsed_ms < *boundary)
        {
            Some(active) => StepPosition {
                active,
                completed: active,
                finished: false,
            },
            None => StepPosition {
                active: self.steps.len() - 1,
                completed: self.steps.len(),
                finished: true,
            },
        }
    }

    pub fn advance(&mut self, elapsed_ms: u64) -> StepSnapshot<'_> {
        let position = self.position_at(elapsed_ms);
        let finished_now = position.finished && !self.finished;
        if position.finished {
            self.finished = true;
        }
        StepSnapshot {
            active: &self.steps[position.active],
            completed: self.steps[..position.completed]
                .iter()
                .map(|step| step.id)
                .collect(),
            finished_now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
