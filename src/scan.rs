use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::BatchConfig;
use crate::error::CatalogError;
use crate::generator::{RandomSource, ScanGenerator};
use crate::progress::{ProgressSimulator, SCAN_TICK_MS, ScanStep, StepSequencer};
use crate::session::{ScanBatch, ScanSession};
use crate::timer::{Scheduler, Tick, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanTick {
    pub elapsed_ms: u64,
    pub percent: f64,
    pub step: ScanStep,
    pub step_index: usize,
    pub completed_steps: usize,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct ScanRun {
    simulator: ProgressSimulator,
    sequencer: StepSequencer,
    tick_ms: u64,
    elapsed_ms: u64,
}

impl ScanRun {
    pub fn new(sequencer: StepSequencer, tick_ms: u64) -> Self {
        Self {
            simulator: ProgressSimulator::new(sequencer.total_ms()),
            sequencer,
            tick_ms: tick_ms.max(1),
            elapsed_ms: 0,
        }
    }

    pub fn tick(&mut self) -> ScanTick {
        self.elapsed_ms += self.tick_ms;
        let update = self.simulator.advance(self.elapsed_ms);
        let position = self.sequencer.position_at(self.elapsed_ms);
        let snapshot = self.sequencer.advance(self.elapsed_ms);
        ScanTick {
            elapsed_ms: self.elapsed_ms,
            percent: update.percent,
            step: *snapshot.active,
            step_index: position.active,
            completed_steps: snapshot.completed.len(),
            finished: update.completed_now || snapshot.finished_now,
        }
    }

    pub fn steps(&self) -> &[ScanStep] {
        self.sequencer.steps()
    }
}

pub struct ScanRunner {
    session: Arc<Mutex<ScanSession>>,
    generator: Arc<Mutex<ScanGenerator>>,
    scheduler: Arc<dyn Scheduler>,
    steps: Vec<ScanStep>,
    tick: Duration,
}

impl ScanRunner {
    pub fn new(
        session: Arc<Mutex<ScanSession>>,
        generator: ScanGenerator,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            session,
            generator: Arc::new(Mutex::new(generator)),
            scheduler,
            steps: StepSequencer::scan().steps().to_vec(),
            tick: Duration::from_millis(SCAN_TICK_MS),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_steps(mut self, steps: Vec<ScanStep>) -> Self {
        if !steps.is_empty() {
            self.steps = steps;
        }
        self
    }

    pub fn session(&self) -> Arc<Mutex<ScanSession>> {
        self.session.clone()
    }

    pub fn start(
        &self,
        config: BatchConfig,
        mut rng: Box<dyn RandomSource + Send>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<ScanHandle, CatalogError> {
        let batch_id = {
            let mut session = self.session.lock().map_err(|_| CatalogError::SessionPoisoned)?;
            session.start_batch(config)?.id.clone()
        };
        sink.event(ProgressEvent::Started {
            batch_id: batch_id.clone(),
            config,
            total_steps: self.steps.len(),
        });

        let (tx, rx) = mpsc::channel();
        let mut run = ScanRun::new(StepSequencer::new(self.steps.clone()), self.tick.as_millis() as u64);
        let total_steps = self.steps.len();
        let session = self.session.clone();
        let generator = self.generator.clone();
        let task = move || {
            let tick = run.tick();
            debug!(elapsed_ms = tick.elapsed_ms, step = tick.step.id, "scan tick");
            let Ok(mut guard) = session.lock() else {
                return Tick::Stop;
            };
            if !guard.update_progress(tick.percent, tick.step.id) {
                return Tick::Stop;
            }
            drop(guard);
            sink.event(ProgressEvent::Step {
                step: tick.step,
                step_index: tick.step_index,
                completed_steps: tick.completed_steps,
                total_steps,
                percent: tick.percent,
            });
            if !tick.finished {
                return Tick::Continue;
            }

            let output = match generator.lock() {
                Ok(mut generator) => generator.generate(&config, rng.as_mut()),
                Err(_) => {
                    tx.send(Err(CatalogError::SessionPoisoned)).ok();
                    return Tick::Stop;
                }
            };
            let result = match session.lock() {
                Ok(mut guard) => guard.complete_scan(output),
                Err(_) => Err(CatalogError::SessionPoisoned),
            };
            if let Ok(batch) = &result {
                sink.event(ProgressEvent::Completed {
                    batch: Box::new(batch.clone()),
                });
            }
            tx.send(result).ok();
            Tick::Stop
        };
        let timer = self.scheduler.every(self.tick, Box::new(task));

        Ok(ScanHandle {
            batch_id,
            timer,
            completion: rx,
            session: self.session.clone(),
            settled: false,
        })
    }
}

/// A running scan. Dropping a handle whose batch is still scanning cancels
/// it; a batch that already completed is left alone.
pub struct ScanHandle {
    batch_id: String,
    timer: TimerHandle,
    completion: Receiver<Result<ScanBatch, CatalogError>>,
    session: Arc<Mutex<ScanSession>>,
    settled: bool,
}

impl ScanHandle {
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn is_running(&self) -> bool {
        !self.settled && self.timer.is_active()
    }

    pub fn try_result(&mut self) -> Option<Result<ScanBatch, CatalogError>> {
        if self.settled {
            return None;
        }
        match self.completion.try_recv() {
            Ok(result) => {
                self.settled = true;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.settled = true;
                Some(Err(CatalogError::ScanCancelled))
            }
        }
    }

    pub fn wait(mut self) -> Result<ScanBatch, CatalogError> {
        let result = self
            .completion
            .recv()
            .unwrap_or(Err(CatalogError::ScanCancelled));
        self.settled = true;
        result
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        self.timer.cancel();
        if let Ok(mut session) = self.session.lock() {
            session.cancel_batch(&self.batch_id);
        }
        self.settled = true;
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if !self.settled {
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_reaches_the_end_once() {
        let mut run = ScanRun::new(StepSequencer::scan(), SCAN_TICK_MS);
        let mut finished = 0;
        let mut last_percent = 0.0;
        for _ in 0..300 {
            let tick = run.tick();
            assert!(tick.percent >= last_percent);
            last_percent = tick.percent;
            if tick.finished {
                finished += 1;
                assert_eq!(tick.elapsed_ms, 26_500);
                assert_eq!(tick.completed_steps, 10);
                assert_eq!(tick.step.id, "checksum");
            }
        }
        assert_eq!(finished, 1);
        assert_eq!(last_percent, 100.0);
    }
}
