use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Stop,
}

pub type TickTask = Box<dyn FnMut() -> Tick + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Runs `task` every `period` until it returns [`Tick::Stop`] or the
    /// returned handle is cancelled or dropped.
    fn every(&self, period: Duration, task: TickTask) -> TimerHandle;
}

pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle {
    fn new(cancelled: Arc<AtomicBool>, finished: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            finished,
            thread: None,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                thread.join().ok();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.finished.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn every(&self, period: Duration, mut task: TickTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let mut handle = TimerHandle::new(cancelled.clone(), finished.clone());
        let thread = thread::spawn(move || {
            loop {
                thread::sleep(period);
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }
                if task() == Tick::Stop {
                    break;
                }
            }
            finished.store(true, Ordering::SeqCst);
        });
        handle.thread = Some(thread);
        handle
    }
}

struct ManualTimer {
    period: u64,
    next_due: u64,
    task: Option<TickTask>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl ManualTimer {
    fn is_live(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && !self.finished.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ManualState {
    now: u64,
    timers: Vec<ManualTimer>,
}

#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        let now = self.state.lock().map(|state| state.now).unwrap_or(0);
        Duration::from_millis(now)
    }

    pub fn active_timers(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.timers.iter().filter(|timer| timer.is_live()).count())
            .unwrap_or(0)
    }

    pub fn advance(&self, duration: Duration) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let target = state.now + duration.as_millis() as u64;
        loop {
            state.timers.retain(|timer| timer.is_live());
            let due = state
                .timers
                .iter()
                .enumerate()
                .filter(|(_, timer)| timer.next_due <= target && timer.task.is_some())
                .min_by_key(|(index, timer)| (timer.next_due, *index))
                .map(|(index, timer)| (index, timer.next_due));
            let Some((index, due_at)) = due else {
                break;
            };
            state.now = due_at;
            let Some(mut task) = state.timers[index].task.take() else {
                break;
            };
            let cancelled = state.timers[index].cancelled.clone();
            drop(state);

            let outcome = task();

            state = match self.state.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            let timer = state
                .timers
                .iter_mut()
                .find(|timer| Arc::ptr_eq(&timer.cancelled, &cancelled));
            if let Some(timer) = timer {
                if outcome == Tick::Stop {
                    timer.finished.store(true, Ordering::SeqCst);
                } else {
                    timer.next_due += timer.period;
                    timer.task = Some(task);
                }
            }
        }
        state.now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, period: Duration, task: TickTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let period = (period.as_millis() as u64).max(1);
        if let Ok(mut state) = self.state.lock() {
            let next_due = state.now + period;
            state.timers.push(ManualTimer {
                period,
                next_due,
                task: Some(task),
                cancelled: cancelled.clone(),
                finished: finished.clone(),
            });
        }
        TimerHandle::new(cancelled, finished)
    }
}
