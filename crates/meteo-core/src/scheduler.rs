//! Cooperative scheduler
//!
//! The scheduler owns one slot per configured task. Each [`Scheduler::tick`]
//! checks the task timers against `now` and gives every expired task one step.
//! Nothing here sleeps; the caller decides how often to tick.
//!
//! Calibration tasks run once: after their cycle finishes the slot stays idle
//! until [`Scheduler::reset`].

use embassy_time::{Duration, Instant};
use log::{debug, info};

use crate::app::{
    BusCycle, CalibrationCycle, Progress, SensorCycle, read_all_addresses, read_all_sensors,
};
use crate::config::{MAX_TASKS, StationConfig, TaskConfig, TaskKind, TaskMode};
use crate::error::Result;
use crate::reading::Input;
use crate::router::Router;

/// Interval timer compared against caller-supplied timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    interval: Duration,
    last: Option<Instant>,
}

impl Timer {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// True on the first call and whenever `interval` has passed since the
    /// previous expiry. Expiring restarts the interval from `now`.
    pub fn expired(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.interval),
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// A cycle in progress
#[derive(Debug, Clone)]
enum Job {
    Sensors(SensorCycle),
    Bus(BusCycle),
    Calibration(CalibrationCycle),
}

impl Job {
    fn start(kind: TaskKind, router: &Router) -> Option<Self> {
        match kind {
            TaskKind::Sensors => Some(Self::Sensors(SensorCycle::new(router))),
            TaskKind::Bus => Some(Self::Bus(BusCycle::new())),
            TaskKind::Calibration(id) => Some(Self::Calibration(CalibrationCycle::new(id))),
            TaskKind::Clock => None,
        }
    }

    fn step(&mut self, router: &mut Router, task: &TaskConfig, now: Instant) -> Progress {
        let outputs = task.outputs.as_slice();
        match self {
            Self::Sensors(cycle) => cycle.step(router, outputs, now),
            Self::Bus(cycle) => cycle.step(router, outputs, now),
            Self::Calibration(cycle) => cycle.step(router, outputs, now),
        }
    }
}

struct Slot {
    task: TaskConfig,
    timer: Timer,
    job: Option<Job>,
    done: bool,
}

impl Slot {
    fn run(&mut self, router: &mut Router, now: Instant) {
        let outputs = self.task.outputs.as_slice();
        match (self.task.kind, self.task.mode) {
            (TaskKind::Clock, _) => {
                router.transfer(Input::Clock, outputs, now);
            }
            (TaskKind::Sensors, TaskMode::AllAtOnce) => {
                read_all_sensors(router, outputs, now);
            }
            (TaskKind::Bus, TaskMode::AllAtOnce) => {
                read_all_addresses(router, outputs, now);
            }
            (kind, _) => {
                if self.job.is_none() {
                    self.job = Job::start(kind, router);
                }
                if let Some(job) = self.job.as_mut()
                    && job.step(router, &self.task, now).is_finished()
                {
                    debug!("{:?} cycle finished", kind);
                    self.job = None;
                    self.done = matches!(kind, TaskKind::Calibration(_));
                }
            }
        }
    }
}

/// Runs the station task table.
pub struct Scheduler {
    slots: heapless::Vec<Slot, MAX_TASKS>,
}

impl Scheduler {
    pub fn from_config(config: &StationConfig) -> Result<Self> {
        config.validate()?;
        let mut slots = heapless::Vec::new();
        for task in config.tasks.iter() {
            let slot = Slot {
                task: task.clone(),
                timer: Timer::new(Duration::from_millis(task.interval_ms as u64)),
                job: None,
                done: false,
            };
            // Validated config never holds more than MAX_TASKS
            let _ = slots.push(slot);
        }
        info!("Scheduler running {} tasks", slots.len());
        Ok(Self { slots })
    }

    pub fn task_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether task `index` is in the middle of a cycle.
    pub fn is_busy(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.job.is_some())
    }

    /// Give every expired task one step. Returns how many tasks ran.
    pub fn tick(&mut self, router: &mut Router, now: Instant) -> usize {
        let mut ran = 0;
        for slot in self.slots.iter_mut() {
            if !slot.done && slot.timer.expired(now) {
                slot.run(router, now);
                ran += 1;
            }
        }
        ran
    }

    /// Drop every cycle in progress and restart all timers.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.job = None;
            slot.done = false;
            slot.timer.reset();
        }
    }
}
