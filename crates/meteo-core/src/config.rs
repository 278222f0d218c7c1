//! Station task table
//!
//! The task table is fixed at build time but kept as data, so a board can ship
//! a different table as a `postcard` blob without touching the scheduler.

extern crate alloc;
use alloc::vec::Vec;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::catalog::CalibrationId;
use crate::error::{Error, Result};
use crate::reading::OutputKind;
use crate::router::EscalationPolicy;

pub const MAX_TASKS: usize = 4;

/// What a task fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Sensors,
    Bus,
    Clock,
    Calibration(CalibrationId),
}

/// How a task walks its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskMode {
    /// One item per expiry of the task timer
    Cyclic,
    /// Every item in one call, for outputs that are not paged
    AllAtOnce,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub kind: TaskKind,
    pub mode: TaskMode,
    pub interval_ms: u32,
    pub outputs: heapless::Vec<OutputKind, { OutputKind::COUNT }>,
}

impl TaskConfig {
    pub fn new(kind: TaskKind, mode: TaskMode, interval_ms: u32, outputs: &[OutputKind]) -> Self {
        let mut list = heapless::Vec::new();
        for &output in outputs {
            if !list.contains(&output) {
                let _ = list.push(output);
            }
        }
        Self {
            kind,
            mode,
            interval_ms,
            outputs: list,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    pub tasks: heapless::Vec<TaskConfig, MAX_TASKS>,
    pub escalation: EscalationPolicy,
}

impl Default for StationConfig {
    /// Sensors cycle on the display, time and bus scan go to the console.
    fn default() -> Self {
        let mut tasks = heapless::Vec::new();
        for task in [
            TaskConfig::new(TaskKind::Sensors, TaskMode::Cyclic, 2_000, &[OutputKind::Display]),
            TaskConfig::new(TaskKind::Clock, TaskMode::Cyclic, 1_000, &[OutputKind::Console]),
            TaskConfig::new(TaskKind::Bus, TaskMode::AllAtOnce, 30_000, &[OutputKind::Console]),
        ] {
            let _ = tasks.push(task);
        }
        Self {
            tasks,
            escalation: EscalationPolicy::default(),
        }
    }
}

impl StationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.escalation.order.is_empty() {
            warn!("Config has no error escalation outputs");
            return Err(Error::InvalidConfig);
        }
        for (index, task) in self.tasks.iter().enumerate() {
            if task.outputs.is_empty() {
                warn!("Task {} has no outputs", index);
                return Err(Error::InvalidConfig);
            }
            if task.interval_ms == 0 {
                warn!("Task {} has a zero interval", index);
                return Err(Error::InvalidConfig);
            }
            if let TaskKind::Calibration(id) = task.kind
                && !id.is_valid()
            {
                warn!("Task {} calibrates an invalid id", index);
                return Err(Error::InvalidConfig);
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|_| Error::InvalidConfig)
    }

    /// Decode and validate a config blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config: Self = postcard::from_bytes(bytes).map_err(|e| {
            warn!("Config blob rejected: {}", e);
            Error::InvalidConfig
        })?;
        config.validate()?;
        Ok(config)
    }
}
