//! Cyclic application tasks
//!
//! Every task is a caller-owned context with a `step` method. One step does
//! one bounded unit of work and reports whether the cycle is over. Dropping a
//! context abandons the cycle; contexts own no hardware.

mod bus_cycle;
mod calibration_cycle;
mod sensor_cycle;

pub use bus_cycle::{BusCycle, read_all_addresses};
pub use calibration_cycle::CalibrationCycle;
pub use sensor_cycle::{SensorCycle, read_all_sensors};

use crate::reading::OutputKind;
use crate::router::Router;

/// Whether a cyclic task completed its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Finished,
    NotFinished,
}

impl Progress {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Outputs able to take a whole batch in one call.
pub(crate) fn batch_outputs(
    router: &Router,
    outputs: &[OutputKind],
) -> heapless::Vec<OutputKind, { OutputKind::COUNT }> {
    let mut batch = heapless::Vec::new();
    for &output in outputs {
        if !router.is_paged(output) && !batch.contains(&output) {
            let _ = batch.push(output);
        }
    }
    batch
}
