use embassy_time::Instant;

use super::Progress;
use crate::calibration::CalibrationState;
use crate::catalog::CalibrationId;
use crate::reading::{Input, OutputKind, Reading};
use crate::router::Router;

/// Drives one calibration until it leaves the in-progress state, routing the
/// progress at every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationCycle {
    id: CalibrationId,
}

impl CalibrationCycle {
    pub const fn new(id: CalibrationId) -> Self {
        Self { id }
    }

    pub const fn id(&self) -> CalibrationId {
        self.id
    }

    pub fn step(&mut self, router: &mut Router, outputs: &[OutputKind], now: Instant) -> Progress {
        let reading = router.fetch(Input::Calibration(self.id), now);
        router.fan_out(outputs, &reading);
        match reading {
            Reading::Calibration {
                state: CalibrationState::InProgress,
                ..
            } => Progress::NotFinished,
            _ => Progress::Finished,
        }
    }
}
