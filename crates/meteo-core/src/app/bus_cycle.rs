use embassy_time::Instant;
use log::debug;

use super::{Progress, batch_outputs};
use crate::bus::{BusReport, MAX_ADDRESS, MIN_ADDRESS, ScanContext, ScanState};
use crate::error::{BusError, Error};
use crate::reading::{OutputKind, Reading};
use crate::router::Router;

/// Shows the bus one discovered address per step.
///
/// The first step scans the bus and routes the summary. Each following step
/// routes the next discovered address. Past the last address the context
/// re-arms its scan and the cycle is finished.
#[derive(Debug, Clone, Default)]
pub struct BusCycle {
    context: ScanContext,
}

impl BusCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    pub fn step(&mut self, router: &mut Router, outputs: &[OutputKind], _now: Instant) -> Progress {
        match self.context.state() {
            ScanState::Pending | ScanState::Exhausted => {
                let reading = router.scan(&mut self.context);
                router.fan_out(outputs, &reading);
                if !reading.is_ok() {
                    self.context.reset();
                    return Progress::Finished;
                }
                Progress::NotFinished
            }
            ScanState::Complete | ScanState::Iterating => match next_device(&mut self.context) {
                Some(reading) => {
                    router.fan_out(outputs, &reading);
                    Progress::NotFinished
                }
                None => Progress::Finished,
            },
        }
    }
}

/// Reading for the next discovered address, `None` once the scan is exhausted.
fn next_device(context: &mut ScanContext) -> Option<Reading> {
    match context.next_address() {
        Ok(address) => Some(Reading::Bus {
            address,
            result: Ok(BusReport::Device(address)),
        }),
        Err(Error::Bus(BusError::NotFound)) => {
            debug!("Bus iteration finished");
            None
        }
        Err(e) => Some(Reading::Bus {
            address: context.cursor(),
            result: Err(e),
        }),
    }
}

/// Scan the bus and route the summary plus every discovered address in one
/// call. Paged outputs are left out.
///
/// Iteration is bounded by the number of addresses that can be attempted, not
/// by the number found.
pub fn read_all_addresses(router: &mut Router, outputs: &[OutputKind], _now: Instant) -> Progress {
    let batch = batch_outputs(router, outputs);
    if batch.is_empty() {
        return Progress::Finished;
    }

    let mut context = ScanContext::new();
    let summary = router.scan(&mut context);
    router.fan_out(&batch, &summary);
    if !summary.is_ok() {
        return Progress::Finished;
    }

    for _ in MIN_ADDRESS..=MAX_ADDRESS {
        match next_device(&mut context) {
            Some(reading) => {
                let failed = !reading.is_ok();
                router.fan_out(&batch, &reading);
                if failed {
                    break;
                }
            }
            None => break,
        }
    }
    Progress::Finished
}
