//! Calibration processes
//!
//! Single-sample calibrations finish within one call. Multi-sample calibrations
//! span several scheduler ticks: the first call starts the physical process and
//! later calls poll it. Their progress lives in the [`CalibrationBank`] rows, not
//! in the caller, because the measurement itself outlives any one request.

extern crate alloc;
use alloc::boxed::Box;

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

use crate::catalog::{CalibrationId, CalibrationMeta, SampleMode, calibration_meta};
use crate::error::{CalibrationError, Error, Result};

/// Calibrations fit in the "other inputs" status byte next to clock and bus
pub const MAX_CALIBRATIONS: usize = 6;

/// Progress of one calibration process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    Idle,
    InProgress,
    Finished,
}

/// A calibration that needs one synchronous sample.
pub trait SingleSample {
    fn init(&mut self) -> core::result::Result<(), CalibrationError> {
        Ok(())
    }

    fn sample(&mut self) -> core::result::Result<f32, CalibrationError>;
}

/// A calibration accumulated across several calls.
pub trait MultiSample {
    fn init(&mut self) -> core::result::Result<(), CalibrationError> {
        Ok(())
    }

    /// Start the physical process (heater, sampling window).
    fn start(&mut self, now: Instant) -> core::result::Result<(), CalibrationError>;

    /// Advance the process by at most one sample; `Some` once the result is known.
    fn poll(&mut self, now: Instant) -> core::result::Result<Option<f32>, CalibrationError>;

    fn is_running(&self) -> bool;
}

/// Averages a fixed number of samples spaced by a minimum interval.
///
/// Each [`poll`](Self::poll) takes at most one sample, and only once `interval`
/// has passed since the previous one, so the caller stays non-blocking.
#[derive(Debug, Clone)]
pub struct SampleAccumulator {
    target: u8,
    interval: Duration,
    last: Option<Instant>,
    sum: f32,
    count: u8,
    running: bool,
}

impl SampleAccumulator {
    pub const fn new(target: u8, interval: Duration) -> Self {
        Self {
            target,
            interval,
            last: None,
            sum: 0.0,
            count: 0,
            running: false,
        }
    }

    pub fn begin(&mut self, now: Instant) {
        debug!("Accumulating {} samples from t={}ms", self.target, now.as_millis());
        self.last = None;
        self.sum = 0.0;
        self.count = 0;
        self.running = true;
    }

    pub fn poll<F>(
        &mut self,
        now: Instant,
        sample: F,
    ) -> core::result::Result<Option<f32>, CalibrationError>
    where
        F: FnOnce() -> core::result::Result<f32, CalibrationError>,
    {
        if !self.running {
            return Err(CalibrationError::Failed);
        }

        let due = match self.last {
            None => true,
            Some(last) => now
                .checked_duration_since(last)
                .is_some_and(|elapsed| elapsed >= self.interval),
        };
        if !due {
            return Ok(None);
        }

        let value = match sample() {
            Ok(value) => value,
            Err(e) => {
                self.running = false;
                return Err(e);
            }
        };
        self.sum += value;
        self.count += 1;
        self.last = Some(now);

        if self.count < self.target {
            return Ok(None);
        }

        self.running = false;
        Ok(Some(self.sum / self.count as f32))
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Driver bound to a calibration row
pub enum CalibrationDriver {
    Single(Box<dyn SingleSample>),
    Multiple(Box<dyn MultiSample>),
}

impl CalibrationDriver {
    pub const fn mode(&self) -> SampleMode {
        match self {
            Self::Single(_) => SampleMode::Single,
            Self::Multiple(_) => SampleMode::Multiple,
        }
    }
}

/// Outcome of one calibration call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStep {
    pub state: CalibrationState,
    /// NaN while the calibration is in progress
    pub result: Result<f32>,
}

impl CalibrationStep {
    fn failed(error: Error) -> Self {
        Self {
            state: CalibrationState::Idle,
            result: Err(error),
        }
    }
}

struct CalibrationRow {
    meta: &'static CalibrationMeta,
    driver: CalibrationDriver,
    state: CalibrationState,
}

/// The configured calibration processes and their process-owned state.
#[derive(Default)]
pub struct CalibrationBank {
    rows: heapless::Vec<CalibrationRow, MAX_CALIBRATIONS>,
}

impl CalibrationBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_single(
        &mut self,
        id: CalibrationId,
        driver: impl SingleSample + 'static,
    ) -> Result<()> {
        self.bind(id, CalibrationDriver::Single(Box::new(driver)))
    }

    pub fn bind_multiple(
        &mut self,
        id: CalibrationId,
        driver: impl MultiSample + 'static,
    ) -> Result<()> {
        self.bind(id, CalibrationDriver::Multiple(Box::new(driver)))
    }

    pub fn bind(&mut self, id: CalibrationId, driver: CalibrationDriver) -> Result<()> {
        let meta = calibration_meta(id).ok_or(CalibrationError::NotConfigured)?;
        if meta.mode != driver.mode() {
            return Err(CalibrationError::WrongSampleMode.into());
        }
        if self.id_to_index(id).is_some() {
            return Err(Error::InvalidInput);
        }
        self.rows
            .push(CalibrationRow {
                meta,
                driver,
                state: CalibrationState::Idle,
            })
            .map_err(|_| Error::InvalidInput)?;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn metadata(&self, id: CalibrationId) -> Option<&'static CalibrationMeta> {
        self.rows.iter().find(|row| row.meta.id == id).map(|row| row.meta)
    }

    pub fn index_to_id(&self, index: usize) -> Option<CalibrationId> {
        self.rows.get(index).map(|row| row.meta.id)
    }

    pub fn id_to_index(&self, id: CalibrationId) -> Option<usize> {
        if !id.is_valid() {
            return None;
        }
        self.rows.iter().position(|row| row.meta.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = CalibrationId> + '_ {
        self.rows.iter().map(|row| row.meta.id)
    }

    pub fn init(&mut self, id: CalibrationId) -> Result<()> {
        let row = self.row_mut(id)?;
        match &mut row.driver {
            CalibrationDriver::Single(driver) => driver.init()?,
            CalibrationDriver::Multiple(driver) => driver.init()?,
        }
        Ok(())
    }

    /// Run the calibration in whichever mode its catalog entry declares.
    pub fn calibrate(&mut self, id: CalibrationId, now: Instant) -> CalibrationStep {
        match self.metadata(id).map(|meta| meta.mode) {
            Some(SampleMode::Multiple) => self.calibrate_multiple(id, now),
            _ => self.calibrate_single(id),
        }
    }

    /// One-shot calibration; finished immediately unless the sample is invalid.
    pub fn calibrate_single(&mut self, id: CalibrationId) -> CalibrationStep {
        let row = match self.row_mut(id) {
            Ok(row) => row,
            Err(e) => return CalibrationStep::failed(e),
        };
        let CalibrationDriver::Single(driver) = &mut row.driver else {
            return CalibrationStep::failed(CalibrationError::IncompatibleSensor.into());
        };

        match driver.sample() {
            Ok(value) if value.is_finite() => {
                row.state = CalibrationState::Finished;
                info!("{} finished: {}", row.meta.name, value);
                CalibrationStep {
                    state: row.state,
                    result: Ok(value),
                }
            }
            Ok(_) => {
                row.state = CalibrationState::Idle;
                CalibrationStep::failed(CalibrationError::InvalidValue.into())
            }
            Err(e) => {
                row.state = CalibrationState::Idle;
                warn!("{} failed: {}", row.meta.name, e);
                CalibrationStep::failed(e.into())
            }
        }
    }

    /// Start or poll an accumulated calibration.
    pub fn calibrate_multiple(&mut self, id: CalibrationId, now: Instant) -> CalibrationStep {
        let row = match self.row_mut(id) {
            Ok(row) => row,
            Err(e) => return CalibrationStep::failed(e),
        };
        let CalibrationDriver::Multiple(driver) = &mut row.driver else {
            return CalibrationStep::failed(CalibrationError::IncompatibleSensor.into());
        };

        if row.state != CalibrationState::InProgress || !driver.is_running() {
            if let Err(e) = driver.start(now) {
                row.state = CalibrationState::Idle;
                return CalibrationStep::failed(e.into());
            }
            row.state = CalibrationState::InProgress;
            debug!("{} started", row.meta.name);
            return CalibrationStep {
                state: row.state,
                result: Ok(f32::NAN),
            };
        }

        match driver.poll(now) {
            Ok(None) => CalibrationStep {
                state: row.state,
                result: Ok(f32::NAN),
            },
            Ok(Some(value)) if value.is_finite() => {
                row.state = CalibrationState::Finished;
                CalibrationStep {
                    state: row.state,
                    result: Ok(value),
                }
            }
            Ok(Some(_)) => {
                row.state = CalibrationState::Idle;
                CalibrationStep::failed(CalibrationError::InvalidValue.into())
            }
            Err(e) => {
                row.state = CalibrationState::Idle;
                warn!("{} failed: {}", row.meta.name, e);
                CalibrationStep::failed(e.into())
            }
        }
    }

    fn row_mut(&mut self, id: CalibrationId) -> Result<&mut CalibrationRow> {
        if self.rows.is_empty() {
            return Err(CalibrationError::NoneConfigured.into());
        }
        self.rows
            .iter_mut()
            .find(|row| row.meta.id == id)
            .ok_or(Error::Calibration(CalibrationError::NotConfigured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GAS_BASELINE, UV_OFFSET};
    use crate::testing::{FixedSample, StagedSample};

    #[test]
    fn test_accumulator_spaces_samples() {
        let mut acc = SampleAccumulator::new(2, Duration::from_millis(100));
        let t0 = Instant::from_millis(1_000);
        acc.begin(t0);

        assert_eq!(acc.poll(t0, || Ok(4.0)), Ok(None));
        // Too early, sample closure must not run
        assert_eq!(
            acc.poll(t0 + Duration::from_millis(50), || panic!("sampled early")),
            Ok(None)
        );
        assert_eq!(acc.poll(t0 + Duration::from_millis(100), || Ok(6.0)), Ok(Some(5.0)));
        assert!(!acc.is_running());
        assert_eq!(acc.poll(t0, || Ok(1.0)), Err(CalibrationError::Failed));
    }

    #[test]
    fn test_multi_sample_reports_progress_then_value() {
        let mut bank = CalibrationBank::new();
        bank.bind_multiple(GAS_BASELINE, StagedSample::new(2, 21.0)).unwrap();
        let now = Instant::from_millis(0);

        let first = bank.calibrate_multiple(GAS_BASELINE, now);
        assert_eq!(first.state, CalibrationState::InProgress);
        assert!(first.result.unwrap().is_nan());

        let second = bank.calibrate_multiple(GAS_BASELINE, now);
        assert_eq!(second.state, CalibrationState::InProgress);
        assert!(second.result.unwrap().is_nan());

        let third = bank.calibrate_multiple(GAS_BASELINE, now);
        assert_eq!(third.state, CalibrationState::Finished);
        assert_eq!(third.result, Ok(21.0));

        // A finished calibration starts over on the next request
        let again = bank.calibrate_multiple(GAS_BASELINE, now);
        assert_eq!(again.state, CalibrationState::InProgress);
    }

    #[test]
    fn test_single_sample_through_multi_entry_is_incompatible() {
        let mut bank = CalibrationBank::new();
        bank.bind_single(UV_OFFSET, FixedSample::new(12.0)).unwrap();

        let step = bank.calibrate_multiple(UV_OFFSET, Instant::from_millis(0));
        assert_eq!(
            step.result,
            Err(Error::Calibration(CalibrationError::IncompatibleSensor))
        );

        let step = bank.calibrate(UV_OFFSET, Instant::from_millis(0));
        assert_eq!(step.state, CalibrationState::Finished);
        assert_eq!(step.result, Ok(12.0));
    }

    #[test]
    fn test_invalid_single_sample_is_not_finished() {
        let mut bank = CalibrationBank::new();
        bank.bind_single(UV_OFFSET, FixedSample::new(f32::NAN)).unwrap();

        let step = bank.calibrate_single(UV_OFFSET);
        assert_eq!(step.state, CalibrationState::Idle);
        assert_eq!(step.result, Err(Error::Calibration(CalibrationError::InvalidValue)));
    }

    #[test]
    fn test_binding_checks_sample_mode() {
        let mut bank = CalibrationBank::new();
        assert_eq!(
            bank.bind_single(GAS_BASELINE, FixedSample::new(1.0)),
            Err(Error::Calibration(CalibrationError::WrongSampleMode))
        );
    }

    #[test]
    fn test_empty_bank_reports_none_configured() {
        let mut bank = CalibrationBank::new();
        let step = bank.calibrate(GAS_BASELINE, Instant::from_millis(0));
        assert_eq!(step.result, Err(Error::Calibration(CalibrationError::NoneConfigured)));
    }
}
