extern crate alloc;
use alloc::rc::Rc;
use core::cell::RefCell;

use embassy_time::{Duration, Instant};
use log::{debug, info};

use super::{AnalogInput, Readable};
use crate::calibration::{MultiSample, SampleAccumulator};
use crate::error::{CalibrationError, SensorError};

/// Divider supply voltage
const SUPPLY_MV: f32 = 5000.0;

/// Load resistor of the divider
const LOAD_KOHM: f32 = 10.0;

/// Rs/R0 of the MQ-135 in clean air (datasheet sensitivity curve)
const CLEAN_AIR_RATIO: f32 = 3.6;

/// Power-law fit of the CO2 curve: ppm = A * (Rs/R0)^B
const CURVE_SCALE: f32 = 116.602_07;
const CURVE_EXPONENT: f32 = -2.769_035;

/// Baseline used until a calibration has finished
pub const DEFAULT_R0_KOHM: f32 = 76.63;

const CALIBRATION_SAMPLES: u8 = 10;
const CALIBRATION_INTERVAL: Duration = Duration::from_millis(500);

/// MQ-135 style heated gas sensor read through a voltage divider.
///
/// The readout and the baseline calibration share the same hardware and the
/// same baseline, so [`GasSensor::split`] hands out two handles onto one
/// instance.
pub struct GasSensor<A> {
    input: A,
    r0_kohm: f32,
}

impl<A: AnalogInput> GasSensor<A> {
    pub fn new(input: A) -> Self {
        Self {
            input,
            r0_kohm: DEFAULT_R0_KOHM,
        }
    }

    /// Current sensing resistance.
    pub fn resistance_kohm(&mut self) -> Result<f32, SensorError> {
        let millivolts = self.input.read_millivolts()? as f32;
        if millivolts <= 0.0 || millivolts >= SUPPLY_MV {
            return Err(SensorError::InvalidValue);
        }
        Ok((SUPPLY_MV - millivolts) / millivolts * LOAD_KOHM)
    }

    pub fn baseline_kohm(&self) -> f32 {
        self.r0_kohm
    }

    pub fn split(self) -> (GasReadout<A>, GasCalibration<A>) {
        let shared = Rc::new(RefCell::new(self));
        (
            GasReadout {
                shared: shared.clone(),
            },
            GasCalibration {
                shared,
                accumulator: SampleAccumulator::new(CALIBRATION_SAMPLES, CALIBRATION_INTERVAL),
            },
        )
    }
}

/// Gas concentration channel of a [`GasSensor`].
pub struct GasReadout<A> {
    shared: Rc<RefCell<GasSensor<A>>>,
}

impl<A: AnalogInput> Readable for GasReadout<A> {
    fn read(&mut self) -> Result<f32, SensorError> {
        let mut sensor = self.shared.borrow_mut();
        let ratio = sensor.resistance_kohm()? / sensor.r0_kohm;
        Ok(CURVE_SCALE * libm::powf(ratio, CURVE_EXPONENT))
    }
}

/// Baseline (R0) calibration of a [`GasSensor`], averaged over several ticks.
pub struct GasCalibration<A> {
    shared: Rc<RefCell<GasSensor<A>>>,
    accumulator: SampleAccumulator,
}

impl<A: AnalogInput> MultiSample for GasCalibration<A> {
    fn start(&mut self, now: Instant) -> Result<(), CalibrationError> {
        info!("Gas baseline: collecting {} samples", CALIBRATION_SAMPLES);
        self.accumulator.begin(now);
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<Option<f32>, CalibrationError> {
        let shared = &self.shared;
        let mean = self.accumulator.poll(now, || {
            shared.borrow_mut().resistance_kohm().map_err(|e| match e {
                SensorError::InvalidValue => CalibrationError::InvalidValue,
                _ => CalibrationError::Failed,
            })
        })?;

        let Some(mean_kohm) = mean else {
            debug!("Gas baseline: {} samples so far", self.accumulator.count());
            return Ok(None);
        };

        let r0 = mean_kohm / CLEAN_AIR_RATIO;
        self.shared.borrow_mut().r0_kohm = r0;
        info!("Gas baseline: R0 = {} kOhm", r0);
        Ok(Some(r0))
    }

    fn is_running(&self) -> bool {
        self.accumulator.is_running()
    }
}
