extern crate alloc;
use alloc::rc::Rc;
use core::cell::RefCell;

use log::{info, warn};

use super::{AnalogInput, Readable};
use crate::calibration::SingleSample;
use crate::error::{CalibrationError, SensorError};

/// Output at zero UV intensity
const ZERO_LEVEL_MV: f32 = 990.0;

/// Output at full scale (15 mW/cm2)
const FULL_SCALE_MV: f32 = 2800.0;
const FULL_SCALE_INTENSITY: f32 = 15.0;

/// Dark offsets beyond this mean the sensor was not covered
const MAX_OFFSET_MV: f32 = 300.0;

/// ML8511 style analog UV sensor.
pub struct UvSensor<A> {
    input: A,
    offset_mv: f32,
}

impl<A: AnalogInput> UvSensor<A> {
    pub fn new(input: A) -> Self {
        Self {
            input,
            offset_mv: 0.0,
        }
    }

    /// UV intensity in mW/cm2, corrected by the dark offset.
    pub fn intensity(&mut self) -> Result<f32, SensorError> {
        let millivolts = self.input.read_millivolts()? as f32 - self.offset_mv;
        let intensity =
            (millivolts - ZERO_LEVEL_MV) * FULL_SCALE_INTENSITY / (FULL_SCALE_MV - ZERO_LEVEL_MV);
        Ok(intensity.max(0.0))
    }

    pub fn split(self) -> (UvReadout<A>, UvOffsetCalibration<A>) {
        let shared = Rc::new(RefCell::new(self));
        (
            UvReadout {
                shared: shared.clone(),
            },
            UvOffsetCalibration { shared },
        )
    }
}

/// Intensity channel of a [`UvSensor`].
pub struct UvReadout<A> {
    shared: Rc<RefCell<UvSensor<A>>>,
}

impl<A: AnalogInput> Readable for UvReadout<A> {
    fn read(&mut self) -> Result<f32, SensorError> {
        self.shared.borrow_mut().intensity()
    }
}

/// Dark offset calibration of a [`UvSensor`]; the sensor must be covered.
pub struct UvOffsetCalibration<A> {
    shared: Rc<RefCell<UvSensor<A>>>,
}

impl<A: AnalogInput> SingleSample for UvOffsetCalibration<A> {
    fn sample(&mut self) -> Result<f32, CalibrationError> {
        let mut sensor = self.shared.borrow_mut();
        let millivolts = sensor
            .input
            .read_millivolts()
            .map_err(|_| CalibrationError::Failed)? as f32;

        let offset = millivolts - ZERO_LEVEL_MV;
        if offset.abs() > MAX_OFFSET_MV {
            warn!("UV offset {} mV rejected, sensor not dark", offset);
            return Err(CalibrationError::InvalidValue);
        }

        sensor.offset_mv = offset;
        info!("UV offset set to {} mV", offset);
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn test_intensity_scale() {
        let mut sensor = UvSensor::new(|| -> Result<u16, SensorError> { Ok(2800) });
        assert!((sensor.intensity().unwrap() - 15.0).abs() < 1e-3);

        let mut dark = UvSensor::new(|| -> Result<u16, SensorError> { Ok(900) });
        assert_eq!(dark.intensity().unwrap(), 0.0);
    }

    #[test]
    fn test_offset_calibration_shifts_readout() {
        let level = Rc::new(Cell::new(1040u16));
        let input = {
            let level = level.clone();
            move || -> Result<u16, SensorError> { Ok(level.get()) }
        };
        let (mut readout, mut calibration) = UvSensor::new(input).split();

        assert_eq!(calibration.sample(), Ok(50.0));
        assert_eq!(readout.read(), Ok(0.0));

        level.set(1040 + 181);
        assert!((readout.read().unwrap() - 1.5).abs() < 1e-3);
    }

    #[test]
    fn test_bright_offset_is_rejected() {
        let mut calibration = UvSensor::new(|| -> Result<u16, SensorError> { Ok(2000) })
            .split()
            .1;
        assert_eq!(calibration.sample(), Err(CalibrationError::InvalidValue));
    }
}
