extern crate alloc;
use alloc::rc::Rc;
use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use log::{debug, error};
use sht4x::{Precision, Sht4x};

use super::Readable;
use crate::error::SensorError;

/// Fixed bus address of the SHT40-AD1B
pub const SHT40_ADDRESS: u8 = 0x44;

/// SHT40 temperature and humidity sensor.
///
/// One measurement yields both quantities, which belong to two catalog
/// channels; [`Sht40::split`] hands out one handle per channel onto the same
/// device.
pub struct Sht40<I> {
    sensor: Sht4x<I, embassy_time::Delay>,
}

impl<I: I2c> Sht40<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4x::new(i2c),
        }
    }

    /// Temperature in degrees Celsius and relative humidity in percent.
    pub fn measure(&mut self) -> Result<(f32, f32), SensorError> {
        let measurement = self
            .sensor
            .measure(Precision::High, &mut embassy_time::Delay)
            .map_err(|e| {
                error!("SHT40 measurement failed: {:?}", e);
                SensorError::Absent
            })?;

        let temperature = measurement.temperature_celsius().to_num::<f32>();
        let humidity = measurement.humidity_percent().to_num::<f32>();
        debug!("SHT40: {} C, {} %", temperature, humidity);
        Ok((temperature, humidity))
    }

    pub fn split(self) -> (Sht40Temperature<I>, Sht40Humidity<I>) {
        let shared = Rc::new(RefCell::new(self));
        (
            Sht40Temperature {
                shared: shared.clone(),
            },
            Sht40Humidity { shared },
        )
    }
}

/// Temperature channel of an [`Sht40`].
pub struct Sht40Temperature<I> {
    shared: Rc<RefCell<Sht40<I>>>,
}

impl<I: I2c> Readable for Sht40Temperature<I> {
    fn init(&mut self) -> Result<(), SensorError> {
        self.read().map(|_| ())
    }

    fn read(&mut self) -> Result<f32, SensorError> {
        self.shared.borrow_mut().measure().map(|(temperature, _)| temperature)
    }
}

/// Relative humidity channel of an [`Sht40`].
pub struct Sht40Humidity<I> {
    shared: Rc<RefCell<Sht40<I>>>,
}

impl<I: I2c> Readable for Sht40Humidity<I> {
    fn init(&mut self) -> Result<(), SensorError> {
        self.read().map(|_| ())
    }

    fn read(&mut self) -> Result<f32, SensorError> {
        self.shared.borrow_mut().measure().map(|(_, humidity)| humidity)
    }
}
