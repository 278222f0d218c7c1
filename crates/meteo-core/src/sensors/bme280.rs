use bme280::i2c::BME280;
use embedded_hal::i2c::I2c;
use log::{debug, error, info};

use super::Readable;
use crate::error::SensorError;

/// Bus address with SDO tied to ground
pub const BME280_ADDRESS_PRIMARY: u8 = 0x76;

/// Barometric pressure channel of a BME280, in hPa.
///
/// Temperature and humidity come from the SHT40; the BME280 only serves the
/// pressure channel.
pub struct Bme280Pressure<I> {
    sensor: BME280<I>,
}

impl<I: I2c> Bme280Pressure<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: BME280::new_primary(i2c),
        }
    }
}

impl<I: I2c> Readable for Bme280Pressure<I> {
    /// Reset the chip and load its compensation coefficients.
    fn init(&mut self) -> Result<(), SensorError> {
        self.sensor.init(&mut embassy_time::Delay).map_err(|e| {
            error!("BME280 init failed: {:?}", e);
            SensorError::Absent
        })?;
        info!("BME280 ready");
        Ok(())
    }

    fn read(&mut self) -> Result<f32, SensorError> {
        let measurements = self.sensor.measure(&mut embassy_time::Delay).map_err(|e| {
            error!("BME280 measure failed: {:?}", e);
            SensorError::Absent
        })?;
        let hpa = measurements.pressure / 100.0;
        debug!("BME280: {} hPa", hpa);
        Ok(hpa)
    }
}
