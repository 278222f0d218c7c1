use bh1750_embedded::{Bh1750 as Driver, Resolution};
use embedded_hal::i2c::I2c;
use log::{debug, error};

pub use bh1750_embedded::Address;

use super::Readable;
use crate::error::SensorError;

/// Bus address with the ADDR pin pulled low
pub const BH1750_ADDRESS_LOW: u8 = 0x23;
/// Bus address with the ADDR pin pulled high
pub const BH1750_ADDRESS_HIGH: u8 = 0x5C;

/// BH1750 ambient light sensor, one high resolution measurement per read.
pub struct Bh1750<I> {
    sensor: Driver<I, embassy_time::Delay>,
}

impl<I: I2c> Bh1750<I> {
    pub fn new(i2c: I, address: Address) -> Self {
        Self {
            sensor: Driver::new(i2c, embassy_time::Delay, address),
        }
    }
}

impl<I: I2c> Readable for Bh1750<I> {
    fn read(&mut self) -> Result<f32, SensorError> {
        let lux = self
            .sensor
            .one_time_measurement(Resolution::High)
            .map_err(|e| {
                error!("BH1750 one_time_measurement failed: {:?}", e);
                SensorError::Absent
            })?;
        debug!("BH1750: {} lx", lux);
        Ok(lux)
    }
}
