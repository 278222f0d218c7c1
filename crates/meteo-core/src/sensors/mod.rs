//! Sensor capabilities and the sensor bank
//!
//! A driver exposes either a numeric [`Readable`] or a boolean [`Indicatable`]
//! capability. The [`SensorBank`] is the single table of configured channels:
//! each row pairs the catalog metadata with the driver that serves it, so the
//! metadata and the dispatch can never drift apart.

#[cfg(feature = "sensor-bh1750")]
mod bh1750;
#[cfg(feature = "sensor-bme280")]
mod bme280;
#[cfg(feature = "sensor-gas")]
mod gas;
#[cfg(feature = "sensor-rain")]
mod rain;
#[cfg(feature = "sensor-sht40")]
mod sht40;
#[cfg(feature = "sensor-uv")]
mod uv;

#[cfg(feature = "sensor-bh1750")]
pub use bh1750::{Address as Bh1750Address, BH1750_ADDRESS_HIGH, BH1750_ADDRESS_LOW, Bh1750};
#[cfg(feature = "sensor-bme280")]
pub use bme280::{BME280_ADDRESS_PRIMARY, Bme280Pressure};
#[cfg(feature = "sensor-gas")]
pub use gas::{GasCalibration, GasReadout, GasSensor};
#[cfg(feature = "sensor-rain")]
pub use rain::RainSensor;
#[cfg(feature = "sensor-sht40")]
pub use sht40::{SHT40_ADDRESS, Sht40, Sht40Humidity, Sht40Temperature};
#[cfg(feature = "sensor-uv")]
pub use uv::{UvOffsetCalibration, UvReadout, UvSensor};

extern crate alloc;
use alloc::boxed::Box;

use log::{debug, warn};

use crate::catalog::{MeasurementKind, SensorId, SensorMeta, sensor_meta};
use crate::error::{Error, Result, SensorError};

/// Maximum number of sensor channels, one bit each in the status bitmask
pub const MAX_SENSORS: usize = 64;

/// A sensor channel producing a numeric value.
pub trait Readable {
    /// Prepare the hardware. Called on first run and on reinitialization.
    fn init(&mut self) -> core::result::Result<(), SensorError> {
        Ok(())
    }

    /// Take one measurement in the unit listed in the catalog.
    fn read(&mut self) -> core::result::Result<f32, SensorError>;
}

/// A sensor channel producing a boolean indication.
pub trait Indicatable {
    fn init(&mut self) -> core::result::Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> core::result::Result<bool, SensorError>;
}

/// Raw analog input in millivolts.
///
/// `embedded-hal` 1.0 has no ADC abstraction, so boards wire their converter
/// through this trait.
pub trait AnalogInput {
    fn read_millivolts(&mut self) -> core::result::Result<u16, SensorError>;
}

impl<F> AnalogInput for F
where
    F: FnMut() -> core::result::Result<u16, SensorError>,
{
    fn read_millivolts(&mut self) -> core::result::Result<u16, SensorError> {
        self()
    }
}

/// Value produced by a sensor channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorValue {
    Value(f32),
    Indication(bool),
}

/// Capability bound to a channel
pub enum SensorDriver {
    Value(Box<dyn Readable>),
    Indication(Box<dyn Indicatable>),
}

impl SensorDriver {
    pub const fn kind(&self) -> MeasurementKind {
        match self {
            Self::Value(_) => MeasurementKind::Value,
            Self::Indication(_) => MeasurementKind::Indication,
        }
    }
}

struct SensorRow {
    meta: &'static SensorMeta,
    driver: SensorDriver,
}

/// The configured sensor channels, in binding order.
///
/// Index order is derived from binding order; callers address channels by
/// identifier and use the index only to iterate.
#[derive(Default)]
pub struct SensorBank {
    rows: heapless::Vec<SensorRow, MAX_SENSORS>,
}

impl SensorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a numeric driver to a catalogued channel.
    pub fn bind_value(&mut self, id: SensorId, driver: impl Readable + 'static) -> Result<()> {
        self.bind(id, SensorDriver::Value(Box::new(driver)))
    }

    /// Bind a boolean driver to a catalogued channel.
    pub fn bind_indication(
        &mut self,
        id: SensorId,
        driver: impl Indicatable + 'static,
    ) -> Result<()> {
        self.bind(id, SensorDriver::Indication(Box::new(driver)))
    }

    pub fn bind(&mut self, id: SensorId, driver: SensorDriver) -> Result<()> {
        let meta = sensor_meta(id).ok_or(SensorError::NotConfigured)?;
        if meta.kind != driver.kind() {
            warn!("{} expects {:?}, driver gives {:?}", meta.name, meta.kind, driver.kind());
            return Err(SensorError::WrongKind.into());
        }
        if self.id_to_index(id).is_some() {
            return Err(SensorError::Duplicate.into());
        }
        self.rows
            .push(SensorRow { meta, driver })
            .map_err(|_| SensorError::CatalogFull)?;
        debug!("Bound {} at index {}", meta.name, self.rows.len() - 1);
        Ok(())
    }

    /// Number of configured channels
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Metadata of a configured channel; `None` if the channel is not bound.
    pub fn metadata(&self, id: SensorId) -> Option<&'static SensorMeta> {
        self.rows.iter().find(|row| row.meta.id == id).map(|row| row.meta)
    }

    /// Identifier at `index`, `None` outside the configured range.
    pub fn index_to_id(&self, index: usize) -> Option<SensorId> {
        self.rows.get(index).map(|row| row.meta.id)
    }

    pub fn id_to_index(&self, id: SensorId) -> Option<usize> {
        if !id.is_valid() {
            return None;
        }
        self.rows.iter().position(|row| row.meta.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = SensorId> + '_ {
        self.rows.iter().map(|row| row.meta.id)
    }

    /// Initialize the driver of one channel.
    pub fn init(&mut self, id: SensorId) -> Result<()> {
        let row = self.row_mut(id)?;
        match &mut row.driver {
            SensorDriver::Value(driver) => driver.init()?,
            SensorDriver::Indication(driver) => driver.init()?,
        }
        Ok(())
    }

    /// Read one channel, classifying implausible values.
    pub fn read(&mut self, id: SensorId) -> Result<SensorValue> {
        if self.rows.is_empty() {
            return Err(SensorError::NoneConfigured.into());
        }
        let row = self.row_mut(id)?;
        match &mut row.driver {
            SensorDriver::Value(driver) => {
                let value = driver.read()?;
                if !value.is_finite() {
                    return Err(SensorError::InvalidValue.into());
                }
                if let Some(range) = row.meta.range
                    && !range.contains(value)
                {
                    debug!("{} out of range: {}", row.meta.name, value);
                    return Err(SensorError::OutOfRange.into());
                }
                Ok(SensorValue::Value(value))
            }
            SensorDriver::Indication(driver) => Ok(SensorValue::Indication(driver.read()?)),
        }
    }

    fn row_mut(&mut self, id: SensorId) -> Result<&mut SensorRow> {
        self.rows
            .iter_mut()
            .find(|row| row.meta.id == id)
            .ok_or(Error::Sensor(SensorError::NotConfigured))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HUMIDITY, LUMINANCE, RAIN, TEMPERATURE};
    use crate::testing::{FixedIndication, FixedValue};

    fn bank() -> SensorBank {
        let mut bank = SensorBank::new();
        bank.bind_value(TEMPERATURE, FixedValue::new(21.5)).unwrap();
        bank.bind_value(HUMIDITY, FixedValue::new(140.0)).unwrap();
        bank.bind_indication(RAIN, FixedIndication::new(true)).unwrap();
        bank
    }

    #[test]
    fn test_index_and_id_are_a_bijection() {
        let bank = bank();
        for id in bank.ids().collect::<Vec<_>>() {
            let index = bank.id_to_index(id).unwrap();
            assert_eq!(bank.index_to_id(index), Some(id));
        }
        assert_eq!(bank.index_to_id(bank.count()), None);
        assert_eq!(bank.id_to_index(SensorId::INVALID), None);
    }

    #[test]
    fn test_bind_rejects_mismatched_kind_and_duplicates() {
        let mut bank = bank();
        assert_eq!(
            bank.bind_indication(LUMINANCE, FixedIndication::new(false)),
            Err(Error::Sensor(SensorError::WrongKind))
        );
        assert_eq!(
            bank.bind_value(TEMPERATURE, FixedValue::new(1.0)),
            Err(Error::Sensor(SensorError::Duplicate))
        );
        assert_eq!(
            bank.bind_value(SensorId(99), FixedValue::new(1.0)),
            Err(Error::Sensor(SensorError::NotConfigured))
        );
    }

    #[test]
    fn test_read_classifies_values() {
        let mut bank = bank();
        assert_eq!(bank.read(TEMPERATURE), Ok(SensorValue::Value(21.5)));
        assert_eq!(bank.read(HUMIDITY), Err(Error::Sensor(SensorError::OutOfRange)));
        assert_eq!(bank.read(RAIN), Ok(SensorValue::Indication(true)));
        assert_eq!(bank.read(LUMINANCE), Err(Error::Sensor(SensorError::NotConfigured)));
    }

    #[test]
    fn test_absent_is_distinct_from_out_of_range() {
        let mut bank = SensorBank::new();
        bank.bind_value(TEMPERATURE, FixedValue::failing(SensorError::Absent))
            .unwrap();
        assert_eq!(bank.read(TEMPERATURE), Err(Error::Sensor(SensorError::Absent)));
    }

    #[test]
    fn test_empty_bank_reports_none_configured() {
        let mut bank = SensorBank::new();
        assert_eq!(bank.read(TEMPERATURE), Err(Error::Sensor(SensorError::NoneConfigured)));
        assert!(bank.metadata(TEMPERATURE).is_none());
    }

    #[test]
    fn test_nan_is_invalid() {
        let mut bank = SensorBank::new();
        bank.bind_value(TEMPERATURE, FixedValue::new(f32::NAN)).unwrap();
        assert_eq!(bank.read(TEMPERATURE), Err(Error::Sensor(SensorError::InvalidValue)));
    }
}
