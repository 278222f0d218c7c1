//! Static device catalogs
//!
//! Every sensor and calibration process the station knows about is described
//! once, at build time, by an immutable metadata record. Records are looked up
//! by identifier; the position of a record in a table carries no meaning.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a sensor channel. `0` is reserved as "invalid/unused".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(pub u8);

impl SensorId {
    pub const INVALID: Self = Self(0);

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sensor #{}", self.0)
    }
}

/// Identifier of a calibration process. `0` is reserved as "invalid/unused".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalibrationId(pub u8);

impl CalibrationId {
    pub const INVALID: Self = Self(0);

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Display for CalibrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "calibration #{}", self.0)
    }
}

/// What a sensor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    /// A numeric physical value
    Value,
    /// A boolean indication (e.g. "raining")
    Indication,
}

/// How many physical samples a calibration needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleMode {
    /// One synchronous sample, finished immediately
    Single,
    /// Accumulated over several scheduler ticks
    Multiple,
}

/// Inclusive range of physically plausible values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Display metadata of a sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorMeta {
    pub id: SensorId,
    pub name: &'static str,
    pub unit: &'static str,
    pub kind: MeasurementKind,
    /// Number of decimals shown for numeric values
    pub precision: u8,
    /// Compact label used where space is short
    pub label: &'static str,
    /// Values outside this range are reported as out of range
    pub range: Option<ValueRange>,
}

/// Display metadata of a calibration process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationMeta {
    pub id: CalibrationId,
    pub name: &'static str,
    pub unit: &'static str,
    pub precision: u8,
    pub label: &'static str,
    pub mode: SampleMode,
    /// Sensor whose hardware is calibrated
    pub sensor: SensorId,
}

pub mod ids {
    use super::{CalibrationId, SensorId};

    pub const TEMPERATURE: SensorId = SensorId(1);
    pub const HUMIDITY: SensorId = SensorId(2);
    pub const PRESSURE: SensorId = SensorId(3);
    pub const LUMINANCE: SensorId = SensorId(4);
    pub const GAS: SensorId = SensorId(5);
    pub const UV: SensorId = SensorId(6);
    pub const RAIN: SensorId = SensorId(7);

    pub const GAS_BASELINE: CalibrationId = CalibrationId(1);
    pub const UV_OFFSET: CalibrationId = CalibrationId(2);
}

pub use ids::*;

/// Every sensor channel compiled into the station.
pub static SENSOR_CATALOG: [SensorMeta; 7] = [
    SensorMeta {
        id: TEMPERATURE,
        name: "Temperature",
        unit: "C",
        kind: MeasurementKind::Value,
        precision: 1,
        label: "T",
        range: Some(ValueRange::new(-40.0, 85.0)),
    },
    SensorMeta {
        id: HUMIDITY,
        name: "Humidity",
        unit: "%",
        kind: MeasurementKind::Value,
        precision: 0,
        label: "H",
        range: Some(ValueRange::new(0.0, 100.0)),
    },
    SensorMeta {
        id: PRESSURE,
        name: "Pressure",
        unit: "hPa",
        kind: MeasurementKind::Value,
        precision: 1,
        label: "P",
        range: Some(ValueRange::new(300.0, 1100.0)),
    },
    SensorMeta {
        id: LUMINANCE,
        name: "Luminance",
        unit: "lx",
        kind: MeasurementKind::Value,
        precision: 0,
        label: "L",
        range: Some(ValueRange::new(0.0, 65535.0)),
    },
    SensorMeta {
        id: GAS,
        name: "Air quality",
        unit: "ppm",
        kind: MeasurementKind::Value,
        precision: 0,
        label: "AQ",
        range: Some(ValueRange::new(0.0, 10000.0)),
    },
    SensorMeta {
        id: UV,
        name: "UV intensity",
        unit: "mW/cm2",
        kind: MeasurementKind::Value,
        precision: 2,
        label: "UV",
        range: Some(ValueRange::new(0.0, 15.0)),
    },
    SensorMeta {
        id: RAIN,
        name: "Rain",
        unit: "",
        kind: MeasurementKind::Indication,
        precision: 0,
        label: "R",
        range: None,
    },
];

/// Every calibration process compiled into the station.
pub static CALIBRATION_CATALOG: [CalibrationMeta; 2] = [
    CalibrationMeta {
        id: GAS_BASELINE,
        name: "Gas baseline",
        unit: "kOhm",
        precision: 2,
        label: "R0",
        mode: SampleMode::Multiple,
        sensor: GAS,
    },
    CalibrationMeta {
        id: UV_OFFSET,
        name: "UV offset",
        unit: "mV",
        precision: 0,
        label: "UV0",
        mode: SampleMode::Single,
        sensor: UV,
    },
];

/// Look up the metadata of a sensor channel.
pub fn sensor_meta(id: SensorId) -> Option<&'static SensorMeta> {
    if !id.is_valid() {
        return None;
    }
    SENSOR_CATALOG.iter().find(|meta| meta.id == id)
}

/// Look up the metadata of a calibration process.
pub fn calibration_meta(id: CalibrationId) -> Option<&'static CalibrationMeta> {
    if !id.is_valid() {
        return None;
    }
    CALIBRATION_CATALOG.iter().find(|meta| meta.id == id)
}
