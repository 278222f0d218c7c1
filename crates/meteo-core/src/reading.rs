//! Tagged reading results and routing identifiers

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::bus::BusReport;
use crate::calibration::CalibrationState;
use crate::catalog::{CalibrationId, CalibrationMeta, SensorId, SensorMeta};
use crate::clock::DateTime;
use crate::error::Error;
use crate::sensors::SensorValue;

/// Category of an input provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Sensor,
    Clock,
    Bus,
    Calibration,
}

/// Category of an output sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    Display,
    Console,
}

impl OutputKind {
    pub const COUNT: usize = 2;
    pub const ALL: [OutputKind; Self::COUNT] = [OutputKind::Display, OutputKind::Console];

    pub const fn index(self) -> usize {
        match self {
            Self::Display => 0,
            Self::Console => 1,
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Display => write!(f, "display"),
            Self::Console => write!(f, "console"),
        }
    }
}

/// One data item to fetch: an input category plus the identifier inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Sensor(SensorId),
    Clock,
    /// Probe a single address, or scan the whole bus with [`SCAN_ALL`](crate::bus::SCAN_ALL)
    Bus(u8),
    Calibration(CalibrationId),
}

impl Input {
    /// Build an input from a category and a raw identifier.
    pub const fn new(kind: InputKind, id: u8) -> Self {
        match kind {
            InputKind::Sensor => Self::Sensor(SensorId(id)),
            InputKind::Clock => Self::Clock,
            InputKind::Bus => Self::Bus(id),
            InputKind::Calibration => Self::Calibration(CalibrationId(id)),
        }
    }

    pub const fn kind(&self) -> InputKind {
        match self {
            Self::Sensor(_) => InputKind::Sensor,
            Self::Clock => InputKind::Clock,
            Self::Bus(_) => InputKind::Bus,
            Self::Calibration(_) => InputKind::Calibration,
        }
    }
}

/// A fetched data item together with its provenance.
///
/// Each variant carries only what its input category produces. The payload sits
/// behind a `Result`, so a consumer has to look at the error before it can look
/// at the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Sensor {
        id: SensorId,
        /// `None` when the identifier is not in the catalog
        meta: Option<&'static SensorMeta>,
        result: Result<SensorValue, Error>,
    },
    Clock {
        result: Result<DateTime, Error>,
    },
    Bus {
        /// Probed address, `SCAN_ALL` for a full scan
        address: u8,
        result: Result<BusReport, Error>,
    },
    Calibration {
        id: CalibrationId,
        meta: Option<&'static CalibrationMeta>,
        state: CalibrationState,
        /// NaN while the calibration is still running
        result: Result<f32, Error>,
    },
}

impl Reading {
    pub const fn kind(&self) -> InputKind {
        match self {
            Self::Sensor { .. } => InputKind::Sensor,
            Self::Clock { .. } => InputKind::Clock,
            Self::Bus { .. } => InputKind::Bus,
            Self::Calibration { .. } => InputKind::Calibration,
        }
    }

    pub fn error(&self) -> Option<Error> {
        match self {
            Self::Sensor { result, .. } => result.err(),
            Self::Clock { result } => result.err(),
            Self::Bus { result, .. } => result.err(),
            Self::Calibration { result, .. } => result.err(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error().is_none()
    }

    /// A reading for `input` that carries only `error`.
    pub fn failed(input: Input, error: Error) -> Self {
        match input {
            Input::Sensor(id) => Self::Sensor {
                id,
                meta: crate::catalog::sensor_meta(id),
                result: Err(error),
            },
            Input::Clock => Self::Clock { result: Err(error) },
            Input::Bus(address) => Self::Bus {
                address,
                result: Err(error),
            },
            Input::Calibration(id) => Self::Calibration {
                id,
                meta: crate::catalog::calibration_meta(id),
                state: CalibrationState::Idle,
                result: Err(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GAS_BASELINE, TEMPERATURE};
    use crate::error::SensorError;

    #[test]
    fn test_input_round_trips_kind() {
        for kind in [
            InputKind::Sensor,
            InputKind::Clock,
            InputKind::Bus,
            InputKind::Calibration,
        ] {
            assert_eq!(Input::new(kind, 3).kind(), kind);
        }
    }

    #[test]
    fn test_failed_reading_keeps_provenance() {
        let reading = Reading::failed(Input::Sensor(TEMPERATURE), SensorError::Absent.into());
        assert_eq!(reading.kind(), InputKind::Sensor);
        assert_eq!(reading.error(), Some(Error::Sensor(SensorError::Absent)));
        match reading {
            Reading::Sensor { id, meta, .. } => {
                assert_eq!(id, TEMPERATURE);
                assert_eq!(meta.map(|m| m.name), Some("Temperature"));
            }
            other => panic!("unexpected reading {:?}", other),
        }

        let reading = Reading::failed(Input::Calibration(GAS_BASELINE), Error::InvalidInput);
        assert!(!reading.is_ok());
    }
}
