//! Error taxonomy of the station
//!
//! Each provider category has its own error enum; [`Error`] nests them together
//! with the generic routing errors so a single value can travel inside a
//! [`Reading`](crate::reading::Reading) to every sink.

use core::fmt;

use thiserror_no_std::Error;

use crate::catalog::{CalibrationId, SensorId};
use crate::reading::OutputKind;

/// Result type used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by sensor channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("not configured")]
    NotConfigured,
    #[error("wrong kind")]
    WrongKind,
    #[error("out of range")]
    OutOfRange,
    #[error("invalid value")]
    InvalidValue,
    #[error("none configured")]
    NoneConfigured,
    #[error("not responding")]
    Absent,
    #[error("already bound")]
    Duplicate,
    #[error("catalog full")]
    CatalogFull,
}

/// Errors reported by the real-time clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("not found")]
    NotFound,
    #[error("implausible time")]
    Implausible,
}

/// Errors reported by the I2C bus scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("scan incomplete")]
    ScanIncomplete,
    #[error("invalid address")]
    InvalidAddress,
    #[error("unreadable status")]
    UnreadableStatus,
    #[error("unknown status")]
    UnknownStatus,
    #[error("no more devices")]
    NotFound,
}

/// Errors reported by calibration processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("none configured")]
    NoneConfigured,
    #[error("not configured")]
    NotConfigured,
    #[error("wrong sample mode")]
    WrongSampleMode,
    #[error("incompatible")]
    IncompatibleSensor,
    #[error("invalid value")]
    InvalidValue,
    #[error("failed")]
    Failed,
}

/// A component tracked by the initialization bitmasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Sensor(SensorId),
    Clock,
    Bus,
    Calibration(CalibrationId),
    Output(OutputKind),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(id) => write!(f, "{}", id),
            Self::Clock => write!(f, "RTC"),
            Self::Bus => write!(f, "I2C"),
            Self::Calibration(id) => write!(f, "{}", id),
            Self::Output(kind) => write!(f, "{}", kind),
        }
    }
}

/// Errors reported while (re)initializing components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("{component} failed")]
    Failed { component: Component },
    #[error("{pending} pending")]
    Incomplete { pending: u32 },
}

/// Top-level station error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid input")]
    InvalidInput,
    #[error("invalid output")]
    InvalidOutput,
    #[error("invalid type")]
    InvalidType,
    #[error("{0} failed")]
    OutputFailed(OutputKind),
    #[error("invalid config")]
    InvalidConfig,
    #[error("{0}")]
    Sensor(SensorError),
    #[error("{0}")]
    Clock(ClockError),
    #[error("{0}")]
    Bus(BusError),
    #[error("{0}")]
    Calibration(CalibrationError),
    #[error("init: {0}")]
    Init(InitError),
}

impl From<SensorError> for Error {
    fn from(value: SensorError) -> Self {
        Self::Sensor(value)
    }
}

impl From<ClockError> for Error {
    fn from(value: ClockError) -> Self {
        Self::Clock(value)
    }
}

impl From<BusError> for Error {
    fn from(value: BusError) -> Self {
        Self::Bus(value)
    }
}

impl From<CalibrationError> for Error {
    fn from(value: CalibrationError) -> Self {
        Self::Calibration(value)
    }
}

impl From<InitError> for Error {
    fn from(value: InitError) -> Self {
        Self::Init(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_fit_display_row() {
        let samples = [
            Error::from(SensorError::OutOfRange),
            Error::from(SensorError::NotConfigured),
            Error::from(ClockError::Implausible),
            Error::from(BusError::ScanIncomplete),
            Error::from(CalibrationError::IncompatibleSensor),
            Error::OutputFailed(OutputKind::Console),
        ];
        for error in samples {
            assert!(error.to_string().len() <= 16, "{:?} too long", error);
        }
    }

    #[test]
    fn test_init_error_names_component() {
        let error = Error::from(InitError::Failed {
            component: Component::Clock,
        });
        assert_eq!(error.to_string(), "init: RTC failed");
    }
}
