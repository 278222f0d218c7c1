//! Text rendering shared by every sink
//!
//! Display and console go through the same [`Title`] and [`Body`] formatters,
//! so a value always shows with the precision and unit of its catalog entry.

use core::fmt::{self, Write};

use crate::bus::{BusReport, SCAN_ALL};
use crate::calibration::CalibrationState;
use crate::reading::Reading;
use crate::sensors::SensorValue;

/// Characters per row of the character display
pub const ROW_WIDTH: usize = 16;

/// Render `args` into exactly `N` bytes: longer text is cut, shorter is padded
/// with spaces.
pub fn fit<const N: usize>(args: fmt::Arguments<'_>) -> heapless::String<N> {
    let mut out = Fit {
        text: heapless::String::new(),
    };
    // Fit never reports an error, it stops accepting characters instead
    let _ = out.write_fmt(args);
    while out.text.push(' ').is_ok() {}
    out.text
}

struct Fit<const N: usize> {
    text: heapless::String<N>,
}

impl<const N: usize> Write for Fit<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.text.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

struct Number<'a> {
    value: f32,
    precision: u8,
    unit: &'a str,
}

impl fmt::Display for Number<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}", self.precision as usize, self.value)?;
        if !self.unit.is_empty() {
            write!(f, " {}", self.unit)?;
        }
        Ok(())
    }
}

/// What a reading is about: catalog name, date, or bus address.
pub struct Title<'a>(pub &'a Reading);

impl fmt::Display for Title<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Reading::Sensor { id, meta, .. } => match meta {
                Some(meta) => f.write_str(meta.name),
                None => write!(f, "{}", id),
            },
            Reading::Clock { result: Ok(time) } => {
                write!(f, "{:04}-{:02}-{:02}", time.year, time.month, time.day)
            }
            Reading::Clock { result: Err(_) } => f.write_str("Clock"),
            Reading::Bus { address, result } => match result {
                Ok(BusReport::Scan(_)) => f.write_str("I2C scan"),
                Ok(BusReport::Device(_)) => f.write_str("I2C device"),
                _ if *address == SCAN_ALL => f.write_str("I2C scan"),
                _ => write!(f, "I2C {:#04x}", address),
            },
            Reading::Calibration { id, meta, .. } => match meta {
                Some(meta) => f.write_str(meta.name),
                None => write!(f, "{}", id),
            },
        }
    }
}

/// The value of a reading, or `Error <name>` when it failed.
pub struct Body<'a>(pub &'a Reading);

impl fmt::Display for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = self.0.error() {
            return write!(f, "Error {}", error);
        }

        match self.0 {
            Reading::Sensor {
                meta,
                result: Ok(value),
                ..
            } => match (value, meta) {
                (SensorValue::Value(value), Some(meta)) => write!(
                    f,
                    "{}",
                    Number {
                        value: *value,
                        precision: meta.precision,
                        unit: meta.unit,
                    }
                ),
                (SensorValue::Value(value), None) => write!(f, "{}", value),
                (SensorValue::Indication(true), _) => f.write_str("yes"),
                (SensorValue::Indication(false), _) => f.write_str("no"),
            },
            Reading::Clock { result: Ok(time) } => write!(
                f,
                "{:02}:{:02}:{:02}",
                time.hour, time.minute, time.second
            ),
            Reading::Bus {
                result: Ok(report), ..
            } => match report {
                BusReport::Scan(bitmap) => write!(f, "{} devices", bitmap.count()),
                BusReport::Probe { outcome } => write!(f, "{}", outcome),
                BusReport::Device(address) => write!(f, "{:#04x}", address),
            },
            Reading::Calibration {
                meta,
                state,
                result: Ok(value),
                ..
            } => match state {
                CalibrationState::InProgress => f.write_str("in progress"),
                CalibrationState::Idle => f.write_str("idle"),
                CalibrationState::Finished => match meta {
                    Some(meta) => write!(
                        f,
                        "{}",
                        Number {
                            value: *value,
                            precision: meta.precision,
                            unit: meta.unit,
                        }
                    ),
                    None => write!(f, "{}", value),
                },
            },
            // Failed readings returned above
            _ => Ok(()),
        }
    }
}
