use core::fmt::Write;

use log::error;

use super::Sink;
use super::format::{Body, Title};
use crate::error::{Error, Result};
use crate::reading::{OutputKind, Reading};

/// Line oriented text sink, one line per reading.
///
/// Scrolling output keeps history, so the console can take a whole batch of
/// readings in one call.
pub struct ConsoleSink<W> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_reading(&mut self, reading: &Reading) -> core::fmt::Result {
        match reading {
            Reading::Clock { result: Ok(_) } => {
                write!(self.out, "{} {}", Title(reading), Body(reading))?
            }
            _ => write!(self.out, "{}: {}", Title(reading), Body(reading))?,
        }
        self.out.write_char('\n')
    }
}

impl<W: Write> Sink for ConsoleSink<W> {
    fn render(&mut self, reading: &Reading) -> Result<()> {
        self.write_reading(reading).map_err(|_| {
            error!("Console write failed");
            Error::OutputFailed(OutputKind::Console)
        })
    }

    fn report(&mut self, error: &Error) -> Result<()> {
        writeln!(self.out, "Error: {}", error).map_err(|_| Error::OutputFailed(OutputKind::Console))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusReport, SCAN_ALL, ScanBitmap};
    use crate::catalog::{HUMIDITY, RAIN, TEMPERATURE, sensor_meta};
    use crate::clock::DateTime;
    use crate::error::SensorError;
    use crate::sensors::SensorValue;
    use crate::sinks::format::{ROW_WIDTH, fit};
    use crate::sinks::{DisplaySink, ROWS};
    use crate::testing::TextDisplay;

    fn console() -> ConsoleSink<String> {
        ConsoleSink::new(String::new())
    }

    #[test]
    fn test_one_line_per_reading() {
        let mut sink = console();
        sink.render(&Reading::Sensor {
            id: RAIN,
            meta: sensor_meta(RAIN),
            result: Ok(SensorValue::Indication(true)),
        })
        .unwrap();
        sink.render(&Reading::Clock {
            result: Ok(DateTime::new(2024, 3, 7, 8, 5, 9)),
        })
        .unwrap();
        sink.render(&Reading::Sensor {
            id: HUMIDITY,
            meta: sensor_meta(HUMIDITY),
            result: Err(SensorError::Absent.into()),
        })
        .unwrap();

        assert_eq!(
            sink.writer(),
            "Rain: yes\n2024-03-07 08:05:09\nHumidity: Error not responding\n"
        );
    }

    #[test]
    fn test_scan_summary() {
        let mut bitmap = ScanBitmap::new();
        bitmap.set(0x23);
        bitmap.set(0x5C);
        let mut sink = console();
        sink.render(&Reading::Bus {
            address: SCAN_ALL,
            result: Ok(BusReport::Scan(bitmap)),
        })
        .unwrap();

        assert_eq!(sink.writer(), "I2C scan: 2 devices\n");
    }

    #[test]
    fn test_console_and_display_agree_on_formatting() {
        for value in [21.04, -3.96, 84.5] {
            let reading = Reading::Sensor {
                id: TEMPERATURE,
                meta: sensor_meta(TEMPERATURE),
                result: Ok(SensorValue::Value(value)),
            };

            let mut console = console();
            console.render(&reading).unwrap();
            let mut display = DisplaySink::new(TextDisplay::default());
            display.render(&reading).unwrap();

            let line = console.into_inner();
            let value_text = line.trim_end().trim_start_matches("Temperature: ");
            let shown: [String; ROWS] = display.display().rows.clone();
            assert_eq!(shown[1], fit::<ROW_WIDTH>(format_args!("{}", value_text)).as_str());
        }
    }

    #[test]
    fn test_report() {
        let mut sink = console();
        sink.report(&Error::InvalidOutput).unwrap();
        assert_eq!(sink.writer(), "Error: invalid output\n");
    }
}
