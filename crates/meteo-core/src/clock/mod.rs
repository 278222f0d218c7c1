//! Real-time clock provider
//!
//! Any calendar value that leaves the sane range is reported as
//! [`ClockError::Implausible`] instead of being passed on to the sinks.

#[cfg(feature = "rtc-ds3231")]
mod ds3231;

#[cfg(feature = "rtc-ds3231")]
pub use ds3231::{DS3231_ADDRESS, Ds3231};

use core::fmt;

use log::{info, warn};

use crate::error::ClockError;

/// Broken-down calendar time (UTC, 24 hour)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

impl DateTime {
    /// Years a two-digit RTC year register can hold
    pub const MIN_YEAR: u16 = 2000;
    pub const MAX_YEAR: u16 = 2099;

    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    pub const fn is_plausible(&self) -> bool {
        self.year >= Self::MIN_YEAR
            && self.year <= Self::MAX_YEAR
            && self.month >= 1
            && self.month <= 12
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    /// Convert seconds since the Unix epoch.
    pub const fn from_unix_seconds(seconds: u64) -> Self {
        let days = (seconds / 86_400) as i64;
        let rem = seconds % 86_400;

        // Civil-from-days over 400 year eras
        let z = days + 719_468;
        let era = z.div_euclid(146_097);
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };

        Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (rem / 3_600) as u8,
            minute: (rem / 60 % 60) as u8,
            second: (rem % 60) as u8,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// A battery-backed calendar clock.
pub trait ClockProvider {
    fn init(&mut self) -> Result<(), ClockError> {
        Ok(())
    }

    /// Raw time as stored by the hardware, unfiltered.
    fn now(&mut self) -> Result<DateTime, ClockError>;

    /// Whether the oscillator stopped since the time was last set.
    fn lost_power(&mut self) -> Result<bool, ClockError> {
        Ok(false)
    }

    fn set(&mut self, time: &DateTime) -> Result<(), ClockError>;
}

/// Read the clock and reject implausible calendar values.
pub fn read_clock(clock: &mut dyn ClockProvider) -> Result<DateTime, ClockError> {
    let time = clock.now()?;
    if !time.is_plausible() {
        warn!("RTC returned implausible time {}", time);
        return Err(ClockError::Implausible);
    }
    Ok(time)
}

/// Set the clock to `fallback` if it lost power. Returns whether it was set.
pub fn restore_if_power_lost(
    clock: &mut dyn ClockProvider,
    fallback: &DateTime,
) -> Result<bool, ClockError> {
    if !clock.lost_power()? {
        return Ok(false);
    }
    info!("RTC lost power, setting it to {}", fallback);
    clock.set(fallback)?;
    Ok(true)
}
