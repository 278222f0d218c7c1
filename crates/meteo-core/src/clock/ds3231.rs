use embedded_hal::i2c::I2c;
use log::{debug, error};

use super::{ClockProvider, DateTime};
use crate::error::ClockError;

pub const DS3231_ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
const REG_STATUS: u8 = 0x0F;

/// Oscillator stop flag
const STATUS_OSF: u8 = 1 << 7;
const HOURS_12H: u8 = 1 << 6;
const HOURS_PM: u8 = 1 << 5;
const MONTH_CENTURY: u8 = 1 << 7;

const fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

const fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// DS3231 temperature compensated RTC.
pub struct Ds3231<I> {
    i2c: I,
}

impl<I: I2c> Ds3231<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    fn read_status(&mut self) -> Result<u8, ClockError> {
        let mut status = [0u8];
        self.i2c
            .write_read(DS3231_ADDRESS, &[REG_STATUS], &mut status)
            .map_err(|e| {
                error!("DS3231 status read failed: {:?}", e);
                ClockError::NotFound
            })?;
        Ok(status[0])
    }
}

impl<I: I2c> ClockProvider for Ds3231<I> {
    fn init(&mut self) -> Result<(), ClockError> {
        let status = self.read_status()?;
        debug!("DS3231 status {:#04x}", status);
        Ok(())
    }

    fn now(&mut self) -> Result<DateTime, ClockError> {
        let mut raw = [0u8; 7];
        self.i2c
            .write_read(DS3231_ADDRESS, &[REG_SECONDS], &mut raw)
            .map_err(|e| {
                error!("DS3231 time read failed: {:?}", e);
                ClockError::NotFound
            })?;

        let hour = if raw[2] & HOURS_12H != 0 {
            let pm = if raw[2] & HOURS_PM != 0 { 12 } else { 0 };
            from_bcd(raw[2] & 0x1F) % 12 + pm
        } else {
            from_bcd(raw[2] & 0x3F)
        };
        let century = if raw[5] & MONTH_CENTURY != 0 { 100 } else { 0 };

        Ok(DateTime {
            year: 2000 + century + from_bcd(raw[6]) as u16,
            month: from_bcd(raw[5] & 0x1F),
            day: from_bcd(raw[4] & 0x3F),
            hour,
            minute: from_bcd(raw[1] & 0x7F),
            second: from_bcd(raw[0] & 0x7F),
        })
    }

    fn lost_power(&mut self) -> Result<bool, ClockError> {
        Ok(self.read_status()? & STATUS_OSF != 0)
    }

    fn set(&mut self, time: &DateTime) -> Result<(), ClockError> {
        if !time.is_plausible() {
            return Err(ClockError::Implausible);
        }

        let frame = [
            REG_SECONDS,
            to_bcd(time.second),
            to_bcd(time.minute),
            to_bcd(time.hour),
            // Day of week is free running, the station never reads it
            1,
            to_bcd(time.day),
            to_bcd(time.month),
            to_bcd((time.year - 2000) as u8),
        ];
        self.i2c.write(DS3231_ADDRESS, &frame).map_err(|e| {
            error!("DS3231 time write failed: {:?}", e);
            ClockError::NotFound
        })?;

        let status = self.read_status()?;
        self.i2c
            .write(DS3231_ADDRESS, &[REG_STATUS, status & !STATUS_OSF])
            .map_err(|_| ClockError::NotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBus;

    #[test]
    fn test_bcd() {
        assert_eq!(from_bcd(0x59), 59);
        assert_eq!(to_bcd(59), 0x59);
        assert_eq!(to_bcd(7), 0x07);
    }

    #[test]
    fn test_reads_24h_time() {
        let bus = MockBus::with_devices(&[DS3231_ADDRESS]);
        bus.set_registers(DS3231_ADDRESS, 0x00, &[0x56, 0x34, 0x12, 0x04, 0x29, 0x02, 0x24]);
        let mut rtc = Ds3231::new(bus);

        assert_eq!(rtc.now(), Ok(DateTime::new(2024, 2, 29, 12, 34, 56)));
    }

    #[test]
    fn test_reads_12h_time() {
        let bus = MockBus::with_devices(&[DS3231_ADDRESS]);
        // 11 PM
        bus.set_registers(DS3231_ADDRESS, 0x00, &[0x00, 0x00, 0x71, 0x01, 0x01, 0x01, 0x25]);
        let mut rtc = Ds3231::new(bus);

        assert_eq!(rtc.now().map(|t| t.hour), Ok(23));
    }

    #[test]
    fn test_set_writes_bcd_and_clears_oscillator_flag() {
        let bus = MockBus::with_devices(&[DS3231_ADDRESS]);
        bus.set_registers(DS3231_ADDRESS, REG_STATUS, &[STATUS_OSF | 0x08]);
        let mut rtc = Ds3231::new(bus.clone());
        assert_eq!(rtc.lost_power(), Ok(true));

        rtc.set(&DateTime::new(2025, 10, 19, 8, 30, 0)).unwrap();

        assert_eq!(
            bus.registers(DS3231_ADDRESS, 0x00, 7),
            vec![0x00, 0x30, 0x08, 0x01, 0x19, 0x10, 0x25]
        );
        assert_eq!(bus.registers(DS3231_ADDRESS, REG_STATUS, 1), vec![0x08]);
        assert_eq!(rtc.lost_power(), Ok(false));
        assert_eq!(rtc.now(), Ok(DateTime::new(2025, 10, 19, 8, 30, 0)));
    }

    #[test]
    fn test_missing_clock_is_not_found() {
        let mut rtc = Ds3231::new(MockBus::with_devices(&[]));
        assert_eq!(rtc.init(), Err(ClockError::NotFound));
        assert_eq!(rtc.now(), Err(ClockError::NotFound));
    }
}
