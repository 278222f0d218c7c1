//! I2C bus scanning
//!
//! A [`ScanContext`] moves through `Pending -> Complete -> Iterating ->
//! Exhausted`. A full scan probes every legal 7-bit address once and fills a
//! 128 bit map. Iteration then walks the map one discovered address per call.
//! Once exhausted, the context re-arms itself so the next cycle scans the bus
//! again instead of replaying stale results.

use core::fmt;

use embedded_hal::i2c::{ErrorKind, I2c, NoAcknowledgeSource};
use log::{debug, warn};

use crate::error::{BusError, Error, Result};

/// Address value selecting a full scan instead of a single probe
pub const SCAN_ALL: u8 = 0;
pub const MIN_ADDRESS: u8 = 1;
pub const MAX_ADDRESS: u8 = 127;

/// Outcome of addressing one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    Success,
    TooLong,
    NackAddress,
    NackData,
    Unknown,
}

impl Transmission {
    /// Classify a raw controller status code. Anything outside the five known
    /// codes is unreadable.
    pub const fn from_code(code: u8) -> core::result::Result<Self, BusError> {
        match code {
            0 => Ok(Self::Success),
            1 => Ok(Self::TooLong),
            2 => Ok(Self::NackAddress),
            3 => Ok(Self::NackData),
            4 => Ok(Self::Unknown),
            _ => Err(BusError::UnreadableStatus),
        }
    }

    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::TooLong => 1,
            Self::NackAddress => 2,
            Self::NackData => 3,
            Self::Unknown => 4,
        }
    }

    pub const fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Overrun => Self::TooLong,
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => Self::NackData,
            ErrorKind::NoAcknowledge(_) => Self::NackAddress,
            _ => Self::Unknown,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Transmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "ok",
            Self::TooLong => "too long",
            Self::NackAddress => "nack address",
            Self::NackData => "nack data",
            Self::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Raw bus transaction used for scanning.
///
/// Implementors report the controller's raw status code; [`BusProbe::probe`]
/// classifies it, so a code outside the five known outcomes surfaces as
/// [`BusError::UnreadableStatus`] instead of being trusted.
pub trait BusProbe {
    fn init(&mut self) -> core::result::Result<(), BusError> {
        Ok(())
    }

    /// Address `address` without payload and return the raw status code.
    fn transmit(&mut self, address: u8) -> u8;

    /// Address `address` without payload and report how the bus answered.
    fn probe(&mut self, address: u8) -> core::result::Result<Transmission, BusError> {
        if address > MAX_ADDRESS {
            return Err(BusError::InvalidAddress);
        }
        Transmission::from_code(self.transmit(address))
    }
}

/// [`BusProbe`] over any blocking `embedded-hal` bus.
pub struct I2cProbe<I> {
    i2c: I,
}

impl<I: I2c> I2cProbe<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }
}

impl<I: I2c> BusProbe for I2cProbe<I> {
    fn transmit(&mut self, address: u8) -> u8 {
        let outcome = match self.i2c.write(address, &[]) {
            Ok(()) => Transmission::Success,
            Err(e) => {
                use embedded_hal::i2c::Error as _;
                Transmission::from_error_kind(e.kind())
            }
        };
        outcome.code()
    }
}

/// One bit per 7-bit address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanBitmap([u8; 16]);

impl ScanBitmap {
    pub const fn new() -> Self {
        Self([0; 16])
    }

    pub fn set(&mut self, address: u8) {
        if address <= MAX_ADDRESS {
            self.0[(address / 8) as usize] |= 1 << (address % 8);
        }
    }

    pub fn contains(&self, address: u8) -> bool {
        address <= MAX_ADDRESS && self.0[(address / 8) as usize] & (1 << (address % 8)) != 0
    }

    /// First set address strictly above `address`.
    pub fn next_after(&self, address: u8) -> Option<u8> {
        (address.saturating_add(1)..=MAX_ADDRESS).find(|&a| self.contains(a))
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|byte| byte.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (MIN_ADDRESS..=MAX_ADDRESS).filter(|&a| self.contains(a))
    }
}

/// Payload of a bus reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusReport {
    /// Result of a full scan
    Scan(ScanBitmap),
    /// Result of a single address probe
    Probe { outcome: Transmission },
    /// Next discovered address while iterating a scan
    Device(u8),
}

/// Probe every legal address once.
pub fn scan_all(probe: &mut dyn BusProbe) -> Result<ScanBitmap> {
    let mut bitmap = ScanBitmap::new();
    let mut probed = 0u8;

    for address in MIN_ADDRESS..=MAX_ADDRESS {
        match probe.probe(address) {
            Ok(Transmission::Success) => bitmap.set(address),
            Ok(_) => {}
            Err(e) => warn!("Probe of {:#04x} failed: {}", address, e),
        }
        probed += 1;
    }

    if probed != MAX_ADDRESS - MIN_ADDRESS + 1 {
        return Err(BusError::ScanIncomplete.into());
    }
    debug!("Scan found {} devices", bitmap.count());
    Ok(bitmap)
}

/// Probe one address. An unknown outcome is reported as an error.
pub fn probe_address(probe: &mut dyn BusProbe, address: u8) -> Result<Transmission> {
    if address == SCAN_ALL || address > MAX_ADDRESS {
        return Err(BusError::InvalidAddress.into());
    }
    match probe.probe(address)? {
        Transmission::Unknown => Err(BusError::UnknownStatus.into()),
        outcome => Ok(outcome),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Pending,
    Complete,
    Iterating,
    Exhausted,
}

/// Caller-owned state of an incremental scan
#[derive(Debug, Clone)]
pub struct ScanContext {
    bitmap: ScanBitmap,
    cursor: u8,
    rescan: bool,
    exhausted: bool,
}

impl Default for ScanContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanContext {
    /// Cursor value before the first address
    const START: u8 = MIN_ADDRESS - 1;

    pub const fn new() -> Self {
        Self {
            bitmap: ScanBitmap::new(),
            cursor: Self::START,
            rescan: true,
            exhausted: false,
        }
    }

    pub fn state(&self) -> ScanState {
        if self.exhausted {
            ScanState::Exhausted
        } else if self.rescan {
            ScanState::Pending
        } else if self.cursor == Self::START {
            ScanState::Complete
        } else {
            ScanState::Iterating
        }
    }

    pub fn cursor(&self) -> u8 {
        self.cursor
    }

    /// Run the full scan and store its result.
    pub fn scan(&mut self, probe: &mut dyn BusProbe) -> Result<ScanBitmap> {
        let bitmap = scan_all(probe)?;
        self.bitmap = bitmap;
        self.cursor = Self::START;
        self.rescan = false;
        self.exhausted = false;
        Ok(bitmap)
    }

    /// Advance to the next discovered address.
    ///
    /// Past the last address the cursor resets, the context asks for a new
    /// scan and [`BusError::NotFound`] is returned.
    pub fn next_address(&mut self) -> Result<u8> {
        if self.rescan {
            return Err(Error::InvalidInput);
        }
        match self.bitmap.next_after(self.cursor) {
            Some(address) => {
                self.cursor = address;
                Ok(address)
            }
            None => {
                self.cursor = Self::START;
                self.rescan = true;
                self.exhausted = true;
                Err(BusError::NotFound.into())
            }
        }
    }

    /// Force a fresh scan on the next step.
    pub fn reset(&mut self) {
        self.cursor = Self::START;
        self.rescan = true;
        self.exhausted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBus;

    fn bus() -> I2cProbe<MockBus> {
        I2cProbe::new(MockBus::with_devices(&[0x23, 0x5C]))
    }

    #[test]
    fn test_full_scan_finds_responders() {
        let mock = MockBus::with_devices(&[0x23, 0x5C]);
        let mut probe = I2cProbe::new(mock.clone());

        let bitmap = scan_all(&mut probe).unwrap();

        assert_eq!(bitmap.iter().collect::<Vec<_>>(), vec![0x23, 0x5C]);
        assert_eq!(bitmap.count(), 2);
        assert_eq!(mock.probed_addresses().len(), 127);
        assert!(!mock.probed_addresses().contains(&0));
    }

    #[test]
    fn test_iteration_is_ascending_then_not_found() {
        let mut probe = bus();
        let mut context = ScanContext::new();
        assert_eq!(context.state(), ScanState::Pending);

        context.scan(&mut probe).unwrap();
        assert_eq!(context.state(), ScanState::Complete);

        assert_eq!(context.next_address(), Ok(0x23));
        assert_eq!(context.state(), ScanState::Iterating);
        assert_eq!(context.next_address(), Ok(0x5C));
        assert_eq!(context.next_address(), Err(Error::Bus(BusError::NotFound)));
        assert_eq!(context.state(), ScanState::Exhausted);
        assert_eq!(context.cursor(), 0);
        assert_eq!(context.next_address(), Err(Error::InvalidInput));
    }

    #[test]
    fn test_probe_classifies_outcomes() {
        let mut probe = bus();
        assert_eq!(probe_address(&mut probe, 0x23), Ok(Transmission::Success));
        assert_eq!(probe_address(&mut probe, 0x24), Ok(Transmission::NackAddress));
        assert_eq!(
            probe_address(&mut probe, SCAN_ALL),
            Err(Error::Bus(BusError::InvalidAddress))
        );
        assert_eq!(
            probe_address(&mut probe, 0x80),
            Err(Error::Bus(BusError::InvalidAddress))
        );
    }

    #[test]
    fn test_bus_fault_is_unknown_status() {
        let mock = MockBus::with_devices(&[0x23]);
        mock.set_fault(0x40, ErrorKind::Bus);
        let mut probe = I2cProbe::new(mock);
        assert_eq!(
            probe_address(&mut probe, 0x40),
            Err(Error::Bus(BusError::UnknownStatus))
        );
    }

    #[test]
    fn test_status_codes() {
        for code in 0..=4 {
            assert_eq!(Transmission::from_code(code).map(Transmission::code), Ok(code));
        }
        assert_eq!(Transmission::from_code(5), Err(BusError::UnreadableStatus));
        assert_eq!(
            Transmission::from_error_kind(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data)),
            Transmission::NackData
        );
        assert_eq!(Transmission::from_error_kind(ErrorKind::Overrun), Transmission::TooLong);
    }

    /// Controller reporting a fixed raw status code for every address.
    struct RawStatus(u8);

    impl BusProbe for RawStatus {
        fn transmit(&mut self, _address: u8) -> u8 {
            self.0
        }
    }

    #[test]
    fn test_out_of_range_status_code_is_unreadable() {
        let mut controller = RawStatus(7);
        assert_eq!(
            probe_address(&mut controller, 0x23),
            Err(Error::Bus(BusError::UnreadableStatus))
        );

        // A scan logs the unreadable addresses and records none of them
        let bitmap = scan_all(&mut controller).unwrap();
        assert!(bitmap.is_empty());

        let mut controller = RawStatus(Transmission::NackData.code());
        assert_eq!(probe_address(&mut controller, 0x23), Ok(Transmission::NackData));
    }

    #[test]
    fn test_bitmap_bounds() {
        let mut bitmap = ScanBitmap::new();
        bitmap.set(127);
        bitmap.set(200);
        assert!(bitmap.contains(127));
        assert!(!bitmap.contains(200));
        assert_eq!(bitmap.next_after(127), None);
        assert_eq!(bitmap.next_after(0), Some(127));
    }
}
