//! Test doubles shared by the unit tests.
//!
//! Every fake is `Clone` and clones share state, so a test can hand one copy to
//! the router and inspect the other.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use embassy_time::Instant;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::calibration::{MultiSample, SingleSample};
use crate::clock::{ClockProvider, DateTime};
use crate::error::{CalibrationError, ClockError, Error, Result, SensorError};
use crate::reading::{OutputKind, Reading};
use crate::sensors::{Indicatable, Readable};
use crate::sinks::{CharacterDisplay, ROWS, Sink};

#[derive(Default)]
struct BusState {
    devices: HashSet<u8>,
    faults: HashMap<u8, ErrorKind>,
    registers: HashMap<u8, [u8; 256]>,
    pointers: HashMap<u8, u8>,
    queued: HashMap<u8, VecDeque<Vec<u8>>>,
    writes: Vec<(u8, Vec<u8>)>,
    probes: Vec<u8>,
}

/// Scriptable I2C bus with a register file per device.
///
/// A write sets the register pointer with its first byte and stores the rest
/// from there on. Reads return queued responses first, then register contents.
#[derive(Clone, Default)]
pub struct MockBus {
    state: Rc<RefCell<BusState>>,
}

impl MockBus {
    pub fn with_devices(devices: &[u8]) -> Self {
        let bus = Self::default();
        bus.state.borrow_mut().devices.extend(devices.iter().copied());
        bus
    }

    pub fn set_fault(&self, address: u8, kind: ErrorKind) {
        self.state.borrow_mut().faults.insert(address, kind);
    }

    pub fn queue_read(&self, address: u8, bytes: &[u8]) {
        self.state
            .borrow_mut()
            .queued
            .entry(address)
            .or_default()
            .push_back(bytes.to_vec());
    }

    pub fn set_registers(&self, address: u8, start: u8, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let registers = state.registers.entry(address).or_insert([0; 256]);
        for (offset, byte) in bytes.iter().enumerate() {
            registers[start.wrapping_add(offset as u8) as usize] = *byte;
        }
    }

    pub fn registers(&self, address: u8, start: u8, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let registers = state.registers.get(&address).copied().unwrap_or([0; 256]);
        (0..len)
            .map(|offset| registers[start.wrapping_add(offset as u8) as usize])
            .collect()
    }

    /// Non-empty writes, in order
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.borrow().writes.clone()
    }

    /// Addresses hit by empty writes, in order
    pub fn probed_addresses(&self) -> Vec<u8> {
        self.state.borrow().probes.clone()
    }
}

impl ErrorType for MockBus {
    type Error = ErrorKind;
}

impl I2c for MockBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> core::result::Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        for operation in operations.iter() {
            if let Operation::Write(bytes) = operation
                && bytes.is_empty()
            {
                state.probes.push(address);
            }
        }
        if let Some(kind) = state.faults.get(&address) {
            return Err(*kind);
        }
        if !state.devices.contains(&address) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    let Some((&pointer, data)) = bytes.split_first() else {
                        continue;
                    };
                    state.writes.push((address, bytes.to_vec()));
                    let registers = state.registers.entry(address).or_insert([0; 256]);
                    for (offset, byte) in data.iter().enumerate() {
                        registers[pointer.wrapping_add(offset as u8) as usize] = *byte;
                    }
                    state.pointers.insert(address, pointer);
                }
                Operation::Read(buffer) => {
                    if let Some(response) = state.queued.get_mut(&address).and_then(VecDeque::pop_front) {
                        let len = buffer.len().min(response.len());
                        buffer[..len].copy_from_slice(&response[..len]);
                        continue;
                    }
                    let pointer = state.pointers.get(&address).copied().unwrap_or(0);
                    let registers = state.registers.get(&address).copied().unwrap_or([0; 256]);
                    for (offset, byte) in buffer.iter_mut().enumerate() {
                        *byte = registers[pointer.wrapping_add(offset as u8) as usize];
                    }
                }
            }
        }
        Ok(())
    }
}

/// Numeric sensor returning a fixed value or a fixed error.
#[derive(Clone)]
pub struct FixedValue {
    result: core::result::Result<f32, SensorError>,
    inits: Rc<Cell<u32>>,
}

impl FixedValue {
    pub fn new(value: f32) -> Self {
        Self {
            result: Ok(value),
            inits: Rc::default(),
        }
    }

    pub fn failing(error: SensorError) -> Self {
        Self {
            result: Err(error),
            inits: Rc::default(),
        }
    }

    pub fn init_count(&self) -> u32 {
        self.inits.get()
    }
}

impl Readable for FixedValue {
    fn init(&mut self) -> core::result::Result<(), SensorError> {
        self.inits.set(self.inits.get() + 1);
        self.result.map(|_| ())
    }

    fn read(&mut self) -> core::result::Result<f32, SensorError> {
        self.result
    }
}

#[derive(Clone)]
pub struct FixedIndication {
    value: bool,
}

impl FixedIndication {
    pub fn new(value: bool) -> Self {
        Self { value }
    }
}

impl Indicatable for FixedIndication {
    fn read(&mut self) -> core::result::Result<bool, SensorError> {
        Ok(self.value)
    }
}

/// Single-sample calibration with a fixed result.
pub struct FixedSample {
    value: f32,
}

impl FixedSample {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl SingleSample for FixedSample {
    fn sample(&mut self) -> core::result::Result<f32, CalibrationError> {
        Ok(self.value)
    }
}

/// Multi-sample calibration finishing after a fixed number of polls.
pub struct StagedSample {
    polls: u8,
    remaining: u8,
    value: f32,
    running: bool,
}

impl StagedSample {
    pub fn new(polls: u8, value: f32) -> Self {
        Self {
            polls,
            remaining: polls,
            value,
            running: false,
        }
    }
}

impl MultiSample for StagedSample {
    fn start(&mut self, _now: Instant) -> core::result::Result<(), CalibrationError> {
        self.remaining = self.polls;
        self.running = true;
        Ok(())
    }

    fn poll(&mut self, _now: Instant) -> core::result::Result<Option<f32>, CalibrationError> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return Ok(None);
        }
        self.running = false;
        Ok(Some(self.value))
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

struct ClockState {
    time: DateTime,
    lost_power: bool,
    init_failing: bool,
    inits: u32,
    sets: u32,
}

#[derive(Clone)]
pub struct FakeClock {
    state: Rc<RefCell<ClockState>>,
}

impl FakeClock {
    pub fn new(time: DateTime) -> Self {
        Self {
            state: Rc::new(RefCell::new(ClockState {
                time,
                lost_power: false,
                init_failing: false,
                inits: 0,
                sets: 0,
            })),
        }
    }

    pub fn with_lost_power(self) -> Self {
        self.state.borrow_mut().lost_power = true;
        self
    }

    pub fn with_failing_init(self) -> Self {
        self.set_init_failing(true);
        self
    }

    pub fn set_init_failing(&self, failing: bool) {
        self.state.borrow_mut().init_failing = failing;
    }

    pub fn init_count(&self) -> u32 {
        self.state.borrow().inits
    }

    pub fn set_count(&self) -> u32 {
        self.state.borrow().sets
    }
}

impl ClockProvider for FakeClock {
    fn init(&mut self) -> core::result::Result<(), ClockError> {
        let mut state = self.state.borrow_mut();
        state.inits += 1;
        if state.init_failing {
            Err(ClockError::NotFound)
        } else {
            Ok(())
        }
    }

    fn now(&mut self) -> core::result::Result<DateTime, ClockError> {
        Ok(self.state.borrow().time)
    }

    fn lost_power(&mut self) -> core::result::Result<bool, ClockError> {
        Ok(self.state.borrow().lost_power)
    }

    fn set(&mut self, time: &DateTime) -> core::result::Result<(), ClockError> {
        let mut state = self.state.borrow_mut();
        state.time = *time;
        state.lost_power = false;
        state.sets += 1;
        Ok(())
    }
}

#[derive(Default)]
struct SinkLog {
    readings: Vec<Reading>,
    reports: Vec<Error>,
    inits: u32,
}

/// Sink that records what it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Rc<RefCell<SinkLog>>,
    failing: bool,
    paged: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every reading and report
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn paged() -> Self {
        Self {
            paged: true,
            ..Self::default()
        }
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.log.borrow().readings.clone()
    }

    pub fn reports(&self) -> Vec<Error> {
        self.log.borrow().reports.clone()
    }

    pub fn init_count(&self) -> u32 {
        self.log.borrow().inits
    }
}

impl Sink for RecordingSink {
    fn init(&mut self) -> Result<()> {
        self.log.borrow_mut().inits += 1;
        Ok(())
    }

    fn render(&mut self, reading: &Reading) -> Result<()> {
        if self.failing {
            return Err(Error::OutputFailed(OutputKind::Display));
        }
        self.log.borrow_mut().readings.push(*reading);
        Ok(())
    }

    fn report(&mut self, error: &Error) -> Result<()> {
        if self.failing {
            return Err(Error::OutputFailed(OutputKind::Display));
        }
        self.log.borrow_mut().reports.push(*error);
        Ok(())
    }

    fn is_paged(&self) -> bool {
        self.paged
    }
}

/// Character display keeping its rows as strings.
#[derive(Default)]
pub struct TextDisplay {
    pub rows: [String; ROWS],
    pub writes: usize,
    pub failing: bool,
}

impl CharacterDisplay for TextDisplay {
    fn write_row(&mut self, row: usize, text: &str) -> Result<()> {
        if self.failing {
            return Err(Error::OutputFailed(OutputKind::Display));
        }
        self.rows[row] = text.to_string();
        self.writes += 1;
        Ok(())
    }
}
