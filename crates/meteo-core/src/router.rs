//! Routing core
//!
//! The [`Router`] owns every provider and every sink. [`Router::fetch`] turns
//! an [`Input`] into a [`Reading`], [`Router::route`] hands a reading to one
//! sink, and [`Router::fan_out`] hands it to several, attempting each one even
//! when an earlier one failed. Failed readings are routed like any other so
//! the sinks can show them.

extern crate alloc;
use alloc::boxed::Box;

use embassy_time::Instant;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::bus::{BusProbe, BusReport, SCAN_ALL, ScanContext, probe_address, scan_all};
use crate::calibration::CalibrationBank;
use crate::catalog::{calibration_meta, sensor_meta};
use crate::clock::{ClockProvider, DateTime, read_clock, restore_if_power_lost};
use crate::error::{Component, Error, Result};
use crate::reading::{Input, OutputKind, Reading};
use crate::sensors::SensorBank;
use crate::sinks::Sink;

/// Upper bound on the outputs of one fan-out
pub const MAX_FAN_OUT: usize = 8;

/// Per-output outcome of a fan-out, in the order the outputs were given
pub type FanOut = heapless::Vec<(OutputKind, Result<()>), MAX_FAN_OUT>;

/// When error reporting stops walking the escalation list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopRule {
    /// Stop at the first sink that accepts the report
    FirstSuccess,
    /// Report to every listed sink
    All,
}

/// Ordered list of sinks that receive error reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub order: heapless::Vec<OutputKind, { OutputKind::COUNT }>,
    pub stop: StopRule,
}

impl Default for EscalationPolicy {
    /// Console first, the display only if the console failed.
    fn default() -> Self {
        Self {
            order: heapless::Vec::from_slice(&[OutputKind::Console, OutputKind::Display])
                .unwrap_or_default(),
            stop: StopRule::FirstSuccess,
        }
    }
}

pub struct Router {
    sensors: SensorBank,
    calibrations: CalibrationBank,
    clock: Option<Box<dyn ClockProvider>>,
    bus: Option<Box<dyn BusProbe>>,
    sinks: [Option<Box<dyn Sink>>; OutputKind::COUNT],
    escalation: EscalationPolicy,
    build_time: Option<DateTime>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            sensors: SensorBank::new(),
            calibrations: CalibrationBank::new(),
            clock: None,
            bus: None,
            sinks: [None, None],
            escalation: EscalationPolicy::default(),
            build_time: None,
        }
    }

    pub fn with_sensors(mut self, sensors: SensorBank) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn with_calibrations(mut self, calibrations: CalibrationBank) -> Self {
        self.calibrations = calibrations;
        self
    }

    pub fn with_clock(mut self, clock: impl ClockProvider + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    pub fn with_bus(mut self, bus: impl BusProbe + 'static) -> Self {
        self.bus = Some(Box::new(bus));
        self
    }

    pub fn with_sink(mut self, kind: OutputKind, sink: impl Sink + 'static) -> Self {
        self.sinks[kind.index()] = Some(Box::new(sink));
        self
    }

    pub fn with_escalation(mut self, escalation: EscalationPolicy) -> Self {
        self.escalation = escalation;
        self
    }

    /// Time written to the RTC when it comes up after losing power
    pub fn with_build_time(mut self, build_time: DateTime) -> Self {
        self.build_time = Some(build_time);
        self
    }

    pub fn sensors(&self) -> &SensorBank {
        &self.sensors
    }

    pub fn calibrations(&self) -> &CalibrationBank {
        &self.calibrations
    }

    pub fn has_clock(&self) -> bool {
        self.clock.is_some()
    }

    pub fn has_bus(&self) -> bool {
        self.bus.is_some()
    }

    pub fn has_sink(&self, kind: OutputKind) -> bool {
        self.sinks[kind.index()].is_some()
    }

    /// Whether `output` shows a single reading at a time.
    pub fn is_paged(&self, output: OutputKind) -> bool {
        self.sinks[output.index()]
            .as_ref()
            .is_some_and(|sink| sink.is_paged())
    }

    /// Fetch one data item from its provider.
    pub fn fetch(&mut self, input: Input, now: Instant) -> Reading {
        let reading = match input {
            Input::Sensor(id) => Reading::Sensor {
                id,
                meta: self.sensors.metadata(id).or_else(|| sensor_meta(id)),
                result: self.sensors.read(id),
            },
            Input::Clock => match self.clock.as_deref_mut() {
                Some(clock) => Reading::Clock {
                    result: read_clock(clock).map_err(Error::from),
                },
                None => Reading::failed(input, Error::InvalidInput),
            },
            Input::Bus(address) => match self.bus.as_deref_mut() {
                Some(bus) if address == SCAN_ALL => Reading::Bus {
                    address,
                    result: scan_all(bus).map(BusReport::Scan),
                },
                Some(bus) => Reading::Bus {
                    address,
                    result: probe_address(bus, address)
                        .map(|outcome| BusReport::Probe { outcome }),
                },
                None => Reading::failed(input, Error::InvalidInput),
            },
            Input::Calibration(id) => {
                let step = self.calibrations.calibrate(id, now);
                Reading::Calibration {
                    id,
                    meta: calibration_meta(id),
                    state: step.state,
                    result: step.result,
                }
            }
        };

        if let Some(e) = reading.error() {
            debug!("Fetch {:?}: {}", input, e);
        }
        reading
    }

    /// Run a full bus scan and store the result in `context`.
    pub fn scan(&mut self, context: &mut ScanContext) -> Reading {
        let result = match self.bus.as_deref_mut() {
            Some(bus) => context.scan(bus).map(BusReport::Scan),
            None => Err(Error::InvalidInput),
        };
        Reading::Bus {
            address: SCAN_ALL,
            result,
        }
    }

    /// Hand `reading` to one sink.
    pub fn route(&mut self, output: OutputKind, reading: &Reading) -> Result<()> {
        let Some(sink) = self.sinks[output.index()].as_deref_mut() else {
            return Err(Error::InvalidOutput);
        };
        sink.render(reading).inspect_err(|e| error!("Routing to {} failed: {}", output, e))
    }

    /// Hand `reading` to every output in turn. A failing output does not stop
    /// the others.
    pub fn fan_out(&mut self, outputs: &[OutputKind], reading: &Reading) -> FanOut {
        let mut results = FanOut::new();
        for &output in outputs {
            let result = self.route(output, reading);
            if results.push((output, result)).is_err() {
                warn!("Fan-out truncated at {} outputs", MAX_FAN_OUT);
                break;
            }
        }
        results
    }

    /// Fetch `input` and fan the reading out to `outputs`.
    pub fn transfer(&mut self, input: Input, outputs: &[OutputKind], now: Instant) -> FanOut {
        let reading = self.fetch(input, now);
        self.fan_out(outputs, &reading)
    }

    /// Report an error through the escalation policy.
    ///
    /// Never fails; returns whether any sink accepted the report.
    pub fn report_error(&mut self, error: Error) -> bool {
        let mut delivered = false;
        for &output in self.escalation.order.iter() {
            let Some(sink) = self.sinks[output.index()].as_deref_mut() else {
                continue;
            };
            match sink.report(&error) {
                Ok(()) => {
                    delivered = true;
                    if self.escalation.stop == StopRule::FirstSuccess {
                        break;
                    }
                }
                Err(e) => warn!("Could not report '{}' to {}: {}", error, output, e),
            }
        }
        delivered
    }

    /// Initialize one component.
    pub fn init_component(&mut self, component: Component) -> Result<()> {
        match component {
            Component::Sensor(id) => self.sensors.init(id),
            Component::Clock => {
                let clock = self.clock.as_deref_mut().ok_or(Error::InvalidInput)?;
                clock.init()?;
                if let Some(build_time) = self.build_time {
                    restore_if_power_lost(clock, &build_time)?;
                }
                Ok(())
            }
            Component::Bus => {
                let bus = self.bus.as_deref_mut().ok_or(Error::InvalidInput)?;
                bus.init()?;
                Ok(())
            }
            Component::Calibration(id) => self.calibrations.init(id),
            Component::Output(kind) => self.sinks[kind.index()]
                .as_deref_mut()
                .ok_or(Error::InvalidOutput)?
                .init(),
        }
    }
}
