//! Desktop simulator for the meteo-rs environmental monitoring station.
//!
//! Wires meteo-core to a simulated I2C bus (BH1750 light sensor, SHT40
//! hygrometer, BME280 barometer, DS3231 RTC and one bare responder),
//! waveform-driven analog sensors, a 16x2 pixel LCD drawn on the terminal and
//! a stdout console, then runs the cooperative scheduler for a bounded time.
//!
//! Every driver sits behind the same cargo feature as in meteo-core, so a
//! reduced feature set simply leaves its channel unbound.
//!
//! # Settings
//!
//! | Variable                   | Default | Meaning                        |
//! |----------------------------|---------|--------------------------------|
//! | `METEO_SIM_SECONDS`        | 30      | How long the simulation runs   |
//! | `METEO_SENSOR_INTERVAL_MS` | 2000    | Display time per sensor        |
//! | `RUST_LOG`                 | unset   | `env_logger` filter            |
//!
//! Build with `--features window` to also show the LCD in an SDL2 window.

use std::cell::RefCell;
use std::fmt;
use std::io::Write as _;
use std::rc::Rc;
use std::time::{Duration, Instant};

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::SimulatorDisplay;
#[cfg(feature = "sensor-rain")]
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use embedded_hal_bus::i2c::RefCellDevice;
use log::{error, info, warn};
use static_cell::StaticCell;

use meteo_core::bus::I2cProbe;
use meteo_core::calibration::CalibrationBank;
use meteo_core::clock::DateTime;
use meteo_core::config::{StationConfig, TaskKind};
use meteo_core::framebuffer::{LCD_HEIGHT_PX, LCD_WIDTH_PX, PixelLcd};
use meteo_core::sensors::SensorBank;
use meteo_core::sinks::{CharacterDisplay, ConsoleSink, DisplaySink};
use meteo_core::{ComponentStatus, OutputKind, Router, Scheduler, initialize};

#[cfg(feature = "sensor-gas")]
use meteo_core::catalog::{GAS, GAS_BASELINE};
#[cfg(feature = "sensor-uv")]
use meteo_core::catalog::{UV, UV_OFFSET};
#[cfg(any(feature = "sensor-gas", feature = "sensor-uv"))]
use meteo_core::error::SensorError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Scheduler tick period.
const TICK: Duration = Duration::from_millis(100);

/// Retry period for components that failed to initialize.
const REINIT_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_SIM_SECONDS: u64 = 30;
const DEFAULT_SENSOR_INTERVAL_MS: u32 = 2_000;

// Simulated bus population
const LIGHT_ADDRESS: u8 = 0x23;
const HYGROMETER_ADDRESS: u8 = 0x44;
const RTC_ADDRESS: u8 = 0x68;
const BAROMETER_ADDRESS: u8 = 0x76;

/// Devices that answer on the bus but have no driver.
const EXTRA_RESPONDERS: [u8; 1] = [0x5C];

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

struct Settings {
    seconds: u64,
    sensor_interval_ms: u32,
}

/// Runtime environment first, then the value baked in from `.env` at build time.
fn setting<T: std::str::FromStr>(key: &str, baked: Option<&str>, default: T) -> T {
    std::env::var(key)
        .ok()
        .as_deref()
        .or(baked)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    fn from_env() -> Self {
        Self {
            seconds: setting(
                "METEO_SIM_SECONDS",
                option_env!("METEO_SIM_SECONDS"),
                DEFAULT_SIM_SECONDS,
            ),
            sensor_interval_ms: setting(
                "METEO_SENSOR_INTERVAL_MS",
                option_env!("METEO_SENSOR_INTERVAL_MS"),
                DEFAULT_SENSOR_INTERVAL_MS,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated signals
// ---------------------------------------------------------------------------

/// Slow sine wave plus a faster ripple, in the unit of its catalog entry.
struct Waveform {
    started: Instant,
    base: f64,
    amplitude: f64,
    period_secs: f64,
}

impl Waveform {
    fn new(started: Instant, base: f64, amplitude: f64, period_secs: f64) -> Self {
        Self {
            started,
            base,
            amplitude,
            period_secs,
        }
    }

    fn at(&self, t: f64) -> f64 {
        self.base
            + self.amplitude * (t / self.period_secs * std::f64::consts::TAU).sin()
            + 0.1 * self.amplitude * (t / 37.0).cos()
    }

    fn value(&self) -> f64 {
        self.at(self.started.elapsed().as_secs_f64())
    }
}

/// Rain detector output that is active (low) one minute in three.
#[cfg(feature = "sensor-rain")]
struct RainPin {
    started: Instant,
}

#[cfg(feature = "sensor-rain")]
impl PinErrorType for RainPin {
    type Error = core::convert::Infallible;
}

#[cfg(feature = "sensor-rain")]
impl InputPin for RainPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.started.elapsed().as_secs() % 180 < 120)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

// ---------------------------------------------------------------------------
// Simulated I2C bus
// ---------------------------------------------------------------------------

const fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

const fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

/// Days since 1970-01-01 of a civil date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// DS3231 register file. Time registers follow the host clock once set.
struct RtcModel {
    registers: [u8; 0x13],
    pointer: u8,
    set: Option<(u64, Instant)>,
}

impl RtcModel {
    const STATUS: usize = 0x0F;
    const OSF: u8 = 1 << 7;

    /// Fresh battery: oscillator stopped, time registers meaningless.
    fn new() -> Self {
        let mut registers = [0u8; 0x13];
        registers[Self::STATUS] = Self::OSF;
        Self {
            registers,
            pointer: 0,
            set: None,
        }
    }

    fn refresh(&mut self) {
        let Some((unix, at)) = self.set else {
            return;
        };
        let now = DateTime::from_unix_seconds(unix + at.elapsed().as_secs());
        self.registers[0] = to_bcd(now.second);
        self.registers[1] = to_bcd(now.minute);
        self.registers[2] = to_bcd(now.hour);
        self.registers[4] = to_bcd(now.day);
        self.registers[5] = to_bcd(now.month);
        self.registers[6] = to_bcd((now.year % 100) as u8);
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&pointer, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = pointer;
        for (offset, byte) in data.iter().enumerate() {
            let index = pointer as usize + offset;
            if index < self.registers.len() {
                self.registers[index] = *byte;
            }
        }

        if pointer == 0 && data.len() >= 7 {
            let r = &self.registers;
            let days = days_from_civil(
                2000 + from_bcd(r[6]) as i64,
                from_bcd(r[5] & 0x1F) as i64,
                from_bcd(r[4]) as i64,
            );
            let secs = from_bcd(r[2]) as i64 * 3_600 + from_bcd(r[1]) as i64 * 60 + from_bcd(r[0]) as i64;
            self.set = Some(((days * 86_400 + secs).max(0) as u64, Instant::now()));
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        self.refresh();
        for (offset, byte) in buffer.iter_mut().enumerate() {
            let index = (self.pointer as usize + offset) % self.registers.len();
            *byte = self.registers[index];
        }
    }
}

/// Sensirion CRC-8 (polynomial 0x31, init 0xFF)
fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0xFFu8;
    for byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x31 } else { crc << 1 };
        }
    }
    crc
}

/// SHT40: any command latches a measurement, a read returns the 6 byte frame.
struct HygrometerModel {
    temperature: Waveform,
    humidity: Waveform,
}

impl HygrometerModel {
    fn frame(&self) -> [u8; 6] {
        let t = ((self.temperature.value() + 45.0) / 175.0 * 65535.0).clamp(0.0, 65535.0) as u16;
        let rh = ((self.humidity.value() + 6.0) / 125.0 * 65535.0).clamp(0.0, 65535.0) as u16;
        let [t_hi, t_lo] = t.to_be_bytes();
        let [rh_hi, rh_lo] = rh.to_be_bytes();
        [
            t_hi,
            t_lo,
            crc8(&[t_hi, t_lo]),
            rh_hi,
            rh_lo,
            crc8(&[rh_hi, rh_lo]),
        ]
    }
}

/// BME280 register file carrying the Bosch datasheet calibration example.
struct BarometerModel {
    pressure: Waveform,
    registers: [u8; 0x100],
    pointer: u8,
}

impl BarometerModel {
    const CHIP_ID: u8 = 0x60;
    const CALIBRATION: [u8; 24] = [
        0x70, 0x6B, 0x43, 0x67, 0x18, 0xFC, 0x7D, 0x8E, 0x43, 0xD6, 0xD0, 0x0B, 0x27, 0x0B, 0x8C,
        0x00, 0xF9, 0xFF, 0x8C, 0x3C, 0xF8, 0xC6, 0x70, 0x17,
    ];
    /// Raw values of the datasheet example (25.08 C, 1006.53 hPa)
    const RAW_TEMPERATURE: u32 = 519_888;
    const RAW_PRESSURE: f64 = 415_148.0;
    const REFERENCE_HPA: f64 = 1006.53;
    /// Raw counts per hPa around the reference point
    const COUNTS_PER_HPA: f64 = -579.4;

    fn new(pressure: Waveform) -> Self {
        let mut registers = [0u8; 0x100];
        registers[0xD0] = Self::CHIP_ID;
        registers[0x88..0x88 + Self::CALIBRATION.len()].copy_from_slice(&Self::CALIBRATION);
        Self {
            pressure,
            registers,
            pointer: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&pointer, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = pointer;
        for (offset, byte) in data.iter().enumerate() {
            self.registers[pointer.wrapping_add(offset as u8) as usize] = *byte;
        }
    }

    fn read(&mut self, buffer: &mut [u8]) {
        let delta = (self.pressure.value() - Self::REFERENCE_HPA) * Self::COUNTS_PER_HPA;
        let raw_pressure = (Self::RAW_PRESSURE + delta).clamp(0.0, 1_048_575.0) as u32;
        let raw_temperature = Self::RAW_TEMPERATURE;
        self.registers[0xF7..0xFF].copy_from_slice(&[
            (raw_pressure >> 12) as u8,
            (raw_pressure >> 4) as u8,
            ((raw_pressure & 0x0F) << 4) as u8,
            (raw_temperature >> 12) as u8,
            (raw_temperature >> 4) as u8,
            ((raw_temperature & 0x0F) << 4) as u8,
            0x80,
            0x00,
        ]);
        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = self.registers[self.pointer.wrapping_add(offset as u8) as usize];
        }
    }
}

/// Bus with a BH1750, an SHT40, a BME280, a DS3231 and a bare responder.
struct SimBus {
    light: Waveform,
    hygrometer: HygrometerModel,
    barometer: BarometerModel,
    rtc: RtcModel,
}

impl SimBus {
    fn new(started: Instant) -> Self {
        Self {
            light: Waveform::new(started, 800.0, 600.0, 90.0),
            hygrometer: HygrometerModel {
                temperature: Waveform::new(started, 23.0, 3.0, 120.0),
                humidity: Waveform::new(started, 50.0, 10.0, 180.0),
            },
            barometer: BarometerModel::new(Waveform::new(started, 1008.0, 4.0, 600.0)),
            rtc: RtcModel::new(),
        }
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations.iter_mut() {
            match (address, operation) {
                (LIGHT_ADDRESS, Operation::Write(_)) => {}
                (LIGHT_ADDRESS, Operation::Read(buffer)) => {
                    let counts = (self.light.value().max(0.0) * 1.2) as u16;
                    for (dst, src) in buffer.iter_mut().zip(counts.to_be_bytes()) {
                        *dst = src;
                    }
                }
                (HYGROMETER_ADDRESS, Operation::Write(_)) => {}
                (HYGROMETER_ADDRESS, Operation::Read(buffer)) => {
                    for (dst, src) in buffer.iter_mut().zip(self.hygrometer.frame()) {
                        *dst = src;
                    }
                }
                (BAROMETER_ADDRESS, Operation::Write(bytes)) => self.barometer.write(bytes),
                (BAROMETER_ADDRESS, Operation::Read(buffer)) => self.barometer.read(buffer),
                (RTC_ADDRESS, Operation::Write(bytes)) => self.rtc.write(bytes),
                (RTC_ADDRESS, Operation::Read(buffer)) => self.rtc.read(buffer),
                (a, Operation::Write(_)) if EXTRA_RESPONDERS.contains(&a) => {}
                (a, Operation::Read(buffer)) if EXTRA_RESPONDERS.contains(&a) => buffer.fill(0),
                _ => return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Console text goes straight to stdout.
struct Stdout;

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| fmt::Error)
    }
}

/// LCD shared between the display sink and the render loop.
#[derive(Clone, Default)]
struct SharedLcd(Rc<RefCell<PixelLcd>>);

impl CharacterDisplay for SharedLcd {
    fn init(&mut self) -> meteo_core::Result<()> {
        self.0.borrow_mut().init()
    }

    fn write_row(&mut self, row: usize, text: &str) -> meteo_core::Result<()> {
        self.0.borrow_mut().write_row(row, text)
    }
}

fn print_panel(lcd: &PixelLcd) {
    let border = format!("+{}+", "-".repeat(LCD_WIDTH_PX));
    let mut out = String::new();
    out.push_str(&border);
    out.push('\n');
    for line in lcd.frame().to_ascii().lines() {
        out.push('|');
        out.push_str(line);
        out.push_str("|\n");
    }
    out.push_str(&border);
    out.push('\n');
    print!("{}", out);
}

// ---------------------------------------------------------------------------
// Station assembly
// ---------------------------------------------------------------------------

static I2C_BUS: StaticCell<RefCell<SimBus>> = StaticCell::new();

fn build_router(started: Instant, lcd: SharedLcd) -> meteo_core::Result<Router> {
    let bus: &'static RefCell<SimBus> = I2C_BUS.init(RefCell::new(SimBus::new(started)));

    let mut sensors = SensorBank::new();
    let mut calibrations = CalibrationBank::new();

    #[cfg(feature = "sensor-sht40")]
    {
        use meteo_core::catalog::{HUMIDITY, TEMPERATURE};
        use meteo_core::sensors::Sht40;

        let (temperature, humidity) = Sht40::new(RefCellDevice::new(bus)).split();
        sensors.bind_value(TEMPERATURE, temperature)?;
        sensors.bind_value(HUMIDITY, humidity)?;
    }

    #[cfg(feature = "sensor-bme280")]
    {
        use meteo_core::catalog::PRESSURE;
        use meteo_core::sensors::Bme280Pressure;

        sensors.bind_value(PRESSURE, Bme280Pressure::new(RefCellDevice::new(bus)))?;
    }

    #[cfg(feature = "sensor-bh1750")]
    {
        use meteo_core::catalog::LUMINANCE;
        use meteo_core::sensors::{Bh1750, Bh1750Address};

        sensors.bind_value(LUMINANCE, Bh1750::new(RefCellDevice::new(bus), Bh1750Address::Low))?;
    }

    #[cfg(feature = "sensor-gas")]
    {
        use meteo_core::sensors::GasSensor;

        let signal = Waveform::new(started, 1_400.0, 150.0, 240.0);
        let gas = GasSensor::new(move || -> Result<u16, SensorError> { Ok(signal.value() as u16) });
        let (readout, calibration) = gas.split();
        sensors.bind_value(GAS, readout)?;
        calibrations.bind_multiple(GAS_BASELINE, calibration)?;
    }

    #[cfg(feature = "sensor-uv")]
    {
        use meteo_core::sensors::UvSensor;

        // Near the dark level at start-up, daylight on the rising half-wave
        let signal = Waveform::new(started, 1_010.0, 300.0, 120.0);
        let uv = UvSensor::new(move || -> Result<u16, SensorError> { Ok(signal.value() as u16) });
        let (readout, calibration) = uv.split();
        sensors.bind_value(UV, readout)?;
        calibrations.bind_single(UV_OFFSET, calibration)?;
    }

    #[cfg(feature = "sensor-rain")]
    {
        use meteo_core::catalog::RAIN;
        use meteo_core::sensors::RainSensor;

        sensors.bind_indication(RAIN, RainSensor::new(RainPin { started }))?;
    }

    let build_unix = env!("METEO_BUILD_UNIX").parse().unwrap_or_default();

    let router = Router::new()
        .with_sensors(sensors)
        .with_calibrations(calibrations)
        .with_bus(I2cProbe::new(RefCellDevice::new(bus)))
        .with_sink(OutputKind::Display, DisplaySink::new(lcd))
        .with_sink(OutputKind::Console, ConsoleSink::new(Stdout))
        .with_build_time(DateTime::from_unix_seconds(build_unix));

    #[cfg(feature = "rtc-ds3231")]
    let router = router.with_clock(meteo_core::clock::Ds3231::new(RefCellDevice::new(bus)));

    Ok(router)
}

fn station_config(settings: &Settings) -> StationConfig {
    let mut config = StationConfig::default();
    for task in config.tasks.iter_mut() {
        if task.kind == TaskKind::Sensors {
            task.interval_ms = settings.sensor_interval_ms;
        }
    }

    #[cfg(feature = "sensor-gas")]
    {
        use meteo_core::config::{TaskConfig, TaskMode};

        let calibration = TaskConfig::new(
            TaskKind::Calibration(GAS_BASELINE),
            TaskMode::Cyclic,
            500,
            &[OutputKind::Console],
        );
        if config.tasks.push(calibration).is_err() {
            warn!("Task table full, gas baseline calibration not scheduled");
        }
    }
    config
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    let settings = Settings::from_env();
    info!("Starting meteo-rs simulator for {} s", settings.seconds);
    info!("LCD: {}x{} px", LCD_WIDTH_PX, LCD_HEIGHT_PX);

    let started = Instant::now();
    let lcd = SharedLcd::default();

    let mut router = match build_router(started, lcd.clone()) {
        Ok(router) => router,
        Err(e) => {
            error!("Station setup failed: {}", e);
            return;
        }
    };

    let mut status = ComponentStatus::new();
    if let Err(e) = initialize(&mut router, &mut status, true) {
        warn!("Started degraded: {}", e);
    }

    // The UV sensor is dark at start-up, which is when its offset is taken
    #[cfg(feature = "sensor-uv")]
    router.transfer(
        meteo_core::Input::Calibration(UV_OFFSET),
        &[OutputKind::Console],
        embassy_time::Instant::now(),
    );

    let config = station_config(&settings);
    let mut scheduler = match Scheduler::from_config(&config) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("Invalid station config: {}", e);
            return;
        }
    };

    let mut panel = SimulatorDisplay::<BinaryColor>::new(Size::new(
        LCD_WIDTH_PX as u32,
        LCD_HEIGHT_PX as u32,
    ));

    #[cfg(feature = "window")]
    let mut window = {
        use embedded_graphics_simulator::{BinaryColorTheme, OutputSettingsBuilder, Window};
        let settings = OutputSettingsBuilder::new()
            .theme(BinaryColorTheme::LcdBlue)
            .scale(4)
            .build();
        let mut window = Window::new("Meteo Simulator", &settings);
        // The SDL window must be updated once before events() is called
        window.update(&panel);
        window
    };

    let deadline = started + Duration::from_secs(settings.seconds);
    let mut last_reinit = Instant::now();

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    while Instant::now() < deadline {
        let tick_start = Instant::now();

        scheduler.tick(&mut router, embassy_time::Instant::now());

        if !status.is_resolved() && last_reinit.elapsed() >= REINIT_INTERVAL {
            match initialize(&mut router, &mut status, false) {
                Ok(()) => info!("All components recovered"),
                Err(e) => warn!("Reinit: {}", e),
            }
            last_reinit = Instant::now();
        }

        // --- Render -------------------------------------------------------
        let flushed = lcd.0.borrow_mut().frame_mut().flush(&mut panel);
        if let Ok(Some(_)) = flushed {
            print_panel(&lcd.0.borrow());
        }

        #[cfg(feature = "window")]
        {
            use embedded_graphics_simulator::SimulatorEvent;
            window.update(&panel);
            if window
                .events()
                .any(|event| matches!(event, SimulatorEvent::Quit))
            {
                break;
            }
        }

        // --- Tick pacing --------------------------------------------------
        let elapsed = tick_start.elapsed();
        if elapsed < TICK {
            std::thread::sleep(TICK - elapsed);
        }
    }

    info!("Simulator exiting");
}
