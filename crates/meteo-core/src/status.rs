//! Component status and (re)initialization
//!
//! Each category keeps two bitmasks: components requested for use and
//! components confirmed working. Their XOR is the set that still needs
//! initialization, so calling [`initialize`] again only touches what is still
//! broken.

use log::{info, warn};

use crate::calibration::MAX_CALIBRATIONS;
use crate::error::{Component, Error, InitError, Result};
use crate::reading::OutputKind;
use crate::router::Router;
use crate::sensors::MAX_SENSORS;

pub const CLOCK_BIT: u32 = 0;
pub const BUS_BIT: u32 = 1;
const FIRST_CALIBRATION_BIT: u32 = 2;

/// Requested and working bits of one component category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMask {
    used: u64,
    working: u64,
    width: u32,
}

impl StatusMask {
    pub const fn new(width: u32) -> Self {
        Self {
            used: 0,
            working: 0,
            width,
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub fn mark_used(&mut self, bit: u32) {
        if bit < self.width {
            self.used |= 1 << bit;
        }
    }

    pub fn set_working(&mut self, bit: u32, working: bool) {
        if bit >= self.width {
            return;
        }
        if working {
            self.working |= 1 << bit;
        } else {
            self.working &= !(1 << bit);
        }
    }

    pub const fn used(&self) -> u64 {
        self.used
    }

    pub const fn working(&self) -> u64 {
        self.working
    }

    pub const fn is_used(&self, bit: u32) -> bool {
        bit < self.width && self.used & (1 << bit) != 0
    }

    pub const fn is_working(&self, bit: u32) -> bool {
        bit < self.width && self.working & (1 << bit) != 0
    }

    /// Components still waiting for a successful initialization
    pub const fn needs_init(&self) -> u64 {
        self.used ^ self.working
    }

    pub const fn is_resolved(&self) -> bool {
        self.needs_init() == 0
    }
}

/// Status of every component category, owned by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStatus {
    pub sensors: StatusMask,
    /// Clock, bus and calibrations
    pub inputs: StatusMask,
    pub outputs: StatusMask,
}

impl Default for ComponentStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentStatus {
    pub const fn new() -> Self {
        Self {
            sensors: StatusMask::new(MAX_SENSORS as u32),
            inputs: StatusMask::new(FIRST_CALIBRATION_BIT + MAX_CALIBRATIONS as u32),
            outputs: StatusMask::new(OutputKind::COUNT as u32),
        }
    }

    pub const fn is_resolved(&self) -> bool {
        self.sensors.is_resolved() && self.inputs.is_resolved() && self.outputs.is_resolved()
    }

    /// Number of components still needing initialization
    pub const fn pending(&self) -> u32 {
        self.sensors.needs_init().count_ones()
            + self.inputs.needs_init().count_ones()
            + self.outputs.needs_init().count_ones()
    }

    fn mask_mut(&mut self, category: Category) -> &mut StatusMask {
        match category {
            Category::Sensors => &mut self.sensors,
            Category::Inputs => &mut self.inputs,
            Category::Outputs => &mut self.outputs,
        }
    }
}

#[derive(Clone, Copy)]
enum Category {
    Sensors,
    Inputs,
    Outputs,
}

/// Components present in `router`, with their category bit.
fn components(router: &Router) -> heapless::Vec<(Category, u32, Component), { MAX_SENSORS + 16 }> {
    let mut list = heapless::Vec::new();

    // Outputs first, so later failures have somewhere to be reported
    for kind in OutputKind::ALL {
        if router.has_sink(kind) {
            let _ = list.push((Category::Outputs, kind.index() as u32, Component::Output(kind)));
        }
    }
    if router.has_clock() {
        let _ = list.push((Category::Inputs, CLOCK_BIT, Component::Clock));
    }
    if router.has_bus() {
        let _ = list.push((Category::Inputs, BUS_BIT, Component::Bus));
    }
    for (index, id) in router.calibrations().ids().enumerate() {
        let bit = FIRST_CALIBRATION_BIT + index as u32;
        let _ = list.push((Category::Inputs, bit, Component::Calibration(id)));
    }
    for (index, id) in router.sensors().ids().enumerate() {
        let _ = list.push((Category::Sensors, index as u32, Component::Sensor(id)));
    }
    list
}

/// Initialize the components of `router`.
///
/// On the first run every present component is marked used and attempted. On
/// later runs only components in `used ^ working` are attempted again. A
/// failure is reported through the router's escalation policy and does not
/// stop the remaining components.
pub fn initialize(router: &mut Router, status: &mut ComponentStatus, first_run: bool) -> Result<()> {
    for (category, bit, component) in components(router) {
        let mask = status.mask_mut(category);
        if first_run {
            mask.mark_used(bit);
        } else if mask.needs_init() & (1 << bit) == 0 {
            continue;
        }

        let result = router.init_component(component);
        status.mask_mut(category).set_working(bit, result.is_ok());

        match result {
            Ok(()) => info!("{} ready", component),
            Err(e) => {
                warn!("{} init failed: {}", component, e);
                router.report_error(InitError::Failed { component }.into());
            }
        }
    }

    let pending = status.pending();
    if pending == 0 {
        Ok(())
    } else {
        Err(Error::Init(InitError::Incomplete { pending }))
    }
}
