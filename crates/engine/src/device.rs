//! Connected device record
//!
//! A [`Device`] ties together everything the registry tracks for one
//! connected controller: its identity, its driver, its USB port, the
//! host callbacks, the monotonic `banished` flag and the screen redraw
//! timestamp.

use crate::driver::ControllerDriver;
use crate::usb::UsbPort;
use protocol::{DeviceId, DeviceInfo, Event, EventKind, ScreenInfo};
use std::time::Instant;
use tracing::{info, warn};

/// Event callback: one ordered batch per poll that produced events
pub type EventFn = Box<dyn FnMut(&mut DeviceCtx<'_>, &[Event])>;

/// Feedback callback: invoked once per idle iteration per live device;
/// the host's one authorized place to push light state
pub type FeedbackFn = Box<dyn FnMut(&mut DeviceCtx<'_>)>;

/// Removal callback: `unexpected` is true when the device was banished
/// (fault or surprise departure) rather than disconnected by the host
pub type RemoveFn = Box<dyn FnMut(&DeviceInfo, bool)>;

/// Screen redraw callback: draw into the pixel buffer, return true if it
/// changed and should be flushed to the device
pub type ScreenFn = Box<dyn FnMut(u32, &ScreenInfo, &mut [u8]) -> bool>;

/// Host-supplied callbacks for one device
#[derive(Default)]
pub struct Callbacks {
    pub event: Option<EventFn>,
    pub feedback: Option<FeedbackFn>,
    pub remove: Option<RemoveFn>,
    pub screen: Option<ScreenFn>,
}

/// One connected controller
pub struct Device {
    pub(crate) id: DeviceId,
    pub(crate) info: DeviceInfo,
    pub(crate) driver: Box<dyn ControllerDriver>,
    pub(crate) port: UsbPort,
    pub(crate) callbacks: Callbacks,
    /// Monotonic: set once on fault or surprise departure, never cleared
    pub(crate) banished: bool,
    pub(crate) last_redraw: Option<Instant>,
}

impl Device {
    pub(crate) fn new(id: DeviceId, driver: Box<dyn ControllerDriver>, port: UsbPort) -> Self {
        let info = driver.info().clone();
        Self {
            id,
            info,
            driver,
            port,
            callbacks: Callbacks::default(),
            banished: false,
            last_redraw: None,
        }
    }

    /// Fault-isolate this device
    ///
    /// From this moment polling, feedback and screen dispatch skip the
    /// device; teardown happens in the scheduler's sweep.
    pub(crate) fn banish(&mut self) {
        if !self.banished {
            info!(
                "banishing device {:04x}:{:04x}",
                self.info.vendor_id, self.info.product_id
            );
            self.banished = true;
        }
    }
}

/// Live-device handle passed to host callbacks
///
/// Borrows the device's driver and port, so a callback can push light
/// state or query control names without reaching back into the registry.
pub struct DeviceCtx<'a> {
    pub(crate) id: DeviceId,
    pub(crate) info: &'a DeviceInfo,
    pub(crate) driver: &'a mut dyn ControllerDriver,
    pub(crate) port: &'a mut UsbPort,
}

impl DeviceCtx<'_> {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn info(&self) -> &DeviceInfo {
        self.info
    }

    /// Stage a light state change
    ///
    /// Out-of-range ids are a programming error: reported and ignored,
    /// never fatal.
    pub fn light_set(&mut self, light: u32, color: u32) {
        if light >= self.info.control_counts.lights {
            warn!(
                "light id {light} out of range (device has {})",
                self.info.control_counts.lights
            );
            return;
        }
        self.driver.light_set(light, color);
    }

    /// Stage a grid pad light state change
    pub fn grid_light_set(&mut self, grid: u32, pos: u32, color: u32) {
        let counts = &self.info.control_counts;
        if grid >= counts.grids || pos >= counts.grid_size {
            warn!(
                "grid light {grid}/{pos} out of range (device has {}x{})",
                counts.grids, counts.grid_size
            );
            return;
        }
        self.driver.grid_light_set(grid, pos, color);
    }

    /// Write staged light state to the device
    pub fn lights_flush(&mut self, force: bool) {
        self.driver.lights_flush(self.port, force);
    }

    /// Name of one control, if the driver names it
    pub fn control_name(&self, kind: EventKind, id: u32) -> Option<&'static str> {
        if id >= self.info.control_count(kind) {
            warn!(
                "control {kind:?} {id} out of range (device has {})",
                self.info.control_count(kind)
            );
            return None;
        }
        self.driver.control_name(kind, id)
    }
}
