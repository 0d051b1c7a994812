//! Device registry and idle/poll scheduler
//!
//! A [`Hub`] owns every connected device and drives all of them from one
//! re-entrant, non-blocking entry point: [`Hub::idle_iter`], which the
//! host must call frequently (tens to hundreds of times per second).
//! There are no threads and no locks; every list, node and counter is
//! mutated synchronously on this call stack.
//!
//! Faults never unwind out of the loop. A failing transfer banishes its
//! device: the flag is monotonic, the device is skipped by every
//! subsequent dispatch step, and teardown happens in the end-of-iteration
//! sweep, surfaced to the host through the removal callback with
//! `unexpected = true`.

use crate::config::{self, EngineConfig};
use crate::device::{Device, DeviceCtx};
use crate::driver::{ControllerDriver, DriverEntry, builtin_drivers};
use crate::hotplug::{self, HotplugEvent, HotplugMonitor};
use crate::usb::{Counters, Loopback, RusbTransport, UsbPort};
use crate::virt;
use common::{Clock, SystemClock};
use protocol::{ConnectError, DeviceId, DeviceInfo, Event, EventKind, ScreenInfo};
use rusb::{Context, UsbContext};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type AcceptFn = Box<dyn FnMut(&DeviceInfo) -> bool>;

/// Process-wide registry and scheduler for control surfaces
pub struct Hub {
    config: EngineConfig,
    clock: Box<dyn Clock>,
    drivers: Vec<DriverEntry>,
    /// Connected devices, insertion order = polling order
    devices: Vec<Device>,
    /// Accept callback captured at probe time, reused for hot-plug arrivals
    accept: Option<AcceptFn>,
    context: Option<Context>,
    hotplug: Option<HotplugMonitor>,
    next_id: u32,
}

impl Hub {
    /// Create a registry with the builtin driver table
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    /// Create a registry throttling screens against the given clock
    pub fn with_clock(config: EngineConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            drivers: builtin_drivers(),
            devices: Vec::new(),
            accept: None,
            context: None,
            hotplug: None,
            next_id: 1,
        }
    }

    /// Add a driver to the lookup table
    pub fn register_driver(&mut self, entry: DriverEntry) {
        self.drivers.push(entry);
    }

    /// Connect every present device a registered driver claims
    ///
    /// `accept` sees each candidate's info and may decline it; declined
    /// devices are closed immediately. The callback is kept and reused
    /// for later hot-plug arrivals. Returns the number of devices
    /// connected by this call.
    pub fn probe(&mut self, accept: impl FnMut(&DeviceInfo) -> bool + 'static) -> usize {
        self.accept = Some(Box::new(accept));
        let mut count = 0;

        if let Some((vendor_id, product_id)) = config::virt_device_from_env() {
            match self.connect_virtual(vendor_id, product_id) {
                Ok(_) => count += 1,
                Err(e) => warn!("virtual device connect failed: {e}"),
            }
        }

        let present: Vec<(u16, u16)> = match self.ensure_context() {
            Some(ctx) => match ctx.devices() {
                Ok(list) => list
                    .iter()
                    .filter_map(|d| d.device_descriptor().ok())
                    .map(|desc| (desc.vendor_id(), desc.product_id()))
                    .collect(),
                Err(e) => {
                    warn!("device enumeration failed: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        for (vendor_id, product_id) in present {
            if self.try_connect(vendor_id, product_id) {
                count += 1;
            }
        }
        count
    }

    /// Connect a virtualized surface advertising the given identity
    ///
    /// The returned [`Loopback`] handle scripts the device: inject input
    /// reports, inspect completed writes, force fault statuses.
    pub fn connect_virtual(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<(DeviceId, Loopback), ConnectError> {
        let loopback = Loopback::new();
        let mut port = UsbPort::new(loopback.transport());
        let driver = match virt::connect(&mut port, vendor_id, product_id) {
            Ok(driver) => driver,
            Err(e) => {
                port.close(Duration::ZERO);
                return Err(e);
            }
        };

        if let Some(accept) = self.accept.as_mut()
            && !accept(driver.info())
        {
            port.close(Duration::ZERO);
            return Err(ConnectError::Declined);
        }

        let id = self.register(driver, port);
        Ok((id, loopback))
    }

    /// Register an already-connected device
    ///
    /// The normal path for external driver crates goes through the
    /// driver table and [`Hub::probe`]; this entry point exists for
    /// drivers connected by hand (tests, virtualized instances).
    pub fn register_device(&mut self, driver: Box<dyn ControllerDriver>, port: UsbPort) -> DeviceId {
        self.register(driver, port)
    }

    /// One cooperative scheduler iteration; never blocks
    ///
    /// 1. Service transport completions and hot-plug events (zero
    ///    timeout); deliver decoded event batches.
    /// 2. Poll every live device, in insertion order.
    /// 3. Invoke every live device's feedback callback.
    /// 4. Screen pass, FPS-throttled per device.
    /// 5. Sweep the banished queue.
    ///
    /// The sweep runs last so a device banished mid-iteration stays
    /// visible (and skippable) to the earlier steps before teardown.
    pub fn idle_iter(&mut self) {
        if let Some(ctx) = &self.context
            && let Err(e) = ctx.handle_events(Some(Duration::ZERO))
        {
            warn!("usb event pump failed: {e}");
        }
        self.drain_hotplug();
        for dev in &mut self.devices {
            Self::service_device(dev);
        }

        for dev in &mut self.devices {
            if !dev.banished {
                let Device { driver, port, .. } = dev;
                driver.poll(port);
            }
        }

        for dev in &mut self.devices {
            Self::fire_feedback(dev);
        }

        let now = self.clock.now();
        let interval = self.config.frame_interval();
        for dev in &mut self.devices {
            Self::screen_pass(dev, now, interval);
        }

        self.sweep_banished();
    }

    /// Service and poll one device outside the idle loop
    pub fn poll_device(&mut self, id: DeviceId) -> bool {
        let Some(dev) = self.device_mut(id) else {
            return false;
        };
        if dev.banished {
            return false;
        }
        Self::service_device(dev);
        if !dev.banished {
            let Device { driver, port, .. } = dev;
            driver.poll(port);
        }
        true
    }

    /// Disconnect a device at the host's request
    ///
    /// The removal callback runs first with `unexpected = false`, then
    /// the driver drives feedback to neutral (skipped if the device was
    /// already banished) and the port closes.
    pub fn disconnect(&mut self, id: DeviceId) -> bool {
        let Some(pos) = self.devices.iter().position(|d| d.id == id) else {
            return false;
        };
        let mut dev = self.devices.remove(pos);
        let drain = if dev.banished {
            Duration::ZERO
        } else {
            self.config.drain_bound()
        };
        Self::teardown(&mut dev, false, drain);
        true
    }

    /// Tear down every device and the USB context
    ///
    /// Pending completions and hot-plug events are processed first, so
    /// nothing is lost; then each device runs the explicit disconnect
    /// path (banished ones are surfaced as unexpected).
    pub fn shutdown(&mut self) {
        if let Some(ctx) = &self.context {
            let _ = ctx.handle_events(Some(Duration::ZERO));
        }
        self.drain_hotplug();
        for dev in &mut self.devices {
            Self::service_device(dev);
        }

        let drain = self.config.drain_bound();
        for mut dev in std::mem::take(&mut self.devices) {
            let unexpected = dev.banished;
            let drain = if unexpected { Duration::ZERO } else { drain };
            Self::teardown(&mut dev, unexpected, drain);
        }

        self.hotplug = None;
        self.context = None;
    }

    /// Install the event callback for one device
    pub fn set_event_handler(
        &mut self,
        id: DeviceId,
        f: impl FnMut(&mut DeviceCtx<'_>, &[Event]) + 'static,
    ) -> bool {
        self.device_mut(id)
            .map(|dev| dev.callbacks.event = Some(Box::new(f)))
            .is_some()
    }

    /// Install the per-iteration feedback callback for one device
    pub fn set_feedback_handler(
        &mut self,
        id: DeviceId,
        f: impl FnMut(&mut DeviceCtx<'_>) + 'static,
    ) -> bool {
        self.device_mut(id)
            .map(|dev| dev.callbacks.feedback = Some(Box::new(f)))
            .is_some()
    }

    /// Install the removal callback for one device
    pub fn set_remove_handler(
        &mut self,
        id: DeviceId,
        f: impl FnMut(&DeviceInfo, bool) + 'static,
    ) -> bool {
        self.device_mut(id)
            .map(|dev| dev.callbacks.remove = Some(Box::new(f)))
            .is_some()
    }

    /// Install the FPS-throttled screen redraw callback for one device
    pub fn set_screen_handler(
        &mut self,
        id: DeviceId,
        f: impl FnMut(u32, &ScreenInfo, &mut [u8]) -> bool + 'static,
    ) -> bool {
        self.device_mut(id)
            .map(|dev| dev.callbacks.screen = Some(Box::new(f)))
            .is_some()
    }

    /// Stage a light change on one device (no-op while banished)
    pub fn light_set(&mut self, id: DeviceId, light: u32, color: u32) -> bool {
        self.with_ctx(id, |ctx| ctx.light_set(light, color))
    }

    /// Stage a grid pad light change on one device
    pub fn grid_light_set(&mut self, id: DeviceId, grid: u32, pos: u32, color: u32) -> bool {
        self.with_ctx(id, |ctx| ctx.grid_light_set(grid, pos, color))
    }

    /// Write one device's staged light state out
    pub fn lights_flush(&mut self, id: DeviceId, force: bool) -> bool {
        self.with_ctx(id, |ctx| ctx.lights_flush(force))
    }

    /// Info block of a connected device
    pub fn device_info(&self, id: DeviceId) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.id == id).map(|d| &d.info)
    }

    /// Name of one control, if the device's driver names it
    pub fn control_name(&self, id: DeviceId, kind: EventKind, control: u32) -> Option<&'static str> {
        let dev = self.devices.iter().find(|d| d.id == id)?;
        if control >= dev.info.control_count(kind) {
            warn!(
                "control {kind:?} {control} out of range (device has {})",
                dev.info.control_count(kind)
            );
            return None;
        }
        dev.driver.control_name(kind, control)
    }

    /// Connected device ids, in polling order
    pub fn device_ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.id).collect()
    }

    /// Whether a device is fault-isolated (None once it is gone)
    pub fn is_banished(&self, id: DeviceId) -> Option<bool> {
        self.devices.iter().find(|d| d.id == id).map(|d| d.banished)
    }

    /// Transfer counters of one device
    pub fn transfer_counters(&self, id: DeviceId) -> Option<Counters> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.port.counters())
    }

    /// Submitted-but-not-retired transfers of one device
    pub fn in_flight(&self, id: DeviceId) -> Option<usize> {
        self.devices
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.port.in_flight())
    }

    fn register(&mut self, driver: Box<dyn ControllerDriver>, port: UsbPort) -> DeviceId {
        let id = DeviceId(self.next_id);
        self.next_id += 1;
        let dev = Device::new(id, driver, port);
        info!(
            "connected {:04x}:{:04x} as {:?}",
            dev.info.vendor_id, dev.info.product_id, id
        );
        self.devices.push(dev);
        id
    }

    fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    fn with_ctx(&mut self, id: DeviceId, f: impl FnOnce(&mut DeviceCtx<'_>)) -> bool {
        let Some(dev) = self.device_mut(id) else {
            return false;
        };
        if dev.banished {
            return false;
        }
        let Device {
            id,
            info,
            driver,
            port,
            ..
        } = dev;
        let mut ctx = DeviceCtx {
            id: *id,
            info,
            driver: driver.as_mut(),
            port,
        };
        f(&mut ctx);
        true
    }

    /// Retire completed transfers and deliver the decoded events
    fn service_device(dev: &mut Device) {
        if dev.banished {
            return;
        }
        let mut events = Vec::new();
        let Device { driver, port, .. } = dev;
        let result = port.service(|endpoint, data| driver.handle_read(endpoint, data, &mut events));

        // Events decoded this pass are delivered even when a later
        // completion in the same pass faulted the device: the host sees
        // the press before the device disappears.
        if !events.is_empty() {
            Self::fire_event(dev, &events);
        }
        if let Err(err) = result {
            warn!(
                "device {:04x}:{:04x} faulted: {err}",
                dev.info.vendor_id, dev.info.product_id
            );
            dev.banish();
        }
    }

    fn fire_event(dev: &mut Device, events: &[Event]) {
        let Device {
            id,
            info,
            driver,
            port,
            callbacks,
            ..
        } = dev;
        if let Some(cb) = callbacks.event.as_mut() {
            let mut ctx = DeviceCtx {
                id: *id,
                info,
                driver: driver.as_mut(),
                port,
            };
            cb(&mut ctx, events);
        }
    }

    fn fire_feedback(dev: &mut Device) {
        if dev.banished {
            return;
        }
        let Device {
            id,
            info,
            driver,
            port,
            callbacks,
            ..
        } = dev;
        if let Some(cb) = callbacks.feedback.as_mut() {
            let mut ctx = DeviceCtx {
                id: *id,
                info,
                driver: driver.as_mut(),
                port,
            };
            cb(&mut ctx);
        }
    }

    /// Redraw screens whose frame interval has elapsed
    ///
    /// Double-buffer contract: hand the current pixels to the callback;
    /// if it reports dirty, push the buffer to the device. The redraw
    /// timestamp moves only on an actual redraw.
    fn screen_pass(dev: &mut Device, now: Instant, interval: Duration) {
        if dev.banished || dev.info.screens.is_empty() {
            return;
        }
        let Device {
            info,
            driver,
            port,
            callbacks,
            last_redraw,
            ..
        } = dev;
        let Some(cb) = callbacks.screen.as_mut() else {
            return;
        };
        if let Some(last) = *last_redraw
            && now.duration_since(last) < interval
        {
            return;
        }

        let mut drew = false;
        for (idx, screen_info) in info.screens.iter().enumerate() {
            let idx = idx as u32;
            if let Some(pixels) = driver.screen_pixels(idx) {
                let dirty = cb(idx, screen_info, pixels);
                drew = true;
                if dirty {
                    driver.screen_flush(port, idx);
                }
            }
        }
        if drew {
            *last_redraw = Some(now);
        }
    }

    /// Pop and tear down every banished device
    fn sweep_banished(&mut self) {
        let mut i = 0;
        while i < self.devices.len() {
            if !self.devices[i].banished {
                i += 1;
                continue;
            }
            let mut dev = self.devices.remove(i);
            info!(
                "removing banished device {:04x}:{:04x}",
                dev.info.vendor_id, dev.info.product_id
            );
            // Link assumed dead: no write drain.
            Self::teardown(&mut dev, true, Duration::ZERO);
        }
    }

    fn teardown(dev: &mut Device, unexpected: bool, drain: Duration) {
        if let Some(cb) = dev.callbacks.remove.as_mut() {
            cb(&dev.info, unexpected);
        }
        let banished = dev.banished;
        let Device { driver, port, .. } = dev;
        driver.disconnect(port, banished);
        port.close(drain);
    }

    fn drain_hotplug(&mut self) {
        let Some(monitor) = self.hotplug.as_mut() else {
            return;
        };
        for event in monitor.drain() {
            match event {
                HotplugEvent::Arrived {
                    vendor_id,
                    product_id,
                } => {
                    let (vendor_id, product_id) = hotplug::remap_arrival(vendor_id, product_id);
                    self.try_connect(vendor_id, product_id);
                }
                HotplugEvent::Left {
                    vendor_id,
                    product_id,
                } => {
                    // Never disconnect from inside the hot-plug path: a
                    // banish keeps the removal contract uniform through
                    // the sweep.
                    if let Some(dev) = self.devices.iter_mut().find(|d| {
                        !d.banished
                            && d.info.vendor_id == vendor_id
                            && d.info.product_id == product_id
                    }) {
                        dev.banish();
                    }
                }
            }
        }
    }

    /// Open and offer one claimed VID:PID pair; true when registered
    fn try_connect(&mut self, vendor_id: u16, product_id: u16) -> bool {
        let Some(entry) = self
            .drivers
            .iter()
            .find(|e| e.vendor_id == vendor_id && e.product_id == product_id)
        else {
            debug!("no driver claims {vendor_id:04x}:{product_id:04x}");
            return false;
        };
        let (name, connect) = (entry.name, entry.connect);

        if self.devices.iter().any(|d| {
            !d.banished && d.info.vendor_id == vendor_id && d.info.product_id == product_id
        }) {
            debug!("{name} already connected, ignoring");
            return false;
        }

        let Some(context) = self.ensure_context() else {
            return false;
        };
        let mut port = UsbPort::new(Box::new(RusbTransport::new(context.clone())));
        match connect(&mut port) {
            Ok(driver) => {
                if let Some(accept) = self.accept.as_mut()
                    && !accept(driver.info())
                {
                    debug!("host declined {name}");
                    port.close(Duration::ZERO);
                    return false;
                }
                let id = self.register(driver, port);
                info!("{name} registered as {id:?}");
                true
            }
            Err(e) => {
                // The failing connect path released its own partial
                // resources; closing the port reaps what it did acquire.
                debug!("connect {name} failed: {e}");
                port.close(Duration::ZERO);
                false
            }
        }
    }

    fn ensure_context(&mut self) -> Option<&Context> {
        if self.context.is_none() {
            match Context::new() {
                Ok(ctx) => {
                    if self.config.hotplug {
                        self.hotplug = HotplugMonitor::new(&ctx);
                    }
                    self.context = Some(ctx);
                }
                Err(e) => {
                    warn!("libusb context init failed: {e}");
                    return None;
                }
            }
        }
        self.context.as_ref()
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
