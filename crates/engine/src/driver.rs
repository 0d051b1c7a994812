//! Control surface driver interface
//!
//! Each supported device kind implements [`ControllerDriver`]: the
//! device-specific half that decodes raw HID reports into events and
//! builds the output reports for lights and screens. The engine only ever
//! holds the trait object; it knows nothing about any concrete protocol.
//!
//! Drivers are looked up through a table of [`DriverEntry`] values keyed
//! by VID:PID, consulted at probe time and on hot-plug arrivals.

use crate::usb::UsbPort;
use protocol::{ConnectError, DeviceInfo, Event, EventKind};

/// Device-specific protocol driver
///
/// All USB traffic a driver generates goes through the [`UsbPort`] it is
/// handed; the port enforces the in-flight ceilings and owns the
/// transfer bookkeeping.
///
/// Event deduplication is the driver's contract: `handle_read` must not
/// emit an event whose underlying raw value did not change since the
/// previous report.
pub trait ControllerDriver {
    /// Identity and capabilities this device advertises
    fn info(&self) -> &DeviceInfo;

    /// Issue read submissions for the next batch of input reports
    ///
    /// Called once per idle iteration. Submissions dropped at the
    /// in-flight ceiling are retried here on the next iteration.
    fn poll(&mut self, port: &mut UsbPort);

    /// Decode one completed raw read into events
    ///
    /// Only successful, non-empty reads arrive here; failed or cancelled
    /// transfers never reach the decoder.
    fn handle_read(&mut self, endpoint: u8, data: &[u8], events: &mut Vec<Event>);

    /// Stage a light state change (not written until a flush)
    fn light_set(&mut self, light: u32, color: u32);

    /// Stage a grid pad light state change
    fn grid_light_set(&mut self, grid: u32, pos: u32, color: u32);

    /// Write staged light state to the device
    ///
    /// `force` pushes the full state even when nothing changed.
    fn lights_flush(&mut self, port: &mut UsbPort, force: bool);

    /// Borrow the raw pixel buffer of one screen, if this device has it
    fn screen_pixels(&mut self, _screen: u32) -> Option<&mut [u8]> {
        None
    }

    /// Push one screen's pixel buffer to the device
    fn screen_flush(&mut self, _port: &mut UsbPort, _screen: u32) {}

    /// Drive feedback to a neutral state and stop
    ///
    /// Called exactly once, before the port closes. `banished` means the
    /// link is assumed dead: skip the neutral-state writes, they cannot
    /// reach the device.
    fn disconnect(&mut self, port: &mut UsbPort, banished: bool);

    /// Human-readable name of one control, if the driver names it
    fn control_name(&self, _kind: EventKind, _id: u32) -> Option<&'static str> {
        None
    }
}

/// Driver connect function
///
/// Opens handles and claims interfaces through the port, then returns the
/// driver. On failure the connect path must release whatever it acquired
/// (closing the port does that); nothing gets registered.
pub type ConnectFn = fn(&mut UsbPort) -> Result<Box<dyn ControllerDriver>, ConnectError>;

/// One entry in the driver table
pub struct DriverEntry {
    /// USB Vendor ID this driver claims
    pub vendor_id: u16,
    /// USB Product ID this driver claims
    pub product_id: u16,
    /// Display name for logs
    pub name: &'static str,
    /// Connect function
    pub connect: ConnectFn,
}

/// Drivers compiled into the engine
///
/// External driver crates add theirs with [`crate::Hub::register_driver`].
pub fn builtin_drivers() -> Vec<DriverEntry> {
    vec![crate::virt::entry()]
}
