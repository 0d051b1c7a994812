//! Hot-plug arrival/departure detection
//!
//! The rusb hot-plug callback runs inside `handle_events`, on the same
//! thread as the scheduler, but real work is still deferred: the
//! callback only forwards VID:PID pairs into a channel that `idle_iter`
//! drains at the end of each iteration. Connecting (or banishing) from
//! inside the callback would re-enter the registry mid-iteration.

use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::mpsc;
use tracing::{debug, warn};

/// One hot-plug notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    Arrived { vendor_id: u16, product_id: u16 },
    Left { vendor_id: u16, product_id: u16 },
}

/// Registered hot-plug subscription
pub struct HotplugMonitor {
    _registration: Registration<Context>,
    rx: mpsc::Receiver<HotplugEvent>,
}

impl HotplugMonitor {
    /// Register for arrival/departure callbacks on `context`
    ///
    /// Returns `None` on platforms without hot-plug support; the engine
    /// then only sees devices found at probe time.
    pub fn new(context: &Context) -> Option<Self> {
        if !rusb::has_hotplug() {
            warn!("hotplug not supported on this platform, relying on probe only");
            return None;
        }

        let (tx, rx) = mpsc::channel();
        let registration = HotplugBuilder::new()
            .enumerate(false) // probe() walks devices already present
            .register(context, Box::new(HotplugForwarder { tx }));

        match registration {
            Ok(registration) => Some(Self {
                _registration: registration,
                rx,
            }),
            Err(e) => {
                warn!("hotplug registration failed: {e}");
                None
            }
        }
    }

    /// Collect every notification received since the last drain
    pub fn drain(&mut self) -> Vec<HotplugEvent> {
        self.rx.try_iter().collect()
    }
}

struct HotplugForwarder {
    tx: mpsc::Sender<HotplugEvent>,
}

impl HotplugForwarder {
    fn forward<T: UsbContext>(&self, device: &Device<T>, arrived: bool) {
        let Ok(desc) = device.device_descriptor() else {
            debug!("hotplug event for device without readable descriptor, ignoring");
            return;
        };
        let event = if arrived {
            HotplugEvent::Arrived {
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            }
        } else {
            HotplugEvent::Left {
                vendor_id: desc.vendor_id(),
                product_id: desc.product_id(),
            }
        };
        // The receiver only disappears at registry teardown.
        let _ = self.tx.send(event);
    }
}

impl<T: UsbContext> Hotplug<T> for HotplugForwarder {
    fn device_arrived(&mut self, device: Device<T>) {
        debug!(
            "hotplug: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.forward(&device, true);
    }

    fn device_left(&mut self, device: Device<T>) {
        debug!(
            "hotplug: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );
        self.forward(&device, false);
    }
}

/// Native Instruments vendor id
const VID_NI: u16 = 0x17cc;

/// Arrival quirk table: (transitional VID:PID) -> (real VID:PID)
///
/// Some surfaces with a built-in hub enumerate under a transitional
/// product id while the kernel is still settling the hub; the pair the
/// driver table knows arrives a moment later under the remapped id.
const ARRIVAL_QUIRKS: &[((u16, u16), (u16, u16))] = &[
    ((VID_NI, 0x1401), (VID_NI, 0x1400)),
    ((VID_NI, 0x1211), (VID_NI, 0x1210)),
];

/// Apply the vendor quirk table to an arrival notification
pub fn remap_arrival(vendor_id: u16, product_id: u16) -> (u16, u16) {
    for ((from_vid, from_pid), to) in ARRIVAL_QUIRKS {
        if *from_vid == vendor_id && *from_pid == product_id {
            debug!(
                "quirk: remapping arrival {vendor_id:04x}:{product_id:04x} -> {:04x}:{:04x}",
                to.0, to.1
            );
            return *to;
        }
    }
    (vendor_id, product_id)
}
