//! Virtualized control surface
//!
//! A builtin driver over the loopback transport: no hardware, but the
//! full decode/feedback/screen path of a real device. Requested through
//! the `SURFKIT_VIRT_VENDOR`/`SURFKIT_VIRT_DEVICE` env pair, connected
//! directly by tests, and registered in the builtin driver table.
//!
//! Surface layout: 8 buttons, 2 nibble encoders, 2 sliders, one 4x4
//! pressure grid and one 64x32 monochrome screen.

use crate::driver::{ControllerDriver, DriverEntry};
use crate::usb::UsbPort;
use protocol::{
    ConnectError, ControlCounts, DeviceInfo, EncoderDelta, Event, EventKind, ScreenInfo,
    wrap_delta,
};

/// Vendor id of the builtin virtual surface
pub const VIRT_VENDOR: u16 = 0x1209;
/// Product id of the builtin virtual surface
pub const VIRT_DEVICE: u16 = 0x0d10;

/// Interrupt IN endpoint carrying input reports
pub const EP_IN: u8 = 0x81;
/// Interrupt OUT endpoint carrying light state
pub const EP_LIGHTS: u8 = 0x01;
/// Bulk OUT endpoint carrying screen pixels
pub const EP_SCREEN: u8 = 0x02;

/// Input report: buttons, encoder nibbles, two sliders, pad 0 pressure
pub const REPORT_LEN: usize = 5;

const N_BUTTONS: u32 = 8;
const N_PADS: usize = 16;
const SCREEN_W: u32 = 64;
const SCREEN_H: u32 = 32;
const SCREEN_BYTES: usize = (SCREEN_W * SCREEN_H / 8) as usize;

/// Driver table entry for the builtin virtual surface
pub fn entry() -> DriverEntry {
    DriverEntry {
        vendor_id: VIRT_VENDOR,
        product_id: VIRT_DEVICE,
        name: "Virtual Surface",
        connect: virt_connect,
    }
}

fn virt_connect(port: &mut UsbPort) -> Result<Box<dyn ControllerDriver>, ConnectError> {
    connect(port, VIRT_VENDOR, VIRT_DEVICE)
}

/// Connect a virtual surface advertising the given identity
///
/// The identity is what the env pair requested; the surface layout is
/// always the builtin one.
pub fn connect(
    port: &mut UsbPort,
    vendor_id: u16,
    product_id: u16,
) -> Result<Box<dyn ControllerDriver>, ConnectError> {
    let handle_idx = port
        .open(vendor_id, product_id)
        .map_err(ConnectError::OpenFailed)?;
    port.open_interface(handle_idx, 0)
        .map_err(ConnectError::ClaimFailed)?;
    Ok(Box::new(VirtDriver::new(vendor_id, product_id, handle_idx)))
}

/// The builtin virtual surface driver
pub struct VirtDriver {
    info: DeviceInfo,
    handle_idx: usize,
    prev: [u8; REPORT_LEN],
    lights: [u8; N_BUTTONS as usize],
    pads: [u8; N_PADS],
    lights_dirty: bool,
    screen: Vec<u8>,
}

impl VirtDriver {
    pub fn new(vendor_id: u16, product_id: u16, handle_idx: usize) -> Self {
        Self {
            info: DeviceInfo {
                vendor_id,
                product_id,
                vendor: Some("surfkit".to_string()),
                device: Some("Virtual Surface".to_string()),
                serial: None,
                control_counts: ControlCounts {
                    buttons: N_BUTTONS,
                    encoders: 2,
                    sliders: 2,
                    grids: 1,
                    grid_size: N_PADS as u32,
                    lights: N_BUTTONS,
                },
                screens: vec![ScreenInfo {
                    width: SCREEN_W,
                    height: SCREEN_H,
                    bytes: SCREEN_BYTES,
                }],
            },
            handle_idx,
            prev: [0; REPORT_LEN],
            lights: [0; N_BUTTONS as usize],
            pads: [0; N_PADS],
            lights_dirty: false,
            screen: vec![0; SCREEN_BYTES],
        }
    }
}

/// Monochrome LED brightness from a 0x00RRGGBB color
fn brightness(color: u32) -> u8 {
    let r = (color >> 16) as u8;
    let g = (color >> 8) as u8;
    let b = color as u8;
    r.max(g).max(b)
}

impl ControllerDriver for VirtDriver {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn poll(&mut self, port: &mut UsbPort) {
        port.submit_read(self.handle_idx, EP_IN, REPORT_LEN);
    }

    fn handle_read(&mut self, endpoint: u8, data: &[u8], events: &mut Vec<Event>) {
        if endpoint != EP_IN || data.len() < REPORT_LEN {
            return;
        }

        // Buttons: one event per changed bit.
        let changed = data[0] ^ self.prev[0];
        for id in 0..N_BUTTONS {
            if changed & (1 << id) != 0 {
                events.push(Event::Button {
                    id,
                    pressed: data[0] & (1 << id) != 0,
                });
            }
        }

        // Encoders: 4-bit rotating counters, low then high nibble.
        for (id, shift) in [(0u32, 0u8), (1, 4)] {
            let newer = (data[1] >> shift) & 0x0f;
            let older = (self.prev[1] >> shift) & 0x0f;
            let step = wrap_delta(newer, older);
            if step != 0 {
                events.push(Event::Encoder {
                    id,
                    delta: EncoderDelta::Steps(step as i32),
                });
            }
        }

        // Sliders: absolute bytes.
        for id in 0..2u32 {
            let raw = data[2 + id as usize];
            if raw != self.prev[2 + id as usize] {
                events.push(Event::Slider {
                    id,
                    value: f32::from(raw) / 255.0,
                });
            }
        }

        // Pad 0 pressure.
        if data[4] != self.prev[4] {
            events.push(Event::Grid {
                grid: 0,
                pos: 0,
                pressed: Some(data[4] > 0),
                pressure: Some(f32::from(data[4]) / 255.0),
            });
        }

        self.prev.copy_from_slice(&data[..REPORT_LEN]);
    }

    fn light_set(&mut self, light: u32, color: u32) {
        let level = brightness(color);
        if self.lights[light as usize] != level {
            self.lights[light as usize] = level;
            self.lights_dirty = true;
        }
    }

    fn grid_light_set(&mut self, _grid: u32, pos: u32, color: u32) {
        let level = brightness(color);
        if self.pads[pos as usize] != level {
            self.pads[pos as usize] = level;
            self.lights_dirty = true;
        }
    }

    fn lights_flush(&mut self, port: &mut UsbPort, force: bool) {
        if !self.lights_dirty && !force {
            return;
        }
        let mut report = Vec::with_capacity(1 + self.lights.len() + self.pads.len());
        report.push(0x80);
        report.extend_from_slice(&self.lights);
        report.extend_from_slice(&self.pads);
        if port.submit_interrupt_write(self.handle_idx, EP_LIGHTS, &report) > 0 {
            self.lights_dirty = false;
        }
    }

    fn screen_pixels(&mut self, screen: u32) -> Option<&mut [u8]> {
        (screen == 0).then_some(self.screen.as_mut_slice())
    }

    fn screen_flush(&mut self, port: &mut UsbPort, screen: u32) {
        if screen == 0 {
            port.submit_bulk_write(self.handle_idx, EP_SCREEN, &self.screen);
        }
    }

    fn disconnect(&mut self, port: &mut UsbPort, banished: bool) {
        if banished {
            // Link assumed dead, the neutral write would never arrive.
            return;
        }
        self.lights = [0; N_BUTTONS as usize];
        self.pads = [0; N_PADS];
        self.lights_flush(port, true);
    }

    fn control_name(&self, kind: EventKind, id: u32) -> Option<&'static str> {
        const BUTTONS: [&str; 8] = ["Play", "Cue", "Sync", "Shift", "Browse", "Back", "A", "B"];
        match kind {
            EventKind::Button => BUTTONS.get(id as usize).copied(),
            EventKind::Encoder => [Some("Browse Encoder"), Some("Loop Encoder")]
                .get(id as usize)
                .copied()
                .flatten(),
            EventKind::Slider => [Some("Crossfader"), Some("Pitch")]
                .get(id as usize)
                .copied()
                .flatten(),
            EventKind::Grid => Some("Pads"),
        }
    }
}
