//! Device identity and capability types
//!
//! This module defines the types a control surface advertises to the host:
//! its USB identity, human-readable names, and how many controls of each
//! kind it carries. Control counts back the id-range validation on the
//! light/feedback entry points.

use serde::{Deserialize, Serialize};

/// Unique device identifier (registry-assigned)
///
/// Stable for the lifetime of one connection. Reconnecting a device yields
/// a fresh id; ids are never reused within one registry lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

/// Device information advertised to the host
///
/// Filled in by the device driver at connect time. Control counts are the
/// driver's contract: events and light updates with ids at or beyond the
/// advertised count are rejected as programming errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Vendor name (if available)
    pub vendor: Option<String>,
    /// Product name (if available)
    pub device: Option<String>,
    /// Serial number string (if available)
    pub serial: Option<String>,
    /// Number of controls of each kind
    pub control_counts: ControlCounts,
    /// Pixel displays on this surface (empty for most devices)
    pub screens: Vec<ScreenInfo>,
}

impl DeviceInfo {
    /// Number of controls advertised for one event kind
    pub fn control_count(&self, kind: EventKind) -> u32 {
        match kind {
            EventKind::Button => self.control_counts.buttons,
            EventKind::Encoder => self.control_counts.encoders,
            EventKind::Slider => self.control_counts.sliders,
            EventKind::Grid => self.control_counts.grids,
        }
    }
}

/// Per-kind control counts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ControlCounts {
    /// Momentary buttons
    pub buttons: u32,
    /// Rotary encoders
    pub encoders: u32,
    /// Absolute faders / knobs
    pub sliders: u32,
    /// Pad grids
    pub grids: u32,
    /// Pads per grid (uniform across grids on every supported device)
    pub grid_size: u32,
    /// Addressable lights outside the grids
    pub lights: u32,
}

/// One pixel display on a surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScreenInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Size of the raw pixel buffer in bytes (format is device-specific)
    pub bytes: usize,
}

/// Discriminant for the event union
///
/// Used for control-count lookups and control-name queries where the
/// payload of the event is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Momentary button
    Button,
    /// Rotary encoder
    Encoder,
    /// Absolute fader / knob
    Slider,
    /// Pad grid
    Grid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_with_counts(counts: ControlCounts) -> DeviceInfo {
        DeviceInfo {
            vendor_id: 0x17cc,
            product_id: 0x1120,
            vendor: Some("Test Vendor".to_string()),
            device: Some("Test Surface".to_string()),
            serial: None,
            control_counts: counts,
            screens: Vec::new(),
        }
    }

    #[test]
    fn test_control_count_lookup() {
        let info = info_with_counts(ControlCounts {
            buttons: 8,
            encoders: 2,
            sliders: 4,
            grids: 1,
            grid_size: 16,
            lights: 8,
        });

        assert_eq!(info.control_count(EventKind::Button), 8);
        assert_eq!(info.control_count(EventKind::Encoder), 2);
        assert_eq!(info.control_count(EventKind::Slider), 4);
        assert_eq!(info.control_count(EventKind::Grid), 1);
    }

    #[test]
    fn test_device_id_copy() {
        let id1 = DeviceId(42);
        let id2 = id1;
        assert_eq!(id1, id2);
    }
}
