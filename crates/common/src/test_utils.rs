//! Test utilities for surfkit
//!
//! Provides mock constructors and canned report builders for testing
//! across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_device_info;
//!
//! let info = create_mock_device_info(0x17cc, 0x1120);
//! assert_eq!(info.vendor_id, 0x17cc);
//! ```

use protocol::{ControlCounts, DeviceInfo, Event, ScreenInfo};

/// Create a mock DeviceInfo for testing
///
/// Advertises a small but fully populated surface: 8 buttons, 2 nibble
/// encoders, 2 sliders and one 4x4 grid.
pub fn create_mock_device_info(vendor_id: u16, product_id: u16) -> DeviceInfo {
    DeviceInfo {
        vendor_id,
        product_id,
        vendor: Some("Test Vendor".to_string()),
        device: Some("Test Surface".to_string()),
        serial: Some(format!("SN{:04x}{:04x}", vendor_id, product_id)),
        control_counts: ControlCounts {
            buttons: 8,
            encoders: 2,
            sliders: 2,
            grids: 1,
            grid_size: 16,
            lights: 8,
        },
        screens: Vec::new(),
    }
}

/// Create a mock DeviceInfo with one small monochrome screen
pub fn create_mock_screened_device_info(vendor_id: u16, product_id: u16) -> DeviceInfo {
    let mut info = create_mock_device_info(vendor_id, product_id);
    info.screens = vec![ScreenInfo {
        width: 64,
        height: 32,
        bytes: 64 * 32 / 8,
    }];
    info
}

/// Build a canned input report in the mock surface layout
///
/// Layout (5 bytes): button bitmask, encoder nibbles (enc1 high, enc0
/// low), slider 0, slider 1, grid pressure for pad 0.
pub fn create_mock_input_report(
    buttons: u8,
    enc0: u8,
    enc1: u8,
    sliders: [u8; 2],
    pad0_pressure: u8,
) -> Vec<u8> {
    vec![
        buttons,
        (enc1 << 4) | (enc0 & 0x0f),
        sliders[0],
        sliders[1],
        pad0_pressure,
    ]
}

/// An idle report: nothing pressed, encoders at zero
pub fn create_idle_input_report() -> Vec<u8> {
    create_mock_input_report(0, 0, 0, [0, 0], 0)
}

/// Collect the control ids of all button events in a batch
pub fn button_ids(events: &[Event]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|ev| match ev {
            Event::Button { id, .. } => Some(*id),
            _ => None,
        })
        .collect()
}
