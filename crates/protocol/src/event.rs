//! Control surface event model
//!
//! Events are wire-format agnostic: device drivers decode their raw HID
//! reports into this union and hand the host an ordered batch per poll.
//! Ordering within a batch follows raw-report decode order, not id order.
//!
//! Deduplication is the driver's job: a driver must not re-emit an event
//! whose underlying raw value did not change since the previous report.
//! The dispatcher adds no guarantee of its own.

use crate::types::EventKind;
use serde::{Deserialize, Serialize};

/// One decoded input event from a control surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Momentary button press or release
    Button {
        /// Button id, `0..control_counts.buttons`
        id: u32,
        /// Pressed (true) or released (false)
        pressed: bool,
    },
    /// Relative encoder movement
    Encoder {
        /// Encoder id, `0..control_counts.encoders`
        id: u32,
        /// Signed movement since the previous report
        delta: EncoderDelta,
    },
    /// Absolute fader / knob position
    Slider {
        /// Slider id, `0..control_counts.sliders`
        id: u32,
        /// Position normalized to `0.0..=1.0`
        value: f32,
    },
    /// Pad grid touch
    Grid {
        /// Grid id, `0..control_counts.grids`
        grid: u32,
        /// Pad position within the grid, row-major from top-left
        pos: u32,
        /// Pressed state, if this grid reports on/off
        pressed: Option<bool>,
        /// Pressure normalized to `0.0..=1.0`, if this grid senses it
        pressure: Option<f32>,
    },
}

impl Event {
    /// Discriminant of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Button { .. } => EventKind::Button,
            Event::Encoder { .. } => EventKind::Encoder,
            Event::Slider { .. } => EventKind::Slider,
            Event::Grid { .. } => EventKind::Grid,
        }
    }

    /// Control id the event refers to (the grid id for grid events)
    pub fn control_id(&self) -> u32 {
        match self {
            Event::Button { id, .. } => *id,
            Event::Encoder { id, .. } => *id,
            Event::Slider { id, .. } => *id,
            Event::Grid { grid, .. } => *grid,
        }
    }
}

/// Encoder movement representation
///
/// Detented encoders report whole steps; touch strips and high-resolution
/// wheels report a continuous fraction of a revolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EncoderDelta {
    /// Whole detent steps, negative for counter-clockwise
    Steps(i32),
    /// Fraction of a revolution, negative for counter-clockwise
    Continuous(f32),
}
