//! Protocol library for surfkit
//!
//! This crate defines the wire-format-agnostic contract between control
//! surface drivers and the host: the event union drivers decode raw HID
//! reports into, the device identity/capability types a surface
//! advertises, the USB fault taxonomy, and the wrap-around delta
//! algorithm for nibble-width rotary encoders.
//!
//! # Example
//!
//! ```
//! use protocol::{Event, EncoderDelta, wrap_delta};
//!
//! // A driver decodes a 4-bit encoder counter into a step event.
//! let step = wrap_delta(0, 15); // forward wrap
//! assert_eq!(step, 1);
//!
//! let ev = Event::Encoder {
//!     id: 0,
//!     delta: EncoderDelta::Steps(step as i32),
//! };
//! assert_eq!(ev.control_id(), 0);
//! ```

pub mod encoder;
pub mod error;
pub mod event;
pub mod types;

pub use encoder::wrap_delta;
pub use error::{ConnectError, TransferStatus, UsbError};
pub use event::{EncoderDelta, Event};
pub use types::{ControlCounts, DeviceId, DeviceInfo, EventKind, ScreenInfo};
