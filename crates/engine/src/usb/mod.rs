//! Asynchronous USB transfer engine
//!
//! Non-blocking interrupt/bulk reads and writes with per-device in-flight
//! bookkeeping, completion classification, cancellation and backpressure.

pub mod loopback;
pub mod node;
pub mod port;
pub mod transport;

pub use loopback::Loopback;
pub use node::{Direction, TransferKind, TransferNode};
pub use port::{Counters, MAX_HANDLES, MAX_INFLIGHT, UsbPort};
pub use transport::{RusbTransport, UsbTransport, map_rusb_error};
