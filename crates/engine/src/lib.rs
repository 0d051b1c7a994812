//! surfkit engine
//!
//! Hardware abstraction for USB/HID control surfaces: a device registry
//! with hot-plug detection, a non-blocking USB transfer engine with
//! per-device fault isolation, and a cooperative scheduler that fans out
//! polling, feedback and FPS-throttled screen redraws from one entry
//! point.
//!
//! # Example
//!
//! ```no_run
//! use engine::{EngineConfig, Hub};
//!
//! let mut hub = Hub::new(EngineConfig::load_or_default());
//! let connected = hub.probe(|info| {
//!     println!("accepting {:04x}:{:04x}", info.vendor_id, info.product_id);
//!     true
//! });
//! println!("{connected} device(s) connected");
//!
//! loop {
//!     hub.idle_iter();
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! ```

pub mod config;
pub mod device;
pub mod driver;
pub mod hotplug;
pub mod hub;
pub mod usb;
pub mod virt;

pub use config::EngineConfig;
pub use device::DeviceCtx;
pub use driver::{ControllerDriver, DriverEntry, builtin_drivers};
pub use hub::Hub;
pub use usb::{Counters, Loopback, MAX_HANDLES, MAX_INFLIGHT, UsbPort};
