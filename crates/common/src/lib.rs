//! Common utilities for surfkit
//!
//! This crate provides functionality shared by the engine and by device
//! driver crates: logging setup, a coarse error type, the clock seam the
//! scheduler throttles screen redraws against, and test helpers.

pub mod clock;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use logging::setup_logging;
