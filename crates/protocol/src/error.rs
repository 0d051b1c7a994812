//! Fault taxonomy for USB transfers and device connection

use thiserror::Error;

/// USB transfer fault
///
/// Maps to libusb transfer/operation status. Only `Timeout` is transient;
/// every other variant observed on a completed transfer is fatal for the
/// owning device.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsbError {
    /// Transfer timed out
    #[error("transfer timed out")]
    Timeout,
    /// Endpoint stalled (protocol error)
    #[error("endpoint stalled")]
    Pipe,
    /// Device was disconnected
    #[error("device gone")]
    NoDevice,
    /// Device or endpoint not found
    #[error("not found")]
    NotFound,
    /// Resource busy
    #[error("resource busy")]
    Busy,
    /// Device sent more data than the buffer holds
    #[error("overflow")]
    Overflow,
    /// Permission denied opening or claiming
    #[error("access denied")]
    Access,
    /// Low-level I/O error
    #[error("i/o error")]
    Io,
    /// Anything the backend reports that has no dedicated variant
    #[error("usb error: {0}")]
    Other(String),
}

/// Connect-time failure
///
/// Returned by a driver's connect path. Nothing is registered on failure;
/// the failing path releases every partially-acquired OS resource itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// No matching hardware present
    #[error("device not present")]
    NotPresent,
    /// Opening a connection handle failed
    #[error("open failed: {0}")]
    OpenFailed(UsbError),
    /// Claiming an interface failed
    #[error("interface claim failed: {0}")]
    ClaimFailed(UsbError),
    /// The host's accept callback declined the device
    #[error("declined by host")]
    Declined,
}

/// Final state of one asynchronous transfer
///
/// Produced exactly once per transfer node, inside completion servicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Transfer finished; payload length in bytes
    Complete(usize),
    /// Transfer gave up waiting (transient, counted, never fatal)
    TimedOut,
    /// Transfer was cancelled at close time
    Cancelled,
    /// Transfer failed; the owning device is faulted
    Failed(UsbError),
}
