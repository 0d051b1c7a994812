//! USB transport seam
//!
//! The engine never talks to libusb directly; it submits [`TransferNode`]s
//! against a [`UsbTransport`] and drives each node to completion with a
//! non-blocking poll step. The hardware implementation wraps rusb; the
//! loopback implementation backs the virtualized device and the test
//! suite.

use crate::usb::node::{Direction, TransferKind, TransferNode};
use protocol::{TransferStatus, UsbError};
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, warn};

/// Backend behind a device's USB port
///
/// `drive` is the poll-to-completion step: it must never block beyond a
/// bounded slice and returns `None` while the node is still in flight.
/// A node with a pending cancel request must retire as
/// [`TransferStatus::Cancelled`] on the next drive.
pub trait UsbTransport {
    /// Open a connection handle to the device, returning its handle index
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<usize, UsbError>;

    /// Claim one interface on an opened handle
    fn open_interface(&mut self, handle_idx: usize, interface: u8) -> Result<(), UsbError>;

    /// Advance one node; `Some` retires the node with its final status
    fn drive(&mut self, node: &mut TransferNode) -> Option<TransferStatus>;

    /// Release claimed interfaces and close every handle
    fn release(&mut self);
}

/// Bounded slice a hardware read may block for inside `drive`
///
/// libusb treats a zero timeout as "no timeout", so the non-blocking
/// poll step uses the smallest expressible slice instead.
const DRIVE_SLICE: Duration = Duration::from_millis(1);

/// Hardware transport over rusb
pub struct RusbTransport {
    context: Context,
    handles: Vec<OpenHandle>,
}

struct OpenHandle {
    handle: DeviceHandle<Context>,
    claimed: Vec<u8>,
}

impl RusbTransport {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            handles: Vec::new(),
        }
    }
}

impl UsbTransport for RusbTransport {
    fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<usize, UsbError> {
        let handle = self
            .context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(UsbError::NotFound)?;

        debug!(
            "Opened device {:04x}:{:04x} as handle {}",
            vendor_id,
            product_id,
            self.handles.len()
        );

        self.handles.push(OpenHandle {
            handle,
            claimed: Vec::new(),
        });
        Ok(self.handles.len() - 1)
    }

    fn open_interface(&mut self, handle_idx: usize, interface: u8) -> Result<(), UsbError> {
        let open = self
            .handles
            .get_mut(handle_idx)
            .ok_or(UsbError::NotFound)?;

        // Detach the kernel HID driver if it holds the interface.
        match open.handle.kernel_driver_active(interface) {
            Ok(true) => {
                if let Err(e) = open.handle.detach_kernel_driver(interface) {
                    warn!("Failed to detach kernel driver from interface {interface}: {e}");
                }
            }
            Ok(false) => {}
            Err(e) => debug!("Could not check kernel driver on interface {interface}: {e}"),
        }

        open.handle
            .claim_interface(interface)
            .map_err(map_rusb_error)?;
        open.claimed.push(interface);
        debug!("Claimed interface {interface} on handle {handle_idx}");
        Ok(())
    }

    fn drive(&mut self, node: &mut TransferNode) -> Option<TransferStatus> {
        if node.cancel_requested() {
            return Some(TransferStatus::Cancelled);
        }

        let open = match self.handles.get_mut(node.handle_idx()) {
            Some(open) => open,
            None => return Some(TransferStatus::Failed(UsbError::NotFound)),
        };

        let endpoint = node.endpoint();
        let result = match (node.direction(), node.kind()) {
            (Direction::Read, TransferKind::Interrupt) => {
                open.handle
                    .read_interrupt(endpoint, node.buffer_mut(), DRIVE_SLICE)
            }
            (Direction::Read, TransferKind::Bulk) => {
                open.handle
                    .read_bulk(endpoint, node.buffer_mut(), DRIVE_SLICE)
            }
            (Direction::Write, TransferKind::Interrupt) => {
                open.handle
                    .write_interrupt(endpoint, node.buffer(), DRIVE_SLICE)
            }
            (Direction::Write, TransferKind::Bulk) => {
                open.handle.write_bulk(endpoint, node.buffer(), DRIVE_SLICE)
            }
        };

        match result {
            Ok(len) => Some(TransferStatus::Complete(len)),
            // No data inside the slice: the node stays in flight until a
            // later drive step or a cancel.
            Err(rusb::Error::Timeout) => None,
            Err(e) => Some(TransferStatus::Failed(map_rusb_error(e))),
        }
    }

    fn release(&mut self) {
        for (idx, open) in self.handles.drain(..).enumerate() {
            for interface in &open.claimed {
                if let Err(e) = open.handle.release_interface(*interface) {
                    warn!("Failed to release interface {interface}: {e}");
                }
                // Hand the device back to the kernel driver it came from.
                if let Err(e) = open.handle.attach_kernel_driver(*interface) {
                    debug!("Could not reattach kernel driver to interface {interface}: {e}");
                }
            }
            debug!("Closed handle {idx}");
        }
    }
}

/// Map rusb::Error to the engine fault taxonomy
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Access => UsbError::Access,
        rusb::Error::Io => UsbError::Io,
        _ => UsbError::Other(err.to_string()),
    }
}
