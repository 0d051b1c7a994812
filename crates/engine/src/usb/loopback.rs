//! In-memory transport
//!
//! Backs the virtualized device and the engine test suite. A [`Loopback`]
//! handle and the [`UsbTransport`] it creates share state, so reports can
//! be injected and completed writes inspected after the port has taken
//! ownership of the transport.

use crate::usb::node::{Direction, TransferNode};
use crate::usb::transport::UsbTransport;
use protocol::{TransferStatus, UsbError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Default, Debug)]
struct LoopbackState {
    /// Inbound reports waiting for a read node, per endpoint, FIFO
    reports: VecDeque<(u8, Vec<u8>)>,
    /// Payloads of completed writes, in completion order
    written: Vec<(u8, Vec<u8>)>,
    /// Scripted terminal statuses, consumed one per retired node
    scripted: VecDeque<TransferStatus>,
    /// Hold writes in flight instead of completing them
    stall_writes: bool,
    /// Fail the next open call
    open_fails: Option<UsbError>,
    handles: usize,
}

/// Shared handle to a loopback device
///
/// Clone freely; all clones and the transport view the same state.
#[derive(Clone, Default, Debug)]
pub struct Loopback {
    state: Rc<RefCell<LoopbackState>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the transport half to hand to a `UsbPort`
    pub fn transport(&self) -> Box<dyn UsbTransport> {
        Box::new(LoopbackTransport {
            state: Rc::clone(&self.state),
        })
    }

    /// Queue an inbound report for the next read on `endpoint`
    pub fn push_report(&self, endpoint: u8, data: &[u8]) {
        self.state
            .borrow_mut()
            .reports
            .push_back((endpoint, data.to_vec()));
    }

    /// Script the final status of the next retired transfer
    ///
    /// Scripted statuses apply in order, one per node, before any data
    /// exchange is attempted.
    pub fn script_status(&self, status: TransferStatus) {
        self.state.borrow_mut().scripted.push_back(status);
    }

    /// Keep write nodes in flight until [`Loopback::release_writes`]
    pub fn stall_writes(&self, stall: bool) {
        self.state.borrow_mut().stall_writes = stall;
    }

    /// Stop stalling writes (alias for `stall_writes(false)`)
    pub fn release_writes(&self) {
        self.stall_writes(false);
    }

    /// Make the next `open` call fail
    pub fn fail_open(&self, err: UsbError) {
        self.state.borrow_mut().open_fails = Some(err);
    }

    /// Completed write payloads so far, in completion order
    pub fn written(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.borrow().written.clone()
    }

    /// Number of inbound reports not yet claimed by a read
    pub fn pending_reports(&self) -> usize {
        self.state.borrow().reports.len()
    }
}

struct LoopbackTransport {
    state: Rc<RefCell<LoopbackState>>,
}

impl UsbTransport for LoopbackTransport {
    fn open(&mut self, _vendor_id: u16, _product_id: u16) -> Result<usize, UsbError> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.open_fails.take() {
            return Err(err);
        }
        state.handles += 1;
        Ok(state.handles - 1)
    }

    fn open_interface(&mut self, handle_idx: usize, _interface: u8) -> Result<(), UsbError> {
        let state = self.state.borrow();
        if handle_idx >= state.handles {
            return Err(UsbError::NotFound);
        }
        Ok(())
    }

    fn drive(&mut self, node: &mut TransferNode) -> Option<TransferStatus> {
        if node.cancel_requested() {
            return Some(TransferStatus::Cancelled);
        }

        let mut state = self.state.borrow_mut();
        if let Some(status) = state.scripted.pop_front() {
            return Some(status);
        }

        match node.direction() {
            Direction::Read => {
                let slot = state
                    .reports
                    .iter()
                    .position(|(ep, _)| *ep == node.endpoint())?;
                let (_, data) = state.reports.remove(slot)?;
                let len = data.len().min(node.buffer().len());
                node.buffer_mut()[..len].copy_from_slice(&data[..len]);
                Some(TransferStatus::Complete(len))
            }
            Direction::Write => {
                if state.stall_writes {
                    return None;
                }
                let payload = (node.endpoint(), node.buffer().to_vec());
                state.written.push(payload);
                Some(TransferStatus::Complete(node.buffer().len()))
            }
        }
    }

    fn release(&mut self) {
        self.state.borrow_mut().handles = 0;
    }
}
