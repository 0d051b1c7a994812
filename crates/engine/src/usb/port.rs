//! Per-device USB port
//!
//! A [`UsbPort`] owns one device's transport, its in-flight transfer
//! nodes, and its transfer counters. Drivers call `submit_read` and
//! `submit_write` from their poll/flush paths; the scheduler calls
//! `service` once per iteration to retire completed nodes.
//!
//! Every node is created by a submit and consumed exactly once inside
//! `service` (or the close drain), whatever its final status. The
//! in-flight list length therefore always equals the number of
//! submitted-but-not-retired transfers.

use crate::usb::node::{Direction, TransferKind, TransferNode};
use crate::usb::transport::UsbTransport;
use protocol::{TransferStatus, UsbError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// In-flight ceiling per device per direction
///
/// Bounds the memory a misbehaving or very chatty device can take and
/// keeps the in-flight walk cheap. Submits past the ceiling are dropped,
/// not failed; the caller retries on its next poll.
pub const MAX_INFLIGHT: usize = 10;

/// Connection handles one device may hold open
pub const MAX_HANDLES: usize = 4;

/// Transfer counters for one device
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    /// Reads currently in flight
    pub reads_inflight: usize,
    /// Writes currently in flight
    pub writes_inflight: usize,
    /// Transfers retired as cancelled
    pub cancelled: u64,
    /// Transfers retired as timed out
    pub timed_out: u64,
    /// Submits dropped at the in-flight ceiling
    pub dropped: u64,
}

/// One device's USB port: transport, in-flight nodes, counters
pub struct UsbPort {
    transport: Box<dyn UsbTransport>,
    nodes: Vec<TransferNode>,
    counters: Counters,
    handles: usize,
}

impl UsbPort {
    pub fn new(transport: Box<dyn UsbTransport>) -> Self {
        Self {
            transport,
            nodes: Vec::new(),
            counters: Counters::default(),
            handles: 0,
        }
    }

    /// Open a connection handle, returning its index
    pub fn open(&mut self, vendor_id: u16, product_id: u16) -> Result<usize, UsbError> {
        if self.handles == MAX_HANDLES {
            return Err(UsbError::Busy);
        }
        let idx = self.transport.open(vendor_id, product_id)?;
        self.handles += 1;
        Ok(idx)
    }

    /// Claim one interface on an opened handle
    pub fn open_interface(&mut self, handle_idx: usize, interface: u8) -> Result<(), UsbError> {
        self.transport.open_interface(handle_idx, interface)
    }

    /// Submit a non-blocking interrupt read of up to `size` bytes
    ///
    /// Returns `size` on submission and 0 when the read ceiling is
    /// reached. The transfer has no timeout of its own: it stays in
    /// flight until data arrives or the port closes. Delivery happens on
    /// a later `service` call.
    pub fn submit_read(&mut self, handle_idx: usize, endpoint: u8, size: usize) -> usize {
        if self.counters.reads_inflight == MAX_INFLIGHT {
            self.counters.dropped += 1;
            trace!("read ceiling reached on endpoint {endpoint:#04x}, dropping submit");
            return 0;
        }
        self.nodes.push(TransferNode::read(
            TransferKind::Interrupt,
            handle_idx,
            endpoint,
            size,
        ));
        self.counters.reads_inflight += 1;
        size
    }

    /// Submit a non-blocking interrupt write
    ///
    /// The returned length is optimistic: completion is asynchronous and
    /// a later failure surfaces through the fault path, not here.
    pub fn submit_interrupt_write(&mut self, handle_idx: usize, endpoint: u8, data: &[u8]) -> usize {
        self.submit_write(TransferKind::Interrupt, handle_idx, endpoint, data)
    }

    /// Submit a non-blocking bulk write (screen pixel pushes)
    pub fn submit_bulk_write(&mut self, handle_idx: usize, endpoint: u8, data: &[u8]) -> usize {
        self.submit_write(TransferKind::Bulk, handle_idx, endpoint, data)
    }

    fn submit_write(
        &mut self,
        kind: TransferKind,
        handle_idx: usize,
        endpoint: u8,
        data: &[u8],
    ) -> usize {
        if self.counters.writes_inflight == MAX_INFLIGHT {
            self.counters.dropped += 1;
            trace!("write ceiling reached on endpoint {endpoint:#04x}, dropping submit");
            return 0;
        }
        self.nodes
            .push(TransferNode::write(kind, handle_idx, endpoint, data));
        self.counters.writes_inflight += 1;
        data.len()
    }

    /// Retire every node the transport reports as finished
    ///
    /// Completed reads with a non-empty payload are handed to `on_read`
    /// as `(endpoint, bytes)`; zero-length reads are not forwarded.
    /// Timeouts and cancellations are counted and dropped. Returns the
    /// first fatal fault, after all retireable nodes have been reaped;
    /// the caller banishes the device on `Err`.
    pub fn service(&mut self, mut on_read: impl FnMut(u8, &[u8])) -> Result<(), UsbError> {
        let mut fatal: Option<UsbError> = None;
        let mut i = 0;
        while i < self.nodes.len() {
            let Some(status) = self.transport.drive(&mut self.nodes[i]) else {
                i += 1;
                continue;
            };
            let node = self.nodes.remove(i);
            match node.direction() {
                Direction::Read => self.counters.reads_inflight -= 1,
                Direction::Write => self.counters.writes_inflight -= 1,
            }
            match status {
                TransferStatus::Complete(len) => {
                    if node.direction() == Direction::Read && len > 0 {
                        let len = len.min(node.buffer().len());
                        on_read(node.endpoint(), &node.buffer()[..len]);
                    }
                }
                TransferStatus::TimedOut => self.counters.timed_out += 1,
                TransferStatus::Cancelled => self.counters.cancelled += 1,
                TransferStatus::Failed(err) => {
                    warn!(
                        "transfer failed on endpoint {:#04x}: {err}",
                        node.endpoint()
                    );
                    fatal.get_or_insert(err);
                }
            }
            // The node (and its buffer) is dropped here, its single
            // release point.
        }
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Request cancellation of every in-flight node
    pub fn cancel_all(&mut self) {
        for node in &mut self.nodes {
            node.request_cancel();
        }
    }

    /// Cancel reads, give writes a bounded chance to drain, release
    ///
    /// Pending writes at close time are typically "all lights off"
    /// packets, so they get up to `drain` to finish before being
    /// cancelled themselves. Still-outstanding writes past the bound are
    /// logged, not failed.
    pub fn close(&mut self, drain: Duration) {
        for node in &mut self.nodes {
            if node.direction() == Direction::Read {
                node.request_cancel();
            }
        }

        let deadline = Instant::now() + drain;
        loop {
            let _ = self.service(|_, _| {});
            if self.counters.writes_inflight == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    "{} write transfer(s) still outstanding at close, cancelling",
                    self.counters.writes_inflight
                );
                self.cancel_all();
                let _ = self.service(|_, _| {});
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        debug!("port closed, {} handle(s) released", self.handles);
        self.transport.release();
        self.handles = 0;
    }

    /// Number of submitted-but-not-retired transfers
    pub fn in_flight(&self) -> usize {
        self.nodes.len()
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }
}
