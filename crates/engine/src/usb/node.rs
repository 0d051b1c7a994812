//! Transfer node bookkeeping
//!
//! A [`TransferNode`] is one in-flight asynchronous USB operation. The node
//! owns its data buffer, so node and buffer live and die together: created
//! when the transfer is submitted, dropped exactly once inside completion
//! servicing, whatever the outcome.

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to host
    Read,
    /// Host to device
    Write,
}

/// USB transfer type used for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Interrupt endpoint (HID reports, light state)
    Interrupt,
    /// Bulk endpoint (screen pixel pushes)
    Bulk,
}

/// One outstanding non-blocking read or write
#[derive(Debug)]
pub struct TransferNode {
    dir: Direction,
    kind: TransferKind,
    handle_idx: usize,
    endpoint: u8,
    buf: Vec<u8>,
    cancel: bool,
}

impl TransferNode {
    /// Node for a pending read of up to `size` bytes
    pub fn read(kind: TransferKind, handle_idx: usize, endpoint: u8, size: usize) -> Self {
        Self {
            dir: Direction::Read,
            kind,
            handle_idx,
            endpoint,
            buf: vec![0u8; size],
            cancel: false,
        }
    }

    /// Node carrying `data` out to the device
    pub fn write(kind: TransferKind, handle_idx: usize, endpoint: u8, data: &[u8]) -> Self {
        Self {
            dir: Direction::Write,
            kind,
            handle_idx,
            endpoint,
            buf: data.to_vec(),
            cancel: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.dir
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn handle_idx(&self) -> usize {
        self.handle_idx
    }

    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    /// The node's buffer: capacity for reads, payload for writes
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Ask the transport to retire this node on its next drive step
    pub fn request_cancel(&mut self) {
        self.cancel = true;
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel
    }
}
