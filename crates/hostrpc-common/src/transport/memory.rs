use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{Transport, TransportEvent};
use crate::protocol::error::{HostRpcError, Result};

/// One end of an in-process transport pair.
///
/// Messages sent on one end arrive, in order, on the other end's inbound
/// stream. Closing either end closes both.
pub struct MemoryTransport {
    to_peer: UnboundedSender<TransportEvent>,
    to_self: UnboundedSender<TransportEvent>,
    inbound: Mutex<Option<UnboundedReceiver<TransportEvent>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Creates two cross-wired endpoints.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let left = MemoryTransport {
            to_peer: right_tx.clone(),
            to_self: left_tx.clone(),
            inbound: Mutex::new(Some(left_rx)),
            closed: closed.clone(),
        };
        let right = MemoryTransport {
            to_peer: left_tx,
            to_self: right_tx,
            inbound: Mutex::new(Some(right_rx)),
            closed,
        };

        (left, right)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn send_message(&self, message: String) -> Result<()> {
        if self.is_closed() {
            return Err(HostRpcError::Transport("memory transport is closed".into()));
        }
        self.to_peer
            .send(TransportEvent::Message(message))
            .map_err(|_| HostRpcError::Transport("peer endpoint dropped".into()))
    }

    fn incoming(&self) -> Result<UnboundedReceiver<TransportEvent>> {
        self.inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| HostRpcError::Transport("inbound stream already taken".into()))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Either side may already be gone; nothing left to notify then.
        let _ = self.to_peer.send(TransportEvent::Closed);
        let _ = self.to_self.send(TransportEvent::Closed);
    }
}
