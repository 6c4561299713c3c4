//! In-process bus for host signals. Delivery order is emission order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::error::GuardError;
use crate::signal::events::{Signal, SignalEnvelope};

#[derive(Clone)]
pub struct SignalBus {
    sender: UnboundedSender<SignalEnvelope>,
    next_seq: Arc<AtomicU64>,
}

pub struct SignalReceiver {
    receiver: UnboundedReceiver<SignalEnvelope>,
}

impl SignalBus {
    pub fn new_pair() -> (Self, SignalReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                next_seq: Arc::new(AtomicU64::new(1)),
            },
            SignalReceiver { receiver },
        )
    }

    /// Fire-and-forget emission. Returns the assigned sequence number.
    pub fn emit(&self, signal: Signal) -> Result<u64, GuardError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        trace!(seq, kind = signal.kind(), "signal emitted");
        self.sender
            .send(SignalEnvelope::with_now(seq, signal))
            .map_err(|_| GuardError::BusClosed)?;
        Ok(seq)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl SignalReceiver {
    pub async fn recv(&mut self) -> Option<SignalEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SignalEnvelope> {
        self.receiver.try_recv().ok()
    }
}
