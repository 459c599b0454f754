//! Outbound write serialization.
//!
//! [`OutboundQueue`] is the sans-IO core: a FIFO of formatted lines plus a
//! single in-flight flag, both behind one mutex. Transmission is driven by
//! two independent triggers — write completion and the periodic keepalive
//! tick — and both funnel through [`OutboundQueue::try_begin`], so a line
//! can never be handed to the transport twice and FIFO order is preserved.
//!
//! [`OutboundHandle`] is the cloneable submit side used by handlers and
//! channel operations. It refuses sends while no transport is attached and
//! wakes the writer task through a [`Notify`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::{EngineError, Result};

#[derive(Debug, Default)]
struct QueueState {
    in_flight: bool,
    pending: VecDeque<String>,
}

/// FIFO of outbound lines with a single in-flight slot.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line to the tail of the queue.
    pub fn push(&self, line: String) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.pending.push_back(line);
    }

    /// Claim the next line for transmission.
    ///
    /// Returns `None` when a write is already in flight or the queue is
    /// empty. On `Some`, the caller owns the transmission and must call
    /// [`complete`](Self::complete) when it finishes. Any number of
    /// triggers may race on this; the flag admits exactly one.
    pub fn try_begin(&self) -> Option<String> {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        if state.in_flight {
            return None;
        }
        let line = state.pending.pop_front()?;
        state.in_flight = true;
        Some(line)
    }

    /// Mark the in-flight transmission finished.
    pub fn complete(&self) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.in_flight = false;
    }

    /// Number of lines waiting (excluding any in-flight line).
    pub fn len(&self) -> usize {
        self.state.lock().expect("queue mutex poisoned").pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a line is currently being transmitted.
    pub fn in_flight(&self) -> bool {
        self.state.lock().expect("queue mutex poisoned").in_flight
    }

    /// Drop all pending lines. Used on teardown.
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock().expect("queue mutex poisoned");
        state.pending.clear();
        state.in_flight = false;
    }
}

/// Cloneable submit side of a session's outbound queue.
#[derive(Clone, Debug)]
pub struct OutboundHandle {
    queue: Arc<OutboundQueue>,
    notify: Arc<Notify>,
    connected: Arc<AtomicBool>,
}

impl OutboundHandle {
    pub(crate) fn new() -> Self {
        Self {
            queue: Arc::new(OutboundQueue::new()),
            notify: Arc::new(Notify::new()),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Submit one fully formatted protocol line for transmission.
    ///
    /// Lines are transmitted in submission order. Fails with
    /// [`EngineError::NotConnected`] while no transport is attached rather
    /// than queuing indefinitely.
    pub fn send_line(&self, line: impl Into<String>) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(EngineError::NotConnected);
        }
        self.queue.push(line.into());
        self.notify.notify_one();
        Ok(())
    }

    /// Whether a transport is currently attached.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    pub(crate) fn notify(&self) -> &Arc<Notify> {
        &self.notify
    }

    pub(crate) fn connected_flag(&self) -> &Arc<AtomicBool> {
        &self.connected
    }

    pub(crate) fn attach(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn detach(&self) {
        self.connected.store(false, Ordering::Release);
        self.queue.clear();
        self.notify.notify_one();
    }
}
