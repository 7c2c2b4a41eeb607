use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use apoxcan_frame::ProtocolError;
use serde::Serialize;
use tracing::trace;

use crate::error::MessageError;
use crate::message::{BoardMessage, CanBusMessage};

/// Where a queued error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Framing violation seen by the frame reader.
    Protocol,
    /// A valid frame that could not be decoded into a message.
    Message,
    /// The device read failed.
    Transport,
}

/// An error reported by the ingestion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEvent {
    pub source: ErrorSource,
    pub message: String,
    /// Offending byte, for protocol errors raised by a specific byte.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte: Option<u8>,
}

impl ErrorEvent {
    pub fn protocol(err: &ProtocolError) -> Self {
        Self {
            source: ErrorSource::Protocol,
            message: format!("Error reading USB data: {err}"),
            byte: err.byte(),
        }
    }

    pub fn message(err: &MessageError) -> Self {
        Self {
            source: ErrorSource::Message,
            message: format!("Error decoding frame: {err}"),
            byte: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            source: ErrorSource::Transport,
            message: message.into(),
            byte: None,
        }
    }
}

/// Anything delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Error(ErrorEvent),
    Board(BoardMessage),
    CanBus(CanBusMessage),
}

/// Receives drained events, one at a time, outside any queue lock.
///
/// Every method defaults to ignoring the event. Closures taking an [`Event`]
/// implement this trait too.
pub trait EventHandler {
    fn on_error(&mut self, _error: ErrorEvent) {}
    fn on_board_message(&mut self, _message: BoardMessage) {}
    fn on_can_bus_message(&mut self, _message: CanBusMessage) {}
}

impl<F: FnMut(Event)> EventHandler for F {
    fn on_error(&mut self, error: ErrorEvent) {
        self(Event::Error(error));
    }

    fn on_board_message(&mut self, message: BoardMessage) {
        self(Event::Board(message));
    }

    fn on_can_bus_message(&mut self, message: CanBusMessage) {
        self(Event::CanBus(message));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// FIFO queue with an arrival condition for waiters looking for one item.
#[derive(Debug)]
struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    arrived: Condvar,
}

impl<T> Queue<T> {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            arrived: Condvar::new(),
        }
    }

    /// Append an item. Returns true if the queue was empty before.
    fn push(&self, item: T) -> bool {
        let mut items = lock(&self.items);
        let was_empty = items.is_empty();
        items.push_back(item);
        drop(items);
        self.arrived.notify_all();
        was_empty
    }

    fn drain(&self) -> VecDeque<T> {
        std::mem::take(&mut *lock(&self.items))
    }

    fn len(&self) -> usize {
        lock(&self.items).len()
    }

    fn clear(&self) {
        lock(&self.items).clear();
    }

    fn take_matching(&self, mut predicate: impl FnMut(&T) -> bool, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut items = lock(&self.items);
        loop {
            if let Some(pos) = items.iter().position(&mut predicate) {
                return items.remove(pos);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            items = self
                .arrived
                .wait_timeout(items, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Edge-triggered wakeup shared by all queues.
#[derive(Debug)]
struct Signal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn raise(&self) {
        let mut pending = lock(&self.pending);
        if !*pending {
            *pending = true;
            self.cond.notify_all();
        }
    }

    /// Wait until raised or timed out, then clear. Returns true if raised.
    fn wait(&self, timeout: Duration) -> bool {
        let pending = lock(&self.pending);
        let (mut pending, _) = self
            .cond
            .wait_timeout_while(pending, timeout, |pending| !*pending)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }
}

/// Hands decoded messages and errors from the ingestion thread to a consumer.
///
/// Errors, board messages and CAN-bus messages each have their own queue,
/// ordered by arrival. There is no ordering across queues.
#[derive(Debug)]
pub struct Dispatcher {
    errors: Queue<ErrorEvent>,
    board: Queue<BoardMessage>,
    can_bus: Queue<CanBusMessage>,
    signal: Signal,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            errors: Queue::new(),
            board: Queue::new(),
            can_bus: Queue::new(),
            signal: Signal::new(),
        }
    }

    pub fn push_error(&self, error: ErrorEvent) {
        trace!(source = ?error.source, "queued error");
        if self.errors.push(error) {
            self.signal.raise();
        }
    }

    pub fn push_board(&self, message: BoardMessage) {
        trace!(id = message.id, command = message.command, "queued board message");
        if self.board.push(message) {
            self.signal.raise();
        }
    }

    pub fn push_can_bus(&self, message: CanBusMessage) {
        trace!(id = message.id, len = message.data.len(), "queued CAN-bus message");
        if self.can_bus.push(message) {
            self.signal.raise();
        }
    }

    /// Block until something was queued since the last wait, or until `timeout`.
    ///
    /// A wakeup does not guarantee a non-empty queue; drain and re-check.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.signal.wait(timeout)
    }

    pub fn drain_errors(&self) -> Vec<ErrorEvent> {
        self.errors.drain().into()
    }

    pub fn drain_board(&self) -> Vec<BoardMessage> {
        self.board.drain().into()
    }

    pub fn drain_can_bus(&self) -> Vec<CanBusMessage> {
        self.can_bus.drain().into()
    }

    /// Drain every queue into `handler`: errors, then board, then CAN-bus.
    ///
    /// Returns the number of events delivered.
    pub fn dispatch<H: EventHandler + ?Sized>(&self, handler: &mut H) -> usize {
        let mut delivered = 0;
        for error in self.errors.drain() {
            handler.on_error(error);
            delivered += 1;
        }
        for message in self.board.drain() {
            handler.on_board_message(message);
            delivered += 1;
        }
        for message in self.can_bus.drain() {
            handler.on_can_bus_message(message);
            delivered += 1;
        }
        delivered
    }

    /// Dispatch whatever is queued, waiting up to `timeout` for something to arrive.
    pub fn poll<H: EventHandler + ?Sized>(&self, timeout: Duration, handler: &mut H) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let delivered = self.dispatch(handler);
            if delivered > 0 {
                return delivered;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.signal.wait(remaining) {
                return 0;
            }
        }
    }

    /// Remove the first board message matching `predicate`, waiting up to
    /// `timeout` for one to arrive. Other messages stay queued in order.
    pub fn take_board_matching(
        &self,
        predicate: impl FnMut(&BoardMessage) -> bool,
        timeout: Duration,
    ) -> Option<BoardMessage> {
        self.board.take_matching(predicate, timeout)
    }

    pub fn error_len(&self) -> usize {
        self.errors.len()
    }

    pub fn board_len(&self) -> usize {
        self.board.len()
    }

    pub fn can_bus_len(&self) -> usize {
        self.can_bus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.error_len() == 0 && self.board_len() == 0 && self.can_bus_len() == 0
    }

    /// Drop everything queued.
    pub fn clear(&self) {
        self.errors.clear();
        self.board.clear();
        self.can_bus.clear();
    }
}
