//! Handler Table
//!
//! One replaceable handler per event kind. Each slot holds an `Arc` behind a
//! lock; dispatch clones the `Arc` and releases the lock before calling, so a
//! handler may replace itself (or any other) without deadlocking.
//!
//! The status slot also remembers the terminal status, so a handler
//! registered after the stream ended still hears how it ended.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::StreamStatus;
use crate::infrastructure::grpc::proto;

/// A user event handler.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A single handler slot; defaults to a no-op.
pub struct HandlerSlot<E: 'static> {
    handler: RwLock<Handler<E>>,
}

impl<E: 'static> HandlerSlot<E> {
    fn noop() -> Handler<E> {
        Arc::new(|_: &E| {})
    }

    /// Create a slot holding the no-op handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handler: RwLock::new(Self::noop()),
        }
    }

    /// Replace the handler. The previous one is dropped once in-flight calls
    /// finish.
    pub fn set(&self, handler: Handler<E>) {
        *self.handler.write() = handler;
    }

    /// Restore the no-op handler.
    pub fn clear(&self) {
        self.set(Self::noop());
    }

    /// Snapshot the current handler.
    #[must_use]
    pub fn get(&self) -> Handler<E> {
        Arc::clone(&self.handler.read())
    }

    /// Call the current handler, catching any panic it raises.
    ///
    /// # Errors
    ///
    /// Returns the panic message if the handler panicked.
    pub fn invoke(&self, event: &E) -> Result<(), String> {
        call(&self.get(), event)
    }
}

impl<E: 'static> Default for HandlerSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> std::fmt::Debug for HandlerSlot<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSlot").finish_non_exhaustive()
    }
}

fn call<E>(handler: &Handler<E>, event: &E) -> Result<(), String> {
    catch_unwind(AssertUnwindSafe(|| handler(event))).map_err(|payload| panic_message(&*payload))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Status handler slot that keeps the terminal status once reported.
///
/// Each registered handler sees the terminal status at most once: either
/// from [`complete`](Self::complete), or replayed by [`set`](Self::set) if
/// the stream had already ended.
#[derive(Debug, Default)]
pub struct StatusSlot {
    slot: HandlerSlot<StreamStatus>,
    terminal: Mutex<Option<StreamStatus>>,
}

impl StatusSlot {
    /// Replace the handler, calling it at once if the stream already ended.
    ///
    /// # Errors
    ///
    /// Returns the panic message if the replayed call panicked.
    pub fn set(&self, handler: Handler<StreamStatus>) -> Result<(), String> {
        let terminal = {
            let terminal = self.terminal.lock();
            self.slot.set(Arc::clone(&handler));
            terminal.clone()
        };
        terminal.map_or(Ok(()), |status| call(&handler, &status))
    }

    /// Restore the no-op handler. The terminal status is kept.
    pub fn clear(&self) {
        self.slot.clear();
    }

    /// Record the terminal status and report it to the current handler.
    /// Only the first call has any effect.
    ///
    /// # Errors
    ///
    /// Returns the panic message if the handler panicked.
    pub fn complete(&self, status: &StreamStatus) -> Result<(), String> {
        let handler = {
            let mut terminal = self.terminal.lock();
            if terminal.is_some() {
                return Ok(());
            }
            *terminal = Some(status.clone());
            self.slot.get()
        };
        call(&handler, status)
    }

    /// Terminal status, once the stream has ended.
    #[must_use]
    pub fn terminal(&self) -> Option<StreamStatus> {
        self.terminal.lock().clone()
    }
}

/// Handlers for every inbound event kind plus stream status.
#[derive(Debug, Default)]
pub struct HandlerTable {
    /// Order book snapshots.
    pub order_book: HandlerSlot<proto::OrderBookEvent>,
    /// Portfolio snapshots.
    pub portfolio: HandlerSlot<proto::PortfolioEvent>,
    /// Order state changes.
    pub order: HandlerSlot<proto::OrderEvent>,
    /// Trade executions.
    pub trade: HandlerSlot<proto::TradeEvent>,
    /// Subscription acknowledgements.
    pub response: HandlerSlot<proto::ResponseEvent>,
    /// Terminal stream status.
    pub status: StatusSlot,
}

impl HandlerTable {
    /// Create a table of no-op handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore every slot to the no-op handler.
    pub fn clear(&self) {
        self.order_book.clear();
        self.portfolio.clear();
        self.order.clear();
        self.trade.clear();
        self.response.clear();
        self.status.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::infrastructure::stream::StreamError;

    #[test]
    fn default_handler_is_noop() {
        let slot: HandlerSlot<u32> = HandlerSlot::new();
        assert!(slot.invoke(&1).is_ok());
    }

    #[test]
    fn replacing_discards_previous_handler() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let slot: HandlerSlot<u32> = HandlerSlot::new();

        let counter = Arc::clone(&first);
        slot.set(Arc::new(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        slot.invoke(&1).unwrap();

        let counter = Arc::clone(&second);
        slot.set(Arc::new(move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        slot.invoke(&2).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_is_caught_with_message() {
        let slot: HandlerSlot<u32> = HandlerSlot::new();
        slot.set(Arc::new(|value: &u32| {
            assert!(*value != 7, "bad value {value}");
        }));
        assert_eq!(slot.invoke(&7).unwrap_err(), "bad value 7");
    }

    #[test]
    fn handler_may_replace_itself() {
        let slot = Arc::new(HandlerSlot::<u32>::new());
        let inner = Arc::clone(&slot);
        slot.set(Arc::new(move |_: &u32| inner.clear()));
        slot.invoke(&1).unwrap();
        slot.invoke(&2).unwrap();
    }

    #[test]
    fn clear_resets_all_slots() {
        let calls = Arc::new(AtomicUsize::new(0));
        let table = HandlerTable::new();
        let counter = Arc::clone(&calls);
        table.portfolio.set(Arc::new(move |_: &proto::PortfolioEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        table.clear();
        table.portfolio.invoke(&proto::PortfolioEvent::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    fn recording_status_handler() -> (Handler<StreamStatus>, Arc<Mutex<Vec<StreamStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: Handler<StreamStatus> = Arc::new(move |status: &StreamStatus| {
            sink.lock().push(status.clone());
        });
        (handler, seen)
    }

    #[test]
    fn status_reported_once_to_current_handler() {
        let slot = StatusSlot::default();
        let (handler, seen) = recording_status_handler();
        slot.set(handler).unwrap();

        slot.complete(&StreamStatus::Closed).unwrap();
        slot.complete(&StreamStatus::Failed(StreamError::ServerClosed)).unwrap();

        assert_eq!(*seen.lock(), vec![StreamStatus::Closed]);
        assert_eq!(slot.terminal(), Some(StreamStatus::Closed));
    }

    #[test]
    fn late_status_handler_hears_terminal_status() {
        let slot = StatusSlot::default();
        slot.complete(&StreamStatus::Failed(StreamError::ServerClosed)).unwrap();

        let (handler, seen) = recording_status_handler();
        slot.set(handler).unwrap();
        assert_eq!(
            *seen.lock(),
            vec![StreamStatus::Failed(StreamError::ServerClosed)]
        );
    }

    #[test]
    fn status_handler_unset_before_end_hears_nothing() {
        let slot = StatusSlot::default();
        assert!(slot.set(Arc::new(|_: &StreamStatus| {})).is_ok());
        assert_eq!(slot.terminal(), None);

        let (handler, seen) = recording_status_handler();
        slot.set(handler).unwrap();
        slot.clear();
        slot.complete(&StreamStatus::Closed).unwrap();
        assert!(seen.lock().is_empty());
    }
}
