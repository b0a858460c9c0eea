//! Stream State Tracking

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::streaming::{EventKind, StreamState};
use crate::domain::subscription::CommandKind;
use crate::infrastructure::metrics;

/// Tracks the lifecycle and counters of one event stream.
#[derive(Debug, Default)]
pub struct StreamMonitor {
    state: RwLock<StreamState>,
    streaming_since: RwLock<Option<DateTime<Utc>>>,
    ended_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    commands_enqueued: AtomicU64,
    commands_sent: AtomicU64,
    commands_discarded: AtomicU64,
    order_book_events: AtomicU64,
    portfolio_events: AtomicU64,
    order_events: AtomicU64,
    trade_events: AtomicU64,
    response_events: AtomicU64,
    handler_panics: AtomicU64,
}

impl StreamMonitor {
    /// Create a monitor in the `Created` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stream state. Terminal states are final.
    pub fn set_state(&self, state: StreamState) {
        {
            let mut current = self.state.write();
            if current.is_terminal() {
                return;
            }
            *current = state;
        }
        match state {
            StreamState::Streaming => *self.streaming_since.write() = Some(Utc::now()),
            StreamState::Closed | StreamState::Failed => *self.ended_at.write() = Some(Utc::now()),
            StreamState::Created => {}
        }
        metrics::set_stream_state(state);
    }

    /// Record the failure message.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Get the current stream state.
    #[must_use]
    pub fn get_state(&self) -> StreamState {
        *self.state.read()
    }

    /// Increment the enqueued command counter.
    pub fn increment_enqueued(&self, kind: CommandKind) {
        self.commands_enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::record_command_enqueued(kind);
    }

    /// Increment the sent command counter.
    pub fn increment_sent(&self, kind: CommandKind) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
        metrics::record_command_sent(kind);
    }

    /// Add to the discarded command counter.
    pub fn add_discarded(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.commands_discarded.fetch_add(count, Ordering::Relaxed);
        metrics::record_commands_discarded(count);
    }

    /// Increment the received counter for an event kind.
    pub fn increment_event(&self, kind: EventKind) {
        let counter = match kind {
            EventKind::OrderBook => &self.order_book_events,
            EventKind::Portfolio => &self.portfolio_events,
            EventKind::Order => &self.order_events,
            EventKind::Trade => &self.trade_events,
            EventKind::Response => &self.response_events,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_received(kind);
    }

    /// Increment the handler panic counter.
    pub fn increment_panics(&self, kind: EventKind) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
        metrics::record_handler_panic(kind);
    }

    /// Take a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            state: self.get_state(),
            streaming_since: *self.streaming_since.read(),
            ended_at: *self.ended_at.read(),
            last_error: self.last_error.read().clone(),
            commands_enqueued: self.commands_enqueued.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_discarded: self.commands_discarded.load(Ordering::Relaxed),
            order_book_events: self.order_book_events.load(Ordering::Relaxed),
            portfolio_events: self.portfolio_events.load(Ordering::Relaxed),
            order_events: self.order_events.load(Ordering::Relaxed),
            trade_events: self.trade_events.load(Ordering::Relaxed),
            response_events: self.response_events.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a [`StreamMonitor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Lifecycle state.
    pub state: StreamState,
    /// When the background task started.
    pub streaming_since: Option<DateTime<Utc>>,
    /// When the stream reached a terminal state.
    pub ended_at: Option<DateTime<Utc>>,
    /// Failure message, if the stream failed.
    pub last_error: Option<String>,
    /// Commands accepted by the queue.
    pub commands_enqueued: u64,
    /// Commands written to the call's outbound buffer. Buffered commands
    /// are counted here even if the call never connects, so this is not
    /// proof of delivery to the broker.
    pub commands_sent: u64,
    /// Commands dropped at close.
    pub commands_discarded: u64,
    /// Order book events received.
    pub order_book_events: u64,
    /// Portfolio events received.
    pub portfolio_events: u64,
    /// Order events received.
    pub order_events: u64,
    /// Trade events received.
    pub trade_events: u64,
    /// Response events received.
    pub response_events: u64,
    /// Handler panics caught.
    pub handler_panics: u64,
}

impl StreamStats {
    /// Total events received across all kinds.
    #[must_use]
    pub const fn events_received(&self) -> u64 {
        self.order_book_events
            + self.portfolio_events
            + self.order_events
            + self.trade_events
            + self.response_events
    }
}
