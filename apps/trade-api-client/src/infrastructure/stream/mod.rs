//! Event Stream Multiplexer
//!
//! Shares one long-lived bidirectional `GetEvents` stream across every
//! subscribe/unsubscribe command and dispatches inbound events to user
//! handlers.
//!
//! # Architecture
//!
//! ```text
//! subscribe_*() ──► CommandQueue ──► writer task ──► mpsc ──► GetEvents (out)
//!                                                                  │
//! handlers ◄── dispatch ◄── reader loop ◄────────────── GetEvents (in)
//! ```
//!
//! The writer pulls from the queue with a bounded poll interval and stops
//! on cancellation, or, when draining, once the closed queue is empty. The
//! reader calls handlers synchronously on the background task; a slow
//! handler delays later events.

mod handlers;
mod monitor;
mod multiplexer;
mod queue;

pub use handlers::{Handler, HandlerSlot, HandlerTable, StatusSlot};
pub use monitor::{StreamMonitor, StreamStats};
pub use multiplexer::EventStream;
pub use queue::{CommandQueue, QueueClosed};

use crate::domain::streaming::EventKind;

/// Why the event stream failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The call or an inbound message failed with a gRPC status.
    #[error("event stream failed with {code:?}: {message}")]
    Rpc {
        /// gRPC status code.
        code: tonic::Code,
        /// Status message.
        message: String,
    },
    /// The broker ended the stream without a shutdown request.
    #[error("event stream closed by server")]
    ServerClosed,
    /// A handler panicked under the propagate policy.
    #[error("{kind:?} handler panicked: {message}")]
    HandlerPanicked {
        /// Event kind being dispatched.
        kind: EventKind,
        /// Panic message.
        message: String,
    },
}

impl From<tonic::Status> for StreamError {
    fn from(status: tonic::Status) -> Self {
        Self::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

/// Terminal status of the event stream, delivered to the status handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// Ended by shutdown.
    Closed,
    /// Ended by a transport error, a server close, or a handler panic.
    Failed(StreamError),
}

impl StreamStatus {
    /// Check whether the stream ended expectedly.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_to_stream_error() {
        let err = StreamError::from(tonic::Status::unavailable("connection refused"));
        assert_eq!(
            err,
            StreamError::Rpc {
                code: tonic::Code::Unavailable,
                message: "connection refused".to_string()
            }
        );
    }

    #[test]
    fn handler_panic_display() {
        let err = StreamError::HandlerPanicked {
            kind: EventKind::OrderBook,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "OrderBook handler panicked: boom");
        assert!(!StreamStatus::Failed(err).is_closed());
        assert!(StreamStatus::Closed.is_closed());
    }
}
