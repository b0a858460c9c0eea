//! Event Stream Types
//!
//! Classification of inbound events and the lifecycle of the event stream.

use serde::Serialize;

/// Kind of inbound event, named after the populated payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Order book snapshot.
    OrderBook,
    /// Portfolio snapshot.
    Portfolio,
    /// Order state change.
    Order,
    /// Trade execution.
    Trade,
    /// Acknowledgement of a subscription request.
    Response,
}

impl EventKind {
    /// Get all event kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::OrderBook,
            Self::Portfolio,
            Self::Order,
            Self::Trade,
            Self::Response,
        ]
    }

    /// Get the label for this event kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderBook => "order_book",
            Self::Portfolio => "portfolio",
            Self::Order => "order",
            Self::Trade => "trade",
            Self::Response => "response",
        }
    }
}

/// Lifecycle state of the event stream.
///
/// ```text
/// Created ──► Streaming ──► Closed
///                  │
///                  └──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Client constructed, background task not yet running.
    #[default]
    Created,
    /// Background task owns a live (or connecting) stream.
    Streaming,
    /// Stream ended by caller-initiated shutdown.
    Closed,
    /// Stream ended by a transport error or a server-side close.
    Failed,
}

impl StreamState {
    /// Check if the stream has terminated, expectedly or not.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    /// Numeric encoding used for the stream state gauge.
    #[must_use]
    pub const fn as_gauge(&self) -> f64 {
        match self {
            Self::Created => 0.0,
            Self::Streaming => 1.0,
            Self::Closed => 2.0,
            Self::Failed => 3.0,
        }
    }
}
