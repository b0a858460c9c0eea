//! Subscription Commands
//!
//! Domain types for the commands multiplexed onto the event stream.
//!
//! # Design
//!
//! A command is immutable once built. The broker tracks subscriptions by
//! request id, so the client never deduplicates or merges commands: two
//! identical subscribe calls produce two commands on the wire, in order.

use serde::Serialize;

// =============================================================================
// Command Payloads
// =============================================================================

/// Order book filter: one instrument on one board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBookSubscription {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Instrument ticker (e.g. `SBER`).
    pub security_code: String,
    /// Trading board (e.g. `TQBR`).
    pub security_board: String,
}

impl OrderBookSubscription {
    /// Create a new order book filter.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        security_code: impl Into<String>,
        security_board: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            security_code: security_code.into(),
            security_board: security_board.into(),
        }
    }
}

/// Order and trade filter over a set of trading accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTradeSubscription {
    /// Caller-supplied request identifier.
    pub request_id: String,
    /// Trading account identifiers.
    pub client_ids: Vec<String>,
    /// Include trade events.
    pub include_trades: bool,
    /// Include order events.
    pub include_orders: bool,
}

impl OrderTradeSubscription {
    /// Create a new order/trade filter.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        client_ids: Vec<String>,
        include_trades: bool,
        include_orders: bool,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            client_ids,
            include_trades,
            include_orders,
        }
    }
}

// =============================================================================
// Subscription Command
// =============================================================================

/// A subscribe or unsubscribe command for the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SubscriptionCommand {
    /// Start receiving order book snapshots for an instrument.
    SubscribeOrderBook(OrderBookSubscription),
    /// Stop receiving order book snapshots for an instrument.
    UnsubscribeOrderBook(OrderBookSubscription),
    /// Start receiving order and/or trade events for accounts.
    SubscribeOrderTrade(OrderTradeSubscription),
    /// Cancel every previous order/trade subscription.
    UnsubscribeOrderTrade {
        /// Caller-supplied request identifier.
        request_id: String,
    },
}

impl SubscriptionCommand {
    /// Get the request identifier carried by the command.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::SubscribeOrderBook(sub) | Self::UnsubscribeOrderBook(sub) => &sub.request_id,
            Self::SubscribeOrderTrade(sub) => &sub.request_id,
            Self::UnsubscribeOrderTrade { request_id } => request_id,
        }
    }

    /// Get the command kind.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::SubscribeOrderBook(_) => CommandKind::SubscribeOrderBook,
            Self::UnsubscribeOrderBook(_) => CommandKind::UnsubscribeOrderBook,
            Self::SubscribeOrderTrade(_) => CommandKind::SubscribeOrderTrade,
            Self::UnsubscribeOrderTrade { .. } => CommandKind::UnsubscribeOrderTrade,
        }
    }
}

/// Discriminant of [`SubscriptionCommand`], used for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Order book subscribe.
    SubscribeOrderBook,
    /// Order book unsubscribe.
    UnsubscribeOrderBook,
    /// Order/trade subscribe.
    SubscribeOrderTrade,
    /// Order/trade unsubscribe.
    UnsubscribeOrderTrade,
}

impl CommandKind {
    /// Get the label for this command kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SubscribeOrderBook => "subscribe_order_book",
            Self::UnsubscribeOrderBook => "unsubscribe_order_book",
            Self::SubscribeOrderTrade => "subscribe_order_trade",
            Self::UnsubscribeOrderTrade => "unsubscribe_order_trade",
        }
    }
}
