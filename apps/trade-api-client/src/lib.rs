#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trade API Client - Broker gRPC Binding
//!
//! A client for a broker's gRPC trading API: unary order, stop-order,
//! portfolio and instrument calls, plus a subscription multiplexer that
//! shares one long-lived bidirectional event stream across every
//! subscribe/unsubscribe command.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Request builders and stream vocabulary
//!   - `orders`: New orders, stop orders, query filters
//!   - `subscription`: Subscribe/unsubscribe commands
//!   - `streaming`: Event kinds and stream lifecycle
//!   - `instruments`: Exchange segments and directory entries
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `InstrumentSource`
//!   - `services`: `InstrumentDirectory`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `grpc`: Channel, wire conversions, `TradeApiClient`
//!   - `stream`: Command queue, handler table, multiplexer
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐     ┌─────────────┐
//! subscribe_*() ─►│ CommandQueue │────►│   writer    │────► GetEvents (out)
//!                 └──────────────┘     └─────────────┘
//!                 ┌──────────────┐     ┌─────────────┐
//! handlers ◄──────│   dispatch   │◄────│   reader    │◄──── GetEvents (in)
//!                 └──────────────┘     └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Request builders and stream types with no transport
/// dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::instruments::{Instrument, Market};
pub use domain::orders::{
    NewOrder, NewStop, OrderCondition, OrderConditionType, OrderFilter, OrderProperty, OrderSide,
    PortfolioContent, StopFilter, StopLoss, StopPrice, StopQuantity, TakeProfit, ValidBefore,
};
pub use domain::streaming::{EventKind, StreamState};
pub use domain::subscription::{
    CommandKind, OrderBookSubscription, OrderTradeSubscription, SubscriptionCommand,
};

// Application
pub use application::ports::{InstrumentSource, InstrumentSourceError};
pub use application::services::{DirectoryError, InstrumentDirectory};

// Infrastructure config
pub use infrastructure::config::{
    CallbackPanicPolicy, ClientConfig, ConfigError, Credentials, ShutdownPolicy, StreamSettings,
};

// Client
pub use infrastructure::grpc::{
    TradeApiClient, TradeApiError, client::new_request_id, proto, services,
};

// Event stream
pub use infrastructure::stream::{CommandQueue, QueueClosed, StreamError, StreamStats, StreamStatus};

// Metrics
pub use infrastructure::metrics::{init_metrics, install_exporter};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
