//! Trade API Client
//!
//! Public façade over the broker's unary services and the multiplexed event
//! stream.
//!
//! # Lifecycle
//!
//! [`TradeApiClient::new`] builds a lazily connected channel and starts the
//! event stream task immediately; nothing touches the network until the
//! first call. [`TradeApiClient::shutdown`] stops the stream and rejects
//! every later call with [`TradeApiError::Closed`]. Dropping the client
//! without calling `shutdown` cancels the stream without waiting.
//!
//! # Example
//!
//! ```no_run
//! use trade_api_client::{ClientConfig, TradeApiClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TradeApiClient::new(ClientConfig::from_env()?)?;
//! client.set_order_book_handler(|book| {
//!     println!("{} asks, {} bids", book.asks.len(), book.bids.len());
//! });
//! client.subscribe_order_book("book-1", "SBER", "TQBR")?;
//! tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::runtime::Handle;

use super::channel::{AuthInterceptor, AuthedChannel, build_channel};
use super::convert;
use super::error::TradeApiError;
use super::proto;
use super::services::{
    self, events_client::EventsClient, orders_client::OrdersClient,
    portfolios_client::PortfoliosClient, securities_client::SecuritiesClient,
    stops_client::StopsClient,
};
use crate::application::ports::{InstrumentSource, InstrumentSourceError};
use crate::domain::instruments::Instrument;
use crate::domain::orders::{NewOrder, NewStop, OrderFilter, PortfolioContent, StopFilter};
use crate::domain::streaming::StreamState;
use crate::domain::subscription::{
    OrderBookSubscription, OrderTradeSubscription, SubscriptionCommand,
};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics::{self, CallOutcome};
use crate::infrastructure::stream::{EventStream, StreamStats, StreamStatus};

/// Generate a random request identifier for subscription commands.
#[must_use]
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Client for the broker's trade API.
pub struct TradeApiClient {
    orders: OrdersClient<AuthedChannel>,
    stops: StopsClient<AuthedChannel>,
    portfolios: PortfoliosClient<AuthedChannel>,
    securities: SecuritiesClient<AuthedChannel>,
    stream: EventStream,
    closed: AtomicBool,
}

impl std::fmt::Debug for TradeApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeApiClient")
            .field("stream_state", &self.stream.state())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl TradeApiClient {
    /// Create a client and start its event stream.
    ///
    /// Must be called from within a Tokio runtime. Does not wait for the
    /// connection; an unreachable endpoint surfaces as errors on later calls
    /// and as a failed stream status.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no runtime, the endpoint is invalid, or
    /// the access token cannot be sent as metadata.
    pub fn new(config: ClientConfig) -> Result<Self, TradeApiError> {
        let runtime = Handle::try_current().map_err(|_| TradeApiError::NoRuntime)?;
        let interceptor = AuthInterceptor::new(config.credentials.access_token())?;
        let channel = build_channel(&config)?;

        let events = EventsClient::with_interceptor(channel.clone(), interceptor.clone());
        let stream = EventStream::start(&runtime, events, config.stream.clone());

        tracing::info!(endpoint = %config.endpoint, "Trade API client created");

        Ok(Self {
            orders: OrdersClient::with_interceptor(channel.clone(), interceptor.clone()),
            stops: StopsClient::with_interceptor(channel.clone(), interceptor.clone()),
            portfolios: PortfoliosClient::with_interceptor(channel.clone(), interceptor.clone()),
            securities: SecuritiesClient::with_interceptor(channel, interceptor),
            stream,
            closed: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Event Subscriptions
    // =========================================================================

    fn enqueue(&self, command: SubscriptionCommand) -> Result<(), TradeApiError> {
        self.ensure_open()?;
        self.stream
            .enqueue(command)
            .map_err(|_| TradeApiError::Closed)
    }

    /// Subscribe to order book snapshots for an instrument.
    ///
    /// # Errors
    ///
    /// Returns [`TradeApiError::Closed`] after shutdown or once the stream
    /// has ended.
    pub fn subscribe_order_book(
        &self,
        request_id: impl Into<String>,
        security_code: impl Into<String>,
        security_board: impl Into<String>,
    ) -> Result<(), TradeApiError> {
        self.enqueue(SubscriptionCommand::SubscribeOrderBook(
            OrderBookSubscription::new(request_id, security_code, security_board),
        ))
    }

    /// Unsubscribe from order book snapshots for an instrument.
    ///
    /// # Errors
    ///
    /// Returns [`TradeApiError::Closed`] after shutdown or once the stream
    /// has ended.
    pub fn unsubscribe_order_book(
        &self,
        request_id: impl Into<String>,
        security_code: impl Into<String>,
        security_board: impl Into<String>,
    ) -> Result<(), TradeApiError> {
        self.enqueue(SubscriptionCommand::UnsubscribeOrderBook(
            OrderBookSubscription::new(request_id, security_code, security_board),
        ))
    }

    /// Subscribe to order and/or trade events for trading accounts.
    ///
    /// # Errors
    ///
    /// Returns [`TradeApiError::Closed`] after shutdown or once the stream
    /// has ended.
    pub fn subscribe_order_trade(
        &self,
        request_id: impl Into<String>,
        client_ids: Vec<String>,
        include_trades: bool,
        include_orders: bool,
    ) -> Result<(), TradeApiError> {
        self.enqueue(SubscriptionCommand::SubscribeOrderTrade(
            OrderTradeSubscription::new(request_id, client_ids, include_trades, include_orders),
        ))
    }

    /// Cancel every order/trade subscription.
    ///
    /// # Errors
    ///
    /// Returns [`TradeApiError::Closed`] after shutdown or once the stream
    /// has ended.
    pub fn unsubscribe_order_trade(
        &self,
        request_id: impl Into<String>,
    ) -> Result<(), TradeApiError> {
        self.enqueue(SubscriptionCommand::UnsubscribeOrderTrade {
            request_id: request_id.into(),
        })
    }

    // =========================================================================
    // Event Handlers
    // =========================================================================

    /// Replace the order book handler.
    pub fn set_order_book_handler(
        &self,
        handler: impl Fn(&proto::OrderBookEvent) + Send + Sync + 'static,
    ) {
        self.stream.handlers().order_book.set(Arc::new(handler));
    }

    /// Replace the portfolio handler.
    pub fn set_portfolio_handler(
        &self,
        handler: impl Fn(&proto::PortfolioEvent) + Send + Sync + 'static,
    ) {
        self.stream.handlers().portfolio.set(Arc::new(handler));
    }

    /// Replace the order handler.
    pub fn set_order_handler(&self, handler: impl Fn(&proto::OrderEvent) + Send + Sync + 'static) {
        self.stream.handlers().order.set(Arc::new(handler));
    }

    /// Replace the trade handler.
    pub fn set_trade_handler(&self, handler: impl Fn(&proto::TradeEvent) + Send + Sync + 'static) {
        self.stream.handlers().trade.set(Arc::new(handler));
    }

    /// Replace the subscription acknowledgement handler.
    pub fn set_response_handler(
        &self,
        handler: impl Fn(&proto::ResponseEvent) + Send + Sync + 'static,
    ) {
        self.stream.handlers().response.set(Arc::new(handler));
    }

    /// Replace the handler called once when the stream ends.
    ///
    /// If the stream has already ended, the handler is called before this
    /// returns with the terminal status.
    pub fn set_status_handler(&self, handler: impl Fn(&StreamStatus) + Send + Sync + 'static) {
        if let Err(message) = self.stream.handlers().status.set(Arc::new(handler)) {
            tracing::error!(panic = %message, "Status handler panicked");
        }
    }

    /// Restore every handler to a no-op.
    pub fn clear_handlers(&self) {
        self.stream.handlers().clear();
    }

    /// Current event stream state.
    #[must_use]
    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    /// Event stream counters.
    #[must_use]
    pub fn stream_stats(&self) -> StreamStats {
        self.stream.stats()
    }

    // =========================================================================
    // Unary Calls
    // =========================================================================

    fn ensure_open(&self) -> Result<(), TradeApiError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TradeApiError::Closed)
        } else {
            Ok(())
        }
    }

    async fn call<T>(
        &self,
        method: &'static str,
        call: impl Future<Output = Result<tonic::Response<T>, tonic::Status>>,
    ) -> Result<T, TradeApiError> {
        self.ensure_open()?;

        let started = Instant::now();
        let result = call.await;
        let elapsed = started.elapsed();

        match result {
            Ok(response) => {
                metrics::record_unary_call(method, CallOutcome::Ok, elapsed);
                tracing::debug!(
                    method,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Call succeeded"
                );
                Ok(response.into_inner())
            }
            Err(status) => {
                metrics::record_unary_call(method, CallOutcome::Error, elapsed);
                let err = TradeApiError::from_status(method, &status);
                tracing::warn!(method, error = %err, "Call failed");
                Err(err)
            }
        }
    }

    /// List orders for a trading account.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn get_orders(
        &self,
        client_id: &str,
        filter: OrderFilter,
    ) -> Result<proto::GetOrdersResult, TradeApiError> {
        let mut client = self.orders.clone();
        let request = convert::get_orders_to_proto(client_id, filter);
        self.call("GetOrders", async move { client.get_orders(request).await })
            .await
    }

    /// Place a new order.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn place_order(
        &self,
        order: &NewOrder,
    ) -> Result<proto::NewOrderResult, TradeApiError> {
        let mut client = self.orders.clone();
        let request = convert::new_order_to_proto(order);
        self.call("NewOrder", async move { client.new_order(request).await })
            .await
    }

    /// Cancel an order by transaction id.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn cancel_order(
        &self,
        client_id: &str,
        transaction_id: i32,
    ) -> Result<proto::CancelOrderResult, TradeApiError> {
        let mut client = self.orders.clone();
        let request = proto::CancelOrderRequest {
            client_id: client_id.to_string(),
            transaction_id,
        };
        self.call("CancelOrder", async move { client.cancel_order(request).await })
            .await
    }

    /// List stop orders for a trading account.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn get_stop_orders(
        &self,
        client_id: &str,
        filter: StopFilter,
    ) -> Result<proto::GetStopsResult, TradeApiError> {
        let mut client = self.stops.clone();
        let request = convert::get_stops_to_proto(client_id, filter);
        self.call("GetStops", async move { client.get_stops(request).await })
            .await
    }

    /// Place a new stop order.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn place_stop(&self, stop: &NewStop) -> Result<proto::NewStopResult, TradeApiError> {
        let mut client = self.stops.clone();
        let request = convert::new_stop_to_proto(stop);
        self.call("NewStop", async move { client.new_stop(request).await })
            .await
    }

    /// Cancel a stop order by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn cancel_stop(
        &self,
        client_id: &str,
        stop_id: i32,
    ) -> Result<proto::CancelStopResult, TradeApiError> {
        let mut client = self.stops.clone();
        let request = proto::CancelStopRequest {
            client_id: client_id.to_string(),
            stop_id,
        };
        self.call("CancelStop", async move { client.cancel_stop(request).await })
            .await
    }

    /// Fetch a portfolio snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn get_portfolio(
        &self,
        client_id: &str,
        content: PortfolioContent,
    ) -> Result<proto::GetPortfolioResult, TradeApiError> {
        let mut client = self.portfolios.clone();
        let request = convert::get_portfolio_to_proto(client_id, content);
        self.call("GetPortfolio", async move { client.get_portfolio(request).await })
            .await
    }

    /// Fetch the instrument directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed or the call fails.
    pub async fn get_instruments(&self) -> Result<services::GetSecuritiesResult, TradeApiError> {
        let mut client = self.securities.clone();
        self.call("GetSecurities", async move {
            client
                .get_securities(services::GetSecuritiesRequest {})
                .await
        })
        .await
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop the event stream and release the channel.
    ///
    /// Idempotent. Later subscribe and unary calls return
    /// [`TradeApiError::Closed`].
    pub async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Trade API client shutting down");
        }
        self.stream.shutdown().await;
    }

    /// Check whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl InstrumentSource for TradeApiClient {
    async fn fetch_instruments(&self) -> Result<Vec<Instrument>, InstrumentSourceError> {
        let result = self.get_instruments().await?;
        Ok(result
            .securities
            .iter()
            .map(convert::instrument_from_proto)
            .collect())
    }
}
