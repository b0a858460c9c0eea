//! Unary Call Integration Tests
//!
//! Checks request mapping and error reporting for the order, stop,
//! portfolio and instrument services against an in-process broker.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tonic::Code;
use tonic_types::{ErrorDetails, StatusExt};

use common::{TEST_TOKEN, WAIT, connect, fast_settings, start_broker};
use trade_api_client::{
    ClientConfig, DirectoryError, InstrumentDirectory, InstrumentSource, Market, NewOrder,
    NewStop, OrderCondition, OrderConditionType, OrderFilter, OrderProperty, OrderSide,
    PortfolioContent, StopFilter, StopLoss, StopPrice, StopQuantity, StreamError, StreamStatus,
    TakeProfit, TradeApiClient, TradeApiError, ValidBefore, proto,
};

fn security(code: &str, board: &str, market: proto::Market) -> proto::Security {
    proto::Security {
        code: code.to_string(),
        board: board.to_string(),
        market: market.into(),
        decimals: 2,
        lot_size: 10,
        min_step: 1,
        currency: "RUB".to_string(),
        short_name: format!("{code} ao"),
        ..Default::default()
    }
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn test_place_limit_order_maps_request() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let order = NewOrder::limit("C-1", "TQBR", "SBER", OrderSide::Buy, 5, Decimal::new(2505, 1))
        .with_property(OrderProperty::ImmOrCancel)
        .with_condition(OrderCondition::at_price(
            OrderConditionType::LastDown,
            Decimal::new(250, 0),
        ))
        .with_valid_before(ValidBefore::TillCancelled);

    let result = client.place_order(&order).await.unwrap();
    assert_eq!(result.transaction_id, 42);
    assert_eq!(result.security_code, "SBER");

    let request = broker.new_orders.lock()[0].clone();
    assert_eq!(request.client_id, "C-1");
    assert_eq!(request.security_board, "TQBR");
    assert_eq!(request.buy_sell, i32::from(proto::BuySell::Buy));
    assert_eq!(request.quantity, 5);
    assert_eq!(request.price, Some(250.5));
    assert_eq!(
        request.property,
        i32::from(proto::OrderProperty::ImmOrCancel)
    );
    let condition = request.condition.unwrap();
    assert_eq!(
        condition.r#type,
        i32::from(proto::OrderConditionType::LastDown)
    );
    assert_eq!(condition.price, 250.0);
    assert_eq!(
        request.valid_before.unwrap().r#type,
        i32::from(proto::OrderValidBeforeType::TillCancelled)
    );
    assert_eq!(broker.api_keys.lock().last().unwrap(), TEST_TOKEN);

    client.shutdown().await;
}

#[tokio::test]
async fn test_place_market_order_omits_price() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let order = NewOrder::market("C-1", "TQBR", "SBER", OrderSide::Sell, 1);
    client.place_order(&order).await.unwrap();

    let request = broker.new_orders.lock()[0].clone();
    assert_eq!(request.buy_sell, i32::from(proto::BuySell::Sell));
    assert!(request.price.is_none());
    assert!(request.condition.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn test_get_orders_applies_filter() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let result = client
        .get_orders("C-1", OrderFilter::active_only())
        .await
        .unwrap();
    assert_eq!(result.client_id, "C-1");
    assert_eq!(result.orders.len(), 1);
    assert_eq!(result.orders[0].transaction_id, 7);

    let request = broker.get_orders.lock()[0].clone();
    assert!(request.include_active);
    assert!(!request.include_matched);
    assert!(!request.include_canceled);

    client.shutdown().await;
}

#[tokio::test]
async fn test_cancel_order_passes_transaction_id() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let result = client.cancel_order("C-1", 7).await.unwrap();
    assert_eq!(result.transaction_id, 7);
    assert_eq!(broker.cancel_orders.lock()[0].transaction_id, 7);

    client.shutdown().await;
}

// =============================================================================
// Stops
// =============================================================================

#[tokio::test]
async fn test_place_stop_maps_both_legs() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let stop = NewStop::new("C-1", "TQBR", "SBER", OrderSide::Sell)
        .with_stop_loss(StopLoss::at_market(
            Decimal::new(240, 0),
            StopQuantity::Lots(Decimal::new(3, 0)),
        ))
        .with_take_profit(TakeProfit {
            correction_price: Some(StopPrice::Percent(Decimal::new(5, 1))),
            ..TakeProfit::at_market(Decimal::new(270, 0), StopQuantity::Percent(Decimal::ONE_HUNDRED))
        })
        .with_link_order(100);

    let result = client.place_stop(&stop).await.unwrap();
    assert_eq!(result.stop_id, 9);

    let request = broker.new_stops.lock()[0].clone();
    assert_eq!(request.link_order, 100);

    let stop_loss = request.stop_loss.unwrap();
    assert_eq!(stop_loss.activation_price, 240.0);
    assert!(stop_loss.market_price);
    let quantity = stop_loss.quantity.unwrap();
    assert_eq!(quantity.value, 3.0);
    assert_eq!(quantity.units, i32::from(proto::StopQuantityUnits::Lots));

    let take_profit = request.take_profit.unwrap();
    assert_eq!(take_profit.activation_price, 270.0);
    let correction = take_profit.correction_price.unwrap();
    assert_eq!(correction.value, 0.5);
    assert_eq!(correction.units, i32::from(proto::StopPriceUnits::Percent));
    assert!(take_profit.spread_price.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn test_get_and_cancel_stops() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let stops = client
        .get_stop_orders("C-1", StopFilter::default())
        .await
        .unwrap();
    assert!(stops.stops.is_empty());
    assert!(broker.get_stops.lock()[0].include_executed);

    let result = client.cancel_stop("C-1", 9).await.unwrap();
    assert_eq!(result.stop_id, 9);
    assert_eq!(broker.cancel_stops.lock()[0].stop_id, 9);

    client.shutdown().await;
}

// =============================================================================
// Portfolio
// =============================================================================

#[tokio::test]
async fn test_get_portfolio_returns_snapshot() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    let content = PortfolioContent {
        include_max_buy_sell: false,
        ..PortfolioContent::default()
    };
    let portfolio = client.get_portfolio("C-1", content).await.unwrap();
    assert_eq!(portfolio.client_id, "C-1");
    assert_eq!(portfolio.equity, 150_000.0);

    let request = broker.portfolios.lock()[0].clone();
    let sent = request.content.unwrap();
    assert!(sent.include_positions);
    assert!(!sent.include_max_buy_sell);

    client.shutdown().await;
}

// =============================================================================
// Instruments
// =============================================================================

#[tokio::test]
async fn test_instrument_directory_loads_from_client() {
    let (broker, addr) = start_broker().await;
    broker.securities.lock().extend([
        security("SBER", "TQBR", proto::Market::Stock),
        security("SiZ5", "FUT", proto::Market::Forts),
    ]);
    let client = Arc::new(connect(addr, fast_settings()));

    let source: Arc<dyn InstrumentSource> = Arc::clone(&client) as _;
    let directory = InstrumentDirectory::new(source);
    assert_eq!(directory.load().await.unwrap(), 2);

    let sber = directory.find("TQBR", "SBER").unwrap();
    assert_eq!(sber.market, Some(Market::Stock));
    assert_eq!(sber.lot_size, 10);
    assert_eq!(sber.price_step(), Decimal::new(1, 2));
    assert_eq!(directory.by_market(Market::Forts).len(), 1);

    assert!(matches!(
        directory.find("TQBR", "GAZP"),
        Err(DirectoryError::NotFound { .. })
    ));

    client.shutdown().await;
}

// =============================================================================
// Errors
// =============================================================================

fn insufficient_funds() -> tonic::Status {
    let mut details = ErrorDetails::new();
    details.set_error_info("INSUFFICIENT_FUNDS", "trade-api", HashMap::new());
    tonic::Status::with_error_details(Code::FailedPrecondition, "order rejected", details)
}

#[tokio::test]
async fn test_rpc_error_carries_reason() {
    let (broker, addr) = start_broker().await;
    *broker.unary_failure.lock() = Some(insufficient_funds);
    let client = connect(addr, fast_settings());

    let order = NewOrder::market("C-1", "TQBR", "SBER", OrderSide::Buy, 1);
    let err = client.place_order(&order).await.unwrap_err();

    match err {
        TradeApiError::Rpc {
            method,
            code,
            message,
            reason,
        } => {
            assert_eq!(method, "NewOrder");
            assert_eq!(code, Code::FailedPrecondition);
            assert_eq!(message, "order rejected");
            assert_eq!(reason.as_deref(), Some("INSUFFICIENT_FUNDS"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(broker.new_orders.lock().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn test_unary_calls_after_shutdown_are_rejected() {
    let (broker, addr) = start_broker().await;
    let client = connect(addr, fast_settings());

    client.shutdown().await;

    let err = client
        .get_portfolio("C-1", PortfolioContent::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TradeApiError::Closed));
    let err = client.get_instruments().await.unwrap_err();
    assert!(matches!(err, TradeApiError::Closed));
    assert!(broker.portfolios.lock().is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_calls_and_stream() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = ClientConfig::new(TEST_TOKEN)
        .with_endpoint(format!("http://{addr}"))
        .with_stream(fast_settings());
    config.connect_timeout = Duration::from_millis(500);
    let client = TradeApiClient::new(config).unwrap();

    let (tx, mut status_rx) = mpsc::unbounded_channel();
    client.set_status_handler(move |status: &StreamStatus| {
        let _ = tx.send(status.clone());
    });

    let err = client
        .get_orders("C-1", OrderFilter::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TradeApiError::Rpc {
            method: "GetOrders",
            ..
        }
    ));

    let status = timeout(WAIT, status_rx.recv()).await.unwrap().unwrap();
    assert!(matches!(
        status,
        StreamStatus::Failed(StreamError::Rpc { .. })
    ));

    client.shutdown().await;
}
