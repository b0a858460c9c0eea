//! Protobuf Conversions
//!
//! Maps domain request builders onto the generated wire messages, and wire
//! reference data back onto domain types. Prices cross the boundary as
//! `f64` because the contract declares them `double`.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::proto::{self, subscription_request};
use crate::domain::instruments::{Instrument, MAX_SCALE, Market};
use crate::domain::orders::{
    NewOrder, NewStop, OrderCondition, OrderConditionType, OrderFilter, OrderProperty, OrderSide,
    PortfolioContent, StopFilter, StopLoss, StopPrice, StopQuantity, TakeProfit, ValidBefore,
};
use crate::domain::subscription::SubscriptionCommand;

// =============================================================================
// Primitives
// =============================================================================

/// Convert a UTC instant to a protobuf timestamp.
#[must_use]
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: i32::try_from(dt.timestamp_subsec_nanos()).unwrap_or(i32::MAX),
    }
}

/// Convert a protobuf timestamp to a UTC instant.
#[must_use]
pub fn timestamp_to_datetime(ts: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

/// Convert a decimal price to the wire `double`.
#[must_use]
pub fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

// =============================================================================
// Event Stream
// =============================================================================

/// Build the outbound stream message for a command.
#[must_use]
pub fn command_to_request(command: &SubscriptionCommand) -> proto::SubscriptionRequest {
    use subscription_request::Payload;

    let payload = match command {
        SubscriptionCommand::SubscribeOrderBook(sub) => {
            Payload::OrderBookSubscribeRequest(proto::OrderBookSubscribeRequest {
                request_id: sub.request_id.clone(),
                security_code: sub.security_code.clone(),
                security_board: sub.security_board.clone(),
            })
        }
        SubscriptionCommand::UnsubscribeOrderBook(sub) => {
            Payload::OrderBookUnsubscribeRequest(proto::OrderBookUnsubscribeRequest {
                request_id: sub.request_id.clone(),
                security_code: sub.security_code.clone(),
                security_board: sub.security_board.clone(),
            })
        }
        SubscriptionCommand::SubscribeOrderTrade(sub) => {
            Payload::OrderTradeSubscribeRequest(proto::OrderTradeSubscribeRequest {
                request_id: sub.request_id.clone(),
                include_trades: sub.include_trades,
                include_orders: sub.include_orders,
                client_ids: sub.client_ids.clone(),
            })
        }
        SubscriptionCommand::UnsubscribeOrderTrade { request_id } => {
            Payload::OrderTradeUnsubscribeRequest(proto::OrderTradeUnsubscribeRequest {
                request_id: request_id.clone(),
            })
        }
    };

    proto::SubscriptionRequest {
        payload: Some(payload),
    }
}

// =============================================================================
// Orders
// =============================================================================

const fn side_to_proto(side: OrderSide) -> proto::BuySell {
    match side {
        OrderSide::Buy => proto::BuySell::Buy,
        OrderSide::Sell => proto::BuySell::Sell,
    }
}

fn valid_before_to_proto(valid_before: ValidBefore) -> proto::OrderValidBefore {
    match valid_before {
        ValidBefore::TillEndSession => proto::OrderValidBefore {
            r#type: proto::OrderValidBeforeType::TillEndSession.into(),
            time: None,
        },
        ValidBefore::TillCancelled => proto::OrderValidBefore {
            r#type: proto::OrderValidBeforeType::TillCancelled.into(),
            time: None,
        },
        ValidBefore::ExactTime(at) => proto::OrderValidBefore {
            r#type: proto::OrderValidBeforeType::ExactTime.into(),
            time: Some(datetime_to_timestamp(at)),
        },
    }
}

const fn property_to_proto(property: OrderProperty) -> proto::OrderProperty {
    match property {
        OrderProperty::PutInQueue => proto::OrderProperty::PutInQueue,
        OrderProperty::CancelBalance => proto::OrderProperty::CancelBalance,
        OrderProperty::ImmOrCancel => proto::OrderProperty::ImmOrCancel,
    }
}

const fn condition_type_to_proto(condition_type: OrderConditionType) -> proto::OrderConditionType {
    match condition_type {
        OrderConditionType::Bid => proto::OrderConditionType::Bid,
        OrderConditionType::BidOrLast => proto::OrderConditionType::BidOrLast,
        OrderConditionType::Ask => proto::OrderConditionType::Ask,
        OrderConditionType::AskOrLast => proto::OrderConditionType::AskOrLast,
        OrderConditionType::Time => proto::OrderConditionType::Time,
        OrderConditionType::CovDown => proto::OrderConditionType::CovDown,
        OrderConditionType::CovUp => proto::OrderConditionType::CovUp,
        OrderConditionType::LastUp => proto::OrderConditionType::LastUp,
        OrderConditionType::LastDown => proto::OrderConditionType::LastDown,
    }
}

fn condition_to_proto(condition: OrderCondition) -> proto::OrderCondition {
    proto::OrderCondition {
        r#type: condition_type_to_proto(condition.condition_type).into(),
        price: decimal_to_f64(condition.price),
        time: condition.time.map(datetime_to_timestamp),
    }
}

/// Build a `NewOrder` request.
#[must_use]
pub fn new_order_to_proto(order: &NewOrder) -> proto::NewOrderRequest {
    proto::NewOrderRequest {
        client_id: order.client_id.clone(),
        security_board: order.security_board.clone(),
        security_code: order.security_code.clone(),
        buy_sell: side_to_proto(order.side).into(),
        quantity: order.quantity,
        use_credit: order.use_credit,
        price: order.price.map(decimal_to_f64),
        property: property_to_proto(order.property).into(),
        condition: order.condition.map(condition_to_proto),
        valid_before: Some(valid_before_to_proto(order.valid_before)),
    }
}

/// Build a `GetOrders` request.
#[must_use]
pub fn get_orders_to_proto(client_id: &str, filter: OrderFilter) -> proto::GetOrdersRequest {
    proto::GetOrdersRequest {
        client_id: client_id.to_string(),
        include_matched: filter.include_matched,
        include_canceled: filter.include_canceled,
        include_active: filter.include_active,
    }
}

// =============================================================================
// Stop Orders
// =============================================================================

fn stop_quantity_to_proto(quantity: StopQuantity) -> proto::StopQuantity {
    let (value, units) = match quantity {
        StopQuantity::Percent(v) => (v, proto::StopQuantityUnits::Percent),
        StopQuantity::Lots(v) => (v, proto::StopQuantityUnits::Lots),
    };
    proto::StopQuantity {
        value: decimal_to_f64(value),
        units: units.into(),
    }
}

fn stop_price_to_proto(price: StopPrice) -> proto::StopPrice {
    let (value, units) = match price {
        StopPrice::Percent(v) => (v, proto::StopPriceUnits::Percent),
        StopPrice::Pips(v) => (v, proto::StopPriceUnits::Pips),
    };
    proto::StopPrice {
        value: decimal_to_f64(value),
        units: units.into(),
    }
}

fn stop_loss_to_proto(leg: StopLoss) -> proto::StopLoss {
    proto::StopLoss {
        activation_price: decimal_to_f64(leg.activation_price),
        price: decimal_to_f64(leg.price),
        market_price: leg.market_price,
        quantity: Some(stop_quantity_to_proto(leg.quantity)),
        time: leg.guard_time_secs,
        use_credit: leg.use_credit,
    }
}

fn take_profit_to_proto(leg: TakeProfit) -> proto::TakeProfit {
    proto::TakeProfit {
        activation_price: decimal_to_f64(leg.activation_price),
        correction_price: leg.correction_price.map(stop_price_to_proto),
        spread_price: leg.spread_price.map(stop_price_to_proto),
        market_price: leg.market_price,
        quantity: Some(stop_quantity_to_proto(leg.quantity)),
        time: leg.guard_time_secs,
        use_credit: leg.use_credit,
    }
}

/// Build a `NewStop` request.
#[must_use]
pub fn new_stop_to_proto(stop: &NewStop) -> proto::NewStopRequest {
    proto::NewStopRequest {
        client_id: stop.client_id.clone(),
        security_board: stop.security_board.clone(),
        security_code: stop.security_code.clone(),
        buy_sell: side_to_proto(stop.side).into(),
        stop_loss: stop.stop_loss.map(stop_loss_to_proto),
        take_profit: stop.take_profit.map(take_profit_to_proto),
        expiration_date: stop.expiration_date.map(datetime_to_timestamp),
        link_order: stop.link_order,
        valid_before: Some(valid_before_to_proto(stop.valid_before)),
    }
}

/// Build a `GetStops` request.
#[must_use]
pub fn get_stops_to_proto(client_id: &str, filter: StopFilter) -> proto::GetStopsRequest {
    proto::GetStopsRequest {
        client_id: client_id.to_string(),
        include_executed: filter.include_executed,
        include_canceled: filter.include_canceled,
        include_active: filter.include_active,
    }
}

// =============================================================================
// Portfolio
// =============================================================================

/// Build a `GetPortfolio` request.
#[must_use]
pub fn get_portfolio_to_proto(
    client_id: &str,
    content: PortfolioContent,
) -> proto::GetPortfolioRequest {
    proto::GetPortfolioRequest {
        client_id: client_id.to_string(),
        content: Some(proto::PortfolioContent {
            include_currencies: content.include_currencies,
            include_money: content.include_money,
            include_positions: content.include_positions,
            include_max_buy_sell: content.include_max_buy_sell,
        }),
    }
}

// =============================================================================
// Instruments
// =============================================================================

/// Convert a wire market code; unknown and unspecified codes map to `None`.
#[must_use]
pub fn market_from_proto(value: i32) -> Option<Market> {
    match proto::Market::try_from(value).ok()? {
        proto::Market::Stock => Some(Market::Stock),
        proto::Market::Forts => Some(Market::Forts),
        proto::Market::Spbex => Some(Market::Spbex),
        proto::Market::Mma => Some(Market::Mma),
        proto::Market::Ets => Some(Market::Ets),
        proto::Market::Bonds => Some(Market::Bonds),
        proto::Market::Options => Some(Market::Options),
        proto::Market::Unspecified => None,
    }
}

/// Convert a wire `Security` to a directory entry.
#[must_use]
pub fn instrument_from_proto(security: &proto::Security) -> Instrument {
    Instrument {
        board: security.board.clone(),
        code: security.code.clone(),
        short_name: security.short_name.clone(),
        market: market_from_proto(security.market),
        currency: security.currency.clone(),
        decimals: u32::try_from(security.decimals)
            .unwrap_or(0)
            .min(MAX_SCALE),
        lot_size: security.lot_size,
        min_step: i64::from(security.min_step),
    }
}
