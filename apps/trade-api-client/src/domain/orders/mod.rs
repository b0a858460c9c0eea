//! Order Request Types
//!
//! Builders for order, stop-order and portfolio requests. Prices are carried
//! as [`Decimal`] and converted to the wire representation at the edge.
//!
//! Every account-scoped request takes the trading account as an explicit
//! field; the client itself is not bound to an account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// =============================================================================
// Shared Enums
// =============================================================================

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// Lifetime of an order or stop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidBefore {
    /// Until the end of the current session.
    #[default]
    TillEndSession,
    /// Until cancelled.
    TillCancelled,
    /// Until the given instant.
    ExactTime(DateTime<Utc>),
}

/// How the unfilled remainder of an order is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderProperty {
    /// Remainder rests in the exchange queue.
    #[default]
    PutInQueue,
    /// Fill-or-kill: trade only if the whole quantity can be filled.
    CancelBalance,
    /// Immediate-or-cancel: the remainder is cancelled.
    ImmOrCancel,
}

/// Trigger for a conditional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderConditionType {
    /// Best bid.
    Bid,
    /// Best bid or a trade at the price and above.
    BidOrLast,
    /// Best ask.
    Ask,
    /// Best ask or a trade at the price and below.
    AskOrLast,
    /// At a point in time.
    Time,
    /// Coverage below the value.
    CovDown,
    /// Coverage above the value.
    CovUp,
    /// Market trade at the price or above.
    LastUp,
    /// Market trade at the price or below.
    LastDown,
}

/// Condition attached to a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderCondition {
    /// Trigger type.
    pub condition_type: OrderConditionType,
    /// Trigger price.
    pub price: Decimal,
    /// Trigger time for [`OrderConditionType::Time`].
    pub time: Option<DateTime<Utc>>,
}

impl OrderCondition {
    /// Create a price-triggered condition.
    #[must_use]
    pub const fn at_price(condition_type: OrderConditionType, price: Decimal) -> Self {
        Self {
            condition_type,
            price,
            time: None,
        }
    }

    /// Create a time-triggered condition.
    #[must_use]
    pub const fn at_time(time: DateTime<Utc>) -> Self {
        Self {
            condition_type: OrderConditionType::Time,
            price: Decimal::ZERO,
            time: Some(time),
        }
    }
}

// =============================================================================
// New Order
// =============================================================================

/// A new order request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    /// Trading account.
    pub client_id: String,
    /// Trading board.
    pub security_board: String,
    /// Instrument ticker.
    pub security_code: String,
    /// Trade direction.
    pub side: OrderSide,
    /// Quantity in lots.
    pub quantity: i32,
    /// Limit price; `None` for a market order.
    pub price: Option<Decimal>,
    /// Use margin credit. Not available on the derivatives market.
    pub use_credit: bool,
    /// Remainder handling.
    pub property: OrderProperty,
    /// Optional trigger condition.
    pub condition: Option<OrderCondition>,
    /// Order lifetime.
    pub valid_before: ValidBefore,
}

impl NewOrder {
    /// Create a limit order.
    #[must_use]
    pub fn limit(
        client_id: impl Into<String>,
        security_board: impl Into<String>,
        security_code: impl Into<String>,
        side: OrderSide,
        quantity: i32,
        price: Decimal,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            security_board: security_board.into(),
            security_code: security_code.into(),
            side,
            quantity,
            price: Some(price),
            use_credit: false,
            property: OrderProperty::default(),
            condition: None,
            valid_before: ValidBefore::default(),
        }
    }

    /// Create a market order.
    #[must_use]
    pub fn market(
        client_id: impl Into<String>,
        security_board: impl Into<String>,
        security_code: impl Into<String>,
        side: OrderSide,
        quantity: i32,
    ) -> Self {
        Self {
            price: None,
            ..Self::limit(
                client_id,
                security_board,
                security_code,
                side,
                quantity,
                Decimal::ZERO,
            )
        }
    }

    /// Set the remainder handling.
    #[must_use]
    pub const fn with_property(mut self, property: OrderProperty) -> Self {
        self.property = property;
        self
    }

    /// Attach a trigger condition.
    #[must_use]
    pub const fn with_condition(mut self, condition: OrderCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set the order lifetime.
    #[must_use]
    pub const fn with_valid_before(mut self, valid_before: ValidBefore) -> Self {
        self.valid_before = valid_before;
        self
    }

    /// Enable or disable margin credit.
    #[must_use]
    pub const fn with_credit(mut self, use_credit: bool) -> Self {
        self.use_credit = use_credit;
        self
    }

    /// Check whether this is a market order.
    #[must_use]
    pub const fn is_market(&self) -> bool {
        self.price.is_none()
    }
}

// =============================================================================
// Stop Orders
// =============================================================================

/// Units for a stop-order quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopQuantity {
    /// Percent of the position.
    Percent(Decimal),
    /// Number of lots.
    Lots(Decimal),
}

/// Units for a take-profit price offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopPrice {
    /// Percent of the price.
    Percent(Decimal),
    /// Price steps.
    Pips(Decimal),
}

/// Stop-loss leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopLoss {
    /// Activation price.
    pub activation_price: Decimal,
    /// Order price once activated; ignored when `market_price` is set.
    pub price: Decimal,
    /// Execute at market once activated.
    pub market_price: bool,
    /// Quantity to close.
    pub quantity: StopQuantity,
    /// Guard time in seconds.
    pub guard_time_secs: i32,
    /// Use margin credit.
    pub use_credit: bool,
}

impl StopLoss {
    /// Create a stop-loss that executes at market.
    #[must_use]
    pub const fn at_market(activation_price: Decimal, quantity: StopQuantity) -> Self {
        Self {
            activation_price,
            price: Decimal::ZERO,
            market_price: true,
            quantity,
            guard_time_secs: 0,
            use_credit: false,
        }
    }

    /// Create a stop-loss that places a limit order at `price`.
    #[must_use]
    pub const fn at_limit(activation_price: Decimal, price: Decimal, quantity: StopQuantity) -> Self {
        Self {
            activation_price,
            price,
            market_price: false,
            quantity,
            guard_time_secs: 0,
            use_credit: false,
        }
    }
}

/// Take-profit leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TakeProfit {
    /// Activation price.
    pub activation_price: Decimal,
    /// Trailing correction from the extremum.
    pub correction_price: Option<StopPrice>,
    /// Protective spread.
    pub spread_price: Option<StopPrice>,
    /// Execute at market once activated.
    pub market_price: bool,
    /// Quantity to close.
    pub quantity: StopQuantity,
    /// Guard time in seconds.
    pub guard_time_secs: i32,
    /// Use margin credit.
    pub use_credit: bool,
}

impl TakeProfit {
    /// Create a take-profit that executes at market.
    #[must_use]
    pub const fn at_market(activation_price: Decimal, quantity: StopQuantity) -> Self {
        Self {
            activation_price,
            correction_price: None,
            spread_price: None,
            market_price: true,
            quantity,
            guard_time_secs: 0,
            use_credit: false,
        }
    }
}

/// A new stop order: a stop-loss leg, a take-profit leg, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewStop {
    /// Trading account.
    pub client_id: String,
    /// Trading board.
    pub security_board: String,
    /// Instrument ticker.
    pub security_code: String,
    /// Trade direction of the resulting order.
    pub side: OrderSide,
    /// Stop-loss leg.
    pub stop_loss: Option<StopLoss>,
    /// Take-profit leg.
    pub take_profit: Option<TakeProfit>,
    /// Expiration instant.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Exchange number of the linked active order (0 = none).
    pub link_order: i64,
    /// Stop order lifetime.
    pub valid_before: ValidBefore,
}

impl NewStop {
    /// Create a stop order without legs.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        security_board: impl Into<String>,
        security_code: impl Into<String>,
        side: OrderSide,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            security_board: security_board.into(),
            security_code: security_code.into(),
            side,
            stop_loss: None,
            take_profit: None,
            expiration_date: None,
            link_order: 0,
            valid_before: ValidBefore::default(),
        }
    }

    /// Attach a stop-loss leg.
    #[must_use]
    pub const fn with_stop_loss(mut self, stop_loss: StopLoss) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    /// Attach a take-profit leg.
    #[must_use]
    pub const fn with_take_profit(mut self, take_profit: TakeProfit) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    /// Set the expiration instant.
    #[must_use]
    pub const fn with_expiration(mut self, expiration_date: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration_date);
        self
    }

    /// Link to an active order by exchange number.
    #[must_use]
    pub const fn with_link_order(mut self, link_order: i64) -> Self {
        self.link_order = link_order;
        self
    }

    /// Set the stop order lifetime.
    #[must_use]
    pub const fn with_valid_before(mut self, valid_before: ValidBefore) -> Self {
        self.valid_before = valid_before;
        self
    }

    /// Check that at least one leg is present.
    #[must_use]
    pub const fn has_legs(&self) -> bool {
        self.stop_loss.is_some() || self.take_profit.is_some()
    }
}

// =============================================================================
// Query Filters
// =============================================================================

/// Which orders to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct OrderFilter {
    /// Include filled orders.
    pub include_matched: bool,
    /// Include cancelled orders.
    pub include_canceled: bool,
    /// Include active orders.
    pub include_active: bool,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            include_matched: true,
            include_canceled: true,
            include_active: true,
        }
    }
}

impl OrderFilter {
    /// Only active orders.
    #[must_use]
    pub const fn active_only() -> Self {
        Self {
            include_matched: false,
            include_canceled: false,
            include_active: true,
        }
    }
}

/// Which stop orders to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StopFilter {
    /// Include executed stop orders.
    pub include_executed: bool,
    /// Include cancelled stop orders.
    pub include_canceled: bool,
    /// Include active stop orders.
    pub include_active: bool,
}

impl Default for StopFilter {
    fn default() -> Self {
        Self {
            include_executed: true,
            include_canceled: true,
            include_active: true,
        }
    }
}

/// Which portfolio sections to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PortfolioContent {
    /// Currency positions.
    pub include_currencies: bool,
    /// Money positions.
    pub include_money: bool,
    /// Depository positions.
    pub include_positions: bool,
    /// Buy/sell limits.
    pub include_max_buy_sell: bool,
}

impl Default for PortfolioContent {
    fn default() -> Self {
        Self {
            include_currencies: true,
            include_money: true,
            include_positions: true,
            include_max_buy_sell: true,
        }
    }
}
