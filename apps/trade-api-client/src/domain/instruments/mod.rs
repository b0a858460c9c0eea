//! Instrument Reference Data
//!
//! Exchange segments and instrument directory entries.

use rust_decimal::Decimal;
use serde::Serialize;

/// Exchange segment an instrument trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    /// Moscow Exchange stock market.
    Stock,
    /// Moscow Exchange derivatives market.
    Forts,
    /// Saint Petersburg Exchange.
    Spbex,
    /// US stock market.
    Mma,
    /// Moscow Exchange currency market.
    Ets,
    /// Moscow Exchange bond market.
    Bonds,
    /// Moscow Exchange options market.
    Options,
}

impl Market {
    /// Get all exchange segments.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Stock,
            Self::Forts,
            Self::Spbex,
            Self::Mma,
            Self::Ets,
            Self::Bonds,
            Self::Options,
        ]
    }

    /// Get a human-readable description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Stock => "Moscow Exchange stock market",
            Self::Forts => "Moscow Exchange derivatives market",
            Self::Spbex => "Saint Petersburg Exchange",
            Self::Mma => "US stock market",
            Self::Ets => "Moscow Exchange currency market",
            Self::Bonds => "Moscow Exchange bond market",
            Self::Options => "Moscow Exchange options market",
        }
    }

    /// Get the segment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Forts => "forts",
            Self::Spbex => "spbex",
            Self::Mma => "mma",
            Self::Ets => "ets",
            Self::Bonds => "bonds",
            Self::Options => "options",
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// An instrument directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instrument {
    /// Trading board (e.g. `TQBR`).
    pub board: String,
    /// Instrument ticker (e.g. `SBER`).
    pub code: String,
    /// Short display name.
    pub short_name: String,
    /// Exchange segment; `None` when the broker reports an unknown one.
    pub market: Option<Market>,
    /// Quote currency.
    pub currency: String,
    /// Number of decimal places in prices.
    pub decimals: u32,
    /// Lot size in units.
    pub lot_size: i32,
    /// Minimum price step in units of `10^-decimals`.
    pub min_step: i64,
}

/// Largest scale a `Decimal` supports.
pub(crate) const MAX_SCALE: u32 = 28;

impl Instrument {
    /// Minimum price increment as an exact decimal.
    ///
    /// The scale is capped at 28, the most `Decimal` can hold.
    ///
    /// ```
    /// # use trade_api_client::domain::instruments::Instrument;
    /// # use rust_decimal::Decimal;
    /// let sber = Instrument {
    ///     board: "TQBR".into(),
    ///     code: "SBER".into(),
    ///     short_name: "Sberbank".into(),
    ///     market: None,
    ///     currency: "RUB".into(),
    ///     decimals: 2,
    ///     lot_size: 10,
    ///     min_step: 1,
    /// };
    /// assert_eq!(sber.price_step(), Decimal::new(1, 2));
    /// ```
    #[must_use]
    pub fn price_step(&self) -> Decimal {
        Decimal::new(self.min_step, self.decimals.min(MAX_SCALE))
    }

    /// Check whether `price` lies on the instrument's price grid.
    #[must_use]
    pub fn is_on_price_grid(&self, price: Decimal) -> bool {
        let step = self.price_step();
        step.is_zero() || (price % step).is_zero()
    }
}
