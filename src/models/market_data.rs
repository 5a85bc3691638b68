//! Market data models: quotes, bars and instrument reference data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One price level of a quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteEntry {
    /// Price
    pub price: Decimal,
    /// Volume available at the price
    pub volume: Decimal,
}

impl QuoteEntry {
    /// Create a price level.
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

/// Book snapshot for a symbol. Bids are sorted best (highest) first, asks
/// best (lowest) first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol name
    pub symbol: String,
    /// Server time of the snapshot
    pub created: DateTime<Utc>,
    /// Bid levels
    #[serde(default)]
    pub bids: Vec<QuoteEntry>,
    /// Ask levels
    #[serde(default)]
    pub asks: Vec<QuoteEntry>,
    /// Prices are indicative only
    #[serde(default)]
    pub indicative: bool,
}

impl Quote {
    /// Create a top-of-book quote.
    pub fn top(
        symbol: impl Into<String>,
        created: DateTime<Utc>,
        bid: Option<QuoteEntry>,
        ask: Option<QuoteEntry>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            created,
            bids: bid.into_iter().collect(),
            asks: ask.into_iter().collect(),
            indicative: false,
        }
    }

    /// Best bid level.
    pub fn best_bid(&self) -> Option<&QuoteEntry> {
        self.bids.first()
    }

    /// Best ask level.
    pub fn best_ask(&self) -> Option<&QuoteEntry> {
        self.asks.first()
    }

    /// Calculate the bid-ask spread.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Midpoint of the best bid and ask.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask.price + bid.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Returns `true` if both sides are present.
    pub fn has_quote(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    /// Copy limited to the first `levels` entries per side.
    pub fn truncated(&self, levels: usize) -> Self {
        Self {
            symbol: self.symbol.clone(),
            created: self.created,
            bids: self.bids.iter().take(levels).copied().collect(),
            asks: self.asks.iter().take(levels).copied().collect(),
            indicative: self.indicative,
        }
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |entry: Option<&QuoteEntry>| {
            entry
                .map(|e| format!("{}x{}", e.price, e.volume))
                .unwrap_or_else(|| "-".to_string())
        };
        write!(
            f,
            "{} {} bid={} ask={}",
            self.symbol,
            self.created.format("%Y-%m-%d %H:%M:%S%.3f"),
            side(self.best_bid()),
            side(self.best_ask())
        )
    }
}

/// OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub from: DateTime<Utc>,
    /// Bar close time
    pub to: DateTime<Utc>,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Traded or tick volume
    pub volume: Decimal,
}

impl Bar {
    /// Price range of the bar.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

impl fmt::Display for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O={} H={} L={} C={} V={}",
            self.from.format("%Y-%m-%d %H:%M:%S"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume
        )
    }
}

/// Bid and ask bars that share an open time. Either side may be missing
/// when the server has no bar for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairBar {
    /// Shared open time
    pub from: DateTime<Utc>,
    /// Bid bar
    pub bid: Option<Bar>,
    /// Ask bar
    pub ask: Option<Bar>,
}

impl PairBar {
    /// Returns `true` if both sides are present.
    pub fn is_complete(&self) -> bool {
        self.bid.is_some() && self.ask.is_some()
    }
}

/// Symbol reference data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Symbol name
    pub name: String,
    /// Base currency
    pub currency: String,
    /// Profit/settlement currency
    pub settlement_currency: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Price precision in digits
    pub precision: u32,
    /// Units per lot
    pub contract_size: Decimal,
    /// Minimum order amount
    pub min_trade_amount: Decimal,
    /// Maximum order amount
    pub max_trade_amount: Decimal,
    /// Order amount step
    pub trade_amount_step: Decimal,
    /// Swap for short positions
    #[serde(default)]
    pub swap_size_short: Option<Decimal>,
    /// Swap for long positions
    #[serde(default)]
    pub swap_size_long: Option<Decimal>,
    /// Trading enabled
    pub is_trade_allowed: bool,
    /// Display order
    pub sort_order: i32,
}

impl SymbolInfo {
    /// Check an order amount against the symbol limits.
    pub fn validate_amount(&self, amount: Decimal) -> crate::Result<()> {
        if amount < self.min_trade_amount || amount > self.max_trade_amount {
            return Err(crate::Error::InvalidInput(format!(
                "amount {} outside [{}, {}] for {}",
                amount, self.min_trade_amount, self.max_trade_amount, self.name
            )));
        }
        if !self.trade_amount_step.is_zero()
            && !((amount - self.min_trade_amount) % self.trade_amount_step).is_zero()
        {
            return Err(crate::Error::InvalidInput(format!(
                "amount {} is not a multiple of step {} for {}",
                amount, self.trade_amount_step, self.name
            )));
        }
        Ok(())
    }
}

/// Currency reference data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    /// Currency name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Amount precision in digits
    pub precision: u32,
    /// Display order
    pub sort_order: i32,
}

/// Time range for which the quote store has history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryInfo {
    /// Symbol name
    pub symbol: String,
    /// First available timestamp
    #[serde(default)]
    pub available_from: Option<DateTime<Utc>>,
    /// Last available timestamp
    #[serde(default)]
    pub available_to: Option<DateTime<Utc>>,
}
