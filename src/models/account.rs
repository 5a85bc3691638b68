//! Account, asset and position models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::enums::AccountType;
use super::primitives::AccountId;

/// Trading account snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Account login
    pub account_id: AccountId,
    /// Accounting model
    pub account_type: AccountType,
    /// Deposit currency
    pub currency: String,
    /// Leverage (e.g. 100 for 1:100)
    pub leverage: Decimal,
    /// Balance in deposit currency
    pub balance: Decimal,
    /// Equity (balance plus floating profit)
    #[serde(default)]
    pub equity: Option<Decimal>,
    /// Used margin
    #[serde(default)]
    pub margin: Option<Decimal>,
    /// Margin level in percent
    #[serde(default)]
    pub margin_level: Option<Decimal>,
    /// Margin call level in percent
    pub margin_call_level: Decimal,
    /// Stop out level in percent
    pub stop_out_level: Decimal,
    /// Trading disabled
    pub is_blocked: bool,
    /// Investor (read-only) login
    pub is_read_only: bool,
    /// Asset balances (cash accounts)
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl AccountInfo {
    /// Free margin, when the server reports both equity and margin.
    pub fn free_margin(&self) -> Option<Decimal> {
        match (self.equity, self.margin) {
            (Some(equity), Some(margin)) => Some(equity - margin),
            _ => None,
        }
    }

    /// Returns `true` if requests that open exposure can be sent.
    pub fn can_trade(&self) -> bool {
        !self.is_blocked && !self.is_read_only
    }
}

impl fmt::Display for AccountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Account {} ({:?}) balance={} {} leverage={}",
            self.account_id, self.account_type, self.balance, self.currency, self.leverage
        )
    }
}

/// Balance of one currency on a cash account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Currency name
    pub currency: String,
    /// Total amount
    pub balance: Decimal,
    /// Amount locked by pending orders
    pub locked: Decimal,
}

impl Asset {
    /// Amount not locked by pending orders.
    pub fn available(&self) -> Decimal {
        self.balance - self.locked
    }
}

/// Net position for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol name
    pub symbol: String,
    /// Long amount
    pub buy_amount: Decimal,
    /// Average long price
    #[serde(default)]
    pub buy_price: Option<Decimal>,
    /// Short amount
    pub sell_amount: Decimal,
    /// Average short price
    #[serde(default)]
    pub sell_price: Option<Decimal>,
    /// Accumulated commission
    pub commission: Decimal,
    /// Accumulated swap
    pub swap: Decimal,
    /// Last modification time
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl Position {
    /// Signed net amount: long minus short.
    pub fn net_amount(&self) -> Decimal {
        self.buy_amount - self.sell_amount
    }

    /// Returns `true` if nothing is held on either side.
    pub fn is_flat(&self) -> bool {
        self.buy_amount.is_zero() && self.sell_amount.is_zero()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: buy={} sell={} commission={} swap={}",
            self.symbol, self.buy_amount, self.sell_amount, self.commission, self.swap
        )
    }
}

/// Deposit, withdrawal or other balance change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceOperation {
    /// Balance after the operation
    pub balance: Decimal,
    /// Amount moved (negative for withdrawals)
    pub transaction_amount: Decimal,
    /// Currency of the amount
    pub transaction_currency: String,
}
