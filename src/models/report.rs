//! Trade capture reports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::enums::{OrderSide, OrderType, TradeTransactionReportType};
use super::primitives::OrderId;

/// Booked trade transaction as published by the trade capture connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeTransactionReport {
    /// Report id
    pub id: String,
    /// What was booked
    pub report_type: TradeTransactionReportType,
    /// Booking time
    pub transaction_time: DateTime<Utc>,
    /// Related order, if any
    #[serde(default)]
    pub order_id: Option<OrderId>,
    /// Symbol name (empty for balance transactions)
    #[serde(default)]
    pub symbol: String,
    /// Order side
    #[serde(default)]
    pub side: Option<OrderSide>,
    /// Order type
    #[serde(default)]
    pub order_type: Option<OrderType>,
    /// Execution or order price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Executed amount
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Amount left on the order
    #[serde(default)]
    pub leaves_amount: Option<Decimal>,
    /// Account balance after the booking
    #[serde(default)]
    pub balance: Option<Decimal>,
    /// Balance movement for balance transactions
    #[serde(default)]
    pub balance_movement: Option<Decimal>,
    /// Commission charged
    #[serde(default)]
    pub commission: Option<Decimal>,
    /// Swap charged
    #[serde(default)]
    pub swap: Option<Decimal>,
    /// Comment
    #[serde(default)]
    pub comment: Option<String>,
}

impl TradeTransactionReport {
    /// Returns `true` for cancellations and expirations.
    pub fn is_cancel(&self) -> bool {
        matches!(
            self.report_type,
            TradeTransactionReportType::OrderCanceled | TradeTransactionReportType::OrderExpired
        )
    }
}

impl fmt::Display for TradeTransactionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {} {}",
            self.id,
            self.report_type,
            self.transaction_time.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.symbol
        )?;
        if let Some(amount) = self.amount {
            write!(f, " amount={}", amount)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_cancel() {
        let report = TradeTransactionReport {
            report_type: TradeTransactionReportType::OrderExpired,
            ..Default::default()
        };
        assert!(report.is_cancel());
        assert!(!TradeTransactionReport::default().is_cancel());
    }
}
