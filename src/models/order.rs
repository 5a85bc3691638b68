//! Order models for placing and tracking trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::enums::*;
use super::primitives::OrderId;

/// A working order or open gross position as held in the trade cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Server order id
    pub order_id: OrderId,
    /// Client-assigned id
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Symbol name
    pub symbol: String,
    /// Order type
    pub order_type: OrderType,
    /// Order side
    pub side: OrderSide,
    /// Last known status
    pub status: OrderStatus,
    /// Limit or open price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Stop trigger price
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Amount requested
    pub initial_amount: Decimal,
    /// Amount still working
    pub remaining_amount: Decimal,
    /// Stop loss
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Take profit
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiration for good-till-date orders
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    /// Creation time
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// Free-form comment
    #[serde(default)]
    pub comment: Option<String>,
    /// Accumulated commission
    pub commission: Decimal,
    /// Accumulated swap
    pub swap: Decimal,
}

impl Order {
    /// Amount already executed.
    pub fn filled_amount(&self) -> Decimal {
        self.initial_amount - self.remaining_amount
    }

    /// Returns `true` if the record is an open gross position.
    pub fn is_position(&self) -> bool {
        self.order_type == OrderType::Position
    }

    /// Returns `true` if the record is a pending order.
    pub fn is_pending(&self) -> bool {
        self.order_type.is_pending()
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:?} {:?} {} {}/{}",
            self.order_id,
            self.side,
            self.order_type,
            self.symbol,
            self.remaining_amount,
            self.initial_amount
        )?;
        if let Some(price) = self.price {
            write!(f, " @ {}", price)?;
        }
        Ok(())
    }
}

/// Server report describing one step in an order's life.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Server order id
    pub order_id: OrderId,
    /// Client-assigned id
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// What happened
    pub execution_type: ExecutionType,
    /// Order status after the event
    pub order_status: OrderStatus,
    /// Order type
    pub order_type: OrderType,
    /// Order side
    pub side: OrderSide,
    /// Symbol name
    pub symbol: String,
    /// Limit or open price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Stop trigger price
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Amount requested
    pub initial_amount: Decimal,
    /// Amount still working
    pub leaves_amount: Decimal,
    /// Amount executed so far
    pub executed_amount: Decimal,
    /// Average execution price
    #[serde(default)]
    pub average_price: Option<Decimal>,
    /// Amount of the fill this report describes
    #[serde(default)]
    pub trade_amount: Option<Decimal>,
    /// Price of the fill this report describes
    #[serde(default)]
    pub trade_price: Option<Decimal>,
    /// Stop loss
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Take profit
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiration for good-till-date orders
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    /// Creation time
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// Free-form comment
    #[serde(default)]
    pub comment: Option<String>,
    /// Commission charged so far
    pub commission: Decimal,
    /// Swap charged so far
    pub swap: Decimal,
    /// Reject reason for rejected requests
    #[serde(default)]
    pub reject_reason: Option<RejectReason>,
    /// Server text
    #[serde(default)]
    pub text: Option<String>,
}

impl ExecutionReport {
    /// Returns `true` if the order left the book with this report.
    pub fn is_terminal(&self) -> bool {
        self.order_status.is_terminal()
    }

    /// Returns `true` if this report rejects the request.
    pub fn is_rejected(&self) -> bool {
        self.execution_type == ExecutionType::Rejected
            || self.order_status == OrderStatus::Rejected
    }

    /// Project the report onto the cached order record.
    pub fn to_order(&self) -> Order {
        Order {
            order_id: self.order_id.clone(),
            client_order_id: self.client_order_id.clone(),
            symbol: self.symbol.clone(),
            order_type: self.order_type,
            side: self.side,
            status: self.order_status,
            price: self.average_price.or(self.price),
            stop_price: self.stop_price,
            initial_amount: self.initial_amount,
            remaining_amount: self.leaves_amount,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            time_in_force: self.time_in_force,
            expiration: self.expiration,
            created: self.created,
            modified: self.modified,
            comment: self.comment.clone(),
            commission: self.commission,
            swap: self.swap,
        }
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:?}/{:?} {:?} {} leaves={} executed={}",
            self.order_id,
            self.execution_type,
            self.order_status,
            self.side,
            self.symbol,
            self.leaves_amount,
            self.executed_amount
        )
    }
}

/// A new order to be submitted.
///
/// Use [`NewOrderBuilder`] to construct a validated request.
///
/// # Example
///
/// ```
/// use tradelink_rs::models::{NewOrderBuilder, OrderSide, OrderType};
/// use rust_decimal_macros::dec;
///
/// let order = NewOrderBuilder::new("EURUSD", OrderSide::Buy, OrderType::Limit, dec!(10000))
///     .price(dec!(1.0850))
///     .comment("entry")
///     .build()
///     .unwrap();
/// assert_eq!(order.price, Some(dec!(1.0850)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderRequest {
    /// Client-assigned id
    #[serde(default)]
    pub client_order_id: Option<String>,
    /// Symbol name
    pub symbol: String,
    /// Order type
    pub order_type: OrderType,
    /// Order side
    pub side: OrderSide,
    /// Amount to trade
    pub amount: Decimal,
    /// Limit price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Stop trigger price
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// Stop loss
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Take profit
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiration for good-till-date orders
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    /// Free-form comment
    #[serde(default)]
    pub comment: Option<String>,
}

/// Builder for creating new orders with validation.
#[derive(Debug, Clone)]
pub struct NewOrderBuilder {
    symbol: String,
    side: OrderSide,
    order_type: OrderType,
    amount: Decimal,
    client_order_id: Option<String>,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    time_in_force: TimeInForce,
    expiration: Option<DateTime<Utc>>,
    comment: Option<String>,
}

impl NewOrderBuilder {
    /// Start a new order.
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        amount: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type,
            amount,
            client_order_id: None,
            price: None,
            stop_price: None,
            stop_loss: None,
            take_profit: None,
            time_in_force: TimeInForce::GoodTillCancel,
            expiration: None,
            comment: None,
        }
    }

    /// Set the client order id.
    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Set the limit price.
    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the stop trigger price.
    pub fn stop_price(mut self, price: Decimal) -> Self {
        self.stop_price = Some(price);
        self
    }

    /// Set the stop loss.
    pub fn stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    /// Set the take profit.
    pub fn take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }

    /// Set the time in force.
    pub fn time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Set the expiration; implies good-till-date.
    pub fn expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self.time_in_force = TimeInForce::GoodTillDate;
        self
    }

    /// Set a comment.
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Build the order, validating all fields.
    pub fn build(self) -> crate::Result<NewOrderRequest> {
        if self.symbol.trim().is_empty() {
            return Err(crate::Error::InvalidSymbol(self.symbol));
        }

        if self.amount <= Decimal::ZERO {
            return Err(crate::Error::InvalidInput(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        if self.order_type == OrderType::Position {
            return Err(crate::Error::InvalidInput(
                "Position records cannot be submitted as orders".to_string(),
            ));
        }

        if self.order_type.requires_price() && self.price.is_none() {
            return Err(crate::Error::InvalidInput(
                "Limit orders require a price".to_string(),
            ));
        }

        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(crate::Error::InvalidInput(
                "Stop orders require a stop_price".to_string(),
            ));
        }

        if self.time_in_force == TimeInForce::GoodTillDate && self.expiration.is_none() {
            return Err(crate::Error::InvalidInput(
                "Good-till-date orders require an expiration".to_string(),
            ));
        }

        if self.order_type == OrderType::Market && self.price.is_some() {
            return Err(crate::Error::InvalidInput(
                "Market orders cannot carry a limit price".to_string(),
            ));
        }

        Ok(NewOrderRequest {
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            order_type: self.order_type,
            side: self.side,
            amount: self.amount,
            price: self.price,
            stop_price: self.stop_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            time_in_force: self.time_in_force,
            expiration: self.expiration,
            comment: self.comment,
        })
    }
}

/// Modification of a working order. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOrderRequest {
    /// Order to modify
    pub order_id: OrderId,
    /// Symbol of the order
    pub symbol: String,
    /// New amount
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// New limit price
    #[serde(default)]
    pub price: Option<Decimal>,
    /// New stop trigger price
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    /// New stop loss
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// New take profit
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    /// New expiration
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    /// New comment
    #[serde(default)]
    pub comment: Option<String>,
}

impl ReplaceOrderRequest {
    /// Start a modification of the given order.
    pub fn new(order_id: impl Into<OrderId>, symbol: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    /// Returns `true` if no field would change.
    pub fn is_empty(&self) -> bool {
        self.amount.is_none()
            && self.price.is_none()
            && self.stop_price.is_none()
            && self.stop_loss.is_none()
            && self.take_profit.is_none()
            && self.expiration.is_none()
            && self.comment.is_none()
    }
}
