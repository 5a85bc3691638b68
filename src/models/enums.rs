//! Enumeration types shared by the feed and trade sessions.
//!
//! This module contains the order, account, history and session enums used
//! throughout the SDK.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order type specifying how the order should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderType {
    /// Market order - execute immediately at current market price
    #[default]
    Market,
    /// Limit order - execute at specified price or better
    Limit,
    /// Stop order - becomes market order when stop price is reached
    Stop,
    /// Stop limit - becomes limit order when stop price is reached
    StopLimit,
    /// Open position on a gross account
    Position,
}

impl OrderType {
    /// Returns `true` if the order type carries a limit price.
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    /// Returns `true` if the order type carries a stop price.
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }

    /// Returns `true` if orders of this type wait in the book.
    pub fn is_pending(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::Stop | OrderType::StopLimit)
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderSide {
    /// Buy at the ask
    #[default]
    Buy,
    /// Sell at the bid
    Sell,
}

impl OrderSide {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Current status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Order accepted by the server
    #[default]
    New,
    /// Order accepted and margin calculated
    Calculated,
    /// Order partially filled and still working
    PartiallyFilled,
    /// Order completely filled
    Filled,
    /// Order cancelled
    Canceled,
    /// Order rejected
    Rejected,
    /// Order expired
    Expired,
    /// Stop order triggered
    Activated,
    /// Order is being executed
    Executing,
}

impl OrderStatus {
    /// Returns `true` if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Returns `true` if the order is still working.
    pub fn is_working(&self) -> bool {
        !self.is_terminal()
    }
}

/// Kind of event an execution report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionType {
    /// Order accepted
    #[default]
    New,
    /// Margin calculated for the order
    Calculated,
    /// Fill (partial or complete)
    Trade,
    /// Order cancelled
    Canceled,
    /// Order modified
    Replace,
    /// Order rejected
    Rejected,
    /// Order expired
    Expired,
    /// Pending cancel acknowledged
    PendingCancel,
    /// Pending replace acknowledged
    PendingReplace,
    /// Pending position close acknowledged
    PendingClose,
    /// Status snapshot
    OrderStatus,
}

/// Time in force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeInForce {
    /// Good till cancelled - remains active until filled or cancelled
    #[default]
    GoodTillCancel,
    /// Immediate or cancel - fill immediately or cancel
    ImmediateOrCancel,
    /// Good till date - remains active until the expiration time
    GoodTillDate,
}

/// Accounting model of a trading account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountType {
    /// Each fill opens its own position
    #[default]
    Gross,
    /// One netted position per symbol
    Net,
    /// Asset balances, no leverage
    Cash,
}

/// Side of the book a price series is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PriceType {
    /// Bid prices
    #[default]
    Bid,
    /// Ask prices
    Ask,
}

/// Bar periodicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Periodicity {
    /// 1 second
    S1,
    /// 10 seconds
    S10,
    /// 1 minute
    #[default]
    M1,
    /// 5 minutes
    M5,
    /// 15 minutes
    M15,
    /// 30 minutes
    M30,
    /// 1 hour
    H1,
    /// 4 hours
    H4,
    /// 1 day
    D1,
    /// 1 week
    W1,
    /// 1 month (approximated as 30 days for arithmetic)
    MN1,
}

impl Periodicity {
    /// Nominal length of one bar.
    pub fn duration(&self) -> Duration {
        match self {
            Periodicity::S1 => Duration::seconds(1),
            Periodicity::S10 => Duration::seconds(10),
            Periodicity::M1 => Duration::minutes(1),
            Periodicity::M5 => Duration::minutes(5),
            Periodicity::M15 => Duration::minutes(15),
            Periodicity::M30 => Duration::minutes(30),
            Periodicity::H1 => Duration::hours(1),
            Periodicity::H4 => Duration::hours(4),
            Periodicity::D1 => Duration::days(1),
            Periodicity::W1 => Duration::weeks(1),
            Periodicity::MN1 => Duration::days(30),
        }
    }

    /// Get the string representation used in history requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::S1 => "S1",
            Periodicity::S10 => "S10",
            Periodicity::M1 => "M1",
            Periodicity::M5 => "M5",
            Periodicity::M15 => "M15",
            Periodicity::M30 => "M30",
            Periodicity::H1 => "H1",
            Periodicity::H4 => "H4",
            Periodicity::D1 => "D1",
            Periodicity::W1 => "W1",
            Periodicity::MN1 => "MN1",
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Depth of book requested for quote subscriptions and tick history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum QuoteDepth {
    /// Best bid and ask only
    #[default]
    Top,
    /// Up to the given number of levels per side
    Levels(u16),
    /// Every level the server publishes
    Full,
}

impl QuoteDepth {
    /// Maximum number of levels per side, `None` for full depth.
    pub fn levels(&self) -> Option<u16> {
        match self {
            QuoteDepth::Top => Some(1),
            QuoteDepth::Levels(n) => Some(*n),
            QuoteDepth::Full => None,
        }
    }
}

/// Direction in which a history request walks through time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeDirection {
    /// Oldest first
    #[default]
    Forward,
    /// Newest first
    Backward,
}

/// Why a session was logged out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LogoutReason {
    /// The client asked to log out
    ClientInitiated,
    /// The server ended the session
    ServerLogout,
    /// Username or password rejected
    InvalidCredentials,
    /// Account is blocked
    BlockedAccount,
    /// The password must be changed before login
    MustChangePassword,
    /// Another login with the same credentials took over
    DuplicateLogin,
    /// The client could not keep up with the server
    SlowConnection,
    /// Login did not complete in time
    LoginTimeout,
    /// TCP/TLS connection could not be established
    ConnectError,
    /// The connection dropped unexpectedly
    NetworkError,
    /// Server-side failure
    InternalServerError,
    /// Unknown reason
    #[default]
    Unknown,
}

impl LogoutReason {
    /// Returns `true` if reconnecting can succeed without user action.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LogoutReason::ClientInitiated
                | LogoutReason::InvalidCredentials
                | LogoutReason::BlockedAccount
                | LogoutReason::MustChangePassword
        )
    }
}

/// Reason code attached to a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RejectReason {
    /// Dealer declined the request
    DealerReject,
    /// Symbol not known to the server
    UnknownSymbol,
    /// Order id not known to the server
    UnknownOrder,
    /// Amount outside the symbol limits
    IncorrectQuantity,
    /// No prices available
    OffQuotes,
    /// Not enough free margin
    InsufficientMargin,
    /// Trading disabled for the account or symbol
    TradeNotAllowed,
    /// Only closing requests are accepted
    CloseOnly,
    /// Too many requests
    ThrottlingLimits,
    /// The server did not answer in time
    Timeout,
    /// Server-side failure
    InternalServerError,
    /// Any other reason
    #[default]
    Other,
}

/// Stage of a two-factor authentication exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TwoFactorReason {
    /// The server asks for a one-time password
    ServerRequest,
    /// The one-time password was accepted
    ServerSuccess,
    /// The one-time password was rejected
    ServerError,
    /// The two-factor session was extended
    ServerResume,
}

/// Type of a server notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NotificationType {
    /// Symbols, currencies or session settings changed on the server
    ConfigUpdated,
    /// Balance changed
    Balance,
    /// Margin level dropped below the margin call level
    MarginCall,
    /// Margin call revoked
    MarginCallRevocation,
    /// Positions were closed by stop out
    StopOut,
    /// Free-form message
    Message,
    /// Anything else
    #[default]
    Unknown,
}

/// Severity of a server notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NotificationSeverity {
    /// Informational
    #[default]
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
}

/// Trading session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    /// Trading is open
    Open,
    /// Trading is closed
    #[default]
    Closed,
}

/// Kind of trade transaction report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TradeTransactionReportType {
    /// Pending order placed
    #[default]
    OrderOpened,
    /// Pending order cancelled
    OrderCanceled,
    /// Pending order expired
    OrderExpired,
    /// Order filled
    OrderFilled,
    /// Stop order triggered
    OrderActivated,
    /// Position opened
    PositionOpened,
    /// Position closed
    PositionClosed,
    /// Deposit, withdrawal or other balance change
    BalanceTransaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Calculated.is_terminal());
        assert!(OrderStatus::PartiallyFilled.is_working());
    }

    #[test]
    fn test_order_type_requirements() {
        assert!(OrderType::Limit.requires_price());
        assert!(OrderType::StopLimit.requires_stop_price());
        assert!(!OrderType::Market.is_pending());
    }

    #[test]
    fn test_periodicity_duration() {
        assert_eq!(Periodicity::M5.duration(), Duration::minutes(5));
        assert_eq!(Periodicity::H4.to_string(), "H4");
    }

    #[test]
    fn test_logout_reason_retryable() {
        assert!(LogoutReason::NetworkError.is_retryable());
        assert!(LogoutReason::ServerLogout.is_retryable());
        assert!(!LogoutReason::InvalidCredentials.is_retryable());
        assert!(!LogoutReason::ClientInitiated.is_retryable());
    }

    #[test]
    fn test_quote_depth_levels() {
        assert_eq!(QuoteDepth::Top.levels(), Some(1));
        assert_eq!(QuoteDepth::Levels(5).levels(), Some(5));
        assert_eq!(QuoteDepth::Full.levels(), None);
    }
}
