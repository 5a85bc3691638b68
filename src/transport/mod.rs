//! Protocol client seams.
//!
//! The quote feed, quote store, order entry and trade capture protocols are
//! implemented outside this crate. A wrapper talks to each of them through
//! the traits below: requests are async methods, and server-initiated
//! messages arrive on the callback receiver returned by
//! [`Connection::connect`]. When that receiver ends, the connection is gone.
//!
//! [`mock`] provides in-memory implementations for tests and demos.

pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use crate::models::{
    AccountInfo, BalanceOperation, Bar, Credentials, CurrencyInfo, ExecutionReport, HistoryInfo,
    LoginOutcome, LogoutInfo, NewOrderRequest, Notification, Order, OrderId, Periodicity, Position,
    PriceType, Quote, QuoteDepth, ReplaceOrderRequest, SessionInfo, SymbolInfo,
    TradeTransactionReport,
};
use crate::Result;

/// Receiver for server-initiated messages of one connection.
pub type CallbackReceiver<C> = mpsc::UnboundedReceiver<C>;

/// Sender side handed out by transports.
pub type CallbackSender<C> = mpsc::UnboundedSender<C>;

/// Lifecycle shared by the four protocol clients.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Server-initiated message type of this connection.
    type Callback: Send + 'static;

    /// Open the connection; the returned receiver yields server messages
    /// until the connection drops.
    async fn connect(&self, address: &str, port: u16) -> Result<CallbackReceiver<Self::Callback>>;

    /// Log in. A refused login is an error; a two-factor challenge is
    /// [`LoginOutcome::TwoFactorRequired`].
    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome>;

    /// Answer a two-factor challenge; returns the two-factor session expiry.
    async fn two_factor_response(&self, one_time_password: &str) -> Result<DateTime<Utc>>;

    /// Extend the two-factor session; returns the new expiry.
    async fn two_factor_resume(&self) -> Result<DateTime<Utc>>;

    /// Log out gracefully.
    async fn logout(&self, message: &str) -> Result<LogoutInfo>;

    /// Drop the connection without logging out.
    async fn disconnect(&self, text: &str);
}

/// Server-initiated messages on the quote feed connection.
#[derive(Debug, Clone)]
pub enum QuoteFeedCallback {
    /// Server ended the session
    Logout(LogoutInfo),
    /// Transport dropped
    Disconnected(String),
    /// Session schedule changed
    SessionInfoUpdate(SessionInfo),
    /// Subscribed quote changed
    QuoteUpdate(Quote),
    /// Server notification
    Notification(Notification),
}

/// Server-initiated messages on the quote store connection.
#[derive(Debug, Clone)]
pub enum QuoteStoreCallback {
    /// Server ended the session
    Logout(LogoutInfo),
    /// Transport dropped
    Disconnected(String),
    /// Server notification
    Notification(Notification),
}

/// Server-initiated messages on the order entry connection.
#[derive(Debug, Clone)]
pub enum OrderEntryCallback {
    /// Server ended the session
    Logout(LogoutInfo),
    /// Transport dropped
    Disconnected(String),
    /// Session schedule changed
    SessionInfoUpdate(SessionInfo),
    /// Order changed
    ExecutionReport(ExecutionReport),
    /// Position changed
    PositionUpdate(Position),
    /// Account changed
    AccountInfoUpdate(AccountInfo),
    /// Balance changed
    BalanceOperation(BalanceOperation),
    /// Server notification
    Notification(Notification),
}

/// Server-initiated messages on the trade capture connection.
#[derive(Debug, Clone)]
pub enum TradeCaptureCallback {
    /// Server ended the session
    Logout(LogoutInfo),
    /// Transport dropped
    Disconnected(String),
    /// Trade booked
    TradeUpdate(TradeTransactionReport),
    /// Server notification
    Notification(Notification),
}

/// Real-time quote connection.
#[async_trait]
pub trait QuoteFeedClient: Connection<Callback = QuoteFeedCallback> {
    /// Current trading session.
    async fn session_info(&self) -> Result<SessionInfo>;

    /// All currencies.
    async fn currency_list(&self) -> Result<Vec<CurrencyInfo>>;

    /// All symbols.
    async fn symbol_list(&self) -> Result<Vec<SymbolInfo>>;

    /// Subscribe to quotes; returns the current snapshots.
    async fn subscribe_quotes(&self, symbols: &[String], depth: QuoteDepth) -> Result<Vec<Quote>>;

    /// Stop quote updates for the symbols.
    async fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<()>;

    /// One-off snapshots without subscribing.
    async fn quotes(&self, symbols: &[String], depth: QuoteDepth) -> Result<Vec<Quote>>;
}

/// Quote history connection.
///
/// History requests take a signed `count`: positive walks forward from
/// `from` (inclusive, oldest first), negative walks backward from `from`
/// (inclusive, newest first).
#[async_trait]
pub trait QuoteStoreClient: Connection<Callback = QuoteStoreCallback> {
    /// Symbols with stored history.
    async fn symbol_list(&self) -> Result<Vec<String>>;

    /// Up to `|count|` bars starting at `from`.
    async fn bar_list(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
        from: DateTime<Utc>,
        count: i32,
    ) -> Result<Vec<Bar>>;

    /// Up to `|count|` ticks starting at `from`.
    async fn quote_list(
        &self,
        symbol: &str,
        depth: QuoteDepth,
        from: DateTime<Utc>,
        count: i32,
    ) -> Result<Vec<Quote>>;

    /// Stored bar range.
    async fn bars_history_info(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
    ) -> Result<HistoryInfo>;

    /// Stored tick range.
    async fn quotes_history_info(&self, symbol: &str, depth: QuoteDepth) -> Result<HistoryInfo>;
}

/// Order entry connection.
///
/// Order requests return the execution reports of the request. The same
/// reports are also published as [`OrderEntryCallback::ExecutionReport`];
/// the trade cache is updated from the callbacks only.
#[async_trait]
pub trait OrderEntryClient: Connection<Callback = OrderEntryCallback> {
    /// Current trading session.
    async fn session_info(&self) -> Result<SessionInfo>;

    /// Account snapshot.
    async fn account_info(&self) -> Result<AccountInfo>;

    /// Working orders and gross positions.
    async fn orders(&self) -> Result<Vec<Order>>;

    /// Net positions.
    async fn positions(&self) -> Result<Vec<Position>>;

    /// Place an order.
    async fn new_order(&self, request: &NewOrderRequest) -> Result<Vec<ExecutionReport>>;

    /// Modify a working order.
    async fn replace_order(&self, request: &ReplaceOrderRequest) -> Result<Vec<ExecutionReport>>;

    /// Cancel a working order.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Vec<ExecutionReport>>;

    /// Close a gross position fully (`None`) or partially.
    async fn close_position(
        &self,
        order_id: &OrderId,
        amount: Option<Decimal>,
    ) -> Result<Vec<ExecutionReport>>;

    /// Close two opposite gross positions against each other.
    async fn close_position_by(
        &self,
        order_id: &OrderId,
        by_order_id: &OrderId,
    ) -> Result<Vec<ExecutionReport>>;
}

/// Trade capture connection.
#[async_trait]
pub trait TradeCaptureClient: Connection<Callback = TradeCaptureCallback> {
    /// Start publishing trade reports; cancellations are skipped when asked.
    async fn subscribe_trades(&self, skip_cancel: bool) -> Result<()>;

    /// Stop publishing trade reports.
    async fn unsubscribe_trades(&self) -> Result<()>;

    /// Up to `count` reports booked in `[from, to]`, oldest first.
    async fn trade_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        skip_cancel: bool,
        count: usize,
    ) -> Result<Vec<TradeTransactionReport>>;
}
