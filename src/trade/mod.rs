//! Order entry and trade capture session.
//!
//! [`DataTrade`] keeps an order entry connection (orders, positions, account)
//! and a trade capture connection (booked trade reports) logged in together.
//! Account info, working orders and net positions are cached and kept
//! current from server reports.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rust_decimal::Decimal;
//! use tradelink_rs::config::ConnectionSettings;
//! use tradelink_rs::models::{NewOrderBuilder, OrderSide, OrderType};
//! use tradelink_rs::transport::mock::{MockOrderEntry, MockTradeCapture};
//! use tradelink_rs::DataTrade;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tradelink_rs::Result<()> {
//! let settings = ConnectionSettings::new("trade.example.com", "100500", "secret");
//! let trade = DataTrade::new(
//!     settings,
//!     Arc::new(MockOrderEntry::default()),
//!     Arc::new(MockTradeCapture::new()),
//! );
//!
//! trade.start()?;
//! trade.wait_for_logon(Duration::from_secs(5)).await?;
//!
//! let order = NewOrderBuilder::new("EURUSD", OrderSide::Buy, OrderType::Limit, Decimal::from(1000))
//!     .price(Decimal::new(105, 2))
//!     .build()?;
//! let report = trade.new_order(&order, Duration::from_secs(5)).await?;
//! println!("placed {}", report);
//!
//! trade.stop().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod events;

pub use events::TradeEvent;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use self::cache::TradeCache;
use crate::config::ConnectionSettings;
use crate::history::{self, ChunkedStream};
use crate::models::{
    AccountInfo, Credentials, ExecutionReport, LoginOutcome, LogoutInfo, LogoutReason,
    NewOrderRequest, Order, OrderId, Position, RejectReason, ReplaceOrderRequest, SessionInfo,
    TradeTransactionReport,
};
use crate::session::{
    logout_from_error, request, EndSender, InitFlags, Link, LogonState, SessionCore,
    SessionLinks, SubscriptionId,
};
use crate::transport::{
    CallbackReceiver, OrderEntryCallback, OrderEntryClient, TradeCaptureCallback,
    TradeCaptureClient,
};
use crate::{Error, Result};

const ORDER_ENTRY_LOGIN: InitFlags = InitFlags::from_bits(1 << 0);
const TRADE_CAPTURE_LOGIN: InitFlags = InitFlags::from_bits(1 << 1);
const SESSION_INFO: InitFlags = InitFlags::from_bits(1 << 2);
const ACCOUNT_INFO: InitFlags = InitFlags::from_bits(1 << 3);
const ORDERS: InitFlags = InitFlags::from_bits(1 << 4);
const POSITIONS: InitFlags = InitFlags::from_bits(1 << 5);
const TRADE_REPORTS: InitFlags = InitFlags::from_bits(1 << 6);

const ALL: InitFlags = ORDER_ENTRY_LOGIN
    .union(TRADE_CAPTURE_LOGIN)
    .union(SESSION_INFO)
    .union(ACCOUNT_INFO)
    .union(ORDERS)
    .union(POSITIONS)
    .union(TRADE_REPORTS);
const RELOAD_ALL: InitFlags = SESSION_INFO
    .union(ACCOUNT_INFO)
    .union(ORDERS)
    .union(POSITIONS);

fn login_flag(link: Link) -> InitFlags {
    match link {
        Link::Primary => ORDER_ENTRY_LOGIN,
        Link::Secondary => TRADE_CAPTURE_LOGIN,
    }
}

fn check_rejects(reports: &[ExecutionReport]) -> Result<()> {
    match reports.iter().find(|report| report.is_rejected()) {
        Some(rejected) => Err(Error::rejected(
            rejected.reject_reason.unwrap_or(RejectReason::Other),
            rejected.text.clone().unwrap_or_default(),
        )),
        None => Ok(()),
    }
}

/// Pick the final report of a request, turning a rejected report into an error.
fn final_report(mut reports: Vec<ExecutionReport>) -> Result<ExecutionReport> {
    check_rejects(&reports)?;
    reports.pop().ok_or_else(|| {
        Error::rejected(RejectReason::Other, "server returned no execution report")
    })
}

/// Order entry and trade capture connections of a [`DataTrade`].
pub(crate) struct TradeLinks {
    order_entry: Arc<dyn OrderEntryClient>,
    trade_capture: Arc<dyn TradeCaptureClient>,
    skip_cancel: bool,
}

type TradeSession = SessionCore<TradeLinks>;

/// Order entry and trade capture session pair.
///
/// Must be started and stopped inside a Tokio runtime.
pub struct DataTrade {
    inner: Arc<TradeSession>,
}

impl DataTrade {
    /// Create a stopped session over the given protocol clients.
    ///
    /// Trade reports of every kind are subscribed; see
    /// [`with_skip_cancel`](Self::with_skip_cancel).
    pub fn new(
        settings: ConnectionSettings,
        order_entry: Arc<dyn OrderEntryClient>,
        trade_capture: Arc<dyn TradeCaptureClient>,
    ) -> Self {
        Self::build(settings, order_entry, trade_capture, false)
    }

    /// Like [`new`](Self::new), but cancelled and expired orders are left out
    /// of the subscribed trade reports.
    pub fn with_skip_cancel(
        settings: ConnectionSettings,
        order_entry: Arc<dyn OrderEntryClient>,
        trade_capture: Arc<dyn TradeCaptureClient>,
    ) -> Self {
        Self::build(settings, order_entry, trade_capture, true)
    }

    fn build(
        settings: ConnectionSettings,
        order_entry: Arc<dyn OrderEntryClient>,
        trade_capture: Arc<dyn TradeCaptureClient>,
        skip_cancel: bool,
    ) -> Self {
        let links = TradeLinks {
            order_entry,
            trade_capture,
            skip_cancel,
        };
        Self {
            inner: Arc::new(SessionCore::new(settings, links)),
        }
    }

    /// Settings the session was created with.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// Start the dispatch task and the first connect attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the session is running, or
    /// [`Error::Config`] for invalid settings.
    pub fn start(&self) -> Result<()> {
        self.inner.start()
    }

    /// Log out both connections, publish the final events and stop the
    /// dispatch task.
    pub async fn stop(&self) {
        self.inner.stop().await
    }

    /// Register an event handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TradeEvent) + Send + Sync + 'static,
    {
        self.inner.subscribe(handler)
    }

    /// Remove an event handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Returns `true` once every bootstrap step of the current attempt completed.
    pub fn is_logged_on(&self) -> bool {
        self.inner.is_logged_on()
    }

    /// Current login state.
    pub fn logon_state(&self) -> LogonState {
        self.inner.logon_state()
    }

    /// Wait until the current connect attempt logs on or ends.
    pub async fn wait_for_logon(&self, timeout: Duration) -> Result<()> {
        self.inner.wait_for_logon(timeout).await
    }

    /// Answer a pending two-factor challenge on every connection that asked.
    pub async fn two_factor_response(&self, one_time_password: &str, timeout: Duration) -> Result<()> {
        self.inner.two_factor_response(one_time_password, timeout).await
    }

    /// Extend the two-factor session on both connections.
    pub async fn two_factor_resume(&self, timeout: Duration) -> Result<DateTime<Utc>> {
        self.inner.two_factor_resume(timeout).await
    }

    /// Expiry of the current two-factor session, if any.
    pub async fn two_factor_expire(&self) -> Option<DateTime<Utc>> {
        self.inner.two_factor_expire().await
    }

    fn ensure_logged_on(&self) -> Result<()> {
        self.inner.ensure_logged_on()
    }

    // Order entry requests

    /// Place an order; returns the last execution report of the request.
    ///
    /// # Errors
    ///
    /// A server reject is returned as [`Error::Rejected`].
    pub async fn new_order(&self, order: &NewOrderRequest, timeout: Duration) -> Result<ExecutionReport> {
        self.ensure_logged_on()?;
        let reports = request(timeout, self.inner.links.order_entry.new_order(order)).await?;
        let report = final_report(reports)?;
        debug!(order_id = %report.order_id, symbol = %report.symbol, "Order placed");
        Ok(report)
    }

    /// Modify a working order.
    pub async fn replace_order(&self, replace: &ReplaceOrderRequest, timeout: Duration) -> Result<ExecutionReport> {
        if replace.is_empty() {
            return Err(Error::InvalidInput(format!(
                "replace request for order {} changes nothing",
                replace.order_id
            )));
        }
        self.ensure_logged_on()?;
        let reports = request(timeout, self.inner.links.order_entry.replace_order(replace)).await?;
        final_report(reports)
    }

    /// Cancel a working order.
    pub async fn cancel_order(&self, order_id: &OrderId, timeout: Duration) -> Result<ExecutionReport> {
        self.ensure_logged_on()?;
        let reports = request(timeout, self.inner.links.order_entry.cancel_order(order_id)).await?;
        final_report(reports)
    }

    /// Close a gross position fully (`None`) or by `amount`.
    pub async fn close_position(
        &self,
        order_id: &OrderId,
        amount: Option<Decimal>,
        timeout: Duration,
    ) -> Result<ExecutionReport> {
        if let Some(amount) = amount {
            if amount <= Decimal::ZERO {
                return Err(Error::InvalidInput(format!(
                    "close amount must be positive, got {}",
                    amount
                )));
            }
        }
        self.ensure_logged_on()?;
        let reports = request(timeout, self.inner.links.order_entry.close_position(order_id, amount)).await?;
        final_report(reports)
    }

    /// Close two opposite gross positions against each other.
    ///
    /// Returns the reports for both positions.
    pub async fn close_position_by(
        &self,
        order_id: &OrderId,
        by_order_id: &OrderId,
        timeout: Duration,
    ) -> Result<Vec<ExecutionReport>> {
        if order_id == by_order_id {
            return Err(Error::InvalidInput(format!(
                "cannot close position {} by itself",
                order_id
            )));
        }
        self.ensure_logged_on()?;
        let reports = request(
            timeout,
            self.inner.links.order_entry.close_position_by(order_id, by_order_id),
        )
        .await?;
        check_rejects(&reports)?;
        Ok(reports)
    }

    /// Fetch the account snapshot, store it and publish it.
    pub async fn refresh_account_info(&self, timeout: Duration) -> Result<AccountInfo> {
        self.ensure_logged_on()?;
        let account = request(timeout, self.inner.links.order_entry.account_info()).await?;
        self.inner
            .state
            .write()
            .await
            .cache
            .set_account_info(account.clone());
        self.inner
            .publish(TradeEvent::AccountInfo(account.clone()))
            .await;
        Ok(account)
    }

    /// Trade reports booked in `[from, to]`, oldest first.
    pub fn trade_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        skip_cancel: bool,
        chunk: usize,
    ) -> ChunkedStream<TradeTransactionReport> {
        if !self.is_logged_on() {
            return ChunkedStream::failed(Error::NotLoggedOn);
        }
        history::trade_history(
            self.inner.links.trade_capture.clone(),
            from,
            to,
            skip_cancel,
            chunk,
            self.inner.settings.operation_timeout,
        )
    }

    // Cache

    /// Cached session info.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.inner.state.read().await.cache.session_info()
    }

    /// Cached account info.
    pub async fn account_info(&self) -> Option<AccountInfo> {
        self.inner.state.read().await.cache.account_info()
    }

    /// Working orders and gross positions, by order id.
    pub async fn orders(&self) -> Vec<Order> {
        self.inner.state.read().await.cache.orders()
    }

    /// Cached order by id.
    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.inner.state.read().await.cache.order(order_id)
    }

    /// Net positions, by symbol.
    pub async fn positions(&self) -> Vec<Position> {
        self.inner.state.read().await.cache.positions()
    }

    /// Net position of a symbol.
    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.inner.state.read().await.cache.position(symbol)
    }
}

impl Drop for DataTrade {
    fn drop(&mut self) {
        self.inner.abort();
    }
}

impl std::fmt::Debug for DataTrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTrade")
            .field("address", &self.inner.settings.address)
            .field("state", &self.inner.logon_state())
            .finish()
    }
}

#[async_trait]
impl SessionLinks for TradeLinks {
    type Event = TradeEvent;
    type Cache = TradeCache;

    const NAME: &'static str = "trade";
    const REQUIRED: InitFlags = ALL;
    const RELOAD_REQUIRED: InitFlags = RELOAD_ALL;

    fn login_flag(link: Link) -> InitFlags {
        login_flag(link)
    }

    async fn connect(session: &Arc<TradeSession>, generation: u64, end: &EndSender) -> Result<()> {
        let settings = &session.settings;
        let links = &session.links;
        let (order_entry_rx, trade_capture_rx) = tokio::try_join!(
            links.order_entry.connect(&settings.address, settings.order_entry_port),
            links.trade_capture.connect(&settings.address, settings.trade_capture_port),
        )?;
        session
            .tasks
            .spawn(session.clone().read_order_entry(generation, order_entry_rx, end.clone()));
        session
            .tasks
            .spawn(session.clone().read_trade_capture(trade_capture_rx, end.clone()));
        Ok(())
    }

    async fn login(&self, link: Link, credentials: &Credentials) -> Result<LoginOutcome> {
        match link {
            Link::Primary => self.order_entry.login(credentials).await,
            Link::Secondary => self.trade_capture.login(credentials).await,
        }
    }

    async fn two_factor_response(&self, link: Link, one_time_password: &str) -> Result<DateTime<Utc>> {
        match link {
            Link::Primary => self.order_entry.two_factor_response(one_time_password).await,
            Link::Secondary => self.trade_capture.two_factor_response(one_time_password).await,
        }
    }

    async fn two_factor_resume(&self, link: Link) -> Result<DateTime<Utc>> {
        match link {
            Link::Primary => self.order_entry.two_factor_resume().await,
            Link::Secondary => self.trade_capture.two_factor_resume().await,
        }
    }

    async fn logout(&self, link: Link, message: &str) -> Result<LogoutInfo> {
        match link {
            Link::Primary => self.order_entry.logout(message).await,
            Link::Secondary => self.trade_capture.logout(message).await,
        }
    }

    async fn disconnect(&self, link: Link, text: &str) {
        match link {
            Link::Primary => self.order_entry.disconnect(text).await,
            Link::Secondary => self.trade_capture.disconnect(text).await,
        }
    }

    fn on_link_login(session: &Arc<TradeSession>, link: Link, generation: u64, end: EndSender) {
        let task = session.clone();
        match link {
            Link::Primary => session.tasks.spawn(task.bootstrap(generation, end)),
            Link::Secondary => session.tasks.spawn(task.subscribe_trade_reports(generation, end)),
        }
    }

    fn reload(session: &Arc<TradeSession>, generation: u64, reload: u64) {
        session.tasks.spawn(session.clone().run_reload(generation, reload));
    }

    async fn before_logout(&self, timeout: Duration) -> Result<()> {
        request(timeout, self.trade_capture.unsubscribe_trades()).await
    }
}

impl TradeSession {
    async fn bootstrap(self: Arc<Self>, generation: u64, end: EndSender) {
        let result = tokio::try_join!(
            self.load_session_info(generation, None),
            self.load_account_info(generation, None),
            self.load_orders(generation, None),
            self.load_positions(generation, None),
        );
        if let Err(e) = result {
            warn!(error = %e, "Trade bootstrap failed");
            let _ = end.send(logout_from_error(&e, LogoutReason::InternalServerError));
        }
    }

    async fn subscribe_trade_reports(self: Arc<Self>, generation: u64, end: EndSender) {
        let skip_cancel = self.links.skip_cancel;
        let result = request(
            self.settings.operation_timeout,
            self.links.trade_capture.subscribe_trades(skip_cancel),
        )
        .await;
        match result {
            Ok(()) => {
                debug!(skip_cancel, "Subscribed to trade reports");
                if let Some(step) = self.complete_step(generation, None, TRADE_REPORTS, |_| {}).await {
                    self.finish_step(generation, step).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Trade report subscription failed");
                let _ = end.send(logout_from_error(&e, LogoutReason::InternalServerError));
            }
        }
    }

    async fn run_reload(self: Arc<Self>, generation: u64, reload: u64) {
        let result = tokio::try_join!(
            self.load_session_info(generation, Some(reload)),
            self.load_account_info(generation, Some(reload)),
            self.load_orders(generation, Some(reload)),
            self.load_positions(generation, Some(reload)),
        );
        if let Err(e) = result {
            self.reload_failed(&e).await;
        }
    }

    async fn load_session_info(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let info = request(self.settings.operation_timeout, self.links.order_entry.session_info()).await?;
        let step = self
            .complete_step(generation, reload, SESSION_INFO, |cache| {
                cache.set_session_info(info.clone())
            })
            .await;
        if let Some(step) = step {
            self.publish(TradeEvent::SessionInfo(info)).await;
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    async fn load_account_info(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let account =
            request(self.settings.operation_timeout, self.links.order_entry.account_info()).await?;
        let step = self
            .complete_step(generation, reload, ACCOUNT_INFO, |cache| {
                cache.set_account_info(account.clone())
            })
            .await;
        if let Some(step) = step {
            self.publish(TradeEvent::AccountInfo(account)).await;
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    async fn load_orders(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let orders = request(self.settings.operation_timeout, self.links.order_entry.orders()).await?;
        let count = orders.len();
        let step = self
            .complete_step(generation, reload, ORDERS, |cache| cache.replace_orders(orders))
            .await;
        if let Some(step) = step {
            debug!(count, "Orders loaded");
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    async fn load_positions(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let positions =
            request(self.settings.operation_timeout, self.links.order_entry.positions()).await?;
        let count = positions.len();
        let step = self
            .complete_step(generation, reload, POSITIONS, |cache| {
                cache.replace_positions(positions)
            })
            .await;
        if let Some(step) = step {
            debug!(count, "Positions loaded");
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    async fn read_order_entry(
        self: Arc<Self>,
        generation: u64,
        mut rx: CallbackReceiver<OrderEntryCallback>,
        end: EndSender,
    ) {
        while let Some(callback) = rx.recv().await {
            if self.settings.log_messages {
                debug!(link = "order_entry", message = ?callback, "Callback received");
            }
            match callback {
                OrderEntryCallback::Logout(info) => {
                    let _ = end.send(info);
                    return;
                }
                OrderEntryCallback::Disconnected(text) => {
                    let _ = end.send(LogoutInfo::new(LogoutReason::NetworkError, text));
                    return;
                }
                OrderEntryCallback::SessionInfoUpdate(info) => {
                    if self
                        .update_cache(generation, |cache| cache.set_session_info(info.clone()))
                        .await
                    {
                        self.publish(TradeEvent::SessionInfo(info)).await;
                    }
                }
                OrderEntryCallback::ExecutionReport(report) => {
                    if self
                        .update_cache(generation, |cache| cache.apply_execution_report(&report))
                        .await
                    {
                        self.publish(TradeEvent::ExecutionReport(report)).await;
                    }
                }
                OrderEntryCallback::PositionUpdate(position) => {
                    if self
                        .update_cache(generation, |cache| cache.apply_position(position.clone()))
                        .await
                    {
                        self.publish(TradeEvent::PositionReport(position)).await;
                    }
                }
                OrderEntryCallback::AccountInfoUpdate(account) => {
                    if self
                        .update_cache(generation, |cache| cache.set_account_info(account.clone()))
                        .await
                    {
                        self.publish(TradeEvent::AccountInfo(account)).await;
                    }
                }
                OrderEntryCallback::BalanceOperation(operation) => {
                    if self
                        .update_cache(generation, |cache| cache.apply_balance(&operation))
                        .await
                    {
                        self.publish(TradeEvent::BalanceOperation(operation)).await;
                    }
                }
                OrderEntryCallback::Notification(notification) if notification.is_config_updated() => {
                    self.on_config_updated(generation).await;
                }
                OrderEntryCallback::Notification(notification) => {
                    self.publish(TradeEvent::Notification(notification)).await;
                }
            }
        }
        let _ = end.send(LogoutInfo::new(
            LogoutReason::NetworkError,
            "order entry connection lost",
        ));
    }

    async fn read_trade_capture(
        self: Arc<Self>,
        mut rx: CallbackReceiver<TradeCaptureCallback>,
        end: EndSender,
    ) {
        while let Some(callback) = rx.recv().await {
            if self.settings.log_messages {
                debug!(link = "trade_capture", message = ?callback, "Callback received");
            }
            match callback {
                TradeCaptureCallback::Logout(info) => {
                    let _ = end.send(info);
                    return;
                }
                TradeCaptureCallback::Disconnected(text) => {
                    let _ = end.send(LogoutInfo::new(LogoutReason::NetworkError, text));
                    return;
                }
                TradeCaptureCallback::TradeUpdate(report) => {
                    self.publish(TradeEvent::TradeTransactionReport(report)).await;
                }
                TradeCaptureCallback::Notification(notification) => {
                    self.publish(TradeEvent::Notification(notification)).await;
                }
            }
        }
        let _ = end.send(LogoutInfo::new(
            LogoutReason::NetworkError,
            "trade capture connection lost",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionType, OrderStatus};

    #[test]
    fn test_flag_masks() {
        assert!(ALL.contains(RELOAD_ALL));
        assert!(!RELOAD_ALL.contains(TRADE_REPORTS));
        assert_eq!(ALL.bits(), 0b111_1111);
    }

    #[test]
    fn test_final_report() {
        let new = ExecutionReport {
            order_id: "7".into(),
            execution_type: ExecutionType::New,
            ..Default::default()
        };
        let fill = ExecutionReport {
            execution_type: ExecutionType::Trade,
            order_status: OrderStatus::Calculated,
            ..new.clone()
        };
        assert_eq!(final_report(vec![new.clone(), fill.clone()]).unwrap(), fill);

        let rejected = ExecutionReport {
            execution_type: ExecutionType::Rejected,
            order_status: OrderStatus::Rejected,
            reject_reason: Some(RejectReason::OffQuotes),
            text: Some("no prices".into()),
            ..new
        };
        let err = final_report(vec![rejected]).unwrap_err();
        assert_eq!(err, Error::rejected(RejectReason::OffQuotes, "no prices"));

        assert!(final_report(Vec::new()).unwrap_err().is_reject());
    }
}
