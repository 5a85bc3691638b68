//! Integration tests for the order entry session.
//!
//! Every test drives a `DataTrade` against the in-memory order entry and
//! trade capture, so no server is needed.
//!
//! Run with: cargo test --test trade_tests

use std::sync::{Arc, Once};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

use tradelink_rs::models::{
    Notification, NotificationSeverity, NotificationType, TradeTransactionReportType,
    TwoFactorReason,
};
use tradelink_rs::prelude::*;
use tradelink_rs::transport::mock::{MockOrderEntry, MockTradeCapture};
use tradelink_rs::transport::OrderEntryCallback;

static INIT: Once = Once::new();

/// Initialize logging for tests
fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

const TIMEOUT: Duration = Duration::from_secs(5);

fn test_settings() -> ConnectionSettings {
    ConnectionSettings::new("localhost", "100500", "secret")
        .with_operation_timeout(Duration::from_secs(2))
        .with_reconnect(
            ReconnectConfig::default()
                .with_backoff(Duration::from_millis(20), Duration::from_millis(100)),
        )
}

struct Harness {
    trade: DataTrade,
    order_entry: Arc<MockOrderEntry>,
    trade_capture: Arc<MockTradeCapture>,
    events: Arc<Mutex<Vec<TradeEvent>>>,
}

impl Harness {
    fn new(account_type: AccountType) -> Self {
        init_logging();
        let order_entry = Arc::new(MockOrderEntry::new(account_type));
        let trade_capture = Arc::new(MockTradeCapture::new());
        let trade = DataTrade::new(test_settings(), order_entry.clone(), trade_capture.clone());
        Self::wrap(trade, order_entry, trade_capture)
    }

    fn wrap(
        trade: DataTrade,
        order_entry: Arc<MockOrderEntry>,
        trade_capture: Arc<MockTradeCapture>,
    ) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        trade.subscribe(move |event: &TradeEvent| sink.lock().push(event.clone()));
        Self {
            trade,
            order_entry,
            trade_capture,
            events,
        }
    }

    async fn start(self) -> Self {
        self.trade.start().unwrap();
        self.trade.wait_for_logon(TIMEOUT).await.unwrap();
        self
    }

    async fn gross() -> Self {
        Self::new(AccountType::Gross).start().await
    }

    fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    fn has(&self, matches: impl Fn(&TradeEvent) -> bool) -> bool {
        self.events.lock().iter().any(matches)
    }

    /// Wait until the report for `order_id` with `status` was dispatched,
    /// which means the cache already holds it.
    async fn wait_for_report(&self, order_id: &OrderId, status: OrderStatus) {
        eventually("execution report", || {
            self.has(|e| {
                matches!(e, TradeEvent::ExecutionReport(r)
                    if &r.order_id == order_id && r.order_status == status)
            })
        })
        .await;
    }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn limit_buy(price: rust_decimal::Decimal) -> NewOrderRequest {
    NewOrderBuilder::new("EURUSD", OrderSide::Buy, OrderType::Limit, dec!(1000))
        .price(price)
        .build()
        .unwrap()
}

fn market(side: OrderSide, amount: rust_decimal::Decimal) -> NewOrderRequest {
    NewOrderBuilder::new("EURUSD", side, OrderType::Market, amount)
        .build()
        .unwrap()
}

// =============================================================================
// Login and Cache Tests
// =============================================================================

mod logon {
    use super::*;

    #[tokio::test]
    async fn test_logon_loads_account_state() {
        let h = Harness::new(AccountType::Net);
        h.order_entry.insert_order(Order {
            order_id: OrderId::new("77"),
            symbol: "GBPUSD".into(),
            order_type: OrderType::Limit,
            status: OrderStatus::New,
            price: Some(dec!(1.2)),
            initial_amount: dec!(1000),
            remaining_amount: dec!(1000),
            ..Default::default()
        });
        h.order_entry.insert_position(Position {
            symbol: "EURUSD".into(),
            buy_amount: dec!(5000),
            buy_price: Some(dec!(1.08)),
            ..Default::default()
        });
        let h = h.start().await;

        let account = h.trade.account_info().await.unwrap();
        assert_eq!(account.account_type, AccountType::Net);
        assert_eq!(account.balance, dec!(10000));
        assert!(h.trade.session_info().await.is_some());

        let orders = h.trade.orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id.as_str(), "77");
        assert_eq!(
            h.trade.position("EURUSD").await.unwrap().net_amount(),
            dec!(5000)
        );

        assert!(h.trade_capture.is_subscribed());
        eventually("logon event", || h.count("Logon") == 1).await;
        assert_eq!(h.count("AccountInfo"), 1);
        assert_eq!(h.count("SessionInfo"), 1);

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_requests_require_logon() {
        let h = Harness::new(AccountType::Gross);
        let err = h
            .trade
            .new_order(&market(OrderSide::Buy, dec!(1000)), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotLoggedOn);
        assert!(h.trade.account_info().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_and_logs_out() {
        let h = Harness::gross().await;
        h.trade.stop().await;

        assert!(!h.trade_capture.is_subscribed());
        assert!(!h.order_entry.link().is_connected());
        assert_eq!(h.trade.logon_state(), LogonState::Stopped);
        eventually("client logout", || {
            h.has(|e| matches!(e, TradeEvent::Logout(info)
                if info.reason == LogoutReason::ClientInitiated))
        })
        .await;
    }

    #[tokio::test]
    async fn test_trade_capture_loss_reconnects() {
        let h = Harness::gross().await;
        h.trade_capture.link().drop_connection();

        eventually("second logon", || h.count("Logon") == 2 && h.trade.is_logged_on()).await;
        assert_eq!(h.trade_capture.link().request_count("subscribe_trades"), 2);
        assert_eq!(h.order_entry.link().request_count("account_info"), 2);

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_two_factor_login() {
        let h = Harness::new(AccountType::Gross);
        let expire = Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap();
        h.order_entry.link().require_two_factor("otp", expire);
        h.trade_capture.link().require_two_factor("otp", expire);
        h.trade.start().unwrap();

        eventually("two-factor request", || {
            h.has(|e| matches!(e, TradeEvent::TwoFactorAuth(a) if a.reason == TwoFactorReason::ServerRequest))
        })
        .await;
        h.trade.two_factor_response("otp", TIMEOUT).await.unwrap();
        eventually("logon", || h.trade.is_logged_on()).await;

        assert_eq!(h.order_entry.link().request_count("two_factor_response"), 1);
        assert_eq!(h.trade_capture.link().request_count("two_factor_response"), 1);
        assert_eq!(
            h.events
                .lock()
                .iter()
                .filter(|e| matches!(e, TradeEvent::TwoFactorAuth(a) if a.reason == TwoFactorReason::ServerRequest))
                .count(),
            1
        );
        assert!(h.trade_capture.is_subscribed());
        assert_eq!(h.trade.two_factor_expire().await, Some(expire));

        h.trade.stop().await;
    }
}

// =============================================================================
// Order Tests
// =============================================================================

mod orders {
    use super::*;

    #[tokio::test]
    async fn test_limit_order_lifecycle() {
        let h = Harness::gross().await;

        let placed = h.trade.new_order(&limit_buy(dec!(1.05)), TIMEOUT).await.unwrap();
        assert_eq!(placed.execution_type, ExecutionType::New);
        assert_eq!(placed.order_status, OrderStatus::New);
        h.wait_for_report(&placed.order_id, OrderStatus::New).await;
        assert_eq!(
            h.trade.order(placed.order_id.as_str()).await.unwrap().price,
            Some(dec!(1.05))
        );

        let mut replace = ReplaceOrderRequest::new(placed.order_id.clone(), "EURUSD");
        replace.price = Some(dec!(1.04));
        let replaced = h.trade.replace_order(&replace, TIMEOUT).await.unwrap();
        assert_eq!(replaced.execution_type, ExecutionType::Replace);
        eventually("replace report", || {
            h.has(|e| matches!(e, TradeEvent::ExecutionReport(r) if r.execution_type == ExecutionType::Replace))
        })
        .await;
        assert_eq!(
            h.trade.order(placed.order_id.as_str()).await.unwrap().price,
            Some(dec!(1.04))
        );

        let cancelled = h.trade.cancel_order(&placed.order_id, TIMEOUT).await.unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Canceled);
        h.wait_for_report(&placed.order_id, OrderStatus::Canceled).await;
        assert!(h.trade.order(placed.order_id.as_str()).await.is_none());

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_gross_market_order_opens_position_order() {
        let h = Harness::gross().await;
        h.order_entry.set_fill_price(dec!(1.0852));

        let fill = h
            .trade
            .new_order(&market(OrderSide::Buy, dec!(1000)), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(fill.execution_type, ExecutionType::Trade);
        assert_eq!(fill.trade_price, Some(dec!(1.0852)));
        h.wait_for_report(&fill.order_id, OrderStatus::Calculated).await;

        let order = h.trade.order(fill.order_id.as_str()).await.unwrap();
        assert!(order.is_position());
        assert_eq!(order.price, Some(dec!(1.0852)));

        let partial = h
            .trade
            .close_position(&fill.order_id, Some(dec!(400)), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(partial.order_status, OrderStatus::PartiallyFilled);
        h.wait_for_report(&fill.order_id, OrderStatus::PartiallyFilled).await;
        assert_eq!(
            h.trade.order(fill.order_id.as_str()).await.unwrap().remaining_amount,
            dec!(600)
        );

        let closed = h.trade.close_position(&fill.order_id, None, TIMEOUT).await.unwrap();
        assert_eq!(closed.order_status, OrderStatus::Filled);
        h.wait_for_report(&fill.order_id, OrderStatus::Filled).await;
        assert!(h.trade.orders().await.is_empty());

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_close_position_by_opposite_position() {
        let h = Harness::gross().await;
        let long = h
            .trade
            .new_order(&market(OrderSide::Buy, dec!(1000)), TIMEOUT)
            .await
            .unwrap();
        let short = h
            .trade
            .new_order(&market(OrderSide::Sell, dec!(1000)), TIMEOUT)
            .await
            .unwrap();

        let reports = h
            .trade
            .close_position_by(&long.order_id, &short.order_id, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.order_status == OrderStatus::Filled));

        h.wait_for_report(&short.order_id, OrderStatus::Filled).await;
        assert!(h.trade.orders().await.is_empty());

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_net_market_orders_update_position() {
        let h = Harness::new(AccountType::Net).start().await;

        h.trade
            .new_order(&market(OrderSide::Buy, dec!(3000)), TIMEOUT)
            .await
            .unwrap();
        eventually("position report", || h.count("PositionReport") == 1).await;
        let position = h.trade.position("EURUSD").await.unwrap();
        assert_eq!(position.buy_amount, dec!(3000));
        // Net fills do not leave orders behind
        assert!(h.trade.orders().await.is_empty());

        h.trade
            .new_order(&market(OrderSide::Sell, dec!(3000)), TIMEOUT)
            .await
            .unwrap();
        eventually("flat position report", || h.count("PositionReport") == 2).await;
        assert!(h.trade.position("EURUSD").await.is_none());
        assert!(h.trade.positions().await.is_empty());

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_rejected_order() {
        let h = Harness::gross().await;
        h.order_entry
            .set_reject(Some((RejectReason::InsufficientMargin, "not enough money".into())));

        let err = h
            .trade
            .new_order(&market(OrderSide::Buy, dec!(1000000)), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Rejected {
                reason: RejectReason::InsufficientMargin,
                text: "not enough money".into(),
            }
        );
        assert!(h.trade.orders().await.is_empty());

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_requests_are_not_sent() {
        let h = Harness::gross().await;
        let id = OrderId::new("1");

        let err = h
            .trade
            .replace_order(&ReplaceOrderRequest::new(id.clone(), "EURUSD"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = h
            .trade
            .close_position(&id, Some(dec!(0)), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = h.trade.close_position_by(&id, &id, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(h.order_entry.link().request_count("replace_order"), 0);
        assert_eq!(h.order_entry.link().request_count("close_position"), 0);
        assert_eq!(h.order_entry.link().request_count("close_position_by"), 0);

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let h = Harness::gross().await;
        let err = h
            .trade
            .cancel_order(&OrderId::new("404"), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                reason: RejectReason::UnknownOrder,
                ..
            }
        ));
        h.trade.stop().await;
    }
}

// =============================================================================
// Account Tests
// =============================================================================

mod account {
    use super::*;

    #[tokio::test]
    async fn test_balance_operation_updates_account() {
        let h = Harness::gross().await;
        assert!(h.order_entry.deposit(dec!(500)));

        eventually("balance operation", || h.count("BalanceOperation") == 1).await;
        assert_eq!(h.trade.account_info().await.unwrap().balance, dec!(10500));

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_refresh_account_info() {
        let h = Harness::gross().await;
        let mut account = h.trade.account_info().await.unwrap();
        account.leverage = dec!(50);
        h.order_entry.set_account(account);

        let refreshed = h.trade.refresh_account_info(TIMEOUT).await.unwrap();
        assert_eq!(refreshed.leverage, dec!(50));
        assert_eq!(h.trade.account_info().await.unwrap().leverage, dec!(50));
        eventually("account event", || h.count("AccountInfo") == 2).await;

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_config_update_reloads_orders() {
        let h = Harness::gross().await;
        h.order_entry.insert_order(Order {
            order_id: OrderId::new("500"),
            symbol: "EURUSD".into(),
            order_type: OrderType::Stop,
            stop_price: Some(dec!(1.1)),
            initial_amount: dec!(1000),
            remaining_amount: dec!(1000),
            ..Default::default()
        });
        assert!(h.trade.orders().await.is_empty());

        h.order_entry
            .link()
            .push(OrderEntryCallback::Notification(Notification::new(
                NotificationType::ConfigUpdated,
                NotificationSeverity::Info,
                "account settings changed",
            )));

        eventually("config changed", || h.count("ConfigChanged") == 1).await;
        assert_eq!(h.trade.orders().await.len(), 1);
        assert_eq!(h.count("Logon"), 1);

        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_margin_call_notification_is_forwarded() {
        let h = Harness::gross().await;
        h.order_entry
            .link()
            .push(OrderEntryCallback::Notification(Notification::new(
                NotificationType::MarginCall,
                NotificationSeverity::Warning,
                "margin level 95%",
            )));

        eventually("notification", || {
            h.has(|e| matches!(e, TradeEvent::Notification(n)
                if n.notification_type == NotificationType::MarginCall))
        })
        .await;
        h.trade.stop().await;
    }
}

// =============================================================================
// Trade Report Tests
// =============================================================================

mod reports {
    use super::*;

    fn report(id: &str, report_type: TradeTransactionReportType) -> TradeTransactionReport {
        TradeTransactionReport {
            id: id.to_string(),
            report_type,
            transaction_time: Utc::now(),
            symbol: "EURUSD".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_trade_reports_are_dispatched() {
        let h = Harness::gross().await;
        assert!(h
            .trade_capture
            .emit_trade(report("1", TradeTransactionReportType::PositionOpened)));
        assert!(h
            .trade_capture
            .emit_trade(report("2", TradeTransactionReportType::OrderCanceled)));

        eventually("trade reports", || h.count("TradeTransactionReport") == 2).await;
        h.trade.stop().await;
    }

    #[tokio::test]
    async fn test_skip_cancel_subscription() {
        init_logging();
        let order_entry = Arc::new(MockOrderEntry::default());
        let trade_capture = Arc::new(MockTradeCapture::new());
        let trade =
            DataTrade::with_skip_cancel(test_settings(), order_entry.clone(), trade_capture.clone());
        let h = Harness::wrap(trade, order_entry, trade_capture).start().await;

        assert!(!h
            .trade_capture
            .emit_trade(report("1", TradeTransactionReportType::OrderCanceled)));
        assert!(h
            .trade_capture
            .emit_trade(report("2", TradeTransactionReportType::OrderFilled)));

        eventually("filled report", || h.count("TradeTransactionReport") == 1).await;
        h.trade.stop().await;
    }
}
