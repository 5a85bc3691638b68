//! Integration tests for the quote feed session.
//!
//! Every test drives a `DataFeed` against the in-memory quote feed and quote
//! store, so no server is needed.
//!
//! Run with: cargo test --test feed_tests
//! Set RUST_LOG=tradelink_rs=debug to see the session logs.

use std::sync::{Arc, Once};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

use tradelink_rs::models::{
    LogoutReason, Notification, NotificationSeverity, NotificationType, QuoteEntry, SymbolInfo,
    TwoFactorReason,
};
use tradelink_rs::prelude::*;
use tradelink_rs::transport::mock::{MockQuoteFeed, MockQuoteStore};
use tradelink_rs::transport::{QuoteFeedCallback, QuoteStoreCallback};

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
        .with_connect_timeout(Duration::from_secs(2))
        .with_login_timeout(Duration::from_secs(2))
        .with_operation_timeout(Duration::from_secs(2))
        .with_reconnect(
            ReconnectConfig::default()
                .with_backoff(Duration::from_millis(20), Duration::from_millis(100)),
        )
}

struct Harness {
    feed: DataFeed,
    quote_feed: Arc<MockQuoteFeed>,
    quote_store: Arc<MockQuoteStore>,
    events: Arc<Mutex<Vec<FeedEvent>>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(test_settings())
    }

    fn with_settings(settings: ConnectionSettings) -> Self {
        init_logging();
        let quote_feed = Arc::new(MockQuoteFeed::with_sample_data());
        let quote_store = Arc::new(MockQuoteStore::new());
        let feed = DataFeed::new(settings, quote_feed.clone(), quote_store.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        feed.subscribe(move |event: &FeedEvent| sink.lock().push(event.clone()));

        Self {
            feed,
            quote_feed,
            quote_store,
            events,
        }
    }

    async fn logged_on() -> Self {
        let harness = Self::new();
        harness.feed.start().unwrap();
        harness.feed.wait_for_logon(TIMEOUT).await.unwrap();
        harness
    }

    fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    fn has(&self, matches: impl Fn(&FeedEvent) -> bool) -> bool {
        self.events.lock().iter().any(matches)
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

// =============================================================================
// Login and Cache Tests
// =============================================================================

mod logon {
    use super::*;

    #[tokio::test]
    async fn test_logon_loads_reference_data() {
        let h = Harness::logged_on().await;

        assert!(h.feed.is_logged_on());
        assert_eq!(h.feed.logon_state(), LogonState::LoggedOn);

        let symbols: Vec<String> = h.feed.symbols().await.into_iter().map(|s| s.name).collect();
        assert_eq!(symbols, vec!["EURUSD", "GBPUSD", "USDJPY"]);

        let currencies: Vec<String> =
            h.feed.currencies().await.into_iter().map(|c| c.name).collect();
        assert_eq!(currencies, vec!["USD", "EUR", "GBP", "JPY"]);

        let session = h.feed.session_info().await.unwrap();
        assert!(session.is_open());
        assert_eq!(h.feed.symbol("USDJPY").await.unwrap().precision, 3);

        eventually("logon event", || h.count("Logon") == 1).await;
        assert_eq!(h.count("SymbolInfo"), 1);
        assert_eq!(h.count("CurrencyInfo"), 1);
        assert_eq!(h.count("SessionInfo"), 1);

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let h = Harness::logged_on().await;
        assert!(matches!(h.feed.start(), Err(Error::AlreadyStarted)));
        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let h = Harness::with_settings(ConnectionSettings::new("", "100500", "secret"));
        assert!(matches!(h.feed.start(), Err(Error::Config(_))));
        assert_eq!(h.feed.logon_state(), LogonState::Stopped);
    }

    #[tokio::test]
    async fn test_requests_require_logon() {
        let h = Harness::new();

        let err = h
            .feed
            .subscribe_quotes(&["EURUSD"], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, Error::NotLoggedOn);

        let err = h.feed.quote_store_symbols(TIMEOUT).await.unwrap_err();
        assert_eq!(err, Error::NotLoggedOn);
        assert!(h.feed.session_info().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_publishes_client_logout() {
        let h = Harness::logged_on().await;
        h.feed.stop().await;

        assert_eq!(h.feed.logon_state(), LogonState::Stopped);
        assert!(!h.quote_feed.link().is_connected());
        assert!(!h.quote_store.link().is_connected());
        assert_eq!(h.quote_feed.link().request_count("logout"), 1);

        let last = h.events.lock().last().cloned();
        match last {
            Some(FeedEvent::Logout(info)) => assert_eq!(info.reason, LogoutReason::ClientInitiated),
            other => panic!("expected a logout event, got {:?}", other),
        }

        // A stopped feed can be started again
        h.feed.start().unwrap();
        h.feed.wait_for_logon(TIMEOUT).await.unwrap();
        h.feed.stop().await;
    }
}

// =============================================================================
// Quote Tests
// =============================================================================

mod quotes {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_returns_snapshots() {
        let h = Harness::logged_on().await;

        let snapshots = h
            .feed
            .subscribe_quotes(&["EURUSD", "GBPUSD"], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(h.quote_feed.subscribed(), vec!["EURUSD", "GBPUSD"]);
        assert_eq!(
            h.feed.quote("EURUSD").await.unwrap().best_bid().unwrap().price,
            dec!(1.08500)
        );

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_tick_updates_cache_and_dispatches() {
        let h = Harness::logged_on().await;
        h.feed
            .subscribe_quotes(&["EURUSD"], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap();

        let tick = Quote::top(
            "EURUSD",
            Utc::now(),
            Some(QuoteEntry::new(dec!(1.09000), dec!(500000))),
            Some(QuoteEntry::new(dec!(1.09010), dec!(500000))),
        );
        assert!(h.quote_feed.emit_quote(tick.clone()));

        eventually("tick event", || {
            h.has(|e| matches!(e, FeedEvent::Tick(q) if q.symbol == "EURUSD"))
        })
        .await;
        assert_eq!(h.feed.quote("EURUSD").await.unwrap(), tick);

        // Not subscribed, so the mock does not publish it
        assert!(!h.quote_feed.emit_quote(Quote::top("GBPUSD", Utc::now(), None, None)));

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_drops_quote() {
        let h = Harness::logged_on().await;
        h.feed
            .subscribe_quotes(&["EURUSD"], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap();
        h.feed.unsubscribe_quotes(&["EURUSD"], TIMEOUT).await.unwrap();

        assert!(h.feed.quote("EURUSD").await.is_none());
        assert!(h.quote_feed.subscribed().is_empty());

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_rejected() {
        let h = Harness::logged_on().await;

        let err = h
            .feed
            .subscribe_quotes(&["XAUUSD"], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.is_reject());

        let err = h
            .feed
            .subscribe_quotes(&[], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_snapshot_depth_is_limited() {
        let h = Harness::logged_on().await;

        let snapshots = h
            .feed
            .quote_snapshots(&["USDJPY"], QuoteDepth::Levels(1), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(snapshots[0].bids.len(), 1);
        // Snapshots do not subscribe
        assert!(h.quote_feed.subscribed().is_empty());

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let h = Harness::logged_on().await;
        h.quote_feed.link().set_delay(Some(Duration::from_millis(200)));

        let err = h
            .feed
            .quote_snapshots(&["EURUSD"], QuoteDepth::Top, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, Error::Timeout);

        h.quote_feed.link().set_delay(None);
        h.feed.stop().await;
    }
}

// =============================================================================
// Reload Tests
// =============================================================================

mod reload {
    use super::*;

    fn config_updated() -> QuoteFeedCallback {
        QuoteFeedCallback::Notification(Notification::new(
            NotificationType::ConfigUpdated,
            NotificationSeverity::Info,
            "symbols changed",
        ))
    }

    #[tokio::test]
    async fn test_config_update_reloads_reference_data() {
        let h = Harness::logged_on().await;

        let mut symbols = h.feed.symbols().await;
        symbols.push(SymbolInfo {
            name: "XAUUSD".to_string(),
            sort_order: 10,
            ..Default::default()
        });
        h.quote_feed.set_symbols(symbols);
        assert!(h.quote_feed.link().push(config_updated()));

        eventually("config changed event", || h.count("ConfigChanged") == 1).await;
        assert_eq!(h.feed.symbols().await.len(), 4);
        assert_eq!(h.count("SymbolInfo"), 2);
        // A reload is not a new logon
        assert_eq!(h.count("Logon"), 1);

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_failed_reload_reports_notification() {
        let h = Harness::logged_on().await;
        h.quote_feed
            .link()
            .fail_next("symbol_list", Error::Connection("reset".into()));
        assert!(h.quote_feed.link().push(config_updated()));

        eventually("reload failure notification", || {
            h.has(|e| {
                matches!(e, FeedEvent::Notification(n)
                    if n.severity == NotificationSeverity::Error && n.text.starts_with("Reload failed"))
            })
        })
        .await;
        assert_eq!(h.count("ConfigChanged"), 0);
        assert!(h.feed.is_logged_on());

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_other_notifications_are_forwarded() {
        let h = Harness::logged_on().await;
        h.quote_feed
            .link()
            .push(QuoteFeedCallback::Notification(Notification::new(
                NotificationType::Message,
                NotificationSeverity::Warning,
                "maintenance at 22:00",
            )));

        eventually("notification", || h.count("Notification") == 1).await;
        h.feed.stop().await;
    }
}

// =============================================================================
// Reconnect Tests
// =============================================================================

mod reconnect {
    use super::*;

    #[tokio::test]
    async fn test_connection_loss_reconnects_and_restores_subscriptions() {
        let h = Harness::logged_on().await;
        h.feed
            .subscribe_quotes(&["EURUSD"], QuoteDepth::Top, TIMEOUT)
            .await
            .unwrap();

        h.quote_feed.link().drop_connection();

        eventually("network logout", || {
            h.has(|e| matches!(e, FeedEvent::Logout(info) if info.reason == LogoutReason::NetworkError))
        })
        .await;
        eventually("second logon", || h.count("Logon") == 2 && h.feed.is_logged_on()).await;
        eventually("restored subscription", || {
            h.quote_feed.link().request_count("subscribe_quotes") == 2
        })
        .await;

        assert_eq!(h.quote_feed.link().request_count("connect"), 2);
        assert_eq!(h.quote_feed.subscribed(), vec!["EURUSD"]);

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_server_logout_reconnects() {
        let h = Harness::logged_on().await;
        h.quote_store.link().push(QuoteStoreCallback::Logout(LogoutInfo::new(
            LogoutReason::ServerLogout,
            "maintenance",
        )));

        eventually("reconnect", || h.count("Logon") == 2 && h.feed.is_logged_on()).await;
        assert_eq!(h.quote_store.link().request_count("connect"), 2);

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_connect_failure_is_retried() {
        let h = Harness::new();
        h.quote_store.link().fail_next_connects(1);
        h.feed.start().unwrap();

        eventually("logon after retry", || h.feed.is_logged_on()).await;
        assert_eq!(h.quote_store.link().request_count("connect"), 2);
        assert!(h.has(|e| matches!(e, FeedEvent::Logout(info) if info.reason == LogoutReason::ConnectError)));

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_credentials_do_not_reconnect() {
        let h = Harness::new();
        h.quote_feed
            .link()
            .set_login_error(Some(Error::Authentication("invalid password".into())));
        h.feed.start().unwrap();

        let err = h.feed.wait_for_logon(TIMEOUT).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Logout {
                reason: LogoutReason::InvalidCredentials,
                ..
            }
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.quote_feed.link().request_count("connect"), 1);
        assert!(!h.feed.is_logged_on());

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_disabled_reconnect_stays_logged_out() {
        let h = Harness::with_settings(test_settings().with_reconnect(ReconnectConfig::disabled()));
        h.feed.start().unwrap();
        h.feed.wait_for_logon(TIMEOUT).await.unwrap();

        h.quote_feed.link().drop_connection();
        eventually("logout", || h.count("Logout") == 1).await;
        assert!(matches!(h.feed.logon_state(), LogonState::LoggedOut(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.quote_feed.link().request_count("connect"), 1);

        h.feed.stop().await;
    }
}

// =============================================================================
// Two-Factor Tests
// =============================================================================

mod two_factor {
    use super::*;

    #[tokio::test]
    async fn test_one_password_answers_both_connections() {
        let h = Harness::new();
        let expire = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        h.quote_feed.link().require_two_factor("123456", expire);
        h.quote_store.link().require_two_factor("123456", expire);
        h.feed.start().unwrap();

        eventually("two-factor request", || {
            h.has(|e| matches!(e, FeedEvent::TwoFactorAuth(a) if a.reason == TwoFactorReason::ServerRequest))
        })
        .await;
        assert!(!h.feed.is_logged_on());

        let err = h.feed.two_factor_response("000000", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::TwoFactor(_)));

        h.feed.two_factor_response("123456", TIMEOUT).await.unwrap();
        eventually("logon", || h.feed.is_logged_on()).await;
        assert_eq!(h.feed.two_factor_expire().await, Some(expire));

        // One request, one error and one merged success
        eventually("success event", || {
            h.has(|e| matches!(e, FeedEvent::TwoFactorAuth(a) if a.reason == TwoFactorReason::ServerSuccess))
        })
        .await;
        assert_eq!(h.count("TwoFactorAuth"), 3);

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_resume_extends_session() {
        let h = Harness::new();
        let expire = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let resumed = Utc.with_ymd_and_hms(2030, 1, 2, 0, 0, 0).unwrap();
        h.quote_feed.link().require_two_factor("42", expire);
        h.quote_store.link().require_two_factor("42", expire);
        h.quote_feed.link().set_resume_expire(Some(resumed));
        h.quote_store.link().set_resume_expire(Some(resumed));
        h.feed.start().unwrap();

        eventually("two-factor request", || h.count("TwoFactorAuth") == 1).await;
        h.feed.two_factor_response("42", TIMEOUT).await.unwrap();
        eventually("logon", || h.feed.is_logged_on()).await;

        assert_eq!(h.feed.two_factor_resume(TIMEOUT).await.unwrap(), resumed);
        assert_eq!(h.feed.two_factor_expire().await, Some(resumed));

        h.feed.stop().await;
    }

    #[tokio::test]
    async fn test_response_without_challenge_is_rejected() {
        let h = Harness::logged_on().await;
        let err = h.feed.two_factor_response("123456", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        h.feed.stop().await;
    }
}
