//! Integration tests for chunked history streams.
//!
//! Run with: cargo test --test history_tests

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::{StreamExt, TryStreamExt};
use rust_decimal_macros::dec;

use tradelink_rs::models::{QuoteEntry, TimeDirection, TradeTransactionReportType};
use tradelink_rs::prelude::*;
use tradelink_rs::transport::mock::{
    MockOrderEntry, MockQuoteFeed, MockQuoteStore, MockTradeCapture,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn minute(m: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(m)
}

fn bar(m: i64) -> Bar {
    Bar {
        from: minute(m),
        to: minute(m + 1),
        open: dec!(1.0850),
        high: dec!(1.0860),
        low: dec!(1.0840),
        close: dec!(1.0855),
        volume: dec!(120),
    }
}

fn tick(m: i64) -> Quote {
    Quote {
        symbol: "EURUSD".into(),
        created: minute(m),
        bids: vec![
            QuoteEntry::new(dec!(1.0850), dec!(100000)),
            QuoteEntry::new(dec!(1.0849), dec!(200000)),
        ],
        asks: vec![
            QuoteEntry::new(dec!(1.0852), dec!(100000)),
            QuoteEntry::new(dec!(1.0853), dec!(200000)),
        ],
        indicative: false,
    }
}

async fn feed_with(store: MockQuoteStore) -> (DataFeed, Arc<MockQuoteStore>) {
    let store = Arc::new(store);
    let feed = DataFeed::new(
        ConnectionSettings::new("localhost", "100500", "secret"),
        Arc::new(MockQuoteFeed::with_sample_data()),
        store.clone(),
    );
    feed.start().unwrap();
    feed.wait_for_logon(TIMEOUT).await.unwrap();
    (feed, store)
}

fn store_with_bars() -> MockQuoteStore {
    let store = MockQuoteStore::new();
    store.set_bars(
        "EURUSD",
        PriceType::Bid,
        Periodicity::M1,
        (0..10).map(bar).collect(),
    );
    store
}

// =============================================================================
// Bar Tests
// =============================================================================

mod bars {
    use super::*;

    #[tokio::test]
    async fn test_forward_across_chunks() {
        let (feed, store) = feed_with(store_with_bars()).await;

        let bars: Vec<Bar> = feed
            .bars("EURUSD", PriceType::Bid, Periodicity::M1, minute(0), minute(9), 3)
            .try_collect()
            .await
            .unwrap();

        let times: Vec<_> = bars.iter().map(|b| b.from).collect();
        assert_eq!(times, (0..10).map(minute).collect::<Vec<_>>());
        // Three full chunks and a short one
        assert_eq!(store.link().request_count("bar_list"), 4);

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_stops_at_end_time() {
        let (feed, store) = feed_with(store_with_bars()).await;

        let bars: Vec<Bar> = feed
            .bars("EURUSD", PriceType::Bid, Periodicity::M1, minute(0), minute(6), 3)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(bars.len(), 7);
        assert_eq!(bars.last().unwrap().from, minute(6));
        assert_eq!(store.link().request_count("bar_list"), 3);

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_backward_walks_newest_first() {
        let (feed, _store) = feed_with(store_with_bars()).await;

        let stream = feed.bars("EURUSD", PriceType::Bid, Periodicity::M1, minute(9), minute(2), 4);
        assert_eq!(stream.direction(), TimeDirection::Backward);

        let times: Vec<_> = stream
            .map_ok(|b| b.from)
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(times, (2..10).rev().map(minute).collect::<Vec<_>>());

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_symbol_yields_error_once() {
        let (feed, _store) = feed_with(store_with_bars()).await;

        let items: Vec<_> = feed
            .bars("XAUUSD", PriceType::Bid, Periodicity::M1, minute(0), minute(9), 3)
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(Error::Rejected {
                reason: RejectReason::UnknownSymbol,
                ..
            })
        ));

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_requires_logon() {
        let feed = DataFeed::new(
            ConnectionSettings::new("localhost", "100500", "secret"),
            Arc::new(MockQuoteFeed::new()),
            Arc::new(MockQuoteStore::new()),
        );
        let items: Vec<_> = feed
            .bars("EURUSD", PriceType::Bid, Periodicity::M1, minute(0), minute(9), 3)
            .collect()
            .await;
        assert_eq!(items, vec![Err(Error::NotLoggedOn)]);
    }

    #[tokio::test]
    async fn test_pair_bars_merge_sides() {
        let store = MockQuoteStore::new();
        store.set_bars("EURUSD", PriceType::Bid, Periodicity::M1, (0..4).map(bar).collect());
        store.set_bars("EURUSD", PriceType::Ask, Periodicity::M1, (1..5).map(bar).collect());
        let (feed, _store) = feed_with(store).await;

        let pairs: Vec<PairBar> = feed
            .pair_bars("EURUSD", Periodicity::M1, minute(0), minute(10), 2)
            .try_collect()
            .await
            .unwrap();

        let shape: Vec<_> = pairs
            .iter()
            .map(|p| (p.from, p.bid.is_some(), p.ask.is_some()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (minute(0), true, false),
                (minute(1), true, true),
                (minute(2), true, true),
                (minute(3), true, true),
                (minute(4), false, true),
            ]
        );

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_bar_list_and_history_info() {
        let (feed, _store) = feed_with(store_with_bars()).await;

        let latest = feed
            .bar_list("EURUSD", PriceType::Bid, Periodicity::M1, minute(9), -2, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(
            latest.iter().map(|b| b.from).collect::<Vec<_>>(),
            vec![minute(9), minute(8)]
        );

        let info = feed
            .bars_history_info("EURUSD", PriceType::Bid, Periodicity::M1, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(info.available_from, Some(minute(0)));
        assert_eq!(info.available_to, Some(minute(9)));

        let info = feed
            .bars_history_info("EURUSD", PriceType::Ask, Periodicity::M1, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(info.available_from, None);

        assert_eq!(
            feed.quote_store_symbols(TIMEOUT).await.unwrap(),
            vec!["EURUSD".to_string()]
        );

        feed.stop().await;
    }
}

// =============================================================================
// Tick Tests
// =============================================================================

mod ticks {
    use super::*;

    #[tokio::test]
    async fn test_quotes_history_limits_depth() {
        let store = MockQuoteStore::new();
        store.set_ticks("EURUSD", (0..5).map(tick).collect());
        let (feed, _store) = feed_with(store).await;

        let ticks: Vec<Quote> = feed
            .quotes_history("EURUSD", QuoteDepth::Top, minute(1), minute(3), 2)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].created, minute(1));
        assert!(ticks.iter().all(|t| t.bids.len() == 1 && t.asks.len() == 1));

        let info = feed
            .quotes_history_info("EURUSD", QuoteDepth::Full, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(info.available_to, Some(minute(4)));

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_equal_times_span_chunk_boundary() {
        let ticks: Vec<Quote> = [0, 1, 1, 1, 2]
            .iter()
            .enumerate()
            .map(|(n, m)| {
                let mut quote = tick(*m);
                quote.bids[0].volume = rust_decimal::Decimal::from(n as u64);
                quote
            })
            .collect();
        let store = MockQuoteStore::new();
        store.set_ticks("EURUSD", ticks);
        let (feed, store) = feed_with(store).await;

        let ticks: Vec<Quote> = feed
            .quotes_history("EURUSD", QuoteDepth::Full, minute(0), minute(2), 2)
            .try_collect()
            .await
            .unwrap();

        let order: Vec<_> = ticks.iter().map(|t| t.bids[0].volume).collect();
        assert_eq!(order, vec![dec!(0), dec!(1), dec!(2), dec!(3), dec!(4)]);
        assert_eq!(store.link().request_count("quote_list"), 3);

        feed.stop().await;
    }

    #[tokio::test]
    async fn test_quote_list_backward() {
        let store = MockQuoteStore::new();
        store.set_ticks("EURUSD", (0..5).map(tick).collect());
        let (feed, _store) = feed_with(store).await;

        let ticks = feed
            .quote_list("EURUSD", QuoteDepth::Full, minute(4), -3, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(
            ticks.iter().map(|t| t.created).collect::<Vec<_>>(),
            vec![minute(4), minute(3), minute(2)]
        );
        assert_eq!(ticks[0].bids.len(), 2);

        feed.stop().await;
    }
}

// =============================================================================
// Trade History Tests
// =============================================================================

mod trades {
    use super::*;

    fn report(id: &str, m: i64, report_type: TradeTransactionReportType) -> TradeTransactionReport {
        TradeTransactionReport {
            id: id.to_string(),
            report_type,
            transaction_time: minute(m),
            symbol: "EURUSD".into(),
            ..Default::default()
        }
    }

    async fn trade_with_reports() -> DataTrade {
        let capture = Arc::new(MockTradeCapture::new());
        capture.set_reports(vec![
            report("1", 0, TradeTransactionReportType::OrderOpened),
            report("2", 1, TradeTransactionReportType::OrderCanceled),
            report("3", 2, TradeTransactionReportType::PositionOpened),
            report("4", 3, TradeTransactionReportType::PositionClosed),
            report("5", 4, TradeTransactionReportType::BalanceTransaction),
        ]);
        let trade = DataTrade::new(
            ConnectionSettings::new("localhost", "100500", "secret"),
            Arc::new(MockOrderEntry::default()),
            capture,
        );
        trade.start().unwrap();
        trade.wait_for_logon(TIMEOUT).await.unwrap();
        trade
    }

    fn ids(reports: &[TradeTransactionReport]) -> Vec<&str> {
        reports.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_trade_history_in_chunks() {
        let trade = trade_with_reports().await;

        let reports: Vec<TradeTransactionReport> = trade
            .trade_history(minute(0), minute(3), false, 2)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids(&reports), vec!["1", "2", "3", "4"]);

        trade.stop().await;
    }

    #[tokio::test]
    async fn test_trade_history_equal_times_span_chunks() {
        let capture = Arc::new(MockTradeCapture::new());
        capture.set_reports(vec![
            report("1", 0, TradeTransactionReportType::OrderOpened),
            report("2", 1, TradeTransactionReportType::OrderFilled),
            report("3", 1, TradeTransactionReportType::PositionOpened),
            report("4", 1, TradeTransactionReportType::OrderFilled),
        ]);
        let trade = DataTrade::new(
            ConnectionSettings::new("localhost", "100500", "secret"),
            Arc::new(MockOrderEntry::default()),
            capture.clone(),
        );
        trade.start().unwrap();
        trade.wait_for_logon(TIMEOUT).await.unwrap();

        let reports: Vec<TradeTransactionReport> = trade
            .trade_history(minute(0), minute(1), false, 2)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids(&reports), vec!["1", "2", "3", "4"]);
        assert_eq!(capture.link().request_count("trade_history"), 3);

        trade.stop().await;
    }

    #[tokio::test]
    async fn test_trade_history_skips_cancels() {
        let trade = trade_with_reports().await;

        let reports: Vec<TradeTransactionReport> = trade
            .trade_history(minute(0), minute(10), true, 10)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ids(&reports), vec!["1", "3", "4", "5"]);

        trade.stop().await;
    }

    #[tokio::test]
    async fn test_reversed_range_is_rejected() {
        let trade = trade_with_reports().await;

        let items: Vec<_> = trade
            .trade_history(minute(3), minute(0), false, 10)
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::InvalidInput(_))));

        trade.stop().await;
    }
}
