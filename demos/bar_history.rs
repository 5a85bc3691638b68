//! Bar history example.
//!
//! This example reads one hour of M1 bid/ask bars through chunked history
//! streams, walking forward and then backward. The in-memory quote store is
//! seeded with generated bars.
//!
//! Run with: cargo run --example bar_history

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, DurationRound, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use tradelink_rs::models::{Bar, Periodicity, PriceType};
use tradelink_rs::transport::mock::{MockQuoteFeed, MockQuoteStore};
use tradelink_rs::{ConnectionSettings, DataFeed};

fn generated_bars(price_type: PriceType, end: chrono::DateTime<Utc>) -> Vec<Bar> {
    let spread = match price_type {
        PriceType::Bid => Decimal::ZERO,
        PriceType::Ask => Decimal::new(2, 4),
    };
    (0..60i64)
        .map(|m| {
            let from = end - ChronoDuration::minutes(60 - m);
            let open = Decimal::new(10850 + m, 4) + spread;
            Bar {
                from,
                to: from + ChronoDuration::minutes(1),
                open,
                high: open + Decimal::new(3, 4),
                low: open - Decimal::new(2, 4),
                close: open + Decimal::new(1, 4),
                volume: Decimal::from(100 + m),
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> tradelink_rs::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let end = Utc::now()
        .duration_trunc(ChronoDuration::minutes(1))
        .map_err(|e| tradelink_rs::Error::InvalidInput(e.to_string()))?;
    let start = end - ChronoDuration::hours(1);

    let store = Arc::new(MockQuoteStore::new());
    for price_type in [PriceType::Bid, PriceType::Ask] {
        store.set_bars("EURUSD", price_type, Periodicity::M1, generated_bars(price_type, end));
    }

    let feed = DataFeed::new(
        ConnectionSettings::new("feed.example.com", "100500", "secret"),
        Arc::new(MockQuoteFeed::with_sample_data()),
        store,
    );
    feed.start()?;
    feed.wait_for_logon(Duration::from_secs(10)).await?;

    let info = feed
        .bars_history_info("EURUSD", PriceType::Bid, Periodicity::M1, Duration::from_secs(5))
        .await?;
    println!("History: {:?} .. {:?}", info.available_from, info.available_to);

    println!("\nFirst ten bid/ask pairs:");
    let mut pairs = feed
        .pair_bars("EURUSD", Periodicity::M1, start, end, 25)
        .take(10);
    while let Some(pair) = pairs.next().await {
        let pair = pair?;
        let spread = match (&pair.bid, &pair.ask) {
            (Some(bid), Some(ask)) => Some(ask.close - bid.close),
            _ => None,
        };
        println!("  {} spread={:?}", pair.from, spread);
    }

    println!("\nLast five bid bars, newest first:");
    let mut bars = feed
        .bars("EURUSD", PriceType::Bid, Periodicity::M1, end, start, 25)
        .take(5);
    while let Some(bar) = bars.next().await {
        println!("  {}", bar?);
    }

    feed.stop().await;
    println!("Done!");
    Ok(())
}
