//! Live quote example.
//!
//! This example logs a `DataFeed` in, subscribes to a few symbols and prints
//! the ticks pushed by the server. It runs against the in-memory quote feed,
//! which stands in for a real connection.
//!
//! Run with: cargo run --example feed_quotes
//! Pass a connection string in TRADELINK_FEED to override the settings.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tradelink_rs::models::{Quote, QuoteDepth, QuoteEntry};
use tradelink_rs::transport::mock::{MockQuoteFeed, MockQuoteStore};
use tradelink_rs::{ConnectionSettings, DataFeed, FeedEvent};

#[tokio::main]
async fn main() -> tradelink_rs::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let settings: ConnectionSettings = match std::env::var("TRADELINK_FEED") {
        Ok(connection_string) => connection_string.parse()?,
        Err(_) => ConnectionSettings::new("feed.example.com", "100500", "secret"),
    };

    let quote_feed = Arc::new(MockQuoteFeed::with_sample_data());
    let feed = DataFeed::new(settings, quote_feed.clone(), Arc::new(MockQuoteStore::new()));

    feed.subscribe(|event: &FeedEvent| match event {
        FeedEvent::Logon => println!("[LOGON]"),
        FeedEvent::Logout(info) => println!("[LOGOUT] {}", info),
        FeedEvent::Tick(quote) => println!("[TICK] {}", quote),
        other => println!("[{}]", other.name()),
    });

    println!("Connecting...");
    feed.start()?;
    feed.wait_for_logon(Duration::from_secs(10)).await?;

    for symbol in feed.symbols().await {
        println!("  {} ({} digits)", symbol.name, symbol.precision);
    }

    let symbols = ["EURUSD", "GBPUSD"];
    println!("\nSubscribing to {:?}", symbols);
    let snapshots = feed
        .subscribe_quotes(&symbols, QuoteDepth::Top, Duration::from_secs(5))
        .await?;
    for quote in &snapshots {
        println!("  snapshot {}", quote);
    }

    // Simulate a few server ticks
    for step in 1..=5i64 {
        let bid = dec!(1.0850) + rust_decimal::Decimal::new(step, 5);
        quote_feed.emit_quote(Quote::top(
            "EURUSD",
            chrono::Utc::now(),
            Some(QuoteEntry::new(bid, dec!(1000000))),
            Some(QuoteEntry::new(bid + dec!(0.0002), dec!(1000000))),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if let Some(quote) = feed.quote("EURUSD").await {
        println!("\nLast EURUSD quote: {}", quote);
    }

    feed.stop().await;
    println!("Done!");
    Ok(())
}
