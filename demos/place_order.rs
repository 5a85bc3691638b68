//! Order placement example.
//!
//! This example logs a `DataTrade` in, places a limit order, moves it, cancels
//! it and then opens and closes a market position. It runs against the
//! in-memory order entry, which fills market orders immediately.
//!
//! Run with: cargo run --example place_order

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tradelink_rs::models::{
    AccountType, NewOrderBuilder, OrderSide, OrderType, ReplaceOrderRequest, TimeInForce,
};
use tradelink_rs::transport::mock::{MockOrderEntry, MockTradeCapture};
use tradelink_rs::{ConnectionSettings, DataTrade, TradeEvent};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> tradelink_rs::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let settings: ConnectionSettings = match std::env::var("TRADELINK_TRADE") {
        Ok(connection_string) => connection_string.parse()?,
        Err(_) => ConnectionSettings::new("trade.example.com", "100500", "secret"),
    };

    let order_entry = Arc::new(MockOrderEntry::new(AccountType::Gross));
    order_entry.set_fill_price(dec!(1.0852));
    let trade = DataTrade::new(settings, order_entry, Arc::new(MockTradeCapture::new()));

    trade.subscribe(|event: &TradeEvent| match event {
        TradeEvent::ExecutionReport(report) => println!("[REPORT] {}", report),
        TradeEvent::AccountInfo(account) => println!("[ACCOUNT] {}", account),
        other => println!("[{}]", other.name()),
    });

    println!("Connecting...");
    trade.start()?;
    trade.wait_for_logon(TIMEOUT).await?;

    // Build a limit order to buy 10 000 EURUSD
    let order = NewOrderBuilder::new("EURUSD", OrderSide::Buy, OrderType::Limit, dec!(10000))
        .price(dec!(1.0800))
        .time_in_force(TimeInForce::GoodTillCancel)
        .comment("demo entry")
        .build()?;

    println!("\nPlacing limit order...");
    let placed = trade.new_order(&order, TIMEOUT).await?;
    println!("Order placed! ID: {}", placed.order_id);

    let mut replace = ReplaceOrderRequest::new(placed.order_id.clone(), "EURUSD");
    replace.price = Some(dec!(1.0810));
    let replaced = trade.replace_order(&replace, TIMEOUT).await?;
    println!("Moved to {:?}", replaced.price);

    let cancelled = trade.cancel_order(&placed.order_id, TIMEOUT).await?;
    println!("Status: {:?}", cancelled.order_status);

    println!("\nOpening market position...");
    let market = NewOrderBuilder::new("EURUSD", OrderSide::Sell, OrderType::Market, dec!(5000))
        .build()?;
    let fill = trade.new_order(&market, TIMEOUT).await?;
    println!("Filled at {:?}", fill.trade_price);

    let closed = trade.close_position(&fill.order_id, None, TIMEOUT).await?;
    println!("Closed: {:?}", closed.order_status);

    if let Some(account) = trade.account_info().await {
        println!("\nAccount: {}", account);
    }

    trade.stop().await;
    println!("Done!");
    Ok(())
}
