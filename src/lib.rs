//! # tradelink-rs
//!
//! An async client SDK for a trading server that exposes four protocol
//! connections: quote feed, quote store (history), order entry and trade
//! capture.
//!
//! The crate pairs the connections into two sessions:
//!
//! - [`DataFeed`]: quote feed + quote store. Session info, symbols,
//!   currencies, live quotes and chunked history streams.
//! - [`DataTrade`]: order entry + trade capture. Account info, orders,
//!   positions, order requests and trade reports.
//!
//! Each session logs both connections in together, answers two-factor
//! challenges across them, keeps a cache current from server messages,
//! reconnects with backoff and delivers events to registered handlers on a
//! dedicated dispatch task.
//!
//! ## Features
//!
//! - **Connection strings**: `[Type]Key=Value;...` settings with typed values
//! - **Two-factor login**: one password answers both connections
//! - **Reconnect**: exponential backoff, no retry on credential failures
//! - **History streams**: bars, bid/ask bar pairs, ticks and trade reports
//!   fetched in chunks as [`futures_util::Stream`]s
//! - **Type Safety**: Strongly-typed models with compile-time guarantees
//! - **Async-first**: Built on Tokio
//!
//! The protocol clients themselves sit behind the traits in [`transport`];
//! [`transport::mock`] provides in-memory implementations.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tradelink_rs::config::ConnectionSettings;
//! use tradelink_rs::models::QuoteDepth;
//! use tradelink_rs::transport::mock::{MockQuoteFeed, MockQuoteStore};
//! use tradelink_rs::{DataFeed, FeedEvent};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tradelink_rs::Result<()> {
//!     let settings: ConnectionSettings =
//!         "[String]Address=feed.example.com;[String]Username=100500;[String]Password=secret"
//!             .parse()?;
//!     let feed = DataFeed::new(
//!         settings,
//!         Arc::new(MockQuoteFeed::with_sample_data()),
//!         Arc::new(MockQuoteStore::new()),
//!     );
//!
//!     feed.subscribe(|event: &FeedEvent| {
//!         if let FeedEvent::Tick(quote) = event {
//!             println!("{}", quote);
//!         }
//!     });
//!
//!     feed.start()?;
//!     feed.wait_for_logon(Duration::from_secs(5)).await?;
//!     println!("{} symbols", feed.symbols().await.len());
//!
//!     feed.subscribe_quotes(&["EURUSD"], QuoteDepth::Top, Duration::from_secs(5))
//!         .await?;
//!
//!     feed.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Order Placement
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tradelink_rs::config::ConnectionSettings;
//! use tradelink_rs::models::{NewOrderBuilder, OrderSide, OrderType};
//! use tradelink_rs::transport::mock::{MockOrderEntry, MockTradeCapture};
//! use tradelink_rs::DataTrade;
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tradelink_rs::Result<()> {
//!     let settings = ConnectionSettings::new("trade.example.com", "100500", "secret");
//!     let trade = DataTrade::new(
//!         settings,
//!         Arc::new(MockOrderEntry::default()),
//!         Arc::new(MockTradeCapture::new()),
//!     );
//!     trade.start()?;
//!     trade.wait_for_logon(Duration::from_secs(5)).await?;
//!
//!     let order = NewOrderBuilder::new("EURUSD", OrderSide::Buy, OrderType::Market, dec!(10000))
//!         .comment("entry")
//!         .build()?;
//!     let report = trade.new_order(&order, Duration::from_secs(5)).await?;
//!     println!("Order placed: {}", report.order_id);
//!
//!     trade.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod feed;
pub mod history;
pub mod models;
pub mod session;
pub mod trade;
pub mod transport;

// Re-export primary types at crate root for convenience
pub use config::{ConnectionSettings, ReconnectConfig};
pub use error::{Error, Result};
pub use feed::{DataFeed, FeedEvent};
pub use models::{AccountId, OrderId, Symbol};
pub use session::{LogonState, SubscriptionId};
pub use trade::{DataTrade, TradeEvent};

/// Prelude module for convenient imports.
///
/// ```rust
/// use tradelink_rs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{ConnectionSettings, ReconnectConfig};
    pub use crate::error::{Error, Result};
    pub use crate::feed::{DataFeed, FeedEvent};
    pub use crate::history::ChunkedStream;
    pub use crate::models::{
        // Primitives
        AccountId, OrderId, Symbol,
        // Enums
        AccountType, ExecutionType, LogoutReason, OrderSide, OrderStatus, OrderType,
        Periodicity, PriceType, QuoteDepth, RejectReason, TimeInForce,
        // Account models
        AccountInfo, Position,
        // Order models
        ExecutionReport, NewOrderBuilder, NewOrderRequest, Order, ReplaceOrderRequest,
        // Market data
        Bar, PairBar, Quote, SymbolInfo,
        // Session
        LogoutInfo, SessionInfo, TradeTransactionReport,
    };
    pub use crate::session::{LogonState, SubscriptionId};
    pub use crate::trade::{DataTrade, TradeEvent};
}
