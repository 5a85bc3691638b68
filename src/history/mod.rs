//! Lazy history streams.
//!
//! History is fetched in chunks as the stream is polled. Each stream is a
//! [`futures_util::Stream`] of `Result<T>`; a failed chunk request is yielded
//! once and ends the stream.
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use tradelink_rs::models::{Periodicity, PriceType};
//! use tradelink_rs::DataFeed;
//!
//! # async fn example(feed: &DataFeed) -> tradelink_rs::Result<()> {
//! let end = chrono::Utc::now();
//! let start = end - chrono::Duration::hours(1);
//!
//! let mut bars = feed.bars("EURUSD", PriceType::Bid, Periodicity::M1, start, end, 500);
//! while let Some(bar) = bars.next().await {
//!     println!("{}", bar?);
//! }
//! # Ok(())
//! # }
//! ```

mod chunked;
mod market;
mod trades;

pub use chunked::{ChunkedStream, DEFAULT_CHUNK_SIZE};
pub use market::{bars, merge_pair_bars, pair_bars, quotes, PairBarStream};
pub use trades::trade_history;
