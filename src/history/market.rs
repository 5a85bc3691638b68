//! Bar and tick history over a quote store connection.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, Peekable};
use futures_util::StreamExt;

use super::chunked::ChunkedStream;
use crate::models::{Bar, PairBar, Periodicity, PriceType, Quote, QuoteDepth, TimeDirection};
use crate::transport::QuoteStoreClient;
use crate::Result;

/// Stream of bid/ask bar pairs.
pub type PairBarStream = BoxStream<'static, Result<PairBar>>;

/// Largest count a quote store request can carry.
const MAX_REQUEST: usize = i32::MAX as usize;

fn signed_count(count: usize, direction: TimeDirection) -> i32 {
    let count = i32::try_from(count.clamp(1, MAX_REQUEST)).unwrap_or(i32::MAX);
    match direction {
        TimeDirection::Forward => count,
        TimeDirection::Backward => -count,
    }
}

fn direction_of(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeDirection {
    if start <= end {
        TimeDirection::Forward
    } else {
        TimeDirection::Backward
    }
}

/// Bars of one price side between `start` and `end`, both inclusive.
///
/// Walks backward (newest first) when `start` is after `end`.
#[allow(clippy::too_many_arguments)]
pub fn bars(
    client: Arc<dyn QuoteStoreClient>,
    symbol: impl Into<String>,
    price_type: PriceType,
    periodicity: Periodicity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: usize,
    timeout: Duration,
) -> ChunkedStream<Bar> {
    let symbol = symbol.into();
    let direction = direction_of(start, end);

    ChunkedStream::new(start, end, chunk, |bar: &Bar| bar.from, move |cursor, count| {
        let client = client.clone();
        let symbol = symbol.clone();
        let count = signed_count(count, direction);
        Box::pin(async move {
            tokio::time::timeout(
                timeout,
                client.bar_list(&symbol, price_type, periodicity, cursor, count),
            )
            .await?
        })
    })
    .with_max_request(MAX_REQUEST)
}

/// Bid and ask bars merged by bar start time.
///
/// Bars with the same start time are paired; otherwise the bar that comes
/// first in the walking direction is yielded alone. The stream ends after
/// the first error from either side.
pub fn pair_bars(
    client: Arc<dyn QuoteStoreClient>,
    symbol: impl Into<String>,
    periodicity: Periodicity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: usize,
    timeout: Duration,
) -> PairBarStream {
    let symbol = symbol.into();
    let bid = bars(
        client.clone(),
        symbol.clone(),
        PriceType::Bid,
        periodicity,
        start,
        end,
        chunk,
        timeout,
    );
    let ask = bars(client, symbol, PriceType::Ask, periodicity, start, end, chunk, timeout);
    merge_pair_bars(bid, ask)
}

/// Merge two bar streams walking in the same direction.
pub fn merge_pair_bars(bid: ChunkedStream<Bar>, ask: ChunkedStream<Bar>) -> PairBarStream {
    let direction = bid.direction();
    let state = MergeState {
        bid: bid.peekable(),
        ask: ask.peekable(),
        direction,
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        let item = state.next_pair().await?;
        state.failed = item.is_err();
        Some((item, state))
    })
    .boxed()
}

/// Head of one side of the merge.
enum Head {
    At(DateTime<Utc>),
    Failed,
    Done,
}

struct MergeState {
    bid: Peekable<ChunkedStream<Bar>>,
    ask: Peekable<ChunkedStream<Bar>>,
    direction: TimeDirection,
    failed: bool,
}

impl MergeState {
    async fn head(side: &mut Peekable<ChunkedStream<Bar>>) -> Head {
        match Pin::new(side).peek().await {
            Some(Ok(bar)) => Head::At(bar.from),
            Some(Err(_)) => Head::Failed,
            None => Head::Done,
        }
    }

    async fn take(side: &mut Peekable<ChunkedStream<Bar>>) -> Option<Bar> {
        match side.next().await {
            Some(Ok(bar)) => Some(bar),
            _ => None,
        }
    }

    async fn take_error(side: &mut Peekable<ChunkedStream<Bar>>) -> Option<Result<PairBar>> {
        match side.next().await {
            Some(Err(e)) => Some(Err(e)),
            _ => None,
        }
    }

    async fn next_pair(&mut self) -> Option<Result<PairBar>> {
        let bid_head = Self::head(&mut self.bid).await;
        let ask_head = Self::head(&mut self.ask).await;

        let (take_bid, take_ask) = match (bid_head, ask_head) {
            (Head::Failed, _) => return Self::take_error(&mut self.bid).await,
            (_, Head::Failed) => return Self::take_error(&mut self.ask).await,
            (Head::Done, Head::Done) => return None,
            (Head::At(_), Head::Done) => (true, false),
            (Head::Done, Head::At(_)) => (false, true),
            (Head::At(b), Head::At(a)) if b == a => (true, true),
            (Head::At(b), Head::At(a)) => {
                let bid_first = match self.direction {
                    TimeDirection::Forward => b < a,
                    TimeDirection::Backward => b > a,
                };
                (bid_first, !bid_first)
            }
        };

        let bid = if take_bid { Self::take(&mut self.bid).await } else { None };
        let ask = if take_ask { Self::take(&mut self.ask).await } else { None };
        let from = bid.as_ref().or(ask.as_ref())?.from;
        Some(Ok(PairBar { from, bid, ask }))
    }
}

/// Ticks between `start` and `end`, both inclusive.
pub fn quotes(
    client: Arc<dyn QuoteStoreClient>,
    symbol: impl Into<String>,
    depth: QuoteDepth,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: usize,
    timeout: Duration,
) -> ChunkedStream<Quote> {
    let symbol = symbol.into();
    let direction = direction_of(start, end);

    ChunkedStream::new(start, end, chunk, |quote: &Quote| quote.created, move |cursor, count| {
        let client = client.clone();
        let symbol = symbol.clone();
        let count = signed_count(count, direction);
        Box::pin(async move {
            tokio::time::timeout(timeout, client.quote_list(&symbol, depth, cursor, count)).await?
        })
    })
    .with_max_request(MAX_REQUEST)
}
