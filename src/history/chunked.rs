//! Chunked stream for lazy iteration over time-ordered history.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Duration, Utc};
use futures_util::Stream;
use tracing::warn;

use crate::models::TimeDirection;
use crate::{Error, Result};

/// Default number of items requested per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Type alias for a boxed future used internally.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type FetchChunk<T> =
    Box<dyn Fn(DateTime<Utc>, usize) -> BoxFuture<'static, Result<Vec<T>>> + Send + Sync>;

/// A stream that lazily fetches history chunks between two points in time.
///
/// Walks forward when `start <= end` and backward otherwise; both bounds are
/// inclusive. Each chunk is requested from the time of the last item
/// received, and the items already yielded at that time are skipped, so
/// items sharing a timestamp across a chunk boundary are never lost. The
/// stream ends on a short chunk, when an item passes `end`, or after
/// yielding an error.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use futures_util::StreamExt;
/// use tradelink_rs::history::ChunkedStream;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap();
/// let seconds: Vec<_> = (0..10).map(|s| start + chrono::Duration::seconds(s)).collect();
///
/// let stream = ChunkedStream::new(start, end, 3, |t: &chrono::DateTime<Utc>| *t, move |cursor, count| {
///     let chunk: Vec<_> = seconds.iter().copied().filter(|t| *t >= cursor).take(count).collect();
///     Box::pin(async move { Ok(chunk) })
/// });
///
/// let items: Vec<_> = stream.collect().await;
/// assert_eq!(items.len(), 6);
/// # }
/// ```
pub struct ChunkedStream<T> {
    /// Function to fetch up to `count` items starting at a cursor.
    fetch_chunk: FetchChunk<T>,
    /// Time key of an item.
    time_of: fn(&T) -> DateTime<Utc>,
    direction: TimeDirection,
    end: DateTime<Utc>,
    chunk_size: usize,
    /// Largest count a single fetch may ask for.
    max_request: usize,
    /// Items of the current chunk still to be yielded.
    current_items: VecDeque<T>,
    /// Cursor of the next chunk, `None` when exhausted.
    next_cursor: Option<DateTime<Utc>>,
    /// Cursor and count of the in-flight fetch.
    requested: (DateTime<Utc>, usize),
    /// Items already yielded whose time equals the next cursor.
    seen_at_cursor: usize,
    /// Current in-flight fetch future.
    pending_fetch: Option<BoxFuture<'static, Result<Vec<T>>>>,
    /// Error to yield before anything else.
    initial_error: Option<Error>,
}

impl<T> ChunkedStream<T>
where
    T: Send + 'static,
{
    /// Create a stream over `[start, end]` fetching `chunk_size` new items at a time.
    ///
    /// `fetch_chunk` receives the cursor and a count, and must return up to
    /// `count` items ordered in the walking direction, starting at the
    /// cursor (inclusive). The count exceeds `chunk_size` by the number of
    /// items already yielded at the cursor time.
    pub fn new<F>(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk_size: usize,
        time_of: fn(&T) -> DateTime<Utc>,
        fetch_chunk: F,
    ) -> Self
    where
        F: Fn(DateTime<Utc>, usize) -> BoxFuture<'static, Result<Vec<T>>> + Send + Sync + 'static,
    {
        let direction = if start <= end {
            TimeDirection::Forward
        } else {
            TimeDirection::Backward
        };
        Self {
            fetch_chunk: Box::new(fetch_chunk),
            time_of,
            direction,
            end,
            chunk_size: chunk_size.max(1),
            max_request: usize::MAX,
            current_items: VecDeque::new(),
            next_cursor: Some(start),
            requested: (start, 0),
            seen_at_cursor: 0,
            pending_fetch: None,
            initial_error: None,
        }
    }

    /// A stream that yields `error` once and ends.
    pub fn failed(error: Error) -> Self {
        Self {
            fetch_chunk: Box::new(|_, _| -> BoxFuture<'static, Result<Vec<T>>> {
                Box::pin(async { Ok(Vec::new()) })
            }),
            time_of: |_| DateTime::<Utc>::MIN_UTC,
            direction: TimeDirection::Forward,
            end: DateTime::<Utc>::MIN_UTC,
            chunk_size: 1,
            max_request: 1,
            current_items: VecDeque::new(),
            next_cursor: None,
            requested: (DateTime::<Utc>::MIN_UTC, 0),
            seen_at_cursor: 0,
            pending_fetch: None,
            initial_error: Some(error),
        }
    }
}

impl<T> ChunkedStream<T> {
    /// Cap the count of a single fetch, for servers with a narrower count type.
    ///
    /// The chunk size is capped to the same value.
    pub fn with_max_request(mut self, max_request: usize) -> Self {
        self.max_request = max_request.max(1);
        self.chunk_size = self.chunk_size.min(self.max_request);
        self
    }

    /// Direction the stream walks in.
    pub fn direction(&self) -> TimeDirection {
        self.direction
    }

    fn within_end(&self, time: DateTime<Utc>) -> bool {
        match self.direction {
            TimeDirection::Forward => time <= self.end,
            TimeDirection::Backward => time >= self.end,
        }
    }

    fn request_count(&self) -> usize {
        self.chunk_size
            .saturating_add(self.seen_at_cursor)
            .min(self.max_request)
    }

    fn accept_chunk(&mut self, items: Vec<T>) {
        let (cursor, count) = self.requested;
        let full = items.len() >= count;
        let mut skip = self.seen_at_cursor;
        let mut passed_end = false;

        // Items at the cursor come first; the leading ones were already yielded.
        let mut last = cursor;
        let mut at_last = self.seen_at_cursor;
        for item in items {
            let time = (self.time_of)(&item);
            if skip > 0 && time == cursor {
                skip -= 1;
                continue;
            }
            if !self.within_end(time) {
                passed_end = true;
                break;
            }
            if time == last {
                at_last += 1;
            } else {
                last = time;
                at_last = 1;
            }
            self.current_items.push_back(item);
        }

        self.seen_at_cursor = 0;
        self.next_cursor = None;
        if !full || passed_end {
            return;
        }
        if at_last < self.max_request {
            self.next_cursor = Some(last);
            self.seen_at_cursor = at_last;
            return;
        }

        warn!(
            time = %last,
            count = at_last,
            "More history items share one timestamp than a request can return"
        );
        self.next_cursor = match self.direction {
            TimeDirection::Forward => last.checked_add_signed(Duration::milliseconds(1)),
            TimeDirection::Backward => last.checked_sub_signed(Duration::milliseconds(1)),
        };
    }
}

impl<T> Stream for ChunkedStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(error) = this.initial_error.take() {
            return Poll::Ready(Some(Err(error)));
        }

        loop {
            if let Some(item) = this.current_items.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if let Some(ref mut fut) = this.pending_fetch {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(items)) => {
                        this.pending_fetch = None;
                        this.accept_chunk(items);
                        if this.current_items.is_empty() {
                            return Poll::Ready(None);
                        }
                        continue;
                    }
                    Poll::Ready(Err(e)) => {
                        this.pending_fetch = None;
                        this.next_cursor = None;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            if let Some(cursor) = this.next_cursor.take() {
                let count = this.request_count();
                this.requested = (cursor, count);
                this.pending_fetch = Some((this.fetch_chunk)(cursor, count));
                continue;
            }

            return Poll::Ready(None);
        }
    }
}

impl<T> Unpin for ChunkedStream<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn second(s: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(s)
    }

    /// Fetcher over seconds 0..=19 honouring the walking direction.
    fn fetcher(
        forward: bool,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(DateTime<Utc>, usize) -> BoxFuture<'static, Result<Vec<DateTime<Utc>>>> + Send + Sync
    {
        move |cursor, count| -> BoxFuture<'static, Result<Vec<DateTime<Utc>>>> {
            calls.fetch_add(1, Ordering::SeqCst);
            let all = (0..20).map(second);
            let chunk: Vec<_> = if forward {
                all.filter(|t| *t >= cursor).take(count).collect()
            } else {
                all.rev().filter(|t| *t <= cursor).take(count).collect()
            };
            Box::pin(async move { Ok(chunk) })
        }
    }

    fn identity(t: &DateTime<Utc>) -> DateTime<Utc> {
        *t
    }

    /// Seconds paired with a sequence number, so equal times stay distinguishable.
    fn stamped(seconds: &[i64]) -> Vec<(DateTime<Utc>, usize)> {
        seconds.iter().enumerate().map(|(n, s)| (second(*s), n)).collect()
    }

    fn stamp_time(item: &(DateTime<Utc>, usize)) -> DateTime<Utc> {
        item.0
    }

    #[tokio::test]
    async fn test_forward_inclusive_bounds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = ChunkedStream::new(second(2), second(9), 3, identity, fetcher(true, calls.clone()));
        let items: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, (2..=9).map(second).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backward() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = ChunkedStream::new(second(15), second(10), 4, identity, fetcher(false, calls));
        assert_eq!(stream.direction(), TimeDirection::Backward);
        let items: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, (10..=15).rev().map(second).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_stops_on_short_chunk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = ChunkedStream::new(second(12), second(100), 5, identity, fetcher(true, calls.clone()));
        let items: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items.len(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_equal_times_across_chunks() {
        let all = stamped(&[0, 1, 1, 1, 1, 2, 3]);
        let counts = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = counts.clone();
        let stream = ChunkedStream::new(second(0), second(3), 2, stamp_time, move |cursor, count| {
            seen.lock().push(count);
            let chunk: Vec<_> = all.iter().copied().filter(|(t, _)| *t >= cursor).take(count).collect();
            Box::pin(async move { Ok(chunk) })
        });

        let numbers: Vec<_> = stream.map(|r| r.unwrap().1).collect().await;
        assert_eq!(numbers, (0..7).collect::<Vec<_>>());
        // Each request asks for the chunk plus the items already seen at its cursor
        assert_eq!(*counts.lock(), vec![2, 3, 5, 3]);
    }

    #[tokio::test]
    async fn test_equal_times_backward() {
        let mut all = stamped(&[0, 1, 2, 2, 2, 3]);
        all.reverse();
        let stream = ChunkedStream::new(second(3), second(0), 2, stamp_time, move |cursor, count| {
            let chunk: Vec<_> = all.iter().copied().filter(|(t, _)| *t <= cursor).take(count).collect();
            Box::pin(async move { Ok(chunk) })
        });

        let numbers: Vec<_> = stream.map(|r| r.unwrap().1).collect().await;
        assert_eq!(numbers, vec![5, 4, 3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn test_max_request_caps_chunk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let largest = Arc::new(AtomicUsize::new(0));
        let fetch = fetcher(true, calls.clone());
        let observed = largest.clone();
        let stream = ChunkedStream::new(second(0), second(19), usize::MAX, identity, move |cursor, count| {
            observed.fetch_max(count, Ordering::SeqCst);
            fetch(cursor, count)
        })
        .with_max_request(8);

        let items: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, (0..20).map(second).collect::<Vec<_>>());
        assert_eq!(largest.load(Ordering::SeqCst), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_steps_past_time_beyond_max_request() {
        let all = stamped(&[0, 0, 0, 1]);
        let stream = ChunkedStream::new(second(0), second(5), 2, stamp_time, move |cursor, count| {
            let chunk: Vec<_> = all.iter().copied().filter(|(t, _)| *t >= cursor).take(count).collect();
            Box::pin(async move { Ok(chunk) })
        })
        .with_max_request(2);

        let numbers: Vec<_> = stream.map(|r| r.unwrap().1).collect().await;
        assert_eq!(numbers, vec![0, 1, 3]);
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let stream: ChunkedStream<DateTime<Utc>> =
            ChunkedStream::new(second(0), second(5), 2, identity, move |cursor, _| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    if n == 0 {
                        Ok(vec![cursor, cursor + Duration::seconds(1)])
                    } else {
                        Err(Error::Timeout)
                    }
                })
            });
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert_eq!(items[2], Err(Error::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_stream() {
        let stream: ChunkedStream<u32> = ChunkedStream::failed(Error::NotLoggedOn);
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items, vec![Err(Error::NotLoggedOn)]);
    }
}
