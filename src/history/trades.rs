//! Trade report history over a trade capture connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::chunked::ChunkedStream;
use crate::models::TradeTransactionReport;
use crate::transport::TradeCaptureClient;
use crate::Error;

/// Trade transaction reports booked in `[from, to]`, oldest first.
pub fn trade_history(
    client: Arc<dyn TradeCaptureClient>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    skip_cancel: bool,
    chunk: usize,
    timeout: Duration,
) -> ChunkedStream<TradeTransactionReport> {
    if from > to {
        return ChunkedStream::failed(Error::InvalidInput(format!(
            "trade history range is reversed: {} > {}",
            from, to
        )));
    }

    ChunkedStream::new(
        from,
        to,
        chunk,
        |report: &TradeTransactionReport| report.transaction_time,
        move |cursor, count| {
            let client = client.clone();
            Box::pin(async move {
                tokio::time::timeout(timeout, client.trade_history(cursor, to, skip_cancel, count))
                    .await?
            })
        },
    )
}
