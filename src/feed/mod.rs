//! Quote feed and quote store session.
//!
//! [`DataFeed`] keeps a quote feed connection (real-time quotes, reference
//! data) and a quote store connection (history) logged in together. It
//! caches session info, symbols, currencies and last quotes, reconnects on
//! its own, and delivers [`FeedEvent`]s to subscribed handlers on a
//! dedicated dispatch task.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tradelink_rs::config::ConnectionSettings;
//! use tradelink_rs::models::QuoteDepth;
//! use tradelink_rs::transport::mock::{MockQuoteFeed, MockQuoteStore};
//! use tradelink_rs::{DataFeed, FeedEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tradelink_rs::Result<()> {
//! let settings = ConnectionSettings::new("feed.example.com", "100500", "secret");
//! let feed = DataFeed::new(
//!     settings,
//!     Arc::new(MockQuoteFeed::with_sample_data()),
//!     Arc::new(MockQuoteStore::new()),
//! );
//!
//! feed.subscribe(|event: &FeedEvent| {
//!     if let FeedEvent::Tick(quote) = event {
//!         println!("{}", quote);
//!     }
//! });
//!
//! feed.start()?;
//! feed.wait_for_logon(Duration::from_secs(5)).await?;
//!
//! let snapshots = feed
//!     .subscribe_quotes(&["EURUSD"], QuoteDepth::Top, Duration::from_secs(5))
//!     .await?;
//! assert_eq!(snapshots.len(), 1);
//!
//! feed.stop().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod events;

pub use events::FeedEvent;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use self::cache::FeedCache;
use crate::config::ConnectionSettings;
use crate::history::{self, ChunkedStream, PairBarStream};
use crate::models::{
    Bar, Credentials, CurrencyInfo, HistoryInfo, LoginOutcome, LogoutInfo, LogoutReason,
    Periodicity, PriceType, Quote, QuoteDepth, SessionInfo, SymbolInfo,
};
use crate::session::{
    logout_from_error, request, EndSender, InitFlags, Link, LogonState, SessionCore,
    SessionLinks, SubscriptionId,
};
use crate::transport::{
    CallbackReceiver, QuoteFeedCallback, QuoteFeedClient, QuoteStoreCallback,
    QuoteStoreClient,
};
use crate::{Error, Result};

const QUOTE_FEED_LOGIN: InitFlags = InitFlags::from_bits(1 << 0);
const QUOTE_STORE_LOGIN: InitFlags = InitFlags::from_bits(1 << 1);
const SESSION_INFO: InitFlags = InitFlags::from_bits(1 << 2);
const CURRENCIES: InitFlags = InitFlags::from_bits(1 << 3);
const SYMBOLS: InitFlags = InitFlags::from_bits(1 << 4);

const ALL: InitFlags = QUOTE_FEED_LOGIN
    .union(QUOTE_STORE_LOGIN)
    .union(SESSION_INFO)
    .union(CURRENCIES)
    .union(SYMBOLS);
const RELOAD_ALL: InitFlags = SESSION_INFO.union(CURRENCIES).union(SYMBOLS);

fn login_flag(link: Link) -> InitFlags {
    match link {
        Link::Primary => QUOTE_FEED_LOGIN,
        Link::Secondary => QUOTE_STORE_LOGIN,
    }
}

/// Copy symbol names, rejecting an empty or blank list.
pub(crate) fn owned_symbols(symbols: &[&str]) -> Result<Vec<String>> {
    if symbols.is_empty() {
        return Err(Error::InvalidInput("symbol list is empty".to_string()));
    }
    symbols
        .iter()
        .map(|symbol| {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                Err(Error::InvalidSymbol(symbol.to_string()))
            } else {
                Ok(symbol.to_string())
            }
        })
        .collect()
}

/// Quote feed and quote store connections of a [`DataFeed`].
pub(crate) struct FeedLinks {
    quote_feed: Arc<dyn QuoteFeedClient>,
    quote_store: Arc<dyn QuoteStoreClient>,
}

type FeedSession = SessionCore<FeedLinks>;

/// Quote feed and quote store session pair.
///
/// Create with [`DataFeed::new`], register handlers with
/// [`subscribe`](DataFeed::subscribe), then [`start`](DataFeed::start).
/// Must be started and stopped inside a Tokio runtime.
pub struct DataFeed {
    inner: Arc<FeedSession>,
}

impl DataFeed {
    /// Create a stopped feed over the given protocol clients.
    pub fn new(
        settings: ConnectionSettings,
        quote_feed: Arc<dyn QuoteFeedClient>,
        quote_store: Arc<dyn QuoteStoreClient>,
    ) -> Self {
        let links = FeedLinks {
            quote_feed,
            quote_store,
        };
        Self {
            inner: Arc::new(SessionCore::new(settings, links)),
        }
    }

    /// Settings the feed was created with.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    /// Start the dispatch task and the first connect attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the feed is running (or ended on
    /// its own and was not stopped yet), or [`Error::Config`] for invalid
    /// settings.
    pub fn start(&self) -> Result<()> {
        self.inner.start()
    }

    /// Log out both connections, publish the final events and stop the
    /// dispatch task. Does nothing if the feed is not started.
    pub async fn stop(&self) {
        self.inner.stop().await
    }

    /// Register an event handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.inner.subscribe(handler)
    }

    /// Remove an event handler. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Returns `true` once every bootstrap step of the current attempt completed.
    pub fn is_logged_on(&self) -> bool {
        self.inner.is_logged_on()
    }

    /// Current login state.
    pub fn logon_state(&self) -> LogonState {
        self.inner.logon_state()
    }

    /// Wait until the current connect attempt logs on or ends.
    ///
    /// # Errors
    ///
    /// Returns the attempt's logout as [`Error::Logout`], [`Error::Timeout`]
    /// if neither happens in time, or [`Error::NotLoggedOn`] if the feed is
    /// stopped.
    pub async fn wait_for_logon(&self, timeout: Duration) -> Result<()> {
        self.inner.wait_for_logon(timeout).await
    }

    /// Answer a pending two-factor challenge on every connection that asked.
    ///
    /// Connections that accept the password continue their login. A
    /// rejected password leaves the challenge open for another answer.
    pub async fn two_factor_response(&self, one_time_password: &str, timeout: Duration) -> Result<()> {
        self.inner.two_factor_response(one_time_password, timeout).await
    }

    /// Extend the two-factor session on both connections.
    ///
    /// Returns the earlier of the two new expiry times.
    pub async fn two_factor_resume(&self, timeout: Duration) -> Result<DateTime<Utc>> {
        self.inner.two_factor_resume(timeout).await
    }

    /// Expiry of the current two-factor session, if any.
    pub async fn two_factor_expire(&self) -> Option<DateTime<Utc>> {
        self.inner.two_factor_expire().await
    }

    fn ensure_logged_on(&self) -> Result<()> {
        self.inner.ensure_logged_on()
    }

    // Quote feed requests

    /// Subscribe to quotes; returns the current snapshots.
    ///
    /// Subscriptions are remembered and restored after a reconnect.
    pub async fn subscribe_quotes(
        &self,
        symbols: &[&str],
        depth: QuoteDepth,
        timeout: Duration,
    ) -> Result<Vec<Quote>> {
        let symbols = owned_symbols(symbols)?;
        self.ensure_logged_on()?;

        let quotes = request(timeout, self.inner.links.quote_feed.subscribe_quotes(&symbols, depth)).await?;

        let mut state = self.inner.state.write().await;
        state.cache.add_subscriptions(&symbols, depth);
        for quote in &quotes {
            state.cache.update_quote(quote.clone());
        }
        debug!(count = symbols.len(), depth = ?depth, "Subscribed to quotes");
        Ok(quotes)
    }

    /// Stop quote updates for the symbols.
    pub async fn unsubscribe_quotes(&self, symbols: &[&str], timeout: Duration) -> Result<()> {
        let symbols = owned_symbols(symbols)?;
        self.ensure_logged_on()?;

        request(timeout, self.inner.links.quote_feed.unsubscribe_quotes(&symbols)).await?;
        self.inner
            .state
            .write()
            .await
            .cache
            .remove_subscriptions(&symbols);
        debug!(count = symbols.len(), "Unsubscribed from quotes");
        Ok(())
    }

    /// One-off snapshots without subscribing.
    pub async fn quote_snapshots(
        &self,
        symbols: &[&str],
        depth: QuoteDepth,
        timeout: Duration,
    ) -> Result<Vec<Quote>> {
        let symbols = owned_symbols(symbols)?;
        self.ensure_logged_on()?;
        request(timeout, self.inner.links.quote_feed.quotes(&symbols, depth)).await
    }

    // Quote store requests

    /// Up to `|count|` bars from `from`; a negative count walks backward.
    pub async fn bar_list(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
        from: DateTime<Utc>,
        count: i32,
        timeout: Duration,
    ) -> Result<Vec<Bar>> {
        self.ensure_logged_on()?;
        request(
            timeout,
            self.inner
                .links
                .quote_store
                .bar_list(symbol, price_type, periodicity, from, count),
        )
        .await
    }

    /// Up to `|count|` ticks from `from`; a negative count walks backward.
    pub async fn quote_list(
        &self,
        symbol: &str,
        depth: QuoteDepth,
        from: DateTime<Utc>,
        count: i32,
        timeout: Duration,
    ) -> Result<Vec<Quote>> {
        self.ensure_logged_on()?;
        request(timeout, self.inner.links.quote_store.quote_list(symbol, depth, from, count)).await
    }

    /// Stored bar range of a symbol.
    pub async fn bars_history_info(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
        timeout: Duration,
    ) -> Result<HistoryInfo> {
        self.ensure_logged_on()?;
        request(
            timeout,
            self.inner
                .links
                .quote_store
                .bars_history_info(symbol, price_type, periodicity),
        )
        .await
    }

    /// Stored tick range of a symbol.
    pub async fn quotes_history_info(
        &self,
        symbol: &str,
        depth: QuoteDepth,
        timeout: Duration,
    ) -> Result<HistoryInfo> {
        self.ensure_logged_on()?;
        request(timeout, self.inner.links.quote_store.quotes_history_info(symbol, depth)).await
    }

    /// Symbols with stored history.
    pub async fn quote_store_symbols(&self, timeout: Duration) -> Result<Vec<String>> {
        self.ensure_logged_on()?;
        request(timeout, self.inner.links.quote_store.symbol_list()).await
    }

    // History streams

    /// Bars between `start` and `end` (inclusive), fetched `chunk` at a time.
    ///
    /// Walks backward when `start` is after `end`. Each chunk request uses
    /// the operation timeout.
    pub fn bars(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk: usize,
    ) -> ChunkedStream<Bar> {
        if !self.is_logged_on() {
            return ChunkedStream::failed(Error::NotLoggedOn);
        }
        history::bars(
            self.inner.links.quote_store.clone(),
            symbol,
            price_type,
            periodicity,
            start,
            end,
            chunk,
            self.inner.settings.operation_timeout,
        )
    }

    /// Bid and ask bars merged by start time.
    pub fn pair_bars(
        &self,
        symbol: &str,
        periodicity: Periodicity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk: usize,
    ) -> PairBarStream {
        if !self.is_logged_on() {
            return history::merge_pair_bars(
                ChunkedStream::failed(Error::NotLoggedOn),
                ChunkedStream::failed(Error::NotLoggedOn),
            );
        }
        history::pair_bars(
            self.inner.links.quote_store.clone(),
            symbol,
            periodicity,
            start,
            end,
            chunk,
            self.inner.settings.operation_timeout,
        )
    }

    /// Ticks between `start` and `end` (inclusive).
    pub fn quotes_history(
        &self,
        symbol: &str,
        depth: QuoteDepth,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        chunk: usize,
    ) -> ChunkedStream<Quote> {
        if !self.is_logged_on() {
            return ChunkedStream::failed(Error::NotLoggedOn);
        }
        history::quotes(
            self.inner.links.quote_store.clone(),
            symbol,
            depth,
            start,
            end,
            chunk,
            self.inner.settings.operation_timeout,
        )
    }

    // Cache

    /// Cached session info.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        self.inner.state.read().await.cache.session_info()
    }

    /// Cached symbols, by sort order then name.
    pub async fn symbols(&self) -> Vec<SymbolInfo> {
        self.inner.state.read().await.cache.symbols()
    }

    /// Cached symbol by name.
    pub async fn symbol(&self, name: &str) -> Option<SymbolInfo> {
        self.inner.state.read().await.cache.symbol(name)
    }

    /// Cached currencies, by sort order then name.
    pub async fn currencies(&self) -> Vec<CurrencyInfo> {
        self.inner.state.read().await.cache.currencies()
    }

    /// Last quote of a subscribed symbol.
    pub async fn quote(&self, symbol: &str) -> Option<Quote> {
        self.inner.state.read().await.cache.quote(symbol)
    }

    /// Last quotes of all subscribed symbols, by symbol.
    pub async fn quotes(&self) -> Vec<Quote> {
        self.inner.state.read().await.cache.quotes()
    }
}

impl Drop for DataFeed {
    fn drop(&mut self) {
        self.inner.abort();
    }
}

impl std::fmt::Debug for DataFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFeed")
            .field("address", &self.inner.settings.address)
            .field("state", &self.inner.logon_state())
            .finish()
    }
}

#[async_trait]
impl SessionLinks for FeedLinks {
    type Event = FeedEvent;
    type Cache = FeedCache;

    const NAME: &'static str = "feed";
    const REQUIRED: InitFlags = ALL;
    const RELOAD_REQUIRED: InitFlags = RELOAD_ALL;

    fn login_flag(link: Link) -> InitFlags {
        login_flag(link)
    }

    async fn connect(session: &Arc<FeedSession>, generation: u64, end: &EndSender) -> Result<()> {
        let settings = &session.settings;
        let links = &session.links;
        let (feed_rx, store_rx) = tokio::try_join!(
            links.quote_feed.connect(&settings.address, settings.quote_feed_port),
            links.quote_store.connect(&settings.address, settings.quote_store_port),
        )?;
        session
            .tasks
            .spawn(session.clone().read_quote_feed(generation, feed_rx, end.clone()));
        session
            .tasks
            .spawn(session.clone().read_quote_store(store_rx, end.clone()));
        Ok(())
    }

    async fn login(&self, link: Link, credentials: &Credentials) -> Result<LoginOutcome> {
        match link {
            Link::Primary => self.quote_feed.login(credentials).await,
            Link::Secondary => self.quote_store.login(credentials).await,
        }
    }

    async fn two_factor_response(&self, link: Link, one_time_password: &str) -> Result<DateTime<Utc>> {
        match link {
            Link::Primary => self.quote_feed.two_factor_response(one_time_password).await,
            Link::Secondary => self.quote_store.two_factor_response(one_time_password).await,
        }
    }

    async fn two_factor_resume(&self, link: Link) -> Result<DateTime<Utc>> {
        match link {
            Link::Primary => self.quote_feed.two_factor_resume().await,
            Link::Secondary => self.quote_store.two_factor_resume().await,
        }
    }

    async fn logout(&self, link: Link, message: &str) -> Result<LogoutInfo> {
        match link {
            Link::Primary => self.quote_feed.logout(message).await,
            Link::Secondary => self.quote_store.logout(message).await,
        }
    }

    async fn disconnect(&self, link: Link, text: &str) {
        match link {
            Link::Primary => self.quote_feed.disconnect(text).await,
            Link::Secondary => self.quote_store.disconnect(text).await,
        }
    }

    fn on_link_login(session: &Arc<FeedSession>, link: Link, generation: u64, end: EndSender) {
        // The quote store has nothing to load
        if link == Link::Primary {
            session.tasks.spawn(session.clone().bootstrap(generation, end));
        }
    }

    fn on_logon(session: &Arc<FeedSession>, generation: u64) {
        session
            .tasks
            .spawn(session.clone().restore_subscriptions(generation));
    }

    fn reload(session: &Arc<FeedSession>, generation: u64, reload: u64) {
        session.tasks.spawn(session.clone().run_reload(generation, reload));
    }
}

impl FeedSession {
    async fn bootstrap(self: Arc<Self>, generation: u64, end: EndSender) {
        let result = tokio::try_join!(
            self.load_session_info(generation, None),
            self.load_currencies(generation, None),
            self.load_symbols(generation, None),
        );
        if let Err(e) = result {
            warn!(error = %e, "Feed bootstrap failed");
            let _ = end.send(logout_from_error(&e, LogoutReason::InternalServerError));
        }
    }

    async fn run_reload(self: Arc<Self>, generation: u64, reload: u64) {
        let result = tokio::try_join!(
            self.load_session_info(generation, Some(reload)),
            self.load_currencies(generation, Some(reload)),
            self.load_symbols(generation, Some(reload)),
        );
        if let Err(e) = result {
            self.reload_failed(&e).await;
        }
    }

    async fn load_session_info(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let info = request(self.settings.operation_timeout, self.links.quote_feed.session_info()).await?;
        let step = self
            .complete_step(generation, reload, SESSION_INFO, |cache| {
                cache.set_session_info(info.clone())
            })
            .await;
        if let Some(step) = step {
            self.publish(FeedEvent::SessionInfo(info)).await;
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    async fn load_currencies(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let currencies =
            request(self.settings.operation_timeout, self.links.quote_feed.currency_list()).await?;
        let step = self
            .complete_step(generation, reload, CURRENCIES, |cache| {
                cache.replace_currencies(currencies.clone())
            })
            .await;
        if let Some(step) = step {
            self.publish(FeedEvent::CurrencyInfo(currencies)).await;
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    async fn load_symbols(self: &Arc<Self>, generation: u64, reload: Option<u64>) -> Result<()> {
        let symbols =
            request(self.settings.operation_timeout, self.links.quote_feed.symbol_list()).await?;
        let step = self
            .complete_step(generation, reload, SYMBOLS, |cache| {
                cache.replace_symbols(symbols.clone())
            })
            .await;
        if let Some(step) = step {
            self.publish(FeedEvent::SymbolInfo(symbols)).await;
            self.finish_step(generation, step).await;
        }
        Ok(())
    }

    /// Re-send the remembered quote subscriptions after a logon.
    async fn restore_subscriptions(self: Arc<Self>, generation: u64) {
        let groups = {
            let state = self.state.read().await;
            if state.generation != generation {
                return;
            }
            state.cache.subscriptions_by_depth()
        };

        for (depth, symbols) in groups {
            let result = request(
                self.settings.operation_timeout,
                self.links.quote_feed.subscribe_quotes(&symbols, depth),
            )
            .await;
            match result {
                Ok(quotes) => {
                    let mut state = self.state.write().await;
                    if state.generation != generation {
                        return;
                    }
                    for quote in quotes {
                        state.cache.update_quote(quote);
                    }
                    debug!(count = symbols.len(), depth = ?depth, "Quote subscriptions restored");
                }
                Err(e) => {
                    warn!(symbols = ?symbols, error = %e, "Failed to restore quote subscriptions")
                }
            }
        }
    }

    async fn read_quote_feed(
        self: Arc<Self>,
        generation: u64,
        mut rx: CallbackReceiver<QuoteFeedCallback>,
        end: EndSender,
    ) {
        while let Some(callback) = rx.recv().await {
            if self.settings.log_messages {
                debug!(link = "quote_feed", message = ?callback, "Callback received");
            }
            match callback {
                QuoteFeedCallback::Logout(info) => {
                    let _ = end.send(info);
                    return;
                }
                QuoteFeedCallback::Disconnected(text) => {
                    let _ = end.send(LogoutInfo::new(LogoutReason::NetworkError, text));
                    return;
                }
                QuoteFeedCallback::SessionInfoUpdate(info) => {
                    if self
                        .update_cache(generation, |cache| cache.set_session_info(info.clone()))
                        .await
                    {
                        self.publish(FeedEvent::SessionInfo(info)).await;
                    }
                }
                QuoteFeedCallback::QuoteUpdate(quote) => {
                    if self
                        .update_cache(generation, |cache| cache.update_quote(quote.clone()))
                        .await
                    {
                        self.publish(FeedEvent::Tick(quote)).await;
                    }
                }
                QuoteFeedCallback::Notification(notification) if notification.is_config_updated() => {
                    self.on_config_updated(generation).await;
                }
                QuoteFeedCallback::Notification(notification) => {
                    self.publish(FeedEvent::Notification(notification)).await;
                }
            }
        }
        let _ = end.send(LogoutInfo::new(
            LogoutReason::NetworkError,
            "quote feed connection lost",
        ));
    }

    async fn read_quote_store(
        self: Arc<Self>,
        mut rx: CallbackReceiver<QuoteStoreCallback>,
        end: EndSender,
    ) {
        while let Some(callback) = rx.recv().await {
            if self.settings.log_messages {
                debug!(link = "quote_store", message = ?callback, "Callback received");
            }
            match callback {
                QuoteStoreCallback::Logout(info) => {
                    let _ = end.send(info);
                    return;
                }
                QuoteStoreCallback::Disconnected(text) => {
                    let _ = end.send(LogoutInfo::new(LogoutReason::NetworkError, text));
                    return;
                }
                QuoteStoreCallback::Notification(notification) => {
                    self.publish(FeedEvent::Notification(notification)).await;
                }
            }
        }
        let _ = end.send(LogoutInfo::new(
            LogoutReason::NetworkError,
            "quote store connection lost",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_masks() {
        assert!(ALL.contains(RELOAD_ALL));
        assert!(!RELOAD_ALL.contains(QUOTE_FEED_LOGIN));
        assert_eq!(ALL.bits(), 0b11111);
        assert_eq!(login_flag(Link::Secondary), QUOTE_STORE_LOGIN);
    }

    #[test]
    fn test_owned_symbols() {
        assert_eq!(
            owned_symbols(&["EURUSD", " GBPUSD "]).unwrap(),
            vec!["EURUSD".to_string(), "GBPUSD".to_string()]
        );
        assert!(matches!(owned_symbols(&[]), Err(Error::InvalidInput(_))));
        assert!(matches!(owned_symbols(&["EURUSD", "  "]), Err(Error::InvalidSymbol(_))));
    }
}
