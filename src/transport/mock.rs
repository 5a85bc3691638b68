//! In-memory protocol clients.
//!
//! The mocks keep their data in memory, answer requests from it and push
//! callbacks through the same channel a real transport would use. Tests and
//! demos script them: seed data, make the next login fail, demand a
//! one-time password, drop the connection, inject server messages.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tradelink_rs::transport::mock::MockQuoteFeed;
//! use tradelink_rs::transport::QuoteFeedCallback;
//!
//! let feed = Arc::new(MockQuoteFeed::with_sample_data());
//! feed.link().fail_next_connects(1);
//! assert!(!feed.link().push(QuoteFeedCallback::Disconnected("not connected".into())));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    CallbackReceiver, CallbackSender, Connection, OrderEntryCallback, OrderEntryClient,
    QuoteFeedCallback, QuoteFeedClient, QuoteStoreCallback, QuoteStoreClient,
    TradeCaptureCallback, TradeCaptureClient,
};
use crate::models::{
    AccountInfo, AccountType, Bar, Credentials, CurrencyInfo, ExecutionReport, ExecutionType,
    HistoryInfo, LoginOutcome, LogoutInfo, LogoutReason, NewOrderRequest, OrderId, OrderSide,
    OrderStatus, OrderType, Periodicity, Position, PriceType, Quote, QuoteDepth, QuoteEntry,
    RejectReason, ReplaceOrderRequest, SessionInfo, SessionStatus, SymbolInfo, Order,
    TradeTransactionReport,
};
use crate::{Error, Result};

struct LinkState<C> {
    sender: Option<CallbackSender<C>>,
    fail_connects: usize,
    login_error: Option<Error>,
    one_time_password: Option<(String, DateTime<Utc>)>,
    resume_expire: Option<DateTime<Utc>>,
    delay: Option<Duration>,
    failures: HashMap<&'static str, Error>,
    requests: HashMap<&'static str, usize>,
}

/// Connection-level behaviour shared by all mocks.
pub struct MockLink<C> {
    name: &'static str,
    state: Mutex<LinkState<C>>,
}

impl<C: Send + 'static> MockLink<C> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(LinkState {
                sender: None,
                fail_connects: 0,
                login_error: None,
                one_time_password: None,
                resume_expire: None,
                delay: None,
                failures: HashMap::new(),
                requests: HashMap::new(),
            }),
        }
    }

    /// Fail the next `count` connect attempts with [`Error::Connection`].
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().fail_connects = count;
    }

    /// Refuse every login with `error` until cleared with `None`.
    pub fn set_login_error(&self, error: Option<Error>) {
        self.state.lock().login_error = error;
    }

    /// Challenge logins for a one-time password; a correct answer returns
    /// `expire`.
    pub fn require_two_factor(&self, password: impl Into<String>, expire: DateTime<Utc>) {
        self.state.lock().one_time_password = Some((password.into(), expire));
    }

    /// Expiry returned by a resume; `None` makes resumes fail.
    pub fn set_resume_expire(&self, expire: Option<DateTime<Utc>>) {
        self.state.lock().resume_expire = expire;
    }

    /// Delay every request by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Fail the next call of the named request with `error`.
    ///
    /// Request names are the trait method names, e.g. `"symbol_list"`.
    pub fn fail_next(&self, request: &'static str, error: Error) {
        self.state.lock().failures.insert(request, error);
    }

    /// How often the named request was made.
    pub fn request_count(&self, request: &str) -> usize {
        self.state.lock().requests.get(request).copied().unwrap_or(0)
    }

    /// Returns `true` while a callback channel is open.
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Push a server message; returns `false` when not connected.
    pub fn push(&self, callback: C) -> bool {
        match self.state.lock().sender.as_ref() {
            Some(sender) => sender.send(callback).is_ok(),
            None => false,
        }
    }

    /// Close the callback channel as if the socket dropped.
    pub fn drop_connection(&self) {
        self.state.lock().sender = None;
    }

    async fn record(&self, request: &'static str) -> Result<()> {
        let (delay, failure) = {
            let mut state = self.state.lock();
            *state.requests.entry(request).or_insert(0) += 1;
            (state.delay, state.failures.remove(request))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn connect(&self, address: &str, port: u16) -> Result<CallbackReceiver<C>> {
        self.record("connect").await?;
        let mut state = self.state.lock();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(Error::Connection(format!(
                "{}: connection to {}:{} refused",
                self.name, address, port
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.sender = Some(tx);
        debug!(link = self.name, address, port, "Mock connected");
        Ok(rx)
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome> {
        self.record("login").await?;
        let state = self.state.lock();
        if let Some(error) = &state.login_error {
            return Err(error.clone());
        }
        debug!(link = self.name, username = %credentials.username, "Mock login");
        if state.one_time_password.is_some() {
            Ok(LoginOutcome::TwoFactorRequired)
        } else {
            Ok(LoginOutcome::LoggedIn)
        }
    }

    async fn two_factor_response(&self, one_time_password: &str) -> Result<DateTime<Utc>> {
        self.record("two_factor_response").await?;
        match &self.state.lock().one_time_password {
            Some((expected, expire)) if expected == one_time_password => Ok(*expire),
            Some(_) => Err(Error::TwoFactor("invalid one-time password".to_string())),
            None => Err(Error::TwoFactor("no two-factor challenge".to_string())),
        }
    }

    async fn two_factor_resume(&self) -> Result<DateTime<Utc>> {
        self.record("two_factor_resume").await?;
        self.state
            .lock()
            .resume_expire
            .ok_or_else(|| Error::TwoFactor("two-factor session cannot be resumed".to_string()))
    }

    async fn logout(&self, message: &str) -> Result<LogoutInfo> {
        self.record("logout").await?;
        self.state.lock().sender = None;
        Ok(LogoutInfo::new(LogoutReason::ClientInitiated, message))
    }

    fn disconnect(&self, text: &str) {
        debug!(link = self.name, text, "Mock disconnected");
        self.state.lock().sender = None;
    }
}

macro_rules! mock_connection {
    ($mock:ty, $callback:ty) => {
        #[async_trait]
        impl Connection for $mock {
            type Callback = $callback;

            async fn connect(
                &self,
                address: &str,
                port: u16,
            ) -> Result<CallbackReceiver<$callback>> {
                self.link.connect(address, port).await
            }

            async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome> {
                self.link.login(credentials).await
            }

            async fn two_factor_response(&self, one_time_password: &str) -> Result<DateTime<Utc>> {
                self.link.two_factor_response(one_time_password).await
            }

            async fn two_factor_resume(&self) -> Result<DateTime<Utc>> {
                self.link.two_factor_resume().await
            }

            async fn logout(&self, message: &str) -> Result<LogoutInfo> {
                self.link.logout(message).await
            }

            async fn disconnect(&self, text: &str) {
                self.link.disconnect(text)
            }
        }
    };
}

fn unknown_symbol(symbol: &str) -> Error {
    Error::rejected(RejectReason::UnknownSymbol, format!("unknown symbol {}", symbol))
}

fn sample_session() -> SessionInfo {
    SessionInfo {
        trading_session_id: "1".to_string(),
        status: SessionStatus::Open,
        start_time: Some(Utc::now()),
        server_name: "mock".to_string(),
        ..Default::default()
    }
}

fn sample_symbol(name: &str, precision: u32) -> SymbolInfo {
    SymbolInfo {
        name: name.to_string(),
        currency: name[..3].to_string(),
        settlement_currency: name[3..].to_string(),
        precision,
        contract_size: Decimal::from(100_000),
        min_trade_amount: Decimal::from(1_000),
        max_trade_amount: Decimal::from(10_000_000),
        trade_amount_step: Decimal::from(1_000),
        is_trade_allowed: true,
        ..Default::default()
    }
}

fn sample_currency(name: &str, sort_order: i32) -> CurrencyInfo {
    CurrencyInfo {
        name: name.to_string(),
        precision: 2,
        sort_order,
        ..Default::default()
    }
}

fn sample_quote(symbol: &str, bid: Decimal, ask: Decimal) -> Quote {
    Quote::top(
        symbol,
        Utc::now(),
        Some(QuoteEntry::new(bid, Decimal::from(1_000_000))),
        Some(QuoteEntry::new(ask, Decimal::from(1_000_000))),
    )
}

fn limit_depth(quote: &Quote, depth: QuoteDepth) -> Quote {
    match depth.levels() {
        Some(levels) => quote.truncated(levels as usize),
        None => quote.clone(),
    }
}

// Quote feed

#[derive(Default)]
struct QuoteFeedData {
    session: SessionInfo,
    currencies: Vec<CurrencyInfo>,
    symbols: Vec<SymbolInfo>,
    quotes: HashMap<String, Quote>,
    subscribed: HashMap<String, QuoteDepth>,
}

/// In-memory quote feed.
pub struct MockQuoteFeed {
    link: MockLink<QuoteFeedCallback>,
    data: Mutex<QuoteFeedData>,
}

impl Default for MockQuoteFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MockQuoteFeed {
    /// Empty feed with an open session.
    pub fn new() -> Self {
        Self {
            link: MockLink::new("quote_feed"),
            data: Mutex::new(QuoteFeedData {
                session: sample_session(),
                ..Default::default()
            }),
        }
    }

    /// Feed seeded with EURUSD, GBPUSD and USDJPY.
    pub fn with_sample_data() -> Self {
        let feed = Self::new();
        feed.set_currencies(vec![
            sample_currency("USD", 1),
            sample_currency("EUR", 2),
            sample_currency("GBP", 3),
            sample_currency("JPY", 4),
        ]);
        feed.set_symbols(vec![
            sample_symbol("EURUSD", 5),
            sample_symbol("GBPUSD", 5),
            sample_symbol("USDJPY", 3),
        ]);
        feed.set_quote(sample_quote("EURUSD", Decimal::new(108500, 5), Decimal::new(108520, 5)));
        feed.set_quote(sample_quote("GBPUSD", Decimal::new(126400, 5), Decimal::new(126430, 5)));
        feed.set_quote(sample_quote("USDJPY", Decimal::new(151200, 3), Decimal::new(151220, 3)));
        feed
    }

    /// Connection controls.
    pub fn link(&self) -> &MockLink<QuoteFeedCallback> {
        &self.link
    }

    /// Replace the session info.
    pub fn set_session(&self, session: SessionInfo) {
        self.data.lock().session = session;
    }

    /// Replace the currency list.
    pub fn set_currencies(&self, currencies: Vec<CurrencyInfo>) {
        self.data.lock().currencies = currencies;
    }

    /// Replace the symbol list.
    pub fn set_symbols(&self, symbols: Vec<SymbolInfo>) {
        self.data.lock().symbols = symbols;
    }

    /// Store a quote without publishing it.
    pub fn set_quote(&self, quote: Quote) {
        self.data.lock().quotes.insert(quote.symbol.clone(), quote);
    }

    /// Store a quote and publish it if the symbol is subscribed.
    ///
    /// Returns `true` if the quote was pushed.
    pub fn emit_quote(&self, quote: Quote) -> bool {
        let depth = {
            let mut data = self.data.lock();
            data.quotes.insert(quote.symbol.clone(), quote.clone());
            data.subscribed.get(&quote.symbol).copied()
        };
        match depth {
            Some(depth) => self
                .link
                .push(QuoteFeedCallback::QuoteUpdate(limit_depth(&quote, depth))),
            None => false,
        }
    }

    /// Currently subscribed symbols, sorted.
    pub fn subscribed(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.data.lock().subscribed.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn snapshots(&self, symbols: &[String], depth: QuoteDepth, subscribe: bool) -> Result<Vec<Quote>> {
        let mut data = self.data.lock();
        if let Some(unknown) = symbols
            .iter()
            .find(|symbol| !data.symbols.iter().any(|s| &s.name == *symbol))
        {
            return Err(unknown_symbol(unknown));
        }
        if subscribe {
            for symbol in symbols {
                data.subscribed.insert(symbol.clone(), depth);
            }
        }
        Ok(symbols
            .iter()
            .filter_map(|symbol| data.quotes.get(symbol))
            .map(|quote| limit_depth(quote, depth))
            .collect())
    }
}

mock_connection!(MockQuoteFeed, QuoteFeedCallback);

#[async_trait]
impl QuoteFeedClient for MockQuoteFeed {
    async fn session_info(&self) -> Result<SessionInfo> {
        self.link.record("session_info").await?;
        Ok(self.data.lock().session.clone())
    }

    async fn currency_list(&self) -> Result<Vec<CurrencyInfo>> {
        self.link.record("currency_list").await?;
        Ok(self.data.lock().currencies.clone())
    }

    async fn symbol_list(&self) -> Result<Vec<SymbolInfo>> {
        self.link.record("symbol_list").await?;
        Ok(self.data.lock().symbols.clone())
    }

    async fn subscribe_quotes(&self, symbols: &[String], depth: QuoteDepth) -> Result<Vec<Quote>> {
        self.link.record("subscribe_quotes").await?;
        self.snapshots(symbols, depth, true)
    }

    async fn unsubscribe_quotes(&self, symbols: &[String]) -> Result<()> {
        self.link.record("unsubscribe_quotes").await?;
        let mut data = self.data.lock();
        for symbol in symbols {
            data.subscribed.remove(symbol);
        }
        Ok(())
    }

    async fn quotes(&self, symbols: &[String], depth: QuoteDepth) -> Result<Vec<Quote>> {
        self.link.record("quotes").await?;
        self.snapshots(symbols, depth, false)
    }
}

// Quote store

type BarKey = (String, PriceType, Periodicity);

#[derive(Default)]
struct QuoteStoreData {
    bars: HashMap<BarKey, Vec<Bar>>,
    ticks: HashMap<String, Vec<Quote>>,
}

/// In-memory quote history.
pub struct MockQuoteStore {
    link: MockLink<QuoteStoreCallback>,
    data: Mutex<QuoteStoreData>,
}

impl Default for MockQuoteStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick up to `|count|` items starting at `from`: forward for a positive
/// count, backward (newest first) for a negative one.
fn window<T: Clone>(
    items: &[T],
    time: impl Fn(&T) -> DateTime<Utc>,
    from: DateTime<Utc>,
    count: i32,
) -> Vec<T> {
    let limit = count.unsigned_abs() as usize;
    if count >= 0 {
        items
            .iter()
            .filter(|item| time(*item) >= from)
            .take(limit)
            .cloned()
            .collect()
    } else {
        items
            .iter()
            .rev()
            .filter(|item| time(*item) <= from)
            .take(limit)
            .cloned()
            .collect()
    }
}

impl MockQuoteStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            link: MockLink::new("quote_store"),
            data: Mutex::new(QuoteStoreData::default()),
        }
    }

    /// Connection controls.
    pub fn link(&self) -> &MockLink<QuoteStoreCallback> {
        &self.link
    }

    /// Replace the bars of one series; they are kept sorted by start time.
    pub fn set_bars(
        &self,
        symbol: impl Into<String>,
        price_type: PriceType,
        periodicity: Periodicity,
        mut bars: Vec<Bar>,
    ) {
        bars.sort_by_key(|bar| bar.from);
        self.data
            .lock()
            .bars
            .insert((symbol.into(), price_type, periodicity), bars);
    }

    /// Replace the ticks of one symbol; they are kept sorted by time.
    pub fn set_ticks(&self, symbol: impl Into<String>, mut ticks: Vec<Quote>) {
        ticks.sort_by_key(|quote| quote.created);
        self.data.lock().ticks.insert(symbol.into(), ticks);
    }

    fn has_symbol(data: &QuoteStoreData, symbol: &str) -> bool {
        data.ticks.contains_key(symbol) || data.bars.keys().any(|(s, _, _)| s == symbol)
    }
}

mock_connection!(MockQuoteStore, QuoteStoreCallback);

#[async_trait]
impl QuoteStoreClient for MockQuoteStore {
    async fn symbol_list(&self) -> Result<Vec<String>> {
        self.link.record("symbol_list").await?;
        let data = self.data.lock();
        let symbols: BTreeSet<String> = data
            .bars
            .keys()
            .map(|(symbol, _, _)| symbol.clone())
            .chain(data.ticks.keys().cloned())
            .collect();
        Ok(symbols.into_iter().collect())
    }

    async fn bar_list(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
        from: DateTime<Utc>,
        count: i32,
    ) -> Result<Vec<Bar>> {
        self.link.record("bar_list").await?;
        let data = self.data.lock();
        if !Self::has_symbol(&data, symbol) {
            return Err(unknown_symbol(symbol));
        }
        let key = (symbol.to_string(), price_type, periodicity);
        Ok(data
            .bars
            .get(&key)
            .map(|bars| window(bars, |bar| bar.from, from, count))
            .unwrap_or_default())
    }

    async fn quote_list(
        &self,
        symbol: &str,
        depth: QuoteDepth,
        from: DateTime<Utc>,
        count: i32,
    ) -> Result<Vec<Quote>> {
        self.link.record("quote_list").await?;
        let data = self.data.lock();
        if !Self::has_symbol(&data, symbol) {
            return Err(unknown_symbol(symbol));
        }
        Ok(data
            .ticks
            .get(symbol)
            .map(|ticks| window(ticks, |quote| quote.created, from, count))
            .unwrap_or_default()
            .iter()
            .map(|quote| limit_depth(quote, depth))
            .collect())
    }

    async fn bars_history_info(
        &self,
        symbol: &str,
        price_type: PriceType,
        periodicity: Periodicity,
    ) -> Result<HistoryInfo> {
        self.link.record("bars_history_info").await?;
        let data = self.data.lock();
        if !Self::has_symbol(&data, symbol) {
            return Err(unknown_symbol(symbol));
        }
        let bars = data.bars.get(&(symbol.to_string(), price_type, periodicity));
        Ok(HistoryInfo {
            symbol: symbol.to_string(),
            available_from: bars.and_then(|bars| bars.first()).map(|bar| bar.from),
            available_to: bars.and_then(|bars| bars.last()).map(|bar| bar.from),
        })
    }

    async fn quotes_history_info(&self, symbol: &str, _depth: QuoteDepth) -> Result<HistoryInfo> {
        self.link.record("quotes_history_info").await?;
        let data = self.data.lock();
        if !Self::has_symbol(&data, symbol) {
            return Err(unknown_symbol(symbol));
        }
        let ticks = data.ticks.get(symbol);
        Ok(HistoryInfo {
            symbol: symbol.to_string(),
            available_from: ticks.and_then(|ticks| ticks.first()).map(|quote| quote.created),
            available_to: ticks.and_then(|ticks| ticks.last()).map(|quote| quote.created),
        })
    }
}

// Order entry

struct OrderEntryData {
    session: SessionInfo,
    account: AccountInfo,
    orders: HashMap<OrderId, Order>,
    positions: HashMap<String, Position>,
    next_id: u64,
    fill_price: Decimal,
    reject: Option<(RejectReason, String)>,
}

/// In-memory order entry.
///
/// Market orders fill immediately at the fill price. On a gross account the
/// fill stays open as a position order that can be closed; on a net account
/// it updates the symbol position instead. Pending orders rest until
/// replaced or cancelled. Every report is also pushed as a callback.
pub struct MockOrderEntry {
    link: MockLink<OrderEntryCallback>,
    data: Mutex<OrderEntryData>,
}

impl Default for MockOrderEntry {
    fn default() -> Self {
        Self::new(AccountType::Gross)
    }
}

impl MockOrderEntry {
    /// Account of the given type with a 10 000 USD balance.
    pub fn new(account_type: AccountType) -> Self {
        let balance = Decimal::from(10_000);
        Self {
            link: MockLink::new("order_entry"),
            data: Mutex::new(OrderEntryData {
                session: sample_session(),
                account: AccountInfo {
                    account_id: "100500".into(),
                    account_type,
                    currency: "USD".to_string(),
                    leverage: Decimal::from(100),
                    balance,
                    equity: Some(balance),
                    margin: Some(Decimal::ZERO),
                    margin_call_level: Decimal::from(100),
                    stop_out_level: Decimal::from(50),
                    ..Default::default()
                },
                orders: HashMap::new(),
                positions: HashMap::new(),
                next_id: 1,
                fill_price: Decimal::ONE,
                reject: None,
            }),
        }
    }

    /// Connection controls.
    pub fn link(&self) -> &MockLink<OrderEntryCallback> {
        &self.link
    }

    /// Price used for market fills.
    pub fn set_fill_price(&self, price: Decimal) {
        self.data.lock().fill_price = price;
    }

    /// Reject every order request until cleared with `None`.
    pub fn set_reject(&self, reject: Option<(RejectReason, String)>) {
        self.data.lock().reject = reject;
    }

    /// Replace the account snapshot.
    pub fn set_account(&self, account: AccountInfo) {
        self.data.lock().account = account;
    }

    /// Seed a resting order.
    pub fn insert_order(&self, order: Order) {
        self.data.lock().orders.insert(order.order_id.clone(), order);
    }

    /// Seed a position.
    pub fn insert_position(&self, position: Position) {
        self.data
            .lock()
            .positions
            .insert(position.symbol.clone(), position);
    }

    /// Apply a balance change and push it as a callback.
    pub fn deposit(&self, amount: Decimal) -> bool {
        let operation = {
            let mut data = self.data.lock();
            data.account.balance += amount;
            crate::models::BalanceOperation {
                balance: data.account.balance,
                transaction_amount: amount,
                transaction_currency: data.account.currency.clone(),
            }
        };
        self.link.push(OrderEntryCallback::BalanceOperation(operation))
    }

    fn check_reject(data: &OrderEntryData) -> Result<()> {
        match &data.reject {
            Some((reason, text)) => Err(Error::rejected(*reason, text.clone())),
            None => Ok(()),
        }
    }

    fn publish(&self, reports: &[ExecutionReport], positions: &[Position]) {
        for report in reports {
            self.link
                .push(OrderEntryCallback::ExecutionReport(report.clone()));
        }
        for position in positions {
            self.link
                .push(OrderEntryCallback::PositionUpdate(position.clone()));
        }
    }
}

fn report_for(order: &Order, execution_type: ExecutionType) -> ExecutionReport {
    ExecutionReport {
        order_id: order.order_id.clone(),
        client_order_id: order.client_order_id.clone(),
        execution_type,
        order_status: order.status,
        order_type: order.order_type,
        side: order.side,
        symbol: order.symbol.clone(),
        price: order.price,
        stop_price: order.stop_price,
        initial_amount: order.initial_amount,
        leaves_amount: order.remaining_amount,
        executed_amount: order.initial_amount - order.remaining_amount,
        stop_loss: order.stop_loss,
        take_profit: order.take_profit,
        time_in_force: order.time_in_force,
        expiration: order.expiration,
        created: order.created,
        modified: order.modified,
        comment: order.comment.clone(),
        ..Default::default()
    }
}

fn net_fill(position: &mut Position, side: OrderSide, amount: Decimal, price: Decimal) {
    match side {
        OrderSide::Buy => {
            position.buy_amount += amount;
            position.buy_price = Some(price);
        }
        OrderSide::Sell => {
            position.sell_amount += amount;
            position.sell_price = Some(price);
        }
    }
    let net = position.buy_amount - position.sell_amount;
    if net >= Decimal::ZERO {
        position.buy_amount = net;
        position.sell_amount = Decimal::ZERO;
        position.sell_price = None;
    } else {
        position.sell_amount = -net;
        position.buy_amount = Decimal::ZERO;
        position.buy_price = None;
    }
    position.modified = Some(Utc::now());
}

mock_connection!(MockOrderEntry, OrderEntryCallback);

#[async_trait]
impl OrderEntryClient for MockOrderEntry {
    async fn session_info(&self) -> Result<SessionInfo> {
        self.link.record("session_info").await?;
        Ok(self.data.lock().session.clone())
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        self.link.record("account_info").await?;
        Ok(self.data.lock().account.clone())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        self.link.record("orders").await?;
        Ok(self.data.lock().orders.values().cloned().collect())
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        self.link.record("positions").await?;
        Ok(self.data.lock().positions.values().cloned().collect())
    }

    async fn new_order(&self, request: &NewOrderRequest) -> Result<Vec<ExecutionReport>> {
        self.link.record("new_order").await?;
        let (reports, positions) = {
            let mut data = self.data.lock();
            Self::check_reject(&data)?;

            let now = Utc::now();
            let order_id = OrderId::new(data.next_id.to_string());
            data.next_id += 1;

            let mut order = Order {
                order_id: order_id.clone(),
                client_order_id: request.client_order_id.clone(),
                symbol: request.symbol.clone(),
                order_type: request.order_type,
                side: request.side,
                status: OrderStatus::New,
                price: request.price,
                stop_price: request.stop_price,
                initial_amount: request.amount,
                remaining_amount: request.amount,
                stop_loss: request.stop_loss,
                take_profit: request.take_profit,
                time_in_force: request.time_in_force,
                expiration: request.expiration,
                created: Some(now),
                modified: Some(now),
                comment: request.comment.clone(),
                ..Default::default()
            };
            let mut reports = vec![report_for(&order, ExecutionType::New)];
            let mut positions = Vec::new();

            if request.order_type.is_pending() {
                data.orders.insert(order_id, order);
            } else {
                let price = data.fill_price;
                if data.account.account_type == AccountType::Gross {
                    order.order_type = OrderType::Position;
                    order.status = OrderStatus::Calculated;
                    order.price = Some(price);
                    let mut fill = report_for(&order, ExecutionType::Trade);
                    fill.executed_amount = request.amount;
                    fill.trade_amount = Some(request.amount);
                    fill.trade_price = Some(price);
                    fill.average_price = Some(price);
                    reports.push(fill);
                    data.orders.insert(order_id, order);
                } else {
                    order.status = OrderStatus::Filled;
                    order.remaining_amount = Decimal::ZERO;
                    let mut fill = report_for(&order, ExecutionType::Trade);
                    fill.trade_amount = Some(request.amount);
                    fill.trade_price = Some(price);
                    fill.average_price = Some(price);
                    reports.push(fill);

                    let position = data
                        .positions
                        .entry(request.symbol.clone())
                        .or_insert_with(|| Position {
                            symbol: request.symbol.clone(),
                            ..Default::default()
                        });
                    net_fill(position, request.side, request.amount, price);
                    positions.push(position.clone());
                }
            }
            (reports, positions)
        };
        self.publish(&reports, &positions);
        Ok(reports)
    }

    async fn replace_order(&self, request: &ReplaceOrderRequest) -> Result<Vec<ExecutionReport>> {
        self.link.record("replace_order").await?;
        let report = {
            let mut data = self.data.lock();
            Self::check_reject(&data)?;
            let order = data.orders.get_mut(&request.order_id).ok_or_else(|| {
                Error::rejected(
                    RejectReason::UnknownOrder,
                    format!("order {} not found", request.order_id),
                )
            })?;
            if let Some(amount) = request.amount {
                let filled = order.initial_amount - order.remaining_amount;
                order.initial_amount = amount;
                order.remaining_amount = amount - filled;
            }
            if request.price.is_some() {
                order.price = request.price;
            }
            if request.stop_price.is_some() {
                order.stop_price = request.stop_price;
            }
            if request.stop_loss.is_some() {
                order.stop_loss = request.stop_loss;
            }
            if request.take_profit.is_some() {
                order.take_profit = request.take_profit;
            }
            if request.expiration.is_some() {
                order.expiration = request.expiration;
            }
            if request.comment.is_some() {
                order.comment = request.comment.clone();
            }
            order.modified = Some(Utc::now());
            report_for(order, ExecutionType::Replace)
        };
        self.publish(std::slice::from_ref(&report), &[]);
        Ok(vec![report])
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Vec<ExecutionReport>> {
        self.link.record("cancel_order").await?;
        let report = {
            let mut data = self.data.lock();
            Self::check_reject(&data)?;
            let is_pending = data
                .orders
                .get(order_id)
                .is_some_and(|order| order.order_type.is_pending());
            if !is_pending {
                return Err(Error::rejected(
                    RejectReason::UnknownOrder,
                    format!("no pending order {}", order_id),
                ));
            }
            let mut order = data
                .orders
                .remove(order_id)
                .ok_or_else(|| Error::rejected(RejectReason::UnknownOrder, order_id.to_string()))?;
            order.status = OrderStatus::Canceled;
            order.modified = Some(Utc::now());
            report_for(&order, ExecutionType::Canceled)
        };
        self.publish(std::slice::from_ref(&report), &[]);
        Ok(vec![report])
    }

    async fn close_position(
        &self,
        order_id: &OrderId,
        amount: Option<Decimal>,
    ) -> Result<Vec<ExecutionReport>> {
        self.link.record("close_position").await?;
        let report = {
            let mut data = self.data.lock();
            Self::check_reject(&data)?;
            let price = data.fill_price;
            let order = data
                .orders
                .get_mut(order_id)
                .filter(|order| order.is_position())
                .ok_or_else(|| {
                    Error::rejected(
                        RejectReason::UnknownOrder,
                        format!("no position {}", order_id),
                    )
                })?;
            let close = amount.unwrap_or(order.remaining_amount);
            if close <= Decimal::ZERO || close > order.remaining_amount {
                return Err(Error::rejected(
                    RejectReason::IncorrectQuantity,
                    format!("cannot close {} of {}", close, order.remaining_amount),
                ));
            }
            order.remaining_amount -= close;
            order.status = if order.remaining_amount.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            order.modified = Some(Utc::now());
            let mut report = report_for(order, ExecutionType::Trade);
            report.trade_amount = Some(close);
            report.trade_price = Some(price);
            if order.status == OrderStatus::Filled {
                data.orders.remove(order_id);
            }
            report
        };
        self.publish(std::slice::from_ref(&report), &[]);
        Ok(vec![report])
    }

    async fn close_position_by(
        &self,
        order_id: &OrderId,
        by_order_id: &OrderId,
    ) -> Result<Vec<ExecutionReport>> {
        self.link.record("close_position_by").await?;
        let reports = {
            let mut data = self.data.lock();
            Self::check_reject(&data)?;
            let (first, second) = match (data.orders.get(order_id), data.orders.get(by_order_id)) {
                (Some(a), Some(b)) if a.is_position() && b.is_position() => (a.clone(), b.clone()),
                _ => {
                    return Err(Error::rejected(
                        RejectReason::UnknownOrder,
                        format!("positions {} and {} not found", order_id, by_order_id),
                    ))
                }
            };
            if first.symbol != second.symbol || first.side == second.side {
                return Err(Error::rejected(
                    RejectReason::DealerReject,
                    "positions must be opposite sides of one symbol",
                ));
            }
            let amount = first.remaining_amount.min(second.remaining_amount);
            let now = Utc::now();
            let mut reports = Vec::with_capacity(2);
            for mut order in [first, second] {
                order.remaining_amount -= amount;
                order.modified = Some(now);
                order.status = if order.remaining_amount.is_zero() {
                    data.orders.remove(&order.order_id);
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                if order.status != OrderStatus::Filled {
                    data.orders.insert(order.order_id.clone(), order.clone());
                }
                let mut report = report_for(&order, ExecutionType::Trade);
                report.trade_amount = Some(amount);
                reports.push(report);
            }
            reports
        };
        self.publish(&reports, &[]);
        Ok(reports)
    }
}

// Trade capture

#[derive(Default)]
struct TradeCaptureData {
    reports: Vec<TradeTransactionReport>,
    subscribed: Option<bool>,
}

/// In-memory trade capture.
pub struct MockTradeCapture {
    link: MockLink<TradeCaptureCallback>,
    data: Mutex<TradeCaptureData>,
}

impl Default for MockTradeCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTradeCapture {
    /// Empty trade capture.
    pub fn new() -> Self {
        Self {
            link: MockLink::new("trade_capture"),
            data: Mutex::new(TradeCaptureData::default()),
        }
    }

    /// Connection controls.
    pub fn link(&self) -> &MockLink<TradeCaptureCallback> {
        &self.link
    }

    /// Seed booked reports; they are kept sorted by time.
    pub fn set_reports(&self, mut reports: Vec<TradeTransactionReport>) {
        reports.sort_by_key(|report| report.transaction_time);
        self.data.lock().reports = reports;
    }

    /// Book a report and publish it to a subscribed session.
    ///
    /// Returns `true` if the report was pushed.
    pub fn emit_trade(&self, report: TradeTransactionReport) -> bool {
        let skip_cancel = {
            let mut data = self.data.lock();
            let at = data
                .reports
                .partition_point(|r| r.transaction_time <= report.transaction_time);
            data.reports.insert(at, report.clone());
            data.subscribed
        };
        match skip_cancel {
            Some(skip_cancel) if !(skip_cancel && report.is_cancel()) => {
                self.link.push(TradeCaptureCallback::TradeUpdate(report))
            }
            _ => false,
        }
    }

    /// Returns `true` while trade reports are subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.data.lock().subscribed.is_some()
    }
}

mock_connection!(MockTradeCapture, TradeCaptureCallback);

#[async_trait]
impl TradeCaptureClient for MockTradeCapture {
    async fn subscribe_trades(&self, skip_cancel: bool) -> Result<()> {
        self.link.record("subscribe_trades").await?;
        self.data.lock().subscribed = Some(skip_cancel);
        Ok(())
    }

    async fn unsubscribe_trades(&self) -> Result<()> {
        self.link.record("unsubscribe_trades").await?;
        self.data.lock().subscribed = None;
        Ok(())
    }

    async fn trade_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        skip_cancel: bool,
        count: usize,
    ) -> Result<Vec<TradeTransactionReport>> {
        self.link.record("trade_history").await?;
        Ok(self
            .data
            .lock()
            .reports
            .iter()
            .filter(|r| r.transaction_time >= from && r.transaction_time <= to)
            .filter(|r| !(skip_cancel && r.is_cancel()))
            .take(count)
            .cloned()
            .collect())
    }
}
