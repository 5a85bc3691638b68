//! Reference data and last quotes held by a [`DataFeed`](super::DataFeed).

use std::collections::{BTreeMap, HashMap};

use crate::models::{CurrencyInfo, Quote, QuoteDepth, SessionInfo, SymbolInfo};

#[derive(Debug, Default)]
pub(crate) struct FeedCache {
    session_info: Option<SessionInfo>,
    symbols: HashMap<String, SymbolInfo>,
    currencies: BTreeMap<String, CurrencyInfo>,
    quotes: HashMap<String, Quote>,
    subscriptions: BTreeMap<String, QuoteDepth>,
}

impl FeedCache {
    pub(crate) fn session_info(&self) -> Option<SessionInfo> {
        self.session_info.clone()
    }

    pub(crate) fn set_session_info(&mut self, info: SessionInfo) {
        self.session_info = Some(info);
    }

    /// Replace the symbol list; quotes of symbols that disappeared are dropped.
    pub(crate) fn replace_symbols(&mut self, symbols: Vec<SymbolInfo>) {
        self.symbols = symbols
            .into_iter()
            .map(|symbol| (symbol.name.clone(), symbol))
            .collect();
        let known = &self.symbols;
        self.quotes.retain(|name, _| known.contains_key(name));
    }

    /// Symbols ordered by sort order, then name.
    pub(crate) fn symbols(&self) -> Vec<SymbolInfo> {
        let mut symbols: Vec<SymbolInfo> = self.symbols.values().cloned().collect();
        symbols.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        symbols
    }

    pub(crate) fn symbol(&self, name: &str) -> Option<SymbolInfo> {
        self.symbols.get(name).cloned()
    }

    pub(crate) fn replace_currencies(&mut self, currencies: Vec<CurrencyInfo>) {
        self.currencies = currencies
            .into_iter()
            .map(|currency| (currency.name.clone(), currency))
            .collect();
    }

    pub(crate) fn currencies(&self) -> Vec<CurrencyInfo> {
        let mut currencies: Vec<CurrencyInfo> = self.currencies.values().cloned().collect();
        currencies.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        currencies
    }

    pub(crate) fn update_quote(&mut self, quote: Quote) {
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    pub(crate) fn quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes.get(symbol).cloned()
    }

    pub(crate) fn quotes(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self.quotes.values().cloned().collect();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        quotes
    }

    pub(crate) fn add_subscriptions(&mut self, symbols: &[String], depth: QuoteDepth) {
        for symbol in symbols {
            self.subscriptions.insert(symbol.clone(), depth);
        }
    }

    pub(crate) fn remove_subscriptions(&mut self, symbols: &[String]) {
        for symbol in symbols {
            self.subscriptions.remove(symbol);
            self.quotes.remove(symbol);
        }
    }

    pub(crate) fn has_subscriptions(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Subscribed symbols grouped by depth, for re-subscribing after a reconnect.
    pub(crate) fn subscriptions_by_depth(&self) -> Vec<(QuoteDepth, Vec<String>)> {
        let mut groups: Vec<(QuoteDepth, Vec<String>)> = Vec::new();
        for (symbol, depth) in &self.subscriptions {
            match groups.iter_mut().find(|(d, _)| d == depth) {
                Some((_, symbols)) => symbols.push(symbol.clone()),
                None => groups.push((*depth, vec![symbol.clone()])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn symbol(name: &str, sort_order: i32) -> SymbolInfo {
        SymbolInfo {
            name: name.to_string(),
            sort_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_replace_symbols_drops_stale_quotes() {
        let mut cache = FeedCache::default();
        cache.replace_symbols(vec![symbol("EURUSD", 1), symbol("GBPUSD", 2)]);
        cache.update_quote(Quote::top("EURUSD", Utc::now(), None, None));
        cache.update_quote(Quote::top("GBPUSD", Utc::now(), None, None));

        cache.replace_symbols(vec![symbol("EURUSD", 1)]);
        assert!(cache.quote("EURUSD").is_some());
        assert!(cache.quote("GBPUSD").is_none());
        assert!(cache.symbol("GBPUSD").is_none());
    }

    #[test]
    fn test_symbols_sorted() {
        let mut cache = FeedCache::default();
        cache.replace_symbols(vec![symbol("USDJPY", 2), symbol("GBPUSD", 1), symbol("EURUSD", 1)]);
        let names: Vec<_> = cache.symbols().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["EURUSD", "GBPUSD", "USDJPY"]);
    }

    #[test]
    fn test_subscriptions_grouped_by_depth() {
        let mut cache = FeedCache::default();
        cache.add_subscriptions(&["EURUSD".into(), "GBPUSD".into()], QuoteDepth::Top);
        cache.add_subscriptions(&["USDJPY".into()], QuoteDepth::Levels(5));
        cache.remove_subscriptions(&["GBPUSD".into()]);

        let groups = cache.subscriptions_by_depth();
        assert_eq!(
            groups,
            vec![
                (QuoteDepth::Top, vec!["EURUSD".to_string()]),
                (QuoteDepth::Levels(5), vec!["USDJPY".to_string()]),
            ]
        );
    }
}
