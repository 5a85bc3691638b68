//! Events published by [`DataFeed`](super::DataFeed).

use crate::models::{
    CurrencyInfo, LogoutInfo, Notification, Quote, SessionInfo, SymbolInfo, TwoFactorAuth,
};
use crate::session::SessionEvent;

/// Event delivered to feed handlers on the dispatch task.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Every bootstrap step completed
    Logon,
    /// The session ended; once per connect attempt
    Logout(LogoutInfo),
    /// Two-factor challenge, result or error
    TwoFactorAuth(TwoFactorAuth),
    /// Session info loaded or updated
    SessionInfo(SessionInfo),
    /// Symbol list loaded
    SymbolInfo(Vec<SymbolInfo>),
    /// Currency list loaded
    CurrencyInfo(Vec<CurrencyInfo>),
    /// Subscribed quote changed
    Tick(Quote),
    /// Server notification
    Notification(Notification),
    /// Reload after a configuration change completed
    ConfigChanged,
}

impl FeedEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::Logon => "Logon",
            FeedEvent::Logout(_) => "Logout",
            FeedEvent::TwoFactorAuth(_) => "TwoFactorAuth",
            FeedEvent::SessionInfo(_) => "SessionInfo",
            FeedEvent::SymbolInfo(_) => "SymbolInfo",
            FeedEvent::CurrencyInfo(_) => "CurrencyInfo",
            FeedEvent::Tick(_) => "Tick",
            FeedEvent::Notification(_) => "Notification",
            FeedEvent::ConfigChanged => "ConfigChanged",
        }
    }
}

impl SessionEvent for FeedEvent {
    fn logon() -> Self {
        FeedEvent::Logon
    }

    fn logout(info: LogoutInfo) -> Self {
        FeedEvent::Logout(info)
    }

    fn two_factor(auth: TwoFactorAuth) -> Self {
        FeedEvent::TwoFactorAuth(auth)
    }

    fn config_changed() -> Self {
        FeedEvent::ConfigChanged
    }

    fn notification(notification: Notification) -> Self {
        FeedEvent::Notification(notification)
    }

    fn event_name(&self) -> &'static str {
        self.name()
    }
}
