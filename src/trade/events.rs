//! Events published by [`DataTrade`](super::DataTrade).

use crate::models::{
    AccountInfo, BalanceOperation, ExecutionReport, LogoutInfo, Notification, Position,
    SessionInfo, TradeTransactionReport, TwoFactorAuth,
};
use crate::session::SessionEvent;

/// Event delivered to trade handlers on the dispatch task.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    /// Every bootstrap step completed
    Logon,
    /// The session ended; once per connect attempt
    Logout(LogoutInfo),
    /// Two-factor challenge, result or error
    TwoFactorAuth(TwoFactorAuth),
    /// Session info loaded or updated
    SessionInfo(SessionInfo),
    /// Account info loaded or updated
    AccountInfo(AccountInfo),
    /// Order changed
    ExecutionReport(ExecutionReport),
    /// Net position changed
    PositionReport(Position),
    /// Trade booked
    TradeTransactionReport(TradeTransactionReport),
    /// Balance changed
    BalanceOperation(BalanceOperation),
    /// Server notification
    Notification(Notification),
    /// Reload after a configuration change completed
    ConfigChanged,
}

impl TradeEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            TradeEvent::Logon => "Logon",
            TradeEvent::Logout(_) => "Logout",
            TradeEvent::TwoFactorAuth(_) => "TwoFactorAuth",
            TradeEvent::SessionInfo(_) => "SessionInfo",
            TradeEvent::AccountInfo(_) => "AccountInfo",
            TradeEvent::ExecutionReport(_) => "ExecutionReport",
            TradeEvent::PositionReport(_) => "PositionReport",
            TradeEvent::TradeTransactionReport(_) => "TradeTransactionReport",
            TradeEvent::BalanceOperation(_) => "BalanceOperation",
            TradeEvent::Notification(_) => "Notification",
            TradeEvent::ConfigChanged => "ConfigChanged",
        }
    }
}

impl SessionEvent for TradeEvent {
    fn logon() -> Self {
        TradeEvent::Logon
    }

    fn logout(info: LogoutInfo) -> Self {
        TradeEvent::Logout(info)
    }

    fn two_factor(auth: TwoFactorAuth) -> Self {
        TradeEvent::TwoFactorAuth(auth)
    }

    fn config_changed() -> Self {
        TradeEvent::ConfigChanged
    }

    fn notification(notification: Notification) -> Self {
        TradeEvent::Notification(notification)
    }

    fn event_name(&self) -> &'static str {
        self.name()
    }
}
