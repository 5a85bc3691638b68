//! Session-level models: credentials, session info, logout and two-factor
//! notifications.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::enums::{
    LogoutReason, NotificationSeverity, NotificationType, SessionStatus, TwoFactorReason,
};

/// Login credentials shared by both connections of a wrapper.
#[derive(Clone)]
pub struct Credentials {
    /// Account login
    pub username: String,
    password: SecretString,
    /// Device identifier reported to the server
    pub device_id: Option<String>,
    /// Application session identifier reported to the server
    pub app_session_id: Option<String>,
}

impl Credentials {
    /// Create credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            device_id: None,
            app_session_id: None,
        }
    }

    /// Get the password. Only transports should call this.
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("device_id", &self.device_id)
            .field("app_session_id", &self.app_session_id)
            .finish()
    }
}

/// Result of a transport-level login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Logged in
    LoggedIn,
    /// The server asks for a one-time password before completing login
    TwoFactorRequired,
}

/// Trading session schedule and server identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Current trading session id
    pub trading_session_id: String,
    /// Whether trading is open
    pub status: SessionStatus,
    /// Session start
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Session end
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Market open
    #[serde(default)]
    pub open_time: Option<DateTime<Utc>>,
    /// Market close
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    /// Server name
    pub server_name: String,
    /// Server description
    #[serde(default)]
    pub server_description: Option<String>,
    /// Platform operator
    #[serde(default)]
    pub platform_company: Option<String>,
    /// Per symbol-group schedules
    #[serde(default)]
    pub status_groups: Vec<StatusGroup>,
}

impl SessionInfo {
    /// Returns `true` if trading is open.
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

/// Trading schedule of a symbol group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusGroup {
    /// Group id
    pub id: String,
    /// Whether trading is open for the group
    pub status: SessionStatus,
    /// Group session start
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Group session end
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// Why and how a session ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogoutInfo {
    /// Logout reason
    pub reason: LogoutReason,
    /// Explanation
    pub text: String,
}

impl LogoutInfo {
    /// Create logout info.
    pub fn new(reason: LogoutReason, text: impl Into<String>) -> Self {
        Self {
            reason,
            text: text.into(),
        }
    }

    /// Convert into the matching error.
    pub fn into_error(self) -> crate::Error {
        crate::Error::Logout {
            reason: self.reason,
            text: self.text,
        }
    }
}

impl fmt::Display for LogoutInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.reason, self.text)
    }
}

/// Merged two-factor authentication notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoFactorAuth {
    /// Exchange stage
    pub reason: TwoFactorReason,
    /// Server text, set for errors
    #[serde(default)]
    pub text: Option<String>,
    /// When the two-factor session expires
    #[serde(default)]
    pub expire: Option<DateTime<Utc>>,
}

/// Server notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification type
    pub notification_type: NotificationType,
    /// Severity
    pub severity: NotificationSeverity,
    /// Message text
    pub text: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(
        notification_type: NotificationType,
        severity: NotificationSeverity,
        text: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            severity,
            text: text.into(),
        }
    }

    /// Returns `true` for the server's "configuration changed" signal.
    pub fn is_config_updated(&self) -> bool {
        self.notification_type == NotificationType::ConfigUpdated
    }
}
