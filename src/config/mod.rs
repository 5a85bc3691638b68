//! Connection settings for the feed and trade sessions.
//!
//! Settings are built fluently or parsed from a typed connection string
//! (see [`parser`]).
//!
//! # Example
//!
//! ```
//! use tradelink_rs::config::ConnectionSettings;
//! use std::time::Duration;
//!
//! let settings = ConnectionSettings::new("trade.example.com", "100500", "secret")
//!     .with_operation_timeout(Duration::from_secs(10))
//!     .with_log_events(true);
//!
//! let text = settings.to_connection_string().unwrap();
//! let parsed: ConnectionSettings = text.parse().unwrap();
//! assert_eq!(parsed.address, "trade.example.com");
//! assert!(parsed.log_events);
//! ```

pub mod parser;
mod reconnect;

pub use parser::{ConnectionString, Entry, Value, ValueType};
pub use reconnect::ReconnectConfig;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::models::Credentials;
use crate::{Error, Result};

/// Default quote feed port.
pub const DEFAULT_QUOTE_FEED_PORT: u16 = 5041;
/// Default quote store port.
pub const DEFAULT_QUOTE_STORE_PORT: u16 = 5042;
/// Default order entry port.
pub const DEFAULT_ORDER_ENTRY_PORT: u16 = 5043;
/// Default trade capture port.
pub const DEFAULT_TRADE_CAPTURE_PORT: u16 = 5044;
/// Default event queue capacity.
pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 1000;

/// Everything a [`DataFeed`](crate::DataFeed) or
/// [`DataTrade`](crate::DataTrade) needs to connect and log in.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Server host name
    pub address: String,
    /// Quote feed port
    pub quote_feed_port: u16,
    /// Quote store port
    pub quote_store_port: u16,
    /// Order entry port
    pub order_entry_port: u16,
    /// Trade capture port
    pub trade_capture_port: u16,
    /// Account login
    pub username: String,
    password: SecretString,
    /// Device identifier reported at login
    pub device_id: Option<String>,
    /// Application session identifier reported at login
    pub app_session_id: Option<String>,
    /// Connect timeout per connection
    pub connect_timeout: Duration,
    /// Login timeout per connection
    pub login_timeout: Duration,
    /// Default timeout for bootstrap requests
    pub operation_timeout: Duration,
    /// Reconnect policy
    pub reconnect: ReconnectConfig,
    /// Capacity of the event queue
    pub event_queue_size: usize,
    /// Log every dispatched event at debug level
    pub log_events: bool,
    /// Log login/reload state transitions at debug level
    pub log_states: bool,
    /// Log every transport callback at debug level
    pub log_messages: bool,
}

impl ConnectionSettings {
    /// Create settings with default ports and timeouts.
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
            ..Default::default()
        }
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::from(password.into());
        self
    }

    /// Set the four ports.
    pub fn with_ports(
        mut self,
        quote_feed: u16,
        quote_store: u16,
        order_entry: u16,
        trade_capture: u16,
    ) -> Self {
        self.quote_feed_port = quote_feed;
        self.quote_store_port = quote_store;
        self.order_entry_port = order_entry;
        self.trade_capture_port = trade_capture;
        self
    }

    /// Set the device id.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Set the application session id.
    pub fn with_app_session_id(mut self, id: impl Into<String>) -> Self {
        self.app_session_id = Some(id.into());
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the login timeout.
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Set the bootstrap request timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the event queue capacity.
    pub fn with_event_queue_size(mut self, size: usize) -> Self {
        self.event_queue_size = size;
        self
    }

    /// Enable or disable event logging.
    pub fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    /// Enable or disable state logging.
    pub fn with_log_states(mut self, enabled: bool) -> Self {
        self.log_states = enabled;
        self
    }

    /// Enable or disable callback logging.
    pub fn with_log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    /// Credentials handed to every connection.
    pub fn credentials(&self) -> Credentials {
        let mut credentials = Credentials::new(&self.username, self.password.expose_secret());
        credentials.device_id = self.device_id.clone();
        credentials.app_session_id = self.app_session_id.clone();
        credentials
    }

    /// Check the settings before starting a session.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(Error::Config("username is required".to_string()));
        }
        if self.event_queue_size == 0 {
            return Err(Error::Config("event queue size must be positive".to_string()));
        }
        let ports = [
            self.quote_feed_port,
            self.quote_store_port,
            self.order_entry_port,
            self.trade_capture_port,
        ];
        if ports.contains(&0) {
            return Err(Error::Config("ports must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Render the settings as a connection string.
    ///
    /// # Errors
    ///
    /// Fails if a string value contains `;`.
    pub fn to_connection_string(&self) -> Result<String> {
        let mut cs = ConnectionString::new();
        cs.insert("Address", Value::String(self.address.clone()))?;
        cs.insert("QuoteFeedPort", Value::Int32(self.quote_feed_port.into()))?;
        cs.insert("QuoteStorePort", Value::Int32(self.quote_store_port.into()))?;
        cs.insert("OrderEntryPort", Value::Int32(self.order_entry_port.into()))?;
        cs.insert("TradeCapturePort", Value::Int32(self.trade_capture_port.into()))?;
        cs.insert("Username", Value::String(self.username.clone()))?;
        cs.insert(
            "Password",
            Value::String(self.password.expose_secret().to_string()),
        )?;
        if let Some(device_id) = &self.device_id {
            cs.insert("DeviceId", Value::String(device_id.clone()))?;
        }
        if let Some(id) = &self.app_session_id {
            cs.insert("AppSessionId", Value::String(id.clone()))?;
        }
        cs.insert("ConnectTimeout", Value::TimeSpan(self.connect_timeout))?;
        cs.insert("LoginTimeout", Value::TimeSpan(self.login_timeout))?;
        cs.insert("OperationTimeout", Value::TimeSpan(self.operation_timeout))?;
        cs.insert("ReconnectAttempts", Value::Int32(self.reconnect_attempts()))?;
        cs.insert(
            "ReconnectInterval",
            Value::TimeSpan(self.reconnect.initial_backoff),
        )?;
        cs.insert(
            "EventQueueSize",
            Value::Int32(i32::try_from(self.event_queue_size).unwrap_or(i32::MAX)),
        )?;
        cs.insert("LogEvents", Value::Boolean(self.log_events))?;
        cs.insert("LogStates", Value::Boolean(self.log_states))?;
        cs.insert("LogMessages", Value::Boolean(self.log_messages))?;
        Ok(cs.to_string())
    }

    fn reconnect_attempts(&self) -> i32 {
        if !self.reconnect.enabled {
            0
        } else if self.reconnect.max_attempts == 0 {
            -1
        } else {
            i32::try_from(self.reconnect.max_attempts).unwrap_or(i32::MAX)
        }
    }

    fn apply(&mut self, entry: &Entry) -> Result<()> {
        let key = entry.key.to_ascii_lowercase();
        match (key.as_str(), &entry.value) {
            ("address", Value::String(v)) => self.address = v.clone(),
            ("quotefeedport", Value::Int32(v)) => self.quote_feed_port = port(&entry.key, *v)?,
            ("quotestoreport", Value::Int32(v)) => self.quote_store_port = port(&entry.key, *v)?,
            ("orderentryport", Value::Int32(v)) => self.order_entry_port = port(&entry.key, *v)?,
            ("tradecaptureport", Value::Int32(v)) => {
                self.trade_capture_port = port(&entry.key, *v)?
            }
            ("username", Value::String(v)) => self.username = v.clone(),
            ("password", Value::String(v)) => self.password = SecretString::from(v.clone()),
            ("deviceid", Value::String(v)) => self.device_id = Some(v.clone()),
            ("appsessionid", Value::String(v)) => self.app_session_id = Some(v.clone()),
            ("connecttimeout", Value::TimeSpan(v)) => self.connect_timeout = *v,
            ("logintimeout", Value::TimeSpan(v)) => self.login_timeout = *v,
            ("operationtimeout", Value::TimeSpan(v)) => self.operation_timeout = *v,
            ("reconnectattempts", Value::Int32(v)) => {
                self.reconnect =
                    ReconnectConfig::from_attempts(*v, self.reconnect.initial_backoff);
            }
            ("reconnectinterval", Value::TimeSpan(v)) => {
                self.reconnect.initial_backoff = *v;
                self.reconnect.max_backoff = self.reconnect.max_backoff.max(*v);
            }
            ("eventqueuesize", Value::Int32(v)) => {
                self.event_queue_size = usize::try_from(*v).map_err(|_| {
                    Error::InvalidConnectionString(format!("EventQueueSize {} is negative", v))
                })?;
            }
            ("logevents", Value::Boolean(v)) => self.log_events = *v,
            ("logstates", Value::Boolean(v)) => self.log_states = *v,
            ("logmessages", Value::Boolean(v)) => self.log_messages = *v,
            (
                "address" | "quotefeedport" | "quotestoreport" | "orderentryport"
                | "tradecaptureport" | "username" | "password" | "deviceid" | "appsessionid"
                | "connecttimeout" | "logintimeout" | "operationtimeout" | "reconnectattempts"
                | "reconnectinterval" | "eventqueuesize" | "logevents" | "logstates"
                | "logmessages",
                value,
            ) => {
                return Err(Error::InvalidConnectionString(format!(
                    "{} has unexpected type [{}]",
                    entry.key,
                    value.value_type().as_str()
                )))
            }
            _ => {
                return Err(Error::InvalidConnectionString(format!(
                    "unknown key '{}'",
                    entry.key
                )))
            }
        }
        Ok(())
    }
}

fn port(key: &str, value: i32) -> Result<u16> {
    u16::try_from(value)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| Error::InvalidConnectionString(format!("{} {} is not a valid port", key, value)))
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: String::new(),
            quote_feed_port: DEFAULT_QUOTE_FEED_PORT,
            quote_store_port: DEFAULT_QUOTE_STORE_PORT,
            order_entry_port: DEFAULT_ORDER_ENTRY_PORT,
            trade_capture_port: DEFAULT_TRADE_CAPTURE_PORT,
            username: String::new(),
            password: SecretString::from(String::new()),
            device_id: None,
            app_session_id: None,
            connect_timeout: Duration::from_secs(30),
            login_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            log_events: false,
            log_states: false,
            log_messages: false,
        }
    }
}

impl FromStr for ConnectionSettings {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(s)?;
        let mut settings = Self::default();
        for entry in parsed.entries() {
            settings.apply(entry)?;
        }
        Ok(settings)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("address", &self.address)
            .field("quote_feed_port", &self.quote_feed_port)
            .field("quote_store_port", &self.quote_store_port)
            .field("order_entry_port", &self.order_entry_port)
            .field("trade_capture_port", &self.trade_capture_port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("operation_timeout", &self.operation_timeout)
            .field("reconnect", &self.reconnect)
            .field("event_queue_size", &self.event_queue_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.quote_feed_port, 5041);
        assert_eq!(settings.trade_capture_port, 5044);
        assert_eq!(settings.event_queue_size, 1000);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_connection_string() {
        let settings: ConnectionSettings = "[String]Address=demo.example.com;[String]Username=100500;\
             [String]Password=pw;[Int32]QuoteFeedPort=6001;[TimeSpan]OperationTimeout=5000;\
             [Int32]ReconnectAttempts=-1;[TimeSpan]ReconnectInterval=2000;[Boolean]LogStates=true"
            .parse()
            .unwrap();

        assert_eq!(settings.address, "demo.example.com");
        assert_eq!(settings.quote_feed_port, 6001);
        assert_eq!(settings.quote_store_port, 5042);
        assert_eq!(settings.operation_timeout, Duration::from_secs(5));
        assert!(settings.reconnect.enabled);
        assert_eq!(settings.reconnect.max_attempts, 0);
        assert_eq!(settings.reconnect.initial_backoff, Duration::from_secs(2));
        assert!(settings.log_states);
        assert_eq!(settings.credentials().password(), "pw");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_and_wrong_type() {
        let err = "[String]Adress=x".parse::<ConnectionSettings>().unwrap_err();
        assert!(err.to_string().contains("unknown key"));

        let err = "[String]QuoteFeedPort=5041".parse::<ConnectionSettings>().unwrap_err();
        assert!(err.to_string().contains("unexpected type"));

        assert!("[Int32]QuoteFeedPort=70000".parse::<ConnectionSettings>().is_err());
        assert!("[Int32]EventQueueSize=-5".parse::<ConnectionSettings>().is_err());
    }

    #[test]
    fn test_round_trip() {
        let settings = ConnectionSettings::new("host", "user", "pw")
            .with_device_id("dev-1")
            .with_reconnect(ReconnectConfig::disabled())
            .with_event_queue_size(64);

        let parsed: ConnectionSettings = settings.to_connection_string().unwrap().parse().unwrap();
        assert_eq!(parsed.device_id.as_deref(), Some("dev-1"));
        assert!(!parsed.reconnect.enabled);
        assert_eq!(parsed.event_queue_size, 64);
        assert_eq!(parsed.credentials().password(), "pw");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = ConnectionSettings::new("host", "user", "hunter2");
        let debug_str = format!("{:?}", settings);
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_to_connection_string_rejects_semicolon() {
        let settings = ConnectionSettings::new("host", "user", "p;w");
        assert!(settings.to_connection_string().is_err());
    }
}
