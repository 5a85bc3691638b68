//! Error types for the trading client SDK.
//!
//! This module provides a single error type covering every failure mode the
//! wrappers can observe: transport failures reported by the protocol clients,
//! login and two-factor failures, server rejects, timeouts and local misuse.

use thiserror::Error;

use crate::models::{LogoutReason, RejectReason};

/// A specialized `Result` type for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for all SDK operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The transport could not establish or keep a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Login was refused (bad credentials, blocked account, ...)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The session was logged out
    #[error("Logged out ({reason:?}): {text}")]
    Logout {
        /// Why the session ended
        reason: LogoutReason,
        /// Server or client supplied explanation
        text: String,
    },

    /// One-time password was rejected or the two-factor exchange failed
    #[error("Two-factor authentication failed: {0}")]
    TwoFactor(String),

    /// The server rejected a request
    #[error("Request rejected ({reason:?}): {text}")]
    Rejected {
        /// Reject reason code
        reason: RejectReason,
        /// Human-readable explanation
        text: String,
    },

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// The operation requires a logged-on session
    #[error("Session is not logged on")]
    NotLoggedOn,

    /// The wrapper was already started
    #[error("Session already started")]
    AlreadyStarted,

    /// The event queue was closed
    #[error("Event queue closed")]
    Closed,

    /// A connection string could not be parsed
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Invalid input provided to a function
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid symbol provided
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Channel send error (internal)
    #[error("Internal channel error")]
    ChannelError,
}

impl Error {
    /// Returns `true` if this error is potentially transient and the
    /// operation could be retried.
    ///
    /// # Example
    ///
    /// ```
    /// use tradelink_rs::Error;
    ///
    /// assert!(Error::Timeout.is_retryable());
    /// assert!(!Error::NotLoggedOn.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Timeout => true,
            Error::Logout { reason, .. } => reason.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if this is an authentication-related error.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Error::Authentication(_) | Error::TwoFactor(_) => true,
            Error::Logout { reason, .. } => !reason.is_retryable(),
            _ => false,
        }
    }

    /// Returns `true` if this error indicates a client-side issue
    /// (invalid input, bad configuration, misuse of the session).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::InvalidSymbol(_)
                | Error::InvalidConnectionString(_)
                | Error::Config(_)
                | Error::NotLoggedOn
                | Error::AlreadyStarted
        )
    }

    /// Returns `true` if the server rejected the request.
    pub fn is_reject(&self) -> bool {
        matches!(self, Error::Rejected { .. })
    }

    pub(crate) fn rejected(reason: RejectReason, text: impl Into<String>) -> Self {
        Error::Rejected {
            reason,
            text: text.into(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}
