//! Primitive types and newtypes for type-safe identifiers.
//!
//! These wrappers keep order ids, symbols and account ids from being mixed
//! up at compile time while serializing as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new value from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the identifier is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_newtype!(
    /// A server-assigned order identifier.
    ///
    /// # Example
    ///
    /// ```
    /// use tradelink_rs::OrderId;
    ///
    /// let id = OrderId::new("1002345");
    /// assert_eq!(id.as_str(), "1002345");
    /// ```
    OrderId
);

string_newtype!(
    /// A trading symbol (e.g., "EURUSD", "XAUUSD").
    ///
    /// # Example
    ///
    /// ```
    /// use tradelink_rs::Symbol;
    ///
    /// let symbol: Symbol = "EURUSD".into();
    /// assert_eq!(symbol.to_string(), "EURUSD");
    /// ```
    Symbol
);

string_newtype!(
    /// A trading account identifier (the login).
    AccountId
);
