//! Session machinery shared by [`DataFeed`](crate::DataFeed) and
//! [`DataTrade`](crate::DataTrade).
//!
//! - `SessionCore`: connect, login, two-factor and reconnect supervision,
//!   parameterized by the connections of each wrapper
//! - [`LoginTracker`]: bitmask join over the bootstrap requests
//! - [`TwoFactorCoordinator`]: one two-factor exchange over two connections
//! - [`EventQueue`] and [`Dispatcher`]: bounded hand-off from callback tasks
//!   to user handlers

mod dispatch;
mod flags;
mod lifecycle;
mod queue;
mod supervisor;
mod two_factor;

pub use dispatch::{Dispatcher, Handler, SubscriptionId};
pub use flags::{InitFlags, LoginTracker};
pub use lifecycle::LogonState;
pub use queue::EventQueue;
pub use two_factor::{Link, TwoFactorCoordinator};

pub(crate) use supervisor::{SessionCore, SessionEvent, SessionLinks};
pub(crate) use lifecycle::{logout_from_error, request, EndSender};
