//! Data models shared by the feed and trade sessions.
//!
//! Models are organized by domain:
//!
//! - [`primitives`] - Identifier newtypes like `OrderId` and `Symbol`
//! - [`enums`] - Order types, statuses, reasons, periodicities
//! - [`account`] - Account info, assets, positions, balance operations
//! - [`order`] - Orders, execution reports and order requests
//! - [`market_data`] - Quotes, bars, symbol and currency reference data
//! - [`session`] - Credentials, session info, logout and two-factor data
//! - [`report`] - Trade capture reports

pub mod primitives;
pub mod enums;
pub mod account;
pub mod order;
pub mod market_data;
pub mod session;
pub mod report;

pub use primitives::*;
pub use enums::*;
pub use account::*;
pub use order::*;
pub use market_data::*;
pub use session::*;
pub use report::*;
