//! Vendor account pool: credentials, quota tracking, and lease/release
//! concurrency.

pub mod account;
pub mod pool;
pub mod quota;

pub use account::Account;
pub use pool::{AccountLease, AccountPool};
