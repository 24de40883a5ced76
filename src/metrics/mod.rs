//! Operational metrics: atomic counters, a bounded request history, and the
//! `/api/stats` aggregation.

pub mod core;
pub mod record;

pub use core::MetricsCore;
pub use record::{ExpiryInfo, PeriodStats, RequestRecord, StatsSnapshot, TokenInfo};
