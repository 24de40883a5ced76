//! `jetgate` is a protocol-translating reverse proxy. It exposes an
//! OpenAI-compatible `/v1/chat/completions` surface and an
//! Anthropic-compatible `/v1/messages` surface over a pool of vendor
//! accounts, translating request/response schemas (including tool calls and
//! streaming events) and tracking operational statistics.
//!
//! # Architecture
//!
//! ```text
//! client → auth middleware → protocol handler → message/tool translation (cached)
//!        → account pool (JWT refresh / quota check) → upstream dispatch
//!        → streaming translation back to client protocol → metrics
//! ```
//!
//! See [`server`] for the axum router, [`accounts`] for the vendor-credential
//! pool, [`convert`] for the OpenAI/Anthropic/vendor message translators, and
//! [`cache`] / [`metrics`] / [`storage`] for the supporting infrastructure.

pub mod accounts;
pub mod cache;
pub mod config;
pub mod convert;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod toolschema;
pub mod upstream;

pub use config::Config;
pub use error::AppError;
