//! The HTTP client that talks to the vendor backend: JWT refresh, quota
//! checks, and streaming chat dispatch.

pub mod client;
pub mod jwt;
pub mod pool;
pub mod sse;

pub use client::{RefreshError, RefreshedJwt, UpstreamClient};
