//! # Reconflux Core
//!
//! Orchestration layer for multi-source reconnaissance queries.
//!
//! ## Overview
//!
//! Many third-party intelligence sources are slow, rate limited and flaky. This
//! crate makes calling them safe:
//!
//! - **Credential vault** keeping API secrets sealed in memory
//! - **Fixed-window rate limiter** per source
//! - **TTL result cache** keyed by source and target
//! - **Retry policy** with capped exponential backoff and deadlines
//! - **Scatter-gather executor** isolating every source's failure
//! - **Middleware chain** for request handling
//!
//! Results are recorded through [`reconflux_store`].
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Source adapters (Shodan, Censys, VirusTotal, Hunter, crt.sh, WHOIS) |
//! | [`cache`] | Result cache |
//! | [`config`] | Environment configuration |
//! | [`credentials`] | Credential vault |
//! | [`data_source`] | Source trait and per-source errors |
//! | [`error`] | Core error types |
//! | [`executor`] | Scatter-gather executor and aggregated results |
//! | [`handler`] | Query request handler |
//! | [`http_client`] | HTTP client abstraction |
//! | [`middleware`] | Request middleware chain |
//! | [`rate_limit`] | Per-source rate limiter |
//! | [`registry`] | Source registry |
//! | [`retry`] | Retry policy |
//! | [`source`] | Source identifiers |
//! | [`target`] | Query target validation |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use reconflux_core::{ReconConfig, ScatterGather, SourceId, SourceRegistry, Target, Vault};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = ScatterGather::new(
//!         SourceRegistry::with_real_clients(),
//!         Vault::from_env(),
//!         ReconConfig::from_env(),
//!     );
//!
//!     let target = Target::parse("example.com")?;
//!     let result = executor.query(&target, &[SourceId::Whois, SourceId::Crtsh]).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / Request  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Middleware Chain│
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────────────────┐
//! │ Scatter-Gather  │────▶│ Cache / Rate Limiter / Vault │
//! └────────┬────────┘     └──────────────────────────────┘
//!          │ one task per source
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Retry Policy    │────▶│ Source Adapter   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Durable Store   │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Per-source failures never fail a query. They are recorded as
//! [`SourceOutcome::Error`] entries with a stable code:
//!
//! ```rust
//! use reconflux_core::{SourceError, SourceErrorKind};
//!
//! fn describe(error: &SourceError) -> &'static str {
//!     match error.kind() {
//!         SourceErrorKind::RateLimited => "try again later",
//!         SourceErrorKind::NotConfigured => "add credentials",
//!         SourceErrorKind::Timeout | SourceErrorKind::Unavailable => "upstream trouble",
//!         _ => "see logs",
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Credentials are sealed with ChaCha20-Poly1305 and redacted from `Debug`
//! - Secrets never appear in log fields
//! - Targets are validated before any source is called

pub mod adapters;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod data_source;
pub mod error;
pub mod executor;
pub mod handler;
pub mod http_client;
pub mod middleware;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod source;
pub mod target;

pub use adapters::{
    CensysAdapter, CrtshAdapter, HunterAdapter, ShodanAdapter, VirustotalAdapter, WhoisAdapter,
};
pub use cache::ResultCache;
pub use config::{ConfigError, ReconConfig, SourceSettings};
pub use credentials::{Credential, Vault, VaultError};
pub use data_source::{FetchFuture, Source, SourceError, SourceErrorKind};
pub use error::ValidationError;
pub use executor::{AggregatedResult, QueryError, ScatterGather, SourceOutcome};
pub use handler::QueryHandler;
pub use http_client::{HttpClient, NoopHttpClient, ReqwestHttpClient};
pub use middleware::{Chain, Handler, HandlerError, Middleware, Request, Response};
pub use rate_limit::{RateLimit, RateLimiter};
pub use registry::SourceRegistry;
pub use retry::{RetryError, RetryPolicy};
pub use source::SourceId;
pub use target::Target;

pub use reconflux_store::{JsonStore, StoreConfig, StoreError, StoreEvent};
