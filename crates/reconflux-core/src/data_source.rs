//! Source adapter contract and per-source error type.
//!
//! Every intelligence source is reached through the [`Source`] trait. The
//! executor never sees provider SDKs or wire formats: it hands an adapter a
//! [`Target`], a decrypted [`Credential`] and a timeout, and gets back either a
//! JSON payload or a [`SourceError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use reconflux_core::{Credential, Source, SourceId, Target};
//!
//! async fn lookup(adapter: &dyn Source, credential: &Credential) {
//!     let target = Target::parse("example.com").unwrap();
//!     match adapter.fetch(&target, credential, std::time::Duration::from_secs(10)).await {
//!         Ok(payload) => println!("{payload}"),
//!         Err(error) => eprintln!("{} failed: {error}", adapter.id()),
//!     }
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;

use crate::{Credential, SourceId, Target};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Credential missing, rejected, or source disabled.
    NotConfigured,
    RateLimited,
    Timeout,
    /// Transient upstream or transport failure.
    Unavailable,
    InvalidRequest,
    AdapterNotRegistered,
    Internal,
}

/// Structured source error recorded per source in an aggregated result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NotConfigured,
            message: message.into(),
            retryable: false,
        }
    }

    /// Local rate-limit denial. Not retried inside the same request.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: false,
        }
    }

    /// Upstream answered with a throttling status; worth another attempt after backoff.
    pub fn upstream_throttled(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn adapter_not_registered(source: SourceId) -> Self {
        Self {
            kind: SourceErrorKind::AdapterNotRegistered,
            message: format!("source adapter '{source}' is not registered"),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// Same error with a different message, keeping kind and retryability.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::NotConfigured => "source.not_configured",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::AdapterNotRegistered => "source.adapter_not_registered",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be idempotent and safe to retry: the executor may call
/// `fetch` several times for one request. Adapters that make blocking calls
/// must move them off the async worker (see [`crate::adapters::WhoisAdapter`]).
pub trait Source: Send + Sync {
    /// Returns the unique source identifier.
    fn id(&self) -> SourceId;

    /// Whether the executor must resolve a vault credential before calling `fetch`.
    fn requires_credential(&self) -> bool {
        true
    }

    /// Query the source for `target`.
    fn fetch<'a>(
        &'a self,
        target: &'a Target,
        credential: &'a Credential,
        timeout: Duration,
    ) -> FetchFuture<'a>;
}
