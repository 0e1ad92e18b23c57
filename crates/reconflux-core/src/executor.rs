//! Scatter-gather fan-out over the registered sources.
//!
//! One tokio task runs per requested source. Each task walks the same ladder:
//! registry, configuration, cache, rate limiter, vault, then the adapter call
//! under the retry policy. Every failure becomes an entry in the aggregated
//! result for its own source; the other sources never see it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use reconflux_store::{now_rfc3339, JsonStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::ResultCache;
use crate::config::ReconConfig;
use crate::credentials::{Credential, Vault};
use crate::data_source::SourceError;
use crate::rate_limit::RateLimiter;
use crate::registry::SourceRegistry;
use crate::{SourceId, Target, ValidationError};

/// Store category and operation that aggregated results are appended to.
pub const RESULT_CATEGORY: &str = "recon";
pub const RESULT_OPERATION: &str = "multi-source";

/// Terminal outcome of one source within a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Success { data: Value },
    Error { error: String, code: String },
}

impl SourceOutcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Error { code, .. } => Some(code),
        }
    }
}

impl From<Result<Value, SourceError>> for SourceOutcome {
    fn from(result: Result<Value, SourceError>) -> Self {
        match result {
            Ok(data) => Self::Success { data },
            Err(error) => Self::Error {
                code: error.code().to_owned(),
                error: error.message().to_owned(),
            },
        }
    }
}

/// Per-source outcomes of one query, keyed by source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub target: String,
    pub timestamp: String,
    pub sources: BTreeMap<SourceId, SourceOutcome>,
}

impl AggregatedResult {
    pub fn outcome(&self, source: SourceId) -> Option<&SourceOutcome> {
        self.sources.get(&source)
    }

    pub fn succeeded(&self) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(source, _)| *source)
            .collect()
    }

    pub fn failed(&self) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(source, _)| *source)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.sources.values().any(|outcome| !outcome.is_success())
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The query ran but its result could not be recorded.
    #[error("query result could not be persisted: {source}")]
    Persist {
        result: Box<AggregatedResult>,
        #[source]
        source: StoreError,
    },
}

impl QueryError {
    /// The aggregated result, if the query got as far as building one.
    pub fn into_result(self) -> Option<AggregatedResult> {
        match self {
            Self::Validation(_) => None,
            Self::Persist { result, .. } => Some(*result),
        }
    }
}

struct Shared {
    registry: SourceRegistry,
    vault: Vault,
    limiter: RateLimiter,
    cache: ResultCache,
    config: ReconConfig,
}

/// Concurrent multi-source query executor.
#[derive(Clone)]
pub struct ScatterGather {
    shared: Arc<Shared>,
    store: Option<Arc<JsonStore>>,
}

impl ScatterGather {
    /// Executor with a rate limiter and cache derived from `config`.
    pub fn new(registry: SourceRegistry, vault: Vault, config: ReconConfig) -> Self {
        let limiter = RateLimiter::with_limits(config.rate_limits());
        let cache = ResultCache::new(config.cache_ttl);
        Self {
            shared: Arc::new(Shared {
                registry,
                vault,
                limiter,
                cache,
                config,
            }),
            store: None,
        }
    }

    /// Append every aggregated result to `store`.
    pub fn with_store(mut self, store: Arc<JsonStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.shared.registry
    }

    pub fn vault(&self) -> &Vault {
        &self.shared.vault
    }

    pub fn config(&self) -> &ReconConfig {
        &self.shared.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.shared.limiter
    }

    pub fn cache(&self) -> &ResultCache {
        &self.shared.cache
    }

    pub fn store(&self) -> Option<&Arc<JsonStore>> {
        self.store.as_ref()
    }

    /// Query `sources` for `target` using the configured overall deadline.
    pub async fn query(
        &self,
        target: &Target,
        sources: &[SourceId],
    ) -> Result<AggregatedResult, QueryError> {
        self.query_with_deadline(target, sources, self.shared.config.query_deadline)
            .await
    }

    /// Query `sources` for `target`, giving up on sources still running after `deadline`.
    ///
    /// Returns once every requested source has a terminal outcome. Repeated
    /// source names are queried once.
    pub async fn query_with_deadline(
        &self,
        target: &Target,
        sources: &[SourceId],
        deadline: Option<Duration>,
    ) -> Result<AggregatedResult, QueryError> {
        let requested = sources.iter().copied().collect::<BTreeSet<_>>();
        if requested.is_empty() {
            return Err(ValidationError::EmptySourceList.into());
        }

        let started = Instant::now();
        let deadline_at = deadline.map(|deadline| started + deadline);
        info!(recon_target = %target, sources = ?requested, "starting multi-source query");

        let mut tasks = JoinSet::new();
        for source in requested.iter().copied() {
            let shared = Arc::clone(&self.shared);
            let target = target.clone();
            tasks.spawn(async move {
                let work = run_source(&shared, source, &target, deadline_at);
                let result = match deadline_at {
                    Some(deadline_at) => tokio::time::timeout_at(deadline_at, work)
                        .await
                        .unwrap_or_else(|_| {
                            Err(SourceError::timeout(format!(
                                "{source} did not finish before the query deadline"
                            )))
                        }),
                    None => work.await,
                };
                (source, result)
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((source, result)) => {
                    if let Err(error) = &result {
                        warn!(source = %source, code = error.code(), error = %error.message(), "source failed");
                    }
                    outcomes.insert(source, SourceOutcome::from(result));
                }
                Err(join_error) => {
                    error!(error = %join_error, "source task terminated abnormally");
                }
            }
        }

        // A panicking adapter takes its task down; report it against its own source.
        for source in &requested {
            outcomes.entry(*source).or_insert_with(|| {
                SourceOutcome::from(Err(SourceError::internal(format!(
                    "{source} adapter terminated unexpectedly"
                ))))
            });
        }

        let result = AggregatedResult {
            target: target.to_string(),
            timestamp: now_rfc3339(),
            sources: outcomes,
        };
        info!(
            recon_target = %target,
            succeeded = result.succeeded().len(),
            failed = result.failed().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "multi-source query finished"
        );

        match &self.store {
            Some(store) => persist(Arc::clone(store), &requested, result).await,
            None => Ok(result),
        }
    }
}

async fn run_source(
    shared: &Shared,
    source: SourceId,
    target: &Target,
    deadline: Option<Instant>,
) -> Result<Value, SourceError> {
    let Some(adapter) = shared.registry.get(source) else {
        return Err(SourceError::adapter_not_registered(source));
    };

    let settings = shared.config.settings(source);
    if !settings.enabled {
        return Err(SourceError::not_configured(format!(
            "{source} is disabled by configuration"
        )));
    }

    if let Some(payload) = shared.cache.get(source, target.as_str()) {
        debug!(source = %source, recon_target = %target, "cache hit");
        return Ok(payload);
    }

    if !shared.limiter.allow(source) {
        return Err(SourceError::rate_limited(format!(
            "{source} call budget exhausted for the current window"
        )));
    }

    let credential = if adapter.requires_credential() {
        shared
            .vault
            .get(source)
            .map_err(|error| SourceError::not_configured(error.to_string()))?
    } else {
        Credential::anonymous(source)
    };

    let adapter = adapter.as_ref();
    let credential = &credential;
    let timeout = settings.timeout;
    let payload = shared
        .config
        .retry_policy(source)
        .execute_until(deadline, move |attempt| {
            debug!(source = %source, attempt = attempt + 1, "calling source");
            let call = adapter.fetch(target, credential, timeout);
            async move {
                // Adapters may ignore the timeout they are given.
                tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
                    Err(SourceError::timeout(format!(
                        "{source} did not answer within {}ms",
                        timeout.as_millis()
                    )))
                })
            }
        })
        .await
        .map_err(|error| error.into_source_error())?;

    shared.cache.put(source, target.as_str(), payload.clone());
    Ok(payload)
}

async fn persist(
    store: Arc<JsonStore>,
    requested: &BTreeSet<SourceId>,
    result: AggregatedResult,
) -> Result<AggregatedResult, QueryError> {
    let params = json!({
        "target": result.target,
        "sources": requested.iter().map(|source| source.as_str()).collect::<Vec<_>>(),
    });
    let record = match serde_json::to_value(&result) {
        Ok(record) => record,
        Err(error) => {
            return Err(QueryError::Persist {
                result: Box::new(result),
                source: error.into(),
            })
        }
    };

    let written = tokio::task::spawn_blocking(move || {
        store.append_event(RESULT_CATEGORY, RESULT_OPERATION, params, record)
    })
    .await;

    match written {
        Ok(Ok(event)) => {
            debug!(event = %event.id, "query result persisted");
            Ok(result)
        }
        Ok(Err(source)) => {
            error!(error = %source, fatal = source.is_fatal(), "failed to persist query result");
            Err(QueryError::Persist {
                result: Box::new(result),
                source,
            })
        }
        Err(join_error) => {
            error!(error = %join_error, "store write task terminated abnormally");
            Err(QueryError::Persist {
                result: Box::new(result),
                source: StoreError::Io(std::io::Error::other(join_error.to_string())),
            })
        }
    }
}
