//! Runtime configuration read from the process environment.
//!
//! Per-source variables use the upper-cased source name, for example
//! `RECONFLUX_SHODAN_TIMEOUT_MS`. A malformed per-source value disables that
//! source instead of aborting startup; a malformed global value keeps its
//! default. Both are logged and kept in [`ReconConfig::issues`].

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::cache::DEFAULT_CACHE_TTL;
use crate::rate_limit::RateLimit;
use crate::retry::RetryPolicy;
use crate::SourceId;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: &'static str,
    },
}

/// Settings applied to one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    pub enabled: bool,
    /// Per-attempt timeout handed to the adapter.
    pub timeout: Duration,
    /// Total attempts per request, including the first.
    pub max_retries: u32,
    pub rate_limit: Option<RateLimit>,
}

impl SourceSettings {
    /// Published free-tier quotas of each source.
    pub const fn defaults_for(source: SourceId) -> Self {
        let rate_limit = match source {
            SourceId::Shodan => Some(RateLimit::per_hour(100)),
            SourceId::Censys => Some(RateLimit::per_hour(50)),
            SourceId::Virustotal => Some(RateLimit::per_day(500)),
            SourceId::Hunter => Some(RateLimit::per_hour(100)),
            SourceId::Whois | SourceId::Crtsh => None,
        };
        Self {
            enabled: true,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconConfig {
    pub sources: BTreeMap<SourceId, SourceSettings>,
    pub cache_ttl: Duration,
    pub retry_base_delay: Duration,
    /// Overall deadline of one fan-out query; `None` waits for every source.
    pub query_deadline: Option<Duration>,
    pub issues: Vec<ConfigError>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            sources: SourceId::ALL
                .into_iter()
                .map(|source| (source, SourceSettings::defaults_for(source)))
                .collect(),
            cache_ttl: DEFAULT_CACHE_TTL,
            retry_base_delay: DEFAULT_RETRY_BASE,
            query_deadline: None,
            issues: Vec::new(),
        }
    }
}

impl ReconConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration through `lookup`, which maps a variable name to its raw value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut issues = Vec::new();

        for (source, settings) in &mut config.sources {
            if let Err(error) = apply_source_overrides(*source, settings, &lookup) {
                warn!(source = %source, error = %error, "invalid source configuration, disabling source");
                settings.enabled = false;
                issues.push(error);
            }
        }

        match read_var(&lookup, "RECONFLUX_CACHE_TTL_SECS", parse_secs) {
            Ok(Some(ttl)) => config.cache_ttl = ttl,
            Ok(None) => {}
            Err(error) => keep_default(&mut issues, error),
        }
        match read_var(&lookup, "RECONFLUX_RETRY_BASE_MS", parse_millis) {
            Ok(Some(base)) => config.retry_base_delay = base,
            Ok(None) => {}
            Err(error) => keep_default(&mut issues, error),
        }
        match read_var(&lookup, "RECONFLUX_QUERY_DEADLINE_MS", parse_positive_millis) {
            Ok(Some(deadline)) => config.query_deadline = Some(deadline),
            Ok(None) => {}
            Err(error) => keep_default(&mut issues, error),
        }

        config.issues = issues;
        config
    }

    pub fn settings(&self, source: SourceId) -> SourceSettings {
        self.sources
            .get(&source)
            .copied()
            .unwrap_or_else(|| SourceSettings::defaults_for(source))
    }

    pub fn is_enabled(&self, source: SourceId) -> bool {
        self.settings(source).enabled
    }

    pub fn retry_policy(&self, source: SourceId) -> RetryPolicy {
        RetryPolicy::new(self.settings(source).max_retries, self.retry_base_delay)
    }

    /// Configured call budgets, for seeding the rate limiter.
    pub fn rate_limits(&self) -> Vec<(SourceId, RateLimit)> {
        self.sources
            .iter()
            .filter_map(|(source, settings)| settings.rate_limit.map(|limit| (*source, limit)))
            .collect()
    }

    pub fn set_enabled(&mut self, source: SourceId, enabled: bool) {
        self.sources
            .entry(source)
            .or_insert_with(|| SourceSettings::defaults_for(source))
            .enabled = enabled;
    }
}

fn apply_source_overrides<F>(
    source: SourceId,
    settings: &mut SourceSettings,
    lookup: &F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| format!("RECONFLUX_{}_{suffix}", source.env_name());

    if let Some(enabled) = read_var(lookup, &var("ENABLED"), parse_bool)? {
        settings.enabled = enabled;
    }
    if let Some(timeout) = read_var(lookup, &var("TIMEOUT_MS"), parse_positive_millis)? {
        settings.timeout = timeout;
    }
    if let Some(max_retries) = read_var(lookup, &var("MAX_RETRIES"), parse_retries)? {
        settings.max_retries = max_retries;
    }
    if let Some(rate_limit) = read_var(lookup, &var("RATE_LIMIT"), parse_rate_limit)? {
        settings.rate_limit = rate_limit;
    }
    Ok(())
}

fn read_var<F, T>(
    lookup: &F,
    name: &str,
    parse: fn(&str) -> Result<T, &'static str>,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse(trimmed)
        .map(Some)
        .map_err(|reason| ConfigError::InvalidValue {
            var: name.to_owned(),
            value: raw.clone(),
            reason,
        })
}

fn keep_default(issues: &mut Vec<ConfigError>, error: ConfigError) {
    warn!(error = %error, "invalid global configuration, keeping default");
    issues.push(error);
}

fn parse_bool(value: &str) -> Result<bool, &'static str> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected true or false"),
    }
}

fn parse_millis(value: &str) -> Result<Duration, &'static str> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| "expected a whole number of milliseconds")
}

fn parse_positive_millis(value: &str) -> Result<Duration, &'static str> {
    let duration = parse_millis(value)?;
    if duration.is_zero() {
        return Err("must be greater than zero");
    }
    Ok(duration)
}

fn parse_secs(value: &str) -> Result<Duration, &'static str> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| "expected a whole number of seconds")
}

fn parse_retries(value: &str) -> Result<u32, &'static str> {
    match value.parse::<u32>() {
        Ok(0) => Err("must allow at least one attempt"),
        Ok(retries) => Ok(retries),
        Err(_) => Err("expected a whole number of attempts"),
    }
}

/// `count/window_secs`, or `none` to lift the budget.
fn parse_rate_limit(value: &str) -> Result<Option<RateLimit>, &'static str> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let (count, window) = value
        .split_once('/')
        .ok_or("expected count/window_secs or none")?;
    let count = count
        .trim()
        .parse::<u32>()
        .map_err(|_| "rate limit count must be a whole number")?;
    let window = window
        .trim()
        .parse::<u64>()
        .map_err(|_| "rate limit window must be a whole number of seconds")?;
    if count == 0 || window == 0 {
        return Err("rate limit count and window must be greater than zero");
    }
    Ok(Some(RateLimit::new(count, Duration::from_secs(window))))
}
