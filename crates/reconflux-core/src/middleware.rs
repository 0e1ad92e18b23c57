//! Ordered request middleware around a handler.
//!
//! A [`Chain`] owns a handler and a list of middleware, outermost first. Each
//! middleware receives the request and a [`Next`] continuation; it may answer
//! on its own (short-circuit) or pass the request down and post-process the
//! outcome on the way back.
//!
//! ```text
//! RequestLog -> ErrorFormatter -> RequestRateLimit -> ValidateInput -> Handler
//! ```

use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::executor::QueryError;

/// One inbound request: which operation, who is asking, with what parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub category: String,
    pub operation: String,
    /// Caller identity used for request-rate limiting (address, user, `cli`).
    pub client: String,
    pub params: Map<String, Value>,
}

impl Request {
    pub fn new(
        category: impl Into<String>,
        operation: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            operation: operation.into(),
            client: client.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("rate limit exceeded, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::Query(QueryError::Validation(_)) => 400,
            Self::RateLimited { .. } => 429,
            Self::Query(QueryError::Persist { .. }) | Self::Internal(_) => 500,
        }
    }

    /// Render the error as a response. Internal details are included only when
    /// `expose_details` is set.
    pub fn into_response(self, expose_details: bool) -> Response {
        let status = self.status();
        let body = match self {
            Self::BadRequest(message) => json!({ "error": message }),
            Self::Query(QueryError::Validation(error)) => json!({ "error": error.to_string() }),
            Self::RateLimited { retry_after } => json!({
                "error": "Rate limit exceeded. Please try again later.",
                "retry_after": retry_after.as_secs(),
            }),
            Self::Query(error @ QueryError::Persist { .. }) => {
                let message = expose_details.then(|| error.to_string());
                json!({
                    "error": "An internal server error occurred",
                    "message": message,
                    "result": error.into_result(),
                })
            }
            Self::Internal(message) => json!({
                "error": "An internal server error occurred",
                "message": expose_details.then_some(message),
            }),
        };
        Response { status, body }
    }
}

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Response, HandlerError>> + Send + 'a>>;

/// Terminal request handler.
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, request: Request) -> HandlerFuture<'a>;
}

/// Interceptor with the same `(request) -> response` shape as a handler.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> HandlerFuture<'a>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn run(self, request: Request) -> HandlerFuture<'a> {
        match self.middleware.split_first() {
            Some((current, rest)) => current.handle(
                request,
                Next {
                    middleware: rest,
                    handler: self.handler,
                },
            ),
            None => self.handler.call(request),
        }
    }
}

/// A handler wrapped in ordered middleware.
#[derive(Clone)]
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
}

impl Chain {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            middleware: Vec::new(),
            handler,
        }
    }

    /// Logging, error formatting, request-rate limiting and parameter
    /// validation, in that order.
    pub fn standard(handler: Arc<dyn Handler>, validate: ValidateInput) -> Self {
        Self::new(handler)
            .with(RequestLog)
            .with(ErrorFormatter::from_env())
            .with(RequestRateLimit::new())
            .with(validate)
    }

    /// Append `middleware` inside the ones added before it.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|middleware| middleware.name()).collect()
    }

    /// Run `request` through the chain. Errors that no middleware formatted are
    /// rendered without internal details.
    pub async fn dispatch(&self, request: Request) -> Response {
        let next = Next {
            middleware: &self.middleware,
            handler: self.handler.as_ref(),
        };
        match next.run(request).await {
            Ok(response) => response,
            Err(error) => error.into_response(false),
        }
    }
}

/// Logs every request with its status and duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLog;

impl Middleware for RequestLog {
    fn name(&self) -> &'static str {
        "request_log"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let category = request.category.clone();
            let operation = request.operation.clone();
            let client = request.client.clone();

            let outcome = next.run(request).await;
            let status = match &outcome {
                Ok(response) => response.status,
                Err(error) => error.status(),
            };
            info!(
                category = %category,
                operation = %operation,
                client = %client,
                status,
                duration_ms = started.elapsed().as_millis() as u64,
                "request handled"
            );
            outcome
        })
    }
}

/// Turns handler errors into uniform JSON error responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorFormatter {
    expose_details: bool,
}

impl ErrorFormatter {
    pub const fn new(expose_details: bool) -> Self {
        Self { expose_details }
    }

    /// Details are exposed when `RECONFLUX_DEBUG=true`.
    pub fn from_env() -> Self {
        let expose_details = env::var("RECONFLUX_DEBUG")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self::new(expose_details)
    }
}

impl Middleware for ErrorFormatter {
    fn name(&self) -> &'static str {
        "error_formatter"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let operation = format!("{}.{}", request.category, request.operation);
            match next.run(request).await {
                Ok(response) => Ok(response),
                Err(handler_error) => {
                    if handler_error.status() >= 500 {
                        error!(operation = %operation, error = %handler_error, "request failed");
                    }
                    Ok(handler_error.into_response(self.expose_details))
                }
            }
        })
    }
}

struct CategoryLimit {
    window: Duration,
    limiter: DefaultKeyedRateLimiter<String>,
}

impl CategoryLimit {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            window,
            limiter: RateLimiter::keyed(quota_from_window(window, limit)),
        }
    }
}

/// Per-client request budget for each category.
pub struct RequestRateLimit {
    categories: HashMap<String, CategoryLimit>,
    fallback: CategoryLimit,
}

impl Default for RequestRateLimit {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRateLimit {
    /// Per minute: 30 vulnerability, 20 network, 50 recon and 100 for anything else.
    pub fn new() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            categories: HashMap::new(),
            fallback: CategoryLimit::new(100, minute),
        }
        .with_quota("vulnerability", 30, minute)
        .with_quota("network", 20, minute)
        .with_quota("recon", 50, minute)
    }

    pub fn with_quota(mut self, category: impl Into<String>, limit: u32, window: Duration) -> Self {
        self.categories
            .insert(category.into(), CategoryLimit::new(limit, window));
        self
    }

    fn limit_for(&self, category: &str) -> &CategoryLimit {
        self.categories.get(category).unwrap_or(&self.fallback)
    }
}

impl Middleware for RequestRateLimit {
    fn name(&self) -> &'static str {
        "request_rate_limit"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> HandlerFuture<'a> {
        let limit = self.limit_for(&request.category);
        if limit.limiter.check_key(&request.client).is_err() {
            warn!(client = %request.client, category = %request.category, "request rate limit exceeded");
            let retry_after = limit.window;
            return Box::pin(async move { Err(HandlerError::RateLimited { retry_after }) });
        }
        next.run(request)
    }
}

fn quota_from_window(window: Duration, limit: u32) -> Quota {
    let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    let seconds_per_cell = (window.as_secs_f64() / f64::from(burst.get())).max(0.001);

    Quota::with_period(Duration::from_secs_f64(seconds_per_cell))
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

/// Rejects requests with missing or unexpected parameters.
#[derive(Debug, Clone, Default)]
pub struct ValidateInput {
    required: Vec<String>,
    optional: Vec<String>,
}

impl ValidateInput {
    pub fn new<R, O>(required: R, optional: O) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            optional: optional.into_iter().map(Into::into).collect(),
        }
    }

    fn check(&self, params: &Map<String, Value>) -> Result<(), HandlerError> {
        let missing = self
            .required
            .iter()
            .filter(|name| !params.contains_key(name.as_str()))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(HandlerError::BadRequest(format!(
                "Missing required parameters: {}",
                missing.join(", ")
            )));
        }

        let unknown = params
            .keys()
            .filter(|name| !self.required.contains(name) && !self.optional.contains(name))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !unknown.is_empty() {
            return Err(HandlerError::BadRequest(format!(
                "Unknown parameters: {}",
                unknown.join(", ")
            )));
        }
        Ok(())
    }
}

impl Middleware for ValidateInput {
    fn name(&self) -> &'static str {
        "validate_input"
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> HandlerFuture<'a> {
        if let Err(error) = self.check(&request.params) {
            return Box::pin(async move { Err(error) });
        }
        next.run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_reports_missing_before_unknown() {
        let validate = ValidateInput::new(["target", "sources"], ["deadline_ms"]);
        let mut params = Map::new();
        params.insert(String::from("verbose"), json!(true));

        let error = validate.check(&params).expect_err("target missing");
        assert_eq!(
            error.to_string(),
            "Missing required parameters: target, sources"
        );

        params.insert(String::from("target"), json!("example.com"));
        params.insert(String::from("sources"), json!("whois"));
        let error = validate.check(&params).expect_err("verbose is unknown");
        assert_eq!(error.to_string(), "Unknown parameters: verbose");

        params.remove("verbose");
        params.insert(String::from("deadline_ms"), json!(500));
        assert!(validate.check(&params).is_ok());
    }

    #[test]
    fn internal_details_are_hidden_unless_exposed() {
        let hidden = HandlerError::Internal(String::from("disk on fire")).into_response(false);
        let shown = HandlerError::Internal(String::from("disk on fire")).into_response(true);

        assert_eq!(hidden.status, 500);
        assert_eq!(hidden.body["message"], Value::Null);
        assert_eq!(shown.body["message"], "disk on fire");
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = HandlerError::RateLimited {
            retry_after: Duration::from_secs(60),
        }
        .into_response(false);

        assert_eq!(response.status, 429);
        assert_eq!(response.body["retry_after"], 60);
    }

    #[test]
    fn quota_allows_full_burst_then_rejects() {
        let limit = CategoryLimit::new(2, Duration::from_secs(60));
        let client = String::from("10.0.0.1");

        assert!(limit.limiter.check_key(&client).is_ok());
        assert!(limit.limiter.check_key(&client).is_ok());
        assert!(limit.limiter.check_key(&client).is_err());
        assert!(limit.limiter.check_key(&String::from("10.0.0.2")).is_ok());
    }
}
