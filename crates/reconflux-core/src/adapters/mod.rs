//! Thin source adapters.
//!
//! Each adapter issues one upstream request per `fetch`, maps transport and
//! status failures into [`SourceError`] and reshapes the payload into a compact
//! JSON value. Retries, caching and rate limiting belong to the executor.

mod censys;
mod crtsh;
mod hunter;
mod shodan;
mod virustotal;
mod whois;

pub use censys::CensysAdapter;
pub use crtsh::CrtshAdapter;
pub use hunter::HunterAdapter;
pub use shodan::ShodanAdapter;
pub use virustotal::VirustotalAdapter;
pub use whois::WhoisAdapter;

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::{SourceError, SourceId};

/// Send `request` and turn any non-2xx answer into a classified [`SourceError`].
pub(crate) async fn send(
    http_client: &dyn HttpClient,
    source: SourceId,
    request: HttpRequest,
    timeout: Duration,
) -> Result<HttpResponse, SourceError> {
    let response = http_client
        .execute(request.with_timeout(timeout))
        .await
        .map_err(|error| transport_error(source, &error))?;

    if response.is_success() {
        Ok(response)
    } else {
        Err(status_error(source, response.status))
    }
}

pub(crate) fn transport_error(source: SourceId, error: &HttpError) -> SourceError {
    if error.is_timeout() {
        SourceError::timeout(format!("{source} request timed out: {}", error.message()))
    } else {
        SourceError::unavailable(format!("{source} transport error: {}", error.message()))
    }
}

pub(crate) fn status_error(source: SourceId, status: u16) -> SourceError {
    match status {
        401 | 403 => SourceError::not_configured(format!(
            "{source} rejected the configured credential (status {status})"
        )),
        404 => SourceError::invalid_request(format!("{source} has no record for this target")),
        429 => SourceError::upstream_throttled(format!("{source} is throttling requests")),
        400..=499 => SourceError::invalid_request(format!("{source} returned status {status}")),
        _ => SourceError::unavailable(format!("{source} returned status {status}")),
    }
}

pub(crate) fn parse_body<T: DeserializeOwned>(
    source: SourceId,
    response: &HttpResponse,
) -> Result<T, SourceError> {
    serde_json::from_str(&response.body)
        .map_err(|e| SourceError::internal(format!("failed to parse {source} response: {e}")))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use crate::http_client::{HttpClient, HttpError, HttpFuture, HttpRequest, HttpResponse};

    /// Transport that replays one canned answer and records every request.
    #[derive(Debug)]
    pub struct CannedHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl CannedHttpClient {
        pub fn json(body: &str) -> Self {
            Self::respond(Ok(HttpResponse::ok_json(body)))
        }

        pub fn status(status: u16) -> Self {
            Self::respond(Ok(HttpResponse::with_status(status, "")))
        }

        pub fn respond(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for CannedHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceErrorKind;

    #[test]
    fn status_codes_map_to_error_kinds() {
        let kind = |status| status_error(SourceId::Shodan, status).kind();

        assert_eq!(kind(401), SourceErrorKind::NotConfigured);
        assert_eq!(kind(403), SourceErrorKind::NotConfigured);
        assert_eq!(kind(404), SourceErrorKind::InvalidRequest);
        assert_eq!(kind(429), SourceErrorKind::RateLimited);
        assert_eq!(kind(503), SourceErrorKind::Unavailable);
        assert!(status_error(SourceId::Shodan, 429).retryable());
        assert!(!status_error(SourceId::Shodan, 401).retryable());
    }

    #[test]
    fn transport_timeouts_are_reported_as_timeouts() {
        let error = transport_error(SourceId::Censys, &HttpError::timed_out("deadline"));
        assert_eq!(error.kind(), SourceErrorKind::Timeout);
        assert!(error.retryable());
    }
}
