use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::executor::{ScatterGather, RESULT_CATEGORY, RESULT_OPERATION};
use crate::middleware::{Chain, Handler, HandlerError, HandlerFuture, Request, Response, ValidateInput};
use crate::{SourceId, Target};

/// Handler for `recon.multi-source` requests.
///
/// Parameters: `target` (string), `sources` (array of names or a comma
/// separated string) and an optional `deadline_ms`.
#[derive(Clone)]
pub struct QueryHandler {
    executor: Arc<ScatterGather>,
}

impl QueryHandler {
    pub fn new(executor: Arc<ScatterGather>) -> Self {
        Self { executor }
    }

    /// This handler behind the standard middleware chain.
    pub fn into_chain(self) -> Chain {
        Chain::standard(
            Arc::new(self),
            ValidateInput::new(["target", "sources"], ["deadline_ms"]),
        )
    }

    /// A request for this handler.
    pub fn request(client: impl Into<String>) -> Request {
        Request::new(RESULT_CATEGORY, RESULT_OPERATION, client)
    }

    async fn run(&self, request: Request) -> Result<Response, HandlerError> {
        let target = match request.param("target") {
            Some(Value::String(raw)) => Target::parse(raw).map_err(bad_request)?,
            _ => return Err(HandlerError::BadRequest(String::from("target must be a string"))),
        };
        let sources = parse_sources(request.param("sources"))?;
        let deadline = match request.param("deadline_ms") {
            None | Some(Value::Null) => self.executor.config().query_deadline,
            Some(value) => match value.as_u64() {
                Some(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => {
                    return Err(HandlerError::BadRequest(String::from(
                        "deadline_ms must be a positive integer",
                    )))
                }
            },
        };

        let result = self
            .executor
            .query_with_deadline(&target, &sources, deadline)
            .await?;
        let body = serde_json::to_value(&result)
            .map_err(|e| HandlerError::Internal(format!("failed to encode query result: {e}")))?;
        Ok(Response::ok(body))
    }
}

impl Handler for QueryHandler {
    fn call<'a>(&'a self, request: Request) -> HandlerFuture<'a> {
        Box::pin(self.run(request))
    }
}

fn parse_sources(value: Option<&Value>) -> Result<Vec<SourceId>, HandlerError> {
    match value {
        Some(Value::String(list)) => SourceId::parse_list(list).map_err(bad_request),
        Some(Value::Array(items)) => {
            let names = items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        HandlerError::BadRequest(String::from("sources must contain only strings"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            SourceId::parse_list(&names.join(",")).map_err(bad_request)
        }
        _ => Err(HandlerError::BadRequest(String::from(
            "sources must be a list of source names",
        ))),
    }
}

fn bad_request(error: impl std::fmt::Display) -> HandlerError {
    HandlerError::BadRequest(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sources_accept_arrays_and_comma_lists() {
        assert_eq!(
            parse_sources(Some(&json!(["whois", "crt.sh"]))).expect("array"),
            vec![SourceId::Whois, SourceId::Crtsh]
        );
        assert_eq!(
            parse_sources(Some(&json!("shodan, censys"))).expect("string"),
            vec![SourceId::Shodan, SourceId::Censys]
        );
    }

    #[test]
    fn unknown_or_malformed_sources_are_bad_requests() {
        let unknown = parse_sources(Some(&json!(["whois", "spyse"]))).expect_err("unknown");
        assert!(unknown.to_string().contains("spyse"));
        assert_eq!(unknown.status(), 400);

        assert!(parse_sources(Some(&json!([1, 2]))).is_err());
        assert!(parse_sources(Some(&json!([]))).is_err());
        assert!(parse_sources(None).is_err());
    }
}
