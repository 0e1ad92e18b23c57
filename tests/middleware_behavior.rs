//! Behavior tests for the request middleware chain and the query handler.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Script, ScriptedSource};
use reconflux_core::middleware::{
    ErrorFormatter, HandlerFuture, Next, RequestLog, RequestRateLimit, ValidateInput,
};
use reconflux_core::{
    Chain, Handler, HandlerError, Middleware, QueryHandler, ReconConfig, Request, Response,
    ScatterGather, Source, SourceId, SourceRegistry, Vault,
};
use serde_json::json;

/// Records the order in which middleware and handler see a request.
struct Trace {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Trace {
    fn name(&self) -> &'static str {
        self.label
    }

    fn handle<'a>(&'a self, request: Request, next: Next<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.log.lock().expect("log").push(format!("{} in", self.label));
            let outcome = next.run(request).await;
            self.log.lock().expect("log").push(format!("{} out", self.label));
            outcome
        })
    }
}

struct Echo {
    log: Arc<Mutex<Vec<String>>>,
}

impl Handler for Echo {
    fn call<'a>(&'a self, request: Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.log.lock().expect("log").push(String::from("handler"));
            Ok(Response::ok(json!(request.params)))
        })
    }
}

struct Failing;

impl Handler for Failing {
    fn call<'a>(&'a self, _request: Request) -> HandlerFuture<'a> {
        Box::pin(async { Err(HandlerError::Internal(String::from("database exploded"))) })
    }
}

fn query_chain(sources: Vec<Arc<ScriptedSource>>) -> Chain {
    let registry = SourceRegistry::new(
        sources
            .into_iter()
            .map(|source| source as Arc<dyn Source>)
            .collect(),
    );
    let executor = ScatterGather::new(registry, Vault::new(), ReconConfig::default());
    QueryHandler::new(Arc::new(executor)).into_chain()
}

// =============================================================================
// Chain mechanics
// =============================================================================

#[tokio::test]
async fn middleware_runs_outermost_first_and_unwinds_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = Chain::new(Arc::new(Echo { log: Arc::clone(&log) }))
        .with(Trace { label: "outer", log: Arc::clone(&log) })
        .with(Trace { label: "inner", log: Arc::clone(&log) });

    let response = chain
        .dispatch(Request::new("recon", "whois", "test").with_param("target", json!("example.com")))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({ "target": "example.com" }));
    assert_eq!(
        *log.lock().expect("log"),
        vec!["outer in", "inner in", "handler", "inner out", "outer out"]
    );
    assert_eq!(chain.middleware_names(), vec!["outer", "inner"]);
}

#[tokio::test]
async fn validation_short_circuits_before_the_handler() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = Chain::new(Arc::new(Echo { log: Arc::clone(&log) }))
        .with(ErrorFormatter::new(false))
        .with(ValidateInput::new(["target"], Vec::<String>::new()));

    let response = chain
        .dispatch(Request::new("recon", "whois", "test").with_param("host", json!("x")))
        .await;

    assert_eq!(response.status, 400);
    assert_eq!(response.body["error"], "Missing required parameters: target");
    assert!(log.lock().expect("log").is_empty(), "handler must not run");
}

#[tokio::test]
async fn request_rate_limit_is_per_client_and_category() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = Chain::new(Arc::new(Echo { log }))
        .with(RequestLog)
        .with(ErrorFormatter::new(false))
        .with(RequestRateLimit::new().with_quota("network", 2, Duration::from_secs(60)));

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(chain.dispatch(Request::new("network", "nmap-scan", "10.0.0.1")).await.status);
    }
    let other_client = chain.dispatch(Request::new("network", "nmap-scan", "10.0.0.2")).await;
    let other_category = chain.dispatch(Request::new("recon", "whois", "10.0.0.1")).await;

    assert_eq!(statuses, vec![200, 200, 429]);
    assert_eq!(other_client.status, 200);
    assert_eq!(other_category.status, 200);
}

#[tokio::test]
async fn internal_errors_hide_details_unless_exposed() {
    let hidden = Chain::new(Arc::new(Failing))
        .with(ErrorFormatter::new(false))
        .dispatch(Request::new("recon", "whois", "test"))
        .await;
    let exposed = Chain::new(Arc::new(Failing))
        .with(ErrorFormatter::new(true))
        .dispatch(Request::new("recon", "whois", "test"))
        .await;
    let unformatted = Chain::new(Arc::new(Failing))
        .dispatch(Request::new("recon", "whois", "test"))
        .await;

    assert_eq!(hidden.status, 500);
    assert_eq!(hidden.body["error"], "An internal server error occurred");
    assert!(hidden.body["message"].is_null());
    assert_eq!(exposed.body["message"], "database exploded");
    assert_eq!(unformatted.status, 500);
    assert!(unformatted.body["message"].is_null());
}

// =============================================================================
// Query handler behind the standard chain
// =============================================================================

#[tokio::test]
async fn query_request_returns_aggregated_result() {
    let chain = query_chain(vec![
        ScriptedSource::new(SourceId::Crtsh, Script::Succeed(json!({ "subdomains": [] }))),
        ScriptedSource::new(SourceId::Whois, Script::Succeed(json!({ "registrar": "IANA" }))),
    ]);

    let response = chain
        .dispatch(
            QueryHandler::request("cli")
                .with_param("target", json!("Example.com"))
                .with_param("sources", json!(["whois", "crt.sh"])),
        )
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body["target"], "example.com");
    assert_eq!(response.body["sources"]["whois"]["status"], "success");
    assert_eq!(response.body["sources"]["crtsh"]["data"], json!({ "subdomains": [] }));
}

#[tokio::test]
async fn query_request_rejects_unknown_sources_and_parameters() {
    let chain = query_chain(vec![]);

    let unknown_source = chain
        .dispatch(
            QueryHandler::request("cli")
                .with_param("target", json!("example.com"))
                .with_param("sources", json!("whois,spyse")),
        )
        .await;
    let unknown_param = chain
        .dispatch(
            QueryHandler::request("cli")
                .with_param("target", json!("example.com"))
                .with_param("sources", json!("whois"))
                .with_param("verbose", json!(true)),
        )
        .await;
    let bad_target = chain
        .dispatch(
            QueryHandler::request("cli")
                .with_param("target", json!("exa mple.com"))
                .with_param("sources", json!("whois")),
        )
        .await;

    assert_eq!(unknown_source.status, 400);
    assert!(unknown_source.body["error"]
        .as_str()
        .is_some_and(|message| message.contains("spyse")));
    assert_eq!(unknown_param.status, 400);
    assert_eq!(unknown_param.body["error"], "Unknown parameters: verbose");
    assert_eq!(bad_target.status, 400);
}
