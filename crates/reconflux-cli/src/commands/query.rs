use std::sync::Arc;

use reconflux_core::{QueryHandler, ReconConfig, ScatterGather, SourceRegistry, Vault};
use reconflux_store::JsonStore;
use serde_json::{json, Value};
use tracing::debug;

use crate::cli::QueryArgs;
use crate::error::CliError;

use super::CommandOutput;

const CLI_CLIENT: &str = "cli";

pub async fn run(args: &QueryArgs, store: Option<Arc<JsonStore>>) -> Result<CommandOutput, CliError> {
    let config = ReconConfig::from_env();
    let warnings = config
        .issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>();

    let mut executor = ScatterGather::new(SourceRegistry::with_real_clients(), Vault::from_env(), config);
    if let Some(store) = store {
        executor = executor.with_store(store);
    }
    let chain = QueryHandler::new(Arc::new(executor)).into_chain();

    let mut request = QueryHandler::request(CLI_CLIENT)
        .with_param("target", json!(args.target))
        .with_param("sources", json!(args.sources));
    if let Some(deadline_ms) = args.deadline_ms {
        request = request.with_param("deadline_ms", json!(deadline_ms));
    }

    let response = chain.dispatch(request).await;
    debug!(status = response.status, "query dispatched");
    render(response.status, response.body).map(|output| output.with_warnings(warnings))
}

fn render(status: u16, body: Value) -> Result<CommandOutput, CliError> {
    match status {
        200..=299 => {
            let partial = has_source_errors(&body);
            Ok(CommandOutput::ok(body).partial(partial))
        }
        // The query ran but could not be recorded; the result is still shown.
        500.. if body.get("result").is_some_and(|result| !result.is_null()) => {
            let warning = format!(
                "query result was not recorded: {}",
                body.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("store write failed")
            );
            let result = body.get("result").cloned().unwrap_or(Value::Null);
            Ok(CommandOutput::ok(result).with_warning(warning).partial(true))
        }
        _ => {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_owned();
            Err(CliError::Request(message))
        }
    }
}

fn has_source_errors(body: &Value) -> bool {
    body.get("sources")
        .and_then(Value::as_object)
        .is_some_and(|sources| {
            sources
                .values()
                .any(|outcome| outcome.get("status").and_then(Value::as_str) == Some("error"))
        })
}
