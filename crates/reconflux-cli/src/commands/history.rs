use reconflux_store::{JsonStore, StoreEvent};
use serde::Serialize;

use crate::cli::HistoryArgs;

use super::CommandOutput;

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    category: String,
    operation: String,
    total: usize,
    events: Vec<StoreEvent>,
}

/// Most recent events first, at most `args.limit` of them.
pub fn run(args: &HistoryArgs, store: &JsonStore) -> CommandOutput {
    let events = store.events(&args.category, &args.operation);
    let total = events.len();
    let recent = events.into_iter().rev().take(args.limit).collect();

    CommandOutput::ok(serde_json::json!(HistoryResponseData {
        category: args.category.clone(),
        operation: args.operation.clone(),
        total,
        events: recent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconflux_store::StoreConfig;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn history_lists_newest_events_up_to_limit() {
        let dir = tempdir().expect("tempdir");
        let store = JsonStore::open(StoreConfig::in_dir(dir.path())).expect("open store");
        for n in 0..3 {
            store
                .append_event("recon", "whois", json!({ "n": n }), json!({}))
                .expect("append");
        }

        let output = run(
            &HistoryArgs {
                category: String::from("recon"),
                operation: String::from("whois"),
                limit: 2,
            },
            &store,
        );

        assert_eq!(output.data["total"], 3);
        let shown = output.data["events"].as_array().expect("events");
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[0]["params"]["n"], 2);
        assert_eq!(shown[1]["params"]["n"], 1);
    }
}
