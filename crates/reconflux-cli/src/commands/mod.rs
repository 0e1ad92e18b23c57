mod history;
mod query;
mod sources;
mod store;

use std::sync::Arc;

use reconflux_store::{JsonStore, StoreConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a command hands back to `main` for rendering.
pub struct CommandOutput {
    pub data: Value,
    pub warnings: Vec<String>,
    /// Some of the work failed; rendered output is still meaningful.
    pub partial: bool,
}

impl CommandOutput {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            partial: false,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    match &cli.command {
        Command::Query(args) => {
            let store = if args.no_store {
                None
            } else {
                Some(open_store(cli)?)
            };
            query::run(args, store).await
        }
        Command::Sources => Ok(sources::run()),
        Command::Store(args) => {
            let store = open_store(cli)?;
            store::run(args, &store)
        }
        Command::History(args) => {
            let store = open_store(cli)?;
            Ok(history::run(args, &store))
        }
    }
}

fn open_store(cli: &Cli) -> Result<Arc<JsonStore>, CliError> {
    let config = match &cli.store_dir {
        Some(dir) => StoreConfig::in_dir(dir),
        None => StoreConfig::default(),
    };
    Ok(Arc::new(JsonStore::open(config)?))
}
