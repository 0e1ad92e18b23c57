use reconflux_store::{JsonStore, StoreError};
use serde_json::{json, Value};

use crate::cli::{StoreArgs, StoreCommand};
use crate::error::CliError;

use super::CommandOutput;

pub fn run(args: &StoreArgs, store: &JsonStore) -> Result<CommandOutput, CliError> {
    match &args.command {
        StoreCommand::Get(get) => store
            .get(&get.key)
            .map(|value| CommandOutput::ok(json!({ "key": get.key, "value": value })))
            .ok_or_else(|| CliError::KeyNotFound(get.key.clone())),
        StoreCommand::Set(set) => {
            let value = parse_value(&set.value)?;
            store.set(&set.key, value.clone())?;
            Ok(CommandOutput::ok(json!({ "key": set.key, "value": value })))
        }
        StoreCommand::Update(update) => {
            store
                .update(&update.key, parse_value(&update.value)?)
                .map_err(|error| match error {
                    StoreError::KeyNotFound(key) => CliError::KeyNotFound(key),
                    other => CliError::Store(other),
                })?;
            let value = store.get(&update.key).unwrap_or(Value::Null);
            Ok(CommandOutput::ok(json!({ "key": update.key, "value": value })))
        }
    }
}

fn parse_value(raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(CliError::InvalidJson)
}
