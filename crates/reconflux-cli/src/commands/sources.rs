use reconflux_core::{ReconConfig, SourceId, SourceRegistry, Vault};
use serde::Serialize;

use super::CommandOutput;

#[derive(Debug, Serialize)]
struct SourceStatus {
    source: SourceId,
    enabled: bool,
    requires_credential: bool,
    credential_configured: bool,
    timeout_ms: u64,
    max_retries: u32,
    rate_limit: Option<String>,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<SourceStatus>,
}

pub fn run() -> CommandOutput {
    let config = ReconConfig::from_env();
    let warnings = config
        .issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>();

    let data = describe(&config, &Vault::from_env(), &SourceRegistry::with_real_clients());
    CommandOutput::ok(serde_json::json!(data)).with_warnings(warnings)
}

fn describe(config: &ReconConfig, vault: &Vault, registry: &SourceRegistry) -> SourcesResponseData {
    let sources = SourceId::ALL
        .iter()
        .map(|&source| {
            let settings = config.settings(source);
            let requires_credential = registry
                .get(source)
                .is_some_and(|adapter| adapter.requires_credential());
            SourceStatus {
                source,
                enabled: settings.enabled,
                requires_credential,
                credential_configured: !requires_credential || vault.is_configured(source),
                timeout_ms: settings.timeout.as_millis() as u64,
                max_retries: settings.max_retries,
                rate_limit: settings
                    .rate_limit
                    .map(|limit| format!("{}/{}s", limit.limit, limit.window.as_secs())),
            }
        })
        .collect();

    SourcesResponseData { sources }
}
