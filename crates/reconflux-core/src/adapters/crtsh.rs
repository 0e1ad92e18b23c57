use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_body, send};
use crate::data_source::{FetchFuture, Source, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{Credential, SourceId, Target};

const DEFAULT_BASE_URL: &str = "https://crt.sh";
const MAX_CERTIFICATES: usize = 10;

/// Certificate transparency search on crt.sh. No credential required.
#[derive(Clone)]
pub struct CrtshAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl CrtshAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(DEFAULT_BASE_URL),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search(&self, target: &Target, timeout: Duration) -> Result<Value, SourceError> {
        let endpoint = format!(
            "{}/?q={}&output=json",
            self.base_url,
            urlencoding::encode(target.as_str())
        );
        let response = send(
            self.http_client.as_ref(),
            SourceId::Crtsh,
            HttpRequest::get(endpoint),
            timeout,
        )
        .await?;
        let entries: Vec<CtEntry> = parse_body(SourceId::Crtsh, &response)?;
        Ok(summarize(target, entries))
    }
}

impl Source for CrtshAdapter {
    fn id(&self) -> SourceId {
        SourceId::Crtsh
    }

    fn requires_credential(&self) -> bool {
        false
    }

    fn fetch<'a>(
        &'a self,
        target: &'a Target,
        _credential: &'a Credential,
        timeout: Duration,
    ) -> FetchFuture<'a> {
        Box::pin(self.search(target, timeout))
    }
}

#[derive(Debug, Deserialize)]
struct CtEntry {
    id: Option<u64>,
    issuer_name: Option<String>,
    #[serde(default)]
    name_value: String,
    not_before: Option<String>,
    not_after: Option<String>,
}

fn summarize(target: &Target, entries: Vec<CtEntry>) -> Value {
    let suffix = format!(".{}", target.as_str());
    let subdomains = entries
        .iter()
        .flat_map(|entry| entry.name_value.lines())
        .map(|name| name.trim().trim_start_matches("*.").to_ascii_lowercase())
        .filter(|name| name == target.as_str() || name.ends_with(&suffix))
        .collect::<BTreeSet<_>>();

    let certificates = entries
        .iter()
        .take(MAX_CERTIFICATES)
        .map(|entry| {
            json!({
                "id": entry.id,
                "issuer": entry.issuer_name,
                "names": entry.name_value.lines().collect::<Vec<_>>(),
                "not_before": entry.not_before,
                "not_after": entry.not_after,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "total_certificates": entries.len(),
        "subdomains": subdomains,
        "certificates": certificates,
    })
}
