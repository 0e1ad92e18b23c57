use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{parse_body, send};
use crate::data_source::{FetchFuture, Source, SourceError};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{Credential, SourceId, Target};

const DEFAULT_BASE_URL: &str = "https://search.censys.io/api";

/// Censys host search, authenticated with an API id/secret pair.
#[derive(Clone)]
pub struct CensysAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl CensysAdapter {
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

    async fn search(
        &self,
        target: &Target,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Value, SourceError> {
        let Some(secret) = credential.secret() else {
            return Err(SourceError::not_configured(
                "censys requires both an API id and an API secret",
            ));
        };

        let endpoint = format!(
            "{}/v2/hosts/search?q={}&per_page=1",
            self.base_url,
            urlencoding::encode(target.as_str())
        );
        let request = HttpRequest::get(endpoint).with_auth(&HttpAuth::Basic {
            username: credential.key().to_owned(),
            password: secret.to_owned(),
        });
        let response = send(self.http_client.as_ref(), SourceId::Censys, request, timeout).await?;
        let body: CensysSearch = parse_body(SourceId::Censys, &response)?;
        Ok(summarize(body))
    }
}

impl Source for CensysAdapter {
    fn id(&self) -> SourceId {
        SourceId::Censys
    }

    fn fetch<'a>(
        &'a self,
        target: &'a Target,
        credential: &'a Credential,
        timeout: Duration,
    ) -> FetchFuture<'a> {
        Box::pin(self.search(target, credential, timeout))
    }
}

// v2 wraps hits in `result`; older responses put them at the top level.
#[derive(Debug, Deserialize)]
struct CensysSearch {
    result: Option<CensysResult>,
    #[serde(default)]
    hits: Vec<CensysHit>,
}

#[derive(Debug, Deserialize)]
struct CensysResult {
    #[serde(default)]
    hits: Vec<CensysHit>,
}

#[derive(Debug, Deserialize)]
struct CensysHit {
    ip: Option<String>,
    #[serde(default)]
    services: Vec<CensysService>,
    #[serde(default)]
    location: Map<String, Value>,
    #[serde(default)]
    autonomous_system: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CensysService {
    port: Option<u16>,
    service_name: Option<String>,
    transport_protocol: Option<String>,
}

fn summarize(body: CensysSearch) -> Value {
    let hits = match body.result {
        Some(result) => result.hits,
        None => body.hits,
    };
    let Some(hit) = hits.into_iter().next() else {
        return json!({});
    };

    let services = hit
        .services
        .into_iter()
        .map(|service| {
            json!({
                "port": service.port,
                "service_name": service.service_name,
                "transport_protocol": service.transport_protocol,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "ip": hit.ip,
        "services": services,
        "location": hit.location,
        "autonomous_system": hit.autonomous_system,
    })
}
