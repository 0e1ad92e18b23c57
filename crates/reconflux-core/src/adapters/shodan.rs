use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_body, send};
use crate::data_source::{FetchFuture, Source, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{Credential, SourceId, Target};

const DEFAULT_BASE_URL: &str = "https://api.shodan.io";

/// Shodan host lookup (`/shodan/host/{ip}`).
#[derive(Clone)]
pub struct ShodanAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl ShodanAdapter {
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

    fn endpoint(&self, target: &Target, credential: &Credential) -> String {
        format!(
            "{}/shodan/host/{}?key={}",
            self.base_url,
            urlencoding::encode(target.as_str()),
            urlencoding::encode(credential.key())
        )
    }

    async fn lookup(
        &self,
        target: &Target,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Value, SourceError> {
        if !target.is_ip() {
            return Err(SourceError::invalid_request(
                "shodan host lookup requires an IP address",
            ));
        }

        let request = HttpRequest::get(self.endpoint(target, credential));
        let response = send(self.http_client.as_ref(), SourceId::Shodan, request, timeout).await?;
        let host: ShodanHost = parse_body(SourceId::Shodan, &response)?;
        Ok(host.into_summary())
    }
}

impl Source for ShodanAdapter {
    fn id(&self) -> SourceId {
        SourceId::Shodan
    }

    fn fetch<'a>(
        &'a self,
        target: &'a Target,
        credential: &'a Credential,
        timeout: Duration,
    ) -> FetchFuture<'a> {
        Box::pin(self.lookup(target, credential, timeout))
    }
}

#[derive(Debug, Deserialize)]
struct ShodanHost {
    ip_str: Option<String>,
    #[serde(default)]
    hostnames: Vec<String>,
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    ports: Vec<u16>,
    #[serde(default)]
    vulns: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    data: Vec<ShodanService>,
}

#[derive(Debug, Deserialize)]
struct ShodanService {
    port: Option<u16>,
    #[serde(default)]
    transport: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    cpe: Vec<String>,
    #[serde(default)]
    data: String,
}

impl ShodanHost {
    fn into_summary(self) -> Value {
        let services = self
            .data
            .into_iter()
            .map(|service| {
                json!({
                    "port": service.port,
                    "protocol": service.transport,
                    "service": service.product,
                    "version": service.version,
                    "cpe": service.cpe,
                    "banner": service.data,
                })
            })
            .collect::<Vec<_>>();

        json!({
            "ip": self.ip_str,
            "hostnames": self.hostnames,
            "domains": self.domains,
            "ports": self.ports,
            "vulns": self.vulns,
            "tags": self.tags,
            "services": services,
        })
    }
}
