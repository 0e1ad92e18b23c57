use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{parse_body, send};
use crate::data_source::{FetchFuture, Source, SourceError};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{Credential, SourceId, Target};

const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/api/v3";

/// VirusTotal domain or IP report.
#[derive(Clone)]
pub struct VirustotalAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl VirustotalAdapter {
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

    async fn report(
        &self,
        target: &Target,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Value, SourceError> {
        let collection = if target.is_ip() { "ip_addresses" } else { "domains" };
        let endpoint = format!(
            "{}/{collection}/{}",
            self.base_url,
            urlencoding::encode(target.as_str())
        );
        let request = HttpRequest::get(endpoint).with_auth(&HttpAuth::Header {
            name: String::from("x-apikey"),
            value: credential.key().to_owned(),
        });
        let response =
            send(self.http_client.as_ref(), SourceId::Virustotal, request, timeout).await?;
        let body: VtEnvelope = parse_body(SourceId::Virustotal, &response)?;
        Ok(body.data.attributes.into_summary())
    }
}

impl Source for VirustotalAdapter {
    fn id(&self) -> SourceId {
        SourceId::Virustotal
    }

    fn fetch<'a>(
        &'a self,
        target: &'a Target,
        credential: &'a Credential,
        timeout: Duration,
    ) -> FetchFuture<'a> {
        Box::pin(self.report(target, credential, timeout))
    }
}

#[derive(Debug, Deserialize)]
struct VtEnvelope {
    data: VtObject,
}

#[derive(Debug, Deserialize)]
struct VtObject {
    #[serde(default)]
    attributes: VtAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct VtAttributes {
    reputation: Option<i64>,
    #[serde(default)]
    last_analysis_stats: Map<String, Value>,
    #[serde(default)]
    categories: Map<String, Value>,
    registrar: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    country: Option<String>,
    as_owner: Option<String>,
}

impl VtAttributes {
    fn into_summary(self) -> Value {
        json!({
            "reputation": self.reputation,
            "last_analysis_stats": self.last_analysis_stats,
            "categories": self.categories,
            "registrar": self.registrar,
            "tags": self.tags,
            "country": self.country,
            "as_owner": self.as_owner,
        })
    }
}
