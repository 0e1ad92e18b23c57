use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_body, send};
use crate::data_source::{FetchFuture, Source, SourceError};
use crate::http_client::{HttpClient, HttpRequest};
use crate::{Credential, SourceId, Target};

const DEFAULT_BASE_URL: &str = "https://api.hunter.io";

/// Hunter domain search: e-mail addresses published for a domain.
#[derive(Clone)]
pub struct HunterAdapter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HunterAdapter {
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

    async fn domain_search(
        &self,
        target: &Target,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Value, SourceError> {
        if target.is_ip() {
            return Err(SourceError::invalid_request(
                "hunter domain search requires a domain name",
            ));
        }

        let endpoint = format!(
            "{}/v2/domain-search?domain={}&api_key={}",
            self.base_url,
            urlencoding::encode(target.as_str()),
            urlencoding::encode(credential.key())
        );
        let response = send(
            self.http_client.as_ref(),
            SourceId::Hunter,
            HttpRequest::get(endpoint),
            timeout,
        )
        .await?;
        let body: HunterEnvelope = parse_body(SourceId::Hunter, &response)?;
        let data = body.data;

        let emails = data
            .emails
            .into_iter()
            .map(|email| {
                json!({
                    "value": email.value,
                    "type": email.kind,
                    "confidence": email.confidence,
                    "position": email.position,
                })
            })
            .collect::<Vec<_>>();

        Ok(json!({
            "domain": data.domain,
            "organization": data.organization,
            "pattern": data.pattern,
            "emails": emails,
        }))
    }
}

impl Source for HunterAdapter {
    fn id(&self) -> SourceId {
        SourceId::Hunter
    }

    fn fetch<'a>(
        &'a self,
        target: &'a Target,
        credential: &'a Credential,
        timeout: Duration,
    ) -> FetchFuture<'a> {
        Box::pin(self.domain_search(target, credential, timeout))
    }
}

#[derive(Debug, Deserialize)]
struct HunterEnvelope {
    data: HunterDomain,
}

#[derive(Debug, Deserialize)]
struct HunterDomain {
    domain: Option<String>,
    organization: Option<String>,
    pattern: Option<String>,
    #[serde(default)]
    emails: Vec<HunterEmail>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    value: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    confidence: Option<u8>,
    position: Option<String>,
}
