use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::adapters::{
    CensysAdapter, CrtshAdapter, HunterAdapter, ShodanAdapter, VirustotalAdapter, WhoisAdapter,
};
use crate::data_source::Source;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::SourceId;

/// Explicit mapping from source identifier to adapter, populated at startup.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<SourceId, Arc<dyn Source>>,
}

impl SourceRegistry {
    pub fn new(adapters: Vec<Arc<dyn Source>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();
        Self { adapters }
    }

    /// Every built-in adapter, sharing one HTTP transport.
    pub fn standard(http_client: Arc<dyn HttpClient>) -> Self {
        Self::new(vec![
            Arc::new(ShodanAdapter::new(Arc::clone(&http_client))),
            Arc::new(CensysAdapter::new(Arc::clone(&http_client))),
            Arc::new(VirustotalAdapter::new(Arc::clone(&http_client))),
            Arc::new(HunterAdapter::new(Arc::clone(&http_client))),
            Arc::new(CrtshAdapter::new(http_client)),
            Arc::new(WhoisAdapter::new()),
        ])
    }

    /// [`standard`](Self::standard) over the reqwest transport.
    pub fn with_real_clients() -> Self {
        Self::standard(Arc::new(ReqwestHttpClient::new()))
    }

    /// Add or replace the adapter for its source id.
    pub fn register(&mut self, adapter: Arc<dyn Source>) {
        self.adapters.insert(adapter.id(), adapter);
    }

    pub fn get(&self, source: SourceId) -> Option<Arc<dyn Source>> {
        self.adapters.get(&source).cloned()
    }

    pub fn contains(&self, source: SourceId) -> bool {
        self.adapters.contains_key(&source)
    }

    /// Registered source ids in identifier order.
    pub fn ids(&self) -> Vec<SourceId> {
        self.adapters.keys().copied().collect()
    }
}

impl Debug for SourceRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::NoopHttpClient;

    #[test]
    fn standard_registry_covers_every_source() {
        let registry = SourceRegistry::standard(Arc::new(NoopHttpClient));
        assert_eq!(registry.ids(), SourceId::ALL.to_vec());
    }

    #[test]
    fn register_replaces_by_id() {
        let mut registry = SourceRegistry::default();
        assert!(!registry.contains(SourceId::Whois));

        registry.register(Arc::new(WhoisAdapter::new()));
        registry.register(Arc::new(WhoisAdapter::with_root_server("127.0.0.1:43")));

        assert_eq!(registry.ids(), vec![SourceId::Whois]);
        assert!(registry.get(SourceId::Whois).is_some());
        assert!(registry.get(SourceId::Shodan).is_none());
    }
}
