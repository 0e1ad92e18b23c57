//! Shared fixtures for the behavior tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reconflux_core::data_source::FetchFuture;
use reconflux_core::{Credential, Source, SourceError, SourceId, Target};
use serde_json::Value;

/// What a [`ScriptedSource`] does when called.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(Value),
    Fail(SourceError),
    /// Fail with the error for the first `n` calls, then succeed.
    FailTimes(u32, SourceError, Value),
    /// Sleep before answering with the value.
    Slow(Duration, Value),
    Panic,
}

/// Test double for a source adapter that counts its calls.
pub struct ScriptedSource {
    id: SourceId,
    script: Script,
    needs_credential: bool,
    calls: AtomicU32,
    last_key: std::sync::Mutex<Option<String>>,
}

impl ScriptedSource {
    pub fn new(id: SourceId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id,
            script,
            needs_credential: false,
            calls: AtomicU32::new(0),
            last_key: std::sync::Mutex::new(None),
        })
    }

    pub fn with_credential(id: SourceId, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id,
            script,
            needs_credential: true,
            calls: AtomicU32::new(0),
            last_key: std::sync::Mutex::new(None),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_key(&self) -> Option<String> {
        self.last_key.lock().expect("key lock").clone()
    }
}

impl Source for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn requires_credential(&self) -> bool {
        self.needs_credential
    }

    fn fetch<'a>(
        &'a self,
        _target: &'a Target,
        credential: &'a Credential,
        _timeout: Duration,
    ) -> FetchFuture<'a> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().expect("key lock") = Some(credential.key().to_owned());
        let script = self.script.clone();
        Box::pin(async move {
            match script {
                Script::Succeed(value) => Ok(value),
                Script::Fail(error) => Err(error),
                Script::FailTimes(times, error, value) => {
                    if call < times {
                        Err(error)
                    } else {
                        Ok(value)
                    }
                }
                Script::Slow(delay, value) => {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                }
                Script::Panic => panic!("scripted adapter panic"),
            }
        })
    }
}

pub fn target(raw: &str) -> Target {
    Target::parse(raw).expect("valid target")
}

/// Configuration lookup backed by a fixed list of pairs.
pub fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |name| {
        pairs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| (*value).to_owned())
    }
}
