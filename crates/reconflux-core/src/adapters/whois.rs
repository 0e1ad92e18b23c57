use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::debug;

use crate::data_source::{FetchFuture, Source, SourceError};
use crate::{Credential, SourceId, Target};

const IANA_SERVER: &str = "whois.iana.org:43";
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// WHOIS over plain TCP port 43.
///
/// Asks the IANA root first and follows its `refer:` line to the registry
/// server. Sockets are blocking, so every lookup runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct WhoisAdapter {
    root_server: String,
}

impl Default for WhoisAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WhoisAdapter {
    pub fn new() -> Self {
        Self::with_root_server(IANA_SERVER)
    }

    /// Use `root_server` (`host:port`) instead of the IANA root.
    pub fn with_root_server(root_server: impl Into<String>) -> Self {
        Self {
            root_server: root_server.into(),
        }
    }
}

impl Source for WhoisAdapter {
    fn id(&self) -> SourceId {
        SourceId::Whois
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
        let root_server = self.root_server.clone();
        let query = target.as_str().to_owned();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || lookup(&root_server, &query, timeout))
                .await
                .map_err(|e| SourceError::internal(format!("whois lookup task failed: {e}")))?
        })
    }
}

fn lookup(root_server: &str, query: &str, timeout: Duration) -> Result<Value, SourceError> {
    let started = Instant::now();
    let root_response = query_server(root_server, query, timeout)?;
    let root_fields = parse_response(&root_response);

    let referral = root_fields
        .get("refer")
        .or_else(|| root_fields.get("whois"))
        .and_then(Value::as_str)
        .map(|host| if host.contains(':') { host.to_owned() } else { format!("{host}:43") });

    let (server, fields) = match referral {
        Some(server) if server != root_server => {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(SourceError::timeout("whois referral exceeded the timeout"));
            }
            debug!(server = %server, "following whois referral");
            let response = query_server(&server, query, remaining)?;
            (server, parse_response(&response))
        }
        _ => (root_server.to_owned(), root_fields),
    };

    let mut payload = Map::new();
    payload.insert(String::from("server"), Value::String(server));
    payload.insert(String::from("record"), Value::Object(fields));
    Ok(Value::Object(payload))
}

fn query_server(server: &str, query: &str, timeout: Duration) -> Result<String, SourceError> {
    let io_error = |error: io::Error| {
        if matches!(error.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
            SourceError::timeout(format!("whois server {server} timed out"))
        } else {
            SourceError::unavailable(format!("whois server {server}: {error}"))
        }
    };

    let address = server
        .to_socket_addrs()
        .map_err(io_error)?
        .next()
        .ok_or_else(|| SourceError::unavailable(format!("whois server {server} did not resolve")))?;

    let mut stream = TcpStream::connect_timeout(&address, timeout).map_err(io_error)?;
    stream.set_read_timeout(Some(timeout)).map_err(io_error)?;
    stream.set_write_timeout(Some(timeout)).map_err(io_error)?;
    stream
        .write_all(format!("{query}\r\n").as_bytes())
        .map_err(io_error)?;

    let mut raw = Vec::new();
    stream
        .take(MAX_RESPONSE_BYTES)
        .read_to_end(&mut raw)
        .map_err(io_error)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Collect `key: value` lines. Keys are lowercased; repeated keys become arrays.
fn parse_response(response: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim().to_ascii_lowercase(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }

        let value = Value::String(value.to_owned());
        match fields.get_mut(&key) {
            None => {
                fields.insert(key, value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    fields
}
