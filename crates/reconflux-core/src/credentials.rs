//! Credential vault.
//!
//! Raw API secrets are read once at startup and kept sealed with
//! ChaCha20-Poly1305 under a key generated locally for each credential. They
//! are opened only when the executor is about to call a source and dropped
//! when that call finishes.
//!
//! The key lives in memory next to the ciphertext, so this keeps secrets out of
//! accidental logs, `Debug` output and casual memory inspection. It is not a
//! defense against someone with access to the live process.

use std::collections::HashMap;
use std::env;
use std::fmt::{Debug, Formatter};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{error, warn};

use crate::SourceId;

/// Decrypted credential for one source call.
pub struct Credential {
    source: SourceId,
    key: SecretString,
    secret: Option<SecretString>,
    valid: bool,
}

impl Credential {
    pub fn new(source: SourceId, key: impl Into<String>, secret: Option<String>) -> Self {
        let key = key.into();
        let valid = !key.trim().is_empty()
            && secret.as_ref().map_or(true, |secret| !secret.trim().is_empty());
        Self {
            source,
            key: SecretString::from(key),
            secret: secret.map(SecretString::from),
            valid,
        }
    }

    /// Placeholder handed to sources that are queried without an API key.
    pub fn anonymous(source: SourceId) -> Self {
        Self {
            source,
            key: SecretString::from(String::new()),
            secret: None,
            valid: true,
        }
    }

    pub const fn source(&self) -> SourceId {
        self.source
    }

    /// Primary secret (API key or API id).
    pub fn key(&self) -> &str {
        self.key.expose_secret()
    }

    /// Secondary secret for id/secret pairs.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|secret| secret.expose_secret())
    }

    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_anonymous(&self) -> bool {
        self.key.expose_secret().is_empty() && self.secret.is_none()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("key", &"[REDACTED]")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("valid", &self.valid)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("{id} credentials not configured")]
    NotConfigured { id: SourceId },
}

/// `RECONFLUX_<name>` if set to something non-blank, else `<name>`.
fn prefixed_lookup(name: &str, read: impl Fn(&str) -> Option<String>) -> Option<String> {
    let present = |value: &String| !value.trim().is_empty();
    read(&format!("RECONFLUX_{name}"))
        .filter(present)
        .or_else(|| read(name).filter(present))
}

struct SealedSecret {
    key: Key,
    nonce: Nonce,
    ciphertext: Vec<u8>,
}

impl SealedSecret {
    fn seal(plaintext: &str) -> Option<Self> {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = ChaCha20Poly1305::new(&key)
            .encrypt(&nonce, plaintext.as_bytes())
            .ok()?;
        Some(Self {
            key,
            nonce,
            ciphertext,
        })
    }

    fn open(&self) -> Option<String> {
        let plaintext = ChaCha20Poly1305::new(&self.key)
            .decrypt(&self.nonce, self.ciphertext.as_ref())
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

struct SealedCredential {
    key: SealedSecret,
    secret: Option<SealedSecret>,
}

/// Holds sealed source credentials for the lifetime of the process.
#[derive(Default)]
pub struct Vault {
    entries: HashMap<SourceId, SealedCredential>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load credentials from the process environment.
    ///
    /// `RECONFLUX_<VAR>` takes precedence over the bare `<VAR>`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| prefixed_lookup(name, |var| env::var(var).ok()))
    }

    /// Load credentials through `lookup`, which maps a variable name to its raw value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vault = Self::new();
        for source in SourceId::ALL {
            let vars = source.credential_vars();
            let Some((key_var, rest)) = vars.split_first() else {
                continue;
            };

            let key = lookup(*key_var).filter(|value| !value.trim().is_empty());
            let secret = rest
                .first()
                .map(|var| lookup(*var).filter(|value| !value.trim().is_empty()));

            match (key, secret) {
                (Some(key), None) => vault.insert(source, &key, None),
                (Some(key), Some(Some(secret))) => vault.insert(source, &key, Some(&secret)),
                _ => warn!(source = %source, vars = ?vars, "credentials not configured"),
            }
        }
        vault
    }

    /// Seal and store a credential, replacing any previous one.
    pub fn insert(&mut self, source: SourceId, key: &str, secret: Option<&str>) {
        let sealed_key = SealedSecret::seal(key);
        let sealed_secret = secret.map(SealedSecret::seal);

        match (sealed_key, sealed_secret) {
            (Some(key), None) => {
                self.entries.insert(source, SealedCredential { key, secret: None });
            }
            (Some(key), Some(Some(secret))) => {
                self.entries.insert(
                    source,
                    SealedCredential {
                        key,
                        secret: Some(secret),
                    },
                );
            }
            _ => error!(source = %source, "failed to seal credential"),
        }
    }

    /// Decrypt the credential for `source`.
    ///
    /// Fails closed: a missing entry or a decryption failure both report
    /// [`VaultError::NotConfigured`].
    pub fn get(&self, source: SourceId) -> Result<Credential, VaultError> {
        let not_configured = VaultError::NotConfigured { id: source };
        let entry = self.entries.get(&source).ok_or(not_configured.clone())?;

        let Some(key) = entry.key.open() else {
            error!(source = %source, "failed to decrypt credential");
            return Err(not_configured);
        };
        let secret = match &entry.secret {
            Some(sealed) => match sealed.open() {
                Some(secret) => Some(secret),
                None => {
                    error!(source = %source, "failed to decrypt credential secret");
                    return Err(not_configured);
                }
            },
            None => None,
        };

        let credential = Credential::new(source, key, secret);
        if !credential.is_valid() {
            return Err(not_configured);
        }
        Ok(credential)
    }

    pub fn is_configured(&self, source: SourceId) -> bool {
        self.entries.contains_key(&source)
    }

    /// Sources with a stored credential, in identifier order.
    pub fn configured_sources(&self) -> Vec<SourceId> {
        let mut sources = self.entries.keys().copied().collect::<Vec<_>>();
        sources.sort();
        sources
    }
}

impl Debug for Vault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("configured", &self.configured_sources())
            .finish()
    }
}
