//! 凭据存储模块：API 密钥的解析、持久化与失效处理。
//!
//! # Credential Store Module
//!
//! API keys are resolved environment-first: a set environment variable always
//! wins, the persistent store is only consulted when the variable is absent.
//! Store lookups that fail for any reason degrade to "no credential" with a
//! warning; they never abort a request.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CredentialStore`] | Get/set/delete contract over keyed credentials |
//! | [`CredentialKey`] | Fixed logical entry names, one per backend |
//! | [`ApiKeyCredential`] | Stored token plus its last-updated timestamp |
//! | [`KeyringStore`] | OS keychain implementation |
//! | [`MemoryStore`] | In-process implementation for tests and demos |
//! | [`resolve_api_key`] | Environment-first resolution helper |

mod keyring;

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::utils::CancelToken;
use crate::{Error, Result};

pub use self::keyring::KeyringStore;

/// A stored API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    pub token: String,
    /// Seconds since the Unix epoch at the time the token was saved.
    pub updated_at_secs: u64,
}

impl ApiKeyCredential {
    pub fn new(token: impl Into<String>) -> Self {
        let updated_at_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            token: token.into(),
            updated_at_secs,
        }
    }
}

/// Fixed logical entry names. Each backend reads exactly one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// Shared entry for backends without a dedicated one.
    Generic,
    Anthropic,
}

impl CredentialKey {
    pub fn entry_name(&self) -> &'static str {
        match self {
            CredentialKey::Generic => "api-key",
            CredentialKey::Anthropic => "anthropic-api-key",
        }
    }
}

/// Keyed credential persistence.
///
/// Implementations may fail on any operation; callers on read paths are
/// expected to go through [`load_or_absent`] so failures degrade instead of
/// propagating.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: CredentialKey) -> Result<Option<ApiKeyCredential>>;
    fn set(&self, key: CredentialKey, credential: &ApiKeyCredential) -> Result<()>;
    fn delete(&self, key: CredentialKey) -> Result<()>;
}

/// Read a credential, treating store failures as "absent".
pub fn load_or_absent(
    store: &dyn CredentialStore,
    key: CredentialKey,
) -> Option<ApiKeyCredential> {
    match store.get(key) {
        Ok(credential) => credential,
        Err(err) => {
            tracing::warn!(entry = key.entry_name(), error = %err, "credential store read failed; treating as absent");
            None
        }
    }
}

/// Delete a credential, logging instead of propagating store failures.
pub fn forget(store: &dyn CredentialStore, key: CredentialKey) {
    if let Err(err) = store.delete(key) {
        tracing::warn!(entry = key.entry_name(), error = %err, "credential store delete failed");
    }
}

/// Resolve an API key: environment variable first, stored credential second.
///
/// A set but blank environment variable counts as absent.
pub fn resolve_api_key(
    env_var: &str,
    key: CredentialKey,
    store: &dyn CredentialStore,
) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    load_or_absent(store, key).map(|credential| credential.token)
}

/// Validate a key (typically via a probe request) and persist it on success.
///
/// The cancellation token is consulted after validation and immediately
/// before the write; a cancelled operation returns `Ok(false)` without
/// touching the store. Returns `Ok(true)` once the credential is saved.
pub async fn store_validated_key<F>(
    store: &dyn CredentialStore,
    key: CredentialKey,
    token: impl Into<String>,
    validate: F,
    cancel: &CancelToken,
) -> Result<bool>
where
    F: std::future::Future<Output = Result<()>>,
{
    if cancel.is_cancelled() {
        return Ok(false);
    }
    validate.await?;
    if cancel.is_cancelled() {
        return Ok(false);
    }
    store.set(key, &ApiKeyCredential::new(token))?;
    Ok(true)
}

/// In-process store backed by a map. Used by tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CredentialKey, ApiKeyCredential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: CredentialKey) -> Result<Option<ApiKeyCredential>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::credential_store("memory store poisoned"))?;
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: CredentialKey, credential: &ApiKeyCredential) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::credential_store("memory store poisoned"))?;
        entries.insert(key, credential.clone());
        Ok(())
    }

    fn delete(&self, key: CredentialKey) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::credential_store("memory store poisoned"))?;
        entries.remove(&key);
        Ok(())
    }
}
