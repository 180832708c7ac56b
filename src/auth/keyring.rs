//! OS keychain-backed credential store.

use keyring::Entry;

use super::{ApiKeyCredential, CredentialKey, CredentialStore};
use crate::{Error, Result};

/// Default keychain service name.
pub const DEFAULT_SERVICE: &str = "unigen";

/// Credential store backed by the operating system keychain.
///
/// Credentials are stored as JSON so the update timestamp survives round
/// trips. An entry that does not parse is reported as absent rather than as
/// an error, so a corrupted entry re-prompts instead of wedging the caller.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(DEFAULT_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: CredentialKey) -> Result<Entry> {
        Entry::new(&self.service, key.entry_name())
            .map_err(|e| Error::credential_store(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: CredentialKey) -> Result<Option<ApiKeyCredential>> {
        let entry = self.entry(key)?;
        match entry.get_password() {
            Ok(raw) => match serde_json::from_str::<ApiKeyCredential>(&raw) {
                Ok(credential) => Ok(Some(credential)),
                Err(err) => {
                    tracing::warn!(entry = key.entry_name(), error = %err, "stored credential is not valid JSON; treating as absent");
                    Ok(None)
                }
            },
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(Error::credential_store(err.to_string())),
        }
    }

    fn set(&self, key: CredentialKey, credential: &ApiKeyCredential) -> Result<()> {
        let entry = self.entry(key)?;
        let serialized = serde_json::to_string(credential)?;
        entry
            .set_password(&serialized)
            .map_err(|e| Error::credential_store(e.to_string()))
    }

    fn delete(&self, key: CredentialKey) -> Result<()> {
        let entry = self.entry(key)?;
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(Error::credential_store(err.to_string())),
        }
    }
}
