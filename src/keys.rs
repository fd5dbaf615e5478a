//! API key storage
//!
//! Keys are persisted as a provider → key JSON map under [`API_KEYS_KEY`] and
//! held in memory as [`SecretString`] so they never end up in `Debug` output
//! or logs.

use crate::events::{AppEvent, EventBus};
use crate::models::Provider;
use crate::storage::{JsonStore, StorageError, API_KEYS_KEY};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("API key for {provider} is empty")]
    Empty { provider: Provider },

    #[error("API key for {provider} contains whitespace")]
    Whitespace { provider: Provider },

    #[error("API key for {provider} should start with '{expected}'")]
    BadPrefix {
        provider: Provider,
        expected: &'static str,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Known key prefixes per vendor. Mistral keys carry no prefix.
fn expected_prefix(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenAi => Some("sk-"),
        Provider::Anthropic => Some("sk-ant-"),
        Provider::Google => Some("AIza"),
        Provider::Mistral => None,
    }
}

pub fn validate_key(provider: Provider, key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty { provider });
    }
    if key.chars().any(char::is_whitespace) {
        return Err(KeyError::Whitespace { provider });
    }
    if let Some(expected) = expected_prefix(provider) {
        if !key.starts_with(expected) {
            return Err(KeyError::BadPrefix { provider, expected });
        }
    }
    Ok(())
}

/// Shows the first and last four characters only.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

pub struct ApiKeyStore {
    store: JsonStore,
    events: EventBus,
}

impl ApiKeyStore {
    pub fn new(store: JsonStore, events: EventBus) -> Self {
        Self { store, events }
    }

    fn load(&self) -> Result<BTreeMap<Provider, String>, KeyError> {
        Ok(self.store.get_or_default(API_KEYS_KEY)?)
    }

    pub fn set_key(&self, provider: Provider, key: &str) -> Result<(), KeyError> {
        let key = key.trim();
        validate_key(provider, key)?;

        let mut keys = self.load()?;
        keys.insert(provider, key.to_string());
        self.store.set(API_KEYS_KEY, &keys)?;

        info!(provider = %provider, "API key updated");
        self.events.publish(AppEvent::ApiKeysUpdated {
            provider: Some(provider),
        });
        Ok(())
    }

    /// Returns whether a key was present.
    pub fn remove_key(&self, provider: Provider) -> Result<bool, KeyError> {
        let mut keys = self.load()?;
        let removed = keys.remove(&provider).is_some();
        if removed {
            self.store.set(API_KEYS_KEY, &keys)?;
            info!(provider = %provider, "API key removed");
            self.events.publish(AppEvent::ApiKeysUpdated {
                provider: Some(provider),
            });
        }
        Ok(removed)
    }

    pub fn get_key(&self, provider: Provider) -> Result<Option<SecretString>, KeyError> {
        Ok(self.load()?.remove(&provider).map(SecretString::from))
    }

    pub fn all_keys(&self) -> Result<BTreeMap<Provider, SecretString>, KeyError> {
        Ok(self
            .load()?
            .into_iter()
            .map(|(provider, key)| (provider, SecretString::from(key)))
            .collect())
    }

    pub fn configured_providers(&self) -> Result<Vec<Provider>, KeyError> {
        Ok(self.load()?.into_keys().collect())
    }

    /// Provider → masked key, for listings.
    pub fn masked_keys(&self) -> Result<Vec<(Provider, String)>, KeyError> {
        Ok(self
            .all_keys()?
            .iter()
            .map(|(provider, key)| (*provider, mask_key(key.expose_secret())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key_store(dir: &TempDir) -> (ApiKeyStore, EventBus) {
        let events = EventBus::new();
        let store = JsonStore::open(dir.path(), 64).unwrap();
        (ApiKeyStore::new(store, events.clone()), events)
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key(Provider::OpenAi, "sk-abc123").is_ok());
        assert!(validate_key(Provider::Anthropic, "sk-ant-abc").is_ok());
        assert!(matches!(
            validate_key(Provider::Anthropic, "sk-abc"),
            Err(KeyError::BadPrefix { expected: "sk-ant-", .. })
        ));
        assert!(matches!(validate_key(Provider::Google, ""), Err(KeyError::Empty { .. })));
        assert!(matches!(
            validate_key(Provider::Mistral, "abc def"),
            Err(KeyError::Whitespace { .. })
        ));
        assert!(validate_key(Provider::Mistral, "anything").is_ok());
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-1234567890abcd"), "sk-1…abcd");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn test_set_and_remove_publish_events() {
        let dir = TempDir::new().unwrap();
        let (keys, events) = key_store(&dir);
        let mut rx = events.subscribe();

        keys.set_key(Provider::OpenAi, " sk-test-key-0001 ").unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::ApiKeysUpdated {
                provider: Some(Provider::OpenAi)
            }
        );

        let stored = keys.get_key(Provider::OpenAi).unwrap().unwrap();
        assert_eq!(stored.expose_secret(), "sk-test-key-0001");
        assert_eq!(keys.configured_providers().unwrap(), vec![Provider::OpenAi]);

        assert!(keys.remove_key(Provider::OpenAi).unwrap());
        assert!(rx.try_recv().is_ok());
        assert!(!keys.remove_key(Provider::OpenAi).unwrap());
        assert!(rx.try_recv().is_err());
        assert!(keys.get_key(Provider::OpenAi).unwrap().is_none());
    }

    #[test]
    fn test_invalid_key_is_not_stored() {
        let dir = TempDir::new().unwrap();
        let (keys, _events) = key_store(&dir);
        assert!(keys.set_key(Provider::Google, "not-a-google-key").is_err());
        assert!(keys.configured_providers().unwrap().is_empty());
    }
}
