//! OS 키체인/키링 저장소
//!
//! keyring 호출은 블로킹이므로 `spawn_blocking` 으로 격리합니다.
//! 엔트리가 없는 경우(`NoEntry`)는 에러가 아니라 `None` 입니다.

use async_trait::async_trait;
use keyring::{Entry, Error as KeyringError};

use crate::error::StorageError;
use crate::storage::StorageBackend;

#[derive(Debug, Clone)]
pub struct KeychainStorage {
    service: String,
}

impl KeychainStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, KeyringError> + Send + 'static,
    {
        validate_key(key)?;
        let service = self.service.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &key).map_err(map_keyring_error)?;
            op(entry).map_err(map_keyring_error)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("keychain task failed: {}", e)))?
    }
}

fn map_keyring_error(err: KeyringError) -> StorageError {
    StorageError::Keychain(err.to_string())
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.trim().is_empty() {
        return Err(StorageError::Keychain("Secure store key must not be empty.".to_string()));
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for KeychainStorage {
    fn name(&self) -> &'static str {
        "keychain"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(KeyringError::NoEntry) => Ok(None),
            Err(err) => Err(err),
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let value = value.to_string();
        self.with_entry(key, move |entry| entry.set_password(&value)).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entry(key, |entry| match entry.delete_password() {
            Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
            Err(err) => Err(err),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_key_is_rejected_before_touching_keychain() {
        let storage = KeychainStorage::new("com.oddeyes.session.test");
        let err = storage.get("  ").await.unwrap_err();
        assert!(matches!(err, StorageError::Keychain(_)));
    }
}
