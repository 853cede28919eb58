//! Remote document store access.
//!
//! The engine only needs `get(key)`. [`DocumentStore`] is that capability;
//! [`HttpDocumentStore`] serves it from a REST endpoint laid out as
//! `{base_url}/{collection}/{key}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridcast_core::ResolverConfig;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::key::GridKey;
use crate::retry::{is_retryable_error, is_retryable_status, RetryDecision};
use crate::types::WeatherRecord;

const USER_AGENT: &str = concat!("gridcast/", env!("CARGO_PKG_VERSION"));

/// Outcome of a failed lookup.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document under this key. Terminal for the key.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Network failure or timeout; worth retrying.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The document exists but could not be decoded.
    #[error("Malformed document: {0}")]
    Decode(String),

    /// The request itself is wrong; no other key will fare better.
    #[error("Request rejected: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        match is_retryable_error(&error) {
            RetryDecision::Retry => Self::Transport(error.to_string()),
            RetryDecision::NoRetry => Self::Permanent(error.to_string()),
        }
    }
}

/// Key-value access to weather documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, key: &GridKey) -> Result<WeatherRecord, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn get(&self, key: &GridKey) -> Result<WeatherRecord, StoreError> {
        (**self).get(key).await
    }
}

/// REST-backed document store.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, collection: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Permanent(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.trim_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.store_url,
            &config.collection,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn document_url(&self, key: &GridKey) -> String {
        format!("{}/{}/{}", self.base_url, self.collection, key)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn get(&self, key: &GridKey) -> Result<WeatherRecord, StoreError> {
        let url = self.document_url(key);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(StoreError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key.to_string()));
        }

        if !status.is_success() {
            let message = format!("{} returned {}", key, status);
            return Err(match is_retryable_status(status) {
                RetryDecision::Retry => StoreError::Transport(message),
                RetryDecision::NoRetry => StoreError::Permanent(message),
            });
        }

        let body = response.bytes().await.map_err(StoreError::from_reqwest)?;

        serde_json::from_slice(&body).map_err(|e| StoreError::Decode(format!("{}: {}", key, e)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_document_url_layout() {
        let store =
            HttpDocumentStore::new("http://localhost:8080/", "/weather/", Duration::from_secs(5))
                .unwrap();
        let key: GridKey = "23.70_92.80".parse().unwrap();
        assert_eq!(
            store.document_url(&key),
            "http://localhost:8080/weather/23.70_92.80"
        );
    }

    #[test]
    fn test_from_config() {
        let store = HttpDocumentStore::from_config(&ResolverConfig::default()).unwrap();
        let key = GridKey::from_degrees(22.88, 92.73);
        assert_eq!(store.document_url(&key), "http://localhost:8080/weather/22.88_92.73");
    }

    #[test]
    fn test_error_classification() {
        assert!(StoreError::Transport("timeout".into()).is_retryable());
        assert!(!StoreError::NotFound("k".into()).is_retryable());
        assert!(!StoreError::Decode("k".into()).is_retryable());
        assert!(StoreError::Permanent("bad".into()).is_permanent());
        assert!(!StoreError::Transport("timeout".into()).is_permanent());
    }
}
