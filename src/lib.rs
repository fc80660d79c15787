//! docsearch library: accession-number search over an Azure Blob container.
//!
//! This crate provides the HTTP surface, the search orchestration, and the
//! storage layer (SharedKey-signed listing, SAS download links, and an
//! in-memory listing for local runs).

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod search;
pub mod server;
pub mod storage;
pub mod xml;

use crate::config::{BackendKind, Config};
use crate::errors::SearchError;
use crate::storage::azure::{build_http_client, AzureBlobClient};
use crate::storage::backend::BlobLister;
use crate::storage::connection_string::StorageCredentials;
use crate::storage::memory::MemoryBlobStore;
use crate::storage::retry::RetryPolicy;

/// Where listings come from.
#[derive(Clone)]
pub enum Backend {
    /// Azure Blob Storage; the pooled client is shared by all requests.
    Azure(reqwest::Client),
    /// A fixed in-memory listing.
    Memory(Arc<MemoryBlobStore>),
}

impl Backend {
    /// Build the backend selected by `config.storage.backend`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(match config.storage.backend {
            BackendKind::Azure => {
                Backend::Azure(build_http_client(config.storage.request_timeout())?)
            }
            BackendKind::Memory => Backend::Memory(Arc::new(MemoryBlobStore::from_config(
                &config.storage.memory.blobs,
            ))),
        })
    }
}

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Listing backend.
    pub backend: Backend,
}

impl AppState {
    pub fn new(config: Config, backend: Backend) -> Self {
        Self { config, backend }
    }

    /// Resolve a lister for one search.
    ///
    /// The connection string is checked per request so a missing or broken
    /// setting surfaces as a 500 on the search rather than stopping startup.
    pub fn connect(&self) -> Result<Arc<dyn BlobLister>, SearchError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.clone()),
            Backend::Azure(client) => {
                let storage = &self.config.storage;
                let connection_string = storage
                    .connection_string
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(SearchError::NotConfigured)?;
                let credentials = StorageCredentials::from_connection_string(connection_string)?;
                let retry = RetryPolicy {
                    max_retries: storage.max_retries,
                    initial_backoff: storage.initial_backoff(),
                };

                let mut lister = AzureBlobClient::new(client.clone(), &credentials, retry)?;
                let download = &self.config.download;
                if download.signed_urls {
                    lister = lister.with_signed_urls(download.expiry(), download.start_skew())?;
                }
                Ok(Arc::new(lister))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn azure_state(connection_string: Option<&str>) -> AppState {
        let mut config = Config::default();
        config.storage.connection_string = connection_string.map(str::to_string);
        AppState::new(config, Backend::Azure(reqwest::Client::new()))
    }

    #[test]
    fn test_missing_connection_string_not_configured() {
        let err = azure_state(None).connect().err().unwrap();
        assert!(matches!(err, SearchError::NotConfigured));
        assert_eq!(err.to_string(), "Storage connection not configured");

        let err = azure_state(Some("  ")).connect().err().unwrap();
        assert!(matches!(err, SearchError::NotConfigured));
    }

    #[test]
    fn test_malformed_connection_string_is_configuration_error() {
        let err = azure_state(Some("AccountName=acct")).connect().err().unwrap();
        assert!(matches!(err, SearchError::Configuration { .. }));
        assert!(!err.to_string().contains(KEY));
    }

    #[test]
    fn test_azure_connects_with_valid_credentials() {
        let state = azure_state(Some(&format!("AccountName=acct;AccountKey={KEY}")));
        let lister = state.connect().unwrap();
        let url = lister.download_url("documents", "ACC1.pdf").unwrap();
        assert!(url.starts_with("https://acct.blob.core.windows.net/documents/ACC1.pdf?sv="));
    }

    #[test]
    fn test_unsigned_download_urls() {
        let mut state = azure_state(Some(&format!("AccountName=acct;AccountKey={KEY}")));
        state.config.download.signed_urls = false;
        let url = state
            .connect()
            .unwrap()
            .download_url("documents", "ACC1.pdf")
            .unwrap();
        assert_eq!(url, "https://acct.blob.core.windows.net/documents/ACC1.pdf");
    }

    #[test]
    fn test_oversized_download_window_is_configuration_error() {
        let mut state = azure_state(Some(&format!("AccountName=acct;AccountKey={KEY}")));
        state.config.download.expiry_minutes = u64::MAX;
        let err = state.connect().err().unwrap();
        assert!(matches!(err, SearchError::Configuration { .. }));
    }

    #[test]
    fn test_memory_backend_from_config() {
        let mut config = Config::default();
        config.storage.backend = BackendKind::Memory;
        let backend = Backend::from_config(&config).unwrap();
        let state = AppState::new(config, backend);
        assert!(state.connect().is_ok());
    }
}
