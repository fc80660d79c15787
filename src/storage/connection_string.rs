//! Storage account connection strings.
//!
//! A connection string is a list of `Key=Value` segments joined by `;`,
//! e.g. `DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=...==`.
//! Base64 account keys end in `=`, so each segment splits at its first `=`.

use std::collections::HashMap;

use crate::errors::SearchError;

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Split a connection string into its key/value pairs.
///
/// Empty segments and segments without `=` are skipped; later duplicates
/// win.
pub fn parse_connection_string(input: &str) -> HashMap<String, String> {
    input
        .split(';')
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Account credentials and endpoint settings from a connection string.
#[derive(Clone)]
pub struct StorageCredentials {
    pub account_name: String,
    /// Base64-encoded account key.
    pub account_key: String,
    /// `DefaultEndpointsProtocol`, `https` unless overridden.
    pub protocol: String,
    /// `EndpointSuffix`, `core.windows.net` unless overridden.
    pub endpoint_suffix: String,
    /// Explicit `BlobEndpoint`, e.g. a local emulator address.
    pub blob_endpoint: Option<String>,
}

impl StorageCredentials {
    /// Parse and validate a connection string.
    ///
    /// Fails with [`SearchError::Configuration`] when the string is blank or
    /// `AccountName`/`AccountKey` is missing or empty.
    pub fn from_connection_string(input: &str) -> Result<Self, SearchError> {
        if input.trim().is_empty() {
            return Err(SearchError::configuration("connection string is empty"));
        }

        let mut parts = parse_connection_string(input);
        let mut required = |key: &str| {
            parts
                .remove(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    SearchError::configuration(format!("connection string is missing {key}"))
                })
        };
        let account_name = required("AccountName")?;
        let account_key = required("AccountKey")?;

        Ok(Self {
            account_name,
            account_key,
            protocol: parts
                .remove("DefaultEndpointsProtocol")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            endpoint_suffix: parts
                .remove("EndpointSuffix")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
            blob_endpoint: parts
                .remove("BlobEndpoint")
                .filter(|v| !v.is_empty())
                .map(|v| v.trim_end_matches('/').to_string()),
        })
    }

    /// Base URL of the blob service, without a trailing slash.
    pub fn blob_endpoint(&self) -> String {
        match &self.blob_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "{}://{}.blob.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            ),
        }
    }
}

impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("protocol", &self.protocol)
            .field("endpoint_suffix", &self.endpoint_suffix)
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}
