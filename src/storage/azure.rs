//! Azure Blob Storage listing client.
//!
//! Calls the List Blobs REST operation directly with `reqwest`, signing
//! each request with the account key (SharedKey scheme):
//!
//! ```text
//! GET https://{account}.blob.core.windows.net/{container}?restype=container&comp=list[&marker=..][&maxresults=..][&prefix=..]
//! x-ms-date:     <RFC 1123 date>
//! x-ms-version:  2020-10-02
//! Authorization: SharedKey {account}:{signature}
//! ```
//!
//! Download links are either plain blob URLs or read-only SAS URLs.

use chrono::Utc;
use metrics::counter;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::backend::{BlobLister, ListPage, ListRequest};
use super::connection_string::StorageCredentials;
use super::retry::{with_retry, RetryPolicy};
use super::sas::SasUrlGenerator;
use super::shared_key::{authorization_header, list_query_params, SharedKeyCredential, API_VERSION};
use crate::errors::SearchError;
use crate::metrics::UPSTREAM_REQUESTS_TOTAL;

/// Percent-encoding set for Azure blob names: encode everything except
/// unreserved characters and '/'.
const AZURE_BLOB_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encoding set for query values: '/' is encoded too.
const AZURE_QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Full URL of `blob_name` in `container` under `endpoint`.
pub fn blob_url(endpoint: &str, container: &str, blob_name: &str) -> String {
    format!(
        "{}/{}/{}",
        endpoint,
        utf8_percent_encode(container, AZURE_BLOB_ENCODE_SET),
        utf8_percent_encode(blob_name, AZURE_BLOB_ENCODE_SET)
    )
}

/// Build the shared HTTP client used for all listing calls.
pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

/// Lists a container through the SharedKey-signed REST API.
pub struct AzureBlobClient {
    /// HTTP client for Azure Blob REST API calls.
    client: reqwest::Client,
    /// Account name and decoded key.
    credential: SharedKeyCredential,
    /// Blob service base URL, no trailing slash.
    endpoint: String,
    /// URL path of `endpoint` ("" for the standard host-style endpoint).
    endpoint_path: String,
    retry: RetryPolicy,
    /// Present when download links should carry a SAS token.
    sas: Option<SasUrlGenerator>,
}

impl AzureBlobClient {
    /// Create a client for the account described by `credentials`.
    ///
    /// Fails with [`SearchError::Configuration`] when the account key is not
    /// base64 or the blob endpoint is not a URL.
    pub fn new(
        client: reqwest::Client,
        credentials: &StorageCredentials,
        retry: RetryPolicy,
    ) -> Result<Self, SearchError> {
        let credential = SharedKeyCredential::from_credentials(credentials)?;
        let endpoint = credentials.blob_endpoint();
        let parsed = reqwest::Url::parse(&endpoint)
            .map_err(|_| SearchError::configuration("blob endpoint is not a valid URL"))?;
        let endpoint_path = parsed.path().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            credential,
            endpoint,
            endpoint_path,
            retry,
            sas: None,
        })
    }

    /// Hand out SAS download URLs valid from `start_skew` ago until `validity` from now.
    ///
    /// Fails with [`SearchError::Configuration`] when either window does not
    /// fit a timestamp offset.
    pub fn with_signed_urls(
        mut self,
        validity: Duration,
        start_skew: Duration,
    ) -> Result<Self, SearchError> {
        let to_chrono = |d: Duration, setting: &str| {
            chrono::Duration::from_std(d).map_err(|_| {
                SearchError::configuration(format!("{} of {:?} is out of range", setting, d))
            })
        };
        self.sas = Some(
            SasUrlGenerator::new(self.credential.clone(), self.endpoint.clone())
                .with_validity(to_chrono(validity, "download expiry")?)
                .with_start_skew(to_chrono(start_skew, "download start skew")?),
        );
        Ok(self)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL path signed into the canonicalized resource for `container`.
    fn resource_path(&self, container: &str) -> String {
        format!("{}/{}", self.endpoint_path, container)
    }

    /// Full List Blobs URL for `request`, query values percent-encoded.
    pub fn list_url(&self, request: &ListRequest) -> String {
        let query = list_query_params(request)
            .iter()
            .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(v, AZURE_QUERY_ENCODE_SET)))
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "{}/{}?{}",
            self.endpoint,
            utf8_percent_encode(&request.container, AZURE_BLOB_ENCODE_SET),
            query
        )
    }

    /// One signed List Blobs call, returning the raw XML body.
    async fn list_once(&self, request: &ListRequest) -> Result<String, SearchError> {
        let url = self.list_url(request);
        let date = httpdate::fmt_http_date(SystemTime::now());
        let auth_header = authorization_header(
            &self.credential,
            &date,
            &self.resource_path(&request.container),
            &list_query_params(request),
        )?;

        let resp = self
            .client
            .get(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", API_VERSION)
            .header("Authorization", auth_header)
            .send()
            .await
            .map_err(|e| {
                counter!(UPSTREAM_REQUESTS_TOTAL, "outcome" => "transport_error").increment(1);
                SearchError::Transport {
                    message: format!("List Blobs request failed: {}", e),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            counter!(UPSTREAM_REQUESTS_TOTAL, "outcome" => "api_error").increment(1);
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::storage_api(status.as_u16(), &body));
        }

        counter!(UPSTREAM_REQUESTS_TOTAL, "outcome" => "success").increment(1);
        Ok(resp.text().await?)
    }
}

impl BlobLister for AzureBlobClient {
    fn list_page<'a>(
        &'a self,
        request: &'a ListRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, SearchError>> + Send + 'a>> {
        Box::pin(async move {
            let body = with_retry(&self.retry, "list_blobs", || self.list_once(request)).await?;

            match crate::xml::parse_list_blobs(&body) {
                Ok(page) => {
                    debug!(
                        container = %request.container,
                        blobs = page.blobs.len(),
                        has_next = page.next_marker.is_some(),
                        "Listed page"
                    );
                    Ok(page)
                }
                Err(e) => {
                    // Nothing, not even a marker, could be read from the body.
                    warn!(container = %request.container, error = %e, "Discarding unparseable listing page");
                    Ok(ListPage::default())
                }
            }
        })
    }

    fn download_url(&self, container: &str, blob_name: &str) -> Result<String, SearchError> {
        match &self.sas {
            Some(sas) => sas.url(container, blob_name, Utc::now()),
            None => Ok(blob_url(&self.endpoint, container, blob_name)),
        }
    }
}

// -- Tests -------------------------------------------------------------------
