//! Blob listing contract.
//!
//! Every listing backend implements [`BlobLister`].  The trait deals in one
//! page at a time so the pagination loop, the signing code and the XML
//! parsing can each be exercised without a live storage account.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

use crate::errors::SearchError;

/// Content type reported for blobs that carry none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Parameters for a single List Blobs call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Container to list.
    pub container: String,
    /// Only return blobs whose names begin with this value.
    pub prefix: Option<String>,
    /// Continuation marker from the previous page.
    pub marker: Option<String>,
    /// Upper bound on entries per page.
    pub max_results: Option<u32>,
}

impl ListRequest {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: Option<String>) -> Self {
        self.prefix = prefix.filter(|p| !p.is_empty());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// The same request continued at `marker`.
    pub fn continued(&self, marker: String) -> Self {
        Self {
            marker: Some(marker),
            ..self.clone()
        }
    }
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    /// The blob's name within its container.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// `Last-Modified` exactly as the service reported it.
    pub last_modified: String,
    pub content_type: String,
}

impl BlobItem {
    /// Attach a download URL, producing the record returned to callers.
    pub fn into_record(self, url: String) -> BlobRecord {
        BlobRecord {
            name: self.name,
            url,
            size: self.size,
            last_modified: self.last_modified,
            content_type: self.content_type,
        }
    }
}

/// A matched blob as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlobRecord {
    pub name: String,
    /// Download URL, either plain or carrying a read-only SAS token.
    pub url: String,
    pub size: u64,
    pub last_modified: String,
    pub content_type: String,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries in service order.
    pub blobs: Vec<BlobItem>,
    /// Marker for the following page; `None` on the last page.
    pub next_marker: Option<String>,
}

/// Async listing contract.
pub trait BlobLister: Send + Sync + 'static {
    /// Fetch one page of the container listing described by `request`.
    fn list_page<'a>(
        &'a self,
        request: &'a ListRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, SearchError>> + Send + 'a>>;

    /// Download URL for `blob_name` in `container`.
    fn download_url(&self, container: &str, blob_name: &str) -> Result<String, SearchError>;
}
