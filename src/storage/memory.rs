//! In-memory listing backend.
//!
//! Serves a fixed, ordered set of blobs with the same paging contract as
//! the real service: at most `max_results` entries per page and an opaque
//! continuation marker until the listing is exhausted.  Used for local runs
//! without a storage account and throughout the tests.
//!
//! The store models a single container: every container name is answered
//! with the same fixture listing.  Download URLs still carry the requested
//! container name.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::azure::blob_url;
use super::backend::{BlobItem, BlobLister, ListPage, ListRequest, DEFAULT_CONTENT_TYPE};
use crate::config::MemoryBlobConfig;
use crate::errors::SearchError;

/// Page size used when a request sets no `max_results`.
const DEFAULT_PAGE_SIZE: usize = 5000;

const MEMORY_ENDPOINT: &str = "memory://local";

/// A fixed listing held in memory.
pub struct MemoryBlobStore {
    /// Blobs in listing order.
    blobs: Vec<BlobItem>,
    /// Number of `list_page` calls served.
    list_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new(blobs: Vec<BlobItem>) -> Self {
        Self {
            blobs,
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Build a store from configuration fixtures.
    pub fn from_config(blobs: &[MemoryBlobConfig]) -> Self {
        Self::new(
            blobs
                .iter()
                .map(|b| BlobItem {
                    name: b.name.clone(),
                    size: b.size,
                    last_modified: b.last_modified.clone(),
                    content_type: b
                        .content_type
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                })
                .collect(),
        )
    }

    /// Build a store of blobs with the given names and default properties.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| BlobItem {
                    name: name.into(),
                    size: 0,
                    last_modified: String::new(),
                    content_type: DEFAULT_CONTENT_TYPE.to_string(),
                })
                .collect(),
        )
    }

    /// How many pages have been requested so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Slice the fixture listing for `request`; `request.container` is not consulted.
    fn page(&self, request: &ListRequest) -> Result<ListPage, SearchError> {
        let matching: Vec<&BlobItem> = self
            .blobs
            .iter()
            .filter(|b| {
                request
                    .prefix
                    .as_deref()
                    .map_or(true, |p| b.name.starts_with(p))
            })
            .collect();

        let start = match &request.marker {
            None => 0,
            Some(marker) => decode_marker(marker).filter(|&i| i <= matching.len()).ok_or_else(
                || SearchError::storage_api(400, "OutOfRangeInput: The specified marker is invalid."),
            )?,
        };
        let page_size = request
            .max_results
            .map_or(DEFAULT_PAGE_SIZE, |n| n.max(1) as usize);
        let end = (start + page_size).min(matching.len());

        Ok(ListPage {
            blobs: matching[start..end].iter().map(|b| (*b).clone()).collect(),
            next_marker: (end < matching.len()).then(|| encode_marker(end)),
        })
    }
}

fn encode_marker(index: usize) -> String {
    format!("mem!{:08}", index)
}

fn decode_marker(marker: &str) -> Option<usize> {
    marker.strip_prefix("mem!")?.parse().ok()
}

impl BlobLister for MemoryBlobStore {
    fn list_page<'a>(
        &'a self,
        request: &'a ListRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, SearchError>> + Send + 'a>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.page(request)
        })
    }

    fn download_url(&self, container: &str, blob_name: &str) -> Result<String, SearchError> {
        Ok(blob_url(MEMORY_ENDPOINT, container, blob_name))
    }
}
