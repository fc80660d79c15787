//! Accession-number search over a container listing.
//!
//! A search lists the whole container (following continuation markers),
//! keeps the blobs whose name contains the search term, and attaches a
//! download URL to each.  Matching is case-sensitive substring containment
//! against the full blob name; the term is never sent as a listing prefix.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::errors::SearchError;
use crate::metrics::SEARCH_RESULTS;
use crate::storage::backend::{BlobItem, BlobLister, BlobRecord, ListRequest};

/// Listing parameters shared by every search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Container to list.
    pub container: String,
    /// Optional listing prefix scoping the search to a virtual folder.
    pub listing_prefix: Option<String>,
    /// `maxresults` per page.
    pub page_size: u32,
    /// Deadline for the whole search.
    pub deadline: Duration,
}

impl SearchOptions {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            container: storage.container.clone(),
            listing_prefix: storage.prefix.clone(),
            page_size: storage.effective_page_size(),
            deadline: storage.search_timeout(),
        }
    }
}

/// Response body of a successful search.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Number of entries in `results`.
    pub count: usize,
    /// The search term, as matched.
    pub accession_number: String,
    /// Matching blobs in listing order.
    pub results: Vec<BlobRecord>,
}

/// Whether a blob named `name` matches `term`.
pub fn matches_term(name: &str, term: &str) -> bool {
    name.contains(term)
}

/// List every page of `request`'s container, in service order.
pub async fn list_all(
    lister: &dyn BlobLister,
    request: ListRequest,
) -> Result<Vec<BlobItem>, SearchError> {
    let mut items = Vec::new();
    let mut request = request;
    let mut pages = 0usize;

    loop {
        let page = lister.list_page(&request).await?;
        pages += 1;
        items.extend(page.blobs);

        match page.next_marker {
            Some(next) if request.marker.as_deref() == Some(next.as_str()) => {
                // A marker that does not advance would loop forever.
                warn!(marker = %next, "Listing returned the same continuation marker twice; stopping");
                break;
            }
            Some(next) => request = request.continued(next),
            None => break,
        }
    }

    debug!(pages, blobs = items.len(), "Listing complete");
    Ok(items)
}

/// Run a full search for `term`.
///
/// Fails with [`SearchError::DeadlineExceeded`] when listing takes longer
/// than `options.deadline`; dropping the returned future cancels any
/// in-flight upstream call.
pub async fn search(
    lister: &dyn BlobLister,
    term: &str,
    options: &SearchOptions,
) -> Result<SearchResult, SearchError> {
    let request = ListRequest::new(options.container.clone())
        .with_prefix(options.listing_prefix.clone())
        .with_max_results(options.page_size);

    let items = tokio::time::timeout(options.deadline, list_all(lister, request))
        .await
        .map_err(|_| SearchError::DeadlineExceeded(options.deadline))??;
    let listed = items.len();

    let results = items
        .into_iter()
        .filter(|item| matches_term(&item.name, term))
        .map(|item| {
            let url = lister.download_url(&options.container, &item.name)?;
            Ok(item.into_record(url))
        })
        .collect::<Result<Vec<_>, SearchError>>()?;

    info!(
        container = %options.container,
        term,
        listed,
        matched = results.len(),
        "Search complete"
    );
    metrics::histogram!(SEARCH_RESULTS).record(results.len() as f64);

    Ok(SearchResult {
        count: results.len(),
        accession_number: term.to_string(),
        results,
    })
}

// -- Tests -------------------------------------------------------------------
