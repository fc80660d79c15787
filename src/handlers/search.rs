//! Accession-number search handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use tracing::{debug, error};

use crate::errors::SearchError;
use crate::metrics::SEARCH_ERRORS_TOTAL;
use crate::search::{self, SearchOptions, SearchResult};
use crate::AppState;

/// Query parameter carrying the search term.
pub const ACCESSION_NUMBER_PARAM: &str = "accessionNumber";

/// Longest accepted search term, in characters.
pub const MAX_TERM_CHARS: usize = 256;

const MISSING_TERM_MESSAGE: &str = "Please provide an accessionNumber parameter";

/// Validated search input.
#[derive(Debug, garde::Validate)]
pub struct SearchQuery {
    /// Trimmed search term.
    #[garde(length(chars, min = 1, max = MAX_TERM_CHARS))]
    pub accession_number: String,
}

impl SearchQuery {
    /// Pull the search term out of the decoded query parameters.
    ///
    /// A missing or all-whitespace term is rejected with the same message.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, SearchError> {
        let term = params
            .get(ACCESSION_NUMBER_PARAM)
            .map(|t| t.trim())
            .unwrap_or_default();
        if term.is_empty() {
            return Err(SearchError::InvalidRequest {
                message: MISSING_TERM_MESSAGE.to_string(),
            });
        }

        let query = SearchQuery {
            accession_number: term.to_string(),
        };
        query.validate().map_err(|_| SearchError::InvalidRequest {
            message: format!(
                "The {} parameter must be at most {} characters",
                ACCESSION_NUMBER_PARAM, MAX_TERM_CHARS
            ),
        })?;
        Ok(query)
    }
}

/// Search the configured container for blobs whose name contains the term.
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "Search",
    operation_id = "SearchFiles",
    params(
        ("accessionNumber" = String, Query, description = "Substring to look for in blob names")
    ),
    responses(
        (status = 200, description = "Matching blobs", body = SearchResult),
        (status = 400, description = "Missing, blank or over-long accessionNumber"),
        (status = 500, description = "Storage not configured or unavailable")
    )
)]
pub async fn search_files(
    state: Arc<AppState>,
    params: &HashMap<String, String>,
) -> Result<Response, SearchError> {
    let query = match SearchQuery::from_params(params) {
        Ok(query) => query,
        Err(e) => {
            debug!(error = %e, "Rejected search request");
            return Err(e);
        }
    };
    let term = query.accession_number;

    match run_search(&state, &term).await {
        Ok(result) => Ok(Json(result).into_response()),
        Err(e) => {
            error!(term = %term, kind = e.kind(), error = %e, "Search failed");
            metrics::counter!(SEARCH_ERRORS_TOTAL, "kind" => e.kind()).increment(1);
            Err(e)
        }
    }
}

async fn run_search(state: &AppState, term: &str) -> Result<SearchResult, SearchError> {
    let lister = state.connect()?;
    let options = SearchOptions::from_config(&state.config.storage);
    search::search(lister.as_ref(), term, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: &str) -> HashMap<String, String> {
        HashMap::from([(ACCESSION_NUMBER_PARAM.to_string(), value.to_string())])
    }

    #[test]
    fn test_term_is_trimmed() {
        let query = SearchQuery::from_params(&params("  ACC123 ")).unwrap();
        assert_eq!(query.accession_number, "ACC123");
    }

    #[test]
    fn test_missing_term_rejected() {
        let err = SearchQuery::from_params(&HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), MISSING_TERM_MESSAGE);
    }

    #[test]
    fn test_blank_term_rejected() {
        for blank in ["", "   ", "\t\n"] {
            let err = SearchQuery::from_params(&params(blank)).unwrap_err();
            assert!(matches!(err, SearchError::InvalidRequest { .. }));
            assert_eq!(err.to_string(), MISSING_TERM_MESSAGE);
        }
    }

    #[test]
    fn test_length_limit_counts_characters() {
        let at_limit = "é".repeat(MAX_TERM_CHARS);
        assert!(SearchQuery::from_params(&params(&at_limit)).is_ok());

        let over = "A".repeat(MAX_TERM_CHARS + 1);
        let err = SearchQuery::from_params(&params(&over)).unwrap_err();
        assert!(matches!(err, SearchError::InvalidRequest { .. }));
    }

    #[test]
    fn test_other_parameter_names_ignored() {
        let other = HashMap::from([("q".to_string(), "ACC1".to_string())]);
        assert!(SearchQuery::from_params(&other).is_err());
    }
}
