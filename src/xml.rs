//! List Blobs XML response parsing.
//!
//! The service answers a listing with an `EnumerationResults` document:
//!
//! ```xml
//! <EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="documents">
//!   <MaxResults>100</MaxResults>
//!   <Blobs>
//!     <Blob>
//!       <Name>ACC123-report.pdf</Name>
//!       <Properties>
//!         <Last-Modified>Mon, 01 Jan 2024 00:00:00 GMT</Last-Modified>
//!         <Content-Length>1024</Content-Length>
//!         <Content-Type>application/pdf</Content-Type>
//!       </Properties>
//!     </Blob>
//!   </Blobs>
//!   <NextMarker>2!96!MDAw...</NextMarker>
//! </EnumerationResults>
//! ```
//!
//! Only the fields the search returns are extracted.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::errors::SearchError;
use crate::storage::backend::{BlobItem, ListPage, DEFAULT_CONTENT_TYPE};

/// Fields collected while inside one `<Blob>` element.
#[derive(Default)]
struct PartialBlob {
    name: String,
    content_length: String,
    last_modified: String,
    content_type: String,
}

impl PartialBlob {
    /// `None` when the entry had no name.
    fn finish(self) -> Option<BlobItem> {
        if self.name.is_empty() {
            return None;
        }
        let content_type = if self.content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            self.content_type
        };
        Some(BlobItem {
            name: self.name,
            size: self.content_length.trim().parse().unwrap_or(0),
            last_modified: self.last_modified,
            content_type,
        })
    }
}

/// Parse a List Blobs response body into one [`ListPage`].
///
/// Missing `Content-Length` becomes 0, missing `Content-Type` becomes
/// `application/octet-stream`, and entries without a `Name` are dropped.
/// Text is not trimmed because blob names may legitimately carry spaces.
///
/// A malformed document is salvaged: every `<Blob>` fragment that parses on
/// its own is kept, broken fragments are skipped, and `NextMarker` is still
/// returned so the listing can continue.  Only a body from which neither a
/// blob nor a marker can be recovered is a [`SearchError::Parse`].
pub fn parse_list_blobs(body: &str) -> Result<ListPage, SearchError> {
    let body = body.trim_start_matches('\u{feff}');
    match parse_document(body) {
        Ok(page) => Ok(page),
        Err(err) => {
            let page = recover_page(body);
            if page.blobs.is_empty() && page.next_marker.is_none() {
                return Err(err);
            }
            warn!(
                error = %err,
                recovered = page.blobs.len(),
                has_next = page.next_marker.is_some(),
                "Listing page is malformed; kept the readable entries"
            );
            Ok(page)
        }
    }
}

/// Strict parse of a whole `EnumerationResults` document.
fn parse_document(body: &str) -> Result<ListPage, SearchError> {
    let mut reader = Reader::from_str(body);

    let mut page = ListPage::default();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<PartialBlob> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag == "Blob" && path.last().is_some_and(|p| p == "Blobs") {
                    current = Some(PartialBlob::default());
                }
                path.push(tag);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("Blob") {
                    if let Some(partial) = current.take() {
                        match partial.finish() {
                            Some(item) => page.blobs.push(item),
                            None => debug!("Dropping listing entry without a Name"),
                        }
                    }
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t.unescape().map_err(|e| parse_error(&reader, e))?;
                assign_text(&path, &mut current, &mut page, &text);
            }
            Ok(Event::CData(ref c)) => {
                let text = String::from_utf8_lossy(c).into_owned();
                assign_text(&path, &mut current, &mut page, &text);
            }
            Ok(Event::Eof) => break,
            // Empty elements (`<Content-Type />`) are treated as absent.
            Ok(_) => {}
            Err(e) => return Err(parse_error(&reader, e)),
        }
    }

    if let Some(open) = path.last() {
        return Err(SearchError::Parse {
            message: format!("document ended inside <{}>", open),
        });
    }

    page.next_marker = page.next_marker.filter(|m| !m.is_empty());
    Ok(page)
}

/// Route a text node to the field its element path names.
fn assign_text(
    path: &[String],
    current: &mut Option<PartialBlob>,
    page: &mut ListPage,
    text: &str,
) {
    let path: Vec<&str> = path.iter().map(String::as_str).collect();

    if let [_root, "NextMarker"] = path.as_slice() {
        page.next_marker
            .get_or_insert_with(String::new)
            .push_str(text);
        return;
    }

    let Some(blob) = current.as_mut() else {
        return;
    };
    match path.as_slice() {
        [.., "Blob", "Name"] => blob.name.push_str(text),
        [.., "Blob", "Properties", "Content-Length"] => blob.content_length.push_str(text),
        [.., "Blob", "Properties", "Last-Modified"] => blob.last_modified.push_str(text),
        [.., "Blob", "Properties", "Content-Type"] => blob.content_type.push_str(text),
        _ => {}
    }
}

/// Salvage a malformed page one `<Blob>` fragment at a time.
///
/// Blob names are escaped by the service, so the literal tags below can only
/// be markup.
fn recover_page(body: &str) -> ListPage {
    const OPEN: &str = "<Blob>";
    const CLOSE: &str = "</Blob>";

    let mut page = ListPage::default();
    let mut rest = body;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let close = after_open.find(CLOSE);
        let next_open = after_open.find(OPEN);
        match close {
            Some(end) if next_open.map_or(true, |n| end < n) => {
                let fragment = &rest[start..start + OPEN.len() + end + CLOSE.len()];
                match parse_document(&format!(
                    "<EnumerationResults><Blobs>{}</Blobs></EnumerationResults>",
                    fragment
                )) {
                    Ok(parsed) => page.blobs.extend(parsed.blobs),
                    Err(e) => debug!(error = %e, "Skipping malformed listing entry"),
                }
                rest = &after_open[end + CLOSE.len()..];
            }
            _ => {
                debug!("Skipping unterminated listing entry");
                rest = match next_open {
                    Some(n) => &after_open[n..],
                    None => "",
                };
            }
        }
    }

    page.next_marker = recover_next_marker(body);
    page
}

fn recover_next_marker(body: &str) -> Option<String> {
    const OPEN: &str = "<NextMarker>";
    let start = body.rfind(OPEN)? + OPEN.len();
    let len = body[start..].find("</NextMarker>")?;
    let raw = &body[start..start + len];
    match quick_xml::escape::unescape(raw) {
        Ok(marker) if !marker.is_empty() => Some(marker.into_owned()),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Discarding unreadable NextMarker");
            None
        }
    }
}

fn parse_error(reader: &Reader<&[u8]>, err: quick_xml::Error) -> SearchError {
    SearchError::Parse {
        message: format!("{} at byte {}", err, reader.buffer_position()),
    }
}

// -- Tests -------------------------------------------------------------------
